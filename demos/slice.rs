use clap::Parser;

use fmslice_rs::analysis::{mark_implicit_constraints, AnalysisOptions, FeatureAnalyzer};
use fmslice_rs::formula::Formula;
use fmslice_rs::model::{FeatureModel, GroupKind};
use fmslice_rs::monitor::ProgressMonitor;
use fmslice_rs::slicer::{FeatureModelSlicer, SliceOptions};

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Features to keep.
    #[arg(value_name = "NAME", default_values = ["Car", "Engine", "Electric", "Navigation"])]
    select: Vec<String>,

    /// Fail on structural errors during the merge pass.
    #[clap(long)]
    strict: bool,

    /// Do not copy original constraints over selected features.
    #[clap(long)]
    no_constraints: bool,

    /// Run the feature analysis on the sliced model.
    #[clap(long)]
    analyze: bool,
}

/// A small car product line.
fn car_model() -> color_eyre::Result<FeatureModel> {
    let (mut fm, car) = FeatureModel::with_root("Car")?;

    let engine = fm.add_feature(car, "Engine", true)?;
    fm.set_group(engine, GroupKind::Alternative);
    fm.add_feature(engine, "Gasoline", false)?;
    fm.add_feature(engine, "Diesel", false)?;
    fm.add_feature(engine, "Electric", false)?;

    let comfort = fm.add_feature(car, "Comfort", false)?;
    fm.set_group(comfort, GroupKind::Or);
    fm.set_abstract(comfort, true);
    fm.add_feature(comfort, "Navigation", false)?;
    fm.add_feature(comfort, "Heating", false)?;
    let assist = fm.add_feature(comfort, "Assist", false)?;
    fm.add_feature(assist, "Camera", true)?;
    fm.add_feature(assist, "Radar", false)?;

    let battery = fm.add_feature(car, "Battery", false)?;
    fm.set_hidden(battery, true);

    fm.add_constraint(Formula::requires("Electric", "Battery"))?;
    fm.add_constraint(Formula::requires("Battery", "Navigation"))?;
    fm.add_constraint(Formula::excludes("Diesel", "Radar"))?;
    Ok(fm)
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    let model = car_model()?;
    println!("Original model with {} features:\n{}", model.num_features(), model);

    let options = SliceOptions::default()
        .with_strict_merge(args.strict)
        .with_consider_constraints(!args.no_constraints);
    let monitor = ProgressMonitor::new();
    let slicer = FeatureModelSlicer::new(&model, &args.select, options)?;
    let result = slicer.execute(&monitor)?;
    let mut sliced = result.model;
    println!("stats = {:?}", result.stats);

    let implicit = mark_implicit_constraints(&mut sliced, &model)?;
    println!(
        "Sliced model with {} features ({} implicit constraints):\n{}",
        sliced.num_features(),
        implicit,
        sliced
    );

    if args.analyze {
        let analyzer = FeatureAnalyzer::new(&sliced, AnalysisOptions::all())?;
        let analysis = analyzer.analyze(&monitor)?;
        println!("void = {}", analysis.void_model);
        println!("core = {:?}", analysis.core);
        println!("dead = {:?}", analysis.dead);
        println!("false-optional = {:?}", analysis.false_optional);
    }

    println!("Total time: {:?}", time_total.elapsed());
    Ok(())
}
