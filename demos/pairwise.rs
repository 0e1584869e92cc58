use clap::Parser;

use fmslice_rs::configuration::{Configuration, ConfigurationBuilder};
use fmslice_rs::encoder;
use fmslice_rs::formula::Formula;
use fmslice_rs::generator::{GeneratorConfig, TWiseGenerator};
use fmslice_rs::model::{FeatureModel, GroupKind};
use fmslice_rs::monitor::{Monitor, ProgressMonitor};

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Number of optional leaf features in the generated model.
    #[arg(value_name = "INT", default_value = "12")]
    n: usize,

    /// Interaction strength.
    #[clap(short, long, value_name = "INT", default_value = "2")]
    t: usize,

    /// Maximum number of configurations.
    #[clap(long, value_name = "INT", default_value = "50")]
    limit: usize,

    /// Cancel the generation after this many configurations.
    #[clap(long, value_name = "INT")]
    cancel_after: Option<usize>,
}

/// Model with `n` leaves split over an or-group and an alternative group,
/// plus a chain of requires-constraints between neighbouring leaves.
fn chain_model(n: usize) -> color_eyre::Result<FeatureModel> {
    let (mut fm, root) = FeatureModel::with_root("Root")?;
    let left = fm.add_feature(root, "Left", true)?;
    fm.set_group(left, GroupKind::Or);
    let right = fm.add_feature(root, "Right", false)?;
    fm.set_group(right, GroupKind::Alternative);

    let mut names = Vec::with_capacity(n);
    for i in 0..n {
        let name = format!("F{}", i);
        let parent = if i % 2 == 0 { left } else { right };
        fm.add_feature(parent, name.clone(), false)?;
        names.push(name);
    }
    for pair in names.windows(2).step_by(3) {
        fm.add_constraint(Formula::requires(pair[0].as_str(), pair[1].as_str()))?;
    }
    Ok(fm)
}

/// Prints configurations as they arrive and optionally cancels the run.
struct Printer<'a> {
    monitor: &'a ProgressMonitor,
    cancel_after: Option<usize>,
    received: usize,
}

impl ConfigurationBuilder for Printer<'_> {
    fn add_configuration(&mut self, configuration: Configuration) {
        self.received += 1;
        println!("#{:<4} {}", self.received, configuration.selected_names().join(" "));
        if self.cancel_after == Some(self.received) {
            println!("Cancelling...");
            self.monitor.cancel();
        }
    }
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

    let model = chain_model(args.n)?;
    println!("{}", model);
    let cnf = encoder::encode(&model)?;
    println!("Encoded into {} variables and {} clauses", cnf.num_vars(), cnf.num_clauses());

    let config = GeneratorConfig::default().with_t(args.t).with_target_count(args.limit);
    let generator = TWiseGenerator::new(cnf, config)?;
    let monitor = ProgressMonitor::new();
    let mut printer = Printer {
        monitor: &monitor,
        cancel_after: args.cancel_after,
        received: 0,
    };
    let report = generator.generate(&mut printer, &monitor)?;

    println!("report = {:?}", report);
    println!(
        "Covered {} of {} interactions ({} invalid) with {} configurations",
        report.covered, report.total, report.invalid, report.count
    );

    println!("Total time: {:?}", time_total.elapsed());
    Ok(())
}
