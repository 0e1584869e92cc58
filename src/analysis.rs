//! Feature and constraint analyses.
//!
//! All queries go through the SAT oracle with the solver configuration from
//! [`AnalysisOptions`]. A query that times out never produces a verdict: the
//! feature is simply not reported, and a constraint is never classified on
//! the strength of a feature whose query timed out.

use rustc_hash::FxHashSet;

use crate::clause::Clause;
use crate::cnf::Cnf;
use crate::encoder;
use crate::error::Result;
use crate::model::{ConstraintAttribute, FeatureModel, GroupKind};
use crate::monitor::Monitor;
use crate::sat::{SatResult, SatSolver, SolverConfig};
use crate::types::Var;
use crate::variables::Variables;

/// Switches for the analyses run by [`FeatureAnalyzer::analyze`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisOptions {
    /// Dead, core, and false-optional features.
    pub calculate_features: bool,
    /// Master switch for all constraint analyses.
    pub calculate_constraints: bool,
    pub calculate_redundant_constraints: bool,
    pub calculate_tautology_constraints: bool,
    pub calculate_dead_constraints: bool,
    pub calculate_false_optional_constraints: bool,
    pub solver: SolverConfig,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self::all()
    }
}

impl AnalysisOptions {
    pub fn all() -> Self {
        Self {
            calculate_features: true,
            calculate_constraints: true,
            calculate_redundant_constraints: true,
            calculate_tautology_constraints: true,
            calculate_dead_constraints: true,
            calculate_false_optional_constraints: true,
            solver: SolverConfig::default().with_conflict_limit(100_000),
        }
    }

    pub fn features_only() -> Self {
        Self::all().with_constraints(false)
    }

    /// Turns all constraint analyses on or off at once.
    pub fn with_constraints(mut self, enabled: bool) -> Self {
        self.calculate_constraints = enabled;
        self.calculate_redundant_constraints = enabled;
        self.calculate_tautology_constraints = enabled;
        self.calculate_dead_constraints = enabled;
        self.calculate_false_optional_constraints = enabled;
        self
    }

    pub fn with_features(mut self, enabled: bool) -> Self {
        self.calculate_features = enabled;
        self
    }

    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }
}

/// Result of [`FeatureAnalyzer::analyze`]. Feature lists are in pre-order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureAnalysis {
    pub void_model: bool,
    pub core: Vec<String>,
    pub dead: Vec<String>,
    pub false_optional: Vec<String>,
    /// One entry per constraint, empty if constraint analysis was disabled.
    pub constraint_attributes: Vec<ConstraintAttribute>,
}

/// Analyzer over an immutable snapshot of a feature model.
pub struct FeatureAnalyzer<'a> {
    pub model: &'a FeatureModel,
    pub cnf: Cnf,
    options: AnalysisOptions,
}

impl<'a> FeatureAnalyzer<'a> {
    pub fn new(model: &'a FeatureModel, options: AnalysisOptions) -> Result<Self> {
        let cnf = encoder::encode(model)?;
        Ok(Self { model, cnf, options })
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    fn solver(&self, cnf: &Cnf) -> SatSolver {
        SatSolver::new(cnf, self.options.solver.clone())
    }

    /// Whether the model has no valid configuration. A timeout counts as not void.
    pub fn is_void(&self) -> bool {
        self.solver(&self.cnf).solve().is_unsat()
    }

    /// Features selected in every valid configuration.
    pub fn core_features(&self) -> Vec<&str> {
        let backbone = dead_and_core(&self.cnf, &self.options.solver);
        self.names(&backbone.core)
    }

    /// Features selected in no valid configuration.
    pub fn dead_features(&self) -> Vec<&str> {
        let backbone = dead_and_core(&self.cnf, &self.options.solver);
        self.names(&backbone.dead)
    }

    /// Optional features of `And` groups that are selected whenever their
    /// parent is. Dead features are never reported.
    pub fn false_optional_features(&self) -> Vec<&str> {
        let backbone = dead_and_core(&self.cnf, &self.options.solver);
        let false_optional = false_optional(self.model, &self.cnf, &backbone.dead, &self.options.solver);
        self.names(&false_optional.found)
    }

    fn names(&self, vars: &FxHashSet<Var>) -> Vec<&str> {
        let variables = self.cnf.variables();
        variables
            .vars()
            .filter(|var| vars.contains(var))
            .filter_map(|var| variables.name(var))
            .collect()
    }

    /// Runs the analyses enabled in the options.
    ///
    /// Constraint attributes are returned, not stored; see
    /// [`analyze_constraints`] for writing them onto a model.
    pub fn analyze(&self, monitor: &dyn Monitor) -> Result<FeatureAnalysis> {
        monitor.set_task_name("Analyzing Feature Model");
        monitor.check_cancel()?;

        let mut analysis = FeatureAnalysis {
            void_model: self.is_void(),
            ..Default::default()
        };

        if self.options.calculate_features && !analysis.void_model {
            monitor.check_cancel()?;
            let backbone = dead_and_core(&self.cnf, &self.options.solver);
            let false_optional = false_optional(self.model, &self.cnf, &backbone.dead, &self.options.solver);
            let to_strings =
                |vars: &FxHashSet<Var>| -> Vec<String> { self.names(vars).into_iter().map(str::to_string).collect() };
            analysis.dead = to_strings(&backbone.dead);
            analysis.core = to_strings(&backbone.core);
            analysis.false_optional = to_strings(&false_optional.found);
        }

        if self.options.calculate_constraints {
            analysis.constraint_attributes = constraint_attributes(self.model, &self.options, monitor)?;
        }
        log::debug!(
            "Analysis: void={} core={} dead={} false-optional={}",
            analysis.void_model,
            analysis.core.len(),
            analysis.dead.len(),
            analysis.false_optional.len()
        );
        Ok(analysis)
    }
}

/// Computes constraint attributes and stores them on the model's constraints.
pub fn analyze_constraints(
    model: &mut FeatureModel,
    options: &AnalysisOptions,
    monitor: &dyn Monitor,
) -> Result<Vec<ConstraintAttribute>> {
    let attributes = constraint_attributes(model, options, monitor)?;
    for (i, &attribute) in attributes.iter().enumerate() {
        model.set_constraint_attribute(i, attribute);
    }
    Ok(attributes)
}

/// Dead and core variables of a formula.
#[derive(Debug, Default)]
struct Backbone {
    dead: FxHashSet<Var>,
    core: FxHashSet<Var>,
    /// Variables with a timed-out query: they may be dead or core without
    /// being reported as such.
    undecided: FxHashSet<Var>,
}

/// Variables found by a per-feature query, plus those whose query timed out.
#[derive(Debug, Default)]
struct Findings {
    found: FxHashSet<Var>,
    undecided: FxHashSet<Var>,
}

/// Dead and core variables of `cnf`, empty if the formula is unsatisfiable.
///
/// Every model found rules out candidates in bulk: a variable true in some
/// model is not dead, a variable false in some model is not core.
fn dead_and_core(cnf: &Cnf, config: &SolverConfig) -> Backbone {
    let mut backbone = Backbone::default();
    let mut solver = SatSolver::new(cnf, config.clone());
    let Some(first) = solver.solve().into_model() else {
        return backbone;
    };

    let vars: Vec<Var> = cnf.variables().vars().collect();
    let mut seen_true: Vec<bool> = vars.iter().map(|&v| first.value(v)).collect();
    let mut seen_false: Vec<bool> = seen_true.iter().map(|&b| !b).collect();

    for &var in &vars {
        let i = var.index();
        for (positive, seen) in [(true, seen_true[i]), (false, seen_false[i])] {
            if seen {
                continue;
            }
            match solver.solve_with(&[var.lit(positive)]) {
                SatResult::Satisfiable(model) => {
                    for &other in &vars {
                        if model.value(other) {
                            seen_true[other.index()] = true;
                        } else {
                            seen_false[other.index()] = true;
                        }
                    }
                }
                SatResult::Unsatisfiable => {
                    if positive {
                        backbone.dead.insert(var);
                    } else {
                        backbone.core.insert(var);
                    }
                }
                SatResult::Timeout => {
                    backbone.undecided.insert(var);
                }
            }
        }
    }
    backbone
}

fn false_optional(model: &FeatureModel, cnf: &Cnf, dead: &FxHashSet<Var>, config: &SolverConfig) -> Findings {
    let vars = cnf.variables();
    let mut solver = SatSolver::new(cnf, config.clone());
    let mut result = Findings::default();
    for id in model.features() {
        let feature = model.feature(id);
        let Some(parent) = feature.parent() else {
            continue;
        };
        if feature.is_mandatory() || model.feature(parent).group() != GroupKind::And {
            continue;
        }
        let (Some(var), Some(parent_var)) = (vars.var(feature.name()), vars.var(model.name(parent))) else {
            continue;
        };
        if dead.contains(&var) {
            continue;
        }
        // parent => feature
        match solver.check_implied(&Clause::new([parent_var.neg(), var.pos()])) {
            SatResult::Unsatisfiable => {
                result.found.insert(var);
            }
            SatResult::Timeout => {
                result.undecided.insert(var);
            }
            SatResult::Satisfiable(_) => {}
        }
    }
    result
}

fn constraint_attributes(
    model: &FeatureModel,
    options: &AnalysisOptions,
    monitor: &dyn Monitor,
) -> Result<Vec<ConstraintAttribute>> {
    let count = model.constraints().len();
    monitor.set_task_name("Analyzing Constraints");
    monitor.set_remaining_work(count as u64);

    let full = encoder::encode(model)?;
    let vars = full.variables().clone();
    let full_void = SatSolver::new(&full, options.solver.clone()).solve().is_unsat();

    let (full_dead, full_false_optional) = if !full_void
        && (options.calculate_dead_constraints || options.calculate_false_optional_constraints)
    {
        let dead = dead_and_core(&full, &options.solver).dead;
        let fo = if options.calculate_false_optional_constraints {
            false_optional(model, &full, &dead, &options.solver).found
        } else {
            FxHashSet::default()
        };
        (dead, fo)
    } else {
        (FxHashSet::default(), FxHashSet::default())
    };

    let mut attributes = vec![ConstraintAttribute::Normal; count];
    let mut redundant: FxHashSet<usize> = FxHashSet::default();

    for i in 0..count {
        monitor.check_cancel()?;
        let clauses = model.constraints()[i].formula().to_clauses(&vars)?;
        let without = encoder::encode_filtered(model, |j| j != i)?;
        attributes[i] = classify(
            model,
            &clauses,
            &without,
            full_void,
            &full_dead,
            &full_false_optional,
            options,
        );

        if attributes[i] == ConstraintAttribute::Normal && options.calculate_redundant_constraints {
            // Previously found redundant constraints do not count as support,
            // so one of two equivalent constraints stays normal.
            let rest = encoder::encode_filtered(model, |j| j != i && !redundant.contains(&j))?;
            let mut solver = SatSolver::new(&rest, options.solver.clone());
            if clauses.iter().all(|clause| solver.implies(clause)) {
                attributes[i] = ConstraintAttribute::Redundant;
                redundant.insert(i);
            }
        }
        monitor.step();
    }
    Ok(attributes)
}

/// Classification by every attribute except `Redundant`, in precedence order.
fn classify(
    model: &FeatureModel,
    clauses: &[Clause],
    without: &Cnf,
    full_void: bool,
    full_dead: &FxHashSet<Var>,
    full_false_optional: &FxHashSet<Var>,
    options: &AnalysisOptions,
) -> ConstraintAttribute {
    let unsatisfiable = {
        let mut solver = SatSolver::with_vars(without.num_vars(), options.solver.clone());
        for clause in clauses {
            solver.add_clause(clause);
        }
        solver.solve().is_unsat()
    };
    if unsatisfiable {
        return ConstraintAttribute::Unsatisfiable;
    }
    if options.calculate_tautology_constraints && clauses.is_empty() {
        return ConstraintAttribute::Tautology;
    }
    if full_void {
        let void_without = SatSolver::new(without, options.solver.clone()).solve().is_unsat();
        return if void_without {
            ConstraintAttribute::Normal
        } else {
            ConstraintAttribute::VoidModel
        };
    }

    if options.calculate_dead_constraints || options.calculate_false_optional_constraints {
        // Only a proven change counts: a variable whose query timed out
        // without the constraint is left out of the comparison.
        let backbone = dead_and_core(without, &options.solver);
        let lost_dead = full_dead
            .iter()
            .any(|var| !backbone.dead.contains(var) && !backbone.undecided.contains(var));
        if options.calculate_dead_constraints && lost_dead {
            return ConstraintAttribute::Dead;
        }
        if options.calculate_false_optional_constraints {
            let fo_without = false_optional(model, without, &backbone.dead, &options.solver);
            let lost_false_optional = full_false_optional.iter().any(|var| {
                !fo_without.found.contains(var)
                    && !fo_without.undecided.contains(var)
                    && !backbone.undecided.contains(var)
            });
            if lost_false_optional {
                return ConstraintAttribute::FalseOptional;
            }
        }
    }
    ConstraintAttribute::Normal
}

/// Indices of the constraints of `sliced` that do not occur in `origin`.
///
/// Two constraints are considered the same if their clause forms are equal,
/// so a constraint copied from the origin is never implicit while one added
/// by reconciliation is, unless it happens to restate an original one.
pub fn implicit_constraints(sliced: &FeatureModel, origin: &FeatureModel) -> Result<Vec<usize>> {
    let mut vars = Variables::new();
    for name in sliced.feature_names().into_iter().chain(origin.feature_names()) {
        vars.add(name);
    }
    let known: Vec<Vec<Clause>> = origin
        .constraints()
        .iter()
        .map(|c| c.formula().to_clauses(&vars))
        .collect::<Result<_>>()?;

    let mut implicit = Vec::new();
    for (i, constraint) in sliced.constraints().iter().enumerate() {
        let clauses = constraint.formula().to_clauses(&vars)?;
        if !known.contains(&clauses) {
            implicit.push(i);
        }
    }
    Ok(implicit)
}

/// Tags the implicit constraints of `sliced` (see [`implicit_constraints`])
/// and returns how many there are.
pub fn mark_implicit_constraints(sliced: &mut FeatureModel, origin: &FeatureModel) -> Result<usize> {
    let implicit = implicit_constraints(sliced, origin)?;
    for &i in &implicit {
        sliced.set_constraint_attribute(i, ConstraintAttribute::Implicit);
    }
    Ok(implicit.len())
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::formula::Formula;
    use crate::monitor::NullMonitor;

    /// Root(and){ A, B, C(alt){X, Y} }
    fn sample() -> FeatureModel {
        let (mut fm, root) = FeatureModel::with_root("Root").unwrap();
        fm.add_feature(root, "A", false).unwrap();
        fm.add_feature(root, "B", false).unwrap();
        let c = fm.add_feature(root, "C", false).unwrap();
        fm.set_group(c, GroupKind::Alternative);
        fm.add_feature(c, "X", false).unwrap();
        fm.add_feature(c, "Y", false).unwrap();
        fm
    }

    #[test]
    fn test_plain_model() {
        let fm = sample();
        let analyzer = FeatureAnalyzer::new(&fm, AnalysisOptions::all()).unwrap();
        assert!(!analyzer.is_void());
        assert_eq!(analyzer.core_features(), vec!["Root"]);
        assert!(analyzer.dead_features().is_empty());
        assert!(analyzer.false_optional_features().is_empty());
    }

    #[test]
    fn test_dead_and_false_optional() {
        let mut fm = sample();
        // A is always there, so B is dead and X cannot be chosen with A.
        fm.add_constraint(Formula::requires("Root", "A")).unwrap();
        fm.add_constraint(Formula::excludes("A", "B")).unwrap();
        fm.add_constraint(Formula::requires("C", "Y")).unwrap();

        let analyzer = FeatureAnalyzer::new(&fm, AnalysisOptions::features_only()).unwrap();
        let analysis = analyzer.analyze(&NullMonitor).unwrap();
        assert!(!analysis.void_model);
        assert_eq!(analysis.core, vec!["Root", "A"]);
        assert_eq!(analysis.dead, vec!["B", "X"]);
        assert_eq!(analysis.false_optional, vec!["A"]);
        assert!(analysis.constraint_attributes.is_empty());
    }

    #[test]
    fn test_constraint_attributes() {
        let mut fm = sample();
        fm.add_constraint(Formula::or([Formula::var("A"), Formula::not(Formula::var("A"))])).unwrap();
        fm.add_constraint(Formula::requires("X", "C")).unwrap();
        fm.add_constraint(Formula::excludes("Root", "B")).unwrap();

        let attributes = analyze_constraints(&mut fm, &AnalysisOptions::all(), &NullMonitor).unwrap();
        assert_eq!(
            attributes,
            vec![
                ConstraintAttribute::Tautology,
                ConstraintAttribute::Redundant,
                ConstraintAttribute::Dead,
            ]
        );
        assert_eq!(fm.constraints()[2].attribute(), ConstraintAttribute::Dead);
    }

    #[test]
    fn test_timed_out_query_gives_no_verdict() {
        // Root(and){X, A, B}. Without the second constraint, refuting X needs
        // a conflict, which a zero budget does not allow.
        let (mut fm, root) = FeatureModel::with_root("Root").unwrap();
        for name in ["X", "A", "B"] {
            fm.add_feature(root, name, false).unwrap();
        }
        let lit = |name: &str, positive: bool| {
            if positive {
                Formula::var(name)
            } else {
                Formula::not(Formula::var(name))
            }
        };
        let contradiction = Formula::and(
            [(true, true), (true, false), (false, true), (false, false)]
                .map(|(a, b)| Formula::or([lit("A", a), lit("B", b)])),
        );
        fm.add_constraint(Formula::implies(Formula::var("X"), contradiction)).unwrap();
        fm.add_constraint(Formula::not(Formula::var("X"))).unwrap();

        let options = AnalysisOptions::all().with_solver(SolverConfig::default().with_conflict_limit(0));
        let attributes = analyze_constraints(&mut fm, &options, &NullMonitor).unwrap();
        assert_eq!(attributes, vec![ConstraintAttribute::Redundant, ConstraintAttribute::Normal]);

        // With enough budget, removing the second constraint no longer hides
        // that X is dead, so neither verdict changes.
        let attributes = analyze_constraints(&mut fm, &AnalysisOptions::all(), &NullMonitor).unwrap();
        assert_eq!(attributes, vec![ConstraintAttribute::Redundant, ConstraintAttribute::Normal]);
    }

    #[test]
    fn test_void_model_constraints() {
        let mut fm = sample();
        fm.add_constraint(Formula::requires("Root", "A")).unwrap();
        fm.add_constraint(Formula::excludes("Root", "A")).unwrap();

        let analyzer = FeatureAnalyzer::new(&fm, AnalysisOptions::all()).unwrap();
        let analysis = analyzer.analyze(&NullMonitor).unwrap();
        assert!(analysis.void_model);
        assert!(analysis.dead.is_empty());
        assert_eq!(
            analysis.constraint_attributes,
            vec![ConstraintAttribute::VoidModel, ConstraintAttribute::VoidModel]
        );
        // analyze() does not write attributes.
        assert_eq!(fm.constraints()[0].attribute(), ConstraintAttribute::Normal);
    }

    #[test]
    fn test_false_optional_constraint() {
        let mut fm = sample();
        fm.add_constraint(Formula::requires("Root", "A")).unwrap();
        fm.add_constraint(Formula::requires("B", "A")).unwrap();
        fm.add_constraint(Formula::requires("B", "A")).unwrap();
        let attributes = analyze_constraints(&mut fm, &AnalysisOptions::all(), &NullMonitor).unwrap();
        assert_eq!(
            attributes,
            vec![
                ConstraintAttribute::FalseOptional,
                ConstraintAttribute::Redundant,
                ConstraintAttribute::Redundant,
            ]
        );
    }

    #[test]
    fn test_unsatisfiable_constraint() {
        let mut fm = sample();
        fm.add_constraint(Formula::and([Formula::var("A"), Formula::not(Formula::var("A"))]))
            .unwrap();
        let attributes = analyze_constraints(&mut fm, &AnalysisOptions::all(), &NullMonitor).unwrap();
        assert_eq!(attributes, vec![ConstraintAttribute::Unsatisfiable]);
    }

    #[test]
    fn test_implicit_constraints() {
        let mut origin = sample();
        origin.add_constraint(Formula::requires("A", "B")).unwrap();

        let mut sliced = origin.clone();
        sliced.add_constraint(Formula::or([Formula::not(Formula::var("A")), Formula::var("B")]))
            .unwrap();
        sliced.add_constraint(Formula::requires("X", "A")).unwrap();

        assert_eq!(implicit_constraints(&sliced, &origin).unwrap(), vec![2]);
        assert_eq!(mark_implicit_constraints(&mut sliced, &origin).unwrap(), 1);
        assert_eq!(sliced.constraints()[2].attribute(), ConstraintAttribute::Implicit);
        assert_eq!(sliced.constraints()[1].attribute(), ConstraintAttribute::Normal);
    }
}
