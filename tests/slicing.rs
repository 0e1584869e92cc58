//! Semantic tests for feature model slicing.
//!
//! Small models are compared against brute-force enumeration of all
//! assignments, so every property here is checked exactly.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use fmslice_rs::clause::Clause;
use fmslice_rs::cnf::Cnf;
use fmslice_rs::cnf_slicer::{CnfSlicer, SlicerConfig};
use fmslice_rs::encoder;
use fmslice_rs::error::Error;
use fmslice_rs::formula::Formula;
use fmslice_rs::model::{FeatureModel, GroupKind};
use fmslice_rs::monitor::{Monitor, NullMonitor};
use fmslice_rs::sat::{SatSolver, SolverConfig};
use fmslice_rs::slicer::{slice_feature_model, FeatureModelSlicer, SliceOptions, SLICING_ROOT_NAME};
use fmslice_rs::variables::Variables;

// ─── Helpers ───────────────────────────────────────────────────────────────────

fn solutions(cnf: &Cnf) -> Vec<Vec<bool>> {
    let n = cnf.num_vars();
    (0..1u64 << n)
        .map(|bits| (0..n).map(|i| bits >> i & 1 == 1).collect::<Vec<bool>>())
        .filter(|assignment| cnf.is_satisfied_by(assignment))
        .collect()
}

/// All valid configurations of `cnf` restricted to `names`, in that order.
fn projection(cnf: &Cnf, names: &[String]) -> BTreeSet<Vec<bool>> {
    let indices: Vec<usize> = names
        .iter()
        .map(|name| cnf.variables().var(name).unwrap().index())
        .collect();
    solutions(cnf)
        .into_iter()
        .map(|assignment| indices.iter().map(|&i| assignment[i]).collect())
        .collect()
}

/// Random tree of 6 to 10 features with random groups, some mandatory
/// children, and up to two cross-tree constraints.
fn random_model(seed: u64) -> FeatureModel {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let (mut fm, root) = FeatureModel::with_root("F0").unwrap();
    let mut ids = vec![root];
    let n = rng.gen_range(6..=10);
    for i in 1..n {
        let parent = ids[rng.gen_range(0..ids.len())];
        let id = fm.add_feature(parent, format!("F{}", i), rng.gen_bool(0.3)).unwrap();
        ids.push(id);
    }
    for &id in &ids {
        let group = match rng.gen_range(0..3) {
            0 => GroupKind::And,
            1 => GroupKind::Or,
            _ => GroupKind::Alternative,
        };
        fm.set_group(id, group);
    }
    for _ in 0..rng.gen_range(0..=2) {
        let a = format!("F{}", rng.gen_range(1..n));
        let b = format!("F{}", rng.gen_range(1..n));
        if a == b {
            continue;
        }
        let formula = if rng.gen_bool(0.5) {
            Formula::requires(a, b)
        } else {
            Formula::excludes(a, b)
        };
        fm.add_constraint(formula).unwrap();
    }
    fm
}

fn random_selection(model: &FeatureModel, seed: u64) -> Vec<String> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_mul(31).wrapping_add(7));
    model
        .feature_names()
        .into_iter()
        .filter(|_| rng.gen_bool(0.5))
        .map(str::to_string)
        .collect()
}

/// Root(and){ A(or){B, C}, D(mandatory) }
fn scenario_model() -> FeatureModel {
    let (mut fm, root) = FeatureModel::with_root("Root").unwrap();
    let a = fm.add_feature(root, "A", false).unwrap();
    fm.set_group(a, GroupKind::Or);
    fm.add_feature(a, "B", false).unwrap();
    fm.add_feature(a, "C", false).unwrap();
    fm.add_feature(root, "D", true).unwrap();
    fm
}

/// Becomes cancelled after `budget` cancellation checks.
struct CountdownMonitor {
    budget: AtomicUsize,
    cancelled: AtomicBool,
}

impl CountdownMonitor {
    fn new(budget: usize) -> Self {
        Self {
            budget: AtomicUsize::new(budget),
            cancelled: AtomicBool::new(false),
        }
    }
}

impl Monitor for CountdownMonitor {
    fn is_cancelled(&self) -> bool {
        let exhausted = self
            .budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |b| b.checked_sub(1))
            .is_err();
        if exhausted {
            self.cancel();
        }
        self.cancelled.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

// ─── Scenarios ─────────────────────────────────────────────────────────────────

#[test]
fn or_group_losing_a_child() {
    let fm = scenario_model();
    let sliced = slice_feature_model(&fm, ["Root", "A", "B", "D"], SliceOptions::default(), &NullMonitor).unwrap();

    assert_eq!(sliced.feature_names(), vec![SLICING_ROOT_NAME, "Root", "A", "B", "D"]);
    let a = sliced.find("A").unwrap();
    assert_eq!(sliced.feature(a).group(), GroupKind::And);
    // C alone satisfied the or-group, so B must stay optional.
    assert!(!sliced.feature(sliced.find("B").unwrap()).is_mandatory());
    assert!(sliced.feature(sliced.find("D").unwrap()).is_mandatory());
    assert!(sliced.find("C").is_none());

    let root = sliced.find("Root").unwrap();
    assert_eq!(sliced.parent(root), sliced.root());
    assert_eq!(sliced.feature(root).group(), GroupKind::And);
    assert!(sliced.constraints().is_empty());
}

#[test]
fn alternative_group_losing_a_child() {
    // Root(and){ P(alt){X, Y, Z} }
    let (mut fm, root) = FeatureModel::with_root("Root").unwrap();
    let p = fm.add_feature(root, "P", false).unwrap();
    fm.set_group(p, GroupKind::Alternative);
    fm.add_feature(p, "X", false).unwrap();
    fm.add_feature(p, "Y", false).unwrap();
    fm.add_feature(p, "Z", false).unwrap();

    let sliced = slice_feature_model(&fm, ["Root", "P", "X", "Z"], SliceOptions::default(), &NullMonitor).unwrap();

    assert_eq!(sliced.feature_names(), vec![SLICING_ROOT_NAME, "Root", "P", "Abstract_0", "X", "Z"]);
    let p = sliced.find("P").unwrap();
    assert_eq!(sliced.feature(p).group(), GroupKind::And);
    assert!(!sliced.feature(p).is_mandatory());

    let pseudo = sliced.find("Abstract_0").unwrap();
    assert_eq!(sliced.parent(pseudo), Some(p));
    assert_eq!(sliced.feature(pseudo).group(), GroupKind::Alternative);
    assert!(sliced.feature(pseudo).is_abstract());
    assert!(!sliced.feature(pseudo).is_mandatory());
    assert!(sliced.constraints().is_empty());
}

#[test]
fn eliminated_disjunct_is_not_forced() {
    let vars = Variables::from_names(["A", "B"]).unwrap();
    let keep = Variables::from_names(["A"]).unwrap();
    let slicer = CnfSlicer::new(SlicerConfig::default());

    let cnf = Cnf::new(vars.clone(), vec![Clause::from_dimacs([1, 2])]).unwrap();
    let sliced = slicer.slice(&cnf, &keep, &NullMonitor).unwrap();
    assert!(sliced.is_complete());
    assert_eq!(solutions(sliced.cnf()).len(), 2);

    // With another clause forcing A, the slice forces it too.
    let cnf = Cnf::new(vars, vec![Clause::from_dimacs([1, 2]), Clause::from_dimacs([1, -2])]).unwrap();
    let sliced = slicer.slice(&cnf, &keep, &NullMonitor).unwrap();
    assert_eq!(solutions(sliced.cnf()), vec![vec![true]]);
}

// ─── Structural Properties ─────────────────────────────────────────────────────

#[test]
fn groups_are_closed_and_names_unique() {
    for seed in 0..40 {
        let fm = random_model(seed);
        let selection = random_selection(&fm, seed);
        let sliced = slice_feature_model(&fm, &selection, SliceOptions::default(), &NullMonitor).unwrap();

        sliced.validate().unwrap();
        sliced.validate_groups().unwrap();

        let names = sliced.feature_names();
        let unique: BTreeSet<&str> = names.iter().copied().collect();
        assert_eq!(unique.len(), names.len(), "seed {}: duplicate names", seed);
        for name in &selection {
            assert!(sliced.contains_name(name), "seed {}: lost selected feature {}", seed, name);
        }
    }
}

#[test]
fn strict_merge_agrees_with_lenient_merge() {
    for seed in 0..20 {
        let fm = random_model(seed);
        let selection = random_selection(&fm, seed);
        let lenient = slice_feature_model(&fm, &selection, SliceOptions::default(), &NullMonitor).unwrap();
        let strict = slice_feature_model(
            &fm,
            &selection,
            SliceOptions::default().with_strict_merge(true),
            &NullMonitor,
        )
        .unwrap();
        assert_eq!(lenient.to_string(), strict.to_string());
    }
}

#[test]
fn reslicing_onto_all_features_changes_nothing() {
    for seed in 0..20 {
        let fm = random_model(seed);
        let selection = random_selection(&fm, seed);
        let sliced = slice_feature_model(&fm, &selection, SliceOptions::default(), &NullMonitor).unwrap();

        let all: Vec<String> = sliced.feature_names().into_iter().map(str::to_string).collect();
        let slicer = FeatureModelSlicer::new(&sliced, &all, SliceOptions::default()).unwrap();
        let (_, stats) = slicer.slice_tree(&NullMonitor).unwrap();
        assert_eq!(stats.removed, 0);
        assert_eq!(stats.dissolved, 0);
        assert_eq!(stats.abstract_features, 0);
    }
}

// ─── Semantics ─────────────────────────────────────────────────────────────────

#[test]
fn slice_is_exact_projection() {
    for seed in 0..40 {
        let fm = random_model(seed);
        let selection = random_selection(&fm, seed);
        let sliced = slice_feature_model(&fm, &selection, SliceOptions::default(), &NullMonitor).unwrap();

        let expected = projection(&encoder::encode(&fm).unwrap(), &selection);
        let actual = projection(&encoder::encode(&sliced).unwrap(), &selection);
        assert_eq!(actual, expected, "seed {}: projection differs\n{}\n{}", seed, fm, sliced);
    }
}

#[test]
fn slice_of_void_model_is_void() {
    let (mut fm, root) = FeatureModel::with_root("Root").unwrap();
    fm.add_feature(root, "A", true).unwrap();
    fm.add_feature(root, "B", true).unwrap();
    fm.add_constraint(Formula::excludes("A", "B")).unwrap();

    let sliced = slice_feature_model(&fm, ["A"], SliceOptions::default(), &NullMonitor).unwrap();
    assert!(solutions(&encoder::encode(&sliced).unwrap()).is_empty());
}

#[test]
fn reconciliation_adds_only_missing_clauses() {
    for seed in 0..30 {
        let fm = random_model(seed);
        let selection = random_selection(&fm, seed);
        let slicer = FeatureModelSlicer::new(&fm, &selection, SliceOptions::default()).unwrap();

        let formula = slicer.slice_formula(&NullMonitor).unwrap();
        let (tree, _) = slicer.slice_tree(&NullMonitor).unwrap();
        let tree_cnf = encoder::encode(&tree).unwrap();

        let mut reconciled = tree.clone();
        let (added, timeouts) = slicer.reconcile(&mut reconciled, formula.cnf(), &NullMonitor).unwrap();
        assert_eq!(timeouts, 0);
        assert_eq!(reconciled.constraints().len(), tree.constraints().len() + added);

        let mut solver = SatSolver::new(&tree_cnf, SolverConfig::default());
        for constraint in &reconciled.constraints()[tree.constraints().len()..] {
            let clauses = constraint.formula().to_clauses(tree_cnf.variables()).unwrap();
            assert_eq!(clauses.len(), 1);
            assert!(!solver.implies(&clauses[0]), "seed {}: redundant constraint {}", seed, constraint.formula());
        }
    }
}

// ─── Cancellation ──────────────────────────────────────────────────────────────

#[test]
fn cancelled_slice_leaves_input_untouched() {
    let fm = random_model(3);
    let before = fm.to_string();
    let selection = random_selection(&fm, 3);

    let mut cancelled = 0;
    for budget in 0..40 {
        let monitor = CountdownMonitor::new(budget);
        match slice_feature_model(&fm, &selection, SliceOptions::default(), &monitor) {
            Ok(sliced) => sliced.validate().unwrap(),
            Err(err) => {
                assert_eq!(err, Error::Cancelled);
                cancelled += 1;
            }
        }
        assert_eq!(fm.to_string(), before);
    }
    assert!(cancelled > 0);
}
