//! Feature-model slicing.
//!
//! Slicing projects a feature model onto a subset of its features: the result
//! is a new, independent model whose configurations, restricted to the selected
//! features, are exactly the restrictions of the original configurations.
//!
//! The work is split into independent halves that are reconciled at the end:
//!
//! 1. The model's formula is sliced with the [`CnfSlicer`]; the result is the
//!    exact projection.
//! 2. The feature tree is sliced structurally on a private clone:
//!    - **mark**: features outside the selection are flagged unselected and the
//!      original root is wrapped under a synthetic abstract root;
//!    - **cut** (bottom-up): unselected subtrees without surviving selected
//!      features are detached and the remaining groups are repaired;
//!    - **merge** (repeated to a fixpoint): unselected shells that survived
//!      the cut are dissolved into their parents wherever that keeps the group
//!      semantics; the remaining shells become `Abstract_<n>` features.
//! 3. **Reconciliation**: every clause of the sliced formula that the sliced
//!    tree does not already imply is added as a cross-tree constraint.
//!
//! Structural repairs only ever weaken the tree relative to the projection, so
//! the reconciled model is exact (up to solver timeouts, which are resolved by
//! keeping the clause).

use rustc_hash::FxHashSet;

use crate::cnf::Cnf;
use crate::cnf_slicer::{CnfSlice, CnfSlicer, SlicerConfig};
use crate::encoder;
use crate::error::{Error, Result};
use crate::formula::Formula;
use crate::model::{FeatureId, FeatureModel, GroupKind};
use crate::monitor::Monitor;
use crate::sat::{SatResult, SatSolver, SolverConfig};
use crate::utils::{next_free_index, unique_name};

pub const SLICING_ROOT_NAME: &str = "__Root__";
pub const ABSTRACT_PREFIX: &str = "Abstract_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceOptions {
    /// Copy original constraints that only mention selected features.
    pub consider_constraints: bool,
    /// Fail on a structural error during the merge pass instead of stopping
    /// dissolution for the affected subtree.
    pub strict_merge: bool,
    /// Solver for the reconciliation pass.
    pub solver: SolverConfig,
    /// Configuration of the formula slicer.
    pub slicer: SlicerConfig,
}

impl Default for SliceOptions {
    fn default() -> Self {
        Self {
            consider_constraints: true,
            strict_merge: false,
            solver: SolverConfig::default().with_conflict_limit(100_000),
            slicer: SlicerConfig::default(),
        }
    }
}

impl SliceOptions {
    pub fn with_consider_constraints(mut self, value: bool) -> Self {
        self.consider_constraints = value;
        self
    }

    pub fn with_strict_merge(mut self, value: bool) -> Self {
        self.strict_merge = value;
        self
    }

    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_slicer(mut self, slicer: SlicerConfig) -> Self {
        self.slicer = slicer;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SliceStats {
    /// Features detached by the cut pass.
    pub removed: usize,
    /// Unselected shells dissolved by the merge pass.
    pub dissolved: usize,
    /// Number of merge sweeps until the fixpoint.
    pub sweeps: usize,
    /// Shells kept as `Abstract_<n>` features.
    pub abstract_features: usize,
    /// Original constraints copied verbatim.
    pub copied_constraints: usize,
    /// Constraints added by reconciliation.
    pub added_constraints: usize,
    /// Reconciliation checks that timed out (the clause was kept).
    pub timeouts: usize,
    /// `false` if the formula slice was not fully reduced.
    pub formula_complete: bool,
}

#[derive(Debug, Clone)]
pub struct SliceResult {
    pub model: FeatureModel,
    pub stats: SliceStats,
}

/// Slices `model` down to the features named in `selected`.
pub fn slice_feature_model<S: AsRef<str>>(
    model: &FeatureModel,
    selected: impl IntoIterator<Item = S>,
    options: SliceOptions,
    monitor: &dyn Monitor,
) -> Result<FeatureModel> {
    let slicer = FeatureModelSlicer::new(model, selected, options)?;
    Ok(slicer.execute(monitor)?.model)
}

#[derive(Debug, Clone)]
pub struct FeatureModelSlicer<'a> {
    model: &'a FeatureModel,
    formula: Option<&'a Cnf>,
    selected: FxHashSet<String>,
    options: SliceOptions,
}

impl<'a> FeatureModelSlicer<'a> {
    /// Validates the input: the model must have a root and every selected
    /// name must be one of its features.
    pub fn new<S: AsRef<str>>(
        model: &'a FeatureModel,
        selected: impl IntoIterator<Item = S>,
        options: SliceOptions,
    ) -> Result<Self> {
        model.validate()?;
        let mut names = FxHashSet::default();
        for name in selected {
            let name = name.as_ref();
            if model.find(name).is_none() {
                return Err(Error::UnknownFeature(name.to_string()));
            }
            names.insert(name.to_string());
        }
        Ok(Self {
            model,
            formula: None,
            selected: names,
            options,
        })
    }

    /// Uses `formula` as the semantics of the model instead of encoding it.
    pub fn with_formula(mut self, formula: &'a Cnf) -> Self {
        self.formula = Some(formula);
        self
    }

    pub fn options(&self) -> &SliceOptions {
        &self.options
    }

    pub fn is_selected(&self, name: &str) -> bool {
        self.selected.contains(name)
    }

    /// Runs all passes. The input model is never modified.
    pub fn execute(&self, monitor: &dyn Monitor) -> Result<SliceResult> {
        monitor.check_cancel()?;
        let sliced = self.slice_formula(monitor)?;
        monitor.check_cancel()?;
        let (mut model, mut stats) = self.slice_tree(monitor)?;
        monitor.check_cancel()?;
        let (added, timeouts) = self.reconcile(&mut model, sliced.cnf(), monitor)?;

        stats.added_constraints = added;
        stats.timeouts = timeouts;
        stats.formula_complete = sliced.is_complete();
        log::info!("Sliced model to {} features: {:?}", model.num_features(), stats);
        Ok(SliceResult { model, stats })
    }

    /// Projects the model's formula onto the selected features.
    pub fn slice_formula(&self, monitor: &dyn Monitor) -> Result<CnfSlice> {
        monitor.set_task_name("Slicing Feature Model Formula");
        let encoded;
        let formula = match self.formula {
            Some(formula) => formula,
            None => {
                encoded = encoder::encode(self.model)?;
                &encoded
            }
        };
        let keep = formula.variables().restrict(|name| self.selected.contains(name));
        CnfSlicer::new(self.options.slicer.clone()).slice(formula, &keep, monitor)
    }

    /// Structural passes: mark, cut, merge, and naming of the remaining shells.
    ///
    /// The returned model carries no constraints except the copied ones
    /// (when [`SliceOptions::consider_constraints`] is set).
    pub fn slice_tree(&self, monitor: &dyn Monitor) -> Result<(FeatureModel, SliceStats)> {
        monitor.set_task_name("Slicing Feature Tree");
        monitor.set_remaining_work(2);

        let mut tree = SliceTree::mark(self.model, &self.selected, self.options.strict_merge)?;
        monitor.check_cancel()?;
        tree.cut()?;
        loop {
            monitor.check_cancel()?;
            if tree.merge_sweep()? == 0 {
                break;
            }
        }
        monitor.step();

        let (mut model, mut stats) = tree.finish(self.model)?;
        if self.options.consider_constraints {
            for constraint in self.model.constraints() {
                let features = constraint.contained_features();
                if !features.is_empty() && features.iter().all(|name| self.selected.contains(*name)) {
                    model.add_constraint(constraint.formula().clone())?;
                    stats.copied_constraints += 1;
                }
            }
        }
        monitor.step();

        model.validate()?;
        model.validate_groups()?;
        Ok((model, stats))
    }

    /// Adds every clause of `sliced` not implied by the tree's own formula as
    /// a constraint on `tree`.
    ///
    /// A solver timeout keeps the clause. Returns the number of added
    /// constraints and the number of timeouts.
    pub fn reconcile(&self, tree: &mut FeatureModel, sliced: &Cnf, monitor: &dyn Monitor) -> Result<(usize, usize)> {
        monitor.set_task_name("Adding Constraints");
        let tree_cnf = encoder::encode(tree)?;
        let clauses = sliced.adapt_clause_list(tree_cnf.variables());
        monitor.set_remaining_work(clauses.len() as u64 + 1);

        let mut solver = SatSolver::new(&tree_cnf, self.options.solver.clone());
        monitor.step();

        let mut additions = Vec::new();
        let mut timeouts = 0;
        for clause in &clauses {
            monitor.check_cancel()?;
            match solver.check_implied(clause) {
                SatResult::Unsatisfiable => {}
                SatResult::Timeout => {
                    timeouts += 1;
                    additions.push(Formula::from_clause(clause, tree_cnf.variables())?);
                }
                SatResult::Satisfiable(_) => {
                    additions.push(Formula::from_clause(clause, tree_cnf.variables())?);
                }
            }
            monitor.step();
        }

        let added = additions.len();
        for formula in additions {
            tree.add_constraint(formula)?;
        }
        log::debug!(
            "Reconciliation added {} of {} sliced clauses ({} timeouts)",
            added,
            clauses.len(),
            timeouts
        );
        Ok((added, timeouts))
    }
}

/// Working state of the structural passes: a private clone of the model plus
/// the marks.
struct SliceTree {
    model: FeatureModel,
    root: FeatureId,
    /// Features outside the selection.
    unselected: FxHashSet<FeatureId>,
    /// Pseudo-alternative groups created by the cut.
    synthetic: FxHashSet<FeatureId>,
    strict: bool,
    stats: SliceStats,
    /// Makes every dissolve after the given count fail.
    #[cfg(test)]
    fail_after: Option<usize>,
}

impl SliceTree {
    fn mark(original: &FeatureModel, selected: &FxHashSet<String>, strict: bool) -> Result<Self> {
        let old_root = original.root().ok_or(Error::NoRoot)?;
        let mut model = original.clone();
        model.clear_constraints();

        let unselected: FxHashSet<FeatureId> = model
            .features()
            .into_iter()
            .filter(|&id| !selected.contains(model.name(id)))
            .collect();

        let root_name = unique_name(SLICING_ROOT_NAME, |name| model.contains_name(name));
        let root = model.create_feature(root_name)?;
        model.set_root(None)?;
        model.set_abstract(root, true);
        model.set_group(root, GroupKind::And);
        model.add_child(root, old_root)?;
        model.set_mandatory(old_root, true);
        model.set_root(Some(root))?;

        Ok(Self {
            model,
            root,
            unselected,
            synthetic: FxHashSet::default(),
            strict,
            stats: SliceStats::default(),
            #[cfg(test)]
            fail_after: None,
        })
    }

    fn cut(&mut self) -> Result<()> {
        self.cut_subtree(self.root)?;
        Ok(())
    }

    /// Returns `true` if the subtree at `id` is to be removed: `id` is
    /// unselected and none of its children survived.
    fn cut_subtree(&mut self, id: FeatureId) -> Result<bool> {
        let not_selected = self.unselected.contains(&id);
        let children = self.model.children(id).to_vec();
        if children.is_empty() {
            self.model.set_group(id, GroupKind::And);
            return Ok(not_selected);
        }

        let mut removed = Vec::new();
        for &child in &children {
            if self.cut_subtree(child)? {
                removed.push(child);
            }
        }
        for &child in &removed {
            self.model.remove_child(id, child)?;
            self.model.delete_subtree(child)?;
        }
        self.stats.removed += removed.len();

        let survivors = self.model.children(id).to_vec();
        if survivors.is_empty() {
            self.model.set_group(id, GroupKind::And);
            return Ok(not_selected);
        }

        match self.model.feature(id).group() {
            GroupKind::And => {}
            GroupKind::Or => {
                if !removed.is_empty() {
                    // A removed alternative can satisfy the group on its own.
                    self.model.set_group(id, GroupKind::And);
                    for &child in &survivors {
                        self.model.set_mandatory(child, false);
                    }
                } else if survivors.len() == 1 {
                    self.model.set_group(id, GroupKind::And);
                    self.model.set_mandatory(survivors[0], true);
                }
            }
            GroupKind::Alternative => {
                if !removed.is_empty() {
                    if survivors.len() == 1 {
                        self.model.set_group(id, GroupKind::And);
                        self.model.set_mandatory(survivors[0], false);
                    } else {
                        self.wrap_in_pseudo_alternative(id, &survivors)?;
                    }
                } else if survivors.len() == 1 {
                    self.model.set_group(id, GroupKind::And);
                    self.model.set_mandatory(survivors[0], true);
                }
            }
        }
        Ok(false)
    }

    /// Moves `survivors` under a new optional alternative group that becomes
    /// the only child of `id`, now an `And` group.
    fn wrap_in_pseudo_alternative(&mut self, id: FeatureId, survivors: &[FeatureId]) -> Result<()> {
        let name = unique_name("__Alternative__", |name| self.model.contains_name(name));
        let pseudo = self.model.create_feature(name)?;
        self.model.set_group(pseudo, GroupKind::Alternative);
        self.model.set_mandatory(pseudo, false);
        for &child in survivors {
            self.model.remove_child(id, child)?;
            self.model.add_child(pseudo, child)?;
        }
        self.model.set_group(id, GroupKind::And);
        self.model.add_child(id, pseudo)?;
        self.synthetic.insert(pseudo);
        Ok(())
    }

    /// One top-down sweep of the merge pass. Returns the number of dissolved shells.
    fn merge_sweep(&mut self) -> Result<usize> {
        let before = self.stats.dissolved;
        self.merge(self.root, None)?;
        self.stats.sweeps += 1;
        Ok(self.stats.dissolved - before)
    }

    fn merge(&mut self, id: FeatureId, parent_group: Option<GroupKind>) -> Result<()> {
        if !self.model.feature(id).has_children() {
            return Ok(());
        }
        let mut group = self.model.feature(id).group();
        let children = self.model.children(id).to_vec();
        for child in children {
            if let Err(err) = self.merge(child, Some(group)) {
                if self.strict {
                    return Err(err);
                }
                log::warn!("Merge below {} stopped: {}", self.model.name(id), err);
                break;
            }
            group = self.model.feature(id).group();
        }

        if !self.unselected.contains(&id) {
            return Ok(());
        }
        let (Some(parent_group), Some(parent)) = (parent_group, self.model.parent(id)) else {
            return Ok(());
        };

        let feature = self.model.feature(id);
        let children = feature.children().to_vec();
        let mandatory = feature.is_mandatory();

        if parent_group == group {
            self.dissolve(id)?;
            if parent_group == GroupKind::And && !mandatory {
                for child in children {
                    self.model.set_mandatory(child, false);
                }
            }
            return Ok(());
        }

        match (parent_group, group) {
            (GroupKind::And, GroupKind::Or | GroupKind::Alternative) => {
                // An optional shell may be deselected while the parent is
                // selected, which the promoted group could not express.
                if self.model.children(parent).len() == 1 && mandatory {
                    self.dissolve(id)?;
                    self.model.set_group(parent, group);
                }
            }
            (GroupKind::Or, GroupKind::And) => {
                if children.iter().all(|&c| !self.model.feature(c).is_mandatory()) {
                    // The shell alone satisfied the or-group, so after
                    // dissolving nothing below the parent is forced.
                    self.dissolve(id)?;
                    self.model.set_group(parent, GroupKind::And);
                    for sibling in self.model.children(parent).to_vec() {
                        self.model.set_mandatory(sibling, false);
                    }
                }
            }
            (GroupKind::Alternative, GroupKind::And) => {
                if children.len() == 1 && self.model.feature(children[0]).is_mandatory() {
                    self.dissolve(id)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn dissolve(&mut self, id: FeatureId) -> Result<()> {
        #[cfg(test)]
        if self.fail_after.is_some_and(|n| self.stats.dissolved >= n) {
            return Err(Error::InvalidStructure(format!("cannot dissolve {}", self.model.name(id))));
        }
        self.model.splice_into_parent(id)?;
        self.model.delete_subtree(id)?;
        self.unselected.remove(&id);
        self.stats.dissolved += 1;
        Ok(())
    }

    /// Names the remaining shells `Abstract_<n>` and compacts the arena.
    fn finish(mut self, original: &FeatureModel) -> Result<(FeatureModel, SliceStats)> {
        let mut next = next_free_index(
            ABSTRACT_PREFIX,
            original.features().into_iter().map(|id| original.name(id)),
        );

        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            stack.extend(self.model.children(id).iter().copied());
            if self.unselected.contains(&id) || self.synthetic.contains(&id) {
                // The counter wraps past u64::MAX; names still in the tree are skipped.
                let name = loop {
                    let candidate = format!("{}{}", ABSTRACT_PREFIX, next);
                    next = next.wrapping_add(1);
                    if !self.model.contains_name(&candidate) {
                        break candidate;
                    }
                };
                self.model.rename(id, name)?;
                self.model.set_abstract(id, true);
                self.stats.abstract_features += 1;
            }
        }

        log::debug!(
            "Tree slice: {} removed, {} dissolved in {} sweeps, {} abstract",
            self.stats.removed,
            self.stats.dissolved,
            self.stats.sweeps,
            self.stats.abstract_features
        );
        Ok((self.model.compacted(), self.stats))
    }
}
