//! Existential elimination of variables from a CNF.
//!
//! Variables are removed one at a time by clause distribution (resolution on
//! the variable), cheapest first, where the cost of a variable is the growth
//! in clause count its elimination would cause: `pos * neg - pos - neg`.
//!
//! Clause growth is held back in two ways:
//!
//! - forward and backward subsumption on every insertion,
//! - a SAT-based redundancy sweep once the clause database grows past
//!   [`SlicerConfig::redundancy_check_threshold`].
//!
//! The slicer is a pure function of its inputs. A timeout in a redundancy
//! check keeps the clause and marks the slice as incomplete, meaning "not
//! fully reduced"; the sliced formula is equivalent to the projection either way.

use crate::clause::Clause;
use crate::cnf::Cnf;
use crate::error::{Error, Result};
use crate::monitor::Monitor;
use crate::sat::{SatResult, SatSolver, SolverConfig};
use crate::types::{Lit, Var};
use crate::variables::Variables;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlicerConfig {
    /// Clause count above which redundant clauses are pruned with the SAT oracle.
    pub redundancy_check_threshold: usize,
    /// Solver used for redundancy checks.
    pub solver: SolverConfig,
}

impl Default for SlicerConfig {
    fn default() -> Self {
        Self {
            redundancy_check_threshold: 1000,
            solver: SolverConfig::default().with_conflict_limit(10_000),
        }
    }
}

impl SlicerConfig {
    pub fn with_redundancy_check_threshold(mut self, threshold: usize) -> Self {
        self.redundancy_check_threshold = threshold;
        self
    }

    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlicerStats {
    pub eliminated: usize,
    pub resolvents: usize,
    pub subsumed: usize,
    pub redundant: usize,
    pub timeouts: usize,
}

/// Result of [`CnfSlicer::slice`].
#[derive(Debug, Clone)]
pub struct CnfSlice {
    cnf: Cnf,
    complete: bool,
    stats: SlicerStats,
}

impl CnfSlice {
    pub(crate) fn complete(cnf: Cnf) -> Self {
        Self {
            cnf,
            complete: true,
            stats: SlicerStats::default(),
        }
    }

    pub fn cnf(&self) -> &Cnf {
        &self.cnf
    }

    pub fn into_cnf(self) -> Cnf {
        self.cnf
    }

    /// `false` if some redundancy check timed out.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn stats(&self) -> &SlicerStats {
        &self.stats
    }
}

/// Clause database with per-literal occurrence lists.
///
/// Removed clauses stay in place as tombstones, occurrence lists are filtered
/// lazily.
struct ClauseDb {
    num_vars: usize,
    clauses: Vec<Clause>,
    live: Vec<bool>,
    occurrences: Vec<Vec<usize>>,
    num_live: usize,
    has_empty: bool,
}

impl ClauseDb {
    fn new(num_vars: usize) -> Self {
        Self {
            num_vars,
            clauses: Vec::new(),
            live: Vec::new(),
            occurrences: vec![Vec::new(); 2 * num_vars],
            num_live: 0,
            has_empty: false,
        }
    }

    fn occurrences(&self, lit: Lit) -> impl Iterator<Item = usize> + '_ {
        self.occurrences[lit.code()].iter().copied().filter(|&idx| self.live[idx])
    }

    fn count(&self, lit: Lit) -> i64 {
        self.occurrences(lit).count() as i64
    }

    fn cost(&self, var: Var) -> i64 {
        let pos = self.count(var.pos());
        let neg = self.count(var.neg());
        pos * neg - pos - neg
    }

    fn live_ids(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.clauses.len()).filter(|&idx| self.live[idx])
    }

    fn remove(&mut self, idx: usize) {
        if self.live[idx] {
            self.live[idx] = false;
            self.num_live -= 1;
        }
    }

    fn is_subsumed(&self, clause: &Clause) -> bool {
        clause
            .iter()
            .any(|lit| self.occurrences(lit).any(|idx| self.clauses[idx].subsumes(clause)))
    }

    /// Inserts a non-tautological clause unless an existing one subsumes it,
    /// removing the clauses it subsumes in turn.
    fn insert(&mut self, clause: Clause, stats: &mut SlicerStats) {
        if self.has_empty {
            return;
        }
        if clause.is_empty() {
            self.has_empty = true;
            return;
        }
        if self.is_subsumed(&clause) {
            stats.subsumed += 1;
            return;
        }
        // Any clause subsumed by `clause` contains its first literal.
        let subsumed: Vec<usize> = self
            .occurrences(clause.lits()[0])
            .filter(|&idx| clause.subsumes(&self.clauses[idx]))
            .collect();
        stats.subsumed += subsumed.len();
        for idx in subsumed {
            self.remove(idx);
        }

        let idx = self.clauses.len();
        for lit in clause.iter() {
            self.occurrences[lit.code()].push(idx);
        }
        self.clauses.push(clause);
        self.live.push(true);
        self.num_live += 1;
    }
}

#[derive(Debug, Clone, Default)]
pub struct CnfSlicer {
    config: SlicerConfig,
}

impl CnfSlicer {
    pub fn new(config: SlicerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SlicerConfig {
        &self.config
    }

    /// Projects `cnf` onto the variables named in `keep`.
    ///
    /// The result ranges over `cnf`'s registry restricted to `keep` (original
    /// order), and its models are exactly the restrictions of `cnf`'s models.
    pub fn slice(&self, cnf: &Cnf, keep: &Variables, monitor: &dyn Monitor) -> Result<CnfSlice> {
        let source = cnf.variables();
        if let Some(unknown) = keep.names().find(|name| !source.contains(name)) {
            return Err(Error::UnknownFeature(unknown.to_string()));
        }
        let target = source.restrict(|name| keep.contains(name));
        let mut pending: Vec<Var> = source
            .vars()
            .filter(|&var| source.name(var).is_some_and(|name| !keep.contains(name)))
            .collect();

        monitor.set_task_name("Slicing CNF");
        monitor.set_remaining_work(pending.len() as u64);

        let mut stats = SlicerStats::default();
        let mut db = ClauseDb::new(source.len());
        for clause in cnf.clauses() {
            if !clause.is_tautology() {
                db.insert(clause.clone(), &mut stats);
            }
        }

        let mut complete = true;
        let mut last_sweep = db.num_live;
        while !pending.is_empty() && !db.has_empty {
            monitor.check_cancel()?;

            let Some(position) = (0..pending.len()).min_by_key(|&i| (db.cost(pending[i]), pending[i])) else {
                break;
            };
            let var = pending.swap_remove(position);
            self.eliminate(&mut db, var, &mut stats);
            monitor.step();

            if db.num_live > self.config.redundancy_check_threshold && db.num_live >= 2 * last_sweep {
                complete &= self.remove_redundant(&mut db, &mut stats, monitor)?;
                last_sweep = db.num_live;
            }
        }
        monitor.check_cancel()?;

        let clauses = if db.has_empty {
            vec![Clause::default()]
        } else {
            db.live_ids()
                .map(|idx| source.adapt_clause(&db.clauses[idx], &target))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| Error::MalformedFormula("eliminated variable left in sliced clauses".to_string()))?
        };

        log::debug!(
            "Sliced CNF from {} to {} variables: {} -> {} clauses ({:?})",
            source.len(),
            target.len(),
            cnf.num_clauses(),
            clauses.len(),
            stats
        );

        Ok(CnfSlice {
            cnf: Cnf::new(target, clauses)?,
            complete,
            stats,
        })
    }

    fn eliminate(&self, db: &mut ClauseDb, var: Var, stats: &mut SlicerStats) {
        let pos: Vec<usize> = db.occurrences(var.pos()).collect();
        let neg: Vec<usize> = db.occurrences(var.neg()).collect();

        let mut resolvents = Vec::with_capacity(pos.len() * neg.len());
        for &p in &pos {
            for &n in &neg {
                if let Some(resolvent) = db.clauses[p].resolve(&db.clauses[n], var) {
                    resolvents.push(resolvent);
                }
            }
        }
        stats.resolvents += resolvents.len();

        for idx in pos.into_iter().chain(neg) {
            db.remove(idx);
        }
        for resolvent in resolvents {
            db.insert(resolvent, stats);
        }
        stats.eliminated += 1;
    }

    /// Removes every clause implied by the others, longest first.
    ///
    /// Returns `false` if some check timed out.
    fn remove_redundant(&self, db: &mut ClauseDb, stats: &mut SlicerStats, monitor: &dyn Monitor) -> Result<bool> {
        let mut ids: Vec<usize> = db.live_ids().collect();
        ids.sort_by_key(|&idx| std::cmp::Reverse(db.clauses[idx].len()));
        log::debug!("Checking {} clauses for redundancy", ids.len());

        let mut complete = true;
        for idx in ids {
            monitor.check_cancel()?;
            let mut solver = SatSolver::with_vars(db.num_vars, self.config.solver.clone());
            for other in db.live_ids().filter(|&other| other != idx) {
                solver.add_clause(&db.clauses[other]);
            }
            match solver.check_implied(&db.clauses[idx]) {
                SatResult::Unsatisfiable => {
                    db.remove(idx);
                    stats.redundant += 1;
                }
                SatResult::Timeout => {
                    complete = false;
                    stats.timeouts += 1;
                }
                SatResult::Satisfiable(_) => {}
            }
        }
        Ok(complete)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::monitor::{NullMonitor, ProgressMonitor};

    fn cnf(names: &[&str], clauses: &[&[i32]]) -> Cnf {
        let vars = Variables::from_names(names.iter().copied()).unwrap();
        let clauses = clauses.iter().map(|c| Clause::from_dimacs(c.iter().copied())).collect();
        Cnf::new(vars, clauses).unwrap()
    }

    fn keep(names: &[&str]) -> Variables {
        Variables::from_names(names.iter().copied()).unwrap()
    }

    /// Projection of the models of `cnf` onto `names`, as sorted name lists.
    fn projection(cnf: &Cnf, names: &[&str]) -> Vec<Vec<String>> {
        let n = cnf.num_vars();
        let mut result: Vec<Vec<String>> = (0..1u32 << n)
            .map(|bits| (0..n).map(|i| bits >> i & 1 == 1).collect::<Vec<bool>>())
            .filter(|a| cnf.is_satisfied_by(a))
            .map(|a| {
                cnf.variables()
                    .selected_names(&a)
                    .into_iter()
                    .filter(|name| names.contains(name))
                    .map(str::to_string)
                    .collect()
            })
            .collect();
        result.sort();
        result.dedup();
        result
    }

    fn dimacs(cnf: &Cnf) -> Vec<Vec<i32>> {
        cnf.clauses().iter().map(|c| c.to_dimacs()).collect()
    }

    #[test]
    fn test_removing_disjunct_frees_remaining() {
        // {A | B} sliced to {A}: A is not forced.
        let f = cnf(&["A", "B"], &[&[1, 2]]);
        let slice = CnfSlicer::default().slice(&f, &keep(&["A"]), &NullMonitor).unwrap();
        assert!(slice.is_complete());
        assert!(slice.cnf().clauses().is_empty());
        assert_eq!(slice.cnf().variables().names().collect::<Vec<_>>(), vec!["A"]);
    }

    #[test]
    fn test_chain_is_preserved() {
        // A => B, B => C  sliced to {A, C}  gives  A => C
        let f = cnf(&["A", "B", "C"], &[&[-1, 2], &[-2, 3]]);
        let slice = CnfSlicer::default().slice(&f, &keep(&["A", "C"]), &NullMonitor).unwrap();
        assert_eq!(dimacs(slice.cnf()), vec![vec![-1, 2]]);
        assert_eq!(slice.stats().eliminated, 1);
    }

    #[test]
    fn test_tautological_resolvents_dropped() {
        // (A | B) & (-A | -B) sliced to {} yields nothing.
        let f = cnf(&["A", "B"], &[&[1, 2], &[-1, -2]]);
        let slice = CnfSlicer::default().slice(&f, &keep(&["B"]), &NullMonitor).unwrap();
        assert!(slice.cnf().clauses().is_empty());
    }

    #[test]
    fn test_unsatisfiable_stays_unsatisfiable() {
        let f = cnf(&["A", "B"], &[&[1], &[-1, 2], &[-2]]);
        let slice = CnfSlicer::default().slice(&f, &keep(&[]), &NullMonitor).unwrap();
        assert_eq!(dimacs(slice.cnf()), vec![Vec::<i32>::new()]);
    }

    #[test]
    fn test_original_untouched() {
        let f = cnf(&["A", "B", "C"], &[&[-1, 2], &[-2, 3]]);
        let before = f.clone();
        CnfSlicer::default().slice(&f, &keep(&["A"]), &NullMonitor).unwrap();
        assert_eq!(f, before);
    }

    #[test]
    fn test_unknown_keep_name() {
        let f = cnf(&["A"], &[&[1]]);
        let err = CnfSlicer::default().slice(&f, &keep(&["Z"]), &NullMonitor).unwrap_err();
        assert_eq!(err, Error::UnknownFeature("Z".to_string()));
    }

    #[test]
    fn test_projection_matches_brute_force() {
        let names = ["A", "B", "C", "D", "E"];
        let f = cnf(
            &names,
            &[&[1, 2, -3], &[-1, 4], &[-2, 4, 5], &[3, -5], &[-4, -5, 1], &[2, 3]],
        );
        for kept in [&["A", "D"][..], &["B", "E"], &["A", "C", "E"], &["C"]] {
            let config = SlicerConfig::default().with_redundancy_check_threshold(0);
            let slice = CnfSlicer::new(config).slice(&f, &keep(kept), &NullMonitor).unwrap();
            assert_eq!(projection(slice.cnf(), kept), projection(&f, kept), "kept {:?}", kept);
        }
    }

    #[test]
    fn test_cancellation() {
        let f = cnf(&["A", "B", "C"], &[&[-1, 2], &[-2, 3]]);
        let monitor = ProgressMonitor::new();
        monitor.cancel();
        let err = CnfSlicer::default().slice(&f, &keep(&["A"]), &monitor).unwrap_err();
        assert_eq!(err, Error::Cancelled);
    }
}
