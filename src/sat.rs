//! SAT oracle.
//!
//! A small DPLL solver with two-watched-literal unit propagation and
//! chronological backtracking. Every query has three outcomes, see
//! [`SatResult`]: the solver gives up with [`SatResult::Timeout`] once its
//! conflict budget or wall-clock limit from [`SolverConfig`] is exhausted.
//! Callers must pick a policy for that case explicitly.
//!
//! Given the same formula, configuration, and sequence of queries, results are
//! deterministic: the only source of randomness is a seeded ChaCha stream used
//! by [`Phase::Random`].

use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::clause::Clause;
use crate::cnf::Cnf;
use crate::types::{Lit, Var};

/// Polarity chosen for decision variables.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum Phase {
    #[default]
    Negative,
    Positive,
    Random,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverConfig {
    /// Maximum number of conflicts per query.
    pub conflict_limit: Option<u64>,
    /// Wall-clock limit per query.
    pub timeout: Option<Duration>,
    pub seed: u64,
    pub phase: Phase,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            conflict_limit: None,
            timeout: None,
            seed: 0,
            phase: Phase::Negative,
        }
    }
}

impl SolverConfig {
    pub fn with_conflict_limit(mut self, limit: u64) -> Self {
        self.conflict_limit = Some(limit);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }
}

/// A total assignment, indexed by [`Var::index`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model(Vec<bool>);

impl Model {
    pub fn new(values: Vec<bool>) -> Self {
        Self(values)
    }

    pub fn value(&self, var: Var) -> bool {
        self.0[var.index()]
    }

    pub fn satisfies(&self, lit: Lit) -> bool {
        self.value(lit.var()) == lit.is_positive()
    }

    /// The model as a list of literals, one per variable.
    pub fn lits(&self) -> impl Iterator<Item = Lit> + '_ {
        self.0
            .iter()
            .enumerate()
            .map(|(i, &value)| Var::new(i as u32 + 1).lit(value))
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SatResult {
    Satisfiable(Model),
    Unsatisfiable,
    Timeout,
}

impl SatResult {
    pub fn is_sat(&self) -> bool {
        matches!(self, SatResult::Satisfiable(_))
    }

    pub fn is_unsat(&self) -> bool {
        matches!(self, SatResult::Unsatisfiable)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SatResult::Timeout)
    }

    pub fn model(&self) -> Option<&Model> {
        match self {
            SatResult::Satisfiable(model) => Some(model),
            _ => None,
        }
    }

    pub fn into_model(self) -> Option<Model> {
        match self {
            SatResult::Satisfiable(model) => Some(model),
            _ => None,
        }
    }
}

/// Counters accumulated over all queries of a solver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolverStats {
    pub queries: u64,
    pub decisions: u64,
    pub conflicts: u64,
    pub propagations: u64,
    pub timeouts: u64,
}

#[derive(Debug, Clone, Copy)]
struct Level {
    trail_pos: usize,
    decision: Lit,
    flippable: bool,
}

#[derive(Debug, Clone)]
pub struct SatSolver {
    num_vars: usize,
    clauses: Vec<Vec<Lit>>,
    units: Vec<Lit>,
    has_empty_clause: bool,
    watches: Vec<Vec<usize>>,

    assign: Vec<Option<bool>>,
    trail: Vec<Lit>,
    levels: Vec<Level>,
    qhead: usize,

    config: SolverConfig,
    rng: ChaCha8Rng,
    stats: SolverStats,
}

impl SatSolver {
    pub fn new(cnf: &Cnf, config: SolverConfig) -> Self {
        let mut solver = Self::with_vars(cnf.num_vars(), config);
        for clause in cnf.clauses() {
            solver.add_clause(clause);
        }
        solver
    }

    pub fn with_vars(num_vars: usize, config: SolverConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            num_vars,
            clauses: Vec::new(),
            units: Vec::new(),
            has_empty_clause: false,
            watches: vec![Vec::new(); 2 * num_vars],
            assign: vec![None; num_vars],
            trail: Vec::with_capacity(num_vars),
            levels: Vec::new(),
            qhead: 0,
            config,
            rng,
            stats: SolverStats::default(),
        }
    }

    pub fn num_vars(&self) -> usize {
        self.num_vars
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    /// Adds a clause permanently. Tautologies are ignored.
    ///
    /// # Panics
    ///
    /// Panics if the clause mentions a variable beyond `num_vars`.
    pub fn add_clause(&mut self, clause: &Clause) {
        assert!(
            clause.iter().all(|lit| lit.var().index() < self.num_vars),
            "Clause {} mentions a variable beyond {}",
            clause,
            self.num_vars
        );
        if clause.is_tautology() {
            return;
        }
        match clause.len() {
            0 => self.has_empty_clause = true,
            1 => self.units.push(clause.lits()[0]),
            _ => {
                let idx = self.clauses.len();
                let lits = clause.lits().to_vec();
                self.watches[lits[0].code()].push(idx);
                self.watches[lits[1].code()].push(idx);
                self.clauses.push(lits);
            }
        }
    }

    pub fn solve(&mut self) -> SatResult {
        self.solve_with(&[])
    }

    /// Solves under the given assumptions (a cube).
    ///
    /// Contradictory assumptions yield [`SatResult::Unsatisfiable`].
    pub fn solve_with(&mut self, assumptions: &[Lit]) -> SatResult {
        self.stats.queries += 1;
        let result = self.search(assumptions);
        if result.is_timeout() {
            self.stats.timeouts += 1;
        }
        self.reset();
        result
    }

    /// Returns whether the formula implies `clause`, i.e. whether the
    /// formula together with the negated clause is unsatisfiable.
    ///
    /// Returns the raw query result: [`SatResult::Unsatisfiable`] means
    /// "implied", anything else means "not proven".
    pub fn check_implied(&mut self, clause: &Clause) -> SatResult {
        let negated: Vec<Lit> = clause.negate().iter().collect();
        self.solve_with(&negated)
    }

    /// Conservative implication test: a timeout counts as "not implied".
    pub fn implies(&mut self, clause: &Clause) -> bool {
        self.check_implied(clause).is_unsat()
    }

    fn search(&mut self, assumptions: &[Lit]) -> SatResult {
        if self.has_empty_clause {
            return SatResult::Unsatisfiable;
        }
        self.reset();

        let deadline = self.config.timeout.map(|t| Instant::now() + t);
        let mut conflicts: u64 = 0;

        for i in 0..self.units.len() {
            let unit = self.units[i];
            if !self.enqueue(unit) {
                return SatResult::Unsatisfiable;
            }
        }
        if self.propagate().is_some() {
            return SatResult::Unsatisfiable;
        }

        for &lit in assumptions {
            assert!(lit.var().index() < self.num_vars, "Assumption {} is out of range", lit);
            match self.value(lit) {
                Some(true) => continue,
                Some(false) => return SatResult::Unsatisfiable,
                None => {
                    self.new_level(lit, false);
                    self.enqueue(lit);
                    if self.propagate().is_some() {
                        return SatResult::Unsatisfiable;
                    }
                }
            }
        }
        let base = self.levels.len();

        loop {
            if self.budget_exhausted(conflicts, deadline) {
                log::debug!("Solver budget exhausted after {} conflicts", conflicts);
                return SatResult::Timeout;
            }

            let Some(var) = self.pick_branch_var() else {
                let values = self.assign.iter().map(|v| v.unwrap_or(false)).collect();
                return SatResult::Satisfiable(Model::new(values));
            };
            let lit = self.decide_polarity(var);
            self.stats.decisions += 1;
            self.new_level(lit, true);
            self.enqueue(lit);

            while self.propagate().is_some() {
                conflicts += 1;
                self.stats.conflicts += 1;
                if self.budget_exhausted(conflicts, deadline) {
                    log::debug!("Solver budget exhausted after {} conflicts", conflicts);
                    return SatResult::Timeout;
                }
                // Undo levels until an untried decision can be flipped.
                loop {
                    if self.levels.len() == base {
                        return SatResult::Unsatisfiable;
                    }
                    let Some(level) = self.levels.pop() else {
                        return SatResult::Unsatisfiable;
                    };
                    self.undo_until(level.trail_pos);
                    if level.flippable {
                        let flipped = -level.decision;
                        self.new_level(flipped, false);
                        self.enqueue(flipped);
                        break;
                    }
                }
            }
        }
    }

    fn budget_exhausted(&self, conflicts: u64, deadline: Option<Instant>) -> bool {
        if self.config.conflict_limit.is_some_and(|limit| conflicts > limit) {
            return true;
        }
        deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn value(&self, lit: Lit) -> Option<bool> {
        lit_value(&self.assign, lit)
    }

    fn pick_branch_var(&self) -> Option<Var> {
        self.assign
            .iter()
            .position(Option::is_none)
            .map(|i| Var::new(i as u32 + 1))
    }

    fn decide_polarity(&mut self, var: Var) -> Lit {
        match self.config.phase {
            Phase::Negative => var.neg(),
            Phase::Positive => var.pos(),
            Phase::Random => var.lit(self.rng.gen_bool(0.5)),
        }
    }

    fn new_level(&mut self, decision: Lit, flippable: bool) {
        self.levels.push(Level {
            trail_pos: self.trail.len(),
            decision,
            flippable,
        });
    }

    /// Assigns `lit` to true. Returns `false` if it is already false.
    fn enqueue(&mut self, lit: Lit) -> bool {
        match self.value(lit) {
            Some(value) => value,
            None => {
                self.assign[lit.var().index()] = Some(lit.is_positive());
                self.trail.push(lit);
                true
            }
        }
    }

    fn undo_until(&mut self, trail_pos: usize) {
        for lit in self.trail.drain(trail_pos..) {
            self.assign[lit.var().index()] = None;
        }
        self.qhead = self.qhead.min(trail_pos);
    }

    fn reset(&mut self) {
        self.levels.clear();
        self.undo_until(0);
    }

    /// Unit propagation. Returns the index of a conflicting clause, if any.
    fn propagate(&mut self) -> Option<usize> {
        let Self {
            clauses,
            watches,
            assign,
            trail,
            qhead,
            stats,
            ..
        } = self;
        while *qhead < trail.len() {
            let p = trail[*qhead];
            *qhead += 1;
            stats.propagations += 1;

            let false_lit = -p;
            let mut ws = std::mem::take(&mut watches[false_lit.code()]);
            let mut conflict = None;
            let mut i = 0;

            while i < ws.len() {
                let ci = ws[i];
                let clause = &mut clauses[ci];
                if clause[0] == false_lit {
                    clause.swap(0, 1);
                }
                let first = clause[0];
                if lit_value(assign, first) == Some(true) {
                    i += 1;
                    continue;
                }

                let replacement = (2..clause.len()).find(|&k| lit_value(assign, clause[k]) != Some(false));
                if let Some(k) = replacement {
                    clause.swap(1, k);
                    watches[clause[1].code()].push(ci);
                    ws.swap_remove(i);
                    continue;
                }

                match lit_value(assign, first) {
                    Some(false) => {
                        conflict = Some(ci);
                        break;
                    }
                    _ => {
                        assign[first.var().index()] = Some(first.is_positive());
                        trail.push(first);
                        i += 1;
                    }
                }
            }

            let added = std::mem::replace(&mut watches[false_lit.code()], ws);
            watches[false_lit.code()].extend(added);

            if conflict.is_some() {
                *qhead = trail.len();
                return conflict;
            }
        }
        None
    }
}

fn lit_value(assign: &[Option<bool>], lit: Lit) -> Option<bool> {
    assign[lit.var().index()].map(|v| v == lit.is_positive())
}
