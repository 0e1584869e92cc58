//! t-wise covering configuration generation.
//!
//! A greedy covering search: pick the first interaction (an assignment of `t`
//! distinct variables) that is neither covered nor known to be invalid, find a
//! configuration containing it, then extend that configuration with further
//! uncovered interactions for as long as the formula allows.
//!
//! # Concurrency
//!
//! ```text
//! search (producer thread) ──(bounded sync_channel)──→ consumer ──→ ConfigurationBuilder
//! ```
//!
//! The search runs on its own thread and pushes every finished model into a
//! bounded queue; the calling thread converts models into named
//! configurations and hands them to the builder while the search continues.
//! The search signals termination by dropping its sender, so the consumer's
//! `recv` distinguishes "empty, keep waiting" from "empty, done", and every
//! model sent before termination is delivered.
//!
//! Cancellation goes through the [`Monitor`]: the search stops at its next
//! checkpoint and the consumer drains whatever is still buffered.

use std::sync::mpsc::{self, SyncSender};
use std::thread;

use num_bigint::BigUint;
use rustc_hash::FxHashSet;

use crate::cnf::Cnf;
use crate::configuration::{Configuration, ConfigurationBuilder};
use crate::error::{Error, Result};
use crate::monitor::Monitor;
use crate::sat::{Model, Phase, SatResult, SatSolver, SolverConfig};
use crate::types::{Lit, Var};
use crate::utils::binomial;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Interaction strength.
    pub t: usize,
    /// Upper bound on the number of generated configurations.
    pub target_count: usize,
    /// Capacity of the queue between search and consumer.
    pub queue_capacity: usize,
    pub solver: SolverConfig,
    /// SAT calls spent on extending a single configuration.
    pub max_candidate_checks: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            t: 2,
            target_count: 100,
            queue_capacity: 16,
            solver: SolverConfig::default().with_conflict_limit(10_000).with_phase(Phase::Random),
            max_candidate_checks: 1000,
        }
    }
}

impl GeneratorConfig {
    pub fn with_t(mut self, t: usize) -> Self {
        self.t = t;
        self
    }

    pub fn with_target_count(mut self, count: usize) -> Self {
        self.target_count = count;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_max_candidate_checks(mut self, checks: usize) -> Self {
        self.max_candidate_checks = checks;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationReport {
    /// Configurations delivered to the builder.
    pub count: usize,
    /// Interactions covered by the delivered configurations.
    pub covered: BigUint,
    /// Interactions proven impossible.
    pub invalid: BigUint,
    /// All interactions: `C(n, t) * 2^t`.
    pub total: BigUint,
    /// The search stopped because of a cancellation request.
    pub cancelled: bool,
    /// Every interaction is covered or invalid (or was given up on after a timeout).
    pub exhausted: bool,
}

#[derive(Debug, Default)]
struct SearchOutcome {
    covered: usize,
    invalid: usize,
    cancelled: bool,
    exhausted: bool,
}

/// Cursor over the `t`-element subsets of `0..n` in lexicographic order.
#[derive(Debug, Clone)]
struct Combinations {
    n: usize,
    indices: Vec<usize>,
    done: bool,
}

impl Combinations {
    fn new(n: usize, t: usize) -> Self {
        Self {
            n,
            indices: (0..t).collect(),
            done: t == 0 || t > n,
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.done {
            return None;
        }
        let current = self.indices.clone();
        let t = self.indices.len();
        match (0..t).rev().find(|&k| self.indices[k] < self.n - t + k) {
            Some(k) => {
                self.indices[k] += 1;
                for j in k + 1..t {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
            }
            None => self.done = true,
        }
        Some(current)
    }
}

/// Cursor over all interactions: each subset of variables with every sign pattern.
#[derive(Debug, Clone)]
struct Interactions {
    combinations: Combinations,
    current: Option<Vec<usize>>,
    signs: u64,
    t: usize,
}

impl Interactions {
    fn new(n: usize, t: usize) -> Self {
        let mut combinations = Combinations::new(n, t);
        let current = combinations.next();
        Self {
            combinations,
            current,
            signs: 0,
            t,
        }
    }
}

impl Iterator for Interactions {
    type Item = Vec<Lit>;

    fn next(&mut self) -> Option<Vec<Lit>> {
        let vars = self.current.as_ref()?;
        let lits = vars
            .iter()
            .enumerate()
            .map(|(k, &i)| var(i).lit(self.signs >> k & 1 == 0))
            .collect();
        self.signs += 1;
        if self.signs == 1 << self.t {
            self.signs = 0;
            self.current = self.combinations.next();
        }
        Some(lits)
    }
}

fn var(index: usize) -> Var {
    Var::new(index as u32 + 1)
}

/// Literals pinned for the configuration under construction, with a dense
/// per-variable view for constant-time lookups.
#[derive(Debug, Clone)]
struct Pinned {
    values: Vec<Option<bool>>,
    lits: Vec<Lit>,
}

impl Pinned {
    fn new(num_vars: usize, seed: &[Lit]) -> Self {
        let mut pinned = Self {
            values: vec![None; num_vars],
            lits: Vec::with_capacity(num_vars),
        };
        pinned.pin(seed);
        pinned
    }

    fn is_full(&self) -> bool {
        self.lits.len() == self.values.len()
    }

    fn clashes(&self, interaction: &[Lit]) -> bool {
        interaction
            .iter()
            .any(|&lit| self.values[lit.var().index()] == Some(!lit.is_positive()))
    }

    /// Literals of `interaction` that are not pinned yet.
    fn missing(&self, interaction: &[Lit]) -> Vec<Lit> {
        interaction
            .iter()
            .copied()
            .filter(|lit| self.values[lit.var().index()].is_none())
            .collect()
    }

    fn pin(&mut self, lits: &[Lit]) {
        for &lit in lits {
            let value = &mut self.values[lit.var().index()];
            if value.is_none() {
                *value = Some(lit.is_positive());
                self.lits.push(lit);
            }
        }
    }
}

pub struct TWiseGenerator {
    cnf: Cnf,
    config: GeneratorConfig,
}

impl TWiseGenerator {
    pub fn new(cnf: Cnf, config: GeneratorConfig) -> Result<Self> {
        cnf.validate()?;
        if config.t == 0 || config.t >= 64 {
            return Err(Error::InvalidArgument(format!(
                "interaction strength must be in 1..64, got {}",
                config.t
            )));
        }
        Ok(Self { cnf, config })
    }

    pub fn pairwise(cnf: Cnf, target_count: usize) -> Result<Self> {
        Self::new(cnf, GeneratorConfig::default().with_target_count(target_count))
    }

    pub fn cnf(&self) -> &Cnf {
        &self.cnf
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn total_interactions(&self) -> BigUint {
        binomial(self.cnf.num_vars(), self.config.t) << self.config.t
    }

    /// Runs the search and feeds every configuration to `builder` in
    /// discovery order.
    ///
    /// Cancellation is not an error: the report says how many configurations
    /// were delivered before the search stopped.
    pub fn generate(&self, builder: &mut dyn ConfigurationBuilder, monitor: &dyn Monitor) -> Result<GenerationReport> {
        monitor.set_task_name("Generating Configurations");
        monitor.set_remaining_work(self.config.target_count as u64);

        let (sender, receiver) = mpsc::sync_channel::<Model>(self.config.queue_capacity.max(1));
        let variables = self.cnf.variables();

        let (outcome, count) = thread::scope(|scope| {
            let producer = scope.spawn(move || self.search(sender, monitor));

            let mut count = 0;
            for model in receiver.iter() {
                builder.add_configuration(Configuration::from_model(variables, &model));
                count += 1;
                monitor.step();
            }

            let outcome = producer.join().unwrap_or_else(|payload| std::panic::resume_unwind(payload));
            (outcome, count)
        });

        let report = GenerationReport {
            count,
            covered: BigUint::from(outcome.covered),
            invalid: BigUint::from(outcome.invalid),
            total: self.total_interactions(),
            cancelled: outcome.cancelled,
            exhausted: outcome.exhausted,
        };
        log::info!(
            "Generated {} configurations covering {} of {} {}-wise interactions",
            report.count,
            report.covered,
            report.total,
            self.config.t
        );
        Ok(report)
    }

    /// Producer side. Dropping `sender` on return closes the queue.
    fn search(&self, sender: SyncSender<Model>, monitor: &dyn Monitor) -> SearchOutcome {
        let n = self.cnf.num_vars();
        let t = self.config.t;
        let mut solver = SatSolver::new(&self.cnf, self.config.solver.clone());
        let mut covered: FxHashSet<Vec<Lit>> = FxHashSet::default();
        let mut invalid: FxHashSet<Vec<Lit>> = FxHashSet::default();
        let mut cursor = Interactions::new(n, t);
        let mut outcome = SearchOutcome::default();
        let mut sent = 0;

        while sent < self.config.target_count {
            if monitor.check_cancel().is_err() {
                outcome.cancelled = true;
                break;
            }

            // Seed: the next uncovered interaction that has a solution.
            let mut seed = None;
            for interaction in cursor.by_ref() {
                if monitor.is_cancelled() {
                    outcome.cancelled = true;
                    break;
                }
                if covered.contains(&interaction) {
                    continue;
                }
                match solver.solve_with(&interaction) {
                    SatResult::Satisfiable(model) => {
                        seed = Some((interaction, model));
                        break;
                    }
                    SatResult::Unsatisfiable => {
                        invalid.insert(interaction);
                    }
                    SatResult::Timeout => {
                        log::debug!("Giving up on interaction {:?} after timeout", interaction);
                    }
                }
            }
            if outcome.cancelled {
                break;
            }
            let Some((seed, mut model)) = seed else {
                outcome.exhausted = true;
                break;
            };

            // Extension: pin further uncovered interactions while the formula
            // allows, until every variable is pinned or the budget is spent.
            let mut pinned = Pinned::new(n, &seed);
            let mut checks = 0;
            for interaction in cursor.clone() {
                if pinned.is_full() || checks >= self.config.max_candidate_checks || monitor.is_cancelled() {
                    break;
                }
                if pinned.clashes(&interaction) || covered.contains(&interaction) || invalid.contains(&interaction) {
                    continue;
                }
                let extra = pinned.missing(&interaction);
                if extra.iter().all(|&lit| model.satisfies(lit)) {
                    pinned.pin(&extra);
                    continue;
                }
                checks += 1;
                let mut trial = pinned.lits.clone();
                trial.extend_from_slice(&extra);
                if let SatResult::Satisfiable(next) = solver.solve_with(&trial) {
                    model = next;
                    pinned.pin(&extra);
                }
            }

            for vars in Combinations::new(n, t) {
                let lits: Vec<Lit> = vars.iter().map(|&i| var(i).lit(model.value(var(i)))).collect();
                covered.insert(lits);
            }

            if sender.send(model).is_err() {
                break;
            }
            sent += 1;
        }

        outcome.covered = covered.len();
        outcome.invalid = invalid.len();
        log::debug!("Search finished after {} configurations: {:?}", sent, outcome);
        outcome
    }
}
