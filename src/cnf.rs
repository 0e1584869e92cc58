//! CNF formulas over a [`Variables`] registry.
//!
//! A [`Cnf`] is immutable once constructed: transformations such as slicing
//! (see [`cnf_slicer`][crate::cnf_slicer]) build a new formula so that the
//! original stays available for re-runs with different variable subsets.

use std::fmt;

use crate::clause::Clause;
use crate::error::{Error, Result};
use crate::variables::Variables;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cnf {
    variables: Variables,
    clauses: Vec<Clause>,
}

impl Cnf {
    /// Creates a formula, checking that every literal is registered.
    pub fn new(variables: Variables, clauses: Vec<Clause>) -> Result<Self> {
        let cnf = Self { variables, clauses };
        cnf.validate()?;
        Ok(cnf)
    }

    /// Formula without clauses (a tautology) over the given registry.
    pub fn empty(variables: Variables) -> Self {
        Self {
            variables,
            clauses: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for clause in &self.clauses {
            for lit in clause.iter() {
                if !self.variables.has_var(lit.var()) {
                    return Err(Error::UnknownVariable {
                        lit: lit.to_dimacs(),
                        size: self.variables.len(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn num_vars(&self) -> usize {
        self.variables.len()
    }

    pub fn num_clauses(&self) -> usize {
        self.clauses.len()
    }

    /// Translates the clause list into another registry by name.
    ///
    /// Clauses mentioning a variable unknown to `target` are dropped.
    pub fn adapt_clause_list(&self, target: &Variables) -> Vec<Clause> {
        self.clauses
            .iter()
            .filter_map(|clause| {
                let adapted = self.variables.adapt_clause(clause, target);
                if adapted.is_none() {
                    log::debug!("Dropping clause {} while adapting: variable not in target registry", clause);
                }
                adapted
            })
            .collect()
    }

    /// Same formula re-expressed over `target`.
    pub fn adapt(&self, target: Variables) -> Result<Cnf> {
        let clauses = self.adapt_clause_list(&target);
        if clauses.len() != self.clauses.len() {
            return Err(Error::MalformedFormula(
                "target registry does not cover all variables of the formula".to_string(),
            ));
        }
        Cnf::new(target, clauses)
    }

    /// Evaluates the formula under a total assignment indexed by [`Var::index`][crate::types::Var::index].
    pub fn is_satisfied_by(&self, assignment: &[bool]) -> bool {
        self.clauses.iter().all(|clause| clause.is_satisfied_by(assignment))
    }

    /// Renders a clause with feature names, e.g. `A | -B`.
    pub fn clause_to_string(&self, clause: &Clause) -> String {
        if clause.is_empty() {
            return "false".to_string();
        }
        clause
            .iter()
            .map(|lit| self.variables.lit_to_string(lit))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

impl fmt::Display for Cnf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                write!(f, " & ")?;
            }
            write!(f, "({})", self.clause_to_string(clause))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> Variables {
        Variables::from_names(["A", "B", "C"]).unwrap()
    }

    #[test]
    fn test_rejects_unregistered_literal() {
        let err = Cnf::new(abc(), vec![Clause::from_dimacs([1, -4])]).unwrap_err();
        assert_eq!(err, Error::UnknownVariable { lit: -4, size: 3 });
    }

    #[test]
    fn test_evaluation() {
        let cnf = Cnf::new(abc(), vec![Clause::from_dimacs([1, 2]), Clause::from_dimacs([-3])]).unwrap();
        assert!(cnf.is_satisfied_by(&[true, false, false]));
        assert!(!cnf.is_satisfied_by(&[false, false, false]));
        assert!(!cnf.is_satisfied_by(&[true, true, true]));
    }

    #[test]
    fn test_adapt_by_name() {
        let cnf = Cnf::new(abc(), vec![Clause::from_dimacs([1, -3]), Clause::from_dimacs([2])]).unwrap();
        let target = Variables::from_names(["C", "A"]).unwrap();
        let clauses = cnf.adapt_clause_list(&target);
        assert_eq!(clauses, vec![Clause::from_dimacs([-1, 2])]);
        assert!(cnf.adapt(target).is_err());
    }

    #[test]
    fn test_display_uses_names() {
        let cnf = Cnf::new(abc(), vec![Clause::from_dimacs([1, -2]), Clause::default()]).unwrap();
        assert_eq!(cnf.to_string(), "(A | -B) & (false)");
    }
}
