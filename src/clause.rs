//! Literal sets.
//!
//! A [`Clause`] is a normalised set of literals: sorted by variable and free of
//! duplicates. The same type doubles as a cube (a conjunction of literals) when
//! used as solver assumptions, which is what [`Clause::negate`] produces.

use std::fmt;

use crate::types::{Lit, Var};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Clause {
    lits: Vec<Lit>,
}

impl Clause {
    pub fn new(lits: impl IntoIterator<Item = Lit>) -> Self {
        let mut lits: Vec<Lit> = lits.into_iter().collect();
        lits.sort_unstable();
        lits.dedup();
        Self { lits }
    }

    pub fn from_dimacs(lits: impl IntoIterator<Item = i32>) -> Self {
        Self::new(lits.into_iter().map(Lit::from_dimacs))
    }

    pub fn unit(lit: Lit) -> Self {
        Self { lits: vec![lit] }
    }

    pub fn lits(&self) -> &[Lit] {
        &self.lits
    }

    pub fn iter(&self) -> impl Iterator<Item = Lit> + '_ {
        self.lits.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.lits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lits.is_empty()
    }

    pub fn to_dimacs(&self) -> Vec<i32> {
        self.lits.iter().map(|lit| lit.to_dimacs()).collect()
    }

    pub fn contains(&self, lit: Lit) -> bool {
        self.lits.binary_search(&lit).is_ok()
    }

    pub fn contains_var(&self, var: Var) -> bool {
        self.contains(var.pos()) || self.contains(var.neg())
    }

    pub fn vars(&self) -> impl Iterator<Item = Var> + '_ {
        self.lits.iter().map(|lit| lit.var())
    }

    /// Returns `true` if the clause contains some variable in both polarities.
    ///
    /// Literals are sorted by variable with the negative one first, so a
    /// complementary pair is always adjacent.
    pub fn is_tautology(&self) -> bool {
        self.lits.windows(2).any(|w| w[0].var() == w[1].var())
    }

    /// Flips the sign of every literal.
    ///
    /// Read as a cube, the result is the negation of the clause.
    pub fn negate(&self) -> Clause {
        Clause::new(self.lits.iter().map(|&lit| -lit))
    }

    /// Returns `true` if every literal of `self` occurs in `other`.
    pub fn subsumes(&self, other: &Clause) -> bool {
        if self.lits.len() > other.lits.len() {
            return false;
        }
        let mut rest = other.lits.iter();
        'outer: for lit in &self.lits {
            for candidate in rest.by_ref() {
                if candidate == lit {
                    continue 'outer;
                }
                if candidate > lit {
                    return false;
                }
            }
            return false;
        }
        true
    }

    /// Resolves two clauses on `var`.
    ///
    /// Returns `None` when the resolvent is a tautology.
    pub fn resolve(&self, other: &Clause, var: Var) -> Option<Clause> {
        let resolvent = Clause::new(self.iter().chain(other.iter()).filter(|lit| lit.var() != var));
        if resolvent.is_tautology() {
            None
        } else {
            Some(resolvent)
        }
    }

    /// Evaluates the clause under a total assignment indexed by [`Var::index`].
    pub fn is_satisfied_by(&self, assignment: &[bool]) -> bool {
        self.lits
            .iter()
            .any(|lit| assignment.get(lit.var().index()).copied() == Some(lit.is_positive()))
    }
}

impl FromIterator<Lit> for Clause {
    fn from_iter<I: IntoIterator<Item = Lit>>(iter: I) -> Self {
        Clause::new(iter)
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, lit) in self.lits.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{}", lit)?;
        }
        write!(f, ")")
    }
}
