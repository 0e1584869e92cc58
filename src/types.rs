//! Type-safe wrappers for Boolean variables and literals.
//!
//! Variables are 1-indexed (0 is reserved) so that literals can be encoded
//! as non-zero signed integers, compatible with the DIMACS convention.

use std::fmt;
use std::ops::Neg;

/// A variable identifier (1-indexed).
///
/// In feature models each feature is one variable. The mapping between
/// feature names and variables lives in [`Variables`][crate::variables::Variables].
///
/// # Invariants
///
/// - Variable IDs must be >= 1 (0 is reserved)
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Var(u32);

impl Var {
    /// Creates a new variable with the given ID.
    ///
    /// # Panics
    ///
    /// Panics if `id == 0`. Variables must be 1-indexed.
    pub fn new(id: u32) -> Self {
        assert_ne!(id, 0, "Variable IDs must be >= 1");
        Var(id)
    }

    /// Returns the raw variable ID as a `u32`.
    pub fn id(self) -> u32 {
        self.0
    }

    /// Returns the zero-based index of this variable, handy for dense tables.
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    /// Positive literal of this variable.
    pub fn pos(self) -> Lit {
        Lit(self.0 as i32)
    }

    /// Negative literal of this variable.
    pub fn neg(self) -> Lit {
        Lit(-(self.0 as i32))
    }

    /// Literal of this variable with the given polarity.
    pub fn lit(self, positive: bool) -> Lit {
        if positive {
            self.pos()
        } else {
            self.neg()
        }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

impl From<Var> for u32 {
    fn from(var: Var) -> Self {
        var.0
    }
}

/// A signed literal: a variable together with a polarity.
///
/// Ordering is by variable first, then negative before positive, so sorted
/// literal sets keep both polarities of a variable adjacent.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Lit(i32);

impl Lit {
    /// Creates a literal from its DIMACS representation.
    ///
    /// # Panics
    ///
    /// Panics if `value == 0`.
    pub fn from_dimacs(value: i32) -> Self {
        assert_ne!(value, 0, "Literal must be non-zero");
        Lit(value)
    }

    /// Returns the signed DIMACS representation of the literal.
    pub fn to_dimacs(self) -> i32 {
        self.0
    }

    pub fn var(self) -> Var {
        Var(self.0.unsigned_abs())
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Dense code in `0..2*num_vars`, used to index watch lists.
    pub(crate) fn code(self) -> usize {
        (self.var().index() << 1) | (self.is_negative() as usize)
    }
}

impl Neg for Lit {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Lit(-self.0)
    }
}

impl Ord for Lit {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.0.unsigned_abs(), self.0 > 0).cmp(&(other.0.unsigned_abs(), other.0 > 0))
    }
}

impl PartialOrd for Lit {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", if self.is_negative() { "~" } else { "" }, self.0.unsigned_abs())
    }
}

impl From<Lit> for i32 {
    fn from(lit: Lit) -> Self {
        lit.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_creation() {
        let v1 = Var::new(1);
        let v2 = Var::new(2);
        assert_eq!(v1.id(), 1);
        assert_eq!(v2.index(), 1);
        assert!(v1 < v2);
    }

    #[test]
    #[should_panic(expected = "Variable IDs must be >= 1")]
    fn test_var_zero_panics() {
        Var::new(0);
    }

    #[test]
    fn test_lit_polarity() {
        let x = Var::new(3);
        assert!(x.pos().is_positive());
        assert!(x.neg().is_negative());
        assert_eq!(-x.pos(), x.neg());
        assert_eq!(x.neg().var(), x);
        assert_eq!(x.lit(false).to_dimacs(), -3);
    }

    #[test]
    fn test_lit_order_groups_variables() {
        let mut lits: Vec<Lit> = [3, -1, 2, 1, -3].into_iter().map(Lit::from_dimacs).collect();
        lits.sort();
        let dimacs: Vec<i32> = lits.into_iter().map(Lit::to_dimacs).collect();
        assert_eq!(dimacs, vec![-1, 1, 2, -3, 3]);
    }

    #[test]
    fn test_lit_code_is_dense() {
        assert_eq!(Lit::from_dimacs(1).code(), 0);
        assert_eq!(Lit::from_dimacs(-1).code(), 1);
        assert_eq!(Lit::from_dimacs(2).code(), 2);
        assert_eq!(Lit::from_dimacs(-2).code(), 3);
    }
}
