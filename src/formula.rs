//! Boolean formulas over feature names, used for cross-tree constraints.

use std::fmt;

use crate::clause::Clause;
use crate::error::{Error, Result};
use crate::types::Lit;
use crate::variables::Variables;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Formula {
    True,
    False,
    Var(String),
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
    Implies(Box<Formula>, Box<Formula>),
    Equiv(Box<Formula>, Box<Formula>),
}

impl Formula {
    pub fn var(name: impl Into<String>) -> Self {
        Formula::Var(name.into())
    }

    pub fn not(value: Self) -> Self {
        match value {
            Formula::Not(inner) => *inner,
            Formula::True => Formula::False,
            Formula::False => Formula::True,
            _ => Formula::Not(Box::new(value)),
        }
    }

    pub fn and(items: impl IntoIterator<Item = Formula>) -> Self {
        Formula::And(items.into_iter().collect())
    }

    pub fn or(items: impl IntoIterator<Item = Formula>) -> Self {
        Formula::Or(items.into_iter().collect())
    }

    pub fn implies(lhs: Self, rhs: Self) -> Self {
        Formula::Implies(Box::new(lhs), Box::new(rhs))
    }

    pub fn equiv(lhs: Self, rhs: Self) -> Self {
        Formula::Equiv(Box::new(lhs), Box::new(rhs))
    }

    /// `A => B`
    pub fn requires(a: impl Into<String>, b: impl Into<String>) -> Self {
        Formula::implies(Formula::var(a), Formula::var(b))
    }

    /// `-(A & B)`
    pub fn excludes(a: impl Into<String>, b: impl Into<String>) -> Self {
        Formula::not(Formula::and([Formula::var(a), Formula::var(b)]))
    }

    /// Disjunction of the clause's literals, with names taken from `vars`.
    pub fn from_clause(clause: &Clause, vars: &Variables) -> Result<Self> {
        let mut items = Vec::with_capacity(clause.len());
        for lit in clause.iter() {
            let name = vars.name(lit.var()).ok_or(Error::UnknownVariable {
                lit: lit.to_dimacs(),
                size: vars.len(),
            })?;
            let atom = Formula::var(name);
            items.push(if lit.is_positive() { atom } else { Formula::not(atom) });
        }
        Ok(match items.len() {
            0 => Formula::False,
            1 => items.swap_remove(0),
            _ => Formula::Or(items),
        })
    }

    /// Names of all referenced features, in order of first appearance.
    pub fn contained_features(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_features(&mut names);
        names
    }

    fn collect_features<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Formula::True | Formula::False => {}
            Formula::Var(name) => {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
            Formula::Not(inner) => inner.collect_features(names),
            Formula::And(items) | Formula::Or(items) => {
                for item in items {
                    item.collect_features(names);
                }
            }
            Formula::Implies(a, b) | Formula::Equiv(a, b) => {
                a.collect_features(names);
                b.collect_features(names);
            }
        }
    }

    pub fn evaluate(&self, value_of: &impl Fn(&str) -> bool) -> bool {
        match self {
            Formula::True => true,
            Formula::False => false,
            Formula::Var(name) => value_of(name),
            Formula::Not(inner) => !inner.evaluate(value_of),
            Formula::And(items) => items.iter().all(|item| item.evaluate(value_of)),
            Formula::Or(items) => items.iter().any(|item| item.evaluate(value_of)),
            Formula::Implies(a, b) => !a.evaluate(value_of) || b.evaluate(value_of),
            Formula::Equiv(a, b) => a.evaluate(value_of) == b.evaluate(value_of),
        }
    }

    /// Converts the formula into clauses over `vars` by distribution.
    ///
    /// Tautological clauses are dropped and duplicates removed, so two
    /// equivalent constraints written the same way yield the same clause list.
    pub fn to_clauses(&self, vars: &Variables) -> Result<Vec<Clause>> {
        let raw = self.cnf(vars, true)?;
        let mut clauses: Vec<Clause> = raw.into_iter().map(Clause::new).filter(|c| !c.is_tautology()).collect();
        clauses.sort();
        clauses.dedup();
        Ok(clauses)
    }

    fn cnf(&self, vars: &Variables, positive: bool) -> Result<Vec<Vec<Lit>>> {
        Ok(match (self, positive) {
            (Formula::True, true) | (Formula::False, false) => Vec::new(),
            (Formula::False, true) | (Formula::True, false) => vec![Vec::new()],
            (Formula::Var(name), _) => {
                let lit = vars.lit(name, positive).ok_or_else(|| Error::UnknownFeature(name.clone()))?;
                vec![vec![lit]]
            }
            (Formula::Not(inner), _) => inner.cnf(vars, !positive)?,
            (Formula::And(items), true) | (Formula::Or(items), false) => {
                let mut result = Vec::new();
                for item in items {
                    result.extend(item.cnf(vars, positive)?);
                }
                result
            }
            (Formula::Or(items), true) | (Formula::And(items), false) => {
                let mut result = vec![Vec::new()];
                for item in items {
                    result = distribute(&result, &item.cnf(vars, positive)?);
                }
                result
            }
            (Formula::Implies(a, b), true) => distribute(&a.cnf(vars, false)?, &b.cnf(vars, true)?),
            (Formula::Implies(a, b), false) => {
                let mut result = a.cnf(vars, true)?;
                result.extend(b.cnf(vars, false)?);
                result
            }
            (Formula::Equiv(a, b), _) => {
                // a <=> b  is  (-a | b) & (a | -b);  -(a <=> b)  is  (a | b) & (-a | -b)
                let mut result = distribute(&a.cnf(vars, !positive)?, &b.cnf(vars, true)?);
                result.extend(distribute(&a.cnf(vars, positive)?, &b.cnf(vars, false)?));
                result
            }
        })
    }

    fn is_atomic(&self) -> bool {
        matches!(self, Formula::True | Formula::False | Formula::Var(_) | Formula::Not(_))
    }
}

/// Disjunction of two CNFs: every clause of `lhs` joined with every clause of `rhs`.
fn distribute(lhs: &[Vec<Lit>], rhs: &[Vec<Lit>]) -> Vec<Vec<Lit>> {
    let mut result = Vec::with_capacity(lhs.len() * rhs.len());
    for a in lhs {
        for b in rhs {
            let mut clause = a.clone();
            clause.extend_from_slice(b);
            result.push(clause);
        }
    }
    result
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_operand = |f: &mut fmt::Formatter<'_>, item: &Formula| {
            if item.is_atomic() {
                write!(f, "{}", item)
            } else {
                write!(f, "({})", item)
            }
        };
        let write_list = |f: &mut fmt::Formatter<'_>, items: &[Formula], op: &str, empty: &str| {
            if items.is_empty() {
                return write!(f, "{}", empty);
            }
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, " {} ", op)?;
                }
                write_operand(f, item)?;
            }
            Ok(())
        };
        match self {
            Formula::True => write!(f, "true"),
            Formula::False => write!(f, "false"),
            Formula::Var(name) => write!(f, "{}", name),
            Formula::Not(inner) => {
                write!(f, "-")?;
                write_operand(f, inner)
            }
            Formula::And(items) => write_list(f, items, "&", "true"),
            Formula::Or(items) => write_list(f, items, "|", "false"),
            Formula::Implies(a, b) => {
                write_operand(f, a)?;
                write!(f, " => ")?;
                write_operand(f, b)
            }
            Formula::Equiv(a, b) => {
                write_operand(f, a)?;
                write!(f, " <=> ")?;
                write_operand(f, b)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> Variables {
        Variables::from_names(["A", "B", "C"]).unwrap()
    }

    fn dimacs(clauses: Vec<Clause>) -> Vec<Vec<i32>> {
        clauses.into_iter().map(|c| c.to_dimacs()).collect()
    }

    #[test]
    fn test_requires() {
        let f = Formula::requires("A", "B");
        assert_eq!(dimacs(f.to_clauses(&vars()).unwrap()), vec![vec![-1, 2]]);
        assert_eq!(f.to_string(), "A => B");
    }

    #[test]
    fn test_excludes() {
        let f = Formula::excludes("A", "C");
        assert_eq!(dimacs(f.to_clauses(&vars()).unwrap()), vec![vec![-1, -3]]);
        assert_eq!(f.to_string(), "-(A & C)");
    }

    #[test]
    fn test_distribution() {
        // A | (B & C)  =  (A | B) & (A | C)
        let f = Formula::or([Formula::var("A"), Formula::and([Formula::var("B"), Formula::var("C")])]);
        assert_eq!(dimacs(f.to_clauses(&vars()).unwrap()), vec![vec![1, 2], vec![1, 3]]);
    }

    #[test]
    fn test_equivalence() {
        let f = Formula::equiv(Formula::var("A"), Formula::var("B"));
        assert_eq!(dimacs(f.to_clauses(&vars()).unwrap()), vec![vec![-1, 2], vec![1, -2]]);

        let g = Formula::not(f);
        assert_eq!(dimacs(g.to_clauses(&vars()).unwrap()), vec![vec![-1, -2], vec![1, 2]]);
    }

    #[test]
    fn test_tautology_has_no_clauses() {
        let f = Formula::or([Formula::var("A"), Formula::not(Formula::var("A"))]);
        assert!(f.to_clauses(&vars()).unwrap().is_empty());
        assert_eq!(Formula::False.to_clauses(&vars()).unwrap(), vec![Clause::default()]);
    }

    #[test]
    fn test_unknown_feature() {
        let f = Formula::requires("A", "Z");
        assert_eq!(f.to_clauses(&vars()), Err(Error::UnknownFeature("Z".to_string())));
    }

    #[test]
    fn test_contained_features() {
        let f = Formula::implies(
            Formula::and([Formula::var("B"), Formula::var("A")]),
            Formula::or([Formula::var("B"), Formula::var("C")]),
        );
        assert_eq!(f.contained_features(), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_evaluate_matches_clauses() {
        let vars = vars();
        let f = Formula::equiv(
            Formula::var("A"),
            Formula::or([Formula::var("B"), Formula::not(Formula::var("C"))]),
        );
        let clauses = f.to_clauses(&vars).unwrap();
        for bits in 0..8u32 {
            let assignment: Vec<bool> = (0..3).map(|i| bits >> i & 1 == 1).collect();
            let by_name = |name: &str| assignment[vars.var(name).unwrap().index()];
            let expected = f.evaluate(&by_name);
            let actual = clauses.iter().all(|c| c.is_satisfied_by(&assignment));
            assert_eq!(expected, actual, "assignment {:?}", assignment);
        }
    }

    #[test]
    fn test_from_clause() {
        let f = Formula::from_clause(&Clause::from_dimacs([1, -3]), &vars()).unwrap();
        assert_eq!(f.to_string(), "A | -C");
        let unit = Formula::from_clause(&Clause::from_dimacs([-2]), &vars()).unwrap();
        assert_eq!(unit.to_string(), "-B");
    }
}
