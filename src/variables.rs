//! Variable registry: a bidirectional mapping between feature names and
//! solver variables.
//!
//! Registries are append-only, so a [`Var`] handed out once keeps meaning the
//! same feature for the lifetime of the registry. Transformations that shrink
//! the variable set ([`Variables::restrict`]) produce a *new* registry, and
//! literals move between registries by name ([`Variables::adapt_clause`]).

use rustc_hash::FxHashMap;

use crate::clause::Clause;
use crate::error::{Error, Result};
use crate::types::{Lit, Var};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
    names: Vec<String>,
    index: FxHashMap<String, Var>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from distinct names, numbered in iteration order.
    pub fn from_names<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Result<Self> {
        let mut vars = Self::new();
        for name in names {
            let name = name.into();
            if vars.contains(&name) {
                return Err(Error::DuplicateName(name));
            }
            vars.add(name);
        }
        Ok(vars)
    }

    /// Registers `name` and returns its variable, or the existing variable if
    /// the name is already registered.
    pub fn add(&mut self, name: impl Into<String>) -> Var {
        let name = name.into();
        if let Some(&var) = self.index.get(&name) {
            return var;
        }
        let var = Var::new(self.names.len() as u32 + 1);
        self.index.insert(name.clone(), var);
        self.names.push(name);
        var
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn var(&self, name: &str) -> Option<Var> {
        self.index.get(name).copied()
    }

    pub fn lit(&self, name: &str, positive: bool) -> Option<Lit> {
        self.var(name).map(|var| var.lit(positive))
    }

    pub fn name(&self, var: Var) -> Option<&str> {
        self.names.get(var.index()).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.iter().map(String::as_str)
    }

    pub fn vars(&self) -> impl Iterator<Item = Var> {
        (1..=self.names.len() as u32).map(Var::new)
    }

    /// Returns `true` if `var` is registered here.
    pub fn has_var(&self, var: Var) -> bool {
        var.index() < self.names.len()
    }

    /// New registry containing only the names satisfying `keep`, in the
    /// original order.
    pub fn restrict(&self, mut keep: impl FnMut(&str) -> bool) -> Variables {
        let mut vars = Variables::new();
        for name in &self.names {
            if keep(name) {
                vars.add(name.clone());
            }
        }
        vars
    }

    /// Translates a literal of this registry into `target` by name.
    pub fn adapt_lit(&self, lit: Lit, target: &Variables) -> Option<Lit> {
        let name = self.name(lit.var())?;
        target.lit(name, lit.is_positive())
    }

    /// Translates a clause into `target`. Returns `None` if any of its
    /// variables has no counterpart there.
    pub fn adapt_clause(&self, clause: &Clause, target: &Variables) -> Option<Clause> {
        clause.iter().map(|lit| self.adapt_lit(lit, target)).collect::<Option<Vec<_>>>().map(Clause::new)
    }

    /// Names of the variables assigned `true` by a total assignment.
    pub fn selected_names(&self, assignment: &[bool]) -> Vec<&str> {
        self.names
            .iter()
            .zip(assignment)
            .filter(|(_, &value)| value)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn lit_to_string(&self, lit: Lit) -> String {
        let name = self.name(lit.var()).unwrap_or("?");
        if lit.is_positive() {
            name.to_string()
        } else {
            format!("-{}", name)
        }
    }
}
