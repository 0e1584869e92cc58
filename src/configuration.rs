//! Configurations: named feature selections.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::cnf::Cnf;
use crate::error::{Error, Result};
use crate::sat::Model;
use crate::variables::Variables;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum Selection {
    Selected,
    Unselected,
    #[default]
    Undefined,
}

/// Selection state per feature, in registry order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    names: Vec<String>,
    values: Vec<Selection>,
    index: FxHashMap<String, usize>,
}

impl Configuration {
    /// A configuration over the given features with every value undefined.
    pub fn new(variables: &Variables) -> Self {
        let names: Vec<String> = variables.names().map(str::to_string).collect();
        let index = names.iter().enumerate().map(|(i, name)| (name.clone(), i)).collect();
        Self {
            values: vec![Selection::Undefined; names.len()],
            names,
            index,
        }
    }

    /// Total configuration taken from a solver model over `variables`.
    pub fn from_model(variables: &Variables, model: &Model) -> Self {
        let mut configuration = Self::new(variables);
        for (i, value) in configuration.values.iter_mut().enumerate() {
            if let Some(&selected) = model.as_slice().get(i) {
                *value = if selected {
                    Selection::Selected
                } else {
                    Selection::Unselected
                };
            }
        }
        configuration
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Selection> {
        self.index.get(name).map(|&i| self.values[i])
    }

    pub fn set(&mut self, name: &str, selection: Selection) -> Result<()> {
        let &i = self.index.get(name).ok_or_else(|| Error::UnknownFeature(name.to_string()))?;
        self.values[i] = selection;
        Ok(())
    }

    pub fn reset_values(&mut self) {
        self.values.fill(Selection::Undefined);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Selection)> + '_ {
        self.names.iter().map(String::as_str).zip(self.values.iter().copied())
    }

    pub fn selected_names(&self) -> Vec<&str> {
        self.iter()
            .filter(|&(_, value)| value == Selection::Selected)
            .map(|(name, _)| name)
            .collect()
    }

    /// Returns `true` if no feature is undefined.
    pub fn is_complete(&self) -> bool {
        !self.values.contains(&Selection::Undefined)
    }

    /// Checks the configuration against `cnf`: every variable of the formula
    /// must be defined here and every clause satisfied.
    pub fn is_valid_for(&self, cnf: &Cnf) -> bool {
        let mut assignment = Vec::with_capacity(cnf.num_vars());
        for name in cnf.variables().names() {
            match self.get(name) {
                Some(Selection::Selected) => assignment.push(true),
                Some(Selection::Unselected) => assignment.push(false),
                Some(Selection::Undefined) | None => return false,
            }
        }
        cnf.is_satisfied_by(&assignment)
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            match value {
                Selection::Selected => write!(f, "{}", name)?,
                Selection::Unselected => write!(f, "-{}", name)?,
                Selection::Undefined => write!(f, "?{}", name)?,
            }
        }
        Ok(())
    }
}

/// Receiver of generated configurations.
pub trait ConfigurationBuilder {
    fn add_configuration(&mut self, configuration: Configuration);
}

impl ConfigurationBuilder for Vec<Configuration> {
    fn add_configuration(&mut self, configuration: Configuration) {
        self.push(configuration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::Clause;

    fn vars() -> Variables {
        Variables::from_names(["A", "B", "C"]).unwrap()
    }

    #[test]
    fn test_set_and_get() {
        let mut c = Configuration::new(&vars());
        assert_eq!(c.get("A"), Some(Selection::Undefined));
        c.set("A", Selection::Selected).unwrap();
        c.set("C", Selection::Unselected).unwrap();
        assert_eq!(c.get("A"), Some(Selection::Selected));
        assert_eq!(c.set("Z", Selection::Selected), Err(Error::UnknownFeature("Z".to_string())));
        assert!(!c.is_complete());
        assert_eq!(c.to_string(), "A ?B -C");

        c.reset_values();
        assert_eq!(c.get("A"), Some(Selection::Undefined));
    }

    #[test]
    fn test_from_model() {
        let c = Configuration::from_model(&vars(), &Model::new(vec![true, false, true]));
        assert!(c.is_complete());
        assert_eq!(c.selected_names(), vec!["A", "C"]);
    }

    #[test]
    fn test_validity() {
        let cnf = Cnf::new(vars(), vec![Clause::from_dimacs([-1, 2])]).unwrap();
        let good = Configuration::from_model(&vars(), &Model::new(vec![true, true, false]));
        let bad = Configuration::from_model(&vars(), &Model::new(vec![true, false, false]));
        assert!(good.is_valid_for(&cnf));
        assert!(!bad.is_valid_for(&cnf));
        assert!(!Configuration::new(&vars()).is_valid_for(&cnf));
    }

    #[test]
    fn test_vec_builder() {
        let mut sink: Vec<Configuration> = Vec::new();
        sink.add_configuration(Configuration::new(&vars()));
        assert_eq!(sink.len(), 1);
    }
}
