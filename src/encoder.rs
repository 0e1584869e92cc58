//! Propositional encoding of feature models.
//!
//! Each feature becomes one variable, numbered in pre-order from the root.
//! The tree contributes:
//!
//! - the root as a unit clause,
//! - `child => parent` for every edge,
//! - `parent => child` for mandatory children of `And` groups,
//! - `parent => (c1 | ... | cn)` for `Or` and `Alternative` groups,
//! - pairwise `-(ci & cj)` for `Alternative` groups,
//!
//! followed by the clauses of every cross-tree constraint.

use crate::clause::Clause;
use crate::cnf::Cnf;
use crate::cnf_slicer::{CnfSlice, CnfSlicer, SlicerConfig};
use crate::error::{Error, Result};
use crate::model::{FeatureModel, GroupKind};
use crate::monitor::Monitor;
use crate::variables::Variables;

/// Registry of all features reachable from the root, in pre-order.
pub fn variables(model: &FeatureModel) -> Result<Variables> {
    if model.root().is_none() {
        return Err(Error::NoRoot);
    }
    Variables::from_names(model.feature_names())
}

/// Full formula of the model: tree structure plus all constraints.
pub fn encode(model: &FeatureModel) -> Result<Cnf> {
    encode_filtered(model, |_| true)
}

/// Formula of the tree structure alone.
pub fn encode_tree(model: &FeatureModel) -> Result<Cnf> {
    encode_filtered(model, |_| false)
}

/// Tree structure plus the constraints whose index passes `keep`.
pub fn encode_filtered(model: &FeatureModel, keep: impl Fn(usize) -> bool) -> Result<Cnf> {
    let vars = variables(model)?;
    let mut clauses = structure_clauses(model, &vars)?;
    for (i, constraint) in model.constraints().iter().enumerate() {
        if keep(i) {
            clauses.extend(constraint.formula().to_clauses(&vars)?);
        }
    }
    log::debug!(
        "Encoded model with {} features into {} clauses",
        vars.len(),
        clauses.len()
    );
    Cnf::new(vars, clauses)
}

fn structure_clauses(model: &FeatureModel, vars: &Variables) -> Result<Vec<Clause>> {
    let lit = |name: &str, positive: bool| vars.lit(name, positive).ok_or_else(|| Error::UnknownFeature(name.to_string()));

    let mut clauses = Vec::new();
    let Some(root) = model.root() else {
        return Err(Error::NoRoot);
    };
    clauses.push(Clause::unit(lit(model.name(root), true)?));

    for id in model.features() {
        let feature = model.feature(id);
        let children = feature.children();
        if children.is_empty() {
            continue;
        }
        let parent_pos = lit(feature.name(), true)?;
        let parent_neg = lit(feature.name(), false)?;

        for &child in children {
            clauses.push(Clause::new([lit(model.name(child), false)?, parent_pos]));
        }

        match feature.group() {
            GroupKind::And => {
                for &child in children {
                    if model.feature(child).is_mandatory() {
                        clauses.push(Clause::new([parent_neg, lit(model.name(child), true)?]));
                    }
                }
            }
            GroupKind::Or | GroupKind::Alternative => {
                let mut any = vec![parent_neg];
                for &child in children {
                    any.push(lit(model.name(child), true)?);
                }
                clauses.push(Clause::new(any));

                if feature.group() == GroupKind::Alternative {
                    for (i, &a) in children.iter().enumerate() {
                        for &b in &children[i + 1..] {
                            clauses.push(Clause::new([lit(model.name(a), false)?, lit(model.name(b), false)?]));
                        }
                    }
                }
            }
        }
    }
    Ok(clauses)
}

/// Names of hidden features: flagged hidden themselves or below a hidden ancestor.
pub fn hidden_features(model: &FeatureModel) -> Vec<&str> {
    model
        .features()
        .into_iter()
        .filter(|&id| model.has_hidden_ancestor(id))
        .map(|id| model.name(id))
        .collect()
}

/// Formula of the model with every hidden feature existentially eliminated.
///
/// The result ranges over the visible features only and describes exactly
/// the visible projections of valid configurations (unless the slice reports
/// itself incomplete).
pub fn hidden_free_cnf(model: &FeatureModel, config: SlicerConfig, monitor: &dyn Monitor) -> Result<CnfSlice> {
    let cnf = encode(model)?;
    let hidden = hidden_features(model);
    if hidden.is_empty() {
        return Ok(CnfSlice::complete(cnf));
    }
    log::debug!("Slicing away {} hidden features", hidden.len());
    let keep = cnf.variables().restrict(|name| !hidden.contains(&name));
    CnfSlicer::new(config).slice(&cnf, &keep, monitor)
}
