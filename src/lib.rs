//! # fmslice-rs: feature model slicing in Rust
//!
//! **`fmslice-rs`** projects feature models onto a subset of their features.
//! Slicing a model keeps exactly the selected features and produces a smaller
//! model whose valid configurations are the projections of the original ones.
//!
//! ## What is a slice?
//!
//! A feature model is a tree of features plus cross-tree constraints. Its
//! semantics is a boolean formula over the feature names. Slicing onto a set
//! `S` of features existentially quantifies every feature outside `S`:
//!
//! ```text
//! slice(F, S) = ∃ (vars(F) \ S) . F
//! ```
//!
//! The library computes this twice. The [`cnf_slicer`] eliminates variables
//! from the CNF encoding by resolution, and the [`slicer`] rebuilds a tree
//! over the selected features (plus abstract placeholders) and then adds
//! exactly the clauses the tree cannot express on its own.
//!
//! ## Basic Usage
//!
//! ```rust
//! use fmslice_rs::formula::Formula;
//! use fmslice_rs::model::{FeatureModel, GroupKind};
//! use fmslice_rs::monitor::NullMonitor;
//! use fmslice_rs::slicer::{slice_feature_model, SliceOptions};
//!
//! let (mut model, root) = FeatureModel::with_root("Root").unwrap();
//! model.add_feature(root, "A", false).unwrap();
//! model.add_feature(root, "B", false).unwrap();
//! model.add_feature(root, "C", false).unwrap();
//! model.set_group(root, GroupKind::Or);
//! model.add_constraint(Formula::requires("A", "B")).unwrap();
//!
//! let sliced = slice_feature_model(&model, ["Root", "A", "B"], SliceOptions::default(), &NullMonitor).unwrap();
//! assert!(sliced.contains_name("A"));
//! assert!(!sliced.contains_name("C"));
//! ```
//!
//! ## Core Components
//!
//! - **[`cnf`]**, **[`clause`]**, **[`variables`]**: named clause sets.
//! - **[`sat`]**: a DPLL solver with assumptions and budgets.
//! - **[`cnf_slicer`]**: projection of a CNF onto a subset of its variables.
//! - **[`model`]**, **[`encoder`]**: feature trees and their CNF semantics.
//! - **[`slicer`]**: the feature model slicer.
//! - **[`analysis`]**: core, dead and false-optional features, constraint attributes.
//! - **[`generator`]**: t-wise covering configuration sampling.

pub mod analysis;
pub mod clause;
pub mod cnf;
pub mod cnf_slicer;
pub mod configuration;
pub mod encoder;
pub mod error;
pub mod formula;
pub mod generator;
pub mod model;
pub mod monitor;
pub mod sat;
pub mod slicer;
pub mod types;
pub mod utils;
pub mod variables;
