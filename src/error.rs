//! Error type shared by all fallible operations of the crate.
//!
//! Solver timeouts are deliberately absent here: they are a regular
//! outcome of a query, see [`SatResult::Timeout`][crate::sat::SatResult::Timeout].

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The operation was cancelled through its [`Monitor`][crate::monitor::Monitor].
    #[error("operation was cancelled")]
    Cancelled,

    #[error("unknown feature `{0}`")]
    UnknownFeature(String),

    #[error("feature model has no root")]
    NoRoot,

    #[error("feature name `{0}` is already in use")]
    DuplicateName(String),

    #[error("invalid structural edit: {0}")]
    InvalidStructure(String),

    /// A literal refers to a variable index that is not registered.
    #[error("literal {lit} refers to unregistered variable (registry has {size} variables)")]
    UnknownVariable { lit: i32, size: usize },

    #[error("malformed formula: {0}")]
    MalformedFormula(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;
