//! Error types surfaced by model loading and scoring.
//!
//! Four kinds cross the API boundary:
//! - `Parsing` - malformed document, unsupported construct, un-scorable model
//! - `MissingValue` - a predicate or expression read a missing value its
//!   policy does not handle
//! - `InvalidValue` - an input violates its field constraints, or a built-in
//!   was applied with the wrong arity
//! - `Math` - a normalization produced a numerically undefined result
//!
//! `MissingValue` doubles as local control flow: surrogate predicates,
//! `mapMissingTo` attributes and `asMissing` treatments absorb it instead of
//! letting it propagate.

/// Error type for model loading and evaluation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScoreError {
    /// Document malformed, unsupported construct, or un-scorable model
    #[error("parsing error: {0}")]
    Parsing(String),
    /// A missing value reached a context with no missing-value policy
    #[error("missing value: {0}")]
    MissingValue(String),
    /// An input violates its field's constraints
    #[error("invalid value: {0}")]
    InvalidValue(String),
    /// A numerically undefined result
    #[error("math error: {0}")]
    Math(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ScoreError>;
