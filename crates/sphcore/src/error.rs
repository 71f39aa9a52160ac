use thiserror::Error;

use crate::particles::variable::VariableKind;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while setting up particles, grids and kernels.
///
/// These are configuration mistakes made before a simulation starts. Per-step
/// operations (population, search, sorting) never return them.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid construction parameter (spacing, smoothing length, level count...).
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// A variable with this name exists but holds a different data kind.
    #[error("variable '{name}' is registered as {found:?}, requested as {requested:?}")]
    VariableTypeMismatch {
        name: String,
        requested: VariableKind,
        found: VariableKind,
    },

    /// No variable has been registered under this name.
    #[error("no variable named '{0}'")]
    UnknownVariable(String),

    /// Input data length does not match the particle bound it is attached to.
    #[error("length mismatch for '{name}': expected {expected}, got {got}")]
    LengthMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    /// Promotion requested while every real slot is already occupied.
    #[error("buffer exhausted: {total_real} real particles fill all {bound} real slots")]
    BufferExhausted { total_real: usize, bound: usize },
}
