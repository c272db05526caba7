use thiserror::Error;

/// Errors raised while building cost matrices or solving transport problems.
///
/// All of them are detected before any numerical work starts, except
/// [`Error::Convergence`], which the exact solver reports instead of
/// returning a plan that does not route all mass.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("invalid value: {0}")]
    Value(String),

    #[error("transport did not converge after {iterations} augmentations ({residual:e} mass unrouted)")]
    Convergence { iterations: usize, residual: f64 },
}

/// Result type for geot operations
pub type Result<T> = std::result::Result<T, Error>;
