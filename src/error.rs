//! Error type shared by every correlation entry point.

use thiserror::Error;

/// Errors reported by the correlation engine.
///
/// Numerical edge cases are not errors by default: a zero-variance row
/// produces NaN coefficients unless the caller opts into
/// [`DegenerateRows::Reject`](crate::DegenerateRows::Reject).
#[derive(Debug, Error)]
pub enum CorrelateError {
    /// `ny * nx` or `ny * ny` does not fit in `usize`.
    #[error("matrix dimensions overflow: {ny} rows x {nx} columns")]
    DimensionOverflow { ny: usize, nx: usize },

    /// Input slice does not hold exactly `ny * nx` values.
    #[error("input holds {actual} values, expected {expected}")]
    DataLength { expected: usize, actual: usize },

    /// Output slice is shorter than `ny * ny`.
    #[error("output holds {actual} values, need at least {expected}")]
    OutputLength { expected: usize, actual: usize },

    /// Row has zero variance, so its correlation with anything is undefined.
    #[error("row {row} has zero variance")]
    DegenerateRow { row: usize },

    /// The worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
