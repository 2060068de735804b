//! Pairwise Pearson correlation between the rows of a matrix, written the way
//! [Algorithms for Modern Hardware] teaches: start from a scalar baseline,
//! then add lane-wide accumulation, register tiling, and threads one at a
//! time, checking each step against the last.
//!
//! # Pipeline
//!
//! 1. **Normalize** ([`normalize_row`]) — subtract the row mean, divide by the
//!    Euclidean norm, all in `f64`.
//! 2. **Pad** ([`PaddedRows`]) — pack rows into `W`-wide lane groups,
//!    zero-filled at the end of each row and up to a multiple of the tile edge
//!    in the row dimension.
//! 3. **Multiply** ([`dot_lanes`], [`tile_dot`]) — dot products of normalized
//!    rows, reusing a cached `P x P` block of the row tile across every
//!    column tile.
//! 4. **Schedule** ([`TilePlan`], [`Schedule`]) — hand one row tile's sweep of
//!    the upper triangle to each worker; workers write disjoint output rows.
//!
//! # Entry points
//!
//! - [`correlate`] / [`correlation_matrix`] — default engine.
//! - [`Correlator`] — threads, schedule, and zero-variance policy.
//! - [`correlate_baseline`], [`correlate_lanes`], [`correlate_tiled`] —
//!   the progressive variants, same signature.
//! - [`verify`] and [`generate`] — reference checks and deterministic inputs.
//!
//! # References
//!
//! - [Algorithms for Modern Hardware](https://en.algorithmica.org/hpc/)
//!
//! [Algorithms for Modern Hardware]: https://en.algorithmica.org/hpc/

mod correlate;
mod error;
pub mod generate;
mod kernel;
mod layout;
mod normalize;
mod schedule;
pub mod verify;

pub use correlate::*;
pub use error::*;
pub use kernel::*;
pub use layout::*;
pub use normalize::*;
pub use schedule::*;
