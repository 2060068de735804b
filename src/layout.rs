//! Padded lane-group layout for normalized rows.
//!
//! Each normalized row is stored as `ceil(nx / W)` groups of `W` doubles,
//! with the unused slots of the last group set to `0.0`. A zero slot
//! contributes nothing to a dot product, so the kernels always consume whole
//! groups and never test for the end of a row.
//!
//! The row count is padded as well: with `row_align = P` the buffer holds
//! `ceil(ny / P) * P` rows, the extra ones all zero, so the tile scheduler
//! can treat every row tile as full.
//!
//! ```text
//! row 0: [g0 g1 g2 ... g_{k-1}]   g = [f64; W], tail slots zeroed
//! row 1: [g0 g1 g2 ... g_{k-1}]
//! ...
//! row ny..padded_rows: all zero
//! ```

use rayon::prelude::*;

use crate::error::CorrelateError;
use crate::normalize::normalize_row;

/// Normalized rows packed into `W`-wide lane groups.
#[derive(Debug, Clone)]
pub struct PaddedRows<const W: usize> {
    groups: Vec<[f64; W]>,
    rows: usize,
    padded_rows: usize,
    lane_groups: usize,
    norms: Vec<f64>,
}

impl<const W: usize> PaddedRows<W> {
    const LANES_OK: () = assert!(W > 0 && W.is_power_of_two(), "lane width must be a power of two");

    /// Normalizes every row of the `ny x nx` row-major matrix `data` and
    /// packs the result, padding the row count up to a multiple of
    /// `row_align` (`0` is treated as `1`).
    ///
    /// Rows are normalized in parallel on the current rayon pool.
    pub fn from_matrix(
        ny: usize,
        nx: usize,
        data: &[f32],
        row_align: usize,
    ) -> Result<Self, CorrelateError> {
        let () = Self::LANES_OK;

        let cells = ny
            .checked_mul(nx)
            .ok_or(CorrelateError::DimensionOverflow { ny, nx })?;
        if data.len() != cells {
            return Err(CorrelateError::DataLength {
                expected: cells,
                actual: data.len(),
            });
        }

        let row_align = row_align.max(1);
        let lane_groups = nx.div_ceil(W);
        let padded_rows = ny.div_ceil(row_align) * row_align;
        let total = padded_rows
            .checked_mul(lane_groups)
            .ok_or(CorrelateError::DimensionOverflow { ny, nx })?;

        let mut groups = vec![[0.0f64; W]; total];
        let norms = if lane_groups == 0 {
            Vec::new()
        } else {
            groups
                .par_chunks_mut(lane_groups)
                .zip(data.par_chunks(nx))
                .map(|(dst, src)| normalize_row(src, dst.as_flattened_mut()))
                .collect()
        };

        Ok(Self {
            groups,
            rows: ny,
            padded_rows,
            lane_groups,
            norms,
        })
    }

    /// Lane width `W`.
    #[inline]
    pub const fn lanes(&self) -> usize {
        W
    }

    /// Number of real (unpadded) rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Row count including the all-zero alignment rows.
    #[inline]
    pub fn padded_rows(&self) -> usize {
        self.padded_rows
    }

    /// Lane groups per row, `ceil(nx / W)`.
    #[inline]
    pub fn lane_groups(&self) -> usize {
        self.lane_groups
    }

    /// Lane groups of row `y`; `y` may address an alignment row.
    #[inline]
    pub fn row(&self, y: usize) -> &[[f64; W]] {
        &self.groups[y * self.lane_groups..(y + 1) * self.lane_groups]
    }

    /// The whole packed buffer, row-major.
    #[inline]
    pub fn as_groups(&self) -> &[[f64; W]] {
        &self.groups
    }

    /// Norm of each real row before normalization.
    pub fn norms(&self) -> &[f64] {
        &self.norms
    }

    /// Indices of rows with zero variance, whose normalized entries are NaN.
    pub fn degenerate_rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.norms
            .iter()
            .enumerate()
            .filter(|&(_, &norm)| norm == 0.0)
            .map(|(row, _)| row)
    }
}
