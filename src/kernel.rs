//! Lane-wise dot products and the tiled `P x P` kernel.
//!
//! [`dot_lanes`] keeps one accumulator per lane and only folds them into a
//! scalar at the end, so the inner loop is `W` independent multiply-adds per
//! group. LLVM maps that onto vector registers for `W = 4` (AVX2) or `W = 8`
//! (AVX-512) without intrinsics.
//!
//! [`tile_dot`] is the register-reuse step. A [`RowTile`] caches a block of
//! `P` rows x `P` lane groups (`P * P * W * 8` bytes, 3.2 KiB for
//! `W = 4, P = 10`) that stays in L1 while every row of every column tile is
//! streamed against it. The row tile is loaded once per lane-group block
//! instead of once per output cell.

use crate::layout::PaddedRows;

/// Dot product of two lane-group slices with per-lane accumulators.
///
/// Extra groups in the longer slice are ignored.
#[inline]
pub fn dot_lanes<const W: usize>(a: &[[f64; W]], b: &[[f64; W]]) -> f64 {
    let mut acc = [0.0f64; W];
    for (x, y) in a.iter().zip(b) {
        for ((sum, &p), &q) in acc.iter_mut().zip(x).zip(y) {
            *sum += p * q;
        }
    }
    acc.iter().sum()
}

/// Working set of one row tile: `P` rows by up to `P` lane groups.
#[derive(Debug, Clone)]
pub struct RowTile<const W: usize, const P: usize> {
    cells: [[[f64; W]; P]; P],
    row0: usize,
    group0: usize,
    width: usize,
}

impl<const W: usize, const P: usize> Default for RowTile<W, P> {
    fn default() -> Self {
        Self {
            cells: [[[0.0; W]; P]; P],
            row0: 0,
            group0: 0,
            width: 0,
        }
    }
}

impl<const W: usize, const P: usize> RowTile<W, P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies rows `row0..row0 + P`, lane groups `group0..group0 + width`
    /// into the tile, where `width = min(P, lane_groups - group0)`.
    ///
    /// # Panics
    ///
    /// Panics if `row0 + P` exceeds `rows.padded_rows()`.
    pub fn load(&mut self, rows: &PaddedRows<W>, row0: usize, group0: usize) {
        let width = P.min(rows.lane_groups().saturating_sub(group0));
        for (i, cached) in self.cells.iter_mut().enumerate() {
            let src = &rows.row(row0 + i)[group0..group0 + width];
            cached[..width].copy_from_slice(src);
        }
        self.row0 = row0;
        self.group0 = group0;
        self.width = width;
    }

    /// First padded row held by the tile.
    #[inline]
    pub fn row0(&self) -> usize {
        self.row0
    }

    /// First lane group held by the tile.
    #[inline]
    pub fn group0(&self) -> usize {
        self.group0
    }

    /// Number of lane groups currently loaded.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    fn row(&self, i: usize) -> &[[f64; W]] {
        &self.cells[i][..self.width]
    }
}

/// Partial dot products between the cached row tile and rows
/// `col0..col0 + P`, restricted to the tile's lane-group block.
///
/// `out[i][j]` pairs tile row `i` with column row `col0 + j`. Summing the
/// results over every lane-group block of a row yields the full dot product.
pub fn tile_dot<const W: usize, const P: usize>(
    tile: &RowTile<W, P>,
    rows: &PaddedRows<W>,
    col0: usize,
) -> [[f64; P]; P] {
    let group0 = tile.group0();
    let width = tile.width();
    let mut out = [[0.0f64; P]; P];
    for j in 0..P {
        let col = &rows.row(col0 + j)[group0..group0 + width];
        for (i, sums) in out.iter_mut().enumerate() {
            sums[j] = dot_lanes(tile.row(i), col);
        }
    }
    out
}
