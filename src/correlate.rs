//! Pairwise Pearson correlation between the rows of an `ny x nx` matrix.
//!
//! Input is row-major `f32`, row `y` at `data[y * nx..(y + 1) * nx]`. For
//! every `row <= col < ny` the coefficient lands in `out[col + row * ny]`;
//! the strict lower triangle is never written.
//!
//! # Strategies
//!
//! | Function | Strategy | Best For |
//! |----------|----------|----------|
//! | [`correlate_baseline`] | Normalize, then naive upper-triangle dot products | Reference, tiny inputs |
//! | [`correlate_lanes`] | `W`-wide padded lane groups, one thread | Seeing the lane speedup alone |
//! | [`correlate_tiled`] | Lane groups + `P x P` row-tile reuse + worker pool | Everything else |
//! | [`Correlator`] | [`correlate_tiled`] with threads, schedule and NaN policy configurable | Tuning |
//!
//! All variants normalize and accumulate in `f64` and narrow to `f32` only
//! when storing a coefficient, so they agree to within a few `f32` ulps.
//!
//! # Zero-variance rows
//!
//! Pearson correlation is undefined for a constant row. By default such a row
//! yields NaN in every coefficient it participates in, matching a plain
//! `(x - mean) / norm` implementation. [`DegenerateRows::Reject`] turns this
//! into [`CorrelateError::DegenerateRow`] before any output is written.
//!
//! # References
//!
//! - [Programming Parallel Computers, CP](https://ppc.cs.aalto.fi/)

use rayon::ThreadPoolBuilder;
use tracing::{debug, warn};

use crate::error::CorrelateError;
use crate::kernel::dot_lanes;
use crate::layout::PaddedRows;
use crate::normalize::normalize_row;
use crate::schedule::{Schedule, run_tiles};

/// Lane width used by [`correlate`].
pub const DEFAULT_LANES: usize = 4;
/// Tile edge used by [`correlate`].
pub const DEFAULT_TILE: usize = 10;

/// Signature shared by every correlation variant.
pub type CorrelateFn = fn(usize, usize, &[f32], &mut [f32]) -> Result<(), CorrelateError>;

/// What to do with rows whose variance is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DegenerateRows {
    /// Let NaN flow into every coefficient involving the row.
    #[default]
    Propagate,
    /// Fail with [`CorrelateError::DegenerateRow`] naming the first such row.
    Reject,
}

/// Validates the buffers and returns the number of output cells, `ny * ny`.
fn check_dims(
    ny: usize,
    nx: usize,
    data: &[f32],
    out: &[f32],
) -> Result<usize, CorrelateError> {
    let cells_in = ny
        .checked_mul(nx)
        .ok_or(CorrelateError::DimensionOverflow { ny, nx })?;
    let cells_out = ny
        .checked_mul(ny)
        .ok_or(CorrelateError::DimensionOverflow { ny, nx })?;

    if data.len() != cells_in {
        return Err(CorrelateError::DataLength {
            expected: cells_in,
            actual: data.len(),
        });
    }
    if out.len() < cells_out {
        return Err(CorrelateError::OutputLength {
            expected: cells_out,
            actual: out.len(),
        });
    }
    Ok(cells_out)
}

/// Scalar baseline: normalize each row in `f64`, then one plain dot product
/// per upper-triangle pair.
pub fn correlate_baseline(
    ny: usize,
    nx: usize,
    data: &[f32],
    out: &mut [f32],
) -> Result<(), CorrelateError> {
    check_dims(ny, nx, data, out)?;
    if ny == 0 || nx == 0 {
        return Ok(());
    }

    let mut normalized = vec![0.0f64; ny * nx];
    for (dst, src) in normalized.chunks_exact_mut(nx).zip(data.chunks_exact(nx)) {
        normalize_row(src, dst);
    }

    for row in 0..ny {
        let a = &normalized[row * nx..(row + 1) * nx];
        for col in row..ny {
            let b = &normalized[col * nx..(col + 1) * nx];
            let sum: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            out[col + row * ny] = sum as f32;
        }
    }
    Ok(())
}

/// Lane-group variant: rows padded to `W`-wide groups, one dot product per
/// pair with `W` independent accumulators. No tiling, no worker pool for
/// the products.
pub fn correlate_lanes<const W: usize>(
    ny: usize,
    nx: usize,
    data: &[f32],
    out: &mut [f32],
) -> Result<(), CorrelateError> {
    check_dims(ny, nx, data, out)?;
    if ny == 0 || nx == 0 {
        return Ok(());
    }

    let rows = PaddedRows::<W>::from_matrix(ny, nx, data, 1)?;
    for row in 0..ny {
        let a = rows.row(row);
        for col in row..ny {
            out[col + row * ny] = dot_lanes(a, rows.row(col)) as f32;
        }
    }
    Ok(())
}

/// Tiled variant with lane width `W` and tile edge `P`, default settings.
pub fn correlate_tiled<const W: usize, const P: usize>(
    ny: usize,
    nx: usize,
    data: &[f32],
    out: &mut [f32],
) -> Result<(), CorrelateError> {
    Correlator::<W, P>::default().run(ny, nx, data, out)
}

/// Correlates with the default engine: `W = 4`, `P = 10`, one worker per
/// hardware thread, round-robin tiles, NaN for zero-variance rows.
///
/// # Example
///
/// ```
/// use hpc_correlate::correlate;
///
/// let data = [1.0f32, 2.0, 3.0, 3.0, 2.0, 1.0];
/// let mut out = [0.0f32; 4];
/// correlate(2, 3, &data, &mut out).unwrap();
/// assert!((out[1] + 1.0).abs() < 1e-6);
/// ```
pub fn correlate(
    ny: usize,
    nx: usize,
    data: &[f32],
    out: &mut [f32],
) -> Result<(), CorrelateError> {
    correlate_tiled::<DEFAULT_LANES, DEFAULT_TILE>(ny, nx, data, out)
}

/// Allocates an `ny * ny` buffer and runs [`correlate`] into it. Cells below
/// the diagonal are `0.0`.
pub fn correlation_matrix(ny: usize, nx: usize, data: &[f32]) -> Result<Vec<f32>, CorrelateError> {
    let cells = ny
        .checked_mul(ny)
        .ok_or(CorrelateError::DimensionOverflow { ny, nx })?;
    let mut out = vec![0.0f32; cells];
    correlate(ny, nx, data, &mut out)?;
    Ok(out)
}

/// Configurable tiled engine with lane width `LANES` and tile edge `TILE`.
///
/// # Example
///
/// ```
/// use hpc_correlate::{Correlator, DegenerateRows, Schedule};
///
/// let data = [1.0f32, 2.0, 3.0, 2.0, 4.0, 6.0];
/// let mut out = [0.0f32; 4];
/// Correlator::new()
///     .threads(2)
///     .schedule(Schedule::WorkStealing)
///     .degenerate_rows(DegenerateRows::Reject)
///     .run(2, 3, &data, &mut out)
///     .unwrap();
/// assert!((out[1] - 1.0).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correlator<const LANES: usize = DEFAULT_LANES, const TILE: usize = DEFAULT_TILE> {
    threads: Option<usize>,
    schedule: Schedule,
    degenerate: DegenerateRows,
}

impl Correlator {
    /// Engine with the default lane width and tile edge.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<const LANES: usize, const TILE: usize> Default for Correlator<LANES, TILE> {
    fn default() -> Self {
        Self {
            threads: None,
            schedule: Schedule::default(),
            degenerate: DegenerateRows::default(),
        }
    }
}

impl<const LANES: usize, const TILE: usize> Correlator<LANES, TILE> {
    const TILE_OK: () = assert!(TILE > 0, "tile edge must be positive");

    /// Runs on a dedicated pool of `threads` workers. `0` restores the
    /// default: the current rayon pool, sized to hardware parallelism.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = (threads > 0).then_some(threads);
        self
    }

    /// How row tiles are handed to workers.
    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Policy for zero-variance rows.
    pub fn degenerate_rows(mut self, policy: DegenerateRows) -> Self {
        self.degenerate = policy;
        self
    }

    /// Computes the upper triangle of the row correlation matrix into `out`.
    pub fn run(
        &self,
        ny: usize,
        nx: usize,
        data: &[f32],
        out: &mut [f32],
    ) -> Result<(), CorrelateError> {
        let () = Self::TILE_OK;

        let cells = check_dims(ny, nx, data, out)?;
        if ny == 0 || nx == 0 {
            return Ok(());
        }

        let out = &mut out[..cells];
        match self.threads {
            Some(threads) => ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()?
                .install(|| self.run_in_pool(ny, nx, data, out)),
            None => self.run_in_pool(ny, nx, data, out),
        }
    }

    fn run_in_pool(
        &self,
        ny: usize,
        nx: usize,
        data: &[f32],
        out: &mut [f32],
    ) -> Result<(), CorrelateError> {
        debug!(
            ny,
            nx,
            lanes = LANES,
            tile = TILE,
            threads = rayon::current_num_threads(),
            schedule = ?self.schedule,
            "correlating rows"
        );

        let rows = PaddedRows::<LANES>::from_matrix(ny, nx, data, TILE)?;

        let mut degenerate = rows.degenerate_rows();
        if let Some(first) = degenerate.next() {
            match self.degenerate {
                DegenerateRows::Reject => return Err(CorrelateError::DegenerateRow { row: first }),
                DegenerateRows::Propagate => {
                    let count = 1 + degenerate.count();
                    warn!(count, first, "zero-variance rows yield NaN coefficients");
                }
            }
        }

        run_tiles::<LANES, TILE>(&rows, out, self.schedule);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn make_small_matrix(ny: usize, nx: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(ny * nx);
        for y in 0..ny {
            for x in 0..nx {
                out.push(((y * 3 + x * 5) % 7) as f32 + (x * y) as f32 * 0.125);
            }
        }
        out
    }

    fn reference(ny: usize, nx: usize, data: &[f32]) -> Vec<f64> {
        let mut normalized = vec![0.0f64; ny * nx];
        for y in 0..ny {
            let row = &data[y * nx..(y + 1) * nx];
            let mean = row.iter().map(|&v| v as f64).sum::<f64>() / nx as f64;
            let ss: f64 = row.iter().map(|&v| (v as f64 - mean).powi(2)).sum();
            for x in 0..nx {
                normalized[y * nx + x] = (row[x] as f64 - mean) / ss.sqrt();
            }
        }
        let mut out = vec![0.0f64; ny * ny];
        for i in 0..ny {
            for j in 0..ny {
                out[j + i * ny] = (0..nx)
                    .map(|x| normalized[i * nx + x] * normalized[j * nx + x])
                    .sum();
            }
        }
        out
    }

    fn assert_upper_close(ny: usize, expected: &[f64], actual: &[f32], tol: f64) {
        for row in 0..ny {
            for col in row..ny {
                let e = expected[col + row * ny];
                let a = actual[col + row * ny] as f64;
                assert!((e - a).abs() <= tol, "row={row} col={col} expected={e} actual={a}");
            }
        }
    }

    fn all_variants() -> Vec<(&'static str, CorrelateFn)> {
        vec![
            ("baseline", correlate_baseline),
            ("lanes1", correlate_lanes::<1>),
            ("lanes4", correlate_lanes::<4>),
            ("lanes8", correlate_lanes::<8>),
            ("tiled_1x1", correlate_tiled::<1, 1>),
            ("tiled_2x3", correlate_tiled::<2, 3>),
            ("tiled_4x10", correlate_tiled::<4, 10>),
            ("tiled_8x10", correlate_tiled::<8, 10>),
            ("tiled_8x16", correlate_tiled::<8, 16>),
            ("default", correlate),
        ]
    }

    #[test]
    fn variants_match_reference() {
        for &(ny, nx) in &[(1, 2), (2, 3), (5, 7), (13, 9), (23, 41), (31, 64)] {
            let data = make_small_matrix(ny, nx);
            let expected = reference(ny, nx, &data);
            for (name, func) in all_variants() {
                let mut out = vec![0.0f32; ny * ny];
                func(ny, nx, &data, &mut out).unwrap_or_else(|e| panic!("{name}: {e}"));
                assert_upper_close(ny, &expected, &out, 1e-5);
            }
        }
    }

    #[test]
    fn anti_correlated_rows() {
        let data = [1.0, 2.0, 3.0, 3.0, 2.0, 1.0];
        for (name, func) in all_variants() {
            let mut out = [0.0f32; 4];
            func(2, 3, &data, &mut out).unwrap();
            assert!((out[1] + 1.0).abs() < 1e-6, "{name}: {}", out[1]);
            assert!((out[0] - 1.0).abs() < 1e-6, "{name}: {}", out[0]);
            assert!((out[3] - 1.0).abs() < 1e-6, "{name}: {}", out[3]);
        }
    }

    #[test]
    fn lower_triangle_is_untouched() {
        let (ny, nx) = (14, 6);
        let data = make_small_matrix(ny, nx);
        for (name, func) in all_variants() {
            let mut out = vec![-3.0f32; ny * ny];
            func(ny, nx, &data, &mut out).unwrap();
            for row in 0..ny {
                for col in 0..row {
                    assert_eq!(out[col + row * ny], -3.0, "{name}: row={row} col={col}");
                }
            }
        }
    }

    #[test]
    fn output_may_be_longer_than_needed() {
        let data = make_small_matrix(3, 4);
        let mut out = vec![9.0f32; 12];
        correlate(3, 4, &data, &mut out).unwrap();
        assert_eq!(&out[9..], &[9.0, 9.0, 9.0]);
    }

    #[test]
    fn empty_inputs_schedule_no_work() {
        for (_, func) in all_variants() {
            let mut out: [f32; 0] = [];
            func(0, 5, &[], &mut out).unwrap();

            let mut out = [4.0f32; 9];
            func(3, 0, &[], &mut out).unwrap();
            assert_eq!(out, [4.0; 9]);
        }
    }

    #[test]
    fn dimension_errors() {
        let mut out = [0.0f32; 4];
        let err = correlate(2, 3, &[1.0; 5], &mut out).unwrap_err();
        assert!(matches!(err, CorrelateError::DataLength { expected: 6, actual: 5 }));

        let mut short = [0.0f32; 3];
        let err = correlate(2, 3, &[1.0; 6], &mut short).unwrap_err();
        assert!(matches!(err, CorrelateError::OutputLength { expected: 4, actual: 3 }));

        let err = correlate_baseline(usize::MAX, 2, &[], &mut out).unwrap_err();
        assert!(matches!(err, CorrelateError::DimensionOverflow { .. }));

        let err = correlation_matrix(usize::MAX, 1, &[]).unwrap_err();
        assert!(matches!(err, CorrelateError::DimensionOverflow { .. }));
    }

    #[test]
    fn degenerate_row_propagates_nan() {
        let data = [1.0, 2.0, 3.0, 4.0, 2.0, 2.0, 2.0, 2.0, 4.0, 1.0, 0.0, 2.0];
        for (name, func) in all_variants() {
            let mut out = [0.0f32; 9];
            func(3, 4, &data, &mut out).unwrap();
            assert!(out[1].is_nan(), "{name}");
            assert!(out[4].is_nan(), "{name}");
            assert!(out[5].is_nan(), "{name}");
            assert!(out[0].is_finite() && out[2].is_finite() && out[8].is_finite(), "{name}");
        }
    }

    #[test]
    fn degenerate_row_rejected() {
        let data = [1.0, 2.0, 3.0, 4.0, 2.0, 2.0, 2.0, 2.0, 4.0, 1.0, 0.0, 2.0];
        let mut out = [5.0f32; 9];
        let err = Correlator::new()
            .degenerate_rows(DegenerateRows::Reject)
            .run(3, 4, &data, &mut out)
            .unwrap_err();
        assert!(matches!(err, CorrelateError::DegenerateRow { row: 1 }));
        assert_eq!(out, [5.0; 9]);
    }

    #[test]
    fn thread_counts_and_schedules_agree_bit_for_bit() {
        let (ny, nx) = (47, 103);
        let data = make_small_matrix(ny, nx);
        let mut expected = vec![0.0f32; ny * ny];
        Correlator::new().threads(1).run(ny, nx, &data, &mut expected).unwrap();

        for threads in [0, 2, 3, 8] {
            for schedule in [Schedule::RoundRobin, Schedule::WorkStealing] {
                let mut out = vec![0.0f32; ny * ny];
                Correlator::new()
                    .threads(threads)
                    .schedule(schedule)
                    .run(ny, nx, &data, &mut out)
                    .unwrap();
                assert_eq!(out, expected, "threads={threads} schedule={schedule:?}");
            }
        }
    }

    #[test]
    fn correlation_matrix_allocates_square_output() {
        let data = [1.0, 2.0, 3.0, 2.0, 4.0, 6.0];
        let out = correlation_matrix(2, 3, &data).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out[2], 0.0);
        assert!((out[1] - 1.0).abs() < 1e-6);
    }

    fn non_constant_rows() -> impl Strategy<Value = (usize, usize, Vec<f32>)> {
        (1usize..=24, 2usize..=40).prop_flat_map(|(ny, nx)| {
            proptest::collection::vec(-100.0f32..100.0, ny * nx)
                .prop_map(move |data| (ny, nx, data))
        })
    }

    fn has_constant_row(nx: usize, data: &[f32]) -> bool {
        data.chunks_exact(nx).any(|row| row.iter().all(|&v| v == row[0]))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn padding_neutrality((ny, nx, data) in non_constant_rows()) {
            prop_assume!(!has_constant_row(nx, &data));
            let mut expected = vec![0.0f32; ny * ny];
            correlate_baseline(ny, nx, &data, &mut expected).unwrap();

            for (name, func) in all_variants() {
                let mut out = vec![0.0f32; ny * ny];
                func(ny, nx, &data, &mut out).unwrap();
                for row in 0..ny {
                    for col in row..ny {
                        let idx = col + row * ny;
                        prop_assert!(
                            (out[idx] - expected[idx]).abs() <= 1e-5,
                            "{} row={} col={} got={} want={}", name, row, col, out[idx], expected[idx]
                        );
                    }
                }
            }
        }

        #[test]
        fn diagonal_and_range((ny, nx, data) in non_constant_rows()) {
            prop_assume!(!has_constant_row(nx, &data));
            let out = correlation_matrix(ny, nx, &data).unwrap();
            for row in 0..ny {
                prop_assert!((out[row + row * ny] - 1.0).abs() <= 1e-5);
                for col in row..ny {
                    let v = out[col + row * ny];
                    prop_assert!((-1.0 - 1e-5..=1.0 + 1e-5).contains(&v), "v={}", v);
                }
            }
        }

        #[test]
        fn scale_and_shift_invariance(
            (ny, nx, data) in non_constant_rows(),
            scale in prop_oneof![-8.0f32..-0.125, 0.125f32..8.0],
            shift in -50.0f32..50.0,
        ) {
            prop_assume!(!has_constant_row(nx, &data));
            let mut moved = data.clone();
            for v in &mut moved[..nx] {
                *v = scale * *v + shift;
            }
            prop_assume!(!has_constant_row(nx, &moved));

            let before = correlation_matrix(ny, nx, &data).unwrap();
            let after = correlation_matrix(ny, nx, &moved).unwrap();
            let sign = scale.signum();
            for col in 1..ny {
                prop_assert!((after[col] - sign * before[col]).abs() <= 1e-3,
                    "col={} before={} after={}", col, before[col], after[col]);
            }
        }
    }
}
