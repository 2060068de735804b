//! Independent checks of a computed correlation matrix.
//!
//! [`max_abs_error`] compares every upper-triangle cell against a two-pass
//! `f64` reimplementation, which costs `O(ny^2 * nx)`. For inputs where that
//! is too slow, [`freivalds_error`] runs Freivalds' randomized test: with `A`
//! the normalized rows, the result `B` should equal `A Aᵀ`, so `B x` and
//! `A (Aᵀ x)` must agree for random `x`. Each round is `O(ny * nx + ny^2)`.

use crate::generate::XorShift;

/// Largest acceptable [`max_abs_error`] for single-precision output.
pub const ALLOWED_ERROR: f64 = 1e-5;
/// Largest acceptable [`freivalds_error`].
pub const FREIVALDS_LIMIT: f64 = 1e-3;

fn check_input(ny: usize, nx: usize, data: &[f32]) {
    assert_eq!(data.len(), ny * nx, "input dimensions mismatch");
}

fn check_output(ny: usize, out: &[f32]) {
    assert!(out.len() >= ny * ny, "output holds fewer than ny * ny values");
}

fn normalized_rows(ny: usize, nx: usize, data: &[f32]) -> Vec<f64> {
    let mut normalized = vec![0.0f64; ny * nx];
    if nx == 0 {
        return normalized;
    }
    for (dst, src) in normalized.chunks_exact_mut(nx).zip(data.chunks_exact(nx)) {
        let mean = src.iter().map(|&v| v as f64).sum::<f64>() / nx as f64;
        let mut ss = 0.0f64;
        for (d, &v) in dst.iter_mut().zip(src) {
            *d = v as f64 - mean;
            ss += *d * *d;
        }
        let mult = 1.0 / ss.sqrt();
        for d in dst.iter_mut() {
            *d *= mult;
        }
    }
    normalized
}

/// Full symmetric `ny x ny` correlation matrix, brute force in `f64`.
///
/// # Panics
///
/// Panics if `data.len() != ny * nx`.
pub fn reference_correlation(ny: usize, nx: usize, data: &[f32]) -> Vec<f64> {
    check_input(ny, nx, data);
    let normalized = normalized_rows(ny, nx, data);
    let mut out = vec![0.0f64; ny * ny];
    for i in 0..ny {
        let a = &normalized[i * nx..(i + 1) * nx];
        for j in i..ny {
            let b = &normalized[j * nx..(j + 1) * nx];
            let sum: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            out[j + i * ny] = sum;
            out[i + j * ny] = sum;
        }
    }
    out
}

/// Largest absolute difference between `out` and the reference over the
/// upper triangle. NaN if any computed cell there is NaN.
///
/// # Panics
///
/// Panics if `data.len() != ny * nx` or `out.len() < ny * ny`.
pub fn max_abs_error(ny: usize, nx: usize, data: &[f32], out: &[f32]) -> f64 {
    check_input(ny, nx, data);
    check_output(ny, out);
    let normalized = normalized_rows(ny, nx, data);

    let mut worst = 0.0f64;
    for i in 0..ny {
        let a = &normalized[i * nx..(i + 1) * nx];
        for j in i..ny {
            let q = out[j + i * ny];
            if q.is_nan() {
                return f64::NAN;
            }
            let b = &normalized[j * nx..(j + 1) * nx];
            let expected: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            worst = worst.max((q as f64 - expected).abs());
        }
    }
    worst
}

/// Largest deviation seen over `iters` rounds of Freivalds' test, reading
/// only the upper triangle of `out`. NaN if any deviation is NaN.
///
/// # Panics
///
/// Panics if `data.len() != ny * nx` or `out.len() < ny * ny`.
pub fn freivalds_error(
    ny: usize,
    nx: usize,
    data: &[f32],
    out: &[f32],
    iters: usize,
    seed: u64,
) -> f64 {
    check_input(ny, nx, data);
    check_output(ny, out);
    let normalized = normalized_rows(ny, nx, data);
    let mut rng = XorShift::new(seed);

    let mut worst = 0.0f64;
    let mut x = vec![0.0f64; ny];
    let mut at_x = vec![0.0f64; nx];
    for _ in 0..iters {
        for v in &mut x {
            *v = rng.next_normal();
        }

        at_x.fill(0.0);
        if nx > 0 {
            for (row, &xj) in normalized.chunks_exact(nx).zip(&x) {
                for (acc, &a) in at_x.iter_mut().zip(row) {
                    *acc += a * xj;
                }
            }
        }

        for j in 0..ny {
            let row = &normalized[j * nx..(j + 1) * nx];
            let aat_x: f64 = row.iter().zip(&at_x).map(|(a, b)| a * b).sum();
            let bx: f64 = (0..ny)
                .map(|i| out[i.max(j) + i.min(j) * ny] as f64 * x[i])
                .sum();
            let err = (aat_x - bx).abs();
            if err.is_nan() {
                return f64::NAN;
            }
            worst = worst.max(err);
        }
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::{Mode, generate};

    fn upper_from_reference(ny: usize, reference: &[f64]) -> Vec<f32> {
        let mut out = vec![0.0f32; ny * ny];
        for i in 0..ny {
            for j in i..ny {
                out[j + i * ny] = reference[j + i * ny] as f32;
            }
        }
        out
    }

    #[test]
    fn reference_is_symmetric_with_unit_diagonal() {
        let (ny, nx) = (9, 17);
        let data = generate(ny, nx, Mode::Normal, 5);
        let reference = reference_correlation(ny, nx, &data);
        for i in 0..ny {
            assert!((reference[i + i * ny] - 1.0).abs() < 1e-12);
            for j in 0..ny {
                assert_eq!(reference[j + i * ny], reference[i + j * ny]);
            }
        }
    }

    #[test]
    fn exact_result_passes_both_checks() {
        let (ny, nx) = (12, 30);
        let data = generate(ny, nx, Mode::Subspace, 11);
        let out = upper_from_reference(ny, &reference_correlation(ny, nx, &data));
        assert!(max_abs_error(ny, nx, &data, &out) < 1e-7);
        assert!(freivalds_error(ny, nx, &data, &out, 5, 3) < 1e-5);
    }

    #[test]
    fn corrupted_result_is_caught() {
        let (ny, nx) = (12, 30);
        let data = generate(ny, nx, Mode::Uniform, 11);
        let mut out = upper_from_reference(ny, &reference_correlation(ny, nx, &data));
        out[5 + 2 * ny] += 0.01;
        assert!(max_abs_error(ny, nx, &data, &out) > ALLOWED_ERROR);
        assert!(freivalds_error(ny, nx, &data, &out, 20, 3) > 1e-4);
    }

    #[test]
    fn nan_is_reported() {
        let (ny, nx) = (3, 4);
        let data = generate(ny, nx, Mode::Normal, 2);
        let mut out = upper_from_reference(ny, &reference_correlation(ny, nx, &data));
        out[1] = f32::NAN;
        assert!(max_abs_error(ny, nx, &data, &out).is_nan());
        assert!(freivalds_error(ny, nx, &data, &out, 2, 1).is_nan());
    }

    #[test]
    fn lower_triangle_is_ignored() {
        let (ny, nx) = (5, 8);
        let data = generate(ny, nx, Mode::Measurement, 8);
        let mut out = upper_from_reference(ny, &reference_correlation(ny, nx, &data));
        out[3 * ny] = 123.0;
        assert!(max_abs_error(ny, nx, &data, &out) < 1e-7);
        assert!(freivalds_error(ny, nx, &data, &out, 3, 9) < 1e-5);
    }
}
