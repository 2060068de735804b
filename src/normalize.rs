//! Row normalization: zero mean, unit Euclidean norm.
//!
//! Pearson correlation between two rows is the dot product of their
//! normalized forms, so every variant in this crate starts here. Inputs are
//! single precision, but all sums run in `f64`: rows with thousands of
//! columns lose several digits to cancellation otherwise.
//!
//! The mean is taken relative to the row's first value (the "shifted data"
//! trick). For a constant row every shifted value is exactly `0.0`, so the
//! centered row is exactly zero, its norm is exactly zero, and the division
//! yields NaN instead of a tiny finite residue.

const ACCUMULATORS: usize = 4;

#[inline]
fn shifted_sum(row: &[f32], shift: f64) -> f64 {
    let mut acc = [0.0f64; ACCUMULATORS];
    let mut chunks = row.chunks_exact(ACCUMULATORS);
    for chunk in &mut chunks {
        for (sum, &value) in acc.iter_mut().zip(chunk) {
            *sum += value as f64 - shift;
        }
    }

    let tail: f64 = chunks
        .remainder()
        .iter()
        .map(|&value| value as f64 - shift)
        .sum();
    acc.iter().sum::<f64>() + tail
}

/// Arithmetic mean of a row, accumulated in double precision.
///
/// Returns NaN for an empty row.
pub fn row_mean(row: &[f32]) -> f64 {
    let Some(&first) = row.first() else {
        return f64::NAN;
    };
    let shift = first as f64;
    shift + shifted_sum(row, shift) / row.len() as f64
}

/// Euclidean norm of an already-centered row.
pub fn row_norm(centered: &[f64]) -> f64 {
    let mut acc = [0.0f64; ACCUMULATORS];
    let mut chunks = centered.chunks_exact(ACCUMULATORS);
    for chunk in &mut chunks {
        for (sum, &value) in acc.iter_mut().zip(chunk) {
            *sum += value * value;
        }
    }

    let tail: f64 = chunks.remainder().iter().map(|&value| value * value).sum();
    (acc.iter().sum::<f64>() + tail).sqrt()
}

/// Writes the normalized form of `row` into `out[..row.len()]` and returns
/// the norm of the centered row.
///
/// Entries of `out` past `row.len()` are left alone, which lets callers
/// normalize straight into a zero-padded buffer. A returned norm of `0.0`
/// marks a zero-variance row; its normalized entries are NaN.
///
/// # Panics
///
/// Panics if `out` is shorter than `row`.
pub fn normalize_row(row: &[f32], out: &mut [f64]) -> f64 {
    let out = &mut out[..row.len()];
    let Some(&first) = row.first() else {
        return 0.0;
    };

    let shift = first as f64;
    let shifted_mean = shifted_sum(row, shift) / row.len() as f64;
    for (dst, &value) in out.iter_mut().zip(row) {
        *dst = (value as f64 - shift) - shifted_mean;
    }

    let norm = row_norm(out);
    for value in out.iter_mut() {
        *value /= norm;
    }
    norm
}
