//! Deterministic test matrices.
//!
//! Every generator is driven by a seeded xorshift* stream, so a
//! `(ny, nx, mode, seed)` tuple always produces the same matrix. The modes
//! cover the shapes that stress a correlation kernel differently: unrelated
//! noise, strongly correlated copies, low-rank rows, and noisy linear
//! measurements of one hidden signal.

use std::f64::consts::TAU;

const DEFAULT_STATE: u64 = 0x1234_5678_9ABC_DEF0;

/// xorshift* generator. Not cryptographic; fast and reproducible.
#[derive(Debug, Clone)]
pub struct XorShift {
    state: u64,
}

impl XorShift {
    /// A zero seed would lock the generator at zero, so it is replaced by a
    /// fixed non-zero state.
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { DEFAULT_STATE } else { seed },
        }
    }

    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform in `[0, 1)` with 53 random bits.
    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Standard normal sample (Box-Muller, cosine branch).
    pub fn next_normal(&mut self) -> f64 {
        let u1 = 1.0 - self.next_f64();
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
    }

    /// `true` with probability `p`.
    #[inline]
    pub fn next_bool(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}

/// Shape of a generated matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Uniform `[0, 1)` rows; about one row in five is a noisy affine copy
    /// of an earlier row.
    Uniform,
    /// Independent standard normal entries.
    Normal,
    /// Rows drawn from a random three-dimensional subspace.
    Subspace,
    /// Rows `a * target + b + noise` for one hidden target, `a` of random sign.
    Measurement,
    /// Uniform over the whole finite `f32` range, `[-f32::MAX, f32::MAX]`.
    Special,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::Uniform,
        Mode::Normal,
        Mode::Subspace,
        Mode::Measurement,
        Mode::Special,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Mode::Uniform => "uniform",
            Mode::Normal => "normal",
            Mode::Subspace => "subspace",
            Mode::Measurement => "measurement",
            Mode::Special => "special",
        }
    }

    pub fn parse(name: &str) -> Option<Mode> {
        Mode::ALL.into_iter().find(|mode| mode.name() == name)
    }
}

/// Generates an `ny x nx` row-major matrix.
pub fn generate(ny: usize, nx: usize, mode: Mode, seed: u64) -> Vec<f32> {
    let mut rng = XorShift::new(seed);
    let mut data = vec![0.0f32; ny * nx];
    if nx == 0 {
        return data;
    }

    match mode {
        Mode::Uniform => {
            for y in 0..ny {
                if y > 0 && rng.next_bool(0.2) {
                    let source = ((y as f64 * rng.next_f64()) as usize).min(y - 1);
                    let offset = 2.0 * (rng.next_f64() - 0.5);
                    let mult = 2.0 * rng.next_f64();
                    for x in 0..nx {
                        let noise = 0.1 * rng.next_f64();
                        let base = data[source * nx + x] as f64;
                        data[y * nx + x] = (mult * base + offset + noise) as f32;
                    }
                } else {
                    for value in &mut data[y * nx..(y + 1) * nx] {
                        *value = rng.next_f64() as f32;
                    }
                }
            }
        }
        Mode::Normal => {
            for value in &mut data {
                *value = rng.next_normal() as f32;
            }
        }
        Mode::Subspace => {
            let basis: Vec<Vec<f64>> = (0..3)
                .map(|_| (0..nx).map(|_| rng.next_normal()).collect())
                .collect();
            for row in data.chunks_exact_mut(nx) {
                let mut coeffs = [rng.next_normal(), rng.next_normal(), rng.next_normal()];
                let len = coeffs.iter().map(|c| c * c).sum::<f64>().sqrt();
                for c in &mut coeffs {
                    *c /= len;
                }
                for (x, value) in row.iter_mut().enumerate() {
                    let v: f64 = coeffs.iter().zip(&basis).map(|(c, b)| c * b[x]).sum();
                    *value = v as f32;
                }
            }
        }
        Mode::Measurement => {
            let target: Vec<f64> = (0..nx).map(|_| rng.next_f64()).collect();
            for row in data.chunks_exact_mut(nx) {
                let mut a = 4.0 * rng.next_f64() + 0.25;
                if rng.next_bool(0.5) {
                    a = -a;
                }
                let b = 4.0 * rng.next_f64() - 2.0;
                let error = rng.next_f64();
                for (value, &t) in row.iter_mut().zip(&target) {
                    let noise = (rng.next_f64() - 0.5) * 2.0 * error;
                    *value = (a * t + b + noise) as f32;
                }
            }
        }
        Mode::Special => {
            for value in &mut data {
                *value = ((2.0 * rng.next_f64() - 1.0) * f32::MAX as f64) as f32;
            }
        }
    }
    data
}
