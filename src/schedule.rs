//! Tile scheduling over the upper triangle of the output.
//!
//! The padded row space is cut into `P`-row tiles. Row tile `t` owns output
//! rows `t*P..(t+1)*P` and sweeps column tiles `t..T` left to right, so the
//! unit of work handed to a worker is one horizontal strip of the upper
//! triangle. Strips are disjoint row ranges of the output, which lets the
//! output be split with `chunks_mut` and written without locks.
//!
//! Strip `t` covers `T - t` tiles, the diagonal one half-empty. Dealing
//! strips round-robin gives every worker a mix of long and short strips; the
//! remaining imbalance is accepted.
//!
//! Each worker's scratch strip is allocated once per call, before any task
//! is spawned.

use std::ops::Range;
use std::sync::{Mutex, PoisonError};

use rayon::prelude::*;
use tracing::trace;

use crate::kernel::{RowTile, tile_dot};
use crate::layout::PaddedRows;

/// How row tiles are distributed over the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Schedule {
    /// Static assignment: worker `w` of `k` gets row tiles `w, w + k, ...`.
    #[default]
    RoundRobin,
    /// Rayon's adaptive splitting over row tiles.
    WorkStealing,
}

/// Partition of an `n x n` upper triangle into `tile x tile` blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePlan {
    rows: usize,
    padded_rows: usize,
    tile: usize,
}

impl TilePlan {
    /// Plan for `rows` rows with edge length `tile` (`0` is treated as `1`).
    pub fn new(rows: usize, tile: usize) -> Self {
        let tile = tile.max(1);
        Self {
            rows,
            padded_rows: rows.div_ceil(tile) * tile,
            tile,
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn padded_rows(&self) -> usize {
        self.padded_rows
    }

    #[inline]
    pub fn tile(&self) -> usize {
        self.tile
    }

    /// Number of row tiles (equal to the number of column tiles).
    #[inline]
    pub fn row_tiles(&self) -> usize {
        self.padded_rows / self.tile
    }

    /// Column tiles at or right of the diagonal for `row_tile`.
    #[inline]
    pub fn column_tiles(&self, row_tile: usize) -> Range<usize> {
        row_tile..self.row_tiles()
    }

    /// Number of tiles in the upper triangle, diagonal included.
    pub fn tile_count(&self) -> usize {
        let t = self.row_tiles();
        t * (t + 1) / 2
    }

    /// Worker that owns `row_tile` under round-robin assignment.
    #[inline]
    pub fn worker_for(&self, row_tile: usize, workers: usize) -> usize {
        row_tile % workers.max(1)
    }

    /// Row tiles per worker under round-robin assignment. Never returns more
    /// buckets than there are row tiles.
    pub fn assign_round_robin(&self, workers: usize) -> Vec<Vec<usize>> {
        let workers = workers.max(1).min(self.row_tiles().max(1));
        let mut buckets = vec![Vec::new(); workers];
        for row_tile in 0..self.row_tiles() {
            buckets[self.worker_for(row_tile, workers)].push(row_tile);
        }
        buckets
    }
}

/// Per-worker state: the cached row tile and an `f64` strip accumulating
/// one row tile's outputs across lane-group blocks.
struct RowSweep<'a, const W: usize, const P: usize> {
    rows: &'a PaddedRows<W>,
    plan: TilePlan,
    tile: RowTile<W, P>,
    strip: Vec<f64>,
}

impl<'a, const W: usize, const P: usize> RowSweep<'a, W, P> {
    fn new(rows: &'a PaddedRows<W>, plan: TilePlan) -> Self {
        Self {
            rows,
            plan,
            tile: RowTile::new(),
            strip: vec![0.0; P * plan.padded_rows()],
        }
    }

    /// Computes row tile `row_tile` and writes its upper-triangle cells into
    /// `out_rows`, the output rows it owns (`n` floats each).
    fn run(&mut self, row_tile: usize, out_rows: &mut [f32]) {
        let n = self.plan.rows();
        let row0 = row_tile * P;
        let span = self.plan.padded_rows() - row0;
        let strip = &mut self.strip[..P * span];
        strip.fill(0.0);

        for group0 in (0..self.rows.lane_groups()).step_by(P) {
            self.tile.load(self.rows, row0, group0);
            for col_tile in self.plan.column_tiles(row_tile) {
                let col0 = col_tile * P;
                let partial = tile_dot(&self.tile, self.rows, col0);
                for (i, sums) in partial.iter().enumerate() {
                    let dst = &mut strip[i * span + (col0 - row0)..][..P];
                    for (d, s) in dst.iter_mut().zip(sums) {
                        *d += s;
                    }
                }
            }
        }

        for (i, out_row) in out_rows.chunks_mut(n).enumerate() {
            let row = row0 + i;
            let sums = &strip[i * span..][..n - row0];
            for (dst, &sum) in out_row[row..].iter_mut().zip(&sums[row - row0..]) {
                *dst = sum as f32;
            }
        }

        trace!(row_tile, columns = span, "row tile swept");
    }
}

/// One sweep state per worker, allocated before any task starts.
fn worker_sweeps<'a, const W: usize, const P: usize>(
    rows: &'a PaddedRows<W>,
    plan: TilePlan,
    workers: usize,
) -> Vec<RowSweep<'a, W, P>> {
    (0..workers.max(1).min(plan.row_tiles().max(1)))
        .map(|_| RowSweep::new(rows, plan))
        .collect()
}

/// Pairs each row tile of `out` with the output rows it owns, grouped by
/// [`TilePlan::assign_round_robin`].
fn round_robin_tasks<'o>(
    plan: TilePlan,
    out: &'o mut [f32],
    workers: usize,
) -> Vec<Vec<(usize, &'o mut [f32])>> {
    let mut slots: Vec<Option<&'o mut [f32]>> = out
        .chunks_mut(plan.tile() * plan.rows())
        .map(Some)
        .collect();
    plan.assign_round_robin(workers)
        .into_iter()
        .map(|bucket| {
            bucket
                .into_iter()
                .filter_map(|row_tile| {
                    let out_rows = slots.get_mut(row_tile)?.take()?;
                    Some((row_tile, out_rows))
                })
                .collect()
        })
        .collect()
}

/// Fills the upper triangle of `out` (`n * n` floats, `n = rows.rows()`)
/// from the padded rows. `rows` must be aligned to `P`.
pub(crate) fn run_tiles<const W: usize, const P: usize>(
    rows: &PaddedRows<W>,
    out: &mut [f32],
    schedule: Schedule,
) {
    let plan = TilePlan::new(rows.rows(), P);
    let n = plan.rows();
    debug_assert_eq!(rows.padded_rows(), plan.padded_rows());
    debug_assert_eq!(out.len(), n * n);
    if n == 0 {
        return;
    }

    let workers = rayon::current_num_threads();
    let sweeps = worker_sweeps::<W, P>(rows, plan, workers);

    match schedule {
        Schedule::RoundRobin => {
            let tasks = round_robin_tasks(plan, out, workers);
            rayon::scope(|scope| {
                for (mut sweep, bucket) in sweeps.into_iter().zip(tasks) {
                    scope.spawn(move |_| {
                        for (row_tile, out_rows) in bucket {
                            sweep.run(row_tile, out_rows);
                        }
                    });
                }
            });
        }
        Schedule::WorkStealing => {
            // A sweep never yields to rayon while locked. Slots are shared
            // only when pool threads outnumber row tiles.
            let sweeps: Vec<Mutex<RowSweep<'_, W, P>>> =
                sweeps.into_iter().map(Mutex::new).collect();
            out.par_chunks_mut(P * n)
                .enumerate()
                .for_each(|(row_tile, out_rows)| {
                    let slot = rayon::current_thread_index().unwrap_or(0) % sweeps.len();
                    let mut sweep = sweeps[slot]
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    sweep.run(row_tile, out_rows);
                });
        }
    }
}
