//! Workload for the demonstration run: chain molecules placed at random,
//! then random-walked so that they cross sub-domain boundaries.

mod check;
mod rank;

pub use check::{Checker, RunTotals};
pub use rank::{RankJob, run_rank};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dpd_sync::{BeadId, MoleculeId, MoleculeShape, SimBox};

/// One molecule as initially placed.
#[derive(Debug, Clone)]
pub struct Seed {
    pub id: MoleculeId,
    pub head: BeadId,
    /// Unwrapped member positions, in member order.
    pub positions: Vec<[f64; 3]>,
}

#[derive(Debug, Clone)]
pub struct Workload {
    pub mol_type: i32,
    pub shape: MoleculeShape,
    pub seeds: Vec<Seed>,
}

impl Workload {
    /// Places `count` molecules with heads spread uniformly over the box and
    /// members laid out along +x at the rest length of the first bond.
    pub fn place(
        shape: MoleculeShape,
        mol_type: i32,
        count: usize,
        simbox: &SimBox,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let spacing = shape.bonds.first().map_or(0.5, |b| b.l0);
        let n = shape.bead_count() as i64;
        let seeds = (0..count as i64)
            .map(|i| {
                let head = [
                    rng.gen_range(0.0..simbox.size[0]),
                    rng.gen_range(0.0..simbox.size[1]),
                    rng.gen_range(0.0..simbox.size[2]),
                ];
                let positions = (0..shape.bead_count())
                    .map(|j| {
                        [
                            head[0] + spacing * j as f64,
                            head[1] + rng.gen_range(-0.05..0.05),
                            head[2] + rng.gen_range(-0.05..0.05),
                        ]
                    })
                    .collect();
                Seed {
                    id: i,
                    head: i * n,
                    positions,
                }
            })
            .collect();
        Self {
            mol_type,
            shape,
            seeds,
        }
    }

    pub fn bead_count(&self) -> usize {
        self.seeds.len() * self.shape.bead_count()
    }
}

/// Step displacement parameters, shared by every rank.
#[derive(Debug, Clone, Copy)]
pub struct Walk {
    pub seed: u64,
    pub drift: f64,
    pub jitter: f64,
}

impl Walk {
    /// Displacement of `bead` of `molecule` at `step`: a rigid shift shared
    /// by all members plus a small independent one. Depends only on its
    /// arguments, so members on different ranks shift together.
    pub fn displacement(&self, molecule: MoleculeId, bead: BeadId, step: usize) -> [f64; 3] {
        let mut shared = StdRng::seed_from_u64(mix(self.seed, molecule as u64, step as u64, 0));
        let mut own = StdRng::seed_from_u64(mix(self.seed, bead as u64, step as u64, 1));
        let mut d = [0.0; 3];
        for axis in &mut d {
            *axis = shared.gen_range(-self.drift..=self.drift)
                + own.gen_range(-self.jitter..=self.jitter);
        }
        d
    }
}

fn mix(seed: u64, id: u64, step: u64, stream: u64) -> u64 {
    let mut h = seed ^ 0x9E37_79B9_7F4A_7C15;
    for v in [id, step, stream] {
        h = (h ^ v).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        h ^= h >> 31;
    }
    h
}

/// Keeps `p` inside a closed box by reflecting off the walls of
/// non-periodic axes; periodic axes are wrapped.
pub fn confine(simbox: &SimBox, p: [f64; 3]) -> [f64; 3] {
    let mut out = simbox.wrap(p);
    for axis in 0..3 {
        if simbox.periodic[axis] {
            continue;
        }
        let l = simbox.size[axis];
        let x = out[axis].rem_euclid(2.0 * l);
        out[axis] = if x < l { x } else { (2.0 * l - x).min(l * (1.0 - f64::EPSILON)) };
    }
    out
}
