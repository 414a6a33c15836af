use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Result, bail};

use dpd_sync::config::ForceParams;
use dpd_sync::model::types::norm;
use dpd_sync::{BeadId, ForceContext, Molecule, Rank, SimBox, molecule_forces};

use super::Workload;
use super::rank::Snapshot;

/// Result of verifying one step across all ranks.
#[derive(Debug, Clone, Default)]
pub struct StepCheck {
    pub step: usize,
    /// Beads handed to another rank.
    pub moved: usize,
    /// Split molecules, counted once per rank holding a part.
    pub split: usize,
    /// Largest relative deviation from the serial force evaluation.
    pub force_error: f64,
}

/// Totals over the verified steps.
#[derive(Debug, Clone, Default)]
pub struct RunTotals {
    pub steps: usize,
    pub linear_sent: usize,
    pub planar_sent: usize,
    pub rejected: usize,
    pub became_whole: usize,
    pub peak_split: usize,
    pub stale_ghosts: usize,
    pub remote_shares: usize,
    pub max_force_error: f64,
    /// Per rank: beads held and pooled storage after the last step.
    pub final_ranks: Vec<RankTally>,
}

#[derive(Debug, Clone, Default)]
pub struct RankTally {
    pub rank: Rank,
    pub beads: usize,
    pub pool_free: usize,
    pub pool_allocated: usize,
}

/// Collects snapshots as ranks report them and verifies each step once
/// every rank has reported it:
///
/// - every bead is held by exactly one rank;
/// - every force equals the serial evaluation of the whole molecule;
/// - every remote force share is addressed to the rank holding the bead.
pub struct Checker {
    workload: Arc<Workload>,
    simbox: SimBox,
    params: ForceParams,
    ranks: usize,
    tolerance: f64,
    pending: BTreeMap<usize, Vec<Snapshot>>,
    totals: RunTotals,
}

impl Checker {
    pub fn new(
        workload: Arc<Workload>,
        simbox: SimBox,
        params: ForceParams,
        ranks: usize,
        tolerance: f64,
    ) -> Self {
        Self {
            workload,
            simbox,
            params,
            ranks,
            tolerance,
            pending: BTreeMap::new(),
            totals: RunTotals::default(),
        }
    }

    /// Files a snapshot; verifies its step if it was the last one missing.
    pub fn accept(&mut self, snapshot: Snapshot) -> Result<Option<StepCheck>> {
        let step = snapshot.step;
        let reported = self.pending.entry(step).or_default();
        reported.push(snapshot);
        if reported.len() < self.ranks {
            return Ok(None);
        }
        let Some(mut snapshots) = self.pending.remove(&step) else {
            return Ok(None);
        };
        snapshots.sort_by_key(|s| s.rank);
        let check = self.verify(step, &snapshots)?;
        self.record(&check, &snapshots);
        Ok(Some(check))
    }

    pub fn finish(self) -> RunTotals {
        self.totals
    }

    fn verify(&self, step: usize, snapshots: &[Snapshot]) -> Result<StepCheck> {
        let mut owner: HashMap<BeadId, Rank> = HashMap::new();
        let mut state: HashMap<BeadId, ([f64; 3], [f64; 3])> = HashMap::new();
        for snap in snapshots {
            for b in &snap.beads {
                if let Some(other) = owner.insert(b.id, snap.rank) {
                    bail!(
                        "step {step}: bead {} is held by both rank {other} and rank {}",
                        b.id,
                        snap.rank
                    );
                }
                state.insert(b.id, (b.position, b.force));
            }
        }
        let expected = self.workload.bead_count();
        if owner.len() != expected {
            bail!(
                "step {step}: {} beads are held across all ranks, {expected} were placed",
                owner.len()
            );
        }

        for snap in snapshots {
            for &(to, bead) in &snap.owed {
                if owner.get(&bead) != Some(&to) {
                    bail!(
                        "step {step}: rank {} owes a force on bead {bead} to rank {to}, which does not hold it",
                        snap.rank
                    );
                }
            }
        }

        let ctx = ForceContext {
            simbox: &self.simbox,
            params: &self.params,
            rank: 0,
        };
        let shape = &self.workload.shape;
        let mut molecule = Molecule::empty(0);
        let mut force_error = 0.0f64;
        for seed in &self.workload.seeds {
            shape.fill(&mut molecule, seed.id, self.workload.mol_type, seed.head, seed.head, seed.head);
            let mut positions = Vec::with_capacity(molecule.beads.len());
            for id in &molecule.beads {
                match state.get(id) {
                    Some((p, _)) => positions.push(*p),
                    None => bail!("step {step}: bead {id} of molecule {} is missing", seed.id),
                }
            }
            let reference = molecule_forces(&molecule, &positions, &ctx)?;
            for (id, expected) in molecule.beads.iter().zip(reference) {
                let Some((_, got)) = state.get(id) else {
                    continue;
                };
                let diff = [got[0] - expected[0], got[1] - expected[1], got[2] - expected[2]];
                let err = norm(diff) / norm(expected).max(1.0);
                force_error = force_error.max(err);
                if err > self.tolerance {
                    bail!(
                        "step {step}: force on bead {id} (rank {}) is {got:?}, serial evaluation gives {expected:?}",
                        owner[id]
                    );
                }
            }
        }

        Ok(StepCheck {
            step,
            moved: snapshots.iter().map(|s| s.linear_sent + s.planar_sent).sum(),
            split: snapshots.iter().map(|s| s.split).sum(),
            force_error,
        })
    }

    fn record(&mut self, check: &StepCheck, snapshots: &[Snapshot]) {
        let t = &mut self.totals;
        t.steps += 1;
        t.peak_split = t.peak_split.max(check.split);
        t.max_force_error = t.max_force_error.max(check.force_error);
        for s in snapshots {
            t.linear_sent += s.linear_sent;
            t.planar_sent += s.planar_sent;
            t.rejected += s.rejected;
            t.became_whole += s.became_whole;
            t.stale_ghosts += s.stale_ghosts;
            t.remote_shares += s.owed.len();
        }
        t.final_ranks = snapshots
            .iter()
            .map(|s| RankTally {
                rank: s.rank,
                beads: s.beads.len(),
                pool_free: s.pool_free,
                pool_allocated: s.pool_allocated,
            })
            .collect();
    }
}
