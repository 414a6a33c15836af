use std::sync::Arc;
use std::sync::mpsc::Sender;

use log::{debug, info};

use dpd_sync::{BeadId, Domain, Error, LocalTransport, Rank};

use super::{Walk, Workload, confine};

/// State of one bead as reported after a step.
#[derive(Debug, Clone)]
pub struct BeadState {
    pub id: BeadId,
    pub position: [f64; 3],
    pub force: [f64; 3],
}

/// Everything one rank reports about one step.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub rank: Rank,
    pub step: usize,
    pub beads: Vec<BeadState>,
    pub linear_sent: usize,
    pub planar_sent: usize,
    pub rejected: usize,
    pub became_whole: usize,
    /// Molecules with members on other ranks.
    pub split: usize,
    pub stale_ghosts: usize,
    /// `(owner, bead)` for every force share computed here for a remote bead.
    pub owed: Vec<(Rank, BeadId)>,
    pub pool_free: usize,
    pub pool_allocated: usize,
}

pub struct RankJob {
    pub domain: Domain<LocalTransport>,
    pub workload: Arc<Workload>,
    pub walk: Walk,
    pub steps: usize,
    pub reports: Sender<Snapshot>,
}

/// Runs every step on one rank. Returns early, without error, once the
/// driver stops listening.
pub fn run_rank(job: RankJob) -> Result<(), Error> {
    let RankJob {
        mut domain,
        workload,
        walk,
        steps,
        reports,
    } = job;
    let rank = domain.rank();

    let mut spawned = 0;
    for seed in &workload.seeds {
        if domain.partition().owner_of(seed.positions[0]) == rank {
            domain.spawn_molecule(seed.id, workload.mol_type, seed.head, &seed.positions)?;
            spawned += 1;
        }
    }
    info!("[rank {rank}] spawned {spawned} molecules");

    for step in 1..=steps {
        displace(&mut domain, &walk, step);

        let departures = domain.plan_departures();
        let migration = domain.migrate(&departures)?;
        let ghosts = domain.exchange_ghosts()?;
        let ledger = domain.bonded_forces()?;

        let mut owed = Vec::new();
        for owner in ledger.ranks() {
            if let Some(shares) = ledger.for_rank(owner) {
                owed.extend(shares.keys().map(|&bead| (owner, bead)));
            }
        }

        let snapshot = Snapshot {
            rank,
            step,
            beads: domain
                .registry()
                .beads()
                .map(|b| BeadState {
                    id: b.id,
                    position: b.position,
                    force: b.force,
                })
                .collect(),
            linear_sent: migration.linear_sent,
            planar_sent: migration.planar_sent,
            rejected: migration.rejected.iter().map(|r| r.beads).sum(),
            became_whole: migration.became_whole,
            split: domain.border().len(),
            stale_ghosts: ghosts.stale.len(),
            owed,
            pool_free: domain.pool().free_beads(),
            pool_allocated: domain.pool().allocated_beads(),
        };
        if reports.send(snapshot).is_err() {
            debug!("[rank {rank}] driver stopped listening after step {step}");
            return Ok(());
        }
    }
    Ok(())
}

fn displace(domain: &mut Domain<LocalTransport>, walk: &Walk, step: usize) {
    let simbox = *domain.simbox();
    for bead in domain.registry_mut().beads_mut() {
        let d = walk.displacement(bead.molecule, bead.id, step);
        let target = [
            bead.position[0] + d[0],
            bead.position[1] + d[1],
            bead.position[2] + d[2],
        ];
        let moved = confine(&simbox, target);
        let applied = simbox.separation(moved, bead.position);
        for axis in 0..3 {
            bead.unwrapped[axis] += applied[axis];
        }
        bead.position = moved;
    }
}
