//! The per-process simulation context.
//!
//! A [`Domain`] owns everything one rank needs to take part in bead
//! migration and bonded-force evaluation: the live bead and molecule
//! registry, the recycling pool, border bookkeeping for split molecules and
//! the transport to its neighbours. The surrounding simulation loop drives
//! it once per step:
//!
//! 1. [`Domain::plan_departures`] and [`Domain::migrate`] hand beads that
//!    left the sub-domain to their new owners.
//! 2. [`Domain::exchange_ghosts`] refreshes ghost positions.
//! 3. [`Domain::bonded_forces`] evaluates every bonded term touching a
//!    local bead.
//!
//! Each step is collective: every rank must call it, in the same order.

mod forces;
mod ghost_sync;
mod migration;
mod partition;

use log::{error, warn};

pub use forces::molecule_forces;
pub use ghost_sync::GhostReport;
pub use migration::{MigrationReport, RejectedBatch};
pub use partition::Partition;

use crate::border::BorderBook;
use crate::config::SyncConfig;
use crate::error::Error;
use crate::migrate::{ObjectPool, Transport};
use crate::model::bead::Bead;
use crate::model::registry::Registry;
use crate::model::types::{BeadId, MoleculeId, Rank, SimBox};

pub struct Domain<T: Transport> {
    rank: Rank,
    config: SyncConfig,
    partition: Partition,
    registry: Registry,
    pool: ObjectPool,
    border: BorderBook,
    transport: T,
}

impl<T: Transport> Domain<T> {
    /// Creates an empty domain for the transport's rank.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if the configuration is out of range, the
    /// partition does not have one sub-domain per rank, or a sub-domain is
    /// narrower than the longest bond or bend of any template. Ghosts and
    /// migrating beads only ever travel between neighbouring ranks.
    pub fn new(transport: T, partition: Partition, config: SyncConfig) -> Result<Self, Error> {
        config.validate()?;
        if transport.size() != partition.size() {
            return Err(Error::InvalidConfig(format!(
                "{} ranks cannot cover a {:?} partition",
                transport.size(),
                partition.grid()
            )));
        }
        let span = config.max_bonded_span();
        if let Some(width) = partition.narrowest_width().filter(|&w| w < span) {
            return Err(Error::InvalidConfig(format!(
                "sub-domains of a {:?} partition are {width} wide, narrower than the bonded span {span}",
                partition.grid()
            )));
        }
        Ok(Self {
            rank: transport.rank(),
            config,
            partition,
            registry: Registry::new(),
            pool: ObjectPool::new(),
            border: BorderBook::new(),
            transport,
        })
    }

    #[inline]
    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn simbox(&self) -> &SimBox {
        self.partition.simbox()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Direct access for the integrator: positions, velocities and forces
    /// may be changed freely, membership should not be.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn pool(&self) -> &ObjectPool {
        &self.pool
    }

    pub fn border(&self) -> &BorderBook {
        &self.border
    }

    /// Builds a whole molecule of type `mol_type` from its template and
    /// registers it on this rank.
    ///
    /// Members receive ids `head, head + 1, …`; bond and bend ids also start
    /// at `head`, which keeps them unique because a molecule has fewer bonds
    /// than beads. Positions are wrapped into the box; the unwrapped and
    /// initial coordinates keep the given values.
    pub fn spawn_molecule(
        &mut self,
        id: MoleculeId,
        mol_type: i32,
        head: BeadId,
        positions: &[[f64; 3]],
    ) -> Result<(), Error> {
        let shape = self
            .config
            .shape(mol_type)
            .ok_or(Error::UnknownMoleculeType(mol_type))?;
        if positions.len() != shape.bead_count() {
            return Err(Error::topology(
                id,
                format!(
                    "{} positions for a {}-bead '{}'",
                    positions.len(),
                    shape.bead_count(),
                    shape.name
                ),
            ));
        }
        if self.registry.contains_molecule(id) {
            return Err(Error::DuplicateMolecule(id));
        }
        let ids = (0..positions.len() as i64).map(|j| head + j);
        if let Some(dup) = ids.clone().find(|&b| self.registry.contains_bead(b)) {
            return Err(Error::DuplicateBead(dup));
        }

        let mut molecule = self.pool.pop_molecule();
        shape.fill(&mut molecule, id, mol_type, head, head, head);
        for ((bead_id, &bead_type), &p) in ids.zip(&shape.bead_types).zip(positions) {
            let radius = self.config.bead_radius(bead_type);
            let mut bead = Bead::new(bead_id, bead_type, radius, self.partition.simbox().wrap(p));
            bead.molecule = id;
            bead.unwrapped = p;
            bead.initial = p;
            let bead = self.pool.adopt_bead(bead);
            self.registry.insert_bead(bead)?;
        }
        self.registry.insert_molecule(molecule)
    }

    /// Logs a failed collective step with the rank and passes the error on.
    fn log_failure(&self, step: &str, e: Error) -> Error {
        if e.is_fatal() {
            error!("[rank {}] {step} failed, the run cannot continue: {e}", self.rank);
        } else {
            warn!("[rank {}] {step} failed: {e}", self.rank);
        }
        e
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use crate::migrate::LocalNetwork;

    fn single_rank() -> Domain<crate::migrate::LocalTransport> {
        let transport = LocalNetwork::new(1).pop().unwrap();
        let partition = Partition::slabs(1, SimBox::new([10.0; 3], [true; 3])).unwrap();
        Domain::new(transport, partition, load_config(None).unwrap()).unwrap()
    }

    #[test]
    fn spawned_molecule_follows_template() {
        let mut domain = single_rank();
        let positions: Vec<[f64; 3]> = (0..5).map(|j| [9.5 + 0.4 * j as f64, 5.0, 5.0]).collect();
        domain.spawn_molecule(3, 1, 100, &positions).unwrap();

        let reg = domain.registry();
        let mol = reg.molecule(3).unwrap();
        assert_eq!(mol.beads, vec![100, 101, 102, 103, 104]);
        assert_eq!(mol.first_bond_id(), 100);
        assert_eq!(mol.first_bond_pair_id(), 100);
        // Wrapped into the box, unwrapped copy kept.
        let b = reg.bead(103).unwrap();
        assert!((b.position[0] - 0.7).abs() < 1e-12);
        assert_eq!(b.unwrapped[0], positions[3][0]);
        assert_eq!(b.molecule, 3);
        assert_eq!(domain.pool().allocated_beads(), 5);
        assert_eq!(domain.pool().free_beads(), 0);
    }

    #[test]
    fn spawn_rejects_conflicts() {
        let mut domain = single_rank();
        assert!(matches!(
            domain.spawn_molecule(1, 9, 0, &[[1.0; 3]]),
            Err(Error::UnknownMoleculeType(9))
        ));
        assert!(matches!(
            domain.spawn_molecule(1, 0, 0, &[[1.0; 3], [2.0; 3]]),
            Err(Error::Topology { .. })
        ));
        domain.spawn_molecule(1, 0, 0, &[[1.0; 3]]).unwrap();
        assert!(matches!(
            domain.spawn_molecule(1, 0, 5, &[[1.0; 3]]),
            Err(Error::DuplicateMolecule(1))
        ));
        assert!(matches!(
            domain.spawn_molecule(2, 0, 0, &[[1.0; 3]]),
            Err(Error::DuplicateBead(0))
        ));
    }

    #[test]
    fn rank_count_must_match_partition() {
        let transport = LocalNetwork::new(2).pop().unwrap();
        let partition = Partition::slabs(3, SimBox::new([10.0; 3], [true; 3])).unwrap();
        assert!(matches!(
            Domain::new(transport, partition, load_config(None).unwrap()),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn sub_domains_must_hold_a_bend() {
        let simbox = SimBox::new([24.0, 8.0, 8.0], [true; 3]);
        let config = load_config(None).unwrap();

        // 30 slabs of 0.8 cannot hold a lipid bend spanning 1.0.
        let transport = LocalNetwork::new(30).pop().unwrap();
        let partition = Partition::slabs(30, simbox).unwrap();
        assert!(matches!(
            Domain::new(transport, partition, config.clone()),
            Err(Error::InvalidConfig(_))
        ));

        let transport = LocalNetwork::new(24).pop().unwrap();
        let partition = Partition::slabs(24, simbox).unwrap();
        assert!(Domain::new(transport, partition, config).is_ok());

        // Water alone has no bonded terms, so any width will do.
        let water = load_config(Some("[[molecule_types]]\nname = \"Water\"\nbead_types = [0]\n")).unwrap();
        let transport = LocalNetwork::new(30).pop().unwrap();
        let partition = Partition::slabs(30, simbox).unwrap();
        assert!(Domain::new(transport, partition, water).is_ok());
    }
}
