use std::fmt;

use crate::model::bead::Bead;
use crate::model::types::{BeadId, BondId, BondPairId, MoleculeId};

/// Which topology metadata accompanies each bead in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    /// Beads of free molecules, re-assembled by migration order.
    Linear,
    /// Beads of molecules that stay spread across processes, placed by exact
    /// location within the molecule.
    Planar,
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferKind::Linear => write!(f, "linear"),
            TransferKind::Planar => write!(f, "planar"),
        }
    }
}

/// Per-bead topology metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Linear {
        /// Number of beads of the same molecule packed before this one.
        migration_order: i32,
    },
    Planar {
        /// Zero-based location within the molecule's member list.
        location: i32,
        first_bond: BondId,
        first_pair: BondPairId,
    },
}

impl Placement {
    pub fn kind(&self) -> TransferKind {
        match self {
            Placement::Linear { .. } => TransferKind::Linear,
            Placement::Planar { .. } => TransferKind::Planar,
        }
    }
}

/// Everything transmitted for one bead.
#[derive(Debug, Clone, PartialEq)]
pub struct BeadRecord {
    pub id: BeadId,
    pub display_id: i64,
    pub visible: bool,
    pub bead_type: i32,
    pub molecule_id: MoleculeId,
    pub molecule_type: i32,
    pub placement: Placement,
    pub position: [f64; 3],
    pub velocity: [f64; 3],
    pub old_velocity: [f64; 3],
    pub old_force: [f64; 3],
    /// Carried by linear batches only.
    pub unwrapped: [f64; 3],
    /// Carried by linear batches only.
    pub initial: [f64; 3],
}

impl BeadRecord {
    /// Snapshots the transmitted state of a live bead.
    pub fn capture(bead: &Bead, molecule_type: i32, placement: Placement) -> Self {
        Self {
            id: bead.id,
            display_id: bead.display_id,
            visible: bead.visible,
            bead_type: bead.bead_type,
            molecule_id: bead.molecule,
            molecule_type,
            placement,
            position: bead.position,
            velocity: bead.velocity,
            old_velocity: bead.old_velocity,
            old_force: bead.old_force,
            unwrapped: bead.unwrapped,
            initial: bead.initial,
        }
    }

    /// Fills a pooled bead with this record.
    ///
    /// The current force starts at zero. Planar records do not carry the
    /// unwrapped or initial coordinates; both restart at the current
    /// position.
    pub fn restore_into(&self, bead: &mut Bead, radius: f64) {
        let storage = bead.storage;
        *bead = Bead::new(self.id, self.bead_type, radius, self.position);
        bead.storage = storage;
        bead.display_id = self.display_id;
        bead.visible = self.visible;
        bead.molecule = self.molecule_id;
        bead.velocity = self.velocity;
        bead.old_velocity = self.old_velocity;
        bead.old_force = self.old_force;
        if let Placement::Linear { .. } = self.placement {
            bead.unwrapped = self.unwrapped;
            bead.initial = self.initial;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bead() -> Bead {
        let mut b = Bead::new(101, 2, 0.5, [1.0, 2.0, 3.0]).in_molecule(77);
        b.display_id = 5101;
        b.visible = false;
        b.unwrapped = [11.0, 2.0, 3.0];
        b.initial = [0.5, 0.5, 0.5];
        b.velocity = [0.1, 0.2, 0.3];
        b.old_velocity = [0.4, 0.5, 0.6];
        b.old_force = [7.0, 8.0, 9.0];
        b.force = [3.0, 3.0, 3.0];
        b.storage = 4;
        b
    }

    #[test]
    fn linear_restore_reproduces_bead() {
        let bead = sample_bead();
        let rec = BeadRecord::capture(&bead, 1, Placement::Linear { migration_order: 0 });
        let mut target = Bead::empty(9);
        rec.restore_into(&mut target, 0.5);

        assert_eq!(target.storage, 9);
        assert_eq!(target.force, [0.0; 3]);
        let expected = Bead {
            storage: 9,
            force: [0.0; 3],
            ..bead
        };
        assert_eq!(target, expected);
    }

    #[test]
    fn planar_restore_restarts_history() {
        let bead = sample_bead();
        let rec = BeadRecord::capture(
            &bead,
            1,
            Placement::Planar {
                location: 2,
                first_bond: 40,
                first_pair: 9,
            },
        );
        let mut target = Bead::empty(0);
        rec.restore_into(&mut target, 0.7);

        assert_eq!(target.id, 101);
        assert_eq!(target.radius, 0.7);
        assert_eq!(target.old_force, bead.old_force);
        assert_eq!(target.unwrapped, bead.position);
        assert_eq!(target.initial, bead.position);
        assert!(!target.visible);
        assert_eq!(target.molecule, 77);
    }

    #[test]
    fn placement_reports_kind() {
        assert_eq!(
            Placement::Linear { migration_order: 3 }.kind(),
            TransferKind::Linear
        );
        assert_eq!(TransferKind::Planar.to_string(), "planar");
    }
}
