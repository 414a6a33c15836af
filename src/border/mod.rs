//! Bookkeeping for molecules that straddle a sub-domain boundary.
//!
//! [`BorderBook`] holds one [`ExtendedMolecule`] per molecule with at least
//! one member represented by a ghost. The wrapper is created when the first
//! member of a whole molecule departs, updated as members leave and
//! return, and dropped once every member is local again.

mod extended_molecule;

use std::collections::HashMap;

use log::debug;

pub use extended_molecule::ExtendedMolecule;

use crate::error::Error;
use crate::model::molecule::MoleculeState;
use crate::model::registry::Registry;
use crate::model::types::{BeadId, MoleculeId, Rank};

#[derive(Debug, Default)]
pub struct BorderBook {
    molecules: HashMap<MoleculeId, ExtendedMolecule>,
}

impl BorderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.molecules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.molecules.is_empty()
    }

    pub fn contains(&self, molecule: MoleculeId) -> bool {
        self.molecules.contains_key(&molecule)
    }

    pub fn get(&self, molecule: MoleculeId) -> Option<&ExtendedMolecule> {
        self.molecules.get(&molecule)
    }

    pub fn get_mut(&mut self, molecule: MoleculeId) -> Option<&mut ExtendedMolecule> {
        self.molecules.get_mut(&molecule)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtendedMolecule> {
        self.molecules.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ExtendedMolecule> {
        self.molecules.values_mut()
    }

    /// Ids of tracked molecules, sorted.
    pub fn molecule_ids(&self) -> Vec<MoleculeId> {
        let mut ids: Vec<_> = self.molecules.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Records that `bead` is about to leave for `dest`.
    ///
    /// Must run while the bead is still registered: a wrapper for a whole
    /// molecule is built from the local bonds at this point. Beads of
    /// single-member molecules are ignored.
    pub fn depart(
        &mut self,
        registry: &Registry,
        bead: BeadId,
        dest: Rank,
        rank: Rank,
    ) -> Result<(), Error> {
        let b = registry.bead(bead).ok_or(Error::UnknownBead(bead))?;
        let molecule = registry
            .molecule(b.molecule)
            .ok_or(Error::UnknownMolecule(b.molecule))?;
        if molecule.bead_count() < 2 {
            return Ok(());
        }
        let ext = self.molecules.entry(molecule.id).or_insert_with(|| {
            debug!("[rank {rank}] molecule {} becomes extended", molecule.id);
            ExtendedMolecule::wrap(molecule, registry, dest)
        });
        ext.detach(bead, b.position, dest)
    }

    /// Records that `bead` has arrived and been registered.
    ///
    /// Returns `true` if this made the molecule whole, in which case its
    /// wrapper is discarded.
    pub fn arrive(&mut self, registry: &Registry, bead: BeadId, rank: Rank) -> Result<bool, Error> {
        let b = registry.bead(bead).ok_or(Error::UnknownBead(bead))?;
        let mol_id = b.molecule;
        let Some(ext) = self.molecules.get_mut(&mol_id) else {
            return Ok(false);
        };
        ext.attach(bead)?;
        let whole = registry.molecule_state(mol_id) == MoleculeState::Whole;
        if whole {
            self.molecules.remove(&mol_id);
            debug!("[rank {rank}] molecule {mol_id} is whole again");
        }
        Ok(whole)
    }

    /// Starts tracking a wrapper built elsewhere, replacing any existing one.
    pub fn insert(&mut self, molecule: ExtendedMolecule) {
        self.molecules.insert(molecule.id(), molecule);
    }

    /// Drops the wrapper of a molecule that no longer has local members.
    pub fn forget(&mut self, molecule: MoleculeId) -> Option<ExtendedMolecule> {
        self.molecules.remove(&molecule)
    }

    pub fn invalidate_ghosts(&mut self) {
        for ext in self.molecules.values_mut() {
            ext.invalidate_ghosts();
        }
    }

    /// Refreshes every ghost of `bead` in any tracked molecule.
    pub fn refresh_ghost(&mut self, bead: BeadId, position: [f64; 3], owner: Rank) -> bool {
        let mut found = false;
        for ext in self.molecules.values_mut() {
            found |= ext.refresh_ghost(bead, position, owner);
        }
        found
    }
}
