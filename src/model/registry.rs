use std::collections::HashMap;

use super::bead::Bead;
use super::molecule::{Molecule, MoleculeState};
use super::types::{BeadId, MoleculeId};
use crate::error::Error;

/// Live beads and molecules owned by one process, indexed by id.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    beads: HashMap<BeadId, Bead>,
    molecules: HashMap<MoleculeId, Molecule>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn bead_count(&self) -> usize {
        self.beads.len()
    }

    #[inline]
    pub fn molecule_count(&self) -> usize {
        self.molecules.len()
    }

    #[inline]
    pub fn contains_bead(&self, id: BeadId) -> bool {
        self.beads.contains_key(&id)
    }

    #[inline]
    pub fn bead(&self, id: BeadId) -> Option<&Bead> {
        self.beads.get(&id)
    }

    #[inline]
    pub fn bead_mut(&mut self, id: BeadId) -> Option<&mut Bead> {
        self.beads.get_mut(&id)
    }

    pub fn position(&self, id: BeadId) -> Result<[f64; 3], Error> {
        self.beads
            .get(&id)
            .map(|b| b.position)
            .ok_or(Error::UnknownBead(id))
    }

    pub fn add_force(&mut self, id: BeadId, f: [f64; 3]) -> Result<(), Error> {
        self.beads
            .get_mut(&id)
            .map(|b| b.add_force(f))
            .ok_or(Error::UnknownBead(id))
    }

    /// Registers a live bead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownBead`] for an empty bead and
    /// [`Error::DuplicateBead`] if the id is already live here.
    pub fn insert_bead(&mut self, bead: Bead) -> Result<(), Error> {
        if bead.is_empty() {
            return Err(Error::UnknownBead(bead.id));
        }
        if self.beads.contains_key(&bead.id) {
            return Err(Error::DuplicateBead(bead.id));
        }
        self.beads.insert(bead.id, bead);
        Ok(())
    }

    pub fn remove_bead(&mut self, id: BeadId) -> Option<Bead> {
        self.beads.remove(&id)
    }

    pub fn beads(&self) -> impl Iterator<Item = &Bead> {
        self.beads.values()
    }

    pub fn beads_mut(&mut self) -> impl Iterator<Item = &mut Bead> {
        self.beads.values_mut()
    }

    /// Ids of every live bead, sorted.
    pub fn bead_ids(&self) -> Vec<BeadId> {
        let mut ids: Vec<_> = self.beads.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn clear_forces(&mut self) {
        for bead in self.beads.values_mut() {
            bead.force = [0.0; 3];
        }
    }

    #[inline]
    pub fn contains_molecule(&self, id: MoleculeId) -> bool {
        self.molecules.contains_key(&id)
    }

    #[inline]
    pub fn molecule(&self, id: MoleculeId) -> Option<&Molecule> {
        self.molecules.get(&id)
    }

    #[inline]
    pub fn molecule_mut(&mut self, id: MoleculeId) -> Option<&mut Molecule> {
        self.molecules.get_mut(&id)
    }

    /// Registers a live molecule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMolecule`] for an empty molecule and
    /// [`Error::DuplicateMolecule`] if the id is already live here.
    pub fn insert_molecule(&mut self, molecule: Molecule) -> Result<(), Error> {
        if molecule.is_empty() {
            return Err(Error::UnknownMolecule(molecule.id));
        }
        if self.molecules.contains_key(&molecule.id) {
            return Err(Error::DuplicateMolecule(molecule.id));
        }
        self.molecules.insert(molecule.id, molecule);
        Ok(())
    }

    pub fn remove_molecule(&mut self, id: MoleculeId) -> Option<Molecule> {
        self.molecules.remove(&id)
    }

    pub fn molecules(&self) -> impl Iterator<Item = &Molecule> {
        self.molecules.values()
    }

    /// Ids of every live molecule, sorted.
    pub fn molecule_ids(&self) -> Vec<MoleculeId> {
        let mut ids: Vec<_> = self.molecules.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of the molecule's members that are live on this process.
    pub fn local_member_count(&self, id: MoleculeId) -> usize {
        self.molecules.get(&id).map_or(0, |m| {
            m.beads.iter().filter(|b| self.beads.contains_key(b)).count()
        })
    }

    /// Classifies a molecule by how many of its members are local.
    pub fn molecule_state(&self, id: MoleculeId) -> MoleculeState {
        match self.molecules.get(&id) {
            None => MoleculeState::Empty,
            Some(m) => {
                let local = self.local_member_count(id);
                if local == m.bead_count() {
                    MoleculeState::Whole
                } else if local == 0 {
                    MoleculeState::Empty
                } else {
                    MoleculeState::Extended
                }
            }
        }
    }
}
