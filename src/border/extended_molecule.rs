use crate::bonded::{BondEnd, ExtendedBond, ExtendedBondPair, GhostBead};
use crate::error::Error;
use crate::model::molecule::Molecule;
use crate::model::registry::Registry;
use crate::model::types::{BeadId, BondId, BondPairId, MoleculeId, Rank};

/// Bonded topology of a molecule whose members are split between this
/// process and others.
///
/// Members are addressed by location; with contiguous member ids the
/// first bead id plus a location identifies any member, local or not.
/// Bond `i` of the wrapper corresponds to bond `i` of the molecule, and
/// bends index bonds the same way.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedMolecule {
    id: MoleculeId,
    mol_type: i32,
    first_bond: BondId,
    first_pair: BondPairId,
    members: Vec<BeadId>,
    bonds: Vec<ExtendedBond>,
    pairs: Vec<ExtendedBondPair>,
}

impl ExtendedMolecule {
    /// Wraps a registered molecule. Members absent from `registry` become
    /// ghosts owned by `remote_owner` with no valid position yet.
    pub fn wrap(molecule: &Molecule, registry: &Registry, remote_owner: Rank) -> Self {
        let end = |id: BeadId| {
            if registry.contains_bead(id) {
                BondEnd::Local(id)
            } else {
                BondEnd::Ghost(GhostBead::pending(id, remote_owner))
            }
        };
        let bonds = molecule
            .bonds
            .iter()
            .map(|b| {
                let head = molecule.beads[b.head];
                let tail = molecule.beads[b.tail];
                ExtendedBond::with_ends(b.clone(), end(head), end(tail))
            })
            .collect();
        let pairs = molecule
            .bond_pairs
            .iter()
            .cloned()
            .map(ExtendedBondPair::from_pair)
            .collect();
        Self {
            id: molecule.id,
            mol_type: molecule.mol_type,
            first_bond: molecule.first_bond_id(),
            first_pair: molecule.first_bond_pair_id(),
            members: molecule.beads.clone(),
            bonds,
            pairs,
        }
    }

    #[inline]
    pub fn id(&self) -> MoleculeId {
        self.id
    }

    #[inline]
    pub fn mol_type(&self) -> i32 {
        self.mol_type
    }

    pub fn first_bond_id(&self) -> BondId {
        self.first_bond
    }

    pub fn first_bond_pair_id(&self) -> BondPairId {
        self.first_pair
    }

    pub fn members(&self) -> &[BeadId] {
        &self.members
    }

    /// Location of a member within the molecule.
    pub fn location_of(&self, bead: BeadId) -> Option<usize> {
        self.members.iter().position(|&m| m == bead)
    }

    pub fn bonds(&self) -> &[ExtendedBond] {
        &self.bonds
    }

    pub fn pairs(&self) -> &[ExtendedBondPair] {
        &self.pairs
    }

    /// Mutable bonds alongside the bends that index them.
    pub fn parts_mut(&mut self) -> (&mut [ExtendedBond], &[ExtendedBondPair]) {
        (&mut self.bonds, &self.pairs)
    }

    /// Replaces every reference to a departing member with a ghost.
    ///
    /// # Errors
    ///
    /// [`Error::Topology`] if `bead` is not a member.
    pub fn detach(&mut self, bead: BeadId, position: [f64; 3], owner: Rank) -> Result<(), Error> {
        if self.location_of(bead).is_none() {
            return Err(Error::topology(self.id, format!("bead {bead} is not a member")));
        }
        for bond in &mut self.bonds {
            if bond.head_id() == bead || bond.tail_id() == bead {
                bond.detach(GhostBead::new(bead, position, owner));
            }
        }
        Ok(())
    }

    /// Replaces every ghost of an arriving member with the local bead.
    pub fn attach(&mut self, bead: BeadId) -> Result<(), Error> {
        if self.location_of(bead).is_none() {
            return Err(Error::topology(self.id, format!("bead {bead} is not a member")));
        }
        for bond in &mut self.bonds {
            bond.localize(bead);
        }
        Ok(())
    }

    /// Updates every ghost of `bead`. Returns `false` if there is none.
    pub fn refresh_ghost(&mut self, bead: BeadId, position: [f64; 3], owner: Rank) -> bool {
        let mut found = false;
        for g in self.bonds.iter_mut().flat_map(|b| b.ghosts_mut()) {
            if g.id() == bead {
                g.refresh(position, owner);
                found = true;
            }
        }
        found
    }

    /// Marks every ghost position stale ahead of a border exchange.
    pub fn invalidate_ghosts(&mut self) {
        for bond in &mut self.bonds {
            bond.invalidate_ghosts();
        }
    }

    /// Ids of members currently represented by ghosts, ascending.
    pub fn ghost_ids(&self) -> Vec<BeadId> {
        let mut ids: Vec<_> = self
            .bonds
            .iter()
            .flat_map(|b| b.ghosts())
            .map(GhostBead::id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Ghosts still lacking a position after the last exchange.
    pub fn stale_ghosts(&self) -> Vec<BeadId> {
        let mut ids: Vec<_> = self
            .bonds
            .iter()
            .flat_map(|b| b.ghosts())
            .filter(|g| g.is_empty())
            .map(GhostBead::id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// `true` once no bond references a ghost.
    pub fn is_whole(&self) -> bool {
        self.bonds.iter().all(ExtendedBond::is_concrete)
    }
}
