use serde::Deserialize;

use super::bead::StorageTag;
use super::bond::{Bond, BondPair};
use super::types::{BeadId, BondId, BondPairId, INVALID_ID, MoleculeId, is_valid_id};

/// Where a molecule's members currently live, as seen from one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoleculeState {
    /// Every member is local.
    Whole,
    /// Some members are local, the rest are represented by ghosts.
    Extended,
    /// Recycled storage holding no live data.
    Empty,
}

/// Ordered sequence of beads plus the bonds and bends connecting them.
///
/// Bonds and bends address members by index into [`beads`](Self::beads).
/// Member ids, bond ids and bend ids of one molecule are contiguous and
/// assigned in member order.
#[derive(Debug, Clone, PartialEq)]
pub struct Molecule {
    pub id: MoleculeId,
    pub mol_type: i32,
    pub beads: Vec<BeadId>,
    pub bonds: Vec<Bond>,
    pub bond_pairs: Vec<BondPair>,
    pub storage: StorageTag,
}

impl Molecule {
    pub fn empty(storage: StorageTag) -> Self {
        Self {
            id: INVALID_ID,
            mol_type: 0,
            beads: Vec::new(),
            bonds: Vec::new(),
            bond_pairs: Vec::new(),
            storage,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !is_valid_id(self.id)
    }

    /// Clears live data but keeps allocated capacity for reuse.
    pub fn clear(&mut self) {
        self.id = INVALID_ID;
        self.mol_type = 0;
        self.beads.clear();
        self.bonds.clear();
        self.bond_pairs.clear();
    }

    #[inline]
    pub fn head(&self) -> Option<BeadId> {
        self.beads.first().copied()
    }

    #[inline]
    pub fn tail(&self) -> Option<BeadId> {
        self.beads.last().copied()
    }

    #[inline]
    pub fn bead_count(&self) -> usize {
        self.beads.len()
    }

    /// Zero-based location of `bead` within this molecule.
    pub fn location_of(&self, bead: BeadId) -> Option<usize> {
        self.beads.iter().position(|&b| b == bead)
    }

    /// Id of the first bond, or [`INVALID_ID`] for bondless molecules.
    pub fn first_bond_id(&self) -> BondId {
        self.bonds.first().map_or(INVALID_ID, |b| b.id)
    }

    /// Id of the first bend, or [`INVALID_ID`] if there are none.
    pub fn first_bond_pair_id(&self) -> BondPairId {
        self.bond_pairs.first().map_or(INVALID_ID, |p| p.id)
    }
}

/// Bond entry of a [`MoleculeShape`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BondShape {
    pub head: usize,
    pub tail: usize,
    pub k: f64,
    pub l0: f64,
}

/// Bend entry of a [`MoleculeShape`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BendShape {
    pub first: usize,
    pub second: usize,
    pub modulus: f64,
    #[serde(default)]
    pub phi0: f64,
}

/// Topology template shared by every molecule of one type.
///
/// A process that receives a member of a molecule it has never held uses the
/// template to rebuild the bonds and bends.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MoleculeShape {
    pub name: String,
    pub bead_types: Vec<i32>,
    #[serde(default)]
    pub bonds: Vec<BondShape>,
    #[serde(default)]
    pub bends: Vec<BendShape>,
}

impl MoleculeShape {
    #[inline]
    pub fn bead_count(&self) -> usize {
        self.bead_types.len()
    }

    /// Checks member and bond indices and that every bend joins two bonds
    /// through a shared middle bead.
    pub fn check(&self) -> Result<(), String> {
        let n = self.bead_count();
        if n == 0 {
            return Err(format!("molecule type '{}' has no beads", self.name));
        }
        for (i, b) in self.bonds.iter().enumerate() {
            if b.head >= n || b.tail >= n || b.head == b.tail {
                return Err(format!(
                    "molecule type '{}': bond {i} joins members {} and {} (bead count {n})",
                    self.name, b.head, b.tail
                ));
            }
        }
        for (i, p) in self.bends.iter().enumerate() {
            let (Some(first), Some(second)) = (self.bonds.get(p.first), self.bonds.get(p.second))
            else {
                return Err(format!(
                    "molecule type '{}': bend {i} references missing bond",
                    self.name
                ));
            };
            if first.head != second.tail {
                return Err(format!(
                    "molecule type '{}': bend {i} bonds do not share a middle bead",
                    self.name
                ));
            }
        }
        Ok(())
    }

    /// Longest rest-length reach of one bonded term: a single bond, or the
    /// two bonds of a bend laid end to end.
    pub fn bonded_span(&self) -> f64 {
        let bond_len = |i: usize| self.bonds.get(i).map_or(0.0, |b| b.l0.abs());
        let bonds = (0..self.bonds.len()).map(bond_len);
        let bends = self.bends.iter().map(|p| bond_len(p.first) + bond_len(p.second));
        bonds.chain(bends).fold(0.0, f64::max)
    }

    /// Fills `molecule` with the topology of this shape.
    ///
    /// `head_bead` is the id of member 0; the remaining members, bonds and
    /// bends receive consecutive ids.
    pub fn fill(
        &self,
        molecule: &mut Molecule,
        id: MoleculeId,
        mol_type: i32,
        head_bead: BeadId,
        first_bond: BondId,
        first_pair: BondPairId,
    ) {
        molecule.clear();
        molecule.id = id;
        molecule.mol_type = mol_type;
        molecule
            .beads
            .extend((0..self.bead_count() as i64).map(|j| head_bead + j));
        molecule.bonds.extend(
            self.bonds
                .iter()
                .enumerate()
                .map(|(i, b)| Bond::new(first_bond + i as i64, b.head, b.tail, b.k, b.l0)),
        );
        molecule.bond_pairs.extend(self.bends.iter().enumerate().map(|(i, p)| {
            BondPair::new(first_pair + i as i64, p.first, p.second, p.modulus, p.phi0)
        }));
    }
}
