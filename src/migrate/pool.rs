use crate::model::bead::{Bead, StorageTag};
use crate::model::molecule::Molecule;

/// Recycled bead and molecule storage owned by one process.
///
/// Every object handed out carries a storage tag that is unique among all
/// objects this pool ever allocated, so live beads never share a slot.
/// Objects are only ever created here; the number of free objects plus the
/// number of live objects therefore equals [`allocated_beads`]
/// (resp. [`allocated_molecules`]) at all times.
///
/// [`allocated_beads`]: ObjectPool::allocated_beads
/// [`allocated_molecules`]: ObjectPool::allocated_molecules
#[derive(Debug, Default)]
pub struct ObjectPool {
    beads: Vec<Bead>,
    molecules: Vec<Molecule>,
    next_bead_tag: StorageTag,
    next_molecule_tag: StorageTag,
}

impl ObjectPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Free beads ready for reuse.
    pub fn free_beads(&self) -> usize {
        self.beads.len()
    }

    pub fn free_molecules(&self) -> usize {
        self.molecules.len()
    }

    /// Beads ever created by this pool, free or live.
    pub fn allocated_beads(&self) -> usize {
        self.next_bead_tag as usize
    }

    pub fn allocated_molecules(&self) -> usize {
        self.next_molecule_tag as usize
    }

    /// Grows the free list to at least `count` beads. Never shrinks.
    pub fn reserve_beads(&mut self, count: usize) {
        while self.beads.len() < count {
            let bead = self.fresh_bead();
            self.beads.push(bead);
        }
    }

    /// Takes an empty bead, allocating one if the free list is exhausted.
    pub fn pop_bead(&mut self) -> Bead {
        self.beads.pop().unwrap_or_else(|| self.fresh_bead())
    }

    /// Takes `count` empty beads, growing the free list first if needed.
    pub fn pop_beads(&mut self, count: usize) -> Vec<Bead> {
        self.reserve_beads(count);
        let start = self.beads.len() - count;
        self.beads.split_off(start)
    }

    /// Clears a bead and returns its storage to the free list.
    pub fn recycle_bead(&mut self, mut bead: Bead) {
        bead.clear();
        self.beads.push(bead);
    }

    pub fn pop_molecule(&mut self) -> Molecule {
        self.molecules.pop().unwrap_or_else(|| {
            let tag = self.next_molecule_tag;
            self.next_molecule_tag += 1;
            Molecule::empty(tag)
        })
    }

    pub fn recycle_molecule(&mut self, mut molecule: Molecule) {
        molecule.clear();
        self.molecules.push(molecule);
    }

    /// Fills a pooled bead slot from a freshly built bead.
    ///
    /// Used when the initial state is constructed outside the pool.
    pub fn adopt_bead(&mut self, bead: Bead) -> Bead {
        let storage = self.pop_bead().storage;
        Bead { storage, ..bead }
    }

    fn fresh_bead(&mut self) -> Bead {
        let tag = self.next_bead_tag;
        self.next_bead_tag += 1;
        Bead::empty(tag)
    }
}
