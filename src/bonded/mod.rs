//! Bonded interactions that span process boundaries.
//!
//! - [`GhostBead`] — proxy for a bead owned by another process.
//! - [`ExtendedBond`] — bond evaluated with local beads, ghosts, or a mix.
//! - [`ExtendedBondPair`] — bend evaluated through two extended bonds.
//! - [`ForceLedger`] — forces owed to beads on neighbouring processes.
//!
//! Each process evaluates every bonded term that touches at least one of its
//! beads, using ghost positions for the rest, and applies forces only to the
//! beads it owns. Because both sides see the same geometry, every bead
//! receives its share exactly once and the total matches a single-process
//! evaluation. Shares computed for remote beads are kept in a ledger so they
//! can be routed to, or checked against, the owning process.

mod extended_bond;
mod extended_pair;
mod ghost;

use std::collections::{BTreeMap, HashMap};

pub use extended_bond::{BondEnd, End, ExtendedBond};
pub use extended_pair::ExtendedBondPair;
pub use ghost::GhostBead;

use crate::config::ForceParams;
use crate::model::types::{BeadId, Rank, SimBox, add_assign};

/// Everything a bonded evaluation needs besides the beads themselves.
#[derive(Debug, Clone, Copy)]
pub struct ForceContext<'a> {
    pub simbox: &'a SimBox,
    pub params: &'a ForceParams,
    /// Rank used to tag diagnostics.
    pub rank: Rank,
}

/// Forces computed on this process for beads owned by other processes,
/// grouped by owning rank.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForceLedger {
    entries: BTreeMap<Rank, HashMap<BeadId, [f64; 3]>>,
}

impl ForceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, owner: Rank, bead: BeadId, f: [f64; 3]) {
        let slot = self
            .entries
            .entry(owner)
            .or_default()
            .entry(bead)
            .or_insert([0.0; 3]);
        add_assign(slot, f);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ranks that are owed forces, ascending.
    pub fn ranks(&self) -> impl Iterator<Item = Rank> + '_ {
        self.entries.keys().copied()
    }

    /// Forces owed to beads of `owner`.
    pub fn for_rank(&self, owner: Rank) -> Option<&HashMap<BeadId, [f64; 3]>> {
        self.entries.get(&owner)
    }

    /// Total force recorded for `bead` across all ranks.
    pub fn total(&self, bead: BeadId) -> [f64; 3] {
        let mut f = [0.0; 3];
        for per_rank in self.entries.values() {
            if let Some(v) = per_rank.get(&bead) {
                add_assign(&mut f, *v);
            }
        }
        f
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
