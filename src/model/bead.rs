use super::types::{BeadId, INVALID_ID, MoleculeId, is_valid_id};

/// Identifies the pooled storage object a bead value occupies.
///
/// Tags are handed out once by the [`ObjectPool`](crate::ObjectPool) when
/// storage is allocated and survive every clear/refill cycle.
pub type StorageTag = u32;

/// A coarse-grained particle.
///
/// A bead whose `id` is [`INVALID_ID`] holds no live data and may only sit in
/// the recycling pool.
#[derive(Debug, Clone, PartialEq)]
pub struct Bead {
    pub id: BeadId,
    pub display_id: i64,
    pub visible: bool,
    pub bead_type: i32,
    pub radius: f64,
    /// Wrapped position.
    pub position: [f64; 3],
    /// Continuous position, never wrapped by periodic boundaries.
    pub unwrapped: [f64; 3],
    /// Position at the start of the run, for diffusion analysis.
    pub initial: [f64; 3],
    pub velocity: [f64; 3],
    pub old_velocity: [f64; 3],
    pub old_force: [f64; 3],
    pub force: [f64; 3],
    pub molecule: MoleculeId,
    pub storage: StorageTag,
}

impl Bead {
    pub fn new(id: BeadId, bead_type: i32, radius: f64, position: [f64; 3]) -> Self {
        Self {
            id,
            display_id: id,
            visible: true,
            bead_type,
            radius,
            position,
            unwrapped: position,
            initial: position,
            velocity: [0.0; 3],
            old_velocity: [0.0; 3],
            old_force: [0.0; 3],
            force: [0.0; 3],
            molecule: INVALID_ID,
            storage: 0,
        }
    }

    /// An empty bead occupying the given storage slot.
    pub fn empty(storage: StorageTag) -> Self {
        let mut bead = Self::new(INVALID_ID, 0, 0.0, [0.0; 3]);
        bead.display_id = INVALID_ID;
        bead.storage = storage;
        bead
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !is_valid_id(self.id)
    }

    #[inline]
    pub fn in_molecule(&self, molecule: MoleculeId) -> Self {
        Self {
            molecule,
            ..self.clone()
        }
    }

    /// Resets every field except the storage tag.
    pub fn clear(&mut self) {
        *self = Self::empty(self.storage);
    }

    #[inline]
    pub fn add_force(&mut self, f: [f64; 3]) {
        self.force[0] += f[0];
        self.force[1] += f[1];
        self.force[2] += f[2];
    }
}
