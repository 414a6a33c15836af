use crate::model::types::{BeadId, Rank, add_assign};

/// Stand-in for a bead owned by another process.
///
/// Carries only what a bonded force evaluation needs. A ghost is *empty*
/// when its position is not valid for the current step: it was invalidated
/// after the step, or it was created for a member whose coordinates have not
/// been received yet.
#[derive(Debug, Clone, PartialEq)]
pub struct GhostBead {
    id: BeadId,
    position: [f64; 3],
    force: [f64; 3],
    owner: Rank,
    valid: bool,
}

impl GhostBead {
    /// A proxy at a known position with a zeroed force buffer.
    pub fn new(id: BeadId, position: [f64; 3], owner: Rank) -> Self {
        Self {
            id,
            position,
            force: [0.0; 3],
            owner,
            valid: true,
        }
    }

    /// A proxy whose position is not yet known.
    pub fn pending(id: BeadId, owner: Rank) -> Self {
        Self {
            valid: false,
            ..Self::new(id, [0.0; 3], owner)
        }
    }

    #[inline]
    pub fn id(&self) -> BeadId {
        self.id
    }

    #[inline]
    pub fn position(&self) -> [f64; 3] {
        self.position
    }

    #[inline]
    pub fn force(&self) -> [f64; 3] {
        self.force
    }

    /// Rank of the process that owns the real bead.
    #[inline]
    pub fn owner(&self) -> Rank {
        self.owner
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.valid
    }

    #[inline]
    pub fn add_force(&mut self, f: [f64; 3]) {
        add_assign(&mut self.force, f);
    }

    /// Stores fresh coordinates from the owning process.
    pub fn refresh(&mut self, position: [f64; 3], owner: Rank) {
        self.position = position;
        self.owner = owner;
        self.valid = true;
    }

    /// Marks the cached position stale.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Returns the accumulated force and zeroes the buffer.
    pub fn take_force(&mut self) -> [f64; 3] {
        std::mem::take(&mut self.force)
    }
}
