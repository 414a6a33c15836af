use log::warn;

use super::ForceContext;
use super::ghost::GhostBead;
use crate::error::Error;
use crate::model::bond::{Bond, BondForce};
use crate::model::registry::Registry;
use crate::model::types::{BeadId, BondId, Rank, add_assign, sub_assign};

/// One endpoint of an [`ExtendedBond`].
#[derive(Debug, Clone, PartialEq)]
pub enum BondEnd {
    /// The bead is live on this process.
    Local(BeadId),
    /// The bead lives elsewhere and is represented by a proxy.
    Ghost(GhostBead),
}

impl BondEnd {
    #[inline]
    pub fn id(&self) -> BeadId {
        match self {
            BondEnd::Local(id) => *id,
            BondEnd::Ghost(g) => g.id(),
        }
    }

    #[inline]
    pub fn is_local(&self) -> bool {
        matches!(self, BondEnd::Local(_))
    }

    pub fn ghost(&self) -> Option<&GhostBead> {
        match self {
            BondEnd::Ghost(g) => Some(g),
            BondEnd::Local(_) => None,
        }
    }

    pub fn ghost_mut(&mut self) -> Option<&mut GhostBead> {
        match self {
            BondEnd::Ghost(g) => Some(g),
            BondEnd::Local(_) => None,
        }
    }

    /// Current position, from the registry or the ghost cache.
    pub fn position(&self, registry: &Registry) -> Result<[f64; 3], Error> {
        match self {
            BondEnd::Local(id) => registry.position(*id),
            BondEnd::Ghost(g) if g.is_empty() => Err(Error::EmptyGhost(g.id())),
            BondEnd::Ghost(g) => Ok(g.position()),
        }
    }

    /// Adds `f` to the local bead or to the ghost's force buffer.
    pub fn apply(&mut self, f: [f64; 3], registry: &mut Registry) -> Result<(), Error> {
        match self {
            BondEnd::Local(id) => registry.add_force(*id, f),
            BondEnd::Ghost(g) => {
                g.add_force(f);
                Ok(())
            }
        }
    }
}

/// Selects one endpoint of a bond.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum End {
    Head,
    Tail,
}

/// A bond whose endpoints may live on different processes.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtendedBond {
    /// Both endpoints are local; evaluation passes straight through to the
    /// wrapped bond.
    Concrete {
        bond: Bond,
        head: BeadId,
        tail: BeadId,
    },
    /// At least one endpoint is represented by a ghost.
    Split {
        bond: Bond,
        head: BondEnd,
        tail: BondEnd,
    },
}

impl ExtendedBond {
    /// Wraps a bond whose endpoints are both local.
    pub fn concrete(bond: Bond, head: BeadId, tail: BeadId) -> Self {
        ExtendedBond::Concrete { bond, head, tail }
    }

    /// Wraps a bond with explicit endpoints, collapsing to
    /// [`Concrete`](ExtendedBond::Concrete) when both are local.
    pub fn with_ends(bond: Bond, head: BondEnd, tail: BondEnd) -> Self {
        match (head, tail) {
            (BondEnd::Local(h), BondEnd::Local(t)) => ExtendedBond::concrete(bond, h, t),
            (head, tail) => ExtendedBond::Split { bond, head, tail },
        }
    }

    #[inline]
    pub fn bond(&self) -> &Bond {
        match self {
            ExtendedBond::Concrete { bond, .. } | ExtendedBond::Split { bond, .. } => bond,
        }
    }

    #[inline]
    pub fn id(&self) -> BondId {
        self.bond().id
    }

    #[inline]
    pub fn spring_constant(&self) -> f64 {
        self.bond().k
    }

    #[inline]
    pub fn rest_length(&self) -> f64 {
        self.bond().l0
    }

    pub fn head_id(&self) -> BeadId {
        match self {
            ExtendedBond::Concrete { head, .. } => *head,
            ExtendedBond::Split { head, .. } => head.id(),
        }
    }

    pub fn tail_id(&self) -> BeadId {
        match self {
            ExtendedBond::Concrete { tail, .. } => *tail,
            ExtendedBond::Split { tail, .. } => tail.id(),
        }
    }

    pub fn end_id(&self, end: End) -> BeadId {
        match end {
            End::Head => self.head_id(),
            End::Tail => self.tail_id(),
        }
    }

    #[inline]
    pub fn is_concrete(&self) -> bool {
        matches!(self, ExtendedBond::Concrete { .. })
    }

    /// Number of endpoints that are live on this process.
    pub fn local_ends(&self) -> usize {
        match self {
            ExtendedBond::Concrete { .. } => 2,
            ExtendedBond::Split { head, tail, .. } => {
                usize::from(head.is_local()) + usize::from(tail.is_local())
            }
        }
    }

    /// Owning rank of the remote endpoint, or `None` if both are local.
    ///
    /// When both endpoints are remote the head's owner is reported.
    pub fn pid(&self) -> Option<Rank> {
        match self {
            ExtendedBond::Concrete { .. } => None,
            ExtendedBond::Split { head, tail, .. } => head
                .ghost()
                .or_else(|| tail.ghost())
                .map(GhostBead::owner),
        }
    }

    pub fn ghosts(&self) -> impl Iterator<Item = &GhostBead> {
        let (h, t) = match self {
            ExtendedBond::Concrete { .. } => (None, None),
            ExtendedBond::Split { head, tail, .. } => (head.ghost(), tail.ghost()),
        };
        h.into_iter().chain(t)
    }

    pub fn ghosts_mut(&mut self) -> impl Iterator<Item = &mut GhostBead> {
        let (h, t) = match self {
            ExtendedBond::Concrete { .. } => (None, None),
            ExtendedBond::Split { head, tail, .. } => (head.ghost_mut(), tail.ghost_mut()),
        };
        h.into_iter().chain(t)
    }

    /// Position of one endpoint.
    pub fn end_position(&self, end: End, registry: &Registry) -> Result<[f64; 3], Error> {
        match (self, end) {
            (ExtendedBond::Concrete { head, .. }, End::Head) => registry.position(*head),
            (ExtendedBond::Concrete { tail, .. }, End::Tail) => registry.position(*tail),
            (ExtendedBond::Split { head, .. }, End::Head) => head.position(registry),
            (ExtendedBond::Split { tail, .. }, End::Tail) => tail.position(registry),
        }
    }

    /// Adds `f` to one endpoint, local bead or ghost.
    pub fn apply(&mut self, end: End, f: [f64; 3], registry: &mut Registry) -> Result<(), Error> {
        match (self, end) {
            (ExtendedBond::Concrete { head, .. }, End::Head) => registry.add_force(*head, f),
            (ExtendedBond::Concrete { tail, .. }, End::Tail) => registry.add_force(*tail, f),
            (ExtendedBond::Split { head, .. }, End::Head) => head.apply(f, registry),
            (ExtendedBond::Split { tail, .. }, End::Tail) => tail.apply(f, registry),
        }
    }

    /// Applies the Hookean force to both endpoints.
    ///
    /// Every ghost endpoint must hold a valid position. Returns the bond
    /// length, or `None` if the bond was degenerate and contributed nothing.
    pub fn add_force(
        &mut self,
        registry: &mut Registry,
        ctx: &ForceContext<'_>,
    ) -> Result<Option<f64>, Error> {
        let head = self.end_position(End::Head, registry)?;
        let tail = self.end_position(End::Tail, registry)?;
        let Some(f) = self.evaluate(head, tail, ctx) else {
            return Ok(None);
        };
        self.apply(End::Head, f.on_head, registry)?;
        self.apply(End::Tail, f.on_tail(), registry)?;
        Ok(Some(f.length))
    }

    /// Evaluates a bond with exactly one remote endpoint.
    ///
    /// `remote_id` and `position` identify the remote bead and its current
    /// coordinates. The local endpoint receives its full share. The remote
    /// share is added to `acc` when the remote bead is the head and
    /// subtracted when it is the tail, so that `acc` always holds the force
    /// the owner of the remote bead must apply.
    ///
    /// # Errors
    ///
    /// [`Error::BothEndpointsRemote`] or [`Error::NoRemoteEndpoint`] if the
    /// bond does not have exactly one ghost endpoint, and
    /// [`Error::RemoteMismatch`] if `remote_id` is not that endpoint.
    pub fn add_shared_force(
        &mut self,
        registry: &mut Registry,
        remote_id: BeadId,
        position: [f64; 3],
        acc: &mut [f64; 3],
        ctx: &ForceContext<'_>,
    ) -> Result<Option<f64>, Error> {
        let bond_id = self.id();
        let remote_end = match self {
            ExtendedBond::Concrete { .. } => {
                return Err(Error::NoRemoteEndpoint { bond: bond_id });
            }
            ExtendedBond::Split { head, tail, .. } => match (head.is_local(), tail.is_local()) {
                (false, false) => return Err(Error::BothEndpointsRemote { bond: bond_id }),
                (true, true) => return Err(Error::NoRemoteEndpoint { bond: bond_id }),
                (false, true) => End::Head,
                (true, false) => End::Tail,
            },
        };

        let expected = self.end_id(remote_end);
        if expected != remote_id {
            return Err(Error::RemoteMismatch {
                bond: bond_id,
                expected,
                got: remote_id,
            });
        }

        if let ExtendedBond::Split { head, tail, .. } = self {
            let ghost = match remote_end {
                End::Head => head.ghost_mut(),
                End::Tail => tail.ghost_mut(),
            };
            if let Some(g) = ghost {
                let owner = g.owner();
                g.refresh(position, owner);
            }
        }

        let (head_pos, tail_pos) = match remote_end {
            End::Head => (position, self.end_position(End::Tail, registry)?),
            End::Tail => (self.end_position(End::Head, registry)?, position),
        };
        let Some(f) = self.evaluate(head_pos, tail_pos, ctx) else {
            return Ok(None);
        };

        match remote_end {
            End::Head => {
                self.apply(End::Tail, f.on_tail(), registry)?;
                add_assign(acc, f.on_head);
            }
            End::Tail => {
                self.apply(End::Head, f.on_head, registry)?;
                sub_assign(acc, f.on_head);
            }
        }

        if f.length > ctx.params.bond_length_warning {
            warn!(
                "[rank {}] shared bond {} ({} -> {}) stretched to {:.4} (limit {:.4})",
                ctx.rank,
                bond_id,
                self.head_id(),
                self.tail_id(),
                f.length,
                ctx.params.bond_length_warning
            );
        }
        Ok(Some(f.length))
    }

    fn evaluate(&self, head: [f64; 3], tail: [f64; 3], ctx: &ForceContext<'_>) -> Option<BondForce> {
        let f = self
            .bond()
            .force(head, tail, ctx.simbox, ctx.params.degenerate_length);
        if f.is_none() {
            warn!(
                "[rank {}] bond {} ({} -> {}) is degenerate, skipping",
                ctx.rank,
                self.id(),
                self.head_id(),
                self.tail_id()
            );
        }
        f
    }

    /// Replaces the head ghost with the now-local bead.
    ///
    /// Returns the removed ghost so any buffered force can be recovered.
    pub fn remove_head_ghost(&mut self) -> Option<GhostBead> {
        self.make_local(End::Head)
    }

    /// Replaces the tail ghost with the now-local bead.
    pub fn remove_tail_ghost(&mut self) -> Option<GhostBead> {
        self.make_local(End::Tail)
    }

    /// Makes the endpoint local if it is a ghost for `bead`.
    pub fn localize(&mut self, bead: BeadId) -> Option<GhostBead> {
        if self.head_id() == bead {
            self.remove_head_ghost()
        } else if self.tail_id() == bead {
            self.remove_tail_ghost()
        } else {
            None
        }
    }

    /// Replaces the endpoint holding `ghost.id()` with the ghost.
    ///
    /// Returns `false` if neither endpoint is that bead.
    pub fn detach(&mut self, ghost: GhostBead) -> bool {
        let end = if self.head_id() == ghost.id() {
            End::Head
        } else if self.tail_id() == ghost.id() {
            End::Tail
        } else {
            return false;
        };
        let (bond, mut head, mut tail) = self.take_parts();
        match end {
            End::Head => head = BondEnd::Ghost(ghost),
            End::Tail => tail = BondEnd::Ghost(ghost),
        }
        *self = ExtendedBond::with_ends(bond, head, tail);
        true
    }

    fn make_local(&mut self, end: End) -> Option<GhostBead> {
        let (bond, mut head, mut tail) = self.take_parts();
        let slot = match end {
            End::Head => &mut head,
            End::Tail => &mut tail,
        };
        let removed = match std::mem::replace(slot, BondEnd::Local(0)) {
            BondEnd::Ghost(g) => {
                *slot = BondEnd::Local(g.id());
                Some(g)
            }
            local => {
                *slot = local;
                None
            }
        };
        *self = ExtendedBond::with_ends(bond, head, tail);
        removed
    }

    fn take_parts(&mut self) -> (Bond, BondEnd, BondEnd) {
        let placeholder = ExtendedBond::Concrete {
            bond: Bond::new(0, 0, 0, 0.0, 0.0),
            head: 0,
            tail: 0,
        };
        match std::mem::replace(self, placeholder) {
            ExtendedBond::Concrete { bond, head, tail } => {
                (bond, BondEnd::Local(head), BondEnd::Local(tail))
            }
            ExtendedBond::Split { bond, head, tail } => (bond, head, tail),
        }
    }

    /// Marks every ghost position stale.
    pub fn invalidate_ghosts(&mut self) {
        for g in self.ghosts_mut() {
            g.invalidate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForceParams;
    use crate::fixtures::{approx_eq, approx_vec};
    use crate::model::bead::Bead;
    use crate::model::types::SimBox;

    const HEAD: [f64; 3] = [10.0, 5.0, 5.0];
    const TAIL: [f64; 3] = [10.6, 5.0, 5.0];

    fn bond() -> Bond {
        Bond::new(40, 1, 0, 128.0, 0.5)
    }

    fn registry(beads: &[(BeadId, [f64; 3])]) -> Registry {
        let mut reg = Registry::new();
        for &(id, pos) in beads {
            reg.insert_bead(Bead::new(id, 0, 0.5, pos)).unwrap();
        }
        reg
    }

    fn with_ctx<R>(f: impl FnOnce(&ForceContext<'_>) -> R) -> R {
        let simbox = SimBox::open();
        let params = ForceParams::default();
        f(&ForceContext {
            simbox: &simbox,
            params: &params,
            rank: 0,
        })
    }

    #[test]
    fn concrete_bond_applies_equal_and_opposite_forces() {
        let mut reg = registry(&[(1, HEAD), (2, TAIL)]);
        let mut b = ExtendedBond::concrete(bond(), 1, 2);
        let len = with_ctx(|ctx| b.add_force(&mut reg, ctx)).unwrap();
        assert!(approx_eq(len.unwrap(), 0.6, 1e-12));
        assert!(approx_vec(reg.bead(1).unwrap().force, [12.8, 0.0, 0.0], 1e-9));
        assert!(approx_vec(reg.bead(2).unwrap().force, [-12.8, 0.0, 0.0], 1e-9));
        assert_eq!(b.pid(), None);
        assert_eq!(b.local_ends(), 2);
    }

    #[test]
    fn ghost_end_receives_force_in_buffer() {
        let mut reg = registry(&[(1, HEAD)]);
        let mut b = ExtendedBond::with_ends(
            bond(),
            BondEnd::Local(1),
            BondEnd::Ghost(GhostBead::new(2, TAIL, 3)),
        );
        with_ctx(|ctx| b.add_force(&mut reg, ctx)).unwrap();
        assert!(approx_vec(reg.bead(1).unwrap().force, [12.8, 0.0, 0.0], 1e-9));
        let ghost = b.ghosts().next().unwrap();
        assert!(approx_vec(ghost.force(), [-12.8, 0.0, 0.0], 1e-9));
        assert_eq!(b.pid(), Some(3));
    }

    #[test]
    fn add_force_rejects_empty_ghost() {
        let mut reg = registry(&[(1, HEAD)]);
        let mut b = ExtendedBond::with_ends(
            bond(),
            BondEnd::Local(1),
            BondEnd::Ghost(GhostBead::pending(2, 1)),
        );
        let err = with_ctx(|ctx| b.add_force(&mut reg, ctx)).unwrap_err();
        assert!(matches!(err, Error::EmptyGhost(2)));
    }

    #[test]
    fn split_bond_conserves_force_across_two_processes() {
        // Process A owns the head, process B owns the tail.
        let mut reg_a = registry(&[(1, HEAD)]);
        let mut reg_b = registry(&[(2, TAIL)]);
        let mut on_a = ExtendedBond::with_ends(
            bond(),
            BondEnd::Local(1),
            BondEnd::Ghost(GhostBead::pending(2, 1)),
        );
        let mut on_b = ExtendedBond::with_ends(
            bond(),
            BondEnd::Ghost(GhostBead::pending(1, 0)),
            BondEnd::Local(2),
        );

        let mut acc_a = [0.0; 3];
        let mut acc_b = [0.0; 3];
        with_ctx(|ctx| {
            on_a.add_shared_force(&mut reg_a, 2, TAIL, &mut acc_a, ctx)
                .unwrap();
            on_b.add_shared_force(&mut reg_b, 1, HEAD, &mut acc_b, ctx)
                .unwrap();
        });

        let mut reference = registry(&[(1, HEAD), (2, TAIL)]);
        let mut whole = ExtendedBond::concrete(bond(), 1, 2);
        with_ctx(|ctx| whole.add_force(&mut reference, ctx)).unwrap();

        let head_force = reg_a.bead(1).unwrap().force;
        let tail_force = reg_b.bead(2).unwrap().force;
        assert!(approx_vec(head_force, reference.bead(1).unwrap().force, 1e-12));
        assert!(approx_vec(tail_force, reference.bead(2).unwrap().force, 1e-12));

        // Each side's accumulator equals what the other side applied locally.
        assert!(approx_vec(acc_a, tail_force, 1e-12));
        assert!(approx_vec(acc_b, head_force, 1e-12));
        assert!(approx_eq(head_force[0], 12.8, 1e-9));
    }

    #[test]
    fn shared_force_rejects_bad_topologies() {
        let mut reg = registry(&[(1, HEAD), (2, TAIL)]);
        let mut acc = [0.0; 3];

        let mut both_remote = ExtendedBond::with_ends(
            bond(),
            BondEnd::Ghost(GhostBead::pending(1, 1)),
            BondEnd::Ghost(GhostBead::pending(2, 2)),
        );
        let err = with_ctx(|ctx| both_remote.add_shared_force(&mut reg, 2, TAIL, &mut acc, ctx))
            .unwrap_err();
        assert!(matches!(err, Error::BothEndpointsRemote { bond: 40 }));

        let mut local = ExtendedBond::concrete(bond(), 1, 2);
        let err =
            with_ctx(|ctx| local.add_shared_force(&mut reg, 2, TAIL, &mut acc, ctx)).unwrap_err();
        assert!(matches!(err, Error::NoRemoteEndpoint { bond: 40 }));

        let mut split = ExtendedBond::with_ends(
            bond(),
            BondEnd::Local(1),
            BondEnd::Ghost(GhostBead::pending(2, 1)),
        );
        let err =
            with_ctx(|ctx| split.add_shared_force(&mut reg, 9, TAIL, &mut acc, ctx)).unwrap_err();
        assert!(matches!(
            err,
            Error::RemoteMismatch {
                expected: 2,
                got: 9,
                ..
            }
        ));
        assert_eq!(acc, [0.0; 3]);
    }

    #[test]
    fn overstretched_shared_bond_still_applies_force() {
        let mut reg = registry(&[(1, [1.0, 1.0, 1.0])]);
        let mut b = ExtendedBond::with_ends(
            bond(),
            BondEnd::Local(1),
            BondEnd::Ghost(GhostBead::pending(2, 1)),
        );
        let mut acc = [0.0; 3];
        let len = with_ctx(|ctx| b.add_shared_force(&mut reg, 2, [4.0, 1.0, 1.0], &mut acc, ctx))
            .unwrap()
            .unwrap();
        assert!(approx_eq(len, 3.0, 1e-12));
        assert!(approx_vec(reg.bead(1).unwrap().force, [320.0, 0.0, 0.0], 1e-9));
        assert!(approx_vec(acc, [-320.0, 0.0, 0.0], 1e-9));
    }

    #[test]
    fn degenerate_bond_contributes_nothing() {
        let mut reg = registry(&[(1, HEAD), (2, HEAD)]);
        let mut b = ExtendedBond::concrete(bond(), 1, 2);
        let len = with_ctx(|ctx| b.add_force(&mut reg, ctx)).unwrap();
        assert!(len.is_none());
        assert_eq!(reg.bead(1).unwrap().force, [0.0; 3]);
    }

    #[test]
    fn ghost_removal_collapses_to_concrete() {
        let mut b = ExtendedBond::with_ends(
            bond(),
            BondEnd::Ghost(GhostBead::new(1, HEAD, 2)),
            BondEnd::Ghost(GhostBead::new(2, TAIL, 2)),
        );
        assert_eq!(b.local_ends(), 0);

        let g = b.remove_head_ghost().unwrap();
        assert_eq!(g.id(), 1);
        assert!(!b.is_concrete());
        assert_eq!(b.local_ends(), 1);
        assert!(b.remove_head_ghost().is_none());

        assert!(b.remove_tail_ghost().is_some());
        assert!(b.is_concrete());
        assert_eq!(b.head_id(), 1);
        assert_eq!(b.tail_id(), 2);
        assert_eq!(b.pid(), None);
    }

    #[test]
    fn detach_and_localize_round_trip() {
        let mut b = ExtendedBond::concrete(bond(), 1, 2);
        assert!(b.detach(GhostBead::new(2, TAIL, 4)));
        assert_eq!(b.pid(), Some(4));
        assert!(!b.detach(GhostBead::new(7, TAIL, 4)));

        b.invalidate_ghosts();
        assert!(b.ghosts().all(GhostBead::is_empty));

        assert!(b.localize(2).is_some());
        assert_eq!(b, ExtendedBond::concrete(bond(), 1, 2));
        assert!(b.localize(2).is_none());
        assert_eq!(b.spring_constant(), 128.0);
        assert_eq!(b.rest_length(), 0.5);
    }
}
