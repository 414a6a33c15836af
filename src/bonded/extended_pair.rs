use log::warn;

use super::ForceContext;
use super::extended_bond::{End, ExtendedBond};
use crate::error::Error;
use crate::model::bond::{BondPair, bend};
use crate::model::registry::Registry;
use crate::model::types::{BondPairId, MoleculeId};

/// A bend whose three beads may live on different processes.
///
/// The bend refers to its two bonds by index into the owning extended
/// molecule's bond list. Stiffness parameters come from the wrapped
/// [`BondPair`] when one exists on this process, otherwise from values
/// cached when the wrapper was rebuilt from a template.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedBondPair {
    id: BondPairId,
    first: usize,
    second: usize,
    pair: Option<BondPair>,
    modulus: f64,
    phi0: f64,
}

impl ExtendedBondPair {
    /// Wraps a bend that exists on this process.
    pub fn from_pair(pair: BondPair) -> Self {
        Self {
            id: pair.id,
            first: pair.first,
            second: pair.second,
            modulus: pair.modulus,
            phi0: pair.phi0,
            pair: Some(pair),
        }
    }

    /// Creates a bend wrapper from cached parameters only.
    #[cfg(test)]
    pub(crate) fn cached(id: BondPairId, first: usize, second: usize, modulus: f64, phi0: f64) -> Self {
        Self {
            id,
            first,
            second,
            pair: None,
            modulus,
            phi0,
        }
    }

    #[inline]
    pub fn id(&self) -> BondPairId {
        self.id
    }

    #[inline]
    pub fn first(&self) -> usize {
        self.first
    }

    #[inline]
    pub fn second(&self) -> usize {
        self.second
    }

    pub fn pair(&self) -> Option<&BondPair> {
        self.pair.as_ref()
    }

    pub fn modulus(&self) -> f64 {
        self.pair.as_ref().map_or(self.modulus, |p| p.modulus)
    }

    pub fn phi0(&self) -> f64 {
        self.pair.as_ref().map_or(self.phi0, |p| p.phi0)
    }

    /// The concrete bend, rebuilt from cached values if necessary.
    pub fn to_pair(&self) -> BondPair {
        self.pair.clone().unwrap_or_else(|| {
            BondPair::new(self.id, self.first, self.second, self.modulus, self.phi0)
        })
    }

    /// Number of the three beads that are live on this process.
    pub fn local_beads(&self, bonds: &[ExtendedBond]) -> usize {
        let (Some(first), Some(second)) = (bonds.get(self.first), bonds.get(self.second)) else {
            return 0;
        };
        let ends = |b: &ExtendedBond| match b {
            ExtendedBond::Concrete { .. } => (true, true),
            ExtendedBond::Split { head, tail, .. } => (head.is_local(), tail.is_local()),
        };
        let (middle, outer_first) = ends(first);
        let (outer_last, _) = ends(second);
        usize::from(outer_first) + usize::from(middle) + usize::from(outer_last)
    }

    /// Applies the bending force through the two constituent bonds.
    ///
    /// Forces on local beads go to the registry; forces on ghost beads are
    /// buffered in the ghosts. Returns the bend angle, or `None` if either
    /// bond was degenerate.
    ///
    /// # Errors
    ///
    /// [`Error::Topology`] if the bonds do not share a middle bead and
    /// [`Error::EmptyGhost`] if a ghost has no valid position.
    pub fn add_force(
        &self,
        molecule: MoleculeId,
        bonds: &mut [ExtendedBond],
        registry: &mut Registry,
        ctx: &ForceContext<'_>,
    ) -> Result<Option<f64>, Error> {
        let n = bonds.len();
        if self.first >= n || self.second >= n {
            return Err(Error::topology(
                molecule,
                format!("bend {} references bond outside 0..{n}", self.id),
            ));
        }
        if bonds[self.first].head_id() != bonds[self.second].tail_id() {
            return Err(Error::topology(
                molecule,
                format!("bend {} bonds do not share a middle bead", self.id),
            ));
        }

        let p1 = bonds[self.first].end_position(End::Tail, registry)?;
        let p2 = bonds[self.first].end_position(End::Head, registry)?;
        let p3 = bonds[self.second].end_position(End::Head, registry)?;
        let u = ctx.simbox.separation(p2, p1);
        let v = ctx.simbox.separation(p3, p2);

        let Some(f) = bend(u, v, self.modulus(), self.phi0(), ctx.params.degenerate_length) else {
            warn!(
                "[rank {}] bend {} in molecule {} has a degenerate bond, skipping",
                ctx.rank, self.id, molecule
            );
            return Ok(None);
        };

        bonds[self.first].apply(End::Tail, f.on_first, registry)?;
        bonds[self.first].apply(End::Head, f.on_middle, registry)?;
        bonds[self.second].apply(End::Head, f.on_last, registry)?;
        Ok(Some(f.angle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bonded::extended_bond::BondEnd;
    use crate::bonded::ghost::GhostBead;
    use crate::config::ForceParams;
    use crate::fixtures::approx_vec;
    use crate::model::bead::Bead;
    use crate::model::bond::Bond;
    use crate::model::types::{BeadId, SimBox};

    const P: [[f64; 3]; 3] = [[1.0, 1.0, 1.0], [1.5, 1.1, 1.0], [1.7, 1.6, 1.2]];

    fn registry(ids: &[BeadId]) -> Registry {
        let mut reg = Registry::new();
        for &id in ids {
            reg.insert_bead(Bead::new(id, 0, 0.5, P[id as usize])).unwrap();
        }
        reg
    }

    fn end(id: BeadId, local: &[BeadId]) -> BondEnd {
        if local.contains(&id) {
            BondEnd::Local(id)
        } else {
            BondEnd::Ghost(GhostBead::new(id, P[id as usize], 1))
        }
    }

    fn bonds(local: &[BeadId]) -> Vec<ExtendedBond> {
        vec![
            ExtendedBond::with_ends(Bond::new(0, 1, 0, 10.0, 0.5), end(1, local), end(0, local)),
            ExtendedBond::with_ends(Bond::new(1, 2, 1, 10.0, 0.5), end(2, local), end(1, local)),
        ]
    }

    fn run(pair: &ExtendedBondPair, bonds: &mut [ExtendedBond], reg: &mut Registry) -> Option<f64> {
        let simbox = SimBox::open();
        let params = ForceParams::default();
        let ctx = ForceContext {
            simbox: &simbox,
            params: &params,
            rank: 0,
        };
        pair.add_force(9, bonds, reg, &ctx).unwrap()
    }

    #[test]
    fn forwards_parameters_from_concrete_pair() {
        let p = ExtendedBondPair::from_pair(BondPair::new(3, 0, 1, 7.0, 0.25));
        assert_eq!(p.modulus(), 7.0);
        assert_eq!(p.phi0(), 0.25);
        assert!(p.pair().is_some());

        let c = ExtendedBondPair::cached(3, 0, 1, 7.0, 0.25);
        assert!(c.pair().is_none());
        assert_eq!(c.modulus(), 7.0);
        assert_eq!(c.to_pair(), BondPair::new(3, 0, 1, 7.0, 0.25));
    }

    #[test]
    fn split_bend_matches_whole_bend() {
        let pair = ExtendedBondPair::cached(0, 0, 1, 5.0, 0.0);

        let mut whole_reg = registry(&[0, 1, 2]);
        let mut whole = bonds(&[0, 1, 2]);
        let angle = run(&pair, &mut whole, &mut whole_reg).unwrap();
        assert!(angle > 0.0);
        assert_eq!(pair.local_beads(&whole), 3);

        // Bead 2 lives elsewhere; this process owns 0 and 1.
        let mut part_reg = registry(&[0, 1]);
        let mut part = bonds(&[0, 1]);
        assert_eq!(pair.local_beads(&part), 2);
        run(&pair, &mut part, &mut part_reg);
        // The other process owns 2 and sees 0 and 1 as ghosts.
        let mut rest_reg = registry(&[2]);
        let mut rest = bonds(&[2]);
        run(&pair, &mut rest, &mut rest_reg);

        for id in 0..2 {
            assert!(approx_vec(
                part_reg.bead(id).unwrap().force,
                whole_reg.bead(id).unwrap().force,
                1e-12
            ));
        }
        assert!(approx_vec(
            rest_reg.bead(2).unwrap().force,
            whole_reg.bead(2).unwrap().force,
            1e-12
        ));
        let ghost_force = part[1].ghosts().next().unwrap().force();
        assert!(approx_vec(ghost_force, whole_reg.bead(2).unwrap().force, 1e-12));
    }

    #[test]
    fn rejects_bonds_without_shared_middle() {
        let pair = ExtendedBondPair::cached(0, 1, 0, 5.0, 0.0);
        let mut reg = registry(&[0, 1, 2]);
        let mut b = bonds(&[0, 1, 2]);
        let simbox = SimBox::open();
        let params = ForceParams::default();
        let ctx = ForceContext {
            simbox: &simbox,
            params: &params,
            rank: 0,
        };
        assert!(matches!(
            pair.add_force(9, &mut b, &mut reg, &ctx),
            Err(Error::Topology { molecule: 9, .. })
        ));
        let out_of_range = ExtendedBondPair::cached(0, 0, 5, 5.0, 0.0);
        assert!(out_of_range.add_force(9, &mut b, &mut reg, &ctx).is_err());
    }
}
