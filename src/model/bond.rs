//! Two-body bonds, three-body bends, and the force laws they obey.
//!
//! Bond and bend records refer to molecule members by index; positions are
//! resolved by whoever evaluates them, so the same laws serve both whole
//! molecules and their ghost-backed wrappers in [`crate::bonded`].

use super::types::{BondId, BondPairId, SimBox, dot, norm, scale};

/// Hookean spring between two members of a molecule.
#[derive(Debug, Clone, PartialEq)]
pub struct Bond {
    pub id: BondId,
    pub bond_type: i32,
    /// Member index of the head bead.
    pub head: usize,
    /// Member index of the tail bead.
    pub tail: usize,
    /// Spring constant.
    pub k: f64,
    /// Unstretched length.
    pub l0: f64,
}

impl Bond {
    pub fn new(id: BondId, head: usize, tail: usize, k: f64, l0: f64) -> Self {
        Self {
            id,
            bond_type: 0,
            head,
            tail,
            k,
            l0,
        }
    }

    /// Evaluates the spring for the given endpoint positions.
    ///
    /// Returns `None` when the bond is shorter than `min_length`.
    pub fn force(
        &self,
        head: [f64; 3],
        tail: [f64; 3],
        simbox: &SimBox,
        min_length: f64,
    ) -> Option<BondForce> {
        hookean(simbox.separation(head, tail), self.k, self.l0, min_length)
    }
}

/// Bending stiffness between two bonds that share a middle bead.
#[derive(Debug, Clone, PartialEq)]
pub struct BondPair {
    pub id: BondPairId,
    pub pair_type: i32,
    /// Index of the first bond; its head is the middle bead.
    pub first: usize,
    /// Index of the second bond; its tail is the middle bead.
    pub second: usize,
    pub modulus: f64,
    /// Preferred angle between the two bond vectors, in radians.
    pub phi0: f64,
}

impl BondPair {
    pub fn new(id: BondPairId, first: usize, second: usize, modulus: f64, phi0: f64) -> Self {
        Self {
            id,
            pair_type: 0,
            first,
            second,
            modulus,
            phi0,
        }
    }
}

/// Result of evaluating a bond.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BondForce {
    pub length: f64,
    /// Force on the head bead; the tail receives the negation.
    pub on_head: [f64; 3],
}

impl BondForce {
    #[inline]
    pub fn on_tail(&self) -> [f64; 3] {
        scale(self.on_head, -1.0)
    }
}

/// `f = k (l0 − L) Δ / L` with `Δ = head − tail`.
pub fn hookean(delta: [f64; 3], k: f64, l0: f64, min_length: f64) -> Option<BondForce> {
    let length = norm(delta);
    if !(length >= min_length) || length == 0.0 {
        return None;
    }
    Some(BondForce {
        length,
        on_head: scale(delta, k * (l0 - length) / length),
    })
}

/// Result of evaluating a bend over three consecutive beads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BendForce {
    /// Angle between the two bond vectors.
    pub angle: f64,
    pub on_first: [f64; 3],
    pub on_middle: [f64; 3],
    pub on_last: [f64; 3],
}

const SIN_FLOOR: f64 = 1.0e-8;

/// Bending force for `E = κ (1 − cos(φ − φ0))`.
///
/// `u` is the first bond vector (middle − first) and `v` the second
/// (last − middle). Returns `None` if either bond is shorter than
/// `min_length`.
pub fn bend(u: [f64; 3], v: [f64; 3], modulus: f64, phi0: f64, min_length: f64) -> Option<BendForce> {
    let lu = norm(u);
    let lv = norm(v);
    if !(lu >= min_length && lv >= min_length) || lu == 0.0 || lv == 0.0 {
        return None;
    }

    let cos_phi = (dot(u, v) / (lu * lv)).clamp(-1.0, 1.0);
    let phi = cos_phi.acos();

    // dE/d(cos φ)
    let de_dc = if phi0 == 0.0 {
        -modulus
    } else {
        -modulus * (phi - phi0).sin() / phi.sin().max(SIN_FLOOR)
    };

    let inv_uv = 1.0 / (lu * lv);
    let mut dc_du = [0.0; 3];
    let mut dc_dv = [0.0; 3];
    for a in 0..3 {
        dc_du[a] = v[a] * inv_uv - cos_phi * u[a] / (lu * lu);
        dc_dv[a] = u[a] * inv_uv - cos_phi * v[a] / (lv * lv);
    }

    let on_first = scale(dc_du, de_dc);
    let on_last = scale(dc_dv, -de_dc);
    let on_middle = [
        -on_first[0] - on_last[0],
        -on_first[1] - on_last[1],
        -on_first[2] - on_last[2],
    ];

    Some(BendForce {
        angle: phi,
        on_first,
        on_middle,
        on_last,
    })
}
