//! Identifier types, sentinels, and small vector helpers shared by the model.

/// Globally unique bead identifier. Negative values never denote a live bead.
pub type BeadId = i64;
/// Molecule identifier.
pub type MoleculeId = i64;
/// Bond identifier.
pub type BondId = i64;
/// Bend (bond pair) identifier.
pub type BondPairId = i64;
/// Index of a compute process in the decomposition.
pub type Rank = usize;

/// Sentinel stored in the id field of an empty (recyclable) object.
pub const INVALID_ID: i64 = -1;

/// Returns `true` if `id` can belong to a live object.
#[inline]
pub fn is_valid_id(id: i64) -> bool {
    id >= 0
}

#[inline]
pub fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn add_assign(a: &mut [f64; 3], b: [f64; 3]) {
    a[0] += b[0];
    a[1] += b[1];
    a[2] += b[2];
}

#[inline]
pub fn sub_assign(a: &mut [f64; 3], b: [f64; 3]) {
    a[0] -= b[0];
    a[1] -= b[1];
    a[2] -= b[2];
}

#[inline]
pub fn scale(a: [f64; 3], s: f64) -> [f64; 3] {
    [a[0] * s, a[1] * s, a[2] * s]
}

#[inline]
pub fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

/// Simulation box with optional periodicity along each axis.
///
/// Wrapped coordinates live in `[0, L)`; bonded separations use the
/// minimum image along periodic axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimBox {
    pub size: [f64; 3],
    pub periodic: [bool; 3],
}

impl SimBox {
    pub fn new(size: [f64; 3], periodic: [bool; 3]) -> Self {
        Self { size, periodic }
    }

    /// A box that never applies minimum-image corrections.
    pub fn open() -> Self {
        Self {
            size: [f64::INFINITY; 3],
            periodic: [false; 3],
        }
    }

    /// Separation vector `a − b`, minimum-imaged along periodic axes.
    pub fn separation(&self, a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
        let mut d = sub(a, b);
        for axis in 0..3 {
            if self.periodic[axis] {
                let l = self.size[axis];
                d[axis] -= l * (d[axis] / l).round();
            }
        }
        d
    }

    /// Image of `p` closest to `reference`.
    pub fn nearest_image(&self, p: [f64; 3], reference: [f64; 3]) -> [f64; 3] {
        let d = self.separation(p, reference);
        [reference[0] + d[0], reference[1] + d[1], reference[2] + d[2]]
    }

    /// Wraps `p` into `[0, L)` along periodic axes.
    pub fn wrap(&self, p: [f64; 3]) -> [f64; 3] {
        let mut w = p;
        for axis in 0..3 {
            if self.periodic[axis] {
                let l = self.size[axis];
                w[axis] = w[axis].rem_euclid(l);
                if w[axis] >= l {
                    w[axis] = 0.0;
                }
            }
        }
        w
    }
}
