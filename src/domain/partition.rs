use crate::error::Error;
use crate::model::types::{Rank, SimBox};

/// Regular `gx × gy × gz` split of the box into one sub-domain per rank.
///
/// Rank `r` owns cell `(x, y, z)` with `r = x + gx·(y + gy·z)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    grid: [usize; 3],
    simbox: SimBox,
}

impl Partition {
    pub fn new(grid: [usize; 3], simbox: SimBox) -> Result<Self, Error> {
        if grid.iter().any(|&g| g == 0) {
            return Err(Error::InvalidConfig(format!(
                "partition grid {grid:?} has an empty axis"
            )));
        }
        if simbox.size.iter().any(|&l| !(l > 0.0 && l.is_finite())) {
            return Err(Error::InvalidConfig(format!(
                "box size {:?} must be positive and finite",
                simbox.size
            )));
        }
        Ok(Self { grid, simbox })
    }

    /// Splits the box along x only.
    pub fn slabs(ranks: usize, simbox: SimBox) -> Result<Self, Error> {
        Self::new([ranks, 1, 1], simbox)
    }

    pub fn grid(&self) -> [usize; 3] {
        self.grid
    }

    pub fn simbox(&self) -> &SimBox {
        &self.simbox
    }

    /// Number of sub-domains.
    pub fn size(&self) -> usize {
        self.grid.iter().product()
    }

    /// Width of the narrowest sub-domain along any axis that is actually
    /// split, or `None` for a single cell.
    pub fn narrowest_width(&self) -> Option<f64> {
        (0..3)
            .filter(|&a| self.grid[a] > 1)
            .map(|a| self.simbox.size[a] / self.grid[a] as f64)
            .reduce(f64::min)
    }

    pub fn cell_of(&self, rank: Rank) -> [usize; 3] {
        let [gx, gy, _] = self.grid;
        [rank % gx, (rank / gx) % gy, rank / (gx * gy)]
    }

    pub fn rank_of(&self, cell: [usize; 3]) -> Rank {
        let [gx, gy, _] = self.grid;
        cell[0] + gx * (cell[1] + gy * cell[2])
    }

    /// Lower and upper corners of a rank's sub-domain.
    pub fn bounds(&self, rank: Rank) -> ([f64; 3], [f64; 3]) {
        let cell = self.cell_of(rank);
        let mut lo = [0.0; 3];
        let mut hi = [0.0; 3];
        for a in 0..3 {
            let w = self.simbox.size[a] / self.grid[a] as f64;
            lo[a] = w * cell[a] as f64;
            hi[a] = w * (cell[a] + 1) as f64;
        }
        (lo, hi)
    }

    /// Rank whose sub-domain contains `position` after wrapping.
    ///
    /// Points outside a non-periodic box belong to the nearest edge cell.
    pub fn owner_of(&self, position: [f64; 3]) -> Rank {
        let p = self.simbox.wrap(position);
        let mut cell = [0usize; 3];
        for a in 0..3 {
            let w = self.simbox.size[a] / self.grid[a] as f64;
            let i = (p[a] / w).floor();
            cell[a] = if i <= 0.0 {
                0
            } else {
                (i as usize).min(self.grid[a] - 1)
            };
        }
        self.rank_of(cell)
    }

    /// Ranks sharing a face, edge or corner with `rank`, ascending and
    /// excluding `rank` itself.
    pub fn neighbours(&self, rank: Rank) -> Vec<Rank> {
        let cell = self.cell_of(rank);
        let mut out = Vec::new();
        for dz in -1i64..=1 {
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let Some(n) = self.shifted(cell, [dx, dy, dz]) else {
                        continue;
                    };
                    let r = self.rank_of(n);
                    if r != rank && !out.contains(&r) {
                        out.push(r);
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }

    fn shifted(&self, cell: [usize; 3], d: [i64; 3]) -> Option<[usize; 3]> {
        let mut out = [0usize; 3];
        for a in 0..3 {
            let g = self.grid[a] as i64;
            let mut c = cell[a] as i64 + d[a];
            if c < 0 || c >= g {
                if !self.simbox.periodic[a] {
                    return None;
                }
                c = c.rem_euclid(g);
            }
            out[a] = c as usize;
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn periodic_box() -> SimBox {
        SimBox::new([12.0, 8.0, 8.0], [true; 3])
    }

    #[test]
    fn rank_and_cell_are_inverse() {
        let p = Partition::new([3, 2, 2], periodic_box()).unwrap();
        assert_eq!(p.size(), 12);
        for r in 0..p.size() {
            assert_eq!(p.rank_of(p.cell_of(r)), r);
        }
    }

    #[test]
    fn owner_follows_position() {
        let p = Partition::slabs(3, periodic_box()).unwrap();
        assert_eq!(p.owner_of([0.5, 1.0, 1.0]), 0);
        assert_eq!(p.owner_of([4.0, 1.0, 1.0]), 1);
        assert_eq!(p.owner_of([11.9, 1.0, 1.0]), 2);
        // Wrapped back into the first slab.
        assert_eq!(p.owner_of([12.5, 1.0, 1.0]), 0);
        assert_eq!(p.owner_of([-0.5, 1.0, 1.0]), 2);
        assert_eq!(p.bounds(1), ([4.0, 0.0, 0.0], [8.0, 8.0, 8.0]));
    }

    #[test]
    fn neighbours_wrap_only_when_periodic() {
        let p = Partition::slabs(4, periodic_box()).unwrap();
        assert_eq!(p.neighbours(0), vec![1, 3]);
        assert_eq!(p.neighbours(2), vec![1, 3]);

        let open = Partition::slabs(4, SimBox::new([12.0, 8.0, 8.0], [false; 3])).unwrap();
        assert_eq!(open.neighbours(0), vec![1]);
        assert_eq!(open.neighbours(3), vec![2]);
    }

    #[test]
    fn small_grids_deduplicate() {
        let p = Partition::slabs(2, periodic_box()).unwrap();
        assert_eq!(p.neighbours(0), vec![1]);
        assert!(Partition::slabs(1, periodic_box()).unwrap().neighbours(0).is_empty());

        let cube = Partition::new([2, 2, 2], periodic_box()).unwrap();
        assert_eq!(cube.neighbours(0), (1..8).collect::<Vec<_>>());
    }

    #[test]
    fn narrowest_width_ignores_unsplit_axes() {
        assert_eq!(Partition::slabs(1, periodic_box()).unwrap().narrowest_width(), None);
        assert_eq!(Partition::slabs(3, periodic_box()).unwrap().narrowest_width(), Some(4.0));
        let p = Partition::new([2, 4, 1], periodic_box()).unwrap();
        assert_eq!(p.narrowest_width(), Some(2.0));
    }

    #[test]
    fn rejects_degenerate_grids() {
        assert!(Partition::new([0, 1, 1], periodic_box()).is_err());
        assert!(Partition::new([1, 1, 1], SimBox::new([0.0, 1.0, 1.0], [true; 3])).is_err());
    }
}
