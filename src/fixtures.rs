//! Shared builders for unit tests.

use crate::model::bead::Bead;
use crate::model::molecule::{BendShape, BondShape, Molecule, MoleculeShape};
use crate::model::registry::Registry;
use crate::model::types::{BeadId, MoleculeId};

/// Three-bead chain: bonds 1→0 and 2→1 (head → tail), one bend over member 1.
pub fn trimer() -> MoleculeShape {
    MoleculeShape {
        name: "Trimer".into(),
        bead_types: vec![0, 1, 1],
        bonds: vec![
            BondShape {
                head: 1,
                tail: 0,
                k: 128.0,
                l0: 0.5,
            },
            BondShape {
                head: 2,
                tail: 1,
                k: 128.0,
                l0: 0.5,
            },
        ],
        bends: vec![BendShape {
            first: 0,
            second: 1,
            modulus: 5.0,
            phi0: 0.0,
        }],
    }
}

/// Registers a trimer whose members sit at `positions`.
pub fn add_trimer(
    reg: &mut Registry,
    id: MoleculeId,
    head: BeadId,
    positions: [[f64; 3]; 3],
) -> Molecule {
    let shape = trimer();
    let mut mol = Molecule::empty(0);
    shape.fill(&mut mol, id, 0, head, id * 10, id * 10);
    for (j, &bead) in mol.beads.iter().enumerate() {
        let mut b = Bead::new(bead, shape.bead_types[j], 0.5, positions[j]).in_molecule(id);
        b.velocity = [0.1 * j as f64, -0.2, 0.3];
        b.old_velocity = [0.05, 0.0, -0.1 * j as f64];
        b.old_force = [1.0, j as f64, -2.0];
        reg.insert_bead(b).expect("fresh bead id");
    }
    reg.insert_molecule(mol.clone()).expect("fresh molecule id");
    mol
}

pub fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() <= eps
}

pub fn approx_vec(a: [f64; 3], b: [f64; 3], eps: f64) -> bool {
    (0..3).all(|i| approx_eq(a[i], b[i], eps))
}
