use log::warn;

use super::Domain;
use crate::bonded::{ForceContext, ForceLedger};
use crate::error::Error;
use crate::migrate::Transport;
use crate::model::bond::bend;
use crate::model::molecule::Molecule;
use crate::model::types::{MoleculeId, add_assign, sub_assign};

/// Bonded forces on every member of a molecule whose positions are all
/// known, in member order.
///
/// Degenerate bonds and bends contribute nothing and are reported.
pub fn molecule_forces(
    molecule: &Molecule,
    positions: &[[f64; 3]],
    ctx: &ForceContext<'_>,
) -> Result<Vec<[f64; 3]>, Error> {
    let n = molecule.bead_count();
    if positions.len() != n {
        return Err(Error::topology(
            molecule.id,
            format!("{} positions for {n} members", positions.len()),
        ));
    }
    let member = |i: usize| {
        if i < n {
            Ok(i)
        } else {
            Err(Error::topology(molecule.id, format!("member index {i} out of range")))
        }
    };

    let mut forces = vec![[0.0; 3]; n];
    for bond in &molecule.bonds {
        let (h, t) = (member(bond.head)?, member(bond.tail)?);
        match bond.force(positions[h], positions[t], ctx.simbox, ctx.params.degenerate_length) {
            Some(f) => {
                add_assign(&mut forces[h], f.on_head);
                sub_assign(&mut forces[t], f.on_head);
            }
            None => warn!(
                "[rank {}] bond {} in molecule {} is degenerate, skipping",
                ctx.rank, bond.id, molecule.id
            ),
        }
    }

    for pair in &molecule.bond_pairs {
        let first = molecule.bonds.get(pair.first);
        let second = molecule.bonds.get(pair.second);
        let (Some(first), Some(second)) = (first, second) else {
            return Err(Error::topology(
                molecule.id,
                format!("bend {} references a missing bond", pair.id),
            ));
        };
        if first.head != second.tail {
            return Err(Error::topology(
                molecule.id,
                format!("bend {} bonds do not share a middle bead", pair.id),
            ));
        }
        let (a, b, c) = (member(first.tail)?, member(first.head)?, member(second.head)?);
        let u = ctx.simbox.separation(positions[b], positions[a]);
        let v = ctx.simbox.separation(positions[c], positions[b]);
        match bend(u, v, pair.modulus, pair.phi0, ctx.params.degenerate_length) {
            Some(f) => {
                add_assign(&mut forces[a], f.on_first);
                add_assign(&mut forces[b], f.on_middle);
                add_assign(&mut forces[c], f.on_last);
            }
            None => warn!(
                "[rank {}] bend {} in molecule {} has a degenerate bond, skipping",
                ctx.rank, pair.id, molecule.id
            ),
        }
    }
    Ok(forces)
}

impl<T: Transport> Domain<T> {
    /// Evaluates every bonded term touching a local bead.
    ///
    /// Current forces are reset first. Whole molecules use the plain force
    /// laws; extended molecules go through their ghost-backed wrappers so
    /// that each bead is pushed only by the process that owns it. Bonds with
    /// no local endpoint are left to other processes.
    ///
    /// Returns the shares computed here for beads owned elsewhere, keyed by
    /// owning rank.
    pub fn bonded_forces(&mut self) -> Result<ForceLedger, Error> {
        self.bonded_pass()
            .map_err(|e| self.log_failure("bonded force pass", e))
    }

    fn bonded_pass(&mut self) -> Result<ForceLedger, Error> {
        let Self {
            rank,
            config,
            partition,
            registry,
            border,
            ..
        } = self;
        let ctx = ForceContext {
            simbox: partition.simbox(),
            params: &config.forces,
            rank: *rank,
        };
        registry.clear_forces();
        let mut ledger = ForceLedger::new();

        for id in registry.molecule_ids() {
            if border.contains(id) {
                continue;
            }
            let Some(molecule) = registry.molecule(id) else {
                continue;
            };
            let positions = molecule
                .beads
                .iter()
                .map(|&b| registry.position(b))
                .collect::<Result<Vec<_>, _>>()?;
            let forces = molecule_forces(molecule, &positions, &ctx)?;
            let members = molecule.beads.clone();
            for (bead, f) in members.into_iter().zip(forces) {
                registry.add_force(bead, f)?;
            }
        }

        for id in border.molecule_ids() {
            let Some(ext) = border.get_mut(id) else {
                continue;
            };
            let molecule: MoleculeId = ext.id();
            let (bonds, pairs) = ext.parts_mut();

            for bond in bonds.iter_mut() {
                match bond.local_ends() {
                    2 => {
                        bond.add_force(registry, &ctx)?;
                    }
                    1 => {
                        let Some(ghost) = bond.ghosts().next() else {
                            continue;
                        };
                        if ghost.is_empty() {
                            return Err(Error::EmptyGhost(ghost.id()));
                        }
                        let (remote, position, owner) = (ghost.id(), ghost.position(), ghost.owner());
                        let mut acc = [0.0; 3];
                        if bond
                            .add_shared_force(registry, remote, position, &mut acc, &ctx)?
                            .is_some()
                        {
                            ledger.add(owner, remote, acc);
                        }
                    }
                    _ => {}
                }
            }

            for pair in pairs {
                if pair.local_beads(bonds) > 0 {
                    pair.add_force(molecule, bonds, registry, &ctx)?;
                }
            }

            for bond in bonds.iter_mut() {
                for ghost in bond.ghosts_mut() {
                    let f = ghost.take_force();
                    if f != [0.0; 3] {
                        ledger.add(ghost.owner(), ghost.id(), f);
                    }
                }
            }
        }
        Ok(ledger)
    }
}
