use std::collections::{BTreeMap, HashMap, HashSet};

use log::{debug, warn};

use super::Domain;
use crate::border::ExtendedMolecule;
use crate::error::Error;
use crate::migrate::{
    Placement, ReceiveMessage, ReceivedBatch, SendMessage, TransferKind, Transport,
};
use crate::model::bead::Bead;
use crate::model::types::{BeadId, MoleculeId, Rank};

const KINDS: [TransferKind; 2] = [TransferKind::Linear, TransferKind::Planar];

/// A batch withheld because it failed validation. Its beads stay local.
#[derive(Debug)]
pub struct RejectedBatch {
    pub dest: Rank,
    pub kind: TransferKind,
    pub beads: usize,
    pub error: Error,
}

/// Outcome of one migration exchange on one rank.
#[derive(Debug, Default)]
pub struct MigrationReport {
    pub linear_sent: usize,
    pub planar_sent: usize,
    pub linear_received: usize,
    pub planar_received: usize,
    /// Molecules whose last local member left.
    pub molecules_recycled: usize,
    /// Molecules registered here for the first time.
    pub molecules_created: usize,
    /// Split molecules whose members are all local again.
    pub became_whole: usize,
    pub rejected: Vec<RejectedBatch>,
}

impl MigrationReport {
    pub fn sent(&self) -> usize {
        self.linear_sent + self.planar_sent
    }

    pub fn received(&self) -> usize {
        self.linear_received + self.planar_received
    }
}

impl<T: Transport> Domain<T> {
    /// Local beads whose position now lies in another rank's sub-domain,
    /// paired with that rank, in ascending bead order.
    ///
    /// With extended molecules disabled, whole molecules follow the owner
    /// of their head bead instead.
    pub fn plan_departures(&self) -> Vec<(BeadId, Rank)> {
        let mut out = Vec::new();
        if self.config.transfer.extended_molecules {
            for id in self.registry.bead_ids() {
                let Some(bead) = self.registry.bead(id) else {
                    continue;
                };
                let owner = self.partition.owner_of(bead.position);
                if owner != self.rank {
                    out.push((id, owner));
                }
            }
        } else {
            for id in self.registry.molecule_ids() {
                let Some(molecule) = self.registry.molecule(id) else {
                    continue;
                };
                let Some(head) = molecule.head().and_then(|h| self.registry.bead(h)) else {
                    continue;
                };
                let owner = self.partition.owner_of(head.position);
                if owner != self.rank {
                    out.extend(molecule.beads.iter().map(|&b| (b, owner)));
                }
            }
            out.sort_unstable();
        }
        out
    }

    /// Hands `departures` to their new owners and takes in arrivals.
    ///
    /// Collective: every rank sends exactly one linear and one planar batch
    /// to each neighbour, empty or not, and receives the same from each.
    /// A molecule leaving in one piece travels linearly; any other departing
    /// bead travels alone in a planar batch and leaves a ghost behind.
    ///
    /// A batch that fails validation is replaced by an empty one; its beads
    /// stay here and the failure is listed in the report. Departures to a
    /// rank that is not a neighbour are ignored with a warning.
    ///
    /// # Errors
    ///
    /// Transport failures ([`Error::is_fatal`]) and topology errors found
    /// while re-attaching arrivals.
    pub fn migrate(&mut self, departures: &[(BeadId, Rank)]) -> Result<MigrationReport, Error> {
        self.exchange_beads(departures)
            .map_err(|e| self.log_failure("migration", e))
    }

    fn exchange_beads(&mut self, departures: &[(BeadId, Rank)]) -> Result<MigrationReport, Error> {
        let rank = self.rank;
        let neighbours = self.partition.neighbours(rank);
        let mut outgoing = self.sort_departures(departures, &neighbours)?;
        let mut report = MigrationReport::default();
        let max_batch = self.config.transfer.max_batch;

        let mut sends = Vec::with_capacity(2 * neighbours.len());
        for &dest in &neighbours {
            for kind in KINDS {
                let payload = outgoing.remove(&(dest, kind)).unwrap_or_default();
                let count = payload.len();
                let mut msg = SendMessage::new(kind, dest);
                msg.set_payload(payload)?;
                if let Err(error) = msg.validate(&self.registry, max_batch) {
                    warn!(
                        "[rank {rank}] {kind} batch of {count} beads for rank {dest} rejected, keeping them: {error}"
                    );
                    report.rejected.push(RejectedBatch {
                        dest,
                        kind,
                        beads: count,
                        error,
                    });
                    msg = SendMessage::new(kind, dest);
                    msg.validate(&self.registry, max_batch)?;
                }

                if kind == TransferKind::Planar {
                    for &bead in msg.payload() {
                        self.border.depart(&self.registry, bead, dest, rank)?;
                    }
                }
                let departure = msg.send(&mut self.registry, &mut self.pool, &mut self.transport)?;
                for mol in departure.recycled_molecules {
                    self.border.forget(mol);
                    report.molecules_recycled += 1;
                }
                match kind {
                    TransferKind::Linear => report.linear_sent += departure.records.len(),
                    TransferKind::Planar => report.planar_sent += departure.records.len(),
                }
                sends.push(msg);
            }
        }

        let mut receives = Vec::with_capacity(2 * neighbours.len());
        for &source in &neighbours {
            for kind in KINDS {
                let mut msg = ReceiveMessage::new(kind, source);
                msg.receive(&mut self.transport)?;
                receives.push(msg);
            }
        }
        for msg in &mut sends {
            msg.wait(&mut self.transport)?;
        }
        let mut batches = Vec::with_capacity(receives.len());
        for msg in &mut receives {
            batches.push(msg.wait(&mut self.transport, &mut self.pool, &self.config)?);
        }

        let mut batches = batches.into_iter();
        while let Some(batch) = batches.next() {
            let attached = match batch.kind {
                TransferKind::Linear => {
                    report.linear_received += batch.len();
                    self.attach_linear(batch, &mut report)
                }
                TransferKind::Planar => {
                    report.planar_received += batch.len();
                    self.attach_planar(batch, &mut report)
                }
            };
            if let Err(e) = attached {
                for bead in batches.flat_map(|b| b.beads) {
                    self.pool.recycle_bead(bead);
                }
                return Err(e);
            }
        }

        if report.sent() + report.received() > 0 {
            debug!(
                "[rank {rank}] migration: sent {} linear + {} planar, received {} linear + {} planar",
                report.linear_sent, report.planar_sent, report.linear_received, report.planar_received
            );
        }
        Ok(report)
    }

    /// Groups departures into per-destination batches.
    fn sort_departures(
        &self,
        departures: &[(BeadId, Rank)],
        neighbours: &[Rank],
    ) -> Result<HashMap<(Rank, TransferKind), Vec<BeadId>>, Error> {
        let mut dest_of: BTreeMap<BeadId, Rank> = BTreeMap::new();
        for &(bead, dest) in departures {
            if dest == self.rank {
                continue;
            }
            if !neighbours.contains(&dest) {
                warn!(
                    "[rank {}] bead {bead} moved to rank {dest}, which is not a neighbour; keeping it",
                    self.rank
                );
                continue;
            }
            if !self.registry.contains_bead(bead) {
                return Err(Error::UnknownBead(bead));
            }
            dest_of.insert(bead, dest);
        }

        let mut batches: HashMap<(Rank, TransferKind), Vec<BeadId>> = HashMap::new();
        let mut handled: HashSet<BeadId> = HashSet::new();
        for (&bead, &dest) in &dest_of {
            if handled.contains(&bead) {
                continue;
            }
            let molecule = self
                .registry
                .bead(bead)
                .and_then(|b| self.registry.molecule(b.molecule));
            let whole_move = molecule.filter(|m| {
                !self.border.contains(m.id)
                    && m.beads.iter().all(|member| dest_of.get(member) == Some(&dest))
            });
            match whole_move {
                Some(m) => {
                    batches
                        .entry((dest, TransferKind::Linear))
                        .or_default()
                        .extend(&m.beads);
                    handled.extend(&m.beads);
                }
                None => {
                    batches
                        .entry((dest, TransferKind::Planar))
                        .or_default()
                        .push(bead);
                    handled.insert(bead);
                }
            }
        }
        Ok(batches)
    }

    /// Rebuilds molecules that arrived in one piece.
    fn attach_linear(&mut self, batch: ReceivedBatch, report: &mut MigrationReport) -> Result<(), Error> {
        let mut groups: BTreeMap<MoleculeId, Vec<(i32, i32, Bead)>> = BTreeMap::new();
        for ((bead, placement), mol_type) in batch
            .beads
            .into_iter()
            .zip(batch.placements)
            .zip(batch.molecule_types)
        {
            let order = match placement {
                Placement::Linear { migration_order } => migration_order,
                Placement::Planar { .. } => -1,
            };
            groups
                .entry(bead.molecule)
                .or_default()
                .push((order, mol_type, bead));
        }

        for members in groups.values_mut() {
            members.sort_by_key(|m| m.0);
        }
        // All or nothing: a bad group sends the whole batch back to the pool.
        let failure = groups
            .iter()
            .find_map(|(&mol_id, members)| self.check_linear_group(mol_id, members).err());
        if let Some(e) = failure {
            for (_, _, bead) in groups.into_values().flatten() {
                self.pool.recycle_bead(bead);
            }
            return Err(e);
        }

        for (mol_id, members) in groups {
            let mol_type = members[0].1;
            let head = members[0].2.id;
            let shape = self
                .config
                .shape(mol_type)
                .ok_or(Error::UnknownMoleculeType(mol_type))?;
            let mut molecule = self.pool.pop_molecule();
            shape.fill(&mut molecule, mol_id, mol_type, head, head, head);
            self.registry.insert_molecule(molecule)?;
            for (_, _, bead) in members {
                self.registry.insert_bead(bead)?;
            }
            report.molecules_created += 1;
        }
        Ok(())
    }

    fn check_linear_group(&self, mol_id: MoleculeId, members: &[(i32, i32, Bead)]) -> Result<(), Error> {
        let Some((_, mol_type, head)) = members.first() else {
            return Ok(());
        };
        let shape = self
            .config
            .shape(*mol_type)
            .ok_or(Error::UnknownMoleculeType(*mol_type))?;
        if members.len() != shape.bead_count() {
            return Err(Error::topology(
                mol_id,
                format!(
                    "{} of {} members arrived in a linear batch",
                    members.len(),
                    shape.bead_count()
                ),
            ));
        }
        if self.registry.contains_molecule(mol_id) {
            return Err(Error::DuplicateMolecule(mol_id));
        }
        if let Some((_, _, dup)) = members.iter().find(|m| self.registry.contains_bead(m.2.id)) {
            return Err(Error::DuplicateBead(dup.id));
        }
        for (j, (order, _, bead)) in members.iter().enumerate() {
            if *order != j as i32 || bead.id != head.id + j as i64 {
                return Err(Error::topology(
                    mol_id,
                    format!("bead {} arrived with migration order {order} at position {j}", bead.id),
                ));
            }
        }
        Ok(())
    }

    /// Places beads of split molecules by their location.
    fn attach_planar(&mut self, batch: ReceivedBatch, report: &mut MigrationReport) -> Result<(), Error> {
        let source = batch.source;
        let mut arrivals = batch
            .beads
            .into_iter()
            .zip(batch.placements)
            .zip(batch.molecule_types);
        while let Some(((bead, placement), mol_type)) = arrivals.next() {
            if let Err(e) = self.attach_one(bead, placement, mol_type, source, report) {
                for ((rest, _), _) in arrivals {
                    self.pool.recycle_bead(rest);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn attach_one(
        &mut self,
        bead: Bead,
        placement: Placement,
        mol_type: i32,
        source: Rank,
        report: &mut MigrationReport,
    ) -> Result<(), Error> {
        let (id, mol_id) = (bead.id, bead.molecule);
        let Placement::Planar {
            location,
            first_bond,
            first_pair,
        } = placement
        else {
            self.pool.recycle_bead(bead);
            return Err(Error::topology(mol_id, format!("bead {id} has no location")));
        };

        if self.registry.contains_bead(id) {
            self.pool.recycle_bead(bead);
            return Err(Error::DuplicateBead(id));
        }
        if !self.registry.contains_molecule(mol_id) {
            let Some(shape) = self.config.shape(mol_type) else {
                self.pool.recycle_bead(bead);
                return Err(Error::UnknownMoleculeType(mol_type));
            };
            if location < 0 || location as usize >= shape.bead_count() {
                self.pool.recycle_bead(bead);
                return Err(Error::topology(
                    mol_id,
                    format!("bead {id} placed at location {location}"),
                ));
            }
            let mut molecule = self.pool.pop_molecule();
            shape.fill(
                &mut molecule,
                mol_id,
                mol_type,
                id - i64::from(location),
                first_bond,
                first_pair,
            );
            self.registry.insert_molecule(molecule)?;
            self.registry.insert_bead(bead)?;
            let molecule = self
                .registry
                .molecule(mol_id)
                .ok_or(Error::UnknownMolecule(mol_id))?;
            self.border
                .insert(ExtendedMolecule::wrap(molecule, &self.registry, source));
            report.molecules_created += 1;
        } else {
            self.registry.insert_bead(bead)?;
        }

        if self.border.arrive(&self.registry, id, self.rank)? {
            report.became_whole += 1;
        }
        Ok(())
    }
}
