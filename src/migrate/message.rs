use std::collections::HashMap;

use log::debug;

use super::pool::ObjectPool;
use super::record::{BeadRecord, Placement, TransferKind};
use super::transport::{Completion, Request, Tag, Transport};
use super::validate::validate_payload;
use super::{MAX_BATCH_BEADS, wire};
use crate::config::SyncConfig;
use crate::error::Error;
use crate::model::bead::Bead;
use crate::model::molecule::MoleculeState;
use crate::model::registry::Registry;
use crate::model::types::{BeadId, MoleculeId, Rank};

/// Message stream used for a transfer kind.
pub fn tag_for(kind: TransferKind) -> Tag {
    match kind {
        TransferKind::Linear => Tag::LinearBeads,
        TransferKind::Planar => Tag::PlanarBeads,
    }
}

/// Receive buffer size: one maximum-capacity batch.
pub fn receive_capacity(kind: TransferKind) -> usize {
    wire::encoded_len(kind, MAX_BATCH_BEADS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Idle,
    Validated,
    /// Beads are being packed and released.
    Sending,
    SentPending,
    Completed,
    /// Validation or the transport refused the batch; nothing was sent.
    Rejected,
}

impl SendState {
    fn name(self) -> &'static str {
        match self {
            SendState::Idle => "idle",
            SendState::Validated => "validated",
            SendState::Sending => "sending",
            SendState::SentPending => "pending",
            SendState::Completed => "completed",
            SendState::Rejected => "rejected",
        }
    }
}

/// What left this process when a batch was packed.
#[derive(Debug, Clone, Default)]
pub struct Departure {
    /// Snapshots of the beads, in payload order.
    pub records: Vec<BeadRecord>,
    /// Molecules with no local member left, whose storage was recycled.
    pub recycled_molecules: Vec<MoleculeId>,
}

/// Outgoing half of one batch transfer to a single destination.
#[derive(Debug)]
pub struct SendMessage {
    kind: TransferKind,
    dest: Rank,
    payload: Vec<BeadId>,
    state: SendState,
    request: Option<Request>,
}

impl SendMessage {
    pub fn new(kind: TransferKind, dest: Rank) -> Self {
        Self {
            kind,
            dest,
            payload: Vec::new(),
            state: SendState::Idle,
            request: None,
        }
    }

    pub fn kind(&self) -> TransferKind {
        self.kind
    }

    pub fn dest(&self) -> Rank {
        self.dest
    }

    pub fn state(&self) -> SendState {
        self.state
    }

    pub fn payload(&self) -> &[BeadId] {
        &self.payload
    }

    /// Attaches the beads to transmit. Touches nothing else.
    pub fn set_payload(&mut self, beads: Vec<BeadId>) -> Result<(), Error> {
        if self.state != SendState::Idle {
            return Err(Error::invalid_state(self.state.name(), "set the payload of"));
        }
        self.payload = beads;
        Ok(())
    }

    /// Checks the payload against the registry.
    ///
    /// A failure moves the message to [`SendState::Rejected`]; the caller
    /// decides what to do with the beads, nothing is retried.
    pub fn validate(&mut self, registry: &Registry, capacity: usize) -> Result<(), Error> {
        if self.state != SendState::Idle {
            return Err(Error::invalid_state(self.state.name(), "validate"));
        }
        match validate_payload(&self.payload, registry, capacity) {
            Ok(()) => {
                self.state = SendState::Validated;
                Ok(())
            }
            Err(e) => {
                self.state = SendState::Rejected;
                Err(e.into())
            }
        }
    }

    /// Packs the payload, starts the send and releases the beads to `pool`.
    ///
    /// Beads are released only once the transport has accepted the buffer,
    /// so a failed send leaves the registry untouched and the message
    /// [`SendState::Rejected`]. A molecule whose last local member leaves is
    /// removed and recycled too; one with members remaining stays
    /// registered.
    pub fn send<T: Transport + ?Sized>(
        &mut self,
        registry: &mut Registry,
        pool: &mut ObjectPool,
        transport: &mut T,
    ) -> Result<Departure, Error> {
        if self.state != SendState::Validated {
            return Err(Error::invalid_state(self.state.name(), "send"));
        }
        self.state = SendState::Sending;
        match self.start(registry, transport) {
            Ok((records, request)) => {
                self.request = Some(request);
                self.state = SendState::SentPending;
                let recycled_molecules = release(&records, registry, pool);
                Ok(Departure {
                    records,
                    recycled_molecules,
                })
            }
            Err(e) => {
                self.state = SendState::Rejected;
                Err(e)
            }
        }
    }

    fn start<T: Transport + ?Sized>(
        &self,
        registry: &Registry,
        transport: &mut T,
    ) -> Result<(Vec<BeadRecord>, Request), Error> {
        let records = self.pack(registry)?;
        let buf = wire::encode(self.kind, &records)?;
        let rank = transport.rank();
        debug!(
            "[rank {rank}] sending {} {} beads to rank {} ({} bytes)",
            records.len(),
            self.kind,
            self.dest,
            buf.len()
        );
        let request = transport
            .begin_send(self.dest, tag_for(self.kind), buf)
            .map_err(|e| Error::transport(rank, e))?;
        Ok((records, request))
    }

    /// Blocks until the send finishes.
    pub fn wait<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), Error> {
        let Some(request) = self.request.take() else {
            return Err(Error::invalid_state(self.state.name(), "wait on"));
        };
        let rank = transport.rank();
        transport
            .complete(request)
            .map_err(|e| Error::transport(rank, e))?;
        self.state = SendState::Completed;
        Ok(())
    }

    fn pack(&self, registry: &Registry) -> Result<Vec<BeadRecord>, Error> {
        let mut order: HashMap<MoleculeId, i32> = HashMap::new();
        let mut records = Vec::with_capacity(self.payload.len());
        for &id in &self.payload {
            let bead = registry.bead(id).ok_or(Error::UnknownBead(id))?;
            let molecule = registry
                .molecule(bead.molecule)
                .ok_or(Error::UnknownMolecule(bead.molecule))?;
            let placement = match self.kind {
                TransferKind::Linear => {
                    let n = order.entry(molecule.id).or_insert(0);
                    let migration_order = *n;
                    *n += 1;
                    Placement::Linear { migration_order }
                }
                TransferKind::Planar => {
                    let location = molecule.location_of(id).ok_or_else(|| {
                        Error::topology(molecule.id, format!("bead {id} is not a member"))
                    })?;
                    Placement::Planar {
                        location: location as i32,
                        first_bond: molecule.first_bond_id(),
                        first_pair: molecule.first_bond_pair_id(),
                    }
                }
            };
            records.push(BeadRecord::capture(bead, molecule.mol_type, placement));
        }
        Ok(records)
    }
}

/// Removes sent beads from the registry and recycles their storage, along
/// with any molecule left without local members.
fn release(records: &[BeadRecord], registry: &mut Registry, pool: &mut ObjectPool) -> Vec<MoleculeId> {
    let mut touched: Vec<MoleculeId> = Vec::new();
    for record in records {
        if let Some(bead) = registry.remove_bead(record.id) {
            pool.recycle_bead(bead);
        }
        if !touched.contains(&record.molecule_id) {
            touched.push(record.molecule_id);
        }
    }
    let mut recycled = Vec::new();
    for mol in touched {
        if registry.molecule_state(mol) == MoleculeState::Empty {
            if let Some(m) = registry.remove_molecule(mol) {
                pool.recycle_molecule(m);
                recycled.push(mol);
            }
        }
    }
    recycled
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveState {
    Idle,
    ReceivePending,
    /// The buffer has arrived but has not been unpacked.
    Completed,
    Unpacked,
}

impl ReceiveState {
    fn name(self) -> &'static str {
        match self {
            ReceiveState::Idle => "idle",
            ReceiveState::ReceivePending => "pending",
            ReceiveState::Completed => "completed",
            ReceiveState::Unpacked => "unpacked",
        }
    }
}

/// Beads unpacked from one batch plus the topology metadata needed to
/// re-attach them, index-aligned with `beads`.
///
/// The beads are not registered anywhere yet.
#[derive(Debug, Clone)]
pub struct ReceivedBatch {
    pub source: Rank,
    pub kind: TransferKind,
    pub beads: Vec<Bead>,
    pub molecule_types: Vec<i32>,
    pub placements: Vec<Placement>,
}

impl ReceivedBatch {
    pub fn len(&self) -> usize {
        self.beads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beads.is_empty()
    }
}

/// Incoming half of one batch transfer from a single source.
#[derive(Debug)]
pub struct ReceiveMessage {
    kind: TransferKind,
    source: Rank,
    state: ReceiveState,
    request: Option<Request>,
}

impl ReceiveMessage {
    pub fn new(kind: TransferKind, source: Rank) -> Self {
        Self {
            kind,
            source,
            state: ReceiveState::Idle,
            request: None,
        }
    }

    pub fn state(&self) -> ReceiveState {
        self.state
    }

    /// Posts the receive into a buffer sized for a full batch.
    pub fn receive<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), Error> {
        if self.state != ReceiveState::Idle {
            return Err(Error::invalid_state(self.state.name(), "receive into"));
        }
        let rank = transport.rank();
        let request = transport
            .begin_receive(self.source, tag_for(self.kind), receive_capacity(self.kind))
            .map_err(|e| Error::transport(rank, e))?;
        self.request = Some(request);
        self.state = ReceiveState::ReceivePending;
        Ok(())
    }

    /// Blocks for the buffer, then fills pooled beads from it.
    ///
    /// The pool grows when it holds fewer free beads than the batch.
    /// Radii are restored from the bead-type table.
    pub fn wait<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        pool: &mut ObjectPool,
        config: &SyncConfig,
    ) -> Result<ReceivedBatch, Error> {
        let Some(request) = self.request.take() else {
            return Err(Error::invalid_state(self.state.name(), "wait on"));
        };
        let rank = transport.rank();
        let bytes = match transport
            .complete(request)
            .map_err(|e| Error::transport(rank, e))?
        {
            Completion::Received(bytes) => bytes,
            Completion::Sent => return Err(Error::invalid_state("a send", "unpack")),
        };
        self.state = ReceiveState::Completed;

        let records = wire::decode(self.kind, &bytes, MAX_BATCH_BEADS)?;
        let mut beads = pool.pop_beads(records.len());
        for (bead, record) in beads.iter_mut().zip(&records) {
            record.restore_into(bead, config.bead_radius(record.bead_type));
        }
        self.state = ReceiveState::Unpacked;
        debug!(
            "[rank {rank}] unpacked {} {} beads from rank {}",
            beads.len(),
            self.kind,
            self.source
        );
        Ok(ReceivedBatch {
            source: self.source,
            kind: self.kind,
            beads,
            molecule_types: records.iter().map(|r| r.molecule_type).collect(),
            placements: records.iter().map(|r| r.placement).collect(),
        })
    }
}
