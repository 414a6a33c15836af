//! Transfer of bead ownership between processes.
//!
//! A batch moves from one sender to one receiver in two halves:
//!
//! - [`SendMessage`]: `set_payload` → `validate` → `send` → `wait`. Packing
//!   releases each bead's storage to the sender's [`ObjectPool`].
//! - [`ReceiveMessage`]: `receive` → `wait`. Unpacking fills beads drawn
//!   from the receiver's pool and hands them back unregistered, together
//!   with the metadata needed to re-attach them to molecules.
//!
//! Batches are encoded with the fixed layout in [`wire`] and carried by any
//! [`Transport`]; [`LocalNetwork`] connects ranks running on threads of one
//! process.

mod message;
mod pool;
mod record;
mod transport;
mod validate;
pub mod wire;

pub use message::{
    Departure, ReceiveMessage, ReceiveState, ReceivedBatch, SendMessage, SendState,
    receive_capacity, tag_for,
};
pub use pool::ObjectPool;
pub use record::{BeadRecord, Placement, TransferKind};
pub use transport::{Completion, LocalNetwork, LocalTransport, Request, Tag, Transport, TransportError};
pub use validate::{ValidationError, validate_payload};
pub use wire::WireError;

/// Upper bound on beads in one batch.
pub const MAX_BATCH_BEADS: usize = 1000;
