//! Cross-process bead ownership and bonded-force synchronization for
//! domain-decomposed dissipative particle dynamics.
//!
//! Each process owns the beads inside its sub-domain of the simulation box.
//! When a bead crosses into a neighbour's sub-domain its full state is
//! handed over; when a bonded molecule straddles a boundary, each process
//! keeps the members it owns and sees the rest as ghosts, so that every
//! bonded term is still evaluated exactly once per bead.
//!
//! # Features
//!
//! - **Migration** — validated, fixed-layout batches of bead state sent
//!   between pairs of processes, with storage recycled through an
//!   [`ObjectPool`]
//! - **Split molecules** — bonds and bends that reach across a boundary are
//!   evaluated through ghost proxies ([`bonded`])
//! - **Border bookkeeping** — which molecules are split and which of their
//!   members are remote ([`border`])
//! - **In-process transport** — [`LocalNetwork`] runs every rank on a
//!   thread of one process
//!
//! # Quick Start
//!
//! A [`Domain`] is driven once per step: migrate, refresh ghosts, evaluate
//! bonded forces.
//!
//! ```
//! use dpd_sync::{Domain, LocalNetwork, Partition, SimBox, load_config};
//!
//! let config = load_config(None)?;
//! let transport = LocalNetwork::new(1).remove(0);
//! let partition = Partition::slabs(1, SimBox::new([10.0; 3], [true; 3]))?;
//! let mut domain = Domain::new(transport, partition, config)?;
//!
//! // A five-bead lipid (molecule type 1) with bead ids 0..=4.
//! let chain: Vec<[f64; 3]> = (0..5).map(|j| [2.0 + 0.6 * j as f64, 5.0, 5.0]).collect();
//! domain.spawn_molecule(1, 1, 0, &chain)?;
//!
//! let departures = domain.plan_departures();
//! let report = domain.migrate(&departures)?;
//! assert_eq!(report.sent(), 0);
//!
//! domain.exchange_ghosts()?;
//! let remote = domain.bonded_forces()?;
//! assert!(remote.is_empty());
//!
//! // Stretched bonds pull the end beads inwards.
//! let head = domain.registry().bead(0).unwrap();
//! assert!(head.force[0] > 0.0);
//! # Ok::<(), dpd_sync::Error>(())
//! ```
//!
//! # Module Organization
//!
//! - [`model`] — beads, bonds, molecules and the per-process registry
//! - [`bonded`] — ghost-backed bonded interactions
//! - [`migrate`] — batch records, wire codec, pool, transport and messages
//! - [`border`] — extended-molecule bookkeeping
//! - [`domain`] — the per-process context and its collective steps
//! - [`config`] — TOML configuration with embedded defaults

mod error;

pub mod bonded;
pub mod border;
pub mod config;
pub mod domain;
pub mod migrate;
pub mod model;

#[cfg(test)]
mod fixtures;

pub use error::Error;

pub use config::{SyncConfig, default_config, load_config};

pub use domain::{Domain, GhostReport, MigrationReport, Partition, RejectedBatch, molecule_forces};

pub use bonded::{ForceContext, ForceLedger};

pub use migrate::{
    LocalNetwork, LocalTransport, MAX_BATCH_BEADS, ObjectPool, TransferKind, Transport,
    TransportError, ValidationError, WireError,
};

pub use model::bead::Bead;
pub use model::molecule::{Molecule, MoleculeShape};
pub use model::types::{BeadId, BondId, BondPairId, INVALID_ID, MoleculeId, Rank, SimBox};
