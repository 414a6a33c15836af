//! Error types for bead migration and bonded-force synchronization.
//!
//! Errors fall into four groups: pre-send validation of a batch, transport
//! failures (fatal for the run), malformed buffers, and topology
//! inconsistencies detected while evaluating bonded forces or re-attaching
//! beads to molecules.

use thiserror::Error;

use crate::migrate::{TransportError, ValidationError, WireError};
use crate::model::types::{BeadId, BondId, MoleculeId, Rank};

/// Errors produced by the synchronization core.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to parse the TOML configuration.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The configuration parsed but is not usable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A batch failed pre-send validation and was not transmitted.
    #[error("migration batch rejected: {0}")]
    Validation(#[from] ValidationError),

    /// A non-blocking send, receive or wait reported failure.
    ///
    /// Transport failures leave the exchange protocol in an unknown state
    /// and are fatal for the run.
    #[error("transport failure on rank {rank}: {source}")]
    Transport {
        /// Rank that observed the failure.
        rank: Rank,
        #[source]
        source: TransportError,
    },

    /// A received buffer does not decode.
    #[error("malformed migration buffer: {0}")]
    Wire(#[from] WireError),

    /// A message was driven out of order through its life cycle.
    #[error("cannot {action} a message that is {state}")]
    InvalidState {
        /// Current state of the message.
        state: &'static str,
        /// The operation that was attempted.
        action: &'static str,
    },

    /// Lookup of a bead that is not registered on this process.
    #[error("bead {0} is not registered on this process")]
    UnknownBead(BeadId),

    /// A bead id is already live on this process.
    #[error("bead {0} is already registered on this process")]
    DuplicateBead(BeadId),

    /// Lookup of a molecule that is not registered on this process.
    #[error("molecule {0} is not registered on this process")]
    UnknownMolecule(MoleculeId),

    /// A molecule id is already live on this process.
    #[error("molecule {0} is already registered on this process")]
    DuplicateMolecule(MoleculeId),

    /// No topology template exists for a molecule type.
    #[error("no template for molecule type {0}")]
    UnknownMoleculeType(i32),

    /// A ghost was used in a force evaluation before receiving a position.
    #[error("ghost of bead {0} has no valid position")]
    EmptyGhost(BeadId),

    /// A shared-force evaluation found neither endpoint local.
    #[error("bond {bond} has both endpoints on remote processes")]
    BothEndpointsRemote {
        /// The offending bond.
        bond: BondId,
    },

    /// A shared-force evaluation found both endpoints local.
    #[error("bond {bond} has no remote endpoint")]
    NoRemoteEndpoint {
        /// The offending bond.
        bond: BondId,
    },

    /// The caller supplied coordinates for a bead that is not the bond's
    /// remote endpoint.
    #[error("bond {bond}: remote endpoint is bead {expected}, coordinates given for bead {got}")]
    RemoteMismatch {
        /// The bond being evaluated.
        bond: BondId,
        /// Id of the remote endpoint.
        expected: BeadId,
        /// Id supplied by the caller.
        got: BeadId,
    },

    /// Molecule bookkeeping is inconsistent.
    #[error("topology inconsistency in molecule {molecule}: {detail}")]
    Topology {
        /// The molecule concerned.
        molecule: MoleculeId,
        /// Description of the problem.
        detail: String,
    },
}

impl Error {
    /// Creates a [`Transport`](Error::Transport) error.
    pub fn transport(rank: Rank, source: TransportError) -> Self {
        Self::Transport { rank, source }
    }

    /// Creates an [`InvalidState`](Error::InvalidState) error.
    pub fn invalid_state(state: &'static str, action: &'static str) -> Self {
        Self::InvalidState { state, action }
    }

    /// Creates a [`Topology`](Error::Topology) error.
    ///
    /// # Arguments
    ///
    /// * `molecule` — The molecule whose bookkeeping is inconsistent
    /// * `detail` — Description of the problem
    pub fn topology(molecule: MoleculeId, detail: impl Into<String>) -> Self {
        Self::Topology {
            molecule,
            detail: detail.into(),
        }
    }

    /// Returns `true` if the run cannot safely continue after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_fatal() {
        assert!(Error::transport(2, TransportError::Disconnected { peer: 1 }).is_fatal());
        assert!(!Error::UnknownBead(4).is_fatal());
        assert!(!Error::Validation(ValidationError::InvalidBeadId { index: 0 }).is_fatal());
        assert!(!Error::topology(3, "missing member").is_fatal());
    }

    #[test]
    fn messages_carry_context() {
        let e = Error::transport(3, TransportError::Disconnected { peer: 1 });
        let msg = e.to_string();
        assert!(msg.contains("rank 3"));

        let e = Error::RemoteMismatch {
            bond: 5,
            expected: 10,
            got: 11,
        };
        assert!(e.to_string().contains("bead 10"));

        let e = Error::invalid_state("idle", "wait on");
        assert_eq!(e.to_string(), "cannot wait on a message that is idle");
    }
}
