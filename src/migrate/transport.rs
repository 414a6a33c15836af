//! Two-phase point-to-point messaging between ranks.
//!
//! A [`Transport`] issues non-blocking sends and receives that return a
//! [`Request`] handle; [`Transport::complete`] blocks until the matching
//! operation finishes. [`LocalNetwork`] implements the trait over
//! `std::sync::mpsc` channels so that each rank can run on its own thread.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use log::trace;
use thiserror::Error;

use crate::model::types::Rank;

/// Distinguishes independent message streams between the same pair of ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    LinearBeads,
    PlanarBeads,
    GhostPositions,
}

/// Failures reported by a transport. All of them are fatal for the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("rank {peer} is outside a communicator of {size} ranks")]
    InvalidRank { peer: Rank, size: usize },

    #[error("rank {peer} is no longer reachable")]
    Disconnected { peer: Rank },

    #[error("message of {len} bytes from rank {peer} overflows a {capacity}-byte receive")]
    Truncated {
        peer: Rank,
        len: usize,
        capacity: usize,
    },

    #[error("no message from rank {peer} within {waited:?}")]
    TimedOut { peer: Rank, waited: Duration },
}

/// Handle for an operation in flight. Consumed by [`Transport::complete`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an issued request must be completed"]
pub enum Request {
    Send {
        dest: Rank,
        tag: Tag,
    },
    Receive {
        source: Rank,
        tag: Tag,
        capacity: usize,
    },
}

/// Result of completing a [`Request`].
#[derive(Debug, PartialEq, Eq)]
pub enum Completion {
    Sent,
    Received(Vec<u8>),
}

pub trait Transport {
    fn rank(&self) -> Rank;

    /// Number of ranks in the communicator.
    fn size(&self) -> usize;

    /// Starts sending `payload` to `dest`. Never blocks.
    fn begin_send(&mut self, dest: Rank, tag: Tag, payload: Vec<u8>)
    -> Result<Request, TransportError>;

    /// Starts receiving at most `capacity` bytes from `source`. Never blocks.
    fn begin_receive(
        &mut self,
        source: Rank,
        tag: Tag,
        capacity: usize,
    ) -> Result<Request, TransportError>;

    /// Blocks until `request` finishes.
    fn complete(&mut self, request: Request) -> Result<Completion, TransportError>;
}

#[derive(Debug)]
struct Envelope {
    source: Rank,
    tag: Tag,
    payload: Vec<u8>,
}

/// Builder for a set of connected [`LocalTransport`] endpoints.
pub struct LocalNetwork;

impl LocalNetwork {
    /// Creates `size` fully connected endpoints, one per rank.
    pub fn new(size: usize) -> Vec<LocalTransport> {
        Self::with_timeout(size, None)
    }

    /// Like [`new`](Self::new), but receives fail with
    /// [`TransportError::TimedOut`] after `timeout`.
    pub fn with_timeout(size: usize, timeout: Option<Duration>) -> Vec<LocalTransport> {
        let (senders, inboxes): (Vec<Sender<Envelope>>, Vec<Receiver<Envelope>>) =
            (0..size).map(|_| mpsc::channel()).unzip();
        inboxes
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalTransport {
                rank,
                peers: senders.clone(),
                inbox,
                stash: VecDeque::new(),
                timeout,
            })
            .collect()
    }
}

/// One rank's endpoint of a [`LocalNetwork`].
///
/// Messages from the same source with the same tag are delivered in the
/// order they were sent. Messages that arrive before a matching receive is
/// completed are held back until one is.
#[derive(Debug)]
pub struct LocalTransport {
    rank: Rank,
    peers: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    stash: VecDeque<Envelope>,
    timeout: Option<Duration>,
}

impl LocalTransport {
    fn check_rank(&self, peer: Rank) -> Result<(), TransportError> {
        if peer < self.peers.len() {
            Ok(())
        } else {
            Err(TransportError::InvalidRank {
                peer,
                size: self.peers.len(),
            })
        }
    }

    fn take_stashed(&mut self, source: Rank, tag: Tag) -> Option<Envelope> {
        let i = self
            .stash
            .iter()
            .position(|e| e.source == source && e.tag == tag)?;
        self.stash.remove(i)
    }

    fn wait_for(&mut self, source: Rank, tag: Tag) -> Result<Envelope, TransportError> {
        if let Some(env) = self.take_stashed(source, tag) {
            return Ok(env);
        }
        loop {
            let env = match self.timeout {
                None => self
                    .inbox
                    .recv()
                    .map_err(|_| TransportError::Disconnected { peer: source })?,
                Some(waited) => self.inbox.recv_timeout(waited).map_err(|e| match e {
                    RecvTimeoutError::Timeout => TransportError::TimedOut {
                        peer: source,
                        waited,
                    },
                    RecvTimeoutError::Disconnected => TransportError::Disconnected { peer: source },
                })?,
            };
            if env.source == source && env.tag == tag {
                return Ok(env);
            }
            trace!(
                "[rank {}] holding {:?} message from rank {} while waiting for {:?} from rank {}",
                self.rank, env.tag, env.source, tag, source
            );
            self.stash.push_back(env);
        }
    }
}

impl Transport for LocalTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn begin_send(
        &mut self,
        dest: Rank,
        tag: Tag,
        payload: Vec<u8>,
    ) -> Result<Request, TransportError> {
        self.check_rank(dest)?;
        let env = Envelope {
            source: self.rank,
            tag,
            payload,
        };
        self.peers[dest]
            .send(env)
            .map_err(|_| TransportError::Disconnected { peer: dest })?;
        Ok(Request::Send { dest, tag })
    }

    fn begin_receive(
        &mut self,
        source: Rank,
        tag: Tag,
        capacity: usize,
    ) -> Result<Request, TransportError> {
        self.check_rank(source)?;
        Ok(Request::Receive {
            source,
            tag,
            capacity,
        })
    }

    fn complete(&mut self, request: Request) -> Result<Completion, TransportError> {
        match request {
            Request::Send { .. } => Ok(Completion::Sent),
            Request::Receive {
                source,
                tag,
                capacity,
            } => {
                let env = self.wait_for(source, tag)?;
                if env.payload.len() > capacity {
                    return Err(TransportError::Truncated {
                        peer: source,
                        len: env.payload.len(),
                        capacity,
                    });
                }
                Ok(Completion::Received(env.payload))
            }
        }
    }
}
