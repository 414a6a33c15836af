use log::{debug, warn};

use super::Domain;
use crate::error::Error;
use crate::migrate::{Completion, Tag, Transport, wire};
use crate::model::types::BeadId;

/// Outcome of one ghost exchange on one rank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GhostReport {
    /// Border positions published to each neighbour.
    pub sent: usize,
    /// Ghost ids updated from incoming positions.
    pub refreshed: usize,
    /// Ghosts left without a position.
    pub stale: Vec<BeadId>,
}

impl<T: Transport> Domain<T> {
    /// Publishes the positions of local members of split molecules to every
    /// neighbour and refreshes ghosts from what the neighbours publish.
    ///
    /// Collective, like [`Domain::migrate`]. Every ghost is invalidated
    /// first, so one that no neighbour reports stays empty and shows up in
    /// [`GhostReport::stale`]; a force pass touching it then fails with
    /// [`Error::EmptyGhost`].
    pub fn exchange_ghosts(&mut self) -> Result<GhostReport, Error> {
        self.ghost_pass()
            .map_err(|e| self.log_failure("ghost exchange", e))
    }

    fn ghost_pass(&mut self) -> Result<GhostReport, Error> {
        let rank = self.rank;
        self.border.invalidate_ghosts();

        let mut ids: Vec<BeadId> = self
            .border
            .iter()
            .flat_map(|ext| ext.members().iter().copied())
            .filter(|&b| self.registry.contains_bead(b))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        let entries = ids
            .iter()
            .map(|&b| Ok((b, self.registry.position(b)?)))
            .collect::<Result<Vec<_>, Error>>()?;
        let buf = wire::encode_positions(&entries)?;

        let neighbours = self.partition.neighbours(rank);
        let mut sends = Vec::with_capacity(neighbours.len());
        for &peer in &neighbours {
            let request = self
                .transport
                .begin_send(peer, Tag::GhostPositions, buf.clone())
                .map_err(|e| Error::transport(rank, e))?;
            sends.push(request);
        }
        let mut receives = Vec::with_capacity(neighbours.len());
        for &peer in &neighbours {
            let request = self
                .transport
                .begin_receive(peer, Tag::GhostPositions, usize::MAX)
                .map_err(|e| Error::transport(rank, e))?;
            receives.push((peer, request));
        }
        for request in sends {
            self.transport
                .complete(request)
                .map_err(|e| Error::transport(rank, e))?;
        }

        let mut refreshed = 0;
        for (peer, request) in receives {
            let completion = self
                .transport
                .complete(request)
                .map_err(|e| Error::transport(rank, e))?;
            let Completion::Received(bytes) = completion else {
                return Err(Error::invalid_state("a send", "read ghost positions from"));
            };
            for (id, position) in wire::decode_positions(&bytes)? {
                if self.border.refresh_ghost(id, position, peer) {
                    refreshed += 1;
                }
            }
        }

        let mut stale: Vec<BeadId> = self.border.iter().flat_map(|ext| ext.stale_ghosts()).collect();
        stale.sort_unstable();
        stale.dedup();
        if !stale.is_empty() {
            warn!(
                "[rank {rank}] {} ghosts received no position: {stale:?}",
                stale.len()
            );
        }
        debug!(
            "[rank {rank}] ghost exchange: published {}, refreshed {refreshed}",
            entries.len()
        );
        Ok(GhostReport {
            sent: entries.len(),
            refreshed,
            stale,
        })
    }
}
