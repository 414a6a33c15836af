//! Fixed-layout binary encoding of migration batches.
//!
//! A batch is a little-endian, length-prefixed set of parallel arrays. Every
//! array holds one entry per bead in the same order, so index `i` of every
//! array describes the same bead. Vector quantities are stored as three
//! arrays (all x, then all y, then all z).
//!
//! ```text
//! count:i32
//! ids:i64×N  display_ids:i64×N  visible:i8×N  types:i32×N
//! molecule_id:i64×N  molecule_type:i32×N
//! linear:  migration_order:i32×N
//! planar:  location:i32×N  first_bond:i64×N  first_bend:i64×N
//! position  velocity  old_velocity  old_force   (3 × f64×N each)
//! linear:  unwrapped  initial                    (3 × f64×N each)
//! ```

use thiserror::Error;

use super::record::{BeadRecord, Placement, TransferKind};
use crate::model::types::BeadId;

const I8: usize = 1;
const I32: usize = 4;
const I64: usize = 8;
const F64: usize = 8;
const VEC3: usize = 3 * F64;

/// Errors decoding or encoding a batch buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("buffer ends after {available} bytes, {needed} required")]
    Truncated { needed: usize, available: usize },

    #[error("negative bead count {0}")]
    NegativeCount(i32),

    #[error("batch of {count} beads exceeds capacity {capacity}")]
    TooManyBeads { count: usize, capacity: usize },

    #[error("{0} unread bytes after the last field")]
    TrailingBytes(usize),

    #[error("visibility flag {value} at index {index} is not 0 or 1")]
    InvalidFlag { index: usize, value: i8 },

    #[error("record {index} has {found} placement in a {expected} batch")]
    MixedPlacement {
        index: usize,
        expected: TransferKind,
        found: TransferKind,
    },
}

/// Bytes occupied by one bead in a batch of the given kind.
pub const fn bead_size(kind: TransferKind) -> usize {
    let common = 2 * I64 + I8 + I32 + I64 + I32 + 4 * VEC3;
    match kind {
        TransferKind::Linear => common + I32 + 2 * VEC3,
        TransferKind::Planar => common + I32 + 2 * I64,
    }
}

/// Exact size of an encoded batch of `count` beads.
pub const fn encoded_len(kind: TransferKind, count: usize) -> usize {
    I32 + count * bead_size(kind)
}

/// Serializes `records` as a batch of the given kind.
///
/// # Errors
///
/// [`WireError::MixedPlacement`] if a record's placement does not match
/// `kind`, and [`WireError::TooManyBeads`] if the count does not fit the
/// 32-bit length prefix.
pub fn encode(kind: TransferKind, records: &[BeadRecord]) -> Result<Vec<u8>, WireError> {
    for (index, r) in records.iter().enumerate() {
        let found = r.placement.kind();
        if found != kind {
            return Err(WireError::MixedPlacement {
                index,
                expected: kind,
                found,
            });
        }
    }
    let count = i32::try_from(records.len()).map_err(|_| WireError::TooManyBeads {
        count: records.len(),
        capacity: i32::MAX as usize,
    })?;

    let mut buf = Vec::with_capacity(encoded_len(kind, records.len()));
    buf.extend_from_slice(&count.to_le_bytes());

    put_i64(&mut buf, records.iter().map(|r| r.id));
    put_i64(&mut buf, records.iter().map(|r| r.display_id));
    buf.extend(records.iter().map(|r| u8::from(r.visible)));
    put_i32(&mut buf, records.iter().map(|r| r.bead_type));
    put_i64(&mut buf, records.iter().map(|r| r.molecule_id));
    put_i32(&mut buf, records.iter().map(|r| r.molecule_type));

    match kind {
        TransferKind::Linear => {
            put_i32(
                &mut buf,
                records.iter().map(|r| match r.placement {
                    Placement::Linear { migration_order } => migration_order,
                    Placement::Planar { .. } => unreachable!("placement checked above"),
                }),
            );
        }
        TransferKind::Planar => {
            let planar: Vec<(i32, i64, i64)> = records
                .iter()
                .map(|r| match r.placement {
                    Placement::Planar {
                        location,
                        first_bond,
                        first_pair,
                    } => (location, first_bond, first_pair),
                    Placement::Linear { .. } => unreachable!("placement checked above"),
                })
                .collect();
            put_i32(&mut buf, planar.iter().map(|p| p.0));
            put_i64(&mut buf, planar.iter().map(|p| p.1));
            put_i64(&mut buf, planar.iter().map(|p| p.2));
        }
    }

    put_vec3(&mut buf, records, |r| r.position);
    put_vec3(&mut buf, records, |r| r.velocity);
    put_vec3(&mut buf, records, |r| r.old_velocity);
    put_vec3(&mut buf, records, |r| r.old_force);
    if kind == TransferKind::Linear {
        put_vec3(&mut buf, records, |r| r.unwrapped);
        put_vec3(&mut buf, records, |r| r.initial);
    }

    debug_assert_eq!(buf.len(), encoded_len(kind, records.len()));
    Ok(buf)
}

/// Deserializes a batch, accepting at most `capacity` beads.
///
/// Planar records come back with `unwrapped` and `initial` set to the
/// position, since neither is transmitted.
pub fn decode(kind: TransferKind, buf: &[u8], capacity: usize) -> Result<Vec<BeadRecord>, WireError> {
    let mut r = Reader::new(buf);
    let raw = r.i32()?;
    let n = usize::try_from(raw).map_err(|_| WireError::NegativeCount(raw))?;
    if n > capacity {
        return Err(WireError::TooManyBeads { count: n, capacity });
    }
    let needed = encoded_len(kind, n);
    if buf.len() < needed {
        return Err(WireError::Truncated {
            needed,
            available: buf.len(),
        });
    }

    let ids = r.i64s(n)?;
    let display_ids = r.i64s(n)?;
    let flags = r.i8s(n)?;
    let types = r.i32s(n)?;
    let molecule_ids = r.i64s(n)?;
    let molecule_types = r.i32s(n)?;
    let placements: Vec<Placement> = match kind {
        TransferKind::Linear => r
            .i32s(n)?
            .into_iter()
            .map(|migration_order| Placement::Linear { migration_order })
            .collect(),
        TransferKind::Planar => {
            let locations = r.i32s(n)?;
            let bonds = r.i64s(n)?;
            let pairs = r.i64s(n)?;
            (0..n)
                .map(|i| Placement::Planar {
                    location: locations[i],
                    first_bond: bonds[i],
                    first_pair: pairs[i],
                })
                .collect()
        }
    };
    let position = r.vec3s(n)?;
    let velocity = r.vec3s(n)?;
    let old_velocity = r.vec3s(n)?;
    let old_force = r.vec3s(n)?;
    let (unwrapped, initial) = match kind {
        TransferKind::Linear => (r.vec3s(n)?, r.vec3s(n)?),
        TransferKind::Planar => (position.clone(), position.clone()),
    };
    r.finish()?;

    let mut records = Vec::with_capacity(n);
    for i in 0..n {
        let visible = match flags[i] {
            0 => false,
            1 => true,
            value => return Err(WireError::InvalidFlag { index: i, value }),
        };
        records.push(BeadRecord {
            id: ids[i],
            display_id: display_ids[i],
            visible,
            bead_type: types[i],
            molecule_id: molecule_ids[i],
            molecule_type: molecule_types[i],
            placement: placements[i],
            position: position[i],
            velocity: velocity[i],
            old_velocity: old_velocity[i],
            old_force: old_force[i],
            unwrapped: unwrapped[i],
            initial: initial[i],
        });
    }
    Ok(records)
}

/// Exact size of an encoded position list of `count` beads.
pub const fn positions_len(count: usize) -> usize {
    I32 + count * (I64 + VEC3)
}

/// Serializes `(id, position)` pairs for a border exchange, using the same
/// count-prefixed parallel-array layout as bead batches.
pub fn encode_positions(entries: &[(BeadId, [f64; 3])]) -> Result<Vec<u8>, WireError> {
    let count = i32::try_from(entries.len()).map_err(|_| WireError::TooManyBeads {
        count: entries.len(),
        capacity: i32::MAX as usize,
    })?;
    let mut buf = Vec::with_capacity(positions_len(entries.len()));
    buf.extend_from_slice(&count.to_le_bytes());
    put_i64(&mut buf, entries.iter().map(|e| e.0));
    for axis in 0..3 {
        for e in entries {
            buf.extend_from_slice(&e.1[axis].to_le_bytes());
        }
    }
    Ok(buf)
}

pub fn decode_positions(buf: &[u8]) -> Result<Vec<(BeadId, [f64; 3])>, WireError> {
    let mut r = Reader::new(buf);
    let raw = r.i32()?;
    let n = usize::try_from(raw).map_err(|_| WireError::NegativeCount(raw))?;
    let needed = positions_len(n);
    if buf.len() < needed {
        return Err(WireError::Truncated {
            needed,
            available: buf.len(),
        });
    }
    let ids = r.i64s(n)?;
    let positions = r.vec3s(n)?;
    r.finish()?;
    Ok(ids.into_iter().zip(positions).collect())
}

fn put_i32(buf: &mut Vec<u8>, values: impl Iterator<Item = i32>) {
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
}

fn put_i64(buf: &mut Vec<u8>, values: impl Iterator<Item = i64>) {
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
}

fn put_vec3(buf: &mut Vec<u8>, records: &[BeadRecord], field: impl Fn(&BeadRecord) -> [f64; 3]) {
    for axis in 0..3 {
        for r in records {
            buf.extend_from_slice(&field(r)[axis].to_le_bytes());
        }
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        let end = self.pos + len;
        let bytes = self.buf.get(self.pos..end).ok_or(WireError::Truncated {
            needed: end,
            available: self.buf.len(),
        })?;
        self.pos = end;
        Ok(bytes)
    }

    fn i32(&mut self) -> Result<i32, WireError> {
        let b = self.take(I32)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i8s(&mut self, n: usize) -> Result<Vec<i8>, WireError> {
        Ok(self.take(n * I8)?.iter().map(|&b| b as i8).collect())
    }

    fn i32s(&mut self, n: usize) -> Result<Vec<i32>, WireError> {
        Ok(self
            .take(n * I32)?
            .chunks_exact(I32)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    fn i64s(&mut self, n: usize) -> Result<Vec<i64>, WireError> {
        Ok(self
            .take(n * I64)?
            .chunks_exact(I64)
            .map(|c| i64::from_le_bytes(eight(c)))
            .collect())
    }

    fn f64s(&mut self, n: usize) -> Result<Vec<f64>, WireError> {
        Ok(self
            .take(n * F64)?
            .chunks_exact(F64)
            .map(|c| f64::from_le_bytes(eight(c)))
            .collect())
    }

    fn vec3s(&mut self, n: usize) -> Result<Vec<[f64; 3]>, WireError> {
        let x = self.f64s(n)?;
        let y = self.f64s(n)?;
        let z = self.f64s(n)?;
        Ok((0..n).map(|i| [x[i], y[i], z[i]]).collect())
    }

    fn finish(&self) -> Result<(), WireError> {
        match self.buf.len() - self.pos {
            0 => Ok(()),
            extra => Err(WireError::TrailingBytes(extra)),
        }
    }
}

fn eight(c: &[u8]) -> [u8; 8] {
    [c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]
}
