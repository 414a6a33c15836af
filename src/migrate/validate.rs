use std::collections::HashSet;

use thiserror::Error;

use crate::model::registry::Registry;
use crate::model::types::{BeadId, MoleculeId, is_valid_id};

/// Reasons a batch is refused before anything is transmitted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("batch of {count} beads exceeds capacity {capacity}")]
    BatchTooLarge { count: usize, capacity: usize },

    #[error("payload entry {index} has an invalid bead id")]
    InvalidBeadId { index: usize },

    #[error("bead {bead} is not live on the sending process")]
    MissingBead { bead: BeadId },

    #[error("bead {bead} appears more than once in the batch")]
    DuplicateBead { bead: BeadId },

    #[error("bead {bead} has an invalid owning molecule id {molecule}")]
    InvalidMoleculeId { bead: BeadId, molecule: MoleculeId },

    #[error("owning molecule {molecule} of bead {bead} is not registered")]
    MissingMolecule { bead: BeadId, molecule: MoleculeId },

    #[error("bead {bead} has negative coordinate {value} on axis {axis}")]
    NegativeCoordinate { bead: BeadId, axis: usize, value: f64 },

    #[error("bead {bead} carries a non-finite {field}")]
    NonFinite { bead: BeadId, field: &'static str },
}

/// Checks a payload against the registry it will be packed from.
///
/// Positions must be non-negative because coordinates are expressed in the
/// sub-domain's local frame.
pub fn validate_payload(
    payload: &[BeadId],
    registry: &Registry,
    capacity: usize,
) -> Result<(), ValidationError> {
    if payload.len() > capacity {
        return Err(ValidationError::BatchTooLarge {
            count: payload.len(),
            capacity,
        });
    }

    let mut seen = HashSet::with_capacity(payload.len());
    for (index, &id) in payload.iter().enumerate() {
        if !is_valid_id(id) {
            return Err(ValidationError::InvalidBeadId { index });
        }
        if !seen.insert(id) {
            return Err(ValidationError::DuplicateBead { bead: id });
        }
        let bead = registry
            .bead(id)
            .ok_or(ValidationError::MissingBead { bead: id })?;

        if !is_valid_id(bead.molecule) {
            return Err(ValidationError::InvalidMoleculeId {
                bead: id,
                molecule: bead.molecule,
            });
        }
        if !registry.contains_molecule(bead.molecule) {
            return Err(ValidationError::MissingMolecule {
                bead: id,
                molecule: bead.molecule,
            });
        }

        for (axis, &value) in bead.position.iter().enumerate() {
            if value < 0.0 {
                return Err(ValidationError::NegativeCoordinate {
                    bead: id,
                    axis,
                    value,
                });
            }
        }
        let fields = [
            ("position", bead.position),
            ("velocity", bead.velocity),
            ("old velocity", bead.old_velocity),
            ("old force", bead.old_force),
        ];
        if let Some(&(field, _)) = fields.iter().find(|(_, v)| v.iter().any(|c| !c.is_finite())) {
            return Err(ValidationError::NonFinite { bead: id, field });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::add_trimer;
    use crate::model::bead::Bead;

    fn registry() -> Registry {
        let mut reg = Registry::new();
        add_trimer(&mut reg, 77, 101, [[1.0, 1.0, 1.0], [1.5, 1.0, 1.0], [2.0, 1.0, 1.0]]);
        reg
    }

    #[test]
    fn accepts_well_formed_batch() {
        let reg = registry();
        assert_eq!(validate_payload(&[101, 102, 103], &reg, 1000), Ok(()));
        assert_eq!(validate_payload(&[], &reg, 0), Ok(()));
    }

    #[test]
    fn rejects_oversized_batch() {
        let reg = registry();
        assert_eq!(
            validate_payload(&[101, 102, 103], &reg, 2),
            Err(ValidationError::BatchTooLarge {
                count: 3,
                capacity: 2
            })
        );
    }

    #[test]
    fn rejects_bad_ids() {
        let reg = registry();
        assert_eq!(
            validate_payload(&[101, -1], &reg, 10),
            Err(ValidationError::InvalidBeadId { index: 1 })
        );
        assert_eq!(
            validate_payload(&[999], &reg, 10),
            Err(ValidationError::MissingBead { bead: 999 })
        );
        assert_eq!(
            validate_payload(&[101, 101], &reg, 10),
            Err(ValidationError::DuplicateBead { bead: 101 })
        );
    }

    #[test]
    fn rejects_orphaned_beads() {
        let mut reg = registry();
        reg.insert_bead(Bead::new(5, 0, 0.5, [1.0; 3])).unwrap();
        assert!(matches!(
            validate_payload(&[5], &reg, 10),
            Err(ValidationError::InvalidMoleculeId { bead: 5, .. })
        ));

        reg.insert_bead(Bead::new(6, 0, 0.5, [1.0; 3]).in_molecule(40)).unwrap();
        assert_eq!(
            validate_payload(&[6], &reg, 10),
            Err(ValidationError::MissingMolecule {
                bead: 6,
                molecule: 40
            })
        );
    }

    #[test]
    fn rejects_bad_coordinates() {
        let mut reg = registry();
        reg.bead_mut(102).unwrap().position[2] = -0.25;
        assert!(matches!(
            validate_payload(&[101, 102], &reg, 10),
            Err(ValidationError::NegativeCoordinate {
                bead: 102,
                axis: 2,
                ..
            })
        ));

        let mut reg = registry();
        reg.bead_mut(103).unwrap().old_force[0] = f64::NAN;
        assert_eq!(
            validate_payload(&[103], &reg, 10),
            Err(ValidationError::NonFinite {
                bead: 103,
                field: "old force"
            })
        );
    }
}
