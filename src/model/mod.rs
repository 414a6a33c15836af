//! Core data structures for beads, molecules, and their bonded topology.
//!
//! - [`types`] – Identifier types, sentinels, and the simulation box.
//! - [`bead`] – Coarse-grained particle with full kinematic history.
//! - [`bond`] – Bonds, bends, and the force laws they obey.
//! - [`molecule`] – Molecules and the per-type topology templates used to rebuild them.
//! - [`registry`] – Live beads and molecules owned by one process.
//!
//! Bonds and bends refer to molecule members by index and molecules refer to
//! beads by id, so the graph holds no references and objects can be moved in
//! and out of the [`ObjectPool`](crate::ObjectPool) freely.

pub mod bead;
pub mod bond;
pub mod molecule;
pub mod registry;
pub mod types;
