//! Configuration for migration and bonded-force synchronization.
//!
//! Settings are read from TOML. When no custom text is supplied the embedded
//! `default.sync.toml` is used.
//!
//! - [`SyncConfig`] — Top-level configuration
//! - [`TransferParams`] — Batch capacity, receive timeout, extended-molecule mode
//! - [`ForceParams`] — Bonded-force sanity thresholds
//! - [`BeadTypeParams`] — Per-type bead properties not carried on the wire
//! - [`MoleculeShape`] — Per-type molecule topology templates

use std::sync::OnceLock;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;
use crate::migrate::MAX_BATCH_BEADS;
use crate::model::molecule::MoleculeShape;

const DEFAULT_CONFIG_TOML: &str = include_str!("../resources/default.sync.toml");

static DEFAULT_CONFIG: OnceLock<SyncConfig> = OnceLock::new();

/// Top-level configuration.
///
/// # Examples
///
/// ```
/// use dpd_sync::load_config;
///
/// let config = load_config(Some(
///     r#"
///     [transfer]
///     max_batch = 64
///
///     [[molecule_types]]
///     name = "Dimer"
///     bead_types = [0, 0]
///     bonds = [{ head = 1, tail = 0, k = 128.0, l0 = 0.5 }]
///     "#,
/// ))?;
/// assert_eq!(config.transfer.max_batch, 64);
/// assert_eq!(config.shape(0).unwrap().bead_count(), 2);
/// # Ok::<(), dpd_sync::Error>(())
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub transfer: TransferParams,
    #[serde(default)]
    pub forces: ForceParams,
    /// Bead properties, indexed by bead type.
    #[serde(default)]
    pub bead_types: Vec<BeadTypeParams>,
    /// Molecule templates, indexed by molecule type.
    #[serde(default)]
    pub molecule_types: Vec<MoleculeShape>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferParams {
    /// Maximum beads per migration batch.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
    /// Upper bound on a blocking receive. `None` blocks indefinitely.
    #[serde(default)]
    pub receive_timeout_ms: Option<u64>,
    /// When `true`, a molecule straddling a boundary keeps members on both
    /// sides; when `false`, whole molecules follow their head bead.
    #[serde(default = "default_extended_molecules")]
    pub extended_molecules: bool,
}

fn default_max_batch() -> usize {
    MAX_BATCH_BEADS
}
fn default_extended_molecules() -> bool {
    true
}

impl Default for TransferParams {
    fn default() -> Self {
        Self {
            max_batch: default_max_batch(),
            receive_timeout_ms: None,
            extended_molecules: default_extended_molecules(),
        }
    }
}

impl TransferParams {
    pub fn receive_timeout(&self) -> Option<Duration> {
        self.receive_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForceParams {
    /// Shared bonds longer than this are reported.
    #[serde(default = "default_bond_length_warning")]
    pub bond_length_warning: f64,
    /// Bonds shorter than this contribute no force.
    #[serde(default = "default_degenerate_length")]
    pub degenerate_length: f64,
}

fn default_bond_length_warning() -> f64 {
    2.0
}
fn default_degenerate_length() -> f64 {
    1.0e-12
}

impl Default for ForceParams {
    fn default() -> Self {
        Self {
            bond_length_warning: default_bond_length_warning(),
            degenerate_length: default_degenerate_length(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BeadTypeParams {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_radius")]
    pub radius: f64,
}

fn default_radius() -> f64 {
    0.5
}

impl SyncConfig {
    /// Radius for a bead type, falling back to the default radius.
    pub fn bead_radius(&self, bead_type: i32) -> f64 {
        usize::try_from(bead_type)
            .ok()
            .and_then(|t| self.bead_types.get(t))
            .map_or_else(default_radius, |b| b.radius)
    }

    /// Topology template for a molecule type.
    pub fn shape(&self, mol_type: i32) -> Option<&MoleculeShape> {
        usize::try_from(mol_type)
            .ok()
            .and_then(|t| self.molecule_types.get(t))
    }

    /// Longest bonded reach over every molecule template.
    pub fn max_bonded_span(&self) -> f64 {
        self.molecule_types
            .iter()
            .map(MoleculeShape::bonded_span)
            .fold(0.0, f64::max)
    }

    /// Looks up a molecule type by template name.
    pub fn mol_type_named(&self, name: &str) -> Option<i32> {
        self.molecule_types
            .iter()
            .position(|m| m.name == name)
            .and_then(|i| i32::try_from(i).ok())
    }

    /// Checks limits and every molecule template.
    pub fn validate(&self) -> Result<(), Error> {
        let max = self.transfer.max_batch;
        if max == 0 || max > MAX_BATCH_BEADS {
            return Err(Error::InvalidConfig(format!(
                "transfer.max_batch must be in 1..={MAX_BATCH_BEADS}, got {max}"
            )));
        }
        if !(self.forces.degenerate_length >= 0.0) {
            return Err(Error::InvalidConfig(
                "forces.degenerate_length must be non-negative".to_string(),
            ));
        }
        for shape in &self.molecule_types {
            shape.check().map_err(Error::InvalidConfig)?;
        }
        Ok(())
    }
}

/// Parses and validates a configuration.
///
/// # Arguments
///
/// * `custom_toml` — TOML text, or `None` for the embedded defaults
///
/// # Errors
///
/// [`Error::ConfigParse`] for malformed TOML and [`Error::InvalidConfig`]
/// for values outside their limits.
pub fn load_config(custom_toml: Option<&str>) -> Result<SyncConfig, Error> {
    match custom_toml {
        Some(text) => {
            let config: SyncConfig = toml::from_str(text)?;
            config.validate()?;
            Ok(config)
        }
        None => Ok(default_config().clone()),
    }
}

pub fn default_config() -> &'static SyncConfig {
    DEFAULT_CONFIG.get_or_init(|| {
        toml::from_str(DEFAULT_CONFIG_TOML)
            .expect("Failed to parse embedded default configuration. This is a library bug.")
    })
}
