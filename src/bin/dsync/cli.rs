use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "dsync",
    about = "Bead migration and bonded-force synchronization across ranks",
    version,
    author,
    before_help = crate::display::banner_for_help(),
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Random-walk molecules across in-process ranks and check conservation
    #[command(visible_alias = "r")]
    Run(RunArgs),

    /// Validate a configuration file and list its templates
    #[command(visible_alias = "c")]
    Config(ConfigArgs),
}

/// Options shared by all commands.
#[derive(Args)]
pub struct CommonOptions {
    /// Configuration file (TOML; embedded defaults if omitted)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Suppress progress output (for scripting)
    #[arg(short, long)]
    pub quiet: bool,
}

/// Decomposition of the simulation box.
#[derive(Args)]
#[command(next_help_heading = "Decomposition")]
pub struct DecompositionOptions {
    /// Number of ranks, each running on its own thread
    #[arg(short = 'n', long, value_name = "N", default_value = "3")]
    pub ranks: usize,

    /// Sub-domain grid GX GY GZ (default: N slabs along x)
    #[arg(long, value_name = "G", num_args = 3)]
    pub grid: Option<Vec<usize>>,

    /// Box edge lengths LX LY LZ
    #[arg(long = "box", value_name = "L", num_args = 3, default_values = ["24.0", "8.0", "8.0"])]
    pub box_size: Vec<f64>,

    /// Boundary condition along every axis
    #[arg(long, value_name = "TYPE", default_value = "periodic")]
    pub boundary: Boundary,
}

/// Molecules placed in the box and how they move.
#[derive(Args)]
#[command(next_help_heading = "Workload")]
pub struct WorkloadOptions {
    /// Number of molecules
    #[arg(short, long, value_name = "M", default_value = "24")]
    pub molecules: usize,

    /// Molecule template by name
    #[arg(long = "molecule-type", value_name = "NAME", default_value = "Lipid")]
    pub molecule_type: String,

    /// Number of steps
    #[arg(short, long, value_name = "STEPS", default_value = "50")]
    pub steps: usize,

    /// Seed for placement and displacements
    #[arg(long, value_name = "SEED", default_value = "42")]
    pub seed: u64,

    /// Largest rigid displacement of a molecule per step, per axis
    #[arg(long, value_name = "D", default_value = "0.4")]
    pub drift: f64,

    /// Largest independent displacement of a bead per step, per axis
    #[arg(long, value_name = "D", default_value = "0.02")]
    pub jitter: f64,
}

/// Transfer overrides layered over the configuration file.
#[derive(Args)]
#[command(next_help_heading = "Transfer Options")]
pub struct TransferOptions {
    /// Move whole molecules with their head bead instead of splitting them
    #[arg(long)]
    pub whole_molecules: bool,

    /// Beads per migration batch
    #[arg(long, value_name = "N")]
    pub max_batch: Option<usize>,

    /// Fail a rank whose receive waits longer than this (default: from the
    /// configuration, else 10 s)
    #[arg(long = "timeout-ms", value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Relative tolerance of the force check against the serial reference
    #[arg(long, value_name = "TOL", default_value = "1e-9")]
    pub tolerance: f64,
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonOptions,

    #[command(flatten)]
    pub decomposition: DecompositionOptions,

    #[command(flatten)]
    pub workload: WorkloadOptions,

    #[command(flatten)]
    pub transfer: TransferOptions,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub common: CommonOptions,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum Boundary {
    /// Periodic along every axis
    #[default]
    Periodic,
    /// Closed walls; beads outside belong to the nearest edge sub-domain
    #[value(name = "non-periodic", alias = "open")]
    NonPeriodic,
}

pub fn parse() -> Cli {
    Cli::parse()
}
