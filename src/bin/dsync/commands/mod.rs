mod config;
mod run;

use config::run_config;
use run::run_sim;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use dpd_sync::{SyncConfig, load_config};

use crate::cli::Command;
use crate::display::Context as DisplayContext;

pub fn dispatch(command: Command, ctx: DisplayContext) -> Result<()> {
    match command {
        Command::Run(args) => run_sim(args, ctx),
        Command::Config(args) => run_config(args, ctx),
    }
}

/// Loads the configuration file, or the embedded defaults without one.
fn read_config(path: Option<&Path>) -> Result<SyncConfig> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read configuration '{}'", path.display()))?;
            load_config(Some(&text))
                .with_context(|| format!("Configuration '{}' is not usable", path.display()))
        }
        None => Ok(load_config(None)?),
    }
}
