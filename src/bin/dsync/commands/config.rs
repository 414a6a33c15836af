use anyhow::Result;

use crate::cli::ConfigArgs;
use crate::display::{Context as DisplayContext, Progress, print_templates};

pub fn run_config(args: ConfigArgs, ctx: DisplayContext) -> Result<()> {
    let mut progress = Progress::new(ctx.interactive, 1);

    progress.step("Validating configuration");
    let config = super::read_config(args.common.config.as_deref())?;
    let source = match &args.common.config {
        Some(path) => format!("Read {}", path.display()),
        None => "Use embedded defaults".to_string(),
    };
    progress.complete_step(
        "Validating configuration",
        &[
            source,
            format!("{} bead types", config.bead_types.len()),
            format!("{} molecule templates", config.molecule_types.len()),
        ],
    );

    if !args.common.quiet {
        print_templates(&config);
    }
    progress.finish();
    Ok(())
}
