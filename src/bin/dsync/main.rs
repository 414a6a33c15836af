use std::process::ExitCode;

mod cli;
mod commands;
mod display;
mod sim;
mod util;

fn main() -> ExitCode {
    let cli = cli::parse();
    let quiet = match &cli.command {
        cli::Command::Run(args) => args.common.quiet,
        cli::Command::Config(args) => args.common.quiet,
    };
    init_logging(quiet);
    let ctx = display::Context::detect().with_quiet(quiet);

    if ctx.interactive {
        display::print_banner();
    }

    match commands::dispatch(cli.command, ctx) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            display::print_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(quiet: bool) {
    let default = if quiet { "error" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp_millis()
        .init();
}
