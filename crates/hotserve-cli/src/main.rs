//! Hotserve CLI - serve a build output directory during development.
//!
//! Parses arguments, initializes logging and dispatches to the command.

use clap::Parser;
use hotserve_cli::{cli, commands, error, logger};
use miette::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);

    let result = match args.command {
        cli::Command::Serve(serve_args) => {
            commands::serve_execute(serve_args, args.config.as_deref()).await
        }
    };

    result.map_err(error::cli_error_to_miette)
}
