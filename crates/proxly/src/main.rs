mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose, cli.global.debug);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

/// `RUST_LOG` wins; otherwise `--debug` or the `-v` count picks the level.
fn init_tracing(verbosity: u8, debug: bool) {
    let level = if debug { verbosity.max(2) } else { verbosity };
    let filter = match level {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands don't need a cluster connection
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "proxly", &mut std::io::stdout());
            Ok(())
        }

        Command::Login(args) => commands::login::handle(args, &cli.global).await,

        cmd => {
            let (profile, cluster) = commands::connect(&cli.global, None).await?;
            tracing::debug!(%profile, command = ?cmd, "dispatching command");
            commands::dispatch(cmd, &cluster, &cli.global)
                .await
                .map_err(|e| e.for_profile(&profile))
        }
    }
}
