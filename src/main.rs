use std::io;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use apisuite::cli::{self, Cli, CliError, Command, ExitCode};
use apisuite::http::ReqwestTransport;

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(v) => v,
        Err(err) => {
            use clap::error::ErrorKind;
            let _ = err.print();
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::Success,
                _ => ExitCode::InvalidInput,
            };
            std::process::exit(code.as_i32());
        }
    };

    // Logs go to stderr so that JSON reports on stdout stay parseable.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "apisuite=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let mut stdout = io::stdout().lock();
    let outcome = match cli.command {
        Command::Run(args) => match ReqwestTransport::new().context("failed to build HTTP client") {
            Ok(transport) => cli::run(args, Arc::new(transport), &mut stdout).await,
            Err(err) => Err(CliError::Runtime(err)),
        },
        Command::History(args) => cli::history(args, &mut stdout),
    };

    let code = match outcome {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            err.exit_code()
        }
    };

    std::process::exit(code.as_i32());
}
