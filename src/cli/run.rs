use std::io::Write;
use std::sync::Arc;

use anyhow::{Context as _, anyhow};
use chrono::SecondsFormat;

use crate::config::SuiteFile;
use crate::http::client::HttpClient;
use crate::http::interceptor::DefaultHeaders;
use crate::http::transport::Transport;
use crate::services::ServiceRegistry;
use crate::storage::Store;
use crate::testing::{RunOptions, RunnerError, TestRunner, generate_report};

use super::{CliError, ExitCode, HistoryArgs, OutputFormat, RunArgs};

/// Runs one suite through `transport` and writes the report to `out`.
pub async fn run(
    args: RunArgs,
    transport: Arc<dyn Transport>,
    out: &mut dyn Write,
) -> Result<ExitCode, CliError> {
    let suite = SuiteFile::load(&args.file).map_err(|err| CliError::InvalidInput(err.into()))?;

    let mut config = suite.config;
    if let Some(env) = &args.env {
        if !config.environments.contains_key(env) {
            return Err(CliError::InvalidInput(anyhow!("unknown environment `{env}`")));
        }
        config.current_environment = env.clone();
    }

    let store = args
        .db
        .as_deref()
        .map(Store::open)
        .transpose()
        .context("failed to open database")
        .map_err(CliError::Runtime)?;

    let client = HttpClient::new(transport).with_defaults(config.client_defaults());
    client.add_request_interceptor(DefaultHeaders(config.default_headers.clone()));
    let client = client.with_logging();
    if let Some(store) = &store {
        let history = store
            .load_history()
            .context("failed to load history")
            .map_err(CliError::Runtime)?;
        client.restore_history(history);
    }

    let registry = ServiceRegistry::new(config).with_services(suite.services);
    let runner = TestRunner::new(Arc::new(client), registry).with_tests(suite.tests);
    if let Some(store) = &store {
        let results = store
            .load_results()
            .context("failed to load results")
            .map_err(CliError::Runtime)?;
        runner.restore_results(results);
    }

    let options = RunOptions {
        parallel: args.parallel,
        timeout: args.timeout,
    };
    let results = runner
        .run_test_suite(&args.suite, options)
        .await
        .map_err(|err| match err {
            RunnerError::EmptySuite(_) => CliError::InvalidInput(err.into()),
            other => CliError::Runtime(other.into()),
        })?;
    let report = generate_report(&results);

    let written = match args.output {
        OutputFormat::Text => out.write_all(report.to_text().as_bytes()),
        OutputFormat::Json => serde_json::to_writer_pretty(&mut *out, &report)
            .map_err(std::io::Error::from)
            .and_then(|()| writeln!(out)),
    };
    written
        .context("failed to write report")
        .map_err(CliError::Runtime)?;

    if let Some(store) = &store {
        persist(store, &runner)
            .context("failed to save state")
            .map_err(CliError::Runtime)?;
    }

    Ok(ExitCode::from_summary(&report.summary))
}

fn persist(store: &Store, runner: &TestRunner) -> anyhow::Result<()> {
    store.save_history(&runner.client().history_snapshot())?;
    store.save_services(runner.registry().list())?;
    store.save_tests(runner.tests())?;
    store.save_results(&runner.results())?;
    Ok(())
}

/// Prints the persisted request history, most recent first.
pub fn history(args: HistoryArgs, out: &mut dyn Write) -> Result<ExitCode, CliError> {
    if !args.db.exists() {
        return Err(CliError::InvalidInput(anyhow!(
            "database `{}` does not exist",
            args.db.display()
        )));
    }

    let store = Store::open(&args.db)
        .context("failed to open database")
        .map_err(CliError::Runtime)?;
    let history = store
        .load_history()
        .context("failed to load history")
        .map_err(CliError::Runtime)?;

    let limit = args.limit.unwrap_or(usize::MAX);
    for entry in history.entries().iter().take(limit) {
        let mut line = format!(
            "{} {:<6} {} {} {}ms",
            entry.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            entry.method.to_string(),
            entry.url,
            entry.status,
            entry.response_time
        );
        if let Some(error) = &entry.error {
            line.push_str(&format!(" ({error})"));
        }
        writeln!(out, "{line}")
            .context("failed to write history")
            .map_err(CliError::Runtime)?;
    }

    Ok(ExitCode::Success)
}
