// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use fitchain_ledger_sync::commands::{
    execute, execute_offline, parse_args, Cli, CommandOutput, Invocation,
};
use fitchain_ledger_sync::config::{Config, LedgerConfig, LogFormat};
use fitchain_ledger_sync::error::{CliError, ErrorKind};
use fitchain_ledger_sync::ledger::{parse_operator_key, HederaClient};
use fitchain_ledger_sync::reconcile::Reconciler;
use fitchain_ledger_sync::storage::LedgerStore;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match parse_args(std::env::args_os()) {
        Ok(Invocation::Run(cli)) => cli,
        Ok(Invocation::Print(text)) => {
            print!("{text}");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            init_tracing(LogFormat::default());
            return report(e);
        }
    };

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            // The configured format is unknown; log with the default one
            init_tracing(LogFormat::default());
            return report(CliError::from(e));
        }
    };
    init_tracing(config.log_format);

    // Ctrl-C cancels the in-flight operation
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling");
                cancel.cancel();
            }
        }
    });

    let output = match run(&cli, &config, &cancel).await {
        Ok(output) => output,
        Err(e) => return report(e),
    };

    println!("{}", output.value);
    if let Some(kind) = output.failure {
        return ExitCode::from(kind.exit_code());
    }
    if output.discrepancy && cli.fail_on_discrepancy {
        return ExitCode::from(ErrorKind::Discrepancy.exit_code());
    }
    ExitCode::SUCCESS
}

async fn run(
    cli: &Cli,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<CommandOutput, CliError> {
    let store = Arc::new(LedgerStore::open(&config.db_path)?);
    tracing::debug!(path = %config.db_path.display(), "Opened ledger store");

    if !cli.command.requires_ledger() {
        return execute_offline(&cli.command, &store);
    }

    let ledger_config = LedgerConfig::from_env()?;
    let signer = parse_operator_key(ledger_config.operator_key.expose())?;
    let client = HederaClient::new(
        ledger_config.network.clone(),
        ledger_config.rpc_url.clone(),
        ledger_config.mirror_url.clone(),
        signer,
        config.retry.call_timeout,
    )?;
    tracing::info!(
        network = ledger_config.network.name,
        operator = %ledger_config.operator_id,
        token = %ledger_config.token_id,
        treasury = %ledger_config.treasury_id,
        "Connected ledger client"
    );

    let reconciler = Reconciler::new(
        Arc::new(client),
        store,
        ledger_config.token_id,
        ledger_config.treasury_id,
    )
    .with_retry_policy(config.retry);

    execute(&cli.command, &reconciler, cancel).await
}

fn report(error: CliError) -> ExitCode {
    tracing::error!(kind = ?error.kind, error = %error, "Command failed");
    println!("{}", error.to_json());
    error.exit_code()
}

/// Logs go to stderr so stdout carries only the JSON result.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.with_target(false).try_init(),
    };
}
