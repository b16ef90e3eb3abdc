// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Operator commands.
//!
//! Each command produces one JSON document for stdout. Errors are mapped to
//! exit codes in [`crate::error`]; nothing here interprets them.

use std::future::Future;

use clap::error::ErrorKind as ClapErrorKind;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::error::{CliError, ErrorKind};
use crate::ledger::{AccountId, LedgerClient};
use crate::reconcile::{CancelStage, ReconcileError, ReconcileOutcome, Reconciler};
use crate::storage::{builtin_migrations, LedgerStore, USERS_TABLE};

/// Default number of records shown by `history`.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Parser)]
#[command(name = "fitchain", version)]
#[command(about = "Keep cached FIT balances consistent with the Hedera ledger", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Exit with status 5 when a reconciliation ends in a discrepancy
    #[arg(long, global = true)]
    pub fail_on_discrepancy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Mint FIT to the treasury
    Mint {
        /// Amount in the token's smallest unit
        amount: u64,

        /// Repeat-safe key; a confirmed key is never minted twice
        #[arg(long)]
        idempotency_key: Option<String>,
    },

    /// Treasury balance on the ledger and in the cache, plus total supply
    CheckBalance,

    /// Ledger and cached balance of one account (read-only)
    Balance {
        /// Account id (`shard.realm.num`)
        account: AccountId,
    },

    /// Bring cached balances in line with the ledger
    Reconcile {
        /// Account id (`shard.realm.num`)
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        account: Option<AccountId>,

        /// Reconcile every account in the local store
        #[arg(long)]
        all: bool,
    },

    /// Reconciliation records for an account, newest first
    History {
        /// Account id (`shard.realm.num`)
        account: AccountId,

        /// Maximum number of records
        #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: usize,
    },

    /// Associate an application user with an account
    LinkUser {
        /// Account id (`shard.realm.num`)
        account: AccountId,

        /// Application user id (unique)
        user_id: String,

        #[arg(long)]
        email: Option<String>,
    },

    /// Apply built-in schema migrations and show the schema state
    Migrate,
}

impl Command {
    /// Whether the command talks to the ledger.
    pub fn requires_ledger(&self) -> bool {
        !matches!(
            self,
            Command::History { .. } | Command::LinkUser { .. } | Command::Migrate
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Mint { .. } => "mint",
            Command::CheckBalance => "check-balance",
            Command::Balance { .. } => "balance",
            Command::Reconcile { .. } => "reconcile",
            Command::History { .. } => "history",
            Command::LinkUser { .. } => "link-user",
            Command::Migrate => "migrate",
        }
    }
}

/// What the command line asked for.
#[derive(Debug)]
pub enum Invocation {
    Run(Cli),
    /// Help or version text; printed as is, exit status 0
    Print(String),
}

/// Parse `args` (program name first). Usage errors are validation failures.
pub fn parse_args<I, T>(args: I) -> Result<Invocation, CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => Ok(Invocation::Run(cli)),
        Err(e) if matches!(e.kind(), ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion) => {
            Ok(Invocation::Print(e.render().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Result of a command, ready to print.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub value: Value,
    /// At least one reconciliation ended in a discrepancy
    pub discrepancy: bool,
    /// Most severe failure among batch results, if any
    pub failure: Option<ErrorKind>,
}

impl CommandOutput {
    fn new(value: &impl Serialize) -> Result<Self, CliError> {
        Ok(Self {
            value: serde_json::to_value(value)?,
            discrepancy: false,
            failure: None,
        })
    }
}

/// Run a command that needs the ledger (or delegate to [`execute_offline`]).
pub async fn execute<L: LedgerClient + 'static>(
    command: &Command,
    reconciler: &Reconciler<L>,
    cancel: &CancellationToken,
) -> Result<CommandOutput, CliError> {
    tracing::debug!(command = command.name(), "Executing command");
    match command {
        Command::Mint {
            amount,
            idempotency_key,
        } => {
            let outcome = reconciler
                .mint(*amount, idempotency_key.clone(), cancel)
                .await?;
            CommandOutput::new(&outcome)
        }
        Command::CheckBalance => {
            let report = until_cancelled(cancel, reconciler.treasury_report()).await?;
            CommandOutput::new(&report)
        }
        Command::Balance { account } => {
            let report = until_cancelled(cancel, reconciler.balance(account)).await?;
            CommandOutput::new(&report)
        }
        Command::Reconcile {
            account: Some(account),
            all: false,
        } => {
            let outcome = until_cancelled(cancel, reconciler.reconcile(account)).await?;
            let mut output = CommandOutput::new(&outcome)?;
            output.discrepancy = outcome.is_discrepancy();
            Ok(output)
        }
        Command::Reconcile { all: true, .. } => {
            let results = until_cancelled(cancel, reconciler.reconcile_all()).await?;
            batch_output(results)
        }
        Command::Reconcile { .. } => Err(CliError::validation(
            "reconcile needs an account id or --all",
        )),
        Command::History { .. } | Command::LinkUser { .. } | Command::Migrate => {
            execute_offline(command, reconciler.store())
        }
    }
}

/// Run a command that only touches the local store.
pub fn execute_offline(command: &Command, store: &LedgerStore) -> Result<CommandOutput, CliError> {
    match command {
        Command::History { account, limit } => {
            let records = store.list_records(account, *limit)?;
            CommandOutput::new(&json!({
                "account_id": account,
                "records": records,
            }))
        }
        Command::LinkUser {
            account,
            user_id,
            email,
        } => {
            let row = store.link_user(account, user_id, email.as_deref())?;
            tracing::info!(account = %account, user_id = %user_id, "Linked user to account");
            CommandOutput::new(&row)
        }
        Command::Migrate => {
            let applied = store.apply_migrations(&builtin_migrations())?;
            let migrations: Vec<Value> = store
                .applied_migrations()?
                .into_iter()
                .map(|(id, applied_at)| json!({ "id": id, "applied_at": applied_at }))
                .collect();
            let columns = store.schema_columns(USERS_TABLE)?;
            CommandOutput::new(&json!({
                "newly_applied": applied,
                "migrations": migrations,
                "table": USERS_TABLE,
                "columns": columns,
            }))
        }
        other => Err(CliError::validation(format!(
            "`{}` needs ledger access",
            other.name()
        ))),
    }
}

fn batch_output(
    results: Vec<(AccountId, Result<ReconcileOutcome, ReconcileError>)>,
) -> Result<CommandOutput, CliError> {
    let mut discrepancy = false;
    let mut failure: Option<ErrorKind> = None;
    let mut entries = Vec::with_capacity(results.len());

    for (account, result) in results {
        match result {
            Ok(outcome) => {
                discrepancy |= outcome.is_discrepancy();
                entries.push(json!({ "account_id": account, "outcome": outcome }));
            }
            Err(e) => {
                let error = CliError::from(e);
                failure = Some(match failure {
                    Some(kind) if kind.exit_code() >= error.kind.exit_code() => kind,
                    _ => error.kind,
                });
                entries.push(json!({
                    "account_id": account,
                    "error": { "kind": error.kind, "message": error.message },
                }));
            }
        }
    }

    Ok(CommandOutput {
        value: json!({ "results": entries }),
        discrepancy,
        failure,
    })
}

/// Stop waiting on a read or reconcile once `cancel` fires.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    operation: impl Future<Output = Result<T, ReconcileError>>,
) -> Result<T, ReconcileError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReconcileError::Cancelled {
            stage: CancelStage::BeforeSubmission,
            tx_id: None,
        }),
        result = operation => result,
    }
}
