// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Reconciliation passes over one or many accounts.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::locks::AccountLocks;
use super::{CancelStage, ReconcileError};
use crate::ledger::{AccountId, LedgerClient, LedgerResult, RetryPolicy, TokenId, TransactionId};
use crate::storage::{
    AttemptState, BalanceWrite, LedgerStore, ReconcileAction, ReconciliationRecord, RowVersion,
};

/// Default pause between receipt polls.
pub const DEFAULT_RECEIPT_INTERVAL: Duration = Duration::from_secs(2);

/// Default number of receipt polls before giving up.
pub const DEFAULT_RECEIPT_POLLS: u32 = 15;

/// Upper bound on accounts reconciled at the same time.
pub const DEFAULT_MAX_CONCURRENT: usize = 8;

/// How long to wait for a mint receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptPolling {
    pub interval: Duration,
    pub max_polls: u32,
}

impl Default for ReceiptPolling {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RECEIPT_INTERVAL,
            max_polls: DEFAULT_RECEIPT_POLLS,
        }
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub account_id: AccountId,
    pub action: ReconcileAction,
    pub state: AttemptState,
    /// Cached balance before the pass (None if there was no row)
    pub cached_before: Option<u64>,
    pub ledger_balance: u64,
    /// Cached balance after the pass
    pub cached_after: Option<u64>,
    pub record_id: Uuid,
}

impl ReconcileOutcome {
    pub fn is_discrepancy(&self) -> bool {
        self.action == ReconcileAction::Discrepancy
    }
}

/// Ledger and cache side by side for one account. Read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceReport {
    pub account_id: AccountId,
    pub ledger_balance: u64,
    pub cached_balance: Option<u64>,
    pub last_synced: Option<DateTime<Utc>>,
    pub in_sync: bool,
}

/// Treasury state for the configured token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreasuryReport {
    pub token_id: TokenId,
    pub treasury_id: AccountId,
    pub ledger_balance: u64,
    pub cached_balance: Option<u64>,
    pub total_supply: u64,
}

/// What a pass should do given the cached and authoritative balances.
pub(crate) fn decide(cached: Option<u64>, ledger: u64) -> ReconcileAction {
    match cached {
        None => ReconcileAction::Synced,
        Some(cached) => match cached.cmp(&ledger) {
            Ordering::Equal => ReconcileAction::Noop,
            Ordering::Less => ReconcileAction::Synced,
            Ordering::Greater => ReconcileAction::Discrepancy,
        },
    }
}

/// Drives reconciliation for one token against a ledger and the local store.
pub struct Reconciler<L> {
    pub(super) ledger: Arc<L>,
    pub(super) store: Arc<LedgerStore>,
    pub(super) token: TokenId,
    pub(super) treasury: AccountId,
    pub(super) retry: RetryPolicy,
    pub(super) receipts: ReceiptPolling,
    pub(super) locks: AccountLocks,
    max_concurrent: usize,
}

impl<L> Clone for Reconciler<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            store: Arc::clone(&self.store),
            token: self.token,
            treasury: self.treasury,
            retry: self.retry,
            receipts: self.receipts,
            locks: self.locks.clone(),
            max_concurrent: self.max_concurrent,
        }
    }
}

impl<L: LedgerClient> Reconciler<L> {
    pub fn new(
        ledger: Arc<L>,
        store: Arc<LedgerStore>,
        token: TokenId,
        treasury: AccountId,
    ) -> Self {
        Self {
            ledger,
            store,
            token,
            treasury,
            retry: RetryPolicy::default(),
            receipts: ReceiptPolling::default(),
            locks: AccountLocks::new(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_receipt_polling(mut self, receipts: ReceiptPolling) -> Self {
        self.receipts = receipts;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn token(&self) -> TokenId {
        self.token
    }

    pub fn treasury(&self) -> AccountId {
        self.treasury
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Reconcile one account. Passes for the same account run one at a time.
    pub async fn reconcile(&self, account: &AccountId) -> Result<ReconcileOutcome, ReconcileError> {
        let _guard = self.locks.acquire(account).await;

        let ledger_balance = match self.fetch_balance(account).await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!(account = %account, error = %e, "Ledger balance query failed");
                self.record_failure(account, None, &e);
                return Err(e.into());
            }
        };

        let cached = match self.store.get_account(account) {
            Ok(cached) => cached,
            Err(e) => {
                self.record_failure(account, None, &e);
                return Err(e.into());
            }
        };
        let cached_before = cached.as_ref().map(|row| row.fit_balance);
        let action = decide(cached_before, ledger_balance);

        let update = match action {
            ReconcileAction::Discrepancy => None,
            _ => Some(BalanceWrite {
                account_id: *account,
                balance: ledger_balance,
                expected: RowVersion::of(cached.as_ref()),
            }),
        };
        let record =
            ReconciliationRecord::new(*account, cached_before, Some(ledger_balance), action);

        if let Err(e) = self.store.commit_pass(update.as_ref(), &record) {
            tracing::error!(account = %account, error = %e, "Failed to commit reconciliation");
            self.record_failure(account, None, &e);
            return Err(e.into());
        }

        let cached_after = match action {
            ReconcileAction::Discrepancy => cached_before,
            _ => Some(ledger_balance),
        };

        match action {
            ReconcileAction::Noop => {
                tracing::debug!(account = %account, balance = ledger_balance, "Cache already in sync")
            }
            ReconcileAction::Synced => tracing::info!(
                account = %account,
                cached_before = ?cached_before,
                ledger_balance,
                "Cached balance synced"
            ),
            _ => tracing::warn!(
                account = %account,
                cached_before = ?cached_before,
                ledger_balance,
                "Cached balance exceeds ledger balance, left for review"
            ),
        }

        Ok(ReconcileOutcome {
            account_id: *account,
            action,
            state: record.state,
            cached_before,
            ledger_balance,
            cached_after,
            record_id: record.record_id,
        })
    }

    /// Ledger and cached balances for `account`, without writing anything.
    pub async fn balance(&self, account: &AccountId) -> Result<BalanceReport, ReconcileError> {
        let ledger_balance = self.fetch_balance(account).await?;
        let cached = self.store.get_account(account)?;
        Ok(BalanceReport {
            account_id: *account,
            ledger_balance,
            cached_balance: cached.as_ref().map(|row| row.fit_balance),
            last_synced: cached.as_ref().map(|row| row.updated_at),
            in_sync: cached.is_some_and(|row| row.fit_balance == ledger_balance),
        })
    }

    /// Treasury balance on the ledger and in the cache, plus total supply.
    pub async fn treasury_report(&self) -> Result<TreasuryReport, ReconcileError> {
        let ledger_balance = self.fetch_balance(&self.treasury).await?;
        let total_supply = self
            .retry
            .run("total_supply", || self.ledger.total_supply(&self.token))
            .await?;
        let cached = self.store.get_account(&self.treasury)?;
        Ok(TreasuryReport {
            token_id: self.token,
            treasury_id: self.treasury,
            ledger_balance,
            cached_balance: cached.map(|row| row.fit_balance),
            total_supply,
        })
    }

    pub(super) async fn fetch_balance(&self, account: &AccountId) -> LedgerResult<u64> {
        self.retry
            .run("get_balance", || self.ledger.get_balance(account, &self.token))
            .await
    }

    /// Append a `failed` record. Best effort: a storage failure here is only logged.
    pub(super) fn record_failure(
        &self,
        account: &AccountId,
        tx_id: Option<&TransactionId>,
        error: &dyn fmt::Display,
    ) {
        let expected = self
            .store
            .get_account(account)
            .ok()
            .flatten()
            .map(|row| row.fit_balance);
        let mut record =
            ReconciliationRecord::new(*account, expected, None, ReconcileAction::Failed)
                .with_error(error.to_string());
        if let Some(tx_id) = tx_id {
            record = record.with_tx(tx_id.clone());
        }
        if let Err(e) = self.store.append_record(&record) {
            tracing::warn!(account = %account, error = %e, "Could not record failed attempt");
        }
    }
}

impl<L: LedgerClient + 'static> Reconciler<L> {
    /// Reconcile several accounts concurrently. Results come back in input order.
    pub async fn reconcile_many(
        &self,
        accounts: &[AccountId],
    ) -> Vec<(AccountId, Result<ReconcileOutcome, ReconcileError>)> {
        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(accounts.len());

        for account in accounts {
            let account = *account;
            let reconciler = self.clone();
            let permits = Arc::clone(&permits);
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await;
                reconciler.reconcile(&account).await
            });
            handles.push((account, handle));
        }

        collect_in_order(handles).await
    }

    /// Reconcile every account the store knows about.
    pub async fn reconcile_all(
        &self,
    ) -> Result<Vec<(AccountId, Result<ReconcileOutcome, ReconcileError>)>, ReconcileError> {
        let accounts: Vec<AccountId> = self
            .store
            .list_accounts()?
            .into_iter()
            .map(|row| row.account_id)
            .collect();
        tracing::info!(accounts = accounts.len(), "Reconciling all known accounts");
        Ok(self.reconcile_many(&accounts).await)
    }
}

type PassResult = Result<ReconcileOutcome, ReconcileError>;

/// Await every task; one that never finished reports as cancelled.
async fn collect_in_order(
    handles: Vec<(AccountId, JoinHandle<PassResult>)>,
) -> Vec<(AccountId, PassResult)> {
    let mut results = Vec::with_capacity(handles.len());
    for (account, handle) in handles {
        match handle.await {
            Ok(result) => results.push((account, result)),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                tracing::error!(account = %account, error = %e, "Reconciliation task aborted");
                results.push((
                    account,
                    Err(ReconcileError::Cancelled {
                        stage: CancelStage::BeforeSubmission,
                        tx_id: None,
                    }),
                ));
            }
        }
    }
    results
}
