// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Treasury mints guarded by idempotency keys.
//!
//! ## Flow
//!
//! 1. Record a `pending` [`MintIntent`] with the treasury cache it builds on
//! 2. Submit the mint (never retried)
//! 3. Mark the intent `submitted` with the transaction id
//! 4. Poll for the receipt
//! 5. Advance the treasury cache by the minted amount, append a `minted`
//!    record and confirm the intent, all in one write transaction
//!
//! A transport failure during step 2 leaves the intent `pending`: the mint
//! may or may not have reached the ledger, so the key is refused until an
//! operator checks the treasury.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::engine::Reconciler;
use super::{CancelStage, ReconcileError};
use crate::ledger::{
    validate_mint_amount, LedgerClient, LedgerError, MintReceipt, TokenId, TransactionId,
};
use crate::storage::{
    BalanceWrite, IntentStatus, MintIntent, ReconcileAction, ReconciliationRecord, RowVersion,
    StoreError,
};

/// Result of a mint request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MintOutcome {
    pub idempotency_key: String,
    pub token_id: TokenId,
    pub amount: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<TransactionId>,
    pub previous_balance: u64,
    /// Treasury cache after the mint; None if the row changed underneath
    pub balance_after: Option<u64>,
    /// The key was already confirmed; nothing was submitted this time
    pub replayed: bool,
}

impl MintOutcome {
    fn from_intent(intent: &MintIntent, replayed: bool) -> Self {
        Self {
            idempotency_key: intent.key.clone(),
            token_id: intent.token_id,
            amount: intent.amount,
            tx_id: intent.tx_id.clone(),
            previous_balance: intent.previous_balance,
            balance_after: intent.balance_after,
            replayed,
        }
    }
}

impl<L: LedgerClient> Reconciler<L> {
    /// Mint `amount` units to the treasury.
    ///
    /// Without an idempotency key a fresh one is generated, so the call is
    /// only safe to repeat when a key is supplied.
    pub async fn mint(
        &self,
        amount: u64,
        idempotency_key: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<MintOutcome, ReconcileError> {
        validate_mint_amount(amount)?;
        let key = idempotency_key.unwrap_or_else(|| Uuid::new_v4().to_string());

        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled_before()),
            guard = self.locks.acquire(&self.treasury) => guard,
        };

        let intent = match self.store.get_mint_intent(&key)? {
            Some(existing) => {
                if existing.amount != amount || existing.token_id != self.token {
                    return Err(LedgerError::Validation(format!(
                        "idempotency key {key} was used for a mint of {} units of {}",
                        existing.amount, existing.token_id
                    ))
                    .into());
                }
                match existing.status {
                    IntentStatus::Confirmed => {
                        tracing::info!(key = %key, tx_id = ?existing.tx_id, "Mint already confirmed, replaying result");
                        return Ok(MintOutcome::from_intent(&existing, true));
                    }
                    IntentStatus::Submitted => {
                        tracing::info!(key = %key, tx_id = ?existing.tx_id, "Resuming submitted mint");
                        return self.finish(existing, cancel).await;
                    }
                    IntentStatus::Pending => return Err(ReconcileError::MintInDoubt { key }),
                    IntentStatus::Failed => {
                        tracing::info!(key = %key, "Retrying previously failed mint");
                        self.prepare_intent(key, amount, cancel).await?
                    }
                }
            }
            None => self.prepare_intent(key, amount, cancel).await?,
        };

        let intent = self.submit(intent, cancel).await?;
        self.finish(intent, cancel).await
    }

    /// Build a pending intent against the current treasury cache.
    async fn prepare_intent(
        &self,
        key: String,
        amount: u64,
        cancel: &CancellationToken,
    ) -> Result<MintIntent, ReconcileError> {
        let (previous_balance, base_version) = match self.store.get_account(&self.treasury)? {
            Some(row) => (row.fit_balance, Some(row.version)),
            None => {
                let observed = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(cancelled_before()),
                    balance = self.fetch_balance(&self.treasury) => balance?,
                };
                (observed, None)
            }
        };
        Ok(MintIntent::new(
            key,
            self.token,
            amount,
            previous_balance,
            base_version,
        ))
    }

    async fn submit(
        &self,
        mut intent: MintIntent,
        cancel: &CancellationToken,
    ) -> Result<MintIntent, ReconcileError> {
        if cancel.is_cancelled() {
            return Err(cancelled_before());
        }
        self.store.put_mint_intent(&intent)?;

        match self.retry.once(self.ledger.mint(&self.token, intent.amount)).await {
            Ok(tx_id) => {
                tracing::info!(
                    key = %intent.key,
                    token = %self.token,
                    amount = intent.amount,
                    tx_id = %tx_id,
                    "Mint submitted"
                );
                intent.mark_submitted(tx_id);
                self.store.put_mint_intent(&intent)?;
                Ok(intent)
            }
            Err(e) if e.may_have_submitted() => {
                tracing::error!(
                    key = %intent.key,
                    amount = intent.amount,
                    error = %e,
                    "Mint submission outcome unknown, check the treasury before retrying"
                );
                intent.error = Some(e.to_string());
                self.store.put_mint_intent(&intent)?;
                Err(e.into())
            }
            Err(e) => {
                tracing::warn!(key = %intent.key, error = %e, "Mint not submitted");
                intent.mark_failed(e.to_string());
                self.store.put_mint_intent(&intent)?;
                self.record_failure(&self.treasury, None, &e);
                Err(e.into())
            }
        }
    }

    /// Wait for the receipt of a submitted intent and apply it to the cache.
    async fn finish(
        &self,
        mut intent: MintIntent,
        cancel: &CancellationToken,
    ) -> Result<MintOutcome, ReconcileError> {
        let Some(tx_id) = intent.tx_id.clone() else {
            return Err(ReconcileError::MintInDoubt { key: intent.key });
        };

        let receipt = self.wait_for_receipt(&tx_id, cancel).await?;
        if !receipt.success {
            let error = LedgerError::Rejected(format!("transaction {tx_id} failed at consensus"));
            tracing::warn!(key = %intent.key, tx_id = %tx_id, "Mint transaction failed");
            intent.mark_failed(error.to_string());
            self.store.put_mint_intent(&intent)?;
            self.record_failure(&self.treasury, Some(&tx_id), &error);
            return Err(error.into());
        }

        let balance_after = intent
            .previous_balance
            .checked_add(intent.amount)
            .ok_or_else(|| LedgerError::Validation("treasury balance overflow".to_string()))?;
        let update = BalanceWrite {
            account_id: self.treasury,
            balance: balance_after,
            expected: match intent.base_version {
                Some(version) => RowVersion::Exactly(version),
                None => RowVersion::Absent,
            },
        };
        let expected_balance = intent.base_version.map(|_| intent.previous_balance);
        let record = ReconciliationRecord::new(
            self.treasury,
            expected_balance,
            Some(balance_after),
            ReconcileAction::Minted,
        )
        .with_tx(tx_id.clone());
        intent.mark_confirmed(Some(balance_after));

        match self.store.confirm_mint(&intent, &update, &record) {
            Ok(_) => {
                tracing::info!(
                    key = %intent.key,
                    tx_id = %tx_id,
                    previous_balance = intent.previous_balance,
                    balance_after,
                    "Mint confirmed, treasury cache advanced"
                );
                Ok(MintOutcome::from_intent(&intent, false))
            }
            Err(StoreError::VersionConflict { .. }) => {
                tracing::warn!(
                    key = %intent.key,
                    tx_id = %tx_id,
                    "Treasury row changed while minting, cache left as is; reconcile the treasury"
                );
                intent.mark_confirmed(None);
                self.store.put_mint_intent(&intent)?;
                self.record_failure(
                    &self.treasury,
                    Some(&tx_id),
                    &"mint confirmed but the treasury row changed concurrently",
                );
                Ok(MintOutcome::from_intent(&intent, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn wait_for_receipt(
        &self,
        tx_id: &TransactionId,
        cancel: &CancellationToken,
    ) -> Result<MintReceipt, ReconcileError> {
        let max_polls = self.receipts.max_polls.max(1);
        for poll in 1..=max_polls {
            let receipt = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled_after(tx_id)),
                receipt = self.retry.run("get_receipt", || self.ledger.get_receipt(tx_id)) => receipt?,
            };
            if let Some(receipt) = receipt {
                return Ok(receipt);
            }
            if poll == max_polls {
                break;
            }
            tracing::debug!(tx_id = %tx_id, poll, "Receipt not available yet");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled_after(tx_id)),
                _ = tokio::time::sleep(self.receipts.interval) => {},
            }
        }
        Err(LedgerError::Network(format!("no receipt for {tx_id} after {max_polls} polls")).into())
    }
}

fn cancelled_before() -> ReconcileError {
    ReconcileError::Cancelled {
        stage: CancelStage::BeforeSubmission,
        tx_id: None,
    }
}

fn cancelled_after(tx_id: &TransactionId) -> ReconcileError {
    ReconcileError::Cancelled {
        stage: CancelStage::AfterSubmission,
        tx_id: Some(tx_id.clone()),
    }
}
