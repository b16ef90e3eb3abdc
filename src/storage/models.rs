// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persisted records: account rows, reconciliation records and mint intents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::ledger::{AccountId, TokenId, TransactionId};

/// A row of the `users` table.
///
/// The cached balance is a point-in-time snapshot; the ledger is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Ledger account (row key)
    #[serde(rename = "hederaAccountId")]
    pub account_id: AccountId,
    /// Application user id, unique when present
    #[serde(rename = "id", default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Cached FIT balance in the token's smallest unit
    #[serde(default)]
    pub fit_balance: u64,
    #[serde(default)]
    pub total_steps: u64,
    /// Last time the row was synchronized with the ledger
    pub updated_at: DateTime<Utc>,
    /// Incremented on every write; used for optimistic checks
    #[serde(default)]
    pub version: u64,
    /// Columns added by later migrations
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Account {
    /// A row for an account observed on the ledger for the first time.
    pub fn observed(account_id: AccountId, fit_balance: u64) -> Self {
        Self {
            account_id,
            user_id: None,
            email: None,
            fit_balance,
            total_steps: 0,
            updated_at: Utc::now(),
            version: 0,
            extra: Map::new(),
        }
    }
}

/// What a reconciliation pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    /// Cache already matched the ledger
    Noop,
    /// Cache moved up (or was created) to match the ledger
    Synced,
    /// Cache exceeds the ledger; left untouched for review
    Discrepancy,
    /// Treasury cache advanced after a confirmed mint
    Minted,
    /// The pass failed without touching the cache
    Failed,
}

/// Terminal state of a reconciliation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Pending,
    Confirmed,
    Failed,
    Discrepancy,
}

/// Immutable audit entry written for every reconciliation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationRecord {
    pub record_id: Uuid,
    pub account_id: AccountId,
    /// Cached balance before the attempt (None if there was no row)
    pub expected_balance: Option<u64>,
    /// Authoritative balance the attempt acted on
    pub observed_balance: Option<u64>,
    pub action: ReconcileAction,
    pub state: AttemptState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<TransactionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ReconciliationRecord {
    pub fn new(
        account_id: AccountId,
        expected_balance: Option<u64>,
        observed_balance: Option<u64>,
        action: ReconcileAction,
    ) -> Self {
        let state = match action {
            ReconcileAction::Noop | ReconcileAction::Synced | ReconcileAction::Minted => {
                AttemptState::Confirmed
            }
            ReconcileAction::Discrepancy => AttemptState::Discrepancy,
            ReconcileAction::Failed => AttemptState::Failed,
        };
        Self {
            record_id: Uuid::new_v4(),
            account_id,
            expected_balance,
            observed_balance,
            action,
            state,
            tx_id: None,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_tx(mut self, tx_id: TransactionId) -> Self {
        self.tx_id = Some(tx_id);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Progress of a mint request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    /// Recorded, submission not known to have reached the ledger
    Pending,
    /// Broadcast; waiting for the receipt
    Submitted,
    /// Receipt received and cache updated
    Confirmed,
    /// Definitely not applied; safe to retry
    Failed,
}

/// Mint request guarded by an idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintIntent {
    pub key: String,
    pub token_id: TokenId,
    pub amount: u64,
    pub status: IntentStatus,
    /// Treasury cache before the mint
    pub previous_balance: u64,
    /// Treasury row version the confirmation expects (None if no row yet)
    pub base_version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<TransactionId>,
    /// Treasury cache after confirmation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MintIntent {
    pub fn new(
        key: String,
        token_id: TokenId,
        amount: u64,
        previous_balance: u64,
        base_version: Option<u64>,
    ) -> Self {
        let now = Utc::now();
        Self {
            key,
            token_id,
            amount,
            status: IntentStatus::Pending,
            previous_balance,
            base_version,
            tx_id: None,
            balance_after: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_submitted(&mut self, tx_id: TransactionId) {
        self.status = IntentStatus::Submitted;
        self.tx_id = Some(tx_id);
        self.error = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_confirmed(&mut self, balance_after: Option<u64>) {
        self.status = IntentStatus::Confirmed;
        self.balance_after = balance_after;
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = IntentStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_uses_users_column_names() {
        let mut account = Account::observed(AccountId::new(0, 0, 7_307_810), 20);
        account.user_id = Some("user-1".to_string());
        let json = serde_json::to_value(&account).unwrap();

        assert_eq!(json["hederaAccountId"], "0.0.7307810");
        assert_eq!(json["id"], "user-1");
        assert_eq!(json["fitBalance"], 20);
        assert_eq!(json["totalSteps"], 0);
        assert!(json.get("updatedAt").is_some());
    }

    #[test]
    fn unknown_columns_survive_a_round_trip() {
        let raw = serde_json::json!({
            "hederaAccountId": "0.0.5",
            "fitBalance": 3,
            "updatedAt": "2026-01-01T00:00:00Z",
            "streakDays": 4
        });
        let account: Account = serde_json::from_value(raw).unwrap();
        assert_eq!(account.fit_balance, 3);
        assert_eq!(account.user_id, None);
        assert_eq!(account.extra.get("streakDays"), Some(&Value::from(4)));

        let back = serde_json::to_value(&account).unwrap();
        assert_eq!(back["streakDays"], 4);
    }

    #[test]
    fn record_state_follows_action() {
        let id = AccountId::new(0, 0, 1);
        let rec = |action| ReconciliationRecord::new(id, Some(1), Some(1), action).state;
        assert_eq!(rec(ReconcileAction::Noop), AttemptState::Confirmed);
        assert_eq!(rec(ReconcileAction::Synced), AttemptState::Confirmed);
        assert_eq!(rec(ReconcileAction::Minted), AttemptState::Confirmed);
        assert_eq!(rec(ReconcileAction::Discrepancy), AttemptState::Discrepancy);
        assert_eq!(rec(ReconcileAction::Failed), AttemptState::Failed);
    }

    #[test]
    fn intent_transitions() {
        let mut intent = MintIntent::new("k".into(), TokenId::new(0, 0, 9), 5, 10, Some(2));
        assert_eq!(intent.status, IntentStatus::Pending);

        intent.mark_submitted(TransactionId::new("0x01"));
        assert_eq!(intent.status, IntentStatus::Submitted);
        assert_eq!(intent.tx_id, Some(TransactionId::new("0x01")));

        intent.mark_confirmed(Some(15));
        assert_eq!(intent.status, IntentStatus::Confirmed);
        assert_eq!(intent.balance_after, Some(15));
    }
}
