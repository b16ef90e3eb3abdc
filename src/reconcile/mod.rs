// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Reconciliation Engine
//!
//! Compares authoritative ledger balances with the local cache and applies
//! the corrective action.
//!
//! ## Rules
//!
//! | Cached vs ledger | Action | Cache |
//! |------------------|--------|-------|
//! | equal | `noop` | timestamp refreshed |
//! | lower, or no row | `synced` | set to ledger value |
//! | higher | `discrepancy` | untouched, surfaced for review |
//!
//! Mints go through [`Reconciler::mint`]: the intent is recorded before
//! submission and the treasury cache only moves once the receipt confirms.

use std::fmt;

use serde::Serialize;

use crate::ledger::{LedgerError, TransactionId};
use crate::storage::StoreError;

pub mod engine;
pub mod locks;
pub mod mint;

pub use engine::{BalanceReport, ReceiptPolling, ReconcileOutcome, Reconciler, TreasuryReport};
pub use locks::AccountLocks;
pub use mint::MintOutcome;

/// Where an operation was when it was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelStage {
    /// Nothing reached the ledger
    BeforeSubmission,
    /// The transaction was broadcast; only local bookkeeping stopped
    AfterSubmission,
}

impl fmt::Display for CancelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelStage::BeforeSubmission => write!(f, "before submission"),
            CancelStage::AfterSubmission => write!(f, "after submission"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("cancelled {stage}{}", .tx_id.as_ref().map(|tx| format!(" (transaction {tx})")).unwrap_or_default())]
    Cancelled {
        stage: CancelStage,
        tx_id: Option<TransactionId>,
    },

    #[error("mint {key} is in doubt: an earlier submission may have reached the ledger")]
    MintInDoubt { key: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_message_names_the_transaction() {
        let before = ReconcileError::Cancelled {
            stage: CancelStage::BeforeSubmission,
            tx_id: None,
        };
        assert_eq!(before.to_string(), "cancelled before submission");

        let after = ReconcileError::Cancelled {
            stage: CancelStage::AfterSubmission,
            tx_id: Some(TransactionId::new("0xab")),
        };
        assert_eq!(
            after.to_string(),
            "cancelled after submission (transaction 0xab)"
        );
    }

    #[test]
    fn ledger_errors_pass_through_unchanged() {
        let err: ReconcileError = LedgerError::NotFound("account 0.0.9".into()).into();
        assert_eq!(err.to_string(), "Not found: account 0.0.9");
        assert!(matches!(err, ReconcileError::Ledger(LedgerError::NotFound(_))));
    }
}
