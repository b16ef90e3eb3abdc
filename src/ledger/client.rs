// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger client capability shared by every backend.

use std::future::Future;
use std::time::Duration;

use super::types::{AccountId, MintReceipt, TokenId, TransactionId};

/// Largest amount the ledger accepts in a single mint (HTS amounts are `int64`).
pub const MAX_MINT_AMOUNT: u64 = i64::MAX as u64;

/// Query and mutate token state on the ledger.
///
/// Implementations map transport problems to [`LedgerError::Network`] (or
/// [`LedgerError::Timeout`]) so callers can tell transient failures apart
/// from permanent ones. A mint that fails before anything is broadcast
/// reports [`LedgerError::Unavailable`]. Retries are the caller's business; see
/// [`RetryPolicy`](super::RetryPolicy).
pub trait LedgerClient: Send + Sync {
    /// Authoritative token balance of `account`, in the token's smallest unit.
    fn get_balance(
        &self,
        account: &AccountId,
        token: &TokenId,
    ) -> impl Future<Output = LedgerResult<u64>> + Send;

    /// Submit a mint of `amount` units to the token's treasury.
    ///
    /// Returns once the transaction is broadcast. Every successful call
    /// increases total supply irreversibly, so this is never idempotent.
    fn mint(
        &self,
        token: &TokenId,
        amount: u64,
    ) -> impl Future<Output = LedgerResult<TransactionId>> + Send;

    /// Receipt for a submitted transaction, `None` while the ledger has not
    /// reached consensus on it.
    fn get_receipt(
        &self,
        tx_id: &TransactionId,
    ) -> impl Future<Output = LedgerResult<Option<MintReceipt>>> + Send;

    /// Current total supply of `token`.
    fn total_supply(&self, token: &TokenId) -> impl Future<Output = LedgerResult<u64>> + Send;
}

/// Reject amounts the ledger would refuse before anything is submitted.
pub fn validate_mint_amount(amount: u64) -> LedgerResult<i64> {
    if amount == 0 {
        return Err(LedgerError::Validation(
            "mint amount must be positive".to_string(),
        ));
    }
    i64::try_from(amount).map_err(|_| {
        LedgerError::Validation(format!(
            "mint amount {amount} exceeds the ledger maximum of {MAX_MINT_AMOUNT}"
        ))
    })
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Ledger call timed out after {0:?}")]
    Timeout(Duration),

    /// The ledger could not be reached and nothing was submitted.
    #[error("Ledger unavailable, nothing submitted: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Invalid operator credentials: {0}")]
    InvalidCredentials(String),

    #[error("Transaction rejected by the ledger: {0}")]
    Rejected(String),
}

impl LedgerError {
    /// Whether the failure may clear up on its own and is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LedgerError::Network(_) | LedgerError::Timeout(_) | LedgerError::Unavailable(_)
        )
    }

    /// Whether a failed submission may still have reached the ledger.
    pub fn may_have_submitted(&self) -> bool {
        matches!(self, LedgerError::Network(_) | LedgerError::Timeout(_))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_failures_are_transient() {
        assert!(LedgerError::Network("reset".into()).is_transient());
        assert!(LedgerError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!LedgerError::Authorization("no supply key".into()).is_transient());
        assert!(!LedgerError::Validation("zero".into()).is_transient());
        assert!(!LedgerError::NotFound("0.0.1".into()).is_transient());
        assert!(!LedgerError::Rejected("reverted".into()).is_transient());
        assert!(LedgerError::Unavailable("relay 503".into()).is_transient());
    }

    #[test]
    fn only_in_flight_failures_leave_a_submission_in_doubt() {
        assert!(LedgerError::Network("reset".into()).may_have_submitted());
        assert!(LedgerError::Timeout(Duration::from_secs(1)).may_have_submitted());
        assert!(!LedgerError::Unavailable("relay 503".into()).may_have_submitted());
        assert!(!LedgerError::Rejected("reverted".into()).may_have_submitted());
    }

    #[test]
    fn mint_amount_bounds() {
        assert!(matches!(
            validate_mint_amount(0),
            Err(LedgerError::Validation(_))
        ));
        assert_eq!(validate_mint_amount(1).unwrap(), 1);
        assert_eq!(validate_mint_amount(MAX_MINT_AMOUNT).unwrap(), i64::MAX);
        assert!(validate_mint_amount(MAX_MINT_AMOUNT + 1).is_err());
    }
}
