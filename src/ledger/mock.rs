// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory ledger backend.
//!
//! Behaves like a single-token network with a treasury account: minting
//! credits the treasury and raises supply at submission, and receipts can
//! be held back for a number of polls. Failures are scripted per operation.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::client::{validate_mint_amount, LedgerClient, LedgerError, LedgerResult};
use super::types::{AccountId, MintReceipt, TokenId, TransactionId};

#[derive(Debug)]
struct MockTx {
    success: bool,
    polls_until_final: u32,
}

#[derive(Debug, Default)]
struct MockState {
    balances: HashMap<AccountId, u64>,
    total_supply: u64,
    mint_authority: bool,
    receipt_delay: u32,
    transactions: HashMap<TransactionId, MockTx>,
    balance_failures: VecDeque<LedgerError>,
    mint_failures: VecDeque<LedgerError>,
    balance_calls: u32,
    mint_calls: u32,
    receipt_calls: u32,
}

/// Deterministic in-memory ledger.
#[derive(Debug)]
pub struct MockLedger {
    token: TokenId,
    treasury: AccountId,
    latency: Duration,
    state: Mutex<MockState>,
}

impl MockLedger {
    /// A ledger where `treasury` holds mint authority over `token`.
    pub fn new(token: TokenId, treasury: AccountId) -> Self {
        let mut state = MockState {
            mint_authority: true,
            ..MockState::default()
        };
        state.balances.insert(treasury, 0);
        Self {
            token,
            treasury,
            latency: Duration::ZERO,
            state: Mutex::new(state),
        }
    }

    /// Delay every call by `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// Set the on-ledger balance of `account`, creating it if needed.
    pub fn set_balance(&self, account: AccountId, balance: u64) {
        self.state().balances.insert(account, balance);
    }

    pub fn balance_of(&self, account: &AccountId) -> Option<u64> {
        self.state().balances.get(account).copied()
    }

    pub fn supply(&self) -> u64 {
        self.state().total_supply
    }

    pub fn set_supply(&self, supply: u64) {
        self.state().total_supply = supply;
    }

    /// Make the signer lose (or regain) mint authority.
    pub fn set_mint_authority(&self, granted: bool) {
        self.state().mint_authority = granted;
    }

    /// Number of `get_receipt` polls that answer `None` before a receipt appears.
    pub fn set_receipt_delay(&self, polls: u32) {
        self.state().receipt_delay = polls;
    }

    /// Fail the next balance query with `error`. Queued errors are used in order.
    pub fn push_balance_failure(&self, error: LedgerError) {
        self.state().balance_failures.push_back(error);
    }

    /// Fail the next `n` balance queries with a transient network error.
    pub fn fail_next_balance_queries(&self, n: u32) {
        for i in 0..n {
            self.push_balance_failure(LedgerError::Network(format!("simulated outage {}", i + 1)));
        }
    }

    /// Fail the next mint submission with `error`.
    pub fn push_mint_failure(&self, error: LedgerError) {
        self.state().mint_failures.push_back(error);
    }

    /// Mark a submitted transaction as failed at consensus.
    pub fn fail_transaction(&self, tx_id: &TransactionId) {
        if let Some(tx) = self.state().transactions.get_mut(tx_id) {
            tx.success = false;
        }
    }

    pub fn balance_calls(&self) -> u32 {
        self.state().balance_calls
    }

    pub fn mint_calls(&self) -> u32 {
        self.state().mint_calls
    }

    pub fn receipt_calls(&self) -> u32 {
        self.state().receipt_calls
    }
}

impl LedgerClient for MockLedger {
    async fn get_balance(&self, account: &AccountId, token: &TokenId) -> LedgerResult<u64> {
        self.pause().await;
        let mut state = self.state();
        state.balance_calls += 1;
        if let Some(error) = state.balance_failures.pop_front() {
            return Err(error);
        }
        if *token != self.token {
            return Ok(0);
        }
        state
            .balances
            .get(account)
            .copied()
            .ok_or_else(|| LedgerError::NotFound(format!("account {account}")))
    }

    async fn mint(&self, token: &TokenId, amount: u64) -> LedgerResult<TransactionId> {
        self.pause().await;
        let mut state = self.state();
        state.mint_calls += 1;
        validate_mint_amount(amount)?;
        if let Some(error) = state.mint_failures.pop_front() {
            return Err(error);
        }
        if *token != self.token {
            return Err(LedgerError::NotFound(format!("token {token}")));
        }
        if !state.mint_authority {
            return Err(LedgerError::Authorization(
                "operator does not hold the supply key".to_string(),
            ));
        }

        let treasury_balance = state.balances.entry(self.treasury).or_insert(0);
        *treasury_balance = treasury_balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Validation("treasury balance overflow".to_string()))?;
        state.total_supply = state.total_supply.saturating_add(amount);

        let tx_id = TransactionId::new(format!("0x{:064x}", state.mint_calls));
        let polls_until_final = state.receipt_delay;
        state.transactions.insert(
            tx_id.clone(),
            MockTx {
                success: true,
                polls_until_final,
            },
        );
        Ok(tx_id)
    }

    async fn get_receipt(&self, tx_id: &TransactionId) -> LedgerResult<Option<MintReceipt>> {
        self.pause().await;
        let mut state = self.state();
        state.receipt_calls += 1;
        let Some(tx) = state.transactions.get_mut(tx_id) else {
            return Ok(None);
        };
        if tx.polls_until_final > 0 {
            tx.polls_until_final -= 1;
            return Ok(None);
        }
        Ok(Some(MintReceipt {
            tx_id: tx_id.clone(),
            success: tx.success,
            block_number: Some(1),
        }))
    }

    async fn total_supply(&self, token: &TokenId) -> LedgerResult<u64> {
        self.pause().await;
        if *token != self.token {
            return Err(LedgerError::NotFound(format!("token {token}")));
        }
        Ok(self.state().total_supply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: TokenId = TokenId::new(0, 0, 5_001);
    const TREASURY: AccountId = AccountId::new(0, 0, 1_001);

    #[tokio::test]
    async fn unknown_accounts_are_not_found() {
        let ledger = MockLedger::new(TOKEN, TREASURY);
        let err = ledger
            .get_balance(&AccountId::new(0, 0, 9), &TOKEN)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn mint_credits_treasury_and_supply() {
        let ledger = MockLedger::new(TOKEN, TREASURY);
        ledger.set_supply(100);
        let tx = ledger.mint(&TOKEN, 40).await.unwrap();

        assert_eq!(ledger.balance_of(&TREASURY), Some(40));
        assert_eq!(ledger.total_supply(&TOKEN).await.unwrap(), 140);
        let receipt = ledger.get_receipt(&tx).await.unwrap().unwrap();
        assert!(receipt.success);
    }

    #[tokio::test]
    async fn receipts_can_be_delayed() {
        let ledger = MockLedger::new(TOKEN, TREASURY);
        ledger.set_receipt_delay(2);
        let tx = ledger.mint(&TOKEN, 1).await.unwrap();

        assert!(ledger.get_receipt(&tx).await.unwrap().is_none());
        assert!(ledger.get_receipt(&tx).await.unwrap().is_none());
        assert!(ledger.get_receipt(&tx).await.unwrap().is_some());
        assert_eq!(ledger.receipt_calls(), 3);
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed_in_order() {
        let ledger = MockLedger::new(TOKEN, TREASURY);
        ledger.fail_next_balance_queries(2);

        assert!(ledger.get_balance(&TREASURY, &TOKEN).await.is_err());
        assert!(ledger.get_balance(&TREASURY, &TOKEN).await.is_err());
        assert_eq!(ledger.get_balance(&TREASURY, &TOKEN).await, Ok(0));
        assert_eq!(ledger.balance_calls(), 3);
    }

    #[tokio::test]
    async fn mint_without_authority_changes_nothing() {
        let ledger = MockLedger::new(TOKEN, TREASURY);
        ledger.set_mint_authority(false);

        let err = ledger.mint(&TOKEN, 10).await.unwrap_err();
        assert!(matches!(err, LedgerError::Authorization(_)));
        assert_eq!(ledger.supply(), 0);
        assert_eq!(ledger.balance_of(&TREASURY), Some(0));
    }
}
