// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger client adapter for the Hedera network.
//!
//! This module provides:
//! - The [`LedgerClient`] capability (balance, mint, receipt, supply)
//! - A Hedera backend (mirror node + JSON-RPC relay)
//! - An in-memory backend for deterministic runs
//! - Retry and timeout handling for transient failures

pub mod client;
pub mod hedera;
pub mod hts;
pub mod mock;
pub mod retry;
pub mod signing;
pub mod types;

pub use client::{validate_mint_amount, LedgerClient, LedgerError, LedgerResult, MAX_MINT_AMOUNT};
pub use hedera::HederaClient;
pub use mock::MockLedger;
pub use retry::RetryPolicy;
pub use signing::parse_operator_key;
pub use types::*;
