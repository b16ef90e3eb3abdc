// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! FitChain Ledger Sync - FIT token balance reconciliation
//!
//! This crate keeps an application's cached FIT balances consistent with
//! the authoritative balances on the Hedera ledger.
//!
//! ## Modules
//!
//! - `ledger` - Ledger client (Hedera mirror node + JSON-RPC relay, mock)
//! - `storage` - Local ledger store (redb) with additive migrations
//! - `reconcile` - Reconciliation engine and idempotent treasury mints
//! - `commands` - Operator command surface
//! - `config` - Environment configuration
//! - `error` - Operator-facing errors and exit codes

pub mod commands;
pub mod config;
pub mod error;
pub mod ledger;
pub mod reconcile;
pub mod storage;
