// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Local Ledger Store
//!
//! This module provides the durable cache of FIT balances and the
//! reconciliation audit log, kept in a single **redb** database file.
//!
//! ## Storage Layout
//!
//! ```text
//! data/fitchain.redb
//!   users                    # account rows (JSON, column catalog below)
//!   users_id_index           # unique application user ids
//!   reconciliation_records   # append-only audit log
//!   mint_intents             # idempotency keys for mints
//!   schema_columns           # column catalog
//!   schema_migrations        # applied migrations
//! ```
//!
//! ## Important Notes
//!
//! - The cached balance is a snapshot; the ledger is authoritative
//! - Every write is a single redb write transaction (no partial updates)
//! - Schema changes are additive only and safe to re-apply

pub mod database;
pub mod models;
pub mod schema;

pub use database::{BalanceWrite, LedgerStore, RowVersion, StoreError, StoreResult};
pub use models::{
    Account, AttemptState, IntentStatus, MintIntent, ReconcileAction, ReconciliationRecord,
};
pub use schema::{builtin_migrations, ColumnDef, ColumnType, Migration, SchemaChange, USERS_TABLE};
