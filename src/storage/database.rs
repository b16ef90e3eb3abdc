// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded ledger-of-record database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: account id → JSON row (see [`schema`](super::schema))
//! - `users_id_index`: application user id → account id
//! - `reconciliation_records`: composite key (account|seq_be) → JSON record
//! - `mint_intents`: idempotency key → JSON mint intent
//! - `schema_columns`: `table.column` → JSON column definition
//! - `schema_migrations`: migration id → applied-at timestamp
//! - `meta`: key → u64 counters

use std::path::Path;

use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde_json::{Map, Value};

use super::models::{Account, MintIntent, ReconciliationRecord};
use super::schema::{builtin_migrations, ColumnDef, Migration, SchemaChange, USERS_TABLE};
use crate::ledger::AccountId;

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: account id → serialized row (JSON object bytes).
const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Unique index: application user id → account id.
const USER_IDS: TableDefinition<&str, &str> = TableDefinition::new("users_id_index");

/// Append-only log. Key format: `account|seq_be` so one account's records are contiguous.
const RECORDS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("reconciliation_records");

/// Mint intents keyed by idempotency key.
const MINT_INTENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("mint_intents");

/// Column catalog: `table.column` → serialized ColumnDef.
const SCHEMA_COLUMNS: TableDefinition<&str, &[u8]> = TableDefinition::new("schema_columns");

/// Applied migrations: id → RFC 3339 timestamp.
const SCHEMA_MIGRATIONS: TableDefinition<&str, &str> = TableDefinition::new("schema_migrations");

/// Counters.
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const RECORD_SEQ_KEY: &str = "record_seq";

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("schema conflict: {0}")]
    Conflict(String),

    #[error("user {user_id} is already linked to account {owner}")]
    DuplicateUser { user_id: String, owner: String },

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("row {account} changed concurrently (expected {expected:?}, found version {found:?})")]
    VersionConflict {
        account: AccountId,
        expected: RowVersion,
        found: Option<u64>,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Write Descriptors
// =============================================================================

/// Row version a write expects to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowVersion {
    /// Overwrite whatever is there
    Any,
    /// The row must not exist yet
    Absent,
    /// The row must be at exactly this version
    Exactly(u64),
}

impl RowVersion {
    /// The version check matching a previously read row.
    pub fn of(account: Option<&Account>) -> Self {
        match account {
            Some(account) => RowVersion::Exactly(account.version),
            None => RowVersion::Absent,
        }
    }

    fn admits(&self, found: Option<u64>) -> bool {
        match self {
            RowVersion::Any => true,
            RowVersion::Absent => found.is_none(),
            RowVersion::Exactly(expected) => found == Some(*expected),
        }
    }
}

/// A cached balance update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceWrite {
    pub account_id: AccountId,
    pub balance: u64,
    pub expected: RowVersion,
}

// =============================================================================
// Key Helpers
// =============================================================================

/// Build a composite key for the records table: `account | seq_be`.
fn make_record_key(account: &AccountId, seq: u64) -> Vec<u8> {
    let mut key = make_record_prefix(account);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

fn make_record_prefix(account: &AccountId) -> Vec<u8> {
    let id = account.to_string();
    let mut prefix = Vec::with_capacity(id.len() + 1 + 8);
    prefix.extend_from_slice(id.as_bytes());
    prefix.push(b'|');
    prefix
}

/// Upper bound for a range scan over one account's records.
fn make_record_prefix_end(account: &AccountId) -> Vec<u8> {
    let mut end = make_record_prefix(account);
    end.extend_from_slice(&[0xFF; 9]);
    end
}

fn column_key(table: &str, column: &str) -> String {
    format!("{table}.{column}")
}

// =============================================================================
// LedgerStore
// =============================================================================

/// Durable cache of account balances plus the reconciliation audit log.
pub struct LedgerStore {
    db: Database,
}

impl LedgerStore {
    /// Open (or create) the database and apply the built-in migrations.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let store = Self::create(path)?;
        let applied = store.apply_migrations(&builtin_migrations())?;
        if !applied.is_empty() {
            tracing::info!(path = %path.display(), migrations = ?applied, "Applied schema migrations");
        }
        Ok(store)
    }

    /// Open (or create) the database without running migrations.
    pub fn create(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USER_IDS)?;
            let _ = write_txn.open_table(RECORDS)?;
            let _ = write_txn.open_table(MINT_INTENTS)?;
            let _ = write_txn.open_table(SCHEMA_COLUMNS)?;
            let _ = write_txn.open_table(SCHEMA_MIGRATIONS)?;
            let _ = write_txn.open_table(META)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Look up the cached row for an account.
    pub fn get_account(&self, account_id: &AccountId) -> StoreResult<Option<Account>> {
        let key = account_id.to_string();
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        match table.get(key.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// All cached rows, ordered by account id string.
    pub fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        let mut accounts = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            accounts.push(serde_json::from_slice(value.value())?);
        }
        Ok(accounts)
    }

    /// Overwrite the cached balance and sync timestamp, creating the row if needed.
    pub fn upsert_balance(&self, account_id: &AccountId, balance: u64) -> StoreResult<Account> {
        let write_txn = self.db.begin_write()?;
        let account = write_balance(
            &write_txn,
            &BalanceWrite {
                account_id: *account_id,
                balance,
                expected: RowVersion::Any,
            },
        )?;
        write_txn.commit()?;
        Ok(account)
    }

    /// Apply an optional balance update and append a record in one transaction.
    pub fn commit_pass(
        &self,
        update: Option<&BalanceWrite>,
        record: &ReconciliationRecord,
    ) -> StoreResult<Option<Account>> {
        let write_txn = self.db.begin_write()?;
        let account = match update {
            Some(update) => Some(write_balance(&write_txn, update)?),
            None => None,
        };
        insert_record(&write_txn, record)?;
        write_txn.commit()?;
        Ok(account)
    }

    /// Associate an application user with an account. User ids are unique.
    pub fn link_user(
        &self,
        account_id: &AccountId,
        user_id: &str,
        email: Option<&str>,
    ) -> StoreResult<Account> {
        let key = account_id.to_string();
        let write_txn = self.db.begin_write()?;
        {
            let index = write_txn.open_table(USER_IDS)?;
            let owner = index.get(user_id)?.map(|v| v.value().to_string());
            if let Some(owner) = owner {
                if owner != key {
                    return Err(StoreError::DuplicateUser {
                        user_id: user_id.to_string(),
                        owner,
                    });
                }
            }
        }

        let mut account = match read_account(&write_txn, account_id)? {
            Some(account) => account,
            None => Account::observed(*account_id, 0),
        };

        {
            let mut index = write_txn.open_table(USER_IDS)?;
            if let Some(previous) = account.user_id.as_deref() {
                if previous != user_id {
                    index.remove(previous)?;
                }
            }
            index.insert(user_id, key.as_str())?;
        }

        account.user_id = Some(user_id.to_string());
        if let Some(email) = email {
            account.email = Some(email.to_string());
        }
        account.version += 1;
        let stored = write_row(&write_txn, &account)?;
        write_txn.commit()?;
        Ok(stored)
    }

    // =========================================================================
    // Reconciliation records
    // =========================================================================

    /// Append a record on its own.
    pub fn append_record(&self, record: &ReconciliationRecord) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        insert_record(&write_txn, record)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Most recent records for an account, newest first.
    pub fn list_records(
        &self,
        account_id: &AccountId,
        limit: usize,
    ) -> StoreResult<Vec<ReconciliationRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RECORDS)?;

        let start = make_record_prefix(account_id);
        let end = make_record_prefix_end(account_id);

        let mut records = Vec::with_capacity(limit.min(64));
        for entry in table.range(start.as_slice()..end.as_slice())?.rev() {
            if records.len() >= limit {
                break;
            }
            let (_, value) = entry?;
            records.push(serde_json::from_slice(value.value())?);
        }
        Ok(records)
    }

    // =========================================================================
    // Mint intents
    // =========================================================================

    pub fn get_mint_intent(&self, key: &str) -> StoreResult<Option<MintIntent>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MINT_INTENTS)?;
        match table.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn put_mint_intent(&self, intent: &MintIntent) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        write_intent(&write_txn, intent)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Record a confirmed mint: treasury balance, audit record and intent together.
    pub fn confirm_mint(
        &self,
        intent: &MintIntent,
        update: &BalanceWrite,
        record: &ReconciliationRecord,
    ) -> StoreResult<Account> {
        let write_txn = self.db.begin_write()?;
        let account = write_balance(&write_txn, update)?;
        insert_record(&write_txn, record)?;
        write_intent(&write_txn, intent)?;
        write_txn.commit()?;
        Ok(account)
    }

    // =========================================================================
    // Schema
    // =========================================================================

    /// Add a column. Returns `false` if an identical column already exists.
    pub fn add_column(&self, table: &str, column: &ColumnDef) -> StoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let added = add_column_in(&write_txn, table, column)?;
        write_txn.commit()?;
        Ok(added)
    }

    /// Apply a migration. Returns `false` if it was applied before.
    pub fn migrate(&self, migration: &Migration) -> StoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let already_applied = {
            let applied = write_txn.open_table(SCHEMA_MIGRATIONS)?;
            let found = applied.get(migration.id)?.is_some();
            found
        };
        if already_applied {
            write_txn.abort()?;
            return Ok(false);
        }

        for change in &migration.changes {
            match change {
                SchemaChange::AddColumn { table, column } => {
                    add_column_in(&write_txn, table, column)?;
                }
            }
        }

        {
            let mut applied = write_txn.open_table(SCHEMA_MIGRATIONS)?;
            let applied_at = Utc::now().to_rfc3339();
            applied.insert(migration.id, applied_at.as_str())?;
        }
        write_txn.commit()?;
        tracing::debug!(migration = migration.id, "Migration applied");
        Ok(true)
    }

    /// Apply migrations in order, returning the ids that were new.
    pub fn apply_migrations(&self, migrations: &[Migration]) -> StoreResult<Vec<&'static str>> {
        let mut applied = Vec::new();
        for migration in migrations {
            if self.migrate(migration)? {
                applied.push(migration.id);
            }
        }
        Ok(applied)
    }

    /// Catalog entries for a table, ordered by column name.
    pub fn schema_columns(&self, table: &str) -> StoreResult<Vec<ColumnDef>> {
        let prefix = column_key(table, "");
        let read_txn = self.db.begin_read()?;
        let catalog = read_txn.open_table(SCHEMA_COLUMNS)?;
        let mut columns = Vec::new();
        for entry in catalog.iter()? {
            let (key, value) = entry?;
            if key.value().starts_with(&prefix) {
                columns.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(columns)
    }

    /// Applied migrations as `(id, applied_at)`, ordered by id.
    pub fn applied_migrations(&self) -> StoreResult<Vec<(String, String)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SCHEMA_MIGRATIONS)?;
        let mut applied = Vec::new();
        for entry in table.iter()? {
            let (id, at) = entry?;
            applied.push((id.value().to_string(), at.value().to_string()));
        }
        Ok(applied)
    }
}

// =============================================================================
// Write-transaction helpers
// =============================================================================

fn read_account(txn: &WriteTransaction, account_id: &AccountId) -> StoreResult<Option<Account>> {
    let key = account_id.to_string();
    let table = txn.open_table(USERS)?;
    let account = match table.get(key.as_str())? {
        Some(value) => Some(serde_json::from_slice(value.value())?),
        None => None,
    };
    Ok(account)
}

fn read_columns(txn: &WriteTransaction, table: &str) -> StoreResult<Vec<ColumnDef>> {
    let prefix = column_key(table, "");
    let catalog = txn.open_table(SCHEMA_COLUMNS)?;
    let mut columns = Vec::new();
    for entry in catalog.iter()? {
        let (key, value) = entry?;
        if key.value().starts_with(&prefix) {
            columns.push(serde_json::from_slice(value.value())?);
        }
    }
    Ok(columns)
}

/// Serialize a row, filling catalog defaults for columns it does not carry yet.
fn write_row(txn: &WriteTransaction, account: &Account) -> StoreResult<Account> {
    let mut row: Map<String, Value> = serde_json::from_value(serde_json::to_value(account)?)?;
    for column in read_columns(txn, USERS_TABLE)? {
        if !row.contains_key(&column.name) {
            if let Some(value) = column.backfill_value() {
                row.insert(column.name.clone(), value);
            }
        }
    }

    let bytes = serde_json::to_vec(&row)?;
    let stored: Account = serde_json::from_value(Value::Object(row))?;
    let key = account.account_id.to_string();
    let mut table = txn.open_table(USERS)?;
    table.insert(key.as_str(), bytes.as_slice())?;
    Ok(stored)
}

fn write_balance(txn: &WriteTransaction, update: &BalanceWrite) -> StoreResult<Account> {
    let existing = read_account(txn, &update.account_id)?;
    let found = existing.as_ref().map(|account| account.version);
    if !update.expected.admits(found) {
        return Err(StoreError::VersionConflict {
            account: update.account_id,
            expected: update.expected,
            found,
        });
    }

    let mut account = existing.unwrap_or_else(|| Account::observed(update.account_id, 0));
    account.fit_balance = update.balance;
    account.updated_at = Utc::now();
    account.version += 1;
    write_row(txn, &account)
}

fn insert_record(txn: &WriteTransaction, record: &ReconciliationRecord) -> StoreResult<()> {
    let seq = {
        let mut meta = txn.open_table(META)?;
        let next = meta.get(RECORD_SEQ_KEY)?.map(|v| v.value()).unwrap_or(0) + 1;
        meta.insert(RECORD_SEQ_KEY, next)?;
        next
    };

    let key = make_record_key(&record.account_id, seq);
    let json = serde_json::to_vec(record)?;
    let mut table = txn.open_table(RECORDS)?;
    if table.get(key.as_slice())?.is_some() {
        return Err(StoreError::Conflict(format!(
            "reconciliation record {} already written",
            record.record_id
        )));
    }
    table.insert(key.as_slice(), json.as_slice())?;
    Ok(())
}

fn write_intent(txn: &WriteTransaction, intent: &MintIntent) -> StoreResult<()> {
    let json = serde_json::to_vec(intent)?;
    let mut table = txn.open_table(MINT_INTENTS)?;
    table.insert(intent.key.as_str(), json.as_slice())?;
    Ok(())
}

fn add_column_in(txn: &WriteTransaction, table: &str, column: &ColumnDef) -> StoreResult<bool> {
    if table != USERS_TABLE {
        return Err(StoreError::UnknownTable(table.to_string()));
    }

    let key = column_key(table, &column.name);
    let existing: Option<ColumnDef> = {
        let catalog = txn.open_table(SCHEMA_COLUMNS)?;
        let found = match catalog.get(key.as_str())? {
            Some(value) => Some(serde_json::from_slice(value.value())?),
            None => None,
        };
        found
    };
    if let Some(existing) = existing {
        if existing == *column {
            return Ok(false);
        }
        return Err(StoreError::Conflict(format!(
            "column {key} already exists with a different definition"
        )));
    }

    let backfill = column.backfill_value();
    {
        let mut users = txn.open_table(USERS)?;
        let mut rows: Vec<(String, Map<String, Value>)> = Vec::new();
        for entry in users.iter()? {
            let (row_key, value) = entry?;
            rows.push((row_key.value().to_string(), serde_json::from_slice(value.value())?));
        }

        let missing = rows
            .iter()
            .filter(|(_, row)| !row.contains_key(&column.name))
            .count();
        match &backfill {
            None if missing > 0 => {
                return Err(StoreError::Conflict(format!(
                    "column {key} is NOT NULL without a default and {missing} rows lack it"
                )));
            }
            Some(value) if column.unique && !value.is_null() && missing > 1 => {
                return Err(StoreError::Conflict(format!(
                    "column {key} is UNIQUE but its default would repeat across {missing} rows"
                )));
            }
            _ => {}
        }

        if let Some(value) = backfill {
            for (row_key, mut row) in rows {
                if row.contains_key(&column.name) {
                    continue;
                }
                row.insert(column.name.clone(), value.clone());
                let bytes = serde_json::to_vec(&row)?;
                users.insert(row_key.as_str(), bytes.as_slice())?;
            }
        }
    }

    let json = serde_json::to_vec(column)?;
    let mut catalog = txn.open_table(SCHEMA_COLUMNS)?;
    catalog.insert(key.as_str(), json.as_slice())?;
    Ok(true)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::{ReconcileAction, IntentStatus};
    use crate::storage::schema::ColumnType;
    use crate::ledger::{TokenId, TransactionId};

    fn temp_store() -> (LedgerStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::open(&dir.path().join("test.redb")).unwrap();
        (store, dir)
    }

    fn acct(num: u64) -> AccountId {
        AccountId::new(0, 0, num)
    }

    #[test]
    fn upsert_and_get_account() {
        let (store, _dir) = temp_store();
        assert!(store.get_account(&acct(7)).unwrap().is_none());

        let created = store.upsert_balance(&acct(7), 20).unwrap();
        assert_eq!(created.fit_balance, 20);
        assert_eq!(created.version, 1);

        let updated = store.upsert_balance(&acct(7), 25).unwrap();
        assert_eq!(updated.version, 2);

        let fetched = store.get_account(&acct(7)).unwrap().unwrap();
        assert_eq!(fetched.fit_balance, 25);
        assert_eq!(fetched.total_steps, 0);
        assert!(fetched.updated_at >= created.updated_at);
    }

    #[test]
    fn version_check_rejects_stale_writes() {
        let (store, _dir) = temp_store();
        let account = store.upsert_balance(&acct(1), 10).unwrap();
        let record = ReconciliationRecord::new(acct(1), Some(10), Some(12), ReconcileAction::Synced);

        let stale = BalanceWrite {
            account_id: acct(1),
            balance: 12,
            expected: RowVersion::Exactly(account.version + 5),
        };
        let err = store.commit_pass(Some(&stale), &record).unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { found: Some(1), .. }));

        // Nothing from the failed transaction is visible
        assert_eq!(store.get_account(&acct(1)).unwrap().unwrap().fit_balance, 10);
        assert!(store.list_records(&acct(1), 10).unwrap().is_empty());

        let absent = BalanceWrite {
            account_id: acct(1),
            balance: 12,
            expected: RowVersion::Absent,
        };
        assert!(store.commit_pass(Some(&absent), &record).is_err());

        let fresh = BalanceWrite {
            account_id: acct(1),
            balance: 12,
            expected: RowVersion::of(Some(&account)),
        };
        let stored = store.commit_pass(Some(&fresh), &record).unwrap().unwrap();
        assert_eq!(stored.fit_balance, 12);
        assert_eq!(store.list_records(&acct(1), 10).unwrap().len(), 1);
    }

    #[test]
    fn records_are_listed_newest_first_per_account() {
        let (store, _dir) = temp_store();
        for observed in 0..5 {
            let record =
                ReconciliationRecord::new(acct(1), Some(0), Some(observed), ReconcileAction::Noop);
            store.append_record(&record).unwrap();
        }
        // Similar-looking id must not bleed into the range
        store
            .append_record(&ReconciliationRecord::new(acct(10), None, Some(99), ReconcileAction::Synced))
            .unwrap();

        let records = store.list_records(&acct(1), 3).unwrap();
        let observed: Vec<Option<u64>> = records.iter().map(|r| r.observed_balance).collect();
        assert_eq!(observed, vec![Some(4), Some(3), Some(2)]);

        let other = store.list_records(&acct(10), 10).unwrap();
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].observed_balance, Some(99));
    }

    #[test]
    fn link_user_enforces_unique_user_ids() {
        let (store, _dir) = temp_store();
        store.upsert_balance(&acct(1), 5).unwrap();

        let linked = store.link_user(&acct(1), "user-1", Some("a@example.com")).unwrap();
        assert_eq!(linked.user_id.as_deref(), Some("user-1"));
        assert_eq!(linked.email.as_deref(), Some("a@example.com"));
        assert_eq!(linked.fit_balance, 5);

        // Re-linking the same pair is fine
        store.link_user(&acct(1), "user-1", None).unwrap();

        let err = store.link_user(&acct(2), "user-1", None).unwrap_err();
        assert!(matches!(
            err,
            StoreError::DuplicateUser { ref user_id, ref owner } if user_id == "user-1" && owner == "0.0.1"
        ));

        // Moving account 1 to a new user frees the old id
        store.link_user(&acct(1), "user-2", None).unwrap();
        let relinked = store.link_user(&acct(2), "user-1", None).unwrap();
        assert_eq!(relinked.fit_balance, 0);
    }

    #[test]
    fn mint_intents_round_trip() {
        let (store, _dir) = temp_store();
        assert!(store.get_mint_intent("k1").unwrap().is_none());

        let mut intent = MintIntent::new("k1".into(), TokenId::new(0, 0, 9), 50, 0, None);
        store.put_mint_intent(&intent).unwrap();
        intent.mark_submitted(TransactionId::new("0xabc"));
        store.put_mint_intent(&intent).unwrap();

        let loaded = store.get_mint_intent("k1").unwrap().unwrap();
        assert_eq!(loaded.status, IntentStatus::Submitted);
        assert_eq!(loaded.tx_id, Some(TransactionId::new("0xabc")));
    }

    #[test]
    fn builtin_schema_is_in_place_after_open() {
        let (store, _dir) = temp_store();
        let names: Vec<String> = store
            .schema_columns(USERS_TABLE)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(
            names,
            vec!["email", "fitBalance", "hederaAccountId", "id", "totalSteps", "updatedAt"]
        );
        assert_eq!(store.applied_migrations().unwrap().len(), builtin_migrations().len());
    }

    #[test]
    fn migrations_are_idempotent() {
        let (store, _dir) = temp_store();
        store.upsert_balance(&acct(1), 3).unwrap();
        let before = store.schema_columns(USERS_TABLE).unwrap();

        for migration in builtin_migrations() {
            assert!(!store.migrate(&migration).unwrap());
        }
        assert_eq!(store.schema_columns(USERS_TABLE).unwrap(), before);

        let streak = Migration {
            id: "0004_add_streak_days",
            changes: vec![SchemaChange::add_column(
                USERS_TABLE,
                ColumnDef::new("streakDays", ColumnType::Integer).default_value(Value::from(0)),
            )],
        };
        assert!(store.migrate(&streak).unwrap());
        let after_first = store.schema_columns(USERS_TABLE).unwrap();
        assert!(!store.migrate(&streak).unwrap());
        assert_eq!(store.schema_columns(USERS_TABLE).unwrap(), after_first);

        // Existing rows were back-filled, new rows get the default too
        let existing = store.get_account(&acct(1)).unwrap().unwrap();
        assert_eq!(existing.extra.get("streakDays"), Some(&Value::from(0)));
        let created = store.upsert_balance(&acct(2), 1).unwrap();
        assert_eq!(created.extra.get("streakDays"), Some(&Value::from(0)));
    }

    #[test]
    fn incompatible_column_is_a_conflict() {
        let (store, _dir) = temp_store();
        let same = ColumnDef::new("fitBalance", ColumnType::Integer).default_value(Value::from(0));
        assert!(!store.add_column(USERS_TABLE, &same).unwrap());

        let different = ColumnDef::new("fitBalance", ColumnType::Text).nullable();
        assert!(matches!(
            store.add_column(USERS_TABLE, &different),
            Err(StoreError::Conflict(_))
        ));

        assert!(matches!(
            store.add_column("steps", &same),
            Err(StoreError::UnknownTable(_))
        ));
    }

    #[test]
    fn required_column_without_default_needs_empty_table() {
        let (store, _dir) = temp_store();
        let required = ColumnDef::new("deviceId", ColumnType::Text);
        store.upsert_balance(&acct(1), 1).unwrap();
        assert!(matches!(
            store.add_column(USERS_TABLE, &required),
            Err(StoreError::Conflict(_))
        ));
        // The failed change left no catalog entry behind
        assert!(store
            .schema_columns(USERS_TABLE)
            .unwrap()
            .iter()
            .all(|c| c.name != "deviceId"));
    }

    #[test]
    fn record_key_ordering() {
        let a = make_record_key(&acct(1), 1);
        let b = make_record_key(&acct(1), 2);
        assert!(a < b);
        assert!(b < make_record_prefix_end(&acct(1)));

        // Neighbouring ids share a textual prefix but never land in the range
        let (start, end) = (make_record_prefix(&acct(1)), make_record_prefix_end(&acct(1)));
        for other in [acct(10), acct(11), acct(100)] {
            for seq in [0, u64::MAX] {
                let key = make_record_key(&other, seq);
                assert!(key < start, "{other} sorts inside the range of 0.0.1");
            }
        }
        assert!(make_record_key(&acct(2), 0) >= end);
        assert!(make_record_key(&acct(1), u64::MAX) < end);
    }
}
