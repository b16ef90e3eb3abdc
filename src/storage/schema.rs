// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Schema catalog and additive migrations.
//!
//! Rows are JSON objects keyed by column name. The catalog records every
//! column ever added; a migration can only add columns, and adding a column
//! back-fills its default into existing rows.
//!
//! ## Current `users` schema
//!
//! | Column | Type | Notes |
//! |--------|------|-------|
//! | `id` | TEXT | application user id, unique when present |
//! | `email` | TEXT | nullable |
//! | `hederaAccountId` | TEXT | unique, row key |
//! | `fitBalance` | INTEGER | cached FIT balance, default 0 |
//! | `totalSteps` | INTEGER | default 0 |
//! | `updatedAt` | DATETIME | last synchronization |

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the users table.
pub const USERS_TABLE: &str = "users";

/// Column storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Text,
    Integer,
    Datetime,
}

/// Column definition as recorded in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub unique: bool,
    /// Value back-filled into existing rows
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            unique: false,
            default: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Value written into rows that predate the column, if any.
    pub fn backfill_value(&self) -> Option<Value> {
        match (&self.default, self.nullable) {
            (Some(value), _) => Some(value.clone()),
            (None, true) => Some(Value::Null),
            (None, false) => None,
        }
    }
}

/// A single additive schema change.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaChange {
    AddColumn { table: String, column: ColumnDef },
}

impl SchemaChange {
    pub fn add_column(table: &str, column: ColumnDef) -> Self {
        SchemaChange::AddColumn {
            table: table.to_string(),
            column,
        }
    }
}

/// A named, ordered group of schema changes applied in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Migration {
    pub id: &'static str,
    pub changes: Vec<SchemaChange>,
}

/// Migrations applied whenever the store is opened, in order.
pub fn builtin_migrations() -> Vec<Migration> {
    vec![
        Migration {
            id: "0001_create_users",
            changes: vec![
                SchemaChange::add_column(
                    USERS_TABLE,
                    ColumnDef::new("id", ColumnType::Text).nullable().unique(),
                ),
                SchemaChange::add_column(
                    USERS_TABLE,
                    ColumnDef::new("email", ColumnType::Text).nullable(),
                ),
                SchemaChange::add_column(
                    USERS_TABLE,
                    ColumnDef::new("hederaAccountId", ColumnType::Text).unique(),
                ),
                SchemaChange::add_column(
                    USERS_TABLE,
                    ColumnDef::new("updatedAt", ColumnType::Datetime),
                ),
            ],
        },
        Migration {
            id: "0002_add_fit_balance",
            changes: vec![SchemaChange::add_column(
                USERS_TABLE,
                ColumnDef::new("fitBalance", ColumnType::Integer).default_value(Value::from(0)),
            )],
        },
        Migration {
            id: "0003_add_total_steps",
            changes: vec![SchemaChange::add_column(
                USERS_TABLE,
                ColumnDef::new("totalSteps", ColumnType::Integer).default_value(Value::from(0)),
            )],
        },
    ]
}
