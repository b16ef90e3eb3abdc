// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;

use serde::Serialize;

use crate::config::ConfigError;
use crate::ledger::LedgerError;
use crate::reconcile::ReconcileError;
use crate::storage::StoreError;

/// Failure category reported to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authorization,
    Network,
    Storage,
    Discrepancy,
}

impl ErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Validation => 1,
            ErrorKind::Authorization => 2,
            ErrorKind::Network => 3,
            ErrorKind::Storage => 4,
            ErrorKind::Discrepancy => 5,
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    kind: ErrorKind,
    error: &'a str,
}

impl CliError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.kind.exit_code())
    }

    /// One-line JSON body printed for the operator.
    pub fn to_json(&self) -> String {
        let body = ErrorBody {
            kind: self.kind,
            error: &self.message,
        };
        serde_json::to_string(&body).unwrap_or_else(|_| format!("{{\"error\":{:?}}}", self.message))
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<LedgerError> for CliError {
    fn from(e: LedgerError) -> Self {
        let kind = match e {
            LedgerError::Network(_) | LedgerError::Timeout(_) | LedgerError::Unavailable(_) => {
                ErrorKind::Network
            }
            LedgerError::Authorization(_)
            | LedgerError::InvalidCredentials(_)
            | LedgerError::Rejected(_) => ErrorKind::Authorization,
            LedgerError::NotFound(_) | LedgerError::Validation(_) => ErrorKind::Validation,
        };
        Self::new(kind, e.to_string())
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        let kind = match e {
            StoreError::DuplicateUser { .. } => ErrorKind::Validation,
            _ => ErrorKind::Storage,
        };
        Self::new(kind, e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(ErrorKind::Storage, format!("serialization error: {e}"))
    }
}

impl From<ReconcileError> for CliError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::Ledger(e) => e.into(),
            ReconcileError::Store(e) => e.into(),
            e @ (ReconcileError::Cancelled { .. } | ReconcileError::MintInDoubt { .. }) => {
                Self::new(ErrorKind::Network, e.to_string())
            }
        }
    }
}

impl From<clap::Error> for CliError {
    fn from(e: clap::Error) -> Self {
        Self::validation(e.render().to_string().trim_end())
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::validation(e.to_string())
    }
}
