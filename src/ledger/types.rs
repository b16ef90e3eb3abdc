// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger types and network constants.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

/// Hedera network configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Network name for display
    pub name: &'static str,
    /// Short identifier accepted in configuration (`testnet`, `mainnet`, ...)
    pub key: &'static str,
    /// EVM chain ID exposed by the JSON-RPC relay
    pub chain_id: u64,
    /// JSON-RPC relay endpoint URL
    pub rpc_url: &'static str,
    /// Mirror node REST endpoint URL
    pub mirror_url: &'static str,
    /// Block explorer URL
    pub explorer_url: &'static str,
}

/// Hedera mainnet configuration.
pub const HEDERA_MAINNET: NetworkConfig = NetworkConfig {
    name: "Hedera Mainnet",
    key: "mainnet",
    chain_id: 295,
    rpc_url: "https://mainnet.hashio.io/api",
    mirror_url: "https://mainnet-public.mirrornode.hedera.com",
    explorer_url: "https://hashscan.io/mainnet",
};

/// Hedera testnet configuration.
pub const HEDERA_TESTNET: NetworkConfig = NetworkConfig {
    name: "Hedera Testnet",
    key: "testnet",
    chain_id: 296,
    rpc_url: "https://testnet.hashio.io/api",
    mirror_url: "https://testnet.mirrornode.hedera.com",
    explorer_url: "https://hashscan.io/testnet",
};

/// Hedera previewnet configuration.
pub const HEDERA_PREVIEWNET: NetworkConfig = NetworkConfig {
    name: "Hedera Previewnet",
    key: "previewnet",
    chain_id: 297,
    rpc_url: "https://previewnet.hashio.io/api",
    mirror_url: "https://previewnet.mirrornode.hedera.com",
    explorer_url: "https://hashscan.io/previewnet",
};

/// Resolve a network by its configuration key. Defaults to testnet.
pub fn network_by_key(raw: Option<&str>) -> Result<NetworkConfig, String> {
    let value = raw.unwrap_or(HEDERA_TESTNET.key).trim().to_ascii_lowercase();
    [HEDERA_TESTNET, HEDERA_MAINNET, HEDERA_PREVIEWNET]
        .into_iter()
        .find(|network| network.key == value)
        .ok_or_else(|| {
            format!("Unknown network `{value}` (expected testnet, mainnet or previewnet)")
        })
}

/// Errors produced when parsing `shard.realm.num` identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntityIdError {
    #[error("expected `shard.realm.num`, got `{0}`")]
    Format(String),

    #[error("invalid {component} in `{raw}`")]
    Component { component: &'static str, raw: String },
}

/// A Hedera entity identifier in `shard.realm.num` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    pub shard: u32,
    pub realm: u64,
    pub num: u64,
}

impl EntityId {
    pub const fn new(shard: u32, realm: u64, num: u64) -> Self {
        Self { shard, realm, num }
    }

    /// The "long-zero" EVM address of this entity.
    ///
    /// Layout: 4 bytes shard, 8 bytes realm, 8 bytes num, all big-endian.
    pub fn to_evm_address(&self) -> Address {
        let mut bytes = [0u8; 20];
        bytes[..4].copy_from_slice(&self.shard.to_be_bytes());
        bytes[4..12].copy_from_slice(&self.realm.to_be_bytes());
        bytes[12..].copy_from_slice(&self.num.to_be_bytes());
        Address::from(bytes)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.shard, self.realm, self.num)
    }
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        // Checksummed form `0.0.123-abcde` is accepted; the checksum is ignored.
        let without_checksum = match trimmed.split_once('-') {
            Some((id, checksum))
                if checksum.len() == 5 && checksum.chars().all(|c| c.is_ascii_lowercase()) =>
            {
                id
            }
            Some(_) => return Err(EntityIdError::Format(raw.to_string())),
            None => trimmed,
        };

        let parts: Vec<&str> = without_checksum.split('.').collect();
        if parts.len() != 3 {
            return Err(EntityIdError::Format(raw.to_string()));
        }

        let component = |name: &'static str| EntityIdError::Component {
            component: name,
            raw: raw.to_string(),
        };

        let shard = parts[0].parse::<u32>().map_err(|_| component("shard"))?;
        let realm = parts[1].parse::<u64>().map_err(|_| component("realm"))?;
        let num = parts[2].parse::<u64>().map_err(|_| component("num"))?;

        Ok(Self { shard, realm, num })
    }
}

macro_rules! entity_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(EntityId);

        impl $name {
            pub const fn new(shard: u32, realm: u64, num: u64) -> Self {
                Self(EntityId::new(shard, realm, num))
            }

            pub fn to_evm_address(&self) -> Address {
                self.0.to_evm_address()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = EntityIdError;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                raw.parse().map(Self)
            }
        }

        impl TryFrom<String> for $name {
            type Error = EntityIdError;

            fn try_from(raw: String) -> Result<Self, Self::Error> {
                raw.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.to_string()
            }
        }
    };
}

entity_newtype!(
    /// A ledger account (`0.0.7307810`).
    AccountId
);

entity_newtype!(
    /// A fungible token tracked by the service (the FIT token).
    TokenId
);

/// Ledger transaction identifier (the relay's EVM transaction hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Receipt of a submitted mint transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintReceipt {
    /// Transaction this receipt belongs to
    pub tx_id: TransactionId,
    /// Whether the ledger applied the transaction
    pub success: bool,
    /// Block number the transaction was included in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
}
