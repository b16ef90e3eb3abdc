// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Hedera backend.
//!
//! Balances come from the mirror node REST API, which answers 404 for
//! accounts the network does not know. Supply queries, mints and receipts go
//! through the JSON-RPC relay: the FIT token's ERC-20 facade for supply, the
//! HTS system contract for minting.

use std::time::Duration;

use alloy::{
    network::EthereumWallet,
    primitives::{Address, TxHash, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    signers::local::PrivateKeySigner,
};
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use super::client::{validate_mint_amount, LedgerClient, LedgerError, LedgerResult};
use super::hts::{
    check_response_code, revert_error, IHederaTokenService, IERC20, HTS_SYSTEM_CONTRACT,
    MINT_GAS_LIMIT,
};
use super::types::{AccountId, MintReceipt, NetworkConfig, TokenId, TransactionId};

/// Mirror node response for `/api/v1/accounts/{id}/tokens`.
#[derive(Debug, Deserialize)]
struct MirrorTokenBalances {
    tokens: Vec<MirrorTokenBalance>,
}

#[derive(Debug, Deserialize)]
struct MirrorTokenBalance {
    token_id: String,
    balance: u64,
}

/// Ledger client for a Hedera network.
pub struct HederaClient {
    /// Network configuration
    network: NetworkConfig,
    /// Mirror node base URL
    mirror_url: Url,
    /// HTTP client for mirror node queries
    http: reqwest::Client,
    /// Signing relay provider
    provider: DynProvider,
    /// EVM address of the operator key
    signer_address: Address,
}

impl HederaClient {
    /// Create a client for `network`, signing with `signer`.
    pub fn new(
        network: NetworkConfig,
        rpc_url: Url,
        mirror_url: Url,
        signer: PrivateKeySigner,
        timeout: Duration,
    ) -> LedgerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Network(e.to_string()))?;

        let signer_address = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(rpc_url)
            .erased();

        Ok(Self {
            network,
            mirror_url,
            http,
            provider,
            signer_address,
        })
    }

    /// Get the network configuration.
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Explorer link for a transaction.
    pub fn explorer_url(&self, tx_id: &TransactionId) -> String {
        format!("{}/transaction/{}", self.network.explorer_url, tx_id)
    }

    fn token_balances_url(&self, account: &AccountId, token: &TokenId) -> LedgerResult<Url> {
        let mut url = mirror_endpoint(&self.mirror_url, &format!("api/v1/accounts/{account}/tokens"))?;
        url.query_pairs_mut()
            .append_pair("token.id", &token.to_string());
        Ok(url)
    }
}

impl LedgerClient for HederaClient {
    async fn get_balance(&self, account: &AccountId, token: &TokenId) -> LedgerResult<u64> {
        let url = self.token_balances_url(account, token)?;
        tracing::debug!(%account, %token, url = %url, "Querying mirror node balance");

        let response = self.http.get(url).send().await.map_err(transport_error)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(LedgerError::NotFound(format!("account {account}")));
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(LedgerError::Network(format!("mirror node returned {status}")));
        }
        if !status.is_success() {
            return Err(LedgerError::Validation(format!(
                "mirror node rejected balance query for {account}: {status}"
            )));
        }

        let body: MirrorTokenBalances = response.json().await.map_err(transport_error)?;
        let token_str = token.to_string();
        let balance = body
            .tokens
            .iter()
            .find(|entry| entry.token_id == token_str)
            .map(|entry| entry.balance);

        match balance {
            Some(balance) => Ok(balance),
            None => {
                // Not associated with the token: it cannot hold any
                tracing::debug!(%account, %token, "Account not associated with token");
                Ok(0)
            }
        }
    }

    async fn mint(&self, token: &TokenId, amount: u64) -> LedgerResult<TransactionId> {
        let amount = validate_mint_amount(amount)?;
        let hts = IHederaTokenService::new(HTS_SYSTEM_CONTRACT, self.provider.clone());
        let call = hts
            .mintToken(token.to_evm_address(), amount, Vec::new())
            .from(self.signer_address)
            .gas(MINT_GAS_LIMIT);

        // Dry run first so authority problems surface as typed errors
        let simulated = call.call().await.map_err(simulation_error)?;
        check_response_code(simulated.responseCode)?;

        let pending = call
            .send()
            .await
            .map_err(|e| LedgerError::Network(format!("Failed to send: {}", e)))?;

        let tx_id = TransactionId::new(format!("{:#x}", pending.tx_hash()));
        tracing::info!(
            %token,
            amount,
            tx = %tx_id,
            explorer = %self.explorer_url(&tx_id),
            "Mint submitted"
        );
        Ok(tx_id)
    }

    async fn get_receipt(&self, tx_id: &TransactionId) -> LedgerResult<Option<MintReceipt>> {
        let hash: TxHash = tx_id
            .as_str()
            .parse()
            .map_err(|e| LedgerError::Validation(format!("Invalid tx hash: {}", e)))?;

        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| LedgerError::Network(format!("Failed to get receipt: {}", e)))?;

        Ok(receipt.map(|r| MintReceipt {
            tx_id: tx_id.clone(),
            success: r.status(),
            block_number: r.block_number,
        }))
    }

    async fn total_supply(&self, token: &TokenId) -> LedgerResult<u64> {
        let facade = IERC20::new(token.to_evm_address(), self.provider.clone());
        let supply: U256 = facade
            .totalSupply()
            .call()
            .await
            .map_err(|e| LedgerError::Network(format!("totalSupply failed: {}", e)))?;

        u64::try_from(supply)
            .map_err(|_| LedgerError::Rejected(format!("total supply {supply} exceeds u64")))
    }
}

/// Join `path` onto a base URL, keeping any path prefix the base already has.
fn mirror_endpoint(base: &Url, path: &str) -> LedgerResult<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path)
        .map_err(|e| LedgerError::Validation(format!("Invalid mirror URL: {}", e)))
}

/// Nothing has been broadcast when the dry run fails.
fn simulation_error(e: alloy::contract::Error) -> LedgerError {
    match &e {
        // The relay answered: the call reverted or was refused
        alloy::contract::Error::TransportError(rpc) if rpc.is_error_resp() => {
            revert_error(&e.to_string())
        }
        _ => LedgerError::Unavailable(format!("Mint simulation failed: {}", e)),
    }
}

fn transport_error(e: reqwest::Error) -> LedgerError {
    if e.is_timeout() {
        LedgerError::Network(format!("mirror node timed out: {}", e))
    } else if e.is_decode() {
        LedgerError::Rejected(format!("unexpected mirror node response: {}", e))
    } else {
        LedgerError::Network(e.to_string())
    }
}
