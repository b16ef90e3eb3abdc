// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Hedera Token Service system contract and ERC-20 facade bindings.

use alloy::{primitives::Address, sol};

use super::client::{LedgerError, LedgerResult};

// HTS system contract, reachable through the JSON-RPC relay
sol! {
    #[sol(rpc)]
    interface IHederaTokenService {
        function mintToken(address token, int64 amount, bytes[] memory metadata)
            external
            returns (int64 responseCode, int64 newTotalSupply, int64[] memory serialNumbers);
    }
}

// Every HTS fungible token exposes an ERC-20 facade at its long-zero address
sol! {
    #[sol(rpc)]
    interface IERC20 {
        function totalSupply() external view returns (uint256);
    }
}

/// Address of the HTS system contract (`0.0.359`).
pub const HTS_SYSTEM_CONTRACT: Address = Address::new([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01, 0x67,
]);

/// Gas limit for HTS mint calls; the relay cannot estimate system contract calls reliably.
pub const MINT_GAS_LIMIT: u64 = 800_000;

// ResponseCodeEnum values returned by the HTS system contract
pub const SUCCESS: i64 = 22;
pub const INVALID_SIGNATURE: i64 = 7;
pub const INVALID_TOKEN_ID: i64 = 167;
pub const INVALID_TOKEN_MINT_AMOUNT: i64 = 175;
pub const TOKEN_HAS_NO_SUPPLY_KEY: i64 = 180;

/// Map an HTS response code to a typed result.
pub fn check_response_code(code: i64) -> LedgerResult<()> {
    match code {
        SUCCESS => Ok(()),
        INVALID_SIGNATURE => Err(LedgerError::Authorization(
            "operator signature does not satisfy the token supply key".to_string(),
        )),
        TOKEN_HAS_NO_SUPPLY_KEY => Err(LedgerError::Authorization(
            "token has no supply key".to_string(),
        )),
        INVALID_TOKEN_MINT_AMOUNT => Err(LedgerError::Validation(
            "ledger rejected the mint amount".to_string(),
        )),
        INVALID_TOKEN_ID => Err(LedgerError::NotFound("token id".to_string())),
        other => Err(LedgerError::Rejected(format!("HTS response code {other}"))),
    }
}

/// Map a reverted mint simulation to a typed error.
///
/// The relay reports HTS failures by response code name in the revert reason.
pub fn revert_error(reason: &str) -> LedgerError {
    const AUTHORITY_CODES: [&str; 3] = [
        "INVALID_SIGNATURE",
        "TOKEN_HAS_NO_SUPPLY_KEY",
        "INVALID_SUPPLY_KEY",
    ];
    if AUTHORITY_CODES.iter().any(|code| reason.contains(code)) {
        LedgerError::Authorization(format!("mint simulation reverted: {reason}"))
    } else {
        LedgerError::Rejected(format!("mint simulation reverted: {reason}"))
    }
}
