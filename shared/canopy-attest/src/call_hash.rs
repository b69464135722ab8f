//! Canonical call hash.
//!
//! `callHash = keccak256(abi.encode(uint256 chainId, address target, address subject,
//! bytes4 selector, uint256 value, bytes32 argsHash))` where `argsHash = keccak256(args)`.
//!
//! Field order and types are fixed. `target` precedes `subject`; swapping them changes the
//! digest and breaks every on-chain verifier that recomputes it.

use alloy_primitives::{keccak256, B256, U256};
use alloy_sol_types::SolValue;

use crate::intent::CallIntent;

/// 32-byte commitment to a [`CallIntent`].
pub type CallHash = B256;

/// `keccak256(args)`.
pub fn args_hash(args: &[u8]) -> B256 {
    keccak256(args)
}

/// Compute the canonical call hash. Total and pure: every valid intent hashes.
pub fn call_hash(intent: &CallIntent) -> CallHash {
    let encoded = (
        U256::from(intent.chain_id()),
        intent.target(),
        intent.subject(),
        intent.selector(),
        intent.value(),
        intent.args_hash(),
    )
        .abi_encode_params();
    keccak256(encoded)
}
