//! EAS off-chain attestation payload.
//!
//! Signed under `{name: "EAS Attestation", version: "1.0.0"}` with the registry as verifying
//! contract. The capability domain and struct are never reused here.

use std::borrow::Cow;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, Eip712Domain, SolStruct, SolValue};

use super::TypedField;
use crate::CallHash;

pub const ATTESTATION_DOMAIN_NAME: &str = "EAS Attestation";
pub const ATTESTATION_DOMAIN_VERSION: &str = "1.0.0";

sol! {
    /// EAS off-chain attestation request.
    #[derive(Debug, PartialEq, Eq)]
    struct Attest {
        bytes32 schema;
        address recipient;
        uint64 time;
        uint64 expirationTime;
        bool revocable;
        bytes32 refUID;
        bytes data;
        bytes32 salt;
    }
}

/// Members of `Attest`, in signing order.
pub const ATTEST_FIELDS: [TypedField; 8] = [
    TypedField { name: "schema", ty: "bytes32" },
    TypedField { name: "recipient", ty: "address" },
    TypedField { name: "time", ty: "uint64" },
    TypedField { name: "expirationTime", ty: "uint64" },
    TypedField { name: "revocable", ty: "bool" },
    TypedField { name: "refUID", ty: "bytes32" },
    TypedField { name: "data", ty: "bytes" },
    TypedField { name: "salt", ty: "bytes32" },
];

pub fn attestation_domain(chain_id: u64, registry: Address) -> Eip712Domain {
    Eip712Domain::new(
        Some(Cow::Borrowed(ATTESTATION_DOMAIN_NAME)),
        Some(Cow::Borrowed(ATTESTATION_DOMAIN_VERSION)),
        Some(U256::from(chain_id)),
        Some(registry),
        None,
    )
}

/// `abiEncode(bytes32 callHash, uint64 expiry, uint256 nonce)`.
pub fn attestation_data(call_hash: CallHash, expiry: u64, nonce: U256) -> Bytes {
    (call_hash, expiry, nonce).abi_encode_params().into()
}

impl Attest {
    /// Digest signed by the exporter.
    pub fn signing_hash(&self, domain: &Eip712Domain) -> B256 {
        self.eip712_signing_hash(domain)
    }
}
