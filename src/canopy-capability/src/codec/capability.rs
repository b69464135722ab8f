//! Canopy capability payload.
//!
//! Domain: `{name: "Canopy", version: "1", chainId: intent.chainId, verifyingContract: verifier}`.
//! Message: `CompliantCall(address subject,address verifier,address target,uint256 value,
//! bytes32 argsHash,bytes32 policyId,uint64 expiry,uint256 nonce)`.
//!
//! Issuance and verification both go through [`CapabilityPayload::new`], so the bytes that are
//! signed and the bytes that are checked cannot diverge.

use std::borrow::Cow;

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::{sol, Eip712Domain, SolStruct};
use canopy_attest::CallIntent;

use super::TypedField;

pub const CAPABILITY_DOMAIN_NAME: &str = "Canopy";
pub const CAPABILITY_DOMAIN_VERSION: &str = "1";

sol! {
    /// Signed capability message.
    #[derive(Debug, PartialEq, Eq)]
    struct CompliantCall {
        address subject;
        address verifier;
        address target;
        uint256 value;
        bytes32 argsHash;
        bytes32 policyId;
        uint64 expiry;
        uint256 nonce;
    }
}

/// Members of `CompliantCall`, in signing order.
pub const COMPLIANT_CALL_FIELDS: [TypedField; 8] = [
    TypedField { name: "subject", ty: "address" },
    TypedField { name: "verifier", ty: "address" },
    TypedField { name: "target", ty: "address" },
    TypedField { name: "value", ty: "uint256" },
    TypedField { name: "argsHash", ty: "bytes32" },
    TypedField { name: "policyId", ty: "bytes32" },
    TypedField { name: "expiry", ty: "uint64" },
    TypedField { name: "nonce", ty: "uint256" },
];

pub fn capability_domain(chain_id: u64, verifier: Address) -> Eip712Domain {
    Eip712Domain::new(
        Some(Cow::Borrowed(CAPABILITY_DOMAIN_NAME)),
        Some(Cow::Borrowed(CAPABILITY_DOMAIN_VERSION)),
        Some(U256::from(chain_id)),
        Some(verifier),
        None,
    )
}

/// Domain-separated structured data for one capability.
#[derive(Clone, Debug)]
pub struct CapabilityPayload {
    pub domain: Eip712Domain,
    pub message: CompliantCall,
}

impl CapabilityPayload {
    pub fn new(intent: &CallIntent, verifier: Address, expiry: u64, nonce: U256) -> Self {
        Self {
            domain: capability_domain(intent.chain_id(), verifier),
            message: CompliantCall {
                subject: intent.subject(),
                verifier,
                target: intent.target(),
                value: intent.value(),
                argsHash: intent.args_hash(),
                policyId: intent.policy_id(),
                expiry,
                nonce,
            },
        }
    }

    /// `keccak256("\x19\x01" || domainSeparator || hashStruct(message))`.
    pub fn signing_hash(&self) -> B256 {
        self.message.eip712_signing_hash(&self.domain)
    }
}
