//! EIP-712 payload definitions.
//!
//! Two independent domains share the issuer key: the Canopy capability domain and the EAS
//! attestation domain. They have unrelated external verifiers and must stay byte-incompatible,
//! so each lives in its own module with its own struct layout.

pub mod attestation;
pub mod capability;

pub use attestation::{attestation_domain, Attest};
pub use capability::{capability_domain, CapabilityPayload, CompliantCall};

use alloy_sol_types::Eip712Domain;
use serde::Serialize;

/// `{name, type}` pair of an EIP-712 struct member, in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TypedField {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub ty: &'static str,
}

/// JSON rendering of an EIP-712 domain (`name`, `version`, `chainId`, `verifyingContract`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainJson {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: String,
}

impl DomainJson {
    pub fn new(name: &str, version: &str, chain_id: u64, domain: &Eip712Domain) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            chain_id,
            verifying_contract: domain
                .verifying_contract
                .map(|a| a.to_checksum(None))
                .unwrap_or_default(),
        }
    }
}
