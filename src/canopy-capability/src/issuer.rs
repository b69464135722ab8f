//! Capability issuance.

use std::{fmt, str::FromStr, sync::Arc};

use alloy_primitives::{keccak256, Address, U256};
use alloy_sol_types::SolValue;
use canopy_attest::{call_hash, CallHash, CallIntent};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    clock::Clock,
    codec::CapabilityPayload,
    errors::{CapabilityError, Result, ValidationError},
    signer::{RecoverableSignature, Signer},
};

/// Default lifetime of a capability, in seconds.
pub const DEFAULT_TTL_SECS: u64 = 60;

/// Where the nonce comes from when the caller does not supply one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NonceMode {
    /// `uint256(keccak256(abiEncode(callHash, issuer)))`. Stable per intent and issuer.
    #[default]
    Derived,
    /// The caller must supply a nonce.
    Required,
}

impl FromStr for NonceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "derived" => Ok(Self::Derived),
            "required" => Ok(Self::Required),
            other => Err(format!("unknown nonce mode `{other}` (expected derived|required)")),
        }
    }
}

impl fmt::Display for NonceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Derived => "derived",
            Self::Required => "required",
        })
    }
}

/// Expiry and nonce defaults shared by the issuer and the attestation exporter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapabilityDefaults {
    pub ttl_secs: u64,
    pub nonce_mode: NonceMode,
}

impl Default for CapabilityDefaults {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            nonce_mode: NonceMode::Derived,
        }
    }
}

impl CapabilityDefaults {
    pub fn expiry(&self, requested: Option<u64>, now: u64) -> u64 {
        requested.unwrap_or_else(|| now.saturating_add(self.ttl_secs))
    }

    pub fn nonce(&self, requested: Option<U256>, call_hash: CallHash, issuer: Address) -> Result<U256> {
        match (requested, self.nonce_mode) {
            (Some(nonce), _) => Ok(nonce),
            (None, NonceMode::Derived) => Ok(derive_nonce(call_hash, issuer)),
            (None, NonceMode::Required) => Err(CapabilityError::Validation(
                ValidationError::single("nonce", "required when nonce mode is `required`"),
            )),
        }
    }
}

/// `uint256(keccak256(abiEncode(bytes32 callHash, address issuer)))`.
pub fn derive_nonce(call_hash: CallHash, issuer: Address) -> U256 {
    U256::from_be_bytes(keccak256((call_hash, issuer).abi_encode_params()).0)
}

/// Artifacts of one issuance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedCapability {
    pub signature: RecoverableSignature,
    pub call_hash: CallHash,
    pub issuer: Address,
    pub verifier: Address,
    pub expiry: u64,
    pub nonce: U256,
}

/// Signs capabilities with the process issuer key.
#[derive(Clone)]
pub struct Issuer {
    signer: Arc<dyn Signer>,
    clock: Arc<dyn Clock>,
    defaults: CapabilityDefaults,
}

impl fmt::Debug for Issuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Issuer")
            .field("address", &self.signer.address())
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl Issuer {
    pub fn new(signer: Arc<dyn Signer>, clock: Arc<dyn Clock>, defaults: CapabilityDefaults) -> Self {
        Self {
            signer,
            clock,
            defaults,
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn defaults(&self) -> CapabilityDefaults {
        self.defaults
    }

    /// Sign a capability for `intent`, to be checked by `verifier`.
    pub fn issue(
        &self,
        intent: &CallIntent,
        verifier: Address,
        expiry: Option<u64>,
        nonce: Option<U256>,
    ) -> Result<IssuedCapability> {
        let issuer = self.signer.address();
        let call_hash = call_hash(intent);
        let expiry = self.defaults.expiry(expiry, self.clock.now());
        let nonce = self.defaults.nonce(nonce, call_hash, issuer)?;

        let payload = CapabilityPayload::new(intent, verifier, expiry, nonce);
        let signature = self.signer.sign_hash(&payload.signing_hash())?;

        debug!(%call_hash, %issuer, %verifier, expiry, "issued capability");
        Ok(IssuedCapability {
            signature,
            call_hash,
            issuer,
            verifier,
            expiry,
            nonce,
        })
    }
}
