//! Capability verification.
//!
//! Checks run in a fixed order: required fields, staleness, payload rebuild, recovery. A stale
//! capability is rejected before any signature work. There is no issuer allowlist here; the
//! caller compares the recovered address against whatever it trusts.

use std::{fmt, sync::Arc};

use alloy_primitives::{Address, U256};
use canopy_attest::CallIntent;
use tracing::debug;

use crate::{
    clock::Clock,
    codec::CapabilityPayload,
    errors::{CapabilityError, Result},
    signer::RecoverableSignature,
};

/// Capability fields supplied by the presenter. Any of them may be absent on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapabilityClaim {
    pub verifier: Option<Address>,
    pub signature: Option<String>,
    pub expiry: Option<u64>,
    pub nonce: Option<U256>,
}

impl CapabilityClaim {
    /// Wire names of the absent fields, in request order. An empty signature counts as absent.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.verifier.is_none() {
            missing.push("verifier");
        }
        if self.signature.as_deref().map_or(true, str::is_empty) {
            missing.push("capabilitySig");
        }
        if self.expiry.is_none() {
            missing.push("expiry");
        }
        if self.nonce.is_none() {
            missing.push("nonce");
        }
        missing
    }
}

#[derive(Clone)]
pub struct Verifier {
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for Verifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verifier").finish_non_exhaustive()
    }
}

impl Verifier {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Recover the address that signed `claim` for `intent`.
    pub fn verify(&self, intent: &CallIntent, claim: &CapabilityClaim) -> Result<Address> {
        let (Some(verifier), Some(signature), Some(expiry), Some(nonce)) = (
            claim.verifier,
            claim.signature.as_deref().filter(|s| !s.is_empty()),
            claim.expiry,
            claim.nonce,
        ) else {
            return Err(CapabilityError::MissingFields(claim.missing_fields()));
        };

        let now = self.clock.now();
        if expiry < now {
            return Err(CapabilityError::StaleCapability { expiry, now });
        }

        let payload = CapabilityPayload::new(intent, verifier, expiry, nonce);
        let recovered = RecoverableSignature::from_hex(signature)
            .and_then(|sig| sig.recover(&payload.signing_hash()))
            .map_err(CapabilityError::SignatureRecovery)?;

        debug!(%recovered, %verifier, expiry, "capability signature recovered");
        Ok(recovered)
    }
}
