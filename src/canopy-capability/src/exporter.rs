//! Export of a call hash as an EAS off-chain attestation.

use std::{fmt, sync::Arc};

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::Eip712Domain;
use canopy_attest::{call_hash, CallIntent};
use rand::{rngs::OsRng, RngCore};
use tracing::debug;

use crate::{
    clock::Clock,
    codec::{
        attestation::{attestation_data, attestation_domain},
        Attest,
    },
    errors::{CapabilityError, Result},
    issuer::CapabilityDefaults,
    signer::{RecoverableSignature, Signer},
};

/// Location of the attestation registry and the schema attestations are made against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    pub chain_id: u64,
    pub registry: Address,
    pub schema_id: B256,
}

/// A signed attestation, ready to be handed to the registry's off-chain verifier.
#[derive(Clone, Debug)]
pub struct AttestationExport {
    pub chain_id: u64,
    pub domain: Eip712Domain,
    pub message: Attest,
    pub signature: RecoverableSignature,
}

#[derive(Clone)]
pub struct Exporter {
    signer: Arc<dyn Signer>,
    clock: Arc<dyn Clock>,
    defaults: CapabilityDefaults,
    registry: Option<RegistryConfig>,
}

impl fmt::Debug for Exporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exporter")
            .field("registry", &self.registry)
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl Exporter {
    pub fn new(
        signer: Arc<dyn Signer>,
        clock: Arc<dyn Clock>,
        defaults: CapabilityDefaults,
        registry: Option<RegistryConfig>,
    ) -> Self {
        Self {
            signer,
            clock,
            defaults,
            registry,
        }
    }

    pub fn registry(&self) -> Option<&RegistryConfig> {
        self.registry.as_ref()
    }

    /// Build and sign an attestation embedding `callHash(intent)`, `expiry` and `nonce`.
    ///
    /// Each call draws a fresh salt, so two exports of the same intent never share a digest.
    pub fn export(
        &self,
        intent: &CallIntent,
        expiry: Option<u64>,
        nonce: Option<U256>,
    ) -> Result<AttestationExport> {
        let registry = self.registry.ok_or_else(|| {
            CapabilityError::Configuration("attestation registry is not configured".to_string())
        })?;

        let now = self.clock.now();
        let call_hash = call_hash(intent);
        let expiry = self.defaults.expiry(expiry, now);
        let nonce = self.defaults.nonce(nonce, call_hash, self.signer.address())?;

        let mut salt = B256::ZERO;
        OsRng.fill_bytes(salt.as_mut_slice());

        let message = Attest {
            schema: registry.schema_id,
            recipient: intent.subject(),
            time: now,
            expirationTime: expiry,
            revocable: false,
            refUID: B256::ZERO,
            data: attestation_data(call_hash, expiry, nonce),
            salt,
        };
        let domain = attestation_domain(registry.chain_id, registry.registry);
        let signature = self.signer.sign_hash(&message.signing_hash(&domain))?;

        debug!(%call_hash, registry = %registry.registry, schema = %registry.schema_id, expiry, "exported attestation");
        Ok(AttestationExport {
            chain_id: registry.chain_id,
            domain,
            message,
            signature,
        })
    }
}
