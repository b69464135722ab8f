//! Facade wiring the issuer, verifier, exporter and policy engine behind the wire operations.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    errors::Result,
    exporter::{Exporter, RegistryConfig},
    issuer::{CapabilityDefaults, Issuer, NonceMode, DEFAULT_TTL_SECS},
    policy::PolicyEngine,
    signer::Signer,
    verifier::Verifier,
    wire::{
        Artifacts, AttestRequest, AttestationResponse, EvaluateRequest, EvaluateResponse,
        HealthResponse, IssueRequest, IssueResponse, VerifyRequest, VerifyResponse,
    },
};

/// Runtime options. Assembled by the binary from flags and environment; the library never
/// reads the environment itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    pub ttl_secs: u64,
    pub nonce_mode: NonceMode,
    /// Refuse to sign in `evaluate_policy` when the decision is Deny.
    pub strict_issuance: bool,
    pub registry: Option<RegistryConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            nonce_mode: NonceMode::Derived,
            strict_issuance: false,
            registry: None,
        }
    }
}

pub struct CapabilityService {
    issuer: Issuer,
    verifier: Verifier,
    exporter: Exporter,
    policy: Arc<PolicyEngine>,
    strict_issuance: bool,
}

impl CapabilityService {
    pub fn new(
        config: ServiceConfig,
        signer: Arc<dyn Signer>,
        policy: Arc<PolicyEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let defaults = CapabilityDefaults {
            ttl_secs: config.ttl_secs,
            nonce_mode: config.nonce_mode,
        };
        info!(
            issuer = %signer.address(),
            ttl_secs = defaults.ttl_secs,
            nonce_mode = %defaults.nonce_mode,
            strict_issuance = config.strict_issuance,
            attestations = config.registry.is_some(),
            "capability service ready"
        );
        Self {
            issuer: Issuer::new(signer.clone(), clock.clone(), defaults),
            verifier: Verifier::new(clock.clone()),
            exporter: Exporter::new(signer, clock, defaults, config.registry),
            policy,
            strict_issuance: config.strict_issuance,
        }
    }

    pub fn issuer(&self) -> &Issuer {
        &self.issuer
    }

    pub fn policy(&self) -> &Arc<PolicyEngine> {
        &self.policy
    }

    /// Evaluate the intent and issue a capability addressed to its target.
    ///
    /// The decision is advisory: a Deny still yields artifacts unless strict issuance is on.
    pub fn evaluate_policy(&self, request: &EvaluateRequest) -> Result<EvaluateResponse> {
        let intent = request.parse()?;
        let decision = self.policy.evaluate(&intent);

        if self.strict_issuance && !decision.is_allow() {
            warn!(reasons = ?decision.reasons, "policy denied intent, strict issuance withholds capability");
            return Ok(EvaluateResponse {
                decision,
                artifacts: None,
            });
        }

        let issued = self.issuer.issue(&intent, intent.target(), None, None)?;
        Ok(EvaluateResponse {
            decision,
            artifacts: Some(Artifacts::from(&issued)),
        })
    }

    pub fn issue_capability(&self, request: &IssueRequest) -> Result<IssueResponse> {
        let params = request.parse()?;
        let issued = self
            .issuer
            .issue(&params.intent, params.verifier, params.expiry, params.nonce)?;
        Ok(IssueResponse::from(&issued))
    }

    /// Always answers; only a malformed request is an error.
    pub fn verify_capability(&self, request: &VerifyRequest) -> Result<VerifyResponse> {
        let (intent, claim) = request.parse()?;
        match self.verifier.verify(&intent, &claim) {
            Ok(recovered) => Ok(VerifyResponse::valid(recovered)),
            Err(err) => {
                debug!(code = err.code(), error = %err, "capability rejected");
                Ok(VerifyResponse::invalid(&err))
            }
        }
    }

    pub fn export_attestation(&self, request: &AttestRequest) -> Result<AttestationResponse> {
        let (intent, expiry, nonce) = request.parse()?;
        let export = self.exporter.export(&intent, expiry, nonce)?;
        Ok(AttestationResponse::from(&export))
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            ok: true,
            issuer: self.issuer.address().to_checksum(None),
            policy: self.policy.status(),
        }
    }
}

impl std::fmt::Debug for CapabilityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityService")
            .field("issuer", &self.issuer)
            .field("exporter", &self.exporter)
            .field("policy", &self.policy)
            .field("strict_issuance", &self.strict_issuance)
            .finish()
    }
}
