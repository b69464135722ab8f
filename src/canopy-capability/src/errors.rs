use thiserror::Error;

pub use canopy_attest::{FieldViolation, ValidationError};

/// Result alias for capability operations.
pub type Result<T, E = CapabilityError> = std::result::Result<T, E>;

/// Errors surfaced to the caller of an operation. None of them are retried.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// Malformed intent or request field.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A verification request omitted required fields.
    #[error("missing fields ({})", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    /// The operation needs configuration that is not present.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The capability expired before verification.
    #[error("stale capability: expiry {expiry} is before now ({now})")]
    StaleCapability { expiry: u64, now: u64 },

    /// The signature is malformed or no signer could be recovered from it.
    #[error("signature recovery failed: {0}")]
    SignatureRecovery(String),

    /// The signing backend failed.
    #[error("issuance failed: {0}")]
    Issuance(#[from] SignerError),
}

impl CapabilityError {
    /// Stable machine-readable code used in wire responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation-error",
            Self::MissingFields(_) => "missing-fields",
            Self::Configuration(_) => "configuration-error",
            Self::StaleCapability { .. } => "stale-capability",
            Self::SignatureRecovery(_) => "signature-recovery",
            Self::Issuance(_) => "issuance-error",
        }
    }
}

/// Errors from the issuer key.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Errors raised by a policy backend while loading or evaluating.
///
/// These never leave the policy engine; they are folded into a decision or a degraded status.
#[derive(Debug, Error)]
pub enum PolicyBackendError {
    #[error("failed to read policy rules: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse policy rules: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid rule #{index}: {message}")]
    InvalidRule { index: usize, message: String },

    #[error("{0}")]
    Evaluation(String),
}
