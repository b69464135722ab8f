//! Policy-gated EIP-712 call capabilities.
//!
//! An issuer signs a `CompliantCall` binding a subject, a target call, a policy id, an expiry
//! and a nonce under the `Canopy` domain. Anyone holding the intent and the capability fields
//! can rebuild the payload and recover the signer. The same key can also export the call hash
//! as an EAS off-chain attestation under the separate `EAS Attestation` domain.
//!
//! [`service::CapabilityService`] exposes the operations over the JSON shapes in [`wire`].

pub mod clock;
pub mod codec;
pub mod errors;
pub mod exporter;
pub mod issuer;
pub mod policy;
pub mod service;
pub mod signer;
pub mod verifier;
pub mod wire;

pub use canopy_attest::{call_hash, CallHash, CallIntent, RawCallIntent};
pub use clock::{Clock, FixedClock, SystemClock};
pub use errors::{CapabilityError, PolicyBackendError, Result, SignerError};
pub use exporter::{AttestationExport, Exporter, RegistryConfig};
pub use issuer::{derive_nonce, CapabilityDefaults, IssuedCapability, Issuer, NonceMode};
pub use policy::{
    BackendVerdict, Decision, FailureMode, Outcome, PolicyBackend, PolicyEngine, PolicyStatus,
};
pub use service::{CapabilityService, ServiceConfig};
pub use signer::{LocalSigner, RecoverableSignature, Signer};
pub use verifier::{CapabilityClaim, Verifier};
