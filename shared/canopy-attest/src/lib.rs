//! Call intent model and canonical call hash.
//!
//! A [`CallIntent`] describes one on-chain function call a subject wants authorised. Its
//! [`call_hash`] is the commitment every Canopy capability and attestation ultimately binds to,
//! so the encoding here must stay byte-identical to any on-chain verifier.

pub mod call_hash;
pub mod intent;
pub mod validation;

mod tests;

pub use call_hash::{args_hash, call_hash, CallHash};
pub use intent::{CallIntent, RawCallIntent};
pub use validation::{FieldViolation, ValidationError};
