//! Issuer key and recoverable ECDSA signatures.
//!
//! The issuer key is an explicit object handed to the issuer and exporter by reference. It is
//! created once at startup and is read-only afterwards.

use std::fmt;

use alloy_primitives::{keccak256, Address, B256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

use crate::errors::SignerError;

/// Signs 32-byte digests on behalf of the issuer.
///
/// Implemented by [`LocalSigner`] for in-process keys; remote or hardware signers plug in here.
pub trait Signer: Send + Sync {
    /// Ethereum address of the signing key.
    fn address(&self) -> Address;

    /// Sign a prehashed digest (an EIP-712 signing hash).
    fn sign_hash(&self, hash: &B256) -> Result<RecoverableSignature, SignerError>;
}

/// In-memory secp256k1 key.
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl LocalSigner {
    /// Generate a fresh key from the OS RNG.
    pub fn random() -> Self {
        Self::from_key(SigningKey::random(&mut OsRng))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignerError> {
        let key = SigningKey::from_slice(bytes).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self::from_key(key))
    }

    /// Parse a 32-byte hex private key, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, SignerError> {
        let s = s.trim();
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() != 64 {
            return Err(SignerError::InvalidKey("expected 32 bytes of hex".to_string()));
        }
        let bytes = hex::decode(digits).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    fn from_key(key: SigningKey) -> Self {
        let address = address_of(key.verifying_key());
        Self { key, address }
    }
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .field("key", &"***SECRET***")
            .finish()
    }
}

impl Signer for LocalSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn sign_hash(&self, hash: &B256) -> Result<RecoverableSignature, SignerError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(hash.as_slice())
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        Ok(RecoverableSignature {
            signature,
            recovery_id,
        })
    }
}

/// Ethereum address = last 20 bytes of keccak256 over the uncompressed point (sans 0x04 tag).
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&digest[12..])
}

/// A 65-byte `r || s || v` signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoverableSignature {
    signature: Signature,
    recovery_id: RecoveryId,
}

impl RecoverableSignature {
    /// Parse `r || s || v`.
    ///
    /// `v` may be 27/28 (Ethereum convention) or 0/1 (raw recovery id); anything else is
    /// malformed. Zero or out-of-range `r`/`s` are rejected by the curve library.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() != 65 {
            return Err(format!("expected 65 signature bytes, got {}", bytes.len()));
        }
        let v = match bytes[64] {
            27 | 28 => bytes[64] - 27,
            0 | 1 => bytes[64],
            other => return Err(format!("unsupported recovery byte v={other}")),
        };
        let signature = Signature::from_slice(&bytes[..64]).map_err(|e| e.to_string())?;
        let recovery_id =
            RecoveryId::from_byte(v).ok_or_else(|| format!("unsupported recovery byte v={v}"))?;
        Ok(Self {
            signature,
            recovery_id,
        })
    }

    /// Parse a `0x`-prefixed hex signature.
    pub fn from_hex(s: &str) -> Result<Self, String> {
        let digits = s
            .strip_prefix("0x")
            .ok_or_else(|| "signature must be 0x-prefixed hex".to_string())?;
        let bytes = hex::decode(digits).map_err(|e| format!("malformed signature hex: {e}"))?;
        Self::from_bytes(&bytes)
    }

    /// `r || s || v` with `v` in {27, 28}.
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&self.signature.to_bytes());
        out[64] = 27 + self.recovery_id.to_byte();
        out
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    /// Recover the signer address for `hash`.
    ///
    /// High-`s` signatures fail here: the curve library only accepts normalised signatures.
    pub fn recover(&self, hash: &B256) -> Result<Address, String> {
        let key = VerifyingKey::recover_from_prehash(hash.as_slice(), &self.signature, self.recovery_id)
            .map_err(|e| e.to_string())?;
        Ok(address_of(&key))
    }
}

impl fmt::Display for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
