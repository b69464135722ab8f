use std::num::NonZeroU64;

use alloy_primitives::{Address, Bytes, FixedBytes, B256, U256};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::call_hash::args_hash;

/// Canonical description of an on-chain call a subject wishes to authorise.
///
/// Constructed either directly from typed values or by validating a [`RawCallIntent`]. The
/// type system carries the length invariants (20-byte addresses, 4-byte selector, 32-byte
/// policy id, 256-bit value), and `chain_id` is non-zero by construction.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallIntent {
    chain_id: NonZeroU64,
    subject: Address,
    target: Address,
    value: U256,
    selector: FixedBytes<4>,
    args: Bytes,
    policy_id: B256,
}

impl CallIntent {
    pub fn new(
        chain_id: NonZeroU64,
        subject: Address,
        target: Address,
        value: U256,
        selector: FixedBytes<4>,
        args: Bytes,
        policy_id: B256,
    ) -> Self {
        Self {
            chain_id,
            subject,
            target,
            value,
            selector,
            args,
            policy_id,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id.get()
    }

    /// The account (EOA) on whose behalf the call is made.
    pub fn subject(&self) -> Address {
        self.subject
    }

    /// The contract being called.
    pub fn target(&self) -> Address {
        self.target
    }

    /// Native value attached to the call, in wei.
    pub fn value(&self) -> U256 {
        self.value
    }

    pub fn selector(&self) -> FixedBytes<4> {
        self.selector
    }

    /// ABI-encoded call arguments, excluding the selector.
    pub fn args(&self) -> &[u8] {
        &self.args
    }

    pub fn args_hash(&self) -> B256 {
        args_hash(&self.args)
    }

    pub fn policy_id(&self) -> B256 {
        self.policy_id
    }

    /// Render the intent in its wire shape (camelCase keys, hex strings).
    ///
    /// This is the document handed to policy backends as evaluation input.
    pub fn to_json(&self) -> Value {
        json!({
            "chainId": self.chain_id.get(),
            "subject": self.subject.to_checksum(None),
            "target": self.target.to_checksum(None),
            "value": format!("{:#x}", self.value),
            "selector": format!("0x{}", hex::encode(self.selector)),
            "args": format!("0x{}", hex::encode(&self.args)),
            "policyId": format!("0x{}", hex::encode(self.policy_id)),
        })
    }
}

/// Untrusted intent as received from a transport.
///
/// Every field is kept as a raw JSON value so that validation can report all violations at
/// once instead of failing on the first type mismatch during deserialisation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCallIntent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<Value>,
}

impl From<&CallIntent> for RawCallIntent {
    fn from(intent: &CallIntent) -> Self {
        serde_json::from_value(intent.to_json()).unwrap_or_default()
    }
}
