//! Validation of untrusted intents.
//!
//! This is the only gate in front of hashing and signing: anything that reaches the codec must
//! have passed through [`RawCallIntent::validate`].

use std::{fmt, num::NonZeroU64, sync::LazyLock};

use alloy_primitives::{Address, Bytes, FixedBytes, B256, U256};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::intent::{CallIntent, RawCallIntent};

static ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("address pattern"));
static QUANTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]+$").expect("quantity pattern"));
static SELECTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{8}$").expect("selector pattern"));
static BYTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x(?:[0-9a-fA-F]{2})*$").expect("bytes pattern"));
static BYTES32: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{64}$").expect("bytes32 pattern"));

/// One violated field of an intent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// A malformed intent or request, listing every violated field.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid request: {}", join(.violations))]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            violations: vec![FieldViolation {
                field,
                message: message.into(),
            }],
        }
    }

    /// Field names in the order they were reported.
    pub fn fields(&self) -> Vec<&'static str> {
        self.violations.iter().map(|v| v.field).collect()
    }
}

fn join(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Accumulates violations while each field is parsed independently.
#[derive(Default)]
struct Violations(Vec<FieldViolation>);

impl Violations {
    fn check<T>(&mut self, field: &'static str, parsed: Result<T, String>) -> Option<T> {
        match parsed {
            Ok(v) => Some(v),
            Err(message) => {
                self.0.push(FieldViolation { field, message });
                None
            }
        }
    }
}

impl RawCallIntent {
    /// Validate every field and build a [`CallIntent`], or report all violations at once.
    pub fn validate(&self) -> Result<CallIntent, ValidationError> {
        let mut errs = Violations::default();

        let chain_id = errs.check("chainId", parse_chain_id(self.chain_id.as_ref()));
        let subject = errs.check("subject", string_field(self.subject.as_ref(), parse_address));
        let target = errs.check("target", string_field(self.target.as_ref(), parse_address));
        let value = errs.check("value", string_field(self.value.as_ref(), parse_quantity));
        let selector = errs.check("selector", string_field(self.selector.as_ref(), parse_selector));
        let args = errs.check("args", string_field(self.args.as_ref(), parse_bytes));
        let policy_id = errs.check("policyId", string_field(self.policy_id.as_ref(), parse_bytes32));

        match (chain_id, subject, target, value, selector, args, policy_id) {
            (
                Some(chain_id),
                Some(subject),
                Some(target),
                Some(value),
                Some(selector),
                Some(args),
                Some(policy_id),
            ) if errs.0.is_empty() => Ok(CallIntent::new(
                chain_id, subject, target, value, selector, args, policy_id,
            )),
            _ => Err(ValidationError { violations: errs.0 }),
        }
    }
}

fn required(raw: Option<&Value>) -> Result<&Value, String> {
    match raw {
        None | Some(Value::Null) => Err("missing".to_string()),
        Some(v) => Ok(v),
    }
}

/// Apply a string parser to a required JSON string field.
fn string_field<T>(
    raw: Option<&Value>,
    parse: impl FnOnce(&str) -> Result<T, String>,
) -> Result<T, String> {
    let s = required(raw)?
        .as_str()
        .ok_or_else(|| "must be a string".to_string())?;
    parse(s)
}

fn decode_hex(s: &str) -> Result<Vec<u8>, String> {
    hex::decode(&s[2..]).map_err(|e| format!("malformed hex: {e}"))
}

fn parse_chain_id(raw: Option<&Value>) -> Result<NonZeroU64, String> {
    required(raw)?
        .as_u64()
        .and_then(NonZeroU64::new)
        .ok_or_else(|| "must be a positive integer".to_string())
}

/// Parse a `0x`-prefixed 20-byte address. Checksums are not enforced.
pub fn parse_address(s: &str) -> Result<Address, String> {
    if !ADDRESS.is_match(s) {
        return Err("must be a 0x-prefixed 20-byte hex address".to_string());
    }
    Ok(Address::from_slice(&decode_hex(s)?))
}

/// Parse a `0x`-prefixed hex quantity of at most 256 bits.
pub fn parse_quantity(s: &str) -> Result<U256, String> {
    if !QUANTITY.is_match(s) {
        return Err("must be a 0x-prefixed hex quantity".to_string());
    }
    U256::from_str_radix(&s[2..], 16).map_err(|_| "exceeds 256 bits".to_string())
}

/// Parse a `0x`-prefixed 4-byte function selector.
pub fn parse_selector(s: &str) -> Result<FixedBytes<4>, String> {
    if !SELECTOR.is_match(s) {
        return Err("must be a 0x-prefixed 4-byte hex selector".to_string());
    }
    Ok(FixedBytes::from_slice(&decode_hex(s)?))
}

/// Parse `0x`-prefixed bytes of any even length, including the empty `0x`.
pub fn parse_bytes(s: &str) -> Result<Bytes, String> {
    if !BYTES.is_match(s) {
        return Err("must be 0x-prefixed hex with an even number of digits".to_string());
    }
    Ok(Bytes::from(decode_hex(s)?))
}

/// Parse a `0x`-prefixed 32-byte identifier.
pub fn parse_bytes32(s: &str) -> Result<B256, String> {
    if !BYTES32.is_match(s) {
        return Err("must be a 0x-prefixed 32-byte hex identifier".to_string());
    }
    Ok(B256::from_slice(&decode_hex(s)?))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn raw(v: Value) -> RawCallIntent {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn reports_every_violated_field() {
        let err = raw(json!({
            "chainId": 0,
            "subject": "0x1234",
            "target": "0x0000000000000000000000000000000000000002",
            "value": "12",
            "selector": "0xabcdef",
            "args": "0xabc",
            "policyId": "0x01"
        }))
        .validate()
        .unwrap_err();

        assert_eq!(
            err.fields(),
            vec!["chainId", "subject", "value", "selector", "args", "policyId"]
        );
    }

    #[test]
    fn missing_fields_are_violations() {
        let err = RawCallIntent::default().validate().unwrap_err();
        assert_eq!(err.violations.len(), 7);
        assert!(err.violations.iter().all(|v| v.message == "missing"));
    }

    #[test]
    fn rejects_wrong_json_types() {
        let err = raw(json!({
            "chainId": "1",
            "subject": 1,
            "target": null,
            "value": "0x0",
            "selector": "0xabcdef01",
            "args": "0x",
            "policyId": "0x0000000000000000000000000000000000000000000000000000000000000001"
        }))
        .validate()
        .unwrap_err();
        assert_eq!(err.fields(), vec!["chainId", "subject", "target"]);
        assert_eq!(err.violations[1].message, "must be a string");
        assert_eq!(err.violations[2].message, "missing");
    }

    #[test]
    fn rejects_negative_and_fractional_chain_ids() {
        assert!(parse_chain_id(Some(&json!(-1))).is_err());
        assert!(parse_chain_id(Some(&json!(1.5))).is_err());
        assert_eq!(parse_chain_id(Some(&json!(42161))).unwrap().get(), 42161);
    }

    #[test]
    fn value_must_fit_in_256_bits() {
        let max = format!("0x{}", "f".repeat(64));
        assert_eq!(parse_quantity(&max).unwrap(), U256::MAX);

        let over = format!("0x1{}", "0".repeat(64));
        assert_eq!(parse_quantity(&over).unwrap_err(), "exceeds 256 bits");

        let padded = format!("0x{}1", "0".repeat(80));
        assert_eq!(parse_quantity(&padded).unwrap(), U256::from(1u64));
    }

    #[test]
    fn accepts_mixed_case_addresses() {
        let addr = parse_address("0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf").unwrap();
        assert_eq!(addr.to_checksum(None), "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf");
    }

    #[test]
    fn bytes_allow_empty_but_not_odd_length() {
        assert!(parse_bytes("0x").unwrap().is_empty());
        assert_eq!(parse_bytes("0xdead").unwrap().len(), 2);
        assert!(parse_bytes("0xdea").is_err());
        assert!(parse_bytes("dead").is_err());
    }

    #[test]
    fn error_message_lists_fields() {
        let err = ValidationError::single("verifier", "missing");
        assert_eq!(err.to_string(), "invalid request: verifier: missing");
    }
}
