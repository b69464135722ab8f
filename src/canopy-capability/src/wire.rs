//! JSON request and response shapes for the transport collaborator.
//!
//! Requests keep every field as a raw [`Value`] and are validated in one pass so that all
//! malformed fields are reported together. Responses render hashes and signatures as
//! `0x`-prefixed lowercase hex, addresses EIP-55 checksummed, and nonces as minimal hex.

use alloy_primitives::{Address, U256};
use canopy_attest::{
    validation::parse_address, CallIntent, FieldViolation, RawCallIntent, ValidationError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    codec::{
        attestation::{ATTESTATION_DOMAIN_NAME, ATTESTATION_DOMAIN_VERSION, ATTEST_FIELDS},
        DomainJson, TypedField,
    },
    errors::CapabilityError,
    exporter::AttestationExport,
    issuer::IssuedCapability,
    policy::{Decision, PolicyStatus},
    verifier::CapabilityClaim,
};

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

    fn intent(&mut self, raw: Option<&RawCallIntent>) -> Option<CallIntent> {
        let Some(raw) = raw else {
            self.0.push(FieldViolation {
                field: "txIntent",
                message: "missing".to_string(),
            });
            return None;
        };
        match raw.validate() {
            Ok(intent) => Some(intent),
            Err(err) => {
                self.0.extend(err.violations);
                None
            }
        }
    }

    fn finish<T>(self, value: Option<T>) -> Result<T, ValidationError> {
        match value {
            Some(v) if self.0.is_empty() => Ok(v),
            _ => Err(ValidationError { violations: self.0 }),
        }
    }
}

fn present(raw: Option<&Value>) -> Option<&Value> {
    raw.filter(|v| !v.is_null())
}

fn parse_wire_address(raw: &Value) -> Result<Address, String> {
    raw.as_str()
        .ok_or_else(|| "must be a string".to_string())
        .and_then(parse_address)
}

/// Nonce: JSON integer, decimal string, or `0x` hex string of at most 256 bits.
pub fn parse_nonce(raw: &Value) -> Result<U256, String> {
    match raw {
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| "must be a non-negative integer".to_string()),
        Value::String(s) => {
            if let Some(digits) = s.strip_prefix("0x") {
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err("must be 0x-prefixed hex".to_string());
                }
                U256::from_str_radix(digits, 16).map_err(|_| "exceeds 256 bits".to_string())
            } else {
                if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                    return Err("must be a decimal or 0x-prefixed hex string".to_string());
                }
                U256::from_str_radix(s, 10).map_err(|_| "exceeds 256 bits".to_string())
            }
        }
        _ => Err("must be an integer or a string".to_string()),
    }
}

/// Expiry: JSON integer or decimal string, in Unix seconds.
pub fn parse_expiry(raw: &Value) -> Result<u64, String> {
    match raw {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| "must be a non-negative integer of at most 64 bits".to_string()),
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => s
            .parse::<u64>()
            .map_err(|_| "exceeds 64 bits".to_string()),
        Value::String(_) => Err("must be a decimal string".to_string()),
        _ => Err("must be an integer or a decimal string".to_string()),
    }
}

fn format_nonce(nonce: U256) -> String {
    format!("{nonce:#x}")
}

/// `{txIntent}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_intent: Option<RawCallIntent>,
}

impl EvaluateRequest {
    pub fn parse(&self) -> Result<CallIntent, ValidationError> {
        let mut errs = Violations::default();
        let intent = errs.intent(self.tx_intent.as_ref());
        errs.finish(intent)
    }
}

/// `{txIntent, verifier, expiry?, nonce?}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_intent: Option<RawCallIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifier: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<Value>,
}

/// Typed issuance inputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssueParams {
    pub intent: CallIntent,
    pub verifier: Address,
    pub expiry: Option<u64>,
    pub nonce: Option<U256>,
}

impl IssueRequest {
    pub fn parse(&self) -> Result<IssueParams, ValidationError> {
        let mut errs = Violations::default();
        let intent = errs.intent(self.tx_intent.as_ref());
        let verifier = match present(self.verifier.as_ref()) {
            Some(v) => errs.check("verifier", parse_wire_address(v)),
            None => errs.check("verifier", Err("missing".to_string())),
        };
        let expiry = present(self.expiry.as_ref()).and_then(|v| errs.check("expiry", parse_expiry(v)));
        let nonce = present(self.nonce.as_ref()).and_then(|v| errs.check("nonce", parse_nonce(v)));

        let params = intent.zip(verifier).map(|(intent, verifier)| IssueParams {
            intent,
            verifier,
            expiry,
            nonce,
        });
        errs.finish(params)
    }
}

/// `{txIntent, verifier, capabilitySig, expiry, nonce}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_intent: Option<RawCallIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifier: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability_sig: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<Value>,
}

impl VerifyRequest {
    /// Validate the fields that are present. Absent capability fields stay `None` so the
    /// verifier can report them as missing.
    pub fn parse(&self) -> Result<(CallIntent, CapabilityClaim), ValidationError> {
        let mut errs = Violations::default();
        let intent = errs.intent(self.tx_intent.as_ref());
        let verifier =
            present(self.verifier.as_ref()).and_then(|v| errs.check("verifier", parse_wire_address(v)));
        let signature = present(self.capability_sig.as_ref()).and_then(|v| {
            errs.check(
                "capabilitySig",
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| "must be a string".to_string()),
            )
        });
        let expiry = present(self.expiry.as_ref()).and_then(|v| errs.check("expiry", parse_expiry(v)));
        let nonce = present(self.nonce.as_ref()).and_then(|v| errs.check("nonce", parse_nonce(v)));

        let parsed = intent.map(|intent| {
            (
                intent,
                CapabilityClaim {
                    verifier,
                    signature,
                    expiry,
                    nonce,
                },
            )
        });
        errs.finish(parsed)
    }
}

/// `{txIntent, expiry?, nonce?}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_intent: Option<RawCallIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<Value>,
}

impl AttestRequest {
    pub fn parse(&self) -> Result<(CallIntent, Option<u64>, Option<U256>), ValidationError> {
        let mut errs = Violations::default();
        let intent = errs.intent(self.tx_intent.as_ref());
        let expiry = present(self.expiry.as_ref()).and_then(|v| errs.check("expiry", parse_expiry(v)));
        let nonce = present(self.nonce.as_ref()).and_then(|v| errs.check("nonce", parse_nonce(v)));
        errs.finish(intent.map(|intent| (intent, expiry, nonce)))
    }
}

/// Capability fields returned alongside a policy decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifacts {
    pub call_hash: String,
    pub expiry: u64,
    pub nonce: String,
    pub capability_sig: String,
}

impl From<&IssuedCapability> for Artifacts {
    fn from(issued: &IssuedCapability) -> Self {
        Self {
            call_hash: issued.call_hash.to_string(),
            expiry: issued.expiry,
            nonce: format_nonce(issued.nonce),
            capability_sig: issued.signature.to_hex(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluateResponse {
    pub decision: Decision,
    /// `null` when strict issuance refused to sign.
    pub artifacts: Option<Artifacts>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueResponse {
    pub capability_sig: String,
    pub call_hash: String,
    pub issuer: String,
    pub expiry: u64,
    pub nonce: String,
}

impl From<&IssuedCapability> for IssueResponse {
    fn from(issued: &IssuedCapability) -> Self {
        Self {
            capability_sig: issued.signature.to_hex(),
            call_hash: issued.call_hash.to_string(),
            issuer: issued.issuer.to_checksum(None),
            expiry: issued.expiry,
            nonce: format_nonce(issued.nonce),
        }
    }
}

/// Verification outcome. Stale, missing and malformed inputs are reported as `valid: false`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovered: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl VerifyResponse {
    pub fn valid(recovered: Address) -> Self {
        Self {
            valid: true,
            recovered: Some(recovered.to_checksum(None)),
            reason: None,
            code: None,
        }
    }

    pub fn invalid(err: &CapabilityError) -> Self {
        Self {
            valid: false,
            recovered: None,
            reason: Some(err.to_string()),
            code: Some(err.code().to_string()),
        }
    }
}

/// `Attest` message with every field rendered as a string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestMessageJson {
    pub schema: String,
    pub recipient: String,
    pub time: String,
    pub expiration_time: String,
    pub revocable: String,
    #[serde(rename = "refUID")]
    pub ref_uid: String,
    pub data: String,
    pub salt: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationResponse {
    pub domain: DomainJson,
    pub struct_type: Vec<TypedField>,
    pub message: AttestMessageJson,
    pub signature: String,
}

impl From<&AttestationExport> for AttestationResponse {
    fn from(export: &AttestationExport) -> Self {
        let m = &export.message;
        Self {
            domain: DomainJson::new(
                ATTESTATION_DOMAIN_NAME,
                ATTESTATION_DOMAIN_VERSION,
                export.chain_id,
                &export.domain,
            ),
            struct_type: ATTEST_FIELDS.to_vec(),
            message: AttestMessageJson {
                schema: m.schema.to_string(),
                recipient: m.recipient.to_checksum(None),
                time: m.time.to_string(),
                expiration_time: m.expirationTime.to_string(),
                revocable: m.revocable.to_string(),
                ref_uid: m.refUID.to_string(),
                data: format!("0x{}", hex::encode(&m.data)),
                salt: m.salt.to_string(),
            },
            signature: export.signature.to_hex(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub issuer: String,
    pub policy: PolicyStatus,
}

/// `{"error": {code, message, violations?}}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<FieldViolation>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
                violations: Vec::new(),
            },
        }
    }
}

impl From<&CapabilityError> for ErrorResponse {
    fn from(err: &CapabilityError) -> Self {
        let violations = match err {
            CapabilityError::Validation(v) => v.violations.clone(),
            _ => Vec::new(),
        };
        Self {
            error: ErrorBody {
                code: err.code().to_string(),
                message: err.to_string(),
                violations,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample_intent_json() -> Value {
        json!({
            "chainId": 1,
            "subject": "0x0000000000000000000000000000000000000001",
            "target": "0x0000000000000000000000000000000000000002",
            "value": "0x0",
            "selector": "0xabcdef01",
            "args": "0x",
            "policyId": "0x0000000000000000000000000000000000000000000000000000000000000001"
        })
    }

    #[test]
    fn nonce_accepts_three_shapes() {
        assert_eq!(parse_nonce(&json!(42)).unwrap(), U256::from(42u64));
        assert_eq!(parse_nonce(&json!("42")).unwrap(), U256::from(42u64));
        assert_eq!(parse_nonce(&json!("0x2a")).unwrap(), U256::from(42u64));
        assert_eq!(
            parse_nonce(&json!(format!("0x{}", "f".repeat(64)))).unwrap(),
            U256::MAX
        );
        assert!(parse_nonce(&json!(format!("0x1{}", "0".repeat(64)))).is_err());
        assert!(parse_nonce(&json!(-1)).is_err());
        assert!(parse_nonce(&json!("0x")).is_err());
        assert!(parse_nonce(&json!("12ab")).is_err());
        assert!(parse_nonce(&json!(true)).is_err());
    }

    #[test]
    fn expiry_accepts_integer_or_decimal_string() {
        assert_eq!(parse_expiry(&json!(1_700_000_060u64)).unwrap(), 1_700_000_060);
        assert_eq!(parse_expiry(&json!("1700000060")).unwrap(), 1_700_000_060);
        assert!(parse_expiry(&json!("0x10")).is_err());
        assert!(parse_expiry(&json!(1.5)).is_err());
        assert!(parse_expiry(&json!("18446744073709551616")).is_err());
    }

    #[test]
    fn issue_request_merges_intent_and_field_violations() {
        let mut intent = sample_intent_json();
        intent["selector"] = json!("0x12");
        let req: IssueRequest = serde_json::from_value(json!({
            "txIntent": intent,
            "expiry": "soon",
        }))
        .unwrap();
        let err = req.parse().unwrap_err();
        assert_eq!(err.fields(), vec!["selector", "verifier", "expiry"]);
    }

    #[test]
    fn missing_intent_is_a_violation() {
        let err = EvaluateRequest::default().parse().unwrap_err();
        assert_eq!(err.fields(), vec!["txIntent"]);
    }

    #[test]
    fn verify_request_leaves_absent_fields_empty() {
        let req: VerifyRequest = serde_json::from_value(json!({
            "txIntent": sample_intent_json(),
            "verifier": "0x0000000000000000000000000000000000000002",
            "expiry": null,
        }))
        .unwrap();
        let (_, claim) = req.parse().unwrap();
        assert_eq!(claim.missing_fields(), vec!["capabilitySig", "expiry", "nonce"]);
    }

    #[test]
    fn error_response_carries_violations() {
        let err = CapabilityError::from(ValidationError::single("nonce", "missing"));
        let rendered = serde_json::to_value(ErrorResponse::from(&err)).unwrap();
        assert_eq!(rendered["error"]["code"], "validation-error");
        assert_eq!(rendered["error"]["violations"][0]["field"], "nonce");

        let rendered =
            serde_json::to_value(ErrorResponse::from(&CapabilityError::Configuration("x".into())))
                .unwrap();
        assert!(rendered["error"].get("violations").is_none());
    }
}
