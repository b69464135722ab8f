//! Maps JSON requests onto service operations.

use canopy_capability::{
    wire::{AttestRequest, ErrorResponse, EvaluateRequest, IssueRequest, VerifyRequest},
    CapabilityError, CapabilityService,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One request line for `serve`, tagged by operation name.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Request {
    Health,
    EvaluatePolicy(EvaluateRequest),
    IssueCapability(IssueRequest),
    VerifyCapability(VerifyRequest),
    ExportAttestation(AttestRequest),
}

/// Response document plus whether it reports a failure.
pub struct Reply {
    pub body: Value,
    pub is_error: bool,
}

impl Reply {
    fn ok<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(body) => Self {
                body,
                is_error: false,
            },
            Err(err) => Self::error(ErrorResponse::new("internal-error", err.to_string())),
        }
    }

    fn error(err: ErrorResponse) -> Self {
        Self {
            body: serde_json::to_value(&err).unwrap_or(Value::Null),
            is_error: true,
        }
    }

    fn from_result<T: Serialize>(result: Result<T, CapabilityError>) -> Self {
        match result {
            Ok(value) => Self::ok(&value),
            Err(err) => {
                tracing::debug!(code = err.code(), error = %err, "request failed");
                Self::error(ErrorResponse::from(&err))
            }
        }
    }

    /// A line that is not a well-formed request.
    pub fn malformed(err: &serde_json::Error) -> Self {
        Self::error(ErrorResponse::new(
            "validation-error",
            format!("malformed request: {err}"),
        ))
    }
}

pub fn handle(service: &CapabilityService, request: &Request) -> Reply {
    match request {
        Request::Health => Reply::ok(&service.health()),
        Request::EvaluatePolicy(req) => Reply::from_result(service.evaluate_policy(req)),
        Request::IssueCapability(req) => Reply::from_result(service.issue_capability(req)),
        Request::VerifyCapability(req) => Reply::from_result(service.verify_capability(req)),
        Request::ExportAttestation(req) => Reply::from_result(service.export_attestation(req)),
    }
}

/// Parse and answer one line of input.
pub fn handle_line(service: &CapabilityService, line: &str) -> Reply {
    match serde_json::from_str::<Request>(line) {
        Ok(request) => handle(service, &request),
        Err(err) => Reply::malformed(&err),
    }
}
