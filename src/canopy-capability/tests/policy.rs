use std::{io::Write, num::NonZeroU64, path::PathBuf};

use alloy_primitives::{address, b256, fixed_bytes, Bytes, U256};
use canopy_capability::{
    policy::RuleSet, BackendVerdict, CallIntent, Decision, FailureMode, Outcome, PolicyBackend,
    PolicyBackendError, PolicyEngine, PolicyStatus,
};
use tempfile::NamedTempFile;

fn sample_intent() -> CallIntent {
    CallIntent::new(
        NonZeroU64::new(1).unwrap(),
        address!("0000000000000000000000000000000000000001"),
        address!("0000000000000000000000000000000000000002"),
        U256::ZERO,
        fixed_bytes!("abcdef01"),
        Bytes::new(),
        b256!("0000000000000000000000000000000000000000000000000000000000000001"),
    )
}

fn rules_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

struct Failing;

impl PolicyBackend for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn evaluate(&self, _intent: &CallIntent) -> Result<BackendVerdict, PolicyBackendError> {
        Err(PolicyBackendError::Evaluation("backend exploded".to_string()))
    }
}

struct Fixed(BackendVerdict);

impl PolicyBackend for Fixed {
    fn name(&self) -> &str {
        "fixed"
    }

    fn evaluate(&self, _intent: &CallIntent) -> Result<BackendVerdict, PolicyBackendError> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn unconfigured_always_allows() {
    for mode in [FailureMode::Open, FailureMode::Closed] {
        let engine = PolicyEngine::new(None, mode);
        engine.init().await;
        assert_eq!(engine.status(), PolicyStatus::Unconfigured);
        assert_eq!(engine.evaluate(&sample_intent()), Decision::allow(Vec::new()));
    }
}

#[test]
fn warming_fails_open_by_default() {
    let engine = PolicyEngine::new(Some(PathBuf::from("rules.json")), FailureMode::Open);
    assert_eq!(engine.status(), PolicyStatus::Warming);
    assert_eq!(engine.evaluate(&sample_intent()), Decision::allow(Vec::new()));
}

#[test]
fn warming_fails_closed_when_configured() {
    let engine = PolicyEngine::new(Some(PathBuf::from("rules.json")), FailureMode::Closed);
    let decision = engine.evaluate(&sample_intent());
    assert_eq!(decision.outcome, Outcome::Deny);
    assert_eq!(decision.reasons, vec!["policy-unavailable: warming".to_string()]);
}

#[tokio::test]
async fn missing_rule_file_degrades() {
    let dir = tempfile::tempdir().unwrap();
    let engine = PolicyEngine::new(Some(dir.path().join("absent.json")), FailureMode::Open);
    engine.init().await;

    match engine.status() {
        PolicyStatus::Degraded { error } => assert!(error.contains("failed to read"), "{error}"),
        other => panic!("expected degraded, got {other:?}"),
    }
    assert_eq!(engine.evaluate(&sample_intent()), Decision::allow(Vec::new()));
}

#[tokio::test]
async fn invalid_rule_file_degrades_and_closed_mode_denies() {
    let file = rules_file(r#"{"rules": [{"kind": "target_in", "targets": ["0xnope"]}]}"#);
    let engine = PolicyEngine::new(Some(file.path().to_path_buf()), FailureMode::Closed);
    engine.init().await;

    match engine.status() {
        PolicyStatus::Degraded { error } => assert!(error.contains("invalid rule #0"), "{error}"),
        other => panic!("expected degraded, got {other:?}"),
    }
    let decision = engine.evaluate(&sample_intent());
    assert_eq!(decision.outcome, Outcome::Deny);
    assert_eq!(decision.reasons, vec!["policy-unavailable: degraded".to_string()]);
}

#[tokio::test]
async fn loaded_rules_decide() {
    let file = rules_file(
        r#"{"rules": [
            {"kind": "chain_id_in", "chain_ids": [1]},
            {"kind": "target_in", "targets": ["0x00000000000000000000000000000000000000ff"]},
            {"kind": "subject_not_in", "subjects": ["0x0000000000000000000000000000000000000001"]}
        ]}"#,
    );
    let engine = PolicyEngine::new(Some(file.path().to_path_buf()), FailureMode::Open);
    engine.init().await;

    assert_eq!(
        engine.status(),
        PolicyStatus::Ready {
            backend: "rule-set".to_string(),
            evaluation_errors: 0
        }
    );
    let decision = engine.evaluate(&sample_intent());
    assert_eq!(decision.outcome, Outcome::Deny);
    assert_eq!(decision.reasons.len(), 2);
    assert!(decision.reasons[0].starts_with("target-not-allowed"));
    assert!(decision.reasons[1].starts_with("subject-blocked"));
}

#[tokio::test]
async fn empty_rule_file_allows() {
    let file = rules_file(r#"{"rules": []}"#);
    let engine = PolicyEngine::new(Some(file.path().to_path_buf()), FailureMode::Closed);
    engine.init().await;
    assert_eq!(engine.evaluate(&sample_intent()), Decision::allow(Vec::new()));
}

#[test]
fn backend_errors_fail_open_with_reason() {
    let engine = PolicyEngine::with_backend(Box::new(Failing), FailureMode::Open);

    let decision = engine.evaluate(&sample_intent());
    assert_eq!(decision.outcome, Outcome::Allow);
    assert_eq!(decision.reasons, vec!["policy-error: backend exploded".to_string()]);

    engine.evaluate(&sample_intent());
    assert_eq!(
        engine.status(),
        PolicyStatus::Ready {
            backend: "failing".to_string(),
            evaluation_errors: 2
        }
    );
}

#[test]
fn backend_errors_fail_closed_when_configured() {
    let engine = PolicyEngine::with_backend(Box::new(Failing), FailureMode::Closed);
    let decision = engine.evaluate(&sample_intent());
    assert_eq!(decision.outcome, Outcome::Deny);
    assert_eq!(decision.reasons, vec!["policy-error: backend exploded".to_string()]);
}

#[test]
fn backend_reasons_pass_through() {
    let engine = PolicyEngine::with_backend(
        Box::new(Fixed(BackendVerdict {
            allow: true,
            reasons: vec!["low-risk".to_string()],
        })),
        FailureMode::Open,
    );
    assert_eq!(
        engine.evaluate(&sample_intent()),
        Decision::allow(vec!["low-risk".to_string()])
    );
}

#[tokio::test]
async fn attachment_is_write_once() {
    let file = rules_file(r#"{"rules": [{"kind": "chain_id_in", "chain_ids": [10]}]}"#);
    let engine = PolicyEngine::new(Some(file.path().to_path_buf()), FailureMode::Open);

    assert!(engine.attach(Err(PolicyBackendError::Evaluation("boom".to_string()))));
    assert!(!engine.attach(Ok(Box::new(RuleSet::default()))));
    engine.init().await;

    assert_eq!(
        engine.status(),
        PolicyStatus::Degraded {
            error: "boom".to_string()
        }
    );
}
