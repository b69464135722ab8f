//! Advisory policy decision step.
//!
//! The engine is shared across requests. Its backend slot is written at most once
//! (`Unconfigured`/`Warming` -> `Ready` | `Degraded`); reads never block. Requests that
//! arrive before attachment completes observe `Warming` and are answered according to the
//! configured [`FailureMode`].

pub mod rules;

use std::{
    fmt,
    path::PathBuf,
    str::FromStr,
    sync::{
        atomic::{AtomicU64, Ordering},
        OnceLock,
    },
};

use canopy_attest::CallIntent;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use self::rules::{CompOp, Rule, RuleConfig, RuleSet, RuleSetConfig};
use crate::errors::PolicyBackendError;

/// Verdict returned by a backend: `allow` plus the reasons behind it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendVerdict {
    pub allow: bool,
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// A policy decision procedure.
///
/// Backends are attached once and then shared read-only between concurrent requests.
pub trait PolicyBackend: Send + Sync {
    /// Short label reported in the engine status.
    fn name(&self) -> &str;

    fn evaluate(&self, intent: &CallIntent) -> Result<BackendVerdict, PolicyBackendError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Allow,
    Deny,
}

/// Result of evaluating one intent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub outcome: Outcome,
    pub reasons: Vec<String>,
}

impl Decision {
    pub fn allow(reasons: Vec<String>) -> Self {
        Self {
            outcome: Outcome::Allow,
            reasons,
        }
    }

    pub fn deny(reasons: Vec<String>) -> Self {
        Self {
            outcome: Outcome::Deny,
            reasons,
        }
    }

    pub fn is_allow(&self) -> bool {
        self.outcome == Outcome::Allow
    }
}

/// How the engine answers when it cannot consult a backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    #[default]
    Open,
    Closed,
}

impl FromStr for FailureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(format!("unknown policy failure mode `{other}` (expected open|closed)")),
        }
    }
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Closed => "closed",
        })
    }
}

enum Attachment {
    Ready(Box<dyn PolicyBackend>),
    Failed(String),
}

/// Snapshot of the engine state, as reported by `health`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum PolicyStatus {
    Unconfigured,
    Warming,
    #[serde(rename_all = "camelCase")]
    Ready {
        backend: String,
        evaluation_errors: u64,
    },
    Degraded {
        error: String,
    },
}

impl PolicyStatus {
    fn label(&self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Warming => "warming",
            Self::Ready { .. } => "ready",
            Self::Degraded { .. } => "degraded",
        }
    }
}

pub struct PolicyEngine {
    source: Option<PathBuf>,
    failure_mode: FailureMode,
    attachment: OnceLock<Attachment>,
    evaluation_errors: AtomicU64,
}

impl fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("source", &self.source)
            .field("failure_mode", &self.failure_mode)
            .field("status", &self.status())
            .finish()
    }
}

impl PolicyEngine {
    /// An engine with no backend location. It allows everything, forever.
    pub fn unconfigured() -> Self {
        Self::new(None, FailureMode::Open)
    }

    /// An engine that will load its rules from `source` once [`init`](Self::init) runs.
    pub fn new(source: Option<PathBuf>, failure_mode: FailureMode) -> Self {
        Self {
            source,
            failure_mode,
            attachment: OnceLock::new(),
            evaluation_errors: AtomicU64::new(0),
        }
    }

    /// An engine with a backend already attached.
    pub fn with_backend(backend: Box<dyn PolicyBackend>, failure_mode: FailureMode) -> Self {
        let engine = Self::new(Some(PathBuf::from("<in-process>")), failure_mode);
        engine.attach(Ok(backend));
        engine
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }

    pub fn source(&self) -> Option<&PathBuf> {
        self.source.as_ref()
    }

    /// Load the configured rule file and attach it. Never fails; a load error degrades the
    /// engine. Calls after the first completed attachment are no-ops.
    pub async fn init(&self) {
        let Some(path) = self.source.as_ref() else {
            debug!("no policy rules configured, engine stays unconfigured");
            return;
        };
        if self.attachment.get().is_some() {
            return;
        }
        let loaded = RuleSet::load(path)
            .await
            .map(|rules| Box::new(rules) as Box<dyn PolicyBackend>);
        self.attach(loaded);
    }

    /// Record the outcome of a backend load. Returns `false` when the slot was already
    /// written or the engine is unconfigured.
    pub fn attach(&self, loaded: Result<Box<dyn PolicyBackend>, PolicyBackendError>) -> bool {
        if self.source.is_none() {
            return false;
        }
        let attachment = match loaded {
            Ok(backend) => Attachment::Ready(backend),
            Err(err) => Attachment::Failed(err.to_string()),
        };
        let label = match &attachment {
            Attachment::Ready(b) => format!("ready ({})", b.name()),
            Attachment::Failed(e) => format!("degraded: {e}"),
        };
        match self.attachment.set(attachment) {
            Ok(()) => {
                match self.status() {
                    PolicyStatus::Degraded { error } => {
                        warn!(source = ?self.source, %error, failure_mode = %self.failure_mode, "policy backend failed to load");
                    }
                    _ => info!(source = ?self.source, status = %label, "policy backend attached"),
                }
                true
            }
            Err(_) => {
                debug!(status = %label, "policy backend already attached, ignoring");
                false
            }
        }
    }

    pub fn status(&self) -> PolicyStatus {
        if self.source.is_none() {
            return PolicyStatus::Unconfigured;
        }
        match self.attachment.get() {
            None => PolicyStatus::Warming,
            Some(Attachment::Ready(backend)) => PolicyStatus::Ready {
                backend: backend.name().to_string(),
                evaluation_errors: self.evaluation_errors.load(Ordering::Relaxed),
            },
            Some(Attachment::Failed(error)) => PolicyStatus::Degraded {
                error: error.clone(),
            },
        }
    }

    /// Decide on `intent`. Backend errors are folded into the decision and never surfaced.
    pub fn evaluate(&self, intent: &CallIntent) -> Decision {
        if self.source.is_none() {
            return Decision::allow(Vec::new());
        }
        let backend = match self.attachment.get() {
            Some(Attachment::Ready(backend)) => backend,
            _ => return self.unavailable(),
        };
        match backend.evaluate(intent) {
            Ok(verdict) => {
                debug!(backend = backend.name(), allow = verdict.allow, reasons = ?verdict.reasons, "policy evaluated");
                if verdict.allow {
                    Decision::allow(verdict.reasons)
                } else {
                    Decision::deny(verdict.reasons)
                }
            }
            Err(err) => {
                self.evaluation_errors.fetch_add(1, Ordering::Relaxed);
                warn!(backend = backend.name(), error = %err, "policy evaluation failed");
                let reasons = vec![format!("policy-error: {err}")];
                match self.failure_mode {
                    FailureMode::Open => Decision::allow(reasons),
                    FailureMode::Closed => Decision::deny(reasons),
                }
            }
        }
    }

    fn unavailable(&self) -> Decision {
        match self.failure_mode {
            FailureMode::Open => Decision::allow(Vec::new()),
            FailureMode::Closed => Decision::deny(vec![format!(
                "policy-unavailable: {}",
                self.status().label()
            )]),
        }
    }
}
