//! Bundled JSON rule-set backend.
//!
//! A rule file is `{"rules": [...]}` where each rule is tagged by `kind`. Rules are compiled
//! once at load time into typed [`Rule`] values; evaluation never parses.

use std::{collections::BTreeSet, path::Path};

use alloy_primitives::{Address, FixedBytes, B256, U256};
use canopy_attest::{
    validation::{parse_address, parse_bytes32, parse_quantity, parse_selector},
    CallIntent,
};
use serde::{Deserialize, Serialize};

use super::{BackendVerdict, PolicyBackend};
use crate::errors::PolicyBackendError;

/// Comparison operators for numeric checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
}

impl CompOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Eq => "==",
            Self::Neq => "!=",
        }
    }
}

fn compare(lhs: U256, op: CompOp, rhs: U256) -> bool {
    match op {
        CompOp::Lt => lhs < rhs,
        CompOp::Lte => lhs <= rhs,
        CompOp::Gt => lhs > rhs,
        CompOp::Gte => lhs >= rhs,
        CompOp::Eq => lhs == rhs,
        CompOp::Neq => lhs != rhs,
    }
}

/// On-disk rule file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSetConfig {
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// One rule as written in the file. Hex values stay strings until compiled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleConfig {
    ChainIdIn { chain_ids: Vec<u64> },
    TargetIn { targets: Vec<String> },
    SelectorIn { selectors: Vec<String> },
    SubjectNotIn { subjects: Vec<String> },
    PolicyIdIn { policy_ids: Vec<String> },
    ValueCmp { op: CompOp, rhs: String },
    ArgsLenLte { max: usize },
}

/// Compiled rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rule {
    ChainIdIn(BTreeSet<u64>),
    TargetIn(BTreeSet<Address>),
    SelectorIn(BTreeSet<FixedBytes<4>>),
    SubjectNotIn(BTreeSet<Address>),
    PolicyIdIn(BTreeSet<B256>),
    ValueCmp { op: CompOp, rhs: U256 },
    ArgsLenLte(usize),
}

impl Rule {
    fn compile(config: &RuleConfig) -> Result<Self, String> {
        let rule = match config {
            RuleConfig::ChainIdIn { chain_ids } => {
                Rule::ChainIdIn(chain_ids.iter().copied().collect())
            }
            RuleConfig::TargetIn { targets } => Rule::TargetIn(parse_all(targets, parse_address)?),
            RuleConfig::SelectorIn { selectors } => {
                Rule::SelectorIn(parse_all(selectors, parse_selector)?)
            }
            RuleConfig::SubjectNotIn { subjects } => {
                Rule::SubjectNotIn(parse_all(subjects, parse_address)?)
            }
            RuleConfig::PolicyIdIn { policy_ids } => {
                Rule::PolicyIdIn(parse_all(policy_ids, parse_bytes32)?)
            }
            RuleConfig::ValueCmp { op, rhs } => Rule::ValueCmp {
                op: *op,
                rhs: parse_quantity(rhs)?,
            },
            RuleConfig::ArgsLenLte { max } => Rule::ArgsLenLte(*max),
        };
        Ok(rule)
    }

    /// `None` when the intent satisfies the rule, otherwise the denial reason.
    fn check(&self, intent: &CallIntent) -> Option<String> {
        match self {
            Rule::ChainIdIn(allowed) => (!allowed.contains(&intent.chain_id()))
                .then(|| format!("chain-id-not-allowed: {}", intent.chain_id())),
            Rule::TargetIn(allowed) => (!allowed.contains(&intent.target()))
                .then(|| format!("target-not-allowed: {}", intent.target().to_checksum(None))),
            Rule::SelectorIn(allowed) => (!allowed.contains(&intent.selector()))
                .then(|| format!("selector-not-allowed: {}", intent.selector())),
            Rule::SubjectNotIn(blocked) => blocked
                .contains(&intent.subject())
                .then(|| format!("subject-blocked: {}", intent.subject().to_checksum(None))),
            Rule::PolicyIdIn(allowed) => (!allowed.contains(&intent.policy_id()))
                .then(|| format!("policy-id-not-allowed: {}", intent.policy_id())),
            Rule::ValueCmp { op, rhs } => (!compare(intent.value(), *op, *rhs)).then(|| {
                format!(
                    "value-out-of-bounds: {:#x} {} {:#x} does not hold",
                    intent.value(),
                    op.symbol(),
                    rhs
                )
            }),
            Rule::ArgsLenLte(max) => (intent.args().len() > *max)
                .then(|| format!("args-too-long: {} > {}", intent.args().len(), max)),
        }
    }
}

fn parse_all<T: Ord>(
    items: &[String],
    parse: impl Fn(&str) -> Result<T, String>,
) -> Result<BTreeSet<T>, String> {
    items
        .iter()
        .map(|s| parse(s).map_err(|e| format!("{s:?}: {e}")))
        .collect()
}

/// A compiled rule set. Every rule is evaluated; each violation contributes one reason.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn compile(config: &RuleSetConfig) -> Result<Self, PolicyBackendError> {
        let rules = config
            .rules
            .iter()
            .enumerate()
            .map(|(index, rule)| {
                Rule::compile(rule).map_err(|message| PolicyBackendError::InvalidRule { index, message })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn from_json(s: &str) -> Result<Self, PolicyBackendError> {
        let config: RuleSetConfig = serde_json::from_str(s)?;
        Self::compile(&config)
    }

    /// Read and compile a rule file.
    pub async fn load(path: &Path) -> Result<Self, PolicyBackendError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::from_json(&raw)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl PolicyBackend for RuleSet {
    fn name(&self) -> &str {
        "rule-set"
    }

    fn evaluate(&self, intent: &CallIntent) -> Result<BackendVerdict, PolicyBackendError> {
        let reasons: Vec<String> = self.rules.iter().filter_map(|r| r.check(intent)).collect();
        Ok(BackendVerdict {
            allow: reasons.is_empty(),
            reasons,
        })
    }
}
