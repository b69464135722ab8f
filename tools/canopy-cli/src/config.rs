use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use canopy_attest::validation::{parse_address, parse_bytes32};
use canopy_capability::{
    FailureMode, LocalSigner, NonceMode, PolicyEngine, RegistryConfig, ServiceConfig, Signer,
};
use clap::Args;
use tracing::warn;

/// Service configuration. Every flag falls back to the environment (and `.env`).
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Issuer secp256k1 private key (32 bytes hex). A fresh ephemeral key is used when unset.
    #[arg(long, env = "ISSUER_ECDSA_PRIVATE_KEY", hide_env_values = true, global = true)]
    pub issuer_key: Option<String>,

    /// Path to a JSON rule set. When unset the policy engine allows everything.
    #[arg(long, env = "POLICY_RULES_PATH", global = true)]
    pub policy_rules: Option<PathBuf>,

    /// Decision when the policy backend is warming, degraded or erroring (open|closed).
    #[arg(long, env = "POLICY_FAILURE_MODE", default_value = "open", global = true)]
    pub policy_failure_mode: FailureMode,

    /// Refuse to sign from `evaluatePolicy` when the decision is deny.
    #[arg(long, env = "STRICT_ISSUANCE", global = true)]
    pub strict_issuance: bool,

    /// Nonce default when the caller supplies none (derived|required).
    #[arg(long, env = "NONCE_MODE", default_value = "derived", global = true)]
    pub nonce_mode: NonceMode,

    /// Default capability lifetime in seconds.
    #[arg(long, env = "CAPABILITY_TTL_SECS", default_value_t = 60, global = true)]
    pub ttl_secs: u64,

    /// Chain id of the attestation registry.
    #[arg(long, env = "EAS_CHAIN_ID", global = true)]
    pub eas_chain_id: Option<u64>,

    /// Attestation registry contract address.
    #[arg(long, env = "EAS_REGISTRY_ADDRESS", global = true)]
    pub eas_registry: Option<String>,

    /// Attestation schema id (bytes32).
    #[arg(long, env = "EAS_SCHEMA_ID", global = true)]
    pub eas_schema_id: Option<String>,
}

impl ConfigArgs {
    /// The issuer key is the only configuration that can stop the process.
    pub fn signer(&self) -> Result<Arc<dyn Signer>> {
        let signer = match &self.issuer_key {
            Some(key) => LocalSigner::from_hex(key).context("ISSUER_ECDSA_PRIVATE_KEY is unusable")?,
            None => {
                let signer = LocalSigner::random();
                warn!(issuer = %signer.address(), "no issuer key configured, using an ephemeral key");
                signer
            }
        };
        Ok(Arc::new(signer))
    }

    pub fn policy_engine(&self) -> PolicyEngine {
        PolicyEngine::new(self.policy_rules.clone(), self.policy_failure_mode)
    }

    /// Registry settings, or `None` (with a warning) when incomplete or malformed.
    pub fn registry(&self) -> Option<RegistryConfig> {
        match (&self.eas_chain_id, &self.eas_registry, &self.eas_schema_id) {
            (None, None, None) => None,
            (Some(chain_id), Some(registry), Some(schema_id)) => {
                match (parse_address(registry), parse_bytes32(schema_id)) {
                    (Ok(registry), Ok(schema_id)) => Some(RegistryConfig {
                        chain_id: *chain_id,
                        registry,
                        schema_id,
                    }),
                    (registry, schema_id) => {
                        warn!(
                            registry = ?registry.err(),
                            schema_id = ?schema_id.err(),
                            "malformed attestation registry settings, attestation export disabled"
                        );
                        None
                    }
                }
            }
            _ => {
                warn!("EAS_CHAIN_ID, EAS_REGISTRY_ADDRESS and EAS_SCHEMA_ID must be set together, attestation export disabled");
                None
            }
        }
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            ttl_secs: self.ttl_secs,
            nonce_mode: self.nonce_mode,
            strict_issuance: self.strict_issuance,
            registry: self.registry(),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        config: ConfigArgs,
    }

    fn parse(args: &[&str]) -> ConfigArgs {
        TestCli::try_parse_from(std::iter::once("canopy").chain(args.iter().copied()))
            .unwrap()
            .config
    }

    #[test]
    fn flags_parse() {
        let config = parse(&[
            "--issuer-key",
            "0x0000000000000000000000000000000000000000000000000000000000000001",
            "--policy-failure-mode",
            "closed",
            "--nonce-mode",
            "required",
            "--ttl-secs",
            "120",
            "--strict-issuance",
        ]);
        assert_eq!(config.policy_failure_mode, FailureMode::Closed);
        assert_eq!(config.nonce_mode, NonceMode::Required);
        assert!(config.strict_issuance);

        let service = config.service_config();
        assert_eq!(service.ttl_secs, 120);
        assert!(service.registry.is_none());
        assert_eq!(
            config.signer().unwrap().address().to_checksum(None),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        );
    }

    #[test]
    fn bad_issuer_key_is_fatal() {
        let config = parse(&["--issuer-key", "0x1234"]);
        assert!(config.signer().is_err());
    }

    #[test]
    fn registry_needs_all_three_settings() {
        let partial = parse(&["--eas-chain-id", "1"]);
        assert!(partial.registry().is_none());

        let full = parse(&[
            "--eas-chain-id",
            "11155111",
            "--eas-registry",
            "0xC2679fBD37d54388Ce493F1DB75320D236e1815e",
            "--eas-schema-id",
            "0x00000000000000000000000000000000000000000000000000000000000000aa",
        ]);
        let registry = full.registry().unwrap();
        assert_eq!(registry.chain_id, 11_155_111);

        let malformed = parse(&[
            "--eas-chain-id",
            "1",
            "--eas-registry",
            "0x12",
            "--eas-schema-id",
            "0x00",
        ]);
        assert!(malformed.registry().is_none());
    }
}
