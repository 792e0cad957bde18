//! Gate configuration and policy profiles.
//!
//! Two behaviors are deliberately contradictory in the wild and are kept
//! as named, explicitly chosen policies instead of being reconciled:
//!
//! - `InfraFlakePolicy`: after the single reset-and-retry, a persisting
//!   infra-flake signature either blocks hard or is allowed with a loud
//!   warning. Never a silent allow.
//! - `ResultReusePolicy`: a prior successful test run is either never
//!   reused (state-file evidence is forgeable) or reused for up to one
//!   hour when the change set is covered by the tested set.
//!
//! Profiles bundle the two choices under a name; the built-in profiles
//! are `strict` (default) and `lenient`. A `.phasegate/config.toml` may
//! select a profile, define new ones, and override runner/UI rules. A
//! missing config file is not an error; an unparsable one is.

use crate::core::error::GateError;
use crate::core::state::STATE_DIR;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const CONFIG_FILE: &str = "config.toml";

pub const DEFAULT_TEST_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InfraFlakePolicy {
    /// Persisting infra flake blocks the action.
    HardBlock,
    /// Persisting infra flake allows the action with a loud warning —
    /// explicit risk acceptance, recorded in the audit trail.
    WarnAndAllow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultReusePolicy {
    /// Re-run tests unconditionally on every commit-like action.
    AlwaysRerun,
    /// Accept a successful run at most one hour old whose tested-file set
    /// covers the current UI change set.
    ReuseRecentSuccess,
}

/// The policy pair a profile resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPolicy {
    pub name: String,
    pub infra_flake: InfraFlakePolicy,
    pub result_reuse: ResultReusePolicy,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProfileConfig {
    pub infra_flake: Option<InfraFlakePolicy>,
    pub result_reuse: Option<ResultReusePolicy>,
}

/// One environment-reset step: a command plus the settle delay after it.
#[derive(Debug, Clone, Deserialize)]
pub struct ResetStep {
    pub command: Vec<String>,
    #[serde(default)]
    pub delay_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub command: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
    pub simulator_id: Option<String>,
    pub reset: Option<Vec<ResetStep>>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            command: "xcodebuild".to_string(),
            args: vec!["test".to_string()],
            timeout_secs: DEFAULT_TEST_TIMEOUT_SECS,
            simulator_id: None,
            reset: None,
        }
    }
}

impl RunnerConfig {
    /// Explicit reset steps win; otherwise derive the device-reset
    /// sequence (shutdown, settle, boot, settle) when a simulator is
    /// configured.
    pub fn reset_steps(&self) -> Vec<ResetStep> {
        if let Some(steps) = &self.reset {
            return steps.clone();
        }
        let Some(sim) = &self.simulator_id else {
            return Vec::new();
        };
        vec![
            ResetStep {
                command: vec![
                    "xcrun".to_string(),
                    "simctl".to_string(),
                    "shutdown".to_string(),
                    "all".to_string(),
                ],
                delay_secs: 2,
            },
            ResetStep {
                command: vec![
                    "xcrun".to_string(),
                    "simctl".to_string(),
                    "boot".to_string(),
                    sim.clone(),
                ],
                delay_secs: 5,
            },
        ]
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct UiRuleConfig {
    pub patterns: Option<Vec<String>>,
    pub exemptions: Option<Vec<String>>,
    pub uitest_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GateConfig {
    pub profile: Option<String>,
    pub profiles: BTreeMap<String, ProfileConfig>,
    pub runner: RunnerConfig,
    pub ui: UiRuleConfig,
}

impl GateConfig {
    pub fn load(root: &Path) -> Result<GateConfig, GateError> {
        let path = root.join(STATE_DIR).join(CONFIG_FILE);
        if !path.exists() {
            // No config = built-in defaults (not an error).
            return Ok(GateConfig::default());
        }
        let raw = fs::read_to_string(&path)?;
        toml::from_str(&raw).map_err(|e| GateError::ConfigError(e.to_string()))
    }

    /// Resolve the selected profile against built-ins and overrides.
    pub fn resolve_policy(&self) -> Result<ResolvedPolicy, GateError> {
        let name = self.profile.as_deref().unwrap_or("strict");

        let base = match name {
            "strict" => Some((InfraFlakePolicy::HardBlock, ResultReusePolicy::AlwaysRerun)),
            "lenient" => Some((
                InfraFlakePolicy::WarnAndAllow,
                ResultReusePolicy::ReuseRecentSuccess,
            )),
            _ => None,
        };
        let overrides = self.profiles.get(name);

        if base.is_none() && overrides.is_none() {
            return Err(GateError::ConfigError(format!(
                "unknown policy profile '{}' (built-in: strict, lenient)",
                name
            )));
        }

        // User-defined profiles start from strict: fail closed.
        let (infra_default, reuse_default) =
            base.unwrap_or((InfraFlakePolicy::HardBlock, ResultReusePolicy::AlwaysRerun));
        let overrides = overrides.cloned().unwrap_or_default();

        Ok(ResolvedPolicy {
            name: name.to_string(),
            infra_flake: overrides.infra_flake.unwrap_or(infra_default),
            result_reuse: overrides.result_reuse.unwrap_or(reuse_default),
        })
    }
}
