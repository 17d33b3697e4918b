//! Common types for randtest-e2e.
//!
//! Harness configuration (YAML), the captured environment, and per-case
//! results.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::battery::DieharderConfig;
use crate::error::Result;
use crate::significance::Significance;

/// dieharder wants 20M 4-byte (int) data points.
pub const DEFAULT_SAMPLE_SIZE: usize = 4 * 20_000_000;

pub const DEFAULT_FLAKY_ATTEMPTS: u32 = 4;

/// An environment variable that must hold a particular value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvMarker {
    pub var: String,
    pub value: String,
}

impl Default for EnvMarker {
    fn default() -> Self {
        Self {
            var: "CI".to_string(),
            value: "RANDTEST-CI".to_string(),
        }
    }
}

/// Harness configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Level shared by both tests.
    pub significance: Significance,
    /// Bytes per sample.
    pub sample_size: usize,
    /// Extra attempts allowed for flaky cases.
    pub flaky_attempts: u32,
    pub dieharder: DieharderConfig,
    /// Marker that enables restricted-environment cases.
    pub restricted_env: EnvMarker,
    /// Variable naming a pre-provisioned scratch directory.
    pub scratch_env: String,
    /// Cases to run; empty runs all.
    pub cases: Vec<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            significance: Significance::ONE_PERCENT,
            sample_size: DEFAULT_SAMPLE_SIZE,
            flaky_attempts: DEFAULT_FLAKY_ATTEMPTS,
            dieharder: DieharderConfig::default(),
            restricted_env: EnvMarker::default(),
            scratch_env: "TEST_TMPDIR".to_string(),
            cases: Vec::new(),
        }
    }
}

/// Loads a harness config from YAML.
pub fn load_config(content: &str) -> Result<HarnessConfig> {
    if content.trim().is_empty() {
        return Ok(HarnessConfig::default());
    }
    Ok(serde_yaml_ng::from_str(content)?)
}

/// Environment markers, captured once and handed to the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    /// The restricted-environment marker is present.
    pub restricted: bool,
    /// Pre-provisioned scratch root, if any.
    pub scratch_root: Option<PathBuf>,
}

impl Environment {
    /// Reads the markers from the process environment.
    pub fn capture(config: &HarnessConfig) -> Self {
        Self::from_lookup(config, |key| std::env::var(key).ok())
    }

    pub fn from_lookup(config: &HarnessConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let marker = &config.restricted_env;
        Self {
            restricted: lookup(&marker.var).is_some_and(|v| v == marker.value),
            scratch_root: lookup(&config.scratch_env)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }
}

/// Raised when the two verdicts never converge.
///
/// Not persisted as state. The only copy on disk is the `failure.json`
/// debugging artifact inside a kept scratch directory, which nothing reads
/// back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisagreementRecord {
    pub generator_name: String,
    pub battery: String,
    pub battery_verdict: bool,
    pub runstest_verdict: bool,
    /// Zero-based attempt on which the final disagreement happened.
    pub attempt_index: u32,
    pub expected_random: bool,
    pub significance: Significance,
    /// Battery output from the final attempt.
    pub diagnostic_text: String,
}

impl DisagreementRecord {
    pub const fn attempts(&self) -> u32 {
        self.attempt_index + 1
    }

    pub const fn battery_matches_expected(&self) -> bool {
        self.battery_verdict == self.expected_random
    }

    pub const fn runstest_matches_expected(&self) -> bool {
        self.runstest_verdict == self.expected_random
    }
}

/// Result of running a single generator case.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CaseResult {
    /// Both tests agreed.
    Pass {
        name: String,
        /// The agreed verdict ("looks random").
        verdict: bool,
        expected_random: bool,
        attempts: u32,
        /// Disagreements tolerated before agreement.
        disagreements: u32,
    },
    /// The tests disagreed beyond the retry budget.
    Fail {
        name: String,
        record: DisagreementRecord,
        reason: String,
    },
    /// The case could not be evaluated.
    Error { name: String, error: String },
    /// The case was not run.
    Skip { name: String, reason: String },
}

impl CaseResult {
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Pass { .. })
    }

    pub const fn is_fail(&self) -> bool {
        matches!(self, Self::Fail { .. })
    }

    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::Skip { .. })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Pass { name, .. }
            | Self::Fail { name, .. }
            | Self::Error { name, .. }
            | Self::Skip { name, .. } => name,
        }
    }
}

/// Counts of each outcome across a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
}

impl Summary {
    pub fn from_results(results: &[CaseResult]) -> Self {
        results.iter().fold(Self::default(), |mut summary, result| {
            match result {
                CaseResult::Pass { .. } => summary.passed += 1,
                CaseResult::Fail { .. } => summary.failed += 1,
                CaseResult::Error { .. } => summary.errored += 1,
                CaseResult::Skip { .. } => summary.skipped += 1,
            }
            summary
        })
    }

    /// No case failed or errored.
    pub const fn is_success(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn test_parse_harness_config() {
        let yaml = r#"
significance: 0.05
sample_size: 4000000
flaky_attempts: 2
dieharder:
  binary: /usr/local/bin/dieharder
  timeout: 120
restricted_env:
  var: BUILD_ENV
  value: trusted
cases: [ascendingBytes, pseudorand]
"#;
        let config = load_config(yaml).unwrap();
        assert_eq!(config.significance, Significance::FIVE_PERCENT);
        assert_eq!(config.sample_size, 4_000_000);
        assert_eq!(config.flaky_attempts, 2);
        assert_eq!(config.dieharder.binary, PathBuf::from("/usr/local/bin/dieharder"));
        assert_eq!(config.dieharder.timeout, Duration::from_secs(120));
        assert_eq!(config.dieharder.tests, vec!["15", "101"]);
        assert_eq!(config.restricted_env.var, "BUILD_ENV");
        assert_eq!(config.scratch_env, "TEST_TMPDIR");
        assert_eq!(config.cases, vec!["ascendingBytes", "pseudorand"]);
    }

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(load_config("").unwrap(), HarnessConfig::default());
        assert_eq!(HarnessConfig::default().sample_size, 80_000_000);
    }

    #[test]
    fn test_invalid_significance_is_rejected() {
        assert!(load_config("significance: 1.5\n").is_err());
        assert!(load_config("unknown_knob: 3\n").is_err());
    }

    #[test]
    fn test_environment_requires_exact_marker_value() {
        let config = HarnessConfig::default();
        let env: HashMap<&str, &str> = [("CI", "RANDTEST-CI"), ("TEST_TMPDIR", "/scratch")].into();
        let captured = Environment::from_lookup(&config, |k| env.get(k).map(ToString::to_string));
        assert!(captured.restricted);
        assert_eq!(captured.scratch_root, Some(PathBuf::from("/scratch")));

        let env: HashMap<&str, &str> = [("CI", "true"), ("TEST_TMPDIR", "")].into();
        let captured = Environment::from_lookup(&config, |k| env.get(k).map(ToString::to_string));
        assert_eq!(captured, Environment::default());
    }

    #[test]
    fn test_disagreement_record_truth_flags() {
        let record = DisagreementRecord {
            generator_name: "pseudorand".to_string(),
            battery: "dieharder".to_string(),
            battery_verdict: false,
            runstest_verdict: true,
            attempt_index: 4,
            expected_random: true,
            significance: Significance::ONE_PERCENT,
            diagnostic_text: String::new(),
        };
        assert_eq!(record.attempts(), 5);
        assert!(!record.battery_matches_expected());
        assert!(record.runstest_matches_expected());
    }

    #[test]
    fn test_summary_counts_errors_apart_from_failures() {
        let results = vec![
            CaseResult::Pass {
                name: "ascendingHex".to_string(),
                verdict: false,
                expected_random: false,
                attempts: 1,
                disagreements: 0,
            },
            CaseResult::Error {
                name: "broken".to_string(),
                error: "insufficient data".to_string(),
            },
            CaseResult::Skip {
                name: "cryptorand".to_string(),
                reason: "restricted".to_string(),
            },
        ];
        let summary = Summary::from_results(&results);
        assert_eq!(
            summary,
            Summary {
                passed: 1,
                failed: 0,
                errored: 1,
                skipped: 1,
            }
        );
        assert!(!summary.is_success());
        assert!(Summary::from_results(&results[..1]).is_success());
    }
}
