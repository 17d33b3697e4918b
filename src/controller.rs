//! Flaky-retry controller.
//!
//! Drives each generator case through
//! `Idle -> Generating -> Testing -> Comparing -> {Done, Fail}`. Agreement ends
//! the case. Disagreement fails it immediately unless the case is flaky and
//! retry budget remains, in which case fresh samples are generated and both
//! tests rerun.
//!
//! Statistical tests are expected to disagree occasionally near the
//! significance boundary; disagreement is only a defect when it recurs beyond
//! the budget.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::battery::Battery;
use crate::error::{HarnessError, Result};
use crate::generators::{GeneratorCase, Registry};
use crate::reconcile::{run_at_significance_level, try_run_at_significance_level, TrialOutcome};
use crate::scratch::ScratchDir;
use crate::significance::Significance;
use crate::stats;
use crate::types::{
    CaseResult, DisagreementRecord, Environment, HarnessConfig, DEFAULT_FLAKY_ATTEMPTS,
    DEFAULT_SAMPLE_SIZE,
};

/// Controller state for one case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Generating,
    Testing,
    Comparing,
    Done,
    Fail,
}

/// Settings for the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub sample_size: usize,
    pub significance: Significance,
    /// Extra attempts granted to flaky cases.
    pub flaky_attempts: u32,
    pub environment: Environment,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            significance: Significance::ONE_PERCENT,
            flaky_attempts: DEFAULT_FLAKY_ATTEMPTS,
            environment: Environment::default(),
        }
    }
}

impl ControllerConfig {
    pub fn from_harness(config: &HarnessConfig, environment: Environment) -> Self {
        Self {
            sample_size: config.sample_size,
            significance: config.significance,
            flaky_attempts: config.flaky_attempts,
            environment,
        }
    }
}

/// Verdicts from one attempt.
struct Attempt {
    battery: TrialOutcome,
    runstest: TrialOutcome,
}

/// Runs every case in a registry against a battery and the runs test.
pub struct FlakyRetryController<B> {
    registry: Registry,
    battery: B,
    config: ControllerConfig,
}

impl<B: Battery> FlakyRetryController<B> {
    pub const fn new(registry: Registry, battery: B, config: ControllerConfig) -> Self {
        Self {
            registry,
            battery,
            config,
        }
    }

    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Runs all cases sequentially.
    pub fn run_all(&self) -> Vec<CaseResult> {
        self.registry
            .cases()
            .iter()
            .map(|case| self.run_case(case))
            .collect()
    }

    /// Runs one case to a terminal state.
    pub fn run_case(&self, case: &GeneratorCase) -> CaseResult {
        if case.requires_restricted_env && !self.config.environment.restricted {
            info!(case = %case.name, "skipping: restricted environment marker absent");
            return CaseResult::Skip {
                name: case.name.clone(),
                reason: "requires the restricted CI environment".to_string(),
            };
        }

        let then = Instant::now();
        info!(case = %case.name, significance = %self.config.significance, "testing generator");

        let mut scratch = match ScratchDir::create(
            &format!("randtest-{}-", case.name),
            self.config.environment.scratch_root.as_deref(),
        ) {
            Ok(scratch) => scratch,
            Err(e) => {
                return CaseResult::Error {
                    name: case.name.clone(),
                    error: format!("failed to create scratch directory: {e}"),
                }
            }
        };

        let result = match self.drive(case, &scratch) {
            Ok(result) => result,
            Err(e) => {
                warn!(case = %case.name, error = %e, "case aborted");
                CaseResult::Error {
                    name: case.name.clone(),
                    error: e.to_string(),
                }
            }
        };

        // failure.json is a debugging artifact only; nothing reads it back.
        if !result.is_pass() {
            scratch.mark_failed();
            match serde_json::to_vec_pretty(&result) {
                Ok(json) => {
                    if let Err(e) = scratch.write("failure.json", json) {
                        warn!(error = %e, "failed to write failure record");
                    }
                }
                Err(e) => warn!(error = %e, "failed to encode failure record"),
            }
        }

        info!(
            case = %case.name,
            elapsed_secs = then.elapsed().as_secs_f64(),
            "done"
        );
        result
    }

    fn enter(case: &GeneratorCase, phase: &mut Phase, next: Phase) {
        let from = *phase;
        debug!(case = %case.name, ?from, to = ?next, "phase");
        *phase = next;
    }

    fn drive(&self, case: &GeneratorCase, scratch: &ScratchDir) -> Result<CaseResult> {
        let mut phase = Phase::Idle;
        let mut attempt: u32 = 0;

        loop {
            let Attempt { battery, runstest } = if case.fixed {
                Self::enter(case, &mut phase, Phase::Generating);
                let data = case.sample(self.config.sample_size)?;
                Self::enter(case, &mut phase, Phase::Testing);
                self.test_same_sample(&data)?
            } else {
                // Each test draws its own sample inside its trial.
                Self::enter(case, &mut phase, Phase::Generating);
                Self::enter(case, &mut phase, Phase::Testing);
                self.test_independent_samples(case)?
            };

            let log = format!("attempt-{}-{}.log", attempt + 1, self.battery.name());
            if let Err(e) = scratch.write(&log, &battery.diagnostic) {
                warn!(error = %e, "failed to save battery output");
            }

            Self::enter(case, &mut phase, Phase::Comparing);
            if battery.verdict == runstest.verdict {
                Self::enter(case, &mut phase, Phase::Done);
                if battery.verdict != case.expected_random {
                    warn!(
                        case = %case.name,
                        verdict = battery.verdict,
                        expected = case.expected_random,
                        "both tests agree against the declared ground truth"
                    );
                }
                return Ok(CaseResult::Pass {
                    name: case.name.clone(),
                    verdict: battery.verdict,
                    expected_random: case.expected_random,
                    attempts: attempt + 1,
                    disagreements: attempt,
                });
            }

            warn!(
                case = %case.name,
                attempt = attempt + 1,
                battery = battery.verdict,
                runstest = runstest.verdict,
                "verdicts disagree"
            );

            if !case.flaky || attempt >= self.config.flaky_attempts {
                Self::enter(case, &mut phase, Phase::Fail);
                return Ok(self.fail(case, attempt, battery, &runstest));
            }

            attempt += 1;
            info!(case = %case.name, attempt, "retrying flaky case");
        }
    }

    fn test_same_sample(&self, data: &[u8]) -> Result<Attempt> {
        let significance = self.config.significance;
        let battery = run_at_significance_level(significance, |_| self.battery.run(data));
        let runstest =
            try_run_at_significance_level(significance, |s| stats::is_random(data, s))?;
        Ok(Attempt { battery, runstest })
    }

    fn test_independent_samples(&self, case: &GeneratorCase) -> Result<Attempt> {
        let significance = self.config.significance;
        let size = self.config.sample_size;
        let battery = try_run_at_significance_level(significance, |_| {
            case.sample(size).map(|data| self.battery.run(&data))
        })?;
        let runstest = try_run_at_significance_level(significance, |s| {
            let data = case.sample(size)?;
            stats::is_random(&data, s)
        })?;
        Ok(Attempt { battery, runstest })
    }

    fn fail(
        &self,
        case: &GeneratorCase,
        attempt: u32,
        battery: TrialOutcome,
        runstest: &TrialOutcome,
    ) -> CaseResult {
        let record = DisagreementRecord {
            generator_name: case.name.clone(),
            battery: self.battery.name().to_string(),
            battery_verdict: battery.verdict,
            runstest_verdict: runstest.verdict,
            attempt_index: attempt,
            expected_random: case.expected_random,
            significance: battery.significance_used,
            diagnostic_text: battery.diagnostic,
        };

        if !record.battery_matches_expected() {
            warn!(
                case = %case.name,
                got = record.battery_verdict,
                want = record.expected_random,
                "{} unexpected result:\n{}",
                record.battery,
                record.diagnostic_text
            );
        }
        if !record.runstest_matches_expected() {
            warn!(
                case = %case.name,
                got = record.runstest_verdict,
                want = record.expected_random,
                "runstest unexpected result"
            );
        }

        let error = HarnessError::Disagreement {
            generator: record.generator_name.clone(),
            battery: record.battery.clone(),
            battery_verdict: record.battery_verdict,
            runs_verdict: record.runstest_verdict,
            expected_random: record.expected_random,
            significance: record.significance,
            attempts: record.attempts(),
        };

        CaseResult::Fail {
            name: case.name.clone(),
            reason: error.to_string(),
            record,
        }
    }
}
