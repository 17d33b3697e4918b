//! Uniform entry point for running a randomness trial at a significance level.
//!
//! Both the internal runs test and the external battery go through
//! [`run_at_significance_level`], so a strategy that adjusts the level can be
//! introduced here without touching callers.

use serde::Serialize;
use tracing::trace;

use crate::battery::BatteryRun;
use crate::significance::Significance;

/// A trial's pass/fail classification plus any captured text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    pub diagnostic: String,
}

impl From<bool> for Verdict {
    fn from(passed: bool) -> Self {
        Self {
            passed,
            diagnostic: String::new(),
        }
    }
}

impl From<BatteryRun> for Verdict {
    fn from(run: BatteryRun) -> Self {
        Self {
            passed: run.verdict,
            diagnostic: run.diagnostic,
        }
    }
}

/// How the level is chosen for a trial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelStrategy {
    /// Use the requested level as given.
    #[default]
    Fixed,
}

impl LevelStrategy {
    const fn select(self, requested: Significance) -> (Significance, u32) {
        match self {
            Self::Fixed => (requested, 0),
        }
    }
}

/// Result of one trial. Never mutated after return.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialOutcome {
    pub verdict: bool,
    pub requested: Significance,
    pub significance_used: Significance,
    /// Number of level adjustments made before the trial ran.
    pub adjustments: u32,
    pub diagnostic: String,
}

/// Runs `trial` exactly once at `significance`.
pub fn run_at_significance_level<F, V>(significance: Significance, trial: F) -> TrialOutcome
where
    F: FnOnce(Significance) -> V,
    V: Into<Verdict>,
{
    match try_run_at_significance_level(significance, |s| {
        Ok::<_, std::convert::Infallible>(trial(s))
    }) {
        Ok(outcome) => outcome,
        Err(never) => match never {},
    }
}

/// Fallible twin of [`run_at_significance_level`]; the trial's error is
/// returned untouched.
pub fn try_run_at_significance_level<F, V, E>(
    significance: Significance,
    trial: F,
) -> Result<TrialOutcome, E>
where
    F: FnOnce(Significance) -> Result<V, E>,
    V: Into<Verdict>,
{
    let (used, adjustments) = LevelStrategy::default().select(significance);
    let verdict: Verdict = trial(used)?.into();
    trace!(requested = %significance, used = %used, passed = verdict.passed, "trial complete");

    Ok(TrialOutcome {
        verdict: verdict.passed,
        requested: significance,
        significance_used: used,
        adjustments,
        diagnostic: verdict.diagnostic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarnessError;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    #[test]
    fn test_runs_trial_once_and_reports_level() {
        let calls = Cell::new(0);
        let outcome = run_at_significance_level(Significance::FIVE_PERCENT, |s| {
            calls.set(calls.get() + 1);
            assert_eq!(s, Significance::FIVE_PERCENT);
            true
        });
        assert_eq!(calls.get(), 1);
        assert!(outcome.verdict);
        assert_eq!(outcome.requested, Significance::FIVE_PERCENT);
        assert_eq!(outcome.significance_used, Significance::FIVE_PERCENT);
        assert_eq!(outcome.adjustments, 0);
        assert!(outcome.diagnostic.is_empty());
    }

    #[test]
    fn test_battery_run_keeps_diagnostic() {
        let outcome = run_at_significance_level(Significance::ONE_PERCENT, |_| {
            BatteryRun::fail("sts_runs FAILED".to_string())
        });
        assert!(!outcome.verdict);
        assert_eq!(outcome.diagnostic, "sts_runs FAILED");
    }

    #[test]
    fn test_trial_errors_propagate() {
        let result = try_run_at_significance_level(Significance::ONE_PERCENT, |_| {
            Err::<bool, _>(HarnessError::InsufficientData { needed: 100, got: 3 })
        });
        assert!(matches!(
            result,
            Err(HarnessError::InsufficientData { got: 3, .. })
        ));
    }
}
