//! Internal runs test.
//!
//! A Wald-Wolfowitz runs test over the byte stream, with each byte classed as
//! high (`>= 128`) or low. Random bytes produce runs close to the count
//! expected for the observed high/low split; ascending or otherwise structured
//! streams do not.

#![allow(clippy::cast_precision_loss)]

use serde::Serialize;
use statrs::function::erf::erfc;

use crate::error::{HarnessError, Result};
use crate::significance::Significance;

/// Smallest sample the runs test will judge.
pub const MIN_SAMPLE_BYTES: usize = 100;

const MIDPOINT: u8 = 128;

/// Runs statistic for a byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunsStatistic {
    /// Sample length.
    pub n: usize,
    /// Bytes below the midpoint.
    pub low: usize,
    /// Bytes at or above the midpoint.
    pub high: usize,
    /// Observed number of runs.
    pub runs: usize,
    /// Expected runs under the null hypothesis.
    pub expected: f64,
    /// Standardised deviation of `runs` from `expected`.
    pub z: f64,
    /// Two-sided p-value; 0.0 when the stream never crosses the midpoint.
    pub p_value: f64,
}

/// Computes the runs statistic for `data`.
pub fn runs_statistic(data: &[u8]) -> Result<RunsStatistic> {
    let n = data.len();
    if n < MIN_SAMPLE_BYTES {
        return Err(HarnessError::InsufficientData {
            needed: MIN_SAMPLE_BYTES,
            got: n,
        });
    }

    let high = data.iter().filter(|&&b| b >= MIDPOINT).count();
    let low = n - high;
    let runs = 1 + data
        .windows(2)
        .filter(|w| (w[0] >= MIDPOINT) != (w[1] >= MIDPOINT))
        .count();

    let (n_f, n1, n2) = (n as f64, low as f64, high as f64);
    let product = 2.0 * n1 * n2;
    let expected = product / n_f + 1.0;
    let variance = product * (product - n_f) / (n_f * n_f * (n_f - 1.0));

    // One-sided streams have zero variance: fail closed.
    if variance <= 0.0 || !variance.is_finite() {
        return Ok(RunsStatistic {
            n,
            low,
            high,
            runs,
            expected,
            z: f64::INFINITY,
            p_value: 0.0,
        });
    }

    let z = (runs as f64 - expected) / variance.sqrt();
    let p_value = erfc(z.abs() / std::f64::consts::SQRT_2).clamp(0.0, 1.0);

    Ok(RunsStatistic {
        n,
        low,
        high,
        runs,
        expected,
        z,
        p_value,
    })
}

/// Returns true when the runs test does not reject "`data` is random" at
/// `significance`. Deterministic for identical input.
///
/// Inputs shorter than [`MIN_SAMPLE_BYTES`] yield
/// [`HarnessError::InsufficientData`] rather than a verdict.
pub fn is_random(data: &[u8], significance: Significance) -> Result<bool> {
    let stat = runs_statistic(data)?;
    Ok(significance.accepts(stat.p_value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// low, low, high, high, ... : exactly the expected run count.
    fn paired(n: usize) -> Vec<u8> {
        (0..n).map(|i| if (i / 2) % 2 == 0 { 10 } else { 200 }).collect()
    }

    #[test]
    fn test_empty_input_is_insufficient() {
        let err = is_random(&[], Significance::ONE_PERCENT).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::InsufficientData { needed: 100, got: 0 }
        ));
    }

    #[test]
    fn test_short_input_is_insufficient() {
        let data = paired(MIN_SAMPLE_BYTES - 1);
        assert!(matches!(
            is_random(&data, Significance::ONE_PERCENT),
            Err(HarnessError::InsufficientData { .. })
        ));
        assert!(is_random(&paired(MIN_SAMPLE_BYTES), Significance::ONE_PERCENT).is_ok());
    }

    #[test]
    fn test_ascending_bytes_are_not_random() {
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 256) as u8).collect();
        assert!(!is_random(&data, Significance::ONE_PERCENT).unwrap());
        assert!(!is_random(&data, Significance::new(1e-9).unwrap()).unwrap());
    }

    #[test]
    fn test_one_sided_stream_fails_closed() {
        let data = vec![b'7'; 4096];
        let stat = runs_statistic(&data).unwrap();
        assert_eq!(stat.runs, 1);
        assert_eq!(stat.high, 0);
        assert!(stat.p_value.abs() < f64::EPSILON);
        assert!(!is_random(&data, Significance::TENTH_PERCENT).unwrap());
    }

    #[test]
    fn test_alternating_stream_has_too_many_runs() {
        let data: Vec<u8> = (0..10_000).map(|i| if i % 2 == 0 { 0 } else { 255 }).collect();
        let stat = runs_statistic(&data).unwrap();
        assert_eq!(stat.runs, 10_000);
        assert!(stat.z > 0.0);
        assert!(!is_random(&data, Significance::ONE_PERCENT).unwrap());
    }

    #[test]
    fn test_paired_stream_matches_expectation() {
        let data = paired(10_000);
        let stat = runs_statistic(&data).unwrap();
        assert_eq!(stat.low, 5_000);
        assert_eq!(stat.high, 5_000);
        assert_eq!(stat.runs, 5_000);
        assert!((stat.expected - 5_001.0).abs() < 1e-9);
        assert!(stat.p_value > 0.9);
        assert!(is_random(&data, Significance::FIVE_PERCENT).unwrap());
    }

    #[test]
    fn test_seeded_random_bytes_pass_at_expected_rate() {
        use rand::rngs::StdRng;
        use rand::{RngCore, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut data = vec![0u8; 100_000];
        let mut rejects = 0;
        for _ in 0..200 {
            rng.fill_bytes(&mut data);
            if !is_random(&data, Significance::ONE_PERCENT).unwrap() {
                rejects += 1;
            }
        }
        // About 2 of 200 expected at 1%.
        assert!(rejects <= 10, "rejected {rejects}/200");
    }

    #[test]
    fn test_ascending_text_generators_are_not_random() {
        use crate::generators::{ascending_decimal, ascending_hex};

        let hex = ascending_hex(100_000).unwrap();
        assert!(!is_random(&hex, Significance::ONE_PERCENT).unwrap());
        let decimal = ascending_decimal(100_000).unwrap();
        assert!(!is_random(&decimal, Significance::ONE_PERCENT).unwrap());
    }

    #[test]
    fn test_verdict_is_idempotent() {
        let data: Vec<u8> = (0..50_000u64)
            .map(|i| (i.wrapping_mul(6_364_136_223_846_793_005) >> 56) as u8)
            .collect();
        let first = is_random(&data, Significance::ONE_PERCENT).unwrap();
        let second = is_random(&data, Significance::ONE_PERCENT).unwrap();
        assert_eq!(first, second);
        assert_eq!(runs_statistic(&data).unwrap(), runs_statistic(&data).unwrap());
    }
}
