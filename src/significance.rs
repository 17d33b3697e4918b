//! Significance levels shared by both randomness tests.
//!
//! A significance level is the false-positive rate under the null hypothesis
//! "the input is random". Larger values are looser thresholds for rejecting
//! randomness, so truly random data fails more often by chance.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc_inv;

use crate::error::HarnessError;

/// Probability threshold strictly between 0 and 1.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Significance(f64);

impl Significance {
    pub const TENTH_PERCENT: Self = Self(0.001);
    pub const ONE_PERCENT: Self = Self(0.01);
    pub const FIVE_PERCENT: Self = Self(0.05);

    /// Validates `value` lies in the open interval (0, 1).
    pub fn new(value: f64) -> Result<Self, HarnessError> {
        if value > 0.0 && value < 1.0 {
            Ok(Self(value))
        } else {
            Err(HarnessError::InvalidSignificance(value))
        }
    }

    pub const fn value(self) -> f64 {
        self.0
    }

    /// Two-sided critical z value for this level.
    #[must_use]
    pub fn z_critical(self) -> f64 {
        std::f64::consts::SQRT_2 * erfc_inv(self.0)
    }

    /// True when `p_value` does not reject the null hypothesis at this level.
    #[inline]
    #[must_use]
    pub fn accepts(self, p_value: f64) -> bool {
        p_value >= self.0
    }
}

impl Default for Significance {
    fn default() -> Self {
        Self::ONE_PERCENT
    }
}

impl TryFrom<f64> for Significance {
    type Error = HarnessError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Significance> for f64 {
    fn from(s: Significance) -> Self {
        s.0
    }
}

impl FromStr for Significance {
    type Err = HarnessError;

    /// Accepts either a probability (`0.01`) or a percentage (`1%`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parsed = if let Some(pct) = s.strip_suffix('%') {
            pct.trim().parse::<f64>().map(|v| v / 100.0)
        } else {
            s.parse::<f64>()
        };
        let value = parsed
            .map_err(|e| HarnessError::Config(format!("invalid significance {s:?}: {e}")))?;
        Self::new(value)
    }
}

impl fmt::Display for Significance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = format!("{:.6}", self.0 * 100.0);
        let pct = pct.trim_end_matches('0').trim_end_matches('.');
        write!(f, "{pct}%")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rejects_out_of_range() {
        assert!(Significance::new(0.0).is_err());
        assert!(Significance::new(1.0).is_err());
        assert!(Significance::new(-0.5).is_err());
        assert!(Significance::new(f64::NAN).is_err());
        assert!(Significance::new(0.5).is_ok());
    }

    #[test]
    fn test_parses_probability_and_percentage() {
        assert_eq!("0.01".parse::<Significance>().unwrap(), Significance::ONE_PERCENT);
        assert_eq!("1%".parse::<Significance>().unwrap(), Significance::ONE_PERCENT);
        assert_eq!(" 5 % ".parse::<Significance>().unwrap(), Significance::FIVE_PERCENT);
        assert!("150%".parse::<Significance>().is_err());
        assert!("lots".parse::<Significance>().is_err());
    }

    #[test]
    fn test_displays_as_percentage() {
        assert_eq!(Significance::ONE_PERCENT.to_string(), "1%");
        assert_eq!(Significance::TENTH_PERCENT.to_string(), "0.1%");
        assert_eq!(Significance::FIVE_PERCENT.to_string(), "5%");
    }

    #[test]
    fn test_looser_level_has_smaller_critical_value() {
        let one = Significance::ONE_PERCENT.z_critical();
        let five = Significance::FIVE_PERCENT.z_critical();
        assert!((one - 2.5758).abs() < 1e-3);
        assert!((five - 1.9600).abs() < 1e-3);
        assert!(five < one);
    }

    #[test]
    fn test_serde_round_trips_through_f64() {
        let json = serde_json::to_string(&Significance::FIVE_PERCENT).unwrap();
        assert_eq!(json, "0.05");
        assert!(serde_json::from_str::<Significance>("2.0").is_err());
    }
}
