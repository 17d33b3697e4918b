//! randtest-e2e: E2E validation of randomness generators.
//!
//! Certifies data generators by checking that an external statistical battery
//! (dieharder) and an internal runs test reach the same verdict at a shared
//! significance level, retrying statistically flaky cases within a budget.

pub mod battery;
pub mod controller;
pub mod error;
pub mod generators;
pub mod reconcile;
pub mod scratch;
pub mod significance;
pub mod stats;
pub mod types;
