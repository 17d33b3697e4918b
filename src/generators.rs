//! Generator registry.
//!
//! Named data-producing functions together with the properties the harness
//! expects of them. A [`Registry`] is built once and passed to the controller;
//! nothing here is process-global.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};

use crate::error::{HarnessError, Result};

/// Produces exactly `size` bytes.
pub type GenerateFn = Arc<dyn Fn(usize) -> Result<Vec<u8>> + Send + Sync>;

/// A generator under test and its declared properties.
#[derive(Clone)]
pub struct GeneratorCase {
    pub name: String,
    pub generate: GenerateFn,
    /// Both tests must see the same sample.
    pub fixed: bool,
    /// Expected to be judged random.
    pub expected_random: bool,
    /// Statistical disagreement is tolerated within the retry budget.
    pub flaky: bool,
    /// Only run when the restricted-environment marker is present.
    pub requires_restricted_env: bool,
}

impl GeneratorCase {
    pub fn new<F>(name: impl Into<String>, generate: F) -> Self
    where
        F: Fn(usize) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            generate: Arc::new(generate),
            fixed: false,
            expected_random: false,
            flaky: false,
            requires_restricted_env: false,
        }
    }

    #[must_use]
    pub const fn fixed(mut self, fixed: bool) -> Self {
        self.fixed = fixed;
        self
    }

    #[must_use]
    pub const fn random(mut self, expected_random: bool) -> Self {
        self.expected_random = expected_random;
        self
    }

    #[must_use]
    pub const fn flaky(mut self, flaky: bool) -> Self {
        self.flaky = flaky;
        self
    }

    #[must_use]
    pub const fn restricted(mut self, restricted: bool) -> Self {
        self.requires_restricted_env = restricted;
        self
    }

    /// Generates one sample, checking it has the requested length.
    pub fn sample(&self, size: usize) -> Result<Vec<u8>> {
        let data = (self.generate)(size)?;
        if data.len() != size {
            return Err(HarnessError::Generation {
                generator: self.name.clone(),
                reason: format!("requested {size} bytes, got {}", data.len()),
            });
        }
        Ok(data)
    }
}

impl fmt::Debug for GeneratorCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorCase")
            .field("name", &self.name)
            .field("fixed", &self.fixed)
            .field("expected_random", &self.expected_random)
            .field("flaky", &self.flaky)
            .field("requires_restricted_env", &self.requires_restricted_env)
            .finish_non_exhaustive()
    }
}

/// Immutable, ordered set of uniquely named cases.
#[derive(Debug, Clone)]
pub struct Registry {
    cases: Vec<GeneratorCase>,
}

impl Registry {
    pub fn new(cases: Vec<GeneratorCase>) -> Result<Self> {
        let mut seen = HashSet::new();
        for case in &cases {
            if !seen.insert(case.name.as_str()) {
                return Err(HarnessError::DuplicateCase(case.name.clone()));
            }
        }
        Ok(Self { cases })
    }

    /// The built-in generators.
    pub fn builtin() -> Self {
        Self {
            cases: vec![
                GeneratorCase::new("ascendingDecimal", ascending_decimal).fixed(true),
                GeneratorCase::new("ascendingHex", ascending_hex).fixed(true),
                GeneratorCase::new("ascendingBytes", ascending_bytes).fixed(true),
                GeneratorCase::new("pseudorand", pseudorand)
                    .random(true)
                    .flaky(true),
                GeneratorCase::new("cryptorand", cryptorand)
                    .random(true)
                    .flaky(true)
                    .restricted(true),
            ],
        }
    }

    pub fn cases(&self) -> &[GeneratorCase] {
        &self.cases
    }

    pub fn get(&self, name: &str) -> Option<&GeneratorCase> {
        self.cases.iter().find(|c| c.name == name)
    }

    /// Restricts to `names`, in the given order. Empty selects everything.
    pub fn select(&self, names: &[String]) -> Result<Self> {
        if names.is_empty() {
            return Ok(self.clone());
        }
        let cases = names
            .iter()
            .map(|name| {
                self.get(name)
                    .cloned()
                    .ok_or_else(|| HarnessError::UnknownCase(name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(cases)
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

fn ascending_text(size: usize, render: impl Fn(&mut String, u64)) -> Vec<u8> {
    let mut text = String::with_capacity(size + 20);
    let mut i = 0u64;
    while text.len() < size {
        render(&mut text, i);
        i += 1;
    }
    let mut data = text.into_bytes();
    data.truncate(size);
    data
}

/// `0123456789101112...` truncated to `size`.
#[allow(clippy::unnecessary_wraps)]
pub fn ascending_decimal(size: usize) -> Result<Vec<u8>> {
    Ok(ascending_text(size, |s, i| s.push_str(&i.to_string())))
}

/// Same as [`ascending_decimal`] in lower-case hex.
#[allow(clippy::unnecessary_wraps)]
pub fn ascending_hex(size: usize) -> Result<Vec<u8>> {
    Ok(ascending_text(size, |s, i| s.push_str(&format!("{i:x}"))))
}

#[allow(clippy::unnecessary_wraps, clippy::cast_possible_truncation)]
pub fn ascending_bytes(size: usize) -> Result<Vec<u8>> {
    Ok((0..size).map(|i| (i % 256) as u8).collect())
}

/// Non-cryptographic PRNG, freshly seeded per sample.
#[allow(clippy::unnecessary_wraps)]
pub fn pseudorand(size: usize) -> Result<Vec<u8>> {
    let mut data = vec![0u8; size];
    StdRng::from_entropy().fill_bytes(&mut data);
    Ok(data)
}

/// The operating system's cryptographic source.
pub fn cryptorand(size: usize) -> Result<Vec<u8>> {
    let mut data = vec![0u8; size];
    OsRng
        .try_fill_bytes(&mut data)
        .map_err(|e| HarnessError::Generation {
            generator: "cryptorand".to_string(),
            reason: e.to_string(),
        })?;
    Ok(data)
}
