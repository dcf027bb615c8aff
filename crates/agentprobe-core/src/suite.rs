//! Explicit test discovery: callers build an ordered batch instead of registering
//! into a global registry.

use crate::errors::{ProbeError, Result};
use crate::model::TestCase;
use std::collections::HashSet;

const MAX_NAME_LEN: usize = 200;

#[derive(Debug, Clone)]
pub struct TestSuite {
    pub name: String,
    pub cases: Vec<TestCase>,
}

impl TestSuite {
    pub fn builder(name: impl Into<String>) -> TestSuiteBuilder {
        TestSuiteBuilder {
            name: name.into(),
            cases: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Cases carrying `tag`, in suite order.
    pub fn filter_tag(&self, tag: &str) -> Vec<TestCase> {
        self.cases
            .iter()
            .filter(|c| c.tags.iter().any(|t| t == tag))
            .cloned()
            .collect()
    }
}

#[derive(Debug)]
pub struct TestSuiteBuilder {
    name: String,
    cases: Vec<TestCase>,
}

impl TestSuiteBuilder {
    pub fn case(mut self, case: TestCase) -> Self {
        self.cases.push(case);
        self
    }

    pub fn cases(mut self, cases: impl IntoIterator<Item = TestCase>) -> Self {
        self.cases.extend(cases);
        self
    }

    /// Validates every name and rejects duplicates; order is preserved.
    pub fn build(self) -> Result<TestSuite> {
        let mut seen = HashSet::with_capacity(self.cases.len());
        for case in &self.cases {
            validate_name(&case.name)?;
            if !seen.insert(case.name.as_str()) {
                return Err(ProbeError::InvalidTestCase {
                    name: case.name.clone(),
                    reason: format!("duplicate name in suite '{}'", self.name),
                });
            }
        }
        Ok(TestSuite {
            name: self.name,
            cases: self.cases,
        })
    }
}

pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| ProbeError::InvalidTestCase {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.trim().is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(invalid("name exceeds 200 characters"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ' ')))
    {
        return Err(invalid(&format!("character {c:?} is not allowed")));
    }
    Ok(())
}
