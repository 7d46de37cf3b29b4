//! Conformance test fixture runner
//!
//! Loads YAML fixtures (a rule set, a fixed "now", and request cases with
//! expected decisions) and runs them against the grayroute engine.
//!
//! ```yaml
//! name: header_exact
//! description: X-Gray=1 routes to v2
//! now: 2026-06-01T12:00:00Z
//! rules:
//!   - { id: r1, name: header canary, type: Header, priority: 1, targetVersion: v2,
//!       configuration: { headerName: X-Gray, headerValue: "1" } }
//! cases:
//!   - name: header present
//!     context: { headers: { X-Gray: "1" } }
//!     expect: { gray: true, rule: r1, version: v2 }
//! ```

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use grayroute::prelude::*;
use grayroute::{FixedClock, RuleRepository};
use serde::Deserialize;

use crate::UnavailableRepository;

/// A complete test fixture
#[derive(Debug, Deserialize)]
pub struct Fixture {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Instant validity windows are checked against. Defaults to
    /// 2026-06-01T12:00:00Z.
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
    /// When set, the repository fails every fetch with this message and
    /// `rules` is ignored.
    #[serde(default, rename = "repositoryFailure")]
    pub repository_failure: Option<String>,
    #[serde(default)]
    pub rules: Vec<GrayRule>,
    pub cases: Vec<TestCase>,
}

/// Test case
#[derive(Debug, Deserialize)]
pub struct TestCase {
    pub name: String,
    #[serde(default)]
    pub context: GrayContext,
    pub expect: Expect,
}

/// Expected decision. Fields left out are not checked.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Expect {
    pub gray: bool,
    #[serde(default)]
    pub rule: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    /// Substring the reason must contain.
    #[serde(default, rename = "reasonContains")]
    pub reason_contains: Option<String>,
}

impl Expect {
    /// Compare against a decision; `Err` describes the first mismatch.
    pub fn check(&self, d: &Decision) -> Result<(), String> {
        if d.is_gray() != self.gray {
            return Err(format!(
                "expected gray={}, got gray={} ({})",
                self.gray,
                d.is_gray(),
                d.reason()
            ));
        }
        let fields = [
            ("rule", self.rule.as_deref(), d.matched_rule_id()),
            ("version", self.version.as_deref(), d.target_version()),
            ("service", self.service.as_deref(), d.target_service_id()),
            ("reason", self.reason.as_deref(), Some(d.reason())),
        ];
        for (field, expected, actual) in fields {
            if let Some(expected) = expected {
                if actual != Some(expected) {
                    return Err(format!("expected {field} {expected:?}, got {actual:?}"));
                }
            }
        }
        if let Some(needle) = &self.reason_contains {
            if !d.reason().contains(needle.as_str()) {
                return Err(format!(
                    "expected reason containing {needle:?}, got {:?}",
                    d.reason()
                ));
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Runner
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of running a single test case
#[derive(Debug)]
pub struct CaseResult {
    pub case_name: String,
    pub passed: bool,
    pub failure: Option<String>,
    pub decision: Decision,
}

fn default_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

impl Fixture {
    /// Parse a fixture from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Parse multiple fixtures from a YAML file with `---` separators
    pub fn from_yaml_multi(yaml: &str) -> Result<Vec<Self>, serde_yaml::Error> {
        let mut fixtures = Vec::new();
        for doc in serde_yaml::Deserializer::from_str(yaml) {
            fixtures.push(Self::deserialize(doc)?);
        }
        Ok(fixtures)
    }

    /// Build the engine this fixture describes.
    ///
    /// # Errors
    ///
    /// The rule set fails validation.
    pub fn engine(&self) -> Result<RuleEngine, grayroute::RuleError> {
        let repository: Arc<dyn RuleRepository> = match &self.repository_failure {
            Some(message) => Arc::new(UnavailableRepository::new(message.clone())),
            None => Arc::new(InMemoryRuleRepository::from_rules(self.rules.clone())?),
        };
        let registry = crate::register(MatcherRegistryBuilder::new()).build();
        Ok(RuleEngine::new(repository, registry)
            .with_clock(Arc::new(FixedClock(self.now.unwrap_or_else(default_now)))))
    }

    /// Run all test cases and return results
    ///
    /// # Panics
    ///
    /// If the fixture's rule set is invalid.
    pub fn run(&self) -> Vec<CaseResult> {
        let engine = self
            .engine()
            .unwrap_or_else(|e| panic!("fixture '{}' has invalid rules: {e}", self.name));
        self.cases
            .iter()
            .map(|case| {
                let decision = futures::executor::block_on(engine.decide(&case.context));
                let failure = case.expect.check(&decision).err();
                CaseResult {
                    case_name: case.name.clone(),
                    passed: failure.is_none(),
                    failure,
                    decision,
                }
            })
            .collect()
    }

    /// Run all test cases and panic on first failure
    pub fn run_and_assert(&self) {
        for result in self.run() {
            assert!(
                result.passed,
                "Fixture '{}' case '{}' failed: {}",
                self.name,
                result.case_name,
                result.failure.unwrap_or_default()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
name: header_exact
description: X-Gray=1 routes to v2
rules:
  - id: r1
    name: header canary
    type: Header
    priority: 1
    targetVersion: v2
    configuration: { headerName: X-Gray, headerValue: "1" }
cases:
  - name: header present
    context: { headers: { X-Gray: "1" } }
    expect: { gray: true, rule: r1, version: v2, reason: "matched rule: header canary" }
  - name: header absent
    expect: { gray: false, reason: no rule matched }
"#;

    #[test]
    fn parses_and_runs() {
        let fixture = Fixture::from_yaml(YAML).unwrap();
        assert_eq!(fixture.cases.len(), 2);
        fixture.run_and_assert();
    }

    #[test]
    fn mismatches_are_reported() {
        let mut fixture = Fixture::from_yaml(YAML).unwrap();
        fixture.cases[0].expect.version = Some("v3".into());
        let results = fixture.run();
        assert!(!results[0].passed);
        assert!(results[0]
            .failure
            .as_deref()
            .is_some_and(|f| f.contains("v3")));
        assert!(results[1].passed);
    }

    #[test]
    fn multi_document_files() {
        let yaml = format!("{YAML}\n---\n{YAML}");
        assert_eq!(Fixture::from_yaml_multi(&yaml).unwrap().len(), 2);
    }
}
