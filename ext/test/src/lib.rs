//! grayroute-test: Test domain for conformance testing
//!
//! Provides a scripted matcher and a fault-injecting repository for exercising
//! the engine's ordering and fault-containment paths without depending on
//! what a real matcher does with request data.
//!
//! # Example
//!
//! ```
//! use grayroute_test::prelude::*;
//! use serde_json::json;
//!
//! let registry = grayroute_test::register(MatcherRegistryBuilder::new()).build();
//!
//! // A Scripted rule's configuration says what its matcher returns.
//! let rule = GrayRule::new("r1", "always", scripted(), "v2")
//!     .with_configuration(json!({ "outcome": "match" }));
//!
//! let matcher = registry.get(&scripted()).unwrap();
//! assert_eq!(matcher.is_match(&GrayContext::default(), &rule), Ok(true));
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use grayroute::prelude::*;
use grayroute::{register_builtin_matchers, RepositoryError, RuleSnapshot};

#[cfg(feature = "fixtures")]
pub mod fixture;

/// Name of the rule type served by [`ScriptedMatcher`].
pub const SCRIPTED: &str = "Scripted";

/// The [`RuleType`] served by [`ScriptedMatcher`].
#[must_use]
pub fn scripted() -> RuleType {
    RuleType::Other(SCRIPTED.to_owned())
}

/// What a scripted rule does when evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Match,
    NoMatch,
    /// Returns [`MatchError::Lookup`].
    LookupError,
    Panic,
}

impl Outcome {
    /// Parse the `outcome` configuration value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "match" => Some(Self::Match),
            "no-match" => Some(Self::NoMatch),
            "lookup-error" => Some(Self::LookupError),
            "panic" => Some(Self::Panic),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Match => "match",
            Self::NoMatch => "no-match",
            Self::LookupError => "lookup-error",
            Self::Panic => "panic",
        }
    }
}

/// Matcher for `Scripted` rules: does whatever `{ "outcome": ... }` says,
/// ignoring the request.
///
/// A configuration without a recognized `outcome` is an invalid config.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptedMatcher;

impl ScriptedMatcher {
    fn outcome(rule: &GrayRule) -> Result<Outcome, MatchError> {
        rule.configuration
            .get("outcome")
            .and_then(serde_json::Value::as_str)
            .and_then(Outcome::parse)
            .ok_or_else(|| {
                MatchError::invalid_config(
                    &rule.id,
                    scripted(),
                    "outcome must be one of match, no-match, lookup-error, panic",
                )
            })
    }
}

impl RuleMatcher for ScriptedMatcher {
    fn rule_type(&self) -> RuleType {
        scripted()
    }

    fn is_match(&self, _ctx: &GrayContext, rule: &GrayRule) -> Result<bool, MatchError> {
        match Self::outcome(rule)? {
            Outcome::Match => Ok(true),
            Outcome::NoMatch => Ok(false),
            Outcome::LookupError => Err(MatchError::Lookup {
                rule_id: rule.id.clone(),
                reason: "scripted lookup failure".into(),
            }),
            Outcome::Panic => panic!("scripted panic in rule {}", rule.id),
        }
    }

    fn check_config(&self, rule: &GrayRule) -> Result<(), MatchError> {
        Self::outcome(rule).map(|_| ())
    }
}

/// A repository that always fails to produce rules.
#[derive(Debug, Clone)]
pub struct UnavailableRepository {
    message: String,
}

impl UnavailableRepository {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl RuleRepository for UnavailableRepository {
    async fn enabled_rules(&self) -> Result<Arc<RuleSnapshot>, RepositoryError> {
        Err(RepositoryError::Unavailable(self.message.clone()))
    }

    async fn rule_by_id(&self, _id: &str) -> Result<Option<Arc<GrayRule>>, RepositoryError> {
        Err(RepositoryError::Unavailable(self.message.clone()))
    }

    async fn refresh(&self) -> Result<usize, RepositoryError> {
        Err(RepositoryError::Unavailable(self.message.clone()))
    }
}

/// Register the built-in matchers plus [`ScriptedMatcher`].
#[must_use]
pub fn register(builder: MatcherRegistryBuilder) -> MatcherRegistryBuilder {
    register_builtin_matchers(builder).matcher(ScriptedMatcher)
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{scripted, Outcome, ScriptedMatcher, UnavailableRepository};
    pub use grayroute::prelude::*;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(outcome: &str) -> GrayRule {
        GrayRule::new("s", "scripted", scripted(), "v2")
            .with_configuration(json!({ "outcome": outcome }))
    }

    #[test]
    fn scripted_outcomes() {
        let m = ScriptedMatcher;
        let ctx = GrayContext::default();
        assert_eq!(m.is_match(&ctx, &rule("match")), Ok(true));
        assert_eq!(m.is_match(&ctx, &rule("no-match")), Ok(false));
        assert!(matches!(
            m.is_match(&ctx, &rule("lookup-error")),
            Err(MatchError::Lookup { .. })
        ));
        assert!(m.is_match(&ctx, &rule("maybe")).unwrap_err().is_config_error());
    }

    #[test]
    #[should_panic(expected = "scripted panic")]
    fn scripted_panic() {
        let _ = ScriptedMatcher.is_match(&GrayContext::default(), &rule("panic"));
    }

    #[test]
    fn outcome_names_round_trip() {
        for o in [
            Outcome::Match,
            Outcome::NoMatch,
            Outcome::LookupError,
            Outcome::Panic,
        ] {
            assert_eq!(Outcome::parse(o.as_str()), Some(o));
        }
    }

    #[test]
    fn register_adds_scripted_to_builtins() {
        let registry = register(MatcherRegistryBuilder::new()).build();
        assert_eq!(registry.len(), 6);
        assert!(registry.contains(&scripted()));
    }

    #[tokio::test]
    async fn unavailable_repository_fails_every_call() {
        let repo = UnavailableRepository::new("down");
        assert!(repo.enabled_rules().await.is_err());
        assert!(repo.rule_by_id("x").await.is_err());
        assert!(repo.refresh().await.is_err());
    }
}
