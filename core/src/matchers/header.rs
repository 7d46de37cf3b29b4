//! `Header` rules: match a request header value.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Deserialize;

use crate::{GrayContext, GrayRule, MatchError, MatchType, RuleMatcher, RuleType, StringMatcher};

/// Compiled patterns kept before the cache is flushed.
const MAX_CACHED_PATTERNS: usize = 4096;

/// Configuration of a `Header` rule.
///
/// ```json
/// { "headerName": "X-Gray", "headerValue": "1" }
/// { "headerName": "User-Agent", "headerValue": "^beta-", "matchType": "regex", "ignoreCase": true }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderRuleConfig {
    /// Header to inspect (case-insensitive).
    pub header_name: String,
    /// Value or pattern to compare against.
    pub header_value: String,
    /// How to compare. Defaults to exact.
    #[serde(default)]
    pub match_type: MatchType,
    /// ASCII case-insensitive comparison.
    #[serde(default)]
    pub ignore_case: bool,
}

#[derive(Debug)]
struct CachedPattern {
    config: HeaderRuleConfig,
    matcher: Arc<StringMatcher>,
}

/// Matches when the named header is present and its value satisfies the
/// configured comparison. A missing header never matches.
///
/// Compiled patterns are cached per rule id and recompiled when the rule's
/// configuration changes.
#[derive(Debug, Default)]
pub struct HeaderMatcher {
    compiled: DashMap<String, CachedPattern>,
}

impl HeaderMatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn decode(rule: &GrayRule) -> Result<HeaderRuleConfig, MatchError> {
        let config: HeaderRuleConfig = rule.typed_config()?;
        if config.header_name.trim().is_empty() {
            return Err(MatchError::invalid_config(
                &rule.id,
                RuleType::Header,
                "headerName must not be empty",
            ));
        }
        Ok(config)
    }

    fn compiled_for(
        &self,
        rule: &GrayRule,
        config: HeaderRuleConfig,
    ) -> Result<Arc<StringMatcher>, MatchError> {
        if let Some(cached) = self.compiled.get(&rule.id) {
            if cached.config == config {
                return Ok(Arc::clone(&cached.matcher));
            }
        }

        let matcher = StringMatcher::compile(
            config.match_type,
            &config.header_value,
            config.ignore_case,
        )
        .map(Arc::new)
        .map_err(|e| MatchError::invalid_config(&rule.id, RuleType::Header, e))?;

        if self.compiled.len() >= MAX_CACHED_PATTERNS {
            self.compiled.clear();
        }
        self.compiled.insert(
            rule.id.clone(),
            CachedPattern {
                config,
                matcher: Arc::clone(&matcher),
            },
        );
        Ok(matcher)
    }
}

impl RuleMatcher for HeaderMatcher {
    fn rule_type(&self) -> RuleType {
        RuleType::Header
    }

    fn is_match(&self, ctx: &GrayContext, rule: &GrayRule) -> Result<bool, MatchError> {
        let config = Self::decode(rule)?;
        let Some(value) = ctx.header(&config.header_name) else {
            return Ok(false);
        };
        let matcher = self.compiled_for(rule, config)?;
        Ok(matcher.matches(value))
    }

    fn check_config(&self, rule: &GrayRule) -> Result<(), MatchError> {
        let config = Self::decode(rule)?;
        self.compiled_for(rule, config).map(|_| ())
    }
}
