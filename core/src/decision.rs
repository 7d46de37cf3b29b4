//! `Decision`: the engine's single output per request

use std::collections::BTreeMap;

use serde::Serialize;

use crate::GrayRule;

/// Reason given when the repository has no enabled rules.
pub const REASON_NO_ENABLED_RULES: &str = "no enabled rules";

/// Reason given when no rule matched.
pub const REASON_NO_RULE_MATCHED: &str = "no rule matched";

/// Prefix of the reason given when the decision itself failed.
pub const REASON_EXCEPTION_PREFIX: &str = "decision exception: ";

/// Whether and where to route a request.
///
/// Constructed only through [`Decision::gray`] and [`Decision::not_gray`], so
/// a decision is never partially populated: a gray decision always carries
/// its target and the matched rule, a stable one never does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    is_gray: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_service_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    matched_rule_id: Option<String>,
    reason: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    extensions: BTreeMap<String, String>,
}

impl Decision {
    /// Route to the canary described by `rule`.
    ///
    /// Carries the rule's target version and target service, and records the
    /// rule's type and priority under the `ruleType` and `priority` extensions.
    #[must_use]
    pub fn gray(rule: &GrayRule) -> Self {
        let mut extensions = BTreeMap::new();
        extensions.insert("ruleType".to_owned(), rule.rule_type.to_string());
        extensions.insert("priority".to_owned(), rule.priority.to_string());
        Self {
            is_gray: true,
            target_version: Some(rule.target_version.clone()),
            target_service_id: rule.target_service_id.clone(),
            matched_rule_id: Some(rule.id.clone()),
            reason: format!("matched rule: {}", rule.name),
            extensions,
        }
    }

    /// Route to the stable pool.
    #[must_use]
    pub fn not_gray(reason: impl Into<String>) -> Self {
        Self {
            is_gray: false,
            target_version: None,
            target_service_id: None,
            matched_rule_id: None,
            reason: reason.into(),
            extensions: BTreeMap::new(),
        }
    }

    /// Stable decision for a fault inside the engine.
    #[must_use]
    pub fn failed(message: impl std::fmt::Display) -> Self {
        Self::not_gray(format!("{REASON_EXCEPTION_PREFIX}{message}"))
    }

    /// Attach an extension value.
    #[must_use]
    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn is_gray(&self) -> bool {
        self.is_gray
    }

    #[must_use]
    pub fn target_version(&self) -> Option<&str> {
        self.target_version.as_deref()
    }

    #[must_use]
    pub fn target_service_id(&self) -> Option<&str> {
        self.target_service_id.as_deref()
    }

    #[must_use]
    pub fn matched_rule_id(&self) -> Option<&str> {
        self.matched_rule_id.as_deref()
    }

    /// Human-readable explanation, suitable for logs and response headers.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    #[must_use]
    pub fn extension(&self, key: &str) -> Option<&str> {
        self.extensions.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn extensions(&self) -> &BTreeMap<String, String> {
        &self.extensions
    }

    /// Returns `true` if this stable decision came from an engine fault.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !self.is_gray && self.reason.starts_with(REASON_EXCEPTION_PREFIX)
    }
}
