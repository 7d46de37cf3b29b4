//! `GrayRule`: read-only rule descriptor
//!
//! Rules are owned by the management plane. The engine only ever sees them
//! through immutable repository snapshots.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{MatchError, RuleError};

/// Rule type tag. Selects the matcher that evaluates a rule.
///
/// Serialized as its name. Names this build does not know deserialize to
/// [`RuleType::Other`] rather than failing, so a rule file written for a newer
/// build still loads; such rules are skipped at decision time unless a matcher
/// is registered for them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleType {
    /// Stable hash bucket of a request attribute.
    Percentage,
    /// User id allow-list.
    UserId,
    /// Tenant id allow-list.
    TenantId,
    /// Request header match.
    Header,
    /// Client address inside a set of ranges.
    IpAddress,
    /// A type registered by an extension, or unknown to this build.
    Other(String),
}

impl RuleType {
    /// Canonical name, as written in rule documents.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Percentage => "Percentage",
            Self::UserId => "UserId",
            Self::TenantId => "TenantId",
            Self::Header => "Header",
            Self::IpAddress => "IpAddress",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for RuleType {
    /// Known names match case-insensitively, ignoring `_` and `-`
    /// (`user_id`, `userId` and `UserId` are the same type).
    fn from(name: String) -> Self {
        let folded: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match folded.as_str() {
            "percentage" => Self::Percentage,
            "userid" => Self::UserId,
            "tenantid" => Self::TenantId,
            "header" => Self::Header,
            "ipaddress" | "ip" => Self::IpAddress,
            _ => Self::Other(name),
        }
    }
}

impl From<&str> for RuleType {
    fn from(name: &str) -> Self {
        Self::from(name.to_owned())
    }
}

impl From<RuleType> for String {
    fn from(rule_type: RuleType) -> Self {
        match rule_type {
            RuleType::Other(name) => name,
            known => known.as_str().to_owned(),
        }
    }
}

impl FromStr for RuleType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a rule's validity window stands at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// Inside the window (or the rule has no window).
    Active,
    /// `effective_time` is still in the future.
    NotYetEffective,
    /// `expiry_time` has been reached.
    Expired,
}

/// A gray-release rule: a condition (type + configuration) plus a target.
///
/// # Example
///
/// ```
/// use grayroute::{GrayRule, RuleType};
/// use serde_json::json;
///
/// let rule = GrayRule::new("r1", "header canary", RuleType::Header, "v2")
///     .with_priority(1)
///     .with_configuration(json!({ "headerName": "X-Gray", "headerValue": "1" }));
///
/// assert!(rule.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrayRule {
    /// Unique, stable identifier.
    pub id: String,

    /// Human-readable name, used in decision reasons.
    #[serde(default)]
    pub name: String,

    /// Selects the matcher.
    #[serde(rename = "type", alias = "ruleType")]
    pub rule_type: RuleType,

    /// Disabled rules never influence a decision.
    #[serde(default = "default_enabled", alias = "isEnabled")]
    pub enabled: bool,

    /// Lower is evaluated first. Ties are broken by `id`.
    pub priority: u32,

    /// Version routed to on match.
    pub target_version: String,

    /// Service routed to on match, when the canary lives in a separate service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_service_id: Option<String>,

    /// Type-specific payload, decoded by the matcher.
    #[serde(default, alias = "config")]
    pub configuration: serde_json::Value,

    /// The rule is ignored before this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_time: Option<DateTime<Utc>>,

    /// The rule is ignored from this instant on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl GrayRule {
    /// Create an enabled rule with priority 0, no window and empty configuration.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        rule_type: RuleType,
        target_version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rule_type,
            enabled: true,
            priority: 0,
            target_version: target_version.into(),
            target_service_id: None,
            configuration: serde_json::Value::Null,
            effective_time: None,
            expiry_time: None,
            created_at: None,
            updated_at: None,
            created_by: None,
            updated_by: None,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_configuration(mut self, configuration: serde_json::Value) -> Self {
        self.configuration = configuration;
        self
    }

    #[must_use]
    pub fn with_target_service(mut self, service_id: impl Into<String>) -> Self {
        self.target_service_id = Some(service_id.into());
        self
    }

    #[must_use]
    pub fn with_effective_time(mut self, at: DateTime<Utc>) -> Self {
        self.effective_time = Some(at);
        self
    }

    #[must_use]
    pub fn with_expiry_time(mut self, at: DateTime<Utc>) -> Self {
        self.expiry_time = Some(at);
        self
    }

    /// Check structural preconditions.
    ///
    /// # Errors
    ///
    /// - [`RuleError::EmptyId`] if `id` is blank
    /// - [`RuleError::EmptyTargetVersion`] if `target_version` is blank
    /// - [`RuleError::InvalidWindow`] if `expiry_time <= effective_time`
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.id.trim().is_empty() {
            return Err(RuleError::EmptyId);
        }
        if self.target_version.trim().is_empty() {
            return Err(RuleError::EmptyTargetVersion {
                rule_id: self.id.clone(),
            });
        }
        if let (Some(effective), Some(expiry)) = (self.effective_time, self.expiry_time) {
            if expiry <= effective {
                return Err(RuleError::InvalidWindow {
                    rule_id: self.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Where `now` falls relative to this rule's validity window.
    ///
    /// The window is half-open: active from `effective_time` inclusive up to
    /// `expiry_time` exclusive.
    #[must_use]
    pub fn window_state(&self, now: DateTime<Utc>) -> WindowState {
        if self.effective_time.is_some_and(|at| now < at) {
            WindowState::NotYetEffective
        } else if self.expiry_time.is_some_and(|at| now >= at) {
            WindowState::Expired
        } else {
            WindowState::Active
        }
    }

    /// Returns `true` if the rule is inside its validity window at `now`.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.window_state(now) == WindowState::Active
    }

    /// Decode the configuration payload into a matcher's config type.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::InvalidConfig`] if the payload does not fit `T`.
    pub fn typed_config<T: DeserializeOwned>(&self) -> Result<T, MatchError> {
        T::deserialize(&self.configuration)
            .map_err(|e| MatchError::invalid_config(&self.id, self.rule_type.clone(), e))
    }
}
