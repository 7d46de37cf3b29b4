//! Serde-deserializable configuration: engine settings and rule documents.
//!
//! | Config type | Used by | Format |
//! |-------------|---------|--------|
//! | [`EngineConfig`] | [`RuleEngine::decide_configured`](crate::RuleEngine::decide_configured), the CLI (`rulesPath` feeds a [`FileRuleSource`](crate::FileRuleSource), `refreshIntervalSecs` drives [`spawn_refresher`](crate::spawn_refresher)) | YAML or JSON |
//! | [`RulesDocument`] | [`FileRuleSource`](crate::FileRuleSource), the CLI | YAML or JSON |
//!
//! The format is picked from the file extension: `.json` is JSON, everything
//! else is YAML (a superset of JSON).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, GrayRule, RuleError};

/// On-disk document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    /// Pick the format from a path's extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }

    /// Deserialize `text` in this format.
    ///
    /// # Errors
    ///
    /// Returns the deserializer's message when `text` does not fit `T`.
    pub fn parse<T: DeserializeOwned>(self, text: &str) -> Result<T, String> {
        match self {
            Self::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
            Self::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
        }
    }
}

/// Engine settings.
///
/// ```yaml
/// decisionTimeoutMs: 50
/// refreshIntervalSecs: 30
/// rulesPath: /etc/grayroute/rules.yaml
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EngineConfig {
    /// Upper bound on one decision. `None` means unbounded.
    #[serde(default)]
    pub decision_timeout_ms: Option<u64>,

    /// Background refresh period. `None` disables background refresh.
    #[serde(default)]
    pub refresh_interval_secs: Option<u64>,

    /// Rules document backing the repository.
    #[serde(default)]
    pub rules_path: Option<PathBuf>,
}

impl EngineConfig {
    /// Load settings from a YAML or JSON file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Invalid`]
    /// if it does not parse or fails [`validate`](Self::validate).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = DocumentFormat::from_path(path)
            .parse(&text)
            .map_err(ConfigError::Invalid)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject zero durations.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.decision_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "decisionTimeoutMs must be greater than zero".into(),
            ));
        }
        if self.refresh_interval_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "refreshIntervalSecs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn decision_timeout(&self) -> Option<Duration> {
        self.decision_timeout_ms.map(Duration::from_millis)
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_secs.map(Duration::from_secs)
    }
}

/// A complete rule set as stored on disk.
///
/// ```yaml
/// rules:
///   - id: header-canary
///     name: header canary
///     type: Header
///     priority: 1
///     targetVersion: v2
///     configuration: { headerName: X-Gray, headerValue: "1" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulesDocument {
    #[serde(default)]
    pub rules: Vec<GrayRule>,
}

impl RulesDocument {
    /// Parse a document in the given format.
    ///
    /// # Errors
    ///
    /// The deserializer's message when `text` is not a rules document.
    pub fn parse(text: &str, format: DocumentFormat) -> Result<Self, String> {
        format.parse(text)
    }

    /// Validate every rule and reject duplicate ids.
    ///
    /// # Errors
    ///
    /// The first [`RuleError`] found, in document order.
    pub fn validate(&self) -> Result<(), RuleError> {
        let mut seen = HashSet::with_capacity(self.rules.len());
        for rule in &self.rules {
            rule.validate()?;
            if !seen.insert(rule.id.as_str()) {
                return Err(RuleError::DuplicateId {
                    rule_id: rule.id.clone(),
                });
            }
        }
        Ok(())
    }
}
