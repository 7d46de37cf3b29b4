//! Error types.
//!
//! None of these ever cross [`RuleEngine::decide`](crate::RuleEngine::decide):
//! the engine converts every fault into a stable (`NotGray`) decision. They
//! surface from administrative operations, rule sources and config loading.

use std::path::PathBuf;

use thiserror::Error;

use crate::RuleType;

/// A rule violates a structural precondition.
///
/// Returned synchronously by administrative operations such as
/// [`InMemoryRuleRepository::add_rule`](crate::InMemoryRuleRepository::add_rule).
/// These indicate a caller bug, not a runtime condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// The rule id is empty or whitespace.
    #[error("rule id must not be empty")]
    EmptyId,

    /// The rule has no target version to route to.
    #[error("rule \"{rule_id}\" has an empty target version")]
    EmptyTargetVersion {
        /// The offending rule.
        rule_id: String,
    },

    /// `expiry_time` is not after `effective_time`.
    #[error("rule \"{rule_id}\" expires before it becomes effective")]
    InvalidWindow {
        /// The offending rule.
        rule_id: String,
    },

    /// Two rules in one document share an id.
    #[error("duplicate rule id \"{rule_id}\"")]
    DuplicateId {
        /// The repeated id.
        rule_id: String,
    },
}

/// A matcher could not evaluate a rule.
///
/// The engine treats every variant as "did not match" and moves on to the
/// next rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    /// The rule's configuration payload does not fit the matcher's shape.
    #[error("invalid {rule_type} configuration for rule \"{rule_id}\": {reason}")]
    InvalidConfig {
        /// The rule being evaluated.
        rule_id: String,
        /// The matcher's rule type.
        rule_type: RuleType,
        /// Why the configuration was rejected.
        reason: String,
    },

    /// A matcher needing an external lookup failed to complete it.
    #[error("lookup failed for rule \"{rule_id}\": {reason}")]
    Lookup {
        /// The rule being evaluated.
        rule_id: String,
        /// The underlying failure.
        reason: String,
    },
}

impl MatchError {
    /// Build an [`InvalidConfig`](Self::InvalidConfig) error.
    pub fn invalid_config(
        rule_id: impl Into<String>,
        rule_type: RuleType,
        reason: impl ToString,
    ) -> Self {
        Self::InvalidConfig {
            rule_id: rule_id.into(),
            rule_type,
            reason: reason.to_string(),
        }
    }

    /// Returns `true` for configuration errors (logged as warnings, rule skipped).
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }
}

/// The rule repository or its backing source failed.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Reading the backing file failed.
    #[error("failed to read rules from {}: {source}", .path.display())]
    Io {
        /// File that could not be read.
        path: PathBuf,
        /// The I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The backing document could not be parsed.
    #[error("failed to parse rules from {}: {message}", .path.display())]
    Parse {
        /// File that could not be parsed.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A loaded rule failed validation.
    #[error("rule source produced an invalid rule: {0}")]
    InvalidRule(#[from] RuleError),

    /// The backing store is unreachable.
    #[error("rule store unavailable: {0}")]
    Unavailable(String),
}

/// Engine configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the config file failed.
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        /// The config file.
        path: PathBuf,
        /// The I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config document is malformed.
    #[error("invalid config: {0}")]
    Invalid(String),
}
