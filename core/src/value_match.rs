//! String value matching
//!
//! [`MatchType`] + value is what a rule's configuration says (the *spec*);
//! [`StringMatcher`] is what evaluates at decision time (the *engine*).
//! Compilation enforces the pattern length limits.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{MAX_PATTERN_LENGTH, MAX_REGEX_PATTERN_LENGTH};

/// Matching strategy named in rule configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Exact string equality.
    #[default]
    Exact,
    /// String starts with the value.
    Prefix,
    /// String ends with the value.
    Suffix,
    /// String contains the value.
    Contains,
    /// Regular expression match (Rust `regex` crate syntax, linear time).
    Regex,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Exact => "exact",
            Self::Prefix => "prefix",
            Self::Suffix => "suffix",
            Self::Contains => "contains",
            Self::Regex => "regex",
        })
    }
}

/// Why a pattern could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    /// The pattern exceeds the length limit for its match type.
    #[error("pattern length is {len}, but maximum allowed is {max}")]
    TooLong {
        /// Actual length.
        len: usize,
        /// Maximum allowed.
        max: usize,
    },
    /// The regex does not compile.
    #[error("invalid regex \"{pattern}\": {reason}")]
    InvalidRegex {
        /// The offending pattern.
        pattern: String,
        /// Compiler message.
        reason: String,
    },
}

/// Compiled string matcher with optional ASCII case-insensitivity.
///
/// # Example
///
/// ```
/// use grayroute::{MatchType, StringMatcher};
///
/// let m = StringMatcher::compile(MatchType::Prefix, "/API/", true).unwrap();
/// assert!(m.matches("/api/users"));
/// assert!(!m.matches("/web"));
///
/// let m = StringMatcher::compile(MatchType::Regex, r"^build-\d+$", false).unwrap();
/// assert!(m.matches("build-42"));
/// ```
#[derive(Debug, Clone)]
pub enum StringMatcher {
    Exact { value: String, ignore_case: bool },
    Prefix { value: String, ignore_case: bool },
    Suffix { value: String, ignore_case: bool },
    /// When `ignore_case` is set, `value` is pre-lowercased at construction.
    Contains { value: String, ignore_case: bool },
    Regex(regex::Regex),
}

impl StringMatcher {
    /// Compile a match spec.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::TooLong`] if the value exceeds
    /// [`MAX_PATTERN_LENGTH`] (or [`MAX_REGEX_PATTERN_LENGTH`] for regex), and
    /// [`PatternError::InvalidRegex`] if the regex does not compile.
    pub fn compile(
        match_type: MatchType,
        value: &str,
        ignore_case: bool,
    ) -> Result<Self, PatternError> {
        let max = if match_type == MatchType::Regex {
            MAX_REGEX_PATTERN_LENGTH
        } else {
            MAX_PATTERN_LENGTH
        };
        if value.len() > max {
            return Err(PatternError::TooLong {
                len: value.len(),
                max,
            });
        }

        let value_owned = value.to_owned();
        Ok(match match_type {
            MatchType::Exact => Self::Exact {
                value: value_owned,
                ignore_case,
            },
            MatchType::Prefix => Self::Prefix {
                value: value_owned,
                ignore_case,
            },
            MatchType::Suffix => Self::Suffix {
                value: value_owned,
                ignore_case,
            },
            MatchType::Contains => Self::Contains {
                value: if ignore_case {
                    value.to_ascii_lowercase()
                } else {
                    value_owned
                },
                ignore_case,
            },
            MatchType::Regex => {
                let pattern = if ignore_case {
                    format!("(?i){value}")
                } else {
                    value_owned
                };
                regex::Regex::new(&pattern)
                    .map(Self::Regex)
                    .map_err(|e| PatternError::InvalidRegex {
                        pattern: value.to_owned(),
                        reason: e.to_string(),
                    })?
            }
        })
    }

    /// Check `input` against this matcher.
    #[must_use]
    pub fn matches(&self, input: &str) -> bool {
        match self {
            Self::Exact { value, ignore_case } => {
                if *ignore_case {
                    input.eq_ignore_ascii_case(value)
                } else {
                    input == value
                }
            }
            Self::Prefix { value, ignore_case } => {
                if *ignore_case {
                    input
                        .get(..value.len())
                        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(value))
                } else {
                    input.starts_with(value.as_str())
                }
            }
            Self::Suffix { value, ignore_case } => {
                if *ignore_case {
                    input
                        .len()
                        .checked_sub(value.len())
                        .and_then(|start| input.get(start..))
                        .is_some_and(|suffix| suffix.eq_ignore_ascii_case(value))
                } else {
                    input.ends_with(value.as_str())
                }
            }
            Self::Contains { value, ignore_case } => {
                if *ignore_case {
                    input.to_ascii_lowercase().contains(value.as_str())
                } else {
                    input.contains(value.as_str())
                }
            }
            Self::Regex(re) => re.is_match(input),
        }
    }
}
