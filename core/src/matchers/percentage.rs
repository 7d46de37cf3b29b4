//! `Percentage` rules: sticky hash-bucket sampling.
//!
//! A request lands in bucket `sha256("<rule id>:<key>") mod 100`, and matches
//! when the bucket is below the configured percentage. The same key always
//! lands in the same bucket for a given rule, so a user stays on one side of
//! the split while the percentage is unchanged, and raising the percentage
//! only ever adds users.

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::{GrayContext, GrayRule, MatchError, RuleMatcher, RuleType};

/// Number of buckets a key hashes into.
pub const BUCKETS: u64 = 100;

/// Request attribute the bucket is derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HashSource {
    #[default]
    UserId,
    TenantId,
    /// The canonical client address; the port of a socket address is ignored.
    ClientIp,
    /// The value of `headerName`.
    Header,
}

/// Configuration of a `Percentage` rule.
///
/// ```json
/// { "percentage": 20 }
/// { "percentage": 5, "hashBy": "header", "headerName": "X-Device-Id" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentageConfig {
    /// Share of traffic in percent, `0..=100`.
    pub percentage: u8,
    #[serde(default)]
    pub hash_by: HashSource,
    #[serde(default)]
    pub header_name: Option<String>,
}

/// Sticky percentage matcher.
///
/// A request without the hashed attribute never matches, even at 100%.
#[derive(Debug, Clone, Copy, Default)]
pub struct PercentageMatcher;

impl PercentageMatcher {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Bucket in `0..BUCKETS` for a key under a rule.
    #[must_use]
    pub fn bucket(rule_id: &str, key: &str) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(rule_id.as_bytes());
        hasher.update(b":");
        hasher.update(key.as_bytes());
        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(head) % BUCKETS
    }

    fn decode(rule: &GrayRule) -> Result<PercentageConfig, MatchError> {
        let config: PercentageConfig = rule.typed_config()?;
        if u64::from(config.percentage) > BUCKETS {
            return Err(MatchError::invalid_config(
                &rule.id,
                RuleType::Percentage,
                format!("percentage must be within 0..=100, got {}", config.percentage),
            ));
        }
        if config.hash_by == HashSource::Header
            && config.header_name.as_deref().map_or(true, |h| h.trim().is_empty())
        {
            return Err(MatchError::invalid_config(
                &rule.id,
                RuleType::Percentage,
                "hashBy header requires headerName",
            ));
        }
        Ok(config)
    }

    fn key(ctx: &GrayContext, config: &PercentageConfig) -> Option<String> {
        match config.hash_by {
            HashSource::UserId => ctx.user_id().map(|id| id.to_string()),
            HashSource::TenantId => ctx.tenant_id().map(|id| id.to_string()),
            HashSource::ClientIp => ctx.client_addr().map(|addr| addr.to_string()),
            HashSource::Header => config
                .header_name
                .as_deref()
                .and_then(|name| ctx.header(name))
                .map(str::to_owned),
        }
    }
}

impl RuleMatcher for PercentageMatcher {
    fn rule_type(&self) -> RuleType {
        RuleType::Percentage
    }

    fn is_match(&self, ctx: &GrayContext, rule: &GrayRule) -> Result<bool, MatchError> {
        let config = Self::decode(rule)?;
        if config.percentage == 0 {
            return Ok(false);
        }
        let Some(key) = Self::key(ctx, &config) else {
            return Ok(false);
        };
        Ok(Self::bucket(&rule.id, &key) < u64::from(config.percentage))
    }

    fn check_config(&self, rule: &GrayRule) -> Result<(), MatchError> {
        Self::decode(rule).map(|_| ())
    }
}
