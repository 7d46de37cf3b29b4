//! `UserId` and `TenantId` rules: explicit allow-lists.

use std::collections::HashSet;

use serde::Deserialize;

use crate::{GrayContext, GrayRule, MatchError, RuleMatcher, RuleType};

/// Configuration of an id-list rule.
///
/// ```json
/// { "ids": [1001, 1002] }
/// ```
///
/// `userIds` and `tenantIds` are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdListConfig {
    #[serde(alias = "userIds", alias = "tenantIds")]
    pub ids: HashSet<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdField {
    User,
    Tenant,
}

/// Matches when the context's user (or tenant) id is in the rule's list.
/// A context without that id never matches.
#[derive(Debug, Clone)]
pub struct IdListMatcher {
    field: IdField,
}

impl IdListMatcher {
    /// Matcher for `UserId` rules.
    #[must_use]
    pub fn user_id() -> Self {
        Self {
            field: IdField::User,
        }
    }

    /// Matcher for `TenantId` rules.
    #[must_use]
    pub fn tenant_id() -> Self {
        Self {
            field: IdField::Tenant,
        }
    }

    fn subject(&self, ctx: &GrayContext) -> Option<i64> {
        match self.field {
            IdField::User => ctx.user_id(),
            IdField::Tenant => ctx.tenant_id(),
        }
    }
}

impl RuleMatcher for IdListMatcher {
    fn rule_type(&self) -> RuleType {
        match self.field {
            IdField::User => RuleType::UserId,
            IdField::Tenant => RuleType::TenantId,
        }
    }

    fn is_match(&self, ctx: &GrayContext, rule: &GrayRule) -> Result<bool, MatchError> {
        let config: IdListConfig = rule.typed_config()?;
        Ok(self.subject(ctx).is_some_and(|id| config.ids.contains(&id)))
    }

    fn check_config(&self, rule: &GrayRule) -> Result<(), MatchError> {
        rule.typed_config::<IdListConfig>().map(|_| ())
    }
}
