//! Matcher registry: rule type → matcher.
//!
//! Built once at startup, then frozen. Decision-time dispatch is a single hash
//! lookup on the rule's [`RuleType`] tag, with no runtime registration.
//!
//! # Example
//!
//! ```
//! use grayroute::{register_builtin_matchers, MatcherRegistryBuilder, RuleType};
//!
//! let registry = register_builtin_matchers(MatcherRegistryBuilder::new()).build();
//!
//! assert!(registry.contains(&RuleType::Header));
//! assert!(!registry.contains(&RuleType::Other("GeoRegion".into())));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::matchers::{HeaderMatcher, IdListMatcher, IpRangeMatcher, PercentageMatcher};
use crate::{RuleMatcher, RuleType};

/// Builder for a [`MatcherRegistry`].
///
/// Registering a second matcher for the same rule type replaces the first.
#[derive(Default)]
pub struct MatcherRegistryBuilder {
    matchers: HashMap<RuleType, Arc<dyn RuleMatcher>>,
}

impl MatcherRegistryBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a matcher under the rule type it declares.
    #[must_use]
    pub fn matcher<M: RuleMatcher + 'static>(self, matcher: M) -> Self {
        self.shared(Arc::new(matcher))
    }

    /// Register an already shared matcher.
    #[must_use]
    pub fn shared(mut self, matcher: Arc<dyn RuleMatcher>) -> Self {
        let rule_type = matcher.rule_type();
        if self.matchers.insert(rule_type.clone(), matcher).is_some() {
            tracing::debug!(%rule_type, "replacing previously registered matcher");
        }
        self
    }

    /// Freeze the registry. No further registration is possible.
    #[must_use]
    pub fn build(self) -> MatcherRegistry {
        MatcherRegistry {
            matchers: self.matchers,
        }
    }
}

impl fmt::Debug for MatcherRegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatcherRegistryBuilder")
            .field("matchers", &self.matchers.len())
            .finish()
    }
}

/// Register the built-in matchers: `Header`, `UserId`, `TenantId`,
/// `Percentage` and `IpAddress`.
///
/// Extensions add their own matchers on top:
///
/// ```ignore
/// let registry = register_builtin_matchers(MatcherRegistryBuilder::new())
///     .matcher(GeoRegionMatcher::new(geo_db))
///     .build();
/// ```
#[must_use]
pub fn register_builtin_matchers(builder: MatcherRegistryBuilder) -> MatcherRegistryBuilder {
    builder
        .matcher(HeaderMatcher::new())
        .matcher(IdListMatcher::user_id())
        .matcher(IdListMatcher::tenant_id())
        .matcher(PercentageMatcher::new())
        .matcher(IpRangeMatcher::new())
}

/// Immutable map from [`RuleType`] to its [`RuleMatcher`].
pub struct MatcherRegistry {
    matchers: HashMap<RuleType, Arc<dyn RuleMatcher>>,
}

impl MatcherRegistry {
    /// Registry with the built-in matchers only.
    #[must_use]
    pub fn builtin() -> Self {
        register_builtin_matchers(MatcherRegistryBuilder::new()).build()
    }

    /// Look up the matcher for a rule type.
    #[must_use]
    pub fn get(&self, rule_type: &RuleType) -> Option<&Arc<dyn RuleMatcher>> {
        self.matchers.get(rule_type)
    }

    /// Returns `true` if a matcher is registered for the rule type.
    #[must_use]
    pub fn contains(&self, rule_type: &RuleType) -> bool {
        self.matchers.contains_key(rule_type)
    }

    /// Number of registered rule types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// Registered rule types, sorted by name.
    #[must_use]
    pub fn rule_types(&self) -> Vec<&RuleType> {
        let mut types: Vec<&RuleType> = self.matchers.keys().collect();
        types.sort_unstable_by(|a, b| a.as_str().cmp(b.as_str()));
        types
    }
}

impl fmt::Debug for MatcherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatcherRegistry")
            .field("rule_types", &self.rule_types())
            .finish()
    }
}
