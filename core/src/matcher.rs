//! `RuleMatcher` — strategy for one rule type
//!
//! A matcher decides whether a rule's condition holds for a request. One
//! matcher instance serves every rule of its type, from many tasks at once.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::{GrayContext, GrayRule, MatchError, RuleType};

/// Predicate logic for one [`RuleType`].
///
/// # Contract
///
/// - Absent context data means "cannot match": return `Ok(false)`, never an error.
/// - A configuration the matcher cannot decode is [`MatchError::InvalidConfig`];
///   the engine skips that rule and keeps evaluating.
/// - Implementations are called concurrently and must be side-effect free or
///   synchronize their own caches.
///
/// Cheap predicates implement [`is_match`](Self::is_match) only. Matchers
/// needing external lookups (a remote allow-list, say) override
/// [`is_match_async`](Self::is_match_async), which is what the engine calls.
/// Cancellation is by dropping the returned future.
///
/// # Example
///
/// ```
/// use grayroute::{GrayContext, GrayRule, MatchError, RuleMatcher, RuleType};
///
/// #[derive(Debug)]
/// struct MethodMatcher;
///
/// impl RuleMatcher for MethodMatcher {
///     fn rule_type(&self) -> RuleType {
///         RuleType::Other("Method".into())
///     }
///
///     fn is_match(&self, ctx: &GrayContext, rule: &GrayRule) -> Result<bool, MatchError> {
///         let method: String = rule.typed_config()?;
///         Ok(ctx.request_method().eq_ignore_ascii_case(&method))
///     }
/// }
/// ```
#[async_trait]
pub trait RuleMatcher: Send + Sync + Debug {
    /// The single rule type this matcher serves.
    fn rule_type(&self) -> RuleType;

    /// Synchronous evaluation.
    ///
    /// # Errors
    ///
    /// [`MatchError::InvalidConfig`] for an undecodable configuration;
    /// [`MatchError::Lookup`] when a required lookup failed.
    fn is_match(&self, ctx: &GrayContext, rule: &GrayRule) -> Result<bool, MatchError>;

    /// Asynchronous evaluation. Defaults to [`is_match`](Self::is_match).
    ///
    /// # Errors
    ///
    /// Same as [`is_match`](Self::is_match).
    async fn is_match_async(
        &self,
        ctx: &GrayContext,
        rule: &GrayRule,
    ) -> Result<bool, MatchError> {
        self.is_match(ctx, rule)
    }

    /// Check that a rule's configuration is usable without evaluating it.
    ///
    /// Used by tooling to flag broken rules before they are published.
    ///
    /// # Errors
    ///
    /// [`MatchError::InvalidConfig`] if the configuration cannot be decoded.
    fn check_config(&self, rule: &GrayRule) -> Result<(), MatchError> {
        let _ = rule;
        Ok(())
    }
}
