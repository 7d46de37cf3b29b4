//! grayroute - gray-release (canary) routing decisions
//!
//! Given a request's attributes, decide whether it goes to a canary
//! deployment and to which target version.
//!
//! # Architecture
//!
//! - [`GrayContext`] — Per-request attribute bag (user, tenant, path, headers, ...)
//! - [`GrayRule`] — Read-only rule: type, priority, validity window, target, opaque config
//! - [`RuleRepository`] — Source of enabled rules, published as immutable [`RuleSnapshot`]s
//! - [`RuleMatcher`] — Predicate strategy for one [`RuleType`]
//! - [`MatcherRegistry`] — Immutable `RuleType → RuleMatcher` map, built once at startup
//! - [`RuleEngine`] — Fetch, filter, order, dispatch, resolve: one [`Decision`] per request
//!
//! # Key Design Insights
//!
//! 1. **Fail closed to stable**: `decide` never returns an error and never panics.
//!    Repository faults, matcher errors and panics all become `NotGray`.
//!
//! 2. **Absent data → no match**: A context without the attribute a matcher
//!    needs does not match. This is a critical invariant.
//!
//! 3. **First match wins**: Rules run in `(priority, id)` order and evaluation
//!    stops at the first match.
//!
//! 4. **Snapshots, not locks**: Decisions read an `ArcSwap`'d snapshot; a
//!    publish never blocks or tears a decision in flight.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use grayroute::prelude::*;
//! use serde_json::json;
//!
//! let repo = InMemoryRuleRepository::new();
//! repo.add_rule(
//!     GrayRule::new("beta-users", "beta users", RuleType::UserId, "v2")
//!         .with_priority(1)
//!         .with_configuration(json!({ "ids": [1001, 1002] })),
//! )
//! .unwrap();
//!
//! let engine = RuleEngine::new(Arc::new(repo), MatcherRegistry::builtin());
//!
//! let beta = GrayContext::builder().user_id(1001).build();
//! let other = GrayContext::builder().user_id(7).build();
//!
//! futures::executor::block_on(async {
//!     let d = engine.decide(&beta).await;
//!     assert!(d.is_gray());
//!     assert_eq!(d.target_version(), Some("v2"));
//!
//!     let d = engine.decide(&other).await;
//!     assert!(!d.is_gray());
//!     assert_eq!(d.reason(), "no rule matched");
//! });
//! ```
//!
//! # Extensions
//!
//! New rule types plug in as [`RuleMatcher`] implementations registered next
//! to the built-ins via [`register_builtin_matchers`].

// ═══════════════════════════════════════════════════════════════════════════════
// Modules
// ═══════════════════════════════════════════════════════════════════════════════

mod clock;
mod config;
mod context;
mod decision;
mod engine;
mod error;
mod matcher;
mod registry;
mod repository;
mod rule;
mod trace;
mod value_match;

pub mod matchers;

// ═══════════════════════════════════════════════════════════════════════════════
// Public API
// ═══════════════════════════════════════════════════════════════════════════════

// Core types
pub use context::{GrayContext, GrayContextBuilder, HeaderMap};
pub use decision::{
    Decision, REASON_EXCEPTION_PREFIX, REASON_NO_ENABLED_RULES, REASON_NO_RULE_MATCHED,
};
pub use engine::RuleEngine;
pub use rule::{GrayRule, RuleType, WindowState};

// Matching
pub use matcher::RuleMatcher;
pub use registry::{register_builtin_matchers, MatcherRegistry, MatcherRegistryBuilder};
pub use value_match::{MatchType, PatternError, StringMatcher};

// Storage
pub use repository::{
    spawn_refresher, FileRuleSource, InMemoryRuleRepository, RuleRepository, RuleSnapshot,
    RuleSource, StaticRuleSource,
};

// Config, time, errors
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{DocumentFormat, EngineConfig, RulesDocument};
pub use error::{ConfigError, MatchError, RepositoryError, RuleError};

// Trace types
pub use trace::{DecisionTrace, FilterReason, FilteredRule, RuleOutcome, RuleStep};

// ═══════════════════════════════════════════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════════════════════════════════════════

/// Prelude module for convenient imports.
///
/// ```
/// use grayroute::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Core types
        Decision,
        // Trace types
        DecisionTrace,
        GrayContext,
        GrayRule,
        // Storage
        InMemoryRuleRepository,
        // Errors
        MatchError,
        MatcherRegistry,
        MatcherRegistryBuilder,
        RuleEngine,
        // Traits
        RuleMatcher,
        RuleRepository,
        RuleType,
    };
}

// ═══════════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════════

/// Maximum length for non-regex string match patterns (exact, prefix, suffix, contains).
pub const MAX_PATTERN_LENGTH: usize = 8192;

/// Maximum length for regex patterns.
///
/// Regex compilation is expensive even with the linear-time Rust `regex` crate.
/// Shorter limit than [`MAX_PATTERN_LENGTH`] because regex complexity scales
/// faster than literal matching.
pub const MAX_REGEX_PATTERN_LENGTH: usize = 4096;
