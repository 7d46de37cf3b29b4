//! Decision trace types for debugging rule behavior.
//!
//! [`RuleEngine::decide_with_trace`](crate::RuleEngine::decide_with_trace)
//! runs the same pipeline as `decide` and records what happened to every
//! rule in the snapshot: filtered out before dispatch, or evaluated with
//! some outcome.
//!
//! # Example
//!
//! ```ignore
//! let trace = engine.decide_with_trace(&ctx).await;
//! println!("decision: {:?}", trace.decision);
//! for step in &trace.steps {
//!     println!("  {} ({}): {:?}", step.rule_id, step.rule_type, step.outcome);
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{Decision, RuleType};

/// Why a rule was dropped before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FilterReason {
    Disabled,
    NotYetEffective,
    Expired,
}

/// A rule dropped before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredRule {
    pub rule_id: String,
    pub reason: FilterReason,
}

/// What evaluating one rule produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RuleOutcome {
    /// The matcher returned `true`. Always the last step.
    Matched,
    NotMatched,
    /// No matcher is registered for the rule's type.
    NoMatcher,
    /// The matcher could not decode the rule's configuration.
    InvalidConfig(String),
    /// The matcher returned a runtime error or panicked.
    Failed(String),
}

/// One evaluated rule, in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleStep {
    pub rule_id: String,
    pub rule_type: RuleType,
    pub priority: u32,
    pub outcome: RuleOutcome,
}

/// Full record of one decision.
///
/// # INV: `decision` == `decide()` result
///
/// The traced pipeline is the one `decide` runs, so for the same snapshot,
/// clock and matchers both produce the same [`Decision`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionTrace {
    pub decision: Decision,
    /// Snapshot generation evaluated. `None` when the rules could not be fetched.
    pub generation: Option<u64>,
    /// The instant validity windows were checked against.
    pub evaluated_at: DateTime<Utc>,
    pub filtered: Vec<FilteredRule>,
    pub steps: Vec<RuleStep>,
}

impl DecisionTrace {
    /// The step that produced a gray decision, if any.
    #[must_use]
    pub fn matched_step(&self) -> Option<&RuleStep> {
        self.steps
            .last()
            .filter(|step| step.outcome == RuleOutcome::Matched)
    }

    /// Rule ids skipped because of a configuration problem or missing matcher.
    pub fn skipped(&self) -> impl Iterator<Item = &str> {
        self.steps
            .iter()
            .filter(|s| {
                matches!(
                    s.outcome,
                    RuleOutcome::NoMatcher | RuleOutcome::InvalidConfig(_)
                )
            })
            .map(|s| s.rule_id.as_str())
    }
}
