//! `RuleEngine` — one decision per request
//!
//! The pipeline:
//!
//! 1. **Fetch** the enabled-rule snapshot. A repository error becomes a
//!    stable decision; an empty snapshot is `"no enabled rules"`.
//! 2. **Filter** disabled rules, then rules outside their validity window.
//!    "Now" is sampled once per decision.
//! 3. **Order** by `(priority, id)` ascending.
//! 4. **Dispatch** each rule to the matcher registered for its type. No
//!    matcher, bad configuration, an error or a panic: that rule did not
//!    match, and evaluation continues with the next one.
//! 5. **Resolve**: the first match wins and later rules are never evaluated.
//!    Nothing matched is `"no rule matched"`.
//!
//! A decision never fails. Every fault, including a panic anywhere in the
//! pipeline, is a stable decision whose reason starts with
//! [`REASON_EXCEPTION_PREFIX`](crate::REASON_EXCEPTION_PREFIX).

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;

use crate::trace::{DecisionTrace, FilterReason, FilteredRule, RuleOutcome, RuleStep};
use crate::{
    Clock, Decision, EngineConfig, GrayContext, GrayRule, MatchError, MatcherRegistry,
    RuleMatcher, RuleRepository, SystemClock, WindowState, REASON_NO_ENABLED_RULES,
    REASON_NO_RULE_MATCHED,
};

/// Gray-release decision engine.
///
/// Holds no mutable state: `decide` takes `&self` and may run on any number
/// of tasks at once. Cloning is cheap and shares the repository, registry and
/// clock.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use grayroute::{GrayContext, GrayRule, InMemoryRuleRepository, MatcherRegistry, RuleEngine, RuleType};
/// use serde_json::json;
///
/// let repo = InMemoryRuleRepository::new();
/// repo.add_rule(
///     GrayRule::new("r1", "header canary", RuleType::Header, "v2")
///         .with_configuration(json!({ "headerName": "X-Gray", "headerValue": "1" })),
/// ).unwrap();
///
/// let engine = RuleEngine::new(Arc::new(repo), MatcherRegistry::builtin());
/// let ctx = GrayContext::builder().header("X-Gray", "1").build();
///
/// let decision = futures::executor::block_on(engine.decide(&ctx));
/// assert!(decision.is_gray());
/// assert_eq!(decision.target_version(), Some("v2"));
/// ```
#[derive(Debug, Clone)]
pub struct RuleEngine {
    repository: Arc<dyn RuleRepository>,
    registry: Arc<MatcherRegistry>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl RuleEngine {
    /// Engine over `repository`, dispatching to `registry`, on the system clock.
    #[must_use]
    pub fn new(repository: Arc<dyn RuleRepository>, registry: MatcherRegistry) -> Self {
        Self {
            repository,
            registry: Arc::new(registry),
            clock: Arc::new(SystemClock),
            config: EngineConfig::default(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Settings used by [`decide_configured`](Self::decide_configured).
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn repository(&self) -> &Arc<dyn RuleRepository> {
        &self.repository
    }

    #[must_use]
    pub fn registry(&self) -> &MatcherRegistry {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Decide whether `ctx` goes to a canary.
    ///
    /// Never fails and never panics. Dropping the future cancels the decision
    /// and any matcher call in flight.
    pub async fn decide(&self, ctx: &GrayContext) -> Decision {
        let mut recorder = NoTrace;
        self.run_contained(ctx, &mut recorder).await
    }

    /// [`decide`](Self::decide), plus a record of what happened to each rule.
    pub async fn decide_with_trace(&self, ctx: &GrayContext) -> DecisionTrace {
        let mut recorder = TraceRecorder::default();
        let decision = self.run_contained(ctx, &mut recorder).await;
        DecisionTrace {
            decision,
            generation: recorder.generation,
            evaluated_at: recorder.evaluated_at.unwrap_or_else(|| self.clock.now()),
            filtered: recorder.filtered,
            steps: recorder.steps,
        }
    }

    /// [`decide`](Self::decide) bounded by `timeout`.
    ///
    /// When the deadline passes, the decision in flight is dropped and the
    /// request goes to stable.
    ///
    /// # Panics
    ///
    /// If polled outside a tokio runtime with the time driver enabled. Use
    /// [`decide`](Self::decide) on other executors.
    pub async fn decide_within(&self, ctx: &GrayContext, timeout: Duration) -> Decision {
        match tokio::time::timeout(timeout, self.decide(ctx)).await {
            Ok(decision) => decision,
            Err(_) => {
                tracing::warn!(timeout_ms = %timeout.as_millis(), "decision timed out");
                Decision::not_gray(format!(
                    "decision timed out after {}ms",
                    timeout.as_millis()
                ))
            }
        }
    }

    /// [`decide_within`](Self::decide_within) the configured
    /// `decisionTimeoutMs`, or plain [`decide`](Self::decide) when unset.
    ///
    /// # Panics
    ///
    /// As [`decide_within`](Self::decide_within), when a timeout is configured.
    pub async fn decide_configured(&self, ctx: &GrayContext) -> Decision {
        match self.config.decision_timeout() {
            Some(timeout) => self.decide_within(ctx, timeout).await,
            None => self.decide(ctx).await,
        }
    }

    async fn run_contained<R: Recorder>(&self, ctx: &GrayContext, recorder: &mut R) -> Decision {
        match AssertUnwindSafe(self.run(ctx, recorder)).catch_unwind().await {
            Ok(decision) => decision,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(panic = %message, "decision panicked");
                Decision::failed(message)
            }
        }
    }

    async fn run<R: Recorder>(&self, ctx: &GrayContext, recorder: &mut R) -> Decision {
        let now = self.clock.now();
        recorder.evaluated_at(now);

        let snapshot = match self.repository.enabled_rules().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(error = %e, "failed to fetch enabled rules");
                return Decision::failed(e);
            }
        };
        recorder.generation(snapshot.generation());

        if snapshot.is_empty() {
            tracing::debug!(generation = snapshot.generation(), "no enabled rules");
            return Decision::not_gray(REASON_NO_ENABLED_RULES);
        }

        let mut candidates = active_rules(snapshot.rules(), now, recorder);
        candidates.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));

        for rule in candidates {
            let Some(matcher) = self.registry.get(&rule.rule_type) else {
                tracing::warn!(
                    rule_id = %rule.id,
                    rule_type = %rule.rule_type,
                    "no matcher registered for rule type, skipping rule"
                );
                recorder.step(rule, RuleOutcome::NoMatcher);
                continue;
            };

            match invoke(matcher.as_ref(), ctx, rule).await {
                Ok(true) => {
                    tracing::debug!(
                        rule_id = %rule.id,
                        target_version = %rule.target_version,
                        generation = snapshot.generation(),
                        "gray decision"
                    );
                    recorder.step(rule, RuleOutcome::Matched);
                    return Decision::gray(rule);
                }
                Ok(false) => recorder.step(rule, RuleOutcome::NotMatched),
                Err(e) if e.is_config_error() => {
                    tracing::warn!(
                        rule_id = %rule.id,
                        rule_type = %rule.rule_type,
                        error = %e,
                        "invalid rule configuration, skipping rule"
                    );
                    recorder.step(rule, RuleOutcome::InvalidConfig(e.to_string()));
                }
                Err(e) => {
                    tracing::warn!(
                        rule_id = %rule.id,
                        rule_type = %rule.rule_type,
                        error = %e,
                        "matcher failed, treating as no match"
                    );
                    recorder.step(rule, RuleOutcome::Failed(e.to_string()));
                }
            }
        }

        Decision::not_gray(REASON_NO_RULE_MATCHED)
    }
}

fn active_rules<'a, R: Recorder>(
    rules: &'a [Arc<GrayRule>],
    now: DateTime<Utc>,
    recorder: &mut R,
) -> Vec<&'a GrayRule> {
    let mut active = Vec::with_capacity(rules.len());
    for rule in rules {
        if !rule.enabled {
            recorder.filtered(rule, FilterReason::Disabled);
            continue;
        }
        match rule.window_state(now) {
            WindowState::Active => active.push(rule.as_ref()),
            WindowState::NotYetEffective => recorder.filtered(rule, FilterReason::NotYetEffective),
            WindowState::Expired => recorder.filtered(rule, FilterReason::Expired),
        }
    }
    active
}

/// One matcher call. A panic is contained here so the remaining rules still run.
async fn invoke(
    matcher: &dyn RuleMatcher,
    ctx: &GrayContext,
    rule: &GrayRule,
) -> Result<bool, MatchError> {
    match AssertUnwindSafe(matcher.is_match_async(ctx, rule))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(rule_id = %rule.id, panic = %message, "matcher panicked");
            Err(MatchError::Lookup {
                rule_id: rule.id.clone(),
                reason: format!("matcher panicked: {message}"),
            })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// Observes the pipeline. `decide` uses the no-op recorder.
trait Recorder: Send {
    fn evaluated_at(&mut self, _now: DateTime<Utc>) {}
    fn generation(&mut self, _generation: u64) {}
    fn filtered(&mut self, _rule: &GrayRule, _reason: FilterReason) {}
    fn step(&mut self, _rule: &GrayRule, _outcome: RuleOutcome) {}
}

struct NoTrace;

impl Recorder for NoTrace {}

#[derive(Default)]
struct TraceRecorder {
    evaluated_at: Option<DateTime<Utc>>,
    generation: Option<u64>,
    filtered: Vec<FilteredRule>,
    steps: Vec<RuleStep>,
}

impl Recorder for TraceRecorder {
    fn evaluated_at(&mut self, now: DateTime<Utc>) {
        self.evaluated_at = Some(now);
    }

    fn generation(&mut self, generation: u64) {
        self.generation = Some(generation);
    }

    fn filtered(&mut self, rule: &GrayRule, reason: FilterReason) {
        self.filtered.push(FilteredRule {
            rule_id: rule.id.clone(),
            reason,
        });
    }

    fn step(&mut self, rule: &GrayRule, outcome: RuleOutcome) {
        self.steps.push(RuleStep {
            rule_id: rule.id.clone(),
            rule_type: rule.rule_type.clone(),
            priority: rule.priority,
            outcome,
        });
    }
}
