//! Property tests: the engine's decision agrees with a simple model.
//!
//! The model: among rules that are enabled, inside their window and whose
//! matcher says "match", the one with the smallest `(priority, id)` wins.
//! Everything else (disabled, expired, lookup errors, bad configuration) is
//! invisible to the outcome.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::executor::block_on;
use grayroute::matchers::PercentageMatcher;
use grayroute::FixedClock;
use grayroute_test::prelude::*;
use proptest::prelude::*;
use serde_json::json;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Window {
    Open,
    Expired,
    Future,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    Match,
    NoMatch,
    LookupError,
    InvalidConfig,
}

#[derive(Debug, Clone)]
struct RuleSpec {
    priority: u32,
    enabled: bool,
    window: Window,
    behaviour: Behaviour,
}

impl RuleSpec {
    fn to_rule(&self, id: &str) -> GrayRule {
        let configuration = match self.behaviour {
            Behaviour::Match => json!({ "outcome": Outcome::Match.as_str() }),
            Behaviour::NoMatch => json!({ "outcome": Outcome::NoMatch.as_str() }),
            Behaviour::LookupError => json!({ "outcome": Outcome::LookupError.as_str() }),
            Behaviour::InvalidConfig => json!({ "outcome": 42 }),
        };
        let rule = GrayRule::new(id, id, scripted(), format!("v-{id}"))
            .with_priority(self.priority)
            .with_enabled(self.enabled)
            .with_configuration(configuration);
        match self.window {
            Window::Open => rule,
            Window::Expired => rule.with_expiry_time(now() - Duration::days(1)),
            Window::Future => rule.with_effective_time(now() + Duration::days(1)),
        }
    }

    fn wins(&self) -> bool {
        self.enabled && self.window == Window::Open && self.behaviour == Behaviour::Match
    }
}

fn rule_spec() -> impl Strategy<Value = RuleSpec> {
    (
        0u32..4,
        prop::bool::weighted(0.8),
        prop_oneof![
            6 => Just(Window::Open),
            1 => Just(Window::Expired),
            1 => Just(Window::Future),
        ],
        prop_oneof![
            Just(Behaviour::Match),
            Just(Behaviour::NoMatch),
            Just(Behaviour::LookupError),
            Just(Behaviour::InvalidConfig),
        ],
    )
        .prop_map(|(priority, enabled, window, behaviour)| RuleSpec {
            priority,
            enabled,
            window,
            behaviour,
        })
}

fn engine(rules: Vec<GrayRule>) -> RuleEngine {
    let repo = InMemoryRuleRepository::from_rules(rules).unwrap();
    let registry = grayroute_test::register(MatcherRegistryBuilder::new()).build();
    RuleEngine::new(Arc::new(repo), registry).with_clock(Arc::new(FixedClock(now())))
}

proptest! {
    #[test]
    fn decision_matches_model(specs in prop::collection::vec(rule_spec(), 0..12)) {
        let ids: Vec<String> = (0..specs.len()).map(|i| format!("r{i:02}")).collect();
        let rules = specs.iter().zip(&ids).map(|(s, id)| s.to_rule(id)).collect();
        let engine = engine(rules);

        let expected = specs
            .iter()
            .zip(&ids)
            .filter(|(s, _)| s.wins())
            .min_by(|(a, ia), (b, ib)| a.priority.cmp(&b.priority).then_with(|| ia.cmp(ib)))
            .map(|(_, id)| id.as_str());

        let trace = block_on(engine.decide_with_trace(&GrayContext::default()));
        let decision = &trace.decision;

        prop_assert_eq!(decision.matched_rule_id(), expected);
        prop_assert_eq!(decision.is_gray(), expected.is_some());
        if let Some(id) = expected {
            let version = format!("v-{id}");
            prop_assert_eq!(decision.target_version(), Some(version.as_str()));
        } else if specs.iter().any(|s| s.enabled) {
            prop_assert_eq!(decision.reason(), "no rule matched");
        } else {
            prop_assert_eq!(decision.reason(), "no enabled rules");
        }
        prop_assert!(!decision.is_failure());

        // The trace is the same decision.
        let plain = block_on(engine.decide(&GrayContext::default()));
        prop_assert_eq!(&plain, decision);

        // Steps are evaluated in (priority, id) order.
        let order: Vec<(u32, &str)> =
            trace.steps.iter().map(|s| (s.priority, s.rule_id.as_str())).collect();
        let mut sorted = order.clone();
        sorted.sort();
        prop_assert_eq!(order, sorted);
    }

    #[test]
    fn percentage_is_sticky_and_monotonic(
        rule_id in "[a-z]{1,8}",
        user_id in any::<i64>(),
        lo in 0u8..=100,
        hi in 0u8..=100,
    ) {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        let rule = |percentage: u8| {
            GrayRule::new(rule_id.clone(), "rollout", RuleType::Percentage, "v2")
                .with_configuration(json!({ "percentage": percentage }))
        };
        let ctx = GrayContext::builder().user_id(user_id).build();
        let matcher = PercentageMatcher::new();

        let at_lo = matcher.is_match(&ctx, &rule(lo)).unwrap();
        let at_hi = matcher.is_match(&ctx, &rule(hi)).unwrap();
        prop_assert_eq!(matcher.is_match(&ctx, &rule(lo)).unwrap(), at_lo);
        if at_lo {
            prop_assert!(at_hi);
        }
        prop_assert!(!matcher.is_match(&ctx, &rule(0)).unwrap());
        prop_assert!(matcher.is_match(&ctx, &rule(100)).unwrap());
        prop_assert!(PercentageMatcher::bucket(&rule_id, &user_id.to_string()) < 100);
    }

    #[test]
    fn exact_header_rule_is_string_equality(expected in "[ -~]{0,16}", actual in "[ -~]{0,16}") {
        let rule = GrayRule::new("h", "h", RuleType::Header, "v2")
            .with_configuration(json!({ "headerName": "X-Gray", "headerValue": expected }));
        let engine = engine(vec![rule]);
        let ctx = GrayContext::builder().header("X-Gray", actual.clone()).build();
        let decision = block_on(engine.decide(&ctx));
        prop_assert_eq!(decision.is_gray(), expected == actual);
    }
}
