use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::{RuleRepository, RuleSnapshot, RuleSource};
use crate::config::RulesDocument;
use crate::{GrayRule, RepositoryError, RuleError};

/// In-process rule repository.
///
/// Writers edit an administrative map under a lock, then publish a new
/// generation: the enabled subset as a [`RuleSnapshot`] plus an id index of
/// every rule, disabled ones included. Both read paths ([`snapshot`](Self::snapshot)
/// and [`rule_by_id`](RuleRepository::rule_by_id)) load the published
/// generation without locking, so a reader never sees a half-applied write.
///
/// # Example
///
/// ```
/// use grayroute::{GrayRule, InMemoryRuleRepository, RuleType};
///
/// let repo = InMemoryRuleRepository::new();
/// repo.add_rule(GrayRule::new("r1", "canary", RuleType::Header, "v2")).unwrap();
/// repo.add_rule(GrayRule::new("r2", "off", RuleType::Header, "v2").with_enabled(false)).unwrap();
///
/// let snapshot = repo.snapshot();
/// assert_eq!(snapshot.len(), 1);
/// assert_eq!(snapshot.generation(), 2);
/// ```
pub struct InMemoryRuleRepository {
    rules: DashMap<String, Arc<GrayRule>>,
    published: ArcSwap<Published>,
    writer: Mutex<u64>,
    source: Option<Arc<dyn RuleSource>>,
}

/// One published generation.
#[derive(Debug, Default)]
struct Published {
    snapshot: Arc<RuleSnapshot>,
    by_id: HashMap<String, Arc<GrayRule>>,
}

impl Default for InMemoryRuleRepository {
    fn default() -> Self {
        Self {
            rules: DashMap::new(),
            published: ArcSwap::from_pointee(Published::default()),
            writer: Mutex::new(0),
            source: None,
        }
    }
}

impl InMemoryRuleRepository {
    /// Empty repository without a backing source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty repository that loads from `source` on [`refresh`](RuleRepository::refresh).
    #[must_use]
    pub fn with_source(source: Arc<dyn RuleSource>) -> Self {
        Self {
            source: Some(source),
            ..Self::default()
        }
    }

    /// Repository pre-populated with `rules`.
    ///
    /// # Errors
    ///
    /// The first invalid rule, or [`RuleError::DuplicateId`].
    pub fn from_rules(rules: impl IntoIterator<Item = GrayRule>) -> Result<Self, RuleError> {
        let repo = Self::new();
        repo.replace_all(rules.into_iter().collect())?;
        Ok(repo)
    }

    /// Insert or replace a rule and republish.
    ///
    /// # Errors
    ///
    /// [`RuleError`] if the rule fails [`GrayRule::validate`]; nothing changes.
    pub fn add_rule(&self, rule: GrayRule) -> Result<(), RuleError> {
        rule.validate()?;
        let rule_id = rule.id.clone();
        let mut generation = self.writer.lock();
        if self.rules.insert(rule_id.clone(), Arc::new(rule)).is_some() {
            tracing::debug!(%rule_id, "replaced existing rule");
        }
        self.publish(&mut generation);
        Ok(())
    }

    /// Remove a rule by id and republish. Returns the removed rule.
    pub fn remove_rule(&self, id: &str) -> Option<Arc<GrayRule>> {
        let mut generation = self.writer.lock();
        let removed = self.rules.remove(id).map(|(_, rule)| rule);
        if removed.is_some() {
            self.publish(&mut generation);
        }
        removed
    }

    /// Remove every rule and publish an empty snapshot.
    pub fn clear(&self) {
        let mut generation = self.writer.lock();
        self.rules.clear();
        self.publish(&mut generation);
    }

    /// Replace the whole rule set in one publish.
    ///
    /// The new set is validated completely before anything changes.
    ///
    /// # Errors
    ///
    /// The first invalid rule, or [`RuleError::DuplicateId`].
    pub fn replace_all(&self, rules: Vec<GrayRule>) -> Result<usize, RuleError> {
        let doc = RulesDocument { rules };
        doc.validate()?;

        let mut generation = self.writer.lock();
        self.rules.clear();
        for rule in doc.rules {
            self.rules.insert(rule.id.clone(), Arc::new(rule));
        }
        Ok(self.publish(&mut generation))
    }

    /// The currently published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RuleSnapshot> {
        Arc::clone(&self.published.load().snapshot)
    }

    /// Number of published rules, enabled or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.published.load().by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.published.load().by_id.is_empty()
    }

    /// Build the next generation from the administrative map and swap it in.
    /// Requires the writer lock.
    fn publish(&self, generation: &mut u64) -> usize {
        let by_id: HashMap<String, Arc<GrayRule>> = self
            .rules
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        let mut enabled: Vec<Arc<GrayRule>> =
            by_id.values().filter(|r| r.enabled).cloned().collect();
        enabled.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));

        *generation += 1;
        let count = enabled.len();
        self.published.store(Arc::new(Published {
            snapshot: Arc::new(RuleSnapshot::new(*generation, enabled)),
            by_id,
        }));
        tracing::debug!(generation = *generation, enabled = count, "published rule snapshot");
        count
    }
}

impl fmt::Debug for InMemoryRuleRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryRuleRepository")
            .field("rules", &self.len())
            .field("generation", &self.published.load().snapshot.generation())
            .field("source", &self.source)
            .finish()
    }
}

#[async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn enabled_rules(&self) -> Result<Arc<RuleSnapshot>, RepositoryError> {
        Ok(self.snapshot())
    }

    async fn rule_by_id(&self, id: &str) -> Result<Option<Arc<GrayRule>>, RepositoryError> {
        Ok(self.published.load().by_id.get(id).cloned())
    }

    async fn refresh(&self) -> Result<usize, RepositoryError> {
        let Some(source) = &self.source else {
            let mut generation = self.writer.lock();
            return Ok(self.publish(&mut generation));
        };

        let loaded = match source.load().await {
            Ok(rules) => rules,
            Err(e) => {
                tracing::warn!(error = %e, "rule refresh failed, keeping previous snapshot");
                return Err(e);
            }
        };
        match self.replace_all(loaded) {
            Ok(count) => {
                tracing::info!(
                    generation = self.snapshot().generation(),
                    enabled = count,
                    "rules refreshed"
                );
                Ok(count)
            }
            Err(e) => {
                tracing::warn!(error = %e, "refreshed rules rejected, keeping previous snapshot");
                Err(e.into())
            }
        }
    }
}
