//! Rule repository: the read side of rule storage.
//!
//! The engine only ever reads an immutable [`RuleSnapshot`]. Publishing a new
//! rule set builds the next snapshot aside and swaps it in atomically, so a
//! decision in flight keeps evaluating the snapshot it started with.

mod memory;
mod refresher;
mod source;

pub use memory::InMemoryRuleRepository;
pub use refresher::spawn_refresher;
pub use source::{FileRuleSource, RuleSource, StaticRuleSource};

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{GrayRule, RepositoryError};

/// Immutable, point-in-time view of the enabled rule set.
#[derive(Debug, Clone, Default)]
pub struct RuleSnapshot {
    generation: u64,
    rules: Vec<Arc<GrayRule>>,
}

impl RuleSnapshot {
    #[must_use]
    pub fn new(generation: u64, rules: Vec<Arc<GrayRule>>) -> Self {
        Self { generation, rules }
    }

    /// Publish counter; increases by one with every swap.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn rules(&self) -> &[Arc<GrayRule>] {
        &self.rules
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Read-only source of rules for the engine.
///
/// # Contract
///
/// - [`enabled_rules`](Self::enabled_rules) returns the latest successfully
///   published snapshot. Implementations backed by in-process state never fail.
/// - [`refresh`](Self::refresh) reloads from persistence and swaps atomically.
///   On failure the previous snapshot stays published.
#[async_trait]
pub trait RuleRepository: Send + Sync + Debug {
    /// Snapshot of the currently enabled rules.
    ///
    /// # Errors
    ///
    /// [`RepositoryError`] if the backing store cannot be read.
    async fn enabled_rules(&self) -> Result<Arc<RuleSnapshot>, RepositoryError>;

    /// Point lookup, disabled rules included.
    ///
    /// # Errors
    ///
    /// [`RepositoryError`] if the backing store cannot be read.
    async fn rule_by_id(&self, id: &str) -> Result<Option<Arc<GrayRule>>, RepositoryError>;

    /// Reload and republish. Returns the number of enabled rules published.
    ///
    /// # Errors
    ///
    /// [`RepositoryError`] if loading or validation fails; the previous
    /// snapshot remains in effect.
    async fn refresh(&self) -> Result<usize, RepositoryError>;
}

#[async_trait]
impl<R: RuleRepository + ?Sized> RuleRepository for Arc<R> {
    async fn enabled_rules(&self) -> Result<Arc<RuleSnapshot>, RepositoryError> {
        (**self).enabled_rules().await
    }

    async fn rule_by_id(&self, id: &str) -> Result<Option<Arc<GrayRule>>, RepositoryError> {
        (**self).rule_by_id(id).await
    }

    async fn refresh(&self) -> Result<usize, RepositoryError> {
        (**self).refresh().await
    }
}
