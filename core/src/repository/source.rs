//! Where a repository loads its rules from on refresh.

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::config::{DocumentFormat, RulesDocument};
use crate::{GrayRule, RepositoryError};

/// Loads the complete rule set from persistence.
#[async_trait]
pub trait RuleSource: Send + Sync + Debug {
    /// All rules, enabled or not.
    ///
    /// # Errors
    ///
    /// [`RepositoryError`] if the store cannot be read or parsed.
    async fn load(&self) -> Result<Vec<GrayRule>, RepositoryError>;
}

/// Rules document on the local filesystem, YAML or JSON by extension.
#[derive(Debug, Clone)]
pub struct FileRuleSource {
    path: PathBuf,
}

impl FileRuleSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RuleSource for FileRuleSource {
    async fn load(&self) -> Result<Vec<GrayRule>, RepositoryError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| RepositoryError::Io {
                path: self.path.clone(),
                source,
            })?;
        let doc = RulesDocument::parse(&text, DocumentFormat::from_path(&self.path)).map_err(
            |message| RepositoryError::Parse {
                path: self.path.clone(),
                message,
            },
        )?;
        tracing::debug!(path = %self.path.display(), rules = doc.rules.len(), "loaded rules document");
        Ok(doc.rules)
    }
}

/// Fixed rule set, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticRuleSource {
    rules: Vec<GrayRule>,
}

impl StaticRuleSource {
    #[must_use]
    pub fn new(rules: Vec<GrayRule>) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl RuleSource for StaticRuleSource {
    async fn load(&self) -> Result<Vec<GrayRule>, RepositoryError> {
        Ok(self.rules.clone())
    }
}
