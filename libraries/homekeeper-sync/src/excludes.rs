//! Exclude patterns shared by every sync invocation

use crate::error::{Result, SyncError};
use tokio::sync::RwLock;
use tracing::debug;

/// Insertion-ordered set of glob-like exclude patterns.
///
/// Patterns are only ever appended. Each sync takes a snapshot via [`ExcludeSet::list`],
/// so additions made while a sync is running apply from the next sync onward.
#[derive(Debug, Default)]
pub struct ExcludeSet {
    patterns: RwLock<Vec<String>>,
}

impl ExcludeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set pre-populated with `patterns`, dropping duplicates
    pub fn with_patterns<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for pattern in patterns {
            let pattern = normalize(pattern.as_ref())?;
            if !unique.contains(&pattern) {
                unique.push(pattern);
            }
        }

        Ok(Self {
            patterns: RwLock::new(unique),
        })
    }

    /// Append `pattern` unless already present.
    ///
    /// Returns `true` if the pattern was added.
    pub async fn add(&self, pattern: &str) -> Result<bool> {
        let pattern = normalize(pattern)?;
        let mut patterns = self.patterns.write().await;

        if patterns.contains(&pattern) {
            return Ok(false);
        }

        debug!("Adding exclude pattern {}", pattern);
        patterns.push(pattern);
        Ok(true)
    }

    /// Snapshot of all patterns in insertion order
    pub async fn list(&self) -> Vec<String> {
        self.patterns.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.patterns.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.patterns.read().await.is_empty()
    }
}

fn normalize(pattern: &str) -> Result<String> {
    let trimmed = pattern.trim();
    if trimmed.is_empty() {
        return Err(SyncError::InvalidPattern(
            "pattern must not be empty".to_string(),
        ));
    }
    if trimmed.contains('\n') || trimmed.contains('\0') {
        return Err(SyncError::InvalidPattern(format!(
            "pattern contains control characters: {:?}",
            trimmed
        )));
    }
    Ok(trimmed.to_string())
}
