//! Runtime handle table
//!
//! One [`ResourceHandle`] per spec, owned and mutated by the orchestrator only.

use crate::report::Outcome;
use crate::resource::{ResourceFacts, ResourceSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a resource within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleStatus {
    NotRequested,
    /// ensure, wait and converge in progress
    Creating,
    /// Facts are published to dependents
    Ready,
    Failed,
    /// A dependency failed
    Skipped,
    Deleting,
    Deleted,
}

impl HandleStatus {
    /// No further transition will happen in the current pass
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HandleStatus::Ready | HandleStatus::Failed | HandleStatus::Skipped | HandleStatus::Deleted
        )
    }
}

impl std::fmt::Display for HandleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandleStatus::NotRequested => write!(f, "not requested"),
            HandleStatus::Creating => write!(f, "creating"),
            HandleStatus::Ready => write!(f, "ready"),
            HandleStatus::Failed => write!(f, "failed"),
            HandleStatus::Skipped => write!(f, "skipped"),
            HandleStatus::Deleting => write!(f, "deleting"),
            HandleStatus::Deleted => write!(f, "deleted"),
        }
    }
}

/// Mutable runtime record of one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub spec: ResourceSpec,

    /// Known once the resource was found or created
    pub facts: Option<ResourceFacts>,

    pub status: HandleStatus,

    /// What the last run did with this resource
    pub outcome: Option<Outcome>,

    /// When the facts were published
    pub ready_at: Option<DateTime<Utc>>,

    /// Whether this run created the resource (as opposed to reusing it)
    pub created: bool,
}

impl ResourceHandle {
    pub fn new(spec: ResourceSpec) -> Self {
        Self {
            spec,
            facts: None,
            status: HandleStatus::NotRequested,
            outcome: None,
            ready_at: None,
            created: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn is_ready(&self) -> bool {
        self.status == HandleStatus::Ready
    }

    /// Publish facts; dependents may read them from now on
    pub fn mark_ready(&mut self, facts: ResourceFacts, created: bool) {
        self.facts = Some(facts);
        self.status = HandleStatus::Ready;
        self.created = created;
        self.ready_at = Some(Utc::now());
    }

    pub fn mark_deleted(&mut self) {
        self.status = HandleStatus::Deleted;
        self.facts = None;
        self.ready_at = None;
    }

    /// Provider identifier, if known
    pub fn id(&self) -> Option<&str> {
        self.facts.as_ref().map(|f| f.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;

    #[test]
    fn test_ready_publishes_facts() {
        let mut handle = ResourceHandle::new(ResourceSpec::new("bucket", ResourceKind::Bucket));
        assert_eq!(handle.status, HandleStatus::NotRequested);
        assert!(handle.id().is_none());

        handle.mark_ready(ResourceFacts::new("sf-transactions-12345"), true);
        assert!(handle.is_ready());
        assert!(handle.ready_at.is_some());
        assert_eq!(handle.id(), Some("sf-transactions-12345"));

        handle.mark_deleted();
        assert_eq!(handle.status, HandleStatus::Deleted);
        assert!(handle.facts.is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(HandleStatus::Skipped.is_terminal());
        assert!(!HandleStatus::Creating.is_terminal());
        assert!(!HandleStatus::NotRequested.is_terminal());
    }
}
