//! Run outcomes and reports

use serde::{Deserialize, Serialize};

/// How a resource ended up after a provisioning run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ProvisionOutcome {
    /// Found by describe (or an `AlreadyExists` race) and reused
    AlreadyExisted,
    Created,
    Failed { reason: String },
    /// Not attempted because a dependency failed
    Skipped { blocked_by: String },
    /// Never started before cancellation
    Cancelled,
}

impl std::fmt::Display for ProvisionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisionOutcome::AlreadyExisted => write!(f, "already existed"),
            ProvisionOutcome::Created => write!(f, "created"),
            ProvisionOutcome::Failed { reason } => write!(f, "failed: {}", reason),
            ProvisionOutcome::Skipped { blocked_by } => {
                write!(f, "skipped: blocked by {}", blocked_by)
            }
            ProvisionOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// How a resource ended up after a teardown run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum TeardownOutcome {
    Deleted,
    AlreadyAbsent,
    Failed { reason: String },
}

impl std::fmt::Display for TeardownOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeardownOutcome::Deleted => write!(f, "deleted"),
            TeardownOutcome::AlreadyAbsent => write!(f, "already absent"),
            TeardownOutcome::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Outcome of either direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outcome {
    Provision(ProvisionOutcome),
    Teardown(TeardownOutcome),
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Outcome::Provision(
                ProvisionOutcome::Failed { .. }
                    | ProvisionOutcome::Skipped { .. }
                    | ProvisionOutcome::Cancelled
            ) | Outcome::Teardown(TeardownOutcome::Failed { .. })
        )
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Provision(outcome) => write!(f, "{}", outcome),
            Outcome::Teardown(outcome) => write!(f, "{}", outcome),
        }
    }
}

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Every resource is Ready
    Converged,
    /// Every resource is gone
    Removed,
    /// At least one resource failed or was skipped
    PartiallyFailed,
    /// Stopped by the cancellation token
    Cancelled,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Converged => write!(f, "converged"),
            RunState::Removed => write!(f, "removed"),
            RunState::PartiallyFailed => write!(f, "partially failed"),
            RunState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One line of a run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Logical name
    pub resource: String,

    /// Kind, as displayed
    pub kind: String,

    /// Provider identifier, if one was known
    pub id: Option<String>,

    pub outcome: Outcome,
}

/// Result of a provisioning or teardown run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Entries in the order the run visited them
    pub entries: Vec<ReportEntry>,

    pub state: RunState,

    /// Total execution time in milliseconds
    pub duration_ms: u64,

    /// Teardown performed after a cancelled provisioning run
    pub rollback: Option<Box<RunReport>>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        matches!(self.state, RunState::Converged | RunState::Removed)
    }

    pub fn entry(&self, resource: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.resource == resource)
    }

    pub fn outcome(&self, resource: &str) -> Option<&Outcome> {
        self.entry(resource).map(|e| &e.outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| e.outcome.is_failure())
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for entry in &self.entries {
            match &entry.outcome {
                Outcome::Provision(ProvisionOutcome::Created)
                | Outcome::Teardown(TeardownOutcome::Deleted) => summary.changed += 1,
                Outcome::Provision(ProvisionOutcome::AlreadyExisted)
                | Outcome::Teardown(TeardownOutcome::AlreadyAbsent) => summary.unchanged += 1,
                Outcome::Provision(ProvisionOutcome::Failed { .. })
                | Outcome::Teardown(TeardownOutcome::Failed { .. }) => summary.failed += 1,
                Outcome::Provision(ProvisionOutcome::Skipped { .. })
                | Outcome::Provision(ProvisionOutcome::Cancelled) => summary.skipped += 1,
            }
        }
        summary
    }
}

/// Counts per outcome class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Created or deleted
    pub changed: usize,
    /// Already existed or already absent
    pub unchanged: usize,
    pub failed: usize,
    /// Skipped or cancelled
    pub skipped: usize,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} changed, {} unchanged, {} failed, {} skipped",
            self.changed, self.unchanged, self.failed, self.skipped
        )
    }
}
