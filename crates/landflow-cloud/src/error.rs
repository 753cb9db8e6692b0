//! Error types for provisioning
//!
//! Two layers: [`GatewayError`] is what a provider gateway reports for a single
//! resource, already classified at the gateway boundary. [`CloudError`] covers
//! run-level configuration problems that are detected before any provider call.

use std::time::Duration;
use thiserror::Error;

/// Classified gateway failure
///
/// Provider-specific codes never travel past the gateway; the orchestrator only
/// ever sees these four variants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The resource is already there. Non-fatal: resume with its facts.
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Network failure or throttling. Retried with backoff before escalating.
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// Malformed input, permission denied, quota exceeded...
    #[error("Provider error: {0}")]
    Permanent(String),

    /// The resource did not become ready within its wait budget.
    #[error("Timed out after {waited:?} waiting for {resource} (last status: {last_status})")]
    ProvisioningTimeout {
        resource: String,
        waited: Duration,
        last_status: String,
    },
}

impl GatewayError {
    pub fn already_exists(detail: impl Into<String>) -> Self {
        Self::AlreadyExists(detail.into())
    }

    pub fn transient(detail: impl Into<String>) -> Self {
        Self::Transient(detail.into())
    }

    pub fn permanent(detail: impl Into<String>) -> Self {
        Self::Permanent(detail.into())
    }

    /// Whether the retry executor should try the call again
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Whether this error halts the branch it occurred on
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Permanent(_) | Self::ProvisioningTimeout { .. })
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Run-level errors
///
/// Every variant is a configuration problem that makes the whole run
/// meaningless, so the orchestrator refuses to start.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Cyclic dependency between resources: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),

    #[error("Resource '{resource}' depends on unknown resource '{dependency}'")]
    UnknownDependency { resource: String, dependency: String },

    #[error("Resource declared twice: {0}")]
    DuplicateResource(String),

    #[error("No gateway registered for resource kind '{kind}' (resource '{resource}')")]
    GatewayNotRegistered { kind: String, resource: String },

    #[error("Invalid resource spec: {0}")]
    InvalidSpec(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
