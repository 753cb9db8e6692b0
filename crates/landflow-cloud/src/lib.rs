//! landflow provisioning core
//!
//! This crate provides the provider-agnostic half of landflow: the resource
//! model, the gateway abstraction every provider adapter implements, and the
//! orchestrator that brings a fixed dependency graph of resources up (and
//! down) idempotently.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  landflow CLI                    │
//! │        (provision / teardown / load)             │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               landflow-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  Orchestrator (bounded, cancellable)      │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │  Plan (DAG)  │  │ Retry / Wait │            │
//! │  └──────────────┘  └──────────────┘            │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait Gateway { describe, create, ... }  │   │
//! │  └──────────────────────────────────────────┘   │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │  cloud-aws    │ │   memory      │
//! │  adapters     │ │  (dry-run)    │
//! └───────────────┘ └───────────────┘
//! ```

pub mod error;
pub mod gateway;
pub mod graph;
pub mod handle;
pub mod memory;
pub mod orchestrator;
pub mod report;
pub mod resource;
pub mod retry;
pub mod wait;

// Re-exports
pub use error::{CloudError, GatewayError, GatewayResult, Result};
pub use gateway::{Ensured, Gateway, GatewayRegistry, ResolvedDependencies};
pub use graph::ProvisioningPlan;
pub use handle::{HandleStatus, ResourceHandle};
pub use memory::{MemoryCloud, MemoryGateway, MemoryOp};
pub use orchestrator::{Orchestrator, OrchestratorSettings, Phase};
pub use report::{
    Outcome, ProvisionOutcome, ReportEntry, RunReport, RunState, RunSummary, TeardownOutcome,
};
pub use resource::{EndpointMatch, ResourceFacts, ResourceKind, ResourceSpec, ServiceTag, attr, param};
pub use retry::RetryConfig;
pub use wait::{Readiness, WaitConfig, poll_until_ready};
