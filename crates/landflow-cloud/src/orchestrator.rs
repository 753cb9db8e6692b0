//! Dependency-ordered provisioning and teardown
//!
//! The orchestrator owns the handle table. Units of work (ensure, wait and
//! converge for one resource, or delete and wait for one resource) run as
//! owned futures in a bounded [`FuturesUnordered`] pool; they receive a
//! snapshot of their dependencies' facts and report back, and only the
//! orchestrator loop applies their results.

use crate::error::{CloudError, GatewayResult, Result};
use crate::gateway::{Ensured, Gateway, GatewayRegistry, ResolvedDependencies};
use crate::graph::ProvisioningPlan;
use crate::handle::{HandleStatus, ResourceHandle};
use crate::report::{Outcome, ProvisionOutcome, ReportEntry, RunReport, RunState, TeardownOutcome};
use crate::resource::{ResourceFacts, ResourceKind, ResourceSpec};
use crate::retry::RetryConfig;
use crate::wait::WaitConfig;
use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use futures_util::FutureExt;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Run settings
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Upper bound on units in flight
    pub max_parallel: usize,

    /// Retry policy for every provider call
    pub retry: RetryConfig,

    /// Default wait budget
    pub wait: WaitConfig,

    /// Per-kind wait budgets (the warehouse cluster takes far longer)
    pub wait_overrides: HashMap<ResourceKind, WaitConfig>,

    /// Tear down what this run created when it is cancelled
    pub rollback_on_cancel: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            retry: RetryConfig::default(),
            wait: WaitConfig::default(),
            wait_overrides: HashMap::new(),
            rollback_on_cancel: true,
        }
    }
}

impl OrchestratorSettings {
    pub fn wait_for(&self, kind: ResourceKind) -> &WaitConfig {
        self.wait_overrides.get(&kind).unwrap_or(&self.wait)
    }
}

/// Where the orchestrator is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Provisioning,
    TearingDown,
    Finished(RunState),
}

type UnitFuture<T> = BoxFuture<'static, (usize, GatewayResult<T>)>;

/// Provisioning orchestrator over a fixed set of specs
pub struct Orchestrator {
    plan: ProvisioningPlan,
    /// Gateway per plan position, resolved up front
    gateways: Vec<Arc<dyn Gateway>>,
    handles: Vec<ResourceHandle>,
    settings: OrchestratorSettings,
    cancel: CancellationToken,
    phase: Phase,
}

impl Orchestrator {
    /// Validate the graph and gateway coverage
    ///
    /// Every configuration error is reported here, before any provider call.
    pub fn new(
        specs: Vec<ResourceSpec>,
        registry: &GatewayRegistry,
        settings: OrchestratorSettings,
    ) -> Result<Self> {
        if settings.max_parallel == 0 {
            return Err(CloudError::InvalidSpec(
                "max_parallel must be at least 1".to_string(),
            ));
        }

        let plan = ProvisioningPlan::build(specs)?;
        let gateways = plan
            .forward_order()
            .map(|spec| {
                registry
                    .get(spec.kind)
                    .ok_or_else(|| CloudError::GatewayNotRegistered {
                        kind: spec.kind.to_string(),
                        resource: spec.name.clone(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        let handles = plan.forward_order().cloned().map(ResourceHandle::new).collect();

        Ok(Self {
            plan,
            gateways,
            handles,
            settings,
            cancel: CancellationToken::new(),
            phase: Phase::Idle,
        })
    }

    /// Token that stops a provisioning run from launching further work
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn plan(&self) -> &ProvisioningPlan {
        &self.plan
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Handles in plan order
    pub fn handles(&self) -> &[ResourceHandle] {
        &self.handles
    }

    pub fn handle(&self, name: &str) -> Option<&ResourceHandle> {
        self.plan.position(name).map(|i| &self.handles[i])
    }

    /// Bring every resource to Ready
    ///
    /// A failed resource only stops its own descendants. When the
    /// cancellation token fires, in-flight units finish and nothing new
    /// starts. The resources this run created are then torn down unless
    /// `rollback_on_cancel` is off.
    pub async fn provision(&mut self) -> RunReport {
        let started = Instant::now();
        self.phase = Phase::Provisioning;
        self.handles = self
            .plan
            .forward_order()
            .cloned()
            .map(ResourceHandle::new)
            .collect();
        info!(
            resources = self.plan.len(),
            max_parallel = self.settings.max_parallel,
            "Provisioning"
        );

        let mut in_flight: FuturesUnordered<UnitFuture<Ensured>> = FuturesUnordered::new();
        let mut cancelled = self.cancel.is_cancelled();

        loop {
            if !cancelled {
                self.launch_ready(&mut in_flight);
            }
            if in_flight.is_empty() {
                break;
            }

            let finished = if cancelled {
                in_flight.next().await
            } else {
                tokio::select! {
                    next = in_flight.next() => next,
                    _ = self.cancel.cancelled() => {
                        warn!("Cancellation requested, draining in-flight resources");
                        cancelled = true;
                        continue;
                    }
                }
            };
            let Some((position, result)) = finished else {
                break;
            };
            self.settle_provision(position, result);
        }

        if cancelled {
            for handle in &mut self.handles {
                if handle.status == HandleStatus::NotRequested {
                    handle.outcome = Some(Outcome::Provision(ProvisionOutcome::Cancelled));
                }
            }
        }

        let state = if cancelled {
            RunState::Cancelled
        } else if self
            .handles
            .iter()
            .all(|h| h.status == HandleStatus::Ready)
        {
            RunState::Converged
        } else {
            RunState::PartiallyFailed
        };

        let entries = self
            .handles
            .iter()
            .map(|h| ReportEntry {
                resource: h.spec.name.clone(),
                kind: h.spec.kind.to_string(),
                id: h.id().map(str::to_string),
                outcome: h
                    .outcome
                    .clone()
                    .unwrap_or(Outcome::Provision(ProvisionOutcome::Cancelled)),
            })
            .collect();

        let mut report = RunReport {
            entries,
            state,
            duration_ms: started.elapsed().as_millis() as u64,
            rollback: None,
        };
        info!(state = %report.state, summary = %report.summary(), "Provisioning finished");

        if cancelled && self.settings.rollback_on_cancel {
            // resources that already existed before this run are left alone
            let scope: BTreeSet<usize> = (0..self.handles.len())
                .filter(|&i| self.handles[i].is_ready() && self.handles[i].created)
                .collect();
            info!(resources = scope.len(), "Rolling back resources created by this run");
            report.rollback = Some(Box::new(self.teardown_scope(scope).await));
        }

        self.phase = Phase::Finished(report.state);
        report
    }

    /// Delete every resource in reverse dependency order
    ///
    /// Resources are first discovered in forward order so that lookups which
    /// need a dependency's identifier (a user needs its endpoint) can run.
    /// Failures are recorded and never stop the remaining deletions.
    pub async fn teardown(&mut self) -> RunReport {
        let scope = (0..self.handles.len()).collect();
        let report = self.teardown_scope(scope).await;
        self.phase = Phase::Finished(report.state);
        report
    }

    fn dependencies_snapshot(&self, position: usize) -> ResolvedDependencies {
        let mut deps = ResolvedDependencies::new();
        for &d in self.plan.dependencies_at(position) {
            if let Some(facts) = &self.handles[d].facts {
                let spec = &self.handles[d].spec;
                deps.insert(spec.name.clone(), spec.kind, facts.clone());
            }
        }
        deps
    }

    /// First dependency of `position` whose teardown lookup failed
    fn failed_lookup_dependency(
        &self,
        position: usize,
        outcomes: &[Option<TeardownOutcome>],
    ) -> Option<String> {
        self.plan
            .dependencies_at(position)
            .iter()
            .find(|&&d| {
                self.handles[d].facts.is_none()
                    && matches!(outcomes[d], Some(TeardownOutcome::Failed { .. }))
            })
            .map(|&d| self.handles[d].spec.name.clone())
    }

    fn launch_ready(&mut self, in_flight: &mut FuturesUnordered<UnitFuture<Ensured>>) {
        for position in 0..self.handles.len() {
            if in_flight.len() >= self.settings.max_parallel {
                return;
            }
            if self.handles[position].status != HandleStatus::NotRequested {
                continue;
            }
            let ready = self
                .plan
                .dependencies_at(position)
                .iter()
                .all(|&d| self.handles[d].is_ready());
            if !ready {
                continue;
            }

            let gateway = self.gateways[position].clone();
            let spec = self.handles[position].spec.clone();
            let deps = self.dependencies_snapshot(position);
            let retry = self.settings.retry.clone();
            let wait = self.settings.wait_for(spec.kind).clone();

            debug!(resource = %spec.name, kind = %spec.kind, "Launching");
            self.handles[position].status = HandleStatus::Creating;
            in_flight.push(
                async move {
                    let result = provision_unit(gateway, spec, deps, retry, wait).await;
                    (position, result)
                }
                .boxed(),
            );
        }
    }

    fn settle_provision(&mut self, position: usize, result: GatewayResult<Ensured>) {
        match result {
            Ok(ensured) => {
                let handle = &mut self.handles[position];
                let outcome = if ensured.already_existed {
                    ProvisionOutcome::AlreadyExisted
                } else {
                    ProvisionOutcome::Created
                };
                info!(resource = %handle.spec.name, id = %ensured.facts.id, %outcome, "Ready");
                handle.mark_ready(ensured.facts, !ensured.already_existed);
                handle.outcome = Some(Outcome::Provision(outcome));
            }
            Err(err) => {
                let failed = self.handles[position].spec.name.clone();
                warn!(resource = %failed, error = %err, "Resource failed");
                self.handles[position].status = HandleStatus::Failed;
                self.handles[position].outcome = Some(Outcome::Provision(ProvisionOutcome::Failed {
                    reason: err.to_string(),
                }));

                for d in self.plan.descendants_at(position) {
                    let handle = &mut self.handles[d];
                    if handle.status == HandleStatus::NotRequested {
                        debug!(resource = %handle.spec.name, blocked_by = %failed, "Skipping");
                        handle.status = HandleStatus::Skipped;
                        handle.outcome = Some(Outcome::Provision(ProvisionOutcome::Skipped {
                            blocked_by: failed.clone(),
                        }));
                    }
                }
            }
        }
    }

    /// Discover then delete the resources at `scope` positions
    async fn teardown_scope(&mut self, scope: BTreeSet<usize>) -> RunReport {
        let started = Instant::now();
        self.phase = Phase::TearingDown;
        info!(resources = scope.len(), "Tearing down");

        let mut outcomes: Vec<Option<TeardownOutcome>> = vec![None; self.handles.len()];
        let mut ids: Vec<Option<String>> = vec![None; self.handles.len()];

        // discover in forward order: a dependent is looked up with its dependencies' ids
        for &position in &scope {
            if self.handles[position].facts.is_some() {
                continue;
            }
            // a lookup without a dependency's facts cannot tell absent from unreachable
            if let Some(dependency) = self.failed_lookup_dependency(position, &outcomes) {
                let spec = &self.handles[position].spec;
                warn!(resource = %spec.name, blocked_by = %dependency, "Lookup blocked");
                self.handles[position].status = HandleStatus::Failed;
                outcomes[position] = Some(TeardownOutcome::Failed {
                    reason: format!("blocked by {} lookup", dependency),
                });
                continue;
            }
            let gateway = self.gateways[position].clone();
            let spec = self.handles[position].spec.clone();
            let deps = self.dependencies_snapshot(position);
            let found = self
                .settings
                .retry
                .run(&spec.name, || gateway.describe(&spec, &deps))
                .await;
            match found {
                Ok(Some(facts)) => {
                    debug!(resource = %spec.name, id = %facts.id, "Discovered");
                    self.handles[position].facts = Some(facts);
                }
                Ok(None) => {
                    debug!(resource = %spec.name, "Not found");
                    self.handles[position].mark_deleted();
                    outcomes[position] = Some(TeardownOutcome::AlreadyAbsent);
                }
                Err(err) => {
                    warn!(resource = %spec.name, error = %err, "Lookup failed");
                    self.handles[position].status = HandleStatus::Failed;
                    outcomes[position] = Some(TeardownOutcome::Failed {
                        reason: err.to_string(),
                    });
                }
            }
        }

        let mut in_flight: FuturesUnordered<UnitFuture<()>> = FuturesUnordered::new();
        // a node is deleted once all of its dependents are settled
        let finished = |outcomes: &[Option<TeardownOutcome>], i: usize| {
            !scope.contains(&i) || outcomes[i].is_some()
        };

        loop {
            for &position in scope.iter().rev() {
                if in_flight.len() >= self.settings.max_parallel {
                    break;
                }
                if outcomes[position].is_some()
                    || self.handles[position].status == HandleStatus::Deleting
                {
                    continue;
                }
                let unblocked = self
                    .plan
                    .dependents_at(position)
                    .iter()
                    .all(|&d| finished(&outcomes, d));
                if !unblocked {
                    continue;
                }
                let Some(facts) = self.handles[position].facts.clone() else {
                    outcomes[position] = Some(TeardownOutcome::AlreadyAbsent);
                    continue;
                };

                let gateway = self.gateways[position].clone();
                let spec = self.handles[position].spec.clone();
                let deps = self.dependencies_snapshot(position);
                let retry = self.settings.retry.clone();
                let wait = self.settings.wait_for(spec.kind).clone();

                debug!(resource = %spec.name, id = %facts.id, "Deleting");
                ids[position] = Some(facts.id.clone());
                self.handles[position].status = HandleStatus::Deleting;
                in_flight.push(
                    async move {
                        let result = teardown_unit(gateway, spec, facts, deps, retry, wait).await;
                        (position, result)
                    }
                    .boxed(),
                );
            }

            let Some((position, result)) = in_flight.next().await else {
                break;
            };
            let handle = &mut self.handles[position];
            match result {
                Ok(()) => {
                    info!(resource = %handle.spec.name, "Deleted");
                    handle.mark_deleted();
                    outcomes[position] = Some(TeardownOutcome::Deleted);
                }
                Err(err) => {
                    warn!(resource = %handle.spec.name, error = %err, "Delete failed");
                    handle.status = HandleStatus::Failed;
                    outcomes[position] = Some(TeardownOutcome::Failed {
                        reason: err.to_string(),
                    });
                }
            }
        }

        let entries: Vec<ReportEntry> = scope
            .iter()
            .rev()
            .map(|&i| {
                let spec = &self.handles[i].spec;
                ReportEntry {
                    resource: spec.name.clone(),
                    kind: spec.kind.to_string(),
                    id: ids[i].clone(),
                    outcome: Outcome::Teardown(outcomes[i].clone().unwrap_or(
                        TeardownOutcome::Failed {
                            reason: "not attempted".to_string(),
                        },
                    )),
                }
            })
            .collect();

        let state = if entries.iter().any(|e| e.outcome.is_failure()) {
            RunState::PartiallyFailed
        } else {
            RunState::Removed
        };
        let report = RunReport {
            entries,
            state,
            duration_ms: started.elapsed().as_millis() as u64,
            rollback: None,
        };
        info!(state = %report.state, summary = %report.summary(), "Teardown finished");
        report
    }
}

/// ensure, wait, converge for one resource
#[instrument(skip_all, fields(resource = %spec.name, kind = %spec.kind))]
async fn provision_unit(
    gateway: Arc<dyn Gateway>,
    spec: ResourceSpec,
    deps: ResolvedDependencies,
    retry: RetryConfig,
    wait: WaitConfig,
) -> GatewayResult<Ensured> {
    let ensured = gateway.ensure(&spec, &deps, &retry).await?;
    gateway.wait_ready(&spec, &ensured.facts, &wait).await?;

    // some attributes (endpoint, ARN) only show up after the resource is ready
    let facts = match retry.run(&spec.name, || gateway.describe(&spec, &deps)).await? {
        Some(current) => merge_facts(current, ensured.facts),
        None => ensured.facts,
    };

    retry
        .run(&spec.name, || gateway.converge(&spec, &facts, &deps))
        .await?;

    Ok(Ensured {
        facts,
        already_existed: ensured.already_existed,
    })
}

/// delete, then wait until the resource is gone
#[instrument(skip_all, fields(resource = %spec.name, kind = %spec.kind))]
async fn teardown_unit(
    gateway: Arc<dyn Gateway>,
    spec: ResourceSpec,
    facts: ResourceFacts,
    deps: ResolvedDependencies,
    retry: RetryConfig,
    wait: WaitConfig,
) -> GatewayResult<()> {
    retry
        .run(&spec.name, || gateway.delete(&spec, &facts))
        .await?;
    gateway.wait_absent(&spec, &deps, &wait).await
}

fn merge_facts(mut current: ResourceFacts, earlier: ResourceFacts) -> ResourceFacts {
    for (key, value) in earlier.attributes {
        current.attributes.entry(key).or_insert(value);
    }
    current
}
