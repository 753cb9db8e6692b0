//! In-memory cloud
//!
//! A [`Gateway`] that keeps resources in a map keyed by logical name. Used by
//! `--dry-run` and by tests, which can inject faults per resource and inspect
//! how often each provider call was made.

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{Gateway, GatewayRegistry, ResolvedDependencies};
use crate::resource::{ResourceFacts, ResourceKind, ResourceSpec, attr, param};
use crate::wait::Readiness;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Provider call recorded by [`MemoryCloud`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOp {
    Describe,
    Create,
    Probe,
    Converge,
    Delete,
}

/// Per-resource fault injection
#[derive(Debug, Clone, Default)]
struct Faults {
    fail_describe: Option<String>,
    fail_create: Option<String>,
    fail_delete: Option<String>,
    transient_creates: u32,
    pending_probes: u32,
    never_ready: bool,
    race_on_create: bool,
    create_delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct MemoryState {
    resources: BTreeMap<String, ResourceFacts>,
    faults: HashMap<String, Faults>,
    calls: HashMap<(String, MemoryOp), u32>,
    /// (operation, resource) for every create and delete, in call order
    events: Vec<(MemoryOp, String)>,
    in_flight: usize,
    max_in_flight: usize,
}

/// Shared in-memory provider state
#[derive(Debug, Clone, Default)]
pub struct MemoryCloud {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn faults(&self, resource: &str) -> Faults {
        self.state().faults.get(resource).cloned().unwrap_or_default()
    }

    fn edit_faults(&self, resource: &str, edit: impl FnOnce(&mut Faults)) -> &Self {
        edit(self.state().faults.entry(resource.to_string()).or_default());
        self
    }

    /// A gateway over this cloud
    pub fn gateway(&self) -> Arc<dyn Gateway> {
        Arc::new(MemoryGateway {
            cloud: self.clone(),
        })
    }

    /// Registry serving every resource kind from this cloud
    pub fn registry(&self) -> GatewayRegistry {
        let gateway = self.gateway();
        ResourceKind::ALL
            .iter()
            .fold(GatewayRegistry::new(), |registry, kind| {
                registry.with(*kind, gateway.clone())
            })
    }

    /// Pretend `resource` already exists
    pub fn insert(&self, resource: &str, facts: ResourceFacts) -> &Self {
        self.state().resources.insert(resource.to_string(), facts);
        self
    }

    pub fn contains(&self, resource: &str) -> bool {
        self.state().resources.contains_key(resource)
    }

    pub fn facts(&self, resource: &str) -> Option<ResourceFacts> {
        self.state().resources.get(resource).cloned()
    }

    /// Logical names of every live resource
    pub fn resources(&self) -> Vec<String> {
        self.state().resources.keys().cloned().collect()
    }

    /// Describe calls for `resource` fail permanently
    pub fn fail_describe(&self, resource: &str, reason: &str) -> &Self {
        self.edit_faults(resource, |f| f.fail_describe = Some(reason.to_string()))
    }

    /// Create calls for `resource` fail permanently
    pub fn fail_create(&self, resource: &str, reason: &str) -> &Self {
        self.edit_faults(resource, |f| f.fail_create = Some(reason.to_string()))
    }

    /// Delete calls for `resource` fail permanently
    pub fn fail_delete(&self, resource: &str, reason: &str) -> &Self {
        self.edit_faults(resource, |f| f.fail_delete = Some(reason.to_string()))
    }

    /// The next `count` create calls for `resource` are throttled
    pub fn transient_creates(&self, resource: &str, count: u32) -> &Self {
        self.edit_faults(resource, |f| f.transient_creates = count)
    }

    /// The next `count` probes of `resource` report Pending
    pub fn pending_probes(&self, resource: &str, count: u32) -> &Self {
        self.edit_faults(resource, |f| f.pending_probes = count)
    }

    /// `resource` never leaves its pending state
    pub fn never_ready(&self, resource: &str) -> &Self {
        self.edit_faults(resource, |f| f.never_ready = true)
    }

    /// Create stores the resource but answers `AlreadyExists`, as when
    /// another process won a creation race
    pub fn race_on_create(&self, resource: &str) -> &Self {
        self.edit_faults(resource, |f| f.race_on_create = true)
    }

    /// Create calls for `resource` take `delay`
    pub fn create_delay(&self, resource: &str, delay: Duration) -> &Self {
        self.edit_faults(resource, |f| f.create_delay = Some(delay))
    }

    /// How many times `op` was called for `resource`
    pub fn calls(&self, resource: &str, op: MemoryOp) -> u32 {
        self.state()
            .calls
            .get(&(resource.to_string(), op))
            .copied()
            .unwrap_or(0)
    }

    /// Total `op` calls over every resource
    pub fn total_calls(&self, op: MemoryOp) -> u32 {
        self.state()
            .calls
            .iter()
            .filter(|((_, o), _)| *o == op)
            .map(|(_, n)| n)
            .sum()
    }

    /// Creates and deletes in call order
    pub fn events(&self) -> Vec<(MemoryOp, String)> {
        self.state().events.clone()
    }

    /// Highest number of create calls that were in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.state().max_in_flight
    }

    fn record(&self, resource: &str, op: MemoryOp) {
        let mut state = self.state();
        *state.calls.entry((resource.to_string(), op)).or_default() += 1;
        if matches!(op, MemoryOp::Create | MemoryOp::Delete) {
            state.events.push((op, resource.to_string()));
        }
    }
}

/// [`Gateway`] backed by a [`MemoryCloud`]
pub struct MemoryGateway {
    cloud: MemoryCloud,
}

impl MemoryGateway {
    fn facts_for(spec: &ResourceSpec, deps: &ResolvedDependencies) -> ResourceFacts {
        let id = spec
            .get_param::<String>(param::NAME)
            .unwrap_or_else(|| spec.name.clone());
        let mut facts = ResourceFacts::new(id.clone()).with_attribute(
            attr::ARN,
            format!("arn:memory:{}:{}", spec.kind.gateway_key(), id),
        );

        if let Some(role) = deps.find(|k| k.is_role()) {
            facts.set_attribute(attr::ROLE_ARN, role.arn());
        }
        if let Some(rule) = deps.by_kind(ResourceKind::NetworkRule) {
            facts.set_attribute(attr::NETWORK_RULE_ID, rule.id.clone());
        }
        if let Some(server) = deps.by_kind(ResourceKind::TransferEndpoint) {
            facts.set_attribute(attr::SERVER_ID, server.id.clone());
        }
        if matches!(
            spec.kind,
            ResourceKind::TransferEndpoint | ResourceKind::WarehouseCluster
        ) {
            facts.set_attribute(attr::ENDPOINT, format!("{}.memory.local", id));
        }
        facts
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    fn name(&self) -> &str {
        "memory"
    }

    async fn describe(
        &self,
        spec: &ResourceSpec,
        _deps: &ResolvedDependencies,
    ) -> GatewayResult<Option<ResourceFacts>> {
        self.cloud.record(&spec.name, MemoryOp::Describe);
        if let Some(reason) = self.cloud.faults(&spec.name).fail_describe {
            return Err(GatewayError::permanent(reason));
        }
        Ok(self.cloud.facts(&spec.name))
    }

    async fn create(
        &self,
        spec: &ResourceSpec,
        deps: &ResolvedDependencies,
    ) -> GatewayResult<ResourceFacts> {
        self.cloud.record(&spec.name, MemoryOp::Create);
        let faults = self.cloud.faults(&spec.name);

        {
            let mut state = self.cloud.state();
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }
        if let Some(delay) = faults.create_delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.cloud.state();
        state.in_flight -= 1;

        if faults.transient_creates > 0 {
            if let Some(f) = state.faults.get_mut(&spec.name) {
                f.transient_creates -= 1;
            }
            return Err(GatewayError::transient("Throttling: rate exceeded"));
        }
        if let Some(reason) = faults.fail_create {
            return Err(GatewayError::permanent(reason));
        }
        if state.resources.contains_key(&spec.name) {
            return Err(GatewayError::already_exists(spec.name.clone()));
        }

        let facts = Self::facts_for(spec, deps);
        debug!(resource = %spec.name, id = %facts.id, "Stored in-memory resource");
        state.resources.insert(spec.name.clone(), facts.clone());
        if faults.race_on_create {
            return Err(GatewayError::already_exists(spec.name.clone()));
        }
        Ok(facts)
    }

    async fn probe(&self, spec: &ResourceSpec, facts: &ResourceFacts) -> GatewayResult<Readiness> {
        self.cloud.record(&spec.name, MemoryOp::Probe);
        let mut state = self.cloud.state();
        let Some(faults) = state.faults.get_mut(&spec.name) else {
            return Ok(Readiness::Ready);
        };
        if faults.never_ready {
            return Ok(Readiness::Pending(format!("{} creating", facts.id)));
        }
        if faults.pending_probes > 0 {
            faults.pending_probes -= 1;
            return Ok(Readiness::Pending("creating".to_string()));
        }
        Ok(Readiness::Ready)
    }

    async fn converge(
        &self,
        spec: &ResourceSpec,
        _facts: &ResourceFacts,
        _deps: &ResolvedDependencies,
    ) -> GatewayResult<()> {
        self.cloud.record(&spec.name, MemoryOp::Converge);
        Ok(())
    }

    async fn delete(&self, spec: &ResourceSpec, _facts: &ResourceFacts) -> GatewayResult<()> {
        self.cloud.record(&spec.name, MemoryOp::Delete);
        if let Some(reason) = self.cloud.faults(&spec.name).fail_delete {
            return Err(GatewayError::permanent(reason));
        }
        self.cloud.state().resources.remove(&spec.name);
        Ok(())
    }
}
