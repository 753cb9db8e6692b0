//! Provider gateway trait definition

use crate::error::{CloudError, GatewayError, GatewayResult};
use crate::resource::{ResourceFacts, ResourceKind, ResourceSpec};
use crate::retry::RetryConfig;
use crate::wait::{Readiness, WaitConfig, poll_until_ready};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Provider gateway abstraction trait
///
/// One implementation per resource kind. Gateways receive specs and return
/// facts; they never hold orchestrator state. Every error they return is
/// already classified into the [`GatewayError`] taxonomy.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Returns the gateway name for logs (e.g., "s3-bucket", "iam-role")
    fn name(&self) -> &str;

    /// Look up the resource described by `spec`
    ///
    /// `Ok(None)` means the resource does not exist. Used both to detect
    /// pre-existing resources and to answer dependents' parameter needs.
    async fn describe(
        &self,
        spec: &ResourceSpec,
        deps: &ResolvedDependencies,
    ) -> GatewayResult<Option<ResourceFacts>>;

    /// Issue the create call
    ///
    /// When the provider says the resource is already there this returns
    /// [`GatewayError::AlreadyExists`] rather than failing the plan.
    async fn create(
        &self,
        spec: &ResourceSpec,
        deps: &ResolvedDependencies,
    ) -> GatewayResult<ResourceFacts>;

    /// Probe a created resource once
    async fn probe(&self, spec: &ResourceSpec, facts: &ResourceFacts) -> GatewayResult<Readiness>;

    /// Idempotent step run once the resource is ready (attaching policies,
    /// authorizing ingress...). Runs for reused resources too.
    async fn converge(
        &self,
        _spec: &ResourceSpec,
        _facts: &ResourceFacts,
        _deps: &ResolvedDependencies,
    ) -> GatewayResult<()> {
        Ok(())
    }

    /// Delete the resource. Deleting something already gone is a success.
    async fn delete(&self, spec: &ResourceSpec, facts: &ResourceFacts) -> GatewayResult<()>;

    /// Idempotent create
    ///
    /// Looks the resource up first so that a repeated run issues no create
    /// call at all. If the create call races with another creator and reports
    /// `AlreadyExists`, falls back to `describe` and reuses what is there.
    async fn ensure(
        &self,
        spec: &ResourceSpec,
        deps: &ResolvedDependencies,
        retry: &RetryConfig,
    ) -> GatewayResult<Ensured> {
        if let Some(facts) = retry
            .run(&spec.name, || self.describe(spec, deps))
            .await?
        {
            debug!(resource = %spec.name, id = %facts.id, "Resource already exists");
            return Ok(Ensured::existing(facts));
        }

        match retry.run(&spec.name, || self.create(spec, deps)).await {
            Ok(facts) => {
                info!(resource = %spec.name, id = %facts.id, "Created resource");
                Ok(Ensured::created(facts))
            }
            Err(GatewayError::AlreadyExists(detail)) => {
                debug!(resource = %spec.name, %detail, "Create raced with an existing resource");
                retry
                    .run(&spec.name, || self.describe(spec, deps))
                    .await?
                    .map(Ensured::existing)
                    .ok_or_else(|| {
                        GatewayError::permanent(format!(
                            "{} reported as existing but could not be described: {}",
                            spec.name, detail
                        ))
                    })
            }
            Err(err) => Err(err),
        }
    }

    /// Block until the resource is usable or the wait budget is spent
    async fn wait_ready(
        &self,
        spec: &ResourceSpec,
        facts: &ResourceFacts,
        wait: &WaitConfig,
    ) -> GatewayResult<()> {
        poll_until_ready(&spec.name, wait, || self.probe(spec, facts)).await
    }

    /// Block until `describe` no longer finds the resource
    async fn wait_absent(
        &self,
        spec: &ResourceSpec,
        deps: &ResolvedDependencies,
        wait: &WaitConfig,
    ) -> GatewayResult<()> {
        poll_until_ready(&spec.name, wait, || async {
            Ok::<_, GatewayError>(match self.describe(spec, deps).await? {
                None => Readiness::Ready,
                Some(facts) => Readiness::Pending(
                    facts
                        .attribute(crate::resource::attr::STATUS)
                        .unwrap_or("still present")
                        .to_string(),
                ),
            })
        })
        .await
    }
}

/// Result of [`Gateway::ensure`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ensured {
    pub facts: ResourceFacts,
    pub already_existed: bool,
}

impl Ensured {
    pub fn created(facts: ResourceFacts) -> Self {
        Self {
            facts,
            already_existed: false,
        }
    }

    pub fn existing(facts: ResourceFacts) -> Self {
        Self {
            facts,
            already_existed: true,
        }
    }
}

/// Facts of the dependencies of one spec, as published when each became Ready
#[derive(Debug, Clone, Default)]
pub struct ResolvedDependencies {
    entries: Vec<(String, ResourceKind, ResourceFacts)>,
}

impl ResolvedDependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, kind: ResourceKind, facts: ResourceFacts) {
        self.entries.push((name.into(), kind, facts));
    }

    /// Facts of the dependency with logical name `name`
    pub fn get(&self, name: &str) -> Option<&ResourceFacts> {
        self.entries
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, _, facts)| facts)
    }

    /// Facts of the first dependency of the given kind
    pub fn by_kind(&self, kind: ResourceKind) -> Option<&ResourceFacts> {
        self.entries
            .iter()
            .find(|(_, k, _)| *k == kind)
            .map(|(_, _, facts)| facts)
    }

    /// Facts of the first dependency matching `predicate`
    pub fn find(&self, predicate: impl Fn(ResourceKind) -> bool) -> Option<&ResourceFacts> {
        self.entries
            .iter()
            .find(|(_, k, _)| predicate(*k))
            .map(|(_, _, facts)| facts)
    }

    /// Like [`Self::by_kind`] but a missing dependency is a malformed input
    pub fn require(&self, spec: &ResourceSpec, kind: ResourceKind) -> GatewayResult<&ResourceFacts> {
        self.by_kind(kind).ok_or_else(|| {
            GatewayError::permanent(format!(
                "{} needs a resolved {} dependency",
                spec.name, kind
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Gateways indexed by [`ResourceKind::gateway_key`]
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<&'static str, Arc<dyn Gateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `gateway` for every kind sharing `kind`'s gateway key
    pub fn register(&mut self, kind: ResourceKind, gateway: Arc<dyn Gateway>) {
        self.gateways.insert(kind.gateway_key(), gateway);
    }

    pub fn with(mut self, kind: ResourceKind, gateway: Arc<dyn Gateway>) -> Self {
        self.register(kind, gateway);
        self
    }

    pub fn get(&self, kind: ResourceKind) -> Option<Arc<dyn Gateway>> {
        self.gateways.get(kind.gateway_key()).cloned()
    }

    /// Ensure every spec has a gateway before anything is called
    pub fn check(&self, specs: &[ResourceSpec]) -> crate::error::Result<()> {
        for spec in specs {
            if self.get(spec.kind).is_none() {
                return Err(CloudError::GatewayNotRegistered {
                    kind: spec.kind.to_string(),
                    resource: spec.name.clone(),
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for GatewayRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.gateways.keys().collect();
        keys.sort();
        f.debug_struct("GatewayRegistry").field("kinds", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ServiceTag;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Gateway whose create always races with another creator
    struct RacingGateway {
        exists: Mutex<bool>,
        creates: Mutex<u32>,
    }

    #[async_trait]
    impl Gateway for RacingGateway {
        fn name(&self) -> &str {
            "racing"
        }

        async fn describe(
            &self,
            spec: &ResourceSpec,
            _deps: &ResolvedDependencies,
        ) -> GatewayResult<Option<ResourceFacts>> {
            Ok(self
                .exists
                .lock()
                .unwrap()
                .then(|| ResourceFacts::new(spec.name.clone())))
        }

        async fn create(
            &self,
            spec: &ResourceSpec,
            _deps: &ResolvedDependencies,
        ) -> GatewayResult<ResourceFacts> {
            *self.creates.lock().unwrap() += 1;
            *self.exists.lock().unwrap() = true;
            Err(GatewayError::already_exists(spec.name.clone()))
        }

        async fn probe(&self, _: &ResourceSpec, _: &ResourceFacts) -> GatewayResult<Readiness> {
            Ok(Readiness::Ready)
        }

        async fn delete(&self, _: &ResourceSpec, _: &ResourceFacts) -> GatewayResult<()> {
            Ok(())
        }
    }

    fn racing() -> RacingGateway {
        RacingGateway {
            exists: Mutex::new(false),
            creates: Mutex::new(0),
        }
    }

    #[tokio::test]
    async fn test_ensure_falls_back_to_describe_on_already_exists() {
        let gateway = racing();
        let spec = ResourceSpec::new("transfer-role", ResourceKind::TrustRole(ServiceTag::Transfer));

        let ensured = gateway
            .ensure(&spec, &ResolvedDependencies::new(), &RetryConfig::none())
            .await
            .unwrap();

        assert!(ensured.already_existed);
        assert_eq!(ensured.facts.id, "transfer-role");
        assert_eq!(*gateway.creates.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ensure_skips_create_when_present() {
        let gateway = racing();
        *gateway.exists.lock().unwrap() = true;
        let spec = ResourceSpec::new("bucket", ResourceKind::Bucket);

        let ensured = gateway
            .ensure(&spec, &ResolvedDependencies::new(), &RetryConfig::none())
            .await
            .unwrap();

        assert!(ensured.already_existed);
        assert_eq!(*gateway.creates.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_absent_returns_once_gone() {
        let gateway = racing();
        let spec = ResourceSpec::new("bucket", ResourceKind::Bucket);
        let result = gateway
            .wait_absent(
                &spec,
                &ResolvedDependencies::new(),
                &WaitConfig::with_budget(Duration::from_secs(5)),
            )
            .await;
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_registry_shares_key_across_service_tags() {
        let registry = GatewayRegistry::new().with(
            ResourceKind::S3Policy(ServiceTag::Transfer),
            Arc::new(racing()),
        );
        assert!(registry.get(ResourceKind::S3Policy(ServiceTag::Warehouse)).is_some());
        assert!(registry.get(ResourceKind::Bucket).is_none());

        let specs = vec![ResourceSpec::new("bucket", ResourceKind::Bucket)];
        assert!(matches!(
            registry.check(&specs),
            Err(CloudError::GatewayNotRegistered { .. })
        ));
    }

    #[test]
    fn test_resolved_dependencies_lookup() {
        let mut deps = ResolvedDependencies::new();
        deps.insert(
            "network-rule",
            ResourceKind::NetworkRule,
            ResourceFacts::new("sg-0abc"),
        );
        deps.insert(
            "warehouse-role",
            ResourceKind::WarehouseRole,
            ResourceFacts::new("S3RedshiftRole"),
        );

        assert_eq!(deps.get("network-rule").unwrap().id, "sg-0abc");
        assert_eq!(
            deps.by_kind(ResourceKind::WarehouseRole).unwrap().id,
            "S3RedshiftRole"
        );
        assert_eq!(deps.find(|k| k.is_role()).unwrap().id, "S3RedshiftRole");

        let spec = ResourceSpec::new("warehouse-cluster", ResourceKind::WarehouseCluster);
        assert!(deps.require(&spec, ResourceKind::Bucket).is_err());
        assert_eq!(deps.len(), 2);
    }
}
