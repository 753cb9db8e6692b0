//! Redshift cluster gateway

use crate::classify::{Fault, SdkResultExt};
use async_trait::async_trait;
use aws_sdk_redshift::Client;
use aws_sdk_redshift::types::Cluster;
use landflow_cloud::{
    Gateway, GatewayError, GatewayResult, Readiness, ResolvedDependencies, ResourceFacts,
    ResourceKind, ResourceSpec, attr, param,
};
use tracing::{debug, info, instrument};

const AVAILABLE: &str = "available";

/// Statuses a cluster does not leave without intervention
const FAILED_STATUSES: &[&str] = &[
    "incompatible-hsm",
    "incompatible-network",
    "incompatible-parameters",
    "incompatible-restore",
    "storage-full",
];

pub struct ClusterGateway {
    client: Client,
}

impl ClusterGateway {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn find(&self, identifier: &str) -> GatewayResult<Option<Cluster>> {
        let output = self
            .client
            .describe_clusters()
            .cluster_identifier(identifier)
            .send()
            .await
            .or_not_found("describe clusters")?;
        Ok(output.and_then(|output| output.clusters().first().cloned()))
    }
}

fn cluster_facts(identifier: &str, cluster: &Cluster) -> ResourceFacts {
    let mut facts = ResourceFacts::new(identifier);
    if let Some(status) = cluster.cluster_status() {
        facts.set_attribute(attr::STATUS, status);
    }
    if let Some(endpoint) = cluster.endpoint() {
        if let Some(address) = endpoint.address() {
            facts.set_attribute(attr::ENDPOINT, address);
        }
        if let Some(port) = endpoint.port() {
            facts.set_attribute(attr::PORT, port.to_string());
        }
    }
    if let Some(role) = cluster
        .iam_roles()
        .iter()
        .find_map(|role| role.iam_role_arn())
    {
        facts.set_attribute(attr::ROLE_ARN, role);
    }
    if let Some(group) = cluster
        .vpc_security_groups()
        .iter()
        .find_map(|group| group.vpc_security_group_id())
    {
        facts.set_attribute(attr::NETWORK_RULE_ID, group);
    }
    facts
}

fn readiness(status: &str) -> Readiness {
    if status == AVAILABLE {
        Readiness::Ready
    } else if FAILED_STATUSES.contains(&status) {
        Readiness::Failed(status.to_string())
    } else {
        Readiness::Pending(status.to_string())
    }
}

#[async_trait]
impl Gateway for ClusterGateway {
    fn name(&self) -> &str {
        "redshift-cluster"
    }

    async fn describe(
        &self,
        spec: &ResourceSpec,
        _deps: &ResolvedDependencies,
    ) -> GatewayResult<Option<ResourceFacts>> {
        let identifier: String = spec.require_param(param::NAME)?;
        Ok(self
            .find(&identifier)
            .await?
            .map(|cluster| cluster_facts(&identifier, &cluster)))
    }

    #[instrument(skip_all, fields(resource = %spec.name))]
    async fn create(
        &self,
        spec: &ResourceSpec,
        deps: &ResolvedDependencies,
    ) -> GatewayResult<ResourceFacts> {
        let identifier: String = spec.require_param(param::NAME)?;
        let database: String = spec.require_param(param::DATABASE)?;
        let username: String = spec.require_param(param::MASTER_USERNAME)?;
        let password: String = spec.require_param(param::MASTER_PASSWORD)?;
        let node_type: String = spec.require_param(param::NODE_TYPE)?;
        let cluster_type: String = spec.require_param(param::CLUSTER_TYPE)?;
        let node_count: i32 = spec.get_param(param::NODE_COUNT).unwrap_or(1);

        let role = deps.require(spec, ResourceKind::WarehouseRole)?.arn().to_string();
        let group = deps.require(spec, ResourceKind::NetworkRule)?.id.clone();

        let mut request = self
            .client
            .create_cluster()
            .cluster_identifier(&identifier)
            .db_name(database)
            .master_username(username)
            .master_user_password(password)
            .node_type(node_type)
            .cluster_type(&cluster_type)
            .vpc_security_group_ids(&group)
            .iam_roles(&role)
            .default_iam_role_arn(&role);
        // single-node clusters reject an explicit node count
        if cluster_type != "single-node" {
            request = request.number_of_nodes(node_count);
        }

        let output = request.send().await.gateway("create cluster")?;
        info!(cluster = %identifier, "Creating cluster");

        let mut facts = output
            .cluster()
            .map(|cluster| cluster_facts(&identifier, cluster))
            .unwrap_or_else(|| ResourceFacts::new(&identifier));
        facts.set_attribute(attr::ROLE_ARN, role);
        facts.set_attribute(attr::NETWORK_RULE_ID, group);
        Ok(facts)
    }

    async fn probe(&self, _spec: &ResourceSpec, facts: &ResourceFacts) -> GatewayResult<Readiness> {
        let Some(cluster) = self.find(&facts.id).await? else {
            return Ok(Readiness::Pending("not visible yet".to_string()));
        };
        Ok(readiness(cluster.cluster_status().unwrap_or("unknown")))
    }

    #[instrument(skip_all, fields(resource = %spec.name, cluster = %facts.id))]
    async fn delete(&self, spec: &ResourceSpec, facts: &ResourceFacts) -> GatewayResult<()> {
        match self
            .client
            .delete_cluster()
            .cluster_identifier(&facts.id)
            .skip_final_cluster_snapshot(true)
            .send()
            .await
            .fault("delete cluster")?
        {
            Ok(_) => info!("Deleting cluster"),
            Err(Fault::NotFound) => debug!("Cluster already gone"),
            Err(fault) => {
                return Err(GatewayError::permanent(format!(
                    "delete cluster {}: unexpected {:?}",
                    facts.id, fault
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_from_status() {
        assert_eq!(readiness("available"), Readiness::Ready);
        assert_eq!(
            readiness("creating"),
            Readiness::Pending("creating".to_string())
        );
        assert_eq!(
            readiness("incompatible-network"),
            Readiness::Failed("incompatible-network".to_string())
        );
    }

    #[test]
    fn test_missing_cluster_fields_are_skipped() {
        let facts = cluster_facts("dw", &Cluster::builder().cluster_status("creating").build());
        assert_eq!(facts.id, "dw");
        assert_eq!(facts.attribute(attr::STATUS), Some("creating"));
        assert_eq!(facts.attribute(attr::ENDPOINT), None);
    }
}
