//! EC2 security group gateway (warehouse ingress rule)

use crate::classify::{Fault, SdkResultExt};
use async_trait::async_trait;
use aws_sdk_ec2::Client;
use aws_sdk_ec2::types::{Filter, IpPermission, IpRange, SecurityGroup};
use landflow_cloud::{
    Gateway, GatewayError, GatewayResult, Readiness, ResolvedDependencies, ResourceFacts,
    ResourceSpec, param,
};
use tracing::{debug, info, instrument};

pub struct NetworkRuleGateway {
    client: Client,
}

impl NetworkRuleGateway {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn find_group(&self, name: &str) -> GatewayResult<Option<SecurityGroup>> {
        let output = self
            .client
            .describe_security_groups()
            .filters(Filter::builder().name("group-name").values(name).build())
            .send()
            .await
            .or_not_found("describe security groups")?;
        Ok(output.and_then(|output| output.security_groups().first().cloned()))
    }

    async fn find_group_by_id(&self, group_id: &str) -> GatewayResult<Option<SecurityGroup>> {
        let output = self
            .client
            .describe_security_groups()
            .group_ids(group_id)
            .send()
            .await
            .or_not_found("describe security groups")?;
        Ok(output.and_then(|output| output.security_groups().first().cloned()))
    }

    fn facts(group: &SecurityGroup) -> Option<ResourceFacts> {
        group.group_id().map(ResourceFacts::new)
    }
}

/// Whether `group` already lets `cidr` in on `port`
fn allows(group: &SecurityGroup, protocol: &str, port: i32, cidr: &str) -> bool {
    group.ip_permissions().iter().any(|permission| {
        permission.ip_protocol() == Some(protocol)
            && permission.from_port() == Some(port)
            && permission.to_port() == Some(port)
            && permission
                .ip_ranges()
                .iter()
                .any(|range| range.cidr_ip() == Some(cidr))
    })
}

#[async_trait]
impl Gateway for NetworkRuleGateway {
    fn name(&self) -> &str {
        "ec2-security-group"
    }

    async fn describe(
        &self,
        spec: &ResourceSpec,
        _deps: &ResolvedDependencies,
    ) -> GatewayResult<Option<ResourceFacts>> {
        let name: String = spec.require_param(param::NAME)?;
        Ok(self.find_group(&name).await?.as_ref().and_then(Self::facts))
    }

    #[instrument(skip_all, fields(resource = %spec.name))]
    async fn create(
        &self,
        spec: &ResourceSpec,
        _deps: &ResolvedDependencies,
    ) -> GatewayResult<ResourceFacts> {
        let name: String = spec.require_param(param::NAME)?;
        let description: String = spec.require_param(param::DESCRIPTION)?;

        let output = self
            .client
            .create_security_group()
            .group_name(&name)
            .description(description)
            .send()
            .await
            .gateway("create security group")?;
        let group_id = output
            .group_id()
            .ok_or_else(|| GatewayError::permanent("create security group returned no id"))?;

        info!(group = %name, group_id, "Created security group");
        Ok(ResourceFacts::new(group_id))
    }

    async fn probe(&self, _spec: &ResourceSpec, facts: &ResourceFacts) -> GatewayResult<Readiness> {
        Ok(match self.find_group_by_id(&facts.id).await? {
            Some(_) => Readiness::Ready,
            None => Readiness::Pending("not visible yet".to_string()),
        })
    }

    /// Authorize the ingress rule unless the group already has it
    async fn converge(
        &self,
        spec: &ResourceSpec,
        facts: &ResourceFacts,
        _deps: &ResolvedDependencies,
    ) -> GatewayResult<()> {
        let protocol: String = spec.require_param(param::PROTOCOL)?;
        let port: i32 = spec.require_param(param::PORT)?;
        let cidr: String = spec.require_param(param::CIDR)?;

        if let Some(group) = self.find_group_by_id(&facts.id).await?
            && allows(&group, &protocol, port, &cidr)
        {
            debug!(group_id = %facts.id, port, "Ingress already authorized");
            return Ok(());
        }

        let permission = IpPermission::builder()
            .ip_protocol(&protocol)
            .from_port(port)
            .to_port(port)
            .ip_ranges(IpRange::builder().cidr_ip(&cidr).build())
            .build();
        match self
            .client
            .authorize_security_group_ingress()
            .group_id(&facts.id)
            .ip_permissions(permission)
            .send()
            .await
            .fault("authorize ingress")?
        {
            Ok(_) => info!(group_id = %facts.id, port, cidr = %cidr, "Authorized ingress"),
            Err(Fault::AlreadyExists) => debug!(group_id = %facts.id, "Ingress already authorized"),
            Err(_) => {
                return Err(GatewayError::permanent(format!(
                    "security group {} disappeared while authorizing ingress",
                    facts.id
                )));
            }
        }
        Ok(())
    }

    #[instrument(skip_all, fields(resource = %spec.name, group_id = %facts.id))]
    async fn delete(&self, spec: &ResourceSpec, facts: &ResourceFacts) -> GatewayResult<()> {
        if self
            .client
            .delete_security_group()
            .group_id(&facts.id)
            .send()
            .await
            .or_not_found("delete security group")?
            .is_some()
        {
            info!("Deleted security group");
        }
        Ok(())
    }
}
