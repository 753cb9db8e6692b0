//! IAM gateways: customer-managed S3 policies and service roles
//!
//! One [`RoleGateway`] serves both the transfer role and the warehouse role.
//! A role's trust document comes from its spec; the S3 policy it gets is the
//! one it depends on.

use crate::classify::SdkResultExt;
use async_trait::async_trait;
use aws_sdk_iam::Client;
use aws_sdk_iam::types::PolicyScopeType;
use landflow_cloud::{
    Gateway, GatewayError, GatewayResult, Readiness, ResolvedDependencies, ResourceFacts,
    ResourceKind, ResourceSpec, attr, param,
};
use tracing::{debug, info, instrument};

fn managed_policy_arn(name: &str) -> String {
    format!("arn:aws:iam::aws:policy/{}", name)
}

pub struct PolicyGateway {
    client: Client,
}

impl PolicyGateway {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Customer-managed policy named `name`, if any
    async fn find_by_name(&self, name: &str) -> GatewayResult<Option<String>> {
        let mut pages = self
            .client
            .list_policies()
            .scope(PolicyScopeType::Local)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.gateway("list policies")?;
            if let Some(arn) = page
                .policies()
                .iter()
                .find(|policy| policy.policy_name() == Some(name))
                .and_then(|policy| policy.arn())
            {
                return Ok(Some(arn.to_string()));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Gateway for PolicyGateway {
    fn name(&self) -> &str {
        "iam-policy"
    }

    async fn describe(
        &self,
        spec: &ResourceSpec,
        _deps: &ResolvedDependencies,
    ) -> GatewayResult<Option<ResourceFacts>> {
        let name: String = spec.require_param(param::NAME)?;
        Ok(self
            .find_by_name(&name)
            .await?
            .map(|arn| ResourceFacts::new(name).with_attribute(attr::ARN, arn)))
    }

    #[instrument(skip_all, fields(resource = %spec.name))]
    async fn create(
        &self,
        spec: &ResourceSpec,
        _deps: &ResolvedDependencies,
    ) -> GatewayResult<ResourceFacts> {
        let name: String = spec.require_param(param::NAME)?;
        let document: String = spec.require_param(param::DOCUMENT)?;

        let output = self
            .client
            .create_policy()
            .policy_name(&name)
            .policy_document(document)
            .send()
            .await
            .gateway("create policy")?;
        let arn = output
            .policy()
            .and_then(|policy| policy.arn())
            .ok_or_else(|| GatewayError::permanent("create policy returned no ARN"))?;

        info!(policy = %name, "Created policy");
        Ok(ResourceFacts::new(name).with_attribute(attr::ARN, arn))
    }

    async fn probe(&self, _spec: &ResourceSpec, facts: &ResourceFacts) -> GatewayResult<Readiness> {
        let found = self
            .client
            .get_policy()
            .policy_arn(facts.arn())
            .send()
            .await
            .or_not_found("get policy")?;
        Ok(match found {
            Some(_) => Readiness::Ready,
            None => Readiness::Pending("not visible yet".to_string()),
        })
    }

    /// Non-default versions go first; IAM refuses to delete a policy that
    /// still has them.
    #[instrument(skip_all, fields(resource = %spec.name, policy = %facts.id))]
    async fn delete(&self, spec: &ResourceSpec, facts: &ResourceFacts) -> GatewayResult<()> {
        let arn = facts.arn();
        let Some(versions) = self
            .client
            .list_policy_versions()
            .policy_arn(arn)
            .send()
            .await
            .or_not_found("list policy versions")?
        else {
            return Ok(());
        };

        for version in versions.versions() {
            if version.is_default_version() {
                continue;
            }
            if let Some(id) = version.version_id() {
                self.client
                    .delete_policy_version()
                    .policy_arn(arn)
                    .version_id(id)
                    .send()
                    .await
                    .or_not_found("delete policy version")?;
            }
        }

        if self
            .client
            .delete_policy()
            .policy_arn(arn)
            .send()
            .await
            .or_not_found("delete policy")?
            .is_some()
        {
            info!("Deleted policy");
        }
        Ok(())
    }
}

pub struct RoleGateway {
    client: Client,
}

impl RoleGateway {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get_role(&self, name: &str) -> GatewayResult<Option<ResourceFacts>> {
        let output = self
            .client
            .get_role()
            .role_name(name)
            .send()
            .await
            .or_not_found("get role")?;
        Ok(output
            .and_then(|output| output.role().map(|role| role.arn().to_string()))
            .map(|arn| ResourceFacts::new(name).with_attribute(attr::ARN, arn)))
    }
}

#[async_trait]
impl Gateway for RoleGateway {
    fn name(&self) -> &str {
        "iam-role"
    }

    async fn describe(
        &self,
        spec: &ResourceSpec,
        _deps: &ResolvedDependencies,
    ) -> GatewayResult<Option<ResourceFacts>> {
        let name: String = spec.require_param(param::NAME)?;
        self.get_role(&name).await
    }

    #[instrument(skip_all, fields(resource = %spec.name))]
    async fn create(
        &self,
        spec: &ResourceSpec,
        _deps: &ResolvedDependencies,
    ) -> GatewayResult<ResourceFacts> {
        let name: String = spec.require_param(param::NAME)?;
        let trust: String = spec.require_param(param::DOCUMENT)?;

        let output = self
            .client
            .create_role()
            .role_name(&name)
            .assume_role_policy_document(trust)
            .send()
            .await
            .gateway("create role")?;
        let arn = output
            .role()
            .map(|role| role.arn().to_string())
            .ok_or_else(|| GatewayError::permanent("create role returned no role"))?;

        info!(role = %name, "Created role");
        Ok(ResourceFacts::new(name).with_attribute(attr::ARN, arn))
    }

    async fn probe(&self, _spec: &ResourceSpec, facts: &ResourceFacts) -> GatewayResult<Readiness> {
        Ok(match self.get_role(&facts.id).await? {
            Some(_) => Readiness::Ready,
            None => Readiness::Pending("not visible yet".to_string()),
        })
    }

    /// Attach the S3 policy this role depends on plus the AWS-managed ones.
    /// Attaching an attached policy is a no-op on the IAM side.
    async fn converge(
        &self,
        spec: &ResourceSpec,
        facts: &ResourceFacts,
        deps: &ResolvedDependencies,
    ) -> GatewayResult<()> {
        let managed: Vec<String> = spec.get_param(param::MANAGED_POLICIES).unwrap_or_default();
        let mut policies: Vec<String> = managed.iter().map(|n| managed_policy_arn(n)).collect();
        if let Some(policy) = deps.find(|kind| matches!(kind, ResourceKind::S3Policy(_))) {
            policies.insert(0, policy.arn().to_string());
        }

        for policy_arn in &policies {
            self.client
                .attach_role_policy()
                .role_name(&facts.id)
                .policy_arn(policy_arn)
                .send()
                .await
                .gateway("attach role policy")?;
            debug!(role = %facts.id, policy = %policy_arn, "Attached policy");
        }
        Ok(())
    }

    /// Attached policies are detached first; IAM refuses to delete a role
    /// that still has them.
    #[instrument(skip_all, fields(resource = %spec.name, role = %facts.id))]
    async fn delete(&self, spec: &ResourceSpec, facts: &ResourceFacts) -> GatewayResult<()> {
        let Some(attached) = self
            .client
            .list_attached_role_policies()
            .role_name(&facts.id)
            .send()
            .await
            .or_not_found("list attached role policies")?
        else {
            return Ok(());
        };

        for policy_arn in attached
            .attached_policies()
            .iter()
            .filter_map(|policy| policy.policy_arn())
        {
            self.client
                .detach_role_policy()
                .role_name(&facts.id)
                .policy_arn(policy_arn)
                .send()
                .await
                .or_not_found("detach role policy")?;
        }

        if self
            .client
            .delete_role()
            .role_name(&facts.id)
            .send()
            .await
            .or_not_found("delete role")?
            .is_some()
        {
            info!("Deleted role");
        }
        Ok(())
    }
}
