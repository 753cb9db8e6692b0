//! Transfer Family gateways: SFTP endpoint and its user

use crate::classify::SdkResultExt;
use async_trait::async_trait;
use aws_sdk_transfer::Client;
use aws_sdk_transfer::types::{Domain, EndpointType, IdentityProviderType, Protocol, State, Tag};
use landflow_cloud::{
    EndpointMatch, Gateway, GatewayError, GatewayResult, Readiness, ResolvedDependencies,
    ResourceFacts, ResourceKind, ResourceSpec, attr, param,
};
use tracing::{debug, info, instrument, warn};

/// Tag carrying the logical endpoint name
pub const NAME_TAG: &str = "landflow:name";

fn endpoint_facts(server_id: &str, arn: &str, region: Option<&str>) -> ResourceFacts {
    let mut facts = ResourceFacts::new(server_id).with_attribute(attr::ARN, arn);
    if let Some(region) = region {
        facts.set_attribute(
            attr::ENDPOINT,
            format!("{}.server.transfer.{}.amazonaws.com", server_id, region),
        );
    }
    facts
}

pub struct EndpointGateway {
    client: Client,
    region: Option<String>,
}

impl EndpointGateway {
    pub fn new(client: Client, region: Option<String>) -> Self {
        Self { client, region }
    }

    async fn tagged(&self, arn: &str, name: &str) -> GatewayResult<bool> {
        let output = self
            .client
            .list_tags_for_resource()
            .arn(arn)
            .send()
            .await
            .gateway("list tags")?;
        Ok(output
            .tags()
            .iter()
            .any(|tag| tag.key() == NAME_TAG && tag.value() == name))
    }
}

#[async_trait]
impl Gateway for EndpointGateway {
    fn name(&self) -> &str {
        "transfer-server"
    }

    async fn describe(
        &self,
        spec: &ResourceSpec,
        _deps: &ResolvedDependencies,
    ) -> GatewayResult<Option<ResourceFacts>> {
        let name: String = spec.require_param(param::NAME)?;
        let matching: EndpointMatch = spec.param_or_default(param::MATCH)?;

        let mut pages = self.client.list_servers().into_paginator().send();
        while let Some(page) = pages.next().await {
            let page = page.gateway("list servers")?;
            for server in page.servers() {
                let Some(server_id) = server.server_id() else {
                    continue;
                };
                if matching == EndpointMatch::First || self.tagged(server.arn(), &name).await? {
                    debug!(server_id, ?matching, "Found existing endpoint");
                    let mut facts = endpoint_facts(server_id, server.arn(), self.region.as_deref());
                    if let Some(state) = server.state() {
                        facts.set_attribute(attr::STATUS, state.as_str());
                    }
                    return Ok(Some(facts));
                }
            }
        }
        Ok(None)
    }

    #[instrument(skip_all, fields(resource = %spec.name))]
    async fn create(
        &self,
        spec: &ResourceSpec,
        _deps: &ResolvedDependencies,
    ) -> GatewayResult<ResourceFacts> {
        let name: String = spec.require_param(param::NAME)?;
        let protocol: String = spec.require_param(param::PROTOCOL)?;
        let identity_provider: String = spec.require_param(param::IDENTITY_PROVIDER)?;
        let endpoint_type: String = spec.require_param(param::ENDPOINT_TYPE)?;
        let domain: String = spec.require_param(param::DOMAIN)?;
        let host_key: String = spec.require_param(param::HOST_KEY)?;

        let tag = Tag::builder()
            .key(NAME_TAG)
            .value(&name)
            .build()
            .map_err(|e| GatewayError::permanent(e.to_string()))?;

        let output = self
            .client
            .create_server()
            .protocols(Protocol::from(protocol.as_str()))
            .identity_provider_type(IdentityProviderType::from(identity_provider.as_str()))
            .endpoint_type(EndpointType::from(endpoint_type.as_str()))
            .domain(Domain::from(domain.as_str()))
            .host_key(host_key)
            .tags(tag)
            .send()
            .await
            .gateway("create server")?;

        let server_id = output.server_id();
        info!(server_id, "Created transfer endpoint");
        // ARN is filled in by the re-describe after the endpoint is online
        Ok(endpoint_facts(server_id, server_id, self.region.as_deref()))
    }

    async fn probe(&self, _spec: &ResourceSpec, facts: &ResourceFacts) -> GatewayResult<Readiness> {
        let output = self
            .client
            .describe_server()
            .server_id(&facts.id)
            .send()
            .await
            .or_not_found("describe server")?;
        let Some(state) = output.as_ref().and_then(|o| o.server()).and_then(|s| s.state()) else {
            return Ok(Readiness::Pending("not visible yet".to_string()));
        };
        Ok(match state {
            State::Online => Readiness::Ready,
            State::StartFailed | State::StopFailed => Readiness::Failed(state.as_str().to_string()),
            other => Readiness::Pending(other.as_str().to_string()),
        })
    }

    #[instrument(skip_all, fields(resource = %spec.name, server_id = %facts.id))]
    async fn delete(&self, spec: &ResourceSpec, facts: &ResourceFacts) -> GatewayResult<()> {
        if self
            .client
            .delete_server()
            .server_id(&facts.id)
            .send()
            .await
            .or_not_found("delete server")?
            .is_some()
        {
            info!("Deleted transfer endpoint");
        }
        Ok(())
    }
}

pub struct UserGateway {
    client: Client,
}

impl UserGateway {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn user_facts(username: &str, server_id: &str, arn: &str, role: Option<&str>) -> ResourceFacts {
        let mut facts = ResourceFacts::new(username)
            .with_attribute(attr::ARN, arn)
            .with_attribute(attr::SERVER_ID, server_id);
        if let Some(role) = role {
            facts.set_attribute(attr::ROLE_ARN, role);
        }
        facts
    }
}

#[async_trait]
impl Gateway for UserGateway {
    fn name(&self) -> &str {
        "transfer-user"
    }

    /// Users are listed on the endpoint this user depends on. During a
    /// teardown discovery the endpoint may already be unknown, which means
    /// the user cannot exist either.
    async fn describe(
        &self,
        spec: &ResourceSpec,
        deps: &ResolvedDependencies,
    ) -> GatewayResult<Option<ResourceFacts>> {
        let username: String = spec.require_param(param::NAME)?;
        let Some(server) = deps.by_kind(ResourceKind::TransferEndpoint) else {
            return Ok(None);
        };

        let mut pages = self
            .client
            .list_users()
            .server_id(&server.id)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let Some(page) = page.or_not_found("list users")? else {
                return Ok(None);
            };
            if let Some(user) = page
                .users()
                .iter()
                .find(|user| user.user_name() == Some(username.as_str()))
            {
                return Ok(Some(Self::user_facts(
                    &username,
                    &server.id,
                    user.arn(),
                    user.role(),
                )));
            }
        }
        Ok(None)
    }

    #[instrument(skip_all, fields(resource = %spec.name))]
    async fn create(
        &self,
        spec: &ResourceSpec,
        deps: &ResolvedDependencies,
    ) -> GatewayResult<ResourceFacts> {
        let username: String = spec.require_param(param::NAME)?;
        let home: String = spec.require_param(param::HOME_DIRECTORY)?;
        let public_key: String = spec.require_param(param::PUBLIC_KEY)?;
        let server = deps.require(spec, ResourceKind::TransferEndpoint)?;
        let role = deps
            .find(|kind| kind.is_role())
            .ok_or_else(|| {
                GatewayError::permanent(format!("{} has no role dependency", spec.name))
            })?
            .arn()
            .to_string();

        self.client
            .create_user()
            .server_id(&server.id)
            .user_name(&username)
            .role(&role)
            .home_directory(home)
            .ssh_public_key_body(public_key)
            .send()
            .await
            .gateway("create user")?;

        info!(user = %username, server_id = %server.id, "Created transfer user");
        // ARN is filled in by the re-describe
        Ok(Self::user_facts(&username, &server.id, &username, Some(&role)))
    }

    async fn probe(&self, _spec: &ResourceSpec, _facts: &ResourceFacts) -> GatewayResult<Readiness> {
        Ok(Readiness::Ready)
    }

    #[instrument(skip_all, fields(resource = %spec.name, user = %facts.id))]
    async fn delete(&self, spec: &ResourceSpec, facts: &ResourceFacts) -> GatewayResult<()> {
        let Some(server_id) = facts.attribute(attr::SERVER_ID) else {
            warn!("No endpoint recorded for user, nothing to delete");
            return Ok(());
        };
        self.client
            .delete_user()
            .server_id(server_id)
            .user_name(&facts.id)
            .send()
            .await
            .or_not_found("delete user")?;
        Ok(())
    }
}
