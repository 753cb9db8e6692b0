//! AWS gateways for landflow
//!
//! This crate implements the [`landflow_cloud::Gateway`] trait on top of the
//! official AWS SDK, one gateway per resource kind:
//!
//! | Kind | Gateway | Service |
//! |---|---|---|
//! | Bucket | [`BucketGateway`] | S3 |
//! | S3Policy | [`PolicyGateway`] | IAM |
//! | TrustRole / WarehouseRole | [`RoleGateway`] | IAM |
//! | TransferEndpoint | [`EndpointGateway`] | Transfer Family |
//! | TransferUser | [`UserGateway`] | Transfer Family |
//! | NetworkRule | [`NetworkRuleGateway`] | EC2 |
//! | WarehouseCluster | [`ClusterGateway`] | Redshift |
//!
//! Credentials come from the default provider chain (environment, profile,
//! instance role).
//!
//! # Example
//!
//! ```ignore
//! use landflow_cloud_aws::AwsGateways;
//! use landflow_cloud::Orchestrator;
//!
//! let registry = AwsGateways::connect("ca-central-1").await.registry();
//! let mut orchestrator = Orchestrator::new(specs, &registry, Default::default())?;
//! let report = orchestrator.provision().await;
//! ```

pub mod classify;
pub mod ec2;
pub mod iam;
pub mod redshift;
pub mod s3;
pub mod transfer;

pub use classify::{Fault, classify, classify_code};
pub use ec2::NetworkRuleGateway;
pub use iam::{PolicyGateway, RoleGateway};
pub use redshift::ClusterGateway;
pub use s3::BucketGateway;
pub use transfer::{EndpointGateway, UserGateway};

use aws_config::{BehaviorVersion, Region, SdkConfig};
use landflow_cloud::{GatewayRegistry, ResourceKind, ServiceTag};
use std::sync::Arc;
use tracing::info;

/// Shared SDK configuration for every gateway
#[derive(Debug, Clone)]
pub struct AwsGateways {
    config: SdkConfig,
}

impl AwsGateways {
    /// Load credentials from the default chain for `region`
    pub async fn connect(region: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        info!(region, "Loaded AWS configuration");
        Self { config }
    }

    pub fn from_config(config: SdkConfig) -> Self {
        Self { config }
    }

    pub fn region(&self) -> Option<&str> {
        self.config.region().map(|region| region.as_ref())
    }

    /// Registry with a gateway for every resource kind
    pub fn registry(&self) -> GatewayRegistry {
        let region = self.region().map(str::to_string);
        let policies = Arc::new(PolicyGateway::new(aws_sdk_iam::Client::new(&self.config)));
        let roles = Arc::new(RoleGateway::new(aws_sdk_iam::Client::new(&self.config)));

        GatewayRegistry::new()
            .with(
                ResourceKind::Bucket,
                Arc::new(BucketGateway::new(aws_sdk_s3::Client::new(&self.config))),
            )
            .with(ResourceKind::S3Policy(ServiceTag::Transfer), policies.clone())
            .with(ResourceKind::S3Policy(ServiceTag::Warehouse), policies)
            .with(ResourceKind::TrustRole(ServiceTag::Transfer), roles.clone())
            .with(ResourceKind::TrustRole(ServiceTag::Warehouse), roles.clone())
            .with(ResourceKind::WarehouseRole, roles)
            .with(
                ResourceKind::TransferEndpoint,
                Arc::new(EndpointGateway::new(
                    aws_sdk_transfer::Client::new(&self.config),
                    region,
                )),
            )
            .with(
                ResourceKind::TransferUser,
                Arc::new(UserGateway::new(aws_sdk_transfer::Client::new(&self.config))),
            )
            .with(
                ResourceKind::NetworkRule,
                Arc::new(NetworkRuleGateway::new(aws_sdk_ec2::Client::new(&self.config))),
            )
            .with(
                ResourceKind::WarehouseCluster,
                Arc::new(ClusterGateway::new(aws_sdk_redshift::Client::new(&self.config))),
            )
    }
}
