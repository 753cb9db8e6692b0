pub mod load;
pub mod plan;
pub mod provision;
pub mod teardown;
pub mod validate;

use landflow_cloud::{GatewayRegistry, MemoryCloud};
use landflow_cloud_aws::AwsGateways;
use landflow_core::InfraConfig;

/// 実行先のクラウド
pub enum Target {
    Aws(AwsGateways),
    /// --dry-run
    Memory(MemoryCloud),
}

impl Target {
    pub async fn connect(config: &InfraConfig, dry_run: bool) -> Self {
        if dry_run {
            Target::Memory(MemoryCloud::new())
        } else {
            Target::Aws(AwsGateways::connect(&config.account.region).await)
        }
    }

    pub fn registry(&self) -> GatewayRegistry {
        match self {
            Target::Aws(aws) => aws.registry(),
            Target::Memory(cloud) => cloud.registry(),
        }
    }

    pub fn label(&self, config: &InfraConfig) -> String {
        match self {
            Target::Aws(_) => format!("AWS ({}, {})", config.account.id, config.account.region),
            Target::Memory(_) => "インメモリ (dry-run)".to_string(),
        }
    }
}
