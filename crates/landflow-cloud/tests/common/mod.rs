use landflow_cloud::{
    OrchestratorSettings, ResourceKind, ResourceSpec, RetryConfig, ServiceTag, WaitConfig,
};
use std::time::Duration;

/// The transfer + warehouse topology, in declaration order
pub fn topology() -> Vec<ResourceSpec> {
    vec![
        ResourceSpec::new("bucket", ResourceKind::Bucket),
        ResourceSpec::new(
            "transfer-s3-policy",
            ResourceKind::S3Policy(ServiceTag::Transfer),
        )
        .depends_on("bucket"),
        ResourceSpec::new(
            "warehouse-s3-policy",
            ResourceKind::S3Policy(ServiceTag::Warehouse),
        )
        .depends_on("bucket"),
        ResourceSpec::new(
            "transfer-role",
            ResourceKind::TrustRole(ServiceTag::Transfer),
        )
        .depends_on("transfer-s3-policy"),
        ResourceSpec::new("transfer-endpoint", ResourceKind::TransferEndpoint)
            .depends_on("transfer-role"),
        ResourceSpec::new("transfer-user", ResourceKind::TransferUser)
            .depends_on("transfer-endpoint")
            .depends_on("transfer-role")
            .depends_on("bucket"),
        ResourceSpec::new("network-rule", ResourceKind::NetworkRule),
        ResourceSpec::new("warehouse-role", ResourceKind::WarehouseRole)
            .depends_on("warehouse-s3-policy"),
        ResourceSpec::new("warehouse-cluster", ResourceKind::WarehouseCluster)
            .depends_on("warehouse-role")
            .depends_on("network-rule"),
    ]
}

/// Settings with millisecond retry delays and short waits
pub fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        max_parallel: 4,
        retry: RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        },
        wait: WaitConfig {
            budget: Duration::from_secs(5),
            initial_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(100),
            multiplier: 2.0,
        },
        ..Default::default()
    }
}
