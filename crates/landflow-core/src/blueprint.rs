//! 設定からリソースグラフを組み立てる
//!
//! 9 個のリソースと依存関係は固定です。設定値はここで一度だけ
//! [`ResourceSpec`] のパラメータに変換され、以後ゲートウェイが参照します。
//!
//! ```text
//! bucket ─┬─ transfer-s3-policy ── transfer-role ── transfer-endpoint ─┐
//!         │                              └──────────────────────────── transfer-user
//!         └─ warehouse-s3-policy ── warehouse-role ─┐
//! network-rule ──────────────────────────────────── warehouse-cluster
//! ```

use crate::error::{FlowError, Result};
use crate::keys::KeyMaterial;
use crate::model::{InfraConfig, PasswordSource, RunConfig};
use crate::template::{
    Document, DocumentLibrary, TRANSFER_S3_POLICY, TRANSFER_TRUST_POLICY, WAREHOUSE_S3_POLICY,
    WAREHOUSE_TRUST_POLICY, bindings,
};
use landflow_cloud::{
    OrchestratorSettings, ResourceKind, ResourceSpec, RetryConfig, ServiceTag, WaitConfig, param,
};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// 論理リソース名
pub mod names {
    pub const BUCKET: &str = "bucket";
    pub const TRANSFER_S3_POLICY: &str = "transfer-s3-policy";
    pub const WAREHOUSE_S3_POLICY: &str = "warehouse-s3-policy";
    pub const TRANSFER_ROLE: &str = "transfer-role";
    pub const TRANSFER_ENDPOINT: &str = "transfer-endpoint";
    pub const TRANSFER_USER: &str = "transfer-user";
    pub const NETWORK_RULE: &str = "network-rule";
    pub const WAREHOUSE_ROLE: &str = "warehouse-role";
    pub const WAREHOUSE_CLUSTER: &str = "warehouse-cluster";
}

/// 展開済みのポリシードキュメント一式
#[derive(Debug, Clone)]
pub struct PolicyDocuments {
    pub transfer_s3: Document,
    pub warehouse_s3: Document,
    pub transfer_trust: Document,
    pub warehouse_trust: Document,
}

impl PolicyDocuments {
    /// 設定の policy-dir を考慮してテンプレートを読み込み、展開する
    pub fn load(config: &InfraConfig) -> Result<Self> {
        let library = match &config.policy_dir {
            Some(dir) => DocumentLibrary::with_overrides(&config.resolve_path(dir))?,
            None => DocumentLibrary::builtin(),
        };
        Self::resolve(config, &library)
    }

    pub fn resolve(config: &InfraConfig, library: &DocumentLibrary) -> Result<Self> {
        let values = bindings([
            ("bucket_name", config.bucket.as_str()),
            ("account_id", config.account.id.as_str()),
            ("region", config.account.region.as_str()),
        ]);
        Ok(Self {
            transfer_s3: library.resolve_policy(TRANSFER_S3_POLICY, &values)?,
            warehouse_s3: library.resolve_policy(WAREHOUSE_S3_POLICY, &values)?,
            transfer_trust: library.resolve_policy(TRANSFER_TRUST_POLICY, &values)?,
            warehouse_trust: library.resolve_policy(WAREHOUSE_TRUST_POLICY, &values)?,
        })
    }
}

/// 作成時にだけ必要な秘密情報
#[derive(Clone)]
pub struct Secrets {
    pub keys: KeyMaterial,
    pub master_password: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("keys", &self.keys)
            .field("master_password", &"<redacted>")
            .finish()
    }
}

impl Secrets {
    pub fn load(config: &InfraConfig) -> Result<Self> {
        Ok(Self {
            keys: KeyMaterial::load(config)?,
            master_password: master_password(config)?,
        })
    }
}

/// マスターパスワードを解決
pub fn master_password(config: &InfraConfig) -> Result<String> {
    match &config.warehouse.password {
        Some(PasswordSource::Literal(password)) => Ok(password.clone()),
        Some(PasswordSource::Env(var)) => {
            std::env::var(var).map_err(|_| FlowError::MissingEnv(var.clone()))
        }
        None => Err(FlowError::MissingField(
            "warehouse.password または warehouse.password-env".to_string(),
        )),
    }
}

/// 固定トポロジーの ResourceSpec 一式
#[derive(Debug, Clone)]
pub struct Blueprint {
    specs: Vec<ResourceSpec>,
}

impl Blueprint {
    /// 作成用: ドキュメントと秘密情報を全て解決する
    ///
    /// プロバイダーを呼ぶ前に、値のないプレースホルダーや
    /// 読めない鍵はここでエラーになります。
    #[tracing::instrument(skip(config), fields(bucket = %config.bucket))]
    pub fn for_provision(config: &InfraConfig) -> Result<Self> {
        let documents = PolicyDocuments::load(config)?;
        let secrets = Secrets::load(config)?;
        info!("Resolved policy documents and key material");
        Ok(Self::assemble(config, Some(&documents), Some(&secrets)))
    }

    /// 削除用: 名前だけで足りるので秘密情報は読まない
    pub fn for_teardown(config: &InfraConfig) -> Self {
        Self::assemble(config, None, None)
    }

    /// ドキュメントと秘密情報を任意に与えて組み立てる
    pub fn assemble(
        config: &InfraConfig,
        documents: Option<&PolicyDocuments>,
        secrets: Option<&Secrets>,
    ) -> Self {
        let account = &config.account;
        let transfer = &config.transfer;
        let network = &config.network;
        let warehouse = &config.warehouse;

        let bucket = ResourceSpec::new(names::BUCKET, ResourceKind::Bucket)
            .with_param(param::NAME, &config.bucket)
            .with_param(param::REGION, &account.region);

        let mut transfer_s3_policy = ResourceSpec::new(
            names::TRANSFER_S3_POLICY,
            ResourceKind::S3Policy(ServiceTag::Transfer),
        )
        .depends_on(names::BUCKET)
        .with_param(param::NAME, config.transfer_policy_name());

        let mut warehouse_s3_policy = ResourceSpec::new(
            names::WAREHOUSE_S3_POLICY,
            ResourceKind::S3Policy(ServiceTag::Warehouse),
        )
        .depends_on(names::BUCKET)
        .with_param(param::NAME, config.warehouse_policy_name());

        let mut transfer_role = ResourceSpec::new(
            names::TRANSFER_ROLE,
            ResourceKind::TrustRole(ServiceTag::Transfer),
        )
        .depends_on(names::TRANSFER_S3_POLICY)
        .with_param(param::NAME, &transfer.role)
        .with_param(param::MANAGED_POLICIES, &transfer.managed_policies);

        let mut transfer_endpoint =
            ResourceSpec::new(names::TRANSFER_ENDPOINT, ResourceKind::TransferEndpoint)
                .depends_on(names::TRANSFER_ROLE)
                .with_param(param::NAME, format!("{}-sftp", config.bucket))
                .with_param(param::PROTOCOL, &transfer.protocol)
                .with_param(param::IDENTITY_PROVIDER, &transfer.identity_provider)
                .with_param(param::ENDPOINT_TYPE, &transfer.endpoint_type)
                .with_param(param::DOMAIN, &transfer.domain)
                .with_param(param::MATCH, transfer.endpoint_match);

        let mut transfer_user = ResourceSpec::new(names::TRANSFER_USER, ResourceKind::TransferUser)
            .depends_on(names::TRANSFER_ENDPOINT)
            .depends_on(names::TRANSFER_ROLE)
            .depends_on(names::BUCKET)
            .with_param(param::NAME, &transfer.username)
            .with_param(param::HOME_DIRECTORY, format!("/{}", config.bucket));

        let network_rule = ResourceSpec::new(names::NETWORK_RULE, ResourceKind::NetworkRule)
            .with_param(param::NAME, &network.group)
            .with_param(param::DESCRIPTION, &network.description)
            .with_param(param::PORT, network.port)
            .with_param(param::PROTOCOL, &network.protocol)
            .with_param(param::CIDR, &network.cidr);

        let mut warehouse_role = ResourceSpec::new(names::WAREHOUSE_ROLE, ResourceKind::WarehouseRole)
            .depends_on(names::WAREHOUSE_S3_POLICY)
            .with_param(param::NAME, &warehouse.role)
            .with_param(param::MANAGED_POLICIES, &warehouse.managed_policies);

        let mut warehouse_cluster =
            ResourceSpec::new(names::WAREHOUSE_CLUSTER, ResourceKind::WarehouseCluster)
                .depends_on(names::WAREHOUSE_ROLE)
                .depends_on(names::NETWORK_RULE)
                .with_param(param::NAME, &warehouse.cluster)
                .with_param(param::DATABASE, &warehouse.database)
                .with_param(param::MASTER_USERNAME, &warehouse.username)
                .with_param(param::NODE_TYPE, &warehouse.node_type)
                .with_param(param::CLUSTER_TYPE, &warehouse.cluster_type)
                .with_param(param::NODE_COUNT, warehouse.node_count);

        if let Some(documents) = documents {
            transfer_s3_policy =
                transfer_s3_policy.with_param(param::DOCUMENT, &documents.transfer_s3.text);
            warehouse_s3_policy =
                warehouse_s3_policy.with_param(param::DOCUMENT, &documents.warehouse_s3.text);
            transfer_role = transfer_role.with_param(param::DOCUMENT, &documents.transfer_trust.text);
            warehouse_role =
                warehouse_role.with_param(param::DOCUMENT, &documents.warehouse_trust.text);
        }

        if let Some(secrets) = secrets {
            transfer_endpoint =
                transfer_endpoint.with_param(param::HOST_KEY, &secrets.keys.host_private_key);
            transfer_user =
                transfer_user.with_param(param::PUBLIC_KEY, &secrets.keys.user_public_key);
            warehouse_cluster =
                warehouse_cluster.with_param(param::MASTER_PASSWORD, &secrets.master_password);
        }

        let specs = vec![
            bucket,
            transfer_s3_policy,
            warehouse_s3_policy,
            transfer_role,
            transfer_endpoint,
            transfer_user,
            network_rule,
            warehouse_role,
            warehouse_cluster,
        ];
        debug!(resources = specs.len(), "Assembled blueprint");
        Self { specs }
    }

    pub fn specs(&self) -> &[ResourceSpec] {
        &self.specs
    }

    pub fn into_specs(self) -> Vec<ResourceSpec> {
        self.specs
    }
}

/// run ブロックからオーケストレーター設定を作る
pub fn settings(run: &RunConfig) -> OrchestratorSettings {
    let mut wait_overrides = HashMap::new();
    wait_overrides.insert(
        ResourceKind::WarehouseCluster,
        WaitConfig {
            budget: Duration::from_secs(run.cluster_wait_secs),
            initial_interval: Duration::from_secs(10),
            max_interval: Duration::from_secs(60),
            ..WaitConfig::default()
        },
    );

    OrchestratorSettings {
        max_parallel: run.max_parallel,
        retry: RetryConfig {
            max_attempts: run.retries,
            ..RetryConfig::default()
        },
        wait: WaitConfig::with_budget(Duration::from_secs(run.wait_secs)),
        wait_overrides,
        rollback_on_cancel: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EndpointMatch;
    use crate::parser::parse_kdl_string;
    use landflow_cloud::ProvisioningPlan;
    use serial_test::serial;
    use std::path::PathBuf;

    const CONFIG: &str = r#"
account {
    id "123456789012"
    region "ca-central-1"
}
bucket "sf-transactions-12345"
transfer {
    username "anthony"
}
warehouse {
    cluster "transactions-dw"
    database "san_francisco"
    username "anthony"
    password "Secret123"
}
run {
    max-parallel 2
    cluster-wait-secs 900
}
"#;

    fn config() -> InfraConfig {
        parse_kdl_string(CONFIG, PathBuf::from("/srv/landflow")).unwrap()
    }

    #[test]
    fn test_teardown_blueprint_has_fixed_topology() {
        let blueprint = Blueprint::for_teardown(&config());
        let plan = ProvisioningPlan::build(blueprint.into_specs()).unwrap();

        let order: Vec<&str> = plan.forward_order().map(|s| s.name.as_str()).collect();
        assert_eq!(order.len(), 9);
        assert_eq!(order[0], names::BUCKET);

        let mut dependents = plan.dependents_of(names::BUCKET);
        dependents.sort();
        assert_eq!(
            dependents,
            vec![
                names::TRANSFER_S3_POLICY,
                names::TRANSFER_USER,
                names::WAREHOUSE_S3_POLICY
            ]
        );
        assert_eq!(
            plan.descendants_of(names::NETWORK_RULE),
            vec![names::WAREHOUSE_CLUSTER]
        );
    }

    #[test]
    fn test_teardown_blueprint_omits_secrets() {
        let blueprint = Blueprint::for_teardown(&config());
        for spec in blueprint.specs() {
            assert!(spec.get_param::<String>(param::HOST_KEY).is_none());
            assert!(spec.get_param::<String>(param::MASTER_PASSWORD).is_none());
            assert!(spec.get_param::<String>(param::DOCUMENT).is_none());
        }
    }

    #[test]
    fn test_names_come_from_config() {
        let config = config();
        let documents = PolicyDocuments::resolve(&config, &DocumentLibrary::builtin()).unwrap();
        let blueprint = Blueprint::assemble(&config, Some(&documents), None);
        let spec = |name: &str| {
            blueprint
                .specs()
                .iter()
                .find(|s| s.name == name)
                .unwrap()
                .clone()
        };

        assert_eq!(
            spec(names::TRANSFER_S3_POLICY).get_param::<String>(param::NAME),
            Some("TransferFamilyListGetDeletePutS3Bucket-sf-transactions-12345".to_string())
        );
        assert_eq!(
            spec(names::TRANSFER_USER).get_param::<String>(param::HOME_DIRECTORY),
            Some("/sf-transactions-12345".to_string())
        );
        assert_eq!(
            spec(names::NETWORK_RULE).get_param::<u16>(param::PORT),
            Some(5439)
        );
        let trust = spec(names::TRANSFER_ROLE)
            .get_param::<String>(param::DOCUMENT)
            .unwrap();
        assert!(trust.contains("123456789012"));
        assert!(trust.contains("ca-central-1"));
    }

    #[test]
    fn test_endpoint_match_is_typed_param() {
        let mut config = config();
        config.transfer.endpoint_match = EndpointMatch::First;
        let blueprint = Blueprint::for_teardown(&config);
        let endpoint = blueprint
            .specs()
            .iter()
            .find(|s| s.name == names::TRANSFER_ENDPOINT)
            .unwrap();

        assert_eq!(
            endpoint
                .param_or_default::<EndpointMatch>(param::MATCH)
                .unwrap(),
            EndpointMatch::First
        );
    }

    #[test]
    #[serial]
    fn test_password_from_env() {
        let mut config = config();
        config.warehouse.password = Some(PasswordSource::Env("LANDFLOW_TEST_PW".to_string()));

        temp_env::with_var("LANDFLOW_TEST_PW", Some("from-env"), || {
            assert_eq!(master_password(&config).unwrap(), "from-env");
        });
        temp_env::with_var_unset("LANDFLOW_TEST_PW", || {
            assert!(matches!(
                master_password(&config),
                Err(FlowError::MissingEnv(_))
            ));
        });
    }

    #[test]
    fn test_settings_from_run_config() {
        let config = config();
        let settings = settings(&config.run);
        assert_eq!(settings.max_parallel, 2);
        assert_eq!(settings.wait.budget, Duration::from_secs(300));
        assert_eq!(
            settings.wait_for(ResourceKind::WarehouseCluster).budget,
            Duration::from_secs(900)
        );
        assert_eq!(
            settings.wait_for(ResourceKind::Bucket).budget,
            Duration::from_secs(300)
        );
    }
}
