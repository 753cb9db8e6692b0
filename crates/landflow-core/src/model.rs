//! 設定モデル
//!
//! landflow.kdl の内容をそのまま表す不変の構造体。
//! 認識されるオプションはここで一度だけ列挙されます。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 既存エンドポイントの照合方法 (`landflow:name` タグ、または最初の一つ)
pub use landflow_cloud::EndpointMatch;

/// インフラ全体の設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfraConfig {
    pub account: AccountConfig,
    /// S3 バケット名
    pub bucket: String,
    pub transfer: TransferConfig,
    pub network: NetworkConfig,
    pub warehouse: WarehouseConfig,
    /// ポリシーテンプレートの上書きディレクトリ
    pub policy_dir: Option<PathBuf>,
    pub run: RunConfig,
    /// 相対パスの基準 (設定ファイルのディレクトリ)
    pub base_dir: PathBuf,
}

impl InfraConfig {
    /// 設定ファイルからの相対パスを解決
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// 転送サービス用 S3 ポリシー名
    pub fn transfer_policy_name(&self) -> String {
        format!("{}{}", self.transfer.s3_policy_prefix, self.bucket)
    }

    /// ウェアハウス用 S3 ポリシー名
    pub fn warehouse_policy_name(&self) -> String {
        format!("{}{}", self.warehouse.s3_policy_prefix, self.bucket)
    }

    /// SFTP エンドポイントのホスト名
    pub fn sftp_hostname(&self, server_id: &str) -> String {
        format!(
            "{}.server.transfer.{}.amazonaws.com",
            server_id, self.account.region
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    pub id: String,
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    pub role: String,
    pub s3_policy_prefix: String,
    /// AWS 管理ポリシー名
    pub managed_policies: Vec<String>,
    pub username: String,
    pub protocol: String,
    pub identity_provider: String,
    pub endpoint_type: String,
    pub domain: String,
    pub endpoint_match: EndpointMatch,
    pub host_key: Option<PathBuf>,
    pub public_key: Option<PathBuf>,
    /// 鍵ペアを探すディレクトリ (host-key / public-key の代わり)
    pub key_dir: Option<PathBuf>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            role: "S3TransferFamilyRole".to_string(),
            s3_policy_prefix: "TransferFamilyListGetDeletePutS3Bucket-".to_string(),
            managed_policies: vec![
                "AmazonS3FullAccess".to_string(),
                "AWSTransferConsoleFullAccess".to_string(),
                "AWSTransferFullAccess".to_string(),
            ],
            username: String::new(),
            protocol: "SFTP".to_string(),
            identity_provider: "SERVICE_MANAGED".to_string(),
            endpoint_type: "PUBLIC".to_string(),
            domain: "S3".to_string(),
            endpoint_match: EndpointMatch::Name,
            host_key: None,
            public_key: None,
            key_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// セキュリティグループ名
    pub group: String,
    pub description: String,
    pub port: u16,
    pub protocol: String,
    pub cidr: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            group: "redshift-ingress".to_string(),
            description: "Route all inbound traffic on TCP port 5439".to_string(),
            port: 5439,
            protocol: "tcp".to_string(),
            cidr: "0.0.0.0/0".to_string(),
        }
    }
}

/// マスターパスワードの取得元
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordSource {
    Literal(String),
    /// 環境変数名
    Env(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub role: String,
    pub s3_policy_prefix: String,
    pub managed_policies: Vec<String>,
    /// クラスタ識別子
    pub cluster: String,
    pub database: String,
    pub username: String,
    pub password: Option<PasswordSource>,
    pub node_type: String,
    pub cluster_type: String,
    pub node_count: u32,
    /// ETL のロード先スキーマ
    pub schema: String,
    /// CSV オブジェクトキーの接頭辞
    pub key_prefix: String,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            role: "S3RedshiftRole".to_string(),
            s3_policy_prefix: "RedshiftListGetCreateDeletePutAbortS3Bucket-".to_string(),
            managed_policies: vec!["AmazonRedshiftAllCommandsFullAccess".to_string()],
            cluster: String::new(),
            database: String::new(),
            username: String::new(),
            password: None,
            node_type: "dc2.large".to_string(),
            cluster_type: "single-node".to_string(),
            node_count: 1,
            schema: "report".to_string(),
            key_prefix: String::new(),
        }
    }
}

/// 実行時の並列度と待機予算
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub max_parallel: usize,
    pub wait_secs: u64,
    /// クラスタは作成に時間がかかるので別枠
    pub cluster_wait_secs: u64,
    pub retries: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            wait_secs: 300,
            cluster_wait_secs: 1800,
            retries: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> InfraConfig {
        InfraConfig {
            account: AccountConfig {
                id: "123456789012".to_string(),
                region: "ca-central-1".to_string(),
            },
            bucket: "sf-transactions-12345".to_string(),
            transfer: TransferConfig::default(),
            network: NetworkConfig::default(),
            warehouse: WarehouseConfig::default(),
            policy_dir: None,
            run: RunConfig::default(),
            base_dir: PathBuf::from("/srv/landflow"),
        }
    }

    #[test]
    fn test_policy_names() {
        let config = config();
        assert_eq!(
            config.transfer_policy_name(),
            "TransferFamilyListGetDeletePutS3Bucket-sf-transactions-12345"
        );
        assert_eq!(
            config.warehouse_policy_name(),
            "RedshiftListGetCreateDeletePutAbortS3Bucket-sf-transactions-12345"
        );
    }

    #[test]
    fn test_sftp_hostname() {
        assert_eq!(
            config().sftp_hostname("s-0123456789abcdef0"),
            "s-0123456789abcdef0.server.transfer.ca-central-1.amazonaws.com"
        );
    }

    #[test]
    fn test_resolve_path() {
        let config = config();
        assert_eq!(
            config.resolve_path(Path::new("ssh/host_key")),
            PathBuf::from("/srv/landflow/ssh/host_key")
        );
        assert_eq!(
            config.resolve_path(Path::new("/etc/keys/host")),
            PathBuf::from("/etc/keys/host")
        );
    }
}
