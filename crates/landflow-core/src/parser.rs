//! KDLパーサー
//!
//! landflow.kdl をパースして [`InfraConfig`] を生成します。

use crate::error::{FlowError, Result};
use crate::model::{
    AccountConfig, EndpointMatch, InfraConfig, NetworkConfig, PasswordSource, RunConfig,
    TransferConfig, WarehouseConfig,
};
use kdl::{KdlDocument, KdlNode};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// KDLファイルをパースしてInfraConfigを生成
#[tracing::instrument(skip(path), fields(path = %path.as_ref().display()))]
pub fn parse_kdl_file<P: AsRef<Path>>(path: P) -> Result<InfraConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| FlowError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    parse_kdl_string(&content, base_dir)
}

/// KDL文字列をパース
///
/// `base_dir` は相対パス (鍵ファイル、policy-dir) の基準です。
pub fn parse_kdl_string(content: &str, base_dir: PathBuf) -> Result<InfraConfig> {
    let doc: KdlDocument = content.parse()?;

    let mut account = None;
    let mut bucket = None;
    let mut transfer = TransferConfig::default();
    let mut network = NetworkConfig::default();
    let mut warehouse = WarehouseConfig::default();
    let mut policy_dir = None;
    let mut run = RunConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "account" => account = Some(parse_account(node)?),
            "bucket" => bucket = first_string(node),
            "transfer" => parse_transfer(node, &mut transfer)?,
            "network" => parse_network(node, &mut network)?,
            "warehouse" => parse_warehouse(node, &mut warehouse)?,
            "policy_dir" | "policy-dir" => policy_dir = first_string(node).map(PathBuf::from),
            "run" => parse_run(node, &mut run)?,
            other => {
                return Err(FlowError::InvalidConfig(format!(
                    "不明なノード: {}",
                    other
                )));
            }
        }
    }

    let account = account.ok_or_else(|| FlowError::MissingField("account".to_string()))?;
    let bucket = bucket.ok_or_else(|| FlowError::MissingField("bucket".to_string()))?;

    require("transfer.username", &transfer.username)?;
    require("warehouse.cluster", &warehouse.cluster)?;
    require("warehouse.database", &warehouse.database)?;
    require("warehouse.username", &warehouse.username)?;

    debug!(bucket = %bucket, region = %account.region, "Parsed configuration");

    Ok(InfraConfig {
        account,
        bucket,
        transfer,
        network,
        warehouse,
        policy_dir,
        run,
        base_dir,
    })
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(FlowError::MissingField(field.to_string()));
    }
    Ok(())
}

fn first_string(node: &KdlNode) -> Option<String> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn first_integer(node: &KdlNode) -> Result<i128> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_integer())
        .ok_or_else(|| {
            FlowError::InvalidConfig(format!("{} には整数が必要です", node.name().value()))
        })
}

fn all_strings(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter_map(|e| e.value().as_string().map(|s| s.to_string()))
        .collect()
}

fn ranged<T: TryFrom<i128>>(node: &KdlNode) -> Result<T> {
    let value = first_integer(node)?;
    T::try_from(value).map_err(|_| {
        FlowError::InvalidConfig(format!(
            "{} の値が範囲外です: {}",
            node.name().value(),
            value
        ))
    })
}

fn children(node: &KdlNode) -> impl Iterator<Item = &KdlNode> {
    node.children().into_iter().flat_map(|c| c.nodes())
}

/// account ノードをパース
fn parse_account(node: &KdlNode) -> Result<AccountConfig> {
    let mut account = AccountConfig::default();
    for child in children(node) {
        match child.name().value() {
            "id" => {
                // 数値で書かれた場合も受け付ける
                account.id = match first_string(child) {
                    Some(id) => id,
                    None => first_integer(child)?.to_string(),
                };
            }
            "region" => account.region = first_string(child).unwrap_or_default(),
            other => return Err(unknown("account", other)),
        }
    }
    require("account.id", &account.id)?;
    require("account.region", &account.region)?;
    Ok(account)
}

/// transfer ノードをパース
fn parse_transfer(node: &KdlNode, transfer: &mut TransferConfig) -> Result<()> {
    for child in children(node) {
        match child.name().value() {
            "role" => transfer.role = first_string(child).unwrap_or_default(),
            "s3_policy_prefix" | "s3-policy-prefix" => {
                transfer.s3_policy_prefix = first_string(child).unwrap_or_default()
            }
            "managed_policies" | "managed-policies" => {
                transfer.managed_policies = all_strings(child)
            }
            "username" => transfer.username = first_string(child).unwrap_or_default(),
            "protocol" => transfer.protocol = first_string(child).unwrap_or_default(),
            "identity_provider" | "identity-provider" => {
                transfer.identity_provider = first_string(child).unwrap_or_default()
            }
            "endpoint_type" | "endpoint-type" => {
                transfer.endpoint_type = first_string(child).unwrap_or_default()
            }
            "domain" => transfer.domain = first_string(child).unwrap_or_default(),
            "match" => {
                transfer.endpoint_match = match first_string(child).as_deref() {
                    Some("name") => EndpointMatch::Name,
                    Some("first") => EndpointMatch::First,
                    other => {
                        return Err(FlowError::InvalidConfig(format!(
                            "transfer.match は \"name\" か \"first\" です: {:?}",
                            other
                        )));
                    }
                }
            }
            "host_key" | "host-key" => transfer.host_key = first_string(child).map(PathBuf::from),
            "public_key" | "public-key" => {
                transfer.public_key = first_string(child).map(PathBuf::from)
            }
            "key_dir" | "key-dir" => transfer.key_dir = first_string(child).map(PathBuf::from),
            other => return Err(unknown("transfer", other)),
        }
    }
    Ok(())
}

/// network ノードをパース
fn parse_network(node: &KdlNode, network: &mut NetworkConfig) -> Result<()> {
    for child in children(node) {
        match child.name().value() {
            "group" => network.group = first_string(child).unwrap_or_default(),
            "description" => network.description = first_string(child).unwrap_or_default(),
            "port" => network.port = ranged(child)?,
            "protocol" => network.protocol = first_string(child).unwrap_or_default(),
            "cidr" => network.cidr = first_string(child).unwrap_or_default(),
            other => return Err(unknown("network", other)),
        }
    }
    require("network.group", &network.group)
}

/// warehouse ノードをパース
fn parse_warehouse(node: &KdlNode, warehouse: &mut WarehouseConfig) -> Result<()> {
    for child in children(node) {
        match child.name().value() {
            "role" => warehouse.role = first_string(child).unwrap_or_default(),
            "s3_policy_prefix" | "s3-policy-prefix" => {
                warehouse.s3_policy_prefix = first_string(child).unwrap_or_default()
            }
            "managed_policies" | "managed-policies" => {
                warehouse.managed_policies = all_strings(child)
            }
            "cluster" => warehouse.cluster = first_string(child).unwrap_or_default(),
            "database" => warehouse.database = first_string(child).unwrap_or_default(),
            "username" => warehouse.username = first_string(child).unwrap_or_default(),
            "password" => warehouse.password = first_string(child).map(PasswordSource::Literal),
            "password_env" | "password-env" => {
                warehouse.password = first_string(child).map(PasswordSource::Env)
            }
            "node_type" | "node-type" => {
                warehouse.node_type = first_string(child).unwrap_or_default()
            }
            "cluster_type" | "cluster-type" => {
                warehouse.cluster_type = first_string(child).unwrap_or_default()
            }
            "node_count" | "node-count" => warehouse.node_count = ranged(child)?,
            "schema" => warehouse.schema = first_string(child).unwrap_or_default(),
            "key_prefix" | "key-prefix" => {
                warehouse.key_prefix = first_string(child).unwrap_or_default()
            }
            other => return Err(unknown("warehouse", other)),
        }
    }
    Ok(())
}

/// run ノードをパース
fn parse_run(node: &KdlNode, run: &mut RunConfig) -> Result<()> {
    for child in children(node) {
        match child.name().value() {
            "max_parallel" | "max-parallel" => run.max_parallel = ranged(child)?,
            "wait_secs" | "wait-secs" => run.wait_secs = ranged(child)?,
            "cluster_wait_secs" | "cluster-wait-secs" => run.cluster_wait_secs = ranged(child)?,
            "retries" => run.retries = ranged(child)?,
            other => return Err(unknown("run", other)),
        }
    }
    if run.max_parallel == 0 {
        return Err(FlowError::InvalidConfig(
            "run.max-parallel は 1 以上にしてください".to_string(),
        ));
    }
    Ok(())
}

fn unknown(parent: &str, name: &str) -> FlowError {
    FlowError::InvalidConfig(format!("{} に不明な項目があります: {}", parent, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
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
}
"#;

    fn parse(content: &str) -> Result<InfraConfig> {
        parse_kdl_string(content, PathBuf::from("/srv/landflow"))
    }

    #[test]
    fn test_parse_minimal_uses_defaults() {
        let config = parse(MINIMAL).unwrap();

        assert_eq!(config.account.id, "123456789012");
        assert_eq!(config.bucket, "sf-transactions-12345");
        assert_eq!(config.transfer.role, "S3TransferFamilyRole");
        assert_eq!(config.transfer.endpoint_match, EndpointMatch::Name);
        assert_eq!(config.network.port, 5439);
        assert_eq!(config.warehouse.node_type, "dc2.large");
        assert_eq!(config.run, RunConfig::default());
        assert!(config.policy_dir.is_none());
    }

    #[test]
    fn test_parse_full_document() {
        let config = parse(
            r#"
account {
    id "123456789012"
    region "us-east-1"
}
bucket "landing"
transfer {
    role "SftpRole"
    s3-policy-prefix "sftp-"
    managed-policies "AmazonS3FullAccess" "AWSTransferConsoleFullAccess"
    username "anthony"
    protocol "SFTP"
    identity-provider "SERVICE_MANAGED"
    endpoint-type "PUBLIC"
    domain "S3"
    match "first"
    key-dir "ssh"
}
network {
    group "dw-ingress"
    port 5440
    protocol "tcp"
    cidr "10.0.0.0/8"
}
warehouse {
    role "DwRole"
    cluster "dw"
    database "finance"
    username "admin"
    password-env "DW_PASSWORD"
    node-type "ra3.xlplus"
    cluster-type "multi-node"
    node-count 2
    schema "staging"
    key-prefix "daily/"
}
policy-dir "policy"
run {
    max-parallel 2
    wait-secs 60
    cluster-wait-secs 900
    retries 5
}
"#,
        )
        .unwrap();

        assert_eq!(config.transfer.managed_policies.len(), 2);
        assert_eq!(config.transfer.endpoint_match, EndpointMatch::First);
        assert_eq!(config.transfer.key_dir, Some(PathBuf::from("ssh")));
        assert_eq!(config.transfer_policy_name(), "sftp-landing");
        assert_eq!(config.network.port, 5440);
        assert_eq!(config.network.cidr, "10.0.0.0/8");
        assert_eq!(
            config.warehouse.password,
            Some(PasswordSource::Env("DW_PASSWORD".to_string()))
        );
        assert_eq!(config.warehouse.node_count, 2);
        assert_eq!(config.warehouse.key_prefix, "daily/");
        assert_eq!(config.policy_dir, Some(PathBuf::from("policy")));
        assert_eq!(
            config.run,
            RunConfig {
                max_parallel: 2,
                wait_secs: 60,
                cluster_wait_secs: 900,
                retries: 5,
            }
        );
    }

    #[test]
    fn test_snake_case_aliases() {
        let config = parse(&format!(
            "{}\nrun {{\n    max_parallel 3\n}}\npolicy_dir \"p\"",
            MINIMAL
        ))
        .unwrap();
        assert_eq!(config.run.max_parallel, 3);
        assert_eq!(config.policy_dir, Some(PathBuf::from("p")));
    }

    #[test]
    fn test_missing_bucket() {
        let content = MINIMAL.replace("bucket \"sf-transactions-12345\"", "");
        assert!(matches!(
            parse(&content),
            Err(FlowError::MissingField(field)) if field == "bucket"
        ));
    }

    #[test]
    fn test_missing_warehouse_cluster() {
        let content = MINIMAL.replace("cluster \"transactions-dw\"", "");
        assert!(matches!(
            parse(&content),
            Err(FlowError::MissingField(field)) if field == "warehouse.cluster"
        ));
    }

    #[test]
    fn test_port_out_of_range() {
        let content = format!("{}\nnetwork {{\n    port 70000\n}}", MINIMAL);
        assert!(matches!(parse(&content), Err(FlowError::InvalidConfig(_))));
    }

    #[test]
    fn test_unknown_node_is_rejected() {
        let content = format!("{}\nbukcet \"typo\"", MINIMAL);
        assert!(matches!(parse(&content), Err(FlowError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_match_value() {
        let content = MINIMAL.replacen(
            "username \"anthony\"\n}",
            "username \"anthony\"\n    match \"newest\"\n}",
            1,
        );
        assert!(matches!(parse(&content), Err(FlowError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_parallelism_is_rejected() {
        let content = format!("{}\nrun {{\n    max-parallel 0\n}}", MINIMAL);
        assert!(matches!(parse(&content), Err(FlowError::InvalidConfig(_))));
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(parse("account {"), Err(FlowError::KdlParse(_))));
    }

    #[test]
    fn test_parse_file_sets_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("landflow.kdl");
        std::fs::write(&path, MINIMAL).unwrap();

        let config = parse_kdl_file(&path).unwrap();
        assert_eq!(config.base_dir, dir.path());
    }
}
