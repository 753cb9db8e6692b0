//! Resource model: kinds, specs and facts

use crate::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known attribute keys in [`ResourceFacts::attributes`]
pub mod attr {
    /// Amazon Resource Name of the resource
    pub const ARN: &str = "arn";
    /// ARN of the role a resource acts as (transfer user, warehouse cluster)
    pub const ROLE_ARN: &str = "role_arn";
    /// Identifier of the network rule a cluster is attached to
    pub const NETWORK_RULE_ID: &str = "network_rule_id";
    /// Identifier of the transfer endpoint a user belongs to
    pub const SERVER_ID: &str = "server_id";
    /// Hostname clients connect to
    pub const ENDPOINT: &str = "endpoint";
    pub const PORT: &str = "port";
    /// Provider-reported status string
    pub const STATUS: &str = "status";
}

/// Well-known parameter keys in [`ResourceSpec::params`]
pub mod param {
    /// Provider-side name or identifier
    pub const NAME: &str = "name";
    pub const REGION: &str = "region";
    /// Resolved policy or trust document (JSON text)
    pub const DOCUMENT: &str = "document";
    /// AWS-managed policy names to attach to a role
    pub const MANAGED_POLICIES: &str = "managed_policies";
    pub const PROTOCOL: &str = "protocol";
    pub const IDENTITY_PROVIDER: &str = "identity_provider";
    pub const ENDPOINT_TYPE: &str = "endpoint_type";
    pub const DOMAIN: &str = "domain";
    /// How an existing transfer endpoint is recognized ([`super::EndpointMatch`])
    pub const MATCH: &str = "match";
    pub const HOST_KEY: &str = "host_key";
    pub const HOME_DIRECTORY: &str = "home_directory";
    pub const PUBLIC_KEY: &str = "public_key";
    pub const DESCRIPTION: &str = "description";
    pub const PORT: &str = "port";
    pub const CIDR: &str = "cidr";
    pub const DATABASE: &str = "database";
    pub const MASTER_USERNAME: &str = "master_username";
    pub const MASTER_PASSWORD: &str = "master_password";
    pub const NODE_TYPE: &str = "node_type";
    pub const CLUSTER_TYPE: &str = "cluster_type";
    pub const NODE_COUNT: &str = "node_count";
}

/// Which service a policy or trust role is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceTag {
    /// Managed SFTP transfer service
    Transfer,
    /// Data-warehouse service
    Warehouse,
}

impl std::fmt::Display for ServiceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceTag::Transfer => write!(f, "transfer"),
            ServiceTag::Warehouse => write!(f, "warehouse"),
        }
    }
}

/// How an existing transfer endpoint is recognized
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointMatch {
    /// By the endpoint's name tag
    #[default]
    Name,
    /// Whatever endpoint the account has first
    First,
}

impl std::fmt::Display for EndpointMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointMatch::Name => write!(f, "name"),
            EndpointMatch::First => write!(f, "first"),
        }
    }
}

/// Kind of a provisionable resource
///
/// Identifies which gateway handles a spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "service")]
pub enum ResourceKind {
    Bucket,
    S3Policy(ServiceTag),
    TrustRole(ServiceTag),
    TransferEndpoint,
    TransferUser,
    NetworkRule,
    WarehouseRole,
    WarehouseCluster,
}

impl ResourceKind {
    /// Every kind, in declaration order
    pub const ALL: [ResourceKind; 10] = [
        ResourceKind::Bucket,
        ResourceKind::S3Policy(ServiceTag::Transfer),
        ResourceKind::S3Policy(ServiceTag::Warehouse),
        ResourceKind::TrustRole(ServiceTag::Transfer),
        ResourceKind::TrustRole(ServiceTag::Warehouse),
        ResourceKind::TransferEndpoint,
        ResourceKind::TransferUser,
        ResourceKind::NetworkRule,
        ResourceKind::WarehouseRole,
        ResourceKind::WarehouseCluster,
    ];

    /// Key used to look up the gateway for this kind
    ///
    /// The service tag does not take part: one policy gateway serves both
    /// services.
    pub fn gateway_key(&self) -> &'static str {
        match self {
            ResourceKind::Bucket => "bucket",
            ResourceKind::S3Policy(_) => "s3-policy",
            ResourceKind::TrustRole(_) => "trust-role",
            ResourceKind::TransferEndpoint => "transfer-endpoint",
            ResourceKind::TransferUser => "transfer-user",
            ResourceKind::NetworkRule => "network-rule",
            ResourceKind::WarehouseRole => "warehouse-role",
            ResourceKind::WarehouseCluster => "warehouse-cluster",
        }
    }

    pub fn service(&self) -> Option<ServiceTag> {
        match self {
            ResourceKind::S3Policy(tag) | ResourceKind::TrustRole(tag) => Some(*tag),
            ResourceKind::TransferEndpoint | ResourceKind::TransferUser => {
                Some(ServiceTag::Transfer)
            }
            ResourceKind::WarehouseRole | ResourceKind::WarehouseCluster => {
                Some(ServiceTag::Warehouse)
            }
            ResourceKind::Bucket | ResourceKind::NetworkRule => None,
        }
    }

    /// IAM-style role kinds (their facts carry an ARN other resources assume)
    pub fn is_role(&self) -> bool {
        matches!(self, ResourceKind::TrustRole(_) | ResourceKind::WarehouseRole)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::S3Policy(tag) => write!(f, "s3-policy({})", tag),
            ResourceKind::TrustRole(tag) => write!(f, "trust-role({})", tag),
            other => write!(f, "{}", other.gateway_key()),
        }
    }
}

/// Immutable description of one resource to provision
///
/// Built once at startup from configuration and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Logical name, unique within a plan (e.g. "transfer-role")
    pub name: String,

    /// Resource kind
    pub kind: ResourceKind,

    /// Logical names of the resources this one depends on
    pub depends_on: Vec<String>,

    /// Kind-specific parameters
    pub params: serde_json::Value,
}

impl ResourceSpec {
    pub fn new(name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            depends_on: Vec::new(),
            params: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.depends_on.push(dependency.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
        if let serde_json::Value::Object(map) = &mut self.params {
            map.insert(key.into(), value);
        }
        self
    }

    /// Get a parameter as a specific type
    pub fn get_param<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.params
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Get an optional parameter, falling back to `T::default()` when absent
    ///
    /// A present but malformed value is an error rather than the default.
    pub fn param_or_default<T>(&self, key: &str) -> GatewayResult<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        match self.params.get(key) {
            None | Some(serde_json::Value::Null) => Ok(T::default()),
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                GatewayError::permanent(format!(
                    "{} ({}) has an invalid parameter '{}': {}",
                    self.name, self.kind, key, e
                ))
            }),
        }
    }

    /// Get a parameter that must be present
    ///
    /// A missing parameter is a malformed input, hence `Permanent`.
    pub fn require_param<T: serde::de::DeserializeOwned>(&self, key: &str) -> GatewayResult<T> {
        self.get_param(key).ok_or_else(|| {
            GatewayError::permanent(format!(
                "{} ({}) is missing parameter '{}'",
                self.name, self.kind, key
            ))
        })
    }
}

/// Facts a gateway reports about a live resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFacts {
    /// Provider-side identifier (bucket name, ARN, server id, group id...)
    pub id: String,

    /// Resource attributes (ARN, endpoint, attached role...)
    pub attributes: BTreeMap<String, String>,
}

impl ResourceFacts {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// The resource ARN, falling back to the identifier
    pub fn arn(&self) -> &str {
        self.attribute(attr::ARN).unwrap_or(&self.id)
    }
}
