//! landflow の設定とリソース定義
//!
//! landflow.kdl を読み込み、ポリシードキュメントと SSH 鍵を解決して、
//! オーケストレーターに渡す [`landflow_cloud::ResourceSpec`] の一式を組み立てます。

pub mod blueprint;
pub mod discovery;
pub mod error;
pub mod keys;
pub mod model;
pub mod parser;
pub mod template;

pub use blueprint::{Blueprint, PolicyDocuments, Secrets, master_password, names, settings};
pub use discovery::{CONFIG_ENV, find_config_file};
pub use error::{FlowError, Result};
pub use keys::{KeyMaterial, KeyPairPaths, discover_key_pair};
pub use model::*;
pub use parser::{parse_kdl_file, parse_kdl_string};
pub use template::{Bindings, Document, DocumentLibrary, DocumentTemplate, bindings};

/// 設定ファイルを探して読み込む
pub fn load_config(explicit: Option<&std::path::Path>) -> Result<InfraConfig> {
    let path = find_config_file(explicit)?;
    tracing::info!(path = %path.display(), "Loading configuration");
    parse_kdl_file(&path)
}
