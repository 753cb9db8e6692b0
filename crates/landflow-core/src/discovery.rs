//! 設定ファイルの探索

use crate::error::{FlowError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 設定ファイルパスを指定する環境変数
pub const CONFIG_ENV: &str = "LANDFLOW_CONFIG";

const CANDIDATES: [&str; 2] = ["landflow.local.kdl", "landflow.kdl"];

/// landflow.kdl を探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 明示的なパス (--config)
/// 2. 環境変数 LANDFLOW_CONFIG
/// 3. カレントディレクトリ: landflow.local.kdl, landflow.kdl
/// 4. ./.landflow/ ディレクトリ内: 同様の順序
/// 5. ~/.config/landflow/landflow.kdl (グローバル設定)
#[tracing::instrument]
pub fn find_config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    // 1. 明示的な指定は存在しなくてもそのまま使う (読み込み時にエラーになる)
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    // 2. 環境変数
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            debug!(path = %path.display(), "Found config from environment variable");
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;

    // 3. カレントディレクトリ
    if let Some(path) = first_existing(&current_dir) {
        return Ok(path);
    }

    // 4. ./.landflow/
    let landflow_dir = current_dir.join(".landflow");
    if landflow_dir.is_dir()
        && let Some(path) = first_existing(&landflow_dir)
    {
        return Ok(path);
    }

    // 5. グローバル設定
    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("landflow").join("landflow.kdl");
        if global.exists() {
            debug!(path = %global.display(), "Found global config");
            return Ok(global);
        }
    }

    Err(FlowError::ConfigNotFound)
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}
