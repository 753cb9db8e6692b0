use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("KDLパースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error("必須項目がありません: {0}")]
    MissingField(String),

    #[error("テンプレート '{document}' に値のないプレースホルダーがあります: {}", .tokens.join(", "))]
    MissingBinding {
        document: String,
        tokens: Vec<String>,
    },

    #[error("ドキュメント '{document}' が不正な JSON です: {message}")]
    InvalidDocument { document: String, message: String },

    #[error("不明なドキュメント: {0}")]
    UnknownDocument(String),

    #[error("SSH 鍵が見つかりません: {path}\n理由: {message}")]
    KeyMaterial { path: PathBuf, message: String },

    #[error("環境変数 {0} が設定されていません")]
    MissingEnv(String),

    #[error(
        "設定ファイルが見つかりません\nヒント: landflow.kdl を作成するか --config / LANDFLOW_CONFIG で指定してください"
    )]
    ConfigNotFound,

    #[error(transparent)]
    Cloud(#[from] landflow_cloud::CloudError),
}

pub type Result<T> = std::result::Result<T, FlowError>;
