//! ポリシードキュメントのテンプレート展開
//!
//! プレースホルダーは `{identifier}` 形式です。展開は正規表現による一回の
//! 置換で行うので、置換後の値が再度走査されることはありません。

use crate::error::{FlowError, Result};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// 転送サービスが S3 を操作するためのポリシー
pub const TRANSFER_S3_POLICY: &str = "transfer_s3_policy";
/// ウェアハウスが S3 を読むためのポリシー
pub const WAREHOUSE_S3_POLICY: &str = "warehouse_s3_policy";
/// 転送ロールの信頼ポリシー
pub const TRANSFER_TRUST_POLICY: &str = "transfer_trust_policy";
/// ウェアハウスロールの信頼ポリシー
pub const WAREHOUSE_TRUST_POLICY: &str = "warehouse_trust_policy";

const BUILTIN: [(&str, &str); 4] = [
    (
        TRANSFER_S3_POLICY,
        include_str!("../policy/transfer_s3_policy.json"),
    ),
    (
        WAREHOUSE_S3_POLICY,
        include_str!("../policy/warehouse_s3_policy.json"),
    ),
    (
        TRANSFER_TRUST_POLICY,
        include_str!("../policy/transfer_trust_policy.json"),
    ),
    (
        WAREHOUSE_TRUST_POLICY,
        include_str!("../policy/warehouse_trust_policy.json"),
    ),
];

/// プレースホルダー名と値
pub type Bindings = BTreeMap<String, String>;

/// 名前付きテンプレート
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTemplate {
    name: String,
    text: String,
}

/// 展開済みドキュメント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub name: String,
    pub text: String,
}

impl DocumentTemplate {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// テンプレート中のプレースホルダー (出現順、重複なし)
    pub fn placeholders(&self) -> Vec<String> {
        let mut tokens: Vec<String> = Vec::new();
        for caps in PLACEHOLDER.captures_iter(&self.text) {
            let token = &caps[1];
            if !tokens.iter().any(|t| t == token) {
                tokens.push(token.to_string());
            }
        }
        tokens
    }

    /// プレースホルダーを展開
    ///
    /// 値のないプレースホルダーがあれば全てを列挙して
    /// [`FlowError::MissingBinding`] を返します。
    #[tracing::instrument(skip(self, bindings), fields(document = %self.name))]
    pub fn resolve(&self, bindings: &Bindings) -> Result<Document> {
        let mut missing: Vec<String> = Vec::new();
        let text = PLACEHOLDER.replace_all(&self.text, |caps: &Captures| {
            let token = &caps[1];
            match bindings.get(token) {
                Some(value) => value.clone(),
                None => {
                    if !missing.iter().any(|t| t == token) {
                        missing.push(token.to_string());
                    }
                    caps[0].to_string()
                }
            }
        });

        if !missing.is_empty() {
            return Err(FlowError::MissingBinding {
                document: self.name.clone(),
                tokens: missing,
            });
        }

        debug!("Resolved document");
        Ok(Document {
            name: self.name.clone(),
            text: text.into_owned(),
        })
    }
}

impl Document {
    /// JSON として正しいか確認
    pub fn validate_json(&self) -> Result<serde_json::Value> {
        serde_json::from_str(&self.text).map_err(|e| FlowError::InvalidDocument {
            document: self.name.clone(),
            message: e.to_string(),
        })
    }
}

/// ポリシーテンプレート集
#[derive(Debug, Clone)]
pub struct DocumentLibrary {
    templates: BTreeMap<String, DocumentTemplate>,
}

impl DocumentLibrary {
    /// 組み込みテンプレートのみ
    pub fn builtin() -> Self {
        let templates = BUILTIN
            .iter()
            .map(|(name, text)| (name.to_string(), DocumentTemplate::new(*name, *text)))
            .collect();
        Self { templates }
    }

    /// 組み込みテンプレートを `dir` 内の同名ファイル (`<name>.json`) で上書き
    ///
    /// ファイルはパスを明示して読み込み、作業ディレクトリは変更しません。
    #[tracing::instrument(skip(dir), fields(dir = %dir.display()))]
    pub fn with_overrides(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(FlowError::IoError {
                path: dir.to_path_buf(),
                message: "ポリシーディレクトリではありません".to_string(),
            });
        }

        let mut library = Self::builtin();
        for name in BUILTIN.map(|(name, _)| name) {
            let path = dir.join(format!("{}.json", name));
            if !path.exists() {
                continue;
            }
            let text = std::fs::read_to_string(&path).map_err(|e| FlowError::IoError {
                path: path.clone(),
                message: e.to_string(),
            })?;
            info!(document = name, path = %path.display(), "Using policy override");
            library.insert(DocumentTemplate::new(name, text));
        }
        Ok(library)
    }

    pub fn insert(&mut self, template: DocumentTemplate) {
        self.templates.insert(template.name.clone(), template);
    }

    pub fn get(&self, name: &str) -> Result<&DocumentTemplate> {
        self.templates
            .get(name)
            .ok_or_else(|| FlowError::UnknownDocument(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// 展開して JSON として検証
    pub fn resolve_policy(&self, name: &str, bindings: &Bindings) -> Result<Document> {
        let document = self.get(name)?.resolve(bindings)?;
        document.validate_json()?;
        Ok(document)
    }
}

impl Default for DocumentLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

/// `(key, value)` の組からバインディングを作る
pub fn bindings<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Bindings
where
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_replaces_every_occurrence() {
        let template = DocumentTemplate::new(
            "s3",
            r#"{"Resource": ["arn:aws:s3:::{bucket_name}", "arn:aws:s3:::{bucket_name}/*"]}"#,
        );
        let document = template
            .resolve(&bindings([("bucket_name", "landing")]))
            .unwrap();
        assert_eq!(
            document.text,
            r#"{"Resource": ["arn:aws:s3:::landing", "arn:aws:s3:::landing/*"]}"#
        );
    }

    #[test]
    fn test_missing_binding_lists_all_tokens() {
        let template = DocumentTemplate::new("trust", "{account_id}:{region}:{account_id}:{bucket}");
        let err = template
            .resolve(&bindings([("bucket", "landing")]))
            .unwrap_err();
        match err {
            FlowError::MissingBinding { document, tokens } => {
                assert_eq!(document, "trust");
                assert_eq!(tokens, vec!["account_id", "region"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_values_are_not_rescanned() {
        // 値に含まれるプレースホルダー風の文字列はそのまま残る
        let template = DocumentTemplate::new("doc", "{a}-{b}");
        let document = template
            .resolve(&bindings([("a", "{b}"), ("b", "x")]))
            .unwrap();
        assert_eq!(document.text, "{b}-x");
    }

    #[test]
    fn test_non_placeholder_text_is_untouched() {
        let text = "{ \"k\": {} , {1abc} {not-an-id} {} region }";
        let template = DocumentTemplate::new("doc", text);
        let document = template.resolve(&Bindings::new()).unwrap();
        assert_eq!(document.text, text);
    }

    #[test]
    fn test_placeholders() {
        let template = DocumentTemplate::new("doc", "{region} {account_id} {region}");
        assert_eq!(template.placeholders(), vec!["region", "account_id"]);
    }

    #[test]
    fn test_builtin_policies_resolve_to_json() {
        let library = DocumentLibrary::builtin();
        let bindings = bindings([
            ("bucket_name", "sf-transactions-12345"),
            ("account_id", "123456789012"),
            ("region", "ca-central-1"),
        ]);

        for name in [
            TRANSFER_S3_POLICY,
            WAREHOUSE_S3_POLICY,
            TRANSFER_TRUST_POLICY,
            WAREHOUSE_TRUST_POLICY,
        ] {
            library.resolve_policy(name, &bindings).unwrap();
        }

        let s3 = library.resolve_policy(TRANSFER_S3_POLICY, &bindings).unwrap();
        assert!(s3.text.contains("arn:aws:s3:::sf-transactions-12345"));
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let mut library = DocumentLibrary::builtin();
        library.insert(DocumentTemplate::new(TRANSFER_S3_POLICY, "{\"Version\": {bucket_name}"));
        let err = library
            .resolve_policy(TRANSFER_S3_POLICY, &bindings([("bucket_name", "b")]))
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidDocument { .. }));
    }

    #[test]
    fn test_overrides_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("warehouse_trust_policy.json"),
            r#"{"Version": "2012-10-17", "Statement": [], "Id": "{account_id}"}"#,
        )
        .unwrap();

        let library = DocumentLibrary::with_overrides(dir.path()).unwrap();
        let document = library
            .resolve_policy(
                WAREHOUSE_TRUST_POLICY,
                &bindings([("account_id", "123456789012")]),
            )
            .unwrap();
        assert!(document.text.contains("\"Id\": \"123456789012\""));
        // 上書きしていないものは組み込みのまま
        assert_eq!(
            library.get(TRANSFER_S3_POLICY).unwrap(),
            DocumentLibrary::builtin().get(TRANSFER_S3_POLICY).unwrap()
        );
    }

    #[test]
    fn test_unknown_document() {
        assert!(matches!(
            DocumentLibrary::builtin().get("nope"),
            Err(FlowError::UnknownDocument(_))
        ));
    }
}
