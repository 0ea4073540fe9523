//! Where template text comes from
//!
//! The engine only needs raw content plus the catalog record. [`AssetClient`]
//! is the production source; [`StaticSource`] serves fixed text in memory.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use zen_assets::{AssetClient, AssetError, GetOptions};
use zen_core::{AssetRecord, compute_checksum};

use crate::error::{EngineError, Result};
use crate::suggestions::find_closest_matches;

/// Raw template as delivered by a source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTemplate {
    pub content: String,
    /// `sha256:<hex>` of `content`
    pub checksum: String,
    pub record: Option<AssetRecord>,
}

#[async_trait]
pub trait TemplateSource: Send + Sync {
    /// Fetch template `name`; a missing name is [`EngineError::TemplateNotFound`]
    async fn fetch(&self, name: &str, token: &CancellationToken) -> Result<SourceTemplate>;

    /// Names the source can serve, for suggestions
    fn template_names(&self) -> Vec<String>;
}

/// `TemplateNotFound` with a close match from `names` as help
pub fn template_not_found(name: &str, names: &[String]) -> EngineError {
    let suggestion = find_closest_matches(name, names.iter().map(String::as_str), 1)
        .first()
        .map(|m| format!("Did you mean `{}`?", m));
    EngineError::TemplateNotFound {
        name: name.to_string(),
        suggestion,
    }
}

fn decode(name: &str, content: Vec<u8>) -> Result<String> {
    String::from_utf8(content).map_err(|_| EngineError::InvalidMetadata {
        name: name.to_string(),
        message: "template content is not valid UTF-8".to_string(),
    })
}

#[async_trait]
impl TemplateSource for AssetClient {
    async fn fetch(&self, name: &str, token: &CancellationToken) -> Result<SourceTemplate> {
        let asset = match self.get_asset(name, GetOptions::default(), token).await {
            Ok(asset) => asset,
            Err(AssetError::AssetNotFound { .. }) => {
                return Err(template_not_found(name, &self.template_names()));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(SourceTemplate {
            checksum: asset.checksum,
            record: asset.metadata,
            content: decode(name, asset.content)?,
        })
    }

    fn template_names(&self) -> Vec<String> {
        self.catalog().names()
    }
}

/// In-memory templates keyed by name
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    templates: BTreeMap<String, (String, AssetRecord)>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template whose output is post-processed as `format`
    pub fn with_template(
        mut self,
        name: impl Into<String>,
        format: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let mut record = AssetRecord::new(name.clone(), name.clone());
        record.format = format.into();
        self.templates.insert(name, (content.into(), record));
        self
    }

    /// Add a template with a full catalog record
    pub fn with_record(mut self, record: AssetRecord, content: impl Into<String>) -> Self {
        self.templates
            .insert(record.name.clone(), (content.into(), record));
        self
    }
}

#[async_trait]
impl TemplateSource for StaticSource {
    async fn fetch(&self, name: &str, token: &CancellationToken) -> Result<SourceTemplate> {
        if token.is_cancelled() {
            return Err(AssetError::Cancelled.into());
        }
        let (content, record) = self
            .templates
            .get(name)
            .ok_or_else(|| template_not_found(name, &self.template_names()))?;

        Ok(SourceTemplate {
            content: content.clone(),
            checksum: compute_checksum(content.as_bytes()),
            record: Some(record.clone()),
        })
    }

    fn template_names(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_source() {
        let source = StaticSource::new().with_template("standup", "markdown", "# {{ team }}");
        let token = CancellationToken::new();

        let fetched = source.fetch("standup", &token).await.unwrap();
        assert_eq!(fetched.content, "# {{ team }}");
        assert_eq!(fetched.checksum, compute_checksum(b"# {{ team }}"));
        assert_eq!(fetched.record.unwrap().format, "markdown");
    }

    #[tokio::test]
    async fn test_static_source_not_found() {
        let source = StaticSource::new().with_template("standup", "markdown", "");
        let token = CancellationToken::new();

        match source.fetch("stndup", &token).await.unwrap_err() {
            EngineError::TemplateNotFound { name, suggestion } => {
                assert_eq!(name, "stndup");
                assert_eq!(suggestion.as_deref(), Some("Did you mean `standup`?"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_static_source_cancelled() {
        let source = StaticSource::new().with_template("a", "text", "x");
        let token = CancellationToken::new();
        token.cancel();
        assert!(source.fetch("a", &token).await.unwrap_err().is_cancelled());
    }
}
