//! Zen template rendering
//!
//! Turns catalog templates into finished documents:
//!
//! - Metadata from YAML frontmatter or `@key:` comment directives
//! - MiniJinja compilation with the workflow function set
//!   (`taskID`, `nextStage`, `workspacePath`, ...)
//! - Variable validation and defaults before rendering
//! - Per-format post-processing (markdown, yaml, json, xml, prompt, ...)
//! - Error messages with source spans and "did you mean" help
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use zen_assets::{AssetClient, AssetConfig};
//! use zen_template::{TemplateConfig, TemplateEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = AssetClient::builder(AssetConfig::default()).workspace(".").build()?;
//! let engine = TemplateEngine::builder(TemplateConfig::default(), Arc::new(client)).build()?;
//!
//! let mut vars = serde_json::Map::new();
//! vars.insert("title".into(), "Q3 roadmap".into());
//! let output = engine
//!     .render_asset("design-doc", &vars, &CancellationToken::new())
//!     .await?;
//! output.write_to("docs/design.md".as_ref())?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod filters;
pub mod format;
pub mod functions;
pub mod metadata;
pub mod source;
pub mod suggestions;

pub use cache::{CacheStats, CompiledCache};
pub use config::{Delimiters, TemplateConfig};
pub use engine::{DEFAULT_FORMAT, EngineBuilder, RenderOutput, Template, TemplateEngine};
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
pub use format::{FormatProcessor, FormatRegistry, canonical_format};
pub use functions::{FUNCTION_NAMES, FunctionRegistry, STAGES};
pub use metadata::{TemplateMetadata, extract_metadata};
pub use source::{SourceTemplate, StaticSource, TemplateSource};
