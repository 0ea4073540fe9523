//! Template engine based on MiniJinja

use chrono::{DateTime, Utc};
use minijinja::syntax::SyntaxConfig;
use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use zen_core::{
    AssetRecord, Clock, SharedClock, SystemClock, VariableSpec, VariableValidator, Vars, compute_checksum,
    write_atomic,
};

use crate::cache::{CacheStats, CompiledCache};
use crate::config::TemplateConfig;
use crate::error::{EngineError, Result, TemplateError};
use crate::format::FormatRegistry;
use crate::functions::FunctionRegistry;
use crate::metadata::{TemplateMetadata, extract_metadata};
use crate::source::TemplateSource;

/// Output format used when no catalog record names one
pub const DEFAULT_FORMAT: &str = "text";

/// A compiled template, ready to render
#[derive(Debug)]
pub struct Template {
    pub name: String,
    /// Renderable body, frontmatter removed
    pub content: String,
    pub metadata: TemplateMetadata,
    /// Declared variables: template directives first, then catalog-only ones
    pub variables: Vec<VariableSpec>,
    /// `sha256:<hex>` of the source as fetched
    pub checksum: String,
    pub compiled_at: DateTime<Utc>,
    /// Output format tag for post-processing
    pub format: String,
    /// Files the catalog expects the output in
    pub output_paths: Vec<String>,
    /// Compiled through the source, with its catalog record applied
    loaded: bool,
    env: Environment<'static>,
}

/// Rendered, post-processed output of a catalog template
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderOutput {
    pub name: String,
    pub format: String,
    pub content: String,
    /// `sha256:<hex>` of the rendered content
    pub checksum: String,
    pub template_checksum: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub output_paths: Vec<String>,
}

impl RenderOutput {
    /// Write the output atomically, creating parent directories
    pub fn write_to(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.content.as_bytes())?;
        tracing::debug!(template = %self.name, path = %path.display(), "wrote rendered output");
        Ok(())
    }
}

/// Template engine builder
pub struct EngineBuilder {
    config: TemplateConfig,
    source: Arc<dyn TemplateSource>,
    clock: Option<SharedClock>,
    formats: Option<FormatRegistry>,
}

impl EngineBuilder {
    /// Clock for cache TTLs and the time functions
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the built-in output processors
    pub fn formats(mut self, formats: FormatRegistry) -> Self {
        self.formats = Some(formats);
        self
    }

    pub fn build(self) -> Result<TemplateEngine> {
        self.config.validate()?;
        let clock = self.clock.unwrap_or_else(SystemClock::shared);
        let base = base_environment(&self.config, clock.clone())?;
        let cache = CompiledCache::new(self.config.cache_size, self.config.cache_ttl, clock.clone());

        Ok(TemplateEngine {
            config: self.config,
            source: self.source,
            clock,
            base,
            cache: Mutex::new(cache),
            formats: self.formats.unwrap_or_default(),
        })
    }
}

/// Environment shared by every compiled template
fn base_environment(config: &TemplateConfig, clock: SharedClock) -> Result<Environment<'static>> {
    let mut env = Environment::new();

    let syntax = SyntaxConfig::builder()
        .variable_delimiters(
            config.default_delims.left.clone(),
            config.default_delims.right.clone(),
        )
        .build()
        .map_err(|e| EngineError::InvalidConfig {
            message: format!("default_delims: {}", e),
        })?;
    env.set_syntax(syntax);

    env.set_undefined_behavior(if config.strict_mode {
        UndefinedBehavior::Strict
    } else {
        UndefinedBehavior::Chainable
    });
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.set_keep_trailing_newline(true);

    FunctionRegistry::new(config.workspace_root.clone(), clock)
        .with_settings(config.settings())
        .register(&mut env);

    Ok(env)
}

/// Loads, compiles, caches and renders templates
pub struct TemplateEngine {
    config: TemplateConfig,
    source: Arc<dyn TemplateSource>,
    clock: SharedClock,
    base: Environment<'static>,
    cache: Mutex<CompiledCache<Template>>,
    formats: FormatRegistry,
}

impl TemplateEngine {
    pub fn builder(config: TemplateConfig, source: Arc<dyn TemplateSource>) -> EngineBuilder {
        EngineBuilder {
            config,
            source,
            clock: None,
            formats: None,
        }
    }

    pub fn config(&self) -> &TemplateConfig {
        &self.config
    }

    pub fn formats(&self) -> &FormatRegistry {
        &self.formats
    }

    fn cache(&self) -> MutexGuard<'_, CompiledCache<Template>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load a template by name through the source, compiling it on a cache miss
    pub async fn load_template(&self, name: &str, token: &CancellationToken) -> Result<Arc<Template>> {
        if self.config.cache_enabled
            && let Some(template) = self.cache().lookup(name, None, |t| t.loaded)
        {
            return Ok(template);
        }

        let fetched = self.source.fetch(name, token).await?;
        self.compile(name, &fetched.content, None, Some(fetched.record.as_ref()))
    }

    /// Compile `content` under `name`
    ///
    /// Without `metadata`, it is extracted from the content (frontmatter or
    /// `@key:` directives). A cached compilation of identical content is reused.
    pub fn compile_template(
        &self,
        name: &str,
        content: &str,
        metadata: Option<TemplateMetadata>,
    ) -> Result<Arc<Template>> {
        self.compile(name, content, metadata, None)
    }

    /// `loaded` is `Some` when `content` came from the source, carrying its
    /// catalog record if it has one
    fn compile(
        &self,
        name: &str,
        content: &str,
        metadata: Option<TemplateMetadata>,
        loaded: Option<Option<&AssetRecord>>,
    ) -> Result<Arc<Template>> {
        let checksum = compute_checksum(content.as_bytes());
        let from_source = loaded.is_some();
        let record = loaded.flatten();
        if self.config.cache_enabled
            && let Some(template) = self
                .cache()
                .lookup(name, Some(&checksum), |t| t.loaded == from_source)
        {
            return Ok(template);
        }

        let (metadata, body) = match metadata {
            Some(metadata) => (metadata, content.to_string()),
            None => {
                let extracted = extract_metadata(name, content)?;
                (extracted.metadata, extracted.body)
            }
        };

        let mut env = self.base.clone();
        env.add_template_owned(name.to_string(), body.clone())
            .map_err(|e| EngineError::Compilation(TemplateError::from_minijinja(&e, name, &body, None)))?;

        let mut variables = metadata.variables.clone();
        if let Some(record) = record {
            for spec in &record.variables {
                if !variables.iter().any(|v| v.name == spec.name) {
                    variables.push(spec.clone());
                }
            }
        }

        let template = Arc::new(Template {
            name: name.to_string(),
            content: body,
            metadata,
            variables,
            checksum: checksum.clone(),
            compiled_at: self.clock.now(),
            format: record
                .map(|r| r.format.clone())
                .unwrap_or_else(|| DEFAULT_FORMAT.to_string()),
            output_paths: record.map(|r| r.output_paths.clone()).unwrap_or_default(),
            loaded: from_source,
            env,
        });
        tracing::debug!(template = name, %checksum, "compiled template");

        if self.config.cache_enabled {
            self.cache().insert(name, &checksum, Arc::clone(&template));
        }
        Ok(template)
    }

    /// Validate `vars`, fill defaults and render
    pub fn render_template(&self, template: &Template, vars: &Vars) -> Result<String> {
        let vars = if template.variables.is_empty() {
            vars.clone()
        } else {
            let validator = VariableValidator::new();
            let issues = validator.validate(vars, &template.variables);
            if !issues.is_empty() {
                return Err(EngineError::ValidationFailed {
                    template: template.name.clone(),
                    issues,
                });
            }
            validator.apply_defaults(vars, &template.variables)
        };

        let render_error = |e: minijinja::Error| {
            EngineError::Rendering(TemplateError::from_minijinja(
                &e,
                &template.name,
                &template.content,
                Some(&vars),
            ))
        };

        template
            .env
            .get_template(&template.name)
            .map_err(render_error)?
            .render(&vars)
            .map_err(render_error)
    }

    /// Load, render and post-process a catalog template
    ///
    /// The record's `format` picks the output processor; strict mode also
    /// enforces the processor's validation.
    pub async fn render_asset(
        &self,
        name: &str,
        vars: &Vars,
        token: &CancellationToken,
    ) -> Result<RenderOutput> {
        let template = self.load_template(name, token).await?;
        let rendered = self.render_template(&template, vars)?;
        let content = self
            .formats
            .process(&template.format, &rendered, self.config.strict_mode)?;

        tracing::info!(template = name, format = %template.format, bytes = content.len(), "rendered template");
        Ok(RenderOutput {
            name: template.name.clone(),
            format: template.format.clone(),
            checksum: compute_checksum(content.as_bytes()),
            template_checksum: template.checksum.clone(),
            output_paths: template.output_paths.clone(),
            content,
        })
    }

    /// Drop every compiled template
    pub fn clear_cache(&self) {
        self.cache().clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticSource;
    use chrono::TimeZone;
    use serde_json::json;
    use std::time::Duration;
    use zen_core::{Clock, ManualClock, VariableType};

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap(),
        ))
    }

    fn engine_with(config: TemplateConfig, source: StaticSource) -> (Arc<ManualClock>, TemplateEngine) {
        let clock = clock();
        let engine = TemplateEngine::builder(config, Arc::new(source))
            .clock(clock.clone())
            .build()
            .unwrap();
        (clock, engine)
    }

    fn engine() -> TemplateEngine {
        engine_with(TemplateConfig::default(), StaticSource::new()).1
    }

    fn vars(value: serde_json::Value) -> Vars {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("vars must be an object"),
        }
    }

    #[test]
    fn test_render_simple() {
        let engine = engine();
        let template = engine
            .compile_template("hello", "Hello, {{ name | upper }}!\n", None)
            .unwrap();
        let out = engine.render_template(&template, &vars(json!({ "name": "ada" }))).unwrap();
        assert_eq!(out, "Hello, ADA!\n");
        assert_eq!(template.checksum, compute_checksum(b"Hello, {{ name | upper }}!\n"));
        assert_eq!(template.format, DEFAULT_FORMAT);
    }

    #[test]
    fn test_missing_variable_renders_empty_when_lenient() {
        let engine = engine();
        let template = engine
            .compile_template("t", "[{{ missing }}][{{ missing.deep.key }}]", None)
            .unwrap();
        assert_eq!(engine.render_template(&template, &Vars::new()).unwrap(), "[][]");
    }

    #[test]
    fn test_missing_variable_fails_when_strict() {
        let config = TemplateConfig {
            strict_mode: true,
            ..Default::default()
        };
        let (_, engine) = engine_with(config, StaticSource::new());
        let template = engine.compile_template("t", "Hi {{ nme }}", None).unwrap();

        let err = engine
            .render_template(&template, &vars(json!({ "name": "x" })))
            .unwrap_err();
        assert_eq!(err.code(), "rendering_failed");
        match err {
            EngineError::Rendering(e) => {
                assert_eq!(e.kind(), crate::error::TemplateErrorKind::UndefinedVariable);
                assert_eq!(e.suggestion.as_deref(), Some("Did you mean `name`?"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_compilation_failure() {
        let err = engine()
            .compile_template("broken", "{% if x %}never closed", None)
            .unwrap_err();
        assert_eq!(err.code(), "compilation_failed");
    }

    #[test]
    fn test_custom_delimiters() {
        let mut config = TemplateConfig::default();
        config.default_delims.left = "[[".to_string();
        config.default_delims.right = "]]".to_string();
        let (_, engine) = engine_with(config, StaticSource::new());

        let template = engine
            .compile_template("t", "[[ name ]] keeps {{ braces }}", None)
            .unwrap();
        let out = engine.render_template(&template, &vars(json!({ "name": "zen" }))).unwrap();
        assert_eq!(out, "zen keeps {{ braces }}");
    }

    #[test]
    fn test_validation_and_defaults() {
        let engine = engine();
        let source = "---\nname: doc\nvariables:\n  - name: title\n    type: string\n    required: true\n    validation: \"length:3-10\"\n  - name: owner\n    type: string\n    default: team\n---\n{{ title }} by {{ owner }}";
        let template = engine.compile_template("doc", source, None).unwrap();
        assert_eq!(template.metadata.name, "doc");
        assert_eq!(template.content, "{{ title }} by {{ owner }}");

        let out = engine
            .render_template(&template, &vars(json!({ "title": "Roadmap" })))
            .unwrap();
        assert_eq!(out, "Roadmap by team");

        let err = engine
            .render_template(&template, &vars(json!({ "title": "ab" })))
            .unwrap_err();
        assert_eq!(err.code(), "validation_failed");
        match err {
            EngineError::ValidationFailed { template, issues } => {
                assert_eq!(template, "doc");
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].code(), "variable_invalid");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = engine.render_template(&template, &Vars::new()).unwrap_err();
        match err {
            EngineError::ValidationFailed { issues, .. } => {
                assert_eq!(issues[0].code(), "variable_required");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_explicit_metadata_skips_extraction() {
        let engine = engine();
        let metadata = TemplateMetadata {
            name: "given".to_string(),
            variables: vec![VariableSpec::new("n", VariableType::Int).with_default(2)],
            ..Default::default()
        };
        let template = engine
            .compile_template("m", "{# @name: ignored #}{{ n * 2 }}", Some(metadata))
            .unwrap();
        assert_eq!(template.metadata.name, "given");
        assert_eq!(engine.render_template(&template, &Vars::new()).unwrap(), "4");
    }

    #[test]
    fn test_compile_cache_reuse_and_invalidation() {
        let engine = engine();
        let first = engine.compile_template("t", "one", None).unwrap();
        let again = engine.compile_template("t", "one", None).unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        let changed = engine.compile_template("t", "two", None).unwrap();
        assert!(!Arc::ptr_eq(&first, &changed));
        assert_eq!(engine.render_template(&changed, &Vars::new()).unwrap(), "two");

        let stats = engine.cache_stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);

        engine.clear_cache();
        assert_eq!(engine.cache_stats().entries, 0);
    }

    #[test]
    fn test_cache_disabled() {
        let config = TemplateConfig {
            cache_enabled: false,
            ..Default::default()
        };
        let (_, engine) = engine_with(config, StaticSource::new());
        let first = engine.compile_template("t", "one", None).unwrap();
        let again = engine.compile_template("t", "one", None).unwrap();
        assert!(!Arc::ptr_eq(&first, &again));
        assert_eq!(engine.cache_stats().entries, 0);
    }

    #[tokio::test]
    async fn test_load_template_uses_cache_until_ttl() {
        let source = StaticSource::new().with_template("standup", "markdown", "# {{ team }}");
        let config = TemplateConfig {
            cache_ttl: Duration::from_secs(60),
            ..Default::default()
        };
        let (clock, engine) = engine_with(config, source);
        let token = CancellationToken::new();

        let first = engine.load_template("standup", &token).await.unwrap();
        assert_eq!(first.format, "markdown");
        let second = engine.load_template("standup", &token).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        clock.advance(Duration::from_secs(61));
        let third = engine.load_template("standup", &token).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.compiled_at, clock.now());
    }

    #[tokio::test]
    async fn test_render_asset_formats_output() {
        let source = StaticSource::new().with_template(
            "plan",
            "markdown",
            "# Plan for {{ team }}\nSteps:\n- {{ taskID('PLAN') }}\n\n\n\nDone\n",
        );
        let (_, engine) = engine_with(TemplateConfig::default(), source);
        let token = CancellationToken::new();

        let out = engine
            .render_asset("plan", &vars(json!({ "team": "core" })), &token)
            .await
            .unwrap();
        assert_eq!(out.format, "markdown");
        assert!(out.content.starts_with("# Plan for core\n\nSteps:\n\n- PLAN-240315-"));
        assert!(out.content.ends_with("\n\nDone\n"));
        assert_eq!(out.checksum, compute_checksum(out.content.as_bytes()));
    }

    #[tokio::test]
    async fn test_render_asset_strict_validates_output() {
        let source = StaticSource::new().with_template("cfg", "json", "{\"name\": {{ name }}}");
        let config = TemplateConfig {
            strict_mode: true,
            ..Default::default()
        };
        let (_, engine) = engine_with(config, source);
        let token = CancellationToken::new();

        let ok = engine
            .render_asset("cfg", &vars(json!({ "name": "\"zen\"" })), &token)
            .await
            .unwrap();
        assert_eq!(ok.content, "{\n  \"name\": \"zen\"\n}\n");

        let err = engine
            .render_asset("cfg", &vars(json!({ "name": "zen" })), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::OutputInvalid { .. }));
    }

    #[tokio::test]
    async fn test_render_asset_ignores_adhoc_compile_of_same_name() {
        let source = StaticSource::new().with_template("cfg", "json", "{\"a\":1}");
        let (_, engine) = engine_with(TemplateConfig::default(), source);
        let token = CancellationToken::new();

        let adhoc = engine.compile_template("cfg", "{\"a\":1}", None).unwrap();
        assert_eq!(adhoc.format, DEFAULT_FORMAT);

        let out = engine.render_asset("cfg", &Vars::new(), &token).await.unwrap();
        assert_eq!(out.format, "json");
        assert_eq!(out.content, "{\n  \"a\": 1\n}\n");

        let again = engine.compile_template("cfg", "{\"a\":1}", None).unwrap();
        assert_eq!(again.format, DEFAULT_FORMAT);
        let out = engine.render_asset("cfg", &Vars::new(), &token).await.unwrap();
        assert_eq!(out.format, "json");
    }

    #[tokio::test]
    async fn test_render_asset_unknown_template() {
        let source = StaticSource::new().with_template("standup", "markdown", "x");
        let (_, engine) = engine_with(TemplateConfig::default(), source);
        let err = engine
            .render_asset("standp", &Vars::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "template_not_found");
    }

    #[test]
    fn test_write_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = RenderOutput {
            name: "t".to_string(),
            format: "text".to_string(),
            content: "done\n".to_string(),
            checksum: compute_checksum(b"done\n"),
            template_checksum: String::new(),
            output_paths: Vec::new(),
        };
        let path = dir.path().join("drafts/out.md");
        output.write_to(&path).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "done\n");
    }
}
