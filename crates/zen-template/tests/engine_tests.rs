//! Rendering catalog templates fetched through the asset client

use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use zen_assets::{AssetClient, AssetConfig, CacheConfig, InjectedFailure, MemoryBackend, StaticAuth};
use zen_core::{ManualClock, Vars, compute_checksum};
use zen_template::{EngineError, TemplateConfig, TemplateEngine};

const MANIFEST: &str = r#"
schema_version: "1.0"
generated: "2024-05-01T00:00:00Z"
version: "7"
activities:
  design:
    name: design
    command: zen design
    description: Design document
    format: markdown
    category: planning
    tags: [design]
    assets:
      template: templates/design.md.tmpl
      output: docs/design.md
    variables:
      - name: N
        type: string
        required: true
        validation: "length:3-10"
  service:
    name: service
    command: zen service
    description: Service config
    format: yaml
    category: dev
    assets:
      template: templates/service.yaml.tmpl
  review:
    name: review
    command: zen review
    description: Review prompt
    format: prompt
    category: dev
    assets:
      prompt: prompts/review.md
"#;

const DESIGN: &str = "{#\n  @name: design\n  @variable: owner:string:false:platform:Owning team\n#}\n# {{ N }}\nOwner: {{ owner }}\nStage: {{ stageName(\"04-design\") }}, next {{ nextStage(\"04-design\") }}\n";

const SERVICE: &str = "name: {{ name | kebabCase }}\nreplicas: {{ replicas }}   \n";

const REVIEW: &str = "<role>{{ role }}</role>\n<objective>Review {{ target }}</objective>\n<policies>\n- Be specific\n</policies>\n";

struct Fixture {
    dir: TempDir,
    backend: MemoryBackend,
    engine: TemplateEngine,
}

fn fixture(template_config: TemplateConfig) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let backend = MemoryBackend::new();
    backend.insert("manifest.yaml", MANIFEST);
    backend.insert("templates/design.md.tmpl", DESIGN);
    backend.insert("templates/service.yaml.tmpl", SERVICE);
    backend.insert("prompts/review.md", REVIEW);

    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
    ));
    let client = AssetClient::builder(AssetConfig {
        auth_provider: "none".to_string(),
        ..Default::default()
    })
    .workspace(dir.path().join("ws"))
    .backend(Arc::new(backend.clone()))
    .auth(Arc::new(StaticAuth::anonymous()))
    .clock(clock.clone())
    .cache_config(CacheConfig::new(
        dir.path().join("cache"),
        1024 * 1024,
        Duration::from_secs(3600),
    ))
    .build()
    .unwrap();

    let engine = TemplateEngine::builder(
        TemplateConfig {
            workspace_root: dir.path().join("ws"),
            ..template_config
        },
        Arc::new(client),
    )
    .clock(clock)
    .build()
    .unwrap();

    Fixture {
        dir,
        backend,
        engine,
    }
}

fn vars(value: serde_json::Value) -> Vars {
    match value {
        serde_json::Value::Object(map) => map,
        _ => panic!("vars must be an object"),
    }
}

#[tokio::test]
async fn test_render_design_document() {
    let f = fixture(TemplateConfig::default());
    let token = CancellationToken::new();

    let out = f
        .engine
        .render_asset("design", &vars(json!({ "N": "Roadmap" })), &token)
        .await
        .unwrap();

    assert_eq!(out.format, "markdown");
    assert_eq!(out.output_paths, vec!["docs/design.md"]);
    assert_eq!(out.template_checksum, compute_checksum(DESIGN.as_bytes()));
    assert_eq!(
        out.content,
        "# Roadmap\n\nOwner: platform\nStage: Design, next 05-build\n"
    );
}

#[tokio::test]
async fn test_catalog_and_directive_variables_merge() {
    let f = fixture(TemplateConfig::default());
    let template = f
        .engine
        .load_template("design", &CancellationToken::new())
        .await
        .unwrap();

    let names: Vec<_> = template.variables.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["owner", "N"]);
    assert_eq!(template.metadata.name, "design");
}

#[tokio::test]
async fn test_variable_validation_failure() {
    let f = fixture(TemplateConfig::default());
    let err = f
        .engine
        .render_asset("design", &vars(json!({ "N": "hi" })), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "validation_failed");
    let EngineError::ValidationFailed { issues, .. } = &err else {
        panic!("unexpected error: {err:?}");
    };
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].code(), "variable_invalid");
    assert!(issues[0].message.contains("length 2 is outside range 3-10"));

    let details = err.details().unwrap();
    assert_eq!(details["issues"][0]["variable"], "N");
}

#[tokio::test]
async fn test_yaml_output_lenient_and_strict() {
    let lenient = fixture(TemplateConfig::default());
    let token = CancellationToken::new();
    let input = vars(json!({ "name": "Billing API", "replicas": 2 }));

    let out = lenient.engine.render_asset("service", &input, &token).await.unwrap();
    assert_eq!(out.content, "name: billing-api\nreplicas: 2   \n");

    let strict = fixture(TemplateConfig {
        strict_mode: true,
        ..Default::default()
    });
    let err = strict.engine.render_asset("service", &input, &token).await.unwrap_err();
    match err {
        EngineError::OutputInvalid { format, problems } => {
            assert_eq!(format, "yaml");
            assert_eq!(problems, vec!["line 2: trailing whitespace"]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_strict_prompt_output() {
    let f = fixture(TemplateConfig {
        strict_mode: true,
        ..Default::default()
    });
    let token = CancellationToken::new();

    let out = f
        .engine
        .render_asset(
            "review",
            &vars(json!({ "role": "Senior reviewer", "target": "the cache" })),
            &token,
        )
        .await
        .unwrap();
    assert!(out.content.starts_with("<role>Senior reviewer</role>"));

    let err = f
        .engine
        .render_asset("review", &vars(json!({ "role": " ", "target": "x" })), &token)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "validation_failed");
}

#[tokio::test]
async fn test_strict_undefined_variable() {
    let f = fixture(TemplateConfig {
        strict_mode: true,
        ..Default::default()
    });
    let err = f
        .engine
        .render_asset("review", &vars(json!({ "role": "r" })), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "rendering_failed");
}

#[tokio::test]
async fn test_unknown_template_suggests_catalog_name() {
    let f = fixture(TemplateConfig::default());
    let err = f
        .engine
        .render_asset("desing", &Vars::new(), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        EngineError::TemplateNotFound { name, suggestion } => {
            assert_eq!(name, "desing");
            assert_eq!(suggestion.as_deref(), Some("Did you mean `design`?"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_compiled_cache_avoids_refetch() {
    let f = fixture(TemplateConfig::default());
    let token = CancellationToken::new();
    let input = vars(json!({ "N": "Roadmap" }));

    f.engine.render_asset("design", &input, &token).await.unwrap();
    let requests = f.backend.requests();
    f.engine.render_asset("design", &input, &token).await.unwrap();
    assert_eq!(f.backend.requests(), requests);
    assert_eq!(f.engine.cache_stats().hits, 1);

    f.engine.clear_cache();
    f.engine.render_asset("design", &input, &token).await.unwrap();
    assert_eq!(f.engine.cache_stats().entries, 1);
}

#[tokio::test]
async fn test_asset_errors_pass_through() {
    let f = fixture(TemplateConfig::default());
    f.backend.fail("prompts/review.md", InjectedFailure::RateLimited(30));

    let err = f
        .engine
        .render_asset("review", &Vars::new(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "rate_limited");
    assert_eq!(err.retry_after_seconds(), Some(30));
}

#[tokio::test]
async fn test_cancelled_render() {
    let f = fixture(TemplateConfig::default());
    let token = CancellationToken::new();
    token.cancel();

    let err = f
        .engine
        .render_asset("design", &vars(json!({ "N": "Roadmap" })), &token)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.code(), "cancelled");
}

#[tokio::test]
async fn test_write_rendered_output() {
    let f = fixture(TemplateConfig::default());
    let out = f
        .engine
        .render_asset("design", &vars(json!({ "N": "Roadmap" })), &CancellationToken::new())
        .await
        .unwrap();

    let target = f.dir.path().join("ws").join(&out.output_paths[0]);
    out.write_to(&target).unwrap();
    assert_eq!(std::fs::read_to_string(target).unwrap(), out.content);
}
