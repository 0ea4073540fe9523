//! Integration tests for the `zen` binary against a local working-tree repository

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const MANIFEST: &str = r#"
schema_version: "1.0"
generated: "2024-05-01T00:00:00Z"
version: "3"
activities:
  design:
    name: design
    command: zen design
    description: Design document
    format: markdown
    category: planning
    tags: [design, docs]
    assets:
      template: templates/design.md.tmpl
      output: docs/design.md
    variables:
      - name: title
        type: string
        required: true
        validation: "length:3-40"
  standup:
    name: standup
    command: zen standup
    description: Daily standup notes
    format: markdown
    category: rituals
    tags: [team]
    assets:
      template: templates/standup.md.tmpl
"#;

const DESIGN: &str = "{#\n  @variable: owner:string:false:platform:Owning team\n#}\n# {{ title }}\nOwner: {{ owner }}\n";

const STANDUP: &str = "# Standup {{ day }}\n";

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        std::fs::create_dir_all(repo.join("templates")).unwrap();
        std::fs::write(repo.join("manifest.yaml"), MANIFEST).unwrap();
        std::fs::write(repo.join("templates/design.md.tmpl"), DESIGN).unwrap();
        std::fs::write(repo.join("templates/standup.md.tmpl"), STANDUP).unwrap();

        let ws = dir.path().join("ws");
        std::fs::create_dir_all(ws.join(".zen")).unwrap();
        let config = format!(
            "assets:\n  repository_url: {}\n  auth_provider: none\n  cache_path: {}\n",
            repo.display(),
            dir.path().join("cache").display()
        );
        std::fs::write(ws.join(".zen/config.yaml"), config).unwrap();

        Self { dir }
    }

    fn ws(&self) -> PathBuf {
        self.dir.path().join("ws")
    }

    fn repo(&self) -> PathBuf {
        self.dir.path().join("repo")
    }

    fn zen(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_zen"))
            .arg("--workspace")
            .arg(self.ws())
            .args(args)
            .env_remove("ZEN_ASSETS_REPOSITORY_URL")
            .env_remove("ZEN_ASSETS_BRANCH")
            .env_remove("ZEN_ASSETS_CACHE_PATH")
            .env_remove("ZEN_ASSETS_AUTH_PROVIDER")
            .env("NO_COLOR", "1")
            .output()
            .expect("Failed to execute zen")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("Output should be valid JSON")
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

mod assets_command {
    use super::*;

    #[test]
    fn test_list_json() {
        let ws = Workspace::new();
        let output = ws.zen(&["assets", "list", "--output", "json"]);

        assert!(output.status.success(), "{:?}", output);
        let list = json(&output);
        assert_eq!(list["total"], 2);
        assert_eq!(list["assets"][0]["name"], "design");
        assert_eq!(list["has_more"], false);
    }

    #[test]
    fn test_list_filters() {
        let ws = Workspace::new();
        let output = ws.zen(&["assets", "list", "--tag", "TEAM", "--output", "json"]);
        let list = json(&output);
        assert_eq!(list["total"], 1);
        assert_eq!(list["assets"][0]["name"], "standup");

        let output = ws.zen(&["assets", "list", "--category", "planning"]);
        assert!(stdout(&output).contains("design"));
        assert!(!stdout(&output).contains("standup"));
    }

    #[test]
    fn test_list_persists_manifest() {
        let ws = Workspace::new();
        let output = ws.zen(&["assets", "list"]);
        assert!(output.status.success());
        assert!(ws.ws().join(".zen/assets/manifest.yaml").is_file());
    }

    #[test]
    fn test_invalid_type_is_usage_error() {
        let ws = Workspace::new();
        let output = ws.zen(&["assets", "list", "--type", "video"]);
        assert_eq!(output.status.code(), Some(64));
    }

    #[test]
    fn test_get_prints_content() {
        let ws = Workspace::new();
        let output = ws.zen(&["assets", "get", "standup"]);

        assert!(output.status.success(), "{:?}", output);
        assert_eq!(stdout(&output), STANDUP);
    }

    #[test]
    fn test_get_json_reports_cache() {
        let ws = Workspace::new();
        let first = json(&ws.zen(&["assets", "get", "standup", "--output", "json"]));
        assert_eq!(first["cached"], false);
        assert_eq!(first["metadata"]["category"], "rituals");

        let second = json(&ws.zen(&["assets", "get", "standup", "--output", "json"]));
        assert_eq!(second["cached"], true);
        assert_eq!(second["checksum"], first["checksum"]);

        let fresh = json(&ws.zen(&["assets", "get", "standup", "--no-cache", "--output", "json"]));
        assert_eq!(fresh["cached"], false);
    }

    #[test]
    fn test_get_unknown_asset() {
        let ws = Workspace::new();
        let output = ws.zen(&["assets", "get", "desing"]);

        assert_eq!(output.status.code(), Some(4));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("design"));
    }

    #[test]
    fn test_sync_counts_changes() {
        let ws = Workspace::new();
        let first = json(&ws.zen(&["assets", "sync", "--output", "json"]));
        assert_eq!(first["status"], "success");
        assert_eq!(first["total_assets"], 2);

        let trimmed = MANIFEST
            .split("  standup:")
            .next()
            .unwrap()
            .to_string();
        std::fs::write(ws.repo().join("manifest.yaml"), trimmed).unwrap();

        let second = json(&ws.zen(&["assets", "sync", "--output", "json"]));
        assert_eq!(second["removed"], 1);
        assert_eq!(second["total_assets"], 1);
    }

    #[test]
    fn test_cache_lifecycle() {
        let ws = Workspace::new();
        assert!(ws.zen(&["assets", "get", "standup"]).status.success());

        let info = json(&ws.zen(&["assets", "cache", "info", "--output", "json"]));
        assert_eq!(info["entry_count"], 1);

        let cleanup = json(&ws.zen(&["assets", "cache", "cleanup", "--output", "json"]));
        assert_eq!(cleanup["expired"], 0);

        let output = ws.zen(&["assets", "cache", "clear"]);
        assert!(stdout(&output).contains("Cleared 1 cache entry"));

        let info = json(&ws.zen(&["assets", "cache", "info", "--output", "json"]));
        assert_eq!(info["entry_count"], 0);
    }

    #[test]
    fn test_status_yaml() {
        let ws = Workspace::new();
        let output = ws.zen(&["assets", "status", "--output", "yaml"]);
        assert!(output.status.success());
        assert!(stdout(&output).contains("backend: working-tree"));
    }
}

mod template_command {
    use super::*;

    #[test]
    fn test_render_to_stdout() {
        let ws = Workspace::new();
        let output = ws.zen(&["template", "render", "design", "--var", "title=Q3 roadmap"]);

        assert!(output.status.success(), "{:?}", output);
        assert_eq!(stdout(&output), "# Q3 roadmap\n\nOwner: platform\n");
    }

    #[test]
    fn test_render_vars_file_then_overrides() {
        let ws = Workspace::new();
        let vars = ws.dir.path().join("vars.yaml");
        std::fs::write(&vars, "title: From file\nowner: infra\n").unwrap();

        let output = ws.zen(&[
            "template",
            "render",
            "design",
            "--vars-file",
            vars.to_str().unwrap(),
            "--var",
            "owner=data",
        ]);
        assert_eq!(stdout(&output), "# From file\n\nOwner: data\n");
    }

    #[test]
    fn test_render_write_declared_path() {
        let ws = Workspace::new();
        let output = ws.zen(&["template", "render", "design", "--var", "title=Plan", "--write"]);

        assert!(output.status.success(), "{:?}", output);
        assert_eq!(read(&ws.ws().join("docs/design.md")), "# Plan\n\nOwner: platform\n");
    }

    #[test]
    fn test_render_out_path() {
        let ws = Workspace::new();
        let target = ws.dir.path().join("out/standup.md");
        let output = ws.zen(&[
            "template",
            "render",
            "standup",
            "--var",
            "day=Monday",
            "--out",
            target.to_str().unwrap(),
        ]);

        assert!(output.status.success(), "{:?}", output);
        assert_eq!(read(&target), "# Standup Monday\n");
    }

    #[test]
    fn test_render_validation_failure() {
        let ws = Workspace::new();
        let output = ws.zen(&["template", "render", "design", "--var", "title=Q3"]);

        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("title"));
    }

    #[test]
    fn test_render_missing_required() {
        let ws = Workspace::new();
        let output = ws.zen(&["template", "render", "design"]);
        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_render_unknown_template() {
        let ws = Workspace::new();
        let output = ws.zen(&["template", "render", "standpu"]);

        assert_eq!(output.status.code(), Some(3));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("standup"));
    }

    #[test]
    fn test_strict_undefined_variable() {
        let ws = Workspace::new();
        let output = ws.zen(&["template", "render", "standup", "--strict"]);
        assert_eq!(output.status.code(), Some(3));
    }

    #[test]
    fn test_bad_var_syntax() {
        let ws = Workspace::new();
        let output = ws.zen(&["template", "render", "standup", "--var", "novalue"]);
        assert_eq!(output.status.code(), Some(64));
    }
}

#[test]
fn test_missing_config_file() {
    let ws = Workspace::new();
    let output = ws.zen(&["--config", "/nonexistent/zen.yaml", "assets", "list"]);
    assert_eq!(output.status.code(), Some(78));
}
