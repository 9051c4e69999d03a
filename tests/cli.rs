//! End-to-end tests for the `stencil` binary.

#![allow(deprecated)] // cargo_bin

use assert_cmd::assert::OutputAssertExt;
use assert_cmd::cargo::CommandCargoExt;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const YAML_TEMPLATE: &str = "name: {{ $name }}
favorite_food: {{ $favoriteFood }}
pets:
    @foreach($dogs as $dog)
    - {{ $dog }}
    @endforeach
contact_info:
    phone: 1234567890
    @if($includeAddress)
    street_info: 123 Lane.
    @endif
";

const YAML_EXPECTED: &str = "name: Bob
favorite_food: Pizza
pets:
    - Rex
    - Charlie
contact_info:
    phone: 1234567890
    street_info: 123 Lane.
";

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn put(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    fn read(&self, name: &str) -> String {
        fs::read_to_string(self.path(name)).unwrap()
    }

    fn cache(&self) -> PathBuf {
        self.path(".cache")
    }

    fn stencil(&self) -> Command {
        let mut cmd = Command::cargo_bin("stencil").unwrap();
        cmd.current_dir(self.dir.path())
            .env("STENCIL_CACHE_PATH", self.cache())
            .env_remove("STENCIL_COMPILED_PATH")
            .env_remove("STENCIL_KEEP_CACHE")
            .arg("--no-ansi");
        cmd
    }
}

fn cache_is_empty(dir: &Path) -> bool {
    fs::read_dir(dir).map(|d| d.count() == 0).unwrap_or(true)
}

#[test]
fn renders_yaml_with_cli_variables() {
    let ws = Workspace::new();
    ws.put("example.yaml", YAML_TEMPLATE);

    ws.stencil()
        .args([
            "render",
            "example.yaml",
            "--name=Bob",
            "--favorite-food=Pizza",
            "--include-address",
            "--dogs=Rex",
            "--dogs=Charlie",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("example.rendered.yaml"));

    assert_eq!(ws.read("example.rendered.yaml"), YAML_EXPECTED);
    assert!(cache_is_empty(&ws.cache()));
}

#[test]
fn undefined_variable_points_at_the_flag() {
    let ws = Workspace::new();
    ws.put("example.yaml", YAML_TEMPLATE);

    ws.stencil()
        .args(["render", "example.yaml", "--name=Bob"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Undefined variable $favoriteFood"))
        .stderr(predicate::str::contains("--favorite-food"));

    assert!(!ws.path("example.rendered.yaml").exists());
}

#[test]
fn missing_input_fails() {
    let ws = Workspace::new();

    ws.stencil()
        .args(["render", "nope.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn variables_from_files_are_overridden_by_cli() {
    let ws = Workspace::new();
    ws.put(
        "greeting.txt",
        "{{ $name }} is {{ $age }} and runs {{ $appEnv }}\n",
    );
    ws.put("vars.json", r#"{"name": "Jason", "age": 30}"#);
    ws.put("vars.yaml", "name: Yaml\nage: 1\n");
    ws.put("app.env", "# settings\nAPP_ENV=production\n");

    ws.stencil()
        .args([
            "render",
            "greeting.txt",
            "--from-yaml=vars.yaml",
            "--from-json=vars.json",
            "--from-env=app.env",
            "--save-to=out/",
        ])
        .assert()
        .success();
    assert_eq!(
        ws.read("out/greeting.rendered.txt"),
        "Jason is 30 and runs production\n"
    );

    ws.stencil()
        .args([
            "render",
            "greeting.txt",
            "--from-json=vars.json",
            "--from-env=app.env",
            "--name=Cli",
            "--save-as=custom.txt",
        ])
        .assert()
        .success();
    assert_eq!(ws.read("custom.txt"), "Cli is 30 and runs production\n");
}

#[test]
fn malformed_json_reports_reason() {
    let ws = Workspace::new();
    ws.put("t.txt", "{{ $name }}");
    ws.put("bad.json", "{\"name\": ");

    ws.stencil()
        .args(["render", "t.txt", "--from-json=bad.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Syntax error, malformed JSON"));
}

#[test]
fn existing_output_requires_force() {
    let ws = Workspace::new();
    ws.put("t.txt", "{{ $name }}\n");
    ws.put("t.rendered.txt", "old\n");

    ws.stencil()
        .args(["render", "t.txt", "--name=New"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    assert_eq!(ws.read("t.rendered.txt"), "old\n");

    ws.stencil()
        .args(["render", "t.txt", "--name=New", "--force"])
        .assert()
        .success();
    assert_eq!(ws.read("t.rendered.txt"), "New\n");
}

#[test]
fn directory_render_mirrors_tree() {
    let ws = Workspace::new();
    ws.put("directory/a.yaml", "a: {{ $name }}\n");
    ws.put("directory/nested/b.yaml", "b: {{ $name }}\n");

    ws.stencil()
        .args([
            "render",
            "directory",
            "--save-to=out/",
            "--force",
            "--name=Bob",
        ])
        .assert()
        .success();

    assert_eq!(ws.read("out/a.yaml"), "a: Bob\n");
    assert_eq!(ws.read("out/nested/b.yaml"), "b: Bob\n");
}

#[test]
fn directory_render_requires_save_dir() {
    let ws = Workspace::new();
    ws.put("directory/a.yaml", "a\n");

    ws.stencil()
        .args(["render", "directory", "--force"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--save-to directory option is required"));
}

#[test]
fn directory_render_into_itself_is_refused() {
    let ws = Workspace::new();
    ws.put("directory/a.yaml", "a\n");

    ws.stencil()
        .args(["render", "directory", "--save-to=directory/", "--force"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("also the --save-to directory"));

    assert!(!ws.path("directory/a.rendered.yaml").exists());
}

#[test]
fn directory_render_without_force_needs_interaction() {
    let ws = Workspace::new();
    ws.put("directory/a.yaml", "a\n");

    ws.stencil()
        .args(["-n", "render", "directory", "--save-to=out/"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    assert!(!ws.path("out").exists());
}

#[test]
fn dry_run_prints_instead_of_writing() {
    let ws = Workspace::new();
    ws.put("t.txt", "hello {{ $name }}\n");

    ws.stencil()
        .args(["render", "t.txt", "--name=World", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("DRY RUN"))
        .stdout(predicate::str::contains("hello World"));

    assert!(!ws.path("t.rendered.txt").exists());
}

#[test]
fn trim_strips_trailing_whitespace() {
    let ws = Workspace::new();
    ws.put("t.txt", "hello {{ $name }}\n\n\n");

    ws.stencil()
        .args(["render", "t.txt", "--name=World", "--trim"])
        .assert()
        .success();

    assert_eq!(ws.read("t.rendered.txt"), "hello World");
}

#[test]
fn malformed_variable_token_is_rejected() {
    let ws = Workspace::new();
    ws.put("t.txt", "x");

    ws.stencil()
        .args(["render", "t.txt", "--=oops"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--=oops"));
}

#[test]
fn keep_cache_leaves_compiled_files_and_clear_removes_them() {
    let ws = Workspace::new();
    ws.put("t.txt", "hello {{ $name }}\n");

    ws.stencil()
        .args(["render", "t.txt", "--name=World", "--keep-cache"])
        .assert()
        .success();
    assert!(!cache_is_empty(&ws.cache()));

    ws.stencil()
        .arg("clear")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared compiled files directory"));
    assert!(cache_is_empty(&ws.cache()));
}

#[test]
fn clear_rejects_template_options() {
    let ws = Workspace::new();

    ws.stencil()
        .args(["clear", "--name=Bob"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--name=Bob"));
}

#[test]
fn cache_path_pointing_at_user_files_only_loses_compiled_templates() {
    let ws = Workspace::new();
    ws.put("t.txt", "hello {{ $name }}\n");
    ws.put("notes.md", "keep\n");

    ws.stencil()
        .args(["render", "t.txt", "--name=World", "--cache-path=."])
        .assert()
        .success();
    assert_eq!(ws.read("t.rendered.txt"), "hello World\n");

    ws.stencil()
        .args([
            "render",
            "t.txt",
            "--name=Again",
            "--cache-path=.",
            "--keep-cache",
            "--save-to=again.txt",
        ])
        .assert()
        .success();
    ws.stencil()
        .args(["clear", "--cache-path=."])
        .assert()
        .success();

    assert_eq!(ws.read("t.txt"), "hello {{ $name }}\n");
    assert_eq!(ws.read("notes.md"), "keep\n");
    assert_eq!(ws.read("t.rendered.txt"), "hello World\n");
    assert_eq!(ws.read("again.txt"), "hello Again\n");
    let leftovers = fs::read_dir(ws.dir.path())
        .unwrap()
        .filter(|e| {
            let name = e.as_ref().unwrap().file_name();
            name.to_string_lossy().ends_with(".tera")
        })
        .count();
    assert_eq!(leftovers, 0);
}
