// Shared test helpers for integration tests
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use recipe_runner::infra::command::{CommandOutcome, CommandRunner, CommandSpec};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tempfile::{tempdir, TempDir};

type Script = dyn Fn(&CommandSpec) -> Result<CommandOutcome> + Send + Sync;

/// A `CommandRunner` that answers from a closure and records every call.
pub struct ScriptedRunner {
    calls: Mutex<Vec<CommandSpec>>,
    script: Box<Script>,
}

impl ScriptedRunner {
    pub fn new(script: impl Fn(&CommandSpec) -> Result<CommandOutcome> + Send + Sync + 'static) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            script: Box::new(script),
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls whose arguments contain `word`.
    pub fn calls_with(&self, word: &str) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|spec| spec.args.iter().any(|a| a == word))
            .collect()
    }

    pub fn calls_to(&self, program: &str) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|spec| spec.program == program)
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome> {
        self.calls.lock().unwrap().push(spec.clone());
        (self.script)(spec)
    }
}

pub fn exited(code: i32) -> Result<CommandOutcome> {
    Ok(CommandOutcome {
        code: Some(code),
        stdout: String::new(),
    })
}

pub fn printed(stdout: &str) -> Result<CommandOutcome> {
    Ok(CommandOutcome {
        code: Some(0),
        stdout: stdout.to_string(),
    })
}

pub fn set_mtime(path: &Path, time: SystemTime) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(time).unwrap();
}

pub fn mtime(path: &Path) -> SystemTime {
    fs::metadata(path).unwrap().modified().unwrap()
}

pub fn an_hour_ago() -> SystemTime {
    SystemTime::now() - Duration::from_secs(3600)
}

/// A minimal cargo project whose files all carry an old modification time.
pub fn setup_cargo_project() -> TempDir {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    let root = temp_dir.path();
    fs::create_dir_all(root.join("src")).expect("Failed to create src directory");
    fs::write(
        root.join("Cargo.toml"),
        "[package]\nname = \"sample_project\"\nversion = \"0.1.0\"\nedition = \"2021\"\n",
    )
    .expect("Failed to write Cargo.toml");
    fs::write(root.join("src").join("lib.rs"), "pub fn answer() -> u32 { 42 }\n")
        .expect("Failed to write lib.rs");

    for path in [root.join("Cargo.toml"), root.join("src").join("lib.rs")] {
        set_mtime(&path, an_hour_ago());
    }
    temp_dir
}

/// Writes `build.json` into `root`.
pub fn write_recipes(root: &Path, json: &str) {
    fs::write(root.join("build.json"), json).expect("Failed to write build.json");
}

/// A passing libtest JSON stream: one suite, 5 tests, 1 ignored.
pub const PASSING_STREAM: &str = r#"{ "type": "suite", "event": "started", "test_count": 5 }
{ "type": "test", "event": "started", "name": "tests::adds" }
{ "type": "test", "name": "tests::adds", "event": "ok" }
{ "type": "test", "event": "started", "name": "tests::later" }
{ "type": "test", "name": "tests::later", "event": "ignored" }
{ "type": "suite", "event": "ok", "passed": 4, "failed": 0, "ignored": 1, "measured": 0, "filtered_out": 0, "exec_time": 0.5 }
"#;

/// A failing libtest JSON stream with one failure, `foo::bar`.
pub const FAILING_STREAM: &str = r#"{ "type": "suite", "event": "started", "test_count": 2 }
{ "type": "test", "event": "started", "name": "foo::bar" }
{ "type": "test", "event": "started", "name": "foo::baz" }
{ "type": "test", "name": "foo::baz", "event": "ok" }
{ "type": "test", "name": "foo::bar", "event": "failed", "stdout": "thread 'foo::bar' panicked at src/lib.rs:9:5:\nassertion failed: left == right\n" }
{ "type": "suite", "event": "failed", "passed": 1, "failed": 1, "ignored": 0, "measured": 0, "filtered_out": 0, "exec_time": 0.25 }
"#;
