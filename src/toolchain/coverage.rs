//! # Coverage Pipeline Module / 覆盖率流水线模块
//!
//! Runs a project's unit tests with source-based coverage instrumentation,
//! keeps the libtest event stream as a JSON report, and renders HTML and
//! Cobertura coverage reports with `grcov`.
//!
//! A run is skipped when its report is newer than every tracked project
//! file. The check looks at timestamps only, so touching a file without
//! changing it forces a new run.
//!
//! 使用基于源码的覆盖率插桩运行项目的单元测试，将 libtest 事件流保存为 JSON 报告，
//! 并用 `grcov` 生成 HTML 和 Cobertura 覆盖率报告。
//! 当报告比所有受跟踪的项目文件都新时，跳过本次运行。

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use colored::*;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::core::config::Environment;
use crate::core::error::DriverError;
use crate::core::report::{format_failures, repair_stream, Stats, TestReport};
use crate::infra::command::{CommandRunner, CommandSpec, StdoutMode};
use crate::infra::fs::cargo_project_last_modified;
use crate::infra::t;
use crate::reporting::console::print_test_stats;

/// Lets a stable toolchain accept libtest's unstable JSON output options.
pub const BOOTSTRAP_VAR: &str = "RUSTC_BOOTSTRAP";
pub const RUSTFLAGS_VAR: &str = "RUSTFLAGS";
pub const PROFILE_FILE_VAR: &str = "LLVM_PROFILE_FILE";

/// `%p` (process id) and `%m` (module signature) keep parallel test binaries
/// from overwriting each other's profiles.
pub const PROFILE_FILE_PATTERN: &str = "cov-%p-%m.profraw";

/// Where one `cargo-test` operation reads and writes.
/// 一次 `cargo-test` 操作的读写位置。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRun {
    pub project_dir: PathBuf,
    pub features: Vec<String>,
    /// Repaired libtest event stream; also the skip marker.
    pub report_file: PathBuf,
    /// HTML tree plus `cobertura.xml`.
    pub coverage_dir: PathBuf,
    pub threads: Option<u32>,
}

impl TestRun {
    /// Lays out `<report_dir>/unittest/report.json` and `<report_dir>/coverage`.
    pub fn new(
        project_dir: impl Into<PathBuf>,
        features: Vec<String>,
        report_dir: &Path,
        threads: Option<u32>,
    ) -> Self {
        Self {
            project_dir: project_dir.into(),
            features,
            report_file: report_dir.join("unittest").join("report.json"),
            coverage_dir: report_dir.join("coverage"),
            threads,
        }
    }

    pub fn cobertura_file(&self) -> PathBuf {
        self.coverage_dir.join("cobertura.xml")
    }
}

/// How a `cargo-test` operation ended when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum TestOutcome {
    /// The report was newer than the sources; nothing ran.
    Skipped,
    Passed(Stats),
}

/// The environment overlay for an instrumented test run.
///
/// 插桩测试运行的环境变量覆盖层。
pub fn instrumentation_overlay(profile_dir: &Path) -> BTreeMap<String, String> {
    BTreeMap::from([
        (BOOTSTRAP_VAR.to_string(), "1".to_string()),
        (RUSTFLAGS_VAR.to_string(), "-Cinstrument-coverage".to_string()),
        (
            PROFILE_FILE_VAR.to_string(),
            profile_dir.join(PROFILE_FILE_PATTERN).to_string_lossy().into_owned(),
        ),
    ])
}

/// Fails unless rustup reports the LLVM tools component as installed.
///
/// 除非 rustup 报告已安装 LLVM 工具组件，否则失败。
pub async fn ensure_llvm_tools(
    runner: &dyn CommandRunner,
    env: &Environment,
    project_dir: &Path,
) -> Result<()> {
    let spec = CommandSpec::new(&env.rustup)
        .args(["component", "list", "--installed"])
        .current_dir(project_dir)
        .capture();
    let outcome = runner.run_checked(&spec).await?;
    if has_llvm_tools(&outcome.stdout) {
        Ok(())
    } else {
        Err(DriverError::MissingComponent(t!("coverage.missing_llvm_tools").to_string()).into())
    }
}

/// Recognizes both the older `llvm-tools-preview-<triple>` and the current
/// `llvm-tools-<triple>` component names.
pub fn has_llvm_tools(component_list: &str) -> bool {
    Regex::new(r"(?m)^llvm-tools(-preview)?-\S+")
        .map(|re| re.is_match(component_list))
        .unwrap_or(false)
}

/// `Some(report_time)` when the report exists and is newer than every
/// tracked project file.
pub fn up_to_date_report(project_dir: &Path, report_file: &Path) -> Result<Option<SystemTime>> {
    if !report_file.exists() {
        return Ok(None);
    }
    let report_time = fs::metadata(report_file)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to read modification time: {}", report_file.display()))?;
    let project_time = cargo_project_last_modified(project_dir)?;
    Ok((project_time < report_time).then_some(report_time))
}

fn test_command(env: &Environment, run: &TestRun, profile_dir: &Path) -> CommandSpec {
    let mut spec = CommandSpec::new(&env.cargo)
        .arg("test")
        .current_dir(&run.project_dir)
        .envs(instrumentation_overlay(profile_dir))
        .stdout(StdoutMode::File(run.report_file.clone()));
    if !run.features.is_empty() {
        spec = spec.arg("--features").arg(run.features.join(","));
    }
    spec = spec.args(["--", "-Z", "unstable-options", "--format", "json", "--report-time"]);
    if let Some(threads) = run.threads {
        spec = spec.arg(format!("--test-threads={threads}"));
    }
    spec
}

fn grcov_command(
    env: &Environment,
    run: &TestRun,
    profile_dir: &Path,
    format: &str,
    output: &Path,
) -> CommandSpec {
    CommandSpec::new(&env.grcov)
        .path_arg(profile_dir)
        .arg("-s")
        .path_arg(&run.project_dir)
        .arg("--binary-path")
        .arg(format!("{}/", run.project_dir.join("target").join("debug").display()))
        .args(["-t", format, "--branch", "--ignore-not-existing", "-o"])
        .path_arg(output)
        .current_dir(&run.project_dir)
}

/// Rewrites a raw libtest stream file as a JSON array in place.
pub fn repair_report_file(path: &Path) -> Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read test report: {}", path.display()))?;
    fs::write(path, repair_stream(&raw))
        .with_context(|| format!("Failed to write test report: {}", path.display()))
}

/// Runs the whole pipeline for one `cargo-test` operation.
///
/// Test success is decided by cargo's exit code alone; `grcov` failures only
/// produce warnings. The profile directory is a `TempDir` guard, so it is
/// removed on every exit path.
///
/// 运行一次 `cargo-test` 操作的完整流水线。
/// 测试是否成功仅由 cargo 的退出码决定；`grcov` 失败只会产生警告。
pub async fn run_with_coverage(
    runner: &dyn CommandRunner,
    env: &Environment,
    run: &TestRun,
) -> Result<TestOutcome> {
    ensure_llvm_tools(runner, env, &run.project_dir).await?;

    if let Some(report_time) = up_to_date_report(&run.project_dir, &run.report_file)? {
        let when: DateTime<Local> = report_time.into();
        println!(
            "{}",
            t!(
                "coverage.skip",
                dir = run.project_dir.display(),
                time = when.format("%Y-%m-%d %H:%M:%S")
            )
            .yellow()
        );
        return Ok(TestOutcome::Skipped);
    }

    if let Some(parent) = run.report_file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let target_dir = run.project_dir.join("target");
    fs::create_dir_all(&target_dir)
        .with_context(|| format!("Failed to create directory: {}", target_dir.display()))?;
    let profile_dir = tempfile::Builder::new()
        .prefix("profraw-")
        .tempdir_in(&target_dir)
        .with_context(|| format!("Failed to create profile directory in {}", target_dir.display()))?;

    let spec = test_command(env, run, profile_dir.path());
    println!(
        "{}",
        t!("cargo.invoking", command = spec.display_line(), dir = run.project_dir.display()).blue()
    );
    let test_outcome = match runner.run(&spec).await {
        Ok(outcome) => outcome,
        Err(e) => {
            invalidate_after_error(&run.report_file);
            return Err(e);
        }
    };
    let report = repair_report_file(&run.report_file).and_then(|()| TestReport::load(&run.report_file));

    if let Err(e) = fs::create_dir_all(&run.coverage_dir) {
        invalidate_after_error(&run.report_file);
        return Err(e).with_context(|| format!("Failed to create directory: {}", run.coverage_dir.display()));
    }
    let html = grcov_command(env, run, profile_dir.path(), "html", &run.coverage_dir);
    let cobertura = grcov_command(env, run, profile_dir.path(), "cobertura", &run.cobertura_file());
    for grcov in [html, cobertura] {
        match runner.run(&grcov).await {
            Ok(outcome) if outcome.success() => {}
            Ok(outcome) => println!(
                "{}",
                t!("coverage.grcov_failed", command = grcov.display_line(), code = outcome.code_or_signal())
                    .yellow()
            ),
            Err(e) => println!(
                "{}",
                t!("coverage.grcov_error", command = grcov.display_line(), error = format!("{e:#}"))
                    .yellow()
            ),
        }
    }
    drop(profile_dir);

    if !test_outcome.success() {
        invalidate_report(&run.report_file)?;
        // An unreadable report still fails with cargo's exit code.
        let details = match &report {
            Ok(report) => format_failures(&report.fails()),
            Err(e) => format!("{e:#}"),
        };
        return Err(DriverError::TestsFailed {
            code: test_outcome.code_or_signal(),
            details,
        }
        .into());
    }
    let report = match report {
        Ok(report) => report,
        Err(e) => {
            invalidate_after_error(&run.report_file);
            return Err(e);
        }
    };

    let stats = report.stats();
    print_test_stats(&stats);
    println!(
        "{}",
        t!("coverage.written", path = run.coverage_dir.display()).green()
    );
    Ok(TestOutcome::Passed(stats))
}

/// Keeps a failed run's report for reading but stops it from acting as a
/// skip marker. A missing report needs nothing.
fn invalidate_report(report_file: &Path) -> Result<()> {
    if !report_file.exists() {
        return Ok(());
    }
    let file = fs::File::options()
        .write(true)
        .open(report_file)
        .with_context(|| format!("Failed to open test report: {}", report_file.display()))?;
    file.set_modified(SystemTime::UNIX_EPOCH)
        .with_context(|| format!("Failed to reset modification time: {}", report_file.display()))
}

/// Invalidates the report while another error is already being returned.
fn invalidate_after_error(report_file: &Path) {
    if let Err(e) = invalidate_report(report_file) {
        tracing::warn!(report = %report_file.display(), error = %format!("{e:#}"), "could not invalidate test report");
    }
}
