//! Coverage pipeline behaviour against a scripted toolchain.
//!
//! 使用脚本化工具链验证覆盖率流水线的行为。

mod common;

use common::{exited, mtime, printed, set_mtime, setup_cargo_project, ScriptedRunner, FAILING_STREAM, PASSING_STREAM};
use recipe_runner::core::config::Environment;
use recipe_runner::core::error::DriverError;
use recipe_runner::core::report::TestReport;
use recipe_runner::infra::command::{CommandSpec, StdoutMode};
use recipe_runner::toolchain::coverage::{
    run_with_coverage, TestOutcome, TestRun, BOOTSTRAP_VAR, PROFILE_FILE_VAR, RUSTFLAGS_VAR,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

const INSTALLED: &str = "cargo-x86_64-unknown-linux-gnu\nllvm-tools-x86_64-unknown-linux-gnu\nrustc-x86_64-unknown-linux-gnu\n";

/// Fakes rustup, `cargo test` (writing `stream` to the report file) and grcov.
fn toolchain(stream: &'static str, cargo_code: i32, grcov_code: i32) -> ScriptedRunner {
    ScriptedRunner::new(move |spec: &CommandSpec| match spec.program.as_str() {
        "rustup" => printed(INSTALLED),
        "cargo" => {
            if let StdoutMode::File(path) = &spec.stdout {
                fs::write(path, stream)?;
            }
            exited(cargo_code)
        }
        "grcov" => exited(grcov_code),
        other => panic!("unexpected program {other}"),
    })
}

fn test_run(project: &Path) -> TestRun {
    TestRun::new(project, vec![], &project.join("report"), None)
}

fn instrumentation_env() -> Vec<Option<String>> {
    [BOOTSTRAP_VAR, RUSTFLAGS_VAR, PROFILE_FILE_VAR]
        .iter()
        .map(|k| std::env::var(k).ok())
        .collect()
}

fn profile_dir_of(spec: &CommandSpec) -> PathBuf {
    PathBuf::from(&spec.envs[PROFILE_FILE_VAR])
        .parent()
        .unwrap()
        .to_path_buf()
}

#[tokio::test]
async fn passing_run_reports_stats_and_writes_both_coverage_formats() {
    let project = setup_cargo_project();
    let runner = toolchain(PASSING_STREAM, 0, 0);
    let env = Environment::default();
    let run = test_run(project.path());
    let before = instrumentation_env();

    let outcome = run_with_coverage(&runner, &env, &run).await.unwrap();

    match outcome {
        TestOutcome::Passed(stats) => {
            assert_eq!(stats.test_count, 5);
            assert_eq!(stats.passed, 4);
            assert_eq!(stats.ignored, 1);
            assert_eq!(stats.failed, 0);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let report = TestReport::load(&run.report_file).unwrap();
    assert_eq!(report.records().len(), 6);

    let cargo = runner.calls_to("cargo");
    assert_eq!(cargo.len(), 1);
    assert_eq!(cargo[0].envs[BOOTSTRAP_VAR], "1");
    assert!(cargo[0].envs[PROFILE_FILE_VAR].ends_with("cov-%p-%m.profraw"));
    let profile_dir = profile_dir_of(&cargo[0]);
    assert!(profile_dir.starts_with(project.path().join("target")));
    assert!(!profile_dir.exists(), "profile directory must be removed");

    let grcov = runner.calls_to("grcov");
    assert_eq!(grcov.len(), 2);
    assert!(grcov[0].args.windows(2).any(|w| w == ["-t", "html"]));
    assert!(grcov[1].args.windows(2).any(|w| w == ["-t", "cobertura"]));
    assert_eq!(grcov[1].args.last().map(PathBuf::from), Some(run.cobertura_file()));

    assert_eq!(before, instrumentation_env(), "the driver's own environment must not change");
}

#[tokio::test]
async fn up_to_date_report_skips_until_sources_change() {
    let project = setup_cargo_project();
    let runner = toolchain(PASSING_STREAM, 0, 0);
    let env = Environment::default();
    let run = test_run(project.path());

    run_with_coverage(&runner, &env, &run).await.unwrap();
    let second = run_with_coverage(&runner, &env, &run).await.unwrap();
    assert_eq!(second, TestOutcome::Skipped);
    assert_eq!(runner.calls_to("cargo").len(), 1);

    set_mtime(
        &project.path().join("src").join("lib.rs"),
        SystemTime::now() + Duration::from_secs(3600),
    );
    let third = run_with_coverage(&runner, &env, &run).await.unwrap();
    assert!(matches!(third, TestOutcome::Passed(_)));
    assert_eq!(runner.calls_to("cargo").len(), 2);
}

#[tokio::test]
async fn failing_run_reports_failures_and_is_not_skipped_next_time() {
    let project = setup_cargo_project();
    let runner = toolchain(FAILING_STREAM, 101, 0);
    let env = Environment::default();
    let run = test_run(project.path());
    let before = instrumentation_env();

    let err = run_with_coverage(&runner, &env, &run).await.unwrap_err();
    assert_eq!(before, instrumentation_env());
    match err.downcast_ref::<DriverError>() {
        Some(DriverError::TestsFailed { code, details }) => {
            assert_eq!(*code, 101);
            assert!(details.starts_with("foo::bar:"));
            assert!(details.contains("    assertion failed: left == right"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert!(run.report_file.exists(), "failed report is kept for inspection");
    assert_eq!(mtime(&run.report_file), SystemTime::UNIX_EPOCH);
    assert_eq!(runner.calls_to("grcov").len(), 2, "coverage still renders after failures");

    assert!(run_with_coverage(&runner, &env, &run).await.is_err());
    assert_eq!(runner.calls_to("cargo").len(), 2);
}

/// Stray stdout from a test's child process ahead of the libtest events.
const NOISY_STREAM: &str = r#"spawned helper on port 4000
{ "type": "suite", "event": "started", "test_count": 1 }
{ "type": "suite", "event": "ok", "passed": 1, "failed": 0, "ignored": 0, "exec_time": 0.1 }
"#;

#[tokio::test]
async fn unreadable_report_after_failed_tests_keeps_exit_code_and_reruns() {
    let project = setup_cargo_project();
    let runner = toolchain(NOISY_STREAM, 101, 0);
    let env = Environment::default();
    let run = test_run(project.path());

    let err = run_with_coverage(&runner, &env, &run).await.unwrap_err();
    match err.downcast_ref::<DriverError>() {
        Some(DriverError::TestsFailed { code, details }) => {
            assert_eq!(*code, 101);
            assert!(details.contains("not valid JSON"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(mtime(&run.report_file), SystemTime::UNIX_EPOCH);

    let second = run_with_coverage(&runner, &env, &run).await;
    assert!(second.is_err(), "a failed run must not be skipped: {second:?}");
    assert_eq!(runner.calls_to("cargo").len(), 2);
}

#[tokio::test]
async fn unreadable_report_after_passing_tests_is_an_error_and_reruns() {
    let project = setup_cargo_project();
    let runner = toolchain(NOISY_STREAM, 0, 0);
    let env = Environment::default();
    let run = test_run(project.path());

    let err = run_with_coverage(&runner, &env, &run).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DriverError>(),
        Some(DriverError::MalformedReport { .. })
    ));
    assert_eq!(mtime(&run.report_file), SystemTime::UNIX_EPOCH);

    assert!(run_with_coverage(&runner, &env, &run).await.is_err());
    assert_eq!(runner.calls_to("cargo").len(), 2);
}

#[tokio::test]
async fn spawn_failure_after_report_creation_is_not_skipped_next_time() {
    let project = setup_cargo_project();
    // Like `SystemRunner`: the report file is created before the spawn fails.
    let runner = ScriptedRunner::new(|spec: &CommandSpec| match spec.program.as_str() {
        "rustup" => printed(INSTALLED),
        "cargo" => {
            if let StdoutMode::File(path) = &spec.stdout {
                fs::File::create(path)?;
            }
            anyhow::bail!("Failed to execute 'cargo'")
        }
        other => panic!("unexpected program {other}"),
    });
    let env = Environment::default();
    let run = test_run(project.path());

    assert!(run_with_coverage(&runner, &env, &run).await.is_err());
    assert!(run.report_file.exists());
    assert_eq!(mtime(&run.report_file), SystemTime::UNIX_EPOCH);

    let second = run_with_coverage(&runner, &env, &run).await;
    assert!(second.is_err(), "an aborted run must not be skipped: {second:?}");
    assert_eq!(runner.calls_to("cargo").len(), 2);
}

#[tokio::test]
async fn grcov_failures_only_warn() {
    let project = setup_cargo_project();
    let runner = toolchain(PASSING_STREAM, 0, 1);
    let env = Environment::default();

    let outcome = run_with_coverage(&runner, &env, &test_run(project.path())).await.unwrap();
    assert!(matches!(outcome, TestOutcome::Passed(_)));
}

#[tokio::test]
async fn missing_llvm_tools_stops_before_testing() {
    let project = setup_cargo_project();
    let runner = ScriptedRunner::new(|spec: &CommandSpec| match spec.program.as_str() {
        "rustup" => printed("cargo-x86_64-unknown-linux-gnu\nrust-std-x86_64-unknown-linux-gnu\n"),
        other => panic!("unexpected program {other}"),
    });
    let env = Environment::default();

    let err = run_with_coverage(&runner, &env, &test_run(project.path())).await.unwrap_err();
    match err.downcast_ref::<DriverError>() {
        Some(DriverError::MissingComponent(message)) => {
            assert!(message.contains("llvm-tools-preview"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(runner.calls().len(), 1);
}

#[tokio::test]
async fn features_and_threads_reach_cargo() {
    let project = setup_cargo_project();
    let runner = toolchain(PASSING_STREAM, 0, 0);
    let env = Environment::default();
    let run = TestRun::new(
        project.path(),
        vec!["serde".into(), "std".into()],
        &project.path().join("out"),
        Some(1),
    );

    run_with_coverage(&runner, &env, &run).await.unwrap();

    let cargo = &runner.calls_to("cargo")[0];
    assert_eq!(&cargo.args[..3], ["test", "--features", "serde,std"]);
    assert_eq!(cargo.args.last().map(String::as_str), Some("--test-threads=1"));
    assert!(project.path().join("out/unittest/report.json").is_file());
}

#[tokio::test]
async fn cargo_spawn_failure_still_cleans_up_profile_dir() {
    let project = setup_cargo_project();
    let seen = Arc::new(std::sync::Mutex::new(None::<PathBuf>));
    let calls = Arc::new(AtomicI32::new(0));
    let runner = {
        let seen = Arc::clone(&seen);
        let calls = Arc::clone(&calls);
        ScriptedRunner::new(move |spec: &CommandSpec| {
            calls.fetch_add(1, Ordering::SeqCst);
            match spec.program.as_str() {
                "rustup" => printed(INSTALLED),
                _ => {
                    *seen.lock().unwrap() = Some(profile_dir_of(spec));
                    anyhow::bail!("Failed to execute 'cargo'")
                }
            }
        })
    };
    let env = Environment::default();

    assert!(run_with_coverage(&runner, &env, &test_run(project.path())).await.is_err());
    let profile_dir = seen.lock().unwrap().clone().unwrap();
    assert!(!profile_dir.exists());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
