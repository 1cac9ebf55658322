//! # Cargo Invoker Module / Cargo 调用模块
//!
//! Fixed-shape invocations of the local cargo toolchain.
//!
//! 对本地 cargo 工具链的固定形式调用。

use anyhow::Result;
use colored::*;
use std::path::Path;

use crate::core::config::Environment;
use crate::infra::command::{CommandRunner, CommandSpec};
use crate::infra::t;
use crate::toolchain::coverage::{self, TestOutcome, TestRun};

/// Runs cargo subcommands in a project directory.
/// 在项目目录中运行 cargo 子命令。
pub struct Cargo<'a> {
    runner: &'a dyn CommandRunner,
    env: &'a Environment,
}

impl<'a> Cargo<'a> {
    pub fn new(runner: &'a dyn CommandRunner, env: &'a Environment) -> Self {
        Self { runner, env }
    }

    fn command(&self, project_dir: &Path) -> CommandSpec {
        CommandSpec::new(&self.env.cargo).current_dir(project_dir)
    }

    /// `cargo build --release`
    pub async fn build(&self, project_dir: &Path) -> Result<()> {
        let spec = self.command(project_dir).args(["build", "--release"]);
        self.announce(&spec, project_dir);
        self.runner.run_checked(&spec).await?;
        Ok(())
    }

    /// `cargo run --release [-- <args>...]`
    pub async fn run(&self, project_dir: &Path, program_args: &[String]) -> Result<()> {
        let spec = self.run_spec(project_dir, program_args);
        self.announce(&spec, project_dir);
        self.runner.run_checked(&spec).await?;
        Ok(())
    }

    fn run_spec(&self, project_dir: &Path, program_args: &[String]) -> CommandSpec {
        let mut spec = self.command(project_dir).args(["run", "--release"]);
        if !program_args.is_empty() {
            spec = spec.arg("--").args(program_args.iter().cloned());
        }
        spec
    }

    /// `cargo doc --no-deps [--target-dir <out>]`
    pub async fn doc(&self, project_dir: &Path, out_dir: Option<&Path>) -> Result<()> {
        let mut spec = self.command(project_dir).args(["doc", "--no-deps"]);
        if let Some(out) = out_dir {
            spec = spec.arg("--target-dir").path_arg(out);
        }
        self.announce(&spec, project_dir);
        self.runner.run_checked(&spec).await?;
        Ok(())
    }

    /// Unit tests with coverage. See [`coverage::run_with_coverage`].
    pub async fn test(&self, run: &TestRun) -> Result<TestOutcome> {
        coverage::run_with_coverage(self.runner, self.env, run).await
    }

    fn announce(&self, spec: &CommandSpec, project_dir: &Path) {
        println!(
            "{}",
            t!("cargo.invoking", command = spec.display_line(), dir = project_dir.display()).blue()
        );
    }
}
