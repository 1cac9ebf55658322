//! # Remote Build Module / 远程构建模块
//!
//! Builds the project inside a virtual machine: the project root and a
//! generated `env.json` are copied into a fresh guest directory, this driver
//! runs a recipe there, and the guest's `target` directory is copied back.
//!
//! 在虚拟机内构建项目：将项目根目录和生成的 `env.json` 复制到新的客户机目录，
//! 在其中运行本驱动程序的配方，然后将客户机的 `target` 目录复制回来。

use anyhow::{Context, Result};
use colored::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::core::config::{Environment, VmCargoBuildArgs, ENVIRONMENT_FILE};
use crate::infra::command::CommandRunner;
use crate::infra::t;
use crate::remote::vbox::{StartupPolicy, TempKind, VirtualBoxMachine};

/// Where this driver is installed inside guests unless a recipe says otherwise.
pub const DEFAULT_GUEST_DRIVER: &str = "/usr/local/bin/recipe-runner";

/// A host directory holding the guest's `env.json`. Removed when dropped.
/// 存放客户机 `env.json` 的主机目录，在被丢弃时删除。
pub struct StagingDir {
    dir: TempDir,
}

impl StagingDir {
    /// Creates the directory and writes `{"cargo": <guest_cargo>}` into it.
    pub fn create(guest_cargo: &str) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("recipe-runner-")
            .tempdir()
            .context("Failed to create staging directory")?;
        let staging = Self { dir };
        let env = serde_json::json!({ "cargo": guest_cargo });
        fs::write(staging.env_file(), serde_json::to_vec_pretty(&env)?)
            .with_context(|| format!("Failed to write {}", staging.env_file().display()))?;
        Ok(staging)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn env_file(&self) -> PathBuf {
        self.dir.path().join(ENVIRONMENT_FILE)
    }
}

/// The guest command line that runs the nested recipe.
pub fn guest_driver_args(args: &VmCargoBuildArgs, guest_dir: &str) -> Vec<String> {
    vec![
        args.driver.clone().unwrap_or_else(|| DEFAULT_GUEST_DRIVER.to_string()),
        "--root".to_string(),
        guest_dir.to_string(),
        args.recipe.clone(),
    ]
}

/// Runs a `virtual-box-cargo-build` operation for the project at `root`.
///
/// The staging directory lives for the whole call and is removed on every
/// exit path. The guest directory is left in place.
///
/// 为位于 `root` 的项目执行 `virtual-box-cargo-build` 操作。
/// 暂存目录在整个调用期间存在，并在任何退出路径上删除。
pub async fn remote_cargo_build(
    runner: &dyn CommandRunner,
    env: &Environment,
    root: &Path,
    args: &VmCargoBuildArgs,
) -> Result<()> {
    let machine = VirtualBoxMachine::open(
        runner,
        env,
        &args.vm,
        false,
        StartupPolicy::with_attempts(args.startup_attempts),
    )
    .await?;
    let staging = StagingDir::create(&args.cargo)?;
    tracing::debug!(staging = %staging.path().display(), "staging directory created");

    let guest_dir = machine.mktemp(TempKind::Directory).await?;
    println!(
        "{}",
        t!("remote.copying_in", vm = machine.name(), dir = guest_dir.as_str()).blue()
    );
    machine.copy_to(root, &guest_dir).await?;
    machine.copy_to(&staging.env_file(), &guest_dir).await?;

    machine.command(&guest_driver_args(args, &guest_dir)).await?;

    let output = root.join(&args.output);
    fs::create_dir_all(&output)
        .with_context(|| format!("Failed to create directory: {}", output.display()))?;
    machine
        .copy_from(&format!("{guest_dir}/target"), &output)
        .await?;
    println!(
        "{}",
        t!("remote.copied_out", vm = machine.name(), dir = output.display()).green()
    );
    Ok(())
}
