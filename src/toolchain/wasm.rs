//! # wasm-pack Module / wasm-pack 模块
//!
//! Builds a crate into a web-targeted WebAssembly package.
//!
//! 将 crate 构建为面向 Web 的 WebAssembly 包。

use anyhow::Result;
use colored::*;
use std::path::Path;

use crate::core::config::Environment;
use crate::infra::command::{CommandRunner, CommandSpec};
use crate::infra::t;

/// `web_sys` gates its newer browser APIs behind this cfg.
pub const WEB_SYS_RUSTFLAGS: &str = "--cfg=web_sys_unstable_apis";

pub fn wasm_pack_command(env: &Environment, project_dir: &Path, out_dir: &Path) -> CommandSpec {
    CommandSpec::new(&env.wasm_pack)
        .args(["build", "--release", "--target", "web", "--out-name", "wasm", "--out-dir"])
        .path_arg(out_dir)
        .current_dir(project_dir)
        .env("RUSTFLAGS", WEB_SYS_RUSTFLAGS)
}

/// Runs `wasm-pack build` for `project_dir`, writing the package to `out_dir`.
pub async fn build(
    runner: &dyn CommandRunner,
    env: &Environment,
    project_dir: &Path,
    out_dir: &Path,
) -> Result<()> {
    let spec = wasm_pack_command(env, project_dir, out_dir);
    println!(
        "{}",
        t!("cargo.invoking", command = spec.display_line(), dir = project_dir.display()).blue()
    );
    runner.run_checked(&spec).await?;
    Ok(())
}
