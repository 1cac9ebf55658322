//! # Command Execution Module / 命令执行模块
//!
//! Every external tool the driver touches (cargo, rustup, grcov, wasm-pack,
//! VBoxManage, user commands) is described by a [`CommandSpec`] and run
//! through a [`CommandRunner`]. Environment variables for a tool are attached
//! to that one spawned process as an overlay; the driver's own environment is
//! never modified.
//!
//! 驱动程序调用的每个外部工具都由 [`CommandSpec`] 描述，并通过 [`CommandRunner`] 运行。
//! 工具的环境变量作为覆盖层附加到单个子进程上，驱动程序自身的环境从不被修改。

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::core::error::DriverError;

/// Where a child's standard output goes.
/// 子进程标准输出的去向。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdoutMode {
    /// Shared with the driver's terminal.
    Inherit,
    /// Collected and returned in [`CommandOutcome::stdout`].
    Capture,
    /// Written to a file, which is created or truncated.
    File(PathBuf),
}

/// A fully described process invocation.
/// 对一次进程调用的完整描述。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Variables added to the child's inherited environment.
    /// 添加到子进程继承环境中的变量。
    pub envs: BTreeMap<String, String>,
    pub stdout: StdoutMode,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            envs: BTreeMap::new(),
            stdout: StdoutMode::Inherit,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends a path argument, converting it lossily to UTF-8.
    pub fn path_arg(self, path: impl AsRef<Path>) -> Self {
        self.arg(path.as_ref().to_string_lossy().into_owned())
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.envs
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn stdout(mut self, mode: StdoutMode) -> Self {
        self.stdout = mode;
        self
    }

    pub fn capture(self) -> Self {
        self.stdout(StdoutMode::Capture)
    }

    /// A shell-quoted rendering of program and arguments, for messages.
    pub fn display_line(&self) -> String {
        let words = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        shlex::try_join(words).unwrap_or_else(|_| {
            std::iter::once(self.program.clone())
                .chain(self.args.iter().cloned())
                .collect::<Vec<_>>()
                .join(" ")
        })
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_line())
    }
}

/// Exit information of a finished process.
/// 已结束进程的退出信息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    /// Captured standard output; empty unless [`StdoutMode::Capture`] was used.
    pub stdout: String,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// The exit code, with `-1` standing in for signal termination.
    pub fn code_or_signal(&self) -> i32 {
        self.code.unwrap_or(-1)
    }

    /// Turns a non-zero exit into [`DriverError::CommandFailed`].
    pub fn ensure_success(self, spec: &CommandSpec) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(DriverError::CommandFailed {
                command: spec.display_line(),
                code: self.code_or_signal(),
            }
            .into())
        }
    }
}

/// The seam between the driver and the operating system's process API.
///
/// Implementations must run the command to completion before returning.
///
/// 驱动程序与操作系统进程 API 之间的接缝。
/// 实现必须在返回前运行命令直至结束。
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the command and reports how it exited. A non-zero exit is not
    /// an error at this level; failing to spawn is.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome>;

    /// Runs the command and fails on a non-zero exit.
    async fn run_checked(&self, spec: &CommandSpec) -> Result<CommandOutcome> {
        self.run(spec).await?.ensure_success(spec)
    }
}

/// Spawns real processes with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome> {
        tracing::debug!(
            command = %spec,
            cwd = ?spec.cwd,
            overlay = ?spec.envs.keys().collect::<Vec<_>>(),
            "spawning"
        );

        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args).envs(&spec.envs).kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        let stdout = match &spec.stdout {
            StdoutMode::Inherit => Stdio::inherit(),
            StdoutMode::Capture => Stdio::piped(),
            StdoutMode::File(path) => {
                let file = File::create(path).with_context(|| {
                    format!("Failed to create output file: {}", path.display())
                })?;
                Stdio::from(file)
            }
        };
        cmd.stdout(stdout).stderr(Stdio::inherit());

        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to execute '{}'", spec.program))?;
        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("Failed to get process status for '{}'", spec.program))?;

        let outcome = CommandOutcome {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        };
        tracing::debug!(command = %spec, code = ?outcome.code, "finished");
        Ok(outcome)
    }
}
