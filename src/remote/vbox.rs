//! # VirtualBox Module / VirtualBox 模块
//!
//! Drives virtual machines through `VBoxManage`. A [`VirtualBoxMachine`] is
//! only handed out once its VM is running and answers guest-control
//! commands; every guest operation then goes through
//! `VBoxManage guestcontrol <vm> <verb> --username U --password P ...`.
//!
//! 通过 `VBoxManage` 驱动虚拟机。只有当虚拟机正在运行且能响应客户机控制命令时，
//! 才会返回 [`VirtualBoxMachine`]；之后的每个客户机操作都经由
//! `VBoxManage guestcontrol` 完成。

use anyhow::Result;
use colored::*;
use regex::Regex;
use std::path::Path;
use std::time::Duration;

use crate::core::config::Environment;
use crate::core::error::DriverError;
use crate::infra::command::{CommandRunner, CommandSpec};
use crate::infra::t;

/// The guest command used to tell whether guest control is up.
pub const PROBE_COMMAND: [&str; 2] = ["/bin/echo", "hello"];

/// Directory in the guest where `mktemp` allocates.
pub const GUEST_TMPDIR: &str = "/tmp";
const MKTEMP_TEMPLATE: &str = "tmp-XXX";

/// How long to wait for a freshly started VM to accept guest commands.
/// 等待新启动的虚拟机接受客户机命令的时长。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for StartupPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 300,
        }
    }
}

impl StartupPolicy {
    /// The default policy with the attempt budget replaced when given.
    pub fn with_attempts(attempts: Option<u32>) -> Self {
        let mut policy = Self::default();
        if let Some(max_attempts) = attempts {
            policy.max_attempts = max_attempts.max(1);
        }
        policy
    }
}

/// What `mktemp` should create in the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempKind {
    File,
    Directory,
}

impl TempKind {
    fn output_prefix(self) -> &'static str {
        match self {
            TempKind::File => "File name: ",
            TempKind::Directory => "Directory name: ",
        }
    }
}

/// Extracts VM names from `VBoxManage list runningvms`, whose lines look
/// like `"name" {uuid}`.
pub fn parse_running_vms(output: &str) -> Vec<String> {
    match Regex::new(r#"(?m)^"(.*?)""#) {
        Ok(re) => re.captures_iter(output).map(|c| c[1].to_string()).collect(),
        Err(_) => Vec::new(),
    }
}

/// Extracts the created path from `VBoxManage guestcontrol ... mktemp`.
///
/// The tool prints one line `Directory name: <path>` or `File name: <path>`.
/// Any other shape is reported as [`DriverError::UnexpectedOutput`] rather
/// than guessed at.
///
/// 从 `mktemp` 的输出中提取所创建的路径。输出格式不符时返回
/// [`DriverError::UnexpectedOutput`]。
pub fn parse_mktemp_output(kind: TempKind, output: &str) -> Result<String, DriverError> {
    output
        .lines()
        .find_map(|line| line.strip_prefix(kind.output_prefix()))
        .map(|path| path.trim_end().to_string())
        .filter(|path| !path.is_empty())
        .ok_or_else(|| DriverError::UnexpectedOutput {
            command: "VBoxManage guestcontrol mktemp".to_string(),
            output: output.to_string(),
        })
}

fn manage(env: &Environment) -> CommandSpec {
    CommandSpec::new(&env.vboxmanage)
}

/// Names of the VMs VirtualBox currently reports as running.
pub async fn running_vms(runner: &dyn CommandRunner, env: &Environment) -> Result<Vec<String>> {
    let spec = manage(env).args(["list", "runningvms"]).capture();
    let outcome = runner.run_checked(&spec).await?;
    Ok(parse_running_vms(&outcome.stdout))
}

pub async fn is_running(runner: &dyn CommandRunner, env: &Environment, vm: &str) -> Result<bool> {
    Ok(running_vms(runner, env).await?.iter().any(|name| name == vm))
}

/// Powers `vm` off. Returns `false`, after printing a notice, when the VM
/// was not running.
///
/// 强制关闭 `vm`。虚拟机未运行时打印提示并返回 `false`。
pub async fn close(runner: &dyn CommandRunner, env: &Environment, vm: &str) -> Result<bool> {
    if !is_running(runner, env, vm).await? {
        println!("{}", t!("vbox.not_running", vm = vm).yellow());
        return Ok(false);
    }
    let spec = manage(env).args(["controlvm", vm, "poweroff"]);
    runner.run_checked(&spec).await?;
    println!("{}", t!("vbox.powered_off", vm = vm).green());
    Ok(true)
}

/// A running, guest-control-responsive virtual machine.
/// 正在运行且可响应客户机控制的虚拟机。
pub struct VirtualBoxMachine<'a> {
    runner: &'a dyn CommandRunner,
    env: &'a Environment,
    name: String,
}

impl<'a> VirtualBoxMachine<'a> {
    /// Returns a handle to `vm`, starting it first when it is not running.
    ///
    /// A started VM is probed with [`PROBE_COMMAND`] every
    /// `policy.interval` until it answers or `policy.max_attempts` probes
    /// have failed.
    ///
    /// 返回 `vm` 的句柄；若其未运行则先启动，并按策略轮询直到客户机控制可用。
    pub async fn open(
        runner: &'a dyn CommandRunner,
        env: &'a Environment,
        vm: &str,
        headless: bool,
        policy: StartupPolicy,
    ) -> Result<Self> {
        let machine = Self {
            runner,
            env,
            name: vm.to_string(),
        };
        if is_running(runner, env, vm).await? {
            tracing::debug!(vm, "already running");
            return Ok(machine);
        }

        println!("{}", t!("vbox.starting", vm = vm).blue());
        let mut start = manage(env).args(["startvm", vm]);
        if headless {
            start = start.args(["--type", "headless"]);
        }
        runner.run_checked(&start).await?;
        machine.wait_for_guest_control(policy).await?;
        println!("{}", t!("vbox.ready", vm = vm).green());
        Ok(machine)
    }

    async fn wait_for_guest_control(&self, policy: StartupPolicy) -> Result<()> {
        let probe = self.run_spec(&PROBE_COMMAND.map(String::from)).capture();
        for attempt in 1..=policy.max_attempts {
            let outcome = self.runner.run(&probe).await?;
            if outcome.success() {
                return Ok(());
            }
            tracing::debug!(vm = %self.name, attempt, code = ?outcome.code, "guest control not ready");
            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }
        Err(DriverError::StartupTimeout {
            vm: self.name.clone(),
            attempts: policy.max_attempts,
        }
        .into())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn guestcontrol(&self, verb: &str) -> CommandSpec {
        manage(self.env).args([
            "guestcontrol",
            self.name.as_str(),
            verb,
            "--username",
            self.env.guest_username.as_str(),
            "--password",
            self.env.guest_password.as_str(),
        ])
    }

    /// `run --exe <program> -- . <args>`; the `.` fills the guest's argv[0].
    fn run_spec(&self, args: &[String]) -> CommandSpec {
        let (program, rest) = match args.split_first() {
            Some((program, rest)) => (program.as_str(), rest),
            None => ("", &[][..]),
        };
        self.guestcontrol("run")
            .args(["--exe", program, "--", "."])
            .args(rest.iter().cloned())
    }

    /// Runs `args[0]` with `args[1..]` in the guest.
    pub async fn command(&self, args: &[String]) -> Result<()> {
        if args.is_empty() {
            anyhow::bail!("no guest program given for '{}'", self.name);
        }
        self.runner.run_checked(&self.run_spec(args)).await?;
        Ok(())
    }

    pub async fn mkdir(&self, guest_dir: &str) -> Result<()> {
        let spec = self.guestcontrol("mkdir").arg(guest_dir);
        self.runner.run_checked(&spec).await?;
        Ok(())
    }

    /// Creates a temporary file or directory under [`GUEST_TMPDIR`] and
    /// returns its guest path.
    pub async fn mktemp(&self, kind: TempKind) -> Result<String> {
        let mut spec = self.guestcontrol("mktemp");
        if kind == TempKind::Directory {
            spec = spec.arg("--directory");
        }
        let spec = spec
            .args(["--tmpdir", GUEST_TMPDIR, MKTEMP_TEMPLATE])
            .capture();
        let outcome = self.runner.run_checked(&spec).await?;
        parse_mktemp_output(kind, &outcome.stdout).map_err(|e| -> anyhow::Error {
            match e {
                DriverError::UnexpectedOutput { output, .. } => DriverError::UnexpectedOutput {
                    command: spec.display_line(),
                    output,
                }
                .into(),
                other => other.into(),
            }
        })
    }

    /// Copies a host file or tree into `guest_dir`.
    pub async fn copy_to(&self, host: &Path, guest_dir: &str) -> Result<()> {
        let spec = self
            .guestcontrol("copyto")
            .arg("--recursive")
            .path_arg(host)
            .arg(guest_dir);
        self.runner.run_checked(&spec).await?;
        Ok(())
    }

    /// Copies a guest file or tree into the host directory `host_dir`.
    pub async fn copy_from(&self, guest: &str, host_dir: &Path) -> Result<()> {
        let spec = self
            .guestcontrol("copyfrom")
            .args(["--recursive", "--target-directory"])
            .path_arg(host_dir)
            .arg(guest);
        self.runner.run_checked(&spec).await?;
        Ok(())
    }

    /// Forced power-off, consuming the handle.
    pub async fn power_off(self) -> Result<()> {
        let spec = manage(self.env).args(["controlvm", self.name.as_str(), "poweroff"]);
        self.runner.run_checked(&spec).await?;
        Ok(())
    }
}
