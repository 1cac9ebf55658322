//! # Dispatch Module / 分派模块
//!
//! Runs a recipe: every record of the chosen recipe is converted into an
//! [`Operation`] first, then the operations run one after another. The first
//! failure stops the recipe.
//!
//! 运行配方：先将所选配方的每条记录转换为 [`Operation`]，然后依次运行。
//! 第一个失败会终止配方。

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::config::{Environment, Operation, RecipeBook};
use crate::infra::command::{CommandRunner, CommandSpec};
use crate::infra::fs::{delete_path, merge_tree, resolve};
use crate::remote::staging::remote_cargo_build;
use crate::remote::vbox::{self, StartupPolicy, VirtualBoxMachine};
use crate::reporting::console;
use crate::toolchain::{wasm, Cargo, TestRun};

/// Everything an operation may read while it runs.
/// 操作运行时可读取的全部上下文。
pub struct Dispatcher<'a> {
    root: PathBuf,
    env: &'a Environment,
    runner: &'a dyn CommandRunner,
    program_args: Vec<String>,
}

impl<'a> Dispatcher<'a> {
    /// `root` is the base of every relative path in the recipe book. A
    /// relative root is made absolute against the current directory.
    pub fn new(root: impl AsRef<Path>, env: &'a Environment, runner: &'a dyn CommandRunner) -> Result<Self> {
        let root = root.as_ref();
        let root = std::path::absolute(root)
            .with_context(|| format!("Failed to resolve project root: {}", root.display()))?;
        Ok(Self {
            root,
            env,
            runner,
            program_args: Vec::new(),
        })
    }

    /// Arguments forwarded to `cargo-run` operations.
    pub fn with_program_args(mut self, args: Vec<String>) -> Self {
        self.program_args = args;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Runs the recipe `name` from `book`. `config` only names the recipe
    /// file in error messages.
    ///
    /// 运行 `book` 中名为 `name` 的配方。
    pub async fn run_recipe(&self, book: &RecipeBook, name: &str, config: &Path) -> Result<()> {
        let operations = book.recipe(name, config)?;
        let total = operations.len();
        tracing::info!(recipe = name, operations = total, root = %self.root.display(), "running recipe");

        for (index, operation) in operations.iter().enumerate() {
            console::print_step(index + 1, total, operation.kind());
            tracing::info!(recipe = name, step = index + 1, op = operation.kind(), "operation");
            self.execute(operation)
                .await
                .with_context(|| format!("{} (step {} of recipe '{name}')", operation.kind(), index + 1))?;
        }

        console::print_recipe_finished(name);
        Ok(())
    }

    /// Runs a single operation.
    pub async fn execute(&self, operation: &Operation) -> Result<()> {
        let cargo = Cargo::new(self.runner, self.env);
        match operation {
            Operation::CargoBuild(args) => cargo.build(&resolve(&self.root, &args.dir)).await,
            Operation::CargoRun(args) => {
                cargo
                    .run(&resolve(&self.root, &args.dir), &self.program_args)
                    .await
            }
            Operation::CargoTest(args) => {
                let run = TestRun::new(
                    resolve(&self.root, &args.dir),
                    args.features.clone(),
                    &resolve(&self.root, &args.report_dir),
                    args.threads,
                );
                cargo.test(&run).await.map(|outcome| {
                    tracing::info!(?outcome, "cargo test finished");
                })
            }
            Operation::CargoDoc(args) => {
                let out = args.out.as_ref().map(|out| resolve(&self.root, out));
                cargo
                    .doc(&resolve(&self.root, &args.dir), out.as_deref())
                    .await
            }
            Operation::Mkdir(args) => {
                let target = resolve(&self.root, &args.target);
                fs::create_dir_all(&target)
                    .with_context(|| format!("Failed to create directory: {}", target.display()))
            }
            Operation::Copy(args) => {
                let summary = merge_tree(
                    &resolve(&self.root, &args.source),
                    &resolve(&self.root, &args.dest),
                )?;
                tracing::info!(?summary, "merge finished");
                Ok(())
            }
            Operation::Delete(args) => delete_path(&resolve(&self.root, &args.target)),
            Operation::WasmPack(args) => {
                wasm::build(
                    self.runner,
                    self.env,
                    &resolve(&self.root, &args.dir),
                    &resolve(&self.root, &args.out),
                )
                .await
            }
            Operation::Command(args) => {
                let Some((program, rest)) = args.args.split_first() else {
                    anyhow::bail!("`command` needs a program");
                };
                let spec = CommandSpec::new(program)
                    .args(rest.iter().cloned())
                    .current_dir(resolve(&self.root, &args.dir))
                    .envs(args.env.clone());
                self.runner.run_checked(&spec).await.map(|_| ())
            }
            Operation::VirtualBoxOpen(args) => {
                VirtualBoxMachine::open(
                    self.runner,
                    self.env,
                    &args.vm,
                    args.headless,
                    StartupPolicy::with_attempts(args.startup_attempts),
                )
                .await
                .map(|_| ())
            }
            Operation::VirtualBoxClose(args) => {
                vbox::close(self.runner, self.env, &args.vm).await.map(|_| ())
            }
            Operation::VirtualBoxCommand(args) => {
                let machine = VirtualBoxMachine::open(
                    self.runner,
                    self.env,
                    &args.vm,
                    false,
                    StartupPolicy::with_attempts(args.startup_attempts),
                )
                .await?;
                machine.command(&args.args).await
            }
            Operation::VirtualBoxCargoBuild(args) => {
                remote_cargo_build(self.runner, self.env, &self.root, args).await
            }
        }
    }
}
