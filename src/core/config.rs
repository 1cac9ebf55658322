//! # Configuration Module / 配置模块
//!
//! Loads the recipe book (`build.json`) and the tool environment
//! (`env.json`), and turns raw `{op, args}` records into typed operations.
//!
//! 加载配方文件（`build.json`）和工具环境（`env.json`），
//! 并将原始的 `{op, args}` 记录转换为类型化的操作。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::DriverError;

/// The recipe file looked up in the project root by default.
pub const RECIPE_FILE: &str = "build.json";
/// The optional tool environment file looked up in the project root by default.
pub const ENVIRONMENT_FILE: &str = "env.json";

/// Arguments of the `cargo-build`, `cargo-run` and `wasm-pack` family.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectArgs {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CargoTestArgs {
    pub dir: PathBuf,
    /// Cargo features to enable for the test build.
    #[serde(default)]
    pub features: Vec<String>,
    /// Receives `unittest/report.json` and `coverage/`.
    pub report_dir: PathBuf,
    /// `--test-threads`; the harness default when absent or `null`.
    #[serde(default)]
    pub threads: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CargoDocArgs {
    pub dir: PathBuf,
    #[serde(default)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TargetArgs {
    pub target: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CopyArgs {
    pub source: PathBuf,
    pub dest: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct WasmPackArgs {
    pub dir: PathBuf,
    pub out: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommandArgs {
    pub dir: PathBuf,
    /// Program followed by its arguments.
    pub args: Vec<String>,
    /// Variables added to the command's environment only.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct VmOpenArgs {
    pub vm: String,
    /// Start without a console window (`--type headless`).
    #[serde(default)]
    pub headless: bool,
    #[serde(default)]
    pub startup_attempts: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct VmCloseArgs {
    pub vm: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct VmCommandArgs {
    pub vm: String,
    pub args: Vec<String>,
    #[serde(default)]
    pub startup_attempts: Option<u32>,
}

fn default_remote_recipe() -> String {
    "build".to_string()
}

/// Arguments of `virtual-box-cargo-build`.
/// `virtual-box-cargo-build` 的参数。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct VmCargoBuildArgs {
    pub vm: String,
    /// Host directory that receives the guest's `target` directory.
    pub output: PathBuf,
    /// Cargo executable inside the guest.
    pub cargo: String,
    /// This driver's executable inside the guest.
    #[serde(default)]
    pub driver: Option<String>,
    /// Recipe the guest runs.
    #[serde(default = "default_remote_recipe")]
    pub recipe: String,
    #[serde(default)]
    pub startup_attempts: Option<u32>,
}

/// One step of a recipe. The set is closed: every tag the driver accepts is a
/// variant here, and dispatch matches on it exhaustively.
///
/// 配方中的一个步骤。集合是封闭的：驱动程序接受的每个标签都是这里的一个变体，
/// 分派时对其进行穷尽匹配。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "op", content = "args", rename_all = "kebab-case")]
pub enum Operation {
    CargoBuild(ProjectArgs),
    CargoRun(ProjectArgs),
    CargoTest(CargoTestArgs),
    CargoDoc(CargoDocArgs),
    Mkdir(TargetArgs),
    Copy(CopyArgs),
    Delete(TargetArgs),
    WasmPack(WasmPackArgs),
    Command(CommandArgs),
    VirtualBoxOpen(VmOpenArgs),
    VirtualBoxClose(VmCloseArgs),
    VirtualBoxCommand(VmCommandArgs),
    VirtualBoxCargoBuild(VmCargoBuildArgs),
}

impl Operation {
    /// Every tag accepted in the `op` field.
    pub const KINDS: [&'static str; 13] = [
        "cargo-build",
        "cargo-run",
        "cargo-test",
        "cargo-doc",
        "mkdir",
        "copy",
        "delete",
        "wasm-pack",
        "command",
        "virtual-box-open",
        "virtual-box-close",
        "virtual-box-command",
        "virtual-box-cargo-build",
    ];

    /// The `op` tag of this operation.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::CargoBuild(_) => "cargo-build",
            Operation::CargoRun(_) => "cargo-run",
            Operation::CargoTest(_) => "cargo-test",
            Operation::CargoDoc(_) => "cargo-doc",
            Operation::Mkdir(_) => "mkdir",
            Operation::Copy(_) => "copy",
            Operation::Delete(_) => "delete",
            Operation::WasmPack(_) => "wasm-pack",
            Operation::Command(_) => "command",
            Operation::VirtualBoxOpen(_) => "virtual-box-open",
            Operation::VirtualBoxClose(_) => "virtual-box-close",
            Operation::VirtualBoxCommand(_) => "virtual-box-command",
            Operation::VirtualBoxCargoBuild(_) => "virtual-box-cargo-build",
        }
    }

    /// Converts one raw record of `recipe`. An unknown tag is
    /// [`DriverError::UnsupportedOperation`]; a known tag with unusable
    /// arguments is [`DriverError::InvalidOperation`].
    pub fn from_record(recipe: &str, record: &serde_json::Value) -> Result<Self, DriverError> {
        let op = record
            .get("op")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        if !Self::KINDS.contains(&op) {
            let op = if op.is_empty() { record.to_string() } else { op.to_string() };
            return Err(DriverError::UnsupportedOperation {
                recipe: recipe.to_string(),
                op,
            });
        }

        let invalid = |reason: String| DriverError::InvalidOperation {
            recipe: recipe.to_string(),
            op: op.to_string(),
            reason,
        };
        let operation: Operation =
            serde_json::from_value(record.clone()).map_err(|e| invalid(e.to_string()))?;
        let missing_program = match &operation {
            Operation::Command(args) => args.args.is_empty(),
            Operation::VirtualBoxCommand(args) => args.args.is_empty(),
            _ => false,
        };
        if missing_program {
            return Err(invalid("`args` must name a program".to_string()));
        }
        Ok(operation)
    }
}

/// The recipe file: recipe name to its ordered raw records.
///
/// Records stay raw until a recipe is selected, so an unknown tag in one
/// recipe does not prevent running another.
///
/// 配方文件：配方名称到其有序原始记录的映射。
/// 记录在配方被选中之前保持原始形式，因此某个配方中的未知标签不会妨碍运行其他配方。
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RecipeBook {
    recipes: BTreeMap<String, Vec<serde_json::Value>>,
}

impl RecipeBook {
    /// Reads `build.json`. A missing file or malformed JSON is fatal.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            let file = path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| RECIPE_FILE.to_string());
            return Err(DriverError::ConfigNotFound { file, dir }.into());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read recipe file: {}", path.display()))?;
        Self::from_json(&content).map_err(|source| {
            DriverError::ConfigParse {
                path: path.to_path_buf(),
                source,
            }
            .into()
        })
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.recipes.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.recipes.contains_key(name)
    }

    /// Returns the typed operations of `name`, validating every record before
    /// any of them runs.
    ///
    /// 返回 `name` 的类型化操作，在任何操作运行之前验证所有记录。
    pub fn recipe(&self, name: &str, config: &Path) -> Result<Vec<Operation>, DriverError> {
        let records = self
            .recipes
            .get(name)
            .ok_or_else(|| DriverError::RecipeNotFound {
                name: name.to_string(),
                config: config.to_path_buf(),
            })?;
        records
            .iter()
            .map(|record| Operation::from_record(name, record))
            .collect()
    }
}

fn default_cargo() -> String {
    "cargo".to_string()
}
fn default_rustup() -> String {
    "rustup".to_string()
}
fn default_grcov() -> String {
    "grcov".to_string()
}
fn default_wasm_pack() -> String {
    "wasm-pack".to_string()
}
fn default_vboxmanage() -> String {
    "VBoxManage".to_string()
}
fn default_guest_username() -> String {
    "root".to_string()
}

/// Tool paths and guest credentials, read from `env.json`.
/// Every key is optional and unknown keys are ignored.
///
/// 工具路径和客户机凭据，从 `env.json` 读取。
/// 所有键都是可选的，未知键会被忽略。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Environment {
    #[serde(default = "default_cargo")]
    pub cargo: String,
    #[serde(default = "default_rustup")]
    pub rustup: String,
    #[serde(default = "default_grcov")]
    pub grcov: String,
    #[serde(default = "default_wasm_pack")]
    pub wasm_pack: String,
    #[serde(default = "default_vboxmanage")]
    pub vboxmanage: String,
    #[serde(default = "default_guest_username")]
    pub guest_username: String,
    #[serde(default)]
    pub guest_password: String,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            cargo: default_cargo(),
            rustup: default_rustup(),
            grcov: default_grcov(),
            wasm_pack: default_wasm_pack(),
            vboxmanage: default_vboxmanage(),
            guest_username: default_guest_username(),
            guest_password: String::new(),
        }
    }
}

impl Environment {
    /// Reads `env.json` if it exists; defaults fill every missing key.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read environment file: {}", path.display()))?;
        let env = Self::from_json(&content).map_err(|source| DriverError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        env.expanded()
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Expands `~` and `$VAR` in the tool paths.
    pub fn expanded(self) -> Result<Self> {
        let expand = |value: String| -> Result<String> {
            Ok(shellexpand::full(&value)
                .with_context(|| format!("Failed to expand path: {value}"))?
                .into_owned())
        };
        Ok(Self {
            cargo: expand(self.cargo)?,
            rustup: expand(self.rustup)?,
            grcov: expand(self.grcov)?,
            wasm_pack: expand(self.wasm_pack)?,
            vboxmanage: expand(self.vboxmanage)?,
            guest_username: self.guest_username,
            guest_password: self.guest_password,
        })
    }
}
