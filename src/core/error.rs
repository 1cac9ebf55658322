//! # Error Classification Module / 错误分类模块
//!
//! Most fallible code in the crate returns `anyhow::Result`. The failures that
//! the process exit code or the caller must tell apart are classified here.
//!
//! 整个 crate 中大多数可能失败的代码返回 `anyhow::Result`。
//! 需要通过进程退出码或调用方加以区分的失败在此分类。

use std::path::PathBuf;
use thiserror::Error;

/// Exit status for any failure that has no dedicated code.
pub const EXIT_FAILURE: u8 = 1;
/// Exit status for a recipe name missing from the recipe book.
pub const EXIT_RECIPE_NOT_FOUND: u8 = 3;
/// Exit status for an operation tag the driver does not know.
pub const EXIT_UNSUPPORTED_OPERATION: u8 = 4;

/// A classified driver failure.
/// 已分类的驱动程序失败。
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("recipe not found in {config}: {name}")]
    RecipeNotFound { name: String, config: PathBuf },

    #[error("unsupported op in recipe '{recipe}': {op}")]
    UnsupportedOperation { recipe: String, op: String },

    #[error("invalid arguments for op '{op}' in recipe '{recipe}': {reason}")]
    InvalidOperation {
        recipe: String,
        op: String,
        reason: String,
    },

    #[error("{file} not found in `{dir}`")]
    ConfigNotFound { file: String, dir: PathBuf },

    #[error("can't load {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    MissingComponent(String),

    #[error("command failed with exit code {code}: {command}")]
    CommandFailed { command: String, code: i32 },

    #[error("tests failed with exit code {code}\n\n{details}")]
    TestsFailed { code: i32, details: String },

    #[error("test report {path} is not valid JSON after repair: {source}")]
    MalformedReport {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected output from {command}: {output:?}")]
    UnexpectedOutput { command: String, output: String },

    #[error("virtual machine '{vm}' did not answer guest control after {attempts} attempts")]
    StartupTimeout { vm: String, attempts: u32 },

    #[error("unexpected state: {0} is neither a file nor a directory")]
    UnexpectedFileType(PathBuf),
}

impl DriverError {
    /// The process exit status for this failure.
    /// 此失败对应的进程退出状态。
    pub fn exit_code(&self) -> u8 {
        match self {
            DriverError::RecipeNotFound { .. } => EXIT_RECIPE_NOT_FOUND,
            DriverError::UnsupportedOperation { .. } => EXIT_UNSUPPORTED_OPERATION,
            _ => EXIT_FAILURE,
        }
    }
}

/// Picks the exit status for any error, looking through its context chain.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<DriverError>())
        .map(DriverError::exit_code)
        .unwrap_or(EXIT_FAILURE)
}
