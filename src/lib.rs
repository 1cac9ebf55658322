//! # Recipe Runner Library / Recipe Runner 库
//!
//! A build driver that runs named recipes from `build.json`: ordered lists
//! of cargo, coverage, wasm-pack, filesystem, shell and VirtualBox
//! operations.
//!
//! 一个构建驱动程序，运行 `build.json` 中的命名配方：
//! 由 cargo、覆盖率、wasm-pack、文件系统、shell 和 VirtualBox 操作组成的有序列表。
//!
//! ## Modules / 模块
//!
//! - `core` - Recipe model, dispatch, errors and test reports
//! - `infra` - Command execution and filesystem operations
//! - `toolchain` - cargo, coverage and wasm-pack invocations
//! - `remote` - VirtualBox guests and remote builds
//! - `reporting` - Console output
//! - `cli` - Command-line interface
//!
//! - `core` - 配方模型、分派、错误和测试报告
//! - `infra` - 命令执行和文件系统操作
//! - `toolchain` - cargo、覆盖率和 wasm-pack 调用
//! - `remote` - VirtualBox 客户机和远程构建
//! - `reporting` - 控制台输出
//! - `cli` - 命令行接口

pub mod cli;
pub mod core;
pub mod infra;
pub mod remote;
pub mod reporting;
pub mod toolchain;

pub use crate::core::config;
pub use crate::core::error;

/// Picks the UI language: an explicit request first, then the system
/// locale, then English. Both full tags ("ja-JP") and bare language codes
/// ("ja") are matched against the bundled locales.
///
/// 选择界面语言：优先使用显式指定的语言，其次是系统区域设置，最后回退到英语。
pub fn init(requested: Option<&str>) {
    let locale = requested
        .map(str::to_string)
        .or_else(sys_locale::get_locale)
        .unwrap_or_else(|| "en".to_string());
    rust_i18n::set_locale(resolve_locale(&locale));
}

fn resolve_locale(locale: &str) -> &'static str {
    let available = rust_i18n::available_locales!();
    let pick = |tag: &str| available.iter().copied().find(|l| *l == tag);
    pick(locale)
        .or_else(|| locale.split(['-', '_']).next().and_then(pick))
        .unwrap_or("en")
}

// Initialize i18n
rust_i18n::i18n!("locales", fallback = "en");
