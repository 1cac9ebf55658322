//! # Infrastructure Module / 基础设施模块
//!
//! Process spawning and filesystem helpers shared by every operation.
//!
//! 所有操作共享的进程启动与文件系统辅助功能。

pub mod command;
pub mod fs;

// Re-export i18n functions for easier access
pub use rust_i18n::t;
