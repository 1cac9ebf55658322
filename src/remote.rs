//! # Remote Module / 远程模块
//!
//! VirtualBox guest orchestration and the remote cargo build built on it.
//!
//! VirtualBox 客户机编排，以及基于它的远程 cargo 构建。

pub mod staging;
pub mod vbox;

pub use staging::remote_cargo_build;
pub use vbox::{StartupPolicy, TempKind, VirtualBoxMachine};
