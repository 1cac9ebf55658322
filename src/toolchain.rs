//! # Toolchain Module / 工具链模块
//!
//! Invocations of the local Rust toolchain: cargo subcommands, the
//! instrumented test and coverage pipeline, and wasm-pack.
//!
//! 本地 Rust 工具链的调用：cargo 子命令、插桩测试与覆盖率流水线，以及 wasm-pack。

pub mod cargo;
pub mod coverage;
pub mod wasm;

pub use cargo::Cargo;
pub use coverage::{TestOutcome, TestRun};
