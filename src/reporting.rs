//! # Reporting Module / 报告模块
//!
//! User-facing console output.
//!
//! 面向用户的控制台输出。

pub mod console;

pub use console::{print_error, print_test_stats};
