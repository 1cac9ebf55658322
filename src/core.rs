//! # Core Module / 核心模块
//!
//! Recipe configuration, operation dispatch, error classification and the
//! test report model.
//!
//! 配方配置、操作分派、错误分类以及测试报告模型。

pub mod config;
pub mod dispatch;
pub mod error;
pub mod report;

pub use config::{Environment, Operation, RecipeBook};
pub use dispatch::Dispatcher;
pub use error::{exit_code_for, DriverError};
