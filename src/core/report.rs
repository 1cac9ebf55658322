//! # Test Report Module / 测试报告模块
//!
//! libtest's JSON formatter (`-Z unstable-options --format json`) writes one
//! JSON object per line, without an enclosing array. This module turns that
//! stream into a well-formed JSON array and derives statistics and failure
//! details from the records.
//!
//! libtest 的 JSON 格式化器每行输出一个 JSON 对象，没有外层数组。
//! 此模块将该流修复为合法的 JSON 数组，并从记录中推导统计信息和失败详情。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::core::error::DriverError;

/// Turns a raw libtest event stream into a JSON array.
///
/// The stream must be *single-line-closed*: every record's closing `}` ends
/// a line. libtest's JSON output satisfies this because each event is
/// printed as one line. Pretty-printed multi-line JSON does not, and is
/// outside this function's contract.
///
/// 将原始 libtest 事件流转换为 JSON 数组。
/// 前置条件：每条记录的结束 `}` 位于行尾。
pub fn repair_stream(raw: &str) -> String {
    let mut body = String::with_capacity(raw.len() + raw.len() / 16 + 2);
    for line in raw.split_inclusive('\n') {
        let (content, eol) = if let Some(content) = line.strip_suffix("\r\n") {
            (content, "\r\n")
        } else if let Some(content) = line.strip_suffix('\n') {
            (content, "\n")
        } else {
            (line, "")
        };
        body.push_str(content);
        if content.ends_with('}') {
            body.push(',');
        }
        body.push_str(eol);
    }

    let trimmed = body.trim_end();
    let trimmed = trimmed.strip_suffix(',').unwrap_or(trimmed).trim_end();

    let mut repaired = String::with_capacity(trimmed.len() + 2);
    repaired.push('[');
    repaired.push_str(trimmed);
    repaired.push(']');
    repaired
}

/// The `type` field of a libtest record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Suite,
    Test,
    Bench,
    #[serde(other)]
    Other,
}

/// The `event` field of a libtest record. Bench results carry no event
/// and read as `Other`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordEvent {
    Started,
    Ok,
    Failed,
    Ignored,
    Timeout,
    #[default]
    #[serde(other)]
    Other,
}

/// One event emitted by the test harness.
/// Only the fields the driver reads are modelled; the rest are ignored.
///
/// 测试框架发出的单个事件。
/// 仅对驱动程序读取的字段建模，其余字段被忽略。
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TestRecord {
    #[serde(rename = "type")]
    pub kind: RecordKind,
    #[serde(default)]
    pub event: RecordEvent,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub test_count: Option<u64>,
    #[serde(default)]
    pub passed: Option<u64>,
    #[serde(default)]
    pub failed: Option<u64>,
    #[serde(default)]
    pub allowed_fail: Option<u64>,
    #[serde(default)]
    pub ignored: Option<u64>,
    #[serde(default)]
    pub exec_time: Option<f64>,
}

/// Aggregate counters over every suite in a report.
/// 报告中所有测试套件的汇总计数。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub test_count: u64,
    pub passed: u64,
    pub failed: u64,
    pub allowed_fail: u64,
    pub ignored: u64,
    /// Seconds.
    pub exec_time: f64,
}

/// A failed test together with the output it captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFailure {
    pub name: String,
    pub stdout: String,
}

/// Read-only view over the records of one test run.
/// 单次测试运行记录的只读视图。
#[derive(Debug, Clone)]
pub struct TestReport {
    records: Vec<TestRecord>,
}

impl TestReport {
    pub fn new(records: Vec<TestRecord>) -> Self {
        Self { records }
    }

    /// Parses an already repaired JSON array.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json).map(Self::new)
    }

    /// Reads a repaired report file. A file that does not parse is fatal.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read test report: {}", path.display()))?;
        Self::from_json(&json).map_err(|source| {
            DriverError::MalformedReport {
                path: path.to_path_buf(),
                source,
            }
            .into()
        })
    }

    pub fn records(&self) -> &[TestRecord] {
        &self.records
    }

    /// Folds the suite records into totals. Multiple suites accumulate.
    ///
    /// 将套件记录折叠为总计。多个套件的数据会累加。
    pub fn stats(&self) -> Stats {
        let mut stats = Stats::default();
        for record in self.records.iter().filter(|r| r.kind == RecordKind::Suite) {
            match record.event {
                RecordEvent::Started => stats.test_count += record.test_count.unwrap_or(0),
                RecordEvent::Ok => {
                    stats.passed += record.passed.unwrap_or(0);
                    stats.failed += record.failed.unwrap_or(0);
                    stats.allowed_fail += record.allowed_fail.unwrap_or(0);
                    stats.ignored += record.ignored.unwrap_or(0);
                    stats.exec_time += record.exec_time.unwrap_or(0.0);
                }
                _ => {}
            }
        }
        stats
    }

    /// Every failed test record, in the order the harness reported them.
    ///
    /// 按测试框架报告的顺序返回所有失败的测试记录。
    pub fn fails(&self) -> Vec<TestFailure> {
        self.records
            .iter()
            .filter(|r| r.kind == RecordKind::Test && r.event == RecordEvent::Failed)
            .map(|r| TestFailure {
                name: r.name.clone().unwrap_or_default(),
                stdout: r.stdout.clone().unwrap_or_default(),
            })
            .collect()
    }
}

/// Renders failures as `name:` followed by the captured output indented by
/// four spaces.
pub fn format_failures(fails: &[TestFailure]) -> String {
    let mut lines = Vec::with_capacity(fails.len() * 2);
    for failure in fails {
        lines.push(format!("{}:", failure.name));
        lines.push(indent(&failure.stdout, "    "));
    }
    lines.join("\n")
}

fn indent(text: &str, prefix: &str) -> String {
    text.split('\n')
        .map(|line| format!("{prefix}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
