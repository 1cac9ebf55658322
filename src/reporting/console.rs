//! # Console Reporting Module / 控制台报告模块
//!
//! Colored, localized lines for recipe progress and test results.
//!
//! 用于配方进度和测试结果的彩色本地化输出。

use colored::*;

use crate::core::report::Stats;
use crate::infra::t;

/// `<n> tests, <p> passed, <f> failed, <a> allowed_fail, <i> ignored.`
pub fn summary_line(stats: &Stats) -> String {
    t!(
        "report.summary",
        count = stats.test_count,
        passed = stats.passed,
        failed = stats.failed,
        allowed_fail = stats.allowed_fail,
        ignored = stats.ignored
    )
    .to_string()
}

/// `total time <seconds> s.` with millisecond precision.
pub fn total_time_line(stats: &Stats) -> String {
    t!("report.total_time", time = format!("{:.3}", stats.exec_time)).to_string()
}

/// Prints the summary of a passing test run.
/// 打印通过的测试运行摘要。
pub fn print_test_stats(stats: &Stats) {
    let summary = summary_line(stats);
    if stats.failed > 0 {
        println!("{}", summary.yellow());
    } else {
        println!("{}", summary.green());
    }
    println!("{}", total_time_line(stats));
}

/// Prints the header of one recipe step, e.g. `[2/5] cargo-test`.
pub fn print_step(index: usize, total: usize, kind: &str) {
    println!(
        "\n{}",
        t!("dispatch.step", index = index, total = total, op = kind).bold()
    );
}

pub fn print_recipe_finished(name: &str) {
    println!("\n{}", t!("dispatch.finished", recipe = name).green().bold());
}

/// Prints a failure to stderr, including its `anyhow` context chain.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {err:#}", t!("error_prefix").red().bold());
}

/// Prints the recipe names of a recipe book, one per line.
pub fn print_recipe_names<'a>(names: impl Iterator<Item = &'a str>) {
    println!("{}", t!("dispatch.available").bold());
    for name in names {
        println!("  - {}", name.cyan());
    }
}
