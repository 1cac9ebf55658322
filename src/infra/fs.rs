//! # File System Operations Module / 文件系统操作模块
//!
//! This module provides the filesystem side of recipes: modification-time
//! scans for incremental test runs, a content-aware directory merge, and
//! deletion of files or trees.
//!
//! 此模块提供配方中的文件系统操作：用于增量测试的修改时间扫描、
//! 基于内容的目录合并，以及文件或目录树的删除。

use anyhow::{Context, Result};
use colored::*;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::core::error::DriverError;
use crate::infra::t;

fn modified(path: &Path) -> Result<SystemTime> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to read modification time: {}", path.display()))
}

/// Returns the newest modification time among `dir` itself and everything
/// beneath it.
///
/// 返回 `dir` 自身及其下所有条目中最新的修改时间。
pub fn last_modification_timestamp(dir: &Path) -> Result<SystemTime> {
    let mut newest = modified(dir)?;
    for entry in WalkDir::new(dir).min_depth(1).follow_links(false) {
        let entry = entry.with_context(|| format!("Failed to scan directory: {}", dir.display()))?;
        let time = entry
            .metadata()
            .with_context(|| format!("Failed to stat: {}", entry.path().display()))?
            .modified()
            .with_context(|| format!("Failed to read modification time: {}", entry.path().display()))?;
        if time > newest {
            newest = time;
        }
    }
    Ok(newest)
}

/// The directories of a cargo project whose changes invalidate a test report.
pub const TRACKED_PROJECT_DIRS: [&str; 2] = ["src", "tests"];

/// Returns the newest modification time among the project's `Cargo.toml`
/// and its tracked source directories. Missing directories are skipped; a
/// missing manifest is an error.
///
/// 返回项目 `Cargo.toml` 及其受跟踪源码目录中最新的修改时间。
pub fn cargo_project_last_modified(project_dir: &Path) -> Result<SystemTime> {
    let mut newest = modified(&project_dir.join("Cargo.toml"))?;
    for name in TRACKED_PROJECT_DIRS {
        let dir = project_dir.join(name);
        if !dir.exists() {
            continue;
        }
        let time = last_modification_timestamp(&dir)?;
        if time > newest {
            newest = time;
        }
    }
    Ok(newest)
}

/// SHA-256 of a file's full content, hex encoded.
pub fn file_digest(path: &Path) -> Result<String> {
    let mut file =
        fs::File::open(path).with_context(|| format!("Failed to open: {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("Failed to read: {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect())
}

/// Counts of what a [`merge_tree`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub dirs_created: usize,
    pub files_copied: usize,
    pub skipped: usize,
}

/// Merges `source` into `dest`. Directories are created when missing and
/// files are copied only when their content differs from the destination.
/// Nothing in `dest` is ever removed.
///
/// 将 `source` 合并到 `dest`。缺失的目录会被创建，
/// 仅当文件内容与目标不同时才复制。`dest` 中的内容从不被删除。
pub fn merge_tree(source: &Path, dest: &Path) -> Result<MergeSummary> {
    println!(
        "{}",
        t!("fs.merge_header", source = source.display(), dest = dest.display()).blue()
    );

    if !source.is_dir() {
        anyhow::bail!(t!("fs.source_not_dir", path = source.display()).to_string());
    }
    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create directory: {}", dest.display()))?;

    let mut summary = MergeSummary::default();
    for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to scan directory: {}", source.display()))?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .with_context(|| format!("strip prefix {} from {}", source.display(), entry.path().display()))?;
        let target = dest.join(rel);

        // Symlinked directories are created but not descended into.
        if entry.file_type().is_dir() || (entry.path_is_symlink() && entry.path().is_dir()) {
            let label = format!("{}/", rel.display());
            if target.exists() {
                print_merge_line(&label, t!("fs.skip").dimmed());
                summary.skipped += 1;
            } else {
                fs::create_dir_all(&target)
                    .with_context(|| format!("Failed to create directory: {}", target.display()))?;
                print_merge_line(&label, t!("fs.created").green());
                summary.dirs_created += 1;
            }
            continue;
        }

        let label = rel.display().to_string();
        let unchanged = target.is_file() && file_digest(entry.path())? == file_digest(&target)?;
        if unchanged {
            print_merge_line(&label, t!("fs.skip").dimmed());
            summary.skipped += 1;
            continue;
        }
        fs::copy(entry.path(), &target).with_context(|| {
            format!("Failed to copy {} to {}", entry.path().display(), target.display())
        })?;
        print_merge_line(&label, t!("fs.copied").green());
        summary.files_copied += 1;
    }
    Ok(summary)
}

fn print_merge_line(label: &str, status: ColoredString) {
    println!("{label:<32}   {status}");
}

/// Deletes a file or a directory tree. A missing path is not an error.
///
/// 删除文件或目录树。路径不存在不视为错误。
pub fn delete_path(target: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(target) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to stat: {}", target.display()));
        }
    };

    if meta.is_dir() {
        fs_extra::dir::remove(target)
            .with_context(|| format!("Failed to remove directory: {}", target.display()))?;
    } else if meta.is_file() || meta.file_type().is_symlink() {
        fs::remove_file(target)
            .with_context(|| format!("Failed to remove file: {}", target.display()))?;
    } else {
        return Err(DriverError::UnexpectedFileType(target.to_path_buf()).into());
    }
    Ok(())
}

/// Resolves a recipe path against the project root. Absolute paths are kept.
pub fn resolve(root: &Path, path: impl AsRef<Path>) -> PathBuf {
    root.join(path)
}
