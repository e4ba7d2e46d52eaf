//! Merge of generated output into the staged target branch
//!
//! Paths produced by the build are *managed*: they are written and overwrite
//! whatever the target had at the same path. Every other file in the target is
//! *externally owned* and is either preserved or removed depending on the
//! [`MergePolicy`]. The `.git` directory is never touched.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// What happens to target files the build did not produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Leave them in place
    KeepExisting,
    /// Delete them so the target mirrors the build
    Replace,
}

impl MergePolicy {
    pub fn from_keep_files(keep_files: bool) -> Self {
        if keep_files {
            MergePolicy::KeepExisting
        } else {
            MergePolicy::Replace
        }
    }
}

/// File operations needed to merge the output into the target
///
/// All paths are relative to their roots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Managed files, copied from the output
    pub write: Vec<PathBuf>,
    /// Externally owned files deleted under [`MergePolicy::Replace`]
    pub remove: Vec<PathBuf>,
    /// Externally owned files kept under [`MergePolicy::KeepExisting`]
    pub preserve: Vec<PathBuf>,
}

/// Compute the plan for merging `source` into `target`
///
/// Top-level entries of `source` named in `exclude` are not managed.
pub fn plan_sync(
    source: &Path,
    target: &Path,
    policy: MergePolicy,
    exclude: &[String],
) -> io::Result<SyncPlan> {
    let managed = list_files(source, exclude)?;
    let existing = if target.exists() {
        list_files(target, &[])?
    } else {
        BTreeSet::new()
    };

    let mut plan = SyncPlan {
        write: managed.iter().cloned().collect(),
        ..SyncPlan::default()
    };

    for path in existing.difference(&managed) {
        match policy {
            MergePolicy::KeepExisting => plan.preserve.push(path.clone()),
            MergePolicy::Replace => plan.remove.push(path.clone()),
        }
    }

    Ok(plan)
}

/// Execute a plan, returning the number of files written
pub fn apply_sync(plan: &SyncPlan, source: &Path, target: &Path) -> io::Result<usize> {
    for rel in &plan.remove {
        let path = target.join(rel);
        if path.is_file() || path.is_symlink() {
            fs::remove_file(&path)?;
        }
    }

    for rel in &plan.write {
        let dst = target.join(rel);
        clear_conflicts(target, rel)?;
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        if dst.is_dir() {
            fs::remove_dir_all(&dst)?;
        }
        fs::copy(source.join(rel), &dst)?;
    }

    Ok(plan.write.len())
}

/// Remove files sitting where a managed path needs a directory
fn clear_conflicts(target: &Path, rel: &Path) -> io::Result<()> {
    let mut current = target.to_path_buf();
    if let Some(parent) = rel.parent() {
        for component in parent.components() {
            current.push(component);
            if current.is_file() || current.is_symlink() {
                fs::remove_file(&current)?;
            }
        }
    }
    Ok(())
}

/// Regular files below `root`, relative to it, skipping `.git` and excluded top-level names
fn list_files(root: &Path, exclude: &[String]) -> io::Result<BTreeSet<PathBuf>> {
    let mut files = BTreeSet::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() != 1 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            name != ".git" && !exclude.iter().any(|e| *e == name)
        });

    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        files.insert(rel.to_path_buf());
    }

    Ok(files)
}
