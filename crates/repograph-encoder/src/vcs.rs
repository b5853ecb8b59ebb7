//! Version-control boundary: list file changes for a commit range.
//!
//! Renames surface as a delete plus an add, so evolution only ever sees
//! three statuses.

use repograph_core::{RpgError, RpgResult};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
}

/// One changed file with revision contents where they exist.
#[derive(Debug, Clone)]
pub struct ChangedFile {
    pub path: PathBuf,
    pub status: ChangeStatus,
    pub old_content: Option<String>,
    pub new_content: Option<String>,
}

/// The single interface evolution consumes.
pub trait VersionControl: Send + Sync {
    fn list_changes(&self, root: &Path, range: &str) -> RpgResult<Vec<ChangedFile>>;
}

/// git2-backed implementation.
pub struct GitVersionControl;

impl GitVersionControl {
    fn tree_for<'r>(
        repo: &'r git2::Repository,
        spec: &str,
    ) -> RpgResult<git2::Tree<'r>> {
        let object = repo
            .revparse_single(spec)
            .map_err(|e| RpgError::Vcs(format!("cannot resolve {spec:?}: {e}")))?;
        let commit = object
            .peel_to_commit()
            .map_err(|e| RpgError::Vcs(format!("{spec:?} is not a commit: {e}")))?;
        commit
            .tree()
            .map_err(|e| RpgError::Vcs(format!("no tree for {spec:?}: {e}")))
    }

    fn blob_text(repo: &git2::Repository, tree: &git2::Tree<'_>, path: &Path) -> Option<String> {
        let entry = tree.get_path(path).ok()?;
        let object = entry.to_object(repo).ok()?;
        let blob = object.as_blob()?;
        if blob.is_binary() {
            return None;
        }
        String::from_utf8(blob.content().to_vec()).ok()
    }
}

impl VersionControl for GitVersionControl {
    fn list_changes(&self, root: &Path, range: &str) -> RpgResult<Vec<ChangedFile>> {
        if range.trim().is_empty() {
            return Err(RpgError::Vcs("empty commit range".into()));
        }
        let repo = git2::Repository::open(root)
            .map_err(|e| RpgError::Vcs(format!("cannot open repository: {e}")))?;

        let (old_spec, new_spec) = match range.split_once("..") {
            Some((from, to)) => (from.trim(), if to.trim().is_empty() { "HEAD" } else { to.trim() }),
            None => (range.trim(), "HEAD"),
        };
        let old_tree = Self::tree_for(&repo, old_spec)?;
        let new_tree = Self::tree_for(&repo, new_spec)?;

        let diff = repo
            .diff_tree_to_tree(Some(&old_tree), Some(&new_tree), None)
            .map_err(|e| RpgError::Vcs(format!("diff failed: {e}")))?;

        let mut changes = Vec::new();
        for delta in diff.deltas() {
            match delta.status() {
                git2::Delta::Added => {
                    if let Some(path) = delta.new_file().path() {
                        changes.push(ChangedFile {
                            path: path.to_path_buf(),
                            status: ChangeStatus::Added,
                            old_content: None,
                            new_content: Self::blob_text(&repo, &new_tree, path),
                        });
                    }
                }
                git2::Delta::Deleted => {
                    if let Some(path) = delta.old_file().path() {
                        changes.push(ChangedFile {
                            path: path.to_path_buf(),
                            status: ChangeStatus::Deleted,
                            old_content: Self::blob_text(&repo, &old_tree, path),
                            new_content: None,
                        });
                    }
                }
                git2::Delta::Modified => {
                    if let Some(path) = delta.new_file().path() {
                        changes.push(ChangedFile {
                            path: path.to_path_buf(),
                            status: ChangeStatus::Modified,
                            old_content: Self::blob_text(&repo, &old_tree, path),
                            new_content: Self::blob_text(&repo, &new_tree, path),
                        });
                    }
                }
                // Rename detection is off, so git reports delete + add
                // already; Renamed appears only defensively.
                git2::Delta::Renamed => {
                    if let Some(old_path) = delta.old_file().path() {
                        changes.push(ChangedFile {
                            path: old_path.to_path_buf(),
                            status: ChangeStatus::Deleted,
                            old_content: Self::blob_text(&repo, &old_tree, old_path),
                            new_content: None,
                        });
                    }
                    if let Some(new_path) = delta.new_file().path() {
                        changes.push(ChangedFile {
                            path: new_path.to_path_buf(),
                            status: ChangeStatus::Added,
                            old_content: None,
                            new_content: Self::blob_text(&repo, &new_tree, new_path),
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(changes)
    }
}
