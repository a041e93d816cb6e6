//! Git operations abstraction layer
//!
//! This module provides a trait-based abstraction over the git operations the
//! version resolver needs, allowing for multiple implementations including
//! the real `git` binary and an in-memory implementation for testing.
//!
//! # Overview
//!
//! The primary abstraction is the [GitClient] trait. The concrete
//! implementations are:
//!
//! - [cli::CliGit]: executes `git` subcommands in a repository directory,
//!   capturing stdout and converting non-zero exits into typed errors
//! - [mock::MockGit]: deterministic in-memory commit graphs for tests
//!
//! All operations are addressed by repository path, since a single resolution
//! may span two repositories (primary and enterprise).

pub mod cli;
pub mod mock;

pub use cli::CliGit;
pub use mock::MockGit;

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Common git operation trait for abstraction
///
/// Implementations must be `Send + Sync`. Every operation that shells out
/// fails with [crate::Error::Command] carrying the process's error output
/// when the underlying invocation exits non-zero, except where a method
/// documents a more specific condition.
pub trait GitClient: Send + Sync {
    /// Resolve a commit-ish to a hash.
    ///
    /// With `abbrev`, the hash is shortened to that many characters. When the
    /// working tree has uncommitted changes outside `exclude_dirty` and
    /// `pretend_clean` is false, the hash carries a `.dirty` suffix so dirty
    /// builds remain distinguishable downstream.
    fn get_hash(
        &self,
        commit: &str,
        repo: &Path,
        pretend_clean: bool,
        exclude_dirty: &[&Path],
        abbrev: Option<u32>,
    ) -> Result<String>;

    /// Whether the working tree has uncommitted changes to tracked files.
    fn is_dirty(&self, repo: &Path) -> Result<bool>;

    /// The object recorded at `path` in `commit`'s tree — for a submodule,
    /// the commit the superproject pins it to.
    fn submodule_commit_at(&self, path: &Path, commit: &str, repo: &Path) -> Result<String>;

    /// Collapse a merge commit reference to a more stable representative
    /// commit: a commit with a second parent resolves to that parent,
    /// anything else to itself.
    fn simplify_merge_commit(&self, commit: &str, repo: &Path) -> Result<String>;

    /// Remote branches matching `pattern` (e.g. `origin/release/v*`), most
    /// recently created first.
    fn find_branches(&self, pattern: &str, repo: &Path) -> Result<Vec<String>>;

    /// The nearest common ancestor of two commits.
    fn merge_base(&self, a: &str, b: &str, repo: &Path) -> Result<String>;

    /// The number of commits reachable from `to` but not from `from`.
    fn get_commit_count(&self, from: &str, to: &str, repo: &Path) -> Result<u64>;

    /// Whether `a` is an ancestor of (or equal to) `b`.
    ///
    /// Fails with [crate::Error::SubmodulePathIsTree] when `b` names a tree
    /// object rather than a commit.
    fn is_ancestor_of(&self, a: &str, b: &str, repo: &Path) -> Result<bool>;

    /// The most recent commit reachable from `commit` that touched `path`,
    /// or `None` if no such commit exists.
    fn find_change(&self, path: &Path, commit: &str, repo: &Path) -> Result<Option<String>>;

    /// All commits reachable from `commit` that touched `path`, most recent
    /// first. `limit = None` means unbounded.
    fn find_changes(
        &self,
        path: &Path,
        commit: &str,
        repo: &Path,
        limit: Option<usize>,
    ) -> Result<Vec<String>>;

    /// Tags pointing at `commit`, in refname (lexical) order.
    fn get_tags_of(&self, commit: &str, repo: &Path) -> Result<Vec<String>>;

    /// The root of the working tree containing `cwd`, or `None` when `cwd`
    /// is not inside a repository (or git is unavailable).
    fn get_working_tree(&self, cwd: &Path) -> Result<Option<PathBuf>>;

    /// The content of the tracked file `path` as recorded at `commit`.
    fn show_file(&self, path: &Path, commit: &str, repo: &Path) -> Result<String>;
}
