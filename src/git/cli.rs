use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::error::{Error, Result};
use crate::git::GitClient;

/// Git client backed by the `git` binary.
///
/// Every operation runs `git -C <repo> <subcommand>...` and captures stdout.
/// Authentication, credential helpers, and user configuration are whatever
/// the ambient git installation provides.
#[derive(Debug, Default, Clone)]
pub struct CliGit;

impl CliGit {
    pub fn new() -> Self {
        CliGit
    }

    fn run(&self, repo: &Path, args: &[&str]) -> Result<Output> {
        let output = Command::new("git")
            .arg("-C")
            .arg(repo)
            .args(args)
            .output()?;
        Ok(output)
    }

    /// Run a subcommand and capture its stdout, trimmed. Non-zero exit is a
    /// command error carrying the process's stderr.
    fn capture(&self, repo: &Path, args: &[&str]) -> Result<String> {
        let output = self.run(repo, args)?;
        if !output.status.success() {
            return Err(Error::command(
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Paths with uncommitted changes to tracked files, per
    /// `git status --porcelain` (untracked files excluded).
    fn status_paths(&self, repo: &Path) -> Result<Vec<PathBuf>> {
        let stdout = self.capture(repo, &["status", "--porcelain", "--untracked-files=no"])?;
        let mut paths = Vec::new();
        for line in stdout.lines() {
            if line.len() < 4 {
                continue;
            }
            // Porcelain format: two status columns, a space, then the path.
            // Renames carry "old -> new"; the new path is the dirty one.
            let path = &line[3..];
            let path = path.rsplit(" -> ").next().unwrap_or(path);
            paths.push(PathBuf::from(path.trim_matches('"')));
        }
        Ok(paths)
    }

    fn is_dirty_excluding(&self, repo: &Path, exclude: &[&Path]) -> Result<bool> {
        let paths = self.status_paths(repo)?;
        Ok(paths
            .iter()
            .any(|p| !exclude.iter().any(|e| p.starts_with(e))))
    }
}

impl GitClient for CliGit {
    fn get_hash(
        &self,
        commit: &str,
        repo: &Path,
        pretend_clean: bool,
        exclude_dirty: &[&Path],
        abbrev: Option<u32>,
    ) -> Result<String> {
        let short;
        let mut args = vec!["rev-parse"];
        if let Some(n) = abbrev {
            short = format!("--short={}", n);
            args.push(&short);
        }
        args.push(commit);
        let mut hash = self.capture(repo, &args)?;
        if !pretend_clean && self.is_dirty_excluding(repo, exclude_dirty)? {
            hash.push_str(".dirty");
        }
        Ok(hash)
    }

    fn is_dirty(&self, repo: &Path) -> Result<bool> {
        self.is_dirty_excluding(repo, &[])
    }

    fn submodule_commit_at(&self, path: &Path, commit: &str, repo: &Path) -> Result<String> {
        let spec = format!("{}:{}", commit, path.display());
        self.capture(repo, &["rev-parse", spec.as_str()])
    }

    fn simplify_merge_commit(&self, commit: &str, repo: &Path) -> Result<String> {
        let second_parent = format!("{}^2", commit);
        let output = self.run(
            repo,
            &["rev-parse", "--verify", "--quiet", second_parent.as_str()],
        )?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }
        self.capture(repo, &["rev-parse", commit])
    }

    fn find_branches(&self, pattern: &str, repo: &Path) -> Result<Vec<String>> {
        let refs = format!("refs/remotes/{}", pattern);
        let stdout = self.capture(
            repo,
            &[
                "for-each-ref",
                "--sort=-creatordate",
                "--format=%(refname:short)",
                refs.as_str(),
            ],
        )?;
        Ok(stdout
            .lines()
            .map(str::to_string)
            .filter(|l| !l.is_empty())
            .collect())
    }

    fn merge_base(&self, a: &str, b: &str, repo: &Path) -> Result<String> {
        self.capture(repo, &["merge-base", a, b])
    }

    fn get_commit_count(&self, from: &str, to: &str, repo: &Path) -> Result<u64> {
        let range = format!("{}..{}", from, to);
        let stdout = self.capture(repo, &["rev-list", "--count", range.as_str()])?;
        stdout
            .parse::<u64>()
            .map_err(|_| Error::command(format!("rev-list --count {}", range), stdout))
    }

    fn is_ancestor_of(&self, a: &str, b: &str, repo: &Path) -> Result<bool> {
        let output = self.run(repo, &["merge-base", "--is-ancestor", a, b])?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                if stderr.contains("is a tree") {
                    return Err(Error::SubmodulePathIsTree {
                        object: b.to_string(),
                    });
                }
                Err(Error::command(
                    format!("merge-base --is-ancestor {} {}", a, b),
                    stderr,
                ))
            }
        }
    }

    fn find_change(&self, path: &Path, commit: &str, repo: &Path) -> Result<Option<String>> {
        Ok(self.find_changes(path, commit, repo, Some(1))?.pop())
    }

    fn find_changes(
        &self,
        path: &Path,
        commit: &str,
        repo: &Path,
        limit: Option<usize>,
    ) -> Result<Vec<String>> {
        let count;
        let mut args = vec!["log", "--format=%H"];
        if let Some(n) = limit {
            count = n.to_string();
            args.push("-n");
            args.push(&count);
        }
        let pathspec = format!("{}", path.display());
        args.push(commit);
        args.push("--");
        args.push(&pathspec);
        let stdout = self.capture(repo, &args)?;
        Ok(stdout
            .lines()
            .map(str::to_string)
            .filter(|l| !l.is_empty())
            .collect())
    }

    fn get_tags_of(&self, commit: &str, repo: &Path) -> Result<Vec<String>> {
        let stdout = self.capture(repo, &["tag", "--points-at", commit])?;
        Ok(stdout
            .lines()
            .map(str::to_string)
            .filter(|l| !l.is_empty())
            .collect())
    }

    fn get_working_tree(&self, cwd: &Path) -> Result<Option<PathBuf>> {
        match self.run(cwd, &["rev-parse", "--show-toplevel"]) {
            Ok(output) if output.status.success() => {
                let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
                Ok(Some(PathBuf::from(root)))
            }
            // Not a repository, or no git binary at all.
            _ => Ok(None),
        }
    }

    fn show_file(&self, path: &Path, commit: &str, repo: &Path) -> Result<String> {
        let spec = format!("{}:{}", commit, path.display());
        self.capture(repo, &["show", spec.as_str()])
    }
}
