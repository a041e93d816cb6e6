use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::git::GitClient;

/// In-memory model of a single repository for [MockGit].
///
/// Commits are added oldest first; insertion order doubles as commit time for
/// merge-base selection and most-recent-first orderings.
#[derive(Debug, Default)]
pub struct MockRepo {
    head: String,
    seq: HashMap<String, usize>,
    parents: HashMap<String, Vec<String>>,
    branches: Vec<(String, String)>,
    tags: HashMap<String, Vec<String>>,
    file_log: HashMap<PathBuf, Vec<String>>,
    file_contents: HashMap<(String, PathBuf), String>,
    gitlinks: HashMap<(String, PathBuf), String>,
    tree_objects: HashSet<String>,
    dirty_paths: Vec<PathBuf>,
    next_seq: usize,
}

impl MockRepo {
    /// Add a commit with the given parents. HEAD follows the latest commit
    /// unless overridden with [MockRepo::set_head].
    pub fn add_commit(&mut self, hash: &str, parents: &[&str]) -> &mut Self {
        self.seq.insert(hash.to_string(), self.next_seq);
        self.next_seq += 1;
        self.parents
            .insert(hash.to_string(), parents.iter().map(|p| p.to_string()).collect());
        self.head = hash.to_string();
        self
    }

    pub fn set_head(&mut self, hash: &str) -> &mut Self {
        self.head = hash.to_string();
        self
    }

    /// Register a branch; branches are reported most recently added first.
    pub fn add_branch(&mut self, name: &str, tip: &str) -> &mut Self {
        self.branches.push((name.to_string(), tip.to_string()));
        self
    }

    pub fn add_tag(&mut self, commit: &str, tag: &str) -> &mut Self {
        self.tags
            .entry(commit.to_string())
            .or_default()
            .push(tag.to_string());
        self
    }

    /// Record that `commit` touched `path`.
    pub fn record_change(&mut self, path: impl AsRef<Path>, commit: &str) -> &mut Self {
        self.file_log
            .entry(path.as_ref().to_path_buf())
            .or_default()
            .push(commit.to_string());
        self
    }

    /// Set the content of `path` as recorded at `commit`.
    pub fn set_file_content(
        &mut self,
        commit: &str,
        path: impl AsRef<Path>,
        content: &str,
    ) -> &mut Self {
        self.file_contents
            .insert((commit.to_string(), path.as_ref().to_path_buf()), content.to_string());
        self
    }

    /// Pin the submodule at `path` to `target` as of `super_commit`.
    pub fn set_gitlink(
        &mut self,
        super_commit: &str,
        path: impl AsRef<Path>,
        target: &str,
    ) -> &mut Self {
        self.gitlinks
            .insert((super_commit.to_string(), path.as_ref().to_path_buf()), target.to_string());
        self
    }

    /// Mark an object as a tree; ancestry tests against it fail the way git
    /// fails on pre-submodule history.
    pub fn mark_tree_object(&mut self, object: &str) -> &mut Self {
        self.tree_objects.insert(object.to_string());
        self
    }

    pub fn set_dirty(&mut self, paths: &[&str]) -> &mut Self {
        self.dirty_paths = paths.iter().map(PathBuf::from).collect();
        self
    }

    fn resolve(&self, commit: &str) -> Result<String> {
        if commit == "HEAD" {
            if self.head.is_empty() {
                return Err(Error::command("rev-parse HEAD", "unknown revision"));
            }
            return Ok(self.head.clone());
        }
        if let Some((_, tip)) = self.branches.iter().find(|(name, _)| name == commit) {
            return Ok(tip.clone());
        }
        if self.seq.contains_key(commit) {
            return Ok(commit.to_string());
        }
        Err(Error::command(
            format!("rev-parse {}", commit),
            format!("unknown revision or path not in the working tree: {}", commit),
        ))
    }

    /// All commits reachable from `hash`, including `hash` itself.
    fn ancestors(&self, hash: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut stack = vec![hash.to_string()];
        while let Some(commit) = stack.pop() {
            if seen.insert(commit.clone()) {
                if let Some(parents) = self.parents.get(&commit) {
                    stack.extend(parents.iter().cloned());
                }
            }
        }
        seen
    }
}

/// Mock git client holding any number of repositories, for testing the
/// resolution pipeline without a git binary.
#[derive(Debug, Default)]
pub struct MockGit {
    repos: HashMap<PathBuf, MockRepo>,
}

impl MockGit {
    pub fn new() -> Self {
        MockGit::default()
    }

    /// Register (or fetch) the repository rooted at `path`.
    pub fn add_repo(&mut self, path: impl Into<PathBuf>) -> &mut MockRepo {
        self.repos.entry(path.into()).or_default()
    }

    fn repo(&self, path: &Path) -> Result<&MockRepo> {
        self.repos.get(path).ok_or_else(|| {
            Error::command(
                format!("-C {}", path.display()),
                "not a git repository".to_string(),
            )
        })
    }
}

/// Literal glob match where `*` matches any run of characters, including `/`.
fn glob_match(pattern: &str, name: &str) -> bool {
    fn matches(pattern: &[char], name: &[char]) -> bool {
        match pattern.first() {
            None => name.is_empty(),
            Some('*') => {
                matches(&pattern[1..], name)
                    || (!name.is_empty() && matches(pattern, &name[1..]))
            }
            Some(c) => name.first() == Some(c) && matches(&pattern[1..], &name[1..]),
        }
    }
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    matches(&pattern, &name)
}

impl GitClient for MockGit {
    fn get_hash(
        &self,
        commit: &str,
        repo: &Path,
        pretend_clean: bool,
        exclude_dirty: &[&Path],
        abbrev: Option<u32>,
    ) -> Result<String> {
        let repo = self.repo(repo)?;
        let mut hash = repo.resolve(commit)?;
        if let Some(n) = abbrev {
            hash.truncate(n as usize);
        }
        let dirty = repo
            .dirty_paths
            .iter()
            .any(|p| !exclude_dirty.iter().any(|e| p.starts_with(e)));
        if !pretend_clean && dirty {
            hash.push_str(".dirty");
        }
        Ok(hash)
    }

    fn is_dirty(&self, repo: &Path) -> Result<bool> {
        Ok(!self.repo(repo)?.dirty_paths.is_empty())
    }

    fn submodule_commit_at(&self, path: &Path, commit: &str, repo: &Path) -> Result<String> {
        let repo = self.repo(repo)?;
        let commit = repo.resolve(commit)?;
        repo.gitlinks
            .get(&(commit.clone(), path.to_path_buf()))
            .cloned()
            .ok_or_else(|| {
                Error::command(
                    format!("rev-parse {}:{}", commit, path.display()),
                    format!("path '{}' does not exist in '{}'", path.display(), commit),
                )
            })
    }

    fn simplify_merge_commit(&self, commit: &str, repo: &Path) -> Result<String> {
        let repo = self.repo(repo)?;
        let resolved = repo.resolve(commit)?;
        match repo.parents.get(&resolved) {
            Some(parents) if parents.len() >= 2 => Ok(parents[1].clone()),
            _ => Ok(resolved),
        }
    }

    fn find_branches(&self, pattern: &str, repo: &Path) -> Result<Vec<String>> {
        let repo = self.repo(repo)?;
        Ok(repo
            .branches
            .iter()
            .rev()
            .filter(|(name, _)| glob_match(pattern, name))
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn merge_base(&self, a: &str, b: &str, repo: &Path) -> Result<String> {
        let repo = self.repo(repo)?;
        let a = repo.resolve(a)?;
        let b = repo.resolve(b)?;
        let ancestors_a = repo.ancestors(&a);
        let base = repo
            .ancestors(&b)
            .into_iter()
            .filter(|c| ancestors_a.contains(c))
            .max_by_key(|c| repo.seq.get(c).copied().unwrap_or(0));
        base.ok_or_else(|| Error::command(format!("merge-base {} {}", a, b), "no merge base"))
    }

    fn get_commit_count(&self, from: &str, to: &str, repo: &Path) -> Result<u64> {
        let repo = self.repo(repo)?;
        let from = repo.resolve(from)?;
        let to = repo.resolve(to)?;
        let excluded = repo.ancestors(&from);
        let count = repo
            .ancestors(&to)
            .iter()
            .filter(|c| !excluded.contains(*c))
            .count();
        Ok(count as u64)
    }

    fn is_ancestor_of(&self, a: &str, b: &str, repo: &Path) -> Result<bool> {
        let repo = self.repo(repo)?;
        if repo.tree_objects.contains(b) {
            return Err(Error::SubmodulePathIsTree {
                object: b.to_string(),
            });
        }
        let a = repo.resolve(a)?;
        let b = repo.resolve(b)?;
        Ok(repo.ancestors(&b).contains(&a))
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
        let repo = self.repo(repo)?;
        let commit = repo.resolve(commit)?;
        let reachable = repo.ancestors(&commit);
        let mut changes: Vec<String> = repo
            .file_log
            .get(path)
            .map(|commits| {
                commits
                    .iter()
                    .filter(|c| reachable.contains(*c))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        changes.sort_by_key(|c| std::cmp::Reverse(repo.seq.get(c).copied().unwrap_or(0)));
        if let Some(n) = limit {
            changes.truncate(n);
        }
        Ok(changes)
    }

    fn get_tags_of(&self, commit: &str, repo: &Path) -> Result<Vec<String>> {
        let repo = self.repo(repo)?;
        let commit = repo.resolve(commit)?;
        let mut tags = repo.tags.get(&commit).cloned().unwrap_or_default();
        tags.sort();
        Ok(tags)
    }

    fn get_working_tree(&self, cwd: &Path) -> Result<Option<PathBuf>> {
        Ok(self
            .repos
            .keys()
            .filter(|root| cwd.starts_with(root))
            .max_by_key(|root| root.components().count())
            .cloned())
    }

    fn show_file(&self, path: &Path, commit: &str, repo: &Path) -> Result<String> {
        let repo = self.repo(repo)?;
        let commit = repo.resolve(commit)?;
        repo.file_contents
            .get(&(commit.clone(), path.to_path_buf()))
            .cloned()
            .ok_or_else(|| {
                Error::command(
                    format!("show {}:{}", commit, path.display()),
                    format!("path '{}' does not exist in '{}'", path.display(), commit),
                )
            })
    }
}
