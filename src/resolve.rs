//! Core version resolution pipeline.
//!
//! Resolution always succeeds for the working copy, degrading unknown
//! quantities to placeholders; resolving a specific historical commit may
//! fail when there is nothing to fall back to.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use pep440_rs::Version;
use regex::Regex;

use crate::config::{Configuration, VERSION_ENV_VAR};
use crate::error::{Error, Result};
use crate::git::GitClient;
use crate::version::{
    assemble_version, force_dev, format_pep440, local_string, parse_version, CommitCount,
    VersionParts,
};

/// Version tags look like `v1.2.0rc1`: a `v` followed by a version that does
/// not itself start with a letter.
const VERSION_TAG_PATTERN: &str = r"^v(?P<version>[^a-zA-Z][.0-9+a-zA-Z]+)";

/// How a version resolution should be performed.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Commit to resolve, or `None` for the working copy.
    pub commit: Option<String>,
    /// Build variant. May only be used when the source does not itself
    /// declare a variant; overriding a declared variant warns.
    pub variant: Option<String>,
    /// Count commits as if the commit were on the master line.
    pub pretend_master: bool,
    /// Ignore uncommitted changes when hashing.
    pub pretend_clean: bool,
    /// Directory the invocation is anchored at; defaults to the process
    /// working directory. Only consulted when `commit` is set.
    pub cwd: Option<PathBuf>,
}

/// Get the version of the code in the repositories described by `config`.
///
/// Always produces a version (possibly with placeholder segments) for the
/// working copy. Resolving a specific commit requires running from inside
/// one of the two repositories and may fail.
pub fn get_version(
    git: &dyn GitClient,
    config: &Configuration,
    opts: &ResolveOptions,
) -> Result<Version> {
    let (config, primary_commit, enterprise_commit, use_working_copy) =
        locate_commits(git, config, opts)?;

    let mut primary_commit = primary_commit.unwrap_or_else(|| "HEAD".to_string());
    let mut enterprise_commit = enterprise_commit.unwrap_or_else(|| "HEAD".to_string());

    if config.has_git {
        primary_commit = git.simplify_merge_commit(&primary_commit, &config.primary_repo_path)?;
        if let Some(enterprise) = &config.enterprise_repo_path {
            enterprise_commit = git.simplify_merge_commit(&enterprise_commit, enterprise)?;
        }
    }

    let (primary_explicit, variant) = get_explicit_version(
        git,
        &config,
        &primary_commit,
        use_working_copy,
        &config.primary_repo_path,
        opts.variant.clone(),
        false,
    )?;

    let mut enterprise_tag_version = None;
    if let Some(enterprise) = &config.enterprise_repo_path {
        if config.has_git && !git.is_dirty(enterprise)? {
            enterprise_tag_version = get_tag_version(git, &config, &enterprise_commit, enterprise)?;
        }
    }

    // Without an exact enterprise tag there is no released enterprise build
    // for this state, so the version is an in-progress one.
    let explicit_version = if primary_explicit.dev.is_some()
        || (enterprise_tag_version.is_none() && config.has_enterprise())
    {
        force_dev(&primary_explicit)?
    } else {
        primary_explicit
    };

    let pretend_clean = opts.pretend_clean || opts.pretend_master || !use_working_copy;

    let core_branch;
    let enterprise_core_branch;
    let is_merged;
    if opts.pretend_master {
        core_branch = Some(format!("{}/master", config.upstream_remote));
        enterprise_core_branch = Some(format!("{}/master", config.upstream_remote));
        is_merged = true;
    } else {
        let mut is_enterprise_merged = true;
        enterprise_core_branch = match &config.enterprise_repo_path {
            Some(enterprise) => {
                let branch = find_closest_core_branch(git, &config, &enterprise_commit, enterprise)?;
                is_enterprise_merged = match &branch {
                    Some(branch) => git.is_ancestor_of(&enterprise_commit, branch, enterprise)?,
                    None => false,
                };
                branch
            }
            None => None,
        };
        // Release branches are mirrored between the repositories, so the
        // enterprise branch is a usable baseline when the primary repository
        // has none of its own.
        core_branch = find_closest_core_branch(git, &config, &primary_commit, &config.primary_repo_path)?
            .or_else(|| enterprise_core_branch.clone());
        let is_primary_merged = match &core_branch {
            Some(branch) => git.is_ancestor_of(&primary_commit, branch, &config.primary_repo_path)?,
            None => false,
        };
        is_merged = is_enterprise_merged && is_primary_merged;
    }

    let mut parts = VersionParts {
        dev: explicit_version.dev.is_some(),
        pre: explicit_version.pre.clone(),
        post: explicit_version.post,
        variant,
        is_merged,
        ..Default::default()
    };
    let release = |i: usize| explicit_version.release.get(i).copied().unwrap_or(0) as u64;
    parts.major = release(0);
    parts.minor = release(1);
    parts.micro = release(2);

    if config.has_git {
        let last_version_commit =
            git.find_change(&config.version_file, &primary_commit, &config.primary_repo_path)?;
        parts.primary_count = Some(compute_commit_count(
            git,
            &config,
            &primary_commit,
            last_version_commit.as_deref(),
            &config.primary_repo_path,
            opts.pretend_master,
            core_branch.as_deref(),
        )?);
        parts.primary_hash = Some(git.get_hash(
            &primary_commit,
            &config.primary_repo_path,
            pretend_clean,
            &[],
            Some(6),
        )?);

        if let Some(enterprise) = &config.enterprise_repo_path {
            let enterprise_last_version_commit = match &last_version_commit {
                Some(target) => find_super_commit(
                    git,
                    target,
                    &enterprise_commit,
                    enterprise,
                    &config.primary_repo_path,
                    &config.submodule_path,
                )?,
                None => None,
            };
            parts.enterprise_count = Some(match enterprise_last_version_commit {
                Some(last) => compute_commit_count(
                    git,
                    &config,
                    &enterprise_commit,
                    Some(last.as_str()),
                    enterprise,
                    opts.pretend_master,
                    enterprise_core_branch.as_deref(),
                )?,
                None => CommitCount::Uncorrelated,
            });
            parts.enterprise_hash = Some(git.get_hash(
                &enterprise_commit,
                enterprise,
                pretend_clean,
                &[config.submodule_path.as_path()],
                Some(6),
            )?);
        }
    }

    let computed = assemble_version(&parts)?;
    if let Some(env_version) = &config.override_version {
        if env_version.release != computed.release {
            warn!(
                "{} from {} does not match the version computed from the source tree: {}",
                format_pep440(env_version),
                VERSION_ENV_VAR,
                format_pep440(&computed)
            );
        }
        return Ok(env_version.clone());
    }
    Ok(computed)
}

/// Resolve which commit to inspect in each repository, and the effective
/// configuration for the rest of the resolution.
fn locate_commits(
    git: &dyn GitClient,
    config: &Configuration,
    opts: &ResolveOptions,
) -> Result<(Configuration, Option<String>, Option<String>, bool)> {
    let Some(commit) = opts.commit.as_deref() else {
        return Ok((config.clone(), None, None, true));
    };

    let cwd = match &opts.cwd {
        Some(cwd) => cwd.clone(),
        None => std::env::current_dir()?,
    };
    let here = git.get_working_tree(&cwd)?;

    if here.as_deref() == Some(config.primary_repo_path.as_path()) {
        let primary_commit = git.get_hash(commit, &config.primary_repo_path, true, &[], None)?;
        let config = if config.has_enterprise() {
            warn!(
                "computing historic versions from a {} commit is limited; producing the \
                 primary-only build version",
                config.submodule_path.display()
            );
            config.without_enterprise()
        } else {
            config.clone()
        };
        Ok((config, Some(primary_commit), None, false))
    } else if let Some(enterprise) = config
        .enterprise_repo_path
        .as_deref()
        .filter(|enterprise| here.as_deref() == Some(*enterprise))
    {
        let primary_commit = git.submodule_commit_at(&config.submodule_path, commit, enterprise)?;
        Ok((
            config.clone(),
            Some(primary_commit),
            Some(commit.to_string()),
            false,
        ))
    } else {
        Err(Error::usage(
            "to resolve the version of a specific commit, run from inside the primary or \
             enterprise repository",
        ))
    }
}

/// Find the core branch (master, release, variant) closest to `commit`,
/// measured by how many commits `commit` is ahead of the merge-base.
///
/// Equal distances pick the lexically smallest branch name, keeping the
/// result reproducible. Returns `None` when no core branches exist, e.g. in
/// a shallow clone or without a configured remote.
pub fn find_closest_core_branch(
    git: &dyn GitClient,
    config: &Configuration,
    commit: &str,
    repo: &Path,
) -> Result<Option<String>> {
    if !config.has_git {
        return Ok(None);
    }

    let patterns = [
        format!("{}/master", config.upstream_remote),
        format!("{}/release/v*", config.upstream_remote),
        format!("{}/variant/*", config.upstream_remote),
    ];
    let mut branches = Vec::new();
    for pattern in &patterns {
        branches.extend(git.find_branches(pattern, repo)?);
    }
    if branches.is_empty() {
        return Ok(None);
    }

    let mut nearest: Option<(u64, String)> = None;
    for branch in branches {
        let base = git.merge_base(commit, &branch, repo)?;
        let ahead = git.get_commit_count(&base, commit, repo)?;
        let candidate = (ahead, branch);
        nearest = Some(match nearest {
            Some(best) if best <= candidate => best,
            _ => candidate,
        });
    }
    Ok(nearest.map(|(_, branch)| branch))
}

/// Resolve the explicitly declared version of `commit`: an exact version tag
/// when one exists, the tracked version-declaration file otherwise.
///
/// Returns the version together with the effective build variant. Unless
/// `no_dev` is set, a file-declared version is forced into its in-progress
/// (dev) form, since the declared release has not been tagged yet.
pub fn get_explicit_version(
    git: &dyn GitClient,
    config: &Configuration,
    commit: &str,
    use_working_copy: bool,
    repo: &Path,
    variant: Option<String>,
    no_dev: bool,
) -> Result<(Version, Option<String>)> {
    let explicit_version = match get_tag_version(git, config, commit, repo)? {
        Some(tag_version) => tag_version,
        None => get_config_version(
            git,
            config,
            if use_working_copy { None } else { Some(commit) },
            repo,
            no_dev,
        )?,
    };

    let repo_variant = local_string(&explicit_version);
    if let (Some(repo_variant), Some(build_variant)) = (&repo_variant, &variant) {
        if repo_variant != build_variant {
            warn!(
                "overriding the repository variant {} with the build-time variant {}",
                repo_variant, build_variant
            );
        }
    }
    let variant = variant.or(repo_variant);
    Ok((explicit_version, variant))
}

/// Read the version-declaration file at `commit`, or from the working tree
/// when `commit` is `None`.
pub fn get_config_version(
    git: &dyn GitClient,
    config: &Configuration,
    commit: Option<&str>,
    repo: &Path,
    no_dev: bool,
) -> Result<Version> {
    let version_str = match commit {
        Some(commit) => git.show_file(&config.version_file, commit, repo)?,
        None => fs::read_to_string(repo.join(&config.version_file))?,
    };
    let ver = parse_version(&version_str)?;

    if no_dev {
        return Ok(ver);
    }
    force_dev(&ver)
}

/// The version declared by a `v<version>` tag on `commit`, if any.
///
/// Multiple matching tags are ambiguous; the lexically smallest wins, with a
/// warning.
pub fn get_tag_version(
    git: &dyn GitClient,
    config: &Configuration,
    commit: &str,
    repo: &Path,
) -> Result<Option<Version>> {
    if !config.has_git || commit.is_empty() {
        return Ok(None);
    }

    let tag_re = Regex::new(VERSION_TAG_PATTERN)?;
    let mut versions: Vec<String> = git
        .get_tags_of(commit, repo)?
        .iter()
        .filter_map(|tag| {
            tag_re
                .captures(tag)
                .and_then(|captures| captures.name("version"))
                .map(|m| m.as_str().to_string())
        })
        .collect();
    versions.sort();
    if versions.len() > 1 {
        warn!(
            "there is more than one version tag at {}; picking the lexically smallest",
            commit
        );
    }
    match versions.first() {
        Some(version) => Ok(Some(parse_version(version)?)),
        None => Ok(None),
    }
}

/// Count the commits between the last version-declaration change and the
/// baseline of `commit`.
///
/// The baseline is `commit` itself under `pretend_master`, otherwise the
/// merge-base with `core_branch`. Unknown baselines degrade to the `x`
/// placeholder instead of failing.
pub fn compute_commit_count(
    git: &dyn GitClient,
    config: &Configuration,
    commit: &str,
    last_version_commit: Option<&str>,
    repo: &Path,
    pretend_master: bool,
    core_branch: Option<&str>,
) -> Result<CommitCount> {
    let Some(last_version_commit) = last_version_commit else {
        warn!(
            "no history for {} reachable from {} (replacing the commit count with 'x')",
            config.version_file.display(),
            commit
        );
        return Ok(CommitCount::Unknown);
    };

    let last_core_commit = if pretend_master {
        commit.to_string()
    } else {
        match core_branch {
            Some(branch) => git.merge_base(commit, branch, repo)?,
            None => {
                warn!(
                    "cannot determine the commit count at {} (replacing with 'x'); make sure \
                     git history on master, release, and variant branches reaches back to the \
                     last change to {}",
                    commit,
                    config.version_file.display()
                );
                return Ok(CommitCount::Unknown);
            }
        }
    };
    Ok(CommitCount::Exact(git.get_commit_count(
        last_version_commit,
        &last_core_commit,
        repo,
    )?))
}

/// Find the enterprise (super) repository commit that introduced
/// `target_sub_commit` via the submodule pointer.
///
/// Walks the history of submodule-pointer changes reachable from
/// `super_commit`, most recent first. The answer is the change just before
/// the first one whose pointer no longer contains `target_sub_commit`.
/// Returns `None` when no boundary is found — either the entire change
/// history is ahead of the target, or the target was never captured.
pub fn find_super_commit(
    git: &dyn GitClient,
    target_sub_commit: &str,
    super_commit: &str,
    super_repo: &Path,
    sub_repo: &Path,
    submodule_path: &Path,
) -> Result<Option<String>> {
    let submodule_changes = git.find_changes(submodule_path, super_commit, super_repo, None)?;

    for (i, change) in submodule_changes.iter().enumerate() {
        let submodule_commit = git.submodule_commit_at(submodule_path, change, super_repo)?;
        match git.is_ancestor_of(target_sub_commit, &submodule_commit, sub_repo) {
            Ok(true) => continue,
            Ok(false) => {
                // The previous (more recent) change still contained the
                // target, so it is the one that introduced it.
                return Ok(if i == 0 {
                    None
                } else {
                    Some(submodule_changes[i - 1].clone())
                });
            }
            Err(Error::SubmodulePathIsTree { object }) => {
                warn!(
                    "reached repository restructure commit ({}); picking {} as the version \
                     change commit, which gives approximate versions for history predating \
                     the submodule layout",
                    object, change
                );
                return Ok(Some(change.clone()));
            }
            Err(err @ Error::Command { .. }) => {
                info!(
                    "skipping unreadable submodule pointer at {} in {}: {}",
                    change,
                    super_repo.display(),
                    err
                );
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Ok(None)
}
