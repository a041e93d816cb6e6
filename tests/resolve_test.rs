// tests/resolve_test.rs
//
// End-to-end resolution scenarios over in-memory repositories. The primary
// repository root is a real directory so working-copy reads of the version
// file go through the filesystem, as they do in production.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use buildver::config::Configuration;
use buildver::git::MockGit;
use buildver::resolve::{get_version, ResolveOptions};
use buildver::version::{format_debian, format_pep440, parse_version};
use buildver::Error;

const ENTERPRISE_ROOT: &str = "/repos/enterprise";

fn write_version_file(root: &Path, content: &str) {
    fs::create_dir_all(root.join("config")).unwrap();
    fs::write(root.join("config/version.txt"), content).unwrap();
}

fn config_for(primary: &Path, enterprise: Option<&Path>) -> Configuration {
    Configuration {
        primary_repo_path: primary.to_path_buf(),
        enterprise_repo_path: enterprise.map(Path::to_path_buf),
        upstream_remote: "origin".to_string(),
        version_file: PathBuf::from("config/version.txt"),
        submodule_path: PathBuf::from("primary"),
        has_git: true,
        override_version: None,
    }
}

/// Primary-only repository: abc000 changes the version file, five commits
/// follow, master points at the newest.
fn primary_only(git: &mut MockGit, root: &Path) {
    let repo = git.add_repo(root);
    repo.add_commit("abc000", &[]);
    for (commit, parent) in [
        ("abc001", "abc000"),
        ("abc002", "abc001"),
        ("abc003", "abc002"),
        ("abc004", "abc003"),
        ("abc005", "abc004"),
    ] {
        repo.add_commit(commit, &[parent]);
    }
    repo.add_branch("origin/master", "abc005");
    repo.record_change("config/version.txt", "abc000");
}

/// Two-repository setup: the enterprise repo pins pre000 (predating the
/// version change), then abc001, then abc003.
fn with_enterprise(git: &mut MockGit, primary_root: &Path) {
    {
        let repo = git.add_repo(primary_root);
        repo.add_commit("pre000", &[]);
        repo.add_commit("abc000", &["pre000"]);
        repo.add_commit("abc001", &["abc000"]);
        repo.add_commit("abc002", &["abc001"]);
        repo.add_commit("abc003", &["abc002"]);
        repo.add_branch("origin/master", "abc003");
        repo.record_change("config/version.txt", "abc000");
        repo.set_file_content("abc001", "config/version.txt", "1.2.0\n");
    }
    {
        let repo = git.add_repo(ENTERPRISE_ROOT);
        repo.add_commit("ent000", &[]);
        repo.add_commit("ent001", &["ent000"]);
        repo.add_commit("ent002", &["ent001"]);
        repo.add_branch("origin/master", "ent002");
        for (commit, target) in [
            ("ent000", "pre000"),
            ("ent001", "abc001"),
            ("ent002", "abc003"),
        ] {
            repo.record_change("primary", commit);
            repo.set_gitlink(commit, "primary", target);
        }
    }
}

#[test]
fn working_copy_primary_only() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_version_file(root, "1.2.0\n");
    let mut git = MockGit::new();
    primary_only(&mut git, root);
    let config = config_for(root, None);

    let version = get_version(&git, &config, &ResolveOptions::default()).unwrap();
    assert_eq!(format_pep440(&version), "1.2.0.dev+5.0.abc005");
    assert_eq!(format_debian(&version), "1.2.0~dev+5.0.abc005");
}

#[test]
fn working_copy_unmerged_branch() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_version_file(root, "1.2.0\n");
    let mut git = MockGit::new();
    primary_only(&mut git, root);
    git.add_repo(root).add_commit("feat01", &["abc003"]);
    let config = config_for(root, None);

    let version = get_version(&git, &config, &ResolveOptions::default()).unwrap();
    assert_eq!(format_pep440(&version), "1.2.0.dev+3.0.feat01.unmerged");
}

#[test]
fn working_copy_pretend_master() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_version_file(root, "1.2.0\n");
    let mut git = MockGit::new();
    primary_only(&mut git, root);
    git.add_repo(root).add_commit("feat01", &["abc003"]);
    let config = config_for(root, None);

    let opts = ResolveOptions {
        pretend_master: true,
        ..Default::default()
    };
    let version = get_version(&git, &config, &opts).unwrap();
    assert_eq!(format_pep440(&version), "1.2.0.dev+4.0.feat01");
}

#[test]
fn exactly_tagged_commit_is_a_release() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_version_file(root, "1.2.0\n");
    let mut git = MockGit::new();
    primary_only(&mut git, root);
    git.add_repo(root).add_tag("abc005", "v2.0.0rc1");
    let config = config_for(root, None);

    let version = get_version(&git, &config, &ResolveOptions::default()).unwrap();
    assert_eq!(format_pep440(&version), "2.0.0rc1");
    assert_eq!(format_debian(&version), "2.0.0~rc1");
}

#[test]
fn missing_core_branches_degrade_to_placeholder() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_version_file(root, "1.2.0\n");
    let mut git = MockGit::new();
    {
        let repo = git.add_repo(root);
        repo.add_commit("abc000", &[]);
        repo.add_commit("abc001", &["abc000"]);
        repo.record_change("config/version.txt", "abc000");
    }
    let config = config_for(root, None);

    let version = get_version(&git, &config, &ResolveOptions::default()).unwrap();
    assert_eq!(format_pep440(&version), "1.2.0.dev+x.0.abc001.unmerged");
}

#[test]
fn dirty_working_copy_marks_the_hash() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_version_file(root, "1.2.0\n");
    let mut git = MockGit::new();
    primary_only(&mut git, root);
    git.add_repo(root).set_dirty(&["src/lib.rs"]);
    let config = config_for(root, None);

    let version = get_version(&git, &config, &ResolveOptions::default()).unwrap();
    assert_eq!(format_pep440(&version), "1.2.0.dev+5.0.abc005.dirty");

    let opts = ResolveOptions {
        pretend_clean: true,
        ..Default::default()
    };
    let version = get_version(&git, &config, &opts).unwrap();
    assert_eq!(format_pep440(&version), "1.2.0.dev+5.0.abc005");
}

#[test]
fn without_git_everything_degrades_to_placeholders() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_version_file(root, "1.2.0\n");
    let git = MockGit::new();
    let mut config = config_for(root, None);
    config.has_git = false;

    let version = get_version(&git, &config, &ResolveOptions::default()).unwrap();
    assert_eq!(format_pep440(&version), "1.2.0.dev+x.0.xxxxxx.unmerged");
}

#[test]
fn variant_from_version_file_local_segment() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_version_file(root, "1.2.0+cuda\n");
    let mut git = MockGit::new();
    primary_only(&mut git, root);
    let config = config_for(root, None);

    let version = get_version(&git, &config, &ResolveOptions::default()).unwrap();
    assert_eq!(format_pep440(&version), "1.2.0.dev+cuda.5.0.abc005");
}

#[test]
fn build_variant_overrides_declared_variant() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_version_file(root, "1.2.0+cuda\n");
    let mut git = MockGit::new();
    primary_only(&mut git, root);
    let config = config_for(root, None);

    let opts = ResolveOptions {
        variant: Some("rocm".to_string()),
        ..Default::default()
    };
    let version = get_version(&git, &config, &opts).unwrap();
    assert_eq!(format_pep440(&version), "1.2.0.dev+rocm.5.0.abc005");
}

#[test]
fn enterprise_counts_and_hashes() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_version_file(root, "1.2.0\n");
    let mut git = MockGit::new();
    with_enterprise(&mut git, root);
    let config = config_for(root, Some(Path::new(ENTERPRISE_ROOT)));

    let version = get_version(&git, &config, &ResolveOptions::default()).unwrap();
    assert_eq!(format_pep440(&version), "1.2.0.dev+3.1.abc003.ent002");
}

#[test]
fn uncorrelated_enterprise_history_yields_xxx() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_version_file(root, "1.2.0\n");
    let mut git = MockGit::new();
    {
        let repo = git.add_repo(root);
        repo.add_commit("abc000", &[]);
        repo.add_branch("origin/master", "abc000");
        repo.record_change("config/version.txt", "abc000");
    }
    {
        let repo = git.add_repo(ENTERPRISE_ROOT);
        repo.add_commit("ent000", &[]);
        repo.add_branch("origin/master", "ent000");
        repo.record_change("primary", "ent000");
        repo.set_gitlink("ent000", "primary", "abc000");
    }
    let config = config_for(root, Some(Path::new(ENTERPRISE_ROOT)));

    let version = get_version(&git, &config, &ResolveOptions::default()).unwrap();
    assert_eq!(format_pep440(&version), "1.2.0.dev+0.xxx.abc000.ent000");
}

#[test]
fn historical_commit_from_enterprise_checkout() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let mut git = MockGit::new();
    with_enterprise(&mut git, root);
    let config = config_for(root, Some(Path::new(ENTERPRISE_ROOT)));

    let opts = ResolveOptions {
        commit: Some("ent001".to_string()),
        cwd: Some(PathBuf::from(ENTERPRISE_ROOT)),
        ..Default::default()
    };
    let version = get_version(&git, &config, &opts).unwrap();
    assert_eq!(format_pep440(&version), "1.2.0.dev+1.0.abc001.ent001");
}

#[test]
fn historical_commit_from_primary_drops_enterprise() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let mut git = MockGit::new();
    with_enterprise(&mut git, root);
    let config = config_for(root, Some(Path::new(ENTERPRISE_ROOT)));

    let opts = ResolveOptions {
        commit: Some("abc001".to_string()),
        cwd: Some(root.to_path_buf()),
        ..Default::default()
    };
    let version = get_version(&git, &config, &opts).unwrap();
    // Primary-only form: no enterprise count or hash in the build identifier.
    assert_eq!(format_pep440(&version), "1.2.0.dev+1.0.abc001");
}

#[test]
fn historical_commit_outside_both_repositories_fails() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_version_file(root, "1.2.0\n");
    let mut git = MockGit::new();
    primary_only(&mut git, root);
    let config = config_for(root, None);

    let opts = ResolveOptions {
        commit: Some("abc001".to_string()),
        cwd: Some(PathBuf::from("/elsewhere")),
        ..Default::default()
    };
    let err = get_version(&git, &config, &opts).unwrap_err();
    assert!(matches!(err, Error::Usage(_)));
}

#[test]
fn environment_override_wins() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_version_file(root, "1.2.0\n");
    let mut git = MockGit::new();
    primary_only(&mut git, root);
    let mut config = config_for(root, None);
    config.override_version = Some(parse_version("9.9.9").unwrap());

    let version = get_version(&git, &config, &ResolveOptions::default()).unwrap();
    assert_eq!(format_pep440(&version), "9.9.9");
}

#[test]
fn restructure_boundary_is_used_as_version_change() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_version_file(root, "1.2.0\n");
    let mut git = MockGit::new();
    {
        let repo = git.add_repo(root);
        repo.add_commit("abc000", &[]);
        repo.add_commit("abc001", &["abc000"]);
        repo.add_branch("origin/master", "abc001");
        repo.record_change("config/version.txt", "abc000");
        repo.mark_tree_object("tree01");
    }
    {
        let repo = git.add_repo(ENTERPRISE_ROOT);
        repo.add_commit("ent000", &[]);
        repo.add_commit("ent001", &["ent000"]);
        repo.add_branch("origin/master", "ent001");
        repo.record_change("primary", "ent000");
        repo.record_change("primary", "ent001");
        repo.set_gitlink("ent000", "primary", "tree01");
        repo.set_gitlink("ent001", "primary", "abc001");
    }
    let config = config_for(root, Some(Path::new(ENTERPRISE_ROOT)));

    let version = get_version(&git, &config, &ResolveOptions::default()).unwrap();
    // find_super_commit stops at the restructure commit ent000; one
    // enterprise commit lies between it and master.
    assert_eq!(format_pep440(&version), "1.2.0.dev+1.1.abc001.ent001");
}
