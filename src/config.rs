use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use pep440_rs::Version;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::git::GitClient;
use crate::version::parse_version;

/// Name of the optional settings file, looked up at the working tree root
/// and in the user configuration directory.
pub const CONFIG_FILE_NAME: &str = "buildver.toml";

/// Environment variable supplying an externally imposed version. When set,
/// it wins over the computed version (a mismatch is warned about).
pub const VERSION_ENV_VAR: &str = "BUILDVER_VERSION";

fn default_upstream_remote() -> String {
    "origin".to_string()
}

fn default_version_file() -> PathBuf {
    PathBuf::from("config/version.txt")
}

fn default_submodule_path() -> PathBuf {
    PathBuf::from("primary")
}

/// Tunable settings loaded from `buildver.toml`.
///
/// All fields have defaults, so an absent file and an empty file behave the
/// same.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Remote whose branches anchor commit counting (`<remote>/master`,
    /// `<remote>/release/v*`, `<remote>/variant/*`).
    #[serde(default = "default_upstream_remote")]
    pub upstream_remote: String,

    /// Tracked file declaring the base version, relative to the primary
    /// repository root.
    #[serde(default = "default_version_file")]
    pub version_file: PathBuf,

    /// Path of the primary repository submodule inside the enterprise
    /// repository.
    #[serde(default = "default_submodule_path")]
    pub submodule_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            upstream_remote: default_upstream_remote(),
            version_file: default_version_file(),
            submodule_path: default_submodule_path(),
        }
    }
}

/// Loads settings from file or returns defaults.
///
/// Lookup order:
/// 1. Custom path provided as parameter
/// 2. `buildver.toml` at the working tree root
/// 3. `buildver.toml` in the user config directory
/// 4. Default settings if no file found
pub fn load_settings(config_path: Option<&str>, repo_root: Option<&Path>) -> Result<Settings> {
    let content = if let Some(path) = config_path {
        Some(fs::read_to_string(path)?)
    } else if let Some(path) = repo_root
        .map(|root| root.join(CONFIG_FILE_NAME))
        .filter(|path| path.exists())
    {
        Some(fs::read_to_string(path)?)
    } else if let Some(path) = dirs::config_dir()
        .map(|d| d.join(CONFIG_FILE_NAME))
        .filter(|p| p.exists())
    {
        Some(fs::read_to_string(path)?)
    } else {
        None
    };

    match content {
        Some(content) => toml::from_str(&content)
            .map_err(|e| Error::config(format!("invalid {}: {}", CONFIG_FILE_NAME, e))),
        None => Ok(Settings::default()),
    }
}

/// Resolved description of the repositories a version is derived from.
///
/// Built once per invocation and treated as immutable; constrained scenarios
/// derive a new value via [Configuration::without_enterprise] instead of
/// mutating fields mid-resolution.
#[derive(Debug, Clone)]
pub struct Configuration {
    /// Root of the primary repository checkout.
    pub primary_repo_path: PathBuf,
    /// Root of the enterprise repository checkout embedding the primary one,
    /// when present.
    pub enterprise_repo_path: Option<PathBuf>,
    pub upstream_remote: String,
    pub version_file: PathBuf,
    pub submodule_path: PathBuf,
    /// Whether git history is available at all.
    pub has_git: bool,
    /// Version imposed through [VERSION_ENV_VAR], if any.
    pub override_version: Option<Version>,
}

impl Configuration {
    pub fn has_enterprise(&self) -> bool {
        self.enterprise_repo_path.is_some()
    }

    /// Derive the effective configuration for a resolution that must ignore
    /// the enterprise repository.
    pub fn without_enterprise(&self) -> Configuration {
        Configuration {
            enterprise_repo_path: None,
            ..self.clone()
        }
    }

    /// Resolve the configuration for the checkout containing `cwd`.
    ///
    /// A working tree containing `<submodule_path>/<version_file>` is an
    /// enterprise checkout with the primary repository at the submodule
    /// path. Otherwise the working tree is the primary repository, and an
    /// enclosing working tree whose submodule path equals it marks an
    /// enterprise checkout around it. Without any working tree, versions are
    /// derived from the filesystem only (`has_git` is false).
    pub fn discover(
        git: &dyn GitClient,
        cwd: &Path,
        config_path: Option<&str>,
    ) -> Result<Configuration> {
        let root = git.get_working_tree(cwd)?;
        let settings = load_settings(config_path, root.as_deref())?;

        let override_version = match env::var(VERSION_ENV_VAR) {
            Ok(value) if !value.trim().is_empty() => Some(parse_version(&value)?),
            _ => None,
        };

        let (primary_repo_path, enterprise_repo_path, has_git) = match root {
            None => (cwd.to_path_buf(), None, false),
            Some(root) => {
                let embedded_primary = root.join(&settings.submodule_path);
                if embedded_primary.join(&settings.version_file).exists() {
                    (embedded_primary, Some(root), true)
                } else {
                    let enterprise = root
                        .parent()
                        .and_then(|parent| git.get_working_tree(parent).ok().flatten())
                        .filter(|sup| sup.join(&settings.submodule_path) == root);
                    (root, enterprise, true)
                }
            }
        };

        Ok(Configuration {
            primary_repo_path,
            enterprise_repo_path,
            upstream_remote: settings.upstream_remote,
            version_file: settings.version_file,
            submodule_path: settings.submodule_path,
            has_git,
            override_version,
        })
    }
}
