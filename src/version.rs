use std::fmt;

use pep440_rs::{LocalSegment, PreRelease, Version};

use crate::error::{Error, Result};

/// Placeholder rendered when a commit hash could not be determined.
pub const UNKNOWN_HASH: &str = "xxxxxx";

/// Commit count relative to the last version-declaration change.
///
/// Counts degrade to placeholders instead of failing, so a version string can
/// always be produced for the working copy even with incomplete git history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitCount {
    /// An exact count of commits.
    Exact(u64),
    /// No core branch was found to count against. Rendered as `x`.
    Unknown,
    /// No correlated commit was found in the enterprise repository.
    /// Rendered as `xxx`.
    Uncorrelated,
}

impl fmt::Display for CommitCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitCount::Exact(n) => write!(f, "{}", n),
            CommitCount::Unknown => write!(f, "x"),
            CommitCount::Uncorrelated => write!(f, "xxx"),
        }
    }
}

/// Parse a version string into a PEP440 version value.
pub fn parse_version(s: &str) -> Result<Version> {
    s.trim()
        .parse::<Version>()
        .map_err(|e| Error::version(format!("{}: {:?}", s.trim(), e)))
}

/// Render the local segment of a version as its canonical dotted form.
pub fn local_string(ver: &Version) -> Option<String> {
    ver.local.as_ref().map(|segments| render_local(segments))
}

fn render_local(segments: &[LocalSegment]) -> String {
    segments
        .iter()
        .map(|s| match s {
            LocalSegment::String(text) => text.clone(),
            LocalSegment::Number(n) => n.to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn render_release(ver: &Version) -> String {
    ver.release
        .iter()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// Convert a version into its in-progress form by appending a bare `.dev0`
/// marker, keeping epoch, release, pre, post, and the local segment intact.
///
/// The result orders strictly below the equivalent non-dev release. There is
/// no way to set the marker on an existing version value, so the version is
/// reconstructed through its string form (the only supported construction
/// path).
pub fn force_dev(ver: &Version) -> Result<Version> {
    let mut s = String::new();
    if ver.epoch != 0 {
        s.push_str(&format!("{}!", ver.epoch));
    }
    s.push_str(&render_release(ver));
    if let Some((tag, num)) = &ver.pre {
        s.push_str(&format!("{}{}", tag, num));
    }
    if let Some(post) = ver.post {
        s.push_str(&format!(".post{}", post));
    }
    s.push_str(".dev0");
    if let Some(local) = &ver.local {
        s.push_str(&format!("+{}", render_local(local)));
    }
    parse_version(&s)
}

/// Everything that goes into an assembled buildver version.
///
/// Mirrors the resolution pipeline's outputs in a format suitable for the
/// assembler without depending on how they were computed.
#[derive(Debug, Clone, Default)]
pub struct VersionParts {
    pub major: u64,
    pub minor: u64,
    pub micro: u64,
    /// Commit count in the primary repository, `None` when git is unavailable.
    pub primary_count: Option<CommitCount>,
    /// Commit count in the enterprise repository, `None` when absent.
    pub enterprise_count: Option<CommitCount>,
    pub primary_hash: Option<String>,
    pub enterprise_hash: Option<String>,
    /// Build variant recorded in the local version segment.
    pub variant: Option<String>,
    /// Whether the version is an in-progress (dev) build.
    pub dev: bool,
    /// Pre-release tag and number, e.g. `rc1`.
    pub pre: Option<(PreRelease, usize)>,
    pub post: Option<usize>,
    /// Whether the resolved commit is an ancestor of its nearest core branch.
    pub is_merged: bool,
}

/// Assemble a version value from its parts.
///
/// The release triple, pre/post qualifiers, and dev marker are concatenated
/// into a version string; dev builds additionally carry a local
/// build-identifier segment of the form
/// `{primary_count}.{enterprise_count}.{primary_hash}.{enterprise_hash}`
/// (`{primary_count}.0.{primary_hash}` without an enterprise repository),
/// suffixed with `.unmerged` when the commit is not merged to a core branch.
/// The string is parsed back into a version value so the result is always a
/// validly ordered version.
pub fn assemble_version(parts: &VersionParts) -> Result<Version> {
    let mut s = format!("{}.{}.{}", parts.major, parts.minor, parts.micro);
    if let Some((tag, num)) = &parts.pre {
        s.push_str(&format!("{}{}", tag, num));
    }
    if let Some(post) = parts.post {
        s.push_str(&format!(".post{}", post));
    }
    if parts.dev {
        s.push_str(".dev");
    }

    let primary_count = parts
        .primary_count
        .map(|c| c.to_string())
        .unwrap_or_else(|| "x".to_string());
    let primary_hash = parts.primary_hash.as_deref().unwrap_or(UNKNOWN_HASH);
    let mut build_id = match (parts.enterprise_count, parts.enterprise_hash.as_deref()) {
        (Some(enterprise_count), Some(enterprise_hash)) => format!(
            "{}.{}.{}.{}",
            primary_count, enterprise_count, primary_hash, enterprise_hash
        ),
        _ => format!("{}.0.{}", primary_count, primary_hash),
    };
    if !parts.is_merged {
        build_id.push_str(".unmerged");
    }

    if parts.variant.is_some() || parts.dev {
        s.push('+');
        if let Some(variant) = &parts.variant {
            if variant.is_empty() {
                return Err(Error::version("build variant must not be empty"));
            }
            s.push_str(variant);
        }
        if parts.dev {
            if parts.variant.is_some() {
                s.push('.');
            }
            s.push_str(&build_id);
        }
    }

    parse_version(&s)
}

/// Render a version in PEP440 syntax.
///
/// A dev marker without a number (dev0) renders as a bare `.dev`.
pub fn format_pep440(ver: &Version) -> String {
    let mut parts = Vec::new();

    if ver.epoch != 0 {
        parts.push(format!("{}!", ver.epoch));
    }

    parts.push(render_release(ver));

    if let Some((tag, num)) = &ver.pre {
        parts.push(format!("{}{}", tag, num));
    }

    if let Some(post) = ver.post {
        parts.push(format!(".post{}", post));
    }

    if let Some(dev) = ver.dev {
        if dev == 0 {
            parts.push(".dev".to_string());
        } else {
            parts.push(format!(".dev{}", dev));
        }
    }

    if let Some(local) = &ver.local {
        parts.push(format!("+{}", render_local(local)));
    }

    parts.concat()
}

/// Render a version in Debian-native syntax.
///
/// Pre-release and dev segments are prefixed with `~`, which sorts below the
/// plain release under Debian version comparison.
pub fn format_debian(ver: &Version) -> String {
    let mut parts = Vec::new();

    if ver.epoch != 0 {
        parts.push(format!("{}:", ver.epoch));
    }

    parts.push(render_release(ver));

    if let Some((tag, num)) = &ver.pre {
        parts.push(format!("~{}{}", tag, num));
    }

    if let Some(post) = ver.post {
        parts.push(format!(".post{}", post));
    }

    if let Some(dev) = ver.dev {
        if dev == 0 {
            parts.push("~dev".to_string());
        } else {
            parts.push(format!("~dev{}", dev));
        }
    }

    if let Some(local) = &ver.local {
        parts.push(format!("+{}", render_local(local)));
    }

    parts.concat()
}
