use thiserror::Error;

/// Unified error type for buildver operations
#[derive(Error, Debug)]
pub enum Error {
    /// A git invocation exited non-zero. Carries the subcommand and the
    /// process's error output.
    #[error("git command failed: {command}: {stderr}")]
    Command { command: String, stderr: String },

    /// The object recorded at the submodule path is a tree, not a commit.
    /// Raised by the git layer when history predates the submodule-based
    /// repository layout.
    #[error("object {object} at the submodule path is a tree, not a commit")]
    SubmodulePathIsTree { object: String },

    #[error("version parsing error: {0}")]
    Version(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("usage error: {0}")]
    Usage(String),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results in buildver
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a command error from a subcommand and its stderr
    pub fn command(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Error::Command {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a version error with context
    pub fn version(msg: impl Into<String>) -> Self {
        Error::Version(msg.into())
    }

    /// Create a configuration error with context
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a usage error with context
    pub fn usage(msg: impl Into<String>) -> Self {
        Error::Usage(msg.into())
    }
}
