//! Error types for hacs-core.

use hacs_config::error::ConfigError;
use hacs_github::ClientError;
use hacs_utils::error::{FileSystemError, PathError};
use miette::Diagnostic;
use thiserror::Error;

/// Core error type for store operations.
#[derive(Error, Diagnostic, Debug)]
pub enum HacsError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(
        code(hacs::filesystem),
        help("Check permissions on the Home Assistant configuration directory")
    )]
    FileSystem(#[from] FileSystemError),

    #[error(transparent)]
    #[diagnostic(code(hacs::path))]
    Path(#[from] PathError),

    #[error("Error while {action}")]
    #[diagnostic(code(hacs::io), help("Check file permissions and disk space"))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON: {0}")]
    #[diagnostic(code(hacs::json))]
    Json(#[from] serde_json::Error),

    #[error("Rate limited by GitHub")]
    #[diagnostic(
        code(hacs::rate_limited),
        help("Set a GitHub token in the config file or wait for the limit to reset")
    )]
    RateLimited { reset_at: Option<u64> },

    #[error("Network error: {0}")]
    #[diagnostic(
        code(hacs::network),
        help("Check your internet connection and try again")
    )]
    Network(String),

    #[error("Repository '{0}' is not reachable upstream")]
    #[diagnostic(
        code(hacs::unreachable),
        help("The repository may have been deleted, renamed or made private")
    )]
    Unreachable(String),

    #[error("Repository '{0}' not found")]
    #[diagnostic(
        code(hacs::not_found),
        help("Run 'hacs list --all' to see tracked repositories")
    )]
    NotFound(String),

    #[error("Repository '{0}' is already tracked")]
    #[diagnostic(code(hacs::duplicate))]
    DuplicateRepository(String),

    #[error("Repository '{0}' is installed and cannot be removed")]
    #[diagnostic(code(hacs::installed), help("Uninstall it first"))]
    CannotRemoveInstalled(String),

    #[error("Repository '{0}' is not installed")]
    #[diagnostic(code(hacs::not_installed))]
    NotInstalled(String),

    #[error("Another operation is running for '{0}'")]
    #[diagnostic(code(hacs::busy), help("Wait for it to finish and try again"))]
    OperationInProgress(String),

    #[error("Repository '{full_name}' failed validation: {reason}")]
    #[diagnostic(code(hacs::validation))]
    Validation { full_name: String, reason: String },

    #[error("Version '{tag}' is not available for '{full_name}'")]
    #[diagnostic(
        code(hacs::invalid_version),
        help("Pick one of the listed releases or the default branch")
    )]
    InvalidVersion { full_name: String, tag: String },

    #[error("Invalid repository name: {0}")]
    #[diagnostic(
        code(hacs::invalid_name),
        help("Use owner/name or https://github.com/owner/name")
    )]
    InvalidRepositoryName(String),

    #[error("Repository '{0}' is not a custom repository")]
    #[diagnostic(code(hacs::not_custom))]
    NotCustom(String),

    #[error("Unsupported storage schema version {0}")]
    #[diagnostic(
        code(hacs::schema),
        help("The storage file was written by a newer release")
    )]
    UnsupportedSchema(u32),

    #[error("Thread lock poison error")]
    #[diagnostic(
        code(hacs::poison),
        help("This is an internal error, please report it")
    )]
    PoisonError,

    #[error("{0}")]
    #[diagnostic(code(hacs::error))]
    Custom(String),
}

impl HacsError {
    /// Network and rate limit failures are retried by the scheduler.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited { .. })
    }
}

impl From<ClientError> for HacsError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::RateLimited { reset_at } => Self::RateLimited { reset_at },
            ClientError::NotFound(what) => Self::Unreachable(what),
            ClientError::Network(msg) => Self::Network(msg),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for HacsError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::PoisonError
    }
}

/// Trait for adding context to IO errors.
pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, HacsError>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, HacsError>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            HacsError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}
