use hacs_utils::error::{FileSystemError, PathError, UtilsError};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("TOML serialization error: {0}")]
    #[diagnostic(
        code(hacs_config::toml_serialize),
        help("Check your configuration structure for invalid values")
    )]
    TomlSerError(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(hacs_config::toml_deserialize),
        help("Check your config.toml syntax and structure")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("Configuration file already exists at {0}")]
    #[diagnostic(
        code(hacs_config::already_exists),
        help("Remove the existing config file or pass a different --config path")
    )]
    ConfigAlreadyExists(String),

    #[error("Invalid duration for `{key}`: {value}")]
    #[diagnostic(
        code(hacs_config::invalid_duration),
        help("Use a non-zero compact duration such as `30m`, `10h` or `1d2h`")
    )]
    InvalidDuration { key: &'static str, value: String },

    #[error("`{0}` must be greater than zero")]
    #[diagnostic(code(hacs_config::zero_value))]
    ZeroValue(&'static str),

    #[error("Invalid country code: {0}")]
    #[diagnostic(
        code(hacs_config::invalid_country),
        help("Use `ALL` or a two letter ISO 3166 code such as `NO`")
    )]
    InvalidCountry(String),

    #[error("IO error: {0}")]
    #[diagnostic(code(hacs_config::io))]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(hacs_config::utils))]
    Utils(#[from] UtilsError),

    #[error("Failed to parse TOML: {0}")]
    #[diagnostic(code(hacs_config::toml))]
    Toml(#[from] toml_edit::TomlError),

    #[error("Encountered unexpected TOML item: {0}")]
    #[diagnostic(code(hacs_config::unexpected_toml_item))]
    UnexpectedTomlItem(String),
}

impl From<PathError> for ConfigError {
    fn from(err: PathError) -> Self {
        Self::Utils(UtilsError::Path(err))
    }
}

impl From<FileSystemError> for ConfigError {
    fn from(err: FileSystemError) -> Self {
        Self::Utils(UtilsError::FileSystem(err))
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
