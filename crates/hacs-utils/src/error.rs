use std::{error::Error, fmt, path::PathBuf};

#[derive(Debug)]
pub enum PathError {
    CurrentDir { source: std::io::Error },

    Empty,

    MissingEnvVar { var: String, input: String },

    UnclosedVariable { input: String },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::Empty => write!(f, "Path is empty"),
            PathError::CurrentDir { source } => {
                write!(f, "Failed to get current directory: {source}")
            }
            PathError::UnclosedVariable { input } => {
                write!(f, "Unclosed variable expression starting at `{input}`")
            }
            PathError::MissingEnvVar { var, input } => {
                write!(f, "Environment variable `{var}` not set in `{input}`")
            }
        }
    }
}

impl Error for PathError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PathError::CurrentDir { source } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum FileSystemError {
    File {
        path: PathBuf,
        action: &'static str,
        source: std::io::Error,
    },

    Directory {
        path: PathBuf,
        action: &'static str,
        source: std::io::Error,
    },

    NotADirectory {
        path: PathBuf,
    },

    /// Target escapes every allowed root, or is one of the roots itself.
    OutsideRoot {
        path: PathBuf,
    },

    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

impl fmt::Display for FileSystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileSystemError::File {
                path,
                action,
                source,
            } => {
                write!(f, "Failed to {action} file `{}`: {source}", path.display())
            }
            FileSystemError::Directory {
                path,
                action,
                source,
            } => {
                write!(
                    f,
                    "Failed to {action} directory `{}`: {source}",
                    path.display()
                )
            }
            FileSystemError::NotADirectory { path } => {
                write!(f, "`{}` is not a directory", path.display())
            }
            FileSystemError::OutsideRoot { path } => {
                write!(
                    f,
                    "Refusing to touch `{}`: not inside a managed directory",
                    path.display()
                )
            }
            FileSystemError::Rename { from, to, source } => {
                write!(
                    f,
                    "Failed to move `{}` to `{}`: {source}",
                    from.display(),
                    to.display()
                )
            }
        }
    }
}

impl Error for FileSystemError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FileSystemError::File { source, .. } => Some(source),
            FileSystemError::Directory { source, .. } => Some(source),
            FileSystemError::Rename { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UtilsError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    FileSystem(#[from] FileSystemError),
}

pub type FileSystemResult<T> = std::result::Result<T, FileSystemError>;
pub type PathResult<T> = std::result::Result<T, PathError>;

pub type UtilsResult<T> = std::result::Result<T, UtilsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_path_error_display_and_source() {
        let io_error = io::Error::other("some error");
        let current_dir_error = PathError::CurrentDir { source: io_error };
        assert_eq!(
            current_dir_error.to_string(),
            "Failed to get current directory: some error"
        );
        assert!(current_dir_error.source().is_some());

        assert_eq!(PathError::Empty.to_string(), "Path is empty");

        let missing = PathError::MissingEnvVar {
            var: "HASS".to_string(),
            input: "$HASS/config".to_string(),
        };
        assert_eq!(
            missing.to_string(),
            "Environment variable `HASS` not set in `$HASS/config`"
        );
        assert!(missing.source().is_none());
    }

    #[test]
    fn test_file_system_error_display() {
        let err = FileSystemError::Directory {
            path: PathBuf::from("/config/custom_components/demo"),
            action: "create",
            source: io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
        };
        assert_eq!(
            err.to_string(),
            "Failed to create directory `/config/custom_components/demo`: permission denied"
        );
        assert!(err.source().is_some());

        let outside = FileSystemError::OutsideRoot {
            path: PathBuf::from("/etc"),
        };
        assert_eq!(
            outside.to_string(),
            "Refusing to touch `/etc`: not inside a managed directory"
        );
        assert!(outside.source().is_none());
    }

    #[test]
    fn test_utils_error_from() {
        let err = UtilsError::from(FileSystemError::NotADirectory {
            path: PathBuf::from("/path"),
        });
        assert_eq!(err.to_string(), "`/path` is not a directory");

        let err = UtilsError::from(PathError::Empty);
        assert_eq!(err.to_string(), "Path is empty");
    }
}
