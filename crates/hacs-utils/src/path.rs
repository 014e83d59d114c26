use std::{env, path::PathBuf};

use crate::error::{PathError, PathResult};

/// Resolves user supplied path strings.
pub trait PathResolver {
    /// Resolves a path string to an absolute [`PathBuf`].
    ///
    /// Handles a leading `~`, `$VAR` and `${VAR}` expansion. Relative results are joined onto
    /// the current directory.
    ///
    /// # Errors
    ///
    /// * [`PathError::Empty`] if the input is blank.
    /// * [`PathError::MissingEnvVar`] if a referenced variable is unset.
    /// * [`PathError::UnclosedVariable`] on `${VAR` without a closing brace.
    /// * [`PathError::CurrentDir`] if the current directory cannot be read.
    ///
    /// # Example
    ///
    /// ```
    /// use hacs_utils::path::{PathResolver, SystemPathResolver};
    ///
    /// let resolver = SystemPathResolver;
    /// let path = resolver.resolve_path("~/homeassistant").unwrap();
    /// assert!(path.is_absolute());
    /// ```
    fn resolve_path(&self, path: &str) -> PathResult<PathBuf>;

    /// Returns the user's home directory.
    fn home_dir(&self) -> PathBuf;

    /// `$XDG_CONFIG_HOME`, or `$HOME/.config`.
    fn xdg_config_home(&self) -> PathBuf;

    /// `$XDG_DATA_HOME`, or `$HOME/.local/share`.
    fn xdg_data_home(&self) -> PathBuf;
}

/// The default [`PathResolver`] implementation using environment variables.
pub struct SystemPathResolver;

impl PathResolver for SystemPathResolver {
    fn resolve_path(&self, path: &str) -> PathResult<PathBuf> {
        let path = path.trim();

        if path.is_empty() {
            return Err(PathError::Empty);
        }

        let resolved = self.expand_variables(path)?;
        let path_buf = PathBuf::from(resolved);

        if path_buf.is_absolute() {
            Ok(path_buf)
        } else {
            env::current_dir()
                .map(|cwd| cwd.join(path_buf))
                .map_err(|err| PathError::CurrentDir { source: err })
        }
    }

    fn home_dir(&self) -> PathBuf {
        env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| {
            let user = env::var("USER").unwrap_or_else(|_| "root".into());
            PathBuf::from(format!("/home/{user}"))
        })
    }

    fn xdg_config_home(&self) -> PathBuf {
        env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| self.home_dir().join(".config"))
    }

    fn xdg_data_home(&self) -> PathBuf {
        env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| self.home_dir().join(".local/share"))
    }
}

impl SystemPathResolver {
    fn expand_variables(&self, path: &str) -> PathResult<String> {
        let mut result = String::with_capacity(path.len());
        let mut chars = path.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '$' if chars.peek() == Some(&'{') => {
                    chars.next();
                    let mut var_name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        var_name.push(c);
                    }
                    if !closed {
                        return Err(PathError::UnclosedVariable {
                            input: format!("${{{var_name}"),
                        });
                    }
                    result.push_str(&self.lookup(&var_name, path)?);
                }
                '$' => {
                    let mut var_name = String::new();
                    while let Some(&c) = chars.peek() {
                        if !(c.is_alphanumeric() || c == '_') {
                            break;
                        }
                        var_name.push(c);
                        chars.next();
                    }
                    if var_name.is_empty() {
                        result.push('$');
                    } else {
                        result.push_str(&self.lookup(&var_name, path)?);
                    }
                }
                '~' if result.is_empty() => result.push_str(&self.home_dir().to_string_lossy()),
                _ => result.push(c),
            }
        }

        Ok(result)
    }

    fn lookup(&self, var_name: &str, original: &str) -> PathResult<String> {
        let value = match var_name {
            "HOME" => self.home_dir(),
            "XDG_CONFIG_HOME" => self.xdg_config_home(),
            "XDG_DATA_HOME" => self.xdg_data_home(),
            _ => {
                return env::var(var_name).map_err(|_| {
                    PathError::MissingEnvVar {
                        input: original.into(),
                        var: var_name.into(),
                    }
                })
            }
        };
        Ok(value.to_string_lossy().into_owned())
    }
}

/// Resolves a path string using the system path resolver.
///
/// See [`PathResolver::resolve_path`] for detailed documentation.
pub fn resolve_path(path: &str) -> PathResult<PathBuf> {
    SystemPathResolver.resolve_path(path)
}

pub fn home_dir() -> PathBuf {
    SystemPathResolver.home_dir()
}

pub fn xdg_config_home() -> PathBuf {
    SystemPathResolver.xdg_config_home()
}

pub fn xdg_data_home() -> PathBuf {
    SystemPathResolver.xdg_data_home()
}
