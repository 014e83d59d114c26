use std::{
    fs,
    path::{Component, Path},
};

use crate::error::{FileSystemError, FileSystemResult};

pub trait FileSystemProvider {
    /// Removes the specified file or directory safely.
    ///
    /// If the path does not exist, this function returns `Ok(())` without error. Directories
    /// are removed recursively.
    ///
    /// # Errors
    ///
    /// Returns a [`FileSystemError::File`] if the removal fails for any reason other than
    /// the path not existing.
    fn safe_remove<P: AsRef<Path>>(&self, path: P) -> FileSystemResult<()>;

    /// Creates a directory structure if it doesn't exist.
    ///
    /// # Errors
    ///
    /// * [`FileSystemError::Directory`] if the directory could not be created.
    /// * [`FileSystemError::NotADirectory`] if the path exists but is not a directory.
    fn ensure_dir_exists<P: AsRef<Path>>(&self, path: P) -> FileSystemResult<()>;

    /// Writes `contents` to `path`, creating missing parent directories.
    fn write_file<P: AsRef<Path>>(&self, path: P, contents: &[u8]) -> FileSystemResult<()>;

    /// Moves a fully populated `staging` directory to `target`.
    ///
    /// Whatever lives at `target` is removed first. Both paths must share a filesystem.
    fn replace_dir<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        staging: P,
        target: Q,
    ) -> FileSystemResult<()>;

    /// Like [`replace_dir`](Self::replace_dir), but carries `keep`, a path relative to
    /// `target`, over from the old directory into the new one.
    ///
    /// A staged entry at `keep` is replaced by the existing one. If the swap fails the kept
    /// entry is moved back.
    ///
    /// # Errors
    ///
    /// * [`FileSystemError::OutsideRoot`] if `keep` is absolute or climbs out of `target`.
    /// * Any error [`replace_dir`](Self::replace_dir) returns.
    fn replace_dir_keeping<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        staging: P,
        target: Q,
        keep: &Path,
    ) -> FileSystemResult<()>;
}

fn rename(from: &Path, to: &Path) -> FileSystemResult<()> {
    fs::rename(from, to).map_err(|err| FileSystemError::Rename {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source: err,
    })
}

#[derive(Default, Clone)]
pub struct StandardFileSystemProvider;

impl FileSystemProvider for StandardFileSystemProvider {
    fn safe_remove<P: AsRef<Path>>(&self, path: P) -> FileSystemResult<()> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(());
        }

        let result = if path.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };

        result.map_err(|err| FileSystemError::File {
            path: path.to_path_buf(),
            action: "remove",
            source: err,
        })
    }

    fn ensure_dir_exists<P: AsRef<Path>>(&self, path: P) -> FileSystemResult<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path).map_err(|err| FileSystemError::Directory {
                path: path.to_path_buf(),
                action: "create",
                source: err,
            })?;
        } else if !path.is_dir() {
            return Err(FileSystemError::NotADirectory {
                path: path.to_path_buf(),
            });
        }

        Ok(())
    }

    fn write_file<P: AsRef<Path>>(&self, path: P, contents: &[u8]) -> FileSystemResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            self.ensure_dir_exists(parent)?;
        }

        fs::write(path, contents).map_err(|err| FileSystemError::File {
            path: path.to_path_buf(),
            action: "write",
            source: err,
        })
    }

    fn replace_dir<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        staging: P,
        target: Q,
    ) -> FileSystemResult<()> {
        let staging = staging.as_ref();
        let target = target.as_ref();

        if !staging.is_dir() {
            return Err(FileSystemError::NotADirectory {
                path: staging.to_path_buf(),
            });
        }

        self.safe_remove(target)?;
        if let Some(parent) = target.parent() {
            self.ensure_dir_exists(parent)?;
        }

        rename(staging, target)
    }

    fn replace_dir_keeping<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        staging: P,
        target: Q,
        keep: &Path,
    ) -> FileSystemResult<()> {
        let staging = staging.as_ref();
        let target = target.as_ref();

        let nested = keep
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !nested || keep.as_os_str().is_empty() {
            return Err(FileSystemError::OutsideRoot {
                path: target.join(keep),
            });
        }
        if !staging.is_dir() {
            return Err(FileSystemError::NotADirectory {
                path: staging.to_path_buf(),
            });
        }

        let old = target.join(keep);
        if !old.exists() {
            return self.replace_dir(staging, target);
        }

        let new = staging.join(keep);
        self.safe_remove(&new)?;
        if let Some(parent) = new.parent() {
            self.ensure_dir_exists(parent)?;
        }
        rename(&old, &new)?;

        if let Err(err) = self.replace_dir(staging, target) {
            if let Some(parent) = old.parent() {
                self.ensure_dir_exists(parent).ok();
            }
            fs::rename(&new, &old).ok();
            return Err(err);
        }
        Ok(())
    }
}

/// Checks that `path` lies strictly below one of `roots`.
///
/// The check is lexical. Any `..` component in `path` is rejected outright, and a path equal
/// to a root is refused as well, so a recursive delete can never take out a whole category
/// directory.
pub fn ensure_within<P, R>(path: P, roots: &[R]) -> FileSystemResult<()>
where
    P: AsRef<Path>,
    R: AsRef<Path>,
{
    let path = path.as_ref();
    let outside = || {
        FileSystemError::OutsideRoot {
            path: path.to_path_buf(),
        }
    };

    if !path.is_absolute()
        || path
            .components()
            .any(|component| matches!(component, Component::ParentDir))
    {
        return Err(outside());
    }

    let inside = roots.iter().any(|root| {
        let root = root.as_ref();
        path != root && path.starts_with(root)
    });

    if inside {
        Ok(())
    } else {
        Err(outside())
    }
}

/// Removes the specified file or directory safely.
///
/// See [`FileSystemProvider::safe_remove`] for detailed documentation.
pub fn safe_remove<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    StandardFileSystemProvider.safe_remove(path)
}

/// Creates a directory structure if it doesn't exist.
///
/// See [`FileSystemProvider::ensure_dir_exists`] for detailed documentation.
pub fn ensure_dir_exists<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    StandardFileSystemProvider.ensure_dir_exists(path)
}

/// Writes a file, creating parent directories as needed.
pub fn write_file<P: AsRef<Path>>(path: P, contents: &[u8]) -> FileSystemResult<()> {
    StandardFileSystemProvider.write_file(path, contents)
}

/// Swaps a staging directory into place.
///
/// See [`FileSystemProvider::replace_dir`] for detailed documentation.
pub fn replace_dir<P: AsRef<Path>, Q: AsRef<Path>>(staging: P, target: Q) -> FileSystemResult<()> {
    StandardFileSystemProvider.replace_dir(staging, target)
}

/// Swaps a staging directory into place, keeping `keep` from the old directory.
///
/// See [`FileSystemProvider::replace_dir_keeping`] for detailed documentation.
pub fn replace_dir_keeping<P: AsRef<Path>, Q: AsRef<Path>>(
    staging: P,
    target: Q,
    keep: &Path,
) -> FileSystemResult<()> {
    StandardFileSystemProvider.replace_dir_keeping(staging, target, keep)
}
