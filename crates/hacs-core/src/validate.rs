//! Structural validation and content location per category.
//!
//! A repository validates when the content its category needs exists in the tree at the ref
//! being resolved. The same lookup decides which files an install fetches.

use serde::Deserialize;

use crate::{
    error::HacsError,
    model::{Category, RepositoryManifest},
    HacsResult,
};

/// Where a repository's content lives upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLayout {
    /// Directory relative to the repository root, empty for the root itself.
    pub remote_path: String,
    /// Fetch only this file instead of the directory.
    pub single_file: Option<String>,
    /// Path of the integration `manifest.json`.
    pub manifest_path: Option<String>,
}

impl ContentLayout {
    fn dir(remote_path: impl Into<String>) -> Self {
        Self {
            remote_path: remote_path.into(),
            single_file: None,
            manifest_path: None,
        }
    }
}

/// The fields of an integration `manifest.json` the store reads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IntegrationManifest {
    pub domain: String,
    #[serde(default)]
    pub name: Option<String>,
}

pub fn parse_integration_manifest(full_name: &str, bytes: &[u8]) -> HacsResult<IntegrationManifest> {
    let manifest: IntegrationManifest = serde_json::from_slice(bytes).map_err(|err| {
        HacsError::Validation {
            full_name: full_name.to_string(),
            reason: format!("invalid manifest.json: {err}"),
        }
    })?;
    if manifest.domain.trim().is_empty() {
        return Err(HacsError::Validation {
            full_name: full_name.to_string(),
            reason: "manifest.json has an empty domain".into(),
        });
    }
    Ok(manifest)
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

fn first_dir_under<'a>(tree: &'a [String], prefix: &str) -> Option<&'a str> {
    tree.iter().find_map(|path| {
        let rest = path.strip_prefix(prefix)?.strip_prefix('/')?;
        rest.split_once('/').map(|(dir, _)| dir)
    })
}

fn has_file_in(tree: &[String], dir: &str, extension: &str) -> bool {
    tree.iter()
        .any(|path| path.ends_with(extension) && is_under(path, dir))
}

fn is_under(path: &str, dir: &str) -> bool {
    dir.is_empty()
        || path
            .strip_prefix(dir)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// File names a plugin may ship, in order of preference.
pub fn plugin_candidates(repo_name: &str, manifest: &RepositoryManifest) -> Vec<String> {
    if let Some(filename) = &manifest.filename {
        return vec![filename.clone()];
    }
    vec![
        format!("{}.js", repo_name.replace("lovelace-", "")),
        format!("{repo_name}.js"),
        format!("{repo_name}.umd.js"),
        format!("{repo_name}-bundle.js"),
    ]
}

/// Finds the content of a repository in `tree` or explains why it is not there.
pub fn locate_content(
    category: Category,
    full_name: &str,
    manifest: &RepositoryManifest,
    tree: &[String],
) -> HacsResult<ContentLayout> {
    let repo_name = full_name
        .split_once('/')
        .map_or(full_name, |(_, name)| name);
    let invalid = |reason: String| {
        HacsError::Validation {
            full_name: full_name.to_string(),
            reason,
        }
    };
    let contains = |path: &str| tree.iter().any(|p| p == path);

    match category {
        Category::Integration => {
            let remote_path = if manifest.content_in_root {
                String::new()
            } else {
                let dir = first_dir_under(tree, "custom_components").ok_or_else(|| {
                    invalid("no directory found under custom_components/".into())
                })?;
                format!("custom_components/{dir}")
            };
            let manifest_path = if remote_path.is_empty() {
                "manifest.json".to_string()
            } else {
                format!("{remote_path}/manifest.json")
            };
            if !contains(manifest_path.as_str()) {
                return Err(invalid(format!("{manifest_path} is missing")));
            }
            Ok(ContentLayout {
                remote_path,
                single_file: None,
                manifest_path: Some(manifest_path),
            })
        }
        Category::Plugin => {
            for candidate in plugin_candidates(repo_name, manifest) {
                if contains(candidate.as_str()) {
                    return Ok(ContentLayout::dir(""));
                }
                if !manifest.content_in_root && contains(format!("dist/{candidate}").as_str()) {
                    return Ok(ContentLayout::dir("dist"));
                }
            }
            Err(invalid(format!(
                "none of {} found in the root or dist/",
                plugin_candidates(repo_name, manifest).join(", ")
            )))
        }
        Category::Theme => {
            if manifest.content_in_root {
                let file = match &manifest.filename {
                    Some(filename) if contains(filename.as_str()) => Some(filename.as_str()),
                    Some(filename) => return Err(invalid(format!("{filename} is missing"))),
                    None => {
                        tree.iter()
                            .map(String::as_str)
                            .find(|p| !p.contains('/') && p.ends_with(".yaml"))
                    }
                };
                let file = file.ok_or_else(|| invalid("no .yaml file in the root".into()))?;
                return Ok(ContentLayout {
                    remote_path: String::new(),
                    single_file: Some(file.to_string()),
                    manifest_path: None,
                });
            }
            if !has_file_in(tree, "themes", ".yaml") {
                return Err(invalid("no .yaml file under themes/".into()));
            }
            Ok(ContentLayout::dir("themes"))
        }
        Category::PythonScript => {
            let dir = if manifest.content_in_root {
                ""
            } else {
                "python_scripts"
            };
            let found = tree
                .iter()
                .any(|p| p.ends_with(".py") && parent_of(p) == dir);
            if !found {
                return Err(invalid(format!(
                    "no .py file in {}",
                    if dir.is_empty() { "the root" } else { "python_scripts/" }
                )));
            }
            Ok(ContentLayout::dir(dir))
        }
        Category::Appdaemon => {
            if manifest.content_in_root {
                return Ok(ContentLayout::dir(""));
            }
            let dir = first_dir_under(tree, "apps")
                .ok_or_else(|| invalid("no directory found under apps/".into()))?;
            Ok(ContentLayout::dir(format!("apps/{dir}")))
        }
    }
}

/// True for a non-empty relative path without `.` or `..` segments.
pub fn is_safe_relative(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && path
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..")
}

/// Pairs of (remote path, path relative to the local directory) an install writes.
///
/// Paths that could escape the local directory are dropped.
pub fn files_to_download(
    category: Category,
    layout: &ContentLayout,
    tree: &[String],
) -> Vec<(String, String)> {
    if let Some(file) = &layout.single_file {
        return vec![(file.clone(), file_name(file).to_string())];
    }

    let remote = layout.remote_path.as_str();
    tree.iter()
        .filter(|path| is_under(path, remote))
        .filter(|path| {
            match category {
                // plugins ship flat directories, and only scripts from the root
                Category::Plugin => {
                    parent_of(path) == remote && (!remote.is_empty() || path.ends_with(".js"))
                }
                Category::PythonScript => parent_of(path) == remote && path.ends_with(".py"),
                _ => true,
            }
        })
        .filter_map(|path| {
            let relative = if remote.is_empty() {
                path.as_str()
            } else {
                &path[remote.len() + 1..]
            };
            is_safe_relative(relative).then(|| (path.clone(), relative.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_integration_layout() {
        let tree = tree(&[
            "README.md",
            "custom_components/thing/__init__.py",
            "custom_components/thing/manifest.json",
            "custom_components/thing/translations/en.json",
        ]);
        let layout = locate_content(
            Category::Integration,
            "owner/thing",
            &RepositoryManifest::default(),
            &tree,
        )
        .unwrap();
        assert_eq!(layout.remote_path, "custom_components/thing");
        assert_eq!(
            layout.manifest_path.as_deref(),
            Some("custom_components/thing/manifest.json")
        );

        let files = files_to_download(Category::Integration, &layout, &tree);
        let relative: Vec<_> = files.iter().map(|(_, r)| r.as_str()).collect();
        assert_eq!(
            relative,
            vec!["__init__.py", "manifest.json", "translations/en.json"]
        );
    }

    #[test]
    fn test_integration_without_manifest_fails() {
        let tree = tree(&["custom_components/thing/__init__.py"]);
        let err = locate_content(
            Category::Integration,
            "owner/thing",
            &RepositoryManifest::default(),
            &tree,
        )
        .unwrap_err();
        assert!(matches!(err, HacsError::Validation { .. }));

        let err = locate_content(
            Category::Integration,
            "owner/thing",
            &RepositoryManifest::default(),
            &[],
        )
        .unwrap_err();
        assert!(err.to_string().contains("owner/thing"));
    }

    #[test]
    fn test_integration_content_in_root() {
        let tree = tree(&["manifest.json", "__init__.py"]);
        let manifest = RepositoryManifest {
            content_in_root: true,
            ..Default::default()
        };
        let layout = locate_content(Category::Integration, "o/t", &manifest, &tree).unwrap();
        assert_eq!(layout.remote_path, "");
        assert_eq!(files_to_download(Category::Integration, &layout, &tree).len(), 2);
    }

    #[test]
    fn test_plugin_in_dist() {
        let tree = tree(&[
            "package.json",
            "src/card.ts",
            "dist/fancy-card.js",
            "dist/fancy-card.js.gz",
            "dist/nested/chunk.js",
        ]);
        let layout = locate_content(
            Category::Plugin,
            "owner/lovelace-fancy-card",
            &RepositoryManifest::default(),
            &tree,
        )
        .unwrap();
        assert_eq!(layout.remote_path, "dist");
        let relative: Vec<_> = files_to_download(Category::Plugin, &layout, &tree)
            .into_iter()
            .map(|(_, r)| r)
            .collect();
        assert_eq!(relative, vec!["fancy-card.js", "fancy-card.js.gz"]);
    }

    #[test]
    fn test_plugin_in_root_only_fetches_scripts() {
        let tree = tree(&["card.js", "README.md", "helper.js"]);
        let layout = locate_content(
            Category::Plugin,
            "owner/card",
            &RepositoryManifest::default(),
            &tree,
        )
        .unwrap();
        let files = files_to_download(Category::Plugin, &layout, &tree);
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|(remote, _)| remote.ends_with(".js")));
    }

    #[test]
    fn test_plugin_manifest_filename() {
        let manifest = RepositoryManifest {
            filename: Some("custom.js".into()),
            ..Default::default()
        };
        assert_eq!(plugin_candidates("card", &manifest), vec!["custom.js"]);
        let err =
            locate_content(Category::Plugin, "o/card", &manifest, &tree(&["card.js"])).unwrap_err();
        assert!(err.to_string().contains("custom.js"));
    }

    #[test]
    fn test_theme_layouts() {
        let themes = tree(&["themes/dark.yaml", "themes/light.yaml", "README.md"]);
        let layout =
            locate_content(Category::Theme, "o/t", &RepositoryManifest::default(), &themes)
                .unwrap();
        assert_eq!(files_to_download(Category::Theme, &layout, &themes).len(), 2);

        let root = tree(&["README.md", "midnight.yaml"]);
        let manifest = RepositoryManifest {
            content_in_root: true,
            ..Default::default()
        };
        let layout = locate_content(Category::Theme, "o/t", &manifest, &root).unwrap();
        assert_eq!(layout.single_file.as_deref(), Some("midnight.yaml"));
        assert_eq!(
            files_to_download(Category::Theme, &layout, &root),
            vec![("midnight.yaml".to_string(), "midnight.yaml".to_string())]
        );

        assert!(
            locate_content(Category::Theme, "o/t", &RepositoryManifest::default(), &root).is_err()
        );
    }

    #[test]
    fn test_python_script_and_appdaemon() {
        let tree = tree(&["python_scripts/hello.py", "python_scripts/notes.txt"]);
        let layout = locate_content(
            Category::PythonScript,
            "o/p",
            &RepositoryManifest::default(),
            &tree,
        )
        .unwrap();
        assert_eq!(
            files_to_download(Category::PythonScript, &layout, &tree),
            vec![("python_scripts/hello.py".to_string(), "hello.py".to_string())]
        );

        let apps = self::tree(&["apps/motion/motion.py", "apps/motion/motion.yaml"]);
        let layout =
            locate_content(Category::Appdaemon, "o/a", &RepositoryManifest::default(), &apps)
                .unwrap();
        assert_eq!(layout.remote_path, "apps/motion");
        assert_eq!(files_to_download(Category::Appdaemon, &layout, &apps).len(), 2);
    }

    #[test]
    fn test_unsafe_paths_are_dropped() {
        let tree = tree(&["apps/x/../../etc/passwd", "apps/x/ok.py"]);
        let layout = ContentLayout::dir("apps/x");
        let files = files_to_download(Category::Appdaemon, &layout, &tree);
        assert_eq!(files, vec![("apps/x/ok.py".to_string(), "ok.py".to_string())]);
    }

    #[test]
    fn test_parse_integration_manifest() {
        let manifest =
            parse_integration_manifest("o/t", br#"{"domain": "thing", "name": "Thing"}"#).unwrap();
        assert_eq!(manifest.domain, "thing");
        assert!(parse_integration_manifest("o/t", br#"{"name": "x"}"#).is_err());
        assert!(parse_integration_manifest("o/t", br#"{"domain": " "}"#).is_err());
    }
}
