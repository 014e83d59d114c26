//! Repository records and the values derived from them.

use std::{fmt, path::PathBuf, str::FromStr};

use hacs_config::config::Config;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{error::HacsError, version, HacsResult};

/// Functional type of a repository, fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Integration,
    Plugin,
    Appdaemon,
    PythonScript,
    Theme,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Integration,
        Category::Plugin,
        Category::Appdaemon,
        Category::PythonScript,
        Category::Theme,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Integration => "integration",
            Category::Plugin => "plugin",
            Category::Appdaemon => "appdaemon",
            Category::PythonScript => "python_script",
            Category::Theme => "theme",
        }
    }

    /// Whether a change to installed content only takes effect after a host restart.
    pub fn requires_restart(&self) -> bool {
        matches!(self, Category::Integration)
    }

    /// Local directory holding every repository of this category.
    pub fn install_root(&self, config: &Config) -> HacsResult<PathBuf> {
        let paths = config.paths();
        let relative = match self {
            Category::Integration => paths.integration(),
            Category::Plugin => paths.plugin(),
            Category::Appdaemon => paths.appdaemon(),
            Category::PythonScript => paths.python_script(),
            Category::Theme => paths.theme(),
        };
        Ok(config.resolve_in_config_dir(relative)?)
    }

    /// Install roots of every category. Recursive deletes never leave these.
    pub fn roots(config: &Config) -> HacsResult<Vec<PathBuf>> {
        Self::ALL
            .iter()
            .map(|category| category.install_root(config))
            .collect()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = HacsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| {
                HacsError::Custom(format!(
                    "Unknown category '{s}', expected one of: integration, plugin, appdaemon, python_script, theme"
                ))
            })
    }
}

/// Projection of a repository's install fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    NotInstalled,
    Installed,
    PendingUpdate,
    RestartPending,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::NotInstalled => "not installed",
            Status::Installed => "installed",
            Status::PendingUpdate => "pending update",
            Status::RestartPending => "restart pending",
        };
        f.write_str(label)
    }
}

/// Contents of a repository's `hacs.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryManifest {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub content_in_root: bool,

    #[serde(default)]
    pub filename: Option<String>,

    /// Country codes the repository is offered in. Empty means everywhere.
    #[serde(default, deserialize_with = "one_or_many")]
    pub country: Vec<String>,

    /// Minimum host version, informational only.
    #[serde(default)]
    pub homeassistant: Option<String>,

    /// Subdirectory of the installed content that survives reinstalls and upgrades.
    #[serde(default)]
    pub persistent_directory: Option<String>,
}

impl RepositoryManifest {
    pub fn from_json(bytes: &[u8]) -> HacsResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn allows_country(&self, country: &str) -> bool {
        country.eq_ignore_ascii_case(hacs_config::config::COUNTRY_ALL)
            || self.country.is_empty()
            || self.country.iter().any(|c| c.eq_ignore_ascii_case(country))
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
        None => Vec::new(),
    })
}

/// A tracked repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub full_name: String,
    pub category: Category,
    #[serde(default)]
    pub custom: bool,

    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub installed_version: Option<String>,
    #[serde(default)]
    pub local_path: Option<String>,

    #[serde(default)]
    pub available_version: String,
    /// Newest first.
    #[serde(default)]
    pub releases: Vec<String>,
    /// Releases flagged as prerelease upstream.
    #[serde(default)]
    pub prereleases: Vec<String>,
    pub default_branch: String,
    #[serde(default)]
    pub default_branch_sha: Option<String>,
    #[serde(default)]
    pub selected_tag: Option<String>,

    #[serde(default)]
    pub beta: bool,
    #[serde(default)]
    pub hide: bool,
    #[serde(default)]
    pub restart_pending: bool,
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub unreachable: bool,
    #[serde(default)]
    pub archived: bool,

    /// Structural problems found at the last refresh. Non-empty keeps the repository out of
    /// listings.
    #[serde(default)]
    pub validation_errors: Vec<String>,
    /// Integration domain read from `manifest.json`.
    #[serde(default)]
    pub domain: Option<String>,
    /// Remote directory holding the content, relative to the repository root.
    #[serde(default)]
    pub content_path: Option<String>,
    #[serde(default)]
    pub manifest: RepositoryManifest,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stars: u64,
}

impl Repository {
    pub fn new(
        id: impl Into<String>,
        full_name: impl Into<String>,
        category: Category,
        default_branch: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            full_name: full_name.into(),
            category,
            custom: false,
            installed: false,
            installed_version: None,
            local_path: None,
            available_version: String::new(),
            releases: Vec::new(),
            prereleases: Vec::new(),
            default_branch: default_branch.into(),
            default_branch_sha: None,
            selected_tag: None,
            beta: false,
            hide: false,
            restart_pending: false,
            new: false,
            unreachable: false,
            archived: false,
            validation_errors: Vec::new(),
            domain: None,
            content_path: None,
            manifest: RepositoryManifest::default(),
            description: None,
            stars: 0,
        }
    }

    /// The part of `full_name` after the owner.
    pub fn name(&self) -> &str {
        self.full_name
            .split_once('/')
            .map_or(self.full_name.as_str(), |(_, name)| name)
    }

    pub fn display_name(&self) -> &str {
        self.manifest.name.as_deref().unwrap_or_else(|| self.name())
    }

    pub fn pending_upgrade(&self) -> bool {
        self.installed
            && !self.available_version.is_empty()
            && self.installed_version.as_deref() != Some(self.available_version.as_str())
    }

    pub fn status(&self) -> Status {
        if self.restart_pending {
            Status::RestartPending
        } else if self.pending_upgrade() {
            Status::PendingUpdate
        } else if self.installed {
            Status::Installed
        } else {
            Status::NotInstalled
        }
    }

    pub fn is_valid(&self) -> bool {
        self.validation_errors.is_empty()
    }

    /// Where this repository is installed. Integrations use their domain.
    pub fn local_path_for(&self, config: &Config) -> HacsResult<PathBuf> {
        let root = self.category.install_root(config)?;
        let dir = match (self.category, self.domain.as_deref()) {
            (Category::Integration, Some(domain)) => domain,
            _ => self.name(),
        };
        Ok(root.join(dir))
    }

    /// Recomputes `available_version` from the current releases.
    pub fn resolve_available(&self) -> String {
        version::resolve_flagged(
            &self.releases,
            &self.prereleases,
            self.default_branch_sha.as_deref().unwrap_or_default(),
            self.beta,
        )
    }

    /// Whether `tag` can be pinned with `set_version`.
    pub fn accepts_version(&self, tag: &str) -> bool {
        tag == self.default_branch || self.releases.iter().any(|release| release == tag)
    }

    /// Ref the next install would fetch: the pin, else the available version. Without
    /// releases the available version is a short sha, so the default branch is used instead.
    pub fn target_ref(&self) -> String {
        if let Some(tag) = &self.selected_tag {
            return tag.clone();
        }
        if self.releases.is_empty() {
            return self.default_branch.clone();
        }
        self.available_version.clone()
    }
}

/// Partial update applied by a refresh. Install fields are never part of it.
#[derive(Debug, Clone, Default)]
pub struct MetadataUpdate {
    pub releases: Option<Vec<String>>,
    pub prereleases: Option<Vec<String>>,
    pub default_branch: Option<String>,
    pub default_branch_sha: Option<String>,
    pub selected_tag: Option<Option<String>>,
    pub beta: Option<bool>,
    pub hide: Option<bool>,
    pub new: Option<bool>,
    pub unreachable: Option<bool>,
    pub archived: Option<bool>,
    pub validation_errors: Option<Vec<String>>,
    pub domain: Option<String>,
    pub content_path: Option<String>,
    pub manifest: Option<RepositoryManifest>,
    pub description: Option<String>,
    pub stars: Option<u64>,
}

impl MetadataUpdate {
    /// Merges the present fields into `repo`.
    ///
    /// `available_version` is never taken from the update. It is recomputed from the merged
    /// record whenever releases, the branch sha or the beta preference change, so a refresh
    /// racing a beta toggle cannot leave a version resolved under the old preference.
    pub fn apply(self, repo: &mut Repository) {
        let resolve = self.releases.is_some()
            || self.prereleases.is_some()
            || self.default_branch_sha.is_some()
            || self.beta.is_some();

        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field {
                    repo.$field = value;
                })*
            };
        }

        merge!(
            releases,
            prereleases,
            default_branch,
            selected_tag,
            beta,
            hide,
            new,
            unreachable,
            archived,
            validation_errors,
            manifest,
            stars,
        );

        if let Some(sha) = self.default_branch_sha {
            repo.default_branch_sha = Some(sha);
        }
        if let Some(domain) = self.domain {
            repo.domain = Some(domain);
        }
        if let Some(path) = self.content_path {
            repo.content_path = Some(path);
        }
        if let Some(description) = self.description {
            repo.description = Some(description);
        }
        if resolve {
            repo.available_version = repo.resolve_available();
        }
    }
}
