use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use documented::{Documented, DocumentedFields};
use hacs_utils::{
    path::{resolve_path, xdg_config_home, xdg_data_home},
    time::parse_duration,
};
use serde::{Deserialize, Serialize};
use toml_edit::DocumentMut;
use tracing::{debug, info};

use crate::{
    annotations::annotate_toml_table,
    error::{ConfigError, Result},
};

const DEFAULT_INSTALLED_INTERVAL: Duration = Duration::from_secs(30 * 60);
const DEFAULT_FULL_INTERVAL: Duration = Duration::from_secs(600 * 60);
const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(15 * 60);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

pub const DEFAULT_API_CONCURRENCY: usize = 10;
pub const DEFAULT_RELEASE_LIMIT: usize = 5;
pub const DEFAULT_REPOSITORY: &str = "hacs/default";
pub const COUNTRY_ALL: &str = "ALL";

/// hacs store configuration
///
/// `github_token` may be set here as well. When it is absent the `GITHUB_TOKEN` and
/// `GH_TOKEN` environment variables are consulted.
#[derive(Clone, Debug, Deserialize, Serialize, Documented, DocumentedFields)]
pub struct Config {
    /// Home Assistant configuration directory. Category install roots are relative to it.
    /// Default: $XDG_CONFIG_HOME/homeassistant
    pub config_dir: Option<String>,

    /// File holding the persisted repository registry.
    /// Default: $XDG_DATA_HOME/hacs/hacs.json
    pub storage_path: Option<String>,

    /// GitHub API token.
    pub github_token: Option<String>,

    /// Repository providing the default source lists.
    /// Default: hacs/default
    pub default_repository: Option<String>,

    /// How often installed repositories are refreshed.
    /// Default: 30m
    pub installed_interval: Option<String>,

    /// How often every tracked repository is refreshed.
    /// Default: 600m
    pub full_interval: Option<String>,

    /// Delay before retrying a cycle aborted by rate limiting.
    /// Default: 15m
    pub rate_limit_backoff: Option<String>,

    /// Upper bound for a single remote call.
    /// Default: 20s
    pub request_timeout: Option<String>,

    /// Maximum number of simultaneous remote calls.
    /// Default: 10
    pub api_concurrency: Option<usize>,

    /// Number of releases kept per repository.
    /// Default: 5
    pub release_limit: Option<usize>,

    /// Only list repositories available in this country (two letter code), or ALL.
    /// Default: ALL
    pub country: Option<String>,

    /// Enable experimental features.
    /// Default: false
    pub experimental: Option<bool>,

    /// Install roots per category.
    pub paths: Option<CategoryPaths>,
}

/// Install roots per category, relative to `config_dir` unless absolute.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Documented, DocumentedFields)]
pub struct CategoryPaths {
    /// Default: custom_components
    pub integration: Option<String>,

    /// Default: www/community
    pub plugin: Option<String>,

    /// Default: appdaemon/apps
    pub appdaemon: Option<String>,

    /// Default: python_scripts
    pub python_script: Option<String>,

    /// Default: themes
    pub theme: Option<String>,
}

impl CategoryPaths {
    fn defaults() -> Self {
        Self {
            integration: Some("custom_components".into()),
            plugin: Some("www/community".into()),
            appdaemon: Some("appdaemon/apps".into()),
            python_script: Some("python_scripts".into()),
            theme: Some("themes".into()),
        }
    }

    fn fill_defaults(&mut self) {
        let defaults = Self::defaults();
        self.integration = self.integration.take().or(defaults.integration);
        self.plugin = self.plugin.take().or(defaults.plugin);
        self.appdaemon = self.appdaemon.take().or(defaults.appdaemon);
        self.python_script = self.python_script.take().or(defaults.python_script);
        self.theme = self.theme.take().or(defaults.theme);
    }

    pub fn integration(&self) -> &str {
        self.integration.as_deref().unwrap_or("custom_components")
    }

    pub fn plugin(&self) -> &str {
        self.plugin.as_deref().unwrap_or("www/community")
    }

    pub fn appdaemon(&self) -> &str {
        self.appdaemon.as_deref().unwrap_or("appdaemon/apps")
    }

    pub fn python_script(&self) -> &str {
        self.python_script.as_deref().unwrap_or("python_scripts")
    }

    pub fn theme(&self) -> &str {
        self.theme.as_deref().unwrap_or("themes")
    }
}

/// Location of the configuration file: `$HACS_CONFIG`, else `$XDG_CONFIG_HOME/hacs/config.toml`.
pub fn default_config_path() -> PathBuf {
    match std::env::var("HACS_CONFIG") {
        Ok(path) => PathBuf::from(path),
        Err(_) => xdg_config_home().join("hacs").join("config.toml"),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Config {
    pub fn default_config() -> Self {
        Self {
            config_dir: Some(format!("{}/homeassistant", xdg_config_home().display())),
            storage_path: Some(format!("{}/hacs/hacs.json", xdg_data_home().display())),
            github_token: None,
            default_repository: Some(DEFAULT_REPOSITORY.into()),
            installed_interval: Some("30m".into()),
            full_interval: Some("600m".into()),
            rate_limit_backoff: Some("15m".into()),
            request_timeout: Some("20s".into()),
            api_concurrency: Some(DEFAULT_API_CONCURRENCY),
            release_limit: Some(DEFAULT_RELEASE_LIMIT),
            country: Some(COUNTRY_ALL.into()),
            experimental: Some(false),
            paths: Some(CategoryPaths::defaults()),
        }
    }

    /// Loads the configuration at `path`, falling back to defaults when the file is missing.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config file not found, using defaults");
                Self::default_config()
            }
            Err(err) => return Err(ConfigError::IoError(err)),
        };

        config.resolve()?;

        Ok(config)
    }

    pub fn resolve(&mut self) -> Result<()> {
        let defaults = Self::default_config();

        self.config_dir = self.config_dir.take().or(defaults.config_dir);
        self.storage_path = self.storage_path.take().or(defaults.storage_path);
        self.default_repository = self.default_repository.take().or(defaults.default_repository);
        self.installed_interval = self.installed_interval.take().or(defaults.installed_interval);
        self.full_interval = self.full_interval.take().or(defaults.full_interval);
        self.rate_limit_backoff = self.rate_limit_backoff.take().or(defaults.rate_limit_backoff);
        self.request_timeout = self.request_timeout.take().or(defaults.request_timeout);
        self.api_concurrency.get_or_insert(DEFAULT_API_CONCURRENCY);
        self.release_limit.get_or_insert(DEFAULT_RELEASE_LIMIT);
        self.experimental.get_or_insert(false);
        self.paths.get_or_insert_with(CategoryPaths::default).fill_defaults();

        for (key, value) in [
            ("installed_interval", &self.installed_interval),
            ("full_interval", &self.full_interval),
            ("rate_limit_backoff", &self.rate_limit_backoff),
            ("request_timeout", &self.request_timeout),
        ] {
            let value = value.as_deref().unwrap_or_default();
            match parse_duration(value) {
                Some(duration) if !duration.is_zero() => {}
                _ => {
                    return Err(ConfigError::InvalidDuration {
                        key,
                        value: value.to_string(),
                    })
                }
            }
        }

        if self.api_concurrency == Some(0) {
            return Err(ConfigError::ZeroValue("api_concurrency"));
        }
        if self.release_limit == Some(0) {
            return Err(ConfigError::ZeroValue("release_limit"));
        }

        let country = normalize_country(self.country.as_deref().unwrap_or(COUNTRY_ALL))?;
        self.country = Some(country);

        Ok(())
    }

    pub fn get_config_dir(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("HACS_CONFIG_DIR") {
            return Ok(resolve_path(&env_path)?);
        }
        match &self.config_dir {
            Some(dir) => Ok(resolve_path(dir)?),
            None => Ok(xdg_config_home().join("homeassistant")),
        }
    }

    pub fn get_storage_path(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("HACS_STORAGE") {
            return Ok(resolve_path(&env_path)?);
        }
        match &self.storage_path {
            Some(path) => Ok(resolve_path(path)?),
            None => Ok(xdg_data_home().join("hacs").join("hacs.json")),
        }
    }

    /// Resolves a category root, which is relative to the config dir unless it is absolute or
    /// starts with `~` or `$`.
    pub fn resolve_in_config_dir(&self, path: &str) -> Result<PathBuf> {
        if path.starts_with(&['/', '~', '$'][..]) {
            return Ok(resolve_path(path)?);
        }
        Ok(self.get_config_dir()?.join(path))
    }

    pub fn paths(&self) -> CategoryPaths {
        let mut paths = self.paths.clone().unwrap_or_default();
        paths.fill_defaults();
        paths
    }

    pub fn github_token(&self) -> Option<String> {
        self.github_token
            .clone()
            .filter(|token| !token.trim().is_empty())
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .or_else(|| std::env::var("GH_TOKEN").ok())
            .filter(|token| !token.trim().is_empty())
    }

    pub fn default_repository(&self) -> &str {
        self.default_repository
            .as_deref()
            .unwrap_or(DEFAULT_REPOSITORY)
    }

    pub fn installed_interval(&self) -> Duration {
        duration_or(self.installed_interval.as_deref(), DEFAULT_INSTALLED_INTERVAL)
    }

    pub fn full_interval(&self) -> Duration {
        duration_or(self.full_interval.as_deref(), DEFAULT_FULL_INTERVAL)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        duration_or(self.rate_limit_backoff.as_deref(), DEFAULT_RATE_LIMIT_BACKOFF)
    }

    pub fn request_timeout(&self) -> Duration {
        duration_or(self.request_timeout.as_deref(), DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn api_concurrency(&self) -> usize {
        self.api_concurrency
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_API_CONCURRENCY)
    }

    pub fn release_limit(&self) -> usize {
        self.release_limit
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_RELEASE_LIMIT)
    }

    pub fn country(&self) -> &str {
        self.country.as_deref().unwrap_or(COUNTRY_ALL)
    }

    pub fn experimental(&self) -> bool {
        self.experimental.unwrap_or(false)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serialized)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    pub fn to_annotated_document(&self) -> Result<DocumentMut> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut doc = toml_string.parse::<DocumentMut>()?;

        annotate_toml_table::<Config>(doc.as_table_mut(), true)?;

        if let Some(paths_table) = doc.get_mut("paths").and_then(|item| item.as_table_mut()) {
            annotate_toml_table::<CategoryPaths>(paths_table, false)?;
        }

        Ok(doc)
    }
}

/// Validates a country filter value, returning it upper-cased.
pub fn normalize_country(value: &str) -> Result<String> {
    let value = value.trim().to_ascii_uppercase();
    if value == COUNTRY_ALL
        || (value.len() == 2 && value.chars().all(|c| c.is_ascii_alphabetic()))
    {
        Ok(value)
    } else {
        Err(ConfigError::InvalidCountry(value))
    }
}

fn duration_or(value: Option<&str>, fallback: Duration) -> Duration {
    value
        .and_then(parse_duration)
        .filter(|d| !d.is_zero())
        .unwrap_or(fallback)
}

/// Writes an annotated default configuration to `path`.
pub fn generate_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(ConfigError::ConfigAlreadyExists(path.display().to_string()));
    }

    let annotated_doc = Config::default_config().to_annotated_document()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, annotated_doc.to_string())?;
    info!(
        "Default configuration file generated with documentation at: {}",
        path.display()
    );
    Ok(())
}
