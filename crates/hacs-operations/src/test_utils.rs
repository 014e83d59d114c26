//! In-memory remote and a throwaway environment for operation tests.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use hacs_config::config::Config;
use hacs_core::{Category, Repository};
use hacs_events::{CollectorSink, EventSinkHandle};
use hacs_github::{ClientError, ClientResult, ReleaseInfo, RemoteMetadataClient, RepositoryInfo};
use tempfile::TempDir;

use crate::HacsContext;

pub const SHA: &str = "abcdef123456";

#[derive(Debug, Clone)]
struct FakeRepo {
    info: RepositoryInfo,
    releases: Vec<ReleaseInfo>,
    sha: String,
    /// ref -> path -> contents
    files: HashMap<String, HashMap<String, Vec<u8>>>,
}

/// [`RemoteMetadataClient`] serving repositories added by the test.
#[derive(Default)]
pub struct FakeClient {
    repos: Mutex<HashMap<String, FakeRepo>>,
    failure: Mutex<Option<ClientError>>,
    /// Calls allowed before every further call is rate limited.
    budget: Mutex<Option<usize>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Decrements the in-flight count when a call returns.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_repository(&self, id: &str, full_name: &str, default_branch: &str) {
        self.repos.lock().unwrap().insert(
            full_name.to_lowercase(),
            FakeRepo {
                info: RepositoryInfo {
                    id: id.to_string(),
                    full_name: full_name.to_string(),
                    description: Some(format!("{full_name} description")),
                    default_branch: default_branch.to_string(),
                    stars: 3,
                    archived: false,
                },
                releases: Vec::new(),
                sha: SHA.to_string(),
                files: HashMap::new(),
            },
        );
    }

    pub fn remove_repository(&self, full_name: &str) {
        self.repos.lock().unwrap().remove(&full_name.to_lowercase());
    }

    /// Adds a release as the newest one.
    pub fn add_release(&self, full_name: &str, tag: &str, prerelease: bool) {
        let mut repos = self.repos.lock().unwrap();
        let repo = repos.get_mut(&full_name.to_lowercase()).unwrap();
        repo.releases.insert(0, ReleaseInfo::new(tag, prerelease));
    }

    pub fn set_sha(&self, full_name: &str, sha: &str) {
        let mut repos = self.repos.lock().unwrap();
        repos.get_mut(&full_name.to_lowercase()).unwrap().sha = sha.to_string();
    }

    pub fn add_file(&self, full_name: &str, reference: &str, path: &str, contents: &[u8]) {
        let mut repos = self.repos.lock().unwrap();
        repos
            .get_mut(&full_name.to_lowercase())
            .unwrap()
            .files
            .entry(reference.to_string())
            .or_default()
            .insert(path.to_string(), contents.to_vec());
    }

    pub fn add_integration_files(&self, full_name: &str, reference: &str, domain: &str) {
        self.add_file(
            full_name,
            reference,
            &format!("custom_components/{domain}/manifest.json"),
            format!(r#"{{"domain": "{domain}", "name": "{domain}", "version": "{reference}"}}"#)
                .as_bytes(),
        );
        self.add_file(
            full_name,
            reference,
            &format!("custom_components/{domain}/__init__.py"),
            format!("VERSION = \"{reference}\"\n").as_bytes(),
        );
    }

    pub fn fail_with(&self, failure: Option<ClientError>) {
        *self.failure.lock().unwrap() = failure;
    }

    pub fn rate_limit_after(&self, calls: usize) {
        *self.budget.lock().unwrap() = Some(calls);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) -> ClientResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }
        let mut budget = self.budget.lock().unwrap();
        if let Some(remaining) = budget.as_mut() {
            if *remaining == 0 {
                return Err(ClientError::RateLimited { reset_at: None });
            }
            *remaining -= 1;
        }
        Ok(())
    }

    fn repo(&self, full_name: &str) -> ClientResult<FakeRepo> {
        self.enter()?;
        self.repos
            .lock()
            .unwrap()
            .get(&full_name.to_lowercase())
            .cloned()
            .ok_or_else(|| ClientError::NotFound(full_name.to_string()))
    }
}

impl RemoteMetadataClient for FakeClient {
    fn get_repository(&self, full_name: &str) -> ClientResult<RepositoryInfo> {
        Ok(self.repo(full_name)?.info)
    }

    fn get_releases(&self, full_name: &str, limit: usize) -> ClientResult<Vec<ReleaseInfo>> {
        Ok(self
            .repo(full_name)?
            .releases
            .into_iter()
            .take(limit)
            .collect())
    }

    fn get_default_branch_sha(&self, full_name: &str) -> ClientResult<String> {
        Ok(self.repo(full_name)?.sha)
    }

    fn get_tree(&self, full_name: &str, reference: &str) -> ClientResult<Vec<String>> {
        let repo = self.repo(full_name)?;
        let files = repo
            .files
            .get(reference)
            .ok_or_else(|| ClientError::NotFound(format!("{full_name}@{reference}")))?;
        let mut paths: Vec<String> = files.keys().cloned().collect();
        paths.sort();
        Ok(paths)
    }

    fn get_file(&self, full_name: &str, reference: &str, path: &str) -> ClientResult<Vec<u8>> {
        self.repo(full_name)?
            .files
            .get(reference)
            .and_then(|files| files.get(path))
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("{full_name}@{reference}/{path}")))
    }
}

/// Integration with one release per version plus content on `main`.
pub fn integration(client: &FakeClient, id: &str, full_name: &str, versions: &[&str]) {
    let domain = full_name.rsplit('/').next().unwrap();
    client.add_repository(id, full_name, "main");
    client.add_integration_files(full_name, "main", domain);
    for version in versions.iter().rev() {
        client.add_release(full_name, version, false);
        client.add_integration_files(full_name, version, domain);
    }
}

/// Plugin shipping `dist/<name>.js`.
pub fn plugin(client: &FakeClient, id: &str, full_name: &str, versions: &[&str]) {
    let name = full_name.rsplit('/').next().unwrap();
    client.add_repository(id, full_name, "main");
    let refs = versions.iter().rev().copied().chain(["main"]);
    for reference in refs {
        if reference != "main" {
            client.add_release(full_name, reference, false);
        }
        client.add_file(
            full_name,
            reference,
            &format!("dist/{name}.js"),
            format!("// {reference}").as_bytes(),
        );
    }
}

pub struct TestEnv {
    pub dir: TempDir,
    pub ctx: HacsContext,
    pub client: Arc<FakeClient>,
    pub events: Arc<CollectorSink>,
    config: Config,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Like [`TestEnv::new`], with `tweak` applied to the config before it is resolved.
    pub fn with_config(tweak: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config {
            config_dir: Some(dir.path().join("config").display().to_string()),
            storage_path: Some(dir.path().join("hacs.json").display().to_string()),
            default_repository: Some("hacs/default".into()),
            request_timeout: Some("5s".into()),
            api_concurrency: Some(4),
            ..Config::default_config()
        };
        tweak(&mut config);
        config.resolve().unwrap();

        let client = FakeClient::new();
        let events = Arc::new(CollectorSink::default());
        let ctx = Self::context(&config, client.clone(), events.clone());
        Self {
            dir,
            ctx,
            client,
            events,
            config,
        }
    }

    fn context(config: &Config, client: Arc<FakeClient>, events: Arc<CollectorSink>) -> HacsContext {
        let events: EventSinkHandle = events;
        HacsContext::new(config.clone(), client, events).unwrap()
    }

    /// A fresh context over the same store, as after a process restart.
    pub fn restart(&self) -> HacsContext {
        Self::context(&self.config, self.client.clone(), Arc::new(CollectorSink::default()))
    }

    pub fn config_dir(&self) -> PathBuf {
        self.dir.path().join("config")
    }

    pub fn store_path(&self) -> PathBuf {
        self.dir.path().join("hacs.json")
    }

    /// Registers a repository the way discovery would, without metadata.
    pub fn track(&self, id: &str, full_name: &str, category: Category) -> String {
        self.ctx
            .registry()
            .register(Repository::new(id, full_name, category, "main"))
            .unwrap()
            .id
    }
}
