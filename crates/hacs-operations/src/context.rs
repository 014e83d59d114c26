//! Shared state handed to every operation.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, RwLock,
};

use hacs_config::config::Config;
use hacs_core::{
    lock::OperationLocks,
    store::{PersistentStore, Settings},
    HacsError, HacsResult, Registry, Repository,
};
use hacs_events::{EventSinkHandle, HacsEvent, OperationId};
use hacs_github::{ClientResult, RemoteMetadataClient};
use hacs_utils::time::format_duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

struct Inner {
    config: Config,
    registry: Registry,
    store: PersistentStore,
    client: Arc<dyn RemoteMetadataClient>,
    events: EventSinkHandle,
    limiter: Arc<Semaphore>,
    locks: OperationLocks,
    settings: RwLock<Settings>,
    /// Set once a full cycle has completed. Repositories discovered afterwards are new.
    seeded: AtomicBool,
    op_counter: AtomicU64,
}

/// Cheaply cloneable handle to the registry, store, client and event sink.
#[derive(Clone)]
pub struct HacsContext {
    inner: Arc<Inner>,
}

impl HacsContext {
    /// Builds a context from `config`, restoring the registry from the configured store.
    ///
    /// Settings saved in the store take precedence over the config file.
    pub fn new(
        config: Config,
        client: Arc<dyn RemoteMetadataClient>,
        events: EventSinkHandle,
    ) -> HacsResult<Self> {
        let store = PersistentStore::new(config.get_storage_path()?);
        let snapshot = store.load()?;
        let seeded = !snapshot.repositories.is_empty();
        let settings = snapshot
            .settings
            .unwrap_or_else(|| Settings::from_config(&config));
        let registry = Registry::from_snapshot(snapshot.repositories);

        debug!(
            count = registry.len(),
            path = %store.path().display(),
            "restored repository registry"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                limiter: Arc::new(Semaphore::new(config.api_concurrency())),
                config,
                registry,
                store,
                client,
                events,
                locks: OperationLocks::new(),
                settings: RwLock::new(settings),
                seeded: AtomicBool::new(seeded),
                op_counter: AtomicU64::new(1),
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn store(&self) -> &PersistentStore {
        &self.inner.store
    }

    pub fn events(&self) -> &EventSinkHandle {
        &self.inner.events
    }

    pub fn locks(&self) -> &OperationLocks {
        &self.inner.locks
    }

    pub fn settings(&self) -> HacsResult<Settings> {
        Ok(self.inner.settings.read()?.clone())
    }

    pub(crate) fn set_settings(&self, settings: Settings) -> HacsResult<()> {
        *self.inner.settings.write()? = settings;
        Ok(())
    }

    pub(crate) fn is_seeded(&self) -> bool {
        self.inner.seeded.load(Ordering::Acquire)
    }

    pub(crate) fn mark_seeded(&self) {
        self.inner.seeded.store(true, Ordering::Release);
    }

    pub fn next_op_id(&self) -> OperationId {
        self.inner.op_counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Runs one blocking client call under the global limiter and the request timeout.
    ///
    /// A timeout is reported as a network error. The permit stays with the blocking call, so
    /// a call that outlives its timeout still counts against the limit until it returns.
    pub async fn call<T, F>(&self, f: F) -> HacsResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn RemoteMetadataClient) -> ClientResult<T> + Send + 'static,
    {
        let permit = Arc::clone(&self.inner.limiter)
            .acquire_owned()
            .await
            .map_err(|_| HacsError::Custom("remote call limiter closed".into()))?;

        let client = Arc::clone(&self.inner.client);
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f(client.as_ref())
        });
        let timeout = self.inner.config.request_timeout();

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result.map_err(HacsError::from),
            Ok(Err(err)) => Err(HacsError::Custom(format!("Join handle error: {err}"))),
            Err(_) => {
                debug!(timeout = %format_duration(timeout), "remote call timed out");
                Err(HacsError::Network(format!(
                    "request timed out after {}",
                    format_duration(timeout)
                )))
            }
        }
    }

    /// Writes the registry and settings to the store.
    pub fn persist(&self) -> HacsResult<()> {
        self.inner
            .store
            .persist(&self.inner.registry, &self.inner.settings)
    }

    /// Persists a change that already took effect on disk and in the registry.
    ///
    /// A failed write does not undo the change. It is logged and reported as
    /// [`HacsEvent::StoreWriteFailed`]; the next successful persist writes it out.
    pub(crate) fn persist_committed(&self) {
        if let Err(err) = self.persist() {
            warn!(path = %self.inner.store.path().display(), "failed to save state: {err}");
            self.emit(HacsEvent::StoreWriteFailed {
                error: err.to_string(),
            });
        }
    }

    pub(crate) fn emit(&self, event: HacsEvent) {
        self.inner.events.emit(event);
    }

    pub(crate) fn emit_changed(&self, repo: &Repository) {
        self.emit(HacsEvent::RepositoryChanged {
            id: repo.id.clone(),
            full_name: repo.full_name.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hacs_core::Category;
    use hacs_events::CycleKind;

    use super::*;
    use crate::{
        refresh::refresh_repository,
        run_cycle,
        test_utils::{integration, TestEnv},
    };

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_remote_calls_stay_within_concurrency_limit() {
        let env = TestEnv::with_config(|config| config.api_concurrency = Some(3));
        for i in 0..20 {
            let name = format!("owner/repo{i}");
            integration(&env.client, &i.to_string(), &name, &["1.0.0"]);
            env.track(&i.to_string(), &name, Category::Integration);
        }
        env.client.set_delay(Duration::from_millis(20));

        let report = run_cycle(&env.ctx, CycleKind::Full).await.unwrap();
        assert_eq!(report.refreshed, 20);
        assert!(env.client.max_in_flight() <= 3);
        assert!(env.client.max_in_flight() > 1);
    }

    #[tokio::test]
    async fn test_slow_call_times_out_as_network_error() {
        let env = TestEnv::with_config(|config| config.request_timeout = Some("1s".into()));
        integration(&env.client, "1", "owner/thing", &["1.0.0"]);
        let id = env.track("1", "owner/thing", Category::Integration);
        refresh_repository(&env.ctx, &id).await.unwrap();
        let before = env.ctx.registry().get(&id).unwrap();

        env.client.add_release("owner/thing", "1.1.0", false);
        env.client.set_delay(Duration::from_millis(1500));
        let err = refresh_repository(&env.ctx, &id).await.unwrap_err();
        assert!(matches!(err, HacsError::Network(_)));
        assert!(err.is_transient());
        assert_eq!(env.ctx.registry().get(&id).unwrap(), before);
    }
}
