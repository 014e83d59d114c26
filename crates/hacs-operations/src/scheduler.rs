//! Refresh cycles and the timers driving them.

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use hacs_core::{Category, HacsError, HacsResult, Repository};
use hacs_events::{CycleKind, HacsEvent};
use hacs_utils::time::format_duration;
use serde::Deserialize;
use tokio::{
    sync::mpsc,
    task::JoinSet,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, error, warn};

use crate::{
    refresh::{fetch_metadata, refresh_repository},
    CycleReport, HacsContext,
};

enum Outcome {
    Refreshed,
    Failed,
    RateLimited,
    Skipped,
}

/// Runs one cycle of `kind` and persists the result.
///
/// The installed cycle covers installed repositories. The full cycle first syncs the
/// default lists, then covers every repository that is not hidden. A rate limited call
/// stops the remaining refreshes; repositories not reached keep their previous state and
/// nothing is pruned.
pub async fn run_cycle(ctx: &HacsContext, kind: CycleKind) -> HacsResult<CycleReport> {
    let mut report = CycleReport::new(kind);
    let aborted = Arc::new(AtomicBool::new(false));

    let mut discovery = Discovery::default();
    if kind == CycleKind::Full {
        match discover(ctx, &aborted).await {
            Ok(found) => {
                report.discovered = found.registered.len();
                discovery = found;
            }
            Err(err) if err.is_transient() || matches!(err, HacsError::Unreachable(_)) => {
                warn!("default list sync failed: {err}");
                if matches!(err, HacsError::RateLimited { .. }) {
                    aborted.store(true, Ordering::SeqCst);
                }
            }
            Err(err) => return Err(err),
        }
    }

    let targets: Vec<Repository> = ctx
        .registry()
        .all()?
        .into_iter()
        .filter(|repo| !discovery.registered.contains(&repo.id))
        .filter(|repo| !discovery.stale.contains(&repo.id))
        .filter(|repo| {
            match kind {
                CycleKind::Installed => repo.installed,
                CycleKind::Full => !repo.hide,
            }
        })
        .collect();
    report.total = targets.len();

    debug!(kind = %kind, total = report.total, "refresh cycle started");
    ctx.emit(HacsEvent::CycleStarted {
        kind,
        total: report.total,
    });

    let mut set = JoinSet::new();
    for repo in targets {
        let ctx = ctx.clone();
        let aborted = Arc::clone(&aborted);
        set.spawn(async move {
            if aborted.load(Ordering::SeqCst) {
                return (repo, Outcome::Skipped);
            }
            let outcome = match refresh_repository(&ctx, &repo.id).await {
                Ok(_) => Outcome::Refreshed,
                Err(HacsError::RateLimited { .. }) => {
                    aborted.store(true, Ordering::SeqCst);
                    Outcome::RateLimited
                }
                Err(err) => {
                    warn!(repo = %repo.full_name, "refresh failed: {err}");
                    Outcome::Failed
                }
            };
            (repo, outcome)
        });
    }

    let mut refreshed_ids = Vec::new();
    while let Some(joined) = set.join_next().await {
        let (repo, outcome) = match joined {
            Ok(result) => result,
            Err(err) => {
                error!("refresh task failed: {err}");
                report.failed += 1;
                continue;
            }
        };
        match outcome {
            Outcome::Refreshed => {
                report.refreshed += 1;
                if kind == CycleKind::Full {
                    refreshed_ids.push(repo.id);
                }
            }
            Outcome::Failed => report.failed += 1,
            Outcome::RateLimited | Outcome::Skipped => {}
        }
    }

    report.aborted = aborted.load(Ordering::SeqCst);
    if kind == CycleKind::Full && !report.aborted {
        report.pruned += prune(ctx, &discovery.stale, |_| false)?;
        report.pruned += prune(ctx, &refreshed_ids, |repo| repo.custom || repo.is_valid())?;
    }

    ctx.persist()?;

    if report.aborted {
        let retry_in = ctx.config().rate_limit_backoff();
        warn!(
            kind = %kind,
            refreshed = report.refreshed,
            retry_in = %format_duration(retry_in),
            "rate limited, cycle aborted"
        );
        ctx.emit(HacsEvent::RateLimited { retry_in });
    } else {
        if kind == CycleKind::Full {
            ctx.mark_seeded();
        }
        debug!(
            kind = %kind,
            refreshed = report.refreshed,
            failed = report.failed,
            discovered = report.discovered,
            pruned = report.pruned,
            "refresh cycle finished"
        );
    }

    ctx.emit(HacsEvent::CycleFinished {
        kind,
        refreshed: report.refreshed,
        failed: report.failed,
        aborted: report.aborted,
    });
    Ok(report)
}

/// Drops `ids` from the registry unless `keep` holds. Installed or locked repositories are
/// always kept.
fn prune<F>(ctx: &HacsContext, ids: &[String], keep: F) -> HacsResult<usize>
where
    F: Fn(&Repository) -> bool,
{
    let mut pruned = 0;
    for id in ids {
        let Ok(repo) = ctx.registry().get(id) else {
            continue;
        };
        if repo.installed || ctx.locks().is_locked(id) || keep(&repo) {
            continue;
        }
        match ctx.registry().remove(id) {
            Ok(_) => {}
            Err(HacsError::CannotRemoveInstalled(_) | HacsError::NotFound(_)) => continue,
            Err(err) => return Err(err),
        }
        debug!(repo = %repo.full_name, "pruned repository");
        ctx.emit(HacsEvent::RepositoryRemoved {
            id: repo.id,
            full_name: repo.full_name,
        });
        pruned += 1;
    }
    Ok(pruned)
}

/// Entry of the default repository's `removed` list.
#[derive(Debug, Deserialize)]
struct Withdrawn {
    repository: String,
    #[serde(default)]
    reason: Option<String>,
}

/// Outcome of a default list sync.
#[derive(Default)]
struct Discovery {
    /// Ids registered by this sync.
    registered: HashSet<String>,
    /// Tracked ids that left the lists or were withdrawn. Pruned once the cycle completes.
    stale: Vec<String>,
}

async fn fetch_source<T>(
    ctx: &HacsContext,
    source: &str,
    branch: &str,
    file: &'static str,
) -> HacsResult<Option<T>>
where
    T: for<'de> Deserialize<'de>,
{
    let (name, branch) = (source.to_string(), branch.to_string());
    match ctx.call(move |c| c.get_file(&name, &branch, file)).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(HacsError::Unreachable(_)) => {
            debug!(file, "default repository has no such list");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Syncs the registry with the default lists.
///
/// Unseen names are registered when they validate. Tracked entries that left their list,
/// unless custom, and entries on the `removed` list are reported as stale; the caller prunes
/// them once the cycle completes. Installed entries are never stale. An installed entry on
/// the `removed` list is reported through [`HacsEvent::RemovedUpstream`] instead.
async fn discover(ctx: &HacsContext, aborted: &Arc<AtomicBool>) -> HacsResult<Discovery> {
    let source = ctx.config().default_repository().to_string();
    let name = source.clone();
    let branch = ctx.call(move |c| c.get_repository(&name)).await?.default_branch;

    let withdrawn: HashMap<String, Withdrawn> =
        fetch_source::<Vec<Withdrawn>>(ctx, &source, &branch, "removed")
            .await?
            .unwrap_or_default()
            .into_iter()
            .map(|entry| (entry.repository.to_lowercase(), entry))
            .collect();

    let mut candidates = Vec::new();
    let mut listed_categories = Vec::new();
    let mut listed = HashSet::new();
    for category in Category::ALL {
        let Some(names) = fetch_source::<Vec<String>>(ctx, &source, &branch, category.as_str())
            .await?
        else {
            continue;
        };
        listed_categories.push(category);
        for name in names {
            let key = name.to_lowercase();
            if withdrawn.contains_key(&key) {
                continue;
            }
            listed.insert(key);
            if !ctx.registry().contains_name(&name)? {
                candidates.push((name, category));
            }
        }
    }

    let mut discovery = Discovery::default();
    for repo in ctx.registry().all()? {
        let key = repo.full_name.to_lowercase();
        if let Some(entry) = withdrawn.get(&key) {
            if repo.installed {
                debug!(
                    repo = %repo.full_name,
                    "installed repository was removed from the default lists"
                );
                ctx.emit(HacsEvent::RemovedUpstream {
                    id: repo.id,
                    full_name: repo.full_name,
                    reason: entry.reason.clone(),
                });
            } else {
                discovery.stale.push(repo.id);
            }
            continue;
        }
        if repo.custom
            || repo.installed
            || !listed_categories.contains(&repo.category)
            || listed.contains(&key)
        {
            continue;
        }
        discovery.stale.push(repo.id);
    }

    debug!(
        count = candidates.len(),
        stale = discovery.stale.len(),
        "default lists synced"
    );
    let mark_new = ctx.is_seeded();
    let mut set = JoinSet::new();
    for (full_name, category) in candidates {
        let ctx = ctx.clone();
        let aborted = Arc::clone(aborted);
        set.spawn(async move {
            if aborted.load(Ordering::SeqCst) {
                return None;
            }
            match register_default(&ctx, &full_name, category, mark_new).await {
                Ok(registered) => registered,
                Err(HacsError::RateLimited { .. }) => {
                    aborted.store(true, Ordering::SeqCst);
                    None
                }
                Err(err) => {
                    debug!(repo = %full_name, "skipping default list entry: {err}");
                    None
                }
            }
        });
    }

    while let Some(joined) = set.join_next().await {
        if let Ok(Some(id)) = joined {
            discovery.registered.insert(id);
        }
    }
    Ok(discovery)
}

async fn register_default(
    ctx: &HacsContext,
    full_name: &str,
    category: Category,
    mark_new: bool,
) -> HacsResult<Option<String>> {
    let name = full_name.to_string();
    let info = ctx.call(move |c| c.get_repository(&name)).await?;

    let mut repo = Repository::new(info.id, info.full_name, category, info.default_branch);
    repo.new = mark_new;
    fetch_metadata(ctx, &repo).await?.apply(&mut repo);
    if !repo.is_valid() {
        debug!(
            repo = %repo.full_name,
            errors = ?repo.validation_errors,
            "default list entry does not validate"
        );
        return Ok(None);
    }

    match ctx.registry().register(repo) {
        Ok(repo) => {
            ctx.emit_changed(&repo);
            Ok(Some(repo.id))
        }
        Err(HacsError::DuplicateRepository(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Requests an immediate full cycle from a running [`UpdateScheduler`].
#[derive(Clone)]
pub struct SchedulerTrigger {
    tx: mpsc::Sender<()>,
}

impl SchedulerTrigger {
    /// Returns false when a run is already queued or the scheduler stopped.
    pub fn trigger(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}

/// Drives the installed and full cycles on their timers.
///
/// A full cycle runs at start. Cycles never overlap. An aborted cycle is retried after the
/// rate limit backoff.
pub struct UpdateScheduler {
    ctx: HacsContext,
    tx: mpsc::Sender<()>,
    rx: mpsc::Receiver<()>,
}

impl UpdateScheduler {
    pub fn new(ctx: HacsContext) -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self { ctx, tx, rx }
    }

    pub fn trigger(&self) -> SchedulerTrigger {
        SchedulerTrigger {
            tx: self.tx.clone(),
        }
    }

    async fn run_once(&self, kind: CycleKind) -> Option<CycleKind> {
        match run_cycle(&self.ctx, kind).await {
            Ok(report) if report.aborted => Some(kind),
            Ok(_) => None,
            Err(err) => {
                error!(kind = %kind, "refresh cycle failed: {err}");
                None
            }
        }
    }

    /// Runs until `shutdown` resolves.
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let config = self.ctx.config();
        let (installed_every, full_every, backoff) = (
            config.installed_interval(),
            config.full_interval(),
            config.rate_limit_backoff(),
        );
        debug!(
            installed = %format_duration(installed_every),
            full = %format_duration(full_every),
            "scheduler started"
        );

        let start = Instant::now();
        let mut installed_tick = time::interval_at(start + installed_every, installed_every);
        installed_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut full_tick = time::interval_at(start + full_every, full_every);
        full_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let retry = time::sleep(backoff);
        tokio::pin!(retry);
        tokio::pin!(shutdown);

        let mut pending_retry = self.run_once(CycleKind::Full).await;
        if pending_retry.is_some() {
            retry.as_mut().reset(Instant::now() + backoff);
        }

        loop {
            let kind = tokio::select! {
                _ = &mut shutdown => break,
                _ = installed_tick.tick() => CycleKind::Installed,
                _ = full_tick.tick() => CycleKind::Full,
                Some(()) = self.rx.recv() => {
                    debug!("manual refresh requested");
                    CycleKind::Full
                }
                () = &mut retry, if pending_retry.is_some() => {
                    pending_retry.take().unwrap_or(CycleKind::Full)
                }
            };

            if let Some(retry_kind) = self.run_once(kind).await {
                // a retried full cycle covers the installed repositories too
                pending_retry = match pending_retry {
                    Some(CycleKind::Full) => Some(CycleKind::Full),
                    _ => Some(retry_kind),
                };
                retry.as_mut().reset(Instant::now() + backoff);
            } else if kind == CycleKind::Full || pending_retry == Some(kind) {
                pending_retry = None;
            }
        }
        debug!("scheduler stopped");
    }
}
