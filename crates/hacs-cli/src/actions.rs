use hacs_core::{Category, HacsResult};
use hacs_events::CycleKind;
use hacs_operations::{
    acknowledge_restart, add_custom_repository, remove_custom_repository, repository_action,
    repository_set_version, repository_update, run_cycle, update_settings, HacsContext,
    RepositoryAction, SchedulerTrigger, SettingsUpdate, UpdateScheduler,
};
use nu_ansi_term::Color::{Cyan, Green, Yellow};
use tracing::{debug, info, warn};

use crate::utils::{resolve_repo, Colored, Icons};

pub async fn run_action(ctx: &HacsContext, query: &str, action: RepositoryAction) -> HacsResult<()> {
    let repo = resolve_repo(ctx, query)?;
    repository_action(ctx, &repo.id, action).await?;
    let repo = ctx.registry().get(&repo.id)?;

    match action {
        RepositoryAction::Install | RepositoryAction::Upgrade => {
            if repo.restart_pending {
                info!(
                    "{} Restart Home Assistant to load {}",
                    Colored(Yellow, Icons::RESTART),
                    Colored(Cyan, &repo.full_name)
                );
            }
        }
        RepositoryAction::Uninstall => {
            info!(
                "{} Uninstalled {}",
                Colored(Green, Icons::CHECK),
                Colored(Cyan, &repo.full_name)
            );
        }
        RepositoryAction::ShowBeta | RepositoryAction::HideBeta => {
            info!(
                "{} {} now resolves to {}",
                Colored(Green, Icons::CHECK),
                Colored(Cyan, &repo.full_name),
                Colored(Green, &repo.available_version)
            );
        }
        RepositoryAction::Hide | RepositoryAction::Unhide | RepositoryAction::ClearNew => {
            info!(
                "{} {} {}",
                Colored(Green, Icons::CHECK),
                action,
                Colored(Cyan, &repo.full_name)
            );
        }
    }
    Ok(())
}

pub async fn set_version(ctx: &HacsContext, query: &str, tag: &str) -> HacsResult<()> {
    let repo = resolve_repo(ctx, query)?;
    repository_set_version(ctx, &repo.id, tag).await?;
    info!(
        "{} {} pinned to {}",
        Colored(Green, Icons::CHECK),
        Colored(Cyan, &repo.full_name),
        Colored(Green, tag.trim())
    );
    Ok(())
}

pub async fn update(ctx: &HacsContext, query: &str) -> HacsResult<()> {
    let repo = resolve_repo(ctx, query)?;
    repository_update(ctx, &repo.id).await?;
    let repo = ctx.registry().get(&repo.id)?;
    if repo.unreachable {
        warn!("{} is no longer reachable upstream", repo.full_name);
    }
    info!(
        "{} {} available: {}",
        Colored(Green, Icons::CHECK),
        Colored(Cyan, &repo.full_name),
        Colored(Green, &repo.available_version)
    );
    Ok(())
}

pub async fn add(ctx: &HacsContext, name: &str, category: Category) -> HacsResult<()> {
    add_custom_repository(ctx, name, category).await?;
    info!(
        "{} Added {} as {}",
        Colored(Green, Icons::CHECK),
        Colored(Cyan, name),
        category
    );
    Ok(())
}

pub async fn remove(ctx: &HacsContext, query: &str) -> HacsResult<()> {
    let repo = resolve_repo(ctx, query)?;
    remove_custom_repository(ctx, &repo.id).await?;
    info!(
        "{} Removed {}",
        Colored(Green, Icons::CHECK),
        Colored(Cyan, &repo.full_name)
    );
    Ok(())
}

pub async fn sync(ctx: &HacsContext) -> HacsResult<()> {
    let report = run_cycle(ctx, CycleKind::Full).await?;
    if report.discovered > 0 || report.pruned > 0 {
        info!(
            "{} new, {} removed",
            Colored(Green, report.discovered),
            Colored(Yellow, report.pruned)
        );
    }
    Ok(())
}

/// Queues a full refresh on every SIGHUP.
#[cfg(unix)]
async fn forward_hangups(
    mut hangups: tokio::signal::unix::Signal,
    trigger: impl Fn() -> bool,
) {
    while hangups.recv().await.is_some() {
        if trigger() {
            info!("Refresh requested");
        } else {
            debug!("refresh already queued");
        }
    }
}

#[cfg(unix)]
fn listen_for_hangups(trigger: SchedulerTrigger) -> Option<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::hangup()) {
        Ok(hangups) => {
            Some(tokio::spawn(forward_hangups(hangups, move || {
                trigger.trigger()
            })))
        }
        Err(err) => {
            warn!("failed to listen for SIGHUP, manual refresh disabled: {err}");
            None
        }
    }
}

#[cfg(not(unix))]
fn listen_for_hangups(_trigger: SchedulerTrigger) -> Option<tokio::task::JoinHandle<()>> {
    None
}

pub async fn daemon(ctx: &HacsContext) -> HacsResult<()> {
    let scheduler = UpdateScheduler::new(ctx.clone());
    let hangups = listen_for_hangups(scheduler.trigger());
    if cfg!(unix) {
        info!("Running until interrupted (Ctrl-C), send SIGHUP to refresh now");
    } else {
        info!("Running until interrupted (Ctrl-C)");
    }

    scheduler
        .run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for Ctrl-C, stopping: {err}");
            }
        })
        .await;

    if let Some(handle) = hangups {
        handle.abort();
    }
    debug!("daemon stopped");
    Ok(())
}

pub fn restarted(ctx: &HacsContext) -> HacsResult<()> {
    let cleared = acknowledge_restart(ctx)?;
    info!(
        "{} Cleared {} pending restart(s)",
        Colored(Green, Icons::CHECK),
        cleared
    );
    Ok(())
}

pub fn settings(ctx: &HacsContext, update: SettingsUpdate) -> HacsResult<()> {
    let changed =
        update.country.is_some() || update.release_limit.is_some() || update.experimental.is_some();
    let settings = if changed {
        update_settings(ctx, update)?
    } else {
        ctx.settings()?
    };

    info!("country = {}", Colored(Cyan, &settings.country));
    info!("release_limit = {}", Colored(Cyan, settings.release_limit));
    info!("experimental = {}", Colored(Cyan, settings.experimental));
    Ok(())
}
