//! Install, upgrade, uninstall and version pinning.
//!
//! Every operation holds the repository's lock for its whole duration and touches the
//! registry only after the filesystem work finished. Recording the result in the registry
//! is the commit point: a store write that fails afterwards is reported but does not turn
//! the operation into a failure. Content is fetched completely before
//! anything on disk changes, written to a staging directory next to the target, and then
//! swapped in place of the old directory.

use std::path::{Path, PathBuf};

use hacs_core::{
    lock::OperationGuard,
    validate, version, Category, HacsError, HacsResult, MetadataUpdate, Repository,
};
use hacs_events::{HacsEvent, InstallStage, OperationId, OperationKind};
use hacs_utils::fs::{
    ensure_dir_exists, ensure_within, replace_dir, replace_dir_keeping, safe_remove, write_file,
};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::{
    refresh::{fetch_file, integration_domain},
    HacsContext,
};

fn acquire(ctx: &HacsContext, repo: &Repository) -> HacsResult<OperationGuard> {
    ctx.locks()
        .try_acquire(&repo.id)
        .ok_or_else(|| HacsError::OperationInProgress(repo.full_name.clone()))
}

/// Runs `op` under the lock of `id`, wrapping it with operation events.
async fn with_operation<F, Fut>(
    ctx: &HacsContext,
    id: &str,
    kind: OperationKind,
    op: F,
) -> HacsResult<Repository>
where
    F: FnOnce(OperationGuard, Repository, OperationId) -> Fut,
    Fut: std::future::Future<Output = HacsResult<Repository>>,
{
    let repo = ctx.registry().get(id)?;
    let guard = acquire(ctx, &repo)?;
    // reread under the lock, the record may have changed while we waited for it
    let repo = ctx.registry().get(id)?;
    let op_id = ctx.next_op_id();

    ctx.emit(HacsEvent::OperationStarted {
        op_id,
        id: repo.id.clone(),
        full_name: repo.full_name.clone(),
        action: kind,
    });

    let (id, full_name) = (repo.id.clone(), repo.full_name.clone());
    match op(guard, repo, op_id).await {
        Ok(repo) => {
            ctx.emit(HacsEvent::OperationComplete {
                op_id,
                id,
                full_name,
                action: kind,
            });
            ctx.emit_changed(&repo);
            ctx.persist_committed();
            Ok(repo)
        }
        Err(err) => {
            warn!(repo = %full_name, action = %kind, "operation failed: {err}");
            ctx.emit(HacsEvent::OperationFailed {
                op_id,
                id,
                full_name,
                action: kind,
                error: err.to_string(),
            });
            Err(err)
        }
    }
}

/// Installs the pinned version, or the available version, of a repository.
pub async fn install(ctx: &HacsContext, id: &str) -> HacsResult<Repository> {
    with_operation(ctx, id, OperationKind::Install, |guard, repo, op_id| {
        async move {
            let reference = repo.target_ref();
            deploy(ctx, &guard, &repo, &reference, op_id).await
        }
    })
    .await
}

/// Moves an installed repository to its pinned or available version.
pub async fn upgrade(ctx: &HacsContext, id: &str) -> HacsResult<Repository> {
    with_operation(ctx, id, OperationKind::Upgrade, |guard, repo, op_id| {
        async move {
            if !repo.installed {
                return Err(HacsError::NotInstalled(repo.full_name.clone()));
            }
            let reference = repo.target_ref();
            deploy(ctx, &guard, &repo, &reference, op_id).await
        }
    })
    .await
}

/// Deletes the installed content and clears the install fields.
pub async fn uninstall(ctx: &HacsContext, id: &str) -> HacsResult<Repository> {
    with_operation(ctx, id, OperationKind::Uninstall, |guard, repo, _| {
        async move {
            if !repo.installed {
                return Err(HacsError::NotInstalled(repo.full_name.clone()));
            }

            if let Some(local_path) = &repo.local_path {
                let path = PathBuf::from(local_path);
                ensure_within(&path, &Category::roots(ctx.config())?)?;
                debug!(path = %path.display(), "removing installed content");
                safe_remove(&path)?;
            }

            let updated = ctx.registry().record_uninstall(&guard)?;
            debug!(repo = %updated.full_name, "uninstalled");
            Ok(updated)
        }
    })
    .await
}

/// Pins `tag` for the next install or upgrade.
///
/// `tag` must be one of the tracked releases or the default branch.
pub async fn set_version(ctx: &HacsContext, id: &str, tag: &str) -> HacsResult<Repository> {
    let tag = tag.trim().to_string();
    with_operation(ctx, id, OperationKind::SetVersion, |guard, repo, _| {
        async move {
            let _guard = guard;
            if !repo.accepts_version(&tag) {
                return Err(HacsError::InvalidVersion {
                    full_name: repo.full_name.clone(),
                    tag,
                });
            }
            let updated = ctx.registry().merge_metadata(
                &repo.id,
                MetadataUpdate {
                    selected_tag: Some(Some(tag)),
                    ..Default::default()
                },
            )?;
            Ok(updated)
        }
    })
    .await
}

async fn fetch_content(
    ctx: &HacsContext,
    full_name: &str,
    reference: &str,
    files: Vec<(String, String)>,
) -> HacsResult<Vec<(String, Vec<u8>)>> {
    let mut set = JoinSet::new();
    for (index, (remote, relative)) in files.into_iter().enumerate() {
        let ctx = ctx.clone();
        let (full_name, reference) = (full_name.to_string(), reference.to_string());
        set.spawn(async move {
            let bytes = fetch_file(&ctx, &full_name, &reference, &remote).await?;
            Ok::<_, HacsError>((index, relative, bytes))
        });
    }

    let mut fetched = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        let item = joined.map_err(|err| HacsError::Custom(format!("Join handle error: {err}")))??;
        fetched.push(item);
    }
    fetched.sort_by_key(|(index, ..)| *index);
    Ok(fetched
        .into_iter()
        .map(|(_, relative, bytes)| (relative, bytes))
        .collect())
}

/// Version recorded for a deployed ref. Branches are recorded as their short sha, so an
/// install without releases matches the available version.
async fn installed_version_for(
    ctx: &HacsContext,
    repo: &Repository,
    reference: &str,
) -> HacsResult<String> {
    if reference != repo.default_branch || repo.releases.iter().any(|r| r == reference) {
        return Ok(reference.to_string());
    }
    let sha = match &repo.default_branch_sha {
        Some(sha) => sha.clone(),
        None => {
            let name = repo.full_name.clone();
            ctx.call(move |c| c.get_default_branch_sha(&name)).await?
        }
    };
    Ok(version::short_sha(&sha))
}

fn stage(root: &Path, files: &[(String, Vec<u8>)]) -> HacsResult<tempfile::TempDir> {
    ensure_dir_exists(root)?;
    let staging = tempfile::Builder::new()
        .prefix(".hacs-staging-")
        .tempdir_in(root)
        .map_err(|err| {
            HacsError::IoError {
                action: format!("creating staging directory in {}", root.display()),
                source: err,
            }
        })?;
    for (relative, bytes) in files {
        write_file(staging.path().join(relative), bytes)?;
    }
    Ok(staging)
}

async fn deploy(
    ctx: &HacsContext,
    guard: &OperationGuard,
    repo: &Repository,
    reference: &str,
    op_id: OperationId,
) -> HacsResult<Repository> {
    let full_name = repo.full_name.clone();
    let stage_event = |stage: InstallStage| {
        ctx.emit(HacsEvent::Installing {
            op_id,
            full_name: full_name.clone(),
            stage,
        })
    };

    let name = full_name.clone();
    let tree_ref = reference.to_string();
    let tree = ctx.call(move |c| c.get_tree(&name, &tree_ref)).await?;
    let layout = validate::locate_content(repo.category, &full_name, &repo.manifest, &tree)?;
    let files = validate::files_to_download(repo.category, &layout, &tree);
    if files.is_empty() {
        return Err(HacsError::Validation {
            full_name: full_name.clone(),
            reason: format!("no files to install at {reference}"),
        });
    }

    let domain = match repo.category {
        Category::Integration => Some(integration_domain(ctx, &full_name, reference, &layout).await?),
        _ => None,
    };

    stage_event(InstallStage::Fetching {
        reference: reference.to_string(),
        files: files.len(),
    });
    let content = fetch_content(ctx, &full_name, reference, files).await?;
    let version = installed_version_for(ctx, repo, reference).await?;

    let mut target_repo = repo.clone();
    if domain.is_some() {
        target_repo.domain = domain;
    }
    let target = target_repo.local_path_for(ctx.config())?;
    let roots = Category::roots(ctx.config())?;
    ensure_within(&target, &roots)?;
    let root = repo.category.install_root(ctx.config())?;

    stage_event(InstallStage::Writing);
    let staging = stage(&root, &content)?;

    stage_event(InstallStage::Swapping);
    debug!(
        repo = %full_name,
        target = %target.display(),
        "replacing installed content"
    );
    match repo.manifest.persistent_directory.as_deref() {
        Some(keep) => replace_dir_keeping(staging.path(), &target, Path::new(keep))?,
        None => replace_dir(staging.path(), &target)?,
    }

    // a renamed integration domain leaves the previous directory behind
    if let Some(previous) = repo.local_path.as_deref().map(PathBuf::from) {
        if previous != target && ensure_within(&previous, &roots).is_ok() {
            if let Err(err) = safe_remove(&previous) {
                warn!(path = %previous.display(), "failed to remove previous install: {err}");
            }
        }
    }

    ctx.registry().merge_metadata(
        &repo.id,
        MetadataUpdate {
            domain: target_repo.domain.clone(),
            ..Default::default()
        },
    )?;
    let updated = ctx.registry().record_install(
        guard,
        version.clone(),
        target.display().to_string(),
        repo.category.requires_restart(),
    )?;

    stage_event(InstallStage::Complete {
        version: version.clone(),
    });
    debug!(repo = %full_name, version = %version, "installed");
    Ok(updated)
}
