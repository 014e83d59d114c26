//! Per-repository metadata refresh.

use hacs_core::{
    validate::{self, ContentLayout},
    version, Category, HacsError, HacsResult, MetadataUpdate, Repository, RepositoryManifest,
};
use tracing::{debug, trace, warn};

use crate::HacsContext;

const REPOSITORY_MANIFEST: &str = "hacs.json";

/// Fetches everything a refresh merges into `repo`.
///
/// A repository that vanished upstream fails with [`HacsError::Unreachable`]. Structural
/// problems are not errors: they end up in `validation_errors`.
pub async fn fetch_metadata(ctx: &HacsContext, repo: &Repository) -> HacsResult<MetadataUpdate> {
    let full_name = repo.full_name.clone();
    let limit = ctx.settings()?.release_limit;

    let name = full_name.clone();
    let info = ctx.call(move |c| c.get_repository(&name)).await?;

    let name = full_name.clone();
    let releases = ctx.call(move |c| c.get_releases(&name, limit)).await?;

    let name = full_name.clone();
    let sha = ctx.call(move |c| c.get_default_branch_sha(&name)).await?;

    let tags: Vec<String> = releases.iter().map(|r| r.tag.clone()).collect();
    let flagged: Vec<String> = releases
        .iter()
        .filter(|r| r.prerelease)
        .map(|r| r.tag.clone())
        .collect();
    let available = version::resolve_flagged(&tags, &flagged, &sha, repo.beta);
    let reference = if tags.is_empty() {
        info.default_branch.clone()
    } else {
        available.clone()
    };

    let name = full_name.clone();
    let tree_ref = reference.clone();
    let tree = ctx.call(move |c| c.get_tree(&name, &tree_ref)).await?;

    let mut validation_errors = Vec::new();
    let manifest = if tree.iter().any(|p| p == REPOSITORY_MANIFEST) {
        let bytes = fetch_file(ctx, &full_name, &reference, REPOSITORY_MANIFEST).await?;
        match RepositoryManifest::from_json(&bytes) {
            Ok(manifest) => manifest,
            Err(err) => {
                validation_errors.push(format!("invalid {REPOSITORY_MANIFEST}: {err}"));
                RepositoryManifest::default()
            }
        }
    } else {
        RepositoryManifest::default()
    };
    if let Some(keep) = manifest.persistent_directory.as_deref() {
        if !validate::is_safe_relative(keep) {
            validation_errors.push(format!(
                "persistent_directory {keep:?} must be a path inside the content"
            ));
        }
    }

    let mut domain = None;
    let mut content_path = None;
    match validate::locate_content(repo.category, &full_name, &manifest, &tree) {
        Ok(layout) => {
            if repo.category == Category::Integration {
                match integration_domain(ctx, &full_name, &reference, &layout).await {
                    Ok(found) => domain = Some(found),
                    Err(HacsError::Validation { reason, .. }) => validation_errors.push(reason),
                    Err(err) => return Err(err),
                }
            }
            content_path = Some(layout.remote_path);
        }
        Err(HacsError::Validation { reason, .. }) => validation_errors.push(reason),
        Err(err) => return Err(err),
    }

    if !validation_errors.is_empty() {
        debug!(repo = %full_name, errors = ?validation_errors, "repository failed validation");
    }

    let selected_tag = match &repo.selected_tag {
        Some(tag) if *tag != info.default_branch && !tags.contains(tag) => {
            warn!(
                repo = %full_name,
                tag = %tag,
                "selected version no longer exists upstream, clearing it"
            );
            Some(None)
        }
        _ => None,
    };

    Ok(MetadataUpdate {
        releases: Some(tags),
        prereleases: Some(flagged),
        default_branch: Some(info.default_branch),
        default_branch_sha: Some(sha),
        selected_tag,
        unreachable: Some(false),
        archived: Some(info.archived),
        validation_errors: Some(validation_errors),
        domain,
        content_path,
        manifest: Some(manifest),
        description: info.description,
        stars: Some(info.stars),
        ..Default::default()
    })
}

pub(crate) async fn fetch_file(
    ctx: &HacsContext,
    full_name: &str,
    reference: &str,
    path: &str,
) -> HacsResult<Vec<u8>> {
    let (name, reference, path) = (full_name.to_string(), reference.to_string(), path.to_string());
    ctx.call(move |c| c.get_file(&name, &reference, &path)).await
}

/// Reads the integration domain from the `manifest.json` at `reference`.
pub(crate) async fn integration_domain(
    ctx: &HacsContext,
    full_name: &str,
    reference: &str,
    layout: &ContentLayout,
) -> HacsResult<String> {
    let Some(manifest_path) = &layout.manifest_path else {
        return Err(HacsError::Validation {
            full_name: full_name.to_string(),
            reason: "manifest.json is missing".into(),
        });
    };
    let bytes = fetch_file(ctx, full_name, reference, manifest_path).await?;
    Ok(validate::parse_integration_manifest(full_name, &bytes)?.domain)
}

/// Refreshes one tracked repository and merges the result into the registry.
///
/// A repository missing upstream keeps its local state and is flagged unreachable. The
/// caller persists.
pub async fn refresh_repository(ctx: &HacsContext, id: &str) -> HacsResult<Repository> {
    let before = ctx.registry().get(id)?;
    trace!(repo = %before.full_name, "refreshing repository");

    let update = match fetch_metadata(ctx, &before).await {
        Ok(update) => update,
        Err(HacsError::Unreachable(_)) => {
            warn!(repo = %before.full_name, "repository is no longer reachable upstream");
            MetadataUpdate {
                unreachable: Some(true),
                ..Default::default()
            }
        }
        Err(err) => return Err(err),
    };

    let after = ctx.registry().merge_metadata(id, update)?;
    if after != before {
        debug!(
            repo = %after.full_name,
            available = %after.available_version,
            "repository metadata changed"
        );
        ctx.emit_changed(&after);
    }
    Ok(after)
}
