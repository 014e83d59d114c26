//! Request/response command surface.
//!
//! Mutating commands answer with the refreshed listing so a client can redraw from a single
//! reply.

use hacs_config::{config::normalize_country, error::ConfigError};
use hacs_core::{store::Settings, Category, HacsError, HacsResult, MetadataUpdate, Repository};
use hacs_events::HacsEvent;
use hacs_github::name::parse_full_name;
use tracing::debug;

use crate::{
    install,
    refresh::{fetch_metadata, refresh_repository},
    HacsContext, RepositoryAction, SettingsUpdate,
};

/// Repositories visible in the store.
///
/// Hidden repositories are left out, as are repositories that fail validation or exclude the
/// configured country. Installed repositories are listed regardless of the last two.
pub fn list_repositories(ctx: &HacsContext) -> HacsResult<Vec<Repository>> {
    let country = ctx.settings()?.country;
    Ok(ctx
        .registry()
        .all()?
        .into_iter()
        .filter(|repo| !repo.hide)
        .filter(|repo| {
            repo.installed || (repo.is_valid() && repo.manifest.allows_country(&country))
        })
        .collect())
}

fn set_flags(ctx: &HacsContext, id: &str, update: MetadataUpdate) -> HacsResult<()> {
    let repo = ctx.registry().merge_metadata(id, update)?;
    ctx.persist()?;
    ctx.emit_changed(&repo);
    Ok(())
}

fn set_beta(ctx: &HacsContext, id: &str, beta: bool) -> HacsResult<()> {
    debug!(id, beta, "beta toggled");
    set_flags(
        ctx,
        id,
        MetadataUpdate {
            beta: Some(beta),
            ..Default::default()
        },
    )
}

pub async fn repository_action(
    ctx: &HacsContext,
    id: &str,
    action: RepositoryAction,
) -> HacsResult<Vec<Repository>> {
    debug!(id, action = %action, "repository action");
    match action {
        RepositoryAction::Install => {
            install::install(ctx, id).await?;
        }
        RepositoryAction::Upgrade => {
            install::upgrade(ctx, id).await?;
        }
        RepositoryAction::Uninstall => {
            install::uninstall(ctx, id).await?;
        }
        RepositoryAction::Hide | RepositoryAction::Unhide => {
            set_flags(
                ctx,
                id,
                MetadataUpdate {
                    hide: Some(action == RepositoryAction::Hide),
                    ..Default::default()
                },
            )?;
        }
        RepositoryAction::ShowBeta => set_beta(ctx, id, true)?,
        RepositoryAction::HideBeta => set_beta(ctx, id, false)?,
        RepositoryAction::ClearNew => {
            set_flags(
                ctx,
                id,
                MetadataUpdate {
                    new: Some(false),
                    ..Default::default()
                },
            )?;
        }
    }
    list_repositories(ctx)
}

pub async fn repository_set_version(
    ctx: &HacsContext,
    id: &str,
    tag: &str,
) -> HacsResult<Vec<Repository>> {
    install::set_version(ctx, id, tag).await?;
    list_repositories(ctx)
}

/// Refreshes one repository now. Unlike scheduled refreshes, transient errors reach the caller.
pub async fn repository_update(ctx: &HacsContext, id: &str) -> HacsResult<Vec<Repository>> {
    let repo = refresh_repository(ctx, id).await?;
    ctx.persist()?;
    debug!(repo = %repo.full_name, available = %repo.available_version, "repository updated");
    list_repositories(ctx)
}

/// Tracks a repository the user named.
///
/// A repository that fails validation stays registered, so it can be fixed upstream and picked
/// up by the next refresh, but the validation error is returned.
pub async fn add_custom_repository(
    ctx: &HacsContext,
    input: &str,
    category: Category,
) -> HacsResult<Vec<Repository>> {
    let full_name =
        parse_full_name(input).ok_or_else(|| HacsError::InvalidRepositoryName(input.to_string()))?;
    if ctx.registry().contains_name(&full_name)? {
        return Err(HacsError::DuplicateRepository(full_name));
    }

    let name = full_name.clone();
    let info = ctx.call(move |c| c.get_repository(&name)).await?;
    let mut repo = Repository::new(info.id, info.full_name, category, info.default_branch);
    repo.custom = true;
    fetch_metadata(ctx, &repo).await?.apply(&mut repo);

    let repo = ctx.registry().register(repo)?;
    ctx.persist()?;
    ctx.emit_changed(&repo);

    if !repo.is_valid() {
        return Err(HacsError::Validation {
            full_name: repo.full_name,
            reason: repo.validation_errors.join("; "),
        });
    }
    debug!(repo = %repo.full_name, category = %category, "added custom repository");
    list_repositories(ctx)
}

pub async fn remove_custom_repository(ctx: &HacsContext, id: &str) -> HacsResult<Vec<Repository>> {
    let repo = ctx.registry().get(id)?;
    if !repo.custom {
        return Err(HacsError::NotCustom(repo.full_name));
    }
    let _guard = ctx
        .locks()
        .try_acquire(&repo.id)
        .ok_or_else(|| HacsError::OperationInProgress(repo.full_name.clone()))?;

    let removed = ctx.registry().remove(&repo.id)?;
    ctx.persist()?;
    debug!(repo = %removed.full_name, "removed custom repository");
    ctx.emit(HacsEvent::RepositoryRemoved {
        id: removed.id,
        full_name: removed.full_name,
    });
    list_repositories(ctx)
}

/// Clears every pending restart once the host came back up. Returns how many were cleared.
pub fn acknowledge_restart(ctx: &HacsContext) -> HacsResult<usize> {
    let ids = ctx.registry().acknowledge_restart()?;
    ctx.persist()?;
    for id in &ids {
        if let Ok(repo) = ctx.registry().get(id) {
            ctx.emit_changed(&repo);
        }
    }
    debug!(cleared = ids.len(), "restart acknowledged");
    ctx.emit(HacsEvent::RestartAcknowledged { cleared: ids.len() });
    Ok(ids.len())
}

pub fn update_settings(ctx: &HacsContext, update: SettingsUpdate) -> HacsResult<Settings> {
    let mut settings = ctx.settings()?;
    if let Some(country) = update.country {
        settings.country = normalize_country(&country)?;
    }
    if let Some(limit) = update.release_limit {
        if limit == 0 {
            return Err(ConfigError::ZeroValue("release_limit").into());
        }
        settings.release_limit = limit;
    }
    if let Some(experimental) = update.experimental {
        settings.experimental = experimental;
    }

    ctx.set_settings(settings.clone())?;
    ctx.persist()?;
    debug!(
        country = %settings.country,
        release_limit = settings.release_limit,
        experimental = settings.experimental,
        "settings updated"
    );
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use hacs_github::ClientError;

    use super::*;
    use crate::test_utils::{integration, plugin, TestEnv};

    async fn tracked(env: &TestEnv, versions: &[&str]) -> String {
        integration(&env.client, "1", "owner/thing", versions);
        let id = env.track("1", "owner/thing", Category::Integration);
        refresh_repository(&env.ctx, &id).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_list_excludes_hidden_invalid_and_foreign() {
        let env = TestEnv::new();
        let id = tracked(&env, &["1.0.0"]).await;

        env.client.add_repository("2", "owner/empty", "main");
        env.client.add_file("owner/empty", "main", "README.md", b"x");
        let empty = env.track("2", "owner/empty", Category::Integration);
        refresh_repository(&env.ctx, &empty).await.unwrap();

        plugin(&env.client, "3", "owner/norsk-card", &["1.0.0"]);
        env.client
            .add_file("owner/norsk-card", "1.0.0", "hacs.json", br#"{"country": "NO"}"#);
        let norsk = env.track("3", "owner/norsk-card", Category::Plugin);
        refresh_repository(&env.ctx, &norsk).await.unwrap();

        let names = |repos: Vec<Repository>| -> Vec<String> {
            repos.into_iter().map(|r| r.full_name).collect()
        };
        assert_eq!(
            names(list_repositories(&env.ctx).unwrap()),
            vec!["owner/thing", "owner/norsk-card"]
        );

        update_settings(
            &env.ctx,
            SettingsUpdate {
                country: Some("se".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let listed = repository_action(&env.ctx, &id, RepositoryAction::Hide)
            .await
            .unwrap();
        assert!(listed.is_empty());

        let listed = repository_action(&env.ctx, &id, RepositoryAction::Unhide)
            .await
            .unwrap();
        assert_eq!(names(listed), vec!["owner/thing"]);
    }

    #[tokio::test]
    async fn test_installed_repositories_ignore_country_filter() {
        let env = TestEnv::new();
        plugin(&env.client, "3", "owner/norsk-card", &["1.0.0"]);
        env.client
            .add_file("owner/norsk-card", "1.0.0", "hacs.json", br#"{"country": "NO"}"#);
        let id = env.track("3", "owner/norsk-card", Category::Plugin);
        refresh_repository(&env.ctx, &id).await.unwrap();
        repository_action(&env.ctx, &id, RepositoryAction::Install)
            .await
            .unwrap();

        update_settings(
            &env.ctx,
            SettingsUpdate {
                country: Some("DE".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(list_repositories(&env.ctx).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_beta_toggle_recomputes_available() {
        let env = TestEnv::new();
        let id = tracked(&env, &["2.0.0-beta1", "1.9.0"]).await;
        assert_eq!(env.ctx.registry().get(&id).unwrap().available_version, "1.9.0");

        repository_action(&env.ctx, &id, RepositoryAction::ShowBeta)
            .await
            .unwrap();
        let repo = env.ctx.registry().get(&id).unwrap();
        assert!(repo.beta);
        assert_eq!(repo.available_version, "2.0.0-beta1");

        // a refresh keeps the beta choice
        let repo = refresh_repository(&env.ctx, &id).await.unwrap();
        assert_eq!(repo.available_version, "2.0.0-beta1");

        repository_action(&env.ctx, &id, RepositoryAction::HideBeta)
            .await
            .unwrap();
        assert_eq!(env.ctx.registry().get(&id).unwrap().available_version, "1.9.0");
    }

    #[tokio::test]
    async fn test_action_install_and_clear_new() {
        let env = TestEnv::new();
        let id = tracked(&env, &["1.0.0"]).await;
        env.ctx
            .registry()
            .merge_metadata(
                &id,
                MetadataUpdate {
                    new: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();

        repository_action(&env.ctx, &id, RepositoryAction::ClearNew)
            .await
            .unwrap();
        assert!(!env.ctx.registry().get(&id).unwrap().new);

        let listed = repository_action(&env.ctx, &id, RepositoryAction::Install)
            .await
            .unwrap();
        assert!(listed[0].installed);
        let listed = repository_action(&env.ctx, &id, RepositoryAction::Uninstall)
            .await
            .unwrap();
        assert!(!listed[0].installed);
    }

    #[tokio::test]
    async fn test_set_version_rejects_unknown_tag() {
        let env = TestEnv::new();
        let id = tracked(&env, &["1.1.0", "1.0.0"]).await;

        let err = repository_set_version(&env.ctx, &id, "9.9.9")
            .await
            .unwrap_err();
        assert!(matches!(err, HacsError::InvalidVersion { .. }));

        repository_set_version(&env.ctx, &id, "1.0.0").await.unwrap();
        assert_eq!(
            env.ctx.registry().get(&id).unwrap().selected_tag.as_deref(),
            Some("1.0.0")
        );
    }

    #[tokio::test]
    async fn test_repository_update_surfaces_transient_errors() {
        let env = TestEnv::new();
        let id = tracked(&env, &["1.0.0"]).await;
        env.client.add_release("owner/thing", "1.1.0", false);
        env.client
            .add_integration_files("owner/thing", "1.1.0", "thing");

        let listed = repository_update(&env.ctx, &id).await.unwrap();
        assert_eq!(listed[0].available_version, "1.1.0");
        assert_eq!(
            env.restart().registry().get(&id).unwrap().available_version,
            "1.1.0"
        );

        env.client
            .fail_with(Some(ClientError::Network("reset".into())));
        let err = repository_update(&env.ctx, &id).await.unwrap_err();
        assert!(matches!(err, HacsError::Network(_)));
    }

    #[tokio::test]
    async fn test_add_custom_repository() {
        let env = TestEnv::new();
        integration(&env.client, "42", "owner/thing", &["1.0.0"]);

        let listed = add_custom_repository(
            &env.ctx,
            "https://github.com/owner/thing.git",
            Category::Integration,
        )
        .await
        .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "42");
        assert!(listed[0].custom);
        assert_eq!(listed[0].available_version, "1.0.0");

        let err = add_custom_repository(&env.ctx, "Owner/Thing", Category::Integration)
            .await
            .unwrap_err();
        assert!(matches!(err, HacsError::DuplicateRepository(_)));

        let err = add_custom_repository(&env.ctx, "not a repo", Category::Integration)
            .await
            .unwrap_err();
        assert!(matches!(err, HacsError::InvalidRepositoryName(_)));
        assert_eq!(env.ctx.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_add_custom_repository_keeps_invalid_entry_unlisted() {
        let env = TestEnv::new();
        env.client.add_repository("9", "owner/broken", "main");
        env.client.add_file("owner/broken", "main", "README.md", b"x");

        let err = add_custom_repository(&env.ctx, "owner/broken", Category::Theme)
            .await
            .unwrap_err();
        assert!(matches!(err, HacsError::Validation { .. }));
        assert!(env.ctx.registry().get("9").unwrap().custom);
        assert!(list_repositories(&env.ctx).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_custom_repository_missing_upstream() {
        let env = TestEnv::new();
        let err = add_custom_repository(&env.ctx, "owner/ghost", Category::Plugin)
            .await
            .unwrap_err();
        assert!(matches!(err, HacsError::Unreachable(_)));
        assert!(env.ctx.registry().is_empty());
    }

    #[tokio::test]
    async fn test_remove_custom_repository() {
        let env = TestEnv::new();
        integration(&env.client, "42", "owner/thing", &["1.0.0"]);
        add_custom_repository(&env.ctx, "owner/thing", Category::Integration)
            .await
            .unwrap();

        repository_action(&env.ctx, "42", RepositoryAction::Install)
            .await
            .unwrap();
        let err = remove_custom_repository(&env.ctx, "42").await.unwrap_err();
        assert!(matches!(err, HacsError::CannotRemoveInstalled(_)));

        repository_action(&env.ctx, "42", RepositoryAction::Uninstall)
            .await
            .unwrap();
        let guard = env.ctx.locks().try_acquire("42").unwrap();
        let err = remove_custom_repository(&env.ctx, "42").await.unwrap_err();
        assert!(matches!(err, HacsError::OperationInProgress(_)));
        drop(guard);

        let listed = remove_custom_repository(&env.ctx, "42").await.unwrap();
        assert!(listed.is_empty());
        assert!(env.restart().registry().is_empty());
        assert!(env
            .events
            .events()
            .iter()
            .any(|e| matches!(e, HacsEvent::RepositoryRemoved { .. })));
    }

    #[tokio::test]
    async fn test_remove_rejects_default_entries() {
        let env = TestEnv::new();
        let id = tracked(&env, &["1.0.0"]).await;
        let err = remove_custom_repository(&env.ctx, &id).await.unwrap_err();
        assert!(matches!(err, HacsError::NotCustom(_)));
    }

    #[tokio::test]
    async fn test_acknowledge_restart_clears_flags() {
        let env = TestEnv::new();
        let id = tracked(&env, &["1.0.0"]).await;
        repository_action(&env.ctx, &id, RepositoryAction::Install)
            .await
            .unwrap();
        assert!(env.ctx.registry().get(&id).unwrap().restart_pending);

        assert_eq!(acknowledge_restart(&env.ctx).unwrap(), 1);
        assert!(!env.restart().registry().get(&id).unwrap().restart_pending);
        assert_eq!(acknowledge_restart(&env.ctx).unwrap(), 0);
        assert!(env
            .events
            .events()
            .contains(&HacsEvent::RestartAcknowledged { cleared: 1 }));
    }

    #[tokio::test]
    async fn test_update_settings_validates_and_persists() {
        let env = TestEnv::new();
        let settings = update_settings(
            &env.ctx,
            SettingsUpdate {
                country: Some("no".into()),
                release_limit: Some(2),
                experimental: Some(true),
            },
        )
        .unwrap();
        assert_eq!(settings.country, "NO");

        let restored = env.restart();
        assert_eq!(restored.settings().unwrap(), settings);

        let err = update_settings(
            &env.ctx,
            SettingsUpdate {
                release_limit: Some(0),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, HacsError::Config(ConfigError::ZeroValue(_))));

        assert!(update_settings(
            &env.ctx,
            SettingsUpdate {
                country: Some("Norway".into()),
                ..Default::default()
            },
        )
        .is_err());
        assert_eq!(env.ctx.settings().unwrap(), settings);
    }

    #[tokio::test]
    async fn test_release_limit_bounds_refresh() {
        let env = TestEnv::new();
        let id = tracked(&env, &["1.2.0", "1.1.0", "1.0.0"]).await;
        update_settings(
            &env.ctx,
            SettingsUpdate {
                release_limit: Some(2),
                ..Default::default()
            },
        )
        .unwrap();
        let repo = refresh_repository(&env.ctx, &id).await.unwrap();
        assert_eq!(repo.releases, vec!["1.2.0", "1.1.0"]);
    }
}
