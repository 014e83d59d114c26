//! In-memory registry of tracked repositories.

use std::{collections::HashMap, sync::RwLock};

use tracing::{debug, warn};

use crate::{
    error::HacsError,
    lock::OperationGuard,
    model::{MetadataUpdate, Repository},
    HacsResult,
};

#[derive(Debug, Default)]
struct Inner {
    /// Insertion order.
    repos: Vec<Repository>,
    by_id: HashMap<String, usize>,
}

impl Inner {
    fn position_by_name(&self, full_name: &str) -> Option<usize> {
        self.repos
            .iter()
            .position(|repo| repo.full_name.eq_ignore_ascii_case(full_name))
    }

    fn reindex(&mut self) {
        self.by_id = self
            .repos
            .iter()
            .enumerate()
            .map(|(idx, repo)| (repo.id.clone(), idx))
            .collect();
    }

    fn get_mut(&mut self, id: &str) -> HacsResult<&mut Repository> {
        let idx = *self
            .by_id
            .get(id)
            .ok_or_else(|| HacsError::NotFound(id.to_string()))?;
        Ok(&mut self.repos[idx])
    }
}

/// Single source of truth for repository records.
///
/// Metadata changes go through [`Registry::merge_metadata`]. Install fields change only
/// through the `record_*` methods, which require the repository's [`OperationGuard`].
#[derive(Debug, Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a registry from stored records.
    ///
    /// Records repeating an id or name are dropped. Records claiming to be installed without
    /// a version or a path are treated as not installed.
    pub fn from_snapshot(records: Vec<Repository>) -> Self {
        let mut inner = Inner::default();
        for mut repo in records {
            if inner.by_id.contains_key(&repo.id) || inner.position_by_name(&repo.full_name).is_some()
            {
                warn!(
                    id = %repo.id,
                    repo = %repo.full_name,
                    "skipping duplicate repository record"
                );
                continue;
            }
            if repo.installed && (repo.installed_version.is_none() || repo.local_path.is_none()) {
                warn!(
                    repo = %repo.full_name,
                    "repository marked installed without version or path, treating as not installed"
                );
                repo.installed = false;
                repo.installed_version = None;
                repo.local_path = None;
                repo.restart_pending = false;
            }
            inner.by_id.insert(repo.id.clone(), inner.repos.len());
            inner.repos.push(repo);
        }
        Self {
            inner: RwLock::new(inner),
        }
    }

    pub fn register(&self, repo: Repository) -> HacsResult<Repository> {
        let mut inner = self.inner.write()?;
        if inner.by_id.contains_key(&repo.id) || inner.position_by_name(&repo.full_name).is_some() {
            return Err(HacsError::DuplicateRepository(repo.full_name));
        }
        debug!(id = %repo.id, repo = %repo.full_name, "registering repository");
        let idx = inner.repos.len();
        inner.by_id.insert(repo.id.clone(), idx);
        inner.repos.push(repo.clone());
        Ok(repo)
    }

    pub fn merge_metadata(&self, id: &str, update: MetadataUpdate) -> HacsResult<Repository> {
        let mut inner = self.inner.write()?;
        let repo = inner.get_mut(id)?;
        update.apply(repo);
        Ok(repo.clone())
    }

    pub fn get(&self, id: &str) -> HacsResult<Repository> {
        let inner = self.inner.read()?;
        inner
            .by_id
            .get(id)
            .map(|&idx| inner.repos[idx].clone())
            .ok_or_else(|| HacsError::NotFound(id.to_string()))
    }

    /// Looks a repository up by id, then by case-insensitive `full_name`.
    pub fn find(&self, id_or_name: &str) -> HacsResult<Repository> {
        let inner = self.inner.read()?;
        inner
            .by_id
            .get(id_or_name)
            .copied()
            .or_else(|| inner.position_by_name(id_or_name))
            .map(|idx| inner.repos[idx].clone())
            .ok_or_else(|| HacsError::NotFound(id_or_name.to_string()))
    }

    pub fn contains_name(&self, full_name: &str) -> HacsResult<bool> {
        Ok(self.inner.read()?.position_by_name(full_name).is_some())
    }

    /// Snapshot of every record in insertion order.
    pub fn all(&self) -> HacsResult<Vec<Repository>> {
        Ok(self.inner.read()?.repos.clone())
    }

    pub fn remove(&self, id: &str) -> HacsResult<Repository> {
        let mut inner = self.inner.write()?;
        let idx = *inner
            .by_id
            .get(id)
            .ok_or_else(|| HacsError::NotFound(id.to_string()))?;
        if inner.repos[idx].installed {
            return Err(HacsError::CannotRemoveInstalled(
                inner.repos[idx].full_name.clone(),
            ));
        }
        let repo = inner.repos.remove(idx);
        inner.reindex();
        debug!(id = %repo.id, repo = %repo.full_name, "removed repository");
        Ok(repo)
    }

    /// Marks the guarded repository installed. Consumes the pin and the `new` flag.
    pub fn record_install(
        &self,
        guard: &OperationGuard,
        version: impl Into<String>,
        local_path: impl Into<String>,
        restart_pending: bool,
    ) -> HacsResult<Repository> {
        let mut inner = self.inner.write()?;
        let repo = inner.get_mut(guard.id())?;
        repo.installed = true;
        repo.installed_version = Some(version.into());
        repo.local_path = Some(local_path.into());
        repo.restart_pending = restart_pending;
        repo.selected_tag = None;
        repo.new = false;
        Ok(repo.clone())
    }

    pub fn record_uninstall(&self, guard: &OperationGuard) -> HacsResult<Repository> {
        let mut inner = self.inner.write()?;
        let repo = inner.get_mut(guard.id())?;
        repo.installed = false;
        repo.installed_version = None;
        repo.local_path = None;
        repo.restart_pending = false;
        Ok(repo.clone())
    }

    /// Clears `restart_pending` everywhere. Returns the ids that changed.
    pub fn acknowledge_restart(&self) -> HacsResult<Vec<String>> {
        let mut inner = self.inner.write()?;
        Ok(inner
            .repos
            .iter_mut()
            .filter(|repo| repo.restart_pending)
            .map(|repo| {
                repo.restart_pending = false;
                repo.id.clone()
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.repos.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lock::OperationLocks, model::Category};

    fn repo(id: &str, name: &str) -> Repository {
        Repository::new(id, name, Category::Integration, "main")
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let registry = Registry::new();
        registry.register(repo("1", "owner/a")).unwrap();

        let err = registry.register(repo("2", "Owner/A")).unwrap_err();
        assert!(matches!(err, HacsError::DuplicateRepository(_)));
        let err = registry.register(repo("1", "owner/b")).unwrap_err();
        assert!(matches!(err, HacsError::DuplicateRepository(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_all_keeps_insertion_order() {
        let registry = Registry::new();
        for (id, name) in [("3", "z/z"), ("1", "a/a"), ("2", "m/m")] {
            registry.register(repo(id, name)).unwrap();
        }
        let ids: Vec<_> = registry.all().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);

        registry.remove("1").unwrap();
        let ids: Vec<_> = registry.all().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["3", "2"]);
        assert_eq!(registry.get("2").unwrap().full_name, "m/m");
    }

    #[test]
    fn test_merge_unknown_id() {
        let registry = Registry::new();
        let err = registry
            .merge_metadata("404", MetadataUpdate::default())
            .unwrap_err();
        assert!(matches!(err, HacsError::NotFound(_)));
    }

    #[test]
    fn test_remove_installed_is_rejected() {
        let registry = Registry::new();
        let locks = OperationLocks::new();
        registry.register(repo("1", "owner/a")).unwrap();
        {
            let guard = locks.try_acquire("1").unwrap();
            registry
                .record_install(&guard, "1.0.0", "/config/custom_components/a", true)
                .unwrap();
        }
        let err = registry.remove("1").unwrap_err();
        assert!(matches!(err, HacsError::CannotRemoveInstalled(_)));
        assert!(registry.get("1").unwrap().installed);
    }

    #[test]
    fn test_install_and_uninstall_records() {
        let registry = Registry::new();
        let locks = OperationLocks::new();
        let mut r = repo("1", "owner/a");
        r.selected_tag = Some("0.9.0".into());
        r.new = true;
        registry.register(r).unwrap();

        let guard = locks.try_acquire("1").unwrap();
        let installed = registry
            .record_install(&guard, "0.9.0", "/config/custom_components/a", true)
            .unwrap();
        assert!(installed.installed);
        assert!(installed.restart_pending);
        assert!(installed.selected_tag.is_none());
        assert!(!installed.new);

        let removed = registry.record_uninstall(&guard).unwrap();
        assert!(!removed.installed);
        assert!(removed.installed_version.is_none());
        assert!(removed.local_path.is_none());
        assert!(!removed.restart_pending);
    }

    #[test]
    fn test_find_by_id_or_name() {
        let registry = Registry::new();
        registry.register(repo("42", "Owner/Thing")).unwrap();
        assert_eq!(registry.find("42").unwrap().id, "42");
        assert_eq!(registry.find("owner/thing").unwrap().id, "42");
        assert!(registry.find("owner/other").is_err());
    }

    #[test]
    fn test_acknowledge_restart() {
        let registry = Registry::new();
        let locks = OperationLocks::new();
        registry.register(repo("1", "owner/a")).unwrap();
        registry.register(repo("2", "owner/b")).unwrap();
        let guard = locks.try_acquire("1").unwrap();
        registry
            .record_install(&guard, "1.0.0", "/config/custom_components/a", true)
            .unwrap();

        assert_eq!(registry.acknowledge_restart().unwrap(), vec!["1"]);
        assert!(!registry.get("1").unwrap().restart_pending);
        assert!(registry.acknowledge_restart().unwrap().is_empty());
    }

    #[test]
    fn test_from_snapshot_repairs_records() {
        let mut broken = repo("1", "owner/a");
        broken.installed = true;
        broken.installed_version = Some("1.0.0".into());
        let duplicate_name = repo("2", "OWNER/A");
        let duplicate_id = repo("1", "owner/c");
        let ok = repo("3", "owner/b");

        let registry = Registry::from_snapshot(vec![broken, duplicate_name, duplicate_id, ok]);
        let all = registry.all().unwrap();
        assert_eq!(all.len(), 2);
        assert!(!all[0].installed);
        assert!(all[0].installed_version.is_none());
        assert_eq!(all[1].id, "3");
    }
}
