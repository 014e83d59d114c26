//! Per-repository operation locks.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

/// Set of repository ids with an operation in flight.
///
/// Acquisition never waits: a second caller gets `None` and reports the repository as busy.
#[derive(Debug, Clone, Default)]
pub struct OperationLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl OperationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, id: &str) -> Option<OperationGuard> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if !held.insert(id.to_string()) {
            return None;
        }
        Some(OperationGuard {
            id: id.to_string(),
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_locked(&self, id: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(id)
    }
}

/// Proof that the holder owns the lock for one repository. Released on drop.
#[derive(Debug)]
pub struct OperationGuard {
    id: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl OperationGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails() {
        let locks = OperationLocks::new();
        let guard = locks.try_acquire("1").unwrap();
        assert_eq!(guard.id(), "1");
        assert!(locks.try_acquire("1").is_none());
        assert!(locks.is_locked("1"));
    }

    #[test]
    fn test_other_ids_are_independent() {
        let locks = OperationLocks::new();
        let _a = locks.try_acquire("a").unwrap();
        assert!(locks.try_acquire("b").is_some());
    }

    #[test]
    fn test_released_on_drop() {
        let locks = OperationLocks::new();
        {
            let _guard = locks.try_acquire("1").unwrap();
        }
        assert!(!locks.is_locked("1"));
        assert!(locks.try_acquire("1").is_some());
    }

    #[test]
    fn test_released_on_panic() {
        let locks = OperationLocks::new();
        let clone = locks.clone();
        let result = std::thread::spawn(move || {
            let _guard = clone.try_acquire("1").unwrap();
            panic!("operation failed");
        })
        .join();
        assert!(result.is_err());
        assert!(!locks.is_locked("1"));
    }
}
