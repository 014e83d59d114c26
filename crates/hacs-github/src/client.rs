use serde::{Deserialize, Serialize};

use crate::error::ClientResult;

/// Repository level metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    /// Stable upstream id.
    pub id: String,
    pub full_name: String,
    pub description: Option<String>,
    pub default_branch: String,
    pub stars: u64,
    pub archived: bool,
}

/// A published (non-draft) release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub tag: String,
    pub prerelease: bool,
}

impl ReleaseInfo {
    pub fn new(tag: impl Into<String>, prerelease: bool) -> Self {
        Self {
            tag: tag.into(),
            prerelease,
        }
    }
}

/// What the store needs from the source host.
///
/// Calls are blocking; callers run them off the async executor and bound them with a
/// timeout. Every method fails with [`crate::ClientError::RateLimited`],
/// [`crate::ClientError::NotFound`] or [`crate::ClientError::Network`].
pub trait RemoteMetadataClient: Send + Sync {
    fn get_repository(&self, full_name: &str) -> ClientResult<RepositoryInfo>;

    /// Newest first, drafts excluded, at most `limit` entries.
    fn get_releases(&self, full_name: &str, limit: usize) -> ClientResult<Vec<ReleaseInfo>>;

    fn get_default_branch_sha(&self, full_name: &str) -> ClientResult<String>;

    /// Paths of every file (not directory) reachable from `reference`.
    fn get_tree(&self, full_name: &str, reference: &str) -> ClientResult<Vec<String>>;

    fn get_file(&self, full_name: &str, reference: &str, path: &str) -> ClientResult<Vec<u8>>;
}
