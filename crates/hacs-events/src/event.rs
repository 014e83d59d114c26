use std::{fmt, time::Duration};

use crate::OperationId;

/// All event types emitted by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HacsEvent {
    /// A tracked repository's record changed.
    RepositoryChanged { id: String, full_name: String },
    /// A repository left the registry.
    RepositoryRemoved { id: String, full_name: String },
    /// An install/upgrade/uninstall acquired its lock.
    OperationStarted {
        op_id: OperationId,
        id: String,
        full_name: String,
        action: OperationKind,
    },
    /// Install stage progress.
    Installing {
        op_id: OperationId,
        full_name: String,
        stage: InstallStage,
    },
    OperationComplete {
        op_id: OperationId,
        id: String,
        full_name: String,
        action: OperationKind,
    },
    OperationFailed {
        op_id: OperationId,
        id: String,
        full_name: String,
        action: OperationKind,
        error: String,
    },
    /// A refresh cycle began.
    CycleStarted { kind: CycleKind, total: usize },
    /// A refresh cycle ended, possibly cut short by rate limiting.
    CycleFinished {
        kind: CycleKind,
        refreshed: usize,
        failed: usize,
        aborted: bool,
    },
    /// Upstream refused further calls; the next attempt is in `retry_in`.
    RateLimited { retry_in: Duration },
    /// The host restarted and pending restart flags were cleared.
    RestartAcknowledged { cleared: usize },
    /// An installed repository was withdrawn from the default lists. It stays installed.
    RemovedUpstream {
        id: String,
        full_name: String,
        reason: Option<String>,
    },
    /// A change took effect but the store could not be written.
    StoreWriteFailed { error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Install,
    Upgrade,
    Uninstall,
    SetVersion,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Install => "install",
            OperationKind::Upgrade => "upgrade",
            OperationKind::Uninstall => "uninstall",
            OperationKind::SetVersion => "set_version",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStage {
    /// Downloading `files` entries for `reference`.
    Fetching { reference: String, files: usize },
    /// Writing the staging directory.
    Writing,
    /// Replacing the live directory with the staged one.
    Swapping,
    Complete { version: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    /// Installed repositories only.
    Installed,
    /// Every non-hidden repository plus default list discovery.
    Full,
}

impl fmt::Display for CycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleKind::Installed => f.write_str("installed"),
            CycleKind::Full => f.write_str("full"),
        }
    }
}
