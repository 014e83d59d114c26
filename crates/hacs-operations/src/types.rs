use std::{fmt, str::FromStr};

use hacs_core::HacsError;
use hacs_events::CycleKind;

/// Actions accepted by [`crate::repository_action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryAction {
    Install,
    Upgrade,
    Uninstall,
    Hide,
    Unhide,
    ShowBeta,
    HideBeta,
    ClearNew,
}

impl RepositoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepositoryAction::Install => "install",
            RepositoryAction::Upgrade => "upgrade",
            RepositoryAction::Uninstall => "uninstall",
            RepositoryAction::Hide => "hide",
            RepositoryAction::Unhide => "unhide",
            RepositoryAction::ShowBeta => "show_beta",
            RepositoryAction::HideBeta => "hide_beta",
            RepositoryAction::ClearNew => "clear_new",
        }
    }
}

impl fmt::Display for RepositoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepositoryAction {
    type Err = HacsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "install" => Ok(Self::Install),
            "upgrade" => Ok(Self::Upgrade),
            "uninstall" => Ok(Self::Uninstall),
            "hide" => Ok(Self::Hide),
            "unhide" => Ok(Self::Unhide),
            "show_beta" => Ok(Self::ShowBeta),
            "hide_beta" => Ok(Self::HideBeta),
            "clear_new" => Ok(Self::ClearNew),
            _ => Err(HacsError::Custom(format!("Unknown repository action '{s}'"))),
        }
    }
}

/// Outcome of one refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub kind: CycleKind,
    /// Repositories scheduled for refresh.
    pub total: usize,
    pub refreshed: usize,
    pub failed: usize,
    /// Cut short by rate limiting.
    pub aborted: bool,
    /// Registered from the default lists.
    pub discovered: usize,
    /// Dropped because they left the default lists or stopped validating.
    pub pruned: usize,
}

impl CycleReport {
    pub(crate) fn new(kind: CycleKind) -> Self {
        Self {
            kind,
            total: 0,
            refreshed: 0,
            failed: 0,
            aborted: false,
            discovered: 0,
            pruned: 0,
        }
    }
}

/// Optional changes for [`crate::update_settings`].
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub country: Option<String>,
    pub release_limit: Option<usize>,
    pub experimental: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parse() {
        assert_eq!(
            "show-beta".parse::<RepositoryAction>().unwrap(),
            RepositoryAction::ShowBeta
        );
        assert_eq!(
            "Uninstall".parse::<RepositoryAction>().unwrap(),
            RepositoryAction::Uninstall
        );
        assert!("explode".parse::<RepositoryAction>().is_err());
        assert_eq!(RepositoryAction::ClearNew.to_string(), "clear_new");
    }
}
