use std::{
    fmt::Display,
    sync::atomic::{AtomicBool, Ordering},
};

use hacs_core::{HacsResult, Repository, Status};
use hacs_operations::HacsContext;
use nu_ansi_term::Color::{self, Blue, Green, LightRed, Yellow};

pub struct Icons;

impl Icons {
    pub const ARROW: &str = "→";
    pub const BROKEN: &str = "✗";
    pub const CATEGORY: &str = "📁";
    pub const CHECK: &str = "✓";
    pub const DESCRIPTION: &str = "📝";
    pub const INSTALLED: &str = "✓";
    pub const LINK: &str = "🔗";
    pub const NEW: &str = "★";
    pub const NOT_INSTALLED: &str = "○";
    pub const PACKAGE: &str = "📦";
    pub const PATH: &str = "📂";
    pub const RESTART: &str = "↻";
    pub const STAR: &str = "⭐";
    pub const UPGRADE: &str = "↑";
    pub const VERSION: &str = "🏁";
    pub const WARNING: &str = "⚠";
}

pub static COLOR: AtomicBool = AtomicBool::new(true);

pub fn set_color(enabled: bool) {
    COLOR.store(enabled, Ordering::Relaxed);
}

pub struct Colored<T: Display>(pub Color, pub T);

impl<T: Display> Display for Colored<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if COLOR.load(Ordering::Relaxed) {
            write!(f, "{}", self.0.prefix())?;
            self.1.fmt(f)?;
            write!(f, "{}", self.0.suffix())
        } else {
            self.1.fmt(f)
        }
    }
}

pub fn status_icon(repo: &Repository) -> Colored<&'static str> {
    if !repo.is_valid() {
        return Colored(LightRed, Icons::BROKEN);
    }
    match repo.status() {
        Status::NotInstalled => Colored(Blue, Icons::NOT_INSTALLED),
        Status::Installed => Colored(Green, Icons::INSTALLED),
        Status::PendingUpdate => Colored(Yellow, Icons::UPGRADE),
        Status::RestartPending => Colored(Yellow, Icons::RESTART),
    }
}

/// Looks up a repository by id or `owner/name`.
pub fn resolve_repo(ctx: &HacsContext, query: &str) -> HacsResult<Repository> {
    ctx.registry().find(query.trim())
}
