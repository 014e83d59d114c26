use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use hacs_core::Category;

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    help_template = "{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}",
    arg_required_else_help = true
)]
pub struct Args {
    /// Set output verbosity
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress outputs
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output logs as json
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Disable colors in output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Provide custom config file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List repositories in the store
    #[clap(name = "list", visible_alias = "ls")]
    List {
        /// Include hidden repositories and those failing validation
        #[arg(required = false, short, long)]
        all: bool,

        /// Only show one category
        #[arg(required = false, long)]
        category: Option<Category>,
    },

    /// Show everything known about a repository
    #[command(arg_required_else_help = true)]
    Info {
        /// Repository id or owner/name
        repo: String,
    },

    /// Install a repository at its pinned or latest version
    #[command(arg_required_else_help = true)]
    #[clap(name = "install", visible_alias = "i")]
    Install {
        /// Repository id or owner/name
        repo: String,
    },

    /// Upgrade an installed repository
    #[command(arg_required_else_help = true)]
    #[clap(name = "upgrade", visible_alias = "u")]
    Upgrade {
        /// Repository id or owner/name
        repo: String,
    },

    /// Remove installed content
    #[command(arg_required_else_help = true)]
    #[clap(name = "uninstall", visible_alias = "rm")]
    Uninstall {
        /// Repository id or owner/name
        repo: String,
    },

    /// Hide a repository from listings and the full refresh
    #[command(arg_required_else_help = true)]
    Hide {
        /// Repository id or owner/name
        repo: String,
    },

    /// Show a hidden repository again
    #[command(arg_required_else_help = true)]
    Unhide {
        /// Repository id or owner/name
        repo: String,
    },

    /// Consider prereleases when picking the available version
    #[command(arg_required_else_help = true)]
    Beta {
        /// Repository id or owner/name
        repo: String,

        #[arg(value_enum)]
        state: Toggle,
    },

    /// Pin the version the next install or upgrade uses
    #[command(arg_required_else_help = true)]
    #[clap(name = "set-version")]
    SetVersion {
        /// Repository id or owner/name
        repo: String,

        /// Release tag or default branch
        tag: String,
    },

    /// Refresh one repository's metadata now
    #[command(arg_required_else_help = true)]
    Update {
        /// Repository id or owner/name
        repo: String,
    },

    /// Track a custom repository
    #[command(arg_required_else_help = true)]
    Add {
        /// owner/name or a github.com URL
        name: String,

        /// Category of the repository content
        #[arg(required = true, long)]
        category: Category,
    },

    /// Stop tracking a custom repository
    #[command(arg_required_else_help = true)]
    Remove {
        /// Repository id or owner/name
        repo: String,
    },

    /// Run one full refresh cycle
    #[clap(name = "sync", visible_alias = "S")]
    Sync,

    /// Keep refreshing on the configured intervals until interrupted
    Daemon,

    /// Clear pending restarts after Home Assistant restarted
    Restarted,

    /// Show or change the persisted store settings
    Settings {
        /// Country filter, a two letter code or ALL
        #[arg(required = false, long)]
        country: Option<String>,

        /// Number of releases kept per repository
        #[arg(required = false, long)]
        release_limit: Option<usize>,

        /// Enable experimental features
        #[arg(required = false, long)]
        experimental: Option<bool>,
    },

    /// Generate default config
    #[clap(name = "defconfig")]
    DefConfig,
}
