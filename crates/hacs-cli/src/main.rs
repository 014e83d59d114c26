use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use cli::{Args, Commands, Toggle};
use hacs_config::config::{default_config_path, generate_default_config, Config};
use hacs_core::HacsResult;
use hacs_events::{ChannelSink, EventSinkHandle};
use hacs_github::{http_client::ClientConfig, GithubClient};
use hacs_operations::{HacsContext, RepositoryAction, SettingsUpdate};
use hacs_utils::path::resolve_path;
use logging::setup_logging;
use progress::{spawn_event_printer, EventPrinter};
use tracing::debug;

mod actions;
mod cli;
mod list;
mod logging;
mod progress;
mod utils;

fn config_path(args: &Args) -> HacsResult<PathBuf> {
    match &args.config {
        Some(path) => Ok(resolve_path(path)?),
        None => Ok(default_config_path()),
    }
}

pub fn create_context(config: Config) -> HacsResult<(HacsContext, EventPrinter)> {
    let client_config = ClientConfig {
        timeout: Some(config.request_timeout()),
        ..Default::default()
    };
    let client = Arc::new(GithubClient::new(&client_config, config.github_token()));

    let (sink, receiver) = ChannelSink::new();
    let events: EventSinkHandle = Arc::new(sink);
    let ctx = HacsContext::new(config, client, events)?;
    Ok((ctx, spawn_event_printer(receiver)))
}

async fn dispatch(ctx: &HacsContext, command: Commands) -> HacsResult<()> {
    match command {
        Commands::List {
            all,
            category,
        } => list::list_store(ctx, all, category),
        Commands::Info {
            repo,
        } => list::show_info(ctx, &repo),
        Commands::Install {
            repo,
        } => actions::run_action(ctx, &repo, RepositoryAction::Install).await,
        Commands::Upgrade {
            repo,
        } => actions::run_action(ctx, &repo, RepositoryAction::Upgrade).await,
        Commands::Uninstall {
            repo,
        } => actions::run_action(ctx, &repo, RepositoryAction::Uninstall).await,
        Commands::Hide {
            repo,
        } => actions::run_action(ctx, &repo, RepositoryAction::Hide).await,
        Commands::Unhide {
            repo,
        } => actions::run_action(ctx, &repo, RepositoryAction::Unhide).await,
        Commands::Beta {
            repo,
            state,
        } => {
            let action = match state {
                Toggle::On => RepositoryAction::ShowBeta,
                Toggle::Off => RepositoryAction::HideBeta,
            };
            actions::run_action(ctx, &repo, action).await
        }
        Commands::SetVersion {
            repo,
            tag,
        } => actions::set_version(ctx, &repo, &tag).await,
        Commands::Update {
            repo,
        } => actions::update(ctx, &repo).await,
        Commands::Add {
            name,
            category,
        } => actions::add(ctx, &name, category).await,
        Commands::Remove {
            repo,
        } => actions::remove(ctx, &repo).await,
        Commands::Sync => actions::sync(ctx).await,
        Commands::Daemon => actions::daemon(ctx).await,
        Commands::Restarted => actions::restarted(ctx),
        Commands::Settings {
            country,
            release_limit,
            experimental,
        } => {
            actions::settings(
                ctx,
                SettingsUpdate {
                    country,
                    release_limit,
                    experimental,
                },
            )
        }
        Commands::DefConfig => unreachable!(),
    }
}

async fn handle_cli() -> HacsResult<()> {
    let args = Args::parse();

    setup_logging(&args);
    if args.no_color {
        utils::set_color(false);
    }

    let path = config_path(&args)?;
    if let Commands::DefConfig = args.command {
        generate_default_config(&path)?;
        return Ok(());
    }

    let config = Config::load(&path)?;
    debug!(path = %path.display(), "loaded configuration");

    let (ctx, printer) = create_context(config)?;
    let result = dispatch(&ctx, args.command).await;

    // the printer thread exits once the last sender, held by the context, is gone
    drop(ctx);
    printer.finish();

    result
}

#[tokio::main]
async fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    if let Err(err) = handle_cli().await {
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(1);
    }
}
