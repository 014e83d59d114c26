use hacs_core::{Category, HacsResult, Repository};
use hacs_operations::{list_repositories, HacsContext};
use nu_ansi_term::Color::{Blue, Cyan, Green, LightRed, Magenta, Red, Yellow};
use tabled::{
    builder::Builder,
    settings::{themes::BorderCorrection, Panel, Style},
};
use tracing::{debug, info};

use crate::utils::{resolve_repo, status_icon, Colored, Icons};

pub fn list_store(ctx: &HacsContext, all: bool, category: Option<Category>) -> HacsResult<()> {
    debug!(all, category = ?category, "listing repositories");

    let repos = if all {
        ctx.registry().all()?
    } else {
        list_repositories(ctx)?
    };
    let repos: Vec<Repository> = repos
        .into_iter()
        .filter(|repo| category.is_none_or(|c| repo.category == c))
        .collect();

    let mut installed = 0;
    let mut upgradable = 0;
    for repo in &repos {
        if repo.installed {
            installed += 1;
        }
        if repo.pending_upgrade() {
            upgradable += 1;
        }

        let version = match (&repo.installed_version, repo.pending_upgrade()) {
            (Some(current), true) => format!(
                "{} {} {}",
                Colored(LightRed, current),
                Icons::ARROW,
                Colored(Green, &repo.available_version)
            ),
            (Some(current), false) => format!("{}", Colored(Green, current)),
            (None, _) => format!("{}", Colored(LightRed, &repo.available_version)),
        };
        let mut flags = String::new();
        if repo.new {
            flags.push_str(&format!(" {}", Colored(Yellow, Icons::NEW)));
        }
        if repo.hide {
            flags.push_str(&format!(" {}", Colored(Red, "[hidden]")));
        }
        if repo.custom {
            flags.push_str(&format!(" {}", Colored(Magenta, "[custom]")));
        }

        info!(
            "[{}] {} ({}) | {} | {}{}",
            status_icon(repo),
            Colored(Blue, repo.display_name()),
            Colored(Cyan, &repo.full_name),
            Colored(Magenta, repo.category),
            version,
            flags
        );
    }

    let mut builder = Builder::new();
    builder.push_record([
        format!("{} Listed", Icons::PACKAGE),
        format!("{}", Colored(Cyan, repos.len())),
    ]);
    builder.push_record([
        format!("{} Installed", Icons::INSTALLED),
        format!("{}", Colored(Green, installed)),
    ]);
    builder.push_record([
        format!("{} Upgradable", Icons::UPGRADE),
        format!("{}", Colored(Yellow, upgradable)),
    ]);
    let table = builder
        .build()
        .with(Panel::header("Store"))
        .with(Style::rounded())
        .with(BorderCorrection {})
        .to_string();
    info!("\n{table}");

    Ok(())
}

pub fn show_info(ctx: &HacsContext, query: &str) -> HacsResult<()> {
    let repo = resolve_repo(ctx, query)?;
    let mut builder = Builder::new();

    builder.push_record([
        format!("{} Name", Icons::PACKAGE),
        format!(
            "{} ({})",
            Colored(Blue, repo.display_name()),
            Colored(Cyan, &repo.full_name)
        ),
    ]);
    builder.push_record([format!("{} Id", Icons::LINK), repo.id.clone()]);
    builder.push_record([
        format!("{} Category", Icons::CATEGORY),
        format!("{}", Colored(Magenta, repo.category)),
    ]);
    if let Some(description) = &repo.description {
        builder.push_record([format!("{} Description", Icons::DESCRIPTION), description.clone()]);
    }
    builder.push_record([
        format!("{} Status", status_icon(&repo)),
        repo.status().to_string(),
    ]);
    builder.push_record([
        format!("{} Available", Icons::VERSION),
        format!("{}", Colored(Green, &repo.available_version)),
    ]);
    if let Some(version) = &repo.installed_version {
        builder.push_record([
            format!("{} Installed", Icons::INSTALLED),
            format!("{}", Colored(Green, version)),
        ]);
    }
    if let Some(tag) = &repo.selected_tag {
        builder.push_record([
            format!("{} Pinned", Icons::VERSION),
            format!("{}", Colored(Yellow, tag)),
        ]);
    }
    if !repo.releases.is_empty() {
        builder.push_record([format!("{} Releases", Icons::VERSION), repo.releases.join(", ")]);
    }
    if let Some(path) = &repo.local_path {
        builder.push_record([format!("{} Path", Icons::PATH), path.clone()]);
    }
    builder.push_record([format!("{} Stars", Icons::STAR), repo.stars.to_string()]);

    let mut notes = Vec::new();
    if repo.beta {
        notes.push("beta".to_string());
    }
    if repo.hide {
        notes.push("hidden".to_string());
    }
    if repo.custom {
        notes.push("custom".to_string());
    }
    if repo.archived {
        notes.push("archived upstream".to_string());
    }
    if repo.unreachable {
        notes.push(format!("{}", Colored(Red, "unreachable upstream")));
    }
    notes.extend(
        repo.validation_errors
            .iter()
            .map(|err| format!("{}", Colored(Red, err))),
    );
    if !notes.is_empty() {
        builder.push_record([format!("{} Notes", Icons::WARNING), notes.join("\n")]);
    }

    let table = builder
        .build()
        .with(Style::rounded())
        .with(BorderCorrection {})
        .to_string();
    info!("\n{table}");

    Ok(())
}
