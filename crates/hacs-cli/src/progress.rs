use std::{sync::mpsc::Receiver, thread::JoinHandle};

use hacs_events::{CycleKind, HacsEvent, InstallStage};
use hacs_utils::time::format_duration;
use nu_ansi_term::Color::{Cyan, Green, Red, Yellow};
use tracing::{debug, info, warn};

use crate::utils::{Colored, Icons};

/// Joins the event printer once every sender is gone.
///
/// Drop the [`hacs_operations::HacsContext`] (and anything holding a clone of it) before
/// calling [`finish`](EventPrinter::finish), otherwise the thread waits forever.
pub struct EventPrinter {
    handle: Option<JoinHandle<()>>,
}

impl EventPrinter {
    pub fn finish(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

fn print_event(event: HacsEvent) {
    match event {
        HacsEvent::Installing {
            full_name,
            stage,
            ..
        } => {
            match stage {
                InstallStage::Fetching {
                    reference,
                    files,
                } => {
                    info!(
                        "{} Fetching {} file(s) of {} at {}",
                        Icons::ARROW,
                        files,
                        Colored(Cyan, &full_name),
                        Colored(Green, &reference)
                    );
                }
                InstallStage::Writing => debug!("writing staged content for {full_name}"),
                InstallStage::Swapping => debug!("swapping content for {full_name}"),
                InstallStage::Complete {
                    version,
                } => {
                    info!(
                        "{} {} {}",
                        Colored(Green, Icons::CHECK),
                        Colored(Cyan, &full_name),
                        Colored(Green, &version)
                    );
                }
            }
        }
        HacsEvent::OperationFailed {
            full_name,
            action,
            error,
            ..
        } => {
            debug!("{action} of {full_name} failed: {error}");
        }
        HacsEvent::CycleStarted {
            kind,
            total,
        } => {
            let what = match kind {
                CycleKind::Installed => "installed",
                CycleKind::Full => "tracked",
            };
            info!("Refreshing {} {what} repositories", Colored(Cyan, total));
        }
        HacsEvent::CycleFinished {
            refreshed,
            failed,
            aborted,
            ..
        } => {
            if aborted {
                warn!("Refresh stopped early after {refreshed} repositories");
            } else if failed > 0 {
                info!(
                    "Refreshed {}, {} failed",
                    Colored(Green, refreshed),
                    Colored(Red, failed)
                );
            } else {
                info!("Refreshed {}", Colored(Green, refreshed));
            }
        }
        HacsEvent::RateLimited {
            retry_in,
        } => {
            warn!(
                "{} Rate limited by GitHub, retrying in {}",
                Colored(Yellow, Icons::WARNING),
                format_duration(retry_in)
            );
        }
        HacsEvent::RepositoryRemoved {
            full_name,
            ..
        } => {
            debug!("{full_name} left the registry");
        }
        HacsEvent::RemovedUpstream {
            full_name,
            reason,
            ..
        } => {
            warn!(
                "{} {} was removed from the default lists ({}), consider uninstalling it",
                Colored(Yellow, Icons::WARNING),
                Colored(Cyan, &full_name),
                reason.as_deref().unwrap_or("no reason given")
            );
        }
        HacsEvent::StoreWriteFailed {
            error,
        } => {
            warn!("The change took effect but could not be saved: {error}");
        }
        HacsEvent::RepositoryChanged {
            ..
        }
        | HacsEvent::OperationStarted {
            ..
        }
        | HacsEvent::OperationComplete {
            ..
        }
        | HacsEvent::RestartAcknowledged {
            ..
        } => {}
    }
}

pub fn spawn_event_printer(receiver: Receiver<HacsEvent>) -> EventPrinter {
    let handle = std::thread::spawn(move || {
        while let Ok(event) = receiver.recv() {
            print_event(event);
        }
    });
    EventPrinter {
        handle: Some(handle),
    }
}
