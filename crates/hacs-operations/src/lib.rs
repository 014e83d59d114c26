pub mod commands;
pub mod context;
pub mod install;
pub mod refresh;
pub mod scheduler;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use commands::*;
pub use context::HacsContext;
pub use scheduler::{run_cycle, SchedulerTrigger, UpdateScheduler};
pub use types::*;
