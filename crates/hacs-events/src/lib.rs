mod event;
mod sink;

use std::sync::Arc;

pub use event::*;
pub use sink::*;

/// Identifier for a running install/upgrade/uninstall.
pub type OperationId = u64;

/// Shared handle to an event sink.
pub type EventSinkHandle = Arc<dyn EventSink>;
