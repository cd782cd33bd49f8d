//! Shutdown Coordinator (spec.md §4.6, C6): reacts to the external
//! interrupt signal by waking every blocked waiter exactly once.

use std::sync::Arc;

use log::info;

use crate::state::AppState;

/// Installs the Ctrl-C handler. The handler itself only sets the
/// shutdown flag and notifies every condvar the pipeline blocks on
/// (spec.md §4.6); it does no I/O and cannot panic into signal context.
pub fn install(state: Arc<AppState>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        info!("interrupt received, shutting down");
        state.request_shutdown();
    })?;
    Ok(())
}
