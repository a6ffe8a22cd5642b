//! Background tasks: lease sweeper, missed-heartbeat watchdog and the
//! status event logger.

use crate::config::CoordinatorConfig;
use crate::state::AppState;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug)]
pub struct BackgroundTasks {
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl BackgroundTasks {
    pub fn spawn(state: &AppState, config: &CoordinatorConfig) -> Self {
        let handles = vec![
            ("lease-sweeper", state.leases.spawn_sweeper(config.sweep_every())),
            ("watchdog", state.watchdog.spawn()),
            ("event-logger", spawn_event_logger(state)),
        ];
        info!("Started {} background task(s)", handles.len());
        Self { handles }
    }

    pub fn shutdown(self) {
        for (name, handle) in self.handles {
            handle.abort();
            info!(task = name, "Background task stopped");
        }
    }
}

/// Logs every committed status change. Transitions into CRITICAL are
/// logged at warn level.
fn spawn_event_logger(state: &AppState) -> JoinHandle<()> {
    let mut subscription = state.events.subscribe();
    tokio::spawn(async move {
        while let Some(change) = subscription.next().await {
            if change.new == vigil_core::Status::Critical {
                warn!(node = %change.node, old = %change.old, new = %change.new, "Status change");
            } else {
                info!(node = %change.node, old = %change.old, new = %change.new, "Status change");
            }
        }
    })
}
