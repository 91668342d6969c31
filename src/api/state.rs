use chrono::{DateTime, Utc};

use crate::engine::JobRunner;
use crate::workspace::WorkspaceManager;

/// Process-wide handles shared by the status endpoints
pub struct AppState {
    pub started_at: DateTime<Utc>,
    pub runner: JobRunner,
    pub workspaces: WorkspaceManager,
}

impl AppState {
    pub fn new(runner: JobRunner, workspaces: WorkspaceManager) -> Self {
        AppState {
            started_at: Utc::now(),
            runner,
            workspaces,
        }
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
