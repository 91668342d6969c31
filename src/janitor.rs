use chrono::{DateTime, Utc};
use std::io;
use std::path::Path;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::workspace::{parse_workspace_dir_name, remove_dir_if_exists, WorkspaceManager};

/// Prefix of files left behind by the multipart upload spooler
const SPOOL_PREFIX: &str = ".tmp";

/// Counts from one pass over the work directory
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub skipped_active: usize,
    pub skipped_fresh: usize,
    pub failed: usize,
}

/// Background sweeper for artifacts orphaned by crashed or abandoned jobs
#[derive(Clone)]
pub struct Janitor {
    workspaces: WorkspaceManager,
    interval: Duration,
    max_age: Duration,
}

impl Janitor {
    pub fn new(workspaces: WorkspaceManager, interval: Duration, max_age: Duration) -> Self {
        Self {
            workspaces,
            interval,
            max_age,
        }
    }

    /// Sweep on a fixed interval until the shutdown signal flips.
    ///
    /// The first pass runs immediately so leftovers from a previous crash are
    /// reclaimed at startup.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            "Janitor started (interval {}s, max age {}s)",
            self.interval.as_secs(),
            self.max_age.as_secs()
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Janitor received shutdown signal, stopping");
                        break;
                    }
                }
            }
        }
    }

    /// One pass over the work directory. Failures on individual entries are
    /// logged and counted, never fatal.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let root = self.workspaces.root();

        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Janitor could not read {}: {}", root.display(), e);
                report.failed += 1;
                return report;
            }
        };

        let now = Utc::now();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Janitor stopped listing {} early: {}", root.display(), e);
                    report.failed += 1;
                    break;
                }
            };

            let name = entry.file_name().to_string_lossy().to_string();
            let workspace_id = parse_workspace_dir_name(&name);
            if workspace_id.is_none() && !name.starts_with(SPOOL_PREFIX) {
                continue;
            }
            if let Some(id) = workspace_id {
                if self.workspaces.is_active(&id) {
                    report.skipped_active += 1;
                    continue;
                }
            }

            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!("Janitor could not stat {}: {}", name, e);
                    report.failed += 1;
                    continue;
                }
            };

            let modified: DateTime<Utc> = match metadata.modified() {
                Ok(modified) => modified.into(),
                Err(e) => {
                    warn!("Janitor could not read mtime of {}: {}", name, e);
                    report.failed += 1;
                    continue;
                }
            };
            let age = (now - modified).to_std().unwrap_or_default();
            if age < self.max_age {
                report.skipped_fresh += 1;
                continue;
            }

            match remove_entry(&entry.path(), metadata.is_dir()).await {
                Ok(()) => {
                    debug!("Janitor removed {} (age {}s)", name, age.as_secs());
                    report.removed += 1;
                }
                Err(e) => {
                    warn!("Janitor failed to remove {}: {}", name, e);
                    report.failed += 1;
                }
            }
        }

        if report.removed > 0 || report.failed > 0 {
            info!(
                removed = report.removed,
                skipped_active = report.skipped_active,
                skipped_fresh = report.skipped_fresh,
                failed = report.failed,
                "Janitor sweep finished"
            );
        } else {
            debug!(?report, "Janitor sweep finished");
        }
        report
    }
}

async fn remove_entry(path: &Path, is_dir: bool) -> io::Result<()> {
    if is_dir {
        let path = path.to_path_buf();
        return tokio::task::spawn_blocking(move || remove_dir_if_exists(&path))
            .await
            .map_err(io::Error::other)?;
    }
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
