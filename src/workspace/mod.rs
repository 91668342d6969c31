//! Per-request temporary directories.
//!
//! Every request gets its own `job-<uuid>` directory under the gateway work
//! directory. A [`Workspace`] owns that directory through a [`CleanupToken`]
//! which removes it exactly once: explicitly via [`Workspace::release`], or
//! when the workspace is dropped on any other path.
//!
//! Removal is a blocking `remove_dir_all`. Code running on the async workers
//! goes through [`Workspace::release_async`] or [`Workspace::release_detached`],
//! which run it on tokio's blocking pool.

pub mod upload;

use dashmap::DashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::pipeline::OutputFormat;

pub use upload::{sanitize_extension, store_upload};

/// Directory name prefix for workspaces under the work directory
pub const WORKSPACE_PREFIX: &str = "job-";

/// Allocates and releases request workspaces under a single root
#[derive(Clone)]
pub struct WorkspaceManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    root: PathBuf,
    active: DashSet<Uuid>,
}

impl WorkspaceManager {
    /// Create a manager rooted at `root`, creating the directory if needed
    pub async fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            inner: Arc::new(ManagerInner {
                root,
                active: DashSet::new(),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn is_active(&self, id: &Uuid) -> bool {
        self.inner.active.contains(id)
    }

    pub fn active_count(&self) -> usize {
        self.inner.active.len()
    }

    /// Allocate a fresh workspace for one request.
    ///
    /// `input_ext` is `Some` when the request carries an upload; the input
    /// path is only allocated in that case. The directory is created with
    /// `create_dir`, so an id collision surfaces as `AlreadyExists` instead
    /// of two requests sharing files.
    pub async fn allocate(
        &self,
        request_id: Uuid,
        input_ext: Option<&str>,
        output: OutputFormat,
    ) -> io::Result<Workspace> {
        let dir = self.inner.root.join(workspace_dir_name(&request_id));
        tokio::fs::create_dir(&dir).await?;
        self.inner.active.insert(request_id);

        let input_path = input_ext.map(|ext| dir.join(format!("input.{}", ext)));
        let output_path = dir.join(format!("output.{}", output.extension()));

        debug!(request_id = %request_id, dir = %dir.display(), "Workspace allocated");

        Ok(Workspace {
            id: request_id,
            input_path,
            output_path,
            output_format: output,
            token: CleanupToken {
                manager: self.clone(),
                id: request_id,
                dir: dir.clone(),
                released: AtomicBool::new(false),
            },
            dir,
        })
    }

    fn remove(&self, id: &Uuid, dir: &Path) -> io::Result<()> {
        self.inner.active.remove(id);
        remove_dir_if_exists(dir)
    }
}

/// `job-<uuid>` directory name for a request id
pub fn workspace_dir_name(id: &Uuid) -> String {
    format!("{}{}", WORKSPACE_PREFIX, id)
}

/// Parse the request id back out of a workspace directory name
pub fn parse_workspace_dir_name(name: &str) -> Option<Uuid> {
    name.strip_prefix(WORKSPACE_PREFIX)
        .and_then(|rest| Uuid::parse_str(rest).ok())
}

pub(crate) fn remove_dir_if_exists(dir: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Filesystem resources for one request
pub struct Workspace {
    id: Uuid,
    dir: PathBuf,
    input_path: Option<PathBuf>,
    output_path: PathBuf,
    output_format: OutputFormat,
    token: CleanupToken,
}

impl Workspace {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn input_path(&self) -> Option<&Path> {
        self.input_path.as_deref()
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    pub fn is_released(&self) -> bool {
        self.token.is_released()
    }

    /// Delete everything this workspace allocated. Idempotent.
    pub fn release(&self) -> io::Result<()> {
        self.token.release()
    }

    /// Release on the blocking pool and wait for the removal.
    pub async fn release_async(self) -> io::Result<()> {
        tokio::task::spawn_blocking(move || self.release())
            .await
            .map_err(io::Error::other)?
    }

    /// Release on the blocking pool without waiting, for callers that cannot
    /// await. Outside a runtime the removal runs inline.
    pub fn release_detached(self) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(move || self.release_logged());
            }
            Err(_) => self.release_logged(),
        }
    }

    fn release_logged(&self) {
        if let Err(e) = self.release() {
            warn!(request_id = %self.id, "Failed to release workspace: {}", e);
        }
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("id", &self.id)
            .field("dir", &self.dir)
            .field("released", &self.is_released())
            .finish()
    }
}

/// One-shot capability to remove a workspace directory.
///
/// The first `release` call performs the removal; later calls and the drop
/// are no-ops.
pub struct CleanupToken {
    manager: WorkspaceManager,
    id: Uuid,
    dir: PathBuf,
    released: AtomicBool,
}

impl CleanupToken {
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub fn release(&self) -> io::Result<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.manager.remove(&self.id, &self.dir)?;
        debug!(request_id = %self.id, "Workspace released");
        Ok(())
    }
}

// Last resort for workspaces dropped without an explicit release
impl Drop for CleanupToken {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(request_id = %self.id, "Failed to release workspace: {}", e);
        }
    }
}
