use actix_web::HttpResponse;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::engine::{JobRunner, Outcome, ProgressEvent};
use crate::pipeline::{self, JobKind, JobRequest, ValidationError};
use crate::streamer;
use crate::workspace::{sanitize_extension, store_upload, WorkspaceManager};

/// Download name for overlay results
const OVERLAY_ATTACHMENT: &str = "overlay.mp4";

/// Runs a transcode request end to end: validate, allocate, launch, stream.
pub struct TranscodeService {
    workspaces: WorkspaceManager,
    runner: JobRunner,
}

impl TranscodeService {
    pub fn new(workspaces: WorkspaceManager, runner: JobRunner) -> Self {
        Self { workspaces, runner }
    }

    /// Execute one job for one request.
    ///
    /// # Flow
    /// - Validates the request and builds its pipeline (nothing is allocated
    ///   for a request that fails here)
    /// - Fails fast when no engine was discovered
    /// - Allocates a workspace and moves the spooled upload into it
    /// - Launches the engine and waits for the outcome
    /// - Streams the output; the response body releases the workspace
    ///
    /// If the caller drops the returned future (client disconnect), the job
    /// handle goes with it, which kills the engine and releases the workspace.
    pub async fn execute(
        &self,
        request: JobRequest,
        upload: Option<NamedTempFile>,
    ) -> Result<HttpResponse, ApiError> {
        let spec = pipeline::build(&request).map_err(|e| match e {
            ValidationError::MissingField("video") => ApiError::MissingUpload,
            other => ApiError::Validation(other),
        })?;

        if self.runner.engine().is_none() {
            return Err(ApiError::EngineUnavailable);
        }

        let request_id = Uuid::new_v4();
        let input_ext = spec
            .needs_upload()
            .then(|| sanitize_extension(request.upload().and_then(|u| u.declared_filename.as_deref())));

        let workspace = self
            .workspaces
            .allocate(request_id, input_ext.as_deref(), spec.output_format())
            .await
            .map_err(|e| ApiError::internal("workspace allocation failed", e))?;

        if let Some(input_path) = workspace.input_path() {
            let spooled = upload.ok_or(ApiError::MissingUpload)?;
            let bytes = store_upload(spooled, input_path)
                .await
                .map_err(|e| ApiError::internal("failed to store upload", e))?;
            info!(request_id = %request_id, bytes, "Upload stored");
        }

        let mut handle = self.runner.start(&spec, workspace)?;
        while let Some(event) = handle.next_event().await {
            if let ProgressEvent::Progress(progress) = event {
                debug!(
                    job_id = %handle.id(),
                    frame = progress.frame,
                    out_time_ms = progress.out_time_ms,
                    speed = progress.speed,
                    "Job progress"
                );
            }
        }

        debug!(job_id = %handle.id(), state = %handle.state(), "Engine output closed");

        match handle.outcome().await {
            Outcome::Completed(job) => {
                info!(request_id = %request_id, bytes = job.output_size, "Job completed, streaming output");
                let attachment = (spec.kind() == JobKind::OverlayText).then_some(OVERLAY_ATTACHMENT);
                streamer::stream_artifact(job, attachment)
                    .await
                    .map_err(|e| ApiError::internal("failed to open job output", e))
            }
            Outcome::Failed(failure) => {
                warn!(request_id = %request_id, exit_code = ?failure.exit_code, "Job failed");
                Err(ApiError::EngineFailed(failure))
            }
            Outcome::Cancelled(reason) => Err(ApiError::Cancelled(reason)),
        }
    }
}
