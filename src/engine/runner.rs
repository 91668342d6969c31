use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::sync::{mpsc, oneshot, watch, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::command::EngineCommand;
use super::job::{
    CancelReason, CompletedJob, JobFailure, JobState, LogBuffer, Outcome, ParsedLine, ProgressEvent,
    ProgressParser, DIAGNOSTIC_TAIL_CHARS,
};
use super::{Engine, EngineError};
use crate::pipeline::PipelineSpec;
use crate::workspace::Workspace;

const EVENT_CHANNEL_CAPACITY: usize = 64;
/// How long to wait for the stderr reader after the process has exited
const LOG_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Launches engine processes with a process-count ceiling and a per-job
/// wall-clock limit.
#[derive(Clone)]
pub struct JobRunner {
    engine: Option<Engine>,
    permits: Arc<Semaphore>,
    max_concurrent_jobs: usize,
    timeout: Duration,
}

impl JobRunner {
    pub fn new(engine: Option<Engine>, max_concurrent_jobs: usize, timeout: Duration) -> Self {
        let max_concurrent_jobs = max_concurrent_jobs.max(1);
        Self {
            engine,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs)),
            max_concurrent_jobs,
            timeout,
        }
    }

    pub fn engine(&self) -> Option<&Engine> {
        self.engine.as_ref()
    }

    /// Engine processes currently holding a slot
    pub fn running_jobs(&self) -> usize {
        self.max_concurrent_jobs - self.permits.available_permits()
    }

    /// Start a job. The runner takes ownership of the workspace: it is
    /// handed back inside [`Outcome::Completed`], and released by the runner
    /// on every other outcome once the engine process is gone.
    pub fn start(&self, spec: &PipelineSpec, workspace: Workspace) -> Result<JobHandle, EngineError> {
        let engine = self.engine.clone().ok_or(EngineError::Unavailable)?;
        let command = EngineCommand::from_pipeline(spec, &workspace)?;

        let id = workspace.id();
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(JobState::Starting);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let job = RunningJob {
            id,
            engine,
            args: command.build_args(),
            workspace,
            permits: self.permits.clone(),
            timeout: self.timeout,
            cancel: cancel.clone(),
            state: state_tx,
            events: events_tx,
        };

        info!(job_id = %id, kind = %spec.kind(), stages = %spec.summary(), "Job starting");
        tokio::spawn(async move {
            let outcome = job.run().await;
            // Nobody is waiting for the output any more
            if let Err(Outcome::Completed(orphaned)) = outcome_tx.send(outcome) {
                if let Err(e) = orphaned.workspace.release_async().await {
                    warn!(job_id = %id, "Failed to release orphaned workspace: {}", e);
                }
            }
        });

        Ok(JobHandle {
            id,
            state: state_rx,
            events: events_rx,
            outcome: outcome_rx,
            _abort_on_drop: cancel.drop_guard(),
        })
    }
}

/// Caller side of a running job.
///
/// Dropping the handle before the outcome arrives cancels the job, which
/// kills the engine process and releases the workspace.
pub struct JobHandle {
    id: Uuid,
    state: watch::Receiver<JobState>,
    events: mpsc::Receiver<ProgressEvent>,
    outcome: oneshot::Receiver<Outcome>,
    _abort_on_drop: DropGuard,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    /// Next progress event; `None` once the job has finished emitting
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    /// Wait for the terminal outcome
    pub async fn outcome(self) -> Outcome {
        match self.outcome.await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(job_id = %self.id, "Job task ended without reporting an outcome");
                Outcome::Failed(JobFailure {
                    exit_code: None,
                    diagnostic: "job runner stopped unexpectedly".to_string(),
                })
            }
        }
    }
}

struct RunningJob {
    id: Uuid,
    engine: Engine,
    args: Vec<String>,
    workspace: Workspace,
    permits: Arc<Semaphore>,
    timeout: Duration,
    cancel: CancellationToken,
    state: watch::Sender<JobState>,
    events: mpsc::Sender<ProgressEvent>,
}

/// How the wait on the engine process ended
enum Exit {
    Status(std::process::ExitStatus),
    Cancelled(CancelReason),
    WaitFailed(std::io::Error),
}

impl RunningJob {
    async fn run(self) -> Outcome {
        let job_id = self.id;

        let acquired = tokio::select! {
            permit = self.permits.clone().acquire_owned() => Some(permit),
            _ = self.cancel.cancelled() => None,
        };
        let _permit: OwnedSemaphorePermit = match acquired {
            Some(Ok(permit)) => permit,
            Some(Err(e)) => {
                error!(job_id = %job_id, "Failed to acquire engine slot: {:?}", e);
                return self.finish_failed(None, "engine slots closed".to_string()).await;
            }
            None => {
                info!(job_id = %job_id, "Job cancelled while waiting for an engine slot");
                return self.finish_cancelled(CancelReason::ClientAbort).await;
            }
        };

        let spawned = self
            .engine
            .command()
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                error!(job_id = %job_id, "Failed to launch engine: {}", e);
                return self.finish_failed(None, "failed to launch media engine".to_string()).await;
            }
        };

        let command_line = format!("{} {}", self.engine.program().display(), self.args.join(" "));
        info!(job_id = %job_id, "[engine] {}", command_line);
        let _ = self.state.send(JobState::Running);
        self.emit(ProgressEvent::Started { command_line });

        let mut reader = match child.stderr.take() {
            Some(stderr) => tokio::spawn(read_diagnostics(job_id, stderr, self.events.clone())),
            None => tokio::spawn(async { LogBuffer::default() }),
        };

        let exit = self.wait(&mut child).await;

        let log = match tokio::time::timeout(LOG_DRAIN_TIMEOUT, &mut reader).await {
            Ok(Ok(log)) => log,
            Ok(Err(e)) => {
                warn!(job_id = %job_id, "Diagnostic reader failed: {}", e);
                LogBuffer::default()
            }
            Err(_) => {
                warn!(job_id = %job_id, "Diagnostic stream still open after exit, abandoning it");
                reader.abort();
                LogBuffer::default()
            }
        };
        debug!(job_id = %job_id, lines = log.len(), dropped = log.dropped(), "Engine log collected");

        match exit {
            Exit::Status(status) if status.success() => self.finish_completed().await,
            Exit::Status(status) => {
                warn!(job_id = %job_id, "Engine exited with {}", status);
                let diagnostic = if log.is_empty() {
                    format!("media engine exited with {}", status)
                } else {
                    redact(&log.tail(DIAGNOSTIC_TAIL_CHARS), &self.workspace)
                };
                self.finish_failed(status.code(), diagnostic).await
            }
            Exit::WaitFailed(e) => {
                error!(job_id = %job_id, "Failed waiting for engine: {}", e);
                self.finish_failed(None, "lost track of the media engine process".to_string()).await
            }
            Exit::Cancelled(reason) => self.finish_cancelled(reason).await,
        }
    }

    /// Wait for exit, cancellation or timeout. On the latter two the process
    /// is killed and reaped before returning.
    async fn wait(&self, child: &mut Child) -> Exit {
        let reason = tokio::select! {
            status = child.wait() => {
                return match status {
                    Ok(status) => Exit::Status(status),
                    Err(e) => Exit::WaitFailed(e),
                };
            }
            _ = self.cancel.cancelled() => CancelReason::ClientAbort,
            _ = tokio::time::sleep(self.timeout) => CancelReason::Timeout,
        };

        match reason {
            CancelReason::ClientAbort => info!(job_id = %self.id, "Stopping engine: {}", reason),
            CancelReason::Timeout => warn!(job_id = %self.id, "Stopping engine: {}", reason),
        }
        if let Err(e) = child.kill().await {
            error!(job_id = %self.id, "Failed to kill engine process: {}", e);
        }
        Exit::Cancelled(reason)
    }

    async fn finish_completed(self) -> Outcome {
        match tokio::fs::metadata(self.workspace.output_path()).await {
            Ok(meta) if meta.is_file() => {
                info!(job_id = %self.id, bytes = meta.len(), "Job completed");
                let _ = self.state.send(JobState::Completed);
                Outcome::Completed(CompletedJob {
                    output_size: meta.len(),
                    workspace: self.workspace,
                })
            }
            _ => {
                warn!(job_id = %self.id, "Engine reported success but produced no output");
                self.finish_failed(Some(0), "media engine produced no output".to_string()).await
            }
        }
    }

    async fn finish_failed(self, exit_code: Option<i32>, diagnostic: String) -> Outcome {
        let state = self.release_workspace().await;
        let _ = state.send(JobState::Failed);
        Outcome::Failed(JobFailure {
            exit_code,
            diagnostic,
        })
    }

    async fn finish_cancelled(self, reason: CancelReason) -> Outcome {
        let job_id = self.id;
        let state = self.release_workspace().await;
        let _ = state.send(JobState::Cancelled);
        info!(job_id = %job_id, "Job cancelled: {}", reason);
        Outcome::Cancelled(reason)
    }

    /// Remove the workspace before the outcome is reported; hands back the
    /// state channel for the final transition.
    async fn release_workspace(self) -> watch::Sender<JobState> {
        if let Err(e) = self.workspace.release_async().await {
            warn!(job_id = %self.id, "Failed to release workspace: {}", e);
        }
        self.state
    }

    fn emit(&self, event: ProgressEvent) {
        let _ = self.events.try_send(event);
    }
}

async fn read_diagnostics(
    job_id: Uuid,
    stderr: ChildStderr,
    events: mpsc::Sender<ProgressEvent>,
) -> LogBuffer {
    let mut lines = BufReader::new(stderr).lines();
    let mut log = LogBuffer::default();
    let mut parser = ProgressParser::default();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parser.feed(&line) {
                ParsedLine::Snapshot(progress) => {
                    let _ = events.try_send(ProgressEvent::Progress(progress));
                }
                ParsedLine::Absorbed => {}
                ParsedLine::Diagnostic => {
                    debug!(job_id = %job_id, "[engine] {}", line);
                    log.push(&line);
                    let _ = events.try_send(ProgressEvent::Log(line));
                }
            },
            Ok(None) => break,
            Err(e) => {
                warn!(job_id = %job_id, "Error reading engine output: {}", e);
                break;
            }
        }
    }
    log
}

/// Replace the workspace directory in engine output so internal paths do
/// not reach clients.
fn redact(diagnostic: &str, workspace: &Workspace) -> String {
    let dir = workspace.dir().to_string_lossy();
    if dir.is_empty() {
        return diagnostic.to_string();
    }
    diagnostic.replace(dir.as_ref(), "<workspace>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_engines::{FAILING_ENGINE, HANGING_ENGINE, SUCCEEDING_ENGINE};
    use crate::pipeline::{self, ClipRequest, JobRequest, OutputFormat, Upload};
    use crate::workspace::WorkspaceManager;
    use std::path::PathBuf;
    use std::time::Instant;

    async fn setup() -> (tempfile::TempDir, WorkspaceManager, PipelineSpec) {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path().join("work")).await.unwrap();
        let spec = pipeline::build(&JobRequest::Clip(ClipRequest {
            upload: Some(Upload::default()),
            ..Default::default()
        }))
        .unwrap();
        (root, manager, spec)
    }

    async fn workspace(manager: &WorkspaceManager) -> (Workspace, PathBuf) {
        let ws = manager
            .allocate(Uuid::new_v4(), Some("mp4"), OutputFormat::Mp4)
            .await
            .unwrap();
        std::fs::write(ws.input_path().unwrap(), b"input").unwrap();
        let dir = ws.dir().to_path_buf();
        (ws, dir)
    }

    fn runner(script: &str, timeout: Duration) -> JobRunner {
        JobRunner::new(Some(Engine::scripted(script)), 2, timeout)
    }

    #[actix_web::test]
    async fn successful_job_hands_back_workspace() {
        let (_root, manager, spec) = setup().await;
        let (ws, dir) = workspace(&manager).await;
        let id = ws.id();

        let mut handle = runner(SUCCEEDING_ENGINE, Duration::from_secs(10))
            .start(&spec, ws)
            .unwrap();
        assert_eq!(handle.id(), id);

        let mut saw_started = false;
        let mut saw_progress = false;
        while let Some(event) = handle.next_event().await {
            match event {
                ProgressEvent::Started { command_line } => {
                    assert!(command_line.contains("-progress pipe:2"));
                    saw_started = true;
                }
                ProgressEvent::Progress(progress) => {
                    assert!(progress.is_complete);
                    assert_eq!(progress.out_time_ms, 1000);
                    saw_progress = true;
                }
                ProgressEvent::Log(_) => {}
            }
        }
        assert!(saw_started && saw_progress);

        match handle.outcome().await {
            Outcome::Completed(done) => {
                assert_eq!(done.output_size, 9);
                assert_eq!(std::fs::read(done.workspace.output_path()).unwrap(), b"FAKEVIDEO");
                drop(done);
                assert!(!dir.exists());
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[actix_web::test]
    async fn failed_job_reports_redacted_diagnostic_and_cleans_up() {
        let (_root, manager, spec) = setup().await;
        let (ws, dir) = workspace(&manager).await;

        let handle = runner(FAILING_ENGINE, Duration::from_secs(10))
            .start(&spec, ws)
            .unwrap();

        match handle.outcome().await {
            Outcome::Failed(failure) => {
                assert_eq!(failure.exit_code, Some(1));
                assert!(failure.diagnostic.contains("Invalid data found"));
                assert!(failure.diagnostic.contains("<workspace>"));
                assert!(!failure.diagnostic.contains(&*dir.to_string_lossy()));
                assert!(failure.diagnostic.chars().count() <= DIAGNOSTIC_TAIL_CHARS);
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(!dir.exists());
        assert_eq!(manager.active_count(), 0);
    }

    #[actix_web::test]
    async fn success_without_output_is_a_failure() {
        let (_root, manager, spec) = setup().await;
        let (ws, dir) = workspace(&manager).await;

        let handle = runner("exit 0", Duration::from_secs(10)).start(&spec, ws).unwrap();
        match handle.outcome().await {
            Outcome::Failed(failure) => assert!(failure.diagnostic.contains("no output")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(!dir.exists());
    }

    #[actix_web::test]
    async fn silent_failure_reports_exit_status() {
        let (_root, manager, spec) = setup().await;
        let (ws, dir) = workspace(&manager).await;

        let handle = runner("exit 3", Duration::from_secs(10)).start(&spec, ws).unwrap();
        match handle.outcome().await {
            Outcome::Failed(failure) => {
                assert_eq!(failure.exit_code, Some(3));
                assert!(failure.diagnostic.starts_with("media engine exited with"));
                assert!(failure.diagnostic.contains('3'));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(!dir.exists());
    }

    #[actix_web::test]
    async fn timeout_kills_engine() {
        let (_root, manager, spec) = setup().await;
        let (ws, dir) = workspace(&manager).await;

        let started = Instant::now();
        let handle = runner(HANGING_ENGINE, Duration::from_millis(300))
            .start(&spec, ws)
            .unwrap();

        assert!(matches!(handle.outcome().await, Outcome::Cancelled(CancelReason::Timeout)));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!dir.exists());
    }

    #[actix_web::test]
    async fn dropping_handle_cancels_job_and_releases_workspace() {
        let (_root, manager, spec) = setup().await;
        let (ws, dir) = workspace(&manager).await;

        let mut handle = runner(HANGING_ENGINE, Duration::from_secs(60))
            .start(&spec, ws)
            .unwrap();
        // Wait until the engine is actually running
        assert!(matches!(handle.next_event().await, Some(ProgressEvent::Started { .. })));
        assert_eq!(handle.state(), JobState::Running);
        drop(handle);

        let deadline = Instant::now() + Duration::from_secs(5);
        while dir.exists() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!dir.exists());
        assert_eq!(manager.active_count(), 0);
    }

    #[actix_web::test]
    async fn missing_engine_is_rejected_before_launch() {
        let (_root, manager, spec) = setup().await;
        let (ws, dir) = workspace(&manager).await;

        let runner = JobRunner::new(None, 1, Duration::from_secs(1));
        assert!(matches!(runner.start(&spec, ws), Err(EngineError::Unavailable)));
        assert!(!dir.exists());
    }

    #[actix_web::test]
    async fn concurrency_ceiling_is_respected() {
        let (_root, manager, spec) = setup().await;
        let runner = JobRunner::new(Some(Engine::scripted(HANGING_ENGINE)), 1, Duration::from_secs(60));

        let (first_ws, _) = workspace(&manager).await;
        let (second_ws, _) = workspace(&manager).await;
        let mut first = runner.start(&spec, first_ws).unwrap();
        let second = runner.start(&spec, second_ws).unwrap();

        assert!(matches!(first.next_event().await, Some(ProgressEvent::Started { .. })));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(runner.running_jobs(), 1);
        assert_eq!(second.state(), JobState::Starting);

        // Dropping a queued job never takes a slot; dropping the running one frees it
        drop(second);
        drop(first);
        let deadline = Instant::now() + Duration::from_secs(5);
        while (runner.running_jobs() > 0 || manager.active_count() > 0) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(runner.running_jobs(), 0);
        assert_eq!(manager.active_count(), 0);
    }
}
