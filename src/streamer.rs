//! Streaming a finished job's output back to the client.
//!
//! The response body owns the job's workspace. It is released the moment
//! the last chunk has been read, or when actix drops the body because the
//! client went away, whichever comes first. The directory removal itself
//! runs on the blocking pool so it never stalls the worker serving the body.

use actix_web::body::SizedStream;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::web::Bytes;
use actix_web::HttpResponse;
use futures_util::Stream;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::engine::CompletedJob;
use crate::workspace::Workspace;

/// Open a completed job's output and build a streaming response for it.
///
/// `attachment` names the download when the client should save rather than
/// play the file.
pub async fn stream_artifact(job: CompletedJob, attachment: Option<&str>) -> io::Result<HttpResponse> {
    let CompletedJob {
        workspace,
        output_size,
    } = job;

    let file = match File::open(workspace.output_path()).await {
        Ok(file) => file,
        Err(e) => {
            if let Err(release) = workspace.release_async().await {
                warn!("Failed to release workspace without output: {}", release);
            }
            return Err(e);
        }
    };
    let content_type = workspace.output_format().content_type();
    let stream = ArtifactStream::new(file, workspace);

    let mut response = HttpResponse::Ok();
    response.content_type(content_type);
    if let Some(filename) = attachment {
        response.insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename.to_string())],
        });
    }
    Ok(response.body(SizedStream::new(output_size, stream)))
}

/// Chunked reader over the output file that releases its workspace once.
pub struct ArtifactStream {
    inner: ReaderStream<File>,
    workspace: Option<Workspace>,
    sent: u64,
}

impl ArtifactStream {
    pub fn new(file: File, workspace: Workspace) -> Self {
        Self {
            inner: ReaderStream::new(file),
            workspace: Some(workspace),
            sent: 0,
        }
    }

    fn finish(&mut self) {
        if let Some(workspace) = self.workspace.take() {
            workspace.release_detached();
        }
    }
}

impl Stream for ArtifactStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.sent += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                warn!("Error reading job output after {} bytes: {}", this.sent, e);
                this.finish();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                if let Some(workspace) = &this.workspace {
                    debug!(request_id = %workspace.id(), bytes = this.sent, "Output streamed");
                }
                this.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ArtifactStream {
    fn drop(&mut self) {
        if let Some(workspace) = &self.workspace {
            info!(request_id = %workspace.id(), bytes = self.sent, "Client disconnected mid-stream");
        }
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::OutputFormat;
    use crate::workspace::WorkspaceManager;
    use actix_web::body::MessageBody;
    use actix_web::http::header;
    use std::path::Path;
    use std::time::Duration;
    use uuid::Uuid;

    async fn wait_until_removed(dir: &Path, manager: &WorkspaceManager) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while dir.exists() || manager.active_count() > 0 {
            assert!(tokio::time::Instant::now() < deadline, "workspace not released");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn completed(
        manager: &WorkspaceManager,
        format: OutputFormat,
        payload: &[u8],
    ) -> (CompletedJob, std::path::PathBuf) {
        let workspace = manager.allocate(Uuid::new_v4(), None, format).await.unwrap();
        std::fs::write(workspace.output_path(), payload).unwrap();
        let dir = workspace.dir().to_path_buf();
        (
            CompletedJob {
                workspace,
                output_size: payload.len() as u64,
            },
            dir,
        )
    }

    #[actix_web::test]
    async fn streams_whole_file_then_releases() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path()).await.unwrap();
        let payload = vec![7u8; 20_000];
        let (job, dir) = completed(&manager, OutputFormat::Webm, &payload).await;

        let response = stream_artifact(job, None).await.unwrap();
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "video/webm"
        );
        assert!(response.headers().get(header::CONTENT_DISPOSITION).is_none());

        let body = actix_web::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(body.len(), payload.len());
        wait_until_removed(&dir, &manager).await;
    }

    #[actix_web::test]
    async fn attachment_sets_disposition() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path()).await.unwrap();
        let (job, _dir) = completed(&manager, OutputFormat::Mp4, b"data").await;

        let response = stream_artifact(job, Some("overlay.mp4")).await.unwrap();
        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(disposition.starts_with("attachment"));
        assert!(disposition.contains("overlay.mp4"));
    }

    #[actix_web::test]
    async fn dropping_body_mid_stream_releases_once() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path()).await.unwrap();
        let payload = vec![1u8; 64 * 1024];
        let (job, dir) = completed(&manager, OutputFormat::Mp4, &payload).await;

        let response = stream_artifact(job, None).await.unwrap();
        let mut body = response.into_body();
        let first = std::future::poll_fn(|cx| Pin::new(&mut body).poll_next(cx)).await;
        assert!(matches!(first, Some(Ok(chunk)) if !chunk.is_empty()));
        assert!(dir.exists());

        drop(body);
        wait_until_removed(&dir, &manager).await;
    }

    #[actix_web::test]
    async fn missing_output_releases_workspace() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path()).await.unwrap();
        let (job, dir) = completed(&manager, OutputFormat::Mp4, b"x").await;
        std::fs::remove_file(job.workspace.output_path()).unwrap();

        assert!(stream_artifact(job, None).await.is_err());
        assert!(!dir.exists());
        assert_eq!(manager.active_count(), 0);
    }
}
