use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::SocketAddr;

use crate::api::{
    health::health_config,
    state::AppState,
    transcode::{transcode_config, TranscodeService},
    validation,
};

/// Bind the HTTP server and return it unstarted, with the bound addresses.
///
/// Half-closed connections are refused: a client that sends FIN mid-request
/// has its handler dropped, which cancels the running job and releases its
/// workspace instead of letting the engine run to completion.
pub fn bind(
    addr: (&str, u16),
    state: web::Data<AppState>,
    transcode_service: web::Data<TranscodeService>,
    max_payload_size: usize,
) -> std::io::Result<(Server, Vec<SocketAddr>)> {
    let work_dir = state.workspaces.root().to_path_buf();

    let server = HttpServer::new(move || {
        // Configure payload size limits globally
        let payload_config = web::PayloadConfig::default()
            .limit(max_payload_size);

        App::new()
            .app_data(state.clone())
            .app_data(transcode_service.clone())
            .app_data(payload_config) // Global payload size limit
            .app_data(validation::multipart_config(max_payload_size)) // Global upload limit
            .app_data(validation::tempfile_config(&work_dir)) // Spool uploads next to workspaces
            .app_data(validation::json_config()) // Global validation config
            .configure(health_config)
            .configure(transcode_config)
    })
    .h1_allow_half_closed(false)
    .bind(addr)?;

    let addrs = server.addrs();
    Ok((server.run(), addrs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transcode::test_support::{content_type, multipart_body, Part};
    use crate::engine::test_engines::HANGING_ENGINE;
    use crate::engine::{Engine, JobRunner};
    use crate::workspace::WorkspaceManager;
    use std::io::Write;
    use std::net::{Shutdown, TcpStream};
    use std::time::Duration;

    fn leftovers(workspaces: &WorkspaceManager) -> usize {
        std::fs::read_dir(workspaces.root()).unwrap().count()
    }

    #[actix_web::test]
    async fn closed_socket_kills_running_overlay_job() {
        let root = tempfile::tempdir().unwrap();
        let workspaces = WorkspaceManager::new(root.path().join("work")).await.unwrap();
        let runner = JobRunner::new(Some(Engine::scripted(HANGING_ENGINE)), 4, Duration::from_secs(60));
        let state = web::Data::new(AppState::new(runner.clone(), workspaces.clone()));
        let service = web::Data::new(TranscodeService::new(workspaces.clone(), runner.clone()));

        let (server, addrs) = bind(("127.0.0.1", 0), state, service, 16 * 1024 * 1024).unwrap();
        let server_handle = server.handle();
        tokio::spawn(server);

        let body = multipart_body(&[
            Part::File("video", "clip.mp4", b"not really a video"),
            Part::Text("text", "Hello"),
        ]);
        let mut stream = TcpStream::connect(addrs[0]).unwrap();
        write!(
            stream,
            "POST /api/add-text-on-top HTTP/1.1\r\nHost: {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
            addrs[0],
            content_type(),
            body.len()
        )
        .unwrap();
        stream.write_all(&body).unwrap();
        stream.flush().unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while runner.running_jobs() == 0 {
            assert!(tokio::time::Instant::now() < deadline, "job never started");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(runner.running_jobs(), 1);
        assert_eq!(workspaces.active_count(), 1);

        stream.shutdown(Shutdown::Both).unwrap();
        drop(stream);

        // The hanging engine sleeps for 30s; draining well before that means it was killed.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while runner.running_jobs() > 0 || workspaces.active_count() > 0 || leftovers(&workspaces) > 0 {
            assert!(
                tokio::time::Instant::now() < deadline,
                "job survived the disconnect: {} running, {} entries left",
                runner.running_jobs(),
                leftovers(&workspaces)
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        server_handle.stop(false).await;
    }
}
