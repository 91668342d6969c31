use actix_multipart::form::MultipartForm;
use actix_web::{
    post,
    web::{scope, Data, ServiceConfig},
    HttpResponse,
};
use actix_web_validator::Json;

use super::dto::{ClipForm, OverlayForm, RemuxBody};
use super::service::TranscodeService;
use crate::api::error::ApiError;

/// Cut a window out of an uploaded video
#[post("/clip")]
async fn clip(
    service: Data<TranscodeService>,
    MultipartForm(form): MultipartForm<ClipForm>,
) -> Result<HttpResponse, ApiError> {
    let (request, upload) = form.into_job();
    service.execute(request, upload).await
}

/// Repackage a remote DASH manifest as MP4
#[post("/mpd-to-mp4")]
async fn mpd_to_mp4(
    service: Data<TranscodeService>,
    body: Json<RemuxBody>,
) -> Result<HttpResponse, ApiError> {
    service.execute(body.into_inner().into(), None).await
}

/// Burn a caption box across the top of an uploaded video
#[post("/add-text-on-top")]
async fn add_text_on_top(
    service: Data<TranscodeService>,
    MultipartForm(form): MultipartForm<OverlayForm>,
) -> Result<HttpResponse, ApiError> {
    let (request, upload) = form.into_job();
    service.execute(request, upload).await
}

pub fn transcode_config(config: &mut ServiceConfig) {
    config.service(
        scope("/api")
            .service(clip)
            .service(mpd_to_mp4)
            .service(add_text_on_top),
    );
}
