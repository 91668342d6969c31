use actix_multipart::form::tempfile::TempFile;
use actix_multipart::form::text::Text;
use actix_multipart::form::MultipartForm;
use serde::Deserialize;
use tempfile::NamedTempFile;
use validator::Validate;

use crate::pipeline::{ClipRequest, JobRequest, OverlayRequest, RemuxRequest, Upload};

/// `POST /api/clip` form
#[derive(MultipartForm)]
pub struct ClipForm {
    pub video: Option<TempFile>,
    pub start: Option<Text<f64>>,
    pub duration: Option<Text<f64>>,
    pub format: Option<Text<String>>,
}

/// `POST /api/add-text-on-top` form
#[derive(MultipartForm)]
pub struct OverlayForm {
    pub video: Option<TempFile>,
    pub text: Option<Text<String>>,
    pub color: Option<Text<String>>,
    pub box_height: Option<Text<i64>>,
    pub font_color: Option<Text<String>>,
    pub font_size: Option<Text<i64>>,
}

/// `POST /api/mpd-to-mp4` body
#[derive(Debug, Deserialize, Validate)]
pub struct RemuxBody {
    #[validate(
        required(message = "url is required"),
        length(min = 1, max = 2048, message = "url must be between 1 and 2048 characters")
    )]
    pub url: Option<String>,
}

/// Split an uploaded file into its declared name and the spooled bytes
fn split_upload(video: Option<TempFile>) -> (Option<Upload>, Option<NamedTempFile>) {
    match video {
        Some(video) => (
            Some(Upload {
                declared_filename: video.file_name,
            }),
            Some(video.file),
        ),
        None => (None, None),
    }
}

impl ClipForm {
    pub fn into_job(self) -> (JobRequest, Option<NamedTempFile>) {
        let (upload, file) = split_upload(self.video);
        let request = ClipRequest {
            upload,
            start_offset_seconds: self.start.map(Text::into_inner),
            duration_seconds: self.duration.map(Text::into_inner),
            output_format: self.format.map(Text::into_inner),
        };
        (JobRequest::Clip(request), file)
    }
}

impl OverlayForm {
    pub fn into_job(self) -> (JobRequest, Option<NamedTempFile>) {
        let (upload, file) = split_upload(self.video);
        let request = OverlayRequest {
            upload,
            text: self.text.map(Text::into_inner),
            box_color: self.color.map(Text::into_inner),
            box_height_px: self.box_height.map(Text::into_inner),
            font_color: self.font_color.map(Text::into_inner),
            font_size: self.font_size.map(Text::into_inner),
        };
        (JobRequest::OverlayText(request), file)
    }
}

impl From<RemuxBody> for JobRequest {
    fn from(body: RemuxBody) -> Self {
        JobRequest::RemuxFromUrl(RemuxRequest {
            source_url: body.url,
        })
    }
}
