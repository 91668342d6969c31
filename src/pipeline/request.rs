
/// Metadata for an uploaded payload. The bytes themselves stay in the
/// spooled temp file owned by the HTTP layer until the workspace takes them.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub declared_filename: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ClipRequest {
    pub upload: Option<Upload>,
    pub start_offset_seconds: Option<f64>,
    pub duration_seconds: Option<f64>,
    pub output_format: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RemuxRequest {
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct OverlayRequest {
    pub upload: Option<Upload>,
    pub text: Option<String>,
    pub box_color: Option<String>,
    pub box_height_px: Option<i64>,
    pub font_color: Option<String>,
    pub font_size: Option<i64>,
}

/// A transcode job as received from a client, before validation
#[derive(Debug, Clone)]
pub enum JobRequest {
    Clip(ClipRequest),
    RemuxFromUrl(RemuxRequest),
    OverlayText(OverlayRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Clip,
    RemuxFromUrl,
    OverlayText,
}

impl JobRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            JobRequest::Clip(_) => JobKind::Clip,
            JobRequest::RemuxFromUrl(_) => JobKind::RemuxFromUrl,
            JobRequest::OverlayText(_) => JobKind::OverlayText,
        }
    }

    pub fn upload(&self) -> Option<&Upload> {
        match self {
            JobRequest::Clip(clip) => clip.upload.as_ref(),
            JobRequest::OverlayText(overlay) => overlay.upload.as_ref(),
            JobRequest::RemuxFromUrl(_) => None,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobKind::Clip => "clip",
            JobKind::RemuxFromUrl => "remux_from_url",
            JobKind::OverlayText => "overlay_text",
        };
        f.write_str(name)
    }
}
