use url::Url;

use super::error::ValidationError;
use super::escape::{ColorToken, FilterText};
use super::format::OutputFormat;
use super::request::{ClipRequest, JobKind, JobRequest, OverlayRequest, RemuxRequest};
use super::stage::{Filter, FilterValue, InputSource, PipelineSpec, Stage};

pub const DEFAULT_START_SECONDS: f64 = 0.0;
pub const DEFAULT_DURATION_SECONDS: f64 = 5.0;
pub const DEFAULT_BOX_COLOR: &str = "white";
pub const DEFAULT_FONT_COLOR: &str = "black";
pub const DEFAULT_BOX_HEIGHT_PX: u32 = 120;
pub const MAX_BOX_HEIGHT_PX: u32 = 2160;
pub const MAX_FONT_SIZE: u32 = 512;

/// Validate a job request and describe the engine work it needs.
///
/// Pure: the same request always yields the same spec.
pub fn build(request: &JobRequest) -> Result<PipelineSpec, ValidationError> {
    let spec = match request {
        JobRequest::Clip(clip) => build_clip(clip)?,
        JobRequest::RemuxFromUrl(remux) => build_remux(remux)?,
        JobRequest::OverlayText(overlay) => build_overlay(overlay)?,
    };
    Ok(spec)
}

fn build_clip(clip: &ClipRequest) -> Result<PipelineSpec, ValidationError> {
    if clip.upload.is_none() {
        return Err(ValidationError::MissingField("video"));
    }

    let format = match clip.output_format.as_deref().map(str::trim) {
        None | Some("") => OutputFormat::default(),
        Some(raw) => raw.parse()?,
    };

    let start_seconds = clip
        .start_offset_seconds
        .filter(|start| start.is_finite() && *start >= 0.0)
        .unwrap_or(DEFAULT_START_SECONDS);
    let duration_seconds = clip
        .duration_seconds
        .filter(|duration| duration.is_finite() && *duration > 0.0)
        .unwrap_or(DEFAULT_DURATION_SECONDS);

    Ok(PipelineSpec::new(
        JobKind::Clip,
        format,
        vec![
            Stage::Input(InputSource::Upload),
            Stage::TrimWindow {
                start_seconds,
                duration_seconds,
            },
            Stage::Encode {
                format,
                copy_audio: false,
            },
        ],
    ))
}

fn build_remux(remux: &RemuxRequest) -> Result<PipelineSpec, ValidationError> {
    let raw = remux
        .source_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or(ValidationError::MissingField("url"))?;

    let url = Url::parse(raw).map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(ValidationError::InvalidUrl(format!(
                "scheme '{}' is not allowed, use http or https",
                scheme
            )))
        }
    }
    if url.host_str().is_none() {
        return Err(ValidationError::InvalidUrl("url has no host".to_string()));
    }

    Ok(PipelineSpec::new(
        JobKind::RemuxFromUrl,
        OutputFormat::Mp4,
        vec![
            Stage::Input(InputSource::Remote(url)),
            Stage::RemuxCopy,
            Stage::Encode {
                format: OutputFormat::Mp4,
                copy_audio: false,
            },
        ],
    ))
}

fn build_overlay(overlay: &OverlayRequest) -> Result<PipelineSpec, ValidationError> {
    if overlay.upload.is_none() {
        return Err(ValidationError::MissingField("video"));
    }

    let text = overlay
        .text
        .as_deref()
        .ok_or(ValidationError::MissingField("text"))
        .and_then(FilterText::parse)?;
    let box_color = ColorToken::parse(overlay.box_color.as_deref().unwrap_or(DEFAULT_BOX_COLOR))?;
    let font_color = ColorToken::parse(overlay.font_color.as_deref().unwrap_or(DEFAULT_FONT_COLOR))?;

    let box_height = match overlay.box_height_px {
        None => DEFAULT_BOX_HEIGHT_PX,
        Some(height) => bounded("box_height", height, MAX_BOX_HEIGHT_PX)?,
    };
    let font_size = match overlay.font_size {
        None => (box_height / 2).max(1),
        Some(size) => bounded("font_size", size, MAX_FONT_SIZE)?,
    };

    let drawbox = Filter::new("drawbox")
        .option("x", FilterValue::Int(0))
        .option("y", FilterValue::Int(0))
        .option("w", FilterValue::Keyword("iw"))
        .option("h", FilterValue::Int(box_height))
        .option("color", FilterValue::Color(box_color))
        .option("t", FilterValue::Keyword("fill"));

    let drawtext = Filter::new("drawtext")
        .option("text", FilterValue::Text(text))
        .option("expansion", FilterValue::Keyword("none"))
        .option("fontcolor", FilterValue::Color(font_color))
        .option("fontsize", FilterValue::Int(font_size))
        .option("x", FilterValue::Keyword("(w-text_w)/2"))
        .option("y", FilterValue::Expr(format!("({}-text_h)/2", box_height)));

    Ok(PipelineSpec::new(
        JobKind::OverlayText,
        OutputFormat::Mp4,
        vec![
            Stage::Input(InputSource::Upload),
            Stage::FilterGraph(vec![drawbox, drawtext]),
            Stage::Encode {
                format: OutputFormat::Mp4,
                copy_audio: true,
            },
        ],
    ))
}

fn bounded(field: &'static str, value: i64, max: u32) -> Result<u32, ValidationError> {
    u32::try_from(value)
        .ok()
        .filter(|v| (1..=max).contains(v))
        .ok_or(ValidationError::OutOfRange { field, max })
}
