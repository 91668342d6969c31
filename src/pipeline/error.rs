use thiserror::Error;

/// Rejections raised while turning a request into a pipeline.
///
/// Every variant is a client fault: nothing has been launched when one of
/// these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unsupported format")]
    UnsupportedFormat(String),

    #[error("unsafe overlay text")]
    UnsafeOverlayText,

    #[error("overlay text must be between 1 and {max} characters")]
    OverlayTextLength { max: usize },

    #[error("invalid color token")]
    InvalidColor(String),

    #[error("{field} must be an integer between 1 and {max}")]
    OutOfRange { field: &'static str, max: u32 },

    #[error("invalid source url: {0}")]
    InvalidUrl(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}
