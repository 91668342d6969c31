use std::fmt;
use std::str::FromStr;

use super::error::ValidationError;

/// Container formats the gateway is willing to produce
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    #[default]
    Mp4,
    Webm,
    Mov,
    Mkv,
    Avi,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Mp4,
        OutputFormat::Webm,
        OutputFormat::Mov,
        OutputFormat::Mkv,
        OutputFormat::Avi,
    ];

    /// File extension used for the workspace output path
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Webm => "webm",
            OutputFormat::Mov => "mov",
            OutputFormat::Mkv => "mkv",
            OutputFormat::Avi => "avi",
        }
    }

    /// Content-Type sent with the streamed artifact
    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "video/mp4",
            OutputFormat::Webm => "video/webm",
            OutputFormat::Mov => "video/quicktime",
            OutputFormat::Mkv => "video/x-matroska",
            OutputFormat::Avi => "video/x-msvideo",
        }
    }

    /// Muxer name handed to the engine's `-f` flag
    pub fn muxer(self) -> &'static str {
        match self {
            OutputFormat::Mkv => "matroska",
            other => other.extension(),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().trim_start_matches('.');
        OutputFormat::ALL
            .into_iter()
            .find(|format| format.extension().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ValidationError::UnsupportedFormat(s.to_string()))
    }
}
