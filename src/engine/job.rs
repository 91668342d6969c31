use std::collections::VecDeque;
use std::fmt;

use crate::workspace::Workspace;

/// Lines kept from the engine's diagnostic stream
pub const LOG_BUFFER_LINES: usize = 500;
/// Longest single diagnostic line kept, in bytes
pub const LOG_LINE_MAX_BYTES: usize = 1024;
/// Characters of diagnostic context surfaced to callers on failure
pub const DIAGNOSTIC_TAIL_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Starting,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Starting => "starting",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Snapshot of the engine's `-progress` report
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progress {
    pub frame: u64,
    pub out_time_ms: i64,
    pub speed: f64,
    pub is_complete: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// The engine process is up; carries the invocation line
    Started { command_line: String },
    /// A diagnostic line from the engine
    Log(String),
    /// A completed `-progress` block
    Progress(Progress),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller went away before the job finished
    ClientAbort,
    /// The job exceeded its wall-clock budget
    Timeout,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::ClientAbort => f.write_str("client aborted"),
            CancelReason::Timeout => f.write_str("timed out"),
        }
    }
}

/// A finished job whose output is ready to stream
#[derive(Debug)]
pub struct CompletedJob {
    pub workspace: Workspace,
    pub output_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub exit_code: Option<i32>,
    /// Tail of the engine log, workspace paths redacted
    pub diagnostic: String,
}

/// Terminal result of a job
#[derive(Debug)]
pub enum Outcome {
    Completed(CompletedJob),
    Failed(JobFailure),
    Cancelled(CancelReason),
}

/// Ring buffer of recent engine output lines
#[derive(Debug, Default)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    dropped: usize,
}

impl LogBuffer {
    pub fn push(&mut self, line: &str) {
        if self.lines.len() == LOG_BUFFER_LINES {
            self.lines.pop_front();
            self.dropped += 1;
        }
        self.lines.push_back(truncate_bytes(line, LOG_LINE_MAX_BYTES).to_string());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines evicted to stay within the cap
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// The last `max_chars` characters of the buffered log
    pub fn tail(&self, max_chars: usize) -> String {
        let joined = self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n");
        let total = joined.chars().count();
        if total <= max_chars {
            return joined;
        }
        joined.chars().skip(total - max_chars).collect()
    }
}

fn truncate_bytes(line: &str, max: usize) -> &str {
    if line.len() <= max {
        return line;
    }
    let mut end = max;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}

/// Accumulates `-progress pipe:2` key/value lines.
#[derive(Debug, Default)]
pub struct ProgressParser {
    current: Progress,
}

/// What a single stderr line turned out to be
#[derive(Debug, PartialEq)]
pub enum ParsedLine {
    /// A progress block finished
    Snapshot(Progress),
    /// A progress key that was absorbed into the current block
    Absorbed,
    /// Ordinary diagnostic output
    Diagnostic,
}

const PROGRESS_KEYS: &[&str] = &[
    "frame",
    "fps",
    "bitrate",
    "total_size",
    "out_time_us",
    "out_time_ms",
    "out_time",
    "dup_frames",
    "drop_frames",
    "speed",
    "progress",
];

impl ProgressParser {
    pub fn feed(&mut self, line: &str) -> ParsedLine {
        let Some((key, value)) = line.trim().split_once('=') else {
            return ParsedLine::Diagnostic;
        };
        if !(PROGRESS_KEYS.contains(&key) || key.starts_with("stream_")) || value.contains(' ') {
            return ParsedLine::Diagnostic;
        }

        match key {
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.current.frame = frame;
                }
            }
            "out_time_us" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.current.out_time_ms = us / 1000;
                }
            }
            "speed" => {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.parse().ok()) {
                    self.current.speed = speed;
                }
            }
            "progress" => {
                self.current.is_complete = value == "end";
                return ParsedLine::Snapshot(self.current.clone());
            }
            _ => {}
        }
        ParsedLine::Absorbed
    }
}
