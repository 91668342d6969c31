use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Interface to bind
    /// Default: 0.0.0.0
    pub host: String,

    /// Listen port
    /// Default: 3000
    pub port: u16,

    /// Root for request workspaces and spooled uploads
    /// Default: <system temp>/media-gateway
    pub work_dir: PathBuf,

    /// Directory for the rotating log files
    /// Default: logs
    pub log_dir: PathBuf,

    /// Maximum payload size for all requests (in bytes)
    /// Default: 512MB (512 * 1024 * 1024)
    pub max_payload_size: usize,

    /// Engine processes allowed to run at once
    /// Default: 4
    pub max_concurrent_jobs: usize,

    /// Wall-clock limit for a single engine run
    /// Default: 600
    pub job_timeout_secs: u64,

    /// Seconds between janitor sweeps
    /// Default: 900
    pub janitor_interval_secs: u64,

    /// Orphaned artifacts older than this are swept
    /// Default: 3600
    pub artifact_max_age_secs: u64,

    /// Explicit engine binary; PATH lookup when unset
    pub ffmpeg_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Every variable is optional. A variable that is set but does not
    /// parse is an error rather than a silent fallback to the default.
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Config {
            host: value("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse(&value, "PORT", 3000)?,
            work_dir: value("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| env::temp_dir().join("media-gateway")),
            log_dir: value("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs")),
            max_payload_size: parse(&value, "MAX_PAYLOAD_SIZE", 512 * 1024 * 1024)?,
            max_concurrent_jobs: parse(&value, "MAX_CONCURRENT_JOBS", 4)?,
            job_timeout_secs: parse(&value, "JOB_TIMEOUT_SECS", 600)?,
            janitor_interval_secs: parse(&value, "JANITOR_INTERVAL_SECS", 900)?,
            artifact_max_age_secs: parse(&value, "ARTIFACT_MAX_AGE_SECS", 3600)?,
            ffmpeg_path: value("FFMPEG_PATH").map(PathBuf::from),
        };

        if config.max_concurrent_jobs == 0 {
            return Err("MAX_CONCURRENT_JOBS must be at least 1".to_string());
        }
        if config.janitor_interval_secs == 0 {
            return Err("JANITOR_INTERVAL_SECS must be at least 1".to_string());
        }
        Ok(config)
    }
}

fn parse<T: FromStr>(value: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, String> {
    match value(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("{} must be a number, got {:?}", key, raw)),
        None => Ok(default),
    }
}
