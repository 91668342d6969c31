pub mod dto;
pub mod handlers;
pub mod service;
#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use handlers::transcode_config;
pub use service::TranscodeService;
