//! Request validation and engine-agnostic stage descriptions.

pub mod builder;
pub mod error;
pub mod escape;
pub mod format;
pub mod request;
pub mod stage;

pub use builder::build;
pub use error::ValidationError;
pub use format::OutputFormat;
pub use request::{ClipRequest, JobKind, JobRequest, OverlayRequest, RemuxRequest, Upload};
pub use stage::{InputSource, PipelineSpec, Stage};
