pub mod error;
pub mod health;
pub mod state;
pub mod transcode;
pub mod validation;
