//! Bitvavo streamer.
//!
//! Subscribes to the channels and markets listed in a TOML file and logs
//! every event received on them.

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::{AppConfig, StreamConfig};
pub use error::{AppError, AppResult};
