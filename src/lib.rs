pub mod app;
pub mod camera;
pub mod cli;
pub mod config;
pub mod core;
pub mod dataset;
pub mod error;
pub mod presenter;
pub mod prompt;
pub mod renderer;
pub mod snapshot;
pub mod types;

pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
