// cli.rs - Command-line interface configuration
use std::path::PathBuf;

use clap::Parser;

use crate::config::{BridgeConfig, SizeMismatchPolicy};

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "volume-bridge")]
#[command(about = "Render a volume dataset and publish its color and depth buffers every frame", long_about = None)]
pub struct Cli {
    /// Volume dataset (JSON); prompted for when omitted
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Particle positions (JSON) deposited as an extra field
    #[arg(long)]
    pub particles: Option<PathBuf>,

    /// Field to render; prompted for when omitted
    #[arg(long)]
    pub field: Option<String>,

    /// Configuration file (JSON); defaults apply when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub width: Option<u32>,

    #[arg(long)]
    pub height: Option<u32>,

    /// Publish rate in frames per second
    #[arg(long)]
    pub fps: Option<f32>,

    /// Directory the shared frame files are written to
    #[arg(long)]
    pub share_dir: Option<PathBuf>,

    #[arg(long)]
    pub snapshot_dir: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub size_mismatch: Option<SizeMismatchPolicy>,

    /// Flip rows before publishing
    #[arg(long)]
    pub flip: bool,

    /// Render offscreen without a window
    #[arg(long)]
    pub headless: bool,

    /// Frames to publish in headless mode
    #[arg(long, default_value_t = 300)]
    pub frames: u64,

    /// Save a snapshot of the last headless frame
    #[arg(long)]
    pub snapshot_last: bool,

    /// Disable the overlay
    #[arg(long = "no-ui", default_value = "false")]
    pub no_ui: bool,
}

impl Cli {
    /// Apply command-line overrides on top of file or default settings
    pub fn apply(&self, config: &mut BridgeConfig) {
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(fps) = self.fps {
            config.target_fps = fps;
        }
        if let Some(dir) = &self.share_dir {
            config.share_dir = dir.clone();
        }
        if let Some(dir) = &self.snapshot_dir {
            config.snapshot_dir = dir.clone();
        }
        if let Some(policy) = self.size_mismatch {
            config.size_mismatch = policy;
        }
        if self.flip {
            config.flip_vertically = true;
        }
        if self.no_ui {
            config.show_ui = false;
        }
    }
}
