use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::publisher::is_file_safe_sender_name;
use crate::error::ConfigError;

pub const DEFAULT_COLOR_SENDER: &str = "OpenSpace-yt-Color";
pub const DEFAULT_DEPTH_SENDER: &str = "OpenSpace-yt-Depth";
/// Slowest accepted publish rate
pub const MIN_TARGET_FPS: f32 = 1e-3;

/// What to do when a readback no longer matches the publish size
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SizeMismatchPolicy {
    /// Reallocate the publish textures at the new size and keep going
    #[default]
    Reallocate,
    /// Drop the frame and keep the configured size
    SkipFrame,
}

/// Runtime configuration for capture, pacing and publishing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Publish width in pixels (also the window width)
    pub width: u32,
    /// Publish height in pixels
    pub height: u32,
    /// Capture-and-publish cycles per second
    pub target_fps: f32,
    pub color_sender: String,
    pub depth_sender: String,
    /// Ask the publisher to flip rows before sending
    pub flip_vertically: bool,
    pub size_mismatch: SizeMismatchPolicy,
    /// Directory holding the shared frame files
    pub share_dir: PathBuf,
    pub snapshot_dir: PathBuf,
    pub show_ui: bool,
    /// Samples per ray in the volume renderer
    pub ray_steps: u32,
    pub opacity_scale: f32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 800,
            target_fps: 30.0,
            color_sender: DEFAULT_COLOR_SENDER.to_string(),
            depth_sender: DEFAULT_DEPTH_SENDER.to_string(),
            flip_vertically: false,
            size_mismatch: SizeMismatchPolicy::Reallocate,
            share_dir: std::env::temp_dir().join("volume-bridge"),
            snapshot_dir: PathBuf::from("snapshots"),
            show_ui: true,
            ray_steps: 256,
            opacity_scale: 8.0,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a JSON file; missing keys take defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(contents)?;
        Ok(config)
    }

    /// Load from `path` if given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Reject settings that would fail later inside the loop
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Validation(format!(
                "publish size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }

        if !self.target_fps.is_finite() || self.target_fps < MIN_TARGET_FPS {
            return Err(ConfigError::Validation(format!(
                "target_fps must be a finite rate of at least {MIN_TARGET_FPS}, got {}",
                self.target_fps
            )));
        }

        for (field, name) in [
            ("color_sender", &self.color_sender),
            ("depth_sender", &self.depth_sender),
        ] {
            if name.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{field} must not be empty")));
            }
            if !is_file_safe_sender_name(name) {
                return Err(ConfigError::Validation(format!(
                    "{field} '{name}' must be a single file name without path separators"
                )));
            }
        }

        if self.color_sender == self.depth_sender {
            return Err(ConfigError::Validation(format!(
                "color_sender and depth_sender must differ, both are '{}'",
                self.color_sender
            )));
        }

        if self.ray_steps == 0 {
            return Err(ConfigError::Validation("ray_steps must be at least 1".to_string()));
        }

        if !self.opacity_scale.is_finite() || self.opacity_scale < 0.0 {
            return Err(ConfigError::Validation(format!(
                "opacity_scale must be finite and non-negative, got {}",
                self.opacity_scale
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!((config.width, config.height), (800, 800));
        assert_eq!(config.target_fps, 30.0);
        assert_eq!(config.color_sender, DEFAULT_COLOR_SENDER);
        assert_eq!(config.depth_sender, DEFAULT_DEPTH_SENDER);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = BridgeConfig::from_json(r#"{ "width": 640, "target_fps": 60 }"#).unwrap();
        assert_eq!(config.width, 640);
        assert_eq!(config.height, 800);
        assert_eq!(config.target_fps, 60.0);
        assert_eq!(config.size_mismatch, SizeMismatchPolicy::Reallocate);
    }

    #[test]
    fn parses_skip_frame_policy() {
        let config = BridgeConfig::from_json(r#"{ "size_mismatch": "skip-frame" }"#).unwrap();
        assert_eq!(config.size_mismatch, SizeMismatchPolicy::SkipFrame);
    }

    #[test]
    fn rejects_empty_sender() {
        let config = BridgeConfig {
            depth_sender: String::new(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("depth_sender"));
    }

    #[test]
    fn rejects_duplicate_senders() {
        let config = BridgeConfig {
            color_sender: "same".to_string(),
            depth_sender: "same".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_zero_size_and_bad_rate() {
        let zero = BridgeConfig {
            width: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        for fps in [0.0, -5.0, 1e-30, 5e-4, f32::NAN, f32::INFINITY] {
            let config = BridgeConfig {
                target_fps: fps,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "fps {fps} should be rejected");
        }
    }

    #[test]
    fn slowest_rate_is_accepted() {
        let config = BridgeConfig {
            target_fps: MIN_TARGET_FPS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_sender_names_with_paths() {
        for name in ["sub/depth", "../x", "..", "a\\b"] {
            let config = BridgeConfig {
                depth_sender: name.to_string(),
                ..Default::default()
            };
            let err = config.validate().unwrap_err();
            assert!(matches!(err, ConfigError::Validation(ref msg) if msg.contains("depth_sender")), "{name}");
        }
    }

    #[test]
    fn malformed_json_is_parse_error() {
        assert!(matches!(
            BridgeConfig::from_json("{ width: }"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = BridgeConfig::from_file(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
