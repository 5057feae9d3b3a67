//! Configuration for the host capture service.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use scry_core::encoder::VideoEncoding;
use scry_core::error::CaptureError;
use scry_core::frame::PixelFormat;
use scry_core::updater::{Features, UpdaterConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Capture settings.
    pub screen: ScreenConfig,
    /// Encoder settings.
    pub encoder: EncoderConfig,
    /// Per-feature toggles.
    pub features: FeaturesConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    /// Target frames per second.
    pub fps: u8,
    /// Captured pixel format: "bgra8" or "rgba8".
    pub pixel_format: String,
}

/// Encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Video encoding: "zstd" or "raw".
    pub encoding: String,
    /// Zstd compression level (1..=19).
    pub zstd_level: i32,
}

/// Per-feature toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Produce video packets for changed regions.
    pub video: bool,
    /// Track and encode the cursor shape.
    pub cursor_shape: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            fps: 25,
            pixel_format: "bgra8".into(),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            encoding: "zstd".into(),
            zstd_level: 1,
        }
    }
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            video: true,
            cursor_shape: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl HostConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Convert into the capture loop's configuration.
    ///
    /// Out-of-range numeric values are clamped; unknown enum strings are
    /// rejected, since silently picking an encoding would be surprising.
    pub fn to_updater_config(&self) -> Result<UpdaterConfig, CaptureError> {
        let fps = self.screen.fps.clamp(1, 60) as u64;

        let video_encoding = match self.encoder.encoding.as_str() {
            "zstd" => VideoEncoding::Zstd,
            "raw" => VideoEncoding::Raw,
            other => {
                return Err(CaptureError::EncoderInit(format!(
                    "unknown encoding {other:?} (expected \"zstd\" or \"raw\")"
                )));
            }
        };

        let pixel_format = match self.screen.pixel_format.as_str() {
            "bgra8" => PixelFormat::Bgra8,
            "rgba8" => PixelFormat::Rgba8,
            other => {
                return Err(CaptureError::EncoderInit(format!(
                    "unknown pixel format {other:?} (expected \"bgra8\" or \"rgba8\")"
                )));
            }
        };

        let mut features = Features::empty();
        features.set(Features::VIDEO, self.features.video);
        features.set(Features::CURSOR_SHAPE, self.features.cursor_shape);

        Ok(UpdaterConfig {
            update_interval: Duration::from_millis(1000 / fps),
            features,
            video_encoding,
            zstd_level: self.encoder.zstd_level.clamp(1, 19),
            pixel_format,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = HostConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("fps"));
        assert!(text.contains("zstd_level"));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = HostConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: HostConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.screen.fps, 25);
        assert_eq!(parsed.encoder.encoding, "zstd");
    }

    #[test]
    fn to_updater_config_clamps_fps() {
        let mut cfg = HostConfig::default();
        cfg.screen.fps = 200; // beyond max
        let updater = cfg.to_updater_config().unwrap();
        assert_eq!(updater.update_interval, Duration::from_millis(1000 / 60));
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        let mut cfg = HostConfig::default();
        cfg.encoder.encoding = "h264".into();
        assert!(matches!(
            cfg.to_updater_config(),
            Err(CaptureError::EncoderInit(_))
        ));
    }

    #[test]
    fn feature_toggles_map_to_flags() {
        let mut cfg = HostConfig::default();
        cfg.features.cursor_shape = false;
        let updater = cfg.to_updater_config().unwrap();
        assert!(updater.features.contains(Features::VIDEO));
        assert!(!updater.features.contains(Features::CURSOR_SHAPE));
    }
}
