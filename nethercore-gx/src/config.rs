//! Renderer configuration (gx.toml)
//!
//! Handles loading, saving, and providing defaults for renderer settings.
//! Settings are stored in TOML format in the platform-specific config directory.
//! The renderer never reads this live during a frame; it is folded into a
//! [`FrameSettings`](crate::settings::FrameSettings) snapshot instead.

use std::path::{Path, PathBuf};

use gx_common::OutputFormat;
use serde::{Deserialize, Serialize};

use crate::error::{GxError, GxResult};

const CONFIG_FILE: &str = "gx.toml";

/// Renderer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Console-accuracy emulation toggles
    #[serde(default)]
    pub emulation: EmulationConfig,
    /// Image quality settings
    #[serde(default)]
    pub quality: QualityConfig,
    /// Output buffer settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Emulation accuracy toggles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulationConfig {
    /// Five-pass shadow volume compositing (default: true)
    #[serde(default = "default_true")]
    pub shadow_polygon: bool,
    /// Blending onto zero-alpha destinations (default: true)
    #[serde(default = "default_true")]
    pub special_zero_alpha_blending: bool,
    /// Console depth format and the depth-equal tolerance window (default: true)
    #[serde(default = "default_true")]
    pub nds_depth_calculation: bool,
    /// Separate front and back faces at equal depth (default: false)
    #[serde(default)]
    pub depth_lequal_polygon_facing: bool,
}

/// Image quality settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Bilinear texture filtering (default: false)
    #[serde(default)]
    pub texture_smoothing: bool,
    /// Requested multisample count, 0 disables (default: 0)
    #[serde(default)]
    pub multisample_size: u32,
    /// Edge marking post-process (default: true)
    #[serde(default = "default_true")]
    pub edge_mark: bool,
    /// Fog post-process (default: true)
    #[serde(default = "default_true")]
    pub fog: bool,
}

/// Output buffer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    /// Main buffer precision (default: rgba6665)
    #[serde(default)]
    pub format: OutputFormat,
}

fn default_true() -> bool {
    true
}

impl Default for EmulationConfig {
    fn default() -> Self {
        Self {
            shadow_polygon: default_true(),
            special_zero_alpha_blending: default_true(),
            nds_depth_calculation: default_true(),
            depth_lequal_polygon_facing: false,
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            texture_smoothing: false,
            multisample_size: 0,
            edge_mark: default_true(),
            fog: default_true(),
        }
    }
}

/// Returns the platform-specific configuration directory.
///
/// On Windows: `%APPDATA%\Nethercore\config`
/// On macOS: `~/Library/Application Support/io.nethercore.Nethercore`
/// On Linux: `~/.config/Nethercore`
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io.nethercore", "", "Nethercore")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Loads the configuration from disk.
///
/// Returns default values if the file doesn't exist or cannot be parsed.
pub fn load() -> Config {
    config_dir()
        .and_then(|dir| load_from(&dir.join(CONFIG_FILE)).ok())
        .unwrap_or_default()
}

/// Loads the configuration from an explicit path, reporting failures.
pub fn load_from(path: &Path) -> GxResult<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| GxError::Config(format!("{}: {e}", path.display())))?;
    toml::from_str(&content).map_err(|e| GxError::Config(format!("{}: {e}", path.display())))
}

/// Saves the configuration to the platform configuration directory.
///
/// Creates the directory if it doesn't exist.
pub fn save(config: &Config) -> GxResult<()> {
    match config_dir() {
        Some(dir) => save_to(config, &dir.join(CONFIG_FILE)),
        None => Ok(()),
    }
}

/// Saves the configuration to an explicit path.
pub fn save_to(config: &Config, path: &Path) -> GxResult<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| GxError::Config(e.to_string()))?;
    }
    let content = toml::to_string_pretty(config).map_err(|e| GxError::Config(e.to_string()))?;
    std::fs::write(path, content).map_err(|e| GxError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.emulation.shadow_polygon);
        assert!(config.emulation.special_zero_alpha_blending);
        assert!(config.emulation.nds_depth_calculation);
        assert!(!config.emulation.depth_lequal_polygon_facing);
        assert_eq!(config.quality.multisample_size, 0);
        assert_eq!(config.output.format, OutputFormat::Rgba6665);
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let mut config = Config::default();
        config.quality.texture_smoothing = true;
        config.quality.multisample_size = 4;
        config.output.format = OutputFormat::Rgba8888;

        let content = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&content).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_config_empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_partial_section() {
        let config: Config = toml::from_str(
            r#"
            [emulation]
            shadow_polygon = false

            [output]
            format = "rgba8888"
            "#,
        )
        .unwrap();
        assert!(!config.emulation.shadow_polygon);
        assert!(config.emulation.nds_depth_calculation);
        assert!(config.quality.edge_mark);
        assert_eq!(config.output.format, OutputFormat::Rgba8888);
    }

    #[test]
    fn test_save_and_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = Config::default();
        config.emulation.depth_lequal_polygon_facing = true;
        save_to(&config, &path).unwrap();

        assert_eq!(load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[quality]\nmultisample_size = \"many\"").unwrap();
        assert!(matches!(load_from(&path), Err(GxError::Config(_))));
    }
}
