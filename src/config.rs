// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section has defaults, so a missing file or a partial file both work.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use winit::keyboard::KeyCode;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
    pub controls: ControlsConfig,
    pub assets: AssetsConfig,
    pub camera: CameraConfig,
}

/// Window settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan".to_string(),
            width: 800,
            height: 600,
            fullscreen: false,
            resizable: true,
        }
    }
}

/// Graphics settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
    pub mipmaps: bool,
    pub anisotropy: bool,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "mailbox".to_string(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            max_frames_in_flight: 2,
            mipmaps: true,
            anisotropy: true,
        }
    }
}

/// Debug settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_to_file: false,
            log_file: "vulkan_debug.log".to_string(),
            show_fps: true,
        }
    }
}

impl DebugConfig {
    /// Validation is only ever turned on in debug builds
    pub fn validation_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.validation_layers
    }
}

/// Control key bindings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub fullscreen_key: String,
    pub quit_key: String,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            fullscreen_key: "F11".to_string(),
            quit_key: "Escape".to_string(),
        }
    }
}

/// Asset locations. A missing model falls back to the built-in quads,
/// a missing texture to a generated checkerboard.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub model_path: Option<PathBuf>,
    pub texture_path: Option<PathBuf>,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            texture_path: None,
            vertex_shader: PathBuf::from("shaders/model.vert.spv"),
            fragment_shader: PathBuf::from("shaders/model.frag.spv"),
        }
    }
}

/// Camera and model animation
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub eye: [f32; 3],
    pub target: [f32; 3],
    pub up: [f32; 3],
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub rotation_degrees_per_second: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            eye: [2.0, 2.0, 2.0],
            target: [0.0, 0.0, 0.0],
            up: [0.0, 0.0, 1.0],
            fov_y_degrees: 45.0,
            near: 0.1,
            far: 10.0,
            rotation_degrees_per_second: 90.0,
        }
    }
}

impl Config {
    pub const PATH: &'static str = "config.toml";

    /// Load `config.toml` from the working directory, see `load_or_default`
    pub fn load() -> (Self, Option<anyhow::Error>) {
        Self::load_or_default(Self::PATH)
    }

    /// Defaults plus the error when the file exists but cannot be used.
    ///
    /// Runs before logging is set up, so the caller reports the error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, Option<anyhow::Error>) {
        match Self::load_from_path(path) {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        }
    }

    /// Load configuration from a specific path; a missing file yields defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    fn parse(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        // At least one frame in flight
        config.graphics.max_frames_in_flight = config.graphics.max_frames_in_flight.max(1);
        Ok(config)
    }

    /// Preferred present mode as Vulkan enum
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to MAILBOX",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::MAILBOX
            }
        }
    }
}

impl ControlsConfig {
    pub fn quit_key(&self) -> KeyCode {
        parse_key(&self.quit_key).unwrap_or_else(|| {
            log::warn!("Unknown quit key '{}', using Escape", self.quit_key);
            KeyCode::Escape
        })
    }

    pub fn fullscreen_key(&self) -> KeyCode {
        parse_key(&self.fullscreen_key).unwrap_or_else(|| {
            log::warn!("Unknown fullscreen key '{}', using F11", self.fullscreen_key);
            KeyCode::F11
        })
    }
}

fn parse_key(name: &str) -> Option<KeyCode> {
    let key = match name.to_lowercase().as_str() {
        "escape" | "esc" => KeyCode::Escape,
        "space" => KeyCode::Space,
        "enter" | "return" => KeyCode::Enter,
        "tab" => KeyCode::Tab,
        "f1" => KeyCode::F1,
        "f2" => KeyCode::F2,
        "f3" => KeyCode::F3,
        "f4" => KeyCode::F4,
        "f5" => KeyCode::F5,
        "f6" => KeyCode::F6,
        "f7" => KeyCode::F7,
        "f8" => KeyCode::F8,
        "f9" => KeyCode::F9,
        "f10" => KeyCode::F10,
        "f11" => KeyCode::F11,
        "f12" => KeyCode::F12,
        "q" => KeyCode::KeyQ,
        "f" => KeyCode::KeyF,
        _ => return None,
    };
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.graphics.max_frames_in_flight, 2);
        assert_eq!(config.present_mode(), vk::PresentModeKHR::MAILBOX);
        assert!(config.assets.model_path.is_none());
        assert_eq!(config.camera.fov_y_degrees, 45.0);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::parse(
            r#"
            [window]
            title = "Viking Room"

            [graphics]
            present_mode = "FIFO"
            max_frames_in_flight = 3

            [assets]
            model_path = "models/viking_room.obj"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "Viking Room");
        assert_eq!(config.window.width, 800);
        assert_eq!(config.graphics.max_frames_in_flight, 3);
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
        assert_eq!(
            config.assets.model_path.as_deref(),
            Some(Path::new("models/viking_room.obj"))
        );
        assert_eq!(config.assets.vertex_shader, PathBuf::from("shaders/model.vert.spv"));
    }

    #[test]
    fn zero_frames_in_flight_is_clamped() {
        let config = Config::parse("[graphics]\nmax_frames_in_flight = 0\n").unwrap();
        assert_eq!(config.graphics.max_frames_in_flight, 1);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(Config::parse("[window\nwidth = 3").is_err());
        assert!(Config::parse("[window]\nwidth = \"wide\"").is_err());
    }

    #[test]
    fn unknown_present_mode_falls_back_to_mailbox() {
        let config = Config::parse("[graphics]\npresent_mode = \"vsync-please\"").unwrap();
        assert_eq!(config.present_mode(), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn key_names_are_case_insensitive() {
        let controls = ControlsConfig {
            fullscreen_key: "f".to_string(),
            quit_key: "ESC".to_string(),
        };
        assert_eq!(controls.fullscreen_key(), KeyCode::KeyF);
        assert_eq!(controls.quit_key(), KeyCode::Escape);

        let unknown = ControlsConfig {
            fullscreen_key: "hyper".to_string(),
            quit_key: "meta".to_string(),
        };
        assert_eq!(unknown.fullscreen_key(), KeyCode::F11);
        assert_eq!(unknown.quit_key(), KeyCode::Escape);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load_from_path("definitely/not/here/config.toml").unwrap();
        assert!(config.graphics.mipmaps);
    }

    fn scratch_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("vk-viewer-{}-{}", std::process::id(), name));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn malformed_file_is_reported_not_swallowed() {
        let path = scratch_file("malformed.toml", "[window\nwidth = 3");

        assert!(Config::load_from_path(&path).is_err());

        let (config, error) = Config::load_or_default(&path);
        std::fs::remove_file(&path).unwrap();

        let error = error.expect("load error should be handed back");
        assert!(format!("{:#}", error).contains("Failed to parse config file"));
        assert_eq!(config.window.width, 800);
    }

    #[test]
    fn valid_file_loads_without_error() {
        let path = scratch_file("valid.toml", "[window]\nwidth = 1024\n");
        let (config, error) = Config::load_or_default(&path);
        std::fs::remove_file(&path).unwrap();

        assert!(error.is_none());
        assert_eq!(config.window.width, 1024);
    }

    #[test]
    fn validation_needs_a_debug_build() {
        let config = Config::default();
        assert_eq!(config.debug.validation_enabled(), cfg!(debug_assertions));

        let off = Config::parse("[debug]\nvalidation_layers = false\n").unwrap();
        assert!(!off.debug.validation_enabled());
    }

    #[test]
    fn shipped_config_parses() {
        let config = Config::parse(include_str!("../config.toml")).unwrap();
        assert_eq!(config.present_mode(), vk::PresentModeKHR::MAILBOX);
        assert!(config.assets.model_path.is_none());
        assert_eq!(config.camera.eye, [2.0, 2.0, 2.0]);
    }
}
