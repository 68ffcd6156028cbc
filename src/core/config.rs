//! Engine and renderer configuration
//!
//! Both structs can be built in code or loaded from RON:
//!
//! ```ron
//! (
//!     title: "Shapes",
//!     width: 1280,
//!     height: 720,
//!     vsync: true,
//!     renderer: (
//!         clear_color: (0.08, 0.08, 0.1, 1.0),
//!         cull_back_faces: true,
//!     ),
//! )
//! ```

use std::fs;
use std::path::Path;

use glam::Vec4;
use serde::{Deserialize, Serialize};

use crate::renderer::RenderState;

/// Renderer settings applied when the backend starts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Color the frame is cleared to
    pub clear_color: Vec4,
    /// Cull clockwise triangles
    pub cull_back_faces: bool,
    /// Alpha blending
    pub blending: bool,
    /// Depth testing
    pub depth_test: bool,
}

impl RendererConfig {
    /// Fixed-function state described by this config
    #[must_use]
    pub fn render_state(&self) -> RenderState {
        RenderState {
            cull_back_faces: self.cull_back_faces,
            blending: self.blending,
            depth_test: self.depth_test,
        }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        let state = RenderState::default();
        Self {
            clear_color: Vec4::new(0.1, 0.1, 0.12, 1.0),
            cull_back_faces: state.cull_back_faces,
            blending: state.blending,
            depth_test: state.depth_test,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Enable VSync
    pub vsync: bool,
    /// Renderer settings
    pub renderer: RendererConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: String::from("Flatshape"),
            width: 1280,
            height: 720,
            vsync: true,
            renderer: RendererConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create a new config with a title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set window dimensions
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Enable or disable VSync
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Set the frame clear color
    pub fn with_clear_color(mut self, color: Vec4) -> Self {
        self.renderer.clear_color = color;
        self
    }

    /// Enable or disable back-face culling
    pub fn with_back_face_culling(mut self, enabled: bool) -> Self {
        self.renderer.cull_back_faces = enabled;
        self
    }

    /// Parse a config from RON. Missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid config
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        ron::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load a config from a RON file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn from_ron_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        let config = Self::from_ron_str(&content)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Serialize to pretty RON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Serialize(e.to_string()))
    }
}

/// Errors that can occur while loading or saving a config
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// IO error reading the file
    Io(String),
    /// The text is not a valid config
    Parse(String),
    /// Serialization failed
    Serialize(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {e}"),
            Self::Parse(e) => write!(f, "Parse error: {e}"),
            Self::Serialize(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
