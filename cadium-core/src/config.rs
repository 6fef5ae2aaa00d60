/// Viewer configuration records
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::color::Color;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vec3Config {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Display settings owned by the UI.
///
/// The viewport only ever reads these; every change arrives as a whole new
/// record through `Viewport::apply_config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Configuration {
    pub color: Color,
    pub wireframe: bool,
    pub background_color: Color,
    pub show_grid: bool,
    pub show_axes: bool,
    /// `[0, 5]`
    pub ambient_intensity: f32,
    /// `[0, 5]`
    pub directional_intensity: f32,
    pub position: Vec3Config,
    /// Degrees
    pub rotation: Vec3Config,
    /// `[0.5, 3]`, multiplies the normalized size
    pub scale: f32,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            color: Color::from_hex_u32(0xC8C8C8),
            wireframe: false,
            background_color: Color::BLACK,
            show_grid: true,
            show_axes: true,
            ambient_intensity: 1.0,
            directional_intensity: 1.0,
            position: Vec3Config::default(),
            rotation: Vec3Config::default(),
            scale: 1.0,
        }
    }
}

impl Configuration {
    pub const INTENSITY_RANGE: (f32, f32) = (0.0, 5.0);
    pub const SCALE_RANGE: (f32, f32) = (0.5, 3.0);

    pub fn appearance_differs(&self, other: &Configuration) -> bool {
        self.color != other.color || self.wireframe != other.wireframe
    }

    pub fn transform_differs(&self, other: &Configuration) -> bool {
        self.position != other.position
            || self.rotation != other.rotation
            || self.scale != other.scale
    }

    pub fn environment_differs(&self, other: &Configuration) -> bool {
        self.background_color != other.background_color
            || self.show_grid != other.show_grid
            || self.show_axes != other.show_axes
            || self.ambient_intensity != other.ambient_intensity
            || self.directional_intensity != other.directional_intensity
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Fetch and parse on a loader thread
    #[default]
    Background,
    /// Fetch and parse inside `load`; the result is still delivered on the next frame
    Inline,
}

/// Limits for model loads. Loads are never retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadPolicy {
    pub max_bytes: u64,
    /// `None` waits forever
    pub timeout_secs: Option<f32>,
    pub mode: LoadMode,
}

impl LoadPolicy {
    /// Non-positive, non-finite or unrepresentable values mean no timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|s| *s > 0.0)
            .and_then(|s| Duration::try_from_secs_f32(s).ok())
    }
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 256 * 1024 * 1024,
            timeout_secs: Some(60.0),
            mode: LoadMode::Background,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadowQuality {
    Off,
    Hard,
    #[default]
    Soft,
}

/// Fixed at viewport creation; changing any of these needs a new viewport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportOptions {
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub eye: [f32; 3],
    pub antialias: bool,
    pub auto_rotate: bool,
    /// Full turns per minute at 60 frames per second
    pub auto_rotate_speed: f32,
    pub damping_factor: f32,
    pub shadows: ShadowQuality,
    pub target_fps: u32,
    pub load: LoadPolicy,
}

impl Default for ViewportOptions {
    fn default() -> Self {
        Self {
            fov_degrees: 75.0,
            near: 0.1,
            far: 1000.0,
            eye: [0.0, 5.0, 10.0],
            antialias: true,
            auto_rotate: true,
            auto_rotate_speed: 0.15,
            damping_factor: 0.05,
            shadows: ShadowQuality::Soft,
            target_fps: 30,
            load: LoadPolicy::default(),
        }
    }
}
