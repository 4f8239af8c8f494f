pub mod file_source;
#[cfg(feature = "native-camera")]
pub mod native;
pub mod session;

use anyhow::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use file_source::FileCameraSource;
#[cfg(feature = "native-camera")]
pub use native::NativeCameraSource;
pub use session::CaptureSession;

/// Which way the camera points. Names follow the media-capture `facingMode` values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front camera.
    User,
    /// Back camera.
    #[default]
    Environment,
}

impl FacingMode {
    pub fn toggled(self) -> Self {
        match self {
            FacingMode::User => FacingMode::Environment,
            FacingMode::Environment => FacingMode::User,
        }
    }
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacingMode::User => f.write_str("user"),
            FacingMode::Environment => f.write_str("environment"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StreamConstraints {
    pub facing_mode: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub audio: bool,
}

impl StreamConstraints {
    pub fn video(facing_mode: FacingMode, ideal_width: u32, ideal_height: u32) -> Self {
        Self {
            facing_mode,
            ideal_width,
            ideal_height,
            audio: false,
        }
    }
}

/// A live video stream. Implementations are driven from blocking worker threads.
pub trait VideoStream: Send {
    /// Returns the current frame at the stream's native resolution.
    fn grab_frame(&mut self) -> Result<RgbImage>;

    /// Stops every track of the stream. Must be idempotent.
    fn stop(&mut self);

    fn is_live(&self) -> bool;
}

/// Hands out video streams for a set of constraints.
pub trait CameraSource: Send + Sync {
    fn open(&self, constraints: &StreamConstraints) -> Result<Box<dyn VideoStream>>;
}
