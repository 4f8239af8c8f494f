use anyhow::{anyhow, bail, Context, Result};
use image::RgbImage;
use log::debug;
use std::{
    fs,
    path::{Path, PathBuf},
};

use super::{CameraSource, StreamConstraints, VideoStream};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

/// Serves frames from an image file, or cycles through a directory of images.
///
/// Both facing modes read the same frames. Files are re-read on every grab so
/// another process can keep overwriting a single snapshot file.
pub struct FileCameraSource {
    path: PathBuf,
}

impl FileCameraSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CameraSource for FileCameraSource {
    fn open(&self, constraints: &StreamConstraints) -> Result<Box<dyn VideoStream>> {
        let frames = list_frames(&self.path)?;
        debug!(
            "file camera ({}) serving {} frame(s) from {}",
            constraints.facing_mode,
            frames.len(),
            self.path.display()
        );
        Ok(Box::new(FileStream {
            frames,
            next: 0,
            live: true,
        }))
    }
}

struct FileStream {
    frames: Vec<PathBuf>,
    next: usize,
    live: bool,
}

impl VideoStream for FileStream {
    fn grab_frame(&mut self) -> Result<RgbImage> {
        if !self.live {
            bail!("file stream stopped");
        }
        let path = self
            .frames
            .get(self.next)
            .ok_or_else(|| anyhow!("file stream has no frames"))?;
        self.next = (self.next + 1) % self.frames.len();

        let img = image::open(path)
            .with_context(|| format!("failed to decode frame {}", path.display()))?;
        Ok(img.to_rgb8())
    }

    fn stop(&mut self) {
        self.live = false;
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

fn list_frames(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        bail!("no camera frames at {}", path.display());
    }

    let mut frames: Vec<PathBuf> = fs::read_dir(path)
        .with_context(|| format!("failed to list {}", path.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_image_extension(p))
        .collect();
    frames.sort();

    if frames.is_empty() {
        bail!("no image files in {}", path.display());
    }
    Ok(frames)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::FacingMode;
    use image::Rgb;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("roomscan-{name}-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn cycles_directory_frames_in_name_order() {
        let dir = temp_dir("frames");
        RgbImage::from_pixel(3, 3, Rgb([10, 10, 10]))
            .save(dir.join("b.png"))
            .unwrap();
        RgbImage::from_pixel(5, 2, Rgb([200, 0, 0]))
            .save(dir.join("a.png"))
            .unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let source = FileCameraSource::new(&dir);
        let mut stream = source
            .open(&StreamConstraints::video(FacingMode::User, 1920, 1080))
            .unwrap();

        assert_eq!(stream.grab_frame().unwrap().dimensions(), (5, 2));
        assert_eq!(stream.grab_frame().unwrap().dimensions(), (3, 3));
        assert_eq!(stream.grab_frame().unwrap().dimensions(), (5, 2));

        stream.stop();
        assert!(!stream.is_live());
        assert!(stream.grab_frame().is_err());

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn empty_directory_is_an_open_error() {
        let dir = temp_dir("empty");
        let source = FileCameraSource::new(&dir);
        assert!(source
            .open(&StreamConstraints::video(FacingMode::Environment, 1920, 1080))
            .is_err());
        fs::remove_dir_all(dir).unwrap();
    }
}
