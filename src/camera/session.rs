use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use image::RgbImage;
use log::info;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::{CameraSource, FacingMode, StreamConstraints, VideoStream};

type SharedStream = Arc<Mutex<Box<dyn VideoStream>>>;

/// One acquired camera stream. Dropping the session stops the stream.
pub struct CaptureSession {
    id: Uuid,
    facing: FacingMode,
    opened_at: DateTime<Utc>,
    stream: SharedStream,
    stopped: bool,
}

impl CaptureSession {
    /// Acquires a stream from `source`. May block while the device spins up.
    pub fn open(source: &dyn CameraSource, constraints: &StreamConstraints) -> Result<Self> {
        let stream = source
            .open(constraints)
            .with_context(|| format!("failed to open {} camera", constraints.facing_mode))?;

        let session = Self {
            id: Uuid::new_v4(),
            facing: constraints.facing_mode,
            opened_at: Utc::now(),
            stream: Arc::new(Mutex::new(stream)),
            stopped: false,
        };
        info!(
            "capture session {} opened ({} camera, ideal {}x{})",
            session.id, session.facing, constraints.ideal_width, constraints.ideal_height
        );
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn is_live(&self) -> bool {
        if self.stopped {
            return false;
        }
        match self.stream.lock() {
            Ok(stream) => stream.is_live(),
            Err(_) => false,
        }
    }

    /// Pulls the current frame on a blocking worker thread.
    pub async fn grab_frame(&self) -> Result<RgbImage> {
        if self.stopped {
            return Err(anyhow!("capture session {} already stopped", self.id));
        }
        let stream = Arc::clone(&self.stream);
        tokio::task::spawn_blocking(move || {
            let mut guard = stream
                .lock()
                .map_err(|_| anyhow!("camera stream lock poisoned"))?;
            guard.grab_frame()
        })
        .await
        .context("frame grab worker join failed")?
    }

    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let mut guard = match self.stream.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.stop();
        let live_secs = (Utc::now() - self.opened_at).num_seconds();
        info!(
            "capture session {} stopped after {}s",
            self.id, live_secs
        );
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}
