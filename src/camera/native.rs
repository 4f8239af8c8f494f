use std::{
    sync::mpsc,
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use log::{error, info};
use nokhwa::{
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
        Resolution,
    },
    Camera,
};

use super::{CameraSource, FacingMode, StreamConstraints, VideoStream};

/// Device camera through nokhwa's native backend.
///
/// Desktop devices do not report a facing, so each facing mode maps to a
/// configured device index.
pub struct NativeCameraSource {
    front_index: u32,
    back_index: u32,
}

impl NativeCameraSource {
    pub fn new(front_index: u32, back_index: u32) -> Self {
        Self {
            front_index,
            back_index,
        }
    }

    fn index_for(&self, facing: FacingMode) -> u32 {
        match facing {
            FacingMode::User => self.front_index,
            FacingMode::Environment => self.back_index,
        }
    }
}

/// Lists `(index, human name)` for every camera the native backend can see.
pub fn list_cameras() -> Result<Vec<(u32, String)>> {
    let cameras = query(ApiBackend::Auto).map_err(|err| anyhow!("camera query failed: {err}"))?;
    Ok(cameras
        .iter()
        .enumerate()
        .map(|(i, info)| (i as u32, info.human_name()))
        .collect())
}

impl CameraSource for NativeCameraSource {
    fn open(&self, constraints: &StreamConstraints) -> Result<Box<dyn VideoStream>> {
        let stream = NativeStream::spawn(self.index_for(constraints.facing_mode), *constraints)?;
        Ok(Box::new(stream))
    }
}

enum CameraCommand {
    Grab(mpsc::Sender<Result<RgbImage>>),
    Shutdown,
}

/// nokhwa cameras are not `Send`, so each stream owns a dedicated thread that
/// opens the device and serves frame requests over a channel.
struct NativeStream {
    sender: mpsc::Sender<CameraCommand>,
    worker: Option<JoinHandle<()>>,
}

impl NativeStream {
    fn spawn(index: u32, constraints: StreamConstraints) -> Result<Self> {
        let (command_tx, command_rx) = mpsc::channel::<CameraCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        let worker = thread::Builder::new()
            .name(format!("roomscan-camera-{index}"))
            .spawn(move || {
                let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
                    CameraFormat::new(
                        Resolution::new(constraints.ideal_width, constraints.ideal_height),
                        FrameFormat::MJPEG,
                        30,
                    ),
                ));

                let mut camera = match Camera::new(CameraIndex::Index(index), requested) {
                    Ok(camera) => camera,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow!("camera {index} unavailable: {err}")));
                        return;
                    }
                };

                if let Err(err) = camera.open_stream() {
                    let _ = ready_tx.send(Err(anyhow!("camera {index} refused to stream: {err}")));
                    return;
                }

                info!(
                    "camera {index} streaming {:?}",
                    camera.camera_format()
                );
                if ready_tx.send(Ok(())).is_err() {
                    error!("camera open caller dropped before ready signal");
                    let _ = camera.stop_stream();
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        CameraCommand::Grab(reply) => {
                            let frame = grab(&mut camera);
                            if reply.send(frame).is_err() {
                                error!("frame caller dropped before receiving frame");
                            }
                        }
                        CameraCommand::Shutdown => break,
                    }
                }

                if let Err(err) = camera.stop_stream() {
                    error!("failed to stop camera {index}: {err}");
                }
                info!("camera {index} thread shutting down");
            })
            .context("failed to spawn camera worker thread")?;

        ready_rx
            .recv()
            .context("camera worker exited before signaling readiness")??;

        Ok(Self {
            sender: command_tx,
            worker: Some(worker),
        })
    }
}

fn grab(camera: &mut Camera) -> Result<RgbImage> {
    let buffer = camera
        .frame()
        .map_err(|err| anyhow!("frame capture failed: {err}"))?;
    let decoded = buffer
        .decode_image::<RgbFormat>()
        .map_err(|err| anyhow!("frame decode failed: {err}"))?;
    let (width, height) = (decoded.width(), decoded.height());
    RgbImage::from_raw(width, height, decoded.into_raw())
        .ok_or_else(|| anyhow!("decoded frame buffer does not match {width}x{height}"))
}

impl VideoStream for NativeStream {
    fn grab_frame(&mut self) -> Result<RgbImage> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.sender
            .send(CameraCommand::Grab(reply_tx))
            .map_err(|_| anyhow!("camera thread is gone"))?;
        reply_rx
            .recv()
            .map_err(|_| anyhow!("camera thread terminated unexpectedly"))?
    }

    fn stop(&mut self) {
        if let Some(handle) = self.worker.take() {
            if let Err(err) = self.sender.send(CameraCommand::Shutdown) {
                error!("Failed to send shutdown to camera thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join camera thread: {join_err:?}");
            }
        }
    }

    fn is_live(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for NativeStream {
    fn drop(&mut self) {
        self.stop();
    }
}
