pub mod camera;
pub mod capture;
pub mod ocr;
pub mod presenter;
pub mod schedule;
pub mod settings;
pub mod utils;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use camera::{CameraSource, FacingMode, FileCameraSource};
use capture::{CaptureController, CaptureDeps, LoopConfig};
use ocr::TesseractFactory;
use presenter::JsonLinesPresenter;
use schedule::HttpScheduleClient;
use settings::{AppSettings, SettingsStore};

#[derive(Debug, Parser)]
#[command(name = "roomscan", version, about)]
struct Cli {
    /// JSON settings file; built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Camera to start with.
    #[arg(long, value_parser = parse_facing)]
    facing: Option<FacingMode>,

    /// Read frames from an image file or directory instead of a device camera.
    #[arg(long)]
    frames: Option<PathBuf>,

    /// List device cameras and exit.
    #[cfg(feature = "native-camera")]
    #[arg(long)]
    list_cameras: bool,

    /// Debug-level logging (RUST_LOG still wins).
    #[arg(short, long)]
    verbose: bool,
}

fn parse_facing(value: &str) -> Result<FacingMode, String> {
    match value.to_ascii_lowercase().as_str() {
        "user" | "front" => Ok(FacingMode::User),
        "environment" | "back" => Ok(FacingMode::Environment),
        other => Err(format!("unknown facing mode '{other}' (use user or environment)")),
    }
}

/// Entry point for the `roomscan` binary.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    utils::logging::init_logging(cli.verbose);

    info!("roomscan starting up...");

    #[cfg(feature = "native-camera")]
    {
        if cli.list_cameras {
            for (index, name) in camera::native::list_cameras()? {
                println!("{index}: {name}");
            }
            return Ok(());
        }
    }

    let store = SettingsStore::new(cli.config.clone())?;
    if let Some(path) = store.path() {
        info!("settings loaded from {}", path.display());
    }
    let overrides = Overrides {
        facing: cli.facing,
        frames: cli.frames.clone(),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("roomscan-rt")
        .build()
        .context("failed to start tokio runtime")?;
    runtime.block_on(serve(store, overrides))
}

/// Command-line values that take precedence over the settings file.
#[derive(Debug, Clone, Default)]
struct Overrides {
    facing: Option<FacingMode>,
    frames: Option<PathBuf>,
}

impl Overrides {
    fn apply(&self, mut settings: AppSettings) -> AppSettings {
        if let Some(facing) = self.facing {
            settings.capture.initial_facing = facing;
        }
        if let Some(frames) = self.frames.clone() {
            settings.camera.frames_path = Some(frames);
        }
        settings
    }
}

fn camera_source(settings: &AppSettings) -> Result<Arc<dyn CameraSource>> {
    if let Some(path) = settings.camera.frames_path.as_ref() {
        info!("using frames from {} as the camera", path.display());
        return Ok(Arc::new(FileCameraSource::new(path.clone())));
    }

    #[cfg(feature = "native-camera")]
    {
        Ok(Arc::new(camera::NativeCameraSource::new(
            settings.camera.front_index,
            settings.camera.back_index,
        )))
    }

    #[cfg(not(feature = "native-camera"))]
    {
        anyhow::bail!(
            "no camera available: pass --frames <PATH> or build with the `native-camera` feature"
        )
    }
}

fn build_deps(settings: &AppSettings) -> Result<CaptureDeps> {
    Ok(CaptureDeps {
        camera: camera_source(settings)?,
        ocr: Arc::new(TesseractFactory::new(settings.ocr.tesseract_path.clone())),
        schedule: Arc::new(HttpScheduleClient::new(
            settings.schedule.endpoint.clone(),
            Duration::from_secs(settings.schedule.request_timeout_secs),
        )?),
        presenter: Arc::new(JsonLinesPresenter),
    })
}

/// Re-reads the settings file and restarts capture with the new values.
async fn reload(
    store: &SettingsStore,
    overrides: &Overrides,
    controller: &mut CaptureController,
) -> Result<()> {
    store.reload()?;
    let settings = overrides.apply(store.settings());
    let deps = build_deps(&settings)?;
    controller.stop().await?;
    controller.start(deps, LoopConfig::from_settings(&settings))?;
    info!("settings reloaded, capture restarted");
    Ok(())
}

async fn serve(store: SettingsStore, overrides: Overrides) -> Result<()> {
    let settings = overrides.apply(store.settings());
    let mut controller = CaptureController::new();
    controller.start(build_deps(&settings)?, LoopConfig::from_settings(&settings))?;
    info!("commands on stdin: toggle, reset, dismiss, reload, quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(err) => {
                        warn!("stdin read failed: {err}");
                        break;
                    }
                };
                let result = match line.trim() {
                    "" => Ok(()),
                    "toggle" => controller.toggle_camera().await,
                    "reset" => controller.reset().await,
                    "dismiss" => controller.dismiss_result().await,
                    "reload" => reload(&store, &overrides, &mut controller).await,
                    "quit" | "exit" => break,
                    other => {
                        warn!("unknown command '{other}'");
                        Ok(())
                    }
                };
                if let Err(err) = result {
                    warn!("command failed: {err:#}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    controller.stop().await?;
    info!("roomscan stopped");
    Ok(())
}
