use anyhow::{anyhow, bail, Context, Result};
use log::info;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::loop_worker::{capture_loop, CaptureDeps, ControlCommand, LoopConfig};
use super::state::{AnalysisSnapshot, AnalysisState};

const COMMAND_BUFFER: usize = 16;

/// Owns the capture loop task and forwards user intents to it.
pub struct CaptureController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    commands: Option<mpsc::Sender<ControlCommand>>,
    snapshot_rx: watch::Receiver<AnalysisSnapshot>,
}

impl CaptureController {
    pub fn new() -> Self {
        let (_, snapshot_rx) =
            watch::channel(AnalysisState::new(tokio::time::Instant::now()).snapshot());
        Self {
            handle: None,
            cancel_token: None,
            commands: None,
            snapshot_rx,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Opens the camera and OCR engine and starts sampling. Must run inside a tokio runtime.
    pub fn start(&mut self, deps: CaptureDeps, config: LoopConfig) -> Result<()> {
        if self.handle.is_some() {
            bail!("capture already active");
        }

        info!(
            "starting capture ({} camera, every {}ms)",
            config.initial_facing,
            config.sample_interval.as_millis()
        );

        let cancel_token = CancellationToken::new();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (state_tx, state_rx) =
            watch::channel(AnalysisState::new(tokio::time::Instant::now()).snapshot());

        let handle = tokio::spawn(capture_loop(
            deps,
            config,
            command_rx,
            state_tx,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.commands = Some(command_tx);
        self.snapshot_rx = state_rx;
        Ok(())
    }

    /// Latest analysis state published by the loop.
    pub fn snapshot(&self) -> AnalysisSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AnalysisSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Switches between front and back camera; the old stream stops first.
    pub async fn toggle_camera(&self) -> Result<()> {
        self.send(ControlCommand::ToggleCamera).await
    }

    /// Clears the detected room and resumes sampling.
    pub async fn reset(&self) -> Result<()> {
        self.send(ControlCommand::Reset).await
    }

    /// The schedule view was closed; same effect as `reset`.
    pub async fn dismiss_result(&self) -> Result<()> {
        self.send(ControlCommand::DismissResult).await
    }

    async fn send(&self, command: ControlCommand) -> Result<()> {
        let Some(commands) = self.commands.as_ref() else {
            bail!("capture is not running");
        };
        commands
            .send(command)
            .await
            .map_err(|_| anyhow!("capture loop is gone, cannot deliver {command:?}"))
    }

    /// Stops sampling and waits until the camera and OCR engine are released.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.commands = None;

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("capture loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Default for CaptureController {
    fn default() -> Self {
        Self::new()
    }
}
