use anyhow::{anyhow, Result};
use chrono::Local;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Duration, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    camera::{CameraSource, CaptureSession, FacingMode, StreamConstraints},
    ocr::{find_token, OcrConfig, OcrEngine, OcrEngineFactory, RecognizedToken},
    presenter::{Presenter, ViewEvent},
    schedule::{rooms::room_id, submit_token, ScheduleApi},
    settings::AppSettings,
};

use super::sampler::FrameSampler;
use super::state::{AnalysisSnapshot, AnalysisState};
use super::watchdog::Watchdog;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// External collaborators the loop drives.
#[derive(Clone)]
pub struct CaptureDeps {
    pub camera: Arc<dyn CameraSource>,
    pub ocr: Arc<dyn OcrEngineFactory>,
    pub schedule: Arc<dyn ScheduleApi>,
    pub presenter: Arc<dyn Presenter>,
}

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub sample_interval: Duration,
    pub jpeg_quality: u8,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub initial_facing: FacingMode,
    pub ocr: OcrConfig,
    pub watchdog: Watchdog,
}

impl LoopConfig {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            sample_interval: settings.capture.sample_interval(),
            jpeg_quality: settings.capture.jpeg_quality,
            ideal_width: settings.capture.ideal_width,
            ideal_height: settings.capture.ideal_height,
            initial_facing: settings.capture.initial_facing,
            ocr: OcrConfig {
                language: settings.ocr.language.clone(),
                char_whitelist: settings.ocr.char_whitelist.clone(),
            },
            watchdog: Watchdog::from_settings(&settings.watchdog),
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::from_settings(&AppSettings::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    ToggleCamera,
    Reset,
    DismissResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A valid result is on screen; nothing is sampled.
    Halted,
    /// The previous recognition is still running.
    Busy,
    /// Camera or OCR engine not available, or the frame could not be grabbed.
    NotReady,
    /// The watchdog replaced the OCR engine; this tick analyzed nothing.
    Reinitialized,
    /// A frame went off to the OCR engine.
    Dispatched,
}

struct InFlight {
    generation: u64,
    started: Instant,
    handle: JoinHandle<Result<String>>,
}

struct CaptureLoop {
    deps: CaptureDeps,
    config: LoopConfig,
    facing: FacingMode,
    session: Option<CaptureSession>,
    engine: Option<Arc<dyn OcrEngine>>,
    sampler: Arc<Mutex<FrameSampler>>,
    in_flight: Option<InFlight>,
    /// Bumped on every reset so late OCR and network results are discarded.
    generation: Arc<AtomicU64>,
    reinit_count: u32,
}

pub async fn capture_loop(
    deps: CaptureDeps,
    config: LoopConfig,
    mut commands: mpsc::Receiver<ControlCommand>,
    state_tx: watch::Sender<AnalysisSnapshot>,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.sample_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut capture = CaptureLoop::new(deps, config);
    let mut state = AnalysisState::new(Instant::now());

    capture.open_camera().await;
    capture.ensure_engine().await;
    state_tx.send_replace(state.snapshot());

    loop {
        tokio::select! {
            _ = ticker.tick(), if !state.has_valid_result => {
                let outcome = capture.on_tick(&mut state).await;
                log_debug!("tick: {outcome:?} (attempt {})", state.attempt_count);
            }
            (generation, result) = wait_in_flight(&mut capture.in_flight) => {
                capture.on_recognized(&mut state, generation, result);
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    log_info!("capture controller dropped, stopping loop");
                    break;
                };
                capture.handle_command(&mut state, command).await;
                ticker.reset();
            }
            _ = cancel_token.cancelled() => {
                log_info!("capture loop shutting down");
                break;
            }
        }
        state_tx.send_replace(state.snapshot());
    }

    capture.shutdown().await;
}

async fn wait_in_flight(slot: &mut Option<InFlight>) -> (u64, Result<String>) {
    let Some(job) = slot.as_mut() else {
        return std::future::pending().await;
    };
    let joined = (&mut job.handle).await;
    let generation = job.generation;
    let elapsed_ms = job.started.elapsed().as_millis();
    *slot = None;

    let result = match joined {
        Ok(result) => result,
        Err(err) => Err(anyhow!("recognition worker join failed: {err}")),
    };
    log_debug!("recognition finished in {elapsed_ms}ms");
    (generation, result)
}

impl CaptureLoop {
    fn new(deps: CaptureDeps, config: LoopConfig) -> Self {
        let sampler = FrameSampler::new(config.jpeg_quality);
        Self {
            facing: config.initial_facing,
            deps,
            config,
            session: None,
            engine: None,
            sampler: Arc::new(Mutex::new(sampler)),
            in_flight: None,
            generation: Arc::new(AtomicU64::new(0)),
            reinit_count: 0,
        }
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    async fn on_tick(&mut self, state: &mut AnalysisState) -> TickOutcome {
        if state.has_valid_result {
            return TickOutcome::Halted;
        }
        if state.is_analyzing || self.in_flight.is_some() {
            return TickOutcome::Busy;
        }
        if !self.session.as_ref().is_some_and(CaptureSession::is_live) {
            return TickOutcome::NotReady;
        }
        if self.engine.is_none() {
            self.ensure_engine().await;
        }
        let Some(engine) = self.engine.clone() else {
            return TickOutcome::NotReady;
        };

        // Checked against attempts already made; the reinit tick analyzes nothing.
        let now = Instant::now();
        if self.config.watchdog.is_stalled(state, now) {
            log_warn!(
                "no match for {}ms over {} attempts, reinitializing OCR engine",
                now.saturating_duration_since(state.last_success).as_millis(),
                state.attempt_count
            );
            self.reinitialize_engine(engine).await;
            state.rearm_watchdog(Instant::now());
            return TickOutcome::Reinitialized;
        }

        let Some(session) = self.session.as_ref() else {
            return TickOutcome::NotReady;
        };
        let frame = match session.grab_frame().await {
            Ok(frame) => frame,
            Err(err) => {
                log_warn!("frame grab failed on session {}: {err:#}", session.id());
                return TickOutcome::NotReady;
            }
        };

        state.begin_attempt();
        state.is_analyzing = true;
        let sampler = Arc::clone(&self.sampler);
        let handle = tokio::task::spawn_blocking(move || -> Result<String> {
            let payload = {
                let mut sampler = sampler
                    .lock()
                    .map_err(|_| anyhow!("frame sampler lock poisoned"))?;
                sampler.sample(&frame)?
            };
            log::trace!(
                "sampled {}x{} frame ({} bytes)",
                payload.width,
                payload.height,
                payload.jpeg.len()
            );
            engine.recognize(&payload.jpeg)
        });
        self.in_flight = Some(InFlight {
            generation: self.current_generation(),
            started: Instant::now(),
            handle,
        });
        TickOutcome::Dispatched
    }

    fn on_recognized(&mut self, state: &mut AnalysisState, generation: u64, result: Result<String>) {
        state.finish_attempt();
        if generation != self.current_generation() {
            log_debug!("discarding recognition from before the last reset");
            return;
        }
        if state.has_valid_result {
            return;
        }

        let text = match result {
            Ok(text) => text,
            Err(err) => {
                log_warn!("recognition failed: {err:#}");
                return;
            }
        };

        let Some(token) = find_token(&text) else {
            log_debug!("no room code in {} chars of text", text.len());
            return;
        };

        log_info!(
            "room code {token} detected after {} attempt(s)",
            state.attempt_count
        );
        state.record_match(token.clone(), Instant::now());
        self.deps.presenter.present(ViewEvent::TokenDetected {
            token: token.clone(),
        });
        self.dispatch_submission(token);
    }

    fn dispatch_submission(&self, token: RecognizedToken) {
        if room_id(&token).is_none() {
            log_info!("room code {token} is not a known room, not submitting");
            return;
        }

        let api = Arc::clone(&self.deps.schedule);
        let presenter = Arc::clone(&self.deps.presenter);
        let generation = Arc::clone(&self.generation);
        let submitted_in = self.current_generation();

        presenter.present(ViewEvent::Loading { is_loading: true });
        // Detached: network calls are never cancelled.
        tokio::spawn(async move {
            let today = Local::now().date_naive();
            let outcome = submit_token(api.as_ref(), &token, today).await;
            let stale = generation.load(Ordering::SeqCst) != submitted_in;

            match outcome {
                Ok(Some(reply)) if !stale => presenter.present(ViewEvent::Schedule {
                    token: reply.token,
                    room_id: reply.room_id,
                    events: reply.events,
                }),
                Ok(Some(_)) => log_debug!("dropping schedule for {token}: view was reset"),
                Ok(None) => {}
                Err(err) => log_error!("schedule submission for {token} failed: {err}"),
            }
            presenter.present(ViewEvent::Loading { is_loading: false });
        });
    }

    async fn handle_command(&mut self, state: &mut AnalysisState, command: ControlCommand) {
        log_info!("control command: {command:?}");
        self.generation.fetch_add(1, Ordering::SeqCst);
        state.reset(Instant::now());

        match command {
            ControlCommand::ToggleCamera => {
                self.facing = self.facing.toggled();
                self.close_camera().await;
                self.open_camera().await;
            }
            ControlCommand::Reset | ControlCommand::DismissResult => {
                if self.session.as_ref().is_some_and(CaptureSession::is_live) {
                    self.deps.presenter.present(ViewEvent::LiveFeed {
                        facing_mode: self.facing,
                    });
                } else {
                    self.close_camera().await;
                    self.open_camera().await;
                }
            }
        }
    }

    async fn open_camera(&mut self) {
        let constraints = StreamConstraints::video(
            self.facing,
            self.config.ideal_width,
            self.config.ideal_height,
        );
        let source = Arc::clone(&self.deps.camera);
        let opened =
            tokio::task::spawn_blocking(move || CaptureSession::open(source.as_ref(), &constraints))
                .await
                .map_err(|err| anyhow!("camera open worker join failed: {err}"))
                .and_then(|result| result);

        match opened {
            Ok(session) => {
                self.session = Some(session);
                self.deps.presenter.present(ViewEvent::LiveFeed {
                    facing_mode: self.facing,
                });
            }
            Err(err) => {
                log_error!("camera access failed: {err:#}");
                self.deps.presenter.present(ViewEvent::CameraError {
                    message: format!("Camera error: {err:#}"),
                });
            }
        }
    }

    /// Stops the current stream and waits until its tracks are released.
    async fn close_camera(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let id = session.id();
        log_debug!(
            "closing {} camera session {id} opened at {}",
            session.facing(),
            session.opened_at().format("%H:%M:%S")
        );
        if let Err(err) = tokio::task::spawn_blocking(move || drop(session)).await {
            log_error!("failed to stop capture session {id}: {err}");
        }
    }

    async fn ensure_engine(&mut self) {
        if self.engine.is_some() {
            return;
        }
        let factory = Arc::clone(&self.deps.ocr);
        let config = self.config.ocr.clone();
        let created = tokio::task::spawn_blocking(move || factory.create(&config))
            .await
            .map_err(|err| anyhow!("OCR init worker join failed: {err}"))
            .and_then(|result| result);

        match created {
            Ok(engine) => self.engine = Some(engine),
            Err(err) => log_error!("OCR engine initialization failed: {err:#}"),
        }
    }

    async fn reinitialize_engine(&mut self, stalled: Arc<dyn OcrEngine>) {
        self.engine = None;
        stalled.terminate();
        drop(stalled);
        self.reinit_count += 1;
        self.ensure_engine().await;
        log_info!(
            "OCR engine reinitialized ({} time(s) this run)",
            self.reinit_count
        );
    }

    async fn shutdown(&mut self) {
        if let Some(job) = self.in_flight.take() {
            log_debug!("abandoning in-flight recognition");
            drop(job.handle);
        }
        if let Some(engine) = self.engine.take() {
            engine.terminate();
        }
        self.close_camera().await;
        log_info!("capture resources released");
    }
}

impl Drop for CaptureLoop {
    // Covers task abort and panics; `shutdown` already emptied both slots on a clean exit.
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            engine.terminate();
        }
        if let Some(mut session) = self.session.take() {
            session.stop();
        }
    }
}
