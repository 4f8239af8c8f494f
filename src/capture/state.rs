use serde::Serialize;
use tokio::time::Instant;

use crate::ocr::RecognizedToken;

/// Per-loop analysis bookkeeping. Owned by the capture loop and handed to each
/// tick by `&mut`.
#[derive(Debug, Clone)]
pub struct AnalysisState {
    /// A recognition job is running; ticks are no-ops until it reports back.
    pub is_analyzing: bool,
    /// Set on the first match. Sampling stays off until an explicit reset.
    pub has_valid_result: bool,
    pub extracted_text: Option<RecognizedToken>,
    pub attempt_count: u32,
    pub last_success: Instant,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSnapshot {
    pub is_analyzing: bool,
    pub has_valid_result: bool,
    pub extracted_text: Option<RecognizedToken>,
    pub attempt_count: u32,
}

impl AnalysisState {
    pub fn new(now: Instant) -> Self {
        Self {
            is_analyzing: false,
            has_valid_result: false,
            extracted_text: None,
            attempt_count: 0,
            last_success: now,
        }
    }

    /// Back to initial values. An in-flight recognition keeps its slot until it
    /// reports back, so `is_analyzing` survives the reset.
    pub fn reset(&mut self, now: Instant) {
        let is_analyzing = self.is_analyzing;
        *self = Self::new(now);
        self.is_analyzing = is_analyzing;
    }

    pub fn begin_attempt(&mut self) {
        self.attempt_count = self.attempt_count.saturating_add(1);
    }

    pub fn finish_attempt(&mut self) {
        self.is_analyzing = false;
    }

    pub fn record_match(&mut self, token: RecognizedToken, now: Instant) {
        self.has_valid_result = true;
        self.extracted_text = Some(token);
        self.last_success = now;
    }

    /// Called after the watchdog replaced the OCR engine.
    pub fn rearm_watchdog(&mut self, now: Instant) {
        self.attempt_count = 0;
        self.last_success = now;
    }

    pub fn snapshot(&self) -> AnalysisSnapshot {
        AnalysisSnapshot {
            is_analyzing: self.is_analyzing,
            has_valid_result: self.has_valid_result,
            extracted_text: self.extracted_text.clone(),
            attempt_count: self.attempt_count,
        }
    }
}
