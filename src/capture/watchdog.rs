use std::time::Duration;
use tokio::time::Instant;

use super::state::AnalysisState;
use crate::settings::WatchdogSettings;

/// Stall detector: too many attempts and too long since the last match means
/// the OCR engine gets replaced. False negatives count the same as real stalls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watchdog {
    stall_timeout: Duration,
    max_attempts: u32,
}

impl Watchdog {
    pub fn new(stall_timeout: Duration, max_attempts: u32) -> Self {
        Self {
            stall_timeout,
            max_attempts,
        }
    }

    pub fn from_settings(settings: &WatchdogSettings) -> Self {
        Self::new(
            Duration::from_millis(settings.stall_timeout_ms),
            settings.max_attempts,
        )
    }

    pub fn is_stalled(&self, state: &AnalysisState, now: Instant) -> bool {
        now.saturating_duration_since(state.last_success) > self.stall_timeout
            && state.attempt_count > self.max_attempts
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::from_settings(&WatchdogSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replays the tick order: consult the watchdog on the attempts made so
    /// far, then either reinitialize or analyze one more frame.
    /// Returns the ticks that reinitialized.
    fn run_ticks(
        watchdog: &Watchdog,
        state: &mut AnalysisState,
        start: Instant,
        ticks: u32,
        spacing: Duration,
    ) -> Vec<u32> {
        let mut reinit_at = Vec::new();
        for i in 1..=ticks {
            let now = start + spacing * i;
            if watchdog.is_stalled(state, now) {
                reinit_at.push(i);
                state.rearm_watchdog(now);
                assert_eq!(state.attempt_count, 0);
            } else {
                state.begin_attempt();
            }
        }
        reinit_at
    }

    #[test]
    fn twenty_one_slow_failures_trigger_one_reinit() {
        let watchdog = Watchdog::default();
        let start = Instant::now();
        let mut state = AnalysisState::new(start);

        let reinit_at = run_ticks(&watchdog, &mut state, start, 21, Duration::from_millis(500));
        assert!(reinit_at.is_empty());
        assert_eq!(state.attempt_count, 21);

        // The tick after the 21st failure replaces the engine instead of sampling.
        let resume = start + Duration::from_millis(500) * 21;
        let reinit_at = run_ticks(&watchdog, &mut state, resume, 1, Duration::from_millis(500));
        assert_eq!(reinit_at, vec![1]);
        assert_eq!(state.attempt_count, 0);
        assert_eq!(state.last_success, start + Duration::from_millis(500) * 22);
    }

    #[test]
    fn many_fast_failures_do_not_trigger() {
        let watchdog = Watchdog::default();
        let start = Instant::now();
        let mut state = AnalysisState::new(start);

        let reinit_at = run_ticks(&watchdog, &mut state, start, 50, Duration::from_millis(100));
        assert!(reinit_at.is_empty());
        assert_eq!(state.attempt_count, 50);
    }

    #[test]
    fn long_stall_with_few_attempts_does_not_trigger() {
        let watchdog = Watchdog::default();
        let start = Instant::now();
        let mut state = AnalysisState::new(start);

        let reinit_at = run_ticks(&watchdog, &mut state, start, 20, Duration::from_secs(2));
        assert!(reinit_at.is_empty());
        assert!(!watchdog.is_stalled(&state, start + Duration::from_secs(42)));

        state.begin_attempt();
        assert!(watchdog.is_stalled(&state, start + Duration::from_secs(42)));
    }

    #[test]
    fn counter_restarts_after_reinit() {
        let watchdog = Watchdog::default();
        let start = Instant::now();
        let mut state = AnalysisState::new(start);

        let reinit_at = run_ticks(&watchdog, &mut state, start, 44, Duration::from_millis(600));
        assert_eq!(reinit_at, vec![22, 44]);
    }
}
