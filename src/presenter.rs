use log::error;
use serde::Serialize;
use std::io::Write;

use crate::{camera::FacingMode, ocr::RecognizedToken, schedule::ScheduleEvent};

/// What the view layer should show next.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ViewEvent {
    /// Show the live camera feed.
    #[serde(rename_all = "camelCase")]
    LiveFeed { facing_mode: FacingMode },
    /// Camera could not be opened; the message replaces the result panel.
    CameraError { message: String },
    TokenDetected { token: RecognizedToken },
    #[serde(rename_all = "camelCase")]
    Loading { is_loading: bool },
    #[serde(rename_all = "camelCase")]
    Schedule {
        token: RecognizedToken,
        room_id: u32,
        events: Vec<ScheduleEvent>,
    },
}

pub trait Presenter: Send + Sync {
    fn present(&self, event: ViewEvent);
}

/// Writes one JSON object per event to stdout.
pub struct JsonLinesPresenter;

impl Presenter for JsonLinesPresenter {
    fn present(&self, event: ViewEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(err) => {
                error!("failed to serialize view event {event:?}: {err}");
                return;
            }
        };
        let mut stdout = std::io::stdout().lock();
        if let Err(err) = writeln!(stdout, "{line}").and_then(|_| stdout.flush()) {
            error!("failed to write view event: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::find_token;
    use serde_json::json;

    #[test]
    fn events_serialize_with_tag() {
        let live = serde_json::to_value(ViewEvent::LiveFeed {
            facing_mode: FacingMode::User,
        })
        .unwrap();
        assert_eq!(live, json!({"event": "live-feed", "facingMode": "user"}));

        let schedule = serde_json::to_value(ViewEvent::Schedule {
            token: find_token("M03-TP").unwrap(),
            room_id: 19393,
            events: vec![json!({"title": "TP Web"})],
        })
        .unwrap();
        assert_eq!(
            schedule,
            json!({
                "event": "schedule",
                "token": "M03-TP",
                "roomId": 19393,
                "events": [{"title": "TP Web"}]
            })
        );

        let loading = serde_json::to_value(ViewEvent::Loading { is_loading: false }).unwrap();
        assert_eq!(loading, json!({"event": "loading", "isLoading": false}));
    }
}
