use serde::{Deserialize, Serialize};

use super::rooms::room_id;
use crate::ocr::RecognizedToken;

pub const LAB_COLOR: &str = "#FFFFBF";
pub const TUTORIAL_COLOR: &str = "#FFD7B0";

/// Schedule events are passed through to the view untouched.
pub type ScheduleEvent = serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomEntry {
    pub id: u32,
    pub title: String,
    pub event_color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomsRequest {
    pub salle: Vec<RoomEntry>,
}

impl RoomsRequest {
    /// `None` for rooms outside the lookup table.
    pub fn for_token(token: &RecognizedToken) -> Option<Self> {
        let id = room_id(token)?;
        let event_color = if token.is_lab() {
            LAB_COLOR
        } else {
            TUTORIAL_COLOR
        };
        Some(Self {
            salle: vec![RoomEntry {
                id,
                title: token.to_string(),
                event_color: event_color.to_string(),
            }],
        })
    }

    pub fn room_id(&self) -> Option<u32> {
        self.salle.first().map(|entry| entry.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::find_token;
    use serde_json::json;

    #[test]
    fn lab_room_payload() {
        let token = find_token("M03-TP").unwrap();
        let request = RoomsRequest::for_token(&token).unwrap();
        assert_eq!(request.room_id(), Some(19393));
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"salle": [{"id": 19393, "title": "M03-TP", "eventColor": "#FFFFBF"}]})
        );
    }

    #[test]
    fn tutorial_room_payload() {
        let token = find_token("M11-TD").unwrap();
        let request = RoomsRequest::for_token(&token).unwrap();
        assert_eq!(request.salle[0].id, 12674);
        assert_eq!(request.salle[0].event_color, TUTORIAL_COLOR);
        assert_eq!(request.salle[0].title, "M11-TD");
    }

    #[test]
    fn unknown_room_has_no_payload() {
        let token = find_token("M42-TP").unwrap();
        assert!(RoomsRequest::for_token(&token).is_none());
    }
}
