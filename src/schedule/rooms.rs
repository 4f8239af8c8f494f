use crate::ocr::RecognizedToken;

/// Room codes printed on the doors, mapped to the timetable service's room ids.
// Only M01-TD, M03-TP, M11-TD and M13-TP are confirmed against the timetable
// service. The ids marked UNVERIFIED are placeholders; confirm them before
// pointing the client at the production endpoint.
const ROOM_IDS: [(&str, u32); 11] = [
    ("M01-TD", 12673),
    ("M02-TD", 12675), // UNVERIFIED
    ("M03-TP", 19393),
    ("M04-TP", 19394), // UNVERIFIED
    ("M05-TP", 19395), // UNVERIFIED
    ("M06-TD", 12676), // UNVERIFIED
    ("M07-TP", 19396), // UNVERIFIED
    ("M11-TD", 12674),
    ("M12-TD", 12677), // UNVERIFIED
    ("M13-TP", 62575),
    ("M14-TP", 62576), // UNVERIFIED
];

pub fn room_id(token: &RecognizedToken) -> Option<u32> {
    room_id_for(token.as_str())
}

pub fn room_id_for(code: &str) -> Option<u32> {
    ROOM_IDS
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, id)| *id)
}

pub fn known_rooms() -> impl Iterator<Item = &'static str> {
    ROOM_IDS.iter().map(|(code, _)| *code)
}
