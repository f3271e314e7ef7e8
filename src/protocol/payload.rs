//! JSON payload builders for cast commands
//!
//! Each builder produces the body of one envelope. Payloads are built from
//! serde structs rather than string concatenation so quoting and escaping
//! are always correct; field declaration order matches the order the
//! receiver sees on the wire.

use serde::Serialize;

use crate::media::MediaInformation;

/// Heartbeat PING body
pub const PING: &str = "{\"type\":\"PING\"}";

/// Heartbeat PONG body
pub const PONG: &str = "{\"type\":\"PONG\"}";

/// Virtual connection CONNECT body
pub const CONNECT: &str = "{\"type\":\"CONNECT\"}";

/// Virtual connection CLOSE body
pub const CLOSE: &str = "{\"type\":\"CLOSE\"}";

/// Per-scope request-id counters.
///
/// The receiver-control scope and the media-player scope number their
/// requests independently; both counters live for the lifetime of one
/// connection and are never reset or unified.
#[derive(Debug, Default)]
pub struct RequestIds {
    receiver: u64,
    media: u64,
}

impl RequestIds {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_receiver(&mut self) -> u64 {
        let id = self.receiver;
        self.receiver += 1;
        id
    }

    fn next_media(&mut self) -> u64 {
        let id = self.media;
        self.media += 1;
        id
    }
}

#[derive(Serialize)]
struct GetStatus {
    #[serde(rename = "type")]
    msg_type: &'static str,
    #[serde(rename = "requestId")]
    request_id: u64,
}

#[derive(Serialize)]
struct Launch {
    #[serde(rename = "type")]
    msg_type: &'static str,
    #[serde(rename = "appId")]
    app_id: String,
    #[serde(rename = "requestId")]
    request_id: u64,
}

#[derive(Serialize)]
struct Load<'a> {
    #[serde(rename = "type")]
    msg_type: &'static str,
    media: &'a MediaInformation,
    // The receiver expects the literal string "false" here, not a boolean.
    autoplay: &'static str,
    #[serde(rename = "requestId")]
    request_id: u64,
}

#[derive(Serialize)]
struct PlayerCommand {
    #[serde(rename = "type")]
    msg_type: &'static str,
    #[serde(rename = "mediaSessionId")]
    media_session_id: i64,
    #[serde(rename = "requestId")]
    request_id: u64,
}

#[derive(Serialize)]
struct VolumeSetting {
    level: f64,
    muted: bool,
}

#[derive(Serialize)]
struct SetVolume {
    #[serde(rename = "type")]
    msg_type: &'static str,
    volume: VolumeSetting,
    #[serde(rename = "mediaSessionId")]
    media_session_id: i64,
    #[serde(rename = "requestId")]
    request_id: u64,
}

#[derive(Serialize)]
struct Seek {
    #[serde(rename = "type")]
    msg_type: &'static str,
    #[serde(rename = "currentTime")]
    current_time: f64,
    #[serde(rename = "mediaSessionId")]
    media_session_id: i64,
    #[serde(rename = "requestId")]
    request_id: u64,
}

fn to_json<T: Serialize>(payload: &T) -> String {
    // Serialization of these payload structs cannot fail: no maps with
    // non-string keys, no non-finite floats reach this point.
    serde_json::to_string(payload).expect("command payload serialization")
}

/// Receiver-scope GET_STATUS body.
pub fn receiver_get_status(ids: &mut RequestIds) -> String {
    to_json(&GetStatus {
        msg_type: "GET_STATUS",
        request_id: ids.next_receiver(),
    })
}

/// Receiver-scope LAUNCH body.
pub fn launch(app_id: &str, ids: &mut RequestIds) -> String {
    to_json(&Launch {
        msg_type: "LAUNCH",
        app_id: app_id.to_string(),
        request_id: ids.next_receiver(),
    })
}

/// Media-scope GET_STATUS body.
pub fn player_get_status(ids: &mut RequestIds) -> String {
    to_json(&GetStatus {
        msg_type: "GET_STATUS",
        request_id: ids.next_media(),
    })
}

/// Media-scope LOAD body. Autoplay is always off; playback starts on an
/// explicit PLAY.
pub fn load(media: &MediaInformation, ids: &mut RequestIds) -> String {
    to_json(&Load {
        msg_type: "LOAD",
        media,
        autoplay: "false",
        request_id: ids.next_media(),
    })
}

/// Media-scope PLAY body.
pub fn play(media_session_id: i64, ids: &mut RequestIds) -> String {
    player_command("PLAY", media_session_id, ids)
}

/// Media-scope STOP body.
pub fn stop(media_session_id: i64, ids: &mut RequestIds) -> String {
    player_command("STOP", media_session_id, ids)
}

/// Media-scope PAUSE body.
pub fn pause(media_session_id: i64, ids: &mut RequestIds) -> String {
    player_command("PAUSE", media_session_id, ids)
}

fn player_command(msg_type: &'static str, media_session_id: i64, ids: &mut RequestIds) -> String {
    to_json(&PlayerCommand {
        msg_type,
        media_session_id,
        request_id: ids.next_media(),
    })
}

/// Media-scope SET_VOLUME body.
///
/// Levels outside `[0.0, 1.0]` are dropped: no payload is produced and no
/// request id is consumed.
pub fn set_volume(level: f64, muted: bool, media_session_id: i64, ids: &mut RequestIds) -> Option<String> {
    if !(0.0..=1.0).contains(&level) {
        return None;
    }

    Some(to_json(&SetVolume {
        msg_type: "SET_VOLUME",
        volume: VolumeSetting { level, muted },
        media_session_id,
        request_id: ids.next_media(),
    }))
}

/// Media-scope SEEK body.
///
/// Non-finite positions are dropped: JSON cannot represent them, so no
/// payload is produced and no request id is consumed.
pub fn seek(current_time: f64, media_session_id: i64, ids: &mut RequestIds) -> Option<String> {
    if !current_time.is_finite() {
        return None;
    }

    Some(to_json(&Seek {
        msg_type: "SEEK",
        current_time,
        media_session_id,
        request_id: ids.next_media(),
    }))
}
