use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Watch(Watch),
}

/// # Watch Policy
/// - [json_watch_read](https://gitlab.com/gpsd/gpsd/-/blob/master/libgps/shared_json.c#L95)
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Watch {
    pub device: Option<String>,
    pub enable: Option<bool>,
    pub json: Option<bool>,
    pub nmea: Option<bool>,
    pub pps: Option<bool>,
    pub raw: Option<i32>,
    pub scaled: Option<bool>,
    pub split24: Option<bool>,
    pub timing: Option<bool>,
    pub remote: Option<String>,
}

impl Watch {
    /// The subscription sent when a location session connects
    ///
    /// Enables JSON reports together with NMEA and hex-dump raw output,
    /// with scaled values.
    pub fn location() -> Self {
        Watch {
            enable: Some(true),
            json: Some(true),
            nmea: Some(true),
            raw: Some(1),
            scaled: Some(true),
            ..Default::default()
        }
    }
}
