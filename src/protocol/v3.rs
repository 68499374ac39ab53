//! GPSD JSON Protocol Version 3 subset used for location
//!
//! GPSD 3.x clients subscribe with a `?WATCH=` command and then receive a
//! continuous stream of JSON objects, one per line, each tagged with a
//! `"class"` field. Only the watch request and the TPV report matter here;
//! every other class is valid traffic that is read and ignored.
//!
//! # References
//!
//! - [GPSD Protocol Documentation](https://gpsd.io/gpsd_json.html)

use crate::protocol::GpsdJsonRequest;

/// Position fix extracted from TPV reports
pub mod fix;
/// Record decoding and classification
pub mod record;
/// Request message types
pub mod request;

pub use fix::Fix;
pub use record::{RawRecord, Record, RecordClass};
pub use request::Watch;

/// Default TCP port of the GPSD service
pub const DEFAULT_PORT: u16 = 2947;

/// Type alias for version 3 request messages
pub type RequestMessage = request::Message;

impl GpsdJsonRequest for RequestMessage {
    /// Converts a request message into a newline-terminated GPSD command,
    /// e.g. `?WATCH={"enable":true}`
    fn to_command(&self) -> String {
        match self {
            // A struct of optional scalars always serializes.
            RequestMessage::Watch(watch) => {
                format!("?WATCH={}\n", serde_json::to_string(watch).unwrap())
            }
        }
    }
}
