//! Decoding of streamed GPSD lines
//!
//! Each line is decoded into a generic key-value document rather than a typed
//! message, and its `class` field is inspected explicitly. Unknown classes and
//! undecodable lines are therefore ordinary outcomes, never panics.

use crate::error::MalformedRecord;

/// An untyped JSON object decoded from one line of server output
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Record class taken from the `class` field
///
/// - [libgps_json_unpack](https://gitlab.com/gpsd/gpsd/-/blob/master/libgps/libgps_json.c#L792)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordClass {
    /// Time-Position-Velocity report
    Tpv,
    /// Satellite sky view report
    Sky,
    /// GPSD version banner
    Version,
    /// Echo of the current watch settings
    Watch,
    /// List of available GPS devices
    Devices,
    /// Single GPS device information
    Device,
    /// Error message from GPSD
    Error,
    /// Any other class
    Other(String),
}

impl RecordClass {
    /// Reads the class of a decoded record
    ///
    /// Returns `None` when `class` is absent or is not a string.
    pub fn of(record: &RawRecord) -> Option<RecordClass> {
        record
            .get("class")
            .and_then(serde_json::Value::as_str)
            .map(RecordClass::from)
    }
}

impl From<&str> for RecordClass {
    fn from(class: &str) -> Self {
        match class {
            "TPV" => RecordClass::Tpv,
            "SKY" => RecordClass::Sky,
            "VERSION" => RecordClass::Version,
            "WATCH" => RecordClass::Watch,
            "DEVICES" => RecordClass::Devices,
            "DEVICE" => RecordClass::Device,
            "ERROR" => RecordClass::Error,
            other => RecordClass::Other(other.to_string()),
        }
    }
}

/// Outcome of reading one line from GPSD
#[derive(Debug)]
pub enum Record {
    /// Blank line, or text that is not a JSON object (NMEA, raw dumps)
    Skipped,
    /// Line started with `{` but did not decode
    Malformed(MalformedRecord),
    /// Decoded record whose class is absent or not TPV
    Ignored(Option<RecordClass>),
    /// Decoded TPV record, ready for fix extraction
    Position(RawRecord),
}

impl Record {
    /// Classifies a single line of server output
    pub fn parse(line: &str) -> Record {
        let line = line.trim_end();
        if !line.starts_with('{') {
            return Record::Skipped;
        }

        let record: RawRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(cause) => {
                return Record::Malformed(MalformedRecord {
                    line: line.to_string(),
                    cause,
                });
            }
        };

        match RecordClass::of(&record) {
            Some(RecordClass::Tpv) => Record::Position(record),
            class => Record::Ignored(class),
        }
    }
}
