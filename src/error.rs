//! Error types for GPSD location sessions
//!
//! Fatal errors end a session and are represented by [`GpsdLocationError`].
//! Record-level problems ([`MalformedRecord`], [`IncompleteFix`]) are not
//! fatal: the session reports them as diagnostics and keeps reading.

/// Main error type for GPSD location sessions
///
/// Every variant is terminal for the session that produced it. There is no
/// retry inside the crate; the caller may start a new session.
#[derive(Debug)]
pub enum GpsdLocationError {
    /// The GPSD server could not be reached
    ///
    /// Covers DNS failures, refused connections, unreachable hosts and
    /// connect timeouts. The underlying cause is kept verbatim.
    Connection(std::io::Error),

    /// Sending the watch command failed
    ///
    /// Usually a broken pipe right after the connection was accepted.
    Write(std::io::Error),

    /// Reading from the GPSD stream failed
    Read(std::io::Error),

    /// The server closed the stream
    EndOfStream,

    /// The configured endpoint could not be parsed
    InvalidEndpoint(String),

    /// The session has already run once
    AlreadyStarted,
}

impl core::fmt::Display for GpsdLocationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpsdLocationError::Connection(err) => write!(f, "ConnectionError: {}", err),
            GpsdLocationError::Write(err) => write!(f, "WriteError: {}", err),
            GpsdLocationError::Read(err) => write!(f, "ReadError: {}", err),
            GpsdLocationError::EndOfStream => write!(f, "EndOfStream: connection closed by GPSD"),
            GpsdLocationError::InvalidEndpoint(endpoint) => {
                write!(f, "InvalidEndpoint: {}", endpoint)
            }
            GpsdLocationError::AlreadyStarted => {
                write!(f, "AlreadyStarted: session has already run")
            }
        }
    }
}

impl core::error::Error for GpsdLocationError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            GpsdLocationError::Connection(err)
            | GpsdLocationError::Write(err)
            | GpsdLocationError::Read(err) => Some(err),
            _ => None,
        }
    }
}

/// A line that looked like a JSON object but failed to decode
#[derive(Debug)]
pub struct MalformedRecord {
    /// The offending line, without its line terminator
    pub line: String,
    /// Decoder error
    pub cause: serde_json::Error,
}

impl core::fmt::Display for MalformedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed record ({}): {}", self.cause, self.line)
    }
}

impl core::error::Error for MalformedRecord {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// A TPV record that cannot produce a fix
///
/// The session treats this as "keep waiting".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncompleteFix {
    /// The named field is absent
    Missing(&'static str),
    /// The named field is present but not a number
    NotNumeric(&'static str),
    /// The named field is NaN or infinite
    NotFinite(&'static str),
}

impl core::fmt::Display for IncompleteFix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncompleteFix::Missing(field) => write!(f, "missing {}", field),
            IncompleteFix::NotNumeric(field) => write!(f, "non-numeric {}", field),
            IncompleteFix::NotFinite(field) => write!(f, "non-finite {}", field),
        }
    }
}

impl core::error::Error for IncompleteFix {}
