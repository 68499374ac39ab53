//! Asynchronous GPSD location client and session configuration
//!
//! This module holds the types shared by both clients (endpoint, operating
//! mode, session state, status messages and the [`FixSink`] seam) and the
//! async client built on `futures-io`.
//!
//! For the blocking session with cancellation, see the `blocking` submodule.
//!
//! # Example
//!
//! ```no_run
//! use gpsd_location::client::{Endpoint, GpsdClient};
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint: Endpoint = "127.0.0.1:2947".parse()?;
//! let client = GpsdClient::connect(&endpoint).await?;
//!
//! let mut fixes = client.fixes();
//! while let Some(fix) = fixes.next().await {
//!     println!("{}", fix?);
//! }
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    Result,
    error::{GpsdLocationError, IncompleteFix},
    protocol::{
        GpsdJsonDecodeAsync, GpsdJsonEncodeAsync,
        v3::{self, Fix, Record, RecordClass},
    },
};

/// Blocking (synchronous) session implementation
pub mod blocking;

/// Address of a GPSD server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    v3::DEFAULT_PORT
}

impl Endpoint {
    pub fn new<S: Into<String>>(hostname: S, port: u16) -> Self {
        Endpoint {
            hostname: hostname.into(),
            port,
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::new("localhost", v3::DEFAULT_PORT)
    }
}

impl core::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.hostname.contains(':') {
            write!(f, "[{}]:{}", self.hostname, self.port)
        } else {
            write!(f, "{}:{}", self.hostname, self.port)
        }
    }
}

impl std::str::FromStr for Endpoint {
    type Err = GpsdLocationError;

    /// Accepts `host`, `host:port`, `[v6addr]` or `[v6addr]:port`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || GpsdLocationError::InvalidEndpoint(s.to_string());
        let parse_port = |port: &str| port.parse::<u16>().map_err(|_| invalid());

        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
            let port = match tail {
                "" => v3::DEFAULT_PORT,
                tail => parse_port(tail.strip_prefix(':').ok_or_else(invalid)?)?,
            };
            if host.is_empty() {
                return Err(invalid());
            }
            return Ok(Endpoint::new(host, port));
        }

        match s.rsplit_once(':') {
            // a bare IPv6 address has more than one colon
            Some((host, port)) if !host.contains(':') => {
                if host.is_empty() {
                    return Err(invalid());
                }
                Ok(Endpoint::new(host, parse_port(port)?))
            }
            _ if s.is_empty() => Err(invalid()),
            _ => Ok(Endpoint::new(s, v3::DEFAULT_PORT)),
        }
    }
}

/// How long a session keeps reading after the first fix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Stop at the first usable fix (connection check)
    #[default]
    SingleFix,
    /// Deliver a fix for every usable TPV report until stopped
    Continuous,
}

impl core::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::SingleFix => write!(f, "single-fix"),
            Mode::Continuous => write!(f, "continuous"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s {
            "single-fix" | "single" => Ok(Mode::SingleFix),
            "continuous" => Ok(Mode::Continuous),
            other => Err(format!(
                "unknown mode `{other}`, expected `single-fix` or `continuous`"
            )),
        }
    }
}

/// Settings a host application hands to a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(flatten)]
    pub endpoint: Endpoint,
    #[serde(default)]
    pub mode: Mode,
}

impl SessionConfig {
    pub fn new(endpoint: Endpoint, mode: Mode) -> Self {
        SessionConfig { endpoint, mode }
    }
}

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    AwaitingFix,
    FixAcquired,
    /// Terminal; start a new session to retry
    Failed,
}

/// Human-readable progress reported by a session
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Connecting(Endpoint),
    HandshakeSent,
    FixAcquired(Fix),
    ConnectionFailed(String),
    MalformedRecord(String),
    IncompleteFix(IncompleteFix),
}

impl Status {
    /// Log level the status is reported at
    pub fn level(&self) -> log::Level {
        match self {
            Status::Connecting(_) | Status::HandshakeSent | Status::FixAcquired(_) => {
                log::Level::Info
            }
            Status::MalformedRecord(_) | Status::IncompleteFix(_) => log::Level::Warn,
            Status::ConnectionFailed(_) => log::Level::Error,
        }
    }
}

impl core::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Connecting(endpoint) => write!(f, "Connecting to GPSD at {}", endpoint),
            Status::HandshakeSent => write!(f, "Watch command sent"),
            Status::FixAcquired(fix) => write!(f, "Connected successfully! {}", fix),
            Status::ConnectionFailed(cause) => write!(f, "Connection failed: {}", cause),
            Status::MalformedRecord(cause) => write!(f, "Skipped {}", cause),
            Status::IncompleteFix(reason) => write!(f, "Skipped TPV record: {}", reason),
        }
    }
}

/// Receiver of fixes acquired by a session
///
/// Fixes are delivered synchronously, in arrival order, from the session's
/// read loop. Any `FnMut(Fix)` closure is a sink.
pub trait FixSink {
    fn deliver(&mut self, fix: Fix);

    /// Observes session progress; ignored by default
    fn status(&mut self, _status: &Status) {}
}

impl<F: FnMut(Fix)> FixSink for F {
    fn deliver(&mut self, fix: Fix) {
        self(fix)
    }
}

/// Logs a status and forwards it to the sink
pub(crate) fn notify<S: FixSink + ?Sized>(sink: &mut S, status: Status) {
    log::log!(status.level(), "{}", status);
    sink.status(&status);
}

/// Turns one line outcome into a fix, reporting anything skipped
///
/// Non-fatal problems stop here: they are passed to `report` and the caller
/// simply keeps reading.
pub(crate) fn extract_fix(record: Record, mut report: impl FnMut(Status)) -> Option<Fix> {
    match record {
        Record::Skipped => None,
        Record::Malformed(err) => {
            report(Status::MalformedRecord(err.to_string()));
            None
        }
        Record::Ignored(class) => {
            log::debug!("Ignoring {} record", class_name(class.as_ref()));
            None
        }
        Record::Position(raw) => match Fix::from_tpv(&raw) {
            Ok(fix) => Some(fix),
            Err(reason) => {
                report(Status::IncompleteFix(reason));
                None
            }
        },
    }
}

fn class_name(class: Option<&RecordClass>) -> &str {
    match class {
        None => "unclassified",
        Some(RecordClass::Tpv) => "TPV",
        Some(RecordClass::Sky) => "SKY",
        Some(RecordClass::Version) => "VERSION",
        Some(RecordClass::Watch) => "WATCH",
        Some(RecordClass::Devices) => "DEVICES",
        Some(RecordClass::Device) => "DEVICE",
        Some(RecordClass::Error) => "ERROR",
        Some(RecordClass::Other(name)) => name.as_str(),
    }
}

fn log_status(status: Status) {
    log::log!(status.level(), "{}", status);
}

/// Reports a fatal error the way the blocking session does
fn failed(err: GpsdLocationError) -> GpsdLocationError {
    log_status(Status::ConnectionFailed(err.to_string()));
    err
}

/// Asynchronous GPSD location client
///
/// Owns the connection for its whole lifetime. Dropping the client, or the
/// [`FixStream`] made from it, closes the connection.
///
/// # Type Parameters
/// * `Stream` - The underlying async I/O stream type (e.g., TcpStream)
#[derive(Debug)]
pub struct GpsdClient<Stream> {
    reader: futures_util::io::BufReader<Stream>,
    buf: Vec<u8>,
}

impl<Stream> GpsdClient<Stream>
where
    Stream: futures_io::AsyncRead + futures_io::AsyncWrite + Unpin,
{
    /// Subscribes to watch mode on an already connected stream
    ///
    /// The watch command is fire-and-forget: no acknowledgement is awaited.
    pub async fn open(mut stream: Stream) -> Result<Self> {
        stream
            .write_request_async(&v3::RequestMessage::Watch(v3::Watch::location()))
            .await
            .map_err(failed)?;
        log_status(Status::HandshakeSent);

        Ok(GpsdClient {
            reader: futures_util::io::BufReader::new(stream),
            buf: Vec::new(),
        })
    }

    /// Reads until the first usable fix (single-fix mode)
    ///
    /// Fails with [`GpsdLocationError::EndOfStream`] if the server closes
    /// the connection first.
    pub async fn first_fix(mut self) -> Result<Fix> {
        loop {
            let record = self.reader.read_record_async(&mut self.buf).await;
            let Some(record) = record.map_err(failed)? else {
                return Err(failed(GpsdLocationError::EndOfStream));
            };
            if let Some(fix) = extract_fix(record, log_status) {
                log_status(Status::FixAcquired(fix.clone()));
                return Ok(fix);
            }
        }
    }

    /// Streams a fix for every usable TPV report (continuous mode)
    pub fn fixes(self) -> FixStream<Stream> {
        FixStream {
            inner: self,
            finished: false,
        }
    }
}

#[cfg(feature = "tokio")]
impl GpsdClient<tokio_util::compat::Compat<tokio::net::TcpStream>> {
    /// Connects to a GPSD server over TCP and subscribes
    ///
    /// # Example
    /// ```no_run
    /// # use gpsd_location::client::{Endpoint, GpsdClient};
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = GpsdClient::connect(&Endpoint::default()).await?;
    /// let fix = client.first_fix().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(endpoint: &Endpoint) -> Result<Self> {
        use tokio_util::compat::TokioAsyncReadCompatExt;

        log_status(Status::Connecting(endpoint.clone()));
        let stream = tokio::net::TcpStream::connect((endpoint.hostname.as_str(), endpoint.port))
            .await
            .map_err(|e| failed(GpsdLocationError::Connection(e)))?;
        GpsdClient::open(stream.compat()).await
    }
}

/// Async stream of fixes from GPSD
///
/// Yields `Ok(fix)` for each usable TPV report. When the connection fails
/// or the server closes it, yields one `Err` and then ends.
pub struct FixStream<Stream> {
    inner: GpsdClient<Stream>,
    finished: bool,
}

impl<Stream> futures_util::Stream for FixStream<Stream>
where
    Stream: futures_io::AsyncRead + Unpin,
{
    type Item = Result<Fix>;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return std::task::Poll::Ready(None);
        }

        loop {
            let reader = std::pin::Pin::new(&mut this.inner.reader);
            match std::task::ready!(reader.poll_record(cx, &mut this.inner.buf)) {
                Ok(Some(record)) => {
                    if let Some(fix) = extract_fix(record, log_status) {
                        log_status(Status::FixAcquired(fix.clone()));
                        return std::task::Poll::Ready(Some(Ok(fix)));
                    }
                }
                Ok(None) => {
                    this.finished = true;
                    let err = failed(GpsdLocationError::EndOfStream);
                    return std::task::Poll::Ready(Some(Err(err)));
                }
                Err(e) => {
                    this.finished = true;
                    return std::task::Poll::Ready(Some(Err(failed(e))));
                }
            }
        }
    }
}
