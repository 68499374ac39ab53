//! Blocking (synchronous) GPSD location session
//!
//! [`Session`] drives the full lifecycle on the calling thread: connect,
//! subscribe, read until a fix is acquired (single-fix mode) or until
//! stopped (continuous mode). The only blocking points are the TCP connect
//! and the line reads. Another thread may stop the session through a
//! [`CancelHandle`].

use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::Result;
use crate::client::{
    Endpoint, FixSink, Mode, SessionConfig, SessionState, Status, extract_fix, notify,
};
use crate::error::GpsdLocationError;
use crate::protocol::{
    GpsdJsonDecode, GpsdJsonEncode,
    v3::{self, Fix, Record},
};

/// Line transport over a bidirectional byte stream
///
/// Owns the stream for its whole lifetime; dropping the transport drops the
/// read buffer and then the stream itself.
///
/// # Type Parameters
/// * `Stream` - The underlying I/O stream type (e.g., TcpStream)
#[derive(Debug)]
pub struct Transport<Stream> {
    reader: std::io::BufReader<Stream>,
    buf: Vec<u8>,
}

impl<Stream> Transport<Stream>
where
    Stream: std::io::Read + std::io::Write,
{
    /// Wraps an already connected stream
    pub fn open(stream: Stream) -> Self {
        Transport {
            reader: std::io::BufReader::new(stream),
            buf: Vec::new(),
        }
    }

    /// Sends the watch subscription
    ///
    /// Fire-and-forget: any acknowledgement arrives as an ordinary record.
    pub fn watch(&mut self) -> Result<()> {
        self.reader
            .get_mut()
            .write_request(&v3::RequestMessage::Watch(v3::Watch::location()))
    }

    /// Reads and classifies the next line
    ///
    /// Returns `None` if the connection is closed.
    pub fn read_record(&mut self) -> Result<Option<Record>> {
        self.reader.read_record(&mut self.buf)
    }

    pub fn get_ref(&self) -> &Stream {
        self.reader.get_ref()
    }
}

impl Transport<TcpStream> {
    /// Connects to a GPSD server over TCP
    ///
    /// Any failure, including name resolution, is a
    /// [`GpsdLocationError::Connection`].
    pub fn connect(endpoint: &Endpoint) -> Result<Self> {
        let stream = TcpStream::connect((endpoint.hostname.as_str(), endpoint.port))
            .map_err(GpsdLocationError::Connection)?;
        Ok(Transport::open(stream))
    }
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    socket: Mutex<Option<TcpStream>>,
}

/// Stops a running [`Session`] from another thread
///
/// Cancellation is observed between line reads. A read that is already
/// blocked is released by shutting the session's TCP socket down.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelState>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        if let Ok(socket) = self.inner.socket.lock() {
            if let Some(socket) = socket.as_ref() {
                let _ = socket.shutdown(Shutdown::Both);
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    fn register(&self, socket: TcpStream) {
        if let Ok(mut slot) = self.inner.socket.lock() {
            // cancelled before the connection existed
            if self.is_cancelled() {
                let _ = socket.shutdown(Shutdown::Both);
            }
            *slot = Some(socket);
        }
    }

    fn release(&self) {
        if let Ok(mut slot) = self.inner.socket.lock() {
            slot.take();
        }
    }
}

/// A single GPSD location session
///
/// A session runs once. After it ends, in any state, build a new one to
/// connect again.
///
/// # Example
/// ```no_run
/// # use gpsd_location::client::{Endpoint, Mode, SessionConfig, blocking::Session};
/// # use gpsd_location::protocol::v3::Fix;
/// let mut session = Session::new(SessionConfig::new(Endpoint::default(), Mode::Continuous));
/// let cancel = session.cancel_handle();
/// std::thread::spawn(move || {
///     std::thread::sleep(std::time::Duration::from_secs(60));
///     cancel.cancel();
/// });
///
/// let mut sink = |fix: Fix| println!("{fix}");
/// let last = session.run(&mut sink).unwrap();
/// ```
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    state: SessionState,
    started: bool,
    cancel: CancelHandle,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Session {
            config,
            state: SessionState::Disconnected,
            started: false,
            cancel: CancelHandle::default(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Connects to the configured endpoint and runs the session
    ///
    /// # Returns
    /// * `Ok(Some(fix))` - Single-fix mode acquired a fix, or a cancelled
    ///   session had delivered at least one
    /// * `Ok(None)` - Cancelled before any fix
    /// * `Err(_)` - The session failed; its state is [`SessionState::Failed`]
    pub fn run<S: FixSink + ?Sized>(&mut self, sink: &mut S) -> Result<Option<Fix>> {
        self.start(sink)?;

        let transport = match Transport::connect(&self.config.endpoint) {
            Ok(transport) => transport,
            Err(e) => return Err(self.fail(sink, e)),
        };
        match transport.get_ref().try_clone() {
            Ok(socket) => self.cancel.register(socket),
            Err(e) => log::warn!("Cancellation cannot interrupt a blocked read: {}", e),
        }

        let result = self.drive(transport, sink);
        self.cancel.release();
        result
    }

    /// Runs the session over an already connected stream
    ///
    /// Same as [`Session::run`] minus the TCP connect. Cancellation is only
    /// seen between reads, since the handle cannot close a foreign stream.
    pub fn run_on<Stream, S>(&mut self, stream: Stream, sink: &mut S) -> Result<Option<Fix>>
    where
        Stream: std::io::Read + std::io::Write,
        S: FixSink + ?Sized,
    {
        self.start(sink)?;
        self.drive(Transport::open(stream), sink)
    }

    fn start<S: FixSink + ?Sized>(&mut self, sink: &mut S) -> Result<()> {
        if self.started {
            return Err(GpsdLocationError::AlreadyStarted);
        }
        self.started = true;
        self.state = SessionState::Connecting;
        notify(sink, Status::Connecting(self.config.endpoint.clone()));
        Ok(())
    }

    fn drive<Stream, S>(
        &mut self,
        mut transport: Transport<Stream>,
        sink: &mut S,
    ) -> Result<Option<Fix>>
    where
        Stream: std::io::Read + std::io::Write,
        S: FixSink + ?Sized,
    {
        if self.cancel.is_cancelled() {
            return Ok(self.stop(None));
        }
        match transport.watch() {
            Ok(()) => {}
            // the socket was shut down by a concurrent cancel
            Err(_) if self.cancel.is_cancelled() => return Ok(self.stop(None)),
            Err(e) => return Err(self.fail(sink, e)),
        }
        self.state = SessionState::AwaitingFix;
        notify(sink, Status::HandshakeSent);

        let mut last = None;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(self.stop(last));
            }

            let record = match transport.read_record() {
                Ok(Some(record)) => record,
                Ok(None) if self.cancel.is_cancelled() => return Ok(self.stop(last)),
                Ok(None) => return Err(self.fail(sink, GpsdLocationError::EndOfStream)),
                Err(_) if self.cancel.is_cancelled() => return Ok(self.stop(last)),
                Err(e) => return Err(self.fail(sink, e)),
            };

            let Some(fix) = extract_fix(record, |status| notify(sink, status)) else {
                continue;
            };

            self.state = SessionState::FixAcquired;
            notify(sink, Status::FixAcquired(fix.clone()));
            sink.deliver(fix.clone());
            last = Some(fix);

            if self.config.mode == Mode::SingleFix {
                return Ok(last);
            }
        }
    }

    fn stop(&mut self, last: Option<Fix>) -> Option<Fix> {
        log::info!("Session to {} cancelled", self.config.endpoint);
        self.state = SessionState::Disconnected;
        last
    }

    fn fail<S: FixSink + ?Sized>(
        &mut self,
        sink: &mut S,
        err: GpsdLocationError,
    ) -> GpsdLocationError {
        self.state = SessionState::Failed;
        notify(sink, Status::ConnectionFailed(err.to_string()));
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, Read, Write};
    use std::net::TcpListener;

    const WATCH_LINE: &str =
        "?WATCH={\"enable\":true,\"json\":true,\"nmea\":true,\"raw\":1,\"scaled\":true}\n";
    const TPV_A: &str =
        r#"{"class":"TPV","lat":40.0,"lon":-105.25,"alt":1600.0,"time":"2024-01-01T00:00:00Z"}"#;
    const TPV_B: &str = r#"{"class":"TPV","lat":-12.5,"lon":130.75,"time":"2024-01-01T00:00:05Z"}"#;

    /// In-memory duplex stream: reads from `input`, records writes
    struct MockStream {
        input: std::io::Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl MockStream {
        fn new(lines: &[&str]) -> Self {
            let mut input = String::new();
            for line in lines {
                input.push_str(line);
                input.push('\n');
            }
            MockStream {
                input: std::io::Cursor::new(input.into_bytes()),
                output: Vec::new(),
            }
        }

        fn written(&self) -> String {
            String::from_utf8_lossy(&self.output).into_owned()
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Read for BrokenPipe {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Ok(0)
        }
    }

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Sink that records everything it is given
    #[derive(Default)]
    struct Recorder {
        fixes: Vec<Fix>,
        statuses: Vec<Status>,
    }

    impl FixSink for Recorder {
        fn deliver(&mut self, fix: Fix) {
            self.fixes.push(fix);
        }

        fn status(&mut self, status: &Status) {
            self.statuses.push(status.clone());
        }
    }

    fn session(mode: Mode) -> Session {
        Session::new(SessionConfig::new(Endpoint::new("127.0.0.1", 2947), mode))
    }

    #[test]
    fn test_single_fix() {
        let mut stream = MockStream::new(&[r#"{"class":"VERSION","release":"3.25"}"#, TPV_A]);
        let mut sink = Recorder::default();
        let mut session = session(Mode::SingleFix);

        let fix = session.run_on(&mut stream, &mut sink).unwrap().unwrap();

        assert_eq!(session.state(), SessionState::FixAcquired);
        assert_eq!(fix.latitude(), 40.0);
        assert_eq!(fix.longitude(), -105.25);
        assert_eq!(fix.altitude_meters(), 1600.0);
        assert_eq!(fix.timestamp(), "2024-01-01T00:00:00Z");
        assert_eq!(sink.fixes, vec![fix.clone()]);
        assert_eq!(stream.written(), WATCH_LINE);
        assert_eq!(
            sink.statuses,
            vec![
                Status::Connecting(Endpoint::new("127.0.0.1", 2947)),
                Status::HandshakeSent,
                Status::FixAcquired(fix),
            ]
        );
    }

    #[test]
    fn test_single_fix_delivers_once() {
        let mut stream = MockStream::new(&[TPV_A, TPV_A, TPV_A]);
        let mut fixes = Vec::new();
        let mut sink = |fix: Fix| fixes.push(fix);

        session(Mode::SingleFix).run_on(&mut stream, &mut sink).unwrap();

        assert_eq!(fixes.len(), 1);
        assert_eq!(stream.written(), WATCH_LINE);
    }

    #[test]
    fn test_incomplete_tpv_keeps_waiting() {
        let mut stream = MockStream::new(&[r#"{"class":"TPV","lat":40.0}"#]);
        let mut sink = Recorder::default();
        let mut session = session(Mode::SingleFix);

        let result = session.run_on(&mut stream, &mut sink);

        assert!(matches!(result, Err(GpsdLocationError::EndOfStream)));
        assert!(sink.fixes.is_empty());
        assert!(sink.statuses.contains(&Status::IncompleteFix(
            crate::error::IncompleteFix::Missing("lon")
        )));
    }

    #[test]
    fn test_malformed_lines_do_not_abort() {
        let mut stream = MockStream::new(&["foo", "{broken", "", "$GPGSV,3,1,11*7A", TPV_A]);
        let mut sink = Recorder::default();
        let mut session = session(Mode::SingleFix);

        let fix = session.run_on(&mut stream, &mut sink).unwrap();

        assert!(fix.is_some());
        let malformed = sink
            .statuses
            .iter()
            .filter(|s| matches!(s, Status::MalformedRecord(_)))
            .count();
        assert_eq!(malformed, 1);
    }

    #[test]
    fn test_end_of_stream_without_fix() {
        let mut stream = MockStream::new(&[r#"{"class":"VERSION","release":"3.20"}"#]);
        let mut sink = Recorder::default();
        let mut session = session(Mode::SingleFix);

        let result = session.run_on(&mut stream, &mut sink);

        assert!(matches!(result, Err(GpsdLocationError::EndOfStream)));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(sink.fixes.is_empty());
        assert!(matches!(sink.statuses.last(), Some(Status::ConnectionFailed(_))));
    }

    #[test]
    fn test_continuous_delivers_in_order() {
        let mut stream = MockStream::new(&[TPV_A, r#"{"class":"SKY","satellites":[]}"#, TPV_B]);
        let mut sink = Recorder::default();
        let mut session = session(Mode::Continuous);

        let result = session.run_on(&mut stream, &mut sink);

        assert!(matches!(result, Err(GpsdLocationError::EndOfStream)));
        assert_eq!(sink.fixes.len(), 2);
        assert_eq!((sink.fixes[0].latitude(), sink.fixes[0].longitude()), (40.0, -105.25));
        assert_eq!((sink.fixes[1].latitude(), sink.fixes[1].longitude()), (-12.5, 130.75));
        // no altitude carried over from the previous fix
        assert_eq!(sink.fixes[1].altitude_meters(), 0.0);
        assert_eq!(sink.fixes[1].timestamp(), "2024-01-01T00:00:05Z");
    }

    #[test]
    fn test_continuous_repeats_equal_fixes() {
        let mut stream = MockStream::new(&[TPV_A, TPV_A, TPV_A]);
        let mut sink = Recorder::default();

        let _ = session(Mode::Continuous).run_on(&mut stream, &mut sink);

        assert_eq!(sink.fixes.len(), 3);
        assert!(sink.fixes.iter().all(|fix| *fix == sink.fixes[0]));
    }

    #[test]
    fn test_write_failure() {
        let mut sink = Recorder::default();
        let mut session = session(Mode::SingleFix);

        let result = session.run_on(BrokenPipe, &mut sink);

        assert!(matches!(result, Err(GpsdLocationError::Write(_))));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(!sink.statuses.contains(&Status::HandshakeSent));
    }

    #[test]
    fn test_session_runs_once() {
        let mut session = session(Mode::SingleFix);
        let mut sink = Recorder::default();
        let _ = session.run_on(MockStream::new(&[TPV_A]), &mut sink);

        let again = session.run_on(MockStream::new(&[TPV_A]), &mut sink);
        assert!(matches!(again, Err(GpsdLocationError::AlreadyStarted)));
        assert_eq!(sink.fixes.len(), 1);
    }

    #[test]
    fn test_cancel_before_read() {
        let mut session = session(Mode::Continuous);
        session.cancel_handle().cancel();
        let mut sink = Recorder::default();

        let result = session.run_on(MockStream::new(&[TPV_A]), &mut sink).unwrap();

        assert!(result.is_none());
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(sink.fixes.is_empty());
    }

    #[test]
    fn test_cancel_before_tcp_run() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            let _ = (&socket).read_to_end(&mut received);
            received
        });

        let mut session = Session::new(SessionConfig::new(
            Endpoint::new("127.0.0.1", port),
            Mode::Continuous,
        ));
        session.cancel_handle().cancel();
        let mut sink = Recorder::default();

        let result = session.run(&mut sink);

        assert!(matches!(result, Ok(None)));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(
            sink.statuses,
            vec![Status::Connecting(Endpoint::new("127.0.0.1", port))]
        );
        assert!(server.join().unwrap().is_empty());
    }

    #[test]
    fn test_connection_refused() {
        // bind then drop to get a local port with nothing listening
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut session = Session::new(SessionConfig::new(
            Endpoint::new("127.0.0.1", port),
            Mode::SingleFix,
        ));
        let mut sink = Recorder::default();

        let result = session.run(&mut sink);

        assert!(matches!(result, Err(GpsdLocationError::Connection(_))));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(!sink.statuses.contains(&Status::HandshakeSent));
        assert!(sink.fixes.is_empty());
    }

    #[test]
    fn test_tcp_single_fix() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            let mut reader = std::io::BufReader::new(socket.try_clone().unwrap());
            let mut writer = socket;
            writeln!(
                writer,
                "{{\"class\":\"VERSION\",\"release\":\"3.25\",\"proto_major\":3,\"proto_minor\":15}}"
            )
            .unwrap();

            let mut command = String::new();
            reader.read_line(&mut command).unwrap();

            writeln!(writer, "{{\"class\":\"DEVICES\",\"devices\":[]}}").unwrap();
            writeln!(writer, "{TPV_A}").unwrap();
            command
        });

        let mut session = Session::new(SessionConfig::new(
            Endpoint::new("127.0.0.1", port),
            Mode::SingleFix,
        ));
        let mut fixes = Vec::new();
        let mut sink = |fix: Fix| fixes.push(fix);
        let fix = session.run(&mut sink).unwrap().unwrap();

        assert_eq!(server.join().unwrap(), WATCH_LINE);
        assert_eq!(fix.latitude(), 40.0);
        assert_eq!(fixes.len(), 1);
        assert_eq!(session.state(), SessionState::FixAcquired);
    }

    #[test]
    fn test_cancel_unblocks_pending_read() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        let server = std::thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            let mut reader = std::io::BufReader::new(socket.try_clone().unwrap());
            let mut writer = socket;
            let mut command = String::new();
            reader.read_line(&mut command).unwrap();
            writeln!(writer, "{TPV_A}").unwrap();
            ready_tx.send(()).unwrap();

            // hold the connection open until the client goes away
            let mut rest = Vec::new();
            let _ = reader.read_to_end(&mut rest);
        });

        let mut session = Session::new(SessionConfig::new(
            Endpoint::new("127.0.0.1", port),
            Mode::Continuous,
        ));
        let cancel = session.cancel_handle();
        let client = std::thread::spawn(move || {
            let mut sink = Recorder::default();
            let result = session.run(&mut sink);
            (session, sink, result)
        });

        ready_rx.recv().unwrap();
        // the fix has been written; give the client a moment to block in read
        std::thread::sleep(std::time::Duration::from_millis(100));
        cancel.cancel();

        let (session, sink, result) = client.join().unwrap();
        server.join().unwrap();

        let last = result.unwrap().unwrap();
        assert_eq!(last.latitude(), 40.0);
        assert_eq!(sink.fixes.len(), 1);
        assert_eq!(session.state(), SessionState::Disconnected);
    }
}
