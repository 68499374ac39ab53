//! Line codec for the GPSD JSON protocol
//!
//! GPSD speaks newline-delimited text. These traits add record-level reads and
//! request writes to any buffered reader or writer, blocking or async, so the
//! clients never deal with raw bytes.

use crate::{Result, error::GpsdLocationError, protocol::v3::Record};

pub mod v3;

/// Classifies the line held in `buf` and clears it for the next read
fn finish_line(buf: &mut Vec<u8>) -> Record {
    let record = Record::parse(&String::from_utf8_lossy(buf));
    buf.clear();
    record
}

pub trait GpsdJsonRequest {
    fn to_command(&self) -> String;
}

pub trait GpsdJsonDecode: std::io::BufRead {
    /// Returns `Ok(None)` once the server has closed the stream.
    fn read_record(&mut self, buf: &mut Vec<u8>) -> Result<Option<Record>> {
        buf.clear();
        let bytes_read = self
            .read_until(b'\n', buf)
            .map_err(GpsdLocationError::Read)?;
        if bytes_read == 0 {
            return Ok(None); // EOF reached
        }

        Ok(Some(finish_line(buf)))
    }
}

impl<R: std::io::BufRead + ?Sized> GpsdJsonDecode for R {}

pub trait GpsdJsonEncode: std::io::Write {
    fn write_request(&mut self, request: &impl GpsdJsonRequest) -> Result<()> {
        let cmd = request.to_command();
        self.write_all(cmd.as_bytes())
            .and_then(|_| self.flush())
            .map_err(GpsdLocationError::Write)
    }
}

impl<W: std::io::Write + ?Sized> GpsdJsonEncode for W {}

pub trait GpsdJsonDecodeAsync: futures_io::AsyncBufRead + Unpin {
    /// Polls for the next complete line and classifies it
    ///
    /// Partial lines accumulate in `buf` across `Pending` returns, so the
    /// same buffer must be passed on every poll.
    fn poll_record(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut Vec<u8>,
    ) -> std::task::Poll<Result<Option<Record>>> {
        loop {
            let available = match std::task::ready!(self.as_mut().poll_fill_buf(cx)) {
                Ok(available) => available,
                Err(e) => return std::task::Poll::Ready(Err(GpsdLocationError::Read(e))),
            };

            if available.is_empty() {
                if buf.is_empty() {
                    return std::task::Poll::Ready(Ok(None)); // EOF reached
                }
                return std::task::Poll::Ready(Ok(Some(finish_line(buf))));
            }

            let (complete, used) = match available.iter().position(|&b| b == b'\n') {
                Some(idx) => {
                    buf.extend_from_slice(&available[..=idx]);
                    (true, idx + 1)
                }
                None => {
                    buf.extend_from_slice(available);
                    (false, available.len())
                }
            };
            self.as_mut().consume(used);

            if complete {
                return std::task::Poll::Ready(Ok(Some(finish_line(buf))));
            }
        }
    }

    fn read_record_async<'a>(
        &'a mut self,
        buf: &'a mut Vec<u8>,
    ) -> impl std::future::Future<Output = Result<Option<Record>>> + 'a {
        futures_util::future::poll_fn(move |cx| std::pin::Pin::new(&mut *self).poll_record(cx, buf))
    }
}

impl<R: futures_io::AsyncBufRead + Unpin + ?Sized> GpsdJsonDecodeAsync for R {}

pub trait GpsdJsonEncodeAsync: futures_io::AsyncWrite + Unpin {
    fn write_request_async<'a>(
        &'a mut self,
        request: &'a impl GpsdJsonRequest,
    ) -> impl std::future::Future<Output = Result<()>> + 'a {
        async move {
            use futures_util::AsyncWriteExt;

            let cmd = request.to_command();
            self.write_all(cmd.as_bytes())
                .await
                .map_err(GpsdLocationError::Write)?;
            self.flush().await.map_err(GpsdLocationError::Write)
        }
    }
}

impl<W: futures_io::AsyncWrite + Unpin + ?Sized> GpsdJsonEncodeAsync for W {}
