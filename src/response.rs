//! Response header construction and body flushing, including chunked
//! transfer encoding.
//!
//! Grounded on `examples/original_source/include/Response.h` /
//! `src/Response.cc`: `Prepare()` builds the status line, fields, and either
//! `Content-Length` (`Normal` mode) or `Transfer-Encoding: chunked`
//! (`Chunked` mode); `FlushHeader`/`FlushBody`/`FlushStream` write
//! incrementally against a caller-supplied byte budget; `Cache()` snapshots
//! the prepared state into an owned, independently-reusable value.

use crate::status::Status;
use std::io::{self, Write};

/// A source of response body chunks read lazily during the `Write` stage
/// (spec.md §3 "Response state" — body as an input stream).
pub trait InputStream: Send {
    /// Produces the next chunk of body bytes, or `None` once exhausted.
    /// Returning `Some(empty vec)` is treated the same as `None` by the
    /// flush loop's end-of-stream check.
    fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>>;
}

enum Body {
    Owned(Vec<u8>),
    Stream(Box<dyn InputStream>),
}

/// `Normal` emits a `Content-Length` header and a fixed-size body;
/// `Chunked` emits `Transfer-Encoding: chunked` framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Normal,
    Chunked,
    /// An informational response (e.g. `100 Continue`) that carries neither
    /// a body nor a `Content-Length` field.
    NoBody,
}

/// An immutable snapshot of a prepared response, independent of the
/// [`Response`] it was taken from (spec.md §9 Open Question 2, resolved: see
/// `SPEC_FULL.md` §4.E).
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub header: Vec<u8>,
    pub body: Vec<u8>,
}

/// An in-progress HTTP/1.1 response being built by a channel's processor and
/// flushed by the channel's `Write` stage.
pub struct Response {
    status: Status,
    keep_alive: bool,
    fields: Vec<(String, String)>,
    body: Body,
    mode: TransferMode,
    header: Option<Vec<u8>>,
    write_cursor: usize,
    chunk: Option<ChunkCursor>,
    stream_ended: bool,
}

struct ChunkCursor {
    data: Vec<u8>,
    pos: usize,
}

/// The reservation the chunk-size-hex header is guaranteed to fit within
/// (spec.md §9 "Chunked-response 16-byte reservation").
const CHUNK_HEADER_RESERVATION: usize = 16;

/// The largest chunk size the 16-byte header reservation is documented to
/// cover (spec.md §9: "the size-header-must-fit heuristic is correct only up
/// to chunk size < 2^60"). A chunk at or beyond this size is rejected with a
/// runtime error instead of being framed with an oversized header.
const MAX_CHUNK_SIZE: u64 = 1 << 60;

/// `true` if `len` fits within the chunk-size cap the header reservation
/// covers. Split out from `frame_chunk` so the boundary can be exercised
/// without allocating a chunk anywhere near `MAX_CHUNK_SIZE` bytes.
fn chunk_size_in_bounds(len: usize) -> bool {
    (len as u64) < MAX_CHUNK_SIZE
}

impl Response {
    pub fn new(status: Status, keep_alive: bool) -> Self {
        Self {
            status,
            keep_alive,
            fields: Vec::new(),
            body: Body::Owned(Vec::new()),
            mode: TransferMode::Normal,
            header: None,
            write_cursor: 0,
            chunk: None,
            stream_ended: false,
        }
    }

    /// A `100 Continue` interim response: status line only, no fields, no
    /// `Content-Length`, no body.
    pub fn continue_100() -> Self {
        let mut resp = Self::new(Status::Continue, true);
        resp.mode = TransferMode::NoBody;
        resp
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.header = None;
        self.fields.push((name.into(), value.into()));
    }

    pub fn set_cookie(&mut self, name: &str, value: &str, options: &crate::cookie::CookieOptions) {
        self.set_field("Set-Cookie", crate::cookie::encode(name, value, options));
    }

    /// Sets a fixed-length body; switches to `Normal` transfer mode.
    pub fn set_content(&mut self, body: Vec<u8>) {
        self.header = None;
        self.mode = TransferMode::Normal;
        self.body = Body::Owned(body);
    }

    /// Sets a streamed body; switches to `Chunked` transfer mode.
    pub fn set_stream(&mut self, stream: Box<dyn InputStream>) {
        self.header = None;
        self.mode = TransferMode::Chunked;
        self.body = Body::Stream(stream);
        self.stream_ended = false;
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    fn prepare(&mut self) {
        if self.header.is_some() {
            return;
        }
        let mut out = Vec::new();
        let _ = write!(out, "HTTP/1.1 {}\r\n", self.status);
        for (name, value) in &self.fields {
            let _ = write!(out, "{name}: {value}\r\n");
        }
        if !self.keep_alive && self.mode != TransferMode::NoBody {
            out.extend_from_slice(b"Connection: close\r\n");
        }
        match (&self.mode, &self.body) {
            (TransferMode::Normal, Body::Owned(body)) => {
                let _ = write!(out, "Content-Length: {}\r\n", body.len());
            }
            (TransferMode::Chunked, _) => {
                out.extend_from_slice(b"Transfer-Encoding: chunked\r\n");
            }
            (TransferMode::NoBody, _) => {}
            (TransferMode::Normal, Body::Stream(_)) => {
                unreachable!("Normal mode never carries a streamed body");
            }
        }
        out.extend_from_slice(b"\r\n");
        self.header = Some(out);
    }

    /// Snapshots the currently prepared response. Errors if the body is
    /// stream-backed: a stream cannot be replayed from an owned snapshot.
    pub fn cache(&mut self) -> Result<CachedResponse, &'static str> {
        if matches!(self.body, Body::Stream(_)) {
            return Err("cannot cache a response with a stream-backed body");
        }
        self.prepare();
        let body = match &self.body {
            Body::Owned(b) => b.clone(),
            Body::Stream(_) => unreachable!(),
        };
        Ok(CachedResponse {
            header: self.header.clone().expect("prepared above"),
            body,
        })
    }

    /// Writes up to `max_write` bytes of this response to `out`, honoring
    /// the chunk-header reservation in `Chunked` mode. Returns
    /// `(done, bytes_written)`; `done` means the full response (header +
    /// body + terminal chunk, if any) has been flushed.
    pub fn flush(&mut self, out: &mut impl Write + Corked, max_write: usize) -> io::Result<(bool, usize)> {
        self.prepare();
        let mut budget = max_write;
        let mut written = 0;

        if let Some(header) = &self.header {
            if self.write_cursor < header.len() {
                let n = write_from(out, &header[self.write_cursor..], budget)?;
                self.write_cursor += n;
                written += n;
                budget -= n;
                if self.write_cursor < header.len() {
                    return Ok((false, written));
                }
            }
        }

        match self.mode {
            TransferMode::NoBody => Ok((true, written)),
            TransferMode::Normal => {
                let body_cursor = self.write_cursor - self.header.as_ref().unwrap().len();
                let Body::Owned(body) = &self.body else {
                    unreachable!()
                };
                if body_cursor < body.len() {
                    let n = write_from(out, &body[body_cursor..], budget)?;
                    self.write_cursor += n;
                    written += n;
                    if body_cursor + n < body.len() {
                        return Ok((false, written));
                    }
                }
                Ok((true, written))
            }
            TransferMode::Chunked => self.flush_chunked(out, budget, written),
        }
    }

    /// Errors with `InvalidData` if a chunk's size is at or beyond
    /// `MAX_CHUNK_SIZE`, rather than framing a header the 16-byte
    /// reservation no longer documents as guaranteed to fit.
    fn flush_chunked(
        &mut self,
        out: &mut impl Write + Corked,
        mut budget: usize,
        mut written: usize,
    ) -> io::Result<(bool, usize)> {
        loop {
            if self.chunk.is_none() {
                if budget < CHUNK_HEADER_RESERVATION {
                    // Cannot guarantee the size-hex header fits; report
                    // incomplete so the caller treats this like a throttle
                    // stall rather than attempting a torn chunk header.
                    return Ok((false, written));
                }
                if self.stream_ended {
                    self.chunk = Some(ChunkCursor { data: Vec::new(), pos: 0 });
                } else {
                    let Body::Stream(stream) = &mut self.body else {
                        unreachable!("Chunked mode always carries a stream body")
                    };
                    match stream.next_chunk()? {
                        Some(data) if !data.is_empty() => {
                            if !chunk_size_in_bounds(data.len()) {
                                return Err(io::Error::new(
                                    io::ErrorKind::InvalidData,
                                    "chunk size exceeds the representable header reservation",
                                ));
                            }
                            self.chunk = Some(ChunkCursor { data, pos: 0 });
                        }
                        _ => {
                            self.stream_ended = true;
                            self.chunk = Some(ChunkCursor { data: Vec::new(), pos: 0 });
                        }
                    }
                }
            }

            let cursor = self.chunk.as_mut().unwrap();
            let framed = frame_chunk(&cursor.data);
            if cursor.pos == 0 {
                out.set_nodelay_for_cork(false).ok();
            }
            let n = write_from(out, &framed[cursor.pos..], budget)?;
            cursor.pos += n;
            written += n;
            budget -= n;

            if cursor.pos < framed.len() {
                return Ok((false, written));
            }

            let was_terminal = cursor.data.is_empty();
            self.chunk = None;
            out.set_nodelay_for_cork(true).ok();

            if was_terminal {
                return Ok((true, written));
            }
            if budget == 0 {
                return Ok((false, written));
            }
        }
    }
}

/// Frames `data` as `<hex-size>\r\n<data>\r\n`.
fn frame_chunk(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + CHUNK_HEADER_RESERVATION);
    let _ = write!(out, "{:x}\r\n", data.len());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out
}

/// Writes up to `budget` bytes of `data`, stopping short (never erroring) on
/// `WouldBlock` so the caller can park the channel in `WaitWritable` instead
/// of treating backpressure as a fatal I/O error. Mirrors `request.rs`'s
/// `fill` on the read side.
fn write_from(out: &mut impl Write, data: &[u8], budget: usize) -> io::Result<usize> {
    let target = data.len().min(budget);
    let mut written = 0;
    while written < target {
        match out.write(&data[written..target]) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(written)
}

/// TCP cork emulation: accumulate writes during a chunk, flush at its
/// boundary. Mapped onto `TcpStream::set_nodelay` (see `DESIGN.md`) since
/// this crate's socket trait does not expose raw `TCP_CORK`.
pub trait Corked {
    fn set_nodelay_for_cork(&self, nodelay: bool) -> io::Result<()>;
}

impl<T: crate::net::TcpStream> Corked for T {
    fn set_nodelay_for_cork(&self, nodelay: bool) -> io::Result<()> {
        self.set_nodelay(nodelay)
    }
}

impl Corked for Vec<u8> {
    fn set_nodelay_for_cork(&self, _nodelay: bool) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_only_response_matches_wire_bytes() {
        let mut resp = Response::new(Status::Ok, true);
        let mut out = Vec::new();
        let (done, _) = resp.flush(&mut out, 4096).unwrap();
        assert!(done);
        assert_eq!(out, b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    }

    #[test]
    fn normal_body_is_flushed_after_header() {
        let mut resp = Response::new(Status::Ok, true);
        resp.set_content(b"hi".to_vec());
        let mut out = Vec::new();
        let (done, _) = resp.flush(&mut out, 4096).unwrap();
        assert!(done);
        assert_eq!(out, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi");
    }

    struct VecStream {
        chunks: std::collections::VecDeque<Vec<u8>>,
    }
    impl InputStream for VecStream {
        fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
            Ok(self.chunks.pop_front())
        }
    }

    #[test]
    fn chunked_response_frames_each_chunk_and_terminal() {
        let mut resp = Response::new(Status::Ok, true);
        resp.set_stream(Box::new(VecStream {
            chunks: vec![b"<b>".to_vec(), b"hello ".to_vec(), b"world".to_vec(), b"</b>".to_vec()]
                .into(),
        }));
        let mut out = Vec::new();
        let (done, _) = resp.flush(&mut out, 1 << 20).unwrap();
        assert!(done);
        let header_end = out.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        assert_eq!(
            &out[header_end..],
            b"3\r\n<b>\r\n6\r\nhello \r\n5\r\nworld\r\n4\r\n</b>\r\n0\r\n\r\n"
        );
    }

    #[test]
    fn continue_100_has_no_body_or_content_length() {
        let mut resp = Response::continue_100();
        let mut out = Vec::new();
        let (done, _) = resp.flush(&mut out, 4096).unwrap();
        assert!(done);
        assert_eq!(out, b"HTTP/1.1 100 Continue\r\n\r\n");
    }

    #[test]
    fn cache_rejects_stream_backed_body() {
        let mut resp = Response::new(Status::Ok, true);
        resp.set_stream(Box::new(VecStream { chunks: Default::default() }));
        assert!(resp.cache().is_err());
    }

    #[test]
    fn cache_snapshots_independent_of_later_mutation() {
        let mut resp = Response::new(Status::Ok, true);
        resp.set_content(b"first".to_vec());
        let snapshot = resp.cache().unwrap();
        resp.set_content(b"second".to_vec());
        assert_eq!(snapshot.body, b"first".to_vec());
    }

    #[test]
    fn chunk_size_bounds_check_rejects_at_the_cap() {
        assert!(chunk_size_in_bounds((MAX_CHUNK_SIZE - 1) as usize));
        assert!(!chunk_size_in_bounds(MAX_CHUNK_SIZE as usize));
        assert!(!chunk_size_in_bounds(usize::MAX));
    }
}
