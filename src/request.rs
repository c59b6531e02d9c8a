//! A minimal, internal HTTP/1.1 request-line/header parser and the
//! incremental reader the [`crate::channel::Channel`] drives during its
//! `Read` stage.
//!
//! spec.md §1 treats the parser as an opaque external collaborator returning
//! `(method, uri, version, fields, cookies, body offset)`; this module is
//! that collaborator, kept intentionally small (no folded headers, no
//! request-target parsing beyond the raw token) rather than a
//! standards-exhaustive implementation — see
//! `examples/original_source/include/Request.h` (fixed `_header` buffer,
//! `GetField`) and `include/Lexer.h`/`include/Parser.h` (delimiter
//! tokenizing, case-insensitive field lookup) for the shape this follows.

use crate::buffer::RequestBuffer;
use crate::method::Method;
use crate::version::Version;
use std::io::{self, Read};

/// A fully parsed request head, plus any body bytes read so far.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub target: String,
    pub version: Version,
    fields: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    /// Looks up a header field, case-insensitively, returning the first
    /// match (per RFC 9110, field names are case-insensitive).
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Looks up a cookie by name from any `Cookie:` field(s) on the request.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The names of every cookie sent on this request.
    pub fn cookie_names(&self) -> impl Iterator<Item = &str> {
        self.cookies.iter().map(|(k, _)| k.as_str())
    }

    /// `Content-Length`, if present and well-formed. A request with a
    /// `Transfer-Encoding: chunked` field instead has no declared length;
    /// see [`Request::has_chunked_body`].
    pub fn content_length(&self) -> Option<usize> {
        self.field("content-length").and_then(|v| v.trim().parse().ok())
    }

    /// Whether the request declares a chunked body. Chunked *request*
    /// decoding is a non-goal; the channel rejects these with a 500.
    pub fn has_chunked_body(&self) -> bool {
        self.field("transfer-encoding")
            .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
    }

    /// Whether the client sent `Expect: 100-continue`.
    pub fn wants_100_continue(&self) -> bool {
        self.field("expect").is_some_and(|v| v.eq_ignore_ascii_case("100-continue"))
    }

    /// Resolves keep-alive per RFC 9110 §9.3/Connection field semantics:
    /// HTTP/1.1 defaults to persistent, HTTP/1.0 does not; either is
    /// overridden by an explicit `Connection` field.
    pub fn keep_alive(&self) -> bool {
        match self.field("connection") {
            Some(v) if v.eq_ignore_ascii_case("close") => false,
            Some(v) if v.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.version.keeps_alive_by_default(),
        }
    }
}

/// Outcome of attempting to parse the header out of a byte slice.
enum HeadParse {
    /// Not enough bytes yet; keep reading.
    Incomplete,
    /// Header terminator found; parsed request plus the number of header
    /// bytes consumed (including the trailing blank line).
    Complete(Request, usize),
    /// The bytes present can never form a valid request head.
    Invalid(&'static str),
}

fn parse_head(bytes: &[u8]) -> HeadParse {
    let Some(term) = find(bytes, b"\r\n\r\n") else {
        return HeadParse::Incomplete;
    };
    let head = &bytes[..term];
    let mut lines = head.split(|&b| b == b'\n').map(|l| l.strip_suffix(b"\r").unwrap_or(l));

    let Some(request_line) = lines.next() else {
        return HeadParse::Invalid("missing request line");
    };
    let mut parts = request_line.split(|&b| b == b' ').filter(|p| !p.is_empty());
    let (Some(method_tok), Some(target_tok), Some(version_tok)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return HeadParse::Invalid("malformed request line");
    };
    let Some(method) = Method::parse(method_tok) else {
        return HeadParse::Invalid("unsupported method");
    };
    let Some(version) = Version::parse(version_tok) else {
        return HeadParse::Invalid("unsupported version");
    };
    let target = String::from_utf8_lossy(target_tok).into_owned();

    let mut fields = Vec::new();
    let mut cookies = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some(colon) = line.iter().position(|&b| b == b':') else {
            return HeadParse::Invalid("malformed header field");
        };
        let name = String::from_utf8_lossy(&line[..colon]).trim().to_string();
        let value = String::from_utf8_lossy(&line[colon + 1..]).trim().to_string();

        if name.eq_ignore_ascii_case("cookie") {
            for pair in value.split(';') {
                let pair = pair.trim();
                if let Some((k, v)) = pair.split_once('=') {
                    cookies.push((k.trim().to_string(), v.trim().to_string()));
                }
            }
        }
        fields.push((name, value));
    }

    let request = Request {
        method,
        target,
        version,
        fields,
        cookies,
        body: Vec::new(),
    };
    HeadParse::Complete(request, term + 4)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Internal stage of [`RequestParser`], mirroring the two opaque operations
/// spec.md §4.E's Read sub-protocol calls: `consume_header`/`consume_content`.
enum Stage {
    Header,
    Content { remaining: usize },
    Done,
}

/// Incrementally reads and parses one request off a non-blocking stream,
/// reused across keep-alive requests via [`RequestParser::reset`].
pub struct RequestParser {
    buffer: RequestBuffer,
    stage: Stage,
    request: Option<Request>,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            buffer: RequestBuffer::default(),
            stage: Stage::Header,
            request: None,
        }
    }

    /// Reads up to `max` bytes from `stream` and attempts to complete the
    /// request head. Returns `(done, bytes_read)`; `bytes_read` is always
    /// reported, even when not `done`, so the caller can charge throttlers
    /// for it regardless of parse outcome.
    pub fn consume_header(&mut self, stream: &mut impl Read, max: usize) -> io::Result<(bool, usize)> {
        let read = self.fill(stream, max)?;
        match parse_head(self.buffer.readable()) {
            HeadParse::Incomplete => Ok((false, read)),
            HeadParse::Invalid(reason) => Err(io::Error::new(io::ErrorKind::InvalidData, reason)),
            HeadParse::Complete(request, consumed) => {
                self.buffer.mark_read(consumed);
                let remaining = request.content_length().unwrap_or(0);
                self.request = Some(request);
                self.stage = if remaining == 0 {
                    Stage::Done
                } else {
                    Stage::Content { remaining }
                };
                // The header itself is fully parsed regardless of whether a
                // body remains to be fetched separately.
                Ok((true, read))
            }
        }
    }

    /// Reads up to `max` bytes of body content. Returns `(done, bytes_read)`
    /// where `done` means the declared `Content-Length` has been fully
    /// consumed.
    pub fn consume_content(&mut self, stream: &mut impl Read, max: usize) -> io::Result<(bool, usize)> {
        let Stage::Content { remaining } = &mut self.stage else {
            return Ok((true, 0));
        };
        let want = max.min(*remaining);
        let read = self.fill(stream, want)?;
        let take = self.buffer.remaining().min(*remaining);
        if let Some(request) = &mut self.request {
            request.body.extend_from_slice(&self.buffer.readable()[..take]);
        }
        self.buffer.mark_read(take);
        *remaining -= take;
        if *remaining == 0 {
            self.stage = Stage::Done;
        }
        Ok((matches!(self.stage, Stage::Done), read))
    }

    /// Whether the full request (head, and body if any) has been read.
    pub fn is_done(&self) -> bool {
        matches!(self.stage, Stage::Done)
    }

    /// Whether the request head has been parsed. A processor may run while
    /// this is true but the body is still outstanding (spec.md §4.E
    /// `FetchContent`), reading the head's fields before the body arrives.
    pub fn header_ready(&self) -> bool {
        self.request.is_some()
    }

    /// Borrows the request once its header has been parsed, regardless of
    /// whether the body has finished arriving.
    pub fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    /// Takes the parsed request, if complete.
    pub fn take(&mut self) -> Option<Request> {
        if self.is_done() {
            self.request.take()
        } else {
            None
        }
    }

    /// Resets internal state for the next request on a kept-alive
    /// connection.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.stage = Stage::Header;
        self.request = None;
    }

    fn fill(&mut self, stream: &mut impl Read, max: usize) -> io::Result<usize> {
        if max == 0 {
            return Ok(0);
        }
        let space = self.buffer.writable_mut();
        let want = space.len().min(max);
        match stream.read(&mut space[..want]) {
            Ok(0) => Ok(0),
            Ok(n) => {
                self.buffer.mark_written(n);
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_header_only_request() {
        let mut parser = RequestParser::new();
        let mut stream = Cursor::new(b"GET /x HTTP/1.1\r\nHost: h\r\n\r\n".to_vec());
        let (done, n) = parser.consume_header(&mut stream, 4096).unwrap();
        assert!(done);
        assert_eq!(n, 29);
        let req = parser.take().unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.target, "/x");
        assert_eq!(req.version, Version::H1_1);
        assert_eq!(req.field("host"), Some("h"));
    }

    #[test]
    fn reports_incomplete_on_partial_header() {
        let mut parser = RequestParser::new();
        let mut stream = Cursor::new(b"GET / HTTP/1.1\r\nHost: h\r\n".to_vec());
        let (done, _) = parser.consume_header(&mut stream, 4096).unwrap();
        assert!(!done);
        assert!(parser.take().is_none());
    }

    #[test]
    fn reads_declared_content_length_body() {
        let mut parser = RequestParser::new();
        let mut stream = Cursor::new(
            b"POST / HTTP/1.1\r\nContent-Length: 13\r\n\r\nRequest body!".to_vec(),
        );
        let (done, _) = parser.consume_header(&mut stream, 4096).unwrap();
        assert!(done);
        let (done, _) = parser.consume_content(&mut stream, 4096).unwrap();
        assert!(done);
        let req = parser.take().unwrap();
        assert_eq!(req.body, b"Request body!");
    }

    #[test]
    fn parses_cookie_pairs() {
        let mut parser = RequestParser::new();
        let mut stream =
            Cursor::new(b"GET / HTTP/1.1\r\nCookie: a=1; b=2\r\n\r\n".to_vec());
        parser.consume_header(&mut stream, 4096).unwrap();
        let req = parser.take().unwrap();
        assert_eq!(req.cookie("a"), Some("1"));
        assert_eq!(req.cookie("b"), Some("2"));
    }

    #[test]
    fn rejects_chunked_request_body() {
        let mut parser = RequestParser::new();
        let mut stream = Cursor::new(
            b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec(),
        );
        parser.consume_header(&mut stream, 4096).unwrap();
        let req = parser.take().unwrap();
        assert!(req.has_chunked_body());
    }

    #[test]
    fn detects_100_continue() {
        let mut parser = RequestParser::new();
        let mut stream = Cursor::new(
            b"POST / HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 0\r\n\r\n".to_vec(),
        );
        parser.consume_header(&mut stream, 4096).unwrap();
        let req = parser.take().unwrap();
        assert!(req.wants_100_continue());
    }
}
