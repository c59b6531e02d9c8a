//! The per-connection state machine.
//!
//! Grounded on `examples/original_source/src/ChannelBase.cc` (the most
//! complete of the three historical C++ revisions in `original_source` —
//! `Channel`, `AbstractChannel`, `ChannelBase` — and the one
//! `Orchestrator.cc` actually drives): `Advance`/`OnRead`/`OnProcess`/
//! `OnWrite`/`Close` map onto [`Channel::advance`] and its `do_read`/
//! `do_process`/`do_write` helpers below.

use crate::error::Error;
use crate::net::TcpStream;
use crate::profiler::Profiler;
use crate::request::{Request, RequestParser};
use crate::response::{Corked, Response};
use crate::status::Status;
use crate::throttle::ThrottlerGroup;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Closed enumeration of a channel's state machine (spec.md §3 "Stage").
/// `Closed` is terminal; every other transition is driven by
/// [`Channel::advance`] or [`Channel::handle_event`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    WaitReadable = 0,
    ReadTimeout = 1,
    Read = 2,
    Process = 3,
    WaitWritable = 4,
    WriteTimeout = 5,
    Write = 6,
    Closed = 7,
}

impl Stage {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::WaitReadable,
            1 => Self::ReadTimeout,
            2 => Self::Read,
            3 => Self::Process,
            4 => Self::WaitWritable,
            5 => Self::WriteTimeout,
            6 => Self::Write,
            _ => Self::Closed,
        }
    }
}

/// Lock-free stage cell so the orchestrator and notifier may inspect a
/// channel's stage without entering its per-task mutex (spec.md §5 "Shared
/// resources").
#[derive(Debug)]
pub struct AtomicStage(AtomicU8);

impl AtomicStage {
    fn new(stage: Stage) -> Self {
        Self(AtomicU8::new(stage as u8))
    }

    pub fn load(&self) -> Stage {
        Stage::from_u8(self.0.load(Ordering::Acquire))
    }

    fn store(&self, stage: Stage) {
        self.0.store(stage as u8, Ordering::Release);
    }
}

/// The set of OS-level readiness conditions the notifier reports for one
/// stream (spec.md §4.B).
#[derive(Debug, Clone, Copy, Default)]
pub struct EventMask {
    pub readable: bool,
    pub writable: bool,
    /// Peer shutdown, hangup, or error — `mio`'s read-closed / write-closed
    /// / error flags coalesced (see `SPEC_FULL.md` §4.B).
    pub completion: bool,
}

/// The directive a [`Handler`] returns from [`Handler::process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// The response is ready; transition to `Write`.
    SendResponse,
    /// The request body has not been fetched yet; fetch it (via
    /// `100-continue` first if the client asked for it) then call
    /// `process` again.
    FetchContent,
    /// Refuse to read the body: a `417` if the client used
    /// `Expect: 100-continue`, otherwise an immediate close.
    RejectContent,
}

/// User-supplied per-channel request processor, produced by the server's
/// channel factory for each accepted connection. Grounded on
/// `examples/original_source/include/ChannelFactory.h`'s closure-producing
/// factory — a channel's single virtual `Process()` hook becomes a trait
/// object / closure here rather than a subclass.
pub trait Handler: Send {
    fn process(&mut self, request: &Request, response: &mut Response) -> Control;
}

impl<F> Handler for F
where
    F: FnMut(&Request, &mut Response) -> Control + Send,
{
    fn process(&mut self, request: &Request, response: &mut Response) -> Control {
        self(request, response)
    }
}

/// A single connection: owned socket, in-progress request/response, stage,
/// and throttle state (spec.md §3 "Channel").
pub struct Channel<S, H> {
    id: u64,
    stream: S,
    handler: H,
    parser: RequestParser,
    response: Option<Response>,
    stage: AtomicStage,
    requested_wake: Mutex<Instant>,
    read_throttles: ThrottlerGroup,
    write_throttles: ThrottlerGroup,
    force_close: bool,
    /// Set only while a `100 Continue` response is being flushed, so the
    /// Write sub-protocol knows to loop back into `Read` for the body
    /// rather than treating the flush as the final response.
    awaiting_continue: bool,
    /// When `false` (the default), a processor is invoked even before the
    /// body has arrived and must explicitly return `FetchContent`
    /// (spec.md §8 Scenario 2). When `true`, the channel emits
    /// `FetchContent` itself without calling the processor.
    pub auto_fetch_content: bool,
    profiler: Option<Arc<Profiler>>,
}

impl<S, H> Channel<S, H>
where
    S: TcpStream + Corked,
    H: Handler,
{
    pub fn new(id: u64, stream: S, handler: H, read_throttles: ThrottlerGroup, write_throttles: ThrottlerGroup) -> Self {
        Self {
            id,
            stream,
            handler,
            parser: RequestParser::new(),
            response: None,
            stage: AtomicStage::new(Stage::WaitReadable),
            requested_wake: Mutex::new(Instant::now()),
            read_throttles,
            write_throttles,
            force_close: false,
            awaiting_continue: false,
            auto_fetch_content: false,
            profiler: None,
        }
    }

    /// Attaches an event profiler (spec.md §4.H), so the channel's stage
    /// transitions show up alongside the orchestrator's own
    /// `Orchestrator*` events.
    pub fn with_profiler(mut self, profiler: Arc<Profiler>) -> Self {
        self.profiler = Some(profiler);
        self
    }

    fn record(&self, event: &'static str) {
        if let Some(profiler) = &self.profiler {
            profiler.record(event, self.id.to_string());
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn stage(&self) -> Stage {
        self.stage.load()
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Forces the channel directly to `Closed`, bypassing the normal
    /// stage machine. Used by the orchestrator when a channel has reached
    /// its inactivity timeout while waiting (spec.md §4.F `Task::Activate`).
    pub fn close(&mut self) {
        self.stage.store(Stage::Closed);
        self.record("ChannelClosed");
    }

    /// The earliest instant this channel has asked to be woken, used by the
    /// orchestrator's latest-allowed-wakeup computation.
    pub fn requested_wake(&self) -> Instant {
        *self.requested_wake.lock().unwrap()
    }

    fn set_wake(&self, at: Instant) {
        *self.requested_wake.lock().unwrap() = at;
    }

    /// Called by the orchestrator's event dispatch: transitions
    /// `WaitReadable`/`WaitWritable` into `Read`/`Write` on a matching
    /// event, or closes on `Completion`. A mismatched event (e.g. a write
    /// event while waiting to read) is logged and otherwise ignored —
    /// mirrors `ChannelBase::HandleControlDirective`'s "this should not
    /// happen, but don't crash" branch.
    pub fn handle_event(&mut self, events: EventMask) {
        if events.completion {
            self.stage.store(Stage::Closed);
            self.record("ChannelCompleted");
            return;
        }
        match (self.stage(), events.readable, events.writable) {
            (Stage::WaitReadable, true, _) => {
                self.stage.store(Stage::Read);
                self.record("ChannelReadable");
            }
            (Stage::WaitWritable, _, true) => {
                self.stage.store(Stage::Write);
                self.record("ChannelWritable");
            }
            (stage, _, _) => {
                tracing::warn!(channel = self.id, ?stage, ?events, "event did not match waiting stage");
            }
        }
    }

    /// Whether the channel has been waiting in `WaitReadable`/`WaitWritable`
    /// longer than `inactivity_timeout`, counted from `last_active`.
    pub fn reached_inactivity_timeout(&self, last_active: Instant, inactivity_timeout: std::time::Duration) -> bool {
        matches!(self.stage(), Stage::WaitReadable | Stage::WaitWritable) && last_active.elapsed() >= inactivity_timeout
    }

    /// Drives the state machine forward until it lands on a stage that must
    /// wait for an external event, a throttle refill, or is terminally
    /// `Closed`. Any I/O error is logged and closes the channel, matching
    /// spec.md §4.E "Error semantics".
    pub fn advance(&mut self) -> Result<(), Error> {
        loop {
            let outcome = match self.stage() {
                Stage::Read | Stage::ReadTimeout => self.do_read(),
                Stage::Process => {
                    self.do_process();
                    Ok(true)
                }
                Stage::Write | Stage::WriteTimeout => self.do_write(),
                _ => return Ok(()),
            };
            match outcome {
                Ok(true) => continue,
                Ok(false) => return Ok(()),
                Err(e) => {
                    tracing::debug!(channel = self.id, error = %e, "closing channel after I/O error");
                    self.stage.store(Stage::Closed);
                    self.record("ChannelClosed");
                    return Ok(());
                }
            }
        }
    }

    fn do_read(&mut self) -> std::io::Result<bool> {
        self.record("ChannelReading");
        let max_read = self.read_throttles.effective_quota();
        let min_cap = self.read_throttles.effective_capacity();
        if max_read < min_cap {
            self.stage.store(Stage::ReadTimeout);
            self.set_wake(self.read_throttles.fill_time(min_cap));
            return Ok(false);
        }

        let (done, consumed) = if !self.parser.header_ready() {
            self.parser.consume_header(&mut self.stream, max_read)?
        } else {
            self.parser.consume_content(&mut self.stream, max_read)?
        };
        self.read_throttles.consume(consumed);

        if done {
            self.stage.store(Stage::Process);
            return Ok(true);
        }
        if consumed < max_read {
            self.stage.store(Stage::WaitReadable);
            self.record("ChannelWaitReadable");
        } else {
            self.stage.store(Stage::ReadTimeout);
            let dedicated = &self.read_throttles.dedicated;
            self.set_wake(dedicated.fill_time(dedicated.capacity()));
        }
        Ok(false)
    }

    fn do_process(&mut self) {
        self.record("ChannelProcessing");
        let request = self.parser.request().expect("header parsed before Process").clone();

        if request.has_chunked_body() {
            tracing::debug!(channel = self.id, "rejecting request with chunked body");
            self.respond_error(Status::InternalServerError, false);
            self.force_close = true;
            self.stage.store(Stage::Write);
            return;
        }

        let body_missing = !self.parser.is_done();
        let control = if self.auto_fetch_content && body_missing {
            Control::FetchContent
        } else {
            let mut response = Response::new(Status::Ok, request.keep_alive());
            match catch_unwind(AssertUnwindSafe(|| self.handler.process(&request, &mut response))) {
                Ok(control) => {
                    self.response = Some(response);
                    control
                }
                Err(_) => {
                    tracing::debug!(channel = self.id, "processor panicked");
                    self.respond_error(Status::InternalServerError, false);
                    self.force_close = true;
                    self.stage.store(Stage::Write);
                    return;
                }
            }
        };

        match control {
            Control::SendResponse => self.stage.store(Stage::Write),
            Control::FetchContent => {
                if request.wants_100_continue() {
                    self.response = Some(Response::continue_100());
                    self.awaiting_continue = true;
                    self.stage.store(Stage::Write);
                } else {
                    self.stage.store(Stage::Read);
                }
            }
            Control::RejectContent => {
                if request.wants_100_continue() {
                    self.respond_error(Status::ExpectationFailed, false);
                    self.force_close = true;
                    self.stage.store(Stage::Write);
                } else {
                    self.force_close = true;
                    self.stage.store(Stage::Closed);
                }
            }
        }
    }

    fn respond_error(&mut self, status: Status, keep_alive: bool) {
        let mut resp = Response::new(status, keep_alive);
        resp.set_content(Vec::new());
        self.response = Some(resp);
    }

    fn do_write(&mut self) -> std::io::Result<bool> {
        self.record("ChannelWriting");
        let max_write = self.write_throttles.effective_quota();
        let min_cap = self.write_throttles.effective_capacity();
        if max_write < min_cap {
            self.stage.store(Stage::WriteTimeout);
            self.set_wake(self.write_throttles.fill_time(min_cap));
            return Ok(false);
        }

        let keep_alive = {
            let response = self.response.as_mut().expect("response set before Write");
            let (done, written) = response.flush(&mut self.stream, max_write)?;
            self.write_throttles.consume(written);
            if !done {
                if written < max_write {
                    self.stage.store(Stage::WaitWritable);
                    self.record("ChannelWaitWritable");
                } else {
                    self.stage.store(Stage::WriteTimeout);
                    let dedicated = &self.write_throttles.dedicated;
                    self.set_wake(dedicated.fill_time(dedicated.capacity()));
                }
                return Ok(false);
            }
            response.keep_alive()
        };
        self.record("ChannelWritten");

        if self.force_close {
            self.stage.store(Stage::Closed);
            self.record("ChannelClosed");
        } else if self.awaiting_continue {
            self.awaiting_continue = false;
            self.response = None;
            self.stage.store(Stage::Read);
        } else if keep_alive {
            self.parser.reset();
            self.response = None;
            self.stage.store(Stage::Read);
        } else {
            self.stage.store(Stage::Closed);
            self.record("ChannelClosed");
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::throttle::Throttler;
    use std::io::{Read, Write};
    use std::sync::Arc;

    /// An in-memory duplex stream standing in for a non-blocking socket in
    /// tests (`io::Cursor` can't model a half-open read/write pair).
    struct MemoryStream {
        inbound: std::io::Cursor<Vec<u8>>,
        outbound: Vec<u8>,
    }

    impl MemoryStream {
        fn new(inbound: &[u8]) -> Self {
            Self { inbound: std::io::Cursor::new(inbound.to_vec()), outbound: Vec::new() }
        }
    }

    impl Read for MemoryStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.inbound.read(buf)?;
            if n == 0 {
                Err(std::io::Error::from(std::io::ErrorKind::WouldBlock))
            } else {
                Ok(n)
            }
        }
    }

    impl Write for MemoryStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.outbound.write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl TcpStream for MemoryStream {
        fn connect(_addr: std::net::SocketAddr) -> std::io::Result<Self> {
            unimplemented!()
        }
        fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
            Ok("127.0.0.1:0".parse().unwrap())
        }
        fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
            Ok("127.0.0.1:0".parse().unwrap())
        }
        fn shutdown(&self, _how: std::net::Shutdown) -> std::io::Result<()> {
            Ok(())
        }
        fn set_nodelay(&self, _nodelay: bool) -> std::io::Result<()> {
            Ok(())
        }
        fn nodelay(&self) -> std::io::Result<bool> {
            Ok(true)
        }
        fn set_ttl(&self, _ttl: u32) -> std::io::Result<()> {
            Ok(())
        }
        fn ttl(&self) -> std::io::Result<u32> {
            Ok(64)
        }
        fn take_error(&self) -> std::io::Result<Option<std::io::Error>> {
            Ok(None)
        }
        fn peek(&self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Ok(0)
        }
    }

    fn unlimited_throttles() -> (ThrottlerGroup, ThrottlerGroup) {
        let master_r = Arc::new(Throttler::disabled());
        let master_w = Arc::new(Throttler::disabled());
        (
            ThrottlerGroup::new(Throttler::disabled(), master_r),
            ThrottlerGroup::new(Throttler::disabled(), master_w),
        )
    }

    #[test]
    fn header_only_get_yields_200_ok() {
        let stream = MemoryStream::new(b"GET /x HTTP/1.1\r\nHost: h\r\n\r\n");
        let (rt, wt) = unlimited_throttles();
        let mut channel = Channel::new(1, stream, |_req: &Request, resp: &mut Response| {
            resp.set_content(Vec::new());
            Control::SendResponse
        }, rt, wt);

        channel.handle_event(EventMask { readable: true, ..Default::default() });
        channel.advance().unwrap();

        assert_eq!(channel.stage(), Stage::Read);
        assert_eq!(channel.stream().outbound, b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    }

    #[test]
    fn post_fetches_body_then_responds() {
        let stream = MemoryStream::new(
            b"POST / HTTP/1.1\r\nContent-Length: 13\r\n\r\nRequest body!",
        );
        let (rt, wt) = unlimited_throttles();
        let seen_body = Arc::new(Mutex::new(Vec::new()));
        let seen_body_clone = seen_body.clone();
        let mut calls = 0;
        let mut channel = Channel::new(
            2,
            stream,
            move |req: &Request, resp: &mut Response| {
                calls += 1;
                if req.body.is_empty() {
                    Control::FetchContent
                } else {
                    *seen_body_clone.lock().unwrap() = req.body.clone();
                    resp.set_content(Vec::new());
                    Control::SendResponse
                }
            },
            rt,
            wt,
        );

        channel.handle_event(EventMask { readable: true, ..Default::default() });
        channel.advance().unwrap();

        assert_eq!(*seen_body.lock().unwrap(), b"Request body!");
        assert_eq!(channel.stream().outbound, b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    }

    #[test]
    fn hundred_continue_precedes_body_read() {
        let stream = MemoryStream::new(
            b"POST / HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 5\r\n\r\nhello",
        );
        let (rt, wt) = unlimited_throttles();
        let mut channel = Channel::new(
            3,
            stream,
            |req: &Request, resp: &mut Response| {
                if req.body.is_empty() {
                    Control::FetchContent
                } else {
                    resp.set_content(Vec::new());
                    Control::SendResponse
                }
            },
            rt,
            wt,
        );

        channel.handle_event(EventMask { readable: true, ..Default::default() });
        channel.advance().unwrap();

        assert!(channel.stream().outbound.starts_with(b"HTTP/1.1 100 Continue\r\n\r\n"));
    }

    #[test]
    fn idle_channel_times_out_without_writing() {
        let stream = MemoryStream::new(b"");
        let (rt, wt) = unlimited_throttles();
        let channel: Channel<_, fn(&Request, &mut Response) -> Control> =
            Channel::new(4, stream, |_: &Request, _: &mut Response| Control::SendResponse, rt, wt);
        let last_active = Instant::now() - std::time::Duration::from_millis(200);
        assert!(channel.reached_inactivity_timeout(last_active, std::time::Duration::from_millis(100)));
        assert!(channel.stream().outbound.is_empty());
    }
}
