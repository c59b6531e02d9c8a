//! Unified error type for fallible core operations.
//!
//! The original implementation classifies failures into transient-system,
//! fatal-system, protocol, user-processor, inactivity, and peer-closed kinds
//! (see `Log`/`SystemError` usage throughout `examples/original_source`).
//! Inactivity and peer-closed are silent by design and therefore never reach
//! this type; the remaining three map onto the variants below.

use thiserror::Error;

/// Errors surfaced from the orchestration core's fallible entry points.
#[derive(Debug, Error)]
pub enum Error {
    /// A fatal OS-level I/O failure. Transient errors (`WouldBlock`, and the
    /// acceptor's ignorable `errno` set) are handled internally and never
    /// constructed as this variant.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The wire bytes did not form a request this crate understands, or
    /// asked for something out of scope (e.g. a chunked request body).
    #[error("protocol error: {0}")]
    Protocol(&'static str),

    /// The user-supplied channel processor panicked while handling a
    /// request. Caught at the `Advance` boundary; the channel is closed with
    /// a 500 response if nothing has been written yet.
    #[error("request handler panicked")]
    HandlerPanicked,

    /// The worker pool has been stopped and can no longer accept work.
    #[error("worker pool is stopped")]
    PoolStopped,

    /// The readiness notifier failed in a way it cannot recover from
    /// (mirrors a non-recoverable `epoll_wait` failure).
    #[error("readiness notifier failed: {0}")]
    NotifierFailed(std::io::Error),

    /// The acceptor hit a non-transient `accept` failure and stopped.
    #[error("acceptor failed: {0}")]
    AcceptorFailed(std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
