//! Binds an [`Acceptor`] to an [`Orchestrator`], the whole embeddable core's
//! public entry point.
//!
//! Grounded on `examples/original_source/include/HttpServer.h` /
//! `src/HttpServer.cc`: `HttpServer`'s constructor starts its orchestrator
//! and its `OnAccepted` override hands each accepted connection, switched to
//! non-blocking, straight to `_orchestrator->Add`. [`Server::start`] mirrors
//! that: `Acceptor::start`'s `relinquish` callback calls
//! [`Orchestrator::add`], and [`Server::stop`] tears down the acceptor before
//! the orchestrator so no new connection can be registered after the
//! orchestrator has begun shutting down.

use crate::acceptor::Acceptor;
use crate::channel::Handler;
use crate::error::Error;
use crate::orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorHandle, ThrottleSpec};
use crate::profiler::Profiler;
use std::net::SocketAddr;
use std::sync::Arc;

/// Tuning knobs for a [`Server`]: [`OrchestratorConfig`] plus the acceptor's
/// listener count (spec.md §4.D "N listener threads, one dispatcher").
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listeners: usize,
    pub orchestrator: OrchestratorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { listeners: 1, orchestrator: OrchestratorConfig::default() }
    }
}

/// A running HTTP/1.1 connection orchestration core bound to one address.
pub struct Server<H, F> {
    orchestrator: Orchestrator<H, F>,
    orchestrator_handle: Option<OrchestratorHandle>,
    acceptor: Option<Acceptor>,
}

impl<H, F> Server<H, F>
where
    H: Handler + 'static,
    F: Fn(SocketAddr) -> H + Send + Sync + 'static,
{
    /// Binds `addr`, starts the orchestrator's coordinator and notifier
    /// threads, then starts accepting connections. `factory` is called once
    /// per accepted connection to produce that channel's [`Handler`]
    /// (spec.md §3 "ChannelFactory").
    pub fn start(addr: SocketAddr, config: ServerConfig, factory: F) -> Result<Self, Error> {
        let orchestrator = Orchestrator::new(config.orchestrator, factory)?;
        let orchestrator_handle = orchestrator.start();

        let relinquish_orchestrator = orchestrator.clone();
        let profiler = Some(orchestrator.profiler());
        let acceptor = Acceptor::start_with_profiler(
            addr,
            config.listeners,
            move |stream, peer| {
                if let Err(e) = Self::relinquish(&relinquish_orchestrator, stream, peer) {
                    tracing::warn!(peer = %peer, error = %e, "failed to register accepted connection");
                }
            },
            profiler,
        )?;

        Ok(Self { orchestrator, orchestrator_handle: Some(orchestrator_handle), acceptor: Some(acceptor) })
    }

    fn relinquish(
        orchestrator: &Orchestrator<H, F>,
        stream: std::net::TcpStream,
        peer: SocketAddr,
    ) -> Result<(), Error> {
        stream.set_nonblocking(true).map_err(Error::Io)?;
        let stream = mio::net::TcpStream::from_std(stream);
        orchestrator.add(stream, peer)
    }

    /// The orchestrator's append-only event profiler (spec.md §4.H).
    pub fn profiler(&self) -> Arc<Profiler> {
        self.orchestrator.profiler()
    }

    /// Replaces the server-wide read throttle.
    pub fn throttle_read(&self, spec: ThrottleSpec) {
        self.orchestrator.set_read_throttle(spec);
    }

    /// Replaces the server-wide write throttle.
    pub fn throttle_write(&self, spec: ThrottleSpec) {
        self.orchestrator.set_write_throttle(spec);
    }

    pub fn set_inactivity_timeout(&self, timeout: std::time::Duration) {
        self.orchestrator.set_inactivity_timeout(timeout);
    }

    /// Stops accepting new connections, then stops the orchestrator,
    /// blocking until both have fully shut down.
    pub fn stop(&mut self) -> Result<(), Error> {
        if let Some(mut acceptor) = self.acceptor.take() {
            acceptor.stop();
            if let Some(err) = acceptor.take_failure() {
                tracing::warn!(error = %err, "acceptor stopped with a non-transient error");
            }
        }
        self.orchestrator.stop();
        if let Some(handle) = self.orchestrator_handle.take() {
            return handle.wait();
        }
        Ok(())
    }
}

impl<H, F> Drop for Server<H, F> {
    fn drop(&mut self) {
        if let Some(mut acceptor) = self.acceptor.take() {
            acceptor.stop();
        }
        self.orchestrator.stop();
        if let Some(handle) = self.orchestrator_handle.take() {
            let _ = handle.wait();
        }
    }
}
