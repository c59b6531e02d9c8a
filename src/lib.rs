//! An embeddable HTTP/1.1 connection orchestration core.
//!
//! A caller supplies a channel factory (any `Fn(SocketAddr) -> H` where `H:
//! Handler`) to [`Server::start`]; the core then owns accepting connections,
//! driving each through a read/process/write state machine on non-blocking
//! sockets, multiplexing readiness via a single edge-triggered notifier,
//! dispatching work onto a bounded worker pool, and enforcing per-channel
//! and server-wide byte throttling. See `DESIGN.md` for how each module
//! maps onto the original C++ implementation this crate's behavior is
//! grounded on.

pub mod acceptor;
pub mod buffer;
pub mod channel;
pub mod cookie;
pub mod error;
pub mod method;
pub mod net;
pub mod notifier;
pub mod orchestrator;
pub mod pool;
pub mod profiler;
pub mod request;
pub mod response;
pub mod server;
pub mod status;
pub mod throttle;
pub mod version;

pub use channel::{Channel, Control, EventMask, Handler, Stage};
pub use error::{Error, Result};
pub use method::Method;
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorHandle, ThrottleSpec};
pub use request::Request;
pub use response::Response;
pub use server::{Server, ServerConfig};
pub use status::Status;
pub use version::Version;
