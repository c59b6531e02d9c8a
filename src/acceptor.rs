//! Multi-listener socket acceptor.
//!
//! Grounded on `examples/original_source/include/Acceptor.h` /
//! `src/Acceptor.cc`: each of `listeners` threads owns one bound, blocking
//! `std::net::TcpListener` and loops on `accept()`; a single dispatcher
//! thread drains a mutex+semaphore queue of accepted sockets and calls
//! `relinquish(stream, addr)` for each. The transient-`errno` ignore list is
//! carried over verbatim from `Acceptor.cc`'s `ignored` array so a single
//! flaky `accept` doesn't bring the whole listener down.

use crate::error::Error;
use crate::profiler::Profiler;
use socket2::{Domain, Socket, Type};
use std::collections::VecDeque;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

/// `errno` values `Acceptor::AcceptLoop` treats as transient and retries
/// past, rather than tearing the listener down.
fn is_transient(err: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    if matches!(err.kind(), ConnectionAborted | WouldBlock | Interrupted) {
        return true;
    }
    #[cfg(unix)]
    {
        matches!(
            err.raw_os_error(),
            Some(libc::EMFILE)
                | Some(libc::ENFILE)
                | Some(libc::ENOBUFS)
                | Some(libc::ENOMEM)
                | Some(libc::EPROTO)
                | Some(libc::EPERM)
        )
    }
    #[cfg(not(unix))]
    {
        false
    }
}

struct Queue {
    items: Mutex<VecDeque<(TcpStream, SocketAddr)>>,
    cond: Condvar,
}

impl Queue {
    fn new() -> Self {
        Self { items: Mutex::new(VecDeque::new()), cond: Condvar::new() }
    }

    fn push(&self, item: (TcpStream, SocketAddr)) {
        self.items.lock().unwrap().push_back(item);
        self.cond.notify_one();
    }

    fn pop(&self) -> Option<(TcpStream, SocketAddr)> {
        let mut items = self.items.lock().unwrap();
        loop {
            if let Some(item) = items.pop_front() {
                return Some(item);
            }
            items = self.cond.wait(items).unwrap();
        }
    }

    fn wake_all(&self) {
        self.cond.notify_all();
    }
}

fn bind_listener(addr: SocketAddr, reuseport: bool) -> std::io::Result<TcpListener> {
    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    if reuseport {
        socket.set_reuse_port(true)?;
    }
    socket.set_nonblocking(false)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    Ok(socket.into())
}

/// N-threaded accept loop feeding a single dispatcher, matching
/// `Acceptor`'s accept/dispatch split (spec.md §4.D).
pub struct Acceptor {
    queue: Arc<Queue>,
    stop: Arc<AtomicBool>,
    listener_handles: Vec<JoinHandle<()>>,
    dispatch_handle: Option<JoinHandle<()>>,
    failure: Arc<Mutex<Option<std::io::Error>>>,
}

impl Acceptor {
    /// Binds `listeners` sockets at `addr` (using `SO_REUSEPORT` when more
    /// than one) and starts accepting. `relinquish` is invoked from a single
    /// dispatcher thread for every accepted connection, in acceptance
    /// order; a panic inside `relinquish` is caught and logged, matching
    /// `DispatchLoop`'s `catch (...)` guard around `RelinquishSocket`.
    pub fn start(
        addr: SocketAddr,
        listeners: usize,
        relinquish: impl FnMut(TcpStream, SocketAddr) + Send + 'static,
    ) -> Result<Self, Error> {
        Self::start_with_profiler(addr, listeners, relinquish, None)
    }

    /// As [`Acceptor::start`], additionally recording `SocketQueued`/
    /// `SocketDequeued` events (spec.md §4.H) against `profiler`, if given.
    pub fn start_with_profiler(
        addr: SocketAddr,
        listeners: usize,
        mut relinquish: impl FnMut(TcpStream, SocketAddr) + Send + 'static,
        profiler: Option<Arc<Profiler>>,
    ) -> Result<Self, Error> {
        let listeners = listeners.max(1);
        let queue = Arc::new(Queue::new());
        let stop = Arc::new(AtomicBool::new(false));
        let failure: Arc<Mutex<Option<std::io::Error>>> = Arc::new(Mutex::new(None));

        let mut sockets = Vec::with_capacity(listeners);
        for _ in 0..listeners {
            sockets.push(bind_listener(addr, listeners > 1).map_err(Error::Io)?);
        }

        let mut listener_handles = Vec::with_capacity(listeners);
        for socket in sockets {
            let queue = queue.clone();
            let stop = stop.clone();
            let failure = failure.clone();
            let profiler = profiler.clone();
            listener_handles.push(std::thread::spawn(move || {
                loop {
                    if stop.load(Ordering::Acquire) {
                        return;
                    }
                    match socket.accept() {
                        Ok((stream, peer)) => {
                            if let Some(profiler) = &profiler {
                                profiler.record("SocketQueued", peer.to_string());
                            }
                            queue.push((stream, peer));
                        }
                        Err(e) => {
                            if stop.load(Ordering::Acquire) {
                                return;
                            }
                            if !is_transient(&e) {
                                *failure.lock().unwrap() = Some(e);
                                stop.store(true, Ordering::Release);
                                queue.wake_all();
                                return;
                            }
                        }
                    }
                }
            }));
        }

        let dispatch_stop = stop.clone();
        let dispatch_queue = queue.clone();
        let dispatch_profiler = profiler.clone();
        let dispatch_handle = std::thread::spawn(move || {
            let mut relinquish_one = |stream: TcpStream, addr: SocketAddr| {
                if let Some(profiler) = &dispatch_profiler {
                    profiler.record("SocketDequeued", addr.to_string());
                }
                let outcome =
                    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| relinquish(stream, addr)));
                if outcome.is_err() {
                    tracing::warn!("acceptor relinquish callback panicked; connection dropped");
                } else if let Some(profiler) = &dispatch_profiler {
                    profiler.record("SocketAccepted", addr.to_string());
                }
            };
            loop {
                if dispatch_stop.load(Ordering::Acquire) {
                    let mut items = dispatch_queue.items.lock().unwrap();
                    if items.is_empty() {
                        return;
                    }
                    while let Some((stream, addr)) = items.pop_front() {
                        drop(items);
                        relinquish_one(stream, addr);
                        items = dispatch_queue.items.lock().unwrap();
                    }
                    return;
                }
                match dispatch_queue.pop() {
                    Some((stream, addr)) => relinquish_one(stream, addr),
                    None => continue,
                }
            }
        });

        Ok(Self {
            queue,
            stop,
            listener_handles,
            dispatch_handle: Some(dispatch_handle),
            failure,
        })
    }

    /// Requests every listener and the dispatcher to stop, then joins them.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.queue.wake_all();
        for handle in self.listener_handles.drain(..) {
            let _ = handle.join();
        }
        if let Some(handle) = self.dispatch_handle.take() {
            let _ = handle.join();
        }
    }

    /// Returns the non-transient error that stopped the acceptor, if any.
    pub fn take_failure(&self) -> Option<Error> {
        self.failure.lock().unwrap().take().map(Error::AcceptorFailed)
    }
}

impl Drop for Acceptor {
    fn drop(&mut self) {
        self.stop();
    }
}
