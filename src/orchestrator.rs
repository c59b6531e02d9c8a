//! Task registry, event demultiplexing, readiness dispatch, and
//! garbage collection.
//!
//! Grounded on `examples/original_source/include/Orchestrator.h` /
//! `src/Orchestrator.cc` line for line: `Task::Activate` (this crate:
//! [`Orchestrator::activate`]), `GetLatestAllowedWakeup`
//! ([`Orchestrator::latest_allowed_wakeup`]), `CollectGarbage`
//! ([`Orchestrator::collect_garbage`]), `FilterReadyTasks`/
//! `AtLeastOneTaskIsReady` (rolled into [`Task::is_ready`] plus
//! [`Orchestrator::capture_tasks`]).
//!
//! The source's `Task` mixes a per-task `std::mutex` (serializing
//! `Advance`/event handling) with a `ChannelBase::_stage` that is a bare
//! `std::atomic<Stage>` sibling field, readable without the mutex. This
//! crate keeps the channel itself behind a single [`std::sync::Mutex`]
//! rather than reaching for unsafe interior mutability to reproduce the
//! lock-free read exactly; [`Orchestrator::latest_allowed_wakeup`] uses
//! `try_lock` when sampling a task's requested wake-up so the coordinator
//! never blocks on a task a worker is currently advancing — documented as a
//! deliberate simplification in `DESIGN.md`.
//!
//! Task ids double as `mio::Token`s, allocated from a [`slab::Slab`] the
//! same way the teacher's `Listener` keys its connection table off of one
//! (`src/listener.rs`), rather than pairing a separate counter with a
//! `HashMap`.

use crate::channel::{Channel, EventMask, Handler, Stage};
use crate::error::Error;
use crate::notifier::{Notifier, Want};
use crate::pool::WorkerPool;
use crate::profiler::Profiler;
use crate::throttle::{Throttler, ThrottlerGroup};

use mio::Token;
use slab::Slab;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// A token-bucket capacity/interval pair, used to configure the master and
/// dedicated throttlers a new channel is given.
#[derive(Debug, Clone, Copy)]
pub struct ThrottleSpec {
    pub capacity: usize,
    pub interval: Duration,
}

/// Tuning knobs for an [`Orchestrator`], split out from [`crate::server::ServerConfig`]
/// so the orchestrator can be driven directly (e.g. from tests) without an
/// [`crate::acceptor::Acceptor`] attached.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub workers: usize,
    pub upscale_patience: Duration,
    pub downscale_patience: Duration,
    pub inactivity_timeout: Duration,
    pub master_read_throttle: Option<ThrottleSpec>,
    pub master_write_throttle: Option<ThrottleSpec>,
    pub dedicated_read_throttle: Option<ThrottleSpec>,
    pub dedicated_write_throttle: Option<ThrottleSpec>,
    /// Whether new channels auto-fetch request content before invoking the
    /// processor (spec.md §3 "Channel" `autoFetchContent` flag).
    pub auto_fetch_content: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            upscale_patience: Duration::from_millis(10),
            downscale_patience: Duration::from_secs(60),
            inactivity_timeout: Duration::from_secs(10),
            master_read_throttle: None,
            master_write_throttle: None,
            dedicated_read_throttle: None,
            dedicated_write_throttle: None,
            auto_fetch_content: false,
        }
    }
}

fn make_throttler(spec: Option<ThrottleSpec>) -> Throttler {
    match spec {
        Some(s) => Throttler::new(s.capacity, s.interval),
        None => Throttler::disabled(),
    }
}

type ManagedChannel<H> = Channel<mio::net::TcpStream, H>;

/// The orchestrator's bookkeeping record wrapping one [`Channel`]
/// (spec.md §3 "Task").
struct Task<H> {
    id: u64,
    channel: Mutex<ManagedChannel<H>>,
    last_active: Mutex<Instant>,
    in_process: AtomicBool,
}

impl<H: Handler> Task<H> {
    fn mark_in_process(&self, value: bool) {
        self.in_process.store(value, Ordering::Release);
    }

    fn is_in_process(&self) -> bool {
        self.in_process.load(Ordering::Acquire)
    }

    /// spec.md §4.F "Readiness predicate".
    fn is_ready(&self, inactivity_timeout: Duration) -> bool {
        if self.is_in_process() {
            return false;
        }
        let channel = self.channel.lock().unwrap();
        match channel.stage() {
            Stage::WaitReadable | Stage::WaitWritable => {
                self.last_active.lock().unwrap().elapsed() >= inactivity_timeout
            }
            Stage::Closed => true,
            _ => Instant::now() >= channel.requested_wake(),
        }
    }
}

struct Inner<H, F> {
    factory: F,
    tasks: Mutex<Slab<Arc<Task<H>>>>,
    master_read: Arc<Throttler>,
    master_write: Arc<Throttler>,
    dedicated_read_throttle: Option<ThrottleSpec>,
    dedicated_write_throttle: Option<ThrottleSpec>,
    auto_fetch_content: bool,
    notifier: Notifier,
    pool: WorkerPool,
    wake_lock: Mutex<()>,
    wake_cond: Condvar,
    last_signal: Mutex<Instant>,
    stop: AtomicBool,
    inactivity_timeout: Mutex<Duration>,
    profiler: Arc<Profiler>,
}

/// Binds an edge-triggered [`Notifier`], a per-channel task registry, and a
/// [`WorkerPool`] into the coordinator described in spec.md §4.F. Cheaply
/// cloneable; clones share the same underlying state.
pub struct Orchestrator<H, F> {
    inner: Arc<Inner<H, F>>,
}

impl<H, F> Clone for Orchestrator<H, F> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

/// A handle to a running orchestrator's background threads.
pub struct OrchestratorHandle {
    coordinator: Option<std::thread::JoinHandle<()>>,
    notifier_thread: Option<std::thread::JoinHandle<()>>,
    outcome: crossbeam_channel::Receiver<Result<(), Error>>,
}

impl OrchestratorHandle {
    /// Blocks until the orchestrator stops, returning the error that caused
    /// it to stop, if any (spec.md §4.F "Failure semantics").
    pub fn wait(mut self) -> Result<(), Error> {
        let outcome = self.outcome.recv().unwrap_or(Ok(()));
        if let Some(h) = self.coordinator.take() {
            let _ = h.join();
        }
        if let Some(h) = self.notifier_thread.take() {
            let _ = h.join();
        }
        outcome
    }
}

impl<H, F> Orchestrator<H, F>
where
    H: Handler + 'static,
    F: Fn(SocketAddr) -> H + Send + Sync + 'static,
{
    pub fn new(config: OrchestratorConfig, factory: F) -> Result<Self, Error> {
        let notifier = Notifier::new().map_err(Error::Io)?;
        let pool = WorkerPool::new(config.workers, config.upscale_patience, config.downscale_patience);
        Ok(Self {
            inner: Arc::new(Inner {
                factory,
                tasks: Mutex::new(Slab::new()),
                master_read: Arc::new(make_throttler(config.master_read_throttle)),
                master_write: Arc::new(make_throttler(config.master_write_throttle)),
                dedicated_read_throttle: config.dedicated_read_throttle,
                dedicated_write_throttle: config.dedicated_write_throttle,
                auto_fetch_content: config.auto_fetch_content,
                notifier,
                pool,
                wake_lock: Mutex::new(()),
                wake_cond: Condvar::new(),
                last_signal: Mutex::new(Instant::now()),
                stop: AtomicBool::new(false),
                inactivity_timeout: Mutex::new(config.inactivity_timeout),
                profiler: Arc::new(Profiler::new()),
            }),
        })
    }

    pub fn profiler(&self) -> Arc<Profiler> {
        self.inner.profiler.clone()
    }

    /// Replaces the master read throttle's limits.
    pub fn set_read_throttle(&self, spec: ThrottleSpec) {
        self.inner.master_read.reconfigure(spec.capacity, spec.interval);
    }

    /// Replaces the master write throttle's limits.
    pub fn set_write_throttle(&self, spec: ThrottleSpec) {
        self.inner.master_write.reconfigure(spec.capacity, spec.interval);
    }

    pub fn set_inactivity_timeout(&self, timeout: Duration) {
        *self.inner.inactivity_timeout.lock().unwrap() = timeout;
    }

    /// Registers a newly accepted connection (spec.md §4.F `add`). The
    /// server facade calls this once per connection handed off by the
    /// [`crate::acceptor::Acceptor`].
    pub fn add(&self, stream: mio::net::TcpStream, addr: SocketAddr) -> Result<(), Error> {
        let handler = (self.inner.factory)(addr);

        let read_group = ThrottlerGroup::new(
            make_throttler(self.inner.dedicated_read_throttle),
            self.inner.master_read.clone(),
        );
        let write_group = ThrottlerGroup::new(
            make_throttler(self.inner.dedicated_write_throttle),
            self.inner.master_write.clone(),
        );

        let mut tasks = self.inner.tasks.lock().unwrap();
        let entry = tasks.vacant_entry();
        let id = entry.key() as u64;

        let mut channel = Channel::new(id, stream, handler, read_group, write_group)
            .with_profiler(self.inner.profiler.clone());
        channel.auto_fetch_content = self.inner.auto_fetch_content;

        let token = Token(id as usize);
        self.inner
            .notifier
            .register(channel.stream_mut(), token, Want::readable())
            .map_err(Error::Io)?;

        let task = Arc::new(Task {
            id,
            channel: Mutex::new(channel),
            last_active: Mutex::new(Instant::now()),
            in_process: AtomicBool::new(false),
        });
        entry.insert(task);
        drop(tasks);

        self.wake_coordinator();
        Ok(())
    }

    /// Starts the coordinator and notifier threads. Returns a handle that
    /// resolves once both have stopped, either via [`Orchestrator::stop`]
    /// or a non-recoverable notifier failure (spec.md §4.F "Failure
    /// semantics").
    pub fn start(&self) -> OrchestratorHandle {
        let (outcome_tx, outcome_rx) = crossbeam_channel::bounded(1);

        let coordinator_inner = self.inner.clone();
        let coordinator_tx = outcome_tx.clone();
        let coordinator = std::thread::spawn(move || {
            while !coordinator_inner.stop.load(Ordering::Acquire) {
                let ready = Self::capture_tasks(&coordinator_inner);
                if coordinator_inner.stop.load(Ordering::Acquire) {
                    break;
                }
                for task in ready {
                    task.mark_in_process(true);
                    let inner = coordinator_inner.clone();
                    let task = task.clone();
                    coordinator_inner.pool.post(move || Self::activate(&inner, &task));
                }
            }
            coordinator_inner.pool.stop();
            let _ = coordinator_tx.send(Ok(()));
        });

        let notifier_inner = self.inner.clone();
        let notifier_tx = outcome_tx;
        let notifier_thread = std::thread::spawn(move || {
            let dispatch_inner = notifier_inner.clone();
            let result = notifier_inner.notifier.run(move |token, mask| {
                let inner = dispatch_inner.clone();
                inner.pool.post(move || Self::on_event(&inner, token, mask));
            });
            if let Err(e) = result {
                notifier_inner.stop.store(true, Ordering::Release);
                Self::wake_coordinator_inner(&notifier_inner);
                let _ = notifier_tx.send(Err(e));
            }
        });

        OrchestratorHandle {
            coordinator: Some(coordinator),
            notifier_thread: Some(notifier_thread),
            outcome: outcome_rx,
        }
    }

    /// Requests cooperative shutdown of the coordinator, notifier, and
    /// worker pool.
    pub fn stop(&self) {
        self.inner.stop.store(true, Ordering::Release);
        self.inner.notifier.stop();
        self.wake_coordinator();
    }

    fn wake_coordinator(&self) {
        Self::wake_coordinator_inner(&self.inner);
    }

    fn wake_coordinator_inner(inner: &Arc<Inner<H, F>>) {
        *inner.last_signal.lock().unwrap() = Instant::now();
        let _guard = inner.wake_lock.lock().unwrap();
        inner.wake_cond.notify_all();
        inner.profiler.record("OrchestratorSignalled", "");
    }

    fn on_event(inner: &Arc<Inner<H, F>>, token: Token, events: EventMask) {
        let task = inner.tasks.lock().unwrap().get(token.0).cloned();
        let Some(task) = task else { return };
        {
            let mut channel = task.channel.lock().unwrap();
            channel.handle_event(events);
        }
        Self::wake_coordinator_inner(inner);
    }

    /// spec.md §4.F `Task::Activate`, run on a worker thread.
    fn activate(inner: &Arc<Inner<H, F>>, task: &Arc<Task<H>>) {
        inner.profiler.record("ChannelActivated", task.id.to_string());
        let inactivity_timeout = *inner.inactivity_timeout.lock().unwrap();
        let mut channel = task.channel.lock().unwrap();

        let waiting = matches!(channel.stage(), Stage::WaitReadable | Stage::WaitWritable);
        let timed_out = waiting && task.last_active.lock().unwrap().elapsed() >= inactivity_timeout;

        if timed_out {
            inner.notifier.remove(channel.stream_mut());
            channel.close();
            drop(channel);
            task.mark_in_process(false);
            Self::wake_coordinator_inner(inner);
            return;
        }

        let _ = channel.advance();
        *task.last_active.lock().unwrap() = Instant::now();

        let notify = match channel.stage() {
            Stage::WaitReadable => {
                let _ = inner.notifier.reregister(channel.stream_mut(), Token(task.id as usize), Want::readable());
                false
            }
            Stage::WaitWritable => {
                let _ = inner.notifier.reregister(channel.stream_mut(), Token(task.id as usize), Want::writable());
                false
            }
            _ => true,
        };
        drop(channel);
        task.mark_in_process(false);
        if notify {
            Self::wake_coordinator_inner(inner);
        }
    }

    /// spec.md §4.F `CaptureTasks`: sleeps on the wake condition until the
    /// latest-allowed-wakeup deadline, then garbage-collects and returns
    /// the set of ready tasks.
    fn capture_tasks(inner: &Arc<Inner<H, F>>) -> Vec<Arc<Task<H>>> {
        let inactivity_timeout = *inner.inactivity_timeout.lock().unwrap();
        let mut guard = inner.wake_lock.lock().unwrap();
        loop {
            let snapshot: Vec<Arc<Task<H>>> =
                inner.tasks.lock().unwrap().iter().map(|(_, t)| t.clone()).collect();
            let deadline = Self::latest_allowed_wakeup(inner, &snapshot);
            let now = Instant::now();
            if inner.stop.load(Ordering::Acquire) {
                break;
            }
            if now >= deadline {
                break;
            }
            inner.profiler.record("OrchestratorWaiting", "");
            let (g, _) = inner.wake_cond.wait_timeout(guard, deadline - now).unwrap();
            guard = g;
            inner.profiler.record("OrchestratorWokeUp", "");

            if inner.stop.load(Ordering::Acquire)
                || snapshot.iter().any(|t| t.is_ready(inactivity_timeout))
            {
                break;
            }
        }
        drop(guard);

        inner.profiler.record("OrchestratorCapturingTasks", "");
        let mut tasks = inner.tasks.lock().unwrap();
        Self::collect_garbage(&mut tasks);
        tasks
            .iter()
            .filter(|(_, t)| t.is_ready(inactivity_timeout))
            .map(|(_, t)| t.clone())
            .collect()
    }

    /// spec.md §4.F "Latest-allowed-wakeup".
    fn latest_allowed_wakeup(inner: &Arc<Inner<H, F>>, tasks: &[Arc<Task<H>>]) -> Instant {
        let last_signal = *inner.last_signal.lock().unwrap();
        let inactivity_timeout = *inner.inactivity_timeout.lock().unwrap();
        let mut deadline = last_signal + inactivity_timeout;
        for task in tasks {
            if let Ok(channel) = task.channel.try_lock() {
                let requested = channel.requested_wake();
                if requested >= last_signal && requested < deadline {
                    deadline = requested;
                }
            }
        }
        deadline
    }

    /// spec.md §4.F "Garbage collection": evicts every `Closed` task from
    /// the registry, freeing its slab slot (and `mio::Token`) for reuse.
    fn collect_garbage(tasks: &mut Slab<Arc<Task<H>>>) {
        let closed: Vec<usize> = tasks
            .iter()
            .filter(|(_, t)| matches!(t.channel.lock().unwrap().stage(), Stage::Closed))
            .map(|(key, _)| key)
            .collect();
        for key in closed {
            tasks.remove(key);
        }
    }
}
