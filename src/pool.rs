//! Bounded elastic worker pool.
//!
//! Grounded on `examples/original_source/include/ThreadPool.h` /
//! `src/ThreadPool.cc`: workers are spawned up to a `capacity` cap when the
//! oldest pending item has waited longer than `upscale_patience`; a worker
//! exits once it has waited longer than `downscale_patience` for new work.
//! The source's semaphore-gated queue is modeled here with a small
//! `Condvar`+counter semaphore (the teacher already reaches for
//! `crossbeam_channel` for cross-thread handoff elsewhere, so this crate's
//! semaphore stays a plain `std::sync` primitive rather than a new
//! dependency).

use crate::error::Error;
use crossbeam_channel::{bounded, Sender};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

struct Semaphore {
    count: Mutex<isize>,
    cond: Condvar,
}

impl Semaphore {
    fn new() -> Self {
        Self { count: Mutex::new(0), cond: Condvar::new() }
    }

    fn increment(&self) {
        *self.count.lock().unwrap() += 1;
        self.cond.notify_one();
    }

    fn increment_n(&self, n: usize) {
        *self.count.lock().unwrap() += n as isize;
        self.cond.notify_all();
    }

    /// Blocks until a permit is available or `patience` elapses. Returns
    /// `true` if a permit was acquired.
    fn try_decrement(&self, patience: Duration) -> bool {
        let mut count = self.count.lock().unwrap();
        loop {
            if *count > 0 {
                *count -= 1;
                return true;
            }
            let (guard, result) = self.cond.wait_timeout(count, patience).unwrap();
            count = guard;
            if result.timed_out() {
                return false;
            }
        }
    }
}

type Job = Box<dyn FnOnce() + Send>;

struct PendingJob {
    submitted_at: Instant,
    job: Job,
}

/// A handle to a posted job's outcome. Resolves with the work's return
/// value, [`Error::PoolStopped`] if the pool was stopped before running it,
/// or [`Error::HandlerPanicked`] if the work panicked.
pub struct JobHandle<T> {
    receiver: crossbeam_channel::Receiver<Result<T, Error>>,
}

impl<T> JobHandle<T> {
    /// Blocks until the job completes.
    pub fn wait(self) -> Result<T, Error> {
        self.receiver.recv().unwrap_or(Err(Error::PoolStopped))
    }
}

struct Worker {
    alive: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

struct Shared {
    capacity: usize,
    upscale_patience: Duration,
    downscale_patience: Duration,
    queue: Mutex<VecDeque<PendingJob>>,
    semaphore: Semaphore,
    stopped: AtomicBool,
    worker_count: AtomicUsize,
}

/// A bounded pool of threads that grows and shrinks by patience rather than
/// by a fixed thread count (spec.md §4.C).
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<Worker>>,
}

impl WorkerPool {
    pub fn new(capacity: usize, upscale_patience: Duration, downscale_patience: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                capacity,
                upscale_patience,
                downscale_patience,
                queue: Mutex::new(VecDeque::new()),
                semaphore: Semaphore::new(),
                stopped: AtomicBool::new(false),
                worker_count: AtomicUsize::new(0),
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Enqueues `work`, spawning a new worker if warranted, and returns a
    /// handle resolving to its outcome. If the pool has been stopped, the
    /// handle resolves immediately with [`Error::PoolStopped`].
    pub fn post<F, T>(&self, work: F) -> JobHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = bounded(1);
        if self.shared.stopped.load(Ordering::Acquire) {
            let _ = tx.send(Err(Error::PoolStopped));
            return JobHandle { receiver: rx };
        }

        self.collect_garbage();
        let job: Job = Box::new(move || {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(work));
            let result = outcome.map_err(|_| Error::HandlerPanicked);
            let _ = tx.send(result);
        });

        {
            let mut queue = self.shared.queue.lock().unwrap();
            queue.push_back(PendingJob { submitted_at: Instant::now(), job });
        }
        self.shared.semaphore.increment();
        self.maybe_spawn_worker();
        JobHandle { receiver: rx }
    }

    fn maybe_spawn_worker(&self) {
        let count = self.shared.worker_count.load(Ordering::Acquire);
        if count >= self.shared.capacity {
            return;
        }
        let needs_worker = if count == 0 {
            true
        } else {
            let queue = self.shared.queue.lock().unwrap();
            queue
                .front()
                .is_some_and(|job| job.submitted_at.elapsed() > self.shared.upscale_patience)
        };
        if needs_worker {
            self.spawn_worker();
        }
    }

    fn spawn_worker(&self) {
        let shared = self.shared.clone();
        let alive = Arc::new(AtomicBool::new(true));
        let alive_clone = alive.clone();
        shared.worker_count.fetch_add(1, Ordering::AcqRel);

        let handle = std::thread::spawn(move || {
            loop {
                if shared.stopped.load(Ordering::Acquire) {
                    break;
                }
                if !shared.semaphore.try_decrement(shared.downscale_patience) {
                    break;
                }
                if shared.stopped.load(Ordering::Acquire) {
                    break;
                }
                let job = shared.queue.lock().unwrap().pop_front();
                if let Some(job) = job {
                    (job.job)();
                }
            }
            alive_clone.store(false, Ordering::Release);
            shared.worker_count.fetch_sub(1, Ordering::AcqRel);
        });

        self.workers.lock().unwrap().push(Worker { alive, handle: Some(handle) });
    }

    /// Lazily joins and drops workers that have exited, per spec.md §4.C
    /// "the pool tracks liveness so that terminated workers are
    /// garbage-collected lazily."
    pub fn collect_garbage(&self) {
        let mut workers = self.workers.lock().unwrap();
        workers.retain_mut(|w| {
            if w.alive.load(Ordering::Acquire) {
                true
            } else {
                if let Some(handle) = w.handle.take() {
                    let _ = handle.join();
                }
                false
            }
        });
    }

    /// Drains the pending queue without running it, wakes every worker, and
    /// joins them all.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::Release);
        self.shared.queue.lock().unwrap().clear();
        let capacity = self.shared.capacity.max(1);
        self.shared.semaphore.increment_n(capacity);

        let mut workers = self.workers.lock().unwrap();
        for worker in workers.iter_mut() {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
        workers.clear();
    }

    pub fn worker_count(&self) -> usize {
        self.shared.worker_count.load(Ordering::Acquire)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.shared.stopped.load(Ordering::Acquire) {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_posted_work_and_resolves_handle() {
        let pool = WorkerPool::new(4, Duration::from_millis(5), Duration::from_millis(100));
        let handle = pool.post(|| 2 + 2);
        assert_eq!(handle.wait().unwrap(), 4);
        pool.stop();
    }

    #[test]
    fn panicking_work_resolves_with_error_not_crash() {
        let pool = WorkerPool::new(2, Duration::from_millis(5), Duration::from_millis(50));
        let handle = pool.post(|| -> i32 { panic!("boom") });
        assert!(matches!(handle.wait(), Err(Error::HandlerPanicked)));
        pool.stop();
    }

    #[test]
    fn stopped_pool_rejects_new_work() {
        let pool = WorkerPool::new(1, Duration::from_millis(5), Duration::from_millis(50));
        pool.stop();
        let handle = pool.post(|| 1);
        assert!(matches!(handle.wait(), Err(Error::PoolStopped)));
    }

    #[test]
    fn spawns_at_most_capacity_workers() {
        let pool = WorkerPool::new(2, Duration::from_millis(1), Duration::from_millis(50));
        let mut handles = Vec::new();
        for i in 0..5 {
            handles.push(pool.post(move || i));
        }
        for h in handles {
            h.wait().unwrap();
        }
        assert!(pool.worker_count() <= 2);
        pool.stop();
    }

    #[test]
    fn idle_workers_eventually_exit_and_are_collected() {
        let pool = WorkerPool::new(2, Duration::from_millis(1), Duration::from_millis(10));
        pool.post(|| ()).wait().unwrap();
        std::thread::sleep(Duration::from_millis(60));
        pool.collect_garbage();
        assert_eq!(pool.worker_count(), 0);
        pool.stop();
    }
}
