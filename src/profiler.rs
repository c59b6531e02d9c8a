//! Diagnostic event recording, off the hot path.
//!
//! Grounded on `examples/original_source/include/Profiler.h`: an
//! append-only, mutex-guarded vector of typed events, each carrying a
//! steady-clock time point; a reader computes paired begin/end durations
//! (e.g. `OrchestratorWaiting` → `OrchestratorWokeUp` idle intervals).
//! Event source names mirror `ChannelBase.h`/`Orchestrator.cc`/`Acceptor.cc`.

use std::sync::Mutex;
use std::time::Instant;

/// One recorded occurrence. `source` is a short, stable tag used to pair
/// begin/end events (e.g. `"OrchestratorWaiting"`/`"OrchestratorWokeUp"`).
#[derive(Debug, Clone)]
pub struct ProfileEvent {
    pub at: Instant,
    pub source: &'static str,
    pub summary: String,
}

/// Append-only event log. Cheap to record into, expensive only to read —
/// matching the source's "off hot path" framing.
#[derive(Debug, Default)]
pub struct Profiler {
    events: Mutex<Vec<ProfileEvent>>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, source: &'static str, summary: impl Into<String>) {
        self.events.lock().unwrap().push(ProfileEvent {
            at: Instant::now(),
            source,
            summary: summary.into(),
        });
    }

    /// A snapshot of every event recorded so far, in recording order.
    pub fn events(&self) -> Vec<ProfileEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Sums the durations between each `begin` event and the next `end`
    /// event that follows it, in recording order. Unmatched trailing
    /// `begin`s are ignored.
    pub fn paired_duration(&self, begin: &str, end: &str) -> std::time::Duration {
        let events = self.events.lock().unwrap();
        let mut total = std::time::Duration::ZERO;
        let mut open: Option<Instant> = None;
        for event in events.iter() {
            if event.source == begin {
                open = Some(event.at);
            } else if event.source == end {
                if let Some(start) = open.take() {
                    total += event.at.saturating_duration_since(start);
                }
            }
        }
        total
    }
}
