//! Timing around the downstream handler.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::warn;

use super::event::EventIdentity;

/// Elapsed wall-clock time, displayed as `[d.]hh:mm:ss[.fffffff]`.
///
/// The fraction has 100 ns resolution and is omitted when zero; the day
/// component appears only from 24 h on.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct Elapsed(Duration);

impl Elapsed {
    pub fn as_duration(self) -> Duration { self.0 }
}

impl From<Duration> for Elapsed {
    fn from(d: Duration) -> Self { Self(d) }
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        let ticks = self.0.subsec_nanos() / 100;
        let (days, hours, minutes, seconds) =
            (secs / 86_400, secs / 3_600 % 24, secs / 60 % 60, secs % 60);

        if days > 0 {
            write!(f, "{days}.")?;
        }
        write!(f, "{hours:02}:{minutes:02}:{seconds:02}")?;
        if ticks > 0 {
            write!(f, ".{ticks:07}")?;
        }
        Ok(())
    }
}

/// Monotonic timer around one handler invocation.
///
/// [`stop`](Stopwatch::stop) consumes the stopwatch, so elapsed time is taken
/// at most once. A stopwatch dropped while still running means the request
/// future was cancelled mid-handler; that case is logged on drop.
pub(crate) struct Stopwatch {
    start: Instant,
    trace_id: String,
    event: EventIdentity,
    running: bool,
}

impl Stopwatch {
    pub(crate) fn start(trace_id: String, event: EventIdentity) -> Self {
        Self { start: Instant::now(), trace_id, event, running: true }
    }

    pub(crate) fn stop(mut self) -> Elapsed {
        self.running = false;
        Elapsed(self.start.elapsed())
    }
}

impl Drop for Stopwatch {
    fn drop(&mut self) {
        if self.running {
            let elapsed = Elapsed(self.start.elapsed());
            warn!(
                event_id = self.event.id,
                event_name = %self.event.name,
                "The request {} was cancelled after {elapsed}",
                self.trace_id,
            );
        }
    }
}
