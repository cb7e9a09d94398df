use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Millisecond time source used to stamp observations.
///
/// The log only needs reasonable forward progress, not strict monotonicity.
/// Any `Fn() -> i64` closure that is `Send + Sync` is a clock:
///
/// ```
/// # use distinct_exception_log::clock::EpochClock;
/// let fixed = || 42i64;
/// assert_eq!(fixed.time(), 42);
/// ```
pub trait EpochClock: Send + Sync {
    /// Current time in milliseconds.
    fn time(&self) -> i64;
}

impl<F> EpochClock for F
where
    F: Fn() -> i64 + Send + Sync,
{
    #[inline]
    fn time(&self) -> i64 {
        self()
    }
}

/// Wall clock in milliseconds since the UNIX epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEpochClock;

impl SystemEpochClock {
    pub const fn new() -> Self {
        Self
    }
}

impl EpochClock for SystemEpochClock {
    #[inline]
    fn time(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_millis() as i64,
            // Clock set before 1970.
            Err(before) => -(before.duration().as_millis() as i64),
        }
    }
}

/// Controllable clock for deterministic tests and replays.
///
/// Readings queued with [`then_return`](ManualClock::then_return) are handed
/// out one per [`time`](EpochClock::time) call; once the queue is drained the
/// clock keeps returning the last reading. Clones share the same state.
///
/// ```
/// # use distinct_exception_log::clock::{EpochClock, ManualClock};
/// let clock = ManualClock::new(0);
/// clock.then_return(7).then_return(10);
///
/// assert_eq!(clock.time(), 7);
/// assert_eq!(clock.time(), 10);
/// assert_eq!(clock.time(), 10);
///
/// clock.advance(5);
/// assert_eq!(clock.time(), 15);
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualClockState>>,
}

#[derive(Debug)]
struct ManualClockState {
    current: i64,
    scripted: VecDeque<i64>,
}

impl ManualClock {
    /// Creates a clock that reads `start` until told otherwise.
    pub fn new(start: i64) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualClockState {
                current: start,
                scripted: VecDeque::new(),
            })),
        }
    }

    /// Queues a reading to be returned by a future `time()` call.
    pub fn then_return(&self, millis: i64) -> &Self {
        self.state.lock().scripted.push_back(millis);
        self
    }

    /// Sets the current reading and discards any queued readings.
    pub fn set(&self, millis: i64) {
        let mut state = self.state.lock();
        state.scripted.clear();
        state.current = millis;
    }

    /// Moves the current reading forward by `millis`.
    pub fn advance(&self, millis: i64) {
        self.state.lock().current += millis;
    }
}

impl EpochClock for ManualClock {
    fn time(&self) -> i64 {
        let mut state = self.state.lock();
        if let Some(next) = state.scripted.pop_front() {
            state.current = next;
        }
        state.current
    }
}
