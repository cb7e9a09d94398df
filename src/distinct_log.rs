use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::clock::EpochClock;
use crate::encoder::{EncodeError, ExceptionEncoder};
use crate::record_layout::{
    record_stride, ENCODED_BYTES_OFFSET, ENCODED_LENGTH_OFFSET, FIRST_OBSERVATION_TIMESTAMP_OFFSET,
    HEADER_LENGTH, LAST_OBSERVATION_TIMESTAMP_OFFSET, OBSERVATION_COUNT_OFFSET,
};
use crate::shared_region::SharedRegion;

/// Busy-spins spent waiting on a reserved record before yielding.
const PUBLISH_SPIN_LIMIT: u32 = 128;

/// Total polls of a reserved record before the scan gives up on it.
const PUBLISH_WAIT_LIMIT: u32 = PUBLISH_SPIN_LIMIT + 4_096;

/// What a call to [`DistinctExceptionLog::record_outcome`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Folded into the existing record at `offset`.
    Merged { offset: usize, observation_count: u32 },
    /// First occurrence; a new record was published at `offset`.
    Appended { offset: usize },
    /// Nothing was written.
    Dropped(DropReason),
}

/// Why an occurrence left no trace in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The error could not be rendered.
    Encoding(EncodeError),
    /// No room left for another distinct record.
    CapacityExhausted,
}

/// Records each distinct exception once, counting its recurrences.
///
/// Occurrences are rendered by the encoder and compared byte for byte with the
/// records already in the region. A recurrence bumps the record's count and
/// last observation time in place; a new description is appended at the tail.
/// Every method takes `&self`: share the log across threads with an `Arc`.
///
/// Recording never fails. Rendering failures (including panics inside the
/// encoder) and a full region simply drop the occurrence, since this is
/// typically called from error handling code where a second failure would do
/// more harm than a missing entry. Merges into existing records keep working
/// after the region is full.
///
/// # Concurrency
///
/// The merge path is one scan plus one atomic increment and one atomic store.
/// The append path reserves space with a compare-and-swap on the tail and
/// publishes the record by writing its length last with release ordering. A
/// writer that loses the race on the tail rescans only what was appended in
/// the meantime, so racing first occurrences of one description normally
/// collapse into a single record. If a competing writer stalls between
/// reservation and publication for longer than a short bounded wait, the
/// description may end up recorded twice.
///
/// The tail lives in the [`SharedRegion`], so any number of logs may be
/// attached to one region; they reserve space through the same cursor.
///
/// # Examples
///
/// ```
/// # use std::sync::Arc;
/// # use distinct_exception_log::{DistinctExceptionLog, ExceptionLogReader, SharedRegion};
/// # use distinct_exception_log::clock::SystemEpochClock;
/// # use distinct_exception_log::encoder::ErrorChainEncoder;
/// let region = Arc::new(SharedRegion::new(64 * 1024).unwrap());
/// let log = DistinctExceptionLog::new(region.clone(), SystemEpochClock, ErrorChainEncoder);
///
/// for _ in 0..1_000 {
///     let err = std::io::Error::new(std::io::ErrorKind::TimedOut, "upstream timed out");
///     log.record(&err);
/// }
///
/// let summary = ExceptionLogReader::collect(&region, i64::MIN);
/// assert_eq!(summary.len(), 1);
/// assert_eq!(summary[0].observation_count, 1_000);
/// ```
pub struct DistinctExceptionLog<C, N> {
    region: Arc<SharedRegion>,
    clock: C,
    encoder: N,
    exhausted: AtomicBool,
}

impl<C, N> DistinctExceptionLog<C, N>
where
    C: EpochClock,
{
    /// Creates a log over `region`.
    ///
    /// Records already in the region (for instance a loaded image, or records
    /// written by another log over the same region) are kept; new records go
    /// after them.
    pub fn new(region: Arc<SharedRegion>, clock: C, encoder: N) -> Self {
        let tail = region.tail();
        if tail > 0 {
            debug!(tail, "attaching distinct exception log after existing records");
        }

        Self {
            region,
            clock,
            encoder,
            exhausted: AtomicBool::new(false),
        }
    }

    /// Records one occurrence of `error`.
    ///
    /// A recurrence that matches before any in-flight record costs one scan,
    /// one increment and one store. If the scan meets a record another thread
    /// has reserved but not yet published, or the tail moves under this call,
    /// the call rescans and may wait a bounded number of spins and yields for
    /// that record to be published.
    #[inline]
    pub fn record<E>(&self, error: &E)
    where
        E: ?Sized,
        N: ExceptionEncoder<E>,
    {
        let _ = self.record_outcome(error);
    }

    /// Records one occurrence of `error` and reports what happened to it.
    pub fn record_outcome<E>(&self, error: &E) -> RecordOutcome
    where
        E: ?Sized,
        N: ExceptionEncoder<E>,
    {
        let encoded = match self.encode(error) {
            Ok(encoded) => encoded,
            Err(err) => {
                debug!(error = %err, "dropping exception observation that could not be encoded");
                return RecordOutcome::Dropped(DropReason::Encoding(err));
            }
        };

        let timestamp = self.clock.time();
        let capacity = self.region.capacity();
        let cursor = self.region.tail_cursor();
        let mut scanned = 0;
        let mut patient = false;
        let mut tail = cursor.load(Ordering::Acquire);

        loop {
            match self.find(&encoded, scanned, tail, patient) {
                Scan::Match(offset) => return self.merge(offset, timestamp),
                Scan::Reached(offset) => scanned = offset,
            }

            // An in-flight record stopped the first scan; look again, waiting.
            if scanned < tail && !patient {
                patient = true;
                continue;
            }

            if tail + HEADER_LENGTH + encoded.len() > capacity {
                // Records appended since the scan may still hold a match.
                let current = cursor.load(Ordering::Acquire);
                if current != tail {
                    tail = current;
                    patient = true;
                    continue;
                }
                return self.reject_for_capacity(encoded.len());
            }

            // The final record may end short of a full stride.
            let new_tail = (tail + record_stride(encoded.len())).min(capacity);
            match cursor.compare_exchange_weak(tail, new_tail, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return self.append(tail, &encoded, timestamp),
                Err(current) => {
                    tail = current;
                    patient = true;
                }
            }
        }
    }

    /// The region this log writes to.
    pub fn region(&self) -> &Arc<SharedRegion> {
        &self.region
    }

    /// Offset at which the next new record will be reserved.
    pub fn tail(&self) -> usize {
        self.region.tail()
    }

    fn encode<E>(&self, error: &E) -> Result<Vec<u8>, EncodeError>
    where
        E: ?Sized,
        N: ExceptionEncoder<E>,
    {
        let encoded = panic::catch_unwind(AssertUnwindSafe(|| self.encoder.encode(error)))
            .map_err(|_| EncodeError::Panicked)??;

        if encoded.is_empty() {
            return Err(EncodeError::Empty);
        }
        let fits = self.region.capacity().saturating_sub(HEADER_LENGTH);
        if encoded.len() > fits || u32::try_from(encoded.len()).is_err() {
            return Err(EncodeError::TooLarge(encoded.len()));
        }
        Ok(encoded)
    }

    /// Looks for `encoded` among records in `from..to`.
    ///
    /// Stops at the first unpublished record, after waiting for it if
    /// `patient` is set.
    fn find(&self, encoded: &[u8], from: usize, to: usize, patient: bool) -> Scan {
        let mut offset = from;
        while offset < to {
            let length = if patient {
                self.await_published(offset)
            } else {
                self.published_length(offset)
            };
            let Some(length) = length else {
                return Scan::Reached(offset);
            };

            if length == encoded.len() {
                // SAFETY: the length was observed non-zero with acquire ordering.
                let existing = unsafe { self.region.bytes(offset + ENCODED_BYTES_OFFSET, length) };
                if existing == encoded {
                    return Scan::Match(offset);
                }
            }
            offset += record_stride(length);
        }
        Scan::Reached(offset)
    }

    fn published_length(&self, offset: usize) -> Option<usize> {
        match self
            .region
            .atomic_u32(offset + ENCODED_LENGTH_OFFSET)
            .load(Ordering::Acquire)
        {
            0 => None,
            length => Some(length as usize),
        }
    }

    /// Waits briefly for the record reserved at `offset` to be published.
    fn await_published(&self, offset: usize) -> Option<usize> {
        let length = self.region.atomic_u32(offset + ENCODED_LENGTH_OFFSET);
        for attempt in 0..PUBLISH_WAIT_LIMIT {
            let value = length.load(Ordering::Acquire);
            if value != 0 {
                return Some(value as usize);
            }
            if attempt < PUBLISH_SPIN_LIMIT {
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
        trace!(offset, "reserved record not yet published, scanning stops here");
        None
    }

    fn merge(&self, offset: usize, timestamp: i64) -> RecordOutcome {
        let observation_count = self
            .region
            .atomic_u32(offset + OBSERVATION_COUNT_OFFSET)
            .fetch_add(1, Ordering::AcqRel)
            .wrapping_add(1);
        self.region
            .atomic_i64(offset + LAST_OBSERVATION_TIMESTAMP_OFFSET)
            .store(timestamp, Ordering::Release);

        trace!(offset, observation_count, "merged exception observation");
        RecordOutcome::Merged {
            offset,
            observation_count,
        }
    }

    fn append(&self, offset: usize, encoded: &[u8], timestamp: i64) -> RecordOutcome {
        let region = &*self.region;
        region
            .atomic_u32(offset + OBSERVATION_COUNT_OFFSET)
            .store(1, Ordering::Relaxed);
        region
            .atomic_i64(offset + FIRST_OBSERVATION_TIMESTAMP_OFFSET)
            .store(timestamp, Ordering::Relaxed);
        region
            .atomic_i64(offset + LAST_OBSERVATION_TIMESTAMP_OFFSET)
            .store(timestamp, Ordering::Relaxed);
        // SAFETY: offset..offset + stride was reserved by this thread's CAS and
        // stays invisible to readers until the length below is published.
        unsafe { region.put_bytes(offset + ENCODED_BYTES_OFFSET, encoded) };

        // Publish last.
        region
            .atomic_u32(offset + ENCODED_LENGTH_OFFSET)
            .store(encoded.len() as u32, Ordering::Release);

        trace!(offset, length = encoded.len(), "appended distinct exception");
        RecordOutcome::Appended { offset }
    }

    fn reject_for_capacity(&self, length: usize) -> RecordOutcome {
        if !self.exhausted.swap(true, Ordering::Relaxed) {
            warn!(
                capacity = self.region.capacity(),
                tail = self.tail(),
                "distinct exception log is full; new distinct exceptions will be dropped"
            );
        }
        debug!(length, "dropping distinct exception, no room for a new record");
        RecordOutcome::Dropped(DropReason::CapacityExhausted)
    }
}

impl<C, N> fmt::Debug for DistinctExceptionLog<C, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistinctExceptionLog")
            .field("region", &self.region)
            .field("tail", &self.region.tail())
            .finish_non_exhaustive()
    }
}

enum Scan {
    Match(usize),
    /// No match up to this offset.
    Reached(usize),
}
