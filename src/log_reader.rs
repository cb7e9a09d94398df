use std::borrow::Cow;
use std::convert::Infallible;
use std::fmt;
use std::sync::atomic::Ordering;

use crate::record_layout::{
    header_fits, record_stride, ENCODED_BYTES_OFFSET, ENCODED_LENGTH_OFFSET,
    FIRST_OBSERVATION_TIMESTAMP_OFFSET, HEADER_LENGTH, LAST_OBSERVATION_TIMESTAMP_OFFSET,
    OBSERVATION_COUNT_OFFSET,
};
use crate::shared_region::SharedRegion;

/// Receives one callback per distinct exception during a read.
///
/// Implemented for any `FnMut(u32, i64, i64, &str)`:
///
/// ```
/// # use distinct_exception_log::{ExceptionLogReader, SharedRegion};
/// let region = SharedRegion::new(4096).unwrap();
/// let mut lines = Vec::new();
/// let mut print = |count: u32, first: i64, last: i64, description: &str| {
///     lines.push(format!("{count} x [{first}..{last}] {description}"));
/// };
/// assert_eq!(ExceptionLogReader::read(&region, &mut print), 0);
/// ```
pub trait ExceptionConsumer {
    fn accept(
        &mut self,
        observation_count: u32,
        first_observation_timestamp: i64,
        last_observation_timestamp: i64,
        description: &str,
    );
}

impl<F> ExceptionConsumer for F
where
    F: FnMut(u32, i64, i64, &str),
{
    #[inline]
    fn accept(&mut self, count: u32, first: i64, last: i64, description: &str) {
        self(count, first, last, description)
    }
}

/// An owned copy of one distinct exception record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionObservation {
    pub observation_count: u32,
    pub first_observation_timestamp: i64,
    pub last_observation_timestamp: i64,
    pub description: String,
}

impl ExceptionObservation {
    /// One-line summary: count, observation window and the first line of the
    /// description.
    pub fn format(&self) -> String {
        let headline = self.description.lines().next().unwrap_or_default();
        format!(
            "{} observation(s) [{} .. {}] {}",
            self.observation_count,
            self.first_observation_timestamp,
            self.last_observation_timestamp,
            headline
        )
    }

    /// Multiline view including the full description.
    pub fn to_detailed_string(&self) -> String {
        let mut result = String::new();
        result.push_str(&format!("Observations: {}\n", self.observation_count));
        result.push_str(&format!("First observed: {}\n", self.first_observation_timestamp));
        result.push_str(&format!("Last observed: {}\n", self.last_observation_timestamp));
        result.push_str("Description:\n");
        for line in self.description.lines() {
            result.push_str(&format!("  {}\n", line));
        }
        result
    }
}

impl fmt::Display for ExceptionObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

/// Replays the distinct exceptions held in a [`SharedRegion`].
///
/// Reading never writes to the region and takes no locks, so it can run while
/// any number of threads keep recording. Only fully published records are
/// reported, in the order they were first observed. A zero length field, a
/// header that would cross the end of the region, or a length that points
/// past it all end the scan.
///
/// # Examples
///
/// ```
/// # use std::sync::Arc;
/// # use distinct_exception_log::{DistinctExceptionLog, ExceptionLogReader, SharedRegion};
/// # use distinct_exception_log::clock::ManualClock;
/// # use distinct_exception_log::encoder::DisplayEncoder;
/// let region = Arc::new(SharedRegion::new(4096).unwrap());
/// let clock = ManualClock::new(7);
/// let log = DistinctExceptionLog::new(region.clone(), clock.clone(), DisplayEncoder);
///
/// log.record("queue full");
/// clock.set(10);
/// log.record("queue full");
///
/// let summary = ExceptionLogReader::collect(&region, i64::MIN);
/// assert_eq!(summary.len(), 1);
/// assert_eq!(summary[0].observation_count, 2);
/// assert_eq!(summary[0].first_observation_timestamp, 7);
/// assert_eq!(summary[0].last_observation_timestamp, 10);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionLogReader;

impl ExceptionLogReader {
    /// Reports every published record. Returns the number reported.
    pub fn read<C>(region: &SharedRegion, consumer: &mut C) -> usize
    where
        C: ExceptionConsumer + ?Sized,
    {
        Self::read_since(region, consumer, i64::MIN)
    }

    /// Reports records last observed at or after `since_timestamp`.
    ///
    /// Older records are still walked over to reach later ones. Returns the
    /// number reported.
    pub fn read_since<C>(region: &SharedRegion, consumer: &mut C, since_timestamp: i64) -> usize
    where
        C: ExceptionConsumer + ?Sized,
    {
        let reported = Self::try_read_since(region, since_timestamp, |count, first, last, description| {
            consumer.accept(count, first, last, description);
            Ok::<(), Infallible>(())
        });
        match reported {
            Ok(count) => count,
            Err(never) => match never {},
        }
    }

    /// Like [`read`](Self::read) with a fallible consumer.
    pub fn try_read<E, F>(region: &SharedRegion, consumer: F) -> Result<usize, E>
    where
        F: FnMut(u32, i64, i64, &str) -> Result<(), E>,
    {
        Self::try_read_since(region, i64::MIN, consumer)
    }

    /// Like [`read_since`](Self::read_since) with a fallible consumer.
    ///
    /// The first error stops the scan and is returned as is.
    pub fn try_read_since<E, F>(
        region: &SharedRegion,
        since_timestamp: i64,
        mut consumer: F,
    ) -> Result<usize, E>
    where
        F: FnMut(u32, i64, i64, &str) -> Result<(), E>,
    {
        let mut reported = 0;
        for record in PublishedRecords::new(region) {
            let last = record.last_observation_timestamp(region);
            if last < since_timestamp {
                continue;
            }

            let count = record.observation_count(region);
            let first = record.first_observation_timestamp(region);
            let description = record.description(region);
            consumer(count, first, last, &description)?;
            reported += 1;
        }
        Ok(reported)
    }

    /// Copies out every record last observed at or after `since_timestamp`.
    pub fn collect(region: &SharedRegion, since_timestamp: i64) -> Vec<ExceptionObservation> {
        let mut observations = Vec::new();
        Self::read_since(
            region,
            &mut |count: u32, first: i64, last: i64, description: &str| {
                observations.push(ExceptionObservation {
                    observation_count: count,
                    first_observation_timestamp: first,
                    last_observation_timestamp: last,
                    description: description.to_owned(),
                })
            },
            since_timestamp,
        );
        observations
    }
}

/// Location of a published record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordView {
    pub offset: usize,
    pub encoded_length: usize,
}

impl RecordView {
    #[inline]
    pub fn observation_count(&self, region: &SharedRegion) -> u32 {
        region
            .atomic_u32(self.offset + OBSERVATION_COUNT_OFFSET)
            .load(Ordering::Acquire)
    }

    #[inline]
    pub fn first_observation_timestamp(&self, region: &SharedRegion) -> i64 {
        region
            .atomic_i64(self.offset + FIRST_OBSERVATION_TIMESTAMP_OFFSET)
            .load(Ordering::Relaxed)
    }

    #[inline]
    pub fn last_observation_timestamp(&self, region: &SharedRegion) -> i64 {
        region
            .atomic_i64(self.offset + LAST_OBSERVATION_TIMESTAMP_OFFSET)
            .load(Ordering::Acquire)
    }

    #[inline]
    pub fn encoded_bytes<'r>(&self, region: &'r SharedRegion) -> &'r [u8] {
        // SAFETY: the view was produced after an acquire load observed the
        // record as published; its bytes are immutable from then on.
        unsafe { region.bytes(self.offset + ENCODED_BYTES_OFFSET, self.encoded_length) }
    }

    pub fn description<'r>(&self, region: &'r SharedRegion) -> Cow<'r, str> {
        String::from_utf8_lossy(self.encoded_bytes(region))
    }

    /// Offset at which the following record starts.
    #[inline]
    pub fn next_offset(&self) -> usize {
        self.offset + record_stride(self.encoded_length)
    }
}

/// Walks published records from offset 0 up to the end of the log.
pub(crate) struct PublishedRecords<'r> {
    region: &'r SharedRegion,
    offset: usize,
    finished: bool,
}

impl<'r> PublishedRecords<'r> {
    pub fn new(region: &'r SharedRegion) -> Self {
        Self {
            region,
            offset: 0,
            finished: false,
        }
    }

    /// Consumes the walk and returns the end of the published prefix.
    pub fn end_offset(mut self) -> usize {
        while self.next().is_some() {}
        self.offset.min(self.region.capacity())
    }
}

impl Iterator for PublishedRecords<'_> {
    type Item = RecordView;

    fn next(&mut self) -> Option<RecordView> {
        if self.finished {
            return None;
        }

        let capacity = self.region.capacity();
        if !header_fits(self.offset, capacity) {
            self.finished = true;
            return None;
        }

        let encoded_length = self
            .region
            .atomic_u32(self.offset + ENCODED_LENGTH_OFFSET)
            .load(Ordering::Acquire) as usize;
        let record_end = self
            .offset
            .saturating_add(HEADER_LENGTH)
            .saturating_add(encoded_length);
        if encoded_length == 0 || record_end > capacity {
            self.finished = true;
            return None;
        }

        let record = RecordView {
            offset: self.offset,
            encoded_length,
        };
        self.offset = record.next_offset();
        Some(record)
    }
}
