//! # Distinct Exception Log
//!
//! A concurrent, deduplicating exception log over a fixed-capacity shared
//! memory region, for systems where errors can recur at very high rates
//! inside hot paths:
//!
//! * **Bounded**: each distinct exception is stored once; recurrences only
//!   bump a counter and a timestamp in place
//! * **Lock-free**: recording is a scan plus atomic updates, appending a new
//!   record is a compare-and-swap on the tail
//! * **Never fails**: unrenderable errors and a full region drop the
//!   occurrence instead of raising a second failure inside error handling
//! * **Readable while written**: a reader replays every fully published
//!   record in first-occurrence order, optionally only those seen since a
//!   given time
//!
//! ## Main Components
//!
//! * `SharedRegion`: the caller-owned, zero-initialized memory the log lives in
//! * `DistinctExceptionLog`: records occurrences, merging recurrences
//! * `ExceptionLogReader`: replays the records to an `ExceptionConsumer`
//! * `clock`: the injectable millisecond time source
//! * `encoder`: turns an error value into the description that identifies it
//! * `snapshot`: saves and loads region images
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use distinct_exception_log::{DistinctExceptionLog, ExceptionLogReader, SharedRegion};
//! use distinct_exception_log::clock::SystemEpochClock;
//! use distinct_exception_log::encoder::ErrorChainEncoder;
//!
//! let region = Arc::new(SharedRegion::new(64 * 1024).unwrap());
//! let log = DistinctExceptionLog::new(region.clone(), SystemEpochClock, ErrorChainEncoder);
//!
//! let err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer went away");
//! log.record(&err);
//! log.record(&err);
//!
//! let mut report = |count: u32, first: i64, last: i64, description: &str| {
//!     println!("{count} x {description} ({first}..{last})");
//! };
//! assert_eq!(ExceptionLogReader::read(&region, &mut report), 1);
//! ```

pub mod clock;
pub mod diagnostics;
pub mod distinct_log;
pub mod encoder;
pub mod log_reader;
pub mod record_layout;
pub mod shared_region;
pub mod snapshot;

pub use clock::{EpochClock, ManualClock, SystemEpochClock};
pub use distinct_log::{DistinctExceptionLog, DropReason, RecordOutcome};
pub use encoder::{DisplayEncoder, EncodeError, ErrorChainEncoder, ExceptionEncoder};
pub use log_reader::{ExceptionConsumer, ExceptionLogReader, ExceptionObservation};
pub use shared_region::{RegionError, SharedRegion};
