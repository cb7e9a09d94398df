use distinct_exception_log::encoder::EncodeError;
use distinct_exception_log::{
    DisplayEncoder, DistinctExceptionLog, DropReason, ExceptionLogReader, ManualClock, RecordOutcome,
    SharedRegion,
};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Unprintable;

impl fmt::Display for Unprintable {
    fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
        Err(fmt::Error)
    }
}

fn display_log(capacity: usize) -> (Arc<SharedRegion>, ManualClock, DistinctExceptionLog<ManualClock, DisplayEncoder>) {
    let region = Arc::new(SharedRegion::new(capacity).unwrap());
    let clock = ManualClock::new(0);
    let log = DistinctExceptionLog::new(region.clone(), clock.clone(), DisplayEncoder);
    (region, clock, log)
}

#[test]
fn test_first_observation_sets_both_timestamps() {
    let (region, clock, log) = display_log(4096);
    clock.set(1_700_000_000_123);

    log.record("connection refused");

    let records = ExceptionLogReader::collect(&region, i64::MIN);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].observation_count, 1);
    assert_eq!(records[0].first_observation_timestamp, 1_700_000_000_123);
    assert_eq!(records[0].last_observation_timestamp, 1_700_000_000_123);
    assert_eq!(records[0].description, "connection refused");
}

#[test]
fn test_recurrence_merges_in_place() {
    let (region, clock, log) = display_log(4096);

    for t in 1..=100 {
        clock.set(t);
        log.record("timeout");
    }

    let records = ExceptionLogReader::collect(&region, i64::MIN);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].observation_count, 100);
    assert_eq!(records[0].first_observation_timestamp, 1);
    assert_eq!(records[0].last_observation_timestamp, 100);
    // One record's worth of space, however often it recurs.
    assert_eq!(log.tail(), 32);
}

#[test]
fn test_descriptions_compare_by_exact_bytes() {
    let (region, _clock, log) = display_log(4096);

    log.record("timeout");
    log.record("timeout ");
    log.record("Timeout");
    log.record("timeout");

    let records = ExceptionLogReader::collect(&region, i64::MIN);
    let summary: Vec<_> = records
        .iter()
        .map(|r| (r.description.as_str(), r.observation_count))
        .collect();
    assert_eq!(summary, vec![("timeout", 2), ("timeout ", 1), ("Timeout", 1)]);
}

#[test]
fn test_encoding_failure_is_swallowed() {
    let (region, _clock, log) = display_log(4096);

    log.record(&Unprintable);
    assert_eq!(
        log.record_outcome(&Unprintable),
        RecordOutcome::Dropped(DropReason::Encoding(EncodeError::Format))
    );

    assert_eq!(ExceptionLogReader::read(&region, &mut |_: u32, _: i64, _: i64, _: &str| {}), 0);
}

#[test]
fn test_panicking_encoder_is_swallowed() {
    let region = Arc::new(SharedRegion::new(4096).unwrap());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let encoder = move |value: &u32| -> Result<Vec<u8>, EncodeError> {
        counter.fetch_add(1, Ordering::SeqCst);
        if *value == 0 {
            panic!("cannot render zero");
        }
        Ok(value.to_string().into_bytes())
    };
    let log = DistinctExceptionLog::new(region.clone(), ManualClock::new(3), encoder);

    assert_eq!(
        log.record_outcome(&0u32),
        RecordOutcome::Dropped(DropReason::Encoding(EncodeError::Panicked))
    );
    log.record(&7u32);

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let records = ExceptionLogReader::collect(&region, i64::MIN);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].description, "7");
}

#[test]
fn test_full_region_drops_new_but_keeps_merging() {
    // Two 32-byte records fit, a third does not.
    let (region, clock, log) = display_log(64);

    clock.set(1);
    log.record("alpha");
    log.record("bravo");
    clock.set(2);
    assert_eq!(
        log.record_outcome("charlie"),
        RecordOutcome::Dropped(DropReason::CapacityExhausted)
    );

    for t in 3..10 {
        clock.set(t);
        log.record("bravo");
    }

    let records = ExceptionLogReader::collect(&region, i64::MIN);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].description, "alpha");
    assert_eq!(records[1].description, "bravo");
    assert_eq!(records[1].observation_count, 8);
    assert_eq!(records[1].last_observation_timestamp, 9);
}

#[test]
fn test_small_leftover_space_ends_the_log() {
    // After one record 12 bytes remain: less than a header.
    let (region, _clock, log) = display_log(44);

    log.record("first");
    log.record("second");

    assert_eq!(log.tail(), 32);
    assert_eq!(ExceptionLogReader::collect(&region, i64::MIN).len(), 1);
}

#[test]
fn test_last_record_fills_unaligned_region_exactly() {
    // 32 bytes for "alpha", then 24 + 5 for "bravo" ends right at 61.
    let (region, _clock, log) = display_log(61);

    assert_eq!(log.record_outcome("alpha"), RecordOutcome::Appended { offset: 0 });
    assert_eq!(log.record_outcome("bravo"), RecordOutcome::Appended { offset: 32 });
    assert_eq!(log.tail(), 61);
    assert_eq!(
        log.record_outcome("c"),
        RecordOutcome::Dropped(DropReason::CapacityExhausted)
    );

    let records = ExceptionLogReader::collect(&region, i64::MIN);
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].description, "bravo");
}

#[test]
fn test_two_logs_on_one_region_keep_each_others_records() {
    let region = Arc::new(SharedRegion::new(4096).unwrap());
    let first = DistinctExceptionLog::new(region.clone(), ManualClock::new(1), DisplayEncoder);
    let second = DistinctExceptionLog::new(region.clone(), ManualClock::new(2), DisplayEncoder);

    first.record("alpha failure");
    second.record("beta");
    second.record("alpha failure");
    first.record("beta");

    let records = ExceptionLogReader::collect(&region, i64::MIN);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].description, "alpha failure");
    assert_eq!(records[0].observation_count, 2);
    assert_eq!(records[0].first_observation_timestamp, 1);
    assert_eq!(records[0].last_observation_timestamp, 2);
    assert_eq!(records[1].description, "beta");
    assert_eq!(records[1].observation_count, 2);
    assert_eq!(records[1].first_observation_timestamp, 2);
    assert_eq!(records[1].last_observation_timestamp, 1);
}

#[test]
fn test_record_through_trait_object() {
    let region = Arc::new(SharedRegion::new(4096).unwrap());
    let log = DistinctExceptionLog::new(
        region.clone(),
        ManualClock::new(0),
        distinct_exception_log::ErrorChainEncoder,
    );

    let errors: Vec<Box<dyn std::error::Error + Send + Sync>> = vec![
        "bad header".into(),
        "bad header".into(),
        Box::new(std::io::Error::new(std::io::ErrorKind::Other, "socket closed")),
    ];
    for err in &errors {
        log.record(err.as_ref());
    }

    let records = ExceptionLogReader::collect(&region, i64::MIN);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].observation_count, 2);
    assert_eq!(records[0].description, "bad header");
    assert_eq!(records[1].description, "socket closed");
}

#[test]
fn test_closure_clock() {
    let region = Arc::new(SharedRegion::new(4096).unwrap());
    let ticks = AtomicUsize::new(0);
    let clock = move || ticks.fetch_add(10, Ordering::SeqCst) as i64;
    let log = DistinctExceptionLog::new(region.clone(), clock, DisplayEncoder);

    log.record("tick");
    log.record("tick");
    log.record("tick");

    let records = ExceptionLogReader::collect(&region, i64::MIN);
    assert_eq!(records[0].first_observation_timestamp, 0);
    assert_eq!(records[0].last_observation_timestamp, 20);
}
