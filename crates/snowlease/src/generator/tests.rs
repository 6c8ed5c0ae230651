use super::*;
use crate::config::GeneratorConfig;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use std::thread::scope;

/// A settable clock shared between a test and the generator under test.
struct MockTime {
    millis: AtomicI64,
}

impl MockTime {
    fn at(millis: i64) -> Arc<Self> {
        Arc::new(Self {
            millis: AtomicI64::new(millis),
        })
    }

    fn set(&self, millis: i64) {
        self.millis.store(millis, AtomicOrdering::SeqCst);
    }
}

impl TimeSource for MockTime {
    fn current_millis(&self) -> i64 {
        self.millis.load(AtomicOrdering::SeqCst)
    }
}

fn test_config() -> GeneratorConfig {
    GeneratorConfig {
        epoch_ms: 0,
        ..Default::default()
    }
}

fn mock_generator(worker_id: u16, clock: &Arc<MockTime>) -> IdGenerator<Arc<MockTime>> {
    IdGenerator::with_time_source(worker_id, test_config(), Arc::clone(clock)).unwrap()
}

#[test]
fn sequence_increments_within_same_tick() {
    let clock = MockTime::at(42);
    let generator = mock_generator(1, &clock);

    let id1 = generator.next().unwrap();
    let id2 = generator.next().unwrap();
    let id3 = generator.next().unwrap();

    assert_eq!(id1.timestamp(), 42);
    assert_eq!(id2.timestamp(), 42);
    assert_eq!(id3.timestamp(), 42);
    assert_eq!(id1.sequence(), 0);
    assert_eq!(id2.sequence(), 1);
    assert_eq!(id3.sequence(), 2);
    assert!(id1 < id2 && id2 < id3);
}

#[test]
fn same_tick_ids_are_equal_outside_sequence_bits() {
    let clock = MockTime::at(42);
    let generator = mock_generator(5, &clock);

    let a = generator.next().unwrap();
    let b = generator.next().unwrap();

    let mask = !SnowflakeId::SEQUENCE_MASK;
    assert_eq!(a.to_raw() & mask, b.to_raw() & mask);
}

#[test]
fn sequence_resets_when_timestamp_advances() {
    let clock = MockTime::at(42);
    let generator = mock_generator(1, &clock);

    for _ in 0..10 {
        generator.next().unwrap();
    }
    clock.set(43);

    let id = generator.next().unwrap();
    assert_eq!(id.timestamp(), 43);
    assert_eq!(id.sequence(), 0);
}

#[test]
fn exhausted_sequence_blocks_until_clock_advances() {
    let clock = MockTime::at(42);
    let generator = mock_generator(1, &clock);

    for i in 0..=SnowflakeId::max_sequence() {
        let id = generator.next().unwrap();
        assert_eq!(id.sequence(), i);
        assert_eq!(id.timestamp(), 42);
    }

    // The next call must wait for tick 43; advance the clock from a helper
    // thread while the caller is spinning.
    scope(|s| {
        s.spawn(|| {
            std::thread::sleep(core::time::Duration::from_millis(20));
            clock.set(43);
        });
        let id = generator.next().unwrap();
        assert_eq!(id.timestamp(), 43);
        assert_eq!(id.sequence(), 0);
    });
}

#[test]
fn small_clock_regression_is_absorbed() {
    let clock = MockTime::at(1_000_000);
    let generator = mock_generator(1, &clock);

    let before = generator.next().unwrap();

    // 30s backwards is within the 2 minute tolerance: next_id() waits for
    // the clock to catch up instead of failing.
    clock.set(1_000_000 - 30_000);
    scope(|s| {
        s.spawn(|| {
            std::thread::sleep(core::time::Duration::from_millis(20));
            clock.set(1_000_001);
        });
        let after = generator.next().unwrap();
        assert!(after > before);
        assert_eq!(after.timestamp(), 1_000_001);
    });
}

#[test]
fn large_clock_regression_is_fatal() {
    let clock = MockTime::at(1_000_000);
    let generator = mock_generator(1, &clock);

    generator.next().unwrap();
    clock.set(1_000_000 - 3 * 60 * 1000);

    match generator.next() {
        Err(Error::ClockBackwardsExceeded {
            behind_ms,
            tolerance_ms,
        }) => {
            assert_eq!(behind_ms, 180_000);
            assert_eq!(tolerance_ms, 120_000);
        }
        other => panic!("expected ClockBackwardsExceeded, got {other:?}"),
    }
}

#[test]
fn distinct_workers_never_collide_at_identical_tick_and_sequence() {
    let clock = MockTime::at(42);
    let g1 = mock_generator(1, &clock);
    let g2 = mock_generator(2, &clock);

    for _ in 0..100 {
        let a = g1.next().unwrap();
        let b = g2.next().unwrap();
        assert_eq!(a.timestamp(), b.timestamp());
        assert_eq!(a.sequence(), b.sequence());
        assert_ne!(a.to_raw(), b.to_raw());
    }
}

#[test]
fn ids_are_strictly_increasing_under_a_real_clock() {
    let generator = IdGenerator::new(1, GeneratorConfig::default()).unwrap();

    let mut last = -1i64;
    for _ in 0..50_000 {
        let id = generator.next_id().unwrap();
        assert!(id > last);
        last = id;
    }
}

#[test]
fn concurrent_callers_observe_unique_ids() {
    const THREADS: usize = 8;
    const IDS_PER_THREAD: usize = 10_000;

    let generator = Arc::new(IdGenerator::new(1, GeneratorConfig::default()).unwrap());
    let seen = parking_lot::Mutex::new(HashSet::with_capacity(THREADS * IDS_PER_THREAD));

    scope(|s| {
        for _ in 0..THREADS {
            let generator = Arc::clone(&generator);
            let seen = &seen;
            s.spawn(move || {
                for _ in 0..IDS_PER_THREAD {
                    let id = generator.next_id().unwrap();
                    assert!(seen.lock().insert(id), "duplicate id {id}");
                }
            });
        }
    });

    assert_eq!(seen.lock().len(), THREADS * IDS_PER_THREAD);
}

#[test]
fn worker_id_must_fit_the_layout() {
    let result = IdGenerator::new(4096 + 1, GeneratorConfig::default());
    assert!(matches!(result, Err(Error::InvalidConfig { .. })));
}

#[test]
fn generated_ids_are_non_negative() {
    let clock = MockTime::at(SnowflakeId::max_timestamp());
    let generator = mock_generator(4095, &clock);
    assert!(generator.next_id().unwrap() >= 0);
}
