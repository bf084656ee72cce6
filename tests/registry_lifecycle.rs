use entity_locker::config::{CONFIG_FILE_NAME, LockerConfig};
use entity_locker::locking::{
    CancellationToken, LockAcquisitionRequest, LockRegistry, LockTimeoutSource, LockTimeoutValue,
    OwnerId, RegistryReport,
};
use entity_locker::LockerError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Non-atomic increment: racing callers lose updates unless serialized.
fn racy_increment(counter: &AtomicU64) {
    let value = counter.load(Ordering::Relaxed);
    thread::yield_now();
    counter.store(value + 1, Ordering::Relaxed);
}

fn wait_until<F: Fn() -> bool>(condition: F) {
    let start = Instant::now();
    while !condition() {
        assert!(
            start.elapsed() < Duration::from_secs(10),
            "condition not reached in time"
        );
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn protected_increment_in_single_thread() {
    let registry = LockRegistry::<u64>::new();
    let counter = AtomicU64::new(0);

    registry.lock(&1).unwrap();
    racy_increment(&counter);
    registry.unlock(&1).unwrap();

    assert_eq!(counter.load(Ordering::Relaxed), 1);
    assert!(registry.is_empty());
}

#[test]
fn concurrent_increments_are_serialized() {
    let registry = LockRegistry::<u64>::new();
    let counter = Arc::new(AtomicU64::new(0));
    let threads = 200;
    let barrier = Arc::new(Barrier::new(threads));

    let joins: Vec<_> = (0..threads)
        .map(|_| {
            let registry = registry.clone();
            let counter = Arc::clone(&counter);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                registry.lock(&1).unwrap();
                racy_increment(&counter);
                registry.unlock(&1).unwrap();
            })
        })
        .collect();
    for join in joins {
        join.join().unwrap();
    }

    assert_eq!(counter.load(Ordering::Relaxed), threads as u64);
    assert!(registry.is_empty());
}

#[test]
fn different_keys_do_not_block_each_other() {
    let registry = LockRegistry::<String>::new();
    registry.lock(&"account-a".to_string()).unwrap();

    let other = registry.clone();
    let acquired = thread::spawn(move || {
        let key = "account-b".to_string();
        let acquired = other.try_lock(&key).unwrap();
        if acquired {
            other.unlock(&key).unwrap();
        }
        acquired
    })
    .join()
    .unwrap();

    assert!(acquired);
    assert!(registry.is_locked(&"account-a".to_string()));
    registry.unlock(&"account-a".to_string()).unwrap();
}

#[test]
fn reentrant_owner_must_unlock_every_hold() {
    let registry = LockRegistry::<u64>::new();
    for _ in 0..3 {
        registry.lock(&5).unwrap();
    }
    assert_eq!(registry.hold_count(&5), 3);

    let probe = |registry: &LockRegistry<u64>| {
        let contender = registry.clone();
        thread::spawn(move || {
            let acquired = contender.try_lock(&5).unwrap();
            if acquired {
                contender.unlock(&5).unwrap();
            }
            acquired
        })
        .join()
        .unwrap()
    };

    registry.unlock(&5).unwrap();
    registry.unlock(&5).unwrap();
    assert!(!probe(&registry));
    registry.unlock(&5).unwrap();
    assert!(probe(&registry));
    assert!(registry.is_empty());
}

#[test]
fn insufficient_timeout_fails_without_side_effects() {
    let registry = LockRegistry::<u64>::new();
    let counter = Arc::new(AtomicU64::new(0));
    let held = Arc::new(Barrier::new(2));

    let holder = {
        let registry = registry.clone();
        let counter = Arc::clone(&counter);
        let held = Arc::clone(&held);
        thread::spawn(move || {
            registry.lock(&1).unwrap();
            held.wait();
            thread::sleep(Duration::from_millis(300));
            racy_increment(&counter);
            registry.unlock(&1).unwrap();
        })
    };

    held.wait();
    let err = registry
        .lock_timeout(&1, Duration::from_millis(10))
        .unwrap_err();
    match err {
        LockerError::LockTimeout { key, waited_secs } => {
            assert_eq!(key, "1");
            assert!(waited_secs >= 0.01);
        }
        other => panic!("Expected timeout error, got {other:?}"),
    }
    assert_eq!(registry.hold_count(&1), 0);

    holder.join().unwrap();
    assert_eq!(counter.load(Ordering::Relaxed), 1);
    assert!(registry.is_empty());
}

#[test]
fn sufficient_timeout_eventually_acquires() {
    let registry = LockRegistry::<u64>::new();
    let counter = Arc::new(AtomicU64::new(0));
    let held = Arc::new(Barrier::new(2));

    let holder = {
        let registry = registry.clone();
        let counter = Arc::clone(&counter);
        let held = Arc::clone(&held);
        thread::spawn(move || {
            registry.lock(&1).unwrap();
            held.wait();
            thread::sleep(Duration::from_millis(100));
            racy_increment(&counter);
            registry.unlock(&1).unwrap();
        })
    };

    held.wait();
    registry.lock_timeout(&1, Duration::from_secs(5)).unwrap();
    racy_increment(&counter);
    registry.unlock(&1).unwrap();

    holder.join().unwrap();
    assert_eq!(counter.load(Ordering::Relaxed), 2);
}

#[test]
fn unlock_without_ownership_is_rejected() {
    let registry = LockRegistry::<u64>::new();

    // Nobody holds it.
    assert!(matches!(
        registry.unlock(&1).unwrap_err(),
        LockerError::NotOwner { .. }
    ));

    // Another thread holds it.
    let held = Arc::new(Barrier::new(2));
    let done = Arc::new(Barrier::new(2));
    let holder = {
        let registry = registry.clone();
        let held = Arc::clone(&held);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            registry.lock(&1).unwrap();
            held.wait();
            done.wait();
            registry.unlock(&1).unwrap();
        })
    };

    held.wait();
    assert!(matches!(
        registry.unlock(&1).unwrap_err(),
        LockerError::NotOwner { .. }
    ));
    assert!(registry.is_locked(&1));
    assert!(!registry.try_lock(&1).unwrap());

    done.wait();
    holder.join().unwrap();
    assert!(registry.is_empty());
}

#[test]
fn invalid_keys_are_rejected_everywhere() {
    let registry = LockRegistry::<Option<String>>::new();
    for key in [None, Some(String::new()), Some("  ".to_string())] {
        assert!(matches!(
            registry.lock(&key).unwrap_err(),
            LockerError::InvalidKey { .. }
        ));
        assert!(matches!(
            registry.lock_timeout(&key, Duration::from_millis(1)).unwrap_err(),
            LockerError::InvalidKey { .. }
        ));
        assert!(matches!(
            registry.unlock(&key).unwrap_err(),
            LockerError::InvalidKey { .. }
        ));
    }
    assert!(registry.is_empty());
}

#[test]
fn distinct_keys_are_reclaimed() {
    let registry = LockRegistry::<u64>::new();
    for key in 0..10_000u64 {
        registry.lock(&key).unwrap();
        registry.unlock(&key).unwrap();
    }
    assert!(registry.is_empty());

    let handles: Vec<_> = (0..100u64).map(|key| registry.resolve(&key).unwrap()).collect();
    assert_eq!(registry.len(), 100);
    drop(handles);
    assert_eq!(registry.snapshot(), RegistryReport::default());
}

#[test]
fn waiters_are_served_in_arrival_order() {
    let registry = LockRegistry::<u64>::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    registry.lock(&1).unwrap();

    let mut joins = Vec::new();
    for idx in 0..8usize {
        let contender = registry.clone();
        let order = Arc::clone(&order);
        joins.push(thread::spawn(move || {
            contender.lock(&1).unwrap();
            order.lock().unwrap().push(idx);
            contender.unlock(&1).unwrap();
        }));
        wait_until(|| registry.queue_length(&1) == idx + 1);
    }

    registry.unlock(&1).unwrap();
    for join in joins {
        join.join().unwrap();
    }

    assert_eq!(*order.lock().unwrap(), (0..8).collect::<Vec<_>>());
    assert!(registry.is_empty());
}

#[test]
fn cancelled_waiter_leaves_queue_and_keeps_order() {
    let registry = LockRegistry::<u64>::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    let token = CancellationToken::new();
    registry.lock(&1).unwrap();

    let spawn_waiter = |idx: usize, token: Option<CancellationToken>| {
        let contender = registry.clone();
        let order = Arc::clone(&order);
        thread::spawn(move || {
            let mut request = LockAcquisitionRequest::blocking();
            if let Some(token) = token {
                request = request.with_cancellation(token);
            }
            let result = contender.acquire_with(&1, request);
            if result.is_ok() {
                order.lock().unwrap().push(idx);
                contender.unlock(&1).unwrap();
            }
            result
        })
    };

    let first = spawn_waiter(0, None);
    wait_until(|| registry.queue_length(&1) == 1);
    let cancelled = spawn_waiter(1, Some(token.clone()));
    wait_until(|| registry.queue_length(&1) == 2);
    let last = spawn_waiter(2, None);
    wait_until(|| registry.queue_length(&1) == 3);

    token.cancel();
    let err = cancelled.join().unwrap().unwrap_err();
    assert!(matches!(err, LockerError::Cancelled { .. }));
    assert_eq!(registry.queue_length(&1), 2);

    registry.unlock(&1).unwrap();
    first.join().unwrap().unwrap();
    last.join().unwrap().unwrap();

    assert_eq!(*order.lock().unwrap(), vec![0, 2]);
    assert!(registry.is_empty());
}

#[test]
fn explicit_owner_ids_model_logical_tasks() {
    let registry = LockRegistry::<&'static str>::new();
    let task = OwnerId::allocate();

    registry
        .acquire_with(&"ledger", LockAcquisitionRequest::blocking().with_owner(task))
        .unwrap();

    // The task may be resumed on another thread and still release its lock.
    let other_thread = registry.clone();
    thread::spawn(move || other_thread.unlock_as(&"ledger", task))
        .join()
        .unwrap()
        .unwrap();
    assert!(registry.is_empty());
}

#[test]
fn registry_built_from_config_file() {
    let temp = TempDir::new().unwrap();
    std::fs::write(
        temp.path().join(CONFIG_FILE_NAME),
        "[locking]\ntimeout = \"50ms\"\nmax_reentrancy = 2\n",
    )
    .unwrap();

    let config = LockerConfig::load(temp.path()).unwrap();
    let registry = LockRegistry::<u64>::from_locking_config(&config.locking, None).unwrap();
    assert_eq!(
        registry.default_timeout().value,
        LockTimeoutValue::from_millis(50)
    );
    assert_eq!(registry.default_timeout().source, LockTimeoutSource::Config);

    registry.acquire(&1).unwrap();
    registry.acquire(&1).unwrap();
    assert!(matches!(
        registry.acquire(&1).unwrap_err(),
        LockerError::ReentrancyOverflow { limit: 2, .. }
    ));
    registry.unlock(&1).unwrap();
    registry.unlock(&1).unwrap();
    assert!(registry.is_empty());
}

#[test]
fn cancelled_timed_waiter_leaves_holder_untouched() {
    let registry = LockRegistry::<u64>::new();
    registry.lock(&1).unwrap();

    let request_token = CancellationToken::new();
    let call_token = CancellationToken::new();
    let via_request = {
        let contender = registry.clone();
        let token = request_token.clone();
        thread::spawn(move || {
            let request = LockAcquisitionRequest::new(LockTimeoutValue::from_secs(10))
                .with_cancellation(token);
            contender.acquire_with(&1, request)
        })
    };
    wait_until(|| registry.queue_length(&1) == 1);
    let via_call = {
        let contender = registry.clone();
        let token = call_token.clone();
        thread::spawn(move || {
            contender.lock_timeout_cancellable(&1, Duration::from_secs(10), &token)
        })
    };
    wait_until(|| registry.queue_length(&1) == 2);

    request_token.cancel();
    let err = via_request.join().unwrap().unwrap_err();
    assert!(matches!(err, LockerError::Cancelled { .. }));
    assert_eq!(registry.queue_length(&1), 1);

    call_token.cancel();
    let err = via_call.join().unwrap().unwrap_err();
    assert!(matches!(err, LockerError::Cancelled { .. }));
    assert_eq!(registry.queue_length(&1), 0);

    assert_eq!(registry.hold_count(&1), 1);
    registry.unlock(&1).unwrap();
    assert!(registry.is_empty());
}

#[test]
fn hand_off_at_deadline_never_strands_the_lock() {
    let registry = LockRegistry::<u64>::new();
    for round in 0..1_000u64 {
        registry.lock(&1).unwrap();

        let contender = registry.clone();
        let waiter = thread::spawn(move || {
            match contender.lock_timeout(&1, Duration::from_micros(500)) {
                Ok(()) => {
                    assert_eq!(contender.hold_count(&1), 1);
                    contender.unlock(&1).unwrap();
                }
                Err(LockerError::LockTimeout { .. }) => {}
                Err(other) => panic!("Expected acquisition or timeout, got {other:?}"),
            }
        });

        thread::sleep(Duration::from_micros(100 * (round % 10)));
        registry.unlock(&1).unwrap();
        waiter.join().unwrap();

        assert!(!registry.is_locked(&1));
        assert!(registry.is_empty());
    }
}
