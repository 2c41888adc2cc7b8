///
/// # Integration Tests for pthreading-sync
///
/// Cross-thread monitor scenarios: waking N waiters one notify at a time,
/// waking them all at once, and the timing contract of timed waits.
///

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use pthreading_sync::{Condition, Lock, Mutex, RecursiveMutex, SyncError};

const WAITERS: usize = 5;

struct Shared {
    cond: Condition,
    blocked: AtomicUsize,
    woken: AtomicUsize,
    inside: AtomicUsize,
}

impl Shared {
    fn new(cond: Condition) -> Arc<Self> {
        Arc::new(Shared {
            cond,
            blocked: AtomicUsize::new(0),
            woken: AtomicUsize::new(0),
            inside: AtomicUsize::new(0),
        })
    }
}

fn spawn_waiters(shared: &Arc<Shared>) -> Vec<JoinHandle<()>> {
    (0..WAITERS)
        .map(|_| {
            let shared = Arc::clone(shared);
            thread::spawn(move || {
                let _guard = shared.cond.guard().unwrap();
                shared.blocked.fetch_add(1, Ordering::SeqCst);
                assert!(shared.cond.wait(Some(Duration::from_secs(30))).unwrap());

                // Only one woken waiter may hold the lock at a time.
                assert_eq!(shared.inside.fetch_add(1, Ordering::SeqCst), 0);
                shared.woken.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
                shared.inside.fetch_sub(1, Ordering::SeqCst);
            })
        })
        .collect()
}

/// Every waiter has registered and released the lock into `wait`.
fn wait_until_all_blocked(shared: &Shared) {
    while shared.blocked.load(Ordering::SeqCst) < WAITERS {
        thread::sleep(Duration::from_millis(1));
    }
    let _guard = shared.cond.guard().unwrap();
}

fn wait_for_woken(shared: &Shared, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(30);
    while shared.woken.load(Ordering::SeqCst) < count {
        assert!(Instant::now() < deadline, "waiter never woke");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_notify_wakes_one_at_a_time() {
    let shared = Shared::new(Condition::new());
    let handles = spawn_waiters(&shared);
    wait_until_all_blocked(&shared);

    for n in 1..=WAITERS {
        {
            let _guard = shared.cond.guard().unwrap();
            shared.cond.notify().unwrap();
        }
        wait_for_woken(&shared, n);
    }

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(shared.woken.load(Ordering::SeqCst), WAITERS);
}

#[test]
fn test_notify_all_wakes_everyone() {
    let shared = Shared::new(Condition::with_lock(RecursiveMutex::new()));
    let handles = spawn_waiters(&shared);
    wait_until_all_blocked(&shared);

    {
        let _guard = shared.cond.guard().unwrap();
        shared.cond.notify_all().unwrap();
    }

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(shared.woken.load(Ordering::SeqCst), WAITERS);
}

#[test]
fn test_notified_before_timeout() {
    let shared = Shared::new(Condition::with_lock(Arc::new(Mutex::new())));
    let timeout = Duration::from_secs(5);

    let notifier = {
        let shared = Arc::clone(&shared);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let _guard = shared.cond.guard().unwrap();
            shared.cond.notify().unwrap();
        })
    };

    let _guard = shared.cond.guard().unwrap();
    let start = Instant::now();
    assert!(shared.cond.wait(Some(timeout)).unwrap());
    assert!(start.elapsed() < timeout);
    drop(_guard);
    notifier.join().unwrap();
}

#[test]
fn test_timeout_without_notification() {
    let cond = Condition::new();
    let timeout = Duration::from_millis(150);

    let _guard = cond.guard().unwrap();
    let start = Instant::now();
    assert!(!cond.wait(Some(timeout)).unwrap());
    assert!(start.elapsed() >= timeout);
}

#[test]
fn test_flag_loop_with_recursive_lock() {
    let rlock = Arc::new(RecursiveMutex::new());
    let cond = Arc::new(Condition::with_lock(Arc::clone(&rlock)));
    let flag = Arc::new(AtomicUsize::new(0));

    let setter = {
        let cond = Arc::clone(&cond);
        let flag = Arc::clone(&flag);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let _guard = cond.guard().unwrap();
            flag.store(1, Ordering::SeqCst);
            cond.notify().unwrap();
        })
    };

    rlock.acquire(true).unwrap();
    rlock.acquire(true).unwrap();
    while flag.load(Ordering::SeqCst) == 0 {
        cond.wait(Some(Duration::from_millis(10))).unwrap();
    }
    assert_eq!(rlock.depth(), 2);
    rlock.release().unwrap();
    rlock.release().unwrap();
    setter.join().unwrap();
}

#[test]
fn test_wait_from_non_owner_thread() {
    let cond = Arc::new(Condition::new());
    let _guard = cond.guard().unwrap();

    let probe = Arc::clone(&cond);
    let result = thread::spawn(move || probe.wait(Some(Duration::from_millis(10))))
        .join()
        .unwrap();
    assert!(matches!(result, Err(SyncError::NotOwner { operation: "wait" })));
}
