#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing and examples of `asset_pool`.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

mod fake_host;

pub use fake_host::*;

/// Runs `test_fn` on a separate thread and fails the test if it does not finish in time.
///
/// Pool tests drive futures by hand, so a missed wakeup shows up as a hang rather than a
/// failure. The watchdog turns such a hang into a panic after 10 seconds (60 seconds under
/// Miri).
///
/// Setting `MUTATION_TESTING=1` runs `test_fn` directly on the calling thread, so that
/// mutation testing can detect mutants that hang.
///
/// # Panics
///
/// Panics if `test_fn` panics or exceeds the timeout.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let answer = with_watchdog(|| 6 * 7);
/// assert_eq!(answer, 42);
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let timeout = if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    };

    let (sender, receiver) = mpsc::channel();

    let worker = thread::spawn(move || {
        // The receiver is gone if the watchdog already gave up.
        drop(sender.send(test_fn()));
    });

    match receiver.recv_timeout(timeout) {
        Ok(result) => {
            worker.join().expect("test thread finished after sending its result");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test did not finish within {} seconds", timeout.as_secs());
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match worker.join() {
            Ok(()) => panic!("test thread exited without producing a result"),
            Err(payload) => std::panic::resume_unwind(payload),
        },
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn returns_result_of_fast_test() {
        assert_eq!(with_watchdog(|| "done"), "done");
    }

    #[test]
    #[should_panic(expected = "inner failure")]
    fn propagates_test_panic() {
        with_watchdog::<_, ()>(|| panic!("inner failure"));
    }
}
