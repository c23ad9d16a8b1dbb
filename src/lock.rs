//! Scoped, all-or-nothing acquisition of N [`parking_lot::Mutex`]es.
//!
//! Two-lock deadlock (holder A wants X then Y, holder B wants Y then X) is avoided without a
//! global lock order: every acquisition attempt is non-blocking, and on any failure the whole
//! batch already held in this attempt is released before backing off and retrying. This lets
//! whichever caller is already holding a contested lock make progress and finish.

use parking_lot::{Mutex, MutexGuard};
use std::time::Duration;

/// Default back-off between acquisition attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Raised when `max_retries` is reached without acquiring every lock in the set.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("failed to acquire locks after retrying")]
pub struct LockTimeout;

/// An acquired, ordered set of guards. Dropping a [`LockSet`] releases every guard in the
/// reverse of its acquisition order.
pub struct LockSet<'a, T> {
    guards: Vec<MutexGuard<'a, T>>,
}

impl<'a, T> LockSet<'a, T> {
    /// Returns the guard for the mutex at `index` in the order passed to [`acquire`].
    pub fn get(&self, index: usize) -> &T {
        &self.guards[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut T {
        &mut self.guards[index]
    }
}

impl<'a, T> Drop for LockSet<'a, T> {
    fn drop(&mut self) {
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
    }
}

/// Attempts to acquire every mutex in `mutexes`, in order, using non-blocking `try_lock`.
///
/// On any single failure, every guard already held in this attempt is released (in reverse
/// acquisition order), the coordinator sleeps `retry_delay`, and the whole batch is retried from
/// the start. Succeeds only once all mutexes are held simultaneously. Fails with
/// [`LockTimeout`] once `max_retries` attempts have been made; `None` retries indefinitely.
pub fn acquire<'a, T>(
    mutexes: &[&'a Mutex<T>],
    retry_delay: Duration,
    max_retries: Option<u32>,
) -> Result<LockSet<'a, T>, LockTimeout> {
    let mut retries = 0u32;

    loop {
        let mut guards = Vec::with_capacity(mutexes.len());
        let mut failed = false;

        for mutex in mutexes {
            match mutex.try_lock() {
                Some(guard) => guards.push(guard),
                None => {
                    failed = true;
                    break;
                }
            }
        }

        if !failed {
            return Ok(LockSet { guards });
        }

        // release everything acquired this attempt, in reverse order
        while let Some(guard) = guards.pop() {
            drop(guard);
        }

        if let Some(max) = max_retries {
            if retries >= max {
                return Err(LockTimeout);
            }
        }

        retries += 1;
        std::thread::sleep(retry_delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn acquires_all_locks_in_order() {
        let a = Mutex::new(1);
        let b = Mutex::new(2);

        let set = acquire(&[&a, &b], Duration::from_millis(1), Some(1)).unwrap();
        assert_eq!(*set.get(0), 1);
        assert_eq!(*set.get(1), 2);
    }

    #[test]
    fn releases_all_on_normal_completion() {
        let a = Mutex::new(1);
        {
            let _set = acquire(&[&a], Duration::from_millis(1), Some(1)).unwrap();
        }
        assert!(a.try_lock().is_some());
    }

    #[test]
    fn times_out_when_a_lock_is_held() {
        let a = Mutex::new(1);
        let b = Mutex::new(2);
        let _held = b.lock();

        let result = acquire(&[&a, &b], Duration::from_millis(1), Some(3));
        assert!(matches!(result, Err(LockTimeout)));
        // `a` must have been released on every failed attempt, not left held
        assert!(a.try_lock().is_some());
    }

    #[test]
    fn concurrent_disjoint_acquisitions_do_not_deadlock() {
        let x = Arc::new(Mutex::new(0));
        let y = Arc::new(Mutex::new(0));

        let (x1, y1) = (x.clone(), y.clone());
        let t1 = std::thread::spawn(move || {
            acquire(&[&*x1, &*y1], Duration::from_millis(1), None).unwrap();
        });

        let (x2, y2) = (y.clone(), x.clone());
        let t2 = std::thread::spawn(move || {
            acquire(&[&*x2, &*y2], Duration::from_millis(1), None).unwrap();
        });

        t1.join().unwrap();
        t2.join().unwrap();
    }
}
