//! Shared count cell.
//!
//! The only mutable state shared between the detection loop and the publisher
//! loop. The lock is held for a single load or store, never across detector or
//! sink calls.

use std::sync::{Arc, Mutex, MutexGuard};

/// Number of matching detections in one frame.
pub type Count = u32;

/// Latest known count. Cloning yields another handle to the same slot.
#[derive(Clone, Debug, Default)]
pub struct CountCell {
    inner: Arc<Mutex<Count>>,
}

impl CountCell {
    /// New cell holding 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored count. Last write wins; unread values are dropped.
    pub fn write(&self, count: Count) {
        *self.lock() = count;
    }

    /// Most recently written count, or 0 if nothing has been written.
    pub fn read(&self) -> Count {
        *self.lock()
    }

    // A panic while holding the lock cannot leave a plain integer half-written,
    // so a poisoned lock still holds a valid count.
    fn lock(&self) -> MutexGuard<'_, Count> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn read_before_write_is_zero() {
        assert_eq!(CountCell::new().read(), 0);
    }

    #[test]
    fn last_write_wins() {
        let cell = CountCell::new();
        for v in [3, 3, 5, 1, 8] {
            cell.write(v);
        }
        assert_eq!(cell.read(), 8);
    }

    #[test]
    fn clones_share_the_slot() {
        let writer = CountCell::new();
        let reader = writer.clone();
        writer.write(42);
        assert_eq!(reader.read(), 42);
    }

    #[test]
    fn concurrent_reads_never_observe_foreign_values() {
        const A: Count = 0x0000_FFFF;
        const B: Count = 0xFFFF_0000;

        let cell = CountCell::new();
        cell.write(A);
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cell = cell.clone();
                let done = done.clone();
                thread::spawn(move || {
                    let mut reads = 0u64;
                    while !done.load(Ordering::Relaxed) {
                        let v = cell.read();
                        assert!(v == A || v == B, "torn read: {:#x}", v);
                        reads += 1;
                    }
                    reads
                })
            })
            .collect();

        for i in 0..20_000 {
            cell.write(if i % 2 == 0 { B } else { A });
        }
        done.store(true, Ordering::Relaxed);

        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn poisoned_cell_still_serves_last_value() {
        let cell = CountCell::new();
        cell.write(7);
        let poisoner = cell.clone();
        let _ = thread::spawn(move || {
            let _guard = poisoner.inner.lock().unwrap();
            panic!("poison the lock");
        })
        .join();
        assert_eq!(cell.read(), 7);
        cell.write(9);
        assert_eq!(cell.read(), 9);
    }
}
