//! Submission permits bounding in-flight work.

use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
struct PermitState {
    available: usize,
    in_flight: usize,
    open: bool,
}

/// Counting permit pool with an "open" switch.
///
/// The submitter calls [`acquire`](Self::acquire) before each submission and
/// every finished work item calls [`release`](Self::release). Opening the
/// pool with [`release_all`](Self::release_all) wakes a blocked submitter and
/// makes all further acquires fail, which is how a failing worker stops the
/// run. [`drain`](Self::drain) waits for in-flight work regardless.
#[derive(Debug)]
pub struct PermitPool {
    capacity: usize,
    state: Mutex<PermitState>,
    changed: Condvar,
}

impl PermitPool {
    /// Pool of `capacity` permits (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(PermitState {
                available: capacity,
                in_flight: 0,
                open: false,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Block until a permit is free.
    ///
    /// Returns false, without taking a permit, once the pool is open.
    pub fn acquire(&self) -> bool {
        let mut state = self.state.lock();
        while state.available == 0 && !state.open {
            self.changed.wait(&mut state);
        }
        if state.open {
            return false;
        }
        state.available -= 1;
        state.in_flight += 1;
        true
    }

    /// Return the permit of one finished work item.
    pub fn release(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.in_flight > 0);
        state.in_flight = state.in_flight.saturating_sub(1);
        state.available = (state.available + 1).min(self.capacity);
        self.changed.notify_all();
    }

    /// Open the pool: wake waiters and refuse further permits.
    pub fn release_all(&self) {
        let mut state = self.state.lock();
        state.open = true;
        self.changed.notify_all();
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// Block until no work is in flight.
    pub fn drain(&self) {
        let mut state = self.state.lock();
        while state.in_flight > 0 {
            self.changed.wait(&mut state);
        }
    }
}
