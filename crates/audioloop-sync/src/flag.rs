// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Per-thread interrupt flag.
//!
//! Every interruptible worker owns exactly one [`InterruptFlag`]. Setting it is
//! permanent. While the worker is blocked it may register the condition
//! variable it sleeps on, and [`InterruptFlag::set`] wakes that condvar so the
//! worker notices the interrupt without waiting out its timeout.
//!
//! `set` only ever takes the flag's own bookkeeping lock, never a mutex of
//! the waiter, so it can be called while holding any lock. A notification
//! that lands between a waiter's flag check and the moment it parks is lost;
//! waiters therefore block for at most one poll interval at a time and
//! re-check the flag.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::trace;

use crate::error::{InterruptResult, Interrupted};

/// Pointer to the currently registered condvar.
struct WaitTarget(NonNull<Condvar>);

// SAFETY: `Condvar` is `Sync`, and the pointer is only dereferenced while the
// slot lock is held and the `Registration` that stored it is still alive.
unsafe impl Send for WaitTarget {}

/// Cancellable state of a single worker thread.
pub struct InterruptFlag {
    flag: AtomicBool,
    target: Mutex<Option<WaitTarget>>,
}

impl InterruptFlag {
    pub fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
            target: Mutex::new(None),
        }
    }

    /// Set the flag and wake the registered condvar, if any.
    ///
    /// Idempotent and non-blocking apart from the flag's own bookkeeping
    /// lock, which is never held while waiting.
    pub fn set(&self) {
        self.flag.store(true, Ordering::Release);
        let slot = self.target.lock();
        if let Some(target) = slot.as_ref() {
            trace!("Waking registered condvar");
            // SAFETY: the registration that stored this pointer clears the
            // slot before its borrow ends, and we hold the slot lock.
            unsafe { target.0.as_ref() }.notify_all();
        }
    }

    /// Whether the flag has been set.
    #[inline]
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// `Err(Interrupted)` once the flag is set.
    #[inline]
    pub fn check(&self) -> InterruptResult {
        if self.is_set() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }

    /// Register `condvar` as the one [`set`](Self::set) wakes.
    ///
    /// The registration lasts until the returned value is dropped.
    ///
    /// # Panics
    ///
    /// Panics if another registration is still active.
    pub(crate) fn register<'a>(&'a self, condvar: &'a Condvar) -> Registration<'a> {
        let mut slot = self.target.lock();
        assert!(
            slot.is_none(),
            "interrupt flag already has a registered wait target"
        );
        *slot = Some(WaitTarget(NonNull::from(condvar)));

        Registration {
            flag: self,
            _target: PhantomData,
        }
    }

    /// Block on `condvar` until notified or until the flag is set.
    ///
    /// Each block lasts at most `poll_interval`; a spurious or missed
    /// notification only costs one slice. As with any condvar wait the
    /// caller re-checks its own condition on return.
    pub fn wait<T: ?Sized>(
        &self,
        condvar: &Condvar,
        guard: &mut MutexGuard<'_, T>,
        poll_interval: Duration,
    ) -> InterruptResult {
        let _registration = self.register(condvar);
        while !self.is_set() {
            if !condvar.wait_for(guard, poll_interval).timed_out() {
                break;
            }
        }
        self.check()
    }

    #[cfg(test)]
    pub(crate) fn has_target(&self) -> bool {
        self.target.lock().is_some()
    }
}

impl Default for InterruptFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InterruptFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptFlag")
            .field("set", &self.is_set())
            .finish_non_exhaustive()
    }
}

/// Active registration of a condvar; clears the slot on drop.
pub(crate) struct Registration<'a> {
    flag: &'a InterruptFlag,
    _target: PhantomData<&'a Condvar>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        *self.flag.target.lock() = None;
    }
}
