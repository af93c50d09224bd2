// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Worker-side view of an interruptible thread.
//!
//! A [`ThreadContext`] is created on the worker thread when it starts and is
//! handed to the work closure. It carries the thread's [`InterruptFlag`] and
//! provides the interruption point plus the waits a worker uses instead of
//! raw condvar waits and sleeps.
//!
//! Every wait checks for an interrupt before and after blocking, registers
//! its condvar with the flag while blocked, and never sleeps longer than the
//! poll interval in one go. An interrupt is therefore noticed within one poll
//! interval even if the condvar is never notified.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::InterruptResult;
use crate::flag::InterruptFlag;

/// How a bounded wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// Notified, or the waited-on condition was satisfied.
    Woken,
    /// The caller's timeout elapsed first.
    TimedOut,
}

impl WaitStatus {
    pub fn timed_out(self) -> bool {
        self == WaitStatus::TimedOut
    }
}

/// Interrupt state and interruptible waits of the current worker thread.
pub struct ThreadContext {
    flag: Arc<InterruptFlag>,
    poll_interval: Duration,
    /// Private condvar for [`sleep_until`](Self::sleep_until); only the
    /// interrupt flag ever notifies it.
    sleep_lock: Mutex<()>,
    sleep_signal: Condvar,
}

impl ThreadContext {
    pub(crate) fn new(poll_interval: Duration) -> Self {
        Self {
            flag: Arc::new(InterruptFlag::new()),
            poll_interval,
            sleep_lock: Mutex::new(()),
            sleep_signal: Condvar::new(),
        }
    }

    pub(crate) fn flag(&self) -> Arc<InterruptFlag> {
        Arc::clone(&self.flag)
    }

    /// Upper bound for a single internal block.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Whether an interrupt has been requested. Does not unwind.
    pub fn is_interrupted(&self) -> bool {
        self.flag.is_set()
    }

    /// Turn a pending interrupt into `Err(Interrupted)`.
    ///
    /// Call this at least once per unit of work and propagate with `?`.
    #[inline]
    pub fn interruption_point(&self) -> InterruptResult {
        self.flag.check()
    }

    /// Block on `condvar` until it is notified.
    pub fn interruptible_wait<T: ?Sized>(
        &self,
        condvar: &Condvar,
        guard: &mut MutexGuard<'_, T>,
    ) -> InterruptResult {
        self.interruption_point()?;
        let _registration = self.flag.register(condvar);
        loop {
            self.interruption_point()?;
            if !condvar.wait_for(guard, self.poll_interval).timed_out() {
                return self.interruption_point();
            }
        }
    }

    /// Block on `condvar` for as long as `condition` returns true.
    pub fn interruptible_wait_while<T, F>(
        &self,
        condvar: &Condvar,
        guard: &mut MutexGuard<'_, T>,
        mut condition: F,
    ) -> InterruptResult
    where
        T: ?Sized,
        F: FnMut(&mut T) -> bool,
    {
        self.interruption_point()?;
        let _registration = self.flag.register(condvar);
        while !self.flag.is_set() && condition(&mut **guard) {
            condvar.wait_for(guard, self.poll_interval);
        }
        self.interruption_point()
    }

    /// Block on `condvar` until notified or until `timeout` has elapsed.
    ///
    /// Each internal block is `min(remaining, poll interval)`, so a timeout
    /// shorter than the poll interval is honored as given.
    pub fn interruptible_wait_for<T: ?Sized>(
        &self,
        condvar: &Condvar,
        guard: &mut MutexGuard<'_, T>,
        timeout: Duration,
    ) -> InterruptResult<WaitStatus> {
        let deadline = Instant::now().checked_add(timeout);
        self.interruption_point()?;
        let _registration = self.flag.register(condvar);
        loop {
            self.interruption_point()?;
            let Some(slice) = self.next_slice(deadline) else {
                return Ok(WaitStatus::TimedOut);
            };
            if !condvar.wait_for(guard, slice).timed_out() {
                self.interruption_point()?;
                return Ok(WaitStatus::Woken);
            }
        }
    }

    /// Block on `condvar` while `condition` returns true, for at most
    /// `timeout`.
    ///
    /// Returns [`WaitStatus::Woken`] once the condition is false and
    /// [`WaitStatus::TimedOut`] if the timeout elapsed with the condition
    /// still true.
    pub fn interruptible_wait_while_for<T, F>(
        &self,
        condvar: &Condvar,
        guard: &mut MutexGuard<'_, T>,
        timeout: Duration,
        mut condition: F,
    ) -> InterruptResult<WaitStatus>
    where
        T: ?Sized,
        F: FnMut(&mut T) -> bool,
    {
        let deadline = Instant::now().checked_add(timeout);
        self.interruption_point()?;
        let _registration = self.flag.register(condvar);
        loop {
            self.interruption_point()?;
            if !condition(&mut **guard) {
                return Ok(WaitStatus::Woken);
            }
            let Some(slice) = self.next_slice(deadline) else {
                return Ok(WaitStatus::TimedOut);
            };
            condvar.wait_for(guard, slice);
        }
    }

    /// The flag's own wait, sliced by this thread's poll interval. See
    /// [`InterruptFlag::wait`].
    pub fn wait<T: ?Sized>(
        &self,
        condvar: &Condvar,
        guard: &mut MutexGuard<'_, T>,
    ) -> InterruptResult {
        self.interruption_point()?;
        self.flag.wait(condvar, guard, self.poll_interval)
    }

    /// Poll a single-value channel until a value arrives.
    ///
    /// Returns `Ok(None)` if the sender was dropped without sending.
    pub fn interruptible_recv<T>(&self, receiver: &Receiver<T>) -> InterruptResult<Option<T>> {
        loop {
            self.interruption_point()?;
            match receiver.recv_timeout(self.poll_interval) {
                Ok(value) => return Ok(Some(value)),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Ok(None),
            }
        }
    }

    /// Sleep for `duration` unless interrupted first.
    pub fn sleep(&self, duration: Duration) -> InterruptResult {
        let mut guard = self.sleep_lock.lock();
        self.interruptible_wait_while_for(&self.sleep_signal, &mut guard, duration, |_| true)?;
        Ok(())
    }

    /// Sleep until `deadline` unless interrupted first.
    pub fn sleep_until(&self, deadline: Instant) -> InterruptResult {
        self.sleep(deadline.saturating_duration_since(Instant::now()))
    }

    /// Length of the next internal block, or `None` once `deadline` passed.
    ///
    /// A `None` deadline means the timeout overflowed `Instant` and is
    /// treated as unbounded.
    fn next_slice(&self, deadline: Option<Instant>) -> Option<Duration> {
        match deadline {
            Some(deadline) => {
                let remaining = deadline.checked_duration_since(Instant::now())?;
                if remaining.is_zero() {
                    None
                } else {
                    Some(remaining.min(self.poll_interval))
                }
            }
            None => Some(self.poll_interval),
        }
    }
}

impl std::fmt::Debug for ThreadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadContext")
            .field("interrupted", &self.is_interrupted())
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Interrupted;
    use std::sync::mpsc;
    use std::thread;

    const POLL: Duration = Duration::from_millis(1);

    fn interrupt_after(flag: Arc<InterruptFlag>, delay: Duration) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            thread::sleep(delay);
            flag.set();
        })
    }

    #[test]
    fn test_interruption_point() {
        let ctx = ThreadContext::new(POLL);
        assert_eq!(ctx.interruption_point(), Ok(()));
        ctx.flag().set();
        assert!(ctx.is_interrupted());
        assert_eq!(ctx.interruption_point(), Err(Interrupted));
    }

    #[test]
    fn test_wait_returns_on_notify() {
        let ctx = ThreadContext::new(POLL);
        let shared = Arc::new((Mutex::new(false), Condvar::new()));

        let notifier = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                let (mutex, condvar) = &*shared;
                *mutex.lock() = true;
                condvar.notify_all();
            })
        };

        let (mutex, condvar) = &*shared;
        let mut ready = mutex.lock();
        while !*ready {
            ctx.interruptible_wait(condvar, &mut ready).unwrap();
        }
        drop(ready);
        notifier.join().unwrap();
        assert!(!ctx.flag.has_target());
    }

    #[test]
    fn test_wait_while_observes_interrupt() {
        let ctx = ThreadContext::new(POLL);
        let mutex = Mutex::new(0u32);
        let condvar = Condvar::new();
        let setter = interrupt_after(ctx.flag(), Duration::from_millis(10));

        let mut guard = mutex.lock();
        let started = Instant::now();
        let result = ctx.interruptible_wait_while(&condvar, &mut guard, |_| true);

        assert_eq!(result, Err(Interrupted));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!ctx.flag.has_target());
        setter.join().unwrap();
    }

    #[test]
    fn test_wait_while_stops_when_condition_clears() {
        let ctx = ThreadContext::new(POLL);
        let shared = Arc::new((Mutex::new(3u32), Condvar::new()));

        let producer = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                let (mutex, condvar) = &*shared;
                for _ in 0..3 {
                    thread::sleep(Duration::from_millis(2));
                    *mutex.lock() -= 1;
                    condvar.notify_all();
                }
            })
        };

        let (mutex, condvar) = &*shared;
        let mut pending = mutex.lock();
        ctx.interruptible_wait_while(condvar, &mut pending, |left| *left > 0)
            .unwrap();
        assert_eq!(*pending, 0);
        drop(pending);
        producer.join().unwrap();
    }

    #[test]
    fn test_timed_wait_with_unmet_condition_honors_timeout() {
        let ctx = ThreadContext::new(POLL);
        let mutex = Mutex::new(());
        let condvar = Condvar::new();

        let mut guard = mutex.lock();
        let started = Instant::now();
        let status = ctx
            .interruptible_wait_while_for(&condvar, &mut guard, Duration::from_millis(5), |_| true)
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(status, WaitStatus::TimedOut);
        assert!(elapsed >= Duration::from_millis(5), "returned early: {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(500), "returned late: {:?}", elapsed);
    }

    #[test]
    fn test_timeout_shorter_than_poll_interval_not_rounded_up() {
        let ctx = ThreadContext::new(Duration::from_millis(200));
        let mutex = Mutex::new(());
        let condvar = Condvar::new();

        let mut guard = mutex.lock();
        let started = Instant::now();
        let status = ctx
            .interruptible_wait_for(&condvar, &mut guard, Duration::from_millis(2))
            .unwrap();
        let elapsed = started.elapsed();

        assert!(status.timed_out());
        assert!(elapsed >= Duration::from_millis(2));
        assert!(elapsed < Duration::from_millis(150), "rounded up: {:?}", elapsed);
    }

    #[test]
    fn test_timed_wait_woken_before_deadline() {
        let ctx = ThreadContext::new(POLL);
        let shared = Arc::new((Mutex::new(()), Condvar::new()));

        let notifier = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                let (mutex, condvar) = &*shared;
                let _guard = mutex.lock();
                condvar.notify_all();
            })
        };

        let (mutex, condvar) = &*shared;
        let mut guard = mutex.lock();
        let started = Instant::now();
        let status = ctx
            .interruptible_wait_for(condvar, &mut guard, Duration::from_secs(30))
            .unwrap();

        assert_eq!(status, WaitStatus::Woken);
        assert!(!status.timed_out());
        assert!(started.elapsed() < Duration::from_secs(10));
        drop(guard);
        notifier.join().unwrap();
        assert!(!ctx.flag.has_target());
    }

    #[test]
    fn test_timed_wait_while_woken_when_condition_clears() {
        let ctx = ThreadContext::new(POLL);
        let shared = Arc::new((Mutex::new(true), Condvar::new()));

        let producer = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                let (mutex, condvar) = &*shared;
                *mutex.lock() = false;
                condvar.notify_all();
            })
        };

        let (mutex, condvar) = &*shared;
        let mut busy = mutex.lock();
        let started = Instant::now();
        let status = ctx
            .interruptible_wait_while_for(condvar, &mut busy, Duration::from_secs(30), |busy| *busy)
            .unwrap();

        assert_eq!(status, WaitStatus::Woken);
        assert!(!*busy);
        assert!(started.elapsed() < Duration::from_secs(10));
        drop(busy);
        producer.join().unwrap();
    }

    #[test]
    fn test_timed_wait_interrupt_latency() {
        let ctx = ThreadContext::new(POLL);
        let mutex = Mutex::new(());
        let condvar = Condvar::new();
        let setter = interrupt_after(ctx.flag(), Duration::from_millis(10));

        let mut guard = mutex.lock();
        let started = Instant::now();
        let result = ctx.interruptible_wait_for(&condvar, &mut guard, Duration::from_secs(30));

        assert_eq!(result, Err(Interrupted));
        assert!(started.elapsed() < Duration::from_secs(2));
        setter.join().unwrap();
    }

    #[test]
    fn test_interrupt_wakes_long_poll_interval() {
        // A registered condvar is notified by the flag, so the interrupt does
        // not have to wait for the (here very long) poll slice to expire.
        let ctx = ThreadContext::new(Duration::from_secs(60));
        let mutex = Mutex::new(());
        let condvar = Condvar::new();
        let setter = interrupt_after(ctx.flag(), Duration::from_millis(50));

        let mut guard = mutex.lock();
        let started = Instant::now();
        let result = ctx.interruptible_wait_while(&condvar, &mut guard, |_| true);

        assert_eq!(result, Err(Interrupted));
        assert!(started.elapsed() < Duration::from_secs(10));
        setter.join().unwrap();
    }

    #[test]
    fn test_unpolled_wait_interrupted() {
        let ctx = ThreadContext::new(POLL);
        let mutex = Mutex::new(());
        let condvar = Condvar::new();
        let setter = interrupt_after(ctx.flag(), Duration::from_millis(10));

        let mut guard = mutex.lock();
        loop {
            if ctx.wait(&condvar, &mut guard).is_err() {
                break;
            }
        }
        setter.join().unwrap();
    }

    #[test]
    fn test_recv_value_and_disconnect() {
        let ctx = ThreadContext::new(POLL);

        let (tx, rx) = mpsc::channel();
        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            tx.send(42).unwrap();
        });
        assert_eq!(ctx.interruptible_recv(&rx), Ok(Some(42)));
        sender.join().unwrap();

        let (tx, rx) = mpsc::channel::<u32>();
        drop(tx);
        assert_eq!(ctx.interruptible_recv(&rx), Ok(None));
    }

    #[test]
    fn test_recv_interrupted() {
        let ctx = ThreadContext::new(POLL);
        let (_tx, rx) = mpsc::channel::<u32>();
        let setter = interrupt_after(ctx.flag(), Duration::from_millis(10));

        assert_eq!(ctx.interruptible_recv(&rx), Err(Interrupted));
        setter.join().unwrap();
    }

    #[test]
    fn test_sleep_runs_full_duration() {
        let ctx = ThreadContext::new(POLL);
        let started = Instant::now();
        ctx.sleep(Duration::from_millis(15)).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_sleep_interrupted_early() {
        let ctx = ThreadContext::new(POLL);
        let setter = interrupt_after(ctx.flag(), Duration::from_millis(10));

        let started = Instant::now();
        assert_eq!(ctx.sleep(Duration::from_secs(30)), Err(Interrupted));
        assert!(started.elapsed() < Duration::from_secs(2));
        setter.join().unwrap();
    }

    #[test]
    fn test_sleep_until_past_deadline_returns() {
        let ctx = ThreadContext::new(POLL);
        let past = Instant::now();
        thread::sleep(Duration::from_millis(1));
        assert_eq!(ctx.sleep_until(past), Ok(()));
    }
}
