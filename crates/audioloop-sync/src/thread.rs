// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Interruptible worker threads.
//!
//! The worker creates its own [`ThreadContext`] on startup and hands its
//! interrupt flag back to the spawner over a one-shot channel, so the flag is
//! known before [`Builder::spawn`] returns. The work closure returns
//! `Err(Interrupted)` when it observes an interrupt; that is caught here and
//! reported as a normal exit.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::context::ThreadContext;
use crate::error::{InterruptResult, Interrupted, ThreadError};
use crate::flag::InterruptFlag;

/// Default upper bound for a single internal block inside the waits.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// How a worker finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome<T> {
    /// The work closure ran to completion.
    Completed(T),
    /// The work closure stopped at an interruption point.
    Interrupted,
}

impl<T> JoinOutcome<T> {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, JoinOutcome::Interrupted)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            JoinOutcome::Completed(value) => Some(value),
            JoinOutcome::Interrupted => None,
        }
    }
}

/// Configuration for spawning an [`InterruptibleThread`].
#[derive(Debug, Clone)]
pub struct Builder {
    name: Option<String>,
    poll_interval: Duration,
}

impl Builder {
    pub fn new() -> Self {
        Self {
            name: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Name of the OS thread.
    pub fn name(self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Upper bound for a single block inside the worker's waits.
    ///
    /// This trades interrupt latency against wakeups; zero is bumped to one
    /// microsecond so the waits never spin.
    pub fn poll_interval(self, poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(Duration::from_micros(1)),
            ..self
        }
    }

    /// Spawn the worker and wait until it has published its interrupt flag.
    pub fn spawn<F, T>(self, work: F) -> Result<InterruptibleThread<T>, ThreadError>
    where
        F: FnOnce(&ThreadContext) -> InterruptResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let (flag_tx, flag_rx) = mpsc::sync_channel::<Arc<InterruptFlag>>(1);
        let poll_interval = self.poll_interval;

        let mut builder = thread::Builder::new();
        if let Some(name) = self.name {
            builder = builder.name(name);
        }

        let handle = builder.spawn(move || {
            let context = ThreadContext::new(poll_interval);
            // The spawner blocks on the receiving end, so this only fails if
            // it is already gone; the work still runs to completion.
            let _ = flag_tx.send(context.flag());
            drop(flag_tx);

            let name = thread_name();
            debug!("Worker '{}' started", name);
            match work(&context) {
                Ok(value) => {
                    debug!("Worker '{}' finished", name);
                    JoinOutcome::Completed(value)
                }
                Err(Interrupted) => {
                    debug!("Worker '{}' interrupted, exiting", name);
                    JoinOutcome::Interrupted
                }
            }
        })?;

        let flag = flag_rx.recv().map_err(|_| ThreadError::Handshake)?;

        Ok(InterruptibleThread {
            handle: Some(handle),
            flag,
        })
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

/// Owner handle of a worker thread that can be interrupted cooperatively.
///
/// Shutdown is `interrupt()` followed by `join()`. Dropping a handle that is
/// still joinable does both.
pub struct InterruptibleThread<T = ()> {
    handle: Option<JoinHandle<JoinOutcome<T>>>,
    flag: Arc<InterruptFlag>,
}

impl<T> InterruptibleThread<T> {
    /// Spawn an unnamed worker with the default poll interval.
    pub fn spawn<F>(work: F) -> Result<Self, ThreadError>
    where
        F: FnOnce(&ThreadContext) -> InterruptResult<T> + Send + 'static,
        T: Send + 'static,
    {
        Builder::new().spawn(work)
    }

    /// Request the worker to stop at its next interruption point.
    ///
    /// Does not wait for the worker. Calling it after the worker exited is a
    /// no-op.
    pub fn interrupt(&self) {
        self.flag.set();
    }

    /// Whether [`interrupt`](Self::interrupt) has been called.
    pub fn is_interrupt_requested(&self) -> bool {
        self.flag.is_set()
    }

    /// Whether the thread is still attached (neither joined nor detached).
    pub fn joinable(&self) -> bool {
        self.handle.is_some()
    }

    /// Name of the underlying OS thread, if it was given one.
    pub fn name(&self) -> Option<&str> {
        self.handle.as_ref().and_then(|handle| handle.thread().name())
    }

    /// Wait for the worker to exit.
    ///
    /// An interrupted worker is a normal outcome; only a panic is an error.
    pub fn join(&mut self) -> Result<JoinOutcome<T>, ThreadError> {
        let handle = self.handle.take().ok_or(ThreadError::NotJoinable)?;
        handle.join().map_err(|payload| {
            let message = panic_message(&*payload);
            error!("Worker thread panicked: {}", message);
            ThreadError::Panicked(message)
        })
    }

    /// Let the worker run on independently of this handle.
    ///
    /// The handle can still [`interrupt`](Self::interrupt) it.
    pub fn detach(&mut self) -> Result<(), ThreadError> {
        self.handle.take().map(drop).ok_or(ThreadError::NotJoinable)
    }
}

impl InterruptibleThread {
    pub fn builder() -> Builder {
        Builder::new()
    }
}

impl<T> Drop for InterruptibleThread<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.flag.set();
            if handle.join().is_err() {
                warn!("Worker thread panicked before shutdown");
            }
        }
    }
}

impl<T> std::fmt::Debug for InterruptibleThread<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptibleThread")
            .field("name", &self.name())
            .field("joinable", &self.joinable())
            .field("interrupt_requested", &self.is_interrupt_requested())
            .finish()
    }
}

fn thread_name() -> String {
    thread::current()
        .name()
        .unwrap_or("<unnamed>")
        .to_string()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::{Condvar, Mutex};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    #[test]
    fn test_completed_worker_returns_value() {
        let mut worker = InterruptibleThread::spawn(|_| Ok(42)).unwrap();
        assert!(worker.joinable());
        assert_eq!(worker.join().unwrap(), JoinOutcome::Completed(42));
        assert!(!worker.joinable());
    }

    #[test]
    fn test_interrupt_ticking_worker() {
        let ticks = Arc::new(AtomicU32::new(0));
        let mut worker = {
            let ticks = Arc::clone(&ticks);
            InterruptibleThread::builder()
                .name("ticker")
                .spawn(move |ctx| loop {
                    ctx.interruption_point()?;
                    ticks.fetch_add(1, Ordering::Relaxed);
                    thread::yield_now();
                })
                .unwrap()
        };
        assert_eq!(worker.name(), Some("ticker"));

        thread::sleep(Duration::from_millis(10));
        let started = Instant::now();
        worker.interrupt();
        let outcome: JoinOutcome<()> = worker.join().unwrap();

        assert!(outcome.is_interrupted());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(ticks.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn test_interrupt_before_first_check() {
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let mut worker = {
            let gate = Arc::clone(&gate);
            InterruptibleThread::spawn(move |ctx| {
                // Block without any interruption point until released.
                let (mutex, condvar) = &*gate;
                let mut open = mutex.lock();
                while !*open {
                    condvar.wait(&mut open);
                }
                drop(open);
                ctx.interruption_point()?;
                Ok("ran to completion")
            })
            .unwrap()
        };

        worker.interrupt();
        {
            let (mutex, condvar) = &*gate;
            *mutex.lock() = true;
            condvar.notify_all();
        }

        assert_eq!(worker.join().unwrap(), JoinOutcome::Interrupted);
    }

    #[test]
    fn test_interrupt_while_holding_workers_mutex() {
        let shared = Arc::new((Mutex::new(false), Condvar::new()));
        let mut worker = {
            let shared = Arc::clone(&shared);
            InterruptibleThread::spawn(move |ctx| {
                let (mutex, condvar) = &*shared;
                let mut stop = mutex.lock();
                while !*stop {
                    ctx.wait(condvar, &mut stop)?;
                }
                Ok(())
            })
            .unwrap()
        };

        thread::sleep(Duration::from_millis(10));
        let started = Instant::now();
        {
            let (mutex, _) = &*shared;
            let mut stop = mutex.lock();
            *stop = true;
            worker.interrupt();
        }

        assert!(worker.join().unwrap().is_interrupted());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_interrupt_blocked_sleep() {
        let mut worker = InterruptibleThread::spawn(|ctx| {
            ctx.sleep(Duration::from_secs(60))?;
            Ok(())
        })
        .unwrap();

        thread::sleep(Duration::from_millis(10));
        let started = Instant::now();
        worker.interrupt();
        assert!(worker.join().unwrap().is_interrupted());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_interrupt_racing_wait_entry() {
        // The interrupt lands at varying points around the worker entering
        // its wait; it must be observed every time.
        for round in 0..50u64 {
            let shared = Arc::new((Mutex::new(()), Condvar::new()));
            let mut worker = {
                let shared = Arc::clone(&shared);
                InterruptibleThread::spawn(move |ctx| {
                    let (mutex, condvar) = &*shared;
                    let mut guard = mutex.lock();
                    loop {
                        ctx.interruptible_wait_for(condvar, &mut guard, Duration::from_secs(60))?;
                    }
                })
                .unwrap()
            };

            thread::sleep(Duration::from_micros(round * 20));
            worker.interrupt();
            let outcome: JoinOutcome<()> = worker.join().unwrap();
            assert!(outcome.is_interrupted());
        }
    }

    #[test]
    fn test_panic_reported_by_join() {
        let mut worker =
            InterruptibleThread::<()>::spawn(|_| panic!("boom")).unwrap();
        match worker.join() {
            Err(ThreadError::Panicked(message)) => assert!(message.contains("boom")),
            other => panic!("expected Panicked, got {:?}", other),
        }
    }

    #[test]
    fn test_join_twice_is_error() {
        let mut worker = InterruptibleThread::spawn(|_| Ok(())).unwrap();
        worker.join().unwrap();
        assert!(matches!(worker.join(), Err(ThreadError::NotJoinable)));
        assert!(matches!(worker.detach(), Err(ThreadError::NotJoinable)));
        // Interrupting an exited worker is harmless.
        worker.interrupt();
    }

    #[test]
    fn test_detach_then_interrupt() {
        let (done_tx, done_rx) = mpsc::channel();
        let mut worker = InterruptibleThread::spawn(move |ctx| {
            let result = ctx.sleep(Duration::from_secs(60));
            let _ = done_tx.send(result);
            result
        })
        .unwrap();

        worker.detach().unwrap();
        assert!(!worker.joinable());
        worker.interrupt();

        let result = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result, Err(Interrupted));
    }

    #[test]
    fn test_drop_interrupts_and_joins() {
        let (done_tx, done_rx) = mpsc::channel();
        let worker = InterruptibleThread::spawn(move |ctx| {
            let result = ctx.sleep(Duration::from_secs(60));
            let _ = done_tx.send(());
            result
        })
        .unwrap();

        drop(worker);
        // Join already happened inside drop.
        assert!(done_rx.try_recv().is_ok());
    }

    #[test]
    fn test_poll_interval_reaches_worker() {
        let mut worker = InterruptibleThread::builder()
            .poll_interval(Duration::from_millis(7))
            .spawn(|ctx| Ok(ctx.poll_interval()))
            .unwrap();
        assert_eq!(
            worker.join().unwrap(),
            JoinOutcome::Completed(Duration::from_millis(7))
        );

        let mut worker = InterruptibleThread::builder()
            .poll_interval(Duration::ZERO)
            .spawn(|ctx| Ok(ctx.poll_interval()))
            .unwrap();
        assert_eq!(
            worker.join().unwrap(),
            JoinOutcome::Completed(Duration::from_micros(1))
        );
    }
}
