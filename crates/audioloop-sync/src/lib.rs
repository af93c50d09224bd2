// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Cooperative thread interruption and a hand-over-hand locked list.
//!
//! - [`InterruptibleThread`] owns a worker thread that can be asked to stop
//!   from another thread. The worker receives a [`ThreadContext`] and
//!   checks [`ThreadContext::interruption_point`] once per unit of work.
//! - The waits on [`ThreadContext`] block in slices of at most one poll
//!   interval and register their condvar with the thread's [`InterruptFlag`],
//!   so an interrupt reaches a blocked worker promptly.
//! - [`ConcurrentList`] holds work items that several threads insert, scan
//!   and remove concurrently, with one lock per node instead of a global one.
//!
//! # Example
//!
//! ```
//! use audioloop_sync::{InterruptibleThread, JoinOutcome};
//! use std::time::Duration;
//!
//! let mut worker = InterruptibleThread::builder()
//!     .name("ticker")
//!     .spawn(|ctx| loop {
//!         ctx.interruption_point()?;
//!         ctx.sleep(Duration::from_millis(5))?;
//!     })
//!     .unwrap();
//!
//! worker.interrupt();
//! let outcome: JoinOutcome<()> = worker.join().unwrap();
//! assert!(outcome.is_interrupted());
//! ```

pub mod context;
pub mod error;
pub mod flag;
pub mod list;
pub mod thread;

pub use context::{ThreadContext, WaitStatus};
pub use error::{InterruptResult, Interrupted, ThreadError};
pub use flag::InterruptFlag;
pub use list::ConcurrentList;
pub use thread::{Builder, InterruptibleThread, JoinOutcome, DEFAULT_POLL_INTERVAL};
