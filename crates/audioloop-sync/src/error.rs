// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error types for interruptible threads.

use thiserror::Error;

/// Returned from an interruption point once the thread has been interrupted.
///
/// This is a shutdown signal, not a failure. Worker code propagates it with
/// `?` and the thread wrapper turns it into [`JoinOutcome::Interrupted`].
///
/// [`JoinOutcome::Interrupted`]: crate::JoinOutcome::Interrupted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("thread interrupted")]
pub struct Interrupted;

/// Result of anything that contains an interruption point.
pub type InterruptResult<T = ()> = Result<T, Interrupted>;

#[derive(Debug, Error)]
pub enum ThreadError {
    #[error("Failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Worker exited before publishing its interrupt flag")]
    Handshake,
    #[error("Worker panicked: {0}")]
    Panicked(String),
    #[error("Thread is not joinable")]
    NotJoinable,
}
