// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Fixed-period update loop.

use audioloop_sync::{InterruptResult, ThreadContext};
use std::time::{Duration, Instant};
use tracing::warn;

/// Runs a tick once per period until the thread is interrupted.
#[derive(Debug, Clone, Copy)]
pub struct PeriodicScheduler {
    period: Duration,
}

impl PeriodicScheduler {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Tick immediately, then once per period.
    ///
    /// Only returns with `Err(Interrupted)`. A tick that runs past the next
    /// deadline moves the schedule forward instead of bursting to catch up.
    pub fn run<F>(&self, ctx: &ThreadContext, mut tick: F) -> InterruptResult
    where
        F: FnMut(),
    {
        let mut deadline = Instant::now();
        loop {
            ctx.interruption_point()?;
            tick();

            let Some(next) = deadline.checked_add(self.period) else {
                warn!("Period {:?} cannot be scheduled, idling", self.period);
                loop {
                    ctx.sleep(self.period)?;
                }
            };

            let now = Instant::now();
            deadline = if now > next {
                warn!("Update overran its period by {:?}", now - next);
                now
            } else {
                next
            };
            ctx.sleep_until(deadline)?;
        }
    }
}
