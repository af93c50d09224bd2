// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Gain conversions and a lock-free level cell shared with the update thread.

use std::sync::atomic::{AtomicU32, Ordering};

/// Convert dB to linear gain; -60 dB and below is silence.
pub fn db_to_linear(db: f32) -> f32 {
    if db <= -60.0 {
        0.0
    } else {
        10.0_f32.powf(db / 20.0)
    }
}

/// Convert linear gain to dB, floored at -60 dB.
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.001 {
        -60.0
    } else {
        20.0 * linear.log10()
    }
}

/// `f32` stored as bits in an atomic.
///
/// `Relaxed` is enough: levels are independent values, nothing else is
/// published through them.
#[derive(Debug)]
pub struct AtomicF32 {
    bits: AtomicU32,
}

impl AtomicF32 {
    pub const fn new(value: f32) -> Self {
        Self {
            bits: AtomicU32::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}
