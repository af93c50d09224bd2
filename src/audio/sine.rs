// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Sine tone source.

use parking_lot::Mutex;
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use uuid::Uuid;

use super::buffer::AudioBuffer;
use super::level::{db_to_linear, AtomicF32};
use crate::config::SourceConfig;

#[derive(Debug, Default)]
struct Oscillator {
    phase: f64,
    frames_played: u64,
}

/// A sine tone with an optional play length.
///
/// Rendered by the update thread; stopped or re-levelled from any thread.
#[derive(Debug)]
pub struct SineSource {
    id: Uuid,
    frequency: f32,
    gain: AtomicF32,
    /// Length in frames; `None` plays until stopped.
    length: Option<u64>,
    stopped: AtomicBool,
    oscillator: Mutex<Oscillator>,
}

impl SineSource {
    pub fn new(frequency: f32, gain: f32, length: Option<u64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            frequency,
            gain: AtomicF32::new(gain),
            length,
            stopped: AtomicBool::new(false),
            oscillator: Mutex::new(Oscillator::default()),
        }
    }

    pub fn from_config(config: &SourceConfig, sample_rate: u32) -> Self {
        let length = config
            .duration()
            .map(|duration| frames_for(duration, sample_rate));
        Self::new(config.frequency, db_to_linear(config.gain_db), length)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn gain(&self) -> f32 {
        self.gain.get()
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain.set(gain);
    }

    /// Finish early; the next render produces silence.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn frames_played(&self) -> u64 {
        self.oscillator.lock().frames_played
    }

    pub fn is_finished(&self) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            return true;
        }
        self.length
            .is_some_and(|length| self.frames_played() >= length)
    }

    /// Fill `out` with the next frames of the tone, the same sample on every
    /// channel. Frames past the end are silent.
    pub fn render(&self, out: &mut AudioBuffer) {
        let step = TAU * f64::from(self.frequency) / f64::from(out.format().sample_rate);
        let gain = self.gain();
        let stopped = self.stopped.load(Ordering::Acquire);
        let mut osc = self.oscillator.lock();

        for frame in out.frames_mut() {
            let audible = !stopped && self.length.map_or(true, |len| osc.frames_played < len);
            let sample = if audible {
                let sample = osc.phase.sin() as f32 * gain;
                osc.phase = (osc.phase + step) % TAU;
                osc.frames_played += 1;
                sample
            } else {
                0.0
            };
            frame.fill(sample);
        }
    }
}

fn frames_for(duration: Duration, sample_rate: u32) -> u64 {
    (duration.as_secs_f64() * f64::from(sample_rate)).round() as u64
}
