// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Audio manager: owns the update thread and the objects it renders.
//!
//! Sounds are created and stopped from any thread. The update thread removes
//! finished sources, renders every object, and mixes the results into the
//! master buffer once per period.

use audioloop_sync::{ConcurrentList, InterruptibleThread, ThreadError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::buffer::{AudioBuffer, AudioFormat};
use super::level::{db_to_linear, AtomicF32};
use super::object::{AudioObject, SourceBlock, Voice};
use super::scheduler::PeriodicScheduler;
use super::sine::SineSource;
use crate::config::{EngineConfig, SourceConfig};

const UPDATE_THREAD_NAME: &str = "audio-update";

/// Errors from the audio engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Audio update thread failed: {0}")]
    Thread(#[from] ThreadError),
}

/// State shared between the manager and its update thread.
#[derive(Debug)]
struct EngineShared {
    format: AudioFormat,
    frames: usize,
    objects: ConcurrentList<AudioObject>,
    main_block: Arc<SourceBlock>,
    master: Mutex<AudioBuffer>,
    updates: AtomicU64,
    last_peak: AtomicF32,
}

impl EngineShared {
    fn tick(&self) {
        let mut finished = 0;
        self.objects
            .for_each(|object| finished += object.remove_finished());
        finished += self.objects.remove_if(AudioObject::is_finished);
        if finished > 0 {
            debug!("Removed {} finished source(s)", finished);
        }

        self.objects.for_each(|object| object.update(self.frames));

        let mut master = self.master.lock();
        let mut first = true;
        self.objects.for_each(|object| {
            let result = object.result();
            if first {
                master.init_from(&result);
                first = false;
            } else {
                master.mix_in(&result);
            }
        });

        self.last_peak.set(master.peak());
        self.updates.fetch_add(1, Ordering::Release);
    }
}

pub struct AudioManager {
    shared: Arc<EngineShared>,
    thread: InterruptibleThread,
}

impl AudioManager {
    /// Start the update thread with an empty main block.
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let format = AudioFormat::new(config.sample_rate, config.channels);
        let frames = config.frames_per_update();
        let main_block = Arc::new(SourceBlock::new(format));

        let objects = ConcurrentList::new();
        objects.push_front(AudioObject::Block(Arc::clone(&main_block)));

        let shared = Arc::new(EngineShared {
            format,
            frames,
            objects,
            main_block,
            master: Mutex::new(AudioBuffer::silence(format, frames)),
            updates: AtomicU64::new(0),
            last_peak: AtomicF32::default(),
        });

        let scheduler = PeriodicScheduler::new(config.update_period());
        let thread = {
            let shared = Arc::clone(&shared);
            InterruptibleThread::builder()
                .name(UPDATE_THREAD_NAME)
                .poll_interval(config.poll_interval())
                .spawn(move |ctx| scheduler.run(ctx, || shared.tick()))?
        };

        info!(
            "Audio engine started: {} Hz, {} channel(s), {} frames every {:?}",
            format.sample_rate,
            format.channels,
            frames,
            scheduler.period()
        );

        Ok(Self { shared, thread })
    }

    /// Start a tone. Voices get their own object; everything else joins the
    /// main block.
    pub fn create_sound(&self, config: &SourceConfig) -> Uuid {
        let source = Arc::new(SineSource::from_config(config, self.shared.format.sample_rate));
        let id = source.id();
        let frequency = source.frequency();

        if config.voice {
            let voice = Voice::new(source, self.shared.format);
            self.shared.objects.push_front(AudioObject::Source(voice));
        } else {
            self.shared.main_block.add(source);
        }

        debug!(
            "Created sound {} ({} Hz, {} dB, voice: {})",
            id,
            frequency,
            config.gain_db,
            config.voice
        );
        id
    }

    /// Change a playing sound's level. Takes effect on the next update.
    /// Returns `false` for unknown ids.
    pub fn set_sound_gain(&self, id: Uuid, gain_db: f32) -> bool {
        match self.find_sound(id) {
            Some(source) => {
                source.set_gain(db_to_linear(gain_db));
                debug!("Sound {} gain set to {} dB", id, gain_db);
                true
            }
            None => {
                warn!("Cannot change gain of unknown sound {}", id);
                false
            }
        }
    }

    pub fn find_sound(&self, id: Uuid) -> Option<Arc<SineSource>> {
        let mut found = None;
        self.shared.objects.find_first_if(|object| {
            found = object.find_source(id);
            found.is_some()
        });
        found
    }

    /// Stop a sound; it is dropped on the next update. Returns `false` for
    /// unknown ids.
    pub fn stop_sound(&self, id: Uuid) -> bool {
        match self.find_sound(id) {
            Some(source) => {
                source.stop();
                debug!("Stopped sound {}", id);
                true
            }
            None => {
                warn!("Cannot stop unknown sound {}", id);
                false
            }
        }
    }

    /// Sources still held by the engine, including ones that finished since
    /// the last update.
    pub fn active_sounds(&self) -> usize {
        let mut count = 0;
        self.shared
            .objects
            .for_each(|object| count += object.source_count());
        count
    }

    /// Completed update periods.
    pub fn updates(&self) -> u64 {
        self.shared.updates.load(Ordering::Acquire)
    }

    /// Peak level of the most recent master mix.
    pub fn last_peak(&self) -> f32 {
        self.shared.last_peak.get()
    }

    /// Copy of the most recent master mix.
    pub fn mix(&self) -> AudioBuffer {
        self.shared.master.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.thread.joinable()
    }

    /// Interrupt and join the update thread. Calling it again is a no-op.
    pub fn finalize(&mut self) -> Result<(), EngineError> {
        if !self.is_running() {
            return Ok(());
        }

        self.thread.interrupt();
        let outcome = self.thread.join()?;
        info!(
            "Audio engine stopped after {} update(s) (interrupted: {})",
            self.updates(),
            outcome.is_interrupted()
        );
        Ok(())
    }
}

impl Drop for AudioManager {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            warn!("Audio engine shutdown failed: {}", e);
        }
    }
}
