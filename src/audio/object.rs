// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Objects the update loop renders each period.

use audioloop_sync::ConcurrentList;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

use super::buffer::{AudioBuffer, AudioFormat};
use super::sine::SineSource;

/// A single source rendering into its own buffer.
#[derive(Debug)]
pub struct Voice {
    source: Arc<SineSource>,
    output: Mutex<AudioBuffer>,
}

impl Voice {
    pub fn new(source: Arc<SineSource>, format: AudioFormat) -> Self {
        Self {
            source,
            output: Mutex::new(AudioBuffer::silence(format, 0)),
        }
    }

    fn update(&self, frames: usize) {
        let mut output = self.output.lock();
        if output.frames() != frames {
            *output = AudioBuffer::silence(output.format(), frames);
        }
        self.source.render(&mut output);
    }
}

/// A group of sources mixed into one buffer.
///
/// Sources may be added and stopped from any thread while the update thread
/// renders the block.
#[derive(Debug)]
pub struct SourceBlock {
    format: AudioFormat,
    sources: ConcurrentList<SineSource>,
    output: Mutex<AudioBuffer>,
}

impl SourceBlock {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            sources: ConcurrentList::new(),
            output: Mutex::new(AudioBuffer::silence(format, 0)),
        }
    }

    pub fn add(&self, source: Arc<SineSource>) {
        self.sources.push_front(source);
    }

    pub fn find(&self, id: Uuid) -> Option<Arc<SineSource>> {
        self.sources.find_first_if(|source| source.id() == id)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn remove_finished(&self) -> usize {
        self.sources.remove_if(SineSource::is_finished)
    }

    /// Render every source; the first initializes the mix and the rest are
    /// mixed in. An empty block renders silence.
    pub fn update(&self, frames: usize) {
        let mut scratch = AudioBuffer::silence(self.format, frames);
        let mut output = self.output.lock();
        let mut first = true;

        self.sources.for_each(|source| {
            source.render(&mut scratch);
            if first {
                output.init_from(&scratch);
                first = false;
            } else {
                output.mix_in(&scratch);
            }
        });

        if first {
            *output = scratch;
        }
    }

    pub fn result(&self) -> AudioBuffer {
        self.output.lock().clone()
    }
}

/// Anything the update loop renders.
#[derive(Debug)]
pub enum AudioObject {
    Source(Voice),
    Block(Arc<SourceBlock>),
}

impl AudioObject {
    pub fn update(&self, frames: usize) {
        match self {
            Self::Source(voice) => voice.update(frames),
            Self::Block(block) => block.update(frames),
        }
    }

    /// Drop finished sources held inside this object.
    pub fn remove_finished(&self) -> usize {
        match self {
            Self::Source(_) => 0,
            Self::Block(block) => block.remove_finished(),
        }
    }

    /// Whether the object itself can be dropped. Blocks live until shutdown.
    pub fn is_finished(&self) -> bool {
        match self {
            Self::Source(voice) => voice.source.is_finished(),
            Self::Block(_) => false,
        }
    }

    pub fn result(&self) -> AudioBuffer {
        match self {
            Self::Source(voice) => voice.output.lock().clone(),
            Self::Block(block) => block.result(),
        }
    }

    pub fn find_source(&self, id: Uuid) -> Option<Arc<SineSource>> {
        match self {
            Self::Source(voice) => (voice.source.id() == id).then(|| Arc::clone(&voice.source)),
            Self::Block(block) => block.find(id),
        }
    }

    pub fn source_count(&self) -> usize {
        match self {
            Self::Source(_) => 1,
            Self::Block(block) => block.len(),
        }
    }
}
