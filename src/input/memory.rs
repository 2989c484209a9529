use std::sync::Arc;

use super::AudioSource;

/// Plays a preloaded list of encoded frames once.
///
/// Frames are shared between copies, so [`copy`] is cheap and always rewinds to the start.
///
/// [`copy`]: AudioSource::copy
#[derive(Clone, Debug)]
pub struct Memory {
    frames: Arc<[Vec<u8>]>,
    position: usize,
    muted: bool,
}

impl Memory {
    #[must_use]
    pub fn new(frames: impl Into<Arc<[Vec<u8>]>>) -> Self {
        Self {
            frames: frames.into(),
            position: 0,
            muted: false,
        }
    }

    /// Number of frames already played.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl AudioSource for Memory {
    fn next_frame(&mut self) -> Option<Vec<u8>> {
        let frame = self.frames.get(self.position)?.clone();
        self.position += 1;

        Some(frame)
    }

    fn has_next_frame(&mut self) -> bool {
        self.position < self.frames.len()
    }

    fn has_finished(&self) -> bool {
        self.position >= self.frames.len()
    }

    fn is_muted(&self) -> bool {
        self.muted
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn copy(&self) -> Box<dyn AudioSource> {
        Box::new(Self {
            frames: Arc::clone(&self.frames),
            position: 0,
            muted: self.muted,
        })
    }
}
