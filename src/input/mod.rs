//! Frame producers polled by the frame pacer.
//!
//! An [`AudioSource`] yields already-encoded Opus frames, one per 20ms tick. This crate never
//! decodes or re-encodes audio: whatever bytes a source returns are framed and sent as-is.
//!
//! Two silence fillers are provided because they serve different purposes:
//!  * [`BoundedSilence`] holds a connection open for a fixed wind-down period, emitting nothing,
//!  * [`ConstantSilence`] is a permanent idle filler emitting the silence sentinel forever.
//!
//! [`Memory`] plays back a preloaded list of frames, which is mostly useful for short cues and
//! for tests.

mod memory;
mod silence;

pub use self::memory::Memory;
pub use self::silence::{BoundedSilence, ConstantSilence};

/// A source of encoded audio frames, polled once per tick by the frame pacer.
///
/// # Polling protocol
///
/// On every tick the pacer calls [`has_next_frame`] exactly once. If it returns `true`, the
/// pacer calls [`next_frame`] and sends the result; if it returns `false`, the tick is treated
/// as silence and [`has_finished`] decides whether the source is dropped.
///
/// [`has_next_frame`] is explicitly allowed to advance internal state, even when it returns
/// `false`. Sources may use the call itself as their clock: [`BoundedSilence`] counts down on
/// each call and never produces a frame. Callers must therefore not probe it speculatively.
///
/// [`has_next_frame`]: AudioSource::has_next_frame
/// [`next_frame`]: AudioSource::next_frame
/// [`has_finished`]: AudioSource::has_finished
pub trait AudioSource: Send {
    /// Returns the next encoded frame, or `None` if there is nothing to send this tick.
    fn next_frame(&mut self) -> Option<Vec<u8>>;

    /// Whether a frame is available for this tick. May advance the source's state.
    fn has_next_frame(&mut self) -> bool;

    /// Whether the source is exhausted and should be replaced.
    fn has_finished(&self) -> bool;

    /// Muted sources are sent as silence sentinels and never raise the speaking flag.
    fn is_muted(&self) -> bool;

    fn set_muted(&mut self, muted: bool);

    /// Creates an independent source which replays from this source's initial state.
    ///
    /// The returned value shares no mutable state with `self`, so one logical source can be
    /// attached to several connections, or reused as a filler many times.
    fn copy(&self) -> Box<dyn AudioSource>;
}

impl std::fmt::Debug for dyn AudioSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSource")
            .field("finished", &self.has_finished())
            .field("muted", &self.is_muted())
            .finish_non_exhaustive()
    }
}
