//! Playback boundary.
//!
//! The engine never touches audio buffers; it issues commands to an external
//! decoder/player through this trait and reads back position and status.

use crate::analyzer::has_valid_header;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

pub trait Player: Send + Sync {
    /// Start playback of a local file. Returns false when the player could
    /// not open it.
    fn play(&self, path: &Path) -> bool;
    fn stop(&self) -> bool;
    fn toggle_pause(&self) -> bool;
    /// Set the output volume (0-100). `suppress_output` mutes any
    /// user-facing volume feedback, used by the crossfade ramp.
    fn set_volume(&self, level: i32, suppress_output: bool) -> bool;
    fn volume(&self) -> i32;
    fn is_playing(&self) -> bool;
    fn is_paused(&self) -> bool;
    fn has_finished(&self) -> bool;
    /// Playback position in seconds, zero when stopped.
    fn position_seconds(&self) -> i64;
    /// Container-level validity check before playback is attempted.
    fn is_valid_file(&self, path: &Path) -> bool;
}

/// Player that accepts every command without producing audio. Used for
/// headless operation and tests.
#[derive(Debug)]
pub struct NullPlayer {
    volume: AtomicI32,
    playing: AtomicBool,
    paused: AtomicBool,
}

impl Default for NullPlayer {
    fn default() -> Self {
        Self {
            volume: AtomicI32::new(100),
            playing: AtomicBool::new(false),
            paused: AtomicBool::new(false),
        }
    }
}

impl NullPlayer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Player for NullPlayer {
    fn play(&self, _path: &Path) -> bool {
        self.playing.store(true, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        true
    }

    fn stop(&self) -> bool {
        self.playing.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        true
    }

    fn toggle_pause(&self) -> bool {
        if self.playing.load(Ordering::SeqCst) {
            self.paused.fetch_xor(true, Ordering::SeqCst);
        }
        true
    }

    fn set_volume(&self, level: i32, _suppress_output: bool) -> bool {
        self.volume.store(level.clamp(0, 100), Ordering::SeqCst);
        true
    }

    fn volume(&self) -> i32 {
        self.volume.load(Ordering::SeqCst)
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn has_finished(&self) -> bool {
        false
    }

    fn position_seconds(&self) -> i64 {
        0
    }

    fn is_valid_file(&self, path: &Path) -> bool {
        has_valid_header(path)
    }
}
