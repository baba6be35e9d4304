//! Crossfade state machine.
//!
//! Two states: idle and active. While active, `tick` linearly ramps the
//! incoming entry's volume from zero to the captured target over a fixed
//! duration. The machine does no scheduling of its own; the owner calls
//! `tick` once per update cycle and applies the returned volume to the
//! player.

use std::time::{Duration, Instant};

/// Default crossfade length.
pub const DEFAULT_CROSSFADE_MS: u64 = 3000;

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossfadeTick {
    /// No crossfade in progress.
    Idle,
    /// Still ramping; set the player volume to this level.
    Ramp { volume: i32 },
    /// Just completed; set the final volume and return to idle.
    Finished { volume: i32 },
}

#[derive(Debug)]
struct ActiveCrossfade {
    started: Instant,
    duration: Duration,
    target_volume: i32,
    progress: u32,
}

/// Linear volume interpolation between an outgoing and incoming entry.
#[derive(Debug, Default)]
pub struct Crossfade {
    active: Option<ActiveCrossfade>,
}

impl Crossfade {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a crossfade toward `target_volume` (the volume level before the
    /// fade, so overall loudness is preserved).
    pub fn start(&mut self, now: Instant, duration: Duration, target_volume: i32) {
        self.active = Some(ActiveCrossfade {
            started: now,
            duration,
            target_volume,
            progress: 0,
        });
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Completed fraction in percent, 0-100.
    pub fn progress_percent(&self) -> u32 {
        self.active.as_ref().map(|a| a.progress).unwrap_or(0)
    }

    /// Abort without touching volumes.
    pub fn cancel(&mut self) {
        self.active = None;
    }

    /// Advance the fade to `now`.
    pub fn tick(&mut self, now: Instant) -> CrossfadeTick {
        let Some(active) = self.active.as_mut() else {
            return CrossfadeTick::Idle;
        };

        let elapsed = now.saturating_duration_since(active.started);
        if elapsed >= active.duration {
            let volume = active.target_volume;
            self.active = None;
            return CrossfadeTick::Finished { volume };
        }

        let progress = (elapsed.as_millis() * 100 / active.duration.as_millis().max(1)) as u32;
        active.progress = progress;
        CrossfadeTick::Ramp {
            volume: active.target_volume * progress as i32 / 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_tick_is_noop() {
        let mut fade = Crossfade::new();
        assert!(!fade.is_active());
        assert_eq!(fade.tick(Instant::now()), CrossfadeTick::Idle);
    }

    #[test]
    fn test_completion_restores_target_volume() {
        let mut fade = Crossfade::new();
        let start = Instant::now();
        fade.start(start, Duration::from_millis(1000), 80);
        assert!(fade.is_active());

        let tick = fade.tick(start + Duration::from_millis(1000));
        assert_eq!(tick, CrossfadeTick::Finished { volume: 80 });
        assert!(!fade.is_active());

        // Back to idle afterwards.
        assert_eq!(fade.tick(start + Duration::from_millis(2000)), CrossfadeTick::Idle);
    }

    #[test]
    fn test_midpoint_ramps_half_volume() {
        let mut fade = Crossfade::new();
        let start = Instant::now();
        fade.start(start, Duration::from_millis(1000), 80);

        let tick = fade.tick(start + Duration::from_millis(500));
        assert_eq!(tick, CrossfadeTick::Ramp { volume: 40 });
        assert_eq!(fade.progress_percent(), 50);
    }

    #[test]
    fn test_early_tick_stays_near_zero() {
        let mut fade = Crossfade::new();
        let start = Instant::now();
        fade.start(start, Duration::from_millis(1000), 100);

        let tick = fade.tick(start + Duration::from_millis(10));
        assert_eq!(tick, CrossfadeTick::Ramp { volume: 1 });
    }

    #[test]
    fn test_overshoot_still_finishes() {
        let mut fade = Crossfade::new();
        let start = Instant::now();
        fade.start(start, Duration::from_millis(200), 60);

        let tick = fade.tick(start + Duration::from_secs(10));
        assert_eq!(tick, CrossfadeTick::Finished { volume: 60 });
    }

    #[test]
    fn test_cancel_returns_to_idle() {
        let mut fade = Crossfade::new();
        fade.start(Instant::now(), Duration::from_millis(1000), 50);
        fade.cancel();
        assert!(!fade.is_active());
        assert_eq!(fade.tick(Instant::now()), CrossfadeTick::Idle);
    }

    #[test]
    fn test_zero_duration_finishes_immediately() {
        let mut fade = Crossfade::new();
        let start = Instant::now();
        fade.start(start, Duration::from_millis(0), 70);
        assert_eq!(fade.tick(start), CrossfadeTick::Finished { volume: 70 });
    }
}
