/*
 *  pacer.rs
 *
 *  NeonHUD - dashboards for small panels
 *  (c) 2023-26 NeonHUD authors
 *
 *  Deadline-based frame pacing for the output sink.
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::time::{Duration, Instant};

/// Enforces a minimum interval between passes. Frames that show up
/// early are rejected, not queued.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    next_due: Option<Instant>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    /// True when the interval has elapsed (always true on the first
    /// call). A pass schedules the next deadline from `now`, so a
    /// stall never builds up a burst of owed frames.
    pub fn try_pass(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(due) if now < due => false,
            _ => {
                self.next_due = Some(now + self.interval);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_pass_is_free() {
        let mut pacer = Pacer::new(Duration::from_millis(20));
        assert!(pacer.try_pass(Instant::now()));
    }

    #[test]
    fn early_frames_are_rejected() {
        let mut pacer = Pacer::new(Duration::from_millis(20));
        let t0 = Instant::now();
        assert!(pacer.try_pass(t0));
        assert!(!pacer.try_pass(t0 + Duration::from_millis(5)));
        assert!(!pacer.try_pass(t0 + Duration::from_millis(19)));
        assert!(pacer.try_pass(t0 + Duration::from_millis(20)));
    }

    #[test]
    fn stall_does_not_burst() {
        let mut pacer = Pacer::new(Duration::from_millis(20));
        let t0 = Instant::now();
        assert!(pacer.try_pass(t0));
        // long stall, then two frames in quick succession
        let late = t0 + Duration::from_millis(500);
        assert!(pacer.try_pass(late));
        assert!(!pacer.try_pass(late + Duration::from_millis(1)));
    }
}
