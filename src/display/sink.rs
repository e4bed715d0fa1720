/*
 *  display/sink.rs
 *
 *  NeonHUD - dashboards for small panels
 *  (c) 2023-26 NeonHUD authors
 *
 *  The output sink: paces frames to a minimum interval, walks the
 *  adapter list in preference order, and demotes a failing primary.
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

use super::{fbdev::FramebufferAdapter, png::PngAdapter, DisplayAdapter};
use crate::config::{AdapterKind, DisplayConfig};
use crate::frame::Frame;
use crate::pacer::Pacer;
use std::time::{Duration, Instant};

/// Consecutive primary failures before the fallback gets first try.
const FAILOVER_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// A frame went out through some adapter.
    Presented,
    /// Dropped by the pacer; the next frame will catch up.
    Paced,
    /// Every adapter failed; frame skipped, retried next cycle.
    Failed,
}

pub struct DisplaySink {
    adapters: Vec<Box<dyn DisplayAdapter>>,
    pacer: Pacer,
    primary_failures: u32,
}

impl DisplaySink {
    pub fn new(adapters: Vec<Box<dyn DisplayAdapter>>, min_interval: Duration) -> Self {
        Self {
            adapters,
            pacer: Pacer::new(min_interval),
            primary_failures: 0,
        }
    }

    pub fn from_config(cfg: &DisplayConfig) -> Self {
        let adapters: Vec<Box<dyn DisplayAdapter>> = cfg
            .adapters
            .iter()
            .map(|kind| -> Box<dyn DisplayAdapter> {
                match kind {
                    AdapterKind::Framebuffer => {
                        Box::new(FramebufferAdapter::new(&cfg.framebuffer, cfg.rotate_deg))
                    }
                    AdapterKind::Png => Box::new(PngAdapter::new(&cfg.png_path)),
                }
            })
            .collect();
        Self::new(adapters, Duration::from_millis(cfg.min_frame_interval_ms))
    }

    /// True once the primary has been demoted.
    pub fn failed_over(&self) -> bool {
        self.primary_failures >= FAILOVER_THRESHOLD
    }

    pub fn present(&mut self, frame: &Frame) -> PresentOutcome {
        self.present_at(frame, Instant::now())
    }

    /// Present with an explicit clock, for tests.
    pub fn present_at(&mut self, frame: &Frame, now: Instant) -> PresentOutcome {
        if !self.pacer.try_pass(now) {
            return PresentOutcome::Paced;
        }
        if self.adapters.is_empty() {
            return PresentOutcome::Failed;
        }

        // after failover the fallbacks come first, but the primary is
        // still tried last so it can win its spot back
        let count = self.adapters.len();
        let order: Vec<usize> = if self.failed_over() && count > 1 {
            (1..count).chain(std::iter::once(0)).collect()
        } else {
            (0..count).collect()
        };

        for idx in order {
            let adapter = &mut self.adapters[idx];
            let name = adapter.name();
            match adapter.present(frame) {
                Ok(()) => {
                    if idx == 0 {
                        if self.primary_failures > 0 {
                            log::info!("primary display adapter {name} recovered");
                        }
                        self.primary_failures = 0;
                    }
                    return PresentOutcome::Presented;
                }
                Err(err) => {
                    log::warn!("display adapter {name} failed: {err}");
                    if idx == 0 {
                        self.primary_failures = self.primary_failures.saturating_add(1);
                        if self.primary_failures == FAILOVER_THRESHOLD {
                            log::warn!(
                                "primary display adapter {name} demoted after {FAILOVER_THRESHOLD} failures"
                            );
                        }
                    }
                }
            }
        }
        PresentOutcome::Failed
    }
}
