/*
 *  display/mock.rs
 *
 *  NeonHUD - dashboards for small panels
 *  (c) 2023-26 NeonHUD authors
 *
 *  Recording adapter for tests: counts attempts and successes, can be
 *  told to fail on demand, remembers the last frame it was handed.
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

use super::{DisplayAdapter, DisplayError};
use crate::frame::Frame;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Inner {
    attempts: usize,
    presented: usize,
    fail_always: bool,
    fail_next: usize,
    last_frame_size: Option<(u32, u32)>,
}

/// Shared handle the test keeps while the sink owns the adapter.
#[derive(Debug, Clone, Default)]
pub struct MockProbe(Arc<Mutex<Inner>>);

impl MockProbe {
    pub fn attempts(&self) -> usize {
        self.0.lock().unwrap().attempts
    }

    pub fn presented(&self) -> usize {
        self.0.lock().unwrap().presented
    }

    pub fn last_frame_size(&self) -> Option<(u32, u32)> {
        self.0.lock().unwrap().last_frame_size
    }

    pub fn fail_always(&self, on: bool) {
        self.0.lock().unwrap().fail_always = on;
    }

    /// Fail exactly the next `n` presents, then recover.
    pub fn fail_next(&self, n: usize) {
        self.0.lock().unwrap().fail_next = n;
    }
}

pub struct MockAdapter {
    name: &'static str,
    probe: MockProbe,
}

impl MockAdapter {
    pub fn new(name: &'static str) -> (Self, MockProbe) {
        let probe = MockProbe::default();
        (
            Self {
                name,
                probe: probe.clone(),
            },
            probe,
        )
    }
}

impl DisplayAdapter for MockAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn present(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        let mut inner = self.probe.0.lock().unwrap();
        inner.attempts += 1;
        if inner.fail_always {
            return Err(DisplayError::Device("simulated failure".to_string()));
        }
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(DisplayError::Device("simulated transient failure".to_string()));
        }
        inner.presented += 1;
        inner.last_frame_size = Some((frame.width(), frame.height()));
        Ok(())
    }
}
