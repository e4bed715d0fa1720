/*
 *  scroll.rs
 *
 *  NeonHUD - dashboards for small panels
 *  (c) 2023-26 NeonHUD authors
 *
 *  Horizontal text scrolling for the media screen fields. Offsets wrap
 *  rather than ping-pong, and a field is rebuilt only when its text
 *  actually changes.
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

use crate::state::{RenderState, ScreenMode};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Pixels of blank run-out between the end of the text and its
/// wrapped-around start.
pub const WRAP_GAP_PX: u32 = 40;

/// Pixels advanced per 15 Hz tick.
const STEP_PX: u32 = 2;

pub const TICK_HZ: u64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldId {
    Title,
    Artists,
    Album,
}

#[derive(Debug, Clone, Default)]
struct Field {
    text: String,
    offset: u32,
    max_offset: u32,
    active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FieldSnapshot {
    pub text: String,
    pub offset: u32,
    pub max_offset: u32,
}

/// The scroll group: three fields behind one lock.
pub struct ScrollGroup {
    fields: Mutex<[Field; 3]>,
}

fn index(id: FieldId) -> usize {
    match id {
        FieldId::Title => 0,
        FieldId::Artists => 1,
        FieldId::Album => 2,
    }
}

impl ScrollGroup {
    pub fn new() -> Self {
        Self {
            fields: Mutex::new(std::array::from_fn(|_| Field::default())),
        }
    }

    /// Install text for a field. A repeat of the current text leaves
    /// the running offset alone; new text resets the offset with the
    /// scroll geometry in the same critical section.
    pub fn set_text(&self, id: FieldId, text: &str, text_px: u32, viewport_px: u32) {
        let mut fields = self.fields.lock().unwrap();
        let field = &mut fields[index(id)];
        if field.text == text {
            return;
        }
        field.text = text.to_string();
        field.offset = 0;
        if text_px > viewport_px {
            field.max_offset = text_px + WRAP_GAP_PX;
            field.active = true;
        } else {
            field.max_offset = 0;
            field.active = false;
        }
    }

    pub fn snapshot(&self, id: FieldId) -> FieldSnapshot {
        let fields = self.fields.lock().unwrap();
        let field = &fields[index(id)];
        FieldSnapshot {
            text: field.text.clone(),
            offset: field.offset,
            max_offset: field.max_offset,
        }
    }

    /// One tick for every active field. Returns true when any offset
    /// moved.
    pub fn advance(&self) -> bool {
        let mut fields = self.fields.lock().unwrap();
        let mut moved = false;
        for field in fields.iter_mut() {
            if field.active && field.max_offset > 0 {
                field.offset = (field.offset + STEP_PX) % field.max_offset;
                moved = true;
            }
        }
        moved
    }

    pub fn reset_all(&self) {
        let mut fields = self.fields.lock().unwrap();
        for field in fields.iter_mut() {
            *field = Field::default();
        }
    }
}

impl Default for ScrollGroup {
    fn default() -> Self {
        Self::new()
    }
}

/// 15 Hz scroll animator. Wakes the render loop only while the media
/// screen is up.
pub fn spawn_animator(
    group: Arc<ScrollGroup>,
    state: Arc<RenderState>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(1000 / TICK_HZ));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if group.advance() && state.screen_mode() == ScreenMode::Media {
                        state.request_redraw();
                    }
                }
                _ = cancel.cancelled() => {
                    log::debug!("scroll animator stopping");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_does_not_scroll() {
        let group = ScrollGroup::new();
        group.set_text(FieldId::Title, "Hi", 20, 400);
        assert!(!group.advance());
        assert_eq!(group.snapshot(FieldId::Title).offset, 0);
    }

    #[test]
    fn long_text_wraps_within_bounds() {
        let group = ScrollGroup::new();
        group.set_text(FieldId::Title, "A very long track title", 500, 400);
        let max = group.snapshot(FieldId::Title).max_offset;
        assert_eq!(max, 500 + WRAP_GAP_PX);
        for _ in 0..(max * 2) {
            assert!(group.advance());
            let offset = group.snapshot(FieldId::Title).offset;
            assert!(offset < max, "offset {offset} escaped max {max}");
        }
    }

    #[test]
    fn repeated_text_keeps_offset() {
        let group = ScrollGroup::new();
        group.set_text(FieldId::Artists, "Someone & Friends", 600, 400);
        for _ in 0..5 {
            group.advance();
        }
        let before = group.snapshot(FieldId::Artists).offset;
        assert_ne!(before, 0);
        group.set_text(FieldId::Artists, "Someone & Friends", 600, 400);
        assert_eq!(group.snapshot(FieldId::Artists).offset, before);
    }

    #[test]
    fn new_text_resets_offset() {
        let group = ScrollGroup::new();
        group.set_text(FieldId::Album, "First Album", 600, 400);
        for _ in 0..5 {
            group.advance();
        }
        group.set_text(FieldId::Album, "Second Album", 700, 400);
        let snap = group.snapshot(FieldId::Album);
        assert_eq!(snap.offset, 0);
        assert_eq!(snap.max_offset, 700 + WRAP_GAP_PX);
    }
}
