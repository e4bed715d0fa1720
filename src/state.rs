/*
 *  state.rs
 *
 *  NeonHUD - dashboards for small panels
 *  (c) 2023-26 NeonHUD authors
 *
 *  Shared render state. Each logical group sits behind its own lock;
 *  readers copy snapshots out and writers replace wholesale, so no
 *  lock is ever held across rendering or an await point.
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

use crate::backdrop::BackdropCache;
use crate::palette::AccentPair;
use crate::weather::WeatherSnapshot;
use std::sync::Mutex;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenMode {
    Weather,
    Media,
    Clock,
}

impl ScreenMode {
    pub fn advance(self) -> Self {
        match self {
            ScreenMode::Weather => ScreenMode::Media,
            ScreenMode::Media => ScreenMode::Clock,
            ScreenMode::Clock => ScreenMode::Weather,
        }
    }

    /// Config / CLI spelling. Unknown names fall back to weather;
    /// validation rejects them before we get here.
    pub fn parse(name: &str) -> Self {
        match name {
            "media" => ScreenMode::Media,
            "clock" => ScreenMode::Clock,
            _ => ScreenMode::Weather,
        }
    }
}

/// Everything the compositor needs to draw the media screen, minus the
/// decoded images themselves (those live with the sprite board and the
/// backdrop cache, keyed by `art_hash`).
#[derive(Debug, Clone, Default)]
pub struct TrackSnapshot {
    pub id: String,
    pub title: String,
    pub artists: String,
    pub album: String,
    pub position_secs: u32,
    pub duration_secs: u32,
    pub is_playing: bool,
    pub accents: AccentPair,
    pub art_url: Option<String>,
    pub art_hash: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct ModeGroup {
    mode: ScreenMode,
    time_display: bool,
    progress_bar: bool,
}

/// Central state hub. Mode/toggles, weather slot and track slot each
/// have their own mutex; the watch channel lets any writer ask the
/// render loop for a frame without the loop polling blindly.
pub struct RenderState {
    mode: Mutex<ModeGroup>,
    weather: Mutex<Option<WeatherSnapshot>>,
    track: Mutex<Option<TrackSnapshot>>,
    redraw: watch::Sender<u64>,
}

impl RenderState {
    pub fn new(start_mode: ScreenMode, time_display: bool, progress_bar: bool) -> Self {
        let (redraw, _) = watch::channel(0u64);
        Self {
            mode: Mutex::new(ModeGroup {
                mode: start_mode,
                time_display,
                progress_bar,
            }),
            weather: Mutex::new(None),
            track: Mutex::new(None),
            redraw,
        }
    }

    /// Redraw requests are a bumped counter; receivers only care that
    /// the value changed.
    pub fn subscribe_redraw(&self) -> watch::Receiver<u64> {
        self.redraw.subscribe()
    }

    pub fn request_redraw(&self) {
        self.redraw.send_modify(|n| *n = n.wrapping_add(1));
    }

    pub fn screen_mode(&self) -> ScreenMode {
        self.mode.lock().unwrap().mode
    }

    pub fn set_screen_mode(&self, mode: ScreenMode) {
        {
            let mut group = self.mode.lock().unwrap();
            if group.mode == mode {
                return;
            }
            log::info!("screen mode {:?} -> {:?}", group.mode, mode);
            group.mode = mode;
        }
        self.request_redraw();
    }

    pub fn advance_screen_mode(&self) -> ScreenMode {
        let next = {
            let mut group = self.mode.lock().unwrap();
            group.mode = group.mode.advance();
            group.mode
        };
        log::info!("screen mode advanced to {next:?}");
        self.request_redraw();
        next
    }

    pub fn time_display_enabled(&self) -> bool {
        self.mode.lock().unwrap().time_display
    }

    pub fn toggle_time_display(&self) -> bool {
        let on = {
            let mut group = self.mode.lock().unwrap();
            group.time_display = !group.time_display;
            group.time_display
        };
        self.request_redraw();
        on
    }

    pub fn progress_bar_enabled(&self) -> bool {
        self.mode.lock().unwrap().progress_bar
    }

    pub fn weather(&self) -> Option<WeatherSnapshot> {
        self.weather.lock().unwrap().clone()
    }

    pub fn set_weather(&self, snapshot: WeatherSnapshot) {
        *self.weather.lock().unwrap() = Some(snapshot);
        self.request_redraw();
    }

    pub fn track(&self) -> Option<TrackSnapshot> {
        self.track.lock().unwrap().clone()
    }

    pub fn set_track(&self, snapshot: TrackSnapshot) {
        *self.track.lock().unwrap() = Some(snapshot);
        self.request_redraw();
    }

    /// Drop the track slot and retire any backdrops keyed to its art.
    /// The two locks are taken one after the other, never nested.
    pub fn clear_track(&self, backdrops: &BackdropCache) {
        let previous_hash = {
            let mut slot = self.track.lock().unwrap();
            slot.take().and_then(|t| t.art_hash)
        };
        if let Some(hash) = previous_hash {
            backdrops.invalidate_hash(hash);
        }
        self.request_redraw();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_cycle() {
        assert_eq!(ScreenMode::Weather.advance(), ScreenMode::Media);
        assert_eq!(ScreenMode::Media.advance(), ScreenMode::Clock);
        assert_eq!(ScreenMode::Clock.advance(), ScreenMode::Weather);
    }

    #[test]
    fn advance_wraps_and_signals() {
        let state = RenderState::new(ScreenMode::Clock, true, true);
        let rx = state.subscribe_redraw();
        let before = *rx.borrow();
        assert_eq!(state.advance_screen_mode(), ScreenMode::Weather);
        assert_ne!(*rx.borrow(), before);
    }

    #[test]
    fn set_same_mode_is_quiet() {
        let state = RenderState::new(ScreenMode::Media, true, true);
        let rx = state.subscribe_redraw();
        let before = *rx.borrow();
        state.set_screen_mode(ScreenMode::Media);
        assert_eq!(*rx.borrow(), before);
    }

    #[test]
    fn track_slot_snapshot_copy() {
        let state = RenderState::new(ScreenMode::Media, true, true);
        assert!(state.track().is_none());
        state.set_track(TrackSnapshot {
            id: "t1".into(),
            title: "Song".into(),
            ..Default::default()
        });
        let copy = state.track().unwrap();
        assert_eq!(copy.title, "Song");

        let backdrops = BackdropCache::new();
        state.clear_track(&backdrops);
        assert!(state.track().is_none());
    }

    #[test]
    fn toggle_time_display_flips() {
        let state = RenderState::new(ScreenMode::Weather, true, true);
        assert!(!state.toggle_time_display());
        assert!(state.toggle_time_display());
    }
}
