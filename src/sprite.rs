/*
 *  sprite.rs
 *
 *  NeonHUD - dashboards for small panels
 *  (c) 2023-26 NeonHUD authors
 *
 *  Bouncing art sprites for the media screen: album art plus an
 *  optional artist photo, stepped at 60 Hz with measured frame deltas.
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
use image::RgbImage;
use rand::Rng;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Decoded RGB image plus a hash of its pixel content. The hash keys
/// backdrop cache entries, so identical art re-fetched for a new track
/// still hits the cache.
#[derive(Debug, Clone)]
pub struct ArtImage {
    pub pixels: Arc<RgbImage>,
    pub content_hash: u64,
}

impl ArtImage {
    pub fn new(img: RgbImage) -> Self {
        let mut hasher = std::hash::DefaultHasher::new();
        img.width().hash(&mut hasher);
        img.height().hash(&mut hasher);
        img.as_raw().hash(&mut hasher);
        Self {
            pixels: Arc::new(img),
            content_hash: hasher.finish(),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

#[derive(Debug, Clone)]
pub struct Sprite {
    pub image: ArtImage,
    pub position: (f32, f32),
    pub velocity: (f32, f32),
    pub z_on_top: bool,
}

/// Tuning knobs, straight from config.
#[derive(Debug, Clone, Copy)]
pub struct SpriteTuning {
    pub speed_factor: f32,
    pub step_multiplier: f32,
}

/// One physics step. Takes the sprite by value and hands back the moved
/// sprite plus whether it bounced off any edge this step. Reflection
/// flips the velocity axis and the position is clamped so the sprite
/// never leaves `[0, frame - sprite]` on either axis.
pub fn step(
    mut sprite: Sprite,
    frame: (u32, u32),
    delta_secs: f32,
    tuning: SpriteTuning,
) -> (Sprite, bool) {
    let scale = delta_secs * 60.0 * tuning.speed_factor * tuning.step_multiplier;
    let max_x = (frame.0.saturating_sub(sprite.image.width())) as f32;
    let max_y = (frame.1.saturating_sub(sprite.image.height())) as f32;

    let mut bounced = false;
    let mut axis = |pos: f32, vel: f32, max: f32| -> (f32, f32) {
        let mut p = pos + vel * scale;
        let mut v = vel;
        if p < 0.0 {
            p = -p;
            v = -v;
            bounced = true;
        }
        if p > max {
            p = 2.0 * max - p;
            v = -v;
            bounced = true;
        }
        (p.clamp(0.0, max), v)
    };

    let (x, vx) = axis(sprite.position.0, sprite.velocity.0, max_x);
    let (y, vy) = axis(sprite.position.1, sprite.velocity.1, max_y);
    sprite.position = (x, y);
    sprite.velocity = (vx, vy);
    (sprite, bounced)
}

/// What the compositor needs: images in paint order with pixel
/// positions.
#[derive(Clone)]
pub struct SpriteRender {
    pub pixels: Arc<RgbImage>,
    pub x: i64,
    pub y: i64,
}

struct Slots {
    primary: Option<Sprite>,
    secondary: Option<Sprite>,
}

/// The sprite group. One lock, snapshot-copy in and out.
pub struct SpriteBoard {
    slots: Mutex<Slots>,
    frame: (u32, u32),
    tuning: SpriteTuning,
}

impl SpriteBoard {
    pub fn new(frame: (u32, u32), tuning: SpriteTuning) -> Self {
        Self {
            slots: Mutex::new(Slots {
                primary: None,
                secondary: None,
            }),
            frame,
            tuning,
        }
    }

    /// Replace both sprites for a new track. Positions and headings are
    /// randomized so consecutive tracks don't retrace each other.
    pub fn set_art(&self, primary: ArtImage, secondary: Option<ArtImage>) {
        let mut rng = rand::rng();
        let mut spawn = |image: ArtImage, z_on_top: bool| -> Sprite {
            let max_x = (self.frame.0.saturating_sub(image.width())) as f32;
            let max_y = (self.frame.1.saturating_sub(image.height())) as f32;
            let speed = rng.random_range(1.5..3.0);
            let dir_x = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
            let dir_y = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
            Sprite {
                image,
                position: (
                    rng.random_range(0.0..=max_x.max(0.0)),
                    rng.random_range(0.0..=max_y.max(0.0)),
                ),
                velocity: (speed * dir_x, speed * dir_y),
                z_on_top,
            }
        };

        let primary = spawn(primary, true);
        let secondary = secondary.map(|img| spawn(img, false));
        let mut slots = self.slots.lock().unwrap();
        slots.primary = Some(primary);
        slots.secondary = secondary;
    }

    pub fn clear(&self) {
        let mut slots = self.slots.lock().unwrap();
        slots.primary = None;
        slots.secondary = None;
    }

    pub fn primary_hash(&self) -> Option<u64> {
        self.slots
            .lock()
            .unwrap()
            .primary
            .as_ref()
            .map(|s| s.image.content_hash)
    }

    /// Paint-ordered render list: whichever sprite is z-lower comes
    /// first.
    pub fn render_list(&self) -> Vec<SpriteRender> {
        let slots = self.slots.lock().unwrap();
        let mut list: Vec<(bool, SpriteRender)> = Vec::with_capacity(2);
        for sprite in [&slots.primary, &slots.secondary].into_iter().flatten() {
            list.push((
                sprite.z_on_top,
                SpriteRender {
                    pixels: Arc::clone(&sprite.image.pixels),
                    x: sprite.position.0.round() as i64,
                    y: sprite.position.1.round() as i64,
                },
            ));
        }
        list.sort_by_key(|(on_top, _)| *on_top);
        list.into_iter().map(|(_, r)| r).collect()
    }

    /// Advance both sprites by one measured step. Returns true when
    /// anything moved. The lock is only held to copy slots out and to
    /// write them back.
    pub fn tick(&self, delta_secs: f32) -> bool {
        let (primary, secondary) = {
            let slots = self.slots.lock().unwrap();
            (slots.primary.clone(), slots.secondary.clone())
        };
        if primary.is_none() && secondary.is_none() {
            return false;
        }

        let primary = primary.map(|s| step(s, self.frame, delta_secs, self.tuning).0);
        let secondary = secondary.map(|s| {
            let (mut s, bounced) = step(s, self.frame, delta_secs, self.tuning);
            // a bounce gives the artist photo a coin-flip chance to
            // swap above or below the album art
            if bounced && rand::rng().random_bool(0.5) {
                s.z_on_top = !s.z_on_top;
            }
            s
        });

        let mut slots = self.slots.lock().unwrap();
        slots.primary = primary;
        slots.secondary = secondary;
        true
    }
}

/// 60 Hz animator task. Only wakes the render loop while the media
/// screen is showing; the physics still advance in the background so
/// sprites don't freeze mid-flight when switching screens.
pub fn spawn_animator(
    board: Arc<SpriteBoard>,
    state: Arc<RenderState>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(1000 / 60));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last = Instant::now();
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Instant::now();
                    let delta = (now - last).as_secs_f32();
                    last = now;
                    let moved = board.tick(delta);
                    if moved && state.screen_mode() == ScreenMode::Media {
                        state.request_redraw();
                    }
                }
                _ = cancel.cancelled() => {
                    log::debug!("sprite animator stopping");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn art(w: u32, h: u32) -> ArtImage {
        ArtImage::new(RgbImage::from_pixel(w, h, image::Rgb([200, 10, 10])))
    }

    fn tuning() -> SpriteTuning {
        SpriteTuning {
            speed_factor: 0.4,
            step_multiplier: 1.0,
        }
    }

    #[test]
    fn content_hash_tracks_pixels() {
        let a = ArtImage::new(RgbImage::from_pixel(8, 8, image::Rgb([1, 2, 3])));
        let b = ArtImage::new(RgbImage::from_pixel(8, 8, image::Rgb([1, 2, 3])));
        let c = ArtImage::new(RgbImage::from_pixel(8, 8, image::Rgb([3, 2, 1])));
        assert_eq!(a.content_hash, b.content_hash);
        assert_ne!(a.content_hash, c.content_hash);
    }

    #[test]
    fn step_stays_in_bounds() {
        let frame = (480u32, 320u32);
        let mut sprite = Sprite {
            image: art(150, 150),
            position: (10.0, 10.0),
            velocity: (73.0, -41.0),
            z_on_top: true,
        };
        // absurd deltas included on purpose
        for delta in [0.016f32, 0.5, 0.001, 2.0, 0.016, 0.25] {
            let (next, _) = step(sprite, frame, delta, tuning());
            sprite = next;
            assert!(sprite.position.0 >= 0.0 && sprite.position.0 <= 330.0);
            assert!(sprite.position.1 >= 0.0 && sprite.position.1 <= 170.0);
        }
    }

    #[test]
    fn step_reflects_velocity_at_edge() {
        let frame = (480u32, 320u32);
        let sprite = Sprite {
            image: art(100, 100),
            position: (375.0, 50.0),
            velocity: (10.0, 0.0),
            z_on_top: true,
        };
        let (next, bounced) = step(sprite, frame, 1.0 / 60.0 * 10.0, tuning());
        assert!(bounced);
        assert!(next.velocity.0 < 0.0);
    }

    #[test]
    fn oversized_sprite_pins_to_origin() {
        let frame = (100u32, 100u32);
        let sprite = Sprite {
            image: art(150, 150),
            position: (0.0, 0.0),
            velocity: (5.0, 5.0),
            z_on_top: true,
        };
        let (next, _) = step(sprite, frame, 0.016, tuning());
        assert_eq!(next.position, (0.0, 0.0));
    }

    #[test]
    fn board_replaces_and_clears() {
        let board = SpriteBoard::new((480, 320), tuning());
        assert!(board.render_list().is_empty());
        board.set_art(art(150, 150), Some(art(100, 100)));
        assert_eq!(board.render_list().len(), 2);
        assert!(board.primary_hash().is_some());
        board.clear();
        assert!(board.render_list().is_empty());
    }

    #[test]
    fn tick_moves_sprites() {
        let board = SpriteBoard::new((480, 320), tuning());
        board.set_art(art(150, 150), None);
        let before = board.render_list()[0].clone();
        assert!(board.tick(0.25));
        let after = &board.render_list()[0];
        assert!(before.x != after.x || before.y != after.y);
    }
}
