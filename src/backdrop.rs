/*
 *  backdrop.rs
 *
 *  NeonHUD - dashboards for small panels
 *  (c) 2023-26 NeonHUD authors
 *
 *  Asynchronous backdrop generation: a bounded job queue feeding a
 *  single worker that turns album art into a blurred, faded, tinted
 *  full-frame background, published into a small keyed cache.
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

use crate::palette;
use crate::sprite::ArtImage;
use crate::state::{RenderState, ScreenMode};
use embedded_graphics::prelude::RgbColor;
use image::imageops::FilterType;
use image::RgbImage;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const QUEUE_CAPACITY: usize = 5;

/// Cache bounds: overflow past CACHE_CAP discards oldest entries until
/// CACHE_KEEP survive.
const CACHE_CAP: usize = 5;
const CACHE_KEEP: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackdropKind {
    Media,
    Clock,
}

#[derive(Debug, Error)]
pub enum BackdropError {
    #[error("source art is empty")]
    EmptyArt,
    #[error("target size {0}x{1} is not drawable")]
    EmptyTarget(u32, u32),
}

pub struct BackdropJob {
    pub source: ArtImage,
    pub size: (u32, u32),
    pub kind: BackdropKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitResult {
    Submitted,
    Dropped,
}

/// Submission handle. `submit` never blocks: when the queue is at
/// capacity the new job is the one discarded.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<BackdropJob>,
}

impl JobQueue {
    pub fn new() -> (Self, mpsc::Receiver<BackdropJob>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        (Self { tx }, rx)
    }

    pub fn submit(&self, job: BackdropJob) -> SubmitResult {
        match self.tx.try_send(job) {
            Ok(()) => SubmitResult::Submitted,
            Err(mpsc::error::TrySendError::Full(job)) => {
                log::warn!(
                    "backdrop queue full, dropping {:?} job for art {:016x}",
                    job.kind,
                    job.source.content_hash
                );
                SubmitResult::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::warn!("backdrop worker gone, dropping job");
                SubmitResult::Dropped
            }
        }
    }
}

struct CacheEntry {
    image: Arc<RgbImage>,
    seq: u64,
}

/// Finished backdrops keyed by (art content hash, kind). Lookups are
/// made with the *current* track's hash, so a stale entry for replaced
/// art simply never matches.
pub struct BackdropCache {
    entries: Mutex<(HashMap<(u64, BackdropKind), CacheEntry>, u64)>,
}

impl BackdropCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new((HashMap::new(), 0)),
        }
    }

    pub fn insert(&self, hash: u64, kind: BackdropKind, image: RgbImage) {
        let mut guard = self.entries.lock().unwrap();
        let (map, seq) = &mut *guard;
        *seq += 1;
        map.insert(
            (hash, kind),
            CacheEntry {
                image: Arc::new(image),
                seq: *seq,
            },
        );
        if map.len() > CACHE_CAP {
            let mut seqs: Vec<(u64, (u64, BackdropKind))> =
                map.iter().map(|(k, e)| (e.seq, *k)).collect();
            seqs.sort_unstable_by_key(|(seq, _)| *seq);
            let evict = map.len() - CACHE_KEEP;
            for (_, key) in seqs.into_iter().take(evict) {
                map.remove(&key);
            }
            log::debug!("backdrop cache trimmed to {} entries", map.len());
        }
    }

    pub fn get(&self, current_hash: u64, kind: BackdropKind) -> Option<Arc<RgbImage>> {
        let guard = self.entries.lock().unwrap();
        guard.0.get(&(current_hash, kind)).map(|e| Arc::clone(&e.image))
    }

    /// Drop every kind cached for one art hash.
    pub fn invalidate_hash(&self, hash: u64) {
        let mut guard = self.entries.lock().unwrap();
        guard.0.retain(|(h, _), _| *h != hash);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().0.len()
    }
}

impl Default for BackdropCache {
    fn default() -> Self {
        Self::new()
    }
}

fn darken(img: &mut RgbImage, factor: f32) {
    for px in img.pixels_mut() {
        for c in px.0.iter_mut() {
            *c = (*c as f32 * factor).round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Build the full-frame backdrop:
/// fill with the art's average color knocked down to 70%, scale the
/// art to frame height, blur and darken it, then composite it centered
/// through a horizontal fade mask so it melts into the fill at both
/// edges.
pub fn synthesize(
    art: &RgbImage,
    size: (u32, u32),
    kind: BackdropKind,
) -> Result<RgbImage, BackdropError> {
    let (fw, fh) = size;
    if fw == 0 || fh == 0 {
        return Err(BackdropError::EmptyTarget(fw, fh));
    }
    if art.width() == 0 || art.height() == 0 {
        return Err(BackdropError::EmptyArt);
    }

    let avg = palette::average_color(art);
    let fill = palette::scale(avg, 0.7);
    let mut canvas = RgbImage::from_pixel(fw, fh, image::Rgb([fill.r(), fill.g(), fill.b()]));

    let art_size = fh;
    let mut scaled = image::imageops::resize(art, art_size, art_size, FilterType::Triangle);
    scaled = image::imageops::blur(&scaled, 2.0);
    let brightness = match kind {
        BackdropKind::Media => 0.6,
        BackdropKind::Clock => 0.45,
    };
    darken(&mut scaled, brightness);

    // horizontal fade: fully transparent at the art's vertical edges,
    // ramping in over fade_width with a 0.7-power curve
    let fade_width = 80.min(art_size / 4).max(1);
    let x0 = (fw as i64 - art_size as i64) / 2;
    for (sx, sy, px) in scaled.enumerate_pixels() {
        let dx = x0 + sx as i64;
        if dx < 0 || dx >= fw as i64 || sy >= fh {
            continue;
        }
        let from_left = sx.min(art_size - 1 - sx);
        let alpha = if from_left >= fade_width {
            1.0
        } else {
            (from_left as f32 / fade_width as f32).powf(0.7)
        };
        let under = canvas.get_pixel(dx as u32, sy);
        let mix = |a: u8, b: u8| (a as f32 * (1.0 - alpha) + b as f32 * alpha).round() as u8;
        canvas.put_pixel(
            dx as u32,
            sy,
            image::Rgb([
                mix(under.0[0], px.0[0]),
                mix(under.0[1], px.0[1]),
                mix(under.0[2], px.0[2]),
            ]),
        );
    }

    Ok(canvas)
}

/// The single worker. Dequeues with a timeout so shutdown is observed
/// while the queue sits idle; synthesis failures log and leave any
/// previously cached entry in place.
pub fn spawn_worker(
    mut rx: mpsc::Receiver<BackdropJob>,
    cache: Arc<BackdropCache>,
    state: Arc<RenderState>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if cancel.is_cancelled() {
                log::debug!("backdrop worker stopping");
                break;
            }
            let job = match tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(_) => continue,
            };

            let hash = job.source.content_hash;
            match synthesize(&job.source.pixels, job.size, job.kind) {
                Ok(image) => {
                    cache.insert(hash, job.kind, image);
                    log::debug!("backdrop ready for art {:016x} ({:?})", hash, job.kind);
                    let showing = state.screen_mode();
                    if (job.kind == BackdropKind::Media && showing == ScreenMode::Media)
                        || (job.kind == BackdropKind::Clock && showing == ScreenMode::Clock)
                    {
                        state.request_redraw();
                    }
                }
                Err(err) => {
                    log::error!("backdrop synthesis failed for art {hash:016x}: {err}");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn art() -> RgbImage {
        let mut img = RgbImage::new(64, 64);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = image::Rgb([(x * 4) as u8, (y * 4) as u8, 128]);
        }
        img
    }

    #[test]
    fn synthesize_fills_target_size() {
        let bg = synthesize(&art(), (480, 320), BackdropKind::Media).unwrap();
        assert_eq!((bg.width(), bg.height()), (480, 320));
    }

    #[test]
    fn synthesize_rejects_degenerate_input() {
        assert!(synthesize(&art(), (0, 320), BackdropKind::Media).is_err());
        assert!(synthesize(&RgbImage::new(0, 0), (480, 320), BackdropKind::Media).is_err());
    }

    #[test]
    fn clock_backdrop_is_darker_in_the_middle() {
        let source = art();
        let media = synthesize(&source, (480, 320), BackdropKind::Media).unwrap();
        let clock = synthesize(&source, (480, 320), BackdropKind::Clock).unwrap();
        let lum = |img: &RgbImage| {
            let px = img.get_pixel(240, 160);
            px.0[0] as u32 + px.0[1] as u32 + px.0[2] as u32
        };
        assert!(lum(&clock) < lum(&media));
    }

    #[test]
    fn cache_miss_on_changed_hash() {
        let cache = BackdropCache::new();
        cache.insert(1, BackdropKind::Media, RgbImage::new(4, 4));
        assert!(cache.get(1, BackdropKind::Media).is_some());
        assert!(cache.get(2, BackdropKind::Media).is_none());
        assert!(cache.get(1, BackdropKind::Clock).is_none());
    }

    #[test]
    fn cache_evicts_oldest_past_cap() {
        let cache = BackdropCache::new();
        for hash in 0..6u64 {
            cache.insert(hash, BackdropKind::Media, RgbImage::new(2, 2));
        }
        assert_eq!(cache.len(), CACHE_KEEP);
        // the three newest survive
        assert!(cache.get(5, BackdropKind::Media).is_some());
        assert!(cache.get(4, BackdropKind::Media).is_some());
        assert!(cache.get(3, BackdropKind::Media).is_some());
        assert!(cache.get(0, BackdropKind::Media).is_none());
    }

    #[test]
    fn invalidate_drops_both_kinds() {
        let cache = BackdropCache::new();
        cache.insert(7, BackdropKind::Media, RgbImage::new(2, 2));
        cache.insert(7, BackdropKind::Clock, RgbImage::new(2, 2));
        cache.invalidate_hash(7);
        assert!(cache.get(7, BackdropKind::Media).is_none());
        assert!(cache.get(7, BackdropKind::Clock).is_none());
    }

    #[tokio::test]
    async fn queue_accepts_exactly_capacity_without_blocking() {
        let (queue, _rx) = JobQueue::new();
        let mut submitted = 0;
        let mut dropped = 0;
        for _ in 0..(QUEUE_CAPACITY + 3) {
            let job = BackdropJob {
                source: ArtImage::new(art()),
                size: (480, 320),
                kind: BackdropKind::Media,
            };
            match queue.submit(job) {
                SubmitResult::Submitted => submitted += 1,
                SubmitResult::Dropped => dropped += 1,
            }
        }
        assert_eq!(submitted, QUEUE_CAPACITY);
        assert_eq!(dropped, 3);
    }
}
