/*
 *  media.rs
 *
 *  NeonHUD - dashboards for small panels
 *  (c) 2023-26 NeonHUD authors
 *
 *  Now-playing polling. A MediaSource yields normalized track info;
 *  the poll loop turns identity changes into sprite art, accent
 *  colors, backdrop jobs, scroll resets and the cross-process export,
 *  and keeps progress ticking in between.
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

use crate::backdrop::{BackdropCache, BackdropJob, BackdropKind, JobQueue};
use crate::compose;
use crate::config::MediaConfig;
use crate::export::{self, ExportRecord};
use crate::frame::TextMeasure;
use crate::palette::{self, AccentPair};
use crate::scroll::{FieldId, ScrollGroup};
use crate::sprite::{ArtImage, SpriteBoard};
use crate::state::{RenderState, TrackSnapshot};
use image::RgbImage;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Album art is scaled to this edge for the primary sprite.
const ART_SPRITE_PX: u32 = 150;
/// Artist photo sprite edge.
const PHOTO_SPRITE_PX: u32 = 100;

/// Error counter housekeeping.
const MAX_BACKOFF_SECS: u64 = 30;
const QUIET_RESET_SECS: u64 = 300;
const CLEAR_AFTER_FAILURES: u32 = 5;

/// Progress re-export policy.
const EXPORT_MAX_AGE_SECS: u64 = 30;
const EXPORT_JUMP_SECS: i64 = 5;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("authentication rejected (HTTP {0})")]
    Auth(u16),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("image decode error: {0}")]
    Decode(#[from] image::ImageError),
    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl MediaError {
    pub fn is_auth(&self) -> bool {
        matches!(self, MediaError::Auth(_))
    }
}

/// Normalized now-playing info, source-agnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub id: String,
    pub title: String,
    pub artists: String,
    pub album: String,
    pub position_secs: u32,
    pub duration_secs: u32,
    pub is_playing: bool,
    pub art_url: Option<String>,
    pub artist_photo_url: Option<String>,
}

/// Anything that can answer "what's playing". Kept generic so the
/// tests can script a source.
pub trait MediaSource: Send + Sync {
    fn currently_playing(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<NowPlaying>, MediaError>> + Send;

    fn fetch_art(
        &self,
        url: &str,
    ) -> impl std::future::Future<Output = Result<RgbImage, MediaError>> + Send;
}

#[derive(Deserialize)]
struct WirePlaying {
    item: Option<WireItem>,
    #[serde(default)]
    progress_ms: u64,
    #[serde(default)]
    is_playing: bool,
}

#[derive(Deserialize)]
struct WireItem {
    id: String,
    name: String,
    #[serde(default)]
    artists: Vec<WireArtist>,
    album: WireAlbum,
    #[serde(default)]
    duration_ms: u64,
}

#[derive(Deserialize)]
struct WireArtist {
    name: String,
    #[serde(default)]
    images: Vec<WireImage>,
}

#[derive(Deserialize)]
struct WireAlbum {
    #[serde(default)]
    name: String,
    #[serde(default)]
    images: Vec<WireImage>,
}

#[derive(Deserialize)]
struct WireImage {
    url: String,
    #[serde(default)]
    width: u32,
}

fn normalize(wire: WirePlaying) -> Option<NowPlaying> {
    let item = wire.item?;
    let artists = item
        .artists
        .iter()
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    // smallest image at or above the sprite size, else the largest
    let pick = |images: &[WireImage], want: u32| -> Option<String> {
        images
            .iter()
            .filter(|i| i.width == 0 || i.width >= want)
            .min_by_key(|i| i.width)
            .or_else(|| images.iter().max_by_key(|i| i.width))
            .map(|i| i.url.clone())
    };
    let art_url = pick(&item.album.images, ART_SPRITE_PX);
    let artist_photo_url = item
        .artists
        .first()
        .and_then(|a| pick(&a.images, PHOTO_SPRITE_PX));
    Some(NowPlaying {
        id: item.id,
        title: item.name,
        artists,
        album: item.album.name,
        position_secs: (wire.progress_ms / 1000) as u32,
        duration_secs: (item.duration_ms / 1000) as u32,
        is_playing: wire.is_playing,
        art_url,
        artist_photo_url,
    })
}

/// HTTP source speaking the Spotify-shaped currently-playing payload,
/// with a bearer token read from a cache file.
pub struct HttpMediaSource {
    client: reqwest::Client,
    url: String,
    token_cache: PathBuf,
}

impl HttpMediaSource {
    pub fn new(client: reqwest::Client, cfg: &MediaConfig) -> Self {
        Self {
            client,
            url: cfg.now_playing_url.clone(),
            token_cache: PathBuf::from(&cfg.token_cache),
        }
    }

    fn bearer_token(&self) -> Option<String> {
        std::fs::read_to_string(&self.token_cache)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

impl MediaSource for HttpMediaSource {
    async fn currently_playing(&self) -> Result<Option<NowPlaying>, MediaError> {
        let mut request = self.client.get(&self.url);
        if let Some(token) = self.bearer_token() {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(MediaError::Auth(status.as_u16()));
        }
        // 204: nothing playing
        if status.as_u16() == 204 {
            return Ok(None);
        }
        let wire: WirePlaying = response.error_for_status()?.json().await?;
        Ok(normalize(wire))
    }

    async fn fetch_art(&self, url: &str) -> Result<RgbImage, MediaError> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(image::load_from_memory(&bytes)?.to_rgb8())
    }
}

/// Bounded exponential backoff with a quiet-period reset.
#[derive(Debug)]
pub struct Backoff {
    consecutive: u32,
    last_failure: Option<Instant>,
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            consecutive: 0,
            last_failure: None,
        }
    }

    /// Register a failure and get the delay before the next attempt.
    pub fn record_failure(&mut self, now: Instant) -> Duration {
        if let Some(last) = self.last_failure {
            if now.duration_since(last) > Duration::from_secs(QUIET_RESET_SECS) {
                self.consecutive = 0;
            }
        }
        self.consecutive += 1;
        self.last_failure = Some(now);
        let secs = 2u64
            .saturating_pow(self.consecutive.min(10))
            .min(MAX_BACKOFF_SECS);
        Duration::from_secs(secs)
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
        self.last_failure = None;
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the media loop touches besides the source itself.
pub struct MediaDeps {
    pub state: Arc<RenderState>,
    pub sprites: Arc<SpriteBoard>,
    pub scroll: Arc<ScrollGroup>,
    pub queue: JobQueue,
    pub backdrops: Arc<BackdropCache>,
    pub measure: Arc<TextMeasure>,
    pub frame: (u32, u32),
    /// Also queue a Clock-kind backdrop on track change.
    pub clock_album_backdrop: bool,
    pub export_path: PathBuf,
    pub token_cache: PathBuf,
}

pub struct ExportClock {
    wrote_at: Instant,
    position: u32,
}

fn install_scroll_text(deps: &MediaDeps, np: &NowPlaying) {
    let viewport = deps.frame.0.saturating_sub(2 * compose::TEXT_MARGIN_PX);
    for (id, text) in [
        (FieldId::Title, np.title.as_str()),
        (FieldId::Artists, np.artists.as_str()),
        (FieldId::Album, np.album.as_str()),
    ] {
        let width = deps.measure.width(text, compose::TEXT_FONT);
        deps.scroll.set_text(id, text, width, viewport);
    }
}

async fn handle_track_change<S: MediaSource>(
    source: &S,
    deps: &MediaDeps,
    np: &NowPlaying,
) -> Option<ExportClock> {
    log::info!("track change: {} — {}", np.artists, np.title);

    let mut accents = AccentPair::default();
    let mut art_hash = None;

    let art = match &np.art_url {
        Some(url) => match source.fetch_art(url).await {
            Ok(img) => Some(img),
            Err(err) => {
                log::warn!("album art fetch failed: {err}");
                None
            }
        },
        None => None,
    };

    if let Some(art) = art {
        accents = palette::contrasting_accents(&art);
        let full = ArtImage::new(art.clone());
        art_hash = Some(full.content_hash);

        let thumb = image::imageops::resize(
            &art,
            ART_SPRITE_PX,
            ART_SPRITE_PX,
            image::imageops::FilterType::Triangle,
        );
        let photo = match &np.artist_photo_url {
            Some(url) => match source.fetch_art(url).await {
                Ok(img) => Some(ArtImage::new(image::imageops::resize(
                    &img,
                    PHOTO_SPRITE_PX,
                    PHOTO_SPRITE_PX,
                    image::imageops::FilterType::Triangle,
                ))),
                Err(err) => {
                    log::debug!("artist photo fetch failed: {err}");
                    None
                }
            },
            None => None,
        };
        deps.sprites.set_art(ArtImage::new(thumb), photo);

        deps.queue.submit(BackdropJob {
            source: full.clone(),
            size: deps.frame,
            kind: BackdropKind::Media,
        });
        if deps.clock_album_backdrop {
            deps.queue.submit(BackdropJob {
                source: full,
                size: deps.frame,
                kind: BackdropKind::Clock,
            });
        }
    } else {
        deps.sprites.clear();
    }

    install_scroll_text(deps, np);

    let track = TrackSnapshot {
        id: np.id.clone(),
        title: np.title.clone(),
        artists: np.artists.clone(),
        album: np.album.clone(),
        position_secs: np.position_secs,
        duration_secs: np.duration_secs,
        is_playing: np.is_playing,
        accents,
        art_url: np.art_url.clone(),
        art_hash,
    };
    let record = ExportRecord::from_track(&track);
    deps.state.set_track(track);
    if let Err(err) = export::write(&deps.export_path, &record) {
        log::warn!("now-playing export failed: {err}");
    }
    Some(ExportClock {
        wrote_at: Instant::now(),
        position: np.position_secs,
    })
}

fn handle_progress(
    deps: &MediaDeps,
    np: &NowPlaying,
    mut current: TrackSnapshot,
    export_clock: &mut Option<ExportClock>,
) {
    current.position_secs = np.position_secs;
    current.is_playing = np.is_playing;
    let record = ExportRecord::from_track(&current);
    deps.state.set_track(current);

    let due = match export_clock {
        Some(clock) => {
            let elapsed = clock.wrote_at.elapsed();
            let expected = clock.position as i64
                + if np.is_playing {
                    elapsed.as_secs() as i64
                } else {
                    0
                };
            elapsed >= Duration::from_secs(EXPORT_MAX_AGE_SECS)
                || (np.position_secs as i64 - expected).abs() >= EXPORT_JUMP_SECS
        }
        None => true,
    };
    if due {
        if let Err(err) = export::write(&deps.export_path, &record) {
            log::warn!("now-playing export failed: {err}");
        }
        *export_clock = Some(ExportClock {
            wrote_at: Instant::now(),
            position: np.position_secs,
        });
    }
}

fn clear_everything(deps: &MediaDeps) {
    deps.state.clear_track(&deps.backdrops);
    deps.sprites.clear();
    deps.scroll.reset_all();
    export::clear(&deps.export_path);
}

/// One pass of the poll loop, separated out so the integration tests
/// can drive it tick by tick with a scripted source.
pub async fn poll_once<S: MediaSource>(
    source: &S,
    deps: &MediaDeps,
    backoff: &mut Backoff,
    export_clock: &mut Option<ExportClock>,
) -> Duration {
    match source.currently_playing().await {
        Ok(Some(np)) => {
            backoff.record_success();
            let current = deps.state.track();
            match current {
                Some(current) if current.id == np.id => {
                    handle_progress(deps, &np, current, export_clock);
                }
                _ => {
                    *export_clock = handle_track_change(source, deps, &np).await;
                }
            }
            Duration::ZERO
        }
        Ok(None) => {
            backoff.record_success();
            if deps.state.track().is_some() {
                log::info!("playback stopped, clearing track state");
                clear_everything(deps);
            }
            Duration::ZERO
        }
        Err(err) => {
            let delay = backoff.record_failure(Instant::now());
            log::warn!(
                "media poll failed ({} consecutive, backing off {:?}): {err}",
                backoff.consecutive(),
                delay
            );
            if err.is_auth() {
                log::warn!("auth rejected, dropping cached token");
                if let Err(err) = std::fs::remove_file(&deps.token_cache) {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        log::warn!("could not remove token cache: {err}");
                    }
                }
                clear_everything(deps);
            } else if backoff.consecutive() >= CLEAR_AFTER_FAILURES
                && deps.state.track().is_some()
            {
                log::warn!("media source unreachable, clearing stale track state");
                clear_everything(deps);
            }
            delay
        }
    }
}

pub fn spawn_poller<S: MediaSource + 'static>(
    source: S,
    cfg: MediaConfig,
    deps: MediaDeps,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let poll = Duration::from_secs(cfg.poll_secs.max(1));
        let mut backoff = Backoff::new();
        let mut export_clock: Option<ExportClock> = None;
        loop {
            let extra = poll_once(&source, &deps, &mut backoff, &mut export_clock).await;
            tokio::select! {
                _ = tokio::time::sleep(poll + extra) => {}
                _ = cancel.cancelled() => {
                    log::debug!("media poller stopping");
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
    fn backoff_is_bounded_and_resets_after_quiet_period() {
        let mut backoff = Backoff::new();
        let t0 = Instant::now();
        assert_eq!(backoff.record_failure(t0), Duration::from_secs(2));
        assert_eq!(backoff.record_failure(t0), Duration::from_secs(4));
        assert_eq!(backoff.record_failure(t0), Duration::from_secs(8));
        assert_eq!(backoff.record_failure(t0), Duration::from_secs(16));
        assert_eq!(backoff.record_failure(t0), Duration::from_secs(30));
        assert_eq!(backoff.record_failure(t0), Duration::from_secs(30));

        // a failure after a long quiet stretch starts the ladder over
        let later = t0 + Duration::from_secs(QUIET_RESET_SECS + 60);
        assert_eq!(backoff.record_failure(later), Duration::from_secs(2));
    }

    #[test]
    fn backoff_success_resets() {
        let mut backoff = Backoff::new();
        backoff.record_failure(Instant::now());
        backoff.record_failure(Instant::now());
        backoff.record_success();
        assert_eq!(backoff.consecutive(), 0);
    }

    #[test]
    fn normalize_spotify_shape() {
        let raw = r#"{
            "item": {
                "id": "abc123",
                "name": "Weightless",
                "artists": [{"name": "Marconi Union"}, {"name": "Guest"}],
                "album": {
                    "name": "Ambient Works",
                    "images": [
                        {"url": "https://img/640", "width": 640},
                        {"url": "https://img/300", "width": 300},
                        {"url": "https://img/64", "width": 64}
                    ]
                },
                "duration_ms": 485000
            },
            "progress_ms": 61000,
            "is_playing": true
        }"#;
        let wire: WirePlaying = serde_json::from_str(raw).unwrap();
        let np = normalize(wire).unwrap();
        assert_eq!(np.id, "abc123");
        assert_eq!(np.artists, "Marconi Union, Guest");
        assert_eq!(np.position_secs, 61);
        assert_eq!(np.duration_secs, 485);
        // smallest image that still covers the sprite
        assert_eq!(np.art_url.as_deref(), Some("https://img/300"));
        assert!(np.artist_photo_url.is_none());
    }

    #[test]
    fn normalize_without_item_is_none() {
        let wire: WirePlaying =
            serde_json::from_str(r#"{"progress_ms": 0, "is_playing": false}"#).unwrap();
        assert!(normalize(wire).is_none());
    }

    #[test]
    fn auth_errors_are_distinguishable() {
        assert!(MediaError::Auth(401).is_auth());
        assert!(!MediaError::Malformed("x".into()).is_auth());
    }
}
