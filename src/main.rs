/*
 *  main.rs
 *
 *  NeonHUD - dashboards for small panels
 *  (c) 2023-26 NeonHUD authors
 *
 *  Wires everything together: config, logging, the background tasks,
 *  the render loop and signal handling.
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

use anyhow::{Context, Result};
use env_logger::Env;
use neonhud::backdrop::{BackdropCache, JobQueue};
use neonhud::compose::Compositor;
use neonhud::config;
use neonhud::display::DisplaySink;
use neonhud::frame::TextMeasure;
use neonhud::media::{HttpMediaSource, MediaDeps};
use neonhud::scroll::ScrollGroup;
use neonhud::sprite::{SpriteBoard, SpriteTuning};
use neonhud::state::{RenderState, ScreenMode};
use neonhud::{media, scroll, sprite, weather};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

#[tokio::main]
async fn main() -> Result<()> {
    let (cfg, cli, config_source) = config::load()?;

    env_logger::Builder::from_env(Env::default().default_filter_or(cfg.log_level()))
        .format_timestamp_secs()
        .init();

    if cli.dump_config {
        println!("{}", serde_yaml::to_string(&cfg)?);
        return Ok(());
    }

    log::info!(
        "NeonHUD {} (built {}) starting",
        env!("CARGO_PKG_VERSION"),
        BUILD_DATE
    );
    match &config_source {
        Some(path) => log::info!("configuration loaded from {}", path.display()),
        None => log::warn!("no config file found, using built-in defaults"),
    }

    let display_cfg = cfg.display();
    let frame_size = (display_cfg.width, display_cfg.height);
    let sprite_cfg = cfg.sprites();
    let panels = cfg.panels();

    let state = Arc::new(RenderState::new(
        ScreenMode::parse(&cfg.start_screen()),
        panels.time_display,
        panels.progress_bar,
    ));
    let sprites = Arc::new(SpriteBoard::new(
        frame_size,
        SpriteTuning {
            speed_factor: sprite_cfg.speed_factor,
            step_multiplier: sprite_cfg.step_multiplier,
        },
    ));
    let scroll_group = Arc::new(ScrollGroup::new());
    let backdrops = Arc::new(BackdropCache::new());
    let measure = Arc::new(TextMeasure::new());
    let (queue, queue_rx) = JobQueue::new();

    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    tasks.push(neonhud::backdrop::spawn_worker(
        queue_rx,
        Arc::clone(&backdrops),
        Arc::clone(&state),
        cancel.clone(),
    ));
    tasks.push(sprite::spawn_animator(
        Arc::clone(&sprites),
        Arc::clone(&state),
        cancel.clone(),
    ));
    tasks.push(scroll::spawn_animator(
        Arc::clone(&scroll_group),
        Arc::clone(&state),
        cancel.clone(),
    ));
    tasks.push(weather::spawn_poller(
        cfg.weather(),
        Arc::clone(&state),
        cancel.clone(),
    ));

    let media_cfg = cfg.media();
    if media_cfg.now_playing_url.is_empty() {
        log::info!("no now-playing URL configured, media screen stays idle");
    } else {
        let client = weather::http_client().context("building media HTTP client")?;
        let source = HttpMediaSource::new(client, &media_cfg);
        let deps = MediaDeps {
            state: Arc::clone(&state),
            sprites: Arc::clone(&sprites),
            scroll: Arc::clone(&scroll_group),
            queue: queue.clone(),
            backdrops: Arc::clone(&backdrops),
            measure: Arc::clone(&measure),
            frame: frame_size,
            clock_album_backdrop: cfg.clock().background == "album",
            export_path: PathBuf::from(&media_cfg.export_path),
            token_cache: PathBuf::from(&media_cfg.token_cache),
        };
        tasks.push(media::spawn_poller(source, media_cfg, deps, cancel.clone()));
    }

    let compositor = Compositor::new(
        &cfg,
        Arc::clone(&state),
        Arc::clone(&sprites),
        Arc::clone(&scroll_group),
        Arc::clone(&backdrops),
        Arc::clone(&measure),
    );
    let mut sink = DisplaySink::from_config(&display_cfg);

    let mut redraw = state.subscribe_redraw();
    // the 1 Hz floor keeps the clock face and progress bar moving even
    // when nothing else asks for a frame
    let mut heartbeat = tokio::time::interval(Duration::from_secs(1));
    let mut sigint = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    // SIGUSR1 cycles screens, SIGUSR2 toggles the time overlay
    let mut sigusr1 = signal(SignalKind::user_defined1()).context("installing SIGUSR1 handler")?;
    let mut sigusr2 = signal(SignalKind::user_defined2()).context("installing SIGUSR2 handler")?;

    log::info!(
        "render loop up, {}x{} via {:?}",
        frame_size.0,
        frame_size.1,
        display_cfg.adapters
    );

    loop {
        tokio::select! {
            _ = redraw.changed() => {}
            _ = heartbeat.tick() => {}
            _ = sigusr1.recv() => {
                state.advance_screen_mode();
                continue;
            }
            _ = sigusr2.recv() => {
                state.toggle_time_display();
                continue;
            }
            _ = sigint.recv() => {
                log::info!("SIGINT, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                log::info!("SIGTERM, shutting down");
                break;
            }
        }
        let frame = compositor.render();
        sink.present(&frame);
    }

    cancel.cancel();
    for task in tasks {
        if let Err(err) = task.await {
            log::warn!("task join failed: {err}");
        }
    }
    log::info!("bye");
    Ok(())
}
