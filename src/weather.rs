/*
 *  weather.rs
 *
 *  NeonHUD - dashboards for small panels
 *  (c) 2023-26 NeonHUD authors
 *
 *  Current-conditions client and poll loop. Fetches go through a
 *  short-TTL cache keyed by rounded coordinates, and a failed refresh
 *  never throws away the last good snapshot.
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

use crate::config::WeatherConfig;
use crate::location::{self, Coordinates};
use crate::state::RenderState;
use chrono::{DateTime, Utc};
use mini_moka::sync::Cache;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const USER_AGENT: &str = concat!("NeonHUD/", env!("CARGO_PKG_VERSION"));

/// Cache entries older than this are refetched.
const CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("weather API key not configured")]
    NoApiKey,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct WeatherSnapshot {
    pub city: String,
    pub country: String,
    pub temp: f32,
    pub feels_like: f32,
    pub description: String,
    pub icon: String,
    pub humidity: u32,
    pub pressure: u32,
    pub wind_speed: f32,
    /// Condition group ("Clear", "Rain", ...), keys the screen
    /// background image.
    pub condition: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct WireReply {
    name: String,
    sys: WireSys,
    main: WireMain,
    weather: Vec<WireCondition>,
    wind: WireWind,
}

#[derive(Deserialize)]
struct WireSys {
    #[serde(default)]
    country: String,
}

#[derive(Deserialize)]
struct WireMain {
    temp: f32,
    feels_like: f32,
    humidity: u32,
    pressure: u32,
}

#[derive(Deserialize)]
struct WireCondition {
    main: String,
    description: String,
    icon: String,
}

#[derive(Deserialize)]
struct WireWind {
    speed: f32,
}

impl WireReply {
    fn into_snapshot(self) -> WeatherSnapshot {
        let condition = self.weather.into_iter().next();
        let (main, description, icon) = condition
            .map(|c| (c.main, c.description, c.icon))
            .unwrap_or_default();
        WeatherSnapshot {
            city: self.name,
            country: self.sys.country,
            temp: self.main.temp,
            feels_like: self.main.feels_like,
            description,
            icon,
            humidity: self.main.humidity,
            pressure: self.main.pressure,
            wind_speed: self.wind.speed,
            condition: main,
            fetched_at: Utc::now(),
        }
    }
}

/// Shared HTTP client with the project UA and explicit timeouts. The
/// location providers reuse it.
pub fn http_client() -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(15))
        .build()
}

/// Round to 2 decimals: everything within ~1 km shares a cache slot.
fn cache_key(lat: f64, lon: f64) -> String {
    format!("{lat:.2}_{lon:.2}")
}

pub struct WeatherClient {
    client: Client,
    api_key: String,
    units: String,
    cache: Cache<String, WeatherSnapshot>,
}

impl WeatherClient {
    pub fn new(client: Client, cfg: &WeatherConfig) -> Self {
        Self {
            client,
            api_key: cfg.api_key.clone(),
            units: cfg.units.clone(),
            cache: Cache::builder()
                .max_capacity(16)
                .time_to_live(CACHE_TTL)
                .build(),
        }
    }

    /// Current conditions for a coordinate, via the TTL cache.
    pub async fn fetch(&self, lat: f64, lon: f64) -> Result<WeatherSnapshot, WeatherError> {
        let key = cache_key(lat, lon);
        if let Some(hit) = self.cache.get(&key) {
            log::debug!("weather cache hit for {key}");
            return Ok(hit);
        }
        if self.api_key.is_empty() {
            return Err(WeatherError::NoApiKey);
        }

        let url = format!(
            "https://api.openweathermap.org/data/2.5/weather?lat={lat}&lon={lon}&units={}&appid={}",
            self.units, self.api_key
        );
        let reply: WireReply = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let snapshot = reply.into_snapshot();
        log::info!(
            "weather for {} ({}): {:.1}° {}",
            snapshot.city,
            key,
            snapshot.temp,
            snapshot.description
        );
        self.cache.insert(key, snapshot.clone());
        Ok(snapshot)
    }

    #[cfg(test)]
    fn prime(&self, lat: f64, lon: f64, snapshot: WeatherSnapshot) {
        self.cache.insert(cache_key(lat, lon), snapshot);
    }
}

/// Weather poll task. Location and conditions refresh on independent
/// intervals; either failing leaves the previous answer standing.
pub fn spawn_poller(
    cfg: WeatherConfig,
    state: Arc<RenderState>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let client = match http_client() {
            Ok(c) => c,
            Err(err) => {
                log::error!("weather poller could not build HTTP client: {err}");
                return;
            }
        };
        let weather = WeatherClient::new(client.clone(), &cfg);
        let chain = location::chain_from_config(&cfg);
        if chain.is_empty() {
            log::warn!("no usable location providers, weather screen will stay empty");
            return;
        }

        let mut coords: Option<Coordinates> = None;
        let mut geo_tick = tokio::time::interval(Duration::from_secs(cfg.geo_refresh_secs.max(60)));
        let mut wx_tick = tokio::time::interval(Duration::from_secs(cfg.refresh_secs.max(60)));

        loop {
            tokio::select! {
                _ = geo_tick.tick() => {
                    let had_fix = coords.is_some();
                    if let Some(found) = location::resolve_chain(&chain, &client).await {
                        // first fix: don't sit out the rest of the
                        // weather interval
                        if !had_fix {
                            match weather.fetch(found.lat, found.lon).await {
                                Ok(snapshot) => state.set_weather(snapshot),
                                Err(err) => log::warn!("initial weather fetch failed: {err}"),
                            }
                        }
                        coords = Some(found);
                    }
                    // keep the old fix when every provider failed
                }
                _ = wx_tick.tick() => {
                    let Some(at) = coords.as_ref() else {
                        log::debug!("weather tick with no coordinates yet");
                        continue;
                    };
                    match weather.fetch(at.lat, at.lon).await {
                        Ok(snapshot) => state.set_weather(snapshot),
                        Err(err) => log::warn!("weather refresh failed, keeping last snapshot: {err}"),
                    }
                }
                _ = cancel.cancelled() => {
                    log::debug!("weather poller stopping");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(city: &str) -> WeatherSnapshot {
        WeatherSnapshot {
            city: city.to_string(),
            country: "IS".to_string(),
            temp: 3.5,
            feels_like: 0.1,
            description: "light snow".to_string(),
            icon: "13d".to_string(),
            humidity: 80,
            pressure: 1003,
            wind_speed: 7.2,
            condition: "Snow".to_string(),
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn cache_key_rounds_to_two_decimals() {
        assert_eq!(cache_key(64.1466, -21.9426), "64.15_-21.94");
        assert_eq!(cache_key(64.1462, -21.9401), cache_key(64.1489, -21.9430));
    }

    #[tokio::test]
    async fn fetch_prefers_cache_over_network() {
        // empty API key: a network attempt would error, so an Ok here
        // proves the cache answered
        let cfg = WeatherConfig::default();
        let client = WeatherClient::new(http_client().unwrap(), &cfg);
        client.prime(64.1466, -21.9426, snapshot("Reykjavik"));
        let got = client.fetch(64.1489, -21.9430).await.unwrap();
        assert_eq!(got.city, "Reykjavik");
    }

    #[tokio::test]
    async fn fetch_without_key_and_cache_errors() {
        let cfg = WeatherConfig::default();
        let client = WeatherClient::new(http_client().unwrap(), &cfg);
        assert!(matches!(
            client.fetch(1.0, 2.0).await,
            Err(WeatherError::NoApiKey)
        ));
    }

    #[test]
    fn wire_reply_parses_openweather_shape() {
        let raw = r#"{
            "name": "Reykjavik",
            "sys": {"country": "IS"},
            "main": {"temp": 3.5, "feels_like": 0.1, "humidity": 80, "pressure": 1003},
            "weather": [{"main": "Snow", "description": "light snow", "icon": "13d"}],
            "wind": {"speed": 7.2}
        }"#;
        let reply: WireReply = serde_json::from_str(raw).unwrap();
        let snap = reply.into_snapshot();
        assert_eq!(snap.city, "Reykjavik");
        assert_eq!(snap.condition, "Snow");
        assert_eq!(snap.humidity, 80);
    }
}
