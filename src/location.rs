/*
 *  location.rs
 *
 *  NeonHUD - dashboards for small panels
 *  (c) 2023-26 NeonHUD authors
 *
 *  Where-are-we resolution for the weather screen: a prioritized chain
 *  of providers, first answer wins, every failure degrades to None.
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
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
enum LocateError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("no geocoding match")]
    NoMatch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
    pub city: Option<String>,
}

/// The providers are a closed set, ordered by config. Each arm shares
/// the same contract: resolve or quietly step aside.
#[derive(Debug, Clone)]
pub enum LocationProvider {
    /// ipapi.co IP-based lookup, no key required.
    IpApi,
    /// Google-style geolocation POST endpoint, key required.
    Geolocation { api_key: String },
    /// Geocode a configured fallback city name.
    CityGeocode { city: String, api_key: String },
}

#[derive(Deserialize)]
struct IpApiReply {
    latitude: f64,
    longitude: f64,
    city: Option<String>,
}

#[derive(Deserialize)]
struct GeolocateReply {
    location: GeolocatePoint,
}

#[derive(Deserialize)]
struct GeolocatePoint {
    lat: f64,
    lng: f64,
}

#[derive(Deserialize)]
struct GeocodeReply {
    lat: f64,
    lon: f64,
    name: Option<String>,
}

impl LocationProvider {
    pub fn name(&self) -> &'static str {
        match self {
            LocationProvider::IpApi => "ipapi",
            LocationProvider::Geolocation { .. } => "geolocation",
            LocationProvider::CityGeocode { .. } => "city",
        }
    }

    pub async fn resolve(&self, client: &Client) -> Option<Coordinates> {
        let result = match self {
            LocationProvider::IpApi => Self::via_ipapi(client).await,
            LocationProvider::Geolocation { api_key } => Self::via_geolocation(client, api_key).await,
            LocationProvider::CityGeocode { city, api_key } => {
                Self::via_geocode(client, city, api_key).await
            }
        };
        match result {
            Ok(coords) => {
                log::info!(
                    "location via {}: {:.4}, {:.4}",
                    self.name(),
                    coords.lat,
                    coords.lon
                );
                Some(coords)
            }
            Err(err) => {
                log::warn!("location provider {} failed: {err}", self.name());
                None
            }
        }
    }

    async fn via_ipapi(client: &Client) -> Result<Coordinates, LocateError> {
        let reply: IpApiReply = client
            .get("https://ipapi.co/json/")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(Coordinates {
            lat: reply.latitude,
            lon: reply.longitude,
            city: reply.city,
        })
    }

    async fn via_geolocation(client: &Client, api_key: &str) -> Result<Coordinates, LocateError> {
        let url = format!(
            "https://www.googleapis.com/geolocation/v1/geolocate?key={api_key}"
        );
        let reply: GeolocateReply = client
            .post(&url)
            .json(&serde_json::json!({ "considerIp": true }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(Coordinates {
            lat: reply.location.lat,
            lon: reply.location.lng,
            city: None,
        })
    }

    async fn via_geocode(
        client: &Client,
        city: &str,
        api_key: &str,
    ) -> Result<Coordinates, LocateError> {
        let url = format!(
            "https://api.openweathermap.org/geo/1.0/direct?q={city}&limit=1&appid={api_key}"
        );
        let replies: Vec<GeocodeReply> = client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let hit = replies.into_iter().next().ok_or(LocateError::NoMatch)?;
        Ok(Coordinates {
            lat: hit.lat,
            lon: hit.lon,
            city: hit.name,
        })
    }
}

/// Build the chain from the configured provider order, skipping any
/// provider whose prerequisites (API key, city name) are missing.
pub fn chain_from_config(cfg: &WeatherConfig) -> Vec<LocationProvider> {
    let mut chain = Vec::new();
    for name in &cfg.providers {
        match name.as_str() {
            "ipapi" => chain.push(LocationProvider::IpApi),
            "geolocation" => {
                if cfg.geolocation_api_key.is_empty() {
                    log::debug!("skipping geolocation provider, no API key configured");
                } else {
                    chain.push(LocationProvider::Geolocation {
                        api_key: cfg.geolocation_api_key.clone(),
                    });
                }
            }
            "city" => {
                if cfg.fallback_city.is_empty() || cfg.api_key.is_empty() {
                    log::debug!("skipping city provider, no fallback city or key configured");
                } else {
                    chain.push(LocationProvider::CityGeocode {
                        city: cfg.fallback_city.clone(),
                        api_key: cfg.api_key.clone(),
                    });
                }
            }
            other => log::warn!("unknown location provider '{other}' ignored"),
        }
    }
    chain
}

/// Walk the chain in order; the first provider that answers wins.
pub async fn resolve_chain(chain: &[LocationProvider], client: &Client) -> Option<Coordinates> {
    for provider in chain {
        if let Some(coords) = provider.resolve(client).await {
            return Some(coords);
        }
    }
    log::warn!("no location provider produced coordinates");
    None
}
