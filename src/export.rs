/*
 *  export.rs
 *
 *  NeonHUD - dashboards for small panels
 *  (c) 2023-26 NeonHUD authors
 *
 *  Cross-process now-playing snapshot: a small JSON file other tools
 *  on the box can read. Writes are atomic (temp file + rename) and
 *  readers treat anything older than the staleness window as absent.
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

use crate::state::TrackSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Records older than this are reported as absent.
pub const STALENESS_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportRecord {
    pub title: String,
    pub artists: String,
    pub album: String,
    pub position_secs: u32,
    pub duration_secs: u32,
    pub is_playing: bool,
    pub updated_at: DateTime<Utc>,
}

impl ExportRecord {
    pub fn from_track(track: &TrackSnapshot) -> Self {
        Self {
            title: track.title.clone(),
            artists: track.artists.clone(),
            album: track.album.clone(),
            position_secs: track.position_secs,
            duration_secs: track.duration_secs,
            is_playing: track.is_playing,
            updated_at: Utc::now(),
        }
    }
}

/// Write-then-rename so a reader never sees a half-written file.
pub fn write(path: &Path, record: &ExportRecord) -> Result<(), ExportError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = Path::new(&tmp);
    fs::write(tmp, serde_json::to_vec_pretty(record)?)?;
    fs::rename(tmp, path)?;
    Ok(())
}

/// Read back the snapshot, applying the staleness window. Any parse or
/// IO problem is treated the same as no record.
pub fn read_if_fresh(path: &Path) -> Option<ExportRecord> {
    let text = fs::read_to_string(path).ok()?;
    let record: ExportRecord = serde_json::from_str(&text).ok()?;
    let age = Utc::now().signed_duration_since(record.updated_at);
    if age.num_seconds() > STALENESS_SECS {
        None
    } else {
        Some(record)
    }
}

/// Remove the snapshot, e.g. when the track state is cleared. A
/// missing file is fine.
pub fn clear(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            log::warn!("could not remove export file {}: {err}", path.display());
        }
    }
}
