/*
 *  display/mod.rs
 *
 *  NeonHUD - dashboards for small panels
 *  (c) 2023-26 NeonHUD authors
 *
 *  Output side: the adapter trait, the concrete adapters, and the
 *  rate-limited sink with failover.
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

pub mod fbdev;
pub mod mock;
pub mod png;
mod sink;

pub use sink::{DisplaySink, PresentOutcome};

use crate::frame::Frame;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image encoding error: {0}")]
    Encode(#[from] image::ImageError),
    #[error("device fault: {0}")]
    Device(String),
}

/// One way to get a finished frame in front of eyeballs. Adapters own
/// whatever handle they need and must tolerate repeated failures; the
/// sink decides what happens next.
pub trait DisplayAdapter: Send {
    fn name(&self) -> &'static str;
    fn present(&mut self, frame: &Frame) -> Result<(), DisplayError>;
}
