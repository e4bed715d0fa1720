/*
 *  display/png.rs
 *
 *  NeonHUD - dashboards for small panels
 *  (c) 2023-26 NeonHUD authors
 *
 *  File adapter: writes each presented frame out as a PNG. Doubles as
 *  the headless fallback when no framebuffer is reachable.
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

use super::{DisplayAdapter, DisplayError};
use crate::frame::Frame;
use embedded_graphics::prelude::RgbColor;
use image::RgbImage;
use std::path::PathBuf;

pub struct PngAdapter {
    path: PathBuf,
}

impl PngAdapter {
    pub fn new(path: &str) -> Self {
        Self {
            path: PathBuf::from(path),
        }
    }

    fn to_image(frame: &Frame) -> RgbImage {
        let mut img = RgbImage::new(frame.width(), frame.height());
        for (x, y, px) in img.enumerate_pixels_mut() {
            let c = frame.get(x, y);
            *px = image::Rgb([c.r(), c.g(), c.b()]);
        }
        img
    }
}

impl DisplayAdapter for PngAdapter {
    fn name(&self) -> &'static str {
        "png"
    }

    fn present(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        // write-then-rename so a watcher never opens a half-encoded file
        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        Self::to_image(frame).save_with_format(&tmp, image::ImageFormat::Png)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::pixelcolor::Rgb888;

    #[test]
    fn writes_and_replaces_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let mut adapter = PngAdapter::new(path.to_str().unwrap());

        let mut frame = Frame::new(6, 4);
        frame.fill(Rgb888::new(10, 20, 30));
        adapter.present(&frame).unwrap();

        let back = image::open(&path).unwrap().to_rgb8();
        assert_eq!((back.width(), back.height()), (6, 4));
        assert_eq!(back.get_pixel(0, 0).0, [10, 20, 30]);
        assert!(!dir.path().join("frame.png.tmp").exists());
    }
}
