/*
 *  display/fbdev.rs
 *
 *  NeonHUD - dashboards for small panels
 *  (c) 2023-26 NeonHUD authors
 *
 *  Linux framebuffer adapter. Packs the frame to gamma-corrected
 *  RGB565 little-endian and writes it straight to the device node.
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
use std::io::Write;
use std::path::PathBuf;

const GAMMA: f32 = 1.5;

fn gamma_table(levels: u8) -> [u8; 256] {
    let mut table = [0u8; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        let lin = (i as f32 / 255.0).powf(1.0 / GAMMA);
        *slot = (lin * levels as f32).round().min(levels as f32) as u8;
    }
    table
}

pub struct FramebufferAdapter {
    path: PathBuf,
    rotate_deg: u32,
    gamma_r: [u8; 256],
    gamma_g: [u8; 256],
    gamma_b: [u8; 256],
}

impl FramebufferAdapter {
    pub fn new(path: &str, rotate_deg: u32) -> Self {
        Self {
            path: PathBuf::from(path),
            rotate_deg,
            gamma_r: gamma_table(31),
            gamma_g: gamma_table(63),
            gamma_b: gamma_table(31),
        }
    }

    fn pack(&self, frame: &Frame) -> Vec<u8> {
        let w = frame.width();
        let h = frame.height();
        let (out_w, out_h) = match self.rotate_deg {
            90 | 270 => (h, w),
            _ => (w, h),
        };
        let mut out = Vec::with_capacity((out_w * out_h * 2) as usize);
        for oy in 0..out_h {
            for ox in 0..out_w {
                let (sx, sy) = match self.rotate_deg {
                    90 => (oy, out_w - 1 - ox),
                    180 => (w - 1 - ox, h - 1 - oy),
                    270 => (out_h - 1 - oy, ox),
                    _ => (ox, oy),
                };
                let px = frame.get(sx, sy);
                let r = self.gamma_r[px.r() as usize] as u16;
                let g = self.gamma_g[px.g() as usize] as u16;
                let b = self.gamma_b[px.b() as usize] as u16;
                let packed = (r << 11) | (g << 5) | b;
                out.extend_from_slice(&packed.to_le_bytes());
            }
        }
        out
    }
}

impl DisplayAdapter for FramebufferAdapter {
    fn name(&self) -> &'static str {
        "framebuffer"
    }

    fn present(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        let packed = self.pack(frame);
        let mut device = std::fs::OpenOptions::new().write(true).open(&self.path)?;
        device.write_all(&packed)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::pixelcolor::Rgb888;

    #[test]
    fn gamma_tables_are_monotonic_and_bounded() {
        let r = gamma_table(31);
        let g = gamma_table(63);
        assert_eq!(r[0], 0);
        assert_eq!(r[255], 31);
        assert_eq!(g[255], 63);
        for i in 1..256 {
            assert!(r[i] >= r[i - 1]);
            assert!(g[i] >= g[i - 1]);
        }
    }

    #[test]
    fn pack_produces_two_bytes_per_pixel() {
        let adapter = FramebufferAdapter::new("/dev/null", 0);
        let mut frame = Frame::new(4, 3);
        frame.fill(Rgb888::WHITE);
        let packed = adapter.pack(&frame);
        assert_eq!(packed.len(), 4 * 3 * 2);
        // white is all ones in 565
        assert_eq!(&packed[0..2], &0xFFFFu16.to_le_bytes());
    }

    #[test]
    fn rotation_swaps_dimensions() {
        let adapter = FramebufferAdapter::new("/dev/null", 90);
        let mut frame = Frame::new(4, 2);
        frame.set(0, 0, Rgb888::WHITE);
        let packed = adapter.pack(&frame);
        assert_eq!(packed.len(), 4 * 2 * 2);
        // source (0,0) lands in the rotated top-right corner: output is
        // 2 wide, 4 tall; (0,0) maps from (oy=0, out_w-1-ox=0) => ox=1
        assert_eq!(&packed[2..4], &0xFFFFu16.to_le_bytes());
    }
}
