/*
 *  frame.rs
 *
 *  NeonHUD - dashboards for small panels
 *  (c) 2023-26 NeonHUD authors
 *
 *  Runtime-sized RGB frame the compositor draws into. Implements the
 *  embedded-graphics DrawTarget so fonts and primitives land directly
 *  in the pixel buffer; adapters read the buffer back out.
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

use embedded_graphics::mono_font::MonoFont;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use image::RgbImage;
use mini_moka::sync::Cache;

pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<Rgb888>,
}

impl Frame {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Rgb888::BLACK; (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[Rgb888] {
        &self.pixels
    }

    pub fn fill(&mut self, color: Rgb888) {
        self.pixels.fill(color);
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Rgb888 {
        self.pixels[(y * self.width + x) as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, color: Rgb888) {
        if x < self.width && y < self.height {
            self.pixels[(y * self.width + x) as usize] = color;
        }
    }

    /// Opaque paste with clipping on all four sides.
    pub fn paste(&mut self, img: &RgbImage, x: i64, y: i64) {
        for (sx, sy, px) in img.enumerate_pixels() {
            let dx = x + sx as i64;
            let dy = y + sy as i64;
            if dx < 0 || dy < 0 || dx >= self.width as i64 || dy >= self.height as i64 {
                continue;
            }
            self.set(dx as u32, dy as u32, Rgb888::new(px.0[0], px.0[1], px.0[2]));
        }
    }

    /// Blend a translucent rectangle over whatever is already drawn.
    /// `alpha` is 0.0 (invisible) to 1.0 (opaque).
    pub fn blend_rect(&mut self, x: i64, y: i64, w: u32, h: u32, color: Rgb888, alpha: f32) {
        let alpha = alpha.clamp(0.0, 1.0);
        let x0 = x.max(0) as u32;
        let y0 = y.max(0) as u32;
        let x1 = ((x + w as i64).max(0) as u64).min(self.width as u64) as u32;
        let y1 = ((y + h as i64).max(0) as u64).min(self.height as u64) as u32;
        for yy in y0..y1 {
            for xx in x0..x1 {
                let under = self.get(xx, yy);
                let mix = |a: u8, b: u8| -> u8 {
                    (a as f32 * (1.0 - alpha) + b as f32 * alpha).round() as u8
                };
                self.set(
                    xx,
                    yy,
                    Rgb888::new(
                        mix(under.r(), color.r()),
                        mix(under.g(), color.g()),
                        mix(under.b(), color.b()),
                    ),
                );
            }
        }
    }

    /// Simple vertical gradient used when no backdrop is cached yet.
    pub fn fill_gradient(&mut self, top: Rgb888, bottom: Rgb888) {
        let h = self.height.max(1);
        for y in 0..self.height {
            let t = y as f32 / h as f32;
            let lerp = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
            let row = Rgb888::new(
                lerp(top.r(), bottom.r()),
                lerp(top.g(), bottom.g()),
                lerp(top.b(), bottom.b()),
            );
            for x in 0..self.width {
                self.set(x, y, row);
            }
        }
    }
}

impl OriginDimensions for Frame {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for Frame {
    type Color = Rgb888;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x >= 0
                && point.y >= 0
                && (point.x as u32) < self.width
                && (point.y as u32) < self.height
            {
                self.pixels[(point.y as u32 * self.width + point.x as u32) as usize] = color;
            }
        }
        Ok(())
    }
}

/// Pixel-width measurement for the mono fonts, fronted by a bounded
/// cache so the compositor isn't re-measuring the same track text at
/// frame rate.
pub struct TextMeasure {
    cache: Cache<(String, u32), u32>,
}

impl TextMeasure {
    pub fn new() -> Self {
        Self {
            cache: Cache::builder().max_capacity(256).build(),
        }
    }

    pub fn width(&self, text: &str, font: &MonoFont<'_>) -> u32 {
        let advance = font.character_size.width + font.character_spacing;
        let key = (text.to_string(), advance);
        if let Some(w) = self.cache.get(&key) {
            return w;
        }
        let w = text.chars().count() as u32 * advance;
        self.cache.insert(key, w);
        w
    }
}

impl Default for TextMeasure {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::mono_font::ascii::FONT_9X18;
    use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};

    #[test]
    fn draw_target_clips_out_of_bounds() {
        let mut frame = Frame::new(10, 10);
        Rectangle::new(Point::new(5, 5), Size::new(20, 20))
            .into_styled(PrimitiveStyle::with_fill(Rgb888::RED))
            .draw(&mut frame)
            .unwrap();
        assert_eq!(frame.get(6, 6), Rgb888::RED);
        assert_eq!(frame.get(4, 4), Rgb888::BLACK);
    }

    #[test]
    fn paste_clips_negative_origin() {
        let mut frame = Frame::new(8, 8);
        let img = RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 255]));
        frame.paste(&img, -2, -2);
        assert_eq!(frame.get(0, 0), Rgb888::new(0, 0, 255));
        assert_eq!(frame.get(2, 2), Rgb888::BLACK);
    }

    #[test]
    fn blend_rect_mixes() {
        let mut frame = Frame::new(4, 4);
        frame.fill(Rgb888::new(200, 200, 200));
        frame.blend_rect(0, 0, 4, 4, Rgb888::BLACK, 0.5);
        let px = frame.get(1, 1);
        assert_eq!(px, Rgb888::new(100, 100, 100));
    }

    #[test]
    fn measure_is_monospace_and_cached() {
        let measure = TextMeasure::new();
        let w1 = measure.width("abcd", &FONT_9X18);
        let w2 = measure.width("abcd", &FONT_9X18);
        assert_eq!(w1, w2);
        assert_eq!(w1, 4 * (FONT_9X18.character_size.width + FONT_9X18.character_spacing));
    }
}
