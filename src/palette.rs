/*
 *  palette.rs
 *
 *  NeonHUD - dashboards for small panels
 *  (c) 2023-26 NeonHUD authors
 *
 *  Color derivation for text accents and clock faces: average image
 *  color, HSV round trips, complementary accent pairs.
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

use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::RgbColor;
use image::RgbImage;

/// Accent pair derived from album art: `data` for values (title, temps,
/// times), `label` for the quieter field captions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccentPair {
    pub data: Rgb888,
    pub label: Rgb888,
}

impl Default for AccentPair {
    /// Used when there is no art to derive from.
    fn default() -> Self {
        Self {
            data: Rgb888::new(0, 255, 0),
            label: Rgb888::new(0, 255, 255),
        }
    }
}

/// All components in `[0, 1]`.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        (((g - b) / delta).rem_euclid(6.0)) / 6.0
    } else if max == g {
        ((b - r) / delta + 2.0) / 6.0
    } else {
        ((r - g) / delta + 4.0) / 6.0
    };

    let s = if max == 0.0 { 0.0 } else { delta / max };
    (h, s, max)
}

pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb888 {
    let h = h.rem_euclid(1.0) * 6.0;
    let i = h.floor() as i32 % 6;
    let f = h - h.floor();
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    let (r, g, b) = match i {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    Rgb888::new(
        (r * 255.0).round() as u8,
        (g * 255.0).round() as u8,
        (b * 255.0).round() as u8,
    )
}

/// Mean color over every pixel. Black for an empty image.
pub fn average_color(img: &RgbImage) -> Rgb888 {
    let count = (img.width() as u64) * (img.height() as u64);
    if count == 0 {
        return Rgb888::BLACK;
    }
    let (mut r, mut g, mut b) = (0u64, 0u64, 0u64);
    for px in img.pixels() {
        r += px.0[0] as u64;
        g += px.0[1] as u64;
        b += px.0[2] as u64;
    }
    Rgb888::new((r / count) as u8, (g / count) as u8, (b / count) as u8)
}

/// Derive a readable accent pair from the art's average color: hue is
/// flipped to the complement, saturation raised, and brightness pinned
/// into a legible band keyed off how bright the art itself is.
pub fn contrasting_accents(img: &RgbImage) -> AccentPair {
    let avg = average_color(img);
    let (h, s, v) = rgb_to_hsv(avg.r(), avg.g(), avg.b());

    let data_hue = (h + 0.5).rem_euclid(1.0);
    let data_sat = (s + 0.3).min(0.9);
    let label_sat = (data_sat - 0.2).max(0.6);

    let value = if v < 0.35 {
        0.9
    } else if v > 0.65 {
        0.8
    } else {
        0.85
    };

    AccentPair {
        data: hsv_to_rgb(data_hue, data_sat, value),
        label: hsv_to_rgb((data_hue + 0.12).rem_euclid(1.0), label_sat, value),
    }
}

/// Five-color clock face palette spun off a backdrop's average color:
/// [face ring, hour hand, minute hand, second hand, tick marks].
pub fn clock_palette(base: Rgb888) -> [Rgb888; 5] {
    let (h, s, v) = rgb_to_hsv(base.r(), base.g(), base.b());
    let sat = (s + 0.25).clamp(0.55, 0.9);
    let value = if v > 0.6 { 0.82 } else { 0.92 };

    let mut colors = [Rgb888::BLACK; 5];
    for (i, slot) in colors.iter_mut().enumerate() {
        let hue = (h + 0.5 + i as f32 * 0.18).rem_euclid(1.0);
        let c = hsv_to_rgb(hue, sat, value);
        // nudge each channel toward mid-gray so no hand vanishes into
        // a saturated backdrop
        *slot = Rgb888::new(
            nudge_toward_mid(c.r()),
            nudge_toward_mid(c.g()),
            nudge_toward_mid(c.b()),
        );
    }
    colors
}

fn nudge_toward_mid(c: u8) -> u8 {
    let c = c as f32;
    (c + (128.0 - c) * 0.15).round() as u8
}

/// Scale each channel. Factors above 1.0 saturate at 255.
pub fn scale(color: Rgb888, factor: f32) -> Rgb888 {
    let f = |c: u8| ((c as f32 * factor).round().clamp(0.0, 255.0)) as u8;
    Rgb888::new(f(color.r()), f(color.g()), f(color.b()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(r: u8, g: u8, b: u8) -> RgbImage {
        RgbImage::from_pixel(4, 4, image::Rgb([r, g, b]))
    }

    #[test]
    fn hsv_round_trip_primaries() {
        for &(r, g, b) in &[(255u8, 0u8, 0u8), (0, 255, 0), (0, 0, 255), (128, 128, 128)] {
            let (h, s, v) = rgb_to_hsv(r, g, b);
            let back = hsv_to_rgb(h, s, v);
            assert!((back.r() as i32 - r as i32).abs() <= 1);
            assert!((back.g() as i32 - g as i32).abs() <= 1);
            assert!((back.b() as i32 - b as i32).abs() <= 1);
        }
    }

    #[test]
    fn average_of_solid_image_is_that_color() {
        let img = solid(10, 200, 30);
        assert_eq!(average_color(&img), Rgb888::new(10, 200, 30));
    }

    #[test]
    fn accents_flip_hue() {
        let img = solid(255, 0, 0); // hue 0.0
        let pair = contrasting_accents(&img);
        let (h, _, _) = rgb_to_hsv(pair.data.r(), pair.data.g(), pair.data.b());
        assert!((h - 0.5).abs() < 0.05, "expected cyan-ish complement, hue {h}");
    }

    #[test]
    fn accents_stay_bright_on_dark_art() {
        let img = solid(5, 5, 10);
        let pair = contrasting_accents(&img);
        let (_, _, v) = rgb_to_hsv(pair.data.r(), pair.data.g(), pair.data.b());
        assert!(v > 0.7);
    }

    #[test]
    fn clock_palette_has_distinct_hues() {
        let palette = clock_palette(Rgb888::new(40, 90, 160));
        for i in 0..palette.len() {
            for j in (i + 1)..palette.len() {
                assert_ne!(palette[i], palette[j]);
            }
        }
    }

    #[test]
    fn scale_clamps() {
        assert_eq!(scale(Rgb888::new(200, 200, 200), 2.0), Rgb888::new(255, 255, 255));
        assert_eq!(scale(Rgb888::new(100, 50, 0), 0.5), Rgb888::new(50, 25, 0));
    }
}
