//! Colour helpers for instance display preferences.
//!
//! Only the colour values live here; painting them is the renderer's job.

use serde::{Deserialize, Serialize};

/// An sRGB colour with 8-bit channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Colour(pub [u8; 3]);

impl Colour {
    pub const BLACK: Colour = Colour([0, 0, 0]);
    pub const WHITE: Colour = Colour([255, 255, 255]);

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b])
    }

    /// OKLab lightness in `0.0..=1.0`.
    pub fn oklab_lightness(&self) -> f32 {
        let [r, g, b] = self.0.map(|c| srgb_to_linear(f32::from(c) / 255.0));

        let l = 0.412_221_46 * r + 0.536_332_55 * g + 0.051_445_995 * b;
        let m = 0.211_903_5 * r + 0.680_699_5 * g + 0.107_396_96 * b;
        let s = 0.088_302_46 * r + 0.281_718_85 * g + 0.629_978_7 * b;

        let (l, m, s) = (l.cbrt(), m.cbrt(), s.cbrt());
        0.210_454_26 * l + 0.793_617_8 * m - 0.004_072_047 * s
    }

    /// Black or white, whichever reads better on top of this colour.
    pub fn contrast(&self) -> Colour {
        if self.oklab_lightness() > CONTRAST_LIGHTNESS_THRESHOLD {
            Colour::BLACK
        } else {
            Colour::WHITE
        }
    }

    /// Deterministic palette colour for the n-th instance.
    ///
    /// Walks the hue circle by the golden angle and alternates between a
    /// light and a dark band so neighbours stay distinguishable.
    pub fn palette(index: u64) -> Colour {
        let hue = (index as f32 * 137.5) % 360.0;
        let value = if index % 2 == 0 { 0.9 } else { 0.6 };
        let (r, g, b) = hsv_to_rgb(hue, 0.7, value);
        Colour([to_byte(r), to_byte(g), to_byte(b)])
    }
}

impl Default for Colour {
    fn default() -> Self {
        Colour([255, 0, 0])
    }
}

/// Lightness above which black is used as the contrast colour.
const CONTRAST_LIGHTNESS_THRESHOLD: f32 = 0.6;

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn to_byte(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Convert HSV to RGB.
///
/// # Arguments
/// * `h` - Hue in degrees (0-360)
/// * `s` - Saturation (0.0-1.0)
/// * `v` - Value/brightness (0.0-1.0)
///
/// # Returns
/// RGB tuple with values in range 0.0-1.0
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    (r + m, g + m, b + m)
}
