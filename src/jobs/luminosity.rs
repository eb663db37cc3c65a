//! Pixel statistics and the fixed classification decision order.

use image::RgbImage;
use serde::Deserialize;

use crate::engine::decode::Probe;
use crate::pipeline::DecodeHandle;
use crate::utils::config::{ClassifyConsts, PipelineConsts};
use crate::{Classification, ClassificationResult, Preview};

/// Thresholds for dark and color decisions. Pixel values are on a 0..=255 scale.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct DarkThresholds {
    /// A pixel at or below this luminance is dark.
    pub luminance_threshold: u8,
    /// An image is dark when at least this fraction of its pixels is dark.
    pub dark_pixel_ratio: f64,
    /// A pixel whose channels spread by more than this is colored.
    pub color_tolerance: u8,
    /// An image is a color image when more than this fraction of its pixels is colored.
    pub color_pixel_ratio: f64,
    /// Sample every n-th pixel in both directions.
    pub sample_stride: u32,
}

impl Default for DarkThresholds {
    fn default() -> Self {
        Self {
            luminance_threshold: ClassifyConsts::LUMINANCE_THRESHOLD,
            dark_pixel_ratio: ClassifyConsts::DARK_PIXEL_RATIO,
            color_tolerance: ClassifyConsts::COLOR_TOLERANCE,
            color_pixel_ratio: ClassifyConsts::COLOR_PIXEL_RATIO,
            sample_stride: ClassifyConsts::SAMPLE_STRIDE,
        }
    }
}

/// Rec. 601 luma.
pub fn luminance(r: u8, g: u8, b: u8) -> f64 {
    0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64
}

/// Sample `img` and compute dark/colored fractions, mean luminance and a coarse histogram.
pub fn analyze(img: &RgbImage, t: &DarkThresholds) -> ClassificationResult {
    let stride = t.sample_stride.max(1) as usize;
    let mut result = ClassificationResult::default();
    let (mut sampled, mut dark, mut colored) = (0_u64, 0_u64, 0_u64);
    let mut luminance_sum = 0.0;

    for y in (0..img.height()).step_by(stride) {
        for x in (0..img.width()).step_by(stride) {
            let [r, g, b] = img.get_pixel(x, y).0;
            let lum = luminance(r, g, b);
            sampled += 1;
            luminance_sum += lum;
            if lum <= t.luminance_threshold as f64 {
                dark += 1;
            }
            let spread = r.max(g).max(b) - r.min(g).min(b);
            if spread > t.color_tolerance {
                colored += 1;
            }
            let bin = ((lum as usize) * 8 / 256).min(7);
            result.luminosity_histogram[bin] += 1;
        }
    }

    if sampled > 0 {
        result.dark_pixel_fraction = dark as f64 / sampled as f64;
        result.colored_pixel_fraction = colored as f64 / sampled as f64;
        result.mean_luminosity = luminance_sum / sampled as f64;
    }
    result.is_color = result.colored_pixel_fraction > t.color_pixel_ratio;
    result
}

/// Which labels a decodable, non-dark image may receive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorMode {
    /// `Ok` for every non-dark image.
    DarkOrOk,
    /// `Color` or `Greyscale` for non-dark images.
    DarkColorGreyscale,
}

/// Classification plus the statistics and pixels it was derived from (when decoded).
pub struct Decision {
    pub classification: Classification,
    pub result: Option<ClassificationResult>,
    pub image: Option<RgbImage>,
}

impl Decision {
    fn without_pixels(classification: Classification) -> Self {
        Self {
            classification,
            result: None,
            image: None,
        }
    }
}

/// Fixed decision order: missing, video, undecodable, then luminosity.
pub fn decide(handle: &DecodeHandle, t: &DarkThresholds, mode: ColorMode) -> Decision {
    let encoded = match handle.probe() {
        Probe::Missing => return Decision::without_pixels(Classification::NoLongerAvailable),
        Probe::Video => return Decision::without_pixels(Classification::Video),
        Probe::Corrupt(_) | Probe::Present => {
            return Decision::without_pixels(Classification::Corrupt);
        }
        Probe::Image(encoded) => encoded,
    };
    let img = match encoded.decode_rgb() {
        Ok(img) => img,
        Err(e) => {
            log::debug!("undecodable image: {:#}", e);
            return Decision::without_pixels(Classification::Corrupt);
        }
    };
    let result = analyze(&img, t);
    let classification = if result.dark_pixel_fraction >= t.dark_pixel_ratio {
        Classification::Dark
    } else {
        match mode {
            ColorMode::DarkOrOk => Classification::Ok,
            ColorMode::DarkColorGreyscale if result.is_color => Classification::Color,
            ColorMode::DarkColorGreyscale => Classification::Greyscale,
        }
    };
    Decision {
        classification,
        result: Some(result),
        image: Some(img),
    }
}

/// Downscale `img` to a preview whose longest side is at most `PREVIEW_MAX_SIDE`.
pub fn make_preview(img: &RgbImage, file_name: &str) -> Preview {
    let max_side = PipelineConsts::PREVIEW_MAX_SIDE;
    let (w, h) = img.dimensions();
    let scale = (max_side as f64 / w.max(h).max(1) as f64).min(1.0);
    let pw = ((w as f64 * scale).round() as u32).max(1);
    let ph = ((h as f64 * scale).round() as u32).max(1);
    let thumb = image::imageops::thumbnail(img, pw, ph);
    Preview {
        file_name: file_name.to_string(),
        width: thumb.width(),
        height: thumb.height(),
        rgb: thumb.into_raw(),
    }
}
