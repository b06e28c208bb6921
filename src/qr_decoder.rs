//! QR symbol extraction from uploaded images.
//!
//! Captures range from crisp originals to tiny screenshots and photocopied
//! flyers, so decoding runs an ordered cascade of preprocessing/backend pairs
//! and returns on the first one that yields text:
//!
//! 1. color image (upscaled first when its shorter side is under `min_dimension`), multi-symbol scan
//! 2. grayscale, single-symbol scan
//! 3. Otsu-binarized grayscale, both scans
//! 4. the binarized (or grayscale) image zoomed by each rescale factor, both scans
//!
//! New strategies are appended to the list; the driver loop never changes.
use crate::config::DecoderConfig;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};
use rqrr::PreparedImage;
use std::borrow::Cow;
use std::path::Path;

/// Fixed cut between dark and light modules for the single-symbol scanner
const BITMAP_THRESHOLD: u8 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preprocess {
    Color,
    Grayscale,
    Binarized,
    /// Binarized image (grayscale if binarization was impossible) zoomed by an integer factor
    Rescaled(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// rqrr's adaptive thresholding, every detected grid tried
    MultiSymbol,
    /// fixed-threshold bitmap, first detected grid only
    SingleSymbol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeStrategy {
    pub preprocess: Preprocess,
    pub backend: Backend,
}

impl DecodeStrategy {
    pub const fn new(preprocess: Preprocess, backend: Backend) -> Self {
        Self {
            preprocess,
            backend,
        }
    }
}

/// Outcome of one strategy, kept only long enough to be logged
struct DecodeAttempt {
    strategy: DecodeStrategy,
    success: bool,
}

/// The image planes strategies draw from, derived once per decode
struct Frames {
    color: RgbImage,
    gray: GrayImage,
    binary: Option<GrayImage>,
}

enum Plane<'a> {
    Color(&'a RgbImage),
    Gray(Cow<'a, GrayImage>),
}

impl Plane<'_> {
    fn dimensions(&self) -> (u32, u32) {
        match self {
            Plane::Color(img) => img.dimensions(),
            Plane::Gray(img) => img.dimensions(),
        }
    }

    fn luma(&self, x: u32, y: u32) -> u8 {
        match self {
            Plane::Color(img) => {
                let [r, g, b] = img.get_pixel(x, y).0;
                // ITU-R BT.601 weights in integer math
                ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
            }
            Plane::Gray(img) => img.get_pixel(x, y).0[0],
        }
    }
}

pub struct ImageQrDecoder {
    strategies: Vec<DecodeStrategy>,
    min_dimension: u32,
    max_scaled_pixels: u64,
}

impl Default for ImageQrDecoder {
    fn default() -> Self {
        Self::new(&DecoderConfig::default())
    }
}

impl ImageQrDecoder {
    pub fn new(config: &DecoderConfig) -> Self {
        let mut strategies = vec![
            DecodeStrategy::new(Preprocess::Color, Backend::MultiSymbol),
            DecodeStrategy::new(Preprocess::Grayscale, Backend::SingleSymbol),
            DecodeStrategy::new(Preprocess::Binarized, Backend::MultiSymbol),
            DecodeStrategy::new(Preprocess::Binarized, Backend::SingleSymbol),
        ];
        for &factor in &config.rescale_factors {
            strategies.push(DecodeStrategy::new(
                Preprocess::Rescaled(factor),
                Backend::MultiSymbol,
            ));
            strategies.push(DecodeStrategy::new(
                Preprocess::Rescaled(factor),
                Backend::SingleSymbol,
            ));
        }

        Self {
            strategies,
            min_dimension: config.min_dimension,
            max_scaled_pixels: config.max_scaled_pixels,
        }
    }

    /// Append a strategy to the end of the cascade
    pub fn with_strategy(mut self, strategy: DecodeStrategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn strategies(&self) -> &[DecodeStrategy] {
        &self.strategies
    }

    /// Decode the image file at `path`. Missing or unreadable files decode to
    /// an empty string, same as an image without a symbol.
    pub fn decode_path(&self, path: &Path) -> String {
        match std::fs::read(path) {
            Ok(bytes) => self.decode_bytes(&bytes),
            Err(e) => {
                log::debug!("Cannot read image {}: {}", path.display(), e);
                String::new()
            }
        }
    }

    /// Decode encoded image bytes (PNG, JPEG, ...). Empty string means no symbol.
    pub fn decode_bytes(&self, bytes: &[u8]) -> String {
        let image = match image::load_from_memory(bytes) {
            Ok(image) => image,
            Err(e) => {
                log::debug!("Not a decodable image: {e}");
                return String::new();
            }
        };
        self.decode_rgb(image.to_rgb8())
    }

    pub fn decode_rgb(&self, color: RgbImage) -> String {
        let (width, height) = color.dimensions();
        if width == 0 || height == 0 {
            return String::new();
        }

        let color = upscale_small(color, self.min_dimension);
        let gray = imageops::grayscale(&color);
        let binary = otsu_threshold(&gray).map(|t| binarize(&gray, t));
        let frames = Frames {
            color,
            gray,
            binary,
        };

        for strategy in &self.strategies {
            let Some(plane) = self.prepare(&frames, strategy.preprocess) else {
                continue;
            };
            let decoded = scan(&plane, strategy.backend);
            let attempt = DecodeAttempt {
                strategy: *strategy,
                success: decoded.is_some(),
            };
            log::debug!(
                "QR decode attempt {:?}/{:?}: {}",
                attempt.strategy.preprocess,
                attempt.strategy.backend,
                if attempt.success { "found" } else { "nothing" }
            );
            if let Some(text) = decoded {
                return text;
            }
        }

        log::debug!("No QR symbol found after {} strategies", self.strategies.len());
        String::new()
    }

    fn prepare<'a>(&self, frames: &'a Frames, preprocess: Preprocess) -> Option<Plane<'a>> {
        match preprocess {
            Preprocess::Color => Some(Plane::Color(&frames.color)),
            Preprocess::Grayscale => Some(Plane::Gray(Cow::Borrowed(&frames.gray))),
            Preprocess::Binarized => frames
                .binary
                .as_ref()
                .map(|binary| Plane::Gray(Cow::Borrowed(binary))),
            Preprocess::Rescaled(factor) => {
                let source = frames.binary.as_ref().unwrap_or(&frames.gray);
                let (width, height) = source.dimensions();
                let scaled = width
                    .checked_mul(factor)
                    .zip(height.checked_mul(factor))
                    .filter(|&(w, h)| {
                        factor >= 2 && u64::from(w) * u64::from(h) <= self.max_scaled_pixels
                    });
                let Some((new_width, new_height)) = scaled else {
                    log::debug!("Skipping {factor}x rescale of {width}x{height} image");
                    return None;
                };
                let resized =
                    imageops::resize(source, new_width, new_height, FilterType::CatmullRom);
                Some(Plane::Gray(Cow::Owned(resized)))
            }
        }
    }
}

fn scan(plane: &Plane<'_>, backend: Backend) -> Option<String> {
    let (width, height) = plane.dimensions();
    let (width, height) = (width as usize, height as usize);

    match backend {
        Backend::MultiSymbol => {
            let mut prepared = PreparedImage::prepare_from_greyscale(width, height, |x, y| {
                plane.luma(x as u32, y as u32)
            });
            prepared
                .detect_grids()
                .iter()
                .filter_map(|grid| grid.decode().ok())
                .map(|(_, content)| content.trim().to_string())
                .find(|content| !content.is_empty())
        }
        Backend::SingleSymbol => {
            let mut prepared = PreparedImage::prepare_from_bitmap(width, height, |x, y| {
                plane.luma(x as u32, y as u32) < BITMAP_THRESHOLD
            });
            prepared
                .detect_grids()
                .first()
                .and_then(|grid| grid.decode().ok())
                .map(|(_, content)| content.trim().to_string())
                .filter(|content| !content.is_empty())
        }
    }
}

/// Uniformly upscale when the shorter side is below `min_dimension`, by
/// `max(min_dimension / longer_side, 1.0)`.
fn upscale_small(color: RgbImage, min_dimension: u32) -> RgbImage {
    let (width, height) = color.dimensions();
    if width.min(height) >= min_dimension {
        return color;
    }
    let scale = (min_dimension as f64 / width.max(height) as f64).max(1.0);
    if scale <= 1.0 {
        return color;
    }
    let new_width = (width as f64 * scale) as u32;
    let new_height = (height as f64 * scale) as u32;
    log::debug!("Upscaling {width}x{height} capture to {new_width}x{new_height}");
    imageops::resize(&color, new_width, new_height, FilterType::CatmullRom)
}

/// Global threshold minimizing intra-class variance. `None` when the
/// histogram has a single populated class and no split exists.
fn otsu_threshold(gray: &GrayImage) -> Option<u8> {
    let mut hist = [0u64; 256];
    for pixel in gray.pixels() {
        hist[pixel.0[0] as usize] += 1;
    }

    let total = gray.width() as f64 * gray.height() as f64;
    let sum_all: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut best: Option<(u8, f64)> = None;
    let mut weight_bg = 0.0f64;
    let mut sum_bg = 0.0f64;

    for (t, &count) in hist.iter().enumerate() {
        weight_bg += count as f64;
        if weight_bg == 0.0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0.0 {
            break;
        }

        sum_bg += t as f64 * count as f64;
        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (sum_all - sum_bg) / weight_fg;
        let between = weight_bg * weight_fg * (mean_bg - mean_fg) * (mean_bg - mean_fg);
        if best.map_or(true, |(_, variance)| between > variance) {
            best = Some((t as u8, between));
        }
    }

    best.map(|(t, _)| t)
}

/// Pixels above the threshold become white, the rest black
fn binarize(gray: &GrayImage, threshold: u8) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y).0[0] > threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}
