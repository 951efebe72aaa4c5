use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{io::Reader as ImageReader, DynamicImage, GrayImage, RgbImage};
use log::debug;
use logging_timer::time;

use crate::config::ThresholdOptions;
use crate::evaluate::EvaluateError;
use crate::image_utils::{
    adaptive_threshold_inverted, ratio, size_image_to_width, to_intensity, INK,
};

/// Fraction of the shorter canvas side below which a region is too small to
/// be a bubble.
const MIN_BUBBLE_FRACTION: f64 = 0.015;

/// Fraction of the shorter canvas side above which a region is too large to
/// be a bubble.
const MAX_BUBBLE_FRACTION: f64 = 0.05;

/// Where the pixels of an answer sheet come from.
#[derive(Debug, Clone)]
pub enum SheetInput {
    /// An image file on disk.
    Path(PathBuf),
    /// An encoded image (PNG, JPEG, ...) held in memory.
    Bytes(Vec<u8>),
    /// Already decoded pixels.
    Pixels(DynamicImage),
}

impl From<DynamicImage> for SheetInput {
    fn from(image: DynamicImage) -> Self {
        SheetInput::Pixels(image)
    }
}

impl From<RgbImage> for SheetInput {
    fn from(image: RgbImage) -> Self {
        SheetInput::Pixels(DynamicImage::ImageRgb8(image))
    }
}

impl From<Vec<u8>> for SheetInput {
    fn from(bytes: Vec<u8>) -> Self {
        SheetInput::Bytes(bytes)
    }
}

impl From<PathBuf> for SheetInput {
    fn from(path: PathBuf) -> Self {
        SheetInput::Path(path)
    }
}

/// Size-dependent parameters of a sheet after rescaling.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SheetGeometry {
    /// Exclusive lower bound on bubble width and height.
    pub min_bubble_size: u32,
    /// Exclusive upper bound on bubble width and height.
    pub max_bubble_size: u32,
}

impl SheetGeometry {
    pub fn for_canvas(width: u32, height: u32) -> Self {
        let min_dim = width.min(height) as f64;
        SheetGeometry {
            min_bubble_size: (min_dim * MIN_BUBBLE_FRACTION) as u32,
            max_bubble_size: (min_dim * MAX_BUBBLE_FRACTION) as u32,
        }
    }
}

/// A sheet scaled to the canonical width together with its ink mask.
#[derive(Debug, Clone)]
pub struct NormalizedSheet {
    /// The rescaled color image, kept for annotation.
    pub image: RgbImage,
    /// Ink pixels are 255, background is 0.
    pub mask: GrayImage,
    pub geometry: SheetGeometry,
}

fn decode_bytes(bytes: &[u8]) -> Result<DynamicImage, EvaluateError> {
    if bytes.is_empty() {
        return Err(EvaluateError::InvalidInputKind("empty byte buffer".to_string()));
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| EvaluateError::ImageLoadFailure(e.to_string()))?;

    if reader.format().is_none() {
        return Err(EvaluateError::ImageLoadFailure(format!(
            "{} bytes in an unrecognized image format",
            bytes.len()
        )));
    }

    reader
        .decode()
        .map_err(|e| EvaluateError::ImageLoadFailure(e.to_string()))
}

fn decode_path(path: &Path) -> Result<DynamicImage, EvaluateError> {
    if path.is_dir() {
        return Err(EvaluateError::InvalidInputKind(format!(
            "{} is a directory",
            path.display()
        )));
    }

    let reader = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| EvaluateError::ImageLoadFailure(format!("{}: {}", path.display(), e)))?;

    if reader.format().is_none() {
        return Err(EvaluateError::ImageLoadFailure(format!(
            "{} is not a recognized image file",
            path.display()
        )));
    }

    reader
        .decode()
        .map_err(|e| EvaluateError::ImageLoadFailure(format!("{}: {}", path.display(), e)))
}

/// Decodes the input into pixels without rescaling.
pub fn load_sheet_image(input: SheetInput) -> Result<DynamicImage, EvaluateError> {
    let image = match input {
        SheetInput::Path(path) => decode_path(&path)?,
        SheetInput::Bytes(bytes) => decode_bytes(&bytes)?,
        SheetInput::Pixels(image) => image,
    };

    if image.width() == 0 || image.height() == 0 {
        return Err(EvaluateError::ImageLoadFailure(format!(
            "image has no pixel data ({}x{})",
            image.width(),
            image.height()
        )));
    }

    Ok(image)
}

#[time]
/// Rescales the sheet to `canonical_width` and computes its ink mask.
pub fn normalize_sheet(
    image: &DynamicImage,
    canonical_width: u32,
    threshold: &ThresholdOptions,
) -> Result<NormalizedSheet, EvaluateError> {
    let image = match size_image_to_width(&image.to_rgb8(), canonical_width) {
        Some(image) => image,
        None => {
            return Err(EvaluateError::ImageLoadFailure(format!(
                "{}x{} image cannot be scaled to width {}",
                image.width(),
                image.height(),
                canonical_width
            )))
        }
    };

    let gray = to_intensity(&image);
    let mask = adaptive_threshold_inverted(&gray, threshold.block_size, threshold.bias);
    let geometry = SheetGeometry::for_canvas(image.width(), image.height());
    debug!(
        "normalized sheet to {}x{}, {:.1}% ink, bubble size bounds ({}, {})",
        image.width(),
        image.height(),
        ratio(&mask, &INK) * 100.0,
        geometry.min_bubble_size,
        geometry.max_bubble_size
    );

    Ok(NormalizedSheet {
        image,
        mask,
        geometry,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use image::{ImageOutputFormat, Rgb};

    use super::*;

    fn png_bytes(image: &RgbImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image.clone())
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn geometry_bounds_truncate() {
        let geometry = SheetGeometry::for_canvas(1000, 1414);
        assert_eq!(geometry.min_bubble_size, 15);
        assert_eq!(geometry.max_bubble_size, 50);

        let geometry = SheetGeometry::for_canvas(1000, 700);
        assert_eq!(geometry.min_bubble_size, 10);
        assert_eq!(geometry.max_bubble_size, 35);
    }

    #[test]
    fn decodes_png_bytes() {
        let image = RgbImage::from_pixel(20, 10, Rgb([255, 255, 255]));
        let decoded = load_sheet_image(SheetInput::Bytes(png_bytes(&image))).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (20, 10));
    }

    #[test]
    fn undecodable_bytes_are_a_load_failure() {
        let result = load_sheet_image(SheetInput::Bytes(b"certainly not an image".to_vec()));
        assert!(matches!(result, Err(EvaluateError::ImageLoadFailure(_))));

        let result = load_sheet_image(SheetInput::Bytes(vec![1, 2, 3]));
        assert!(matches!(result, Err(EvaluateError::ImageLoadFailure(_))));
    }

    #[test]
    fn empty_bytes_are_invalid_input() {
        let result = load_sheet_image(SheetInput::Bytes(Vec::new()));
        assert!(matches!(result, Err(EvaluateError::InvalidInputKind(_))));
    }

    #[test]
    fn directory_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_sheet_image(SheetInput::Path(dir.path().to_path_buf()));
        assert!(matches!(result, Err(EvaluateError::InvalidInputKind(_))));
    }

    #[test]
    fn truncated_png_is_a_load_failure() {
        let image = RgbImage::from_pixel(20, 10, Rgb([255, 255, 255]));
        let mut bytes = png_bytes(&image);
        bytes.truncate(40);
        let result = load_sheet_image(SheetInput::Bytes(bytes));
        assert!(matches!(result, Err(EvaluateError::ImageLoadFailure(_))));
    }

    #[test]
    fn empty_pixels_are_a_load_failure() {
        let result = load_sheet_image(SheetInput::Pixels(DynamicImage::new_rgb8(0, 0)));
        assert!(matches!(result, Err(EvaluateError::ImageLoadFailure(_))));
    }

    #[test]
    fn missing_file_is_a_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_sheet_image(SheetInput::Path(dir.path().join("missing.png")));
        assert!(matches!(result, Err(EvaluateError::ImageLoadFailure(_))));
    }

    #[test]
    fn text_file_is_a_load_failure() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        writeln!(file, "question 1: a").unwrap();
        let result = load_sheet_image(SheetInput::Path(file.path().to_path_buf()));
        assert!(matches!(result, Err(EvaluateError::ImageLoadFailure(_))));
    }

    #[test]
    fn normalizes_to_canonical_width() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(500, 700, Rgb([250, 250, 250])));
        let sheet = normalize_sheet(&image, 1000, &ThresholdOptions::default()).unwrap();
        assert_eq!(sheet.image.dimensions(), (1000, 1400));
        assert_eq!(sheet.mask.dimensions(), (1000, 1400));
        assert!(sheet.mask.pixels().all(|p| p.0[0] == 0));
    }
}
