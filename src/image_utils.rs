use image::{imageops::FilterType, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use imageproc::filter::separable_filter_equal;

use crate::types::Mark;

pub const WHITE: Luma<u8> = Luma([u8::MAX]);
pub const BLACK: Luma<u8> = Luma([u8::MIN]);

/// Value of an ink pixel in a binary mask.
pub const INK: Luma<u8> = WHITE;

pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
pub const PINK: Rgb<u8> = Rgb([255, 0, 255]);
pub const WHITE_RGB: Rgb<u8> = Rgb([255, 255, 255]);

pub const RAINBOW: [Rgb<u8>; 6] = [
    Rgb([255, 0, 0]),
    Rgb([255, 127, 0]),
    Rgb([200, 200, 0]),
    Rgb([0, 200, 0]),
    Rgb([0, 0, 255]),
    Rgb([139, 0, 255]),
];

/// Scales an image to the given width, keeping its aspect ratio. The height
/// is rounded down. Returns `None` if either resulting dimension would be zero.
pub fn size_image_to_width(img: &RgbImage, width: u32) -> Option<RgbImage> {
    if img.width() == 0 || width == 0 {
        return None;
    }

    let height = (img.height() as u64 * width as u64 / img.width() as u64) as u32;
    if height == 0 {
        return None;
    }

    if img.dimensions() == (width, height) {
        return Some(img.clone());
    }

    Some(image::imageops::resize(
        img,
        width,
        height,
        FilterType::Triangle,
    ))
}

/// Builds a normalized Gaussian kernel of `size` taps. The standard deviation
/// is derived from the size so a window of 9 pixels gets sigma 1.7.
pub fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (size as f32 - 1.0) / 2.0;
    let weights = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect::<Vec<f32>>();
    let total: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Converts to single-channel intensity with the BT.601 luma weights
/// (0.299, 0.587, 0.114), rounding to the nearest level.
pub fn to_intensity(img: &RgbImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let [r, g, b] = img.get_pixel(x, y).0;
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        Luma([luma.round().min(255.0) as u8])
    })
}

/// Binarizes an image against a Gaussian-weighted local mean. A pixel becomes
/// ink when it is at least `bias` levels darker than its neighbourhood, so
/// uneven lighting across the page does not shift the cutoff. The mean is
/// computed in floating point and rounded to the nearest level.
///
/// The output marks ink with `INK` and everything else with `BLACK`.
pub fn adaptive_threshold_inverted(gray: &GrayImage, block_size: u32, bias: i32) -> GrayImage {
    let levels: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
            Luma([gray.get_pixel(x, y).0[0] as f32])
        });
    let local_mean = separable_filter_equal(&levels, &gaussian_kernel(block_size));

    let mut out = GrayImage::new(gray.width(), gray.height());
    for (x, y, pixel) in gray.enumerate_pixels() {
        let mean = local_mean.get_pixel(x, y).0[0].round() as i32;
        if (pixel.0[0] as i32) <= mean - bias {
            out.put_pixel(x, y, INK);
        }
    }

    out
}

/// Determines the number of pixels in an image that match the given luma.
pub fn count_pixels(img: &GrayImage, luma: &Luma<u8>) -> u32 {
    img.pixels().filter(|p| *p == luma).count() as u32
}

/// Counts the ink pixels of a mask that fall inside a mark's bounding box.
/// Parts of the box outside the mask are ignored.
pub fn count_ink_in_mark(mask: &GrayImage, mark: &Mark) -> u32 {
    let right = mark.right().min(mask.width());
    let bottom = mark.bottom().min(mask.height());
    let mut count = 0;
    for y in mark.y..bottom {
        for x in mark.x..right {
            if mask.get_pixel(x, y).0[0] != 0 {
                count += 1;
            }
        }
    }
    count
}

/// Determines the ratio of pixels in an image that match the given luma.
pub fn ratio(img: &GrayImage, luma: &Luma<u8>) -> f32 {
    let total = img.width() * img.height();
    if total == 0 {
        return 0.0;
    }
    count_pixels(img, luma) as f32 / total as f32
}
