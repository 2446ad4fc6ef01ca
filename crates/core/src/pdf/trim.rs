//! Whitespace trimming for rendered page clips.

use image::GrayImage;

/// Pixels at or above this value never count as content, whatever the
/// percentile threshold says.
const MIN_WHITE_THRESHOLD: u8 = 250;

/// Base padding preserved around detected content, in pixels.
#[cfg(feature = "pdfium")]
const TRIM_PADDING: u32 = 12;

/// Divisor for size-dependent padding: wider images keep wider margins.
const DYNAMIC_TRIM_DIVISOR: u32 = 60;

/// A crop narrower than this fraction of the original width is suspicious
/// (a nearly blank strip); keep the full width instead.
const MIN_CROP_WIDTH_RATIO: f64 = 0.5;

/// Trims near-white margins from a grayscale render.
///
/// The darkness threshold adapts to the page: the 98th percentile of pixel
/// values, floored at [`MIN_WHITE_THRESHOLD`]. Returns the cropped image and
/// the (x, y) offset of the crop inside the original, which detectors need
/// to keep their pixel coordinates aligned with the trimmed raster.
pub fn trim_whitespace(image: &GrayImage, padding: u32) -> (GrayImage, (i32, i32)) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return (image.clone(), (0, 0));
    }

    let threshold = content_threshold(image);

    let mut min_x = u32::MAX;
    let mut max_x = 0u32;
    let mut min_y = u32::MAX;
    let mut max_y = 0u32;
    for (x, y, px) in image.enumerate_pixels() {
        if px.0[0] < threshold {
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
    }
    if min_x == u32::MAX {
        // Entirely blank clip.
        return (image.clone(), (0, 0));
    }

    let dyn_pad = padding.max(width / DYNAMIC_TRIM_DIVISOR);
    let mut left = min_x.saturating_sub(dyn_pad);
    let mut right = (max_x + 1 + dyn_pad).min(width);
    let top = min_y.saturating_sub(dyn_pad);
    let bottom = (max_y + 1 + dyn_pad).min(height);

    if f64::from(right - left) < f64::from(width) * MIN_CROP_WIDTH_RATIO {
        left = 0;
        right = width;
    }

    let cropped =
        image::imageops::crop_imm(image, left, top, right - left, bottom - top).to_image();
    (cropped, (left as i32, top as i32))
}

/// Default-padding convenience for backends that trim their own renders.
#[cfg(feature = "pdfium")]
pub(crate) fn trim_default(image: &GrayImage) -> (GrayImage, (i32, i32)) {
    trim_whitespace(image, TRIM_PADDING)
}

/// 98th percentile of pixel darkness, floored at the white threshold.
fn content_threshold(image: &GrayImage) -> u8 {
    let mut histogram = [0usize; 256];
    for px in image.pixels() {
        histogram[px.0[0] as usize] += 1;
    }
    let total = image.width() as usize * image.height() as usize;
    let target = total * 98 / 100;
    let mut seen = 0usize;
    let mut percentile = 255u8;
    for (value, &count) in histogram.iter().enumerate() {
        seen += count;
        if seen >= target {
            percentile = value as u8;
            break;
        }
    }
    percentile.max(MIN_WHITE_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn blank_image_is_untouched() {
        let img = GrayImage::from_pixel(100, 100, Luma([255]));
        let (out, offset) = trim_whitespace(&img, 4);
        assert_eq!(out.dimensions(), (100, 100));
        assert_eq!(offset, (0, 0));
    }

    #[test]
    fn content_is_cropped_with_padding() {
        let mut img = GrayImage::from_pixel(300, 300, Luma([255]));
        for y in 100..120 {
            for x in 40..280 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        let (out, (ox, oy)) = trim_whitespace(&img, 4);
        // Dynamic padding: max(4, 300/60) = 5.
        assert_eq!((ox, oy), (35, 95));
        assert_eq!(out.dimensions(), (250, 30));
    }

    #[test]
    fn narrow_crops_keep_full_width() {
        let mut img = GrayImage::from_pixel(400, 100, Luma([255]));
        img.put_pixel(200, 50, Luma([0]));
        let (out, (ox, _)) = trim_whitespace(&img, 2);
        assert_eq!(ox, 0);
        assert_eq!(out.width(), 400);
    }
}
