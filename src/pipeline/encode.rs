//! Image encoding: flatten a decoded frame and write it as PNG.
//!
//! PNG is the single canonical page format. It is lossless, so rendered text
//! stays crisp for the vision model, and every VLM API accepts it. Alpha and
//! palette modes are flattened first: transparency carries no information on
//! a scanned page and some providers reject RGBA uploads.

use crate::error::{PageMergeError, Result};
use crate::pipeline::pages::Page;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Drop the alpha channel, keeping bit depth where PNG can represent it.
pub fn flatten(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLumaA8(_) => DynamicImage::ImageLuma8(img.to_luma8()),
        DynamicImage::ImageLumaA16(_) => DynamicImage::ImageLuma16(img.to_luma16()),
        DynamicImage::ImageRgba8(_) => DynamicImage::ImageRgb8(img.to_rgb8()),
        DynamicImage::ImageRgba16(_) => DynamicImage::ImageRgb16(img.to_rgb16()),
        // PNG has no float samples
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
            DynamicImage::ImageRgb8(img.to_rgb8())
        }
        other => other,
    }
}

/// Encode a page image as PNG bytes. `page` is the 1-based page number used
/// in error messages.
pub fn encode_png(img: &DynamicImage, page: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PageMergeError::EncodeFailed {
            page,
            detail: e.to_string(),
        })?;
    debug!(
        page,
        width = img.width(),
        height = img.height(),
        png_size = buf.len(),
        "Encoded page to PNG"
    );
    Ok(buf)
}

/// Wrap a page as a base64 PNG attachment for a multimodal request.
///
/// `detail: "high"` lets GPT-4-class models tile the full image; the low
/// detail mode downsamples to a single 512 px tile and loses fine print.
pub fn to_image_data(page: &Page) -> ImageData {
    let b64 = STANDARD.encode(&page.png);
    debug!(page = page.index + 1, "Encoded page → {} bytes base64", b64.len());
    ImageData::new(b64, "image/png").with_detail("high")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{LumaA, Rgba, RgbaImage};

    #[test]
    fn flatten_drops_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 0])));
        let flat = flatten(img);
        assert!(!flat.color().has_alpha());
        assert_eq!(flat.to_rgb8().get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn flatten_gray_alpha_stays_gray() {
        let img = DynamicImage::ImageLumaA8(image::ImageBuffer::from_pixel(2, 2, LumaA([99, 7])));
        let flat = flatten(img);
        assert_eq!(flat.color(), image::ColorType::L8);
    }

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let png = encode_png(&flatten(img), 1).expect("encode should succeed");
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn image_data_is_base64_png() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::new(3, 3));
        let page = Page {
            index: 0,
            png: encode_png(&img, 1).unwrap(),
        };
        let data = to_image_data(&page);
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(decoded, page.png);
    }
}
