//! Image preparation: caller image → downscaled JPEG bytes for staging.
//!
//! Every card is re-encoded as JPEG before upload, whatever format the caller
//! supplied. Photos dominate the input, JPEG keeps them small, and the VLM
//! providers accept it everywhere. Alpha channels are dropped (JPEG has none).

use crate::error::StagingError;
use crate::pipeline::input::CardImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

/// MIME type of everything produced by [`prepare_jpeg`].
pub const STAGED_CONTENT_TYPE: &str = "image/jpeg";

/// Decode `card`, shrink it so neither side exceeds `max_dimension`, and
/// encode it as JPEG at `quality`.
///
/// Images already within bounds are not resampled.
pub fn prepare_jpeg(card: &CardImage, max_dimension: u32, quality: u8) -> Result<Vec<u8>, StagingError> {
    let img = image::load_from_memory_with_format(&card.bytes, card.format)
        .map_err(|e| StagingError::Encode(format!("{}: {}", card.filename, e)))?;

    let img = if img.width() > max_dimension || img.height() > max_dimension {
        debug!(
            "Downscaling {} from {}x{} to fit {}px",
            card.filename,
            img.width(),
            img.height(),
            max_dimension
        );
        img.resize(max_dimension, max_dimension, FilterType::Lanczos3)
    } else {
        img
    };

    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))
        .map_err(|e| StagingError::Encode(format!("{}: {}", card.filename, e)))?;

    debug!("Encoded {} → {} bytes JPEG", card.filename, buf.len());
    Ok(buf)
}

/// Wrap bytes in a base64 `data:` URL.
pub fn data_url(bytes: &[u8], content_type: &str) -> String {
    format!("data:{};base64,{}", content_type, STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_card(width: u32, height: u32) -> CardImage {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 128])));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        CardImage::from_bytes("card.png", bytes).unwrap()
    }

    #[test]
    fn encodes_png_as_jpeg() {
        let jpeg = prepare_jpeg(&png_card(40, 20), 2048, 90).expect("encode should succeed");
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 20));
    }

    #[test]
    fn downscales_preserving_aspect_ratio() {
        let jpeg = prepare_jpeg(&png_card(400, 200), 100, 80).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 50));
    }

    #[test]
    fn corrupt_bytes_are_a_staging_error() {
        let mut card = png_card(4, 4);
        card.bytes.truncate(12);
        let err = prepare_jpeg(&card, 2048, 90).unwrap_err();
        assert!(matches!(err, StagingError::Encode(ref m) if m.contains("card.png")));
    }

    #[test]
    fn data_url_is_base64() {
        let url = data_url(&[1, 2, 3], "image/jpeg");
        assert_eq!(url, "data:image/jpeg;base64,AQID");
    }
}
