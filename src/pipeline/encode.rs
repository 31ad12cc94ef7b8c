//! Byte encoding: raw bytes → base64 data URL, and PNG dimension probing.
//!
//! Data URLs are used in two places: the card image is inlined into the
//! composed document so the engine never touches the network for it, and the
//! captured PNG is returned inline when durable storage is unavailable.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::io::Cursor;
use tracing::debug;

/// Encode `bytes` as a `data:<mime>;base64,…` URL.
pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded {} bytes → {} bytes base64 ({})", bytes.len(), b64.len(), mime);
    format!("data:{mime};base64,{b64}")
}

/// Read the pixel dimensions of a PNG without decoding the image data.
pub fn png_dimensions(png: &[u8]) -> Result<(u32, u32), image::ImageError> {
    image::ImageReader::with_format(Cursor::new(png), image::ImageFormat::Png).into_dimensions()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .expect("encode should succeed");
        buf
    }

    #[test]
    fn data_url_has_mime_and_valid_base64() {
        let url = to_data_url("image/png", b"hello");
        let payload = url.strip_prefix("data:image/png;base64,").expect("prefix");
        assert_eq!(STANDARD.decode(payload).unwrap(), b"hello");
    }

    #[test]
    fn reads_dimensions_of_small_png() {
        assert_eq!(png_dimensions(&png(12, 7)).unwrap(), (12, 7));
    }

    #[test]
    fn rejects_non_png_bytes() {
        assert!(png_dimensions(b"not a png").is_err());
    }

    #[test]
    fn jpeg_bytes_are_not_decoded() {
        // SOI + APP0 marker; only the PNG codec is compiled in.
        let jpeg_header = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];
        assert!(png_dimensions(&jpeg_header).is_err());
    }
}
