//! Image conversions: screenshot PNG to JPEG, SVG icons to PNG.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use resvg::{tiny_skia, usvg};
use toolharvest_shared::{Result, ToolHarvestError};

/// Re-encode an image (normally a PNG screenshot) as JPEG.
pub fn encode_jpeg(bytes: &[u8], quality: u8) -> Result<Vec<u8>> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| ToolHarvestError::parse(format!("unreadable screenshot: {e}")))?;
    let rgb = img.to_rgb8();

    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|e| ToolHarvestError::parse(format!("jpeg encoding failed: {e}")))?;
    Ok(out.into_inner())
}

/// Whether bytes look like an SVG document.
pub fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(512)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    let head = head.trim_start();
    head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg"))
}

/// Rasterize an SVG at its intrinsic size.
pub fn svg_to_png(bytes: &[u8]) -> Result<Vec<u8>> {
    let tree = usvg::Tree::from_data(bytes, &usvg::Options::default())
        .map_err(|e| ToolHarvestError::parse(format!("invalid svg: {e}")))?;
    let size = tree.size().to_int_size();
    let mut pixmap = tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| ToolHarvestError::parse("svg has zero size"))?;
    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());
    pixmap
        .encode_png()
        .map_err(|e| ToolHarvestError::parse(format!("png encoding failed: {e}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};

    pub(crate) const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G'];

    pub(crate) const SIMPLE_SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="16" height="16"><rect width="16" height="16" fill="red"/></svg>"#;

    pub(crate) fn tiny_png() -> Vec<u8> {
        let img = RgbImage::from_pixel(8, 8, Rgb([10, 200, 30]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn png_becomes_jpeg() {
        let jpeg = encode_jpeg(&tiny_png(), 70).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn garbage_is_not_an_image() {
        assert!(encode_jpeg(b"not an image", 70).is_err());
    }

    #[test]
    fn svg_sniffing() {
        assert!(looks_like_svg(SIMPLE_SVG.as_bytes()));
        assert!(looks_like_svg(b"<?xml version=\"1.0\"?>\n<svg></svg>"));
        assert!(!looks_like_svg(&tiny_png()));
    }

    #[test]
    fn svg_rasterizes_to_png() {
        let png = svg_to_png(SIMPLE_SVG.as_bytes()).unwrap();
        assert_eq!(&png[..4], PNG_MAGIC);
        assert!(svg_to_png(b"<svg").is_err());
    }
}
