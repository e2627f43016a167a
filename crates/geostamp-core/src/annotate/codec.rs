//! Image decoding and JPEG re-encoding for in-place annotation.
//!
//! Both directions are synchronous and meant to run inside
//! `spawn_blocking`. Encoding goes to memory first so a failed encode never
//! truncates the photo on disk.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage, RgbaImage};
use std::io::Cursor;
use std::path::Path;

use crate::error::PipelineError;

/// Result of decoding an image.
pub struct DecodedImage {
    /// The decoded image data
    pub image: DynamicImage,
    /// Detected image format
    pub format: ImageFormat,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

/// Read and decode an image, detecting the format from its content.
pub fn decode_file(path: &Path) -> Result<DecodedImage, PipelineError> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PipelineError::FileNotFound(path.to_path_buf()),
        _ => PipelineError::Decode {
            path: path.to_path_buf(),
            message: format!("Cannot read file: {}", e),
        },
    })?;
    decode_bytes(bytes, path)
}

/// Decode an in-memory image. `path` is used for format fallback and errors.
pub fn decode_bytes(bytes: Vec<u8>, path: &Path) -> Result<DecodedImage, PipelineError> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: format!("Cannot detect image format: {}", e),
        })?;
    let format = match reader.format() {
        Some(f) => f,
        None => ImageFormat::from_path(path).map_err(|_| PipelineError::Decode {
            path: path.to_path_buf(),
            message: format!(
                "Unsupported image format: {}",
                path.extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("unknown")
            ),
        })?,
    };
    let image = reader.decode().map_err(|e| PipelineError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let (width, height) = image.dimensions();
    Ok(DecodedImage {
        image,
        format,
        width,
        height,
    })
}

/// Turn a decoded image into the RGBA working copy that captions are drawn
/// on, optionally scaled down. Consumes the decoded image.
pub fn working_copy(decoded: DecodedImage, scale: f32) -> RgbaImage {
    if scale >= 1.0 {
        return decoded.image.into_rgba8();
    }
    let width = ((decoded.width as f32 * scale).round() as u32).max(1);
    let height = ((decoded.height as f32 * scale).round() as u32).max(1);
    decoded
        .image
        .resize_exact(width, height, FilterType::Triangle)
        .into_rgba8()
}

/// Encode an image as JPEG at the given quality (1-100).
///
/// Consumes the image: the alpha channel is dropped by packing pixels down
/// within the same buffer, so no second full-frame copy is made.
pub fn encode_jpeg(image: RgbaImage, quality: u8, path: &Path) -> Result<Vec<u8>, PipelineError> {
    let rgb = strip_alpha(image).ok_or_else(|| PipelineError::Encode {
        path: path.to_path_buf(),
        message: "Pixel buffer does not match image dimensions".to_string(),
    })?;
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(&rgb)
        .map_err(|e| PipelineError::Encode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    Ok(bytes)
}

fn strip_alpha(image: RgbaImage) -> Option<RgbImage> {
    let (width, height) = image.dimensions();
    let mut buf = image.into_raw();
    let pixels = buf.len() / 4;
    for i in 0..pixels {
        buf.copy_within(i * 4..i * 4 + 3, i * 3);
    }
    buf.truncate(pixels * 3);
    RgbImage::from_raw(width, height, buf)
}

/// Replace the file at `path` with `bytes`.
pub fn write_file(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    std::fs::write(path, bytes).map_err(|e| PipelineError::Encode {
        path: path.to_path_buf(),
        message: format!("Cannot write file: {}", e),
    })
}

/// Convert an ImageFormat to a string representation.
pub fn format_to_string(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "jpeg".to_string(),
        ImageFormat::Png => "png".to_string(),
        ImageFormat::WebP => "webp".to_string(),
        ImageFormat::Gif => "gif".to_string(),
        ImageFormat::Tiff => "tiff".to_string(),
        ImageFormat::Bmp => "bmp".to_string(),
        _ => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn write_png(path: &Path, width: u32, height: u32) {
        image::RgbImage::from_pixel(width, height, Rgb([200, 120, 40]))
            .save_with_format(path, ImageFormat::Png)
            .unwrap();
    }

    #[test]
    fn test_format_detected_by_content() {
        let dir = tempfile::tempdir().unwrap();
        let misnamed = dir.path().join("really_a_png.jpg");
        write_png(&misnamed, 8, 6);

        let decoded = decode_file(&misnamed).unwrap();
        assert_eq!(decoded.format, ImageFormat::Png);
        assert_eq!((decoded.width, decoded.height), (8, 6));
    }

    #[test]
    fn test_missing_file() {
        let err = decode_file(Path::new("/nonexistent/photo.jpg")).err().unwrap();
        assert!(matches!(err, PipelineError::FileNotFound(_)));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not an image").unwrap();

        let err = decode_file(&path).err().unwrap();
        assert!(matches!(err, PipelineError::Decode { .. }));
    }

    #[test]
    fn test_working_copy_scales_down() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.png");
        write_png(&path, 200, 100);

        let working = working_copy(decode_file(&path).unwrap(), 0.5);
        assert_eq!(working.dimensions(), (100, 50));
    }

    #[test]
    fn test_encode_jpeg_roundtrip_dimensions() {
        let image = RgbaImage::from_pixel(32, 24, image::Rgba([10, 20, 30, 255]));
        let bytes = encode_jpeg(image, 90, Path::new("out.jpg")).unwrap();

        let decoded = decode_bytes(bytes, Path::new("out.jpg")).unwrap();
        assert_eq!(decoded.format, ImageFormat::Jpeg);
        assert_eq!((decoded.width, decoded.height), (32, 24));
    }

    #[test]
    fn test_strip_alpha_keeps_colors_in_place() {
        let mut image = RgbaImage::new(3, 2);
        for (i, pixel) in image.pixels_mut().enumerate() {
            let v = i as u8 * 40;
            *pixel = image::Rgba([v, v + 1, v + 2, if i % 2 == 0 { 255 } else { 0 }]);
        }

        let rgb = strip_alpha(image).unwrap();
        assert_eq!(rgb.dimensions(), (3, 2));
        assert_eq!(rgb.as_raw().len(), 3 * 2 * 3);
        for (i, pixel) in rgb.pixels().enumerate() {
            let v = i as u8 * 40;
            assert_eq!(pixel.0, [v, v + 1, v + 2]);
        }
    }

    #[test]
    fn test_encode_jpeg_ignores_alpha() {
        let image = RgbaImage::from_pixel(16, 16, image::Rgba([200, 40, 10, 0]));
        let bytes = encode_jpeg(image, 95, Path::new("out.jpg")).unwrap();

        let decoded = decode_bytes(bytes, Path::new("out.jpg")).unwrap().image.into_rgb8();
        let [r, g, b] = decoded.get_pixel(8, 8).0;
        assert!(r > 180 && g < 70 && b < 40, "got {r},{g},{b}");
    }

    #[test]
    fn test_format_to_string() {
        assert_eq!(format_to_string(ImageFormat::Jpeg), "jpeg");
        assert_eq!(format_to_string(ImageFormat::Png), "png");
    }
}
