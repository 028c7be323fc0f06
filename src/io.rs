use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage, imageops};
use rfd::FileDialog;

/// Longest edge an image is downscaled to before being sent to the render
/// API (keeps request bodies small).
pub const UPLOAD_MAX_EDGE: u32 = 1200;
/// JPEG quality used for upload compression.
const UPLOAD_JPEG_QUALITY: u8 = 80;

/// Image file extensions accepted by the file picker and drag-and-drop
/// (lowercase).  Anything else is rejected before any processing.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "gif"];

/// Check whether a path looks like a supported image file.
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decode an image file from disk to RGBA.
pub fn load_image(path: &Path) -> Result<RgbaImage, String> {
    let img = image::open(path).map_err(|e| format!("Failed to load {}: {}", path.display(), e))?;
    Ok(img.to_rgba8())
}

/// Decode in-memory image bytes (any supported format) to RGBA.
pub fn decode_image_bytes(bytes: &[u8]) -> Result<RgbaImage, String> {
    let img = image::load_from_memory(bytes).map_err(|e| format!("Failed to decode image: {}", e))?;
    Ok(img.to_rgba8())
}

/// PNG-encode a buffer.
pub fn encode_png(buffer: &RgbaImage) -> Result<Vec<u8>, String> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(buffer.clone())
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .map_err(|e| format!("PNG encode error: {}", e))?;
    Ok(bytes)
}

/// Decode PNG bytes to RGBA.
pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage, String> {
    decode_image_bytes(bytes)
}

/// PNG-encode a buffer and wrap it in base64 for the render API payloads.
pub fn encode_png_base64(buffer: &RgbaImage) -> Result<String, String> {
    Ok(BASE64.encode(encode_png(buffer)?))
}

/// Decode a base64 image payload (PNG from the render API) to RGBA.
pub fn decode_image_base64(data: &str) -> Result<RgbaImage, String> {
    let bytes = BASE64
        .decode(data.trim())
        .map_err(|e| format!("Invalid base64 image payload: {}", e))?;
    decode_image_bytes(&bytes)
}

/// Compress an image for upload: aspect-preserving downscale to
/// [`UPLOAD_MAX_EDGE`], composite over white, JPEG-encode, base64-wrap.
pub fn compress_for_upload(image: &RgbaImage) -> Result<String, String> {
    let (w, h) = image.dimensions();
    let longest = w.max(h);
    let scaled = if longest > UPLOAD_MAX_EDGE {
        let scale = UPLOAD_MAX_EDGE as f32 / longest as f32;
        let nw = ((w as f32 * scale).round() as u32).max(1);
        let nh = ((h as f32 * scale).round() as u32).max(1);
        imageops::resize(image, nw, nh, imageops::FilterType::Triangle)
    } else {
        image.clone()
    };

    // JPEG has no alpha; flatten over white like the canvas base.
    let mut flat = RgbaImage::from_pixel(scaled.width(), scaled.height(), Rgba([255, 255, 255, 255]));
    imageops::overlay(&mut flat, &scaled, 0, 0);
    let rgb = DynamicImage::ImageRgba8(flat).to_rgb8();

    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(rgb)
        .write_to(
            &mut Cursor::new(&mut bytes),
            ImageOutputFormat::Jpeg(UPLOAD_JPEG_QUALITY),
        )
        .map_err(|e| format!("JPEG encode error: {}", e))?;
    Ok(BASE64.encode(bytes))
}

/// Default export filename: `YYYYMMDDHHMM_<style>.png`.
pub fn default_output_name(style_name: &str) -> String {
    let safe: String = style_name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}_{}.png", compact_timestamp(), safe)
}

/// Save a buffer as PNG via the native save dialog.  Returns the chosen
/// path, or `None` when the user cancelled.
pub fn save_png_dialog(buffer: &RgbaImage, suggested_name: &str) -> Result<Option<PathBuf>, String> {
    let Some(path) = FileDialog::new()
        .add_filter("PNG image", &["png"])
        .set_file_name(suggested_name)
        .save_file()
    else {
        return Ok(None);
    };
    write_png(buffer, &path)?;
    Ok(Some(path))
}

/// Write a buffer to disk as PNG.
pub fn write_png(buffer: &RgbaImage, path: &Path) -> Result<(), String> {
    buffer
        .save(path)
        .map_err(|e| format!("Failed to save {}: {}", path.display(), e))
}

/// Open the native file picker restricted to image files.
pub fn pick_image_dialog() -> Option<PathBuf> {
    FileDialog::new()
        .add_filter("Images", IMAGE_EXTENSIONS)
        .pick_file()
}

/// `YYYYMMDDHHMM` from the system clock (UTC; no chrono dependency).
pub fn compact_timestamp() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let days = (secs / 86400) as i64;
    let (year, month, day) = civil_from_days(days);
    let hour = (secs % 86400) / 3600;
    let minute = (secs % 3600) / 60;
    format!("{:04}{:02}{:02}{:02}{:02}", year, month, day, hour, minute)
}

/// Gregorian date from days since 1970-01-01 (Howard Hinnant's algorithm).
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_round_trip_preserves_pixels() {
        let mut img = RgbaImage::from_pixel(16, 9, Rgba([255, 255, 255, 255]));
        img.put_pixel(3, 4, Rgba([12, 34, 56, 255]));
        let bytes = encode_png(&img).unwrap();
        let back = decode_png(&bytes).unwrap();
        assert_eq!(img, back);
    }

    #[test]
    fn base64_payload_round_trip() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255]));
        let payload = encode_png_base64(&img).unwrap();
        let back = decode_image_base64(&payload).unwrap();
        assert_eq!(img, back);
        assert!(decode_image_base64("not base64 at all!!!").is_err());
    }

    #[test]
    fn image_path_filter() {
        assert!(is_image_path(Path::new("photo.PNG")));
        assert!(is_image_path(Path::new("dir/sketch.jpeg")));
        assert!(!is_image_path(Path::new("notes.txt")));
        assert!(!is_image_path(Path::new("no_extension")));
    }

    #[test]
    fn upload_compression_caps_longest_edge() {
        let img = RgbaImage::from_pixel(2400, 1200, Rgba([0, 0, 0, 255]));
        let payload = compress_for_upload(&img).unwrap();
        let bytes = BASE64.decode(payload).unwrap();
        let back = decode_image_bytes(&bytes).unwrap();
        assert_eq!(back.dimensions(), (1200, 600));

        // Small images pass through unscaled.
        let small = RgbaImage::from_pixel(100, 50, Rgba([0, 0, 0, 255]));
        let payload = compress_for_upload(&small).unwrap();
        let back = decode_image_bytes(&BASE64.decode(payload).unwrap()).unwrap();
        assert_eq!(back.dimensions(), (100, 50));
    }

    #[test]
    fn civil_date_conversion() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
    }

    #[test]
    fn output_name_shape() {
        let name = default_output_name("Soft Body");
        assert!(name.ends_with("_Soft_Body.png"));
        // 12-digit timestamp prefix.
        assert_eq!(name.split('_').next().unwrap().len(), 12);
    }
}
