//! Image decoding.
//!
//! The declared content type and the file extension are never trusted: the
//! format is sniffed from the bytes, and a full decode proves the image is
//! well-formed before its dimensions are reported.

use std::io::Cursor;
use std::sync::Arc;

use image::{ImageDecoder, ImageError, ImageFormat, ImageReader, Limits};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{ImageboxError, Result};

/// Formats the codec accepts.
pub const SUPPORTED_FORMATS: &[ImageFormat] =
    &[ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Gif];

/// Result of a successful decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    /// Width in pixels (always > 0).
    pub width: u32,
    /// Height in pixels (always > 0).
    pub height: u32,
    /// Sniffed format.
    pub format: ImageFormat,
}

impl ImageInfo {
    /// MIME type of the sniffed format.
    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

/// Decoder with a memory ceiling.
#[derive(Debug, Clone, Copy)]
pub struct ImageCodec {
    max_alloc: u64,
}

impl ImageCodec {
    /// Create a codec that refuses decodes needing more than `max_alloc` bytes.
    pub fn new(max_alloc: u64) -> Self {
        Self { max_alloc }
    }

    fn reader<'a>(
        &self,
        name: &str,
        content: &'a [u8],
    ) -> Result<(ImageReader<Cursor<&'a [u8]>>, ImageFormat)> {
        let corrupt = || ImageboxError::UnsupportedOrCorruptImage(name.to_string());

        if content.is_empty() {
            return Err(corrupt());
        }

        let mut reader = ImageReader::new(Cursor::new(content))
            .with_guessed_format()
            .map_err(|_| corrupt())?;

        let format = match reader.format() {
            Some(format) if SUPPORTED_FORMATS.contains(&format) => format,
            _ => return Err(corrupt()),
        };

        let mut limits = Limits::default();
        limits.max_alloc = Some(self.max_alloc);
        reader.limits(limits);

        Ok((reader, format))
    }

    fn map_error(name: &str, e: ImageError) -> ImageboxError {
        match e {
            ImageError::Limits(_) => ImageboxError::ResourceLimitExceeded(name.to_string()),
            _ => ImageboxError::UnsupportedOrCorruptImage(name.to_string()),
        }
    }

    /// Bytes the decoded pixel buffer of `content` will take.
    ///
    /// Only the header is read.
    pub fn decoded_size(&self, name: &str, content: &[u8]) -> Result<u64> {
        let (reader, _) = self.reader(name, content)?;
        let decoder = reader
            .into_decoder()
            .map_err(|e| Self::map_error(name, e))?;

        let size = decoder.total_bytes();
        if size > self.max_alloc {
            return Err(ImageboxError::ResourceLimitExceeded(name.to_string()));
        }
        Ok(size)
    }

    /// Decode `content` and report its dimensions.
    ///
    /// `name` is only used to label errors. This call is CPU bound; async
    /// callers should run it on the blocking pool.
    pub fn decode(&self, name: &str, content: &[u8]) -> Result<ImageInfo> {
        let (reader, format) = self.reader(name, content)?;
        let decoded = reader.decode().map_err(|e| Self::map_error(name, e))?;

        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(ImageboxError::UnsupportedOrCorruptImage(name.to_string()));
        }

        Ok(ImageInfo {
            width: decoded.width(),
            height: decoded.height(),
            format,
        })
    }
}

/// Memory budget shared by every decode in flight.
///
/// Each decode reserves its pixel buffer size before it starts, so the
/// buffers of concurrent decodes together stay under the ceiling.
#[derive(Debug, Clone)]
pub struct DecodeBudget {
    permits: Arc<Semaphore>,
    capacity: u32,
}

/// Bytes per semaphore permit.
const BUDGET_UNIT: u64 = 1024;

impl DecodeBudget {
    /// Create a budget of `max_bytes`, rounded down to whole KiB.
    pub fn new(max_bytes: u64) -> Self {
        let max_units = (Semaphore::MAX_PERMITS as u64).min(u64::from(u32::MAX));
        let capacity = (max_bytes / BUDGET_UNIT).min(max_units) as u32;
        Self {
            permits: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
        }
    }

    /// Reserve `bytes` for decoding `name`, waiting while other decodes hold
    /// the budget. The reservation is released when the permit drops.
    pub async fn reserve(&self, name: &str, bytes: u64) -> Result<OwnedSemaphorePermit> {
        let units = u32::try_from(bytes.div_ceil(BUDGET_UNIT)).unwrap_or(u32::MAX);
        if units > self.capacity {
            return Err(ImageboxError::ResourceLimitExceeded(name.to_string()));
        }

        Arc::clone(&self.permits)
            .acquire_many_owned(units)
            .await
            .map_err(|e| ImageboxError::Internal(format!("decode budget closed: {e}")))
    }

    /// Bytes currently free for new decodes.
    pub fn available(&self) -> u64 {
        self.permits.available_permits() as u64 * BUDGET_UNIT
    }
}

impl Default for ImageCodec {
    fn default() -> Self {
        Self::new(super::DEFAULT_DECODE_MAX_ALLOC)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, RgbImage};

    pub(crate) fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let pixels = RgbImage::from_pixel(width, height, image::Rgb([200, 40, 90]));
        let image = DynamicImage::ImageRgb8(pixels);
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let codec = ImageCodec::default();
        let info = codec.decode("a.png", &encode(640, 480, ImageFormat::Png)).unwrap();

        assert_eq!(info.width, 640);
        assert_eq!(info.height, 480);
        assert_eq!(info.format, ImageFormat::Png);
        assert_eq!(info.mime_type(), "image/png");
    }

    #[test]
    fn test_decode_jpeg() {
        let codec = ImageCodec::default();
        let info = codec.decode("a.jpg", &encode(33, 17, ImageFormat::Jpeg)).unwrap();

        assert_eq!((info.width, info.height), (33, 17));
        assert_eq!(info.format, ImageFormat::Jpeg);
    }

    #[test]
    fn test_decode_gif() {
        let codec = ImageCodec::default();
        let info = codec.decode("a.gif", &encode(1, 1, ImageFormat::Gif)).unwrap();

        assert_eq!((info.width, info.height), (1, 1));
        assert_eq!(info.format, ImageFormat::Gif);
    }

    #[test]
    fn test_format_sniffed_not_taken_from_name() {
        let codec = ImageCodec::default();
        // PNG bytes behind a .jpg name still decode as PNG
        let info = codec.decode("photo.jpg", &encode(8, 8, ImageFormat::Png)).unwrap();
        assert_eq!(info.format, ImageFormat::Png);
    }

    #[test]
    fn test_decode_empty() {
        let codec = ImageCodec::default();
        let result = codec.decode("empty.png", &[]);
        assert!(matches!(result, Err(ImageboxError::UnsupportedOrCorruptImage(n)) if n == "empty.png"));
    }

    #[test]
    fn test_decode_random_bytes() {
        let codec = ImageCodec::default();
        let result = codec.decode("noise.png", b"this is definitely not an image");
        assert!(matches!(result, Err(ImageboxError::UnsupportedOrCorruptImage(_))));
    }

    #[test]
    fn test_decode_truncated_png() {
        let codec = ImageCodec::default();
        let bytes = encode(64, 64, ImageFormat::Png);
        let truncated = &bytes[..bytes.len() / 2];

        let result = codec.decode("cut.png", truncated);
        assert!(matches!(result, Err(ImageboxError::UnsupportedOrCorruptImage(_))));
    }

    #[test]
    fn test_decode_unsupported_format() {
        let codec = ImageCodec::default();
        // A BMP header is recognised by the sniffer but not accepted
        let mut bmp = b"BM".to_vec();
        bmp.extend_from_slice(&[0u8; 64]);

        let result = codec.decode("a.png", &bmp);
        assert!(matches!(result, Err(ImageboxError::UnsupportedOrCorruptImage(_))));
    }

    #[test]
    fn test_decode_exceeds_memory_limit() {
        // 2048x2048 grayscale needs 4MB once decoded but compresses to very little
        let image = DynamicImage::ImageLuma8(GrayImage::new(2048, 2048));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        let bytes = out.into_inner();
        assert!(bytes.len() < 1024 * 1024);

        let codec = ImageCodec::new(1024 * 1024);
        let result = codec.decode("bomb.png", &bytes);
        assert!(matches!(result, Err(ImageboxError::ResourceLimitExceeded(n)) if n == "bomb.png"));

        // The same file is fine under the default ceiling
        assert!(ImageCodec::default().decode("bomb.png", &bytes).is_ok());
    }

    #[test]
    fn test_decoded_size_reads_header() {
        let codec = ImageCodec::default();

        let size = codec
            .decoded_size("a.png", &encode(40, 30, ImageFormat::Png))
            .unwrap();
        assert_eq!(size, 40 * 30 * 3);

        let result = codec.decoded_size("noise.png", b"not an image");
        assert!(matches!(result, Err(ImageboxError::UnsupportedOrCorruptImage(_))));
    }

    #[test]
    fn test_decoded_size_over_ceiling() {
        let codec = ImageCodec::new(1024);
        let result = codec.decoded_size("wide.png", &encode(64, 64, ImageFormat::Png));
        assert!(matches!(result, Err(ImageboxError::ResourceLimitExceeded(n)) if n == "wide.png"));
    }

    #[tokio::test]
    async fn test_budget_rejects_oversized_reservation() {
        let budget = DecodeBudget::new(10 * 1024);

        let result = budget.reserve("huge.png", 11 * 1024).await;
        assert!(matches!(result, Err(ImageboxError::ResourceLimitExceeded(n)) if n == "huge.png"));
        assert_eq!(budget.available(), 10 * 1024);
    }

    #[tokio::test]
    async fn test_budget_holds_concurrent_decodes_under_ceiling() {
        let budget = DecodeBudget::new(10 * 1024);

        let first = budget.reserve("a.png", 6 * 1024).await.unwrap();
        assert_eq!(budget.available(), 4 * 1024);

        // Both fit alone, not together: the second waits for the first
        let waiting = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            budget.reserve("b.png", 6 * 1024),
        )
        .await;
        assert!(waiting.is_err());

        drop(first);
        let second = budget.reserve("b.png", 6 * 1024).await.unwrap();
        assert_eq!(budget.available(), 4 * 1024);

        drop(second);
        assert_eq!(budget.available(), 10 * 1024);
    }
}
