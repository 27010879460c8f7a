//! Photo intake: extension allow-list, size limit and decoding.

use image::{ImageFormat, RgbImage};
use std::path::Path;
use thiserror::Error;

/// Extensions accepted for registration and class photos.
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Upload ceiling, 16 MiB.
pub const DEFAULT_MAX_PHOTO_BYTES: usize = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum PhotoError {
    #[error("unsupported file type: {0:?} (expected png, jpg or jpeg)")]
    UnsupportedExtension(String),
    #[error("photo is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("cannot decode {file_name}: {source}")]
    Decode {
        file_name: String,
        #[source]
        source: image::ImageError,
    },
}

/// A decoded photo plus what is needed to archive it.
#[derive(Debug, Clone)]
pub struct Photo {
    file_name: String,
    format: ImageFormat,
    bytes: Option<Vec<u8>>,
    image: RgbImage,
}

impl Photo {
    /// Validate and decode an uploaded file.
    ///
    /// The extension only gates the upload; the bytes are decoded as whatever
    /// format they actually hold.
    pub fn decode(file_name: &str, bytes: Vec<u8>, max_bytes: usize) -> Result<Self, PhotoError> {
        check_extension(file_name)?;
        if bytes.len() > max_bytes {
            return Err(PhotoError::TooLarge { size: bytes.len(), limit: max_bytes });
        }

        let decode_error = |source| PhotoError::Decode { file_name: file_name.to_string(), source };
        let format = image::guess_format(&bytes).map_err(decode_error)?;
        let image = image::load_from_memory_with_format(&bytes, format)
            .map_err(decode_error)?
            .to_rgb8();

        tracing::debug!(file_name, ?format, width = image.width(), height = image.height(), "photo decoded");

        Ok(Self {
            file_name: file_name.to_string(),
            format,
            bytes: Some(bytes),
            image,
        })
    }

    /// Wrap an already decoded image. Archiving re-encodes it as PNG.
    pub fn from_image(file_name: &str, image: RgbImage) -> Self {
        Self {
            file_name: file_name.to_string(),
            format: ImageFormat::Png,
            bytes: None,
            image,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Original upload bytes, when the photo came from [`Photo::decode`].
    pub fn original_bytes(&self) -> Option<&[u8]> {
        self.bytes.as_deref()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// File extension to archive this photo under, from the decoded format.
    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("png")
    }
}

fn check_extension(file_name: &str) -> Result<(), PhotoError> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(PhotoError::UnsupportedExtension(ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([10, 20, 30]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let photo = Photo::decode("ada.PNG", png_bytes(8, 6), DEFAULT_MAX_PHOTO_BYTES).unwrap();
        assert_eq!(photo.image().dimensions(), (8, 6));
        assert_eq!(photo.format(), ImageFormat::Png);
        assert_eq!(photo.extension(), "png");
        assert!(photo.original_bytes().is_some());
    }

    #[test]
    fn test_rejects_unknown_extension() {
        let err = Photo::decode("ada.gif", png_bytes(2, 2), DEFAULT_MAX_PHOTO_BYTES).unwrap_err();
        assert!(matches!(err, PhotoError::UnsupportedExtension(ref e) if e == "gif"));
    }

    #[test]
    fn test_rejects_missing_extension() {
        let err = Photo::decode("ada", png_bytes(2, 2), DEFAULT_MAX_PHOTO_BYTES).unwrap_err();
        assert!(matches!(err, PhotoError::UnsupportedExtension(_)));
    }

    #[test]
    fn test_rejects_oversized() {
        let bytes = png_bytes(4, 4);
        let limit = bytes.len() - 1;
        let err = Photo::decode("ada.png", bytes, limit).unwrap_err();
        assert!(matches!(err, PhotoError::TooLarge { .. }));
    }

    #[test]
    fn test_rejects_garbage_bytes() {
        let err = Photo::decode("ada.jpg", b"not a jpeg".to_vec(), DEFAULT_MAX_PHOTO_BYTES).unwrap_err();
        assert!(matches!(err, PhotoError::Decode { .. }));
    }

    #[test]
    fn test_png_bytes_named_jpg_decode_by_content() {
        let photo = Photo::decode("ada.jpg", png_bytes(5, 4), DEFAULT_MAX_PHOTO_BYTES).unwrap();
        assert_eq!(photo.image().dimensions(), (5, 4));
        assert_eq!(photo.format(), ImageFormat::Png);
        assert_eq!(photo.extension(), "png");
    }

    #[test]
    fn test_jpeg_archives_as_jpg() {
        let image = RgbImage::from_pixel(8, 8, Rgb([200, 100, 50]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Jpeg).unwrap();

        let photo = Photo::decode("class.jpeg", out.into_inner(), DEFAULT_MAX_PHOTO_BYTES).unwrap();
        assert_eq!(photo.format(), ImageFormat::Jpeg);
        assert_eq!(photo.extension(), "jpg");
    }

    #[test]
    fn test_from_image_archives_as_png() {
        let photo = Photo::from_image("class.jpeg", RgbImage::new(3, 3));
        assert_eq!(photo.extension(), "png");
        assert!(photo.original_bytes().is_none());
    }
}
