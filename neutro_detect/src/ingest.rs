use image::{DynamicImage, GenericImageView};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("could not sniff image format: {0}")]
    UnknownFormat(std::io::Error),
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Decode uploaded bytes of unknown but purportedly image-like format.
///
/// The format is sniffed from the content, not the file name, so a text file
/// renamed `.png` still fails with a [`DecodeError`] the caller can report.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, DecodeError> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(DecodeError::UnknownFormat)?;

    let decoded = reader.decode()?;
    tracing::debug!("Decoded upload: {}x{}", decoded.width(), decoded.height());

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(width, height, Rgb([120, 30, 200]));
        let mut bytes: Vec<u8> = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn decodes_a_png_upload() {
        let decoded = decode_image(&png_bytes(64, 48)).unwrap();
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 48);
    }

    #[test]
    fn rejects_text_masquerading_as_an_image() {
        let err = decode_image(b"definitely not pixels").unwrap_err();
        assert!(matches!(err, DecodeError::Decode(_)));
    }

    #[test]
    fn rejects_empty_uploads() {
        assert!(decode_image(&[]).is_err());
    }
}
