use image::DynamicImage;
use std::io::Cursor;
use tracing::{debug, info};

/// Decoded image plus the orientation flag it still needs applied.
#[derive(Debug, Clone)]
pub struct WorkingImage {
    pub image: DynamicImage,
    pub orientation: Option<u32>,
}

impl WorkingImage {
    /// Decodes `bytes` without applying any embedded orientation.
    pub fn decode(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let image = image::load_from_memory(bytes)?;
        Ok(Self {
            image,
            orientation: read_exif_orientation(bytes),
        })
    }

    /// Rotates the pixels upright and clears the orientation flag.
    /// Returns whether the pixel data changed.
    pub fn normalize(&mut self) -> bool {
        let Some(orientation) = self.orientation.take() else {
            return false;
        };
        let rotated = match orientation {
            3 => self.image.rotate180(),
            6 => self.image.rotate90(),
            8 => self.image.rotate270(),
            _ => {
                debug!("orientation {} needs no rotation", orientation);
                return false;
            }
        };
        info!("rotated image for EXIF orientation {}", orientation);
        self.image = rotated;
        true
    }
}

/// Reads the EXIF orientation tag. Missing or unreadable metadata yields `None`.
pub fn read_exif_orientation(bytes: &[u8]) -> Option<u32> {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(reader) => reader,
        Err(err) => {
            debug!("no usable EXIF data: {}", err);
            return None;
        }
    };
    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
}

#[cfg(test)]
pub(crate) fn exif_app1_segment(orientation: u16) -> Vec<u8> {
    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"MM\x00\x2A");
    tiff.extend_from_slice(&8u32.to_be_bytes());
    tiff.extend_from_slice(&1u16.to_be_bytes());
    tiff.extend_from_slice(&0x0112u16.to_be_bytes());
    tiff.extend_from_slice(&3u16.to_be_bytes());
    tiff.extend_from_slice(&1u32.to_be_bytes());
    tiff.extend_from_slice(&orientation.to_be_bytes());
    tiff.extend_from_slice(&[0, 0]);
    tiff.extend_from_slice(&0u32.to_be_bytes());

    let mut segment = vec![0xFF, 0xE1];
    let len = (2 + 6 + tiff.len()) as u16;
    segment.extend_from_slice(&len.to_be_bytes());
    segment.extend_from_slice(b"Exif\x00\x00");
    segment.extend_from_slice(&tiff);
    segment
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};

    fn jpeg_with_orientation(width: u32, height: u32, orientation: u16) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
        let mut encoded = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut encoded), image::ImageFormat::Jpeg)
            .expect("encode jpeg");
        let mut bytes = encoded[..2].to_vec();
        bytes.extend_from_slice(&exif_app1_segment(orientation));
        bytes.extend_from_slice(&encoded[2..]);
        bytes
    }

    fn marked_image() -> DynamicImage {
        let mut image = RgbImage::from_pixel(4, 2, Rgb([0, 0, 0]));
        image.put_pixel(0, 0, Rgb([255, 255, 255]));
        DynamicImage::ImageRgb8(image)
    }

    #[test]
    fn reads_orientation_from_jpeg() {
        let bytes = jpeg_with_orientation(8, 4, 6);
        assert_eq!(read_exif_orientation(&bytes), Some(6));
    }

    #[test]
    fn missing_metadata_is_not_an_error() {
        let mut png = Vec::new();
        marked_image()
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .expect("encode png");
        assert_eq!(read_exif_orientation(&png), None);
        assert_eq!(read_exif_orientation(b"not an image"), None);
    }

    #[test]
    fn orientation_six_turns_landscape_into_portrait() {
        let mut working = WorkingImage::decode(&jpeg_with_orientation(8, 4, 6)).expect("decode");
        assert!(working.normalize());
        assert_eq!(working.image.dimensions(), (4, 8));
        assert_eq!(working.orientation, None);
    }

    #[test]
    fn rotation_mapping_matches_tag_semantics() {
        let cases = [(3, (4, 2), (3, 1)), (6, (2, 4), (1, 0)), (8, (2, 4), (0, 3))];
        for (orientation, dims, marker) in cases {
            let mut working = WorkingImage {
                image: marked_image(),
                orientation: Some(orientation),
            };
            assert!(working.normalize());
            assert_eq!(working.image.dimensions(), dims, "orientation {}", orientation);
            let rgb = working.image.to_rgb8();
            assert_eq!(
                rgb.get_pixel(marker.0, marker.1),
                &Rgb([255, 255, 255]),
                "orientation {}",
                orientation
            );
        }
    }

    #[test]
    fn normalizing_twice_is_a_no_op() {
        let mut working = WorkingImage {
            image: marked_image(),
            orientation: Some(3),
        };
        assert!(working.normalize());
        let once = working.image.to_rgb8();
        assert!(!working.normalize());
        assert_eq!(working.image.to_rgb8(), once);
    }

    #[test]
    fn mirrored_orientations_are_left_alone() {
        let mut working = WorkingImage {
            image: marked_image(),
            orientation: Some(2),
        };
        assert!(!working.normalize());
        assert_eq!(working.image.to_rgb8(), marked_image().to_rgb8());
        assert_eq!(working.orientation, None);
    }
}
