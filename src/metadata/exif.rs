use std::collections::BTreeMap;
use std::io::Cursor;

use exif::{In, Rational, Tag, Value};

use crate::{GpsCoordinates, MetadataResult, MetadataStatus};

/// Lowercase substrings identifying common editing/compositing tools.
pub const EDITING_SOFTWARE: &[&str] =
    &["photoshop", "gimp", "canva", "affinity", "pixlr", "paint.net"];

/// Tag values longer than this are truncated in `all_tags`.
const MAX_TAG_VALUE_LEN: usize = 200;

pub fn is_editing_software(software: &str) -> bool {
    let lower = software.to_lowercase();
    EDITING_SOFTWARE.iter().any(|tool| lower.contains(tool))
}

pub struct ExifExtractor;

impl ExifExtractor {
    /// Parses embedded provenance tags from raw image bytes. Never fails:
    /// every parse problem degrades to a status plus warnings.
    pub fn extract(bytes: &[u8]) -> MetadataResult {
        let mut result = MetadataResult {
            has_exif: false,
            status: MetadataStatus::Inconclusive,
            camera_make: None,
            camera_model: None,
            software: None,
            date_taken: None,
            gps: None,
            warnings: Vec::new(),
            all_tags: BTreeMap::new(),
        };

        if image::guess_format(bytes).is_err() {
            log::error!(
                "unrecognized container for metadata extraction ({} bytes)",
                bytes.len()
            );
            result.status = MetadataStatus::Error;
            result.warnings.push(
                "Could not open image for metadata extraction. \
                 The file may be corrupted or in an unsupported format."
                    .into(),
            );
            return result;
        }

        let exif_data = match exif::Reader::new().read_from_container(&mut Cursor::new(bytes)) {
            Ok(data) => Some(data),
            Err(e) => {
                log::debug!("no EXIF segment found: {}", e);
                None
            }
        };

        if let Some(ref data) = exif_data {
            // Primary path: targeted lookups in the structured tag tables.
            result.camera_make = Self::field_string(data, Tag::Make);
            result.camera_model = Self::field_string(data, Tag::Model);
            result.software = Self::field_string(data, Tag::Software);
            result.date_taken = Self::field_string(data, Tag::DateTimeOriginal);
            result.gps = Self::extract_gps(data);

            let primary_found = result.camera_make.is_some()
                || result.camera_model.is_some()
                || result.software.is_some()
                || result.date_taken.is_some()
                || result.gps.is_some();

            if primary_found {
                result.has_exif = true;
                result.status = MetadataStatus::Present;
            } else {
                // Fallback: flat tag dictionary, same fields by equivalent keys.
                let tags = Self::flat_tags(data);
                if !tags.is_empty() {
                    result.camera_make = tags.get("Make").cloned();
                    result.camera_model = tags.get("Model").cloned();
                    result.software = tags.get("Software").cloned();
                    result.date_taken = tags.get("DateTimeOriginal").cloned();
                    result.all_tags = tags;
                    result.has_exif = true;
                    result.status = MetadataStatus::Present;
                }
            }
        }

        if let Some(ref software) = result.software {
            if is_editing_software(software) {
                result
                    .warnings
                    .push(format!("Editing software detected: {}", software));
            }
        }

        if !result.has_exif {
            result.status = MetadataStatus::Inconclusive;
            result.warnings.push(
                "No EXIF data found. This image may be synthetic or have been \
                 processed by social media/editing software."
                    .into(),
            );
        } else if result.all_tags.is_empty() {
            if let Some(ref data) = exif_data {
                result.all_tags = Self::flat_tags(data);
            }
        }

        result
    }

    fn field_string(data: &exif::Exif, tag: Tag) -> Option<String> {
        data.get_field(tag, In::PRIMARY)
            .map(|field| field.display_value().to_string().trim().to_string())
            .filter(|value| !value.is_empty())
    }

    /// Human-readable tag names where the name table knows them; the numeric
    /// identifier is used otherwise (`Tag` falls back to it in `Display`).
    fn flat_tags(data: &exif::Exif) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();

        for field in data.fields() {
            if field.ifd_num != In::PRIMARY {
                continue;
            }
            let name = format!("{}", field.tag);
            let value: String = field
                .display_value()
                .to_string()
                .chars()
                .take(MAX_TAG_VALUE_LEN)
                .collect();
            tags.insert(name, value);
        }

        tags
    }

    fn extract_gps(data: &exif::Exif) -> Option<GpsCoordinates> {
        let lat = Self::rational_triplet(data, Tag::GPSLatitude)?;
        let lon = Self::rational_triplet(data, Tag::GPSLongitude)?;

        let lat_ref = Self::hemisphere(data, Tag::GPSLatitudeRef).unwrap_or_else(|| "N".into());
        let lon_ref = Self::hemisphere(data, Tag::GPSLongitudeRef).unwrap_or_else(|| "E".into());

        let lat = gps_decimal(&lat, &lat_ref)?;
        let lon = gps_decimal(&lon, &lon_ref)?;

        Some(GpsCoordinates { lat, lon })
    }

    fn rational_triplet(data: &exif::Exif, tag: Tag) -> Option<Vec<Rational>> {
        match &data.get_field(tag, In::PRIMARY)?.value {
            Value::Rational(rationals) if rationals.len() >= 3 => Some(rationals.clone()),
            _ => {
                log::debug!("malformed GPS rationals for {}", tag);
                None
            }
        }
    }

    fn hemisphere(data: &exif::Exif, tag: Tag) -> Option<String> {
        match &data.get_field(tag, In::PRIMARY)?.value {
            Value::Ascii(chunks) => chunks
                .first()
                .map(|chunk| String::from_utf8_lossy(chunk).trim().to_string()),
            _ => None,
        }
    }
}

/// Converts a (degrees, minutes, seconds) rational triplet plus hemisphere
/// reference to signed decimal degrees, rounded to 6 decimal places.
pub fn gps_decimal(dms: &[Rational], reference: &str) -> Option<f64> {
    if dms.len() < 3 || dms.iter().take(3).any(|r| r.denom == 0) {
        return None;
    }

    let degrees = dms[0].to_f64();
    let minutes = dms[1].to_f64();
    let seconds = dms[2].to_f64();

    let mut decimal = degrees + minutes / 60.0 + seconds / 3600.0;
    if reference.contains('S') || reference.contains('W') {
        decimal = -decimal;
    }

    Some((decimal * 1e6).round() / 1e6)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn rational(num: u32, denom: u32) -> Rational {
        Rational { num, denom }
    }

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_pixel(16, 16, Rgb([10, 20, 30]));
        let mut buffer = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, image::ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_gps_decimal_pittsburgh() {
        let lat = [rational(40, 1), rational(26, 1), rational(46, 1)];
        let lon = [rational(79, 1), rational(58, 1), rational(56, 1)];

        assert_eq!(gps_decimal(&lat, "N"), Some(40.446111));
        assert_eq!(gps_decimal(&lon, "W"), Some(-79.982222));
    }

    #[test]
    fn test_gps_decimal_sign_flips_on_reference() {
        let dms = [rational(12, 1), rational(30, 1), rational(0, 1)];

        assert_eq!(gps_decimal(&dms, "N"), Some(12.5));
        assert_eq!(gps_decimal(&dms, "S"), Some(-12.5));
        assert_eq!(gps_decimal(&dms, "E"), Some(12.5));
        assert_eq!(gps_decimal(&dms, "W"), Some(-12.5));
    }

    #[test]
    fn test_gps_decimal_rejects_malformed_rationals() {
        assert_eq!(gps_decimal(&[rational(40, 1), rational(26, 1)], "N"), None);
        assert_eq!(
            gps_decimal(&[rational(40, 1), rational(26, 0), rational(46, 1)], "N"),
            None
        );
    }

    #[test]
    fn test_editing_software_denylist() {
        assert!(is_editing_software("Adobe Photoshop 25.1 (Windows)"));
        assert!(is_editing_software("GIMP 2.10"));
        assert!(is_editing_software("paint.net 5.0"));
        assert!(!is_editing_software("darktable 4.6"));
    }

    #[test]
    fn test_extract_garbage_bytes_reports_error() {
        let result = ExifExtractor::extract(b"\x00\x01\x02\x03 nothing here");

        assert!(!result.has_exif);
        assert_eq!(result.status, MetadataStatus::Error);
        assert!(result.warnings[0].contains("Could not open image"));
    }

    #[test]
    fn test_extract_png_without_exif_is_inconclusive() {
        let result = ExifExtractor::extract(&png_bytes());

        assert!(!result.has_exif);
        assert_eq!(result.status, MetadataStatus::Inconclusive);
        assert!(result.warnings.iter().any(|w| w.contains("No EXIF data")));
        assert!(result.all_tags.is_empty());
    }

    #[test]
    fn test_missing_exif_never_reports_present() {
        for bytes in [&b"junk"[..], &png_bytes()[..]] {
            let result = ExifExtractor::extract(bytes);
            if !result.has_exif {
                assert_ne!(result.status, MetadataStatus::Present);
            }
        }
    }
}
