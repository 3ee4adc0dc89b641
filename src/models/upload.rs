//! Metadata submitted with an image upload.

use std::path::Path;
use thiserror::Error;

/// Field name carrying the image payload in the multipart form.
pub const FILE_FIELD: &str = "image";

/// Stem used when neither the form nor the upload supplies a usable name.
pub const FALLBACK_STEM: &str = "image";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("missing required field `{0}`")]
    Missing(&'static str),
    #[error("field `{0}` is not usable as a key segment")]
    InvalidValue(&'static str),
}

/// Whether `segment` would change the shape of a key or a local path:
/// `.`, `..`, or anything containing a path separator.
pub fn is_unsafe_segment(segment: &str) -> bool {
    matches!(segment, "." | "..") || segment.contains(['/', '\\'])
}

/// Raw form fields as they arrive, before validation.
#[derive(Debug, Clone, Default)]
pub struct UploadFields {
    pub zone: Option<String>,
    pub supervisor: Option<String>,
    pub ward: Option<String>,
    pub date: Option<String>,
    pub category: Option<String>,
    /// Optional override for the original upload name.
    pub filename: Option<String>,
}

/// Upload metadata with every required field present and usable as a key segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFields {
    pub zone: String,
    pub supervisor: String,
    pub ward: String,
    pub date: String,
    pub category: String,
    pub filename: Option<String>,
}

impl UploadFields {
    /// Record a form field. Returns `false` for names this form does not use.
    pub fn set(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "zone" => &mut self.zone,
            "supervisor" => &mut self.supervisor,
            "ward" => &mut self.ward,
            "date" => &mut self.date,
            "category" => &mut self.category,
            "filename" => &mut self.filename,
            _ => return false,
        };
        *slot = Some(value);
        true
    }

    /// Check that every required field is present, non-blank and safe to use
    /// as a key segment.
    ///
    /// Fields are checked in key order so the first reported problem is stable.
    pub fn validate(self) -> Result<ValidatedFields, FieldError> {
        Ok(ValidatedFields {
            zone: required("zone", self.zone)?,
            supervisor: required("supervisor", self.supervisor)?,
            ward: required("ward", self.ward)?,
            date: required("date", self.date)?,
            category: required("category", self.category)?,
            filename: self
                .filename
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        })
    }
}

impl ValidatedFields {
    /// Directory segments in key order: zone, supervisor, ward, date, category.
    pub fn directory_segments(&self) -> [&str; 5] {
        [
            &self.zone,
            &self.supervisor,
            &self.ward,
            &self.date,
            &self.category,
        ]
    }

    /// Stem of the object's final key segment.
    ///
    /// Prefers the `filename` field over the original upload name and drops
    /// any directory part and extension from whichever is used. Both `/` and
    /// `\\` count as directory separators, whatever the host platform.
    pub fn file_stem(&self, original_name: Option<&str>) -> String {
        self.filename
            .as_deref()
            .or(original_name)
            .and_then(|name| name.rsplit(['/', '\\']).next())
            .and_then(|name| Path::new(name).file_stem())
            .and_then(|stem| stem.to_str())
            .map(str::trim)
            .filter(|stem| !stem.is_empty() && !is_unsafe_segment(stem))
            .unwrap_or(FALLBACK_STEM)
            .to_string()
    }
}

fn required(name: &'static str, value: Option<String>) -> Result<String, FieldError> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(FieldError::Missing(name))?;
    if is_unsafe_segment(&value) {
        return Err(FieldError::InvalidValue(name));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> UploadFields {
        let mut fields = UploadFields::default();
        for (name, value) in [
            ("zone", "zone-1"),
            ("supervisor", "Rahul"),
            ("ward", "ward-3"),
            ("date", "2025-06-14"),
            ("category", "pothole"),
        ] {
            assert!(fields.set(name, value.to_string()));
        }
        fields
    }

    #[test]
    fn validates_complete_fields_in_key_order() {
        let validated = complete().validate().unwrap();
        assert_eq!(
            validated.directory_segments(),
            ["zone-1", "Rahul", "ward-3", "2025-06-14", "pothole"]
        );
    }

    #[test]
    fn blank_field_counts_as_missing() {
        let mut fields = complete();
        fields.set("ward", "   ".into());
        assert_eq!(fields.validate(), Err(FieldError::Missing("ward")));
    }

    #[test]
    fn absent_field_is_reported() {
        let mut fields = complete();
        fields.category = None;
        assert_eq!(fields.validate(), Err(FieldError::Missing("category")));
    }

    #[test]
    fn slash_in_field_is_rejected() {
        let mut fields = complete();
        fields.set("zone", "zone-1/extra".into());
        assert_eq!(fields.validate(), Err(FieldError::InvalidValue("zone")));
    }

    #[test]
    fn dot_segments_and_backslashes_are_rejected() {
        for (name, value) in [("ward", ".."), ("date", "."), ("supervisor", "a\\b")] {
            let mut fields = complete();
            fields.set(name, value.into());
            assert_eq!(fields.validate(), Err(FieldError::InvalidValue(name)), "{value}");
        }
    }

    #[test]
    fn file_stem_strips_windows_directories() {
        let validated = complete().validate().unwrap();
        assert_eq!(validated.file_stem(Some("C:\\Users\\x\\img.jpg")), "img");
        assert_eq!(validated.file_stem(Some("uploads\\..")), FALLBACK_STEM);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let mut fields = complete();
        assert!(!fields.set("colour", "red".into()));
        assert!(fields.validate().is_ok());
    }

    #[test]
    fn file_stem_prefers_filename_field() {
        let mut fields = complete();
        fields.set("filename", "crack-near-gate.png".into());
        let validated = fields.validate().unwrap();
        assert_eq!(validated.file_stem(Some("IMG_0001.JPG")), "crack-near-gate");
    }

    #[test]
    fn file_stem_falls_back_to_upload_name_then_default() {
        let validated = complete().validate().unwrap();
        assert_eq!(validated.file_stem(Some("dir/IMG_0001.JPG")), "IMG_0001");
        assert_eq!(validated.file_stem(None), FALLBACK_STEM);
        assert_eq!(validated.file_stem(Some("")), FALLBACK_STEM);
    }
}
