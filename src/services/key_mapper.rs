//! src/services/key_mapper.rs
//!
//! Bidirectional mapping between remote object keys and the local mirror
//! layout. Keys look like `root/zone/supervisor/ward/date/category/filename`;
//! each object lands twice on disk:
//!
//! - full:  `base/zone/supervisor/ward/date/category/filename.ext`
//! - daily: `base/dailywork/category/date/filename.ext`
//!
//! Both paths are a pure function of the key, the content URL's extension
//! and the configured root/base.

use crate::models::{
    remote_object::RemoteObject,
    upload::{ValidatedFields, is_unsafe_segment},
};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory under the base that holds the flat per-day copies.
pub const DAILY_DIR: &str = "dailywork";

/// Roles of the key segments following the root prefix, in key order.
pub const SEGMENT_ROLES: [&str; 6] = ["zone", "supervisor", "ward", "date", "category", "filename"];

const DATE_INDEX: usize = 3;
const CATEGORY_INDEX: usize = 4;
const FILENAME_INDEX: usize = 5;

/// Local destinations for one remote object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorTargets {
    pub full: PathBuf,
    pub daily: PathBuf,
}

impl MirrorTargets {
    pub fn all(&self) -> [&Path; 2] {
        [&self.full, &self.daily]
    }
}

/// Why a key could not be mapped onto the local layout.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SkipReason {
    #[error("key is not under the `{root}/` prefix")]
    OutsideRoot { root: String },
    #[error("key has {found} segments below the root, expected {expected} (missing `{missing}`)")]
    TooFewSegments {
        found: usize,
        expected: usize,
        missing: &'static str,
    },
    #[error("key has {found} segments below the root, expected {expected}")]
    TooManySegments { found: usize, expected: usize },
    #[error("`{role}` segment is empty")]
    EmptySegment { role: &'static str },
    #[error("`{role}` segment `{value}` would escape the mirror directory")]
    UnsafeSegment { role: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapOutcome {
    Mapped(MirrorTargets),
    Skipped(SkipReason),
}

#[derive(Debug, Clone)]
pub struct KeyMapper {
    root: String,
    base_dir: PathBuf,
}

impl KeyMapper {
    pub fn new(root: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into().trim_matches('/').to_string(),
            base_dir: base_dir.into(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Derive the full and daily local paths for `object`.
    ///
    /// Total: malformed keys come back as `MapOutcome::Skipped`, never as a
    /// panic or error.
    pub fn map(&self, object: &RemoteObject) -> MapOutcome {
        match self.segments(&object.public_id) {
            Ok(segments) => MapOutcome::Mapped(self.targets(&segments, &object.extension())),
            Err(reason) => MapOutcome::Skipped(reason),
        }
    }

    /// Build the remote key for an upload: `root/<directory segments>/<stem>`.
    pub fn build_key(&self, fields: &ValidatedFields, stem: &str) -> String {
        let mut key = self.root.clone();
        for segment in fields.directory_segments() {
            key.push('/');
            key.push_str(segment);
        }
        key.push('/');
        key.push_str(stem);
        key
    }

    fn segments<'k>(&self, key: &'k str) -> Result<Vec<&'k str>, SkipReason> {
        let rest = key
            .strip_prefix(self.root.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| SkipReason::OutsideRoot {
                root: self.root.clone(),
            })?;

        let segments: Vec<&str> = rest.split('/').collect();
        let expected = SEGMENT_ROLES.len();
        if segments.len() < expected {
            return Err(SkipReason::TooFewSegments {
                found: segments.len(),
                expected,
                missing: SEGMENT_ROLES[segments.len()],
            });
        }
        if segments.len() > expected {
            return Err(SkipReason::TooManySegments {
                found: segments.len(),
                expected,
            });
        }

        for (segment, role) in segments.iter().zip(SEGMENT_ROLES) {
            if segment.is_empty() {
                return Err(SkipReason::EmptySegment { role });
            }
            if is_unsafe_segment(segment) {
                return Err(SkipReason::UnsafeSegment {
                    role,
                    value: segment.to_string(),
                });
            }
        }

        Ok(segments)
    }

    fn targets(&self, segments: &[&str], extension: &str) -> MirrorTargets {
        let file_name = format!("{}{}", segments[FILENAME_INDEX], extension);

        let mut full = self.base_dir.clone();
        for dir in &segments[..FILENAME_INDEX] {
            full.push(dir);
        }
        full.push(&file_name);

        let mut daily = self.base_dir.join(DAILY_DIR);
        daily.push(segments[CATEGORY_INDEX]);
        daily.push(segments[DATE_INDEX]);
        daily.push(&file_name);

        MirrorTargets { full, daily }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::upload::UploadFields;

    fn mapper() -> KeyMapper {
        KeyMapper::new("Zones", "/data/Zones")
    }

    fn object(key: &str) -> RemoteObject {
        RemoteObject::new(key, format!("https://res.test/image/upload/v1/{key}.jpg"))
    }

    #[test]
    fn maps_concrete_key_to_full_and_daily_paths() {
        let outcome = mapper().map(&object("Zones/zone-1/Rahul/ward-3/2025-06-14/pothole/img001"));
        assert_eq!(
            outcome,
            MapOutcome::Mapped(MirrorTargets {
                full: PathBuf::from("/data/Zones/zone-1/Rahul/ward-3/2025-06-14/pothole/img001.jpg"),
                daily: PathBuf::from("/data/Zones/dailywork/pothole/2025-06-14/img001.jpg"),
            })
        );
    }

    #[test]
    fn full_path_mirrors_key_below_root() {
        let obj = RemoteObject::new("Zones/a/b/c/d/e/f", "https://res.test/f.png");
        let MapOutcome::Mapped(targets) = mapper().map(&obj) else {
            panic!("expected mapping");
        };
        let expected: PathBuf = ["/data/Zones", "a", "b", "c", "d", "e", "f.png"].iter().collect();
        assert_eq!(targets.full, expected);
    }

    #[test]
    fn missing_extension_defaults_to_jpg() {
        let obj = RemoteObject::new("Zones/a/b/c/d/e/f", "https://res.test/raw/f");
        let MapOutcome::Mapped(targets) = mapper().map(&obj) else {
            panic!("expected mapping");
        };
        assert!(targets.full.ends_with("e/f.jpg"));
        assert!(targets.daily.ends_with("dailywork/e/d/f.jpg"));
    }

    #[test]
    fn short_key_is_skipped() {
        assert_eq!(
            mapper().map(&object("Zones/onlyzone")),
            MapOutcome::Skipped(SkipReason::TooFewSegments {
                found: 1,
                expected: 6,
                missing: "supervisor",
            })
        );
    }

    #[test]
    fn long_key_is_skipped() {
        assert_eq!(
            mapper().map(&object("Zones/a/b/c/d/e/f/g")),
            MapOutcome::Skipped(SkipReason::TooManySegments {
                found: 7,
                expected: 6,
            })
        );
    }

    #[test]
    fn key_outside_root_is_skipped() {
        for key in ["Other/a/b/c/d/e/f", "ZonesX/a/b/c/d/e/f", "Zones"] {
            assert_eq!(
                mapper().map(&object(key)),
                MapOutcome::Skipped(SkipReason::OutsideRoot {
                    root: "Zones".into()
                }),
                "{key}"
            );
        }
    }

    #[test]
    fn empty_and_traversal_segments_are_skipped() {
        assert_eq!(
            mapper().map(&object("Zones/a//c/d/e/f")),
            MapOutcome::Skipped(SkipReason::EmptySegment { role: "supervisor" })
        );
        assert_eq!(
            mapper().map(&object("Zones/a/../c/d/e/f")),
            MapOutcome::Skipped(SkipReason::UnsafeSegment {
                role: "supervisor",
                value: "..".into(),
            })
        );
    }

    #[test]
    fn root_is_normalised() {
        let mapper = KeyMapper::new("/Zones/", "/data");
        assert_eq!(mapper.root(), "Zones");
        assert!(matches!(
            mapper.map(&object("Zones/a/b/c/d/e/f")),
            MapOutcome::Mapped(_)
        ));
    }

    #[test]
    fn built_key_maps_back_onto_its_fields() {
        let mut fields = UploadFields::default();
        fields.set("zone", "zone-2".into());
        fields.set("supervisor", "Asha".into());
        fields.set("ward", "ward-9".into());
        fields.set("date", "2025-07-01".into());
        fields.set("category", "garbage".into());
        let fields = fields.validate().unwrap();

        let key = mapper().build_key(&fields, "IMG_42-1700000000000");
        assert_eq!(key, "Zones/zone-2/Asha/ward-9/2025-07-01/garbage/IMG_42-1700000000000");

        let MapOutcome::Mapped(targets) = mapper().map(&object(&key)) else {
            panic!("expected mapping");
        };
        assert_eq!(
            targets.full,
            PathBuf::from("/data/Zones/zone-2/Asha/ward-9/2025-07-01/garbage/IMG_42-1700000000000.jpg")
        );
    }
}
