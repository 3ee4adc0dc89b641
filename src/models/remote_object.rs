//! Represents a media object held by the remote store.

use serde::Deserialize;

/// Extension used when the content URL carries none.
pub const DEFAULT_EXTENSION: &str = ".jpg";

/// A single object in the remote media store, addressed by its key.
///
/// The key (`public_id`) is slash-delimited and encodes the zone hierarchy
/// positionally, e.g. `Zones/zone-1/Rahul/ward-3/2025-06-14/pothole/img001`.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RemoteObject {
    /// Hierarchical key of the object.
    pub public_id: String,

    /// HTTPS URL the content can be fetched from.
    #[serde(rename = "secure_url")]
    pub url: String,
}

impl RemoteObject {
    pub fn new(public_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            public_id: public_id.into(),
            url: url.into(),
        }
    }

    /// File extension of the content URL, including the leading dot.
    ///
    /// Query strings and fragments are ignored. Falls back to `.jpg` when the
    /// last path segment has no extension.
    pub fn extension(&self) -> String {
        let path = self.url.split(['?', '#']).next().unwrap_or_default();
        let last = path.rsplit('/').next().unwrap_or_default();
        match last.rfind('.') {
            Some(idx) if idx > 0 && idx + 1 < last.len() => last[idx..].to_string(),
            _ => DEFAULT_EXTENSION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_comes_from_url_path() {
        let obj = RemoteObject::new(
            "Zones/a/b",
            "https://res.cloudinary.com/demo/image/upload/v17/Zones/a/b.png",
        );
        assert_eq!(obj.extension(), ".png");
    }

    #[test]
    fn extension_ignores_query_string() {
        let obj = RemoteObject::new("k", "https://cdn.test/x/photo.webp?sig=abc.def");
        assert_eq!(obj.extension(), ".webp");
    }

    #[test]
    fn extension_defaults_to_jpg() {
        for url in [
            "https://cdn.test/x/photo",
            "https://cdn.test/x/photo.",
            "https://cdn.test/x/.hidden",
            "",
        ] {
            assert_eq!(RemoteObject::new("k", url).extension(), ".jpg", "{url}");
        }
    }

    #[test]
    fn deserializes_search_resource() {
        let json = r#"{"public_id":"Zones/z/s/w/d/c/f","secure_url":"https://x/f.jpg","format":"jpg","bytes":10}"#;
        let obj: RemoteObject = serde_json::from_str(json).unwrap();
        assert_eq!(obj.public_id, "Zones/z/s/w/d/c/f");
        assert_eq!(obj.url, "https://x/f.jpg");
    }
}
