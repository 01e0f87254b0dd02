//! Avatar image value objects.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::UserIdentifier;

/// Image formats accepted into the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageExtension {
    Png,
    Svg,
    Jpg,
    Gif,
}

impl ImageExtension {
    pub const ALL: [Self; 4] = [Self::Png, Self::Svg, Self::Jpg, Self::Gif];

    /// File extension used in the cache directory.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Svg => "svg",
            Self::Jpg => "jpg",
            Self::Gif => "gif",
        }
    }

    /// MIME type served as `Content-Type`.
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Svg => "image/svg+xml",
            Self::Jpg => "image/jpeg",
            Self::Gif => "image/gif",
        }
    }

    /// Parses a cache file extension.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == ext)
    }

    /// Maps a MIME type to an extension, ignoring surrounding whitespace and
    /// ASCII case.
    #[must_use]
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.trim();
        Self::ALL
            .into_iter()
            .find(|e| e.mime_type().eq_ignore_ascii_case(mime))
    }
}

impl fmt::Display for ImageExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image bytes extracted from a vCard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAvatar {
    pub bytes: Bytes,
    pub extension: ImageExtension,
}

impl DecodedAvatar {
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>, extension: ImageExtension) -> Self {
        Self {
            bytes: bytes.into(),
            extension,
        }
    }
}

/// A cached avatar as seen by the freshness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub identifier: UserIdentifier,
    pub extension: ImageExtension,
    pub mtime: DateTime<Utc>,
}

impl CacheEntry {
    /// File name of the entry inside the cache directory.
    #[must_use]
    pub fn file_name(&self) -> String {
        cache_file_name(&self.identifier, self.extension)
    }

    /// Returns true if the entry is older than `max_age` at `now`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now.signed_duration_since(self.mtime) > max_age
    }
}

/// Builds `<identifier>.<ext>`.
#[must_use]
pub fn cache_file_name(identifier: &UserIdentifier, extension: ImageExtension) -> String {
    format!("{}.{}", identifier.as_str(), extension.as_str())
}

/// Splits a cache file name at its last dot. Names that do not carry a
/// supported extension or a valid identifier stem yield `None`.
#[must_use]
pub fn parse_cache_file_name(name: &str) -> Option<(UserIdentifier, ImageExtension)> {
    let (stem, ext) = name.rsplit_once('.')?;
    let extension = ImageExtension::from_extension(ext)?;
    let identifier = UserIdentifier::parse(stem).ok()?;
    Some((identifier, extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("image/png", Some(ImageExtension::Png) ; "png")]
    #[test_case("image/svg+xml", Some(ImageExtension::Svg) ; "svg")]
    #[test_case("image/jpeg", Some(ImageExtension::Jpg) ; "jpeg")]
    #[test_case("image/gif", Some(ImageExtension::Gif) ; "gif")]
    #[test_case(" IMAGE/PNG \n", Some(ImageExtension::Png) ; "case_and_whitespace")]
    #[test_case("image/jpg", None ; "nonstandard_jpg")]
    #[test_case("image/webp", None ; "webp")]
    #[test_case("", None ; "empty")]
    fn test_from_mime(mime: &str, expected: Option<ImageExtension>) {
        assert_eq!(ImageExtension::from_mime(mime), expected);
    }

    #[test]
    fn test_parse_cache_file_name_splits_last_dot() {
        let (id, ext) = parse_cache_file_name("alice@example.org.png").unwrap();
        assert_eq!(id.as_str(), "alice@example.org");
        assert_eq!(ext, ImageExtension::Png);
    }

    #[test_case("README" ; "no_extension")]
    #[test_case("alice@example.org.webp" ; "unsupported_extension")]
    #[test_case(".alice@example.org.png.partial" ; "temp_file")]
    #[test_case(".png" ; "empty_stem")]
    fn test_parse_cache_file_name_ignores(name: &str) {
        assert!(parse_cache_file_name(name).is_none());
    }

    #[test]
    fn test_is_stale() {
        let mtime = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let entry = CacheEntry {
            identifier: UserIdentifier::new_unchecked("bob@example.org"),
            extension: ImageExtension::Gif,
            mtime,
        };
        let day = chrono::Duration::hours(24);

        assert!(!entry.is_stale(mtime + chrono::Duration::hours(23), day));
        assert!(!entry.is_stale(mtime + day, day));
        assert!(entry.is_stale(mtime + day + chrono::Duration::seconds(1), day));
        assert_eq!(entry.file_name(), "bob@example.org.gif");
    }
}
