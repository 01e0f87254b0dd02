//! User identifier value object.

use std::fmt;

use crate::domain::errors::IdentifierError;

/// Address of the profile owner on the XMPP network.
///
/// Doubles as the cache key and as a file name stem inside the cache
/// directory, so anything that could escape that directory is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserIdentifier(String);

impl UserIdentifier {
    /// Longest identifier whose `<identifier>.<ext>` cache file name fits in
    /// the 255 bytes a file system entry can hold.
    pub const MAX_LENGTH: usize = 255 - ".png".len();

    /// Validates and wraps an identifier.
    ///
    /// # Errors
    ///
    /// Returns `IdentifierError` if the value is empty, too long, or cannot
    /// be used as a file name stem.
    pub fn parse(value: impl Into<String>) -> Result<Self, IdentifierError> {
        let value = value.into();

        if value.is_empty() {
            return Err(IdentifierError::Empty);
        }
        if value.len() > Self::MAX_LENGTH {
            return Err(IdentifierError::TooLong {
                length: value.len(),
                max: Self::MAX_LENGTH,
            });
        }
        if value.starts_with('.') {
            return Err(IdentifierError::LeadingDot);
        }
        if let Some(c) = value.chars().find(|c| matches!(c, '/' | '\\' | '\0')) {
            return Err(IdentifierError::ForbiddenCharacter(c));
        }

        Ok(Self(value))
    }

    /// Wraps an identifier without validation.
    #[must_use]
    pub fn new_unchecked(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for UserIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UserIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_parse_accepts_bare_jid() {
        let id = UserIdentifier::parse("alice@example.org").unwrap();
        assert_eq!(id.as_str(), "alice@example.org");
    }

    #[test]
    fn test_identifier_is_case_sensitive() {
        let lower = UserIdentifier::parse("alice@example.org").unwrap();
        let upper = UserIdentifier::parse("Alice@example.org").unwrap();
        assert_ne!(lower, upper);
    }

    #[test_case("" ; "empty")]
    #[test_case(".hidden" ; "leading_dot")]
    #[test_case(".." ; "parent_dir")]
    #[test_case("../etc/passwd" ; "traversal")]
    #[test_case("alice@example.org/phone" ; "resource_slash")]
    #[test_case("a\\b" ; "backslash")]
    #[test_case("nul\0byte" ; "nul")]
    fn test_parse_rejects(value: &str) {
        assert!(UserIdentifier::parse(value).is_err());
    }

    #[test]
    fn test_parse_length_boundary() {
        let domain = "@example.org";
        let fits = format!("{}{domain}", "a".repeat(UserIdentifier::MAX_LENGTH - domain.len()));
        assert_eq!(fits.len(), 251);
        assert!(UserIdentifier::parse(fits.as_str()).is_ok());

        let over = format!("a{fits}");
        assert_eq!(
            UserIdentifier::parse(over),
            Err(IdentifierError::TooLong {
                length: 252,
                max: 251
            })
        );
    }

    #[test]
    fn test_parse_rejects_overlong() {
        let long = "a".repeat(2000);
        assert!(matches!(
            UserIdentifier::parse(long),
            Err(IdentifierError::TooLong { length: 2000, .. })
        ));
    }
}
