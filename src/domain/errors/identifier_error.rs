use thiserror::Error;

/// Reasons a requested identifier is refused before any lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,

    #[error("identifier is {length} bytes, limit is {max}")]
    TooLong { length: usize, max: usize },

    #[error("identifier must not start with '.'")]
    LeadingDot,

    #[error("identifier contains forbidden character {0:?}")]
    ForbiddenCharacter(char),
}
