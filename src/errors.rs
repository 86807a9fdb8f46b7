//! Error taxonomy used for differential comparison.
//!
//! Candidate implementations phrase failures differently: message text,
//! wrapped error types, and embedded paths all vary. The suite therefore
//! never compares raw errors. Every operation failure is first collapsed
//! into an [`ErrorClass`] tag describing the semantic outcome, and two
//! outcomes are equivalent exactly when their tags match.

use crate::store::StoreError;
use std::fmt;

/// Semantic classification of an operation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorClass {
    NotFound,
    AlreadyExists,
    NotADirectory,
    IsADirectory,
    TooManyLinks,
    PermissionDenied,
    InvalidInput,
    /// Anything the taxonomy does not model. Two unclassified failures
    /// compare equal regardless of their underlying cause.
    Unclassified,
}

impl ErrorClass {
    /// Classifies a store error by semantic outcome, ignoring message
    /// text, operation names, and embedded paths.
    pub fn classify(err: &StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ErrorClass::NotFound,
            StoreError::AlreadyExists(_) => ErrorClass::AlreadyExists,
            StoreError::NotADirectory(_) => ErrorClass::NotADirectory,
            StoreError::IsADirectory(_) => ErrorClass::IsADirectory,
            StoreError::TooManyLinks(_) => ErrorClass::TooManyLinks,
            // A read-only rejection is a permission outcome as far as the
            // reference behavior model is concerned.
            StoreError::PermissionDenied(_) | StoreError::ReadOnly(_) => {
                ErrorClass::PermissionDenied
            }
            StoreError::InvalidInput(_) => ErrorClass::InvalidInput,
            StoreError::NotEmpty(_) | StoreError::Unsupported(_) | StoreError::Io(_) => {
                ErrorClass::Unclassified
            }
        }
    }

    /// Classifies an operation result: `None` for success.
    pub fn of<T>(result: &Result<T, StoreError>) -> Option<Self> {
        result.as_ref().err().map(Self::classify)
    }

    pub fn equivalent(a: Self, b: Self) -> bool {
        a == b
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorClass::NotFound => "not-found",
            ErrorClass::AlreadyExists => "already-exists",
            ErrorClass::NotADirectory => "not-a-directory",
            ErrorClass::IsADirectory => "is-a-directory",
            ErrorClass::TooManyLinks => "too-many-links",
            ErrorClass::PermissionDenied => "permission-denied",
            ErrorClass::InvalidInput => "invalid-input",
            ErrorClass::Unclassified => "unclassified",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn classification_ignores_paths_and_messages() {
        let a = StoreError::NotFound(PathBuf::from("/one/path"));
        let b = StoreError::NotFound(PathBuf::from("/a/completely/different/path"));

        assert!(ErrorClass::equivalent(
            ErrorClass::classify(&a),
            ErrorClass::classify(&b)
        ));
    }

    #[test]
    fn distinct_tags_are_not_equivalent() {
        let missing = StoreError::NotFound(PathBuf::from("/x"));
        let existing = StoreError::AlreadyExists(PathBuf::from("/x"));

        assert!(!ErrorClass::equivalent(
            ErrorClass::classify(&missing),
            ErrorClass::classify(&existing)
        ));
    }

    #[test]
    fn read_only_counts_as_permission_denied() {
        let err = StoreError::ReadOnly(PathBuf::from("/x"));
        assert_eq!(ErrorClass::classify(&err), ErrorClass::PermissionDenied);
    }

    #[test]
    fn raw_io_errors_are_unclassified() {
        let err = StoreError::Io(std::io::Error::other("backend exploded"));
        assert_eq!(ErrorClass::classify(&err), ErrorClass::Unclassified);
    }

    #[test]
    fn of_maps_success_to_none() {
        let ok: Result<(), StoreError> = Ok(());
        assert_eq!(ErrorClass::of(&ok), None);

        let err: Result<(), StoreError> = Err(StoreError::NotFound(PathBuf::from("/x")));
        assert_eq!(ErrorClass::of(&err), Some(ErrorClass::NotFound));
    }
}
