//! Validated identity newtypes shared between the manager and its
//! collaborators.
//!
//! None of these wrap a real git/VCS library type — the backend is an
//! implementation detail of the collaborators, not of this vocabulary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error from parsing a fixed-length identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OidParseError {
    /// The identifier kind that failed to parse (`"repository-id"`, …).
    pub kind: &'static str,
    /// The raw value that failed.
    pub value: String,
    /// Why parsing failed.
    pub reason: String,
}

impl fmt::Display for OidParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {} `{}`: {}",
            self.kind, self.value, self.reason
        )
    }
}

impl std::error::Error for OidParseError {}

fn validate_fixed_len(kind: &'static str, s: &str, expected_len: usize) -> Result<(), OidParseError> {
    if s.len() != expected_len {
        return Err(OidParseError {
            kind,
            value: s.to_owned(),
            reason: format!("expected {expected_len} characters, got {}", s.len()),
        });
    }
    if s.is_empty() || s.chars().any(char::is_whitespace) {
        return Err(OidParseError {
            kind,
            value: s.to_owned(),
            reason: "must not contain whitespace".to_owned(),
        });
    }
    Ok(())
}

macro_rules! fixed_len_id {
    ($name:ident, $kind:literal, $len:expr, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap `s`.
            ///
            /// # Errors
            /// Returns [`OidParseError`] if `s` is not exactly the expected
            /// length or contains whitespace.
            pub fn new(s: impl Into<String>) -> Result<Self, OidParseError> {
                let s = s.into();
                validate_fixed_len($kind, &s, $len)?;
                Ok(Self(s))
            }

            /// Borrow the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = OidParseError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = OidParseError;
            fn try_from(s: String) -> Result<Self, Self::Error> {
                validate_fixed_len($kind, &s, $len)?;
                Ok(Self(s))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

fixed_len_id!(
    RepositoryId,
    "repository-id",
    36,
    "A fixed 36-character repository identifier. Identity key for dedup and lookup."
);

fixed_len_id!(
    PeerId,
    "peer-id",
    40,
    "A fixed 40-character peer identifier."
);

fixed_len_id!(
    RootTreeId,
    "root-tree-id",
    40,
    "A 40-character content hash identifying the root of a commit's tree or an index snapshot."
);
