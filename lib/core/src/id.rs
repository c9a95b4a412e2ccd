//! Strongly-typed identifiers.
//!
//! Server-generated IDs use ULID (Universally Unique Lexicographically
//! Sortable Identifier) format. Account identifiers are opaque strings
//! owned by the account store and are only validated, never generated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to generate a strongly-typed ID wrapper around ULID.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Creates a new ID with a randomly generated ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Creates an ID from a ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let prefix_with_underscore = concat!($prefix, "_");
                let ulid_str = s.strip_prefix(prefix_with_underscore).unwrap_or(s);

                Ulid::from_str(ulid_str)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        reason: e.to_string(),
                    })
            }
        }
    };
}

define_id!(
    /// Unique identifier for a single resolution or admin request.
    ///
    /// Used to correlate log lines across one unit of work.
    RequestId,
    "req"
);

/// Opaque, stable key for an account in the account store.
///
/// The only structural rule is that it is not empty (or whitespace-only).
/// Uniqueness is the account store's responsibility.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserIdentifier(String);

impl UserIdentifier {
    /// Creates an identifier, rejecting empty values.
    ///
    /// # Errors
    ///
    /// Returns `ParseIdError` if the value is empty or only whitespace.
    pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ParseIdError {
                id_type: "UserIdentifier",
                reason: "identifier must not be empty".to_string(),
            });
        }
        Ok(Self(id))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserIdentifier {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for UserIdentifier {
    type Error = ParseIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserIdentifier> for String {
    fn from(id: UserIdentifier) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_display_format() {
        let id = RequestId::new();
        assert!(id.to_string().starts_with("req_"));
    }

    #[test]
    fn request_id_parse_with_and_without_prefix() {
        let id = RequestId::new();
        let parsed: RequestId = id.to_string().parse().expect("should parse");
        assert_eq!(id, parsed);

        let raw: RequestId = id.as_ulid().to_string().parse().expect("should parse");
        assert_eq!(id, raw);
    }

    #[test]
    fn request_id_parse_invalid() {
        let err = "req_nope".parse::<RequestId>().unwrap_err();
        assert_eq!(err.id_type, "RequestId");
    }

    #[test]
    fn user_identifier_accepts_opaque_values() {
        let id = UserIdentifier::new("auth0|123456").expect("valid");
        assert_eq!(id.as_str(), "auth0|123456");
        assert_eq!(id.to_string(), "auth0|123456");
    }

    #[test]
    fn user_identifier_rejects_empty() {
        assert!(UserIdentifier::new("").is_err());
        let err = "   ".parse::<UserIdentifier>().unwrap_err();
        assert_eq!(err.id_type, "UserIdentifier");
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn user_identifier_serde_validates() {
        let id: UserIdentifier = serde_json::from_str("\"42\"").expect("deserialize");
        assert_eq!(id.as_str(), "42");
        assert_eq!(serde_json::to_string(&id).expect("serialize"), "\"42\"");

        let bad: Result<UserIdentifier, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());
    }
}
