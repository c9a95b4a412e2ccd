//! Authentication schemes and methods.
//!
//! An `AuthScheme` is the configuration-time key that selects which session
//! populator applies to a request. An `AuthMethod` is the marker recorded on
//! a principal describing how the identity was established.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix for OAuth schemes in their string form (`oauth:<provider>`).
const OAUTH_PREFIX: &str = "oauth:";

/// Authentication scheme used to key session populators.
///
/// String forms: `credentials`, `jwt`, `api_key`, `oauth:<provider>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuthScheme {
    /// User name and password.
    Credentials,
    /// Bearer JWT issued by this platform.
    Jwt,
    /// Long-lived API key.
    ApiKey,
    /// Social/OAuth login through the named provider.
    OAuth(String),
}

impl AuthScheme {
    /// Returns the principal marker matching this scheme.
    #[must_use]
    pub fn auth_method(&self) -> AuthMethod {
        match self {
            Self::Credentials => AuthMethod::Credentials,
            Self::Jwt => AuthMethod::Jwt,
            Self::ApiKey => AuthMethod::ApiKey,
            Self::OAuth(_) => AuthMethod::OAuth,
        }
    }

    /// Returns the provider name recorded on sessions populated by this scheme.
    #[must_use]
    pub fn provider_name(&self) -> &str {
        match self {
            Self::Credentials => "credentials",
            Self::Jwt => "jwt",
            Self::ApiKey => "api_key",
            Self::OAuth(provider) => provider,
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OAuth(provider) => write!(f, "{OAUTH_PREFIX}{provider}"),
            other => f.write_str(other.provider_name()),
        }
    }
}

/// Error returned when a scheme string is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSchemeError {
    /// The rejected input.
    pub value: String,
}

impl fmt::Display for ParseSchemeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown auth scheme '{}'", self.value)
    }
}

impl std::error::Error for ParseSchemeError {}

impl FromStr for AuthScheme {
    type Err = ParseSchemeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed {
            "credentials" => Ok(Self::Credentials),
            "jwt" => Ok(Self::Jwt),
            "api_key" => Ok(Self::ApiKey),
            _ => match trimmed.strip_prefix(OAUTH_PREFIX) {
                Some(provider) if !provider.is_empty() => Ok(Self::OAuth(provider.to_string())),
                _ => Err(ParseSchemeError {
                    value: s.to_string(),
                }),
            },
        }
    }
}

impl Serialize for AuthScheme {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AuthScheme {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// How the identity behind a principal was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// User name and password.
    Credentials,
    /// Bearer JWT.
    Jwt,
    /// API key.
    ApiKey,
    /// OAuth provider login.
    #[serde(rename = "oauth")]
    OAuth,
    /// Resolved from a trusted, already-authenticated identifier.
    Identifier,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_builtin_schemes() {
        assert_eq!("credentials".parse(), Ok(AuthScheme::Credentials));
        assert_eq!("jwt".parse(), Ok(AuthScheme::Jwt));
        assert_eq!(" api_key ".parse(), Ok(AuthScheme::ApiKey));
    }

    #[test]
    fn parse_oauth_scheme() {
        let scheme: AuthScheme = "oauth:github".parse().expect("parse");
        assert_eq!(scheme, AuthScheme::OAuth("github".to_string()));
        assert_eq!(scheme.to_string(), "oauth:github");
        assert_eq!(scheme.provider_name(), "github");
        assert_eq!(scheme.auth_method(), AuthMethod::OAuth);
    }

    #[test]
    fn parse_rejects_unknown_and_empty_provider() {
        assert!("saml".parse::<AuthScheme>().is_err());
        let err = "oauth:".parse::<AuthScheme>().unwrap_err();
        assert_eq!(err.value, "oauth:");
    }

    #[test]
    fn scheme_serializes_as_string() {
        let json = serde_json::to_string(&AuthScheme::OAuth("google".to_string())).expect("ser");
        assert_eq!(json, "\"oauth:google\"");
        let parsed: AuthScheme = serde_json::from_str("\"jwt\"").expect("de");
        assert_eq!(parsed, AuthScheme::Jwt);
    }

    #[test]
    fn auth_method_serialization_format() {
        let json = serde_json::to_string(&AuthMethod::OAuth).expect("ser");
        assert_eq!(json, "\"oauth\"");
        let json = serde_json::to_string(&AuthMethod::ApiKey).expect("ser");
        assert_eq!(json, "\"api_key\"");
    }
}
