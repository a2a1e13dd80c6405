//! Space-delimited OAuth scope values.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An ordered, de-duplicated set of scope tokens.
///
/// Serializes as the space-delimited string used on the wire and in token
/// claims.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope(Vec<String>);

impl Scope {
    /// Parses a space-delimited scope string, dropping empty and repeated
    /// tokens while keeping first-seen order.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let mut tokens: Vec<String> = Vec::new();
        for token in value.split_ascii_whitespace() {
            if !tokens.iter().any(|t| t == token) {
                tokens.push(token.to_string());
            }
        }
        Self(tokens)
    }

    /// Returns `true` if the scope contains `token`.
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.0.iter().any(|t| t == token)
    }

    /// Returns `true` if every token of `self` is in `other`.
    #[must_use]
    pub fn is_subset_of(&self, other: &Scope) -> bool {
        self.0.iter().all(|t| other.contains(t))
    }

    /// Returns `true` if no tokens are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the tokens.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

impl From<&str> for Scope {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl Serialize for Scope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Scope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::parse(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dedupes_and_keeps_order() {
        let scope = Scope::parse("  openid profile  openid email ");
        assert_eq!(scope.to_string(), "openid profile email");
        assert!(scope.contains("email"));
        assert!(!scope.contains("offline_access"));
    }

    #[test]
    fn test_subset() {
        let granted = Scope::parse("openid profile email");
        assert!(Scope::parse("profile openid").is_subset_of(&granted));
        assert!(!Scope::parse("openid admin").is_subset_of(&granted));
        assert!(Scope::default().is_subset_of(&granted));
    }

    #[test]
    fn test_serde_as_string() {
        let scope = Scope::parse("openid profile");
        assert_eq!(
            serde_json::to_value(&scope).unwrap(),
            serde_json::json!("openid profile")
        );
        let back: Scope = serde_json::from_str("\"a b a\"").unwrap();
        assert_eq!(back, Scope::parse("a b"));
    }
}
