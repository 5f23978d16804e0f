// Identity module - User identifiers
//
// The engine never authenticates anyone; callers arrive with an already
// resolved user id (WebID, DID, or an opaque account id from the host
// application). We only compare them for ownership and visibility checks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier for a user (owner or buyer)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create a user id from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_roundtrip() {
        let id = UserId::new("did:example:alice");
        assert_eq!(id.as_str(), "did:example:alice");
        assert_eq!(id.to_string(), "did:example:alice");
    }

    #[test]
    fn test_user_id_equality() {
        assert_eq!(UserId::from("alice"), UserId::new("alice".to_string()));
        assert_ne!(UserId::from("alice"), UserId::from("bob"));
    }
}
