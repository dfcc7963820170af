//! Throttling key composition.

/// An opaque key distinguishing the entity being throttled.
///
/// The key is composed from a principal kind, principal value, and endpoint
/// tag, e.g. `ip:203.0.113.7:global` or `user:42:chat`. The limiter never
/// interprets the structure; equal keys share access logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    /// Key scoping an IP address to one endpoint tag.
    pub fn ip(addr: &str, endpoint: &str) -> Self {
        Self(format!("ip:{addr}:{endpoint}"))
    }

    /// Key scoping an authenticated user to one endpoint tag.
    pub fn user(user_id: &str, endpoint: &str) -> Self {
        Self(format!("user:{user_id}:{endpoint}"))
    }

    /// The underlying key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_identifier_format() {
        let id = Identifier::ip("203.0.113.7", "global");
        assert_eq!(id.as_str(), "ip:203.0.113.7:global");
    }

    #[test]
    fn test_user_identifier_format() {
        let id = Identifier::user("42", "chat");
        assert_eq!(id.as_str(), "user:42:chat");
    }

    #[test]
    fn test_identifier_equality() {
        assert_eq!(Identifier::ip("10.0.0.1", "login"), Identifier::ip("10.0.0.1", "login"));
        assert_ne!(Identifier::ip("10.0.0.1", "login"), Identifier::ip("10.0.0.1", "global"));
    }
}
