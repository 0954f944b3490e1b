//! Opaque bearer tokens with TTL.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use uuid::Uuid;

/// Default token lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct TokenRecord {
    user_id: String,
    expires_at: Instant,
}

/// Issues and validates opaque session tokens.
///
/// Tokens are 32 random lowercase hex chars. Expired records are purged
/// lazily on lookup; there is no background sweep.
#[derive(Debug)]
pub struct TokenService {
    tokens: HashMap<String, TokenRecord>,
    ttl: Duration,
}

impl TokenService {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tokens: HashMap::new(),
            ttl,
        }
    }

    pub fn issue_token(&mut self, user_id: &str, now: Instant) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.tokens.insert(
            token.clone(),
            TokenRecord {
                user_id: user_id.to_string(),
                expires_at: now + self.ttl,
            },
        );
        token
    }

    /// Resolves a token to its user. An expired token is removed and
    /// reported as invalid.
    pub fn validate_token(&mut self, token: &str, now: Instant) -> Option<String> {
        let record = self.tokens.get(token)?;
        if now >= record.expires_at {
            self.tokens.remove(token);
            return None;
        }
        Some(record.user_id.clone())
    }
}

impl Default for TokenService {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_validates_to_its_user() {
        let now = Instant::now();
        let mut service = TokenService::default();
        let token = service.issue_token("user1", now);
        assert_eq!(token.len(), 32);
        assert_eq!(service.validate_token(&token, now), Some("user1".into()));
    }

    #[test]
    fn unknown_token_is_invalid() {
        let mut service = TokenService::default();
        assert_eq!(service.validate_token("nope", Instant::now()), None);
    }

    #[test]
    fn expired_token_is_purged_on_lookup() {
        let now = Instant::now();
        let mut service = TokenService::new(Duration::from_secs(10));
        let token = service.issue_token("user1", now);

        let expired = now + Duration::from_secs(10);
        assert_eq!(service.validate_token(&token, expired), None);
        // Gone even if asked again inside the original window semantics.
        assert_eq!(service.validate_token(&token, now), None);
    }

    #[test]
    fn tokens_are_unique_per_issue() {
        let now = Instant::now();
        let mut service = TokenService::default();
        let a = service.issue_token("user1", now);
        let b = service.issue_token("user1", now);
        assert_ne!(a, b);
    }
}
