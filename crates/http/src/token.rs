use chrono::{DateTime, Duration, Utc};
use sa_protocol::rest::LoginResponse;

/// An access token plus the bookkeeping needed to know when it needs
/// refreshing. Grounded on
/// `examples/original_source/src/pybragerone/models/token.py`.
#[derive(Debug, Clone)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Token {
    pub fn from_login_response(resp: LoginResponse, issued_at: DateTime<Utc>) -> Self {
        Token {
            access_token: resp.token,
            token_type: resp.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_at: resp.expires_in.map(|secs| issued_at + Duration::seconds(secs)),
        }
    }

    /// True if the token is expired or will expire within `leeway` of now.
    /// A token with no known expiry is treated as never expiring (the
    /// backend didn't advertise a TTL).
    pub fn is_expired(&self, now: DateTime<Utc>, leeway: std::time::Duration) -> bool {
        match self.expires_at {
            Some(exp) => now + Duration::from_std(leeway).unwrap_or(Duration::zero()) >= exp,
            None => false,
        }
    }

    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

/// Case-insensitive substring match for the backend's duplicate-login
/// error, exactly as `_is_duplicate_token_error` checks it.
pub fn is_duplicate_token_error(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("duplicate entry") || lower.contains("er_dup_entry")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_without_expiry_never_expires() {
        let token = Token {
            access_token: "x".into(),
            token_type: "Bearer".into(),
            expires_at: None,
        };
        assert!(!token.is_expired(Utc::now(), std::time::Duration::from_secs(90)));
    }

    #[test]
    fn token_within_leeway_window_is_expired() {
        let now = Utc::now();
        let token = Token {
            access_token: "x".into(),
            token_type: "Bearer".into(),
            expires_at: Some(now + Duration::seconds(30)),
        };
        assert!(token.is_expired(now, std::time::Duration::from_secs(90)));
    }

    #[test]
    fn duplicate_token_error_detection_is_case_insensitive() {
        assert!(is_duplicate_token_error("ER_DUP_ENTRY: key violation"));
        assert!(is_duplicate_token_error("Duplicate entry for key"));
        assert!(!is_duplicate_token_error("invalid credentials"));
    }
}
