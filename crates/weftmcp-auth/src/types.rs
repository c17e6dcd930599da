//! Token types.

use std::time::{Duration, SystemTime};

/// An issued access token with its refresh material and provenance.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    /// The bearer access token.
    pub access_token: String,
    /// Token type as reported by the server, `bearer` in practice.
    pub token_type: String,
    /// Refresh token, when the server issued one.
    pub refresh_token: Option<String>,
    /// Lifetime in seconds, when the server reported one.
    pub expires_in: Option<u64>,
    /// Granted scope.
    pub scope: Option<String>,
    /// When this token was obtained.
    pub obtained_at: SystemTime,
}

impl TokenInfo {
    /// Tokens are refreshed once they are within this window of expiry.
    pub const REFRESH_WINDOW: Duration = Duration::from_secs(5 * 60);

    /// Absolute expiry time; `None` when the server reported no lifetime.
    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires_in
            .map(|seconds| self.obtained_at + Duration::from_secs(seconds))
    }

    /// Whether the token is still usable: its expiry is more than the
    /// refresh window away. Tokens without a lifetime never go stale.
    pub fn is_fresh(&self, now: SystemTime) -> bool {
        match self.expires_at() {
            Some(expires_at) => expires_at > now + Self::REFRESH_WINDOW,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_in: Option<u64>) -> TokenInfo {
        TokenInfo {
            access_token: "at".into(),
            token_type: "bearer".into(),
            refresh_token: None,
            expires_in,
            scope: None,
            obtained_at: SystemTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn fresh_until_five_minutes_before_expiry() {
        let token = token(Some(3600));
        let issued = SystemTime::UNIX_EPOCH;
        assert!(token.is_fresh(issued));
        assert!(token.is_fresh(issued + Duration::from_secs(3600 - 301)));
        assert!(!token.is_fresh(issued + Duration::from_secs(3600 - 300)));
        assert!(!token.is_fresh(issued + Duration::from_secs(4000)));
    }

    #[test]
    fn tokens_without_lifetime_never_go_stale() {
        let token = token(None);
        assert!(token.is_fresh(SystemTime::UNIX_EPOCH + Duration::from_secs(1 << 30)));
    }
}
