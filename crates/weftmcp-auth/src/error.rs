//! Auth error types.

use thiserror::Error;

/// A specialized `Result` for OAuth operations.
pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Errors raised while handling a 401 challenge.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AuthError {
    /// The `WWW-Authenticate` header was missing or unparseable.
    #[error("malformed WWW-Authenticate challenge: {0}")]
    Challenge(String),

    /// The protected-resource metadata document could not be fetched or
    /// parsed.
    #[error("protected resource metadata unavailable: {0}")]
    ResourceMetadata(String),

    /// The metadata's `resource` field does not name the URL we used.
    #[error("resource binding mismatch: metadata names '{advertised}', request used '{used}'")]
    ResourceMismatch {
        /// Canonical form of the metadata's `resource` field.
        advertised: String,
        /// Canonical form of the URL the request actually used.
        used: String,
    },

    /// The metadata advertises no authorization servers.
    #[error("protected resource advertises no authorization servers")]
    NoAuthorizationServer,

    /// Authorization-server metadata discovery failed at both well-known
    /// locations.
    #[error("authorization server discovery failed: {0}")]
    Discovery(String),

    /// No `client_id` is configured and dynamic registration is not
    /// possible.
    #[error("no client_id configured and the authorization server offers no registration endpoint")]
    NoClientId,

    /// RFC 7591 dynamic registration failed.
    #[error("dynamic client registration failed: {0}")]
    Registration(String),

    /// The authorization redirect callback failed or was declined.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// Exchanging the authorization code for a token failed.
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// Refreshing the access token failed.
    #[error("token refresh failed: {0}")]
    Refresh(String),

    /// Building an endpoint URL from discovered metadata failed.
    #[error("invalid URL in authorization metadata: {0}")]
    InvalidUrl(String),
}
