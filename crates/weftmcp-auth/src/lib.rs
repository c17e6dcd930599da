//! OAuth 2.1 client for weftmcp HTTP transports.
//!
//! Activated when an HTTP transport receives a 401 challenge. The flow,
//! end to end:
//!
//! 1. Parse the `WWW-Authenticate: Bearer` challenge and fetch the
//!    RFC 9728 protected-resource metadata it names. Reject the document
//!    unless its `resource` field matches the URL actually used.
//! 2. Select an authorization server from the advertised list (first, or
//!    a caller-supplied selector).
//! 3. Discover the AS's endpoints from `/.well-known/openid-configuration`
//!    or `/.well-known/oauth-authorization-server`, filling RFC 8414
//!    defaults for missing fields.
//! 4. Register dynamically (RFC 7591) when no `client_id` is configured.
//! 5. Run the authorization-code flow with PKCE (S256), delegating browser
//!    interaction to a caller-supplied redirect callback.
//! 6. Cache the token in memory and refresh proactively within five
//!    minutes of expiry when a refresh token exists.
//!
//! [`OAuthClient`] implements the transport crate's
//! [`BearerAuthenticator`] seam so it plugs straight into
//! [`weftmcp_transport::HttpClientConfig`].

pub mod discovery;
pub mod error;
mod flow;
pub mod metadata;
pub mod registration;
mod types;

pub use error::{AuthError, AuthResult};
pub use flow::{AuthorizationRedirect, OAuthClient, OAuthConfig};
pub use types::TokenInfo;

use async_trait::async_trait;
use url::Url;
use weftmcp_transport::{BearerAuthenticator, TransportError, TransportResult};

#[async_trait]
impl BearerAuthenticator for OAuthClient {
    async fn bearer_token(&self) -> Option<String> {
        self.token().await
    }

    async fn on_unauthorized(
        &self,
        www_authenticate: &str,
        request_url: &Url,
    ) -> TransportResult<String> {
        self.handle_unauthorized(www_authenticate, request_url)
            .await
            .map(|token| token.access_token)
            .map_err(|e| {
                TransportError::AuthenticationFailed(format!(
                    "Failed to handle unauthorized response: {e}"
                ))
            })
    }
}
