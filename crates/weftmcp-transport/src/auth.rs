//! Authentication seam for HTTP transports.
//!
//! HTTP transports do not know how tokens are obtained; they only attach
//! `Authorization: Bearer` headers and, on a 401 challenge, hand the
//! `WWW-Authenticate` header to a caller-supplied authenticator exactly
//! once per request. The OAuth implementation lives in `weftmcp-auth`.

use async_trait::async_trait;
use url::Url;

use crate::error::TransportResult;

/// Supplies bearer tokens to an HTTP transport.
#[async_trait]
pub trait BearerAuthenticator: Send + Sync {
    /// The token to attach to outgoing requests, if one is available and
    /// still usable.
    async fn bearer_token(&self) -> Option<String>;

    /// Called when the server answered 401. `www_authenticate` is the raw
    /// challenge header (empty when the server sent none) and `request_url`
    /// is the URL the transport actually used. Returns a fresh token; the
    /// transport retries the request once with it.
    async fn on_unauthorized(
        &self,
        www_authenticate: &str,
        request_url: &Url,
    ) -> TransportResult<String>;
}
