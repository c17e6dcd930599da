//! The authorization-code-with-PKCE flow and the in-memory token cache.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;

use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::discovery::{self, AuthorizationServerMetadata};
use crate::error::{AuthError, AuthResult};
use crate::metadata::{self, canonical_resource};
use crate::registration::{self, RegistrationRequest};
use crate::types::TokenInfo;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Delegates browser interaction: receives the authorization URL, returns
/// the authorization code once the user has consented.
pub type AuthorizationRedirect = Arc<dyn Fn(Url) -> BoxFuture<AuthResult<String>> + Send + Sync>;

/// Picks an authorization server from the advertised list.
pub type AuthorizationServerSelector = Arc<dyn Fn(&[String]) -> usize + Send + Sync>;

/// Static configuration for the OAuth client.
#[derive(Clone)]
pub struct OAuthConfig {
    /// Pre-registered client id; when `None`, dynamic registration runs.
    pub client_id: Option<String>,
    /// Client secret matching `client_id`.
    pub client_secret: Option<String>,
    /// Redirect URI the authorization code is delivered to.
    pub redirect_uri: String,
    /// Scopes to request.
    pub scopes: Vec<String>,
    /// Client name used for dynamic registration.
    pub client_name: String,
    /// Authorization-server selector; default takes the first advertised.
    pub select_authorization_server: Option<AuthorizationServerSelector>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: "http://localhost:8080/callback".to_string(),
            scopes: Vec::new(),
            client_name: "weftmcp".to_string(),
            select_authorization_server: None,
        }
    }
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

/// Mutable flow state, all cached in memory only.
#[derive(Default)]
struct FlowState {
    token: Option<TokenInfo>,
    /// Credentials from configuration or dynamic registration.
    credentials: Option<(String, Option<String>)>,
    /// AS metadata from the last successful discovery.
    server: Option<AuthorizationServerMetadata>,
    /// Canonical resource the cached token was issued for.
    resource: Option<String>,
}

/// OAuth 2.1 client for HTTP transports.
///
/// Construct once per protected server and install into
/// [`weftmcp_transport::HttpClientConfig::authenticator`].
pub struct OAuthClient {
    config: OAuthConfig,
    redirect: AuthorizationRedirect,
    http: reqwest::Client,
    state: TokioMutex<FlowState>,
}

impl std::fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OAuthClient {
    /// Create a client with the given redirect delegate.
    pub fn new(config: OAuthConfig, redirect: AuthorizationRedirect) -> AuthResult<Self> {
        // Token endpoints must not be followed through redirects.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            config,
            redirect,
            http,
            state: TokioMutex::new(FlowState::default()),
        })
    }

    /// The cached access token, refreshed proactively when it is within
    /// five minutes of expiry and a refresh token exists. `None` when no
    /// usable token is available; the next 401 will run the full flow.
    pub async fn token(&self) -> Option<String> {
        let mut state = self.state.lock().await;
        let token = state.token.as_ref()?;
        if token.is_fresh(SystemTime::now()) {
            return Some(token.access_token.clone());
        }

        let refresh_token = token.refresh_token.clone()?;
        let server = state.server.clone()?;
        let credentials = state.credentials.clone()?;
        match self.refresh(&server, &credentials, &refresh_token).await {
            Ok(refreshed) => {
                let access = refreshed.access_token.clone();
                state.token = Some(refreshed);
                Some(access)
            }
            Err(e) => {
                warn!("proactive token refresh failed: {e}");
                state.token = None;
                None
            }
        }
    }

    /// Run the full 401 recovery: metadata, binding check, discovery,
    /// registration if needed, and the PKCE authorization-code flow (or a
    /// refresh when possible). Caches and returns the resulting token.
    pub async fn handle_unauthorized(
        &self,
        www_authenticate: &str,
        request_url: &Url,
    ) -> AuthResult<TokenInfo> {
        let challenge = metadata::parse_challenge(www_authenticate)?;
        let metadata_url = challenge
            .resource_metadata
            .ok_or_else(|| {
                AuthError::Challenge("challenge carries no resource_metadata".to_string())
            })
            .and_then(|raw| {
                Url::parse(&raw).map_err(|e| {
                    AuthError::Challenge(format!("unparseable resource_metadata '{raw}': {e}"))
                })
            })?;

        let resource_metadata = metadata::fetch(&self.http, &metadata_url).await?;
        metadata::validate_binding(&resource_metadata, request_url)?;
        let resource = canonical_resource(request_url);

        if resource_metadata.authorization_servers.is_empty() {
            return Err(AuthError::NoAuthorizationServer);
        }
        let index = self
            .config
            .select_authorization_server
            .as_ref()
            .map_or(0, |select| select(&resource_metadata.authorization_servers))
            .min(resource_metadata.authorization_servers.len() - 1);
        let issuer_raw = &resource_metadata.authorization_servers[index];
        let issuer = Url::parse(issuer_raw)
            .map_err(|e| AuthError::InvalidUrl(format!("issuer '{issuer_raw}': {e}")))?;
        debug!("selected authorization server {issuer}");

        let server = discovery::discover(&self.http, &issuer).await?;
        let credentials = self.ensure_credentials(&server).await?;

        // A cached refresh token for the same resource short-circuits the
        // interactive flow.
        let cached_refresh = {
            let state = self.state.lock().await;
            state
                .token
                .as_ref()
                .filter(|_| state.resource.as_deref() == Some(resource.as_str()))
                .and_then(|t| t.refresh_token.clone())
        };
        let token = match cached_refresh {
            Some(refresh_token) => {
                match self.refresh(&server, &credentials, &refresh_token).await {
                    Ok(token) => token,
                    Err(e) => {
                        debug!("refresh failed, falling back to the authorization flow: {e}");
                        self.authorization_code_flow(&server, &credentials, &resource)
                            .await?
                    }
                }
            }
            None => {
                self.authorization_code_flow(&server, &credentials, &resource)
                    .await?
            }
        };

        let mut state = self.state.lock().await;
        state.token = Some(token.clone());
        state.server = Some(server);
        state.credentials = Some(credentials);
        state.resource = Some(resource);
        info!("obtained access token (scope: {})", token.scope.as_deref().unwrap_or("-"));
        Ok(token)
    }

    /// Use configured credentials, the cached registration, or register
    /// dynamically.
    async fn ensure_credentials(
        &self,
        server: &AuthorizationServerMetadata,
    ) -> AuthResult<(String, Option<String>)> {
        if let Some(client_id) = &self.config.client_id {
            return Ok((client_id.clone(), self.config.client_secret.clone()));
        }
        if let Some(credentials) = self.state.lock().await.credentials.clone() {
            return Ok(credentials);
        }

        let endpoint = server
            .registration_endpoint
            .as_deref()
            .ok_or(AuthError::NoClientId)?;
        let request = RegistrationRequest::mcp_client(
            &self.config.client_name,
            &self.config.redirect_uri,
            &self.config.scopes,
        );
        let response = registration::register(&self.http, endpoint, &request).await?;
        info!("dynamically registered as client {}", response.client_id);
        Ok((response.client_id, response.client_secret))
    }

    fn oauth2_client(
        &self,
        server: &AuthorizationServerMetadata,
        credentials: &(String, Option<String>),
    ) -> AuthResult<
        BasicClient<
            oauth2::EndpointSet,
            oauth2::EndpointNotSet,
            oauth2::EndpointNotSet,
            oauth2::EndpointNotSet,
            oauth2::EndpointSet,
        >,
    > {
        let auth_url = AuthUrl::new(server.authorization_endpoint.clone())
            .map_err(|e| AuthError::InvalidUrl(format!("authorization_endpoint: {e}")))?;
        let token_url = TokenUrl::new(server.token_endpoint.clone())
            .map_err(|e| AuthError::InvalidUrl(format!("token_endpoint: {e}")))?;
        let redirect_url = RedirectUrl::new(self.config.redirect_uri.clone())
            .map_err(|e| AuthError::InvalidUrl(format!("redirect_uri: {e}")))?;

        let mut client = BasicClient::new(ClientId::new(credentials.0.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_redirect_uri(redirect_url);
        if let Some(secret) = &credentials.1 {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }
        Ok(client)
    }

    /// The interactive leg: PKCE challenge, caller-driven consent, code
    /// exchange. The `resource` indicator (RFC 8707) binds the token to
    /// the server we were challenged by.
    async fn authorization_code_flow(
        &self,
        server: &AuthorizationServerMetadata,
        credentials: &(String, Option<String>),
        resource: &str,
    ) -> AuthResult<TokenInfo> {
        let client = self.oauth2_client(server, credentials)?;

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (authorize_url, _csrf_state) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.config.scopes.iter().cloned().map(Scope::new))
            .set_pkce_challenge(pkce_challenge)
            .add_extra_param("resource", resource)
            .url();

        debug!("delegating authorization to the redirect callback");
        let code = (self.redirect)(authorize_url)
            .await
            .map_err(|e| AuthError::Authorization(e.to_string()))?;

        let response = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .add_extra_param("resource", resource)
            .request_async(&self.http)
            .await
            .map_err(|e| AuthError::TokenExchange(e.to_string()))?;

        Ok(token_info(&response))
    }

    async fn refresh(
        &self,
        server: &AuthorizationServerMetadata,
        credentials: &(String, Option<String>),
        refresh_token: &str,
    ) -> AuthResult<TokenInfo> {
        let client = self.oauth2_client(server, credentials)?;
        let response = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| AuthError::Refresh(e.to_string()))?;

        let mut token = token_info(&response);
        // Servers that do not rotate refresh tokens expect us to keep the
        // old one.
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        Ok(token)
    }
}

fn token_info(
    response: &oauth2::StandardTokenResponse<
        oauth2::EmptyExtraTokenFields,
        oauth2::basic::BasicTokenType,
    >,
) -> TokenInfo {
    TokenInfo {
        access_token: response.access_token().secret().clone(),
        token_type: format!("{:?}", response.token_type()).to_lowercase(),
        refresh_token: response.refresh_token().map(|t| t.secret().clone()),
        expires_in: response.expires_in().map(|d| d.as_secs()),
        scope: response.scopes().map(|scopes| {
            scopes
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        }),
        obtained_at: SystemTime::now(),
    }
}
