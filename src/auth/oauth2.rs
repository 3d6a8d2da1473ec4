//! OAuth 2.0 authorization code flow with PKCE
//!
//! Builds the consent URL, trades the returned code for tokens, and fetches
//! the user behind them.

use std::time::Duration;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;
use crate::Result;
use crate::config::{Config, Endpoints};
use crate::error::{AuthErrorKind, Error};
use super::http;
use super::identity::UserIdentity;
use super::pkce::{generate_state, PkceMethod, PkcePair};

/// Lifetime assumed when the token response carries no `expires_in`
const DEFAULT_EXPIRES_IN_SECS: i64 = 7200;

/// Tokens are treated as expired this long before their actual expiry
const EXPIRY_BUFFER_SECS: i64 = 300;

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    scope: Option<String>,
}

/// Authorization code exchange request
#[derive(Debug, Serialize)]
struct TokenExchangeRequest<'a> {
    code: &'a str,
    grant_type: &'a str,
    client_id: &'a str,
    redirect_uri: &'a str,
    code_verifier: &'a str,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Access grant from the token endpoint
///
/// `refresh_token` is kept but never used: refreshing is not implemented.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuth2Credentials {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for OAuth2Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Credentials")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl OAuth2Credentials {
    fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        let expires_in = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            token_type: response.token_type,
            scope: response.scope,
            expires_at: now + chrono::Duration::seconds(expires_in),
        }
    }

    /// Check if the access token is expired or about to expire
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now + chrono::Duration::seconds(EXPIRY_BUFFER_SECS) >= self.expires_at
    }
}

/// Everything the callback needs to finish an attempt
///
/// Holds the PKCE verifier and the state; both live only as long as the
/// attempt.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub pkce: PkcePair,
}

/// OAuth 2.0 PKCE client for one registered app
#[derive(Clone)]
pub struct OAuth2Client {
    client_id: String,
    client_secret: Option<String>,
    redirect_url: String,
    scopes: Vec<String>,
    challenge_method: PkceMethod,
    endpoints: Endpoints,
    http_client: Client,
    step_timeout: Duration,
}

impl std::fmt::Debug for OAuth2Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Client")
            .field("client_id", &self.client_id)
            .field("confidential", &self.client_secret.is_some())
            .field("redirect_url", &self.redirect_url)
            .field("scopes", &self.scopes)
            .field("challenge_method", &self.challenge_method)
            .finish()
    }
}

impl OAuth2Client {
    pub fn new(config: &Config) -> Result<Self> {
        if config.oauth2.client_id.is_empty() {
            return Err(Error::Config("OAuth 2.0 client_id is required".to_string()));
        }
        Ok(Self {
            client_id: config.oauth2.client_id.clone(),
            client_secret: config.oauth2.client_secret.clone(),
            redirect_url: config.oauth2.redirect_url.clone(),
            scopes: config.oauth2.scopes.clone(),
            challenge_method: config.oauth2.challenge_method,
            endpoints: config.endpoints.clone(),
            http_client: Client::new(),
            step_timeout: config.step_timeout(),
        })
    }

    pub fn redirect_url(&self) -> &str {
        &self.redirect_url
    }

    /// Generate PKCE material and state, and build the consent URL
    pub fn begin(&self) -> Result<AuthorizationRequest> {
        let pkce = PkcePair::with_method(self.challenge_method);
        let state = generate_state();
        let url = self.authorize_url(&pkce.challenge, pkce.method, &state)?;
        Ok(AuthorizationRequest { url, state, pkce })
    }

    /// Build the authorization URL
    pub fn authorize_url(&self, code_challenge: &str, method: PkceMethod, state: &str) -> Result<String> {
        let mut url = Url::parse(&self.endpoints.authorize_url())
            .map_err(|e| Error::Config(format!("Invalid authorize URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_url)
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", method.as_str());

        Ok(url.to_string())
    }

    /// Exchange authorization code for tokens
    pub async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<OAuth2Credentials> {
        let request = TokenExchangeRequest {
            code,
            grant_type: "authorization_code",
            client_id: &self.client_id,
            redirect_uri: &self.redirect_url,
            code_verifier,
        };

        let mut builder = self.http_client.post(self.endpoints.token_url()).form(&request);
        if let Some(secret) = &self.client_secret {
            builder = builder.basic_auth(&self.client_id, Some(secret));
        }

        let response = http::execute(builder, self.step_timeout, "token_exchange").await?;
        if !response.status.is_success() {
            return Err(http::rejection("token_exchange", &response, AuthErrorKind::ProviderRejected));
        }

        let token_response: TokenResponse = serde_json::from_str(&response.body).map_err(|e| {
            Error::auth(
                AuthErrorKind::MalformedResponse,
                format!("token_exchange returned unexpected JSON: {}", e),
            )
        })?;

        tracing::info!(has_refresh_token = token_response.refresh_token.is_some(), "Exchanged authorization code");

        Ok(OAuth2Credentials::from_response(token_response, Utc::now()))
    }

    /// Bearer GET of the authenticated user's profile
    pub async fn fetch_identity(&self, credentials: &OAuth2Credentials) -> Result<UserIdentity> {
        if credentials.is_expired() {
            return Err(Error::auth(
                AuthErrorKind::Unauthorized,
                "Access token has expired; sign in again",
            ));
        }

        let builder = self
            .http_client
            .get(self.endpoints.users_me_url())
            .query(&[("user.fields", "profile_image_url")])
            .bearer_auth(&credentials.access_token);

        let response = http::execute(builder, self.step_timeout, "users_me").await?;
        if !response.status.is_success() {
            return Err(http::rejection("users_me", &response, AuthErrorKind::Unauthorized));
        }

        let raw = serde_json::from_str(&response.body).map_err(|e| {
            Error::auth(
                AuthErrorKind::MalformedResponse,
                format!("users_me returned invalid JSON: {}", e),
            )
        })?;
        UserIdentity::from_v2(raw)
    }
}
