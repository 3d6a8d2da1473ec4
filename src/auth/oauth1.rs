//! OAuth 1.0a three-legged flow
//!
//! 1. `POST /oauth/request_token` for a temporary credential pair
//! 2. Browser visits `/oauth/authenticate?oauth_token=…`
//! 3. `POST /oauth/access_token` trades the temporary pair plus verifier for
//!    a long-lived pair
//! 4. `GET /1.1/account/verify_credentials.json` identifies the user

use std::time::Duration;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method};
use url::Url;
use crate::Result;
use crate::config::{Config, Endpoints};
use crate::error::{AuthErrorKind, Error};
use super::http::{self, ProviderResponse};
use super::identity::UserIdentity;
use super::signature::SignatureSigner;

/// A token / token-secret pair
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    pub token: String,
    pub token_secret: String,
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("token", &self.token)
            .field("token_secret", &"<redacted>")
            .finish()
    }
}

/// Result of the request-token step
#[derive(Debug, Clone)]
pub struct RequestToken {
    pub credentials: OAuthCredentials,
    pub callback_confirmed: bool,
}

impl RequestToken {
    /// The temporary pair, provided the provider accepted our callback URL
    pub fn into_confirmed(self) -> Result<OAuthCredentials> {
        if !self.callback_confirmed {
            return Err(Error::auth(
                AuthErrorKind::CallbackNotConfirmed,
                "Provider did not confirm the callback URL; check the app's registered callback",
            ));
        }
        Ok(self.credentials)
    }
}

/// Result of the access-token step
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub credentials: OAuthCredentials,
    pub user_id: String,
    pub screen_name: String,
}

/// OAuth 1.0a client for one registered consumer
#[derive(Clone, Debug)]
pub struct OAuth1Client {
    signer: SignatureSigner,
    callback_url: String,
    endpoints: Endpoints,
    http_client: Client,
    step_timeout: Duration,
}

impl OAuth1Client {
    /// Build from validated configuration
    pub fn new(config: &Config) -> Result<Self> {
        if config.oauth1.consumer_key.is_empty() || config.oauth1.consumer_secret.is_empty() {
            return Err(Error::Config("OAuth 1.0a consumer key and secret are required".to_string()));
        }
        Ok(Self::from_parts(
            SignatureSigner::new(&config.oauth1.consumer_key, &config.oauth1.consumer_secret),
            config.oauth1.callback_url.clone(),
            config.endpoints.clone(),
            config.step_timeout(),
        ))
    }

    pub fn from_parts(
        signer: SignatureSigner,
        callback_url: String,
        endpoints: Endpoints,
        step_timeout: Duration,
    ) -> Self {
        Self {
            signer,
            callback_url,
            endpoints,
            http_client: Client::new(),
            step_timeout,
        }
    }

    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    /// Step 1: obtain temporary credentials
    pub async fn request_token(&self) -> Result<RequestToken> {
        let url = self.endpoints.request_token_url();
        let response = self
            .signed_call(
                Method::POST,
                "request_token",
                &url,
                &[("oauth_callback", self.callback_url.as_str())],
                None,
                AuthErrorKind::SignatureRejected,
            )
            .await?;

        let form = http::parse_form(&response.body);
        let token = http::form_field(&form, "oauth_token", "request_token")?;
        let token_secret = http::form_field(&form, "oauth_token_secret", "request_token")?;
        let callback_confirmed = form
            .get("oauth_callback_confirmed")
            .map(|v| v == "true")
            .unwrap_or(false);

        tracing::info!(callback_confirmed, "Obtained request token");

        Ok(RequestToken {
            credentials: OAuthCredentials { token, token_secret },
            callback_confirmed,
        })
    }

    /// Step 2: where the browser must go to approve the request token
    pub fn authenticate_url(&self, request_token: &str) -> Result<String> {
        let mut url = Url::parse(&self.endpoints.authenticate_url())
            .map_err(|e| Error::Config(format!("Invalid authenticate URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("oauth_token", request_token)
            .append_pair("force_login", "false");

        Ok(url.to_string())
    }

    /// Step 3: trade the temporary pair and verifier for an access token
    ///
    /// The temporary pair is consumed; it is never valid for a second try.
    pub async fn exchange_for_access_token(
        &self,
        request_token: OAuthCredentials,
        verifier: &str,
    ) -> Result<AccessToken> {
        let url = self.endpoints.access_token_url();
        let response = self
            .signed_call(
                Method::POST,
                "access_token",
                &url,
                &[
                    ("oauth_token", request_token.token.as_str()),
                    ("oauth_verifier", verifier),
                ],
                Some(request_token.token_secret.as_str()),
                AuthErrorKind::SignatureRejected,
            )
            .await?;

        let form = http::parse_form(&response.body);
        let token = http::form_field(&form, "oauth_token", "access_token")?;
        let token_secret = http::form_field(&form, "oauth_token_secret", "access_token")?;
        let user_id = form.get("user_id").cloned().unwrap_or_default();
        let screen_name = form.get("screen_name").cloned().unwrap_or_default();

        tracing::info!(user_id = %user_id, "Exchanged verifier for access token");

        Ok(AccessToken {
            credentials: OAuthCredentials { token, token_secret },
            user_id,
            screen_name,
        })
    }

    /// Signed GET of the authenticated user's profile
    pub async fn fetch_identity(&self, credentials: &OAuthCredentials) -> Result<UserIdentity> {
        let url = format!(
            "{}?include_entities=true&skip_status=true",
            self.endpoints.verify_credentials_url()
        );
        let response = self
            .signed_call(
                Method::GET,
                "verify_credentials",
                &url,
                &[("oauth_token", credentials.token.as_str())],
                Some(credentials.token_secret.as_str()),
                AuthErrorKind::Unauthorized,
            )
            .await?;

        let raw = serde_json::from_str(&response.body).map_err(|e| {
            Error::auth(
                AuthErrorKind::MalformedResponse,
                format!("verify_credentials returned invalid JSON: {}", e),
            )
        })?;
        UserIdentity::from_v1(raw)
    }

    /// Issue a signed request
    ///
    /// A signature rejection is retried exactly once, re-signed with a new
    /// nonce and timestamp; replaying the first nonce would always fail.
    async fn signed_call(
        &self,
        method: Method,
        step: &str,
        url: &str,
        oauth_params: &[(&str, &str)],
        token_secret: Option<&str>,
        on_unauthorized: AuthErrorKind,
    ) -> Result<ProviderResponse> {
        let mut retried = false;
        loop {
            let header = self
                .signer
                .authorization_header(method.as_str(), url, oauth_params, token_secret)?;

            let mut request = self
                .http_client
                .request(method.clone(), url)
                .header(AUTHORIZATION, header);
            if method == Method::POST {
                request = request.body("");
            }

            let response = http::execute(request, self.step_timeout, step).await?;
            if response.status.is_success() {
                return Ok(response);
            }

            let err = http::rejection(step, &response, on_unauthorized);
            if err.kind() == Some(AuthErrorKind::SignatureRejected) && !retried {
                tracing::warn!(step, "Signature rejected, re-signing once with a fresh nonce");
                retried = true;
                continue;
            }
            return Err(err);
        }
    }
}
