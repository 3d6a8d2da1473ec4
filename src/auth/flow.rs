//! Sign-in orchestration
//!
//! [`AuthFlow`] picks the protocol from configuration. [`Authenticator`]
//! runs one attempt at a time: `start()` produces the redirect target and an
//! [`AuthAttempt`] that owns the attempt's secrets; `complete()` consumes it
//! with the provider's callback and persists the resulting identity.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use crate::Result;
use crate::config::{Config, FlowKind};
use crate::error::{AuthErrorKind, Error};
use super::callback::CallbackParams;
use super::identity::UserIdentity;
use super::oauth1::{OAuth1Client, OAuthCredentials};
use super::oauth2::OAuth2Client;
use super::store::{CredentialStore, SessionGate, StoredSession};

/// The configured sign-in protocol
#[derive(Debug, Clone)]
pub enum AuthFlow {
    OAuth1(OAuth1Client),
    OAuth2Pkce(OAuth2Client),
}

/// Secrets that must survive the browser round trip, and nothing longer
enum PendingSecret {
    OAuth1 { request_token: OAuthCredentials },
    OAuth2 { state: String, verifier: String },
}

/// An attempt waiting for its callback
pub struct PendingAuth {
    redirect_url: String,
    secret: PendingSecret,
}

impl PendingAuth {
    pub fn redirect_url(&self) -> &str {
        &self.redirect_url
    }
}

impl AuthFlow {
    /// Build the flow named by `config.flow`
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        match config.flow {
            FlowKind::Oauth1 => Ok(AuthFlow::OAuth1(OAuth1Client::new(config)?)),
            FlowKind::Oauth2Pkce => Ok(AuthFlow::OAuth2Pkce(OAuth2Client::new(config)?)),
        }
    }

    pub fn kind(&self) -> FlowKind {
        match self {
            AuthFlow::OAuth1(_) => FlowKind::Oauth1,
            AuthFlow::OAuth2Pkce(_) => FlowKind::Oauth2Pkce,
        }
    }

    /// Where the provider will send the browser back to
    pub fn callback_url(&self) -> &str {
        match self {
            AuthFlow::OAuth1(client) => client.callback_url(),
            AuthFlow::OAuth2Pkce(client) => client.redirect_url(),
        }
    }

    /// Produce the redirect target
    pub async fn begin(&self) -> Result<PendingAuth> {
        match self {
            AuthFlow::OAuth1(client) => {
                let request_token = client.request_token().await?.into_confirmed()?;
                let redirect_url = client.authenticate_url(&request_token.token)?;
                Ok(PendingAuth {
                    redirect_url,
                    secret: PendingSecret::OAuth1 { request_token },
                })
            }
            AuthFlow::OAuth2Pkce(client) => {
                let request = client.begin()?;
                Ok(PendingAuth {
                    redirect_url: request.url,
                    secret: PendingSecret::OAuth2 {
                        state: request.state,
                        verifier: request.pkce.verifier,
                    },
                })
            }
        }
    }

    /// Verify the callback, exchange credentials and fetch the identity
    ///
    /// `pending` is consumed: whatever happens, its secrets are gone after
    /// this call.
    pub async fn finish(&self, pending: PendingAuth, callback: &CallbackParams) -> Result<UserIdentity> {
        match (self, pending.secret) {
            (AuthFlow::OAuth1(client), PendingSecret::OAuth1 { request_token }) => {
                let verified = callback.oauth1(&request_token.token)?;
                let access = client
                    .exchange_for_access_token(request_token, &verified.verifier)
                    .await?;
                client.fetch_identity(&access.credentials).await
            }
            (AuthFlow::OAuth2Pkce(client), PendingSecret::OAuth2 { state, verifier }) => {
                let verified = callback.oauth2(&state)?;
                let credentials = client.exchange_code(&verified.code, &verifier).await?;
                client.fetch_identity(&credentials).await
            }
            _ => Err(Error::Other(
                "Pending attempt was started by a different flow".to_string(),
            )),
        }
    }
}

/// Clears the in-progress flag when the attempt ends, however it ends
struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Runs sign-in attempts, one at a time
pub struct Authenticator {
    flow: AuthFlow,
    store: Arc<CredentialStore>,
    in_progress: Arc<AtomicBool>,
}

impl Authenticator {
    pub fn new(flow: AuthFlow, store: Arc<CredentialStore>) -> Self {
        Self {
            flow,
            store,
            in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flow and file-backed store from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let flow = AuthFlow::from_config(config)?;
        let store = Arc::new(CredentialStore::file(config.session_file()));
        Ok(Self::new(flow, store))
    }

    pub fn flow(&self) -> &AuthFlow {
        &self.flow
    }

    pub fn gate(&self) -> SessionGate {
        SessionGate::new(self.store.clone())
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Begin an attempt
    ///
    /// Fails with `AlreadyInProgress` while another attempt from this
    /// authenticator is outstanding; no network call is made in that case.
    pub async fn start(&self) -> Result<AuthAttempt<'_>> {
        let guard = InFlightGuard::acquire(&self.in_progress).ok_or_else(|| {
            Error::auth(
                AuthErrorKind::AlreadyInProgress,
                "A sign-in attempt is already in progress",
            )
        })?;

        tracing::info!(flow = %self.flow.kind(), "Starting sign-in");
        let pending = self.flow.begin().await.map_err(|e| log_failure(self.flow.kind(), e))?;

        Ok(AuthAttempt {
            authenticator: self,
            pending,
            _guard: guard,
        })
    }

    /// Forget the signed-in user
    pub fn logout(&self) -> Result<()> {
        self.store.clear()
    }
}

/// One outstanding sign-in attempt
pub struct AuthAttempt<'a> {
    authenticator: &'a Authenticator,
    pending: PendingAuth,
    _guard: InFlightGuard,
}

impl AuthAttempt<'_> {
    /// Where to send the browser
    pub fn redirect_url(&self) -> &str {
        self.pending.redirect_url()
    }

    /// Finish with the provider's callback and persist the session
    pub async fn complete(self, callback: &CallbackParams) -> Result<StoredSession> {
        let AuthAttempt { authenticator, pending, _guard } = self;
        let kind = authenticator.flow.kind();

        let identity = authenticator
            .flow
            .finish(pending, callback)
            .await
            .map_err(|e| log_failure(kind, e))?;

        let session = authenticator.store.save(&identity)?;
        tracing::info!(flow = %kind, user_id = %identity.id, "Sign-in complete");
        Ok(session)
    }
}

/// Structured record of a failure; carries the kind, never secrets
fn log_failure(flow: FlowKind, err: Error) -> Error {
    let kind = err.kind().map(|k| k.as_str()).unwrap_or("other");
    tracing::error!(flow = %flow, kind, "Sign-in failed");
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use crate::auth::store::tests::FixedClock;
    use crate::auth::store::MemorySessionBackend;
    use crate::config::Endpoints;

    fn config(flow: FlowKind, base: &str) -> Config {
        let mut config = Config::default();
        config.flow = flow;
        config.oauth1.consumer_key = "ck".to_string();
        config.oauth1.consumer_secret = "cs".to_string();
        config.oauth2.client_id = "client-1".to_string();
        config.endpoints = Endpoints {
            api_base: base.to_string(),
            web_base: base.to_string(),
        };
        config
    }

    fn authenticator(flow: FlowKind, base: &str) -> Authenticator {
        let store = CredentialStore::with_clock(MemorySessionBackend::default(), FixedClock::at(1_000));
        Authenticator::new(
            AuthFlow::from_config(&config(flow, base)).unwrap(),
            Arc::new(store),
        )
    }

    async fn mount_oauth1_provider(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/oauth/request_token"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "oauth_token=req-token&oauth_token_secret=req-secret&oauth_callback_confirmed=true",
            ))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/1.1/account/verify_credentials.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id_str": "6253282",
                "screen_name": "TwitterAPI",
                "name": "Twitter API"
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn test_from_config_selects_variant() {
        let flow = AuthFlow::from_config(&config(FlowKind::Oauth1, "https://api.twitter.com")).unwrap();
        assert_eq!(flow.kind(), FlowKind::Oauth1);
        let flow = AuthFlow::from_config(&config(FlowKind::Oauth2Pkce, "https://api.twitter.com")).unwrap();
        assert_eq!(flow.kind(), FlowKind::Oauth2Pkce);
    }

    #[test]
    fn test_from_config_validates() {
        let mut bad = config(FlowKind::Oauth1, "https://api.twitter.com");
        bad.oauth1.consumer_secret = "YOUR_CONSUMER_SECRET".to_string();
        assert!(AuthFlow::from_config(&bad).is_err());
    }

    #[tokio::test]
    async fn test_oauth1_end_to_end() {
        let server = MockServer::start().await;
        mount_oauth1_provider(&server).await;
        Mock::given(method("POST"))
            .and(path("/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "oauth_token=acc&oauth_token_secret=acc-secret&user_id=6253282&screen_name=TwitterAPI",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let auth = authenticator(FlowKind::Oauth1, &server.uri());
        let attempt = auth.start().await.unwrap();
        assert!(attempt.redirect_url().contains("/oauth/authenticate?oauth_token=req-token"));
        assert!(auth.is_in_progress());

        let callback = CallbackParams::from_query("oauth_token=req-token&oauth_verifier=v");
        let session = attempt.complete(&callback).await.unwrap();
        assert_eq!(session.identity.screen_name, "TwitterAPI");
        assert_eq!(session.issued_at_epoch_ms, 1_000);

        assert!(!auth.is_in_progress());
        assert!(auth.gate().is_signed_in().unwrap());
    }

    #[tokio::test]
    async fn test_failed_exchange_discards_attempt() {
        let server = MockServer::start().await;
        mount_oauth1_provider(&server).await;
        Mock::given(method("POST"))
            .and(path("/oauth/access_token"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let auth = authenticator(FlowKind::Oauth1, &server.uri());
        let attempt = auth.start().await.unwrap();
        let callback = CallbackParams::from_query("oauth_token=req-token&oauth_verifier=v");
        let err = attempt.complete(&callback).await.unwrap_err();

        assert_eq!(err.kind(), Some(AuthErrorKind::ProviderRejected));
        assert!(!auth.is_in_progress());
        assert!(!auth.gate().is_signed_in().unwrap());
    }

    #[tokio::test]
    async fn test_unconfirmed_callback_aborts_before_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/request_token"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "oauth_token=t&oauth_token_secret=s&oauth_callback_confirmed=false",
            ))
            .mount(&server)
            .await;

        let auth = authenticator(FlowKind::Oauth1, &server.uri());
        let err = auth.start().await.err().unwrap();
        assert_eq!(err.kind(), Some(AuthErrorKind::CallbackNotConfirmed));
        assert!(!auth.is_in_progress());
    }

    #[tokio::test]
    async fn test_double_start_makes_one_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/request_token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("oauth_token=t&oauth_token_secret=s&oauth_callback_confirmed=true")
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let auth = authenticator(FlowKind::Oauth1, &server.uri());
        let (first, second) = tokio::join!(auth.start(), auth.start());

        let attempt = first.unwrap();
        assert_eq!(second.err().and_then(|e| e.kind()), Some(AuthErrorKind::AlreadyInProgress));

        // Still rejected while the attempt is held
        let third = auth.start().await.err().unwrap();
        assert_eq!(third.kind(), Some(AuthErrorKind::AlreadyInProgress));

        drop(attempt);
        assert!(!auth.is_in_progress());
    }

    #[tokio::test]
    async fn test_abandoned_attempt_releases_guard() {
        let auth = authenticator(FlowKind::Oauth2Pkce, "http://127.0.0.1:1");
        let attempt = auth.start().await.unwrap();
        drop(attempt);
        assert!(auth.start().await.is_ok());
    }

    #[tokio::test]
    async fn test_state_mismatch_skips_token_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/oauth2/token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let auth = authenticator(FlowKind::Oauth2Pkce, &server.uri());
        let attempt = auth.start().await.unwrap();
        assert!(attempt.redirect_url().contains("code_challenge_method=S256"));

        let callback = CallbackParams::from_query("code=abc&state=forged");
        let err = attempt.complete(&callback).await.unwrap_err();
        assert_eq!(err.kind(), Some(AuthErrorKind::StateMismatch));
        assert!(!auth.gate().is_signed_in().unwrap());
    }

    #[tokio::test]
    async fn test_oauth2_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token_type": "bearer",
                "expires_in": 7200,
                "access_token": "access-1"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/2/users/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"id": "2244994945", "name": "X Dev", "username": "XDevelopers"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let auth = authenticator(FlowKind::Oauth2Pkce, &server.uri());
        let attempt = auth.start().await.unwrap();

        let redirect = url::Url::parse(attempt.redirect_url()).unwrap();
        let state = redirect
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        let callback = CallbackParams::from_query(&format!("code=abc&state={}", state));
        let session = attempt.complete(&callback).await.unwrap();
        assert_eq!(session.identity.id, "2244994945");
        assert_eq!(auth.gate().identity().unwrap().map(|i| i.screen_name), Some("XDevelopers".to_string()));
    }

    #[tokio::test]
    async fn test_logout() {
        let auth = authenticator(FlowKind::Oauth2Pkce, "http://127.0.0.1:1");
        auth.store.save(&crate::auth::store::tests::identity()).unwrap();
        assert!(auth.gate().is_signed_in().unwrap());
        auth.logout().unwrap();
        assert!(!auth.gate().is_signed_in().unwrap());
    }
}
