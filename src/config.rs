//! Configuration management
//!
//! Provider credentials are never baked in: they come from
//! `~/.xsignin/config.json` and/or the environment, and [`Config::validate`]
//! refuses placeholder values.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;
use crate::Result;
use crate::auth::PkceMethod;
use crate::error::Error;

/// Which sign-in protocol to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowKind {
    /// OAuth 1.0a three-legged flow
    #[serde(alias = "oauth1a")]
    Oauth1,
    /// OAuth 2.0 authorization code with PKCE
    #[serde(alias = "oauth2")]
    Oauth2Pkce,
}

impl std::str::FromStr for FlowKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oauth1" | "oauth1a" => Ok(FlowKind::Oauth1),
            "oauth2" | "oauth2-pkce" => Ok(FlowKind::Oauth2Pkce),
            other => Err(Error::Config(format!("Unknown flow: {}", other))),
        }
    }
}

impl std::fmt::Display for FlowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowKind::Oauth1 => f.write_str("oauth1"),
            FlowKind::Oauth2Pkce => f.write_str("oauth2-pkce"),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Protocol used by `login`
    #[serde(default = "default_flow")]
    pub flow: FlowKind,

    /// OAuth 1.0a consumer credentials
    #[serde(default)]
    pub oauth1: OAuth1Config,

    /// OAuth 2.0 client registration
    #[serde(default)]
    pub oauth2: OAuth2Config,

    /// Provider base URLs
    #[serde(default)]
    pub endpoints: Endpoints,

    /// Deadline for each network step, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// How long `login` waits for the browser redirect, in seconds
    #[serde(default = "default_callback_wait_secs")]
    pub callback_wait_secs: u64,

    /// Where the signed-in session is persisted
    #[serde(default)]
    pub session_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuth1Config {
    #[serde(default)]
    pub consumer_key: String,

    #[serde(default)]
    pub consumer_secret: String,

    #[serde(default = "default_callback_url")]
    pub callback_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Config {
    #[serde(default)]
    pub client_id: String,

    /// Confidential clients authenticate to the token endpoint with HTTP Basic
    #[serde(default)]
    pub client_secret: Option<String>,

    #[serde(default = "default_callback_url")]
    pub redirect_url: String,

    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    #[serde(default)]
    pub challenge_method: PkceMethod,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            redirect_url: default_callback_url(),
            scopes: default_scopes(),
            challenge_method: PkceMethod::default(),
        }
    }
}

/// Provider base URLs; overridable so tests can point at a mock server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoints {
    /// API host (token endpoints, profile endpoints)
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Host serving the OAuth 2.0 consent page
    #[serde(default = "default_web_base")]
    pub web_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            web_base: default_web_base(),
        }
    }
}

impl Endpoints {
    pub fn request_token_url(&self) -> String {
        join_url(&self.api_base, "/oauth/request_token")
    }

    pub fn authenticate_url(&self) -> String {
        join_url(&self.api_base, "/oauth/authenticate")
    }

    pub fn access_token_url(&self) -> String {
        join_url(&self.api_base, "/oauth/access_token")
    }

    pub fn verify_credentials_url(&self) -> String {
        join_url(&self.api_base, "/1.1/account/verify_credentials.json")
    }

    pub fn authorize_url(&self) -> String {
        join_url(&self.web_base, "/i/oauth2/authorize")
    }

    pub fn token_url(&self) -> String {
        join_url(&self.api_base, "/2/oauth2/token")
    }

    pub fn users_me_url(&self) -> String {
        join_url(&self.api_base, "/2/users/me")
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

fn default_flow() -> FlowKind {
    FlowKind::Oauth1
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_callback_wait_secs() -> u64 {
    300
}

fn default_callback_url() -> String {
    "http://127.0.0.1:8085/callback".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["tweet.read".to_string(), "users.read".to_string()]
}

fn default_api_base() -> String {
    "https://api.twitter.com".to_string()
}

fn default_web_base() -> String {
    "https://twitter.com".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            flow: default_flow(),
            oauth1: OAuth1Config {
                callback_url: default_callback_url(),
                ..Default::default()
            },
            oauth2: OAuth2Config::default(),
            endpoints: Endpoints::default(),
            timeout_secs: default_timeout_secs(),
            callback_wait_secs: default_callback_wait_secs(),
            session_path: None,
        }
    }
}

impl Config {
    /// Per-step network deadline
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Deadline for the browser redirect to arrive
    pub fn callback_wait(&self) -> Duration {
        Duration::from_secs(self.callback_wait_secs)
    }

    /// Resolved session file location
    pub fn session_file(&self) -> PathBuf {
        self.session_path
            .clone()
            .unwrap_or_else(|| config_dir().join("session.json"))
    }

    /// Overlay values from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Overlay values from an arbitrary lookup (used by tests)
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("TWITTER_CONSUMER_KEY") {
            self.oauth1.consumer_key = v;
        }
        if let Some(v) = get("TWITTER_CONSUMER_SECRET") {
            self.oauth1.consumer_secret = v;
        }
        if let Some(v) = get("TWITTER_CALLBACK_URL") {
            self.oauth1.callback_url = v;
        }
        if let Some(v) = get("TWITTER_CLIENT_ID") {
            self.oauth2.client_id = v;
        }
        if let Some(v) = get("TWITTER_CLIENT_SECRET") {
            self.oauth2.client_secret = Some(v);
        }
        if let Some(v) = get("TWITTER_REDIRECT_URL") {
            self.oauth2.redirect_url = v;
        }
        if let Some(v) = get("XSIGNIN_FLOW") {
            match v.parse() {
                Ok(flow) => self.flow = flow,
                Err(e) => tracing::warn!("Ignoring XSIGNIN_FLOW: {}", e),
            }
        }
    }

    /// Check that the active flow has everything it needs
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be positive".to_string()));
        }
        match self.flow {
            FlowKind::Oauth1 => {
                require("oauth1.consumer_key", &self.oauth1.consumer_key)?;
                require("oauth1.consumer_secret", &self.oauth1.consumer_secret)?;
                require_url("oauth1.callback_url", &self.oauth1.callback_url)?;
            }
            FlowKind::Oauth2Pkce => {
                require("oauth2.client_id", &self.oauth2.client_id)?;
                if let Some(secret) = &self.oauth2.client_secret {
                    require("oauth2.client_secret", secret)?;
                }
                require_url("oauth2.redirect_url", &self.oauth2.redirect_url)?;
                if self.oauth2.scopes.is_empty() {
                    return Err(Error::Config("oauth2.scopes must not be empty".to_string()));
                }
            }
        }
        require_url("endpoints.api_base", &self.endpoints.api_base)?;
        require_url("endpoints.web_base", &self.endpoints.web_base)?;
        Ok(())
    }
}

fn require(name: &str, value: &str) -> Result<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::Config(format!("{} is not set", name)));
    }
    if value.starts_with("YOUR_") {
        return Err(Error::Config(format!("{} still holds a placeholder value", name)));
    }
    Ok(())
}

fn require_url(name: &str, value: &str) -> Result<()> {
    require(name, value)?;
    Url::parse(value)
        .map(|_| ())
        .map_err(|e| Error::Config(format!("{} is not a valid URL: {}", name, e)))
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".xsignin")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration from file (if present) and the environment
pub fn load() -> Result<Config> {
    let mut config = load_file(&config_path())?;
    config.apply_env();
    Ok(config)
}

/// Load a config file, falling back to defaults when it does not exist
pub fn load_file(path: &PathBuf) -> Result<Config> {
    if !path.exists() {
        tracing::debug!("No config at {:?}, using defaults", path);
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save(config: &Config) -> Result<()> {
    save_to(config, &config_path())
}

pub fn save_to(config: &Config, path: &PathBuf) -> Result<()> {
    // Create parent directory
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;

    // Secrets live in here
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

/// Interactive setup wizard
pub fn onboard() -> Result<()> {
    use crate::ui;
    use inquire::{Confirm, Password, Select, Text};

    ui::print_banner("Setup Wizard");
    println!("  Register an app at https://developer.twitter.com and keep its keys at hand.\n");

    let mut config = load_file(&config_path())?;

    let flows = vec!["OAuth 1.0a (consumer key + secret)", "OAuth 2.0 with PKCE (client id)"];
    let choice = Select::new("Which sign-in flow should be used?", flows)
        .prompt()
        .map_err(prompt_failed)?;

    if choice.starts_with("OAuth 1.0a") {
        config.flow = FlowKind::Oauth1;
        config.oauth1.consumer_key = Text::new("Consumer key:").prompt().map_err(prompt_failed)?;
        config.oauth1.consumer_secret = Password::new("Consumer secret:")
            .without_confirmation()
            .prompt()
            .map_err(prompt_failed)?;
        config.oauth1.callback_url = Text::new("Callback URL:")
            .with_default(&config.oauth1.callback_url)
            .prompt()
            .map_err(prompt_failed)?;
    } else {
        config.flow = FlowKind::Oauth2Pkce;
        config.oauth2.client_id = Text::new("Client ID:").prompt().map_err(prompt_failed)?;
        let confidential = Confirm::new("Is this a confidential client (has a client secret)?")
            .with_default(false)
            .prompt()
            .map_err(prompt_failed)?;
        config.oauth2.client_secret = if confidential {
            Some(
                Password::new("Client secret:")
                    .without_confirmation()
                    .prompt()
                    .map_err(prompt_failed)?,
            )
        } else {
            None
        };
        config.oauth2.redirect_url = Text::new("Redirect URL:")
            .with_default(&config.oauth2.redirect_url)
            .prompt()
            .map_err(prompt_failed)?;
    }

    config.validate()?;

    ui::print_thinking("Saving configuration");
    save(&config)?;
    ui::print_success(&format!("Saved to {:?}", config_path()));
    ui::print_step("Run 'xsignin login' to sign in.");

    Ok(())
}

fn prompt_failed(e: inquire::InquireError) -> Error {
    Error::Config(format!("Prompt failed: {}", e))
}
