//! xsignin CLI entry point

use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;
use xsignin::auth::callback_server::CallbackListener;
use xsignin::auth::signature::{base_string, generate_nonce, generate_timestamp};
use xsignin::auth::{Authenticator, CredentialStore, SessionGate, SignatureSigner};
use xsignin::ui;

#[derive(Parser)]
#[command(name = "xsignin")]
#[command(about = "Sign in with X over OAuth 1.0a or OAuth 2.0 PKCE")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure app credentials interactively
    Onboard,

    /// Sign in through the browser
    Login {
        /// Override the configured flow (oauth1 | oauth2-pkce)
        #[arg(long)]
        flow: Option<String>,

        /// Print the authorization URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Forget the signed-in user
    Logout,

    /// Show who is signed in
    Status,

    /// Print the OAuth 1.0a base string, signature and header for a request
    Sign {
        /// HTTP method
        #[arg(short, long, default_value = "POST")]
        method: String,

        /// Request URL (query parameters are signed too)
        #[arg(short, long)]
        url: String,

        /// Extra parameter as name=value; repeatable
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Token secret for user-context requests
        #[arg(long)]
        token_secret: Option<String>,

        /// Fixed nonce (defaults to a fresh one)
        #[arg(long)]
        nonce: Option<String>,

        /// Fixed timestamp in seconds (defaults to now)
        #[arg(long)]
        timestamp: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Onboard => {
            xsignin::config::onboard()?;
        }

        Commands::Login { flow, no_browser } => {
            if let Err(e) = run_login(flow, no_browser).await {
                tracing::debug!("Login error detail: {}", e);
                ui::print_error("Sign-in failed, please try again.");
                if let xsignin::Error::Config(msg) = &e {
                    ui::print_step(msg);
                }
                std::process::exit(1);
            }
        }

        Commands::Logout => {
            let config = xsignin::config::load()?;
            session_gate(&config).logout()?;
            ui::print_success("Logged out");
        }

        Commands::Status => {
            let config = xsignin::config::load()?;
            run_status(&config)?;
        }

        Commands::Sign { method, url, params, token_secret, nonce, timestamp } => {
            let config = xsignin::config::load()?;
            run_sign(&config, &method, &url, &params, token_secret.as_deref(), nonce, timestamp)?;
        }
    }

    Ok(())
}

async fn run_login(flow: Option<String>, no_browser: bool) -> xsignin::Result<()> {
    let mut config = xsignin::config::load()?;
    if let Some(flow) = flow {
        config.flow = flow.parse()?;
    }

    let authenticator = Authenticator::from_config(&config)?;
    if let Some(identity) = authenticator.gate().identity()? {
        ui::print_step(&format!(
            "Already signed in as @{}; run 'xsignin logout' first to switch accounts",
            identity.screen_name
        ));
        return Ok(());
    }

    ui::print_banner(&format!("Login ({})", config.flow));

    // Listen before redirecting so the callback cannot arrive first
    let listener = CallbackListener::bind(authenticator.flow().callback_url()).await?;

    let attempt = authenticator.start().await?;
    let url = attempt.redirect_url().to_string();

    if no_browser {
        ui::print_step("Open this URL to authorize:");
        println!("\n{}\n", url);
    } else {
        ui::print_step("Opening browser for authorization...");
        println!("If the browser doesn't open, visit this URL:\n{}\n", url);
        if let Err(e) = open::that(&url) {
            tracing::debug!("open::that failed: {}", e);
            ui::print_warning("Could not open a browser; use the URL above");
        }
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("  {spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Waiting for authorization...");
    spinner.enable_steady_tick(Duration::from_millis(120));

    let callback = listener.wait(config.callback_wait()).await;
    spinner.finish_and_clear();

    let session = attempt.complete(&callback?).await?;
    ui::print_success(&format!(
        "Signed in as {} (@{})",
        session.identity.display_name, session.identity.screen_name
    ));
    ui::print_step(&format!("Session saved to {:?}", config.session_file()));

    Ok(())
}

/// Gate over the configured session file, without requiring app credentials
fn session_gate(config: &xsignin::config::Config) -> SessionGate {
    SessionGate::new(Arc::new(CredentialStore::file(config.session_file())))
}

fn run_status(config: &xsignin::config::Config) -> xsignin::Result<()> {
    let gate = session_gate(config);

    println!("Flow: {}", config.flow);
    match config.validate() {
        Ok(()) => println!("Credentials: ✓"),
        Err(e) => println!("Credentials: {} (run 'xsignin onboard')", e),
    }

    match (gate.identity()?, gate.remaining_ms()?) {
        (Some(identity), Some(remaining)) => {
            println!("Signed in: @{} ({})", identity.screen_name, identity.display_name);
            println!("Session expires in: {}", ui::format_remaining(remaining));
        }
        _ => println!("Signed in: no (run 'xsignin login')"),
    }

    Ok(())
}

fn run_sign(
    config: &xsignin::config::Config,
    method: &str,
    url: &str,
    params: &[String],
    token_secret: Option<&str>,
    nonce: Option<String>,
    timestamp: Option<String>,
) -> xsignin::Result<()> {
    if config.oauth1.consumer_key.is_empty() || config.oauth1.consumer_secret.is_empty() {
        return Err(xsignin::Error::Config(
            "Set TWITTER_CONSUMER_KEY and TWITTER_CONSUMER_SECRET (or run 'xsignin onboard')".to_string(),
        ));
    }

    let extra: Vec<(&str, &str)> = params
        .iter()
        .map(|p| {
            p.split_once('=').ok_or_else(|| {
                xsignin::Error::Config(format!("Parameter must be name=value: {}", p))
            })
        })
        .collect::<xsignin::Result<_>>()?;

    let nonce = nonce.unwrap_or_else(generate_nonce);
    let timestamp = timestamp.unwrap_or_else(generate_timestamp);

    let signer = SignatureSigner::new(&config.oauth1.consumer_key, &config.oauth1.consumer_secret);
    let all = signer.oauth_params(&nonce, &timestamp, &extra);

    println!("Base string:\n{}\n", base_string(method, url, &all)?);
    println!("Signature:\n{}\n", signer.sign(method, url, &all, token_secret)?);
    println!(
        "Authorization:\n{}",
        signer.authorization_header_with(method, url, &extra, token_secret, &nonce, &timestamp)?
    );

    Ok(())
}
