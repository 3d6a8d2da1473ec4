//! OAuth callback server
//!
//! A temporary local HTTP server that captures the provider's redirect
//! (`oauth_token`/`oauth_verifier` or `code`/`state`) from the browser.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use url::Url;
use crate::Result;
use crate::error::{AuthErrorKind, Error};
use super::callback::CallbackParams;

/// Upper bound on the request line plus headers we are willing to read
const MAX_REQUEST_BYTES: u64 = 16 * 1024;

/// Success HTML page shown after authorization
const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Signed in</title>
    <style>
        body {
            background-color: #0b0e14;
            color: #e2e8f0;
            font-family: -apple-system, system-ui, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            text-align: center;
        }
        h1 { font-size: 24px; margin: 0 0 12px; color: #1d9bf0; }
        p { font-size: 15px; color: #94a3b8; line-height: 1.6; }
    </style>
</head>
<body>
    <div>
        <h1>Authorization received</h1>
        <p>You can close this window and return to your terminal.</p>
    </div>
</body>
</html>"#;

/// Error HTML page
const ERROR_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Sign-in failed</title>
    <style>
        body {
            background-color: #0b0e14;
            color: #e2e8f0;
            font-family: -apple-system, system-ui, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            text-align: center;
        }
        h1 { font-size: 24px; margin: 0 0 12px; color: #ef4444; }
        p { font-size: 15px; color: #94a3b8; line-height: 1.6; }
    </style>
</head>
<body>
    <div>
        <h1>Sign-in failed</h1>
        <p>The authorization was declined or incomplete.<br>Please try again from your terminal.</p>
    </div>
</body>
</html>"#;

/// A bound listener waiting for one provider redirect
pub struct CallbackListener {
    listener: TcpListener,
    path: String,
}

impl CallbackListener {
    /// Bind to the host and port of the configured callback URL
    pub async fn bind(callback_url: &str) -> Result<Self> {
        let url = Url::parse(callback_url)
            .map_err(|e| Error::Config(format!("Invalid callback URL {}: {}", callback_url, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::Config(format!("Callback URL has no host: {}", callback_url)))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::Config(format!("Callback URL has no port: {}", callback_url)))?;

        let addr = format!("{}:{}", host.trim_start_matches('[').trim_end_matches(']'), port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to start callback server on {}: {}", addr, e)))?;

        tracing::info!("Callback server listening on http://{}", addr);

        Ok(Self {
            listener,
            path: url.path().to_string(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Wait for the provider redirect, bounded by `deadline`
    ///
    /// Requests for other paths (favicon probes and the like) get a 404 and
    /// waiting continues.
    pub async fn wait(self, deadline: Duration) -> Result<CallbackParams> {
        match tokio::time::timeout(deadline, self.accept_redirect()).await {
            Ok(result) => result,
            Err(_) => Err(Error::auth(
                AuthErrorKind::Timeout,
                format!("No authorization callback within {}s", deadline.as_secs()),
            )),
        }
    }

    async fn accept_redirect(&self) -> Result<CallbackParams> {
        loop {
            let (mut socket, peer) = self.listener.accept().await?;
            tracing::debug!(%peer, "Callback connection");

            let request = match read_request(&mut socket).await {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!("Failed to read callback request: {}", e);
                    continue;
                }
            };

            let on_path = request_path(&request).map(|p| p == self.path).unwrap_or(false);
            let params = CallbackParams::from_request(&request).unwrap_or_default();

            if !on_path || !params.is_provider_redirect() {
                respond(&mut socket, "404 Not Found", "").await;
                continue;
            }

            let (status, body) = if params.is_success() {
                ("200 OK", SUCCESS_HTML)
            } else {
                ("400 Bad Request", ERROR_HTML)
            };
            respond(&mut socket, status, body).await;

            return Ok(params);
        }
    }
}

/// Read the request line, then drain headers up to the blank line
async fn read_request(socket: &mut TcpStream) -> std::io::Result<String> {
    let mut reader = BufReader::new((&mut *socket).take(MAX_REQUEST_BYTES));

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    let mut header = String::new();
    loop {
        header.clear();
        let n = reader.read_line(&mut header).await?;
        if n == 0 || header == "\r\n" || header == "\n" {
            break;
        }
    }

    Ok(request_line)
}

fn request_path(request: &str) -> Option<&str> {
    let target = request.lines().next()?.split_whitespace().nth(1)?;
    Some(target.split('?').next().unwrap_or(target))
}

async fn respond(socket: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );

    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}
