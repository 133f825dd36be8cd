//! Session CLI
//!
//! Sends one request to the API as the stored session:
//! 1. Loads config and restores the stored token pair
//! 2. Registers a token manager so an expired access token is refreshed
//! 3. Sends METHOD PATH (with an optional JSON body) and prints the response
//! 4. Clears the token file if the session had to be ended

mod config;
mod metrics;

use anyhow::{Context, Result, bail};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use session_auth::FileTokenStore;
use session_client::{AuthClient, SignOut};
use transport::{HttpTransport, RequestDescriptor};

use crate::config::Config;

const USAGE: &str = "usage: session-cli [--config PATH] [--data JSON] [--metrics] METHOD PATH";

/// Parsed command line
#[derive(Debug, PartialEq)]
struct Args {
    config: Option<String>,
    data: Option<String>,
    metrics: bool,
    method: String,
    path: String,
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut config = None;
        let mut data = None;
        let mut metrics = false;
        let mut positional = Vec::new();

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    config = Some(args.next().context("--config needs a value")?);
                }
                "--data" => {
                    data = Some(args.next().context("--data needs a value")?);
                }
                "--metrics" => metrics = true,
                flag if flag.starts_with("--") => bail!("unknown flag {flag}\n{USAGE}"),
                _ => positional.push(arg),
            }
        }

        let [method, path]: [String; 2] = positional
            .try_into()
            .map_err(|_| anyhow::anyhow!("expected METHOD and PATH\n{USAGE}"))?;

        Ok(Self {
            config,
            data,
            metrics,
            method,
            path,
        })
    }

    fn request(&self) -> Result<RequestDescriptor> {
        let method = reqwest::Method::from_bytes(self.method.to_ascii_uppercase().as_bytes())
            .with_context(|| format!("invalid HTTP method {}", self.method))?;
        let mut request = RequestDescriptor::new(method, self.path.clone());
        if let Some(data) = &self.data {
            let body: serde_json::Value =
                serde_json::from_str(data).context("--data must be valid JSON")?;
            request = request.with_json(body);
        }
        Ok(request)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr with LOG_LEVEL / RUST_LOG support; stdout carries the response
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let args = Args::parse(std::env::args().skip(1))?;
    let request = args.request()?;

    let prometheus = if args.metrics {
        Some(metrics::install_recorder()?)
    } else {
        None
    };

    let config_path = Config::resolve_path(args.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let token_file = config.token_file()?.to_path_buf();

    info!(
        base_url = %config.api.base_url,
        token_file = %token_file.display(),
        "configuration loaded"
    );

    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let transport = Arc::new(HttpTransport::new(
        http,
        config.api.base_url.clone(),
        config.request_timeout(),
    ));
    let store = Arc::new(FileTokenStore::new(token_file));
    let client = Arc::new(AuthClient::new(
        transport,
        store.clone(),
        config.coordinator_options(),
    ));

    if let Some(token) = &config.session.access_token {
        client.set_access_token(token.expose());
        info!("using access token from SESSION_ACCESS_TOKEN");
    } else if !client
        .restore_session()
        .await
        .context("failed to read stored session")?
    {
        info!("no stored session, sending without credentials");
    }

    let signed_out = Arc::new(AtomicBool::new(false));
    let flag = signed_out.clone();
    let sign_out: Arc<dyn SignOut> = Arc::new(move || {
        warn!("session ended, sign in again");
        flag.store(true, Ordering::SeqCst);
    });
    let registration = client.register_token_manager(sign_out);

    let outcome = client.send(request).await;
    registration.eject();

    if signed_out.load(Ordering::SeqCst) {
        client.clear_access_token();
        store
            .clear()
            .await
            .context("failed to clear stored session")?;
    }

    let succeeded = match &outcome {
        Ok(response) => {
            println!("{}", response.status);
            println!("{}", response.text());
            true
        }
        Err(e) => {
            error!(error = %e, kind = e.label(), "request failed");
            eprintln!("{e}");
            false
        }
    };

    if let Some(handle) = prometheus {
        print!("{}", handle.render());
    }

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
