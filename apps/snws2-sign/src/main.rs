//! snws2-sign - compute SNWS2 headers for a SolarNetwork API request.
//!
//! Credentials are read from the environment; the request is described on the
//! command line. The computed headers are printed one per line, ready to be
//! passed to an HTTP client.
//!
//! # Usage
//!
//! ```text
//! SN_TOKEN=... SN_TOKEN_SECRET=... snws2-sign \
//!     'https://data.solarnetwork.net/solarquery/api/v1/sec/datum/list?nodeId=123'
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SN_TOKEN` | *(required)* | Security token ID |
//! | `SN_TOKEN_SECRET` | *(required)* | Security token secret |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use snws2_auth::{AuthorizationResult, SigningConfig, SigningContext};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "snws2-sign")]
#[command(about = "Compute SNWS2 authorization headers for a request")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Absolute request URL, including any query string.
    url: String,

    /// HTTP method.
    #[arg(short, long, default_value = "GET")]
    method: String,

    /// Request content type.
    #[arg(short = 't', long)]
    content_type: Option<String>,

    /// Request body.
    #[arg(short, long)]
    body: Option<String>,

    /// Signing date as RFC 3339 (defaults to now).
    #[arg(short, long)]
    date: Option<String>,

    /// Also print the canonical request and signing message.
    #[arg(short, long)]
    verbose: bool,
}

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .with_context(|| format!("invalid RFC 3339 date: {value}"))
}

fn print_headers(auth: &AuthorizationResult, verbose: bool) {
    println!("Authorization: {}", auth.header_value);
    println!("X-SN-Date: {}", auth.date_header_value);
    if let Some(digest) = &auth.digest_header_value {
        println!("Digest: {digest}");
    }
    if verbose {
        println!();
        println!("--- canonical request ---");
        println!("{}", auth.canonical_request_message);
        println!("--- signing message ---");
        println!("{}", auth.signing_message);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = SigningConfig::from_env();
    init_tracing(&config.log_level)?;

    let credentials = config
        .credentials()
        .context("SN_TOKEN and SN_TOKEN_SECRET must be set")?;
    let date = args.date.as_deref().map(parse_date).transpose()?;

    info!(
        token_id = %credentials.token_id(),
        method = %args.method,
        url = %args.url,
        "signing request"
    );

    let ctx = SigningContext::new(credentials);
    let auth = ctx
        .compute_authorization(
            &args.url,
            Some(args.method.as_str()),
            args.body.as_deref(),
            args.content_type.as_deref(),
            date,
        )
        .context("failed to sign request")?;

    print_headers(&auth, args.verbose);
    Ok(())
}
