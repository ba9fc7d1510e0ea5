use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use notsofast::{LimiterConfig, TokenBucketLimiter};

/// Rate limit namespaces read from stdin, one per line.
#[derive(Parser, Debug)]
#[command(name = "notsofast", version, about)]
struct Args {
    /// Configuration file with `threshold` and `ttl` (YAML, JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum operations per namespace per window (overrides the file)
    #[arg(short, long)]
    threshold: Option<u64>,

    /// Window length in seconds (overrides the file)
    #[arg(long)]
    ttl: Option<f64>,

    /// Only check for a token instead of consuming one
    #[arg(long)]
    peek: bool,

    /// Print one JSON object per decision
    #[arg(long)]
    json: bool,
}

/// Decision for one input line.
#[derive(Debug, Serialize)]
struct Decision<'a> {
    namespace: &'a str,
    allowed: bool,
    remaining: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Decisions go to stdout, logs to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    info!("Starting notsofast");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?;
    info!(
        threshold = config.threshold(),
        window = ?config.window(),
        "Configuration loaded"
    );

    let limiter = TokenBucketLimiter::new(config)?;

    tokio::select! {
        result = run(&limiter, &args) => result?,
        _ = shutdown_signal() => {}
    }

    info!("notsofast stopped");
    Ok(())
}

/// Merge the optional config file with command line overrides.
fn load_config(args: &Args) -> anyhow::Result<LimiterConfig> {
    let file = args
        .config
        .as_ref()
        .map(LimiterConfig::from_file)
        .transpose()?;

    let threshold = args
        .threshold
        .or(file.map(|c| c.threshold()))
        .context("missing threshold: pass --threshold or --config")?;
    let ttl = args
        .ttl
        .or(file.map(|c| c.window().as_secs_f64()))
        .context("missing ttl: pass --ttl or --config")?;

    Ok(LimiterConfig::new(threshold, ttl)?)
}

/// Answer each stdin line until EOF.
async fn run(limiter: &TokenBucketLimiter, args: &Args) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let namespace = line.trim();

        let allowed = if args.peek {
            limiter.has_token(namespace).await
        } else {
            limiter.consume(namespace).await
        }
        .is_ok();

        debug!(namespace = %namespace, allowed, "Decision");

        let output = if args.json {
            serde_json::to_string(&Decision {
                namespace,
                allowed,
                remaining: limiter.remaining(namespace),
            })?
        } else {
            format!("{} {}", if allowed { "allow" } else { "deny" }, namespace)
        };

        stdout.write_all(output.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
