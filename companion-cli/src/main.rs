//! Companion remote-control CLI — entry point.
//!
//! ```text
//! companion-cli <SHARE_URL>                          Pair and hold the session
//! companion-cli <SHARE_URL> -x GetModifyKeyString    Send one command, print reply
//! companion-cli --gen-config                         Dump default config and exit
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use companion_core::{decode_config, Command, Session};

mod config;
use config::CliConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "companion-cli", about = "Remote control for a paired canvas application")]
struct Cli {
    /// Share URL from the QR code.
    share_url: Option<String>,

    /// Command to send after authenticating.
    #[arg(short = 'x', long)]
    command: Option<String>,

    /// JSON detail payload for --command.
    #[arg(short, long)]
    detail: Option<String>,

    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "companion-cli.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&CliConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let config = CliConfig::load(&cli.config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("companion-cli v{}", env!("CARGO_PKG_VERSION"));

    let share_url = cli.share_url.ok_or("missing share URL argument")?;

    // ── 1. Decode the share URL ─────────────────────────────────

    let pairing = decode_config(&share_url)?;
    info!(generation = %pairing.generation, endpoints = ?pairing.endpoints, "decoded share URL");

    // ── 2. Connect and authenticate ─────────────────────────────

    let session = Session::connect(&pairing.endpoints, pairing.port, pairing.generation.clone()).await?;
    info!(remote_addr = %session.remote_addr(), "connected");

    session.authenticate(&pairing.password).await?;

    // ── 3. One-off command, or hold the session ─────────────────

    if let Some(name) = cli.command {
        let command = Command::from(name.as_str());
        let detail: Option<serde_json::Value> = match cli.detail.as_deref() {
            Some(text) => Some(serde_json::from_str(text)?),
            None => None,
        };
        let deadline = Duration::from_millis(config.network.request_timeout_ms);
        let reply = match tokio::time::timeout(
            deadline,
            session.request(command.clone(), detail.clone()),
        )
        .await
        .map_err(|_| "command timed out")?
        {
            Ok(reply) => reply,
            // A reset boundary cancelled the command; the session
            // recovers on its own, so try once more.
            Err(e) if e.is_reset() => {
                info!("command interrupted by a session reset; retrying");
                tokio::time::timeout(deadline, session.request(command, detail))
                    .await
                    .map_err(|_| "command timed out")??
            }
            Err(e) => return Err(e.into()),
        };
        println!("{}", serde_json::to_string_pretty(&reply.to_json())?);
    } else {
        info!("session alive; press Ctrl-C to quit");
        tokio::signal::ctrl_c().await?;
    }

    session.close();
    Ok(())
}
