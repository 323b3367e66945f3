//! mediacast-hook - Verify and ingest platform webhooks
//!
//! Answers the webhook subscription handshake and normalizes raw webhook
//! payloads into engagement events, one per line on stdout.

use std::io::{self, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use libmediacast::error::WebhookError;
use libmediacast::logging;
use libmediacast::{Config, EngagementEvent, MediacastError, Platform, Result, WebhookManager};

#[derive(Parser, Debug)]
#[command(name = "mediacast-hook")]
#[command(version)]
#[command(about = "Verify and ingest social platform webhooks")]
#[command(long_about = "\
mediacast-hook - Verify and ingest social platform webhooks

DESCRIPTION:
    mediacast-hook handles the two halves of a platform webhook:

    verify  Check the verify token a platform sends when subscribing and
            print the challenge to echo back.
    ingest  Normalize a raw webhook payload (Facebook, Instagram, TikTok or
            YouTube) into engagement events. Malformed entries are skipped
            with a warning; the rest of the payload is still emitted.

USAGE EXAMPLES:
    # Answer a subscription handshake
    mediacast-hook verify --platform facebook --token secret --challenge 1158201444

    # Normalize a payload and print one JSON event per line
    mediacast-hook ingest --platform tiktok payload.json

    # Read the payload from stdin, tab-separated output
    curl ... | mediacast-hook ingest --platform youtube --format text

CONFIGURATION:
    Configuration file: ~/.config/mediacast/config.toml
    Override with MEDIACAST_CONFIG or --config.

    [[webhooks]]
    platform = \"facebook\"
    webhook_url = \"https://example.com/hooks/facebook\"
    verify_token = \"secret\"

EXIT CODES:
    0 - Success
    1 - Verification failed
    2 - Configuration error
    3 - Invalid input (unknown platform, payload is not JSON)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    #[arg(help = "Enable verbose logging to stderr (useful for debugging)")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a subscription handshake against the configured verify token
    Verify {
        /// Platform sending the handshake
        #[arg(short, long)]
        platform: String,

        /// Token sent by the platform
        #[arg(short, long)]
        token: String,

        /// Challenge to echo back on success
        #[arg(long)]
        challenge: Option<String>,
    },

    /// Normalize a raw webhook payload into engagement events
    Ingest {
        /// Platform that sent the payload
        #[arg(short, long)]
        platform: String,

        /// Payload file (stdin when omitted or '-')
        file: Option<PathBuf>,

        /// Output format: json or text
        #[arg(short, long, default_value = "json")]
        format: String,
    },
}

fn main() {
    let cli = Cli::parse();

    logging::init_default(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load_or_default()?,
    };
    let manager = WebhookManager::from_configs(config.webhooks);

    match cli.command {
        Commands::Verify {
            platform,
            token,
            challenge,
        } => verify(&manager, platform.parse()?, &token, challenge.as_deref()),
        Commands::Ingest {
            platform,
            file,
            format,
        } => ingest(&manager, platform.parse()?, file, &format),
    }
}

fn verify(
    manager: &WebhookManager,
    platform: Platform,
    token: &str,
    challenge: Option<&str>,
) -> Result<()> {
    if !manager.verify_webhook(platform, token, challenge) {
        return Err(WebhookError::VerificationFailed { platform }.into());
    }

    println!("{}", challenge.unwrap_or("verified"));
    Ok(())
}

fn ingest(
    manager: &WebhookManager,
    platform: Platform,
    file: Option<PathBuf>,
    format: &str,
) -> Result<()> {
    let render: fn(&EngagementEvent) -> Result<String> = match format {
        "json" => render_json,
        "text" => render_text,
        other => {
            return Err(MediacastError::InvalidInput(format!(
                "Invalid format '{}'. Must be 'json' or 'text'",
                other
            )))
        }
    };

    let input = match file {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(&path).map_err(|e| {
            MediacastError::InvalidInput(format!("Failed to read {}: {}", path.display(), e))
        })?,
        _ => {
            let mut input = String::new();
            io::stdin().read_to_string(&mut input).map_err(|e| {
                MediacastError::InvalidInput(format!("Failed to read stdin: {}", e))
            })?;
            input
        }
    };

    let payload: serde_json::Value = serde_json::from_str(&input)
        .map_err(|e| MediacastError::InvalidInput(format!("Payload is not JSON: {}", e)))?;

    // Listeners run synchronously, so events print in payload order
    let subscription = manager.on(platform, move |event| {
        println!("{}", render(event)?);
        Ok(())
    });

    let report = manager.process_webhook(platform, &payload);
    subscription.unsubscribe();

    tracing::info!(
        platform = %platform,
        emitted = report.emitted,
        skipped = report.skipped,
        "ingest complete"
    );
    if report.skipped > 0 {
        eprintln!(
            "Warning: skipped {} malformed entr{} ({} emitted)",
            report.skipped,
            if report.skipped == 1 { "y" } else { "ies" },
            report.emitted
        );
    }

    Ok(())
}

fn render_json(event: &EngagementEvent) -> Result<String> {
    serde_json::to_string(event)
        .map_err(|e| MediacastError::InvalidInput(format!("Failed to serialize event: {}", e)))
}

fn render_text(event: &EngagementEvent) -> Result<String> {
    Ok(format!(
        "{}\t{}\t{}\t{}\t{}",
        event.platform,
        event.event_type,
        event.video_id,
        event.user_name,
        event.content.as_deref().unwrap_or("")
    ))
}
