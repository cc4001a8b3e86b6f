// Load configuration
// Set up logging
// Initialize caches, rate limiter and geocode client
// Resolve every input address, writing one JSON record per line
// Flush deferred cache writes on every exit path

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voting_geocoder::config::{Config, DEFAULT_CONFIG_FILE};
use voting_geocoder::geocode::{AddressQuery, ConsolePrompt, GeocodeError};
use voting_geocoder::AppState;

#[derive(Parser)]
#[command(name = "voting-geocoder")]
#[command(about = "Geocode polling-place addresses through a persistent cache", long_about = None)]
struct Cli {
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, help = "KEY=VALUE configuration file")]
    config: PathBuf,

    #[arg(long, help = "File with one address per line (JSON object or free text); stdin if omitted")]
    input: Option<PathBuf>,

    #[arg(long, help = "Ask on stdin when an address has several plausible matches")]
    interactive: bool,

    #[arg(long, help = "Note shown when asking, and part of the remembered answer's key")]
    comment: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    if cli.interactive && cli.input.is_none() {
        return Err("--interactive reads answers from stdin, so addresses must come from --input".into());
    }

    let config = Config::load(&cli.config)?;
    let state = AppState::init(config, Arc::new(ConsolePrompt::stdio()))?;

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let result = tokio::select! {
        result = run(&state, &cli) => result,
        _ = shutdown.cancelled() => {
            warn!("Interrupted, flushing caches before exit");
            Ok(())
        }
    };

    state.shutdown().await?;
    result
}

async fn run(state: &AppState, cli: &Cli) -> Result<(), Box<dyn Error>> {
    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &cli.input {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let mut lines = reader.lines();
    let mut stdout = tokio::io::stdout();
    let (mut resolved, mut failed) = (0usize, 0usize);

    while let Some(line) = lines.next_line().await? {
        let Some(query) = AddressQuery::parse_line(&line) else {
            continue;
        };

        match state
            .resolver
            .geocode_address(&query, cli.comment.as_deref(), cli.interactive)
            .await
        {
            Ok(geocode) => {
                let record = json!({
                    "address": geocode.query.to_string(),
                    "longitude": geocode.longitude(),
                    "latitude": geocode.latitude(),
                    "full_address": geocode.candidate.properties.full_address,
                });
                stdout.write_all(format!("{}\n", record).as_bytes()).await?;
                resolved += 1;
            }
            Err(e @ GeocodeError::Authentication(_)) => return Err(e.into()),
            Err(e) => {
                error!("Failed to geocode {}: {}", query, e);
                failed += 1;
            }
        }
    }
    stdout.flush().await?;

    info!("Resolved {} addresses, {} failed", resolved, failed);
    Ok(())
}
