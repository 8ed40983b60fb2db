use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};

use bridgesim::{IngressHandler, SimConfig};

#[derive(Parser)]
#[command(
    name = "bridgesim",
    version,
    about = "Simulate packet forwarding over a precomputed spanning tree"
)]
struct Cli {
    /// Path to a YAML or JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read newline-delimited envelopes from this file instead of stdin
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Log level, overriding the configuration file
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match SimConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load config from {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => SimConfig::default(),
    };

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.simulation.log_level.clone());
    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        bridgesim::init_logging_json(&level);
    } else {
        bridgesim::init_logging(&level);
    }

    let handler = IngressHandler::new(config);
    let result = match &cli.input {
        Some(path) => match tokio::fs::File::open(path).await {
            Ok(file) => serve(&handler, BufReader::new(file)).await,
            Err(e) => {
                tracing::error!("failed to open {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => serve(&handler, BufReader::new(tokio::io::stdin())).await,
    };

    match result {
        Ok(count) => {
            tracing::info!(envelopes = count, "input exhausted");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("i/o failure: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Answers every non-empty line of `reader` with one reply line on stdout.
async fn serve<R>(handler: &IngressHandler, reader: R) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stdout = tokio::io::stdout();
    let mut count = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        count += 1;

        let reply = handler.handle_line(&line).await;
        let json = reply
            .to_json_line()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        stdout.write_all(json.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    Ok(count)
}
