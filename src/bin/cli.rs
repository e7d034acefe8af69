//! CLI for object access and offline volume maintenance

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use miniblob::common::{format_bytes, parse_duration};
use miniblob::gateway::http::GatewayWriteResponse;
use miniblob::ops::{rebuild_index, verify_volume};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "miniblob")]
#[command(about = "miniblob object store CLI")]
#[command(version)]
struct Cli {
    /// Gateway URL
    #[arg(long, default_value = "http://localhost:8000")]
    gateway: String,

    /// Request timeout, e.g. "30s"
    #[arg(long, default_value = "30s")]
    timeout: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a file, print its object id
    Put {
        /// File path
        file: PathBuf,
    },

    /// Fetch an object
    Get {
        /// Object id (`<volume-id>:<object-id>`)
        id: String,

        /// Output file (stdout if omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Check a volume's data-log against its index-log (offline)
    Verify {
        /// Data directory of the volume
        #[arg(long)]
        data: PathBuf,
    },

    /// Rewrite a volume's index-log from its data-log (offline)
    RebuildIndex {
        /// Data directory of the volume
        #[arg(long)]
        data: PathBuf,

        /// Cut unparseable bytes from the end of the data-log
        #[arg(long)]
        truncate_tail: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let gateway = cli.gateway.trim_end_matches('/').to_string();
    let http = reqwest::Client::builder()
        .timeout(parse_duration(&cli.timeout)?)
        .build()?;

    match cli.command {
        Commands::Put { file } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let size = data.len() as u64;
            let response = http
                .post(format!("{}/write", gateway))
                .header("content-type", "application/octet-stream")
                .body(data)
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                bail!("write failed: {} {}", status, response.text().await?);
            }
            let written: GatewayWriteResponse = response.json().await?;
            eprintln!("Stored {}", format_bytes(size));
            println!("{}", written.id);
        }

        Commands::Get { id, output } => {
            let response = http.get(format!("{}/read/{}", gateway, id)).send().await?;
            let status = response.status();
            if !status.is_success() {
                bail!("read failed: {} {}", status, response.text().await?);
            }
            let data = response.bytes().await?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, &data)
                        .await
                        .with_context(|| format!("writing {}", path.display()))?;
                    eprintln!("Wrote {} to {}", format_bytes(data.len() as u64), path.display());
                }
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&data)?;
                }
            }
        }

        Commands::Verify { data } => {
            let report = verify_volume(&data)?;
            println!("Verification report for volume {}:", report.volume_id);
            println!("  Records: {}", report.records);
            println!("  Indexed: {}", report.indexed);
            println!("  Orphans: {}", report.orphans.len());
            println!("  Corrupt: {}", report.corrupt.len());
            println!("  Dangling index entries: {}", report.dangling.len());
            println!("  Trailing bytes: {}", report.trailing_bytes);
            for id in &report.orphans {
                println!("  orphan  {}", id);
            }
            for id in &report.corrupt {
                println!("  corrupt {}", id);
            }
            for id in &report.dangling {
                println!("  dangling {}", id);
            }
            if !report.is_healthy() {
                bail!("volume {} is not healthy", report.volume_id);
            }
        }

        Commands::RebuildIndex {
            data,
            truncate_tail,
        } => {
            let report = rebuild_index(&data, truncate_tail)?;
            println!("Rebuilt index-log of volume {}:", report.volume_id);
            println!("  Entries: {}", report.entries);
            println!("  Skipped corrupt: {}", report.skipped_corrupt);
            println!("  Truncated bytes: {}", report.truncated_bytes);
        }
    }

    Ok(())
}
