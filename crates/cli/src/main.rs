//! clipdock CLI - upload videos to a clipdock daemon and inspect what it stored

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clipdock_sdk::producer::{self, ProducerConfig, DEFAULT_PRODUCERS};
use clipdock_sdk::{ClipdockClient, MediaItem, UploadResult};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use tabled::{Table, Tabled};
use tracing_subscriber::EnvFilter;

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:50051";

#[derive(Parser)]
#[command(name = "clipdock")]
#[command(about = "clipdock upload CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "CLIPDOCK_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload one file
    Upload {
        /// Video file to upload
        file: PathBuf,

        /// Producer label shown in daemon logs
        #[arg(short, long, default_value = "cli")]
        source_id: String,
    },

    /// Upload every video in a set of folders with concurrent producers
    Produce {
        /// Folders to scan (comma-separated in the environment)
        #[arg(short, long = "folder", env = "CLIPDOCK_FOLDERS", value_delimiter = ',', required = true)]
        folders: Vec<PathBuf>,

        /// Number of producer tasks
        #[arg(short, long, env = "PRODUCER_THREADS", default_value_t = DEFAULT_PRODUCERS)]
        producers: usize,

        /// Delay between upload starts within one producer
        #[arg(long, env = "BATCH_DELAY_MS", default_value = "250")]
        stagger_ms: u64,
    },

    /// List stored videos
    List,

    /// Show daemon status
    Status,
}

#[derive(Tabled)]
struct MediaRow {
    filename: String,
    size: String,
    content_type: String,
    url: String,
}

impl From<MediaItem> for MediaRow {
    fn from(item: MediaItem) -> Self {
        Self {
            filename: item.filename,
            size: format_size(item.size_bytes),
            content_type: item.content_type,
            url: item.url,
        }
    }
}

fn format_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let bytes_f = bytes as f64;
    if bytes_f >= KIB * KIB {
        format!("{:.1} MiB", bytes_f / (KIB * KIB))
    } else if bytes_f >= KIB {
        format!("{:.1} KiB", bytes_f / KIB)
    } else {
        format!("{} B", bytes)
    }
}

fn print_result(label: &str, result: &UploadResult) {
    if result.accepted {
        println!("{} {} ({})", "✓".green().bold(), label, result.message);
        if let Some(path) = &result.stored_path {
            println!("  {} {}", "Stored as:".bold(), path);
        }
    } else {
        println!("{} {} ({})", "✗".red().bold(), label, result.message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let client = ClipdockClient::connect(&cli.rpc_url)
        .await
        .context("Failed to create client")?;

    match cli.command {
        Commands::Upload { file, source_id } => {
            let result = client
                .upload_file(&file, source_id)
                .await
                .with_context(|| format!("Upload of {} failed", file.display()))?;
            print_result(&file.display().to_string(), &result);
        }

        Commands::Produce {
            folders,
            producers,
            stagger_ms,
        } => {
            let config = ProducerConfig {
                folders,
                producers,
                stagger: Duration::from_millis(stagger_ms),
            };
            let reports = producer::run(&client, &config).await?;

            let mut accepted = 0;
            let mut dropped = 0;
            let mut errors = 0;
            for report in &reports {
                let label = format!("[{}] {}", report.source_id, report.path.display());
                match &report.outcome {
                    Ok(result) => {
                        if result.accepted {
                            accepted += 1;
                        } else {
                            dropped += 1;
                        }
                        print_result(&label, result);
                    }
                    Err(e) => {
                        errors += 1;
                        println!("{} {} ({})", "✗".red().bold(), label, e);
                    }
                }
            }

            println!();
            println!(
                "{} {} accepted, {} dropped, {} errors",
                "All producers completed:".cyan().bold(),
                accepted,
                dropped,
                errors
            );
        }

        Commands::List => {
            let items = client.list_media().await?;
            if items.is_empty() {
                println!("{}", "No videos stored yet".yellow());
            } else {
                let rows: Vec<MediaRow> = items.into_iter().map(MediaRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }

        Commands::Status => {
            println!("{}", "System Status".cyan().bold());
            println!();

            match client.stats().await {
                Ok(stats) => {
                    let queue = stats.queue;
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!();
                    println!(
                        "  {} {}/{}",
                        "Pending:".bold(),
                        queue.pending,
                        queue.max_pending
                    );
                    println!(
                        "  {} {}/{}",
                        "Active:".bold(),
                        queue.active,
                        queue.concurrency
                    );
                    println!("  {} {}", "Admitted:".bold(), queue.admitted);
                    println!("  {} {}", "Rejected:".bold(), queue.rejected);
                    println!("  {} {}", "Succeeded:".bold(), queue.succeeded);
                    println!("  {} {}", "Failed:".bold(), queue.failed);
                    println!("  {} {}", "Open streams:".bold(), stats.open_streams);
                    println!();
                    println!("  {} {} seconds", "Uptime:".bold(), stats.uptime_seconds);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }
    }

    Ok(())
}
