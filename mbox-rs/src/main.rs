//! CLI for exporting Maildir folders to mboxrd
//!
//! # Usage
//!
//! ```bash
//! # Export a whole account (zip when it has folders)
//! mbox-export export --maildir /var/mail/alice --output ./out
//!
//! # Export one folder, splitting archive members at 100 MiB
//! mbox-export export --maildir /var/mail/alice --folder Archive/2024 --ceiling 104857600 --output ./out
//!
//! # Recover the first mbox payload of an archive
//! mbox-export import --input ./out/alice.zip --output ./first.mbox
//! ```

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use mbox_rs::config::Config;
use mbox_rs::import_export::{recover_payload, ExportOptions, Exporter};
use mbox_rs::store::{ExportTarget, MaildirStore};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mbox-export")]
#[command(about = "Export mail folders to mboxrd files and archives", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export an account or folder
    Export {
        /// Maildir root (defaults to store.maildir_path)
        #[arg(long)]
        maildir: Option<PathBuf>,
        /// Folder path such as `Archive/2024`; the whole account when omitted
        #[arg(long)]
        folder: Option<String>,
        /// Per-file size ceiling in bytes inside archives (0 = unbounded)
        #[arg(long)]
        ceiling: Option<u64>,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// Recover the first mbox payload of an exported file
    Import {
        /// Archive, gzip or mbox file
        #[arg(short, long)]
        input: PathBuf,
        /// Where to write the payload (stdout summary only when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        Config::from_file(&cli.config)?
    } else {
        Config::default()
    };
    init_logging(&config);

    match cli.command {
        Commands::Export {
            maildir,
            folder,
            ceiling,
            output,
        } => {
            let root = maildir.unwrap_or_else(|| PathBuf::from(&config.store.maildir_path));
            let store = MaildirStore::new(&root, config.store.page_size);

            let target = match folder {
                Some(path) => ExportTarget::Folder(
                    store
                        .folder(&path)
                        .await?
                        .ok_or_else(|| anyhow!("Folder {} not found in {}", path, root.display()))?,
                ),
                None => ExportTarget::Account(store.account().await?),
            };

            let mut options = ExportOptions::from(config.export.clone());
            if let Some(ceiling) = ceiling {
                options.archive_size_ceiling = ceiling;
            }

            info!("Exporting {} from {}", target.name(), root.display());
            let (path, stats) = Exporter::new(&store, options).export_to_dir(&target, &output).await?;
            match path {
                Some(path) => println!(
                    "{} ({} messages, {} files)",
                    path.display(),
                    stats.messages_exported,
                    stats.files_produced
                ),
                None => println!("Nothing to export"),
            }
        }
        Commands::Import { input, output } => {
            let data = tokio::fs::read(&input)
                .await
                .with_context(|| format!("reading {}", input.display()))?;

            let Some(payload) = recover_payload(&data, config.import.max_entry_size)? else {
                warn!("No importable entry in {}", input.display());
                println!("No importable entry found");
                return Ok(());
            };

            match output {
                Some(path) => {
                    tokio::fs::write(&path, &payload.data).await?;
                    println!("{} ({} bytes)", path.display(), payload.data.len());
                }
                None => println!(
                    "{} bytes from {}",
                    payload.data.len(),
                    payload.entry.as_deref().unwrap_or("input")
                ),
            }
        }
    }

    Ok(())
}
