//! mbox-rs: mboxrd export and archive packing for mail stores
//!
//! Walks a mail store folder hierarchy, serializes every message into
//! byte-exact mboxrd records, splits output into size-bounded files and packs
//! nested folders into a zip archive mirroring the tree.
//!
//! # Features
//!
//! - **mboxrd encoding**: From-line synthesis and reversible `>From ` quoting
//! - **Size ceilings**: output files are split between records, never inside one
//! - **Large outputs**: file contents are held in capped segments
//! - **Archives**: folder trees become zip directories, import picks the first usable entry
//!
//! # Example
//!
//! ```no_run
//! use mbox_rs::import_export::{ExportOptions, Exporter};
//! use mbox_rs::store::{ExportTarget, MaildirStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MaildirStore::new("/var/mail/alice", 100);
//!     let account = store.account().await?;
//!
//!     let exporter = Exporter::new(&store, ExportOptions::default());
//!     let (path, stats) = exporter
//!         .export_to_dir(&ExportTarget::Account(account), "/tmp/export".as_ref())
//!         .await?;
//!
//!     println!("{:?}: {} messages", path, stats.messages_exported);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration management
//! - [`error`]: Error types and handling
//! - [`import_export`]: mboxrd encoding, accumulation, archive tree and codec
//! - [`store`]: Mail store trait and adapters
//! - [`utils`]: Utility functions

pub mod config;
pub mod error;
pub mod import_export;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{ExportError, Result};
