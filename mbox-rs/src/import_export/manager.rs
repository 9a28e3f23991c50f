//! Export manager
//!
//! Chooses between the flat mbox shortcut (target without subfolders) and the
//! archive path, and writes results either to memory or to a file that only
//! appears once it is complete.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

use super::accumulator::MboxFile;
use super::archive::{serialize, write_archive};
use super::tree::{collect_mbox_files, sanitize_entry_name, ExportNode, TreeBuilder};
use super::types::{ExportFormat, ExportOutput, ExportStats};
use crate::config::ExportConfig;
use crate::error::{ExportError, Result};
use crate::store::{ExportTarget, MailStore};
use crate::utils::readable_size;

/// Export settings
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Per-file ceiling inside archives, 0 = unbounded
    pub archive_size_ceiling: u64,
    /// Deflate level, 0 stores entries uncompressed
    pub compression_level: i64,
    pub segment_size: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportConfig::default().into()
    }
}

impl From<ExportConfig> for ExportOptions {
    fn from(config: ExportConfig) -> Self {
        Self {
            archive_size_ceiling: config.archive_size_ceiling,
            compression_level: config.compression_level,
            segment_size: config.segment_size,
        }
    }
}

/// Built but not yet serialized export
enum Prepared {
    Empty,
    Flat(MboxFile),
    Tree(ExportNode),
}

pub struct Exporter<'a, S: MailStore + ?Sized> {
    store: &'a S,
    options: ExportOptions,
}

impl<'a, S: MailStore + ?Sized> Exporter<'a, S> {
    pub fn new(store: &'a S, options: ExportOptions) -> Self {
        Self { store, options }
    }

    /// Export into memory
    pub async fn export(&self, target: &ExportTarget) -> Result<(ExportOutput, ExportStats)> {
        let started = Instant::now();
        let (prepared, stats) = self.prepare(target).await?;
        let name = sanitize_entry_name(target.name());

        let output = match prepared {
            Prepared::Empty => ExportOutput::Empty,
            Prepared::Flat(file) => ExportOutput::Mbox {
                file_name: output_file_name(&name, ExportFormat::Mbox),
                data: file,
            },
            Prepared::Tree(node) => {
                let level = self.options.compression_level;
                let data = tokio::task::spawn_blocking(move || serialize(&node, level))
                    .await
                    .map_err(|e| ExportError::Task(e.to_string()))??;
                ExportOutput::Archive {
                    file_name: output_file_name(&name, ExportFormat::Zip),
                    data,
                }
            }
        };

        log_completion(target.name(), output.len(), &stats, started);
        Ok((output, stats))
    }

    /// Export into `dir`, returning the written path or `None` for an empty export.
    ///
    /// Output goes to a temporary file that is renamed into place once complete
    /// and removed on failure.
    pub async fn export_to_dir(&self, target: &ExportTarget, dir: &Path) -> Result<(Option<PathBuf>, ExportStats)> {
        let started = Instant::now();
        let (prepared, stats) = self.prepare(target).await?;
        let name = sanitize_entry_name(target.name());

        let format = match &prepared {
            Prepared::Empty => {
                info!("Nothing to export for {}", target.name());
                return Ok((None, stats));
            }
            Prepared::Flat(_) => ExportFormat::Mbox,
            Prepared::Tree(_) => ExportFormat::Zip,
        };

        tokio::fs::create_dir_all(dir).await?;
        let final_path = dir.join(output_file_name(&name, format));
        let tmp_path = dir.join(format!(".{}.tmp", output_file_name(&name, format)));

        let tmp = PartialFile::new(tmp_path);
        let level = self.options.compression_level;
        let write_path = tmp.path().to_path_buf();
        let size = tokio::task::spawn_blocking(move || write_prepared(prepared, level, &write_path))
            .await
            .map_err(|e| ExportError::Task(e.to_string()))??;

        tokio::fs::rename(tmp.path(), &final_path).await?;
        tmp.keep();
        log_completion(target.name(), size, &stats, started);

        Ok((Some(final_path), stats))
    }

    async fn prepare(&self, target: &ExportTarget) -> Result<(Prepared, ExportStats)> {
        if !target.has_sub_folders() {
            let ExportTarget::Folder(folder) = target else {
                debug!("Account {} has no folders", target.name());
                return Ok((Prepared::Empty, ExportStats::default()));
            };

            let mut stats = ExportStats {
                folders_visited: 1,
                ..ExportStats::default()
            };
            let mut files = collect_mbox_files(self.store, folder, 0, self.options.segment_size, &mut stats).await?;
            let prepared = match files.pop() {
                Some(file) => Prepared::Flat(file),
                None => Prepared::Empty,
            };
            return Ok((prepared, stats));
        }

        let started = Instant::now();
        let mut builder = TreeBuilder::new(self.store, self.options.archive_size_ceiling)
            .with_segment_size(self.options.segment_size);
        let node = builder.build(target).await?;
        info!("Time needed for adding items: {:?}", started.elapsed());

        Ok((Prepared::Tree(node), builder.stats().clone()))
    }
}

impl<'a, S: MailStore + ?Sized> Exporter<'a, S> {
    /// Exporter with default options
    pub fn with_defaults(store: &'a S) -> Self {
        Self::new(store, ExportOptions::default())
    }
}

/// Output path removed on drop unless kept
struct PartialFile {
    path: PathBuf,
    keep: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) {
        self.keep = true;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.keep && fs::remove_file(&self.path).is_ok() {
            debug!("Removed partial export {}", self.path.display());
        }
    }
}

/// `<name>.mbox` or `<name>.zip`
pub fn output_file_name(name: &str, format: ExportFormat) -> String {
    format!("{}.{}", name, format.extension())
}

fn write_prepared(prepared: Prepared, compression_level: i64, path: &Path) -> Result<u64> {
    let file = File::create(path)?;
    match prepared {
        Prepared::Empty => Ok(0),
        Prepared::Flat(mbox) => {
            let mut writer = BufWriter::new(file);
            let size = mbox.write_to(&mut writer)?;
            writer.flush()?;
            Ok(size)
        }
        Prepared::Tree(node) => {
            let started = Instant::now();
            let file = write_archive(&node, compression_level, file)?;
            let size = file.metadata()?.len();
            info!("Time needed for exporting archive: {:?}", started.elapsed());
            Ok(size)
        }
    }
}

fn log_completion(name: &str, size: u64, stats: &ExportStats, started: Instant) {
    info!(
        "Exported {}: {} ({} bytes), {} messages in {} files from {} folders, took {:?}",
        name,
        readable_size(size),
        size,
        stats.messages_exported,
        stats.files_produced,
        stats.folders_visited,
        started.elapsed()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import_export::archive::{find_first_file, ArchiveReader};
    use crate::store::{Account, Folder, InMemoryStore, MessagePage, MockMailStore};
    use chrono::Utc;
    use tempfile::TempDir;

    fn store_with(folder: &str, count: usize) -> InMemoryStore {
        let store = InMemoryStore::new(2);
        for i in 0..count {
            store.add_message(folder, "Jane <jane@example.com>", Utc::now(), format!("Subject: {}\n\nFrom me\n", i));
        }
        store
    }

    #[tokio::test]
    async fn test_flat_export_for_leaf_folder() {
        let store = store_with("inbox", 5);
        let exporter = Exporter::with_defaults(&store);
        let target = ExportTarget::Folder(Folder::new("acct", "inbox", "Inbox"));

        let (output, stats) = exporter.export(&target).await.unwrap();
        assert_eq!(output.format(), Some(ExportFormat::Mbox));
        assert_eq!(output.file_name(), Some("Inbox.mbox"));
        assert_eq!(stats.messages_exported, 5);

        let ExportOutput::Mbox { data, .. } = output else {
            panic!("expected a flat mbox");
        };
        assert_eq!(data.record_count(), 5);
    }

    #[tokio::test]
    async fn test_flat_export_ignores_archive_ceiling() {
        let store = store_with("inbox", 5);
        let exporter = Exporter::new(
            &store,
            ExportOptions {
                archive_size_ceiling: 1,
                ..ExportOptions::default()
            },
        );
        let target = ExportTarget::Folder(Folder::new("acct", "inbox", "Inbox"));

        let (output, stats) = exporter.export(&target).await.unwrap();
        assert!(matches!(output, ExportOutput::Mbox { .. }));
        assert_eq!(stats.files_produced, 1);
    }

    #[tokio::test]
    async fn test_empty_targets() {
        let store = InMemoryStore::new(10);
        let exporter = Exporter::with_defaults(&store);

        let folder = ExportTarget::Folder(Folder::new("acct", "empty", "Empty"));
        assert!(exporter.export(&folder).await.unwrap().0.is_empty());

        let account = ExportTarget::Account(Account {
            id: "acct".to_string(),
            name: "acct".to_string(),
            folders: Vec::new(),
        });
        assert!(exporter.export(&account).await.unwrap().0.is_empty());
    }

    #[tokio::test]
    async fn test_archive_export_for_nested_target() {
        let store = store_with("inbox", 3);
        store.add_message("work", "b@example.com", Utc::now(), "Subject: w\n\nwork\n");
        let target = ExportTarget::Folder(
            Folder::new("acct", "inbox", "Inbox").with_sub_folder(Folder::new("acct", "work", "Work")),
        );

        let (output, stats) = Exporter::with_defaults(&store).export(&target).await.unwrap();
        assert_eq!(output.file_name(), Some("Inbox.zip"));
        assert_eq!(stats.folders_visited, 2);

        let bytes = output.to_vec();
        let reader = ArchiveReader::from_bytes(&bytes).unwrap();
        let paths: Vec<&str> = reader.entries().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["Inbox.mboxrd", "Work"]);
        assert_eq!(reader.entries()[1].children[0].path, "Work/Work.mboxrd");
        assert!(find_first_file(reader.entries(), u64::MAX).is_some());
    }

    #[tokio::test]
    async fn test_export_to_dir_writes_complete_file() {
        let tmp = TempDir::new().unwrap();
        let store = store_with("inbox", 2);
        let target = ExportTarget::Folder(Folder::new("acct", "inbox", "Inbox"));

        let exporter = Exporter::with_defaults(&store);
        let (path, _) = exporter.export_to_dir(&target, tmp.path()).await.unwrap();
        let path = path.unwrap();
        assert_eq!(path.file_name().unwrap(), "Inbox.mbox");

        let (output, _) = exporter.export(&target).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), output.to_vec());

        let leftovers: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_export_leaves_nothing_behind() {
        let tmp = TempDir::new().unwrap();
        let mut store = MockMailStore::new();
        store
            .expect_list_messages()
            .returning(|_| Err(ExportError::source_unavailable("store offline")));
        let target = ExportTarget::Folder(
            Folder::new("acct", "inbox", "Inbox").with_sub_folder(Folder::new("acct", "sub", "Sub")),
        );

        let result = Exporter::with_defaults(&store).export_to_dir(&target, tmp.path()).await;
        assert!(matches!(result, Err(ExportError::SourceUnavailable(_))));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_rename_removes_temporary_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("Inbox.mbox").join("occupied")).unwrap();
        let store = store_with("inbox", 2);
        let target = ExportTarget::Folder(Folder::new("acct", "inbox", "Inbox"));

        let result = Exporter::with_defaults(&store).export_to_dir(&target, tmp.path()).await;
        assert!(matches!(result, Err(ExportError::Io(_))));

        let names: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["Inbox.mbox".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_export_writes_no_file() {
        let tmp = TempDir::new().unwrap();
        let mut store = MockMailStore::new();
        store.expect_list_messages().returning(|_| Ok(MessagePage::default()));
        let target = ExportTarget::Folder(Folder::new("acct", "inbox", "Inbox"));

        let (path, stats) = Exporter::with_defaults(&store).export_to_dir(&target, tmp.path()).await.unwrap();
        assert!(path.is_none());
        assert_eq!(stats.messages_exported, 0);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }
}
