//! Export tree construction
//!
//! Walks a folder hierarchy depth-first in store order, turning each folder's
//! messages into one or more mboxrd files and mirroring subfolders as child
//! nodes.
//!
//! Naming:
//! - a folder's files are `<name>.mboxrd`, or `<name>_<i>.mboxrd` (0-based)
//!   when split
//! - a child directory whose name collides (case-insensitively) with a sibling
//!   file or an earlier sibling directory becomes `<name> (2)`, `<name> (3)`, ...
//! - `/` and `\` in folder names are replaced by `_`

use futures::future::{BoxFuture, FutureExt};
use std::collections::HashSet;
use tracing::{debug, warn};

use super::accumulator::{Accumulator, MboxFile};
use super::mbox::encode_record;
use super::source::MessageStream;
use super::types::ExportStats;
use crate::config::DEFAULT_SEGMENT_SIZE;
use crate::error::Result;
use crate::store::{ExportTarget, Folder, MailStore};

/// A named mboxrd file attached to a node
#[derive(Debug, Clone)]
pub struct MboxEntry {
    pub name: String,
    pub file: MboxFile,
}

/// In-memory mirror of one folder
#[derive(Debug, Clone, Default)]
pub struct ExportNode {
    pub name: String,
    pub files: Vec<MboxEntry>,
    pub children: Vec<ExportNode>,
}

impl ExportNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: Vec::new(),
            children: Vec::new(),
        }
    }

    /// No files and no children
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.children.is_empty()
    }

    pub fn child(&self, name: &str) -> Option<&ExportNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn file(&self, name: &str) -> Option<&MboxFile> {
        self.files.iter().find(|f| f.name == name).map(|f| &f.file)
    }

    /// Files in this node and all descendants
    pub fn total_files(&self) -> usize {
        self.files.len() + self.children.iter().map(ExportNode::total_files).sum::<usize>()
    }
}

/// `<name>.mboxrd` for one file, `<name>_<i>.mboxrd` for several
pub fn mbox_file_names(name: &str, count: usize) -> Vec<String> {
    match count {
        0 => Vec::new(),
        1 => vec![format!("{}.mboxrd", name)],
        n => (0..n).map(|i| format!("{}_{}.mboxrd", name, i)).collect(),
    }
}

/// Make a folder name usable as a single archive path component
pub fn sanitize_entry_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// Reserve `base`, or the first free `base (n)`
fn unique_name(base: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(base.to_lowercase()) {
        return base.to_string();
    }

    let mut n = 2;
    loop {
        let candidate = format!("{} ({})", base, n);
        if taken.insert(candidate.to_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}

/// Encode and accumulate every message of one folder
pub async fn collect_mbox_files<S: MailStore + ?Sized>(
    store: &S,
    folder: &Folder,
    ceiling: u64,
    segment_size: usize,
    stats: &mut ExportStats,
) -> Result<Vec<MboxFile>> {
    let mut accumulator = Accumulator::with_segment_size(ceiling, segment_size);
    let mut messages = MessageStream::new(store, folder);

    while let Some(message) = messages.next().await? {
        let raw = store.get_raw(&message.id).await?;
        accumulator.push(encode_record(&raw, &message.author, message.date));
        stats.messages_exported += 1;
    }

    let files = accumulator.finish();
    stats.files_produced += files.len() as u64;
    stats.bytes_exported += files.iter().map(MboxFile::len).sum::<u64>();

    debug!(
        "Folder {}: {} pages, {} files",
        folder.name,
        messages.pages_fetched(),
        files.len()
    );

    Ok(files)
}

/// Builds an [`ExportNode`] tree for an export target
pub struct TreeBuilder<'a, S: MailStore + ?Sized> {
    store: &'a S,
    ceiling: u64,
    segment_size: usize,
    stats: ExportStats,
}

impl<'a, S: MailStore + ?Sized> TreeBuilder<'a, S> {
    /// `ceiling` bounds each mboxrd file, 0 = unbounded
    pub fn new(store: &'a S, ceiling: u64) -> Self {
        Self {
            store,
            ceiling,
            segment_size: DEFAULT_SEGMENT_SIZE,
            stats: ExportStats::default(),
        }
    }

    pub fn with_segment_size(mut self, segment_size: usize) -> Self {
        self.segment_size = segment_size;
        self
    }

    pub fn stats(&self) -> &ExportStats {
        &self.stats
    }

    pub async fn build(&mut self, target: &ExportTarget) -> Result<ExportNode> {
        match target {
            ExportTarget::Folder(folder) => {
                self.build_folder(folder, sanitize_entry_name(&folder.name)).await
            }
            ExportTarget::Account(account) => {
                let mut node = ExportNode::new(sanitize_entry_name(&account.name));
                self.add_children(&mut node, &account.folders).await?;
                Ok(node)
            }
        }
    }

    fn build_folder<'b>(&'b mut self, folder: &'b Folder, name: String) -> BoxFuture<'b, Result<ExportNode>> {
        async move {
            self.stats.folders_visited += 1;
            let files = collect_mbox_files(
                self.store,
                folder,
                self.ceiling,
                self.segment_size,
                &mut self.stats,
            )
            .await?;

            if files.is_empty() {
                debug!("Skipping {}: no messages", folder.name);
            }

            let mut node = ExportNode::new(name);
            let base = sanitize_entry_name(&folder.name);
            for (file_name, file) in mbox_file_names(&base, files.len()).into_iter().zip(files) {
                node.files.push(MboxEntry { name: file_name, file });
            }

            self.add_children(&mut node, &folder.sub_folders).await?;
            Ok(node)
        }
        .boxed()
    }

    async fn add_children(&mut self, node: &mut ExportNode, folders: &[Folder]) -> Result<()> {
        let mut taken: HashSet<String> = node.files.iter().map(|f| f.name.to_lowercase()).collect();

        for folder in folders {
            let base = sanitize_entry_name(&folder.name);
            let name = unique_name(&base, &mut taken);
            if name != base {
                warn!("Folder {:?} collides with a sibling entry, stored as {:?}", folder.name, name);
                self.stats.renamed_entries += 1;
            }

            let child = self.build_folder(folder, name).await?;
            node.children.push(child);
        }

        Ok(())
    }
}
