//! Read-only Maildir++ store
//!
//! The root directory is the account. Its own `cur`/`new` directories form the
//! `INBOX` folder; every `.A.B` directory is folder `B` nested under `A`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use super::{Account, Folder, MailStore, MessageDescriptor, MessageId, MessagePage, PageCursor};
use crate::error::{ExportError, Result};

const INBOX: &str = "INBOX";
const MESSAGE_DIRS: [&str; 2] = ["cur", "new"];
const MAX_HEADER_BLOCK: usize = 256 * 1024;

pub struct MaildirStore {
    base_path: PathBuf,
    page_size: usize,
    /// Sorted message paths per folder, held from the first page to the last
    listings: RwLock<HashMap<String, Arc<Vec<PathBuf>>>>,
}

impl MaildirStore {
    pub fn new(base_path: impl Into<PathBuf>, page_size: usize) -> Self {
        Self {
            base_path: base_path.into(),
            page_size: page_size.max(1),
            listings: RwLock::new(HashMap::new()),
        }
    }

    /// Discover the folder hierarchy under the root
    pub async fn account(&self) -> Result<Account> {
        let account_id = self.base_path.to_string_lossy().to_string();
        let name = self
            .base_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| account_id.clone());

        let mut folders = Vec::new();
        if self.has_message_dirs(&self.base_path).await {
            folders.push(Folder::new(&account_id, INBOX, INBOX));
        }

        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.base_path)
            .await
            .map_err(|e| ExportError::source_unavailable(format!("{}: {}", self.base_path.display(), e)))?;
        while let Some(entry) = entries.next_entry().await? {
            let dir_name = entry.file_name().to_string_lossy().to_string();
            if is_folder_dir_name(&dir_name) && entry.file_type().await?.is_dir() {
                names.push(dir_name);
            }
        }
        names.sort();

        for dir_name in names {
            let components: Vec<&str> = dir_name[1..].split('.').filter(|c| !c.is_empty()).collect();
            insert_folder(&mut folders, &account_id, &components, 0);
        }

        debug!("Discovered {} top-level folders in {}", folders.len(), self.base_path.display());

        Ok(Account {
            id: account_id,
            name,
            folders,
        })
    }

    /// Find a folder by its `/`-separated display path, e.g. `Archive/2024`
    pub async fn folder(&self, path: &str) -> Result<Option<Folder>> {
        let account = self.account().await?;
        let mut current = &account.folders;
        let mut found = None;

        for part in path.split('/').filter(|p| !p.is_empty()) {
            match current.iter().find(|f| f.name == part) {
                Some(folder) => {
                    current = &folder.sub_folders;
                    found = Some(folder);
                }
                None => return Ok(None),
            }
        }

        Ok(found.cloned())
    }

    async fn has_message_dirs(&self, path: &Path) -> bool {
        for dir in MESSAGE_DIRS {
            if fs::metadata(path.join(dir)).await.map(|m| m.is_dir()).unwrap_or(false) {
                return true;
            }
        }
        false
    }

    fn folder_path(&self, folder_id: &str) -> Result<PathBuf> {
        if folder_id == INBOX {
            return Ok(self.base_path.clone());
        }
        if !is_folder_dir_name(folder_id) || folder_id.contains(['/', '\\']) {
            return Err(ExportError::source_unavailable(format!("invalid folder id {:?}", folder_id)));
        }
        Ok(self.base_path.join(folder_id))
    }

    /// Message files of a folder as root-relative paths, sorted for stable paging
    async fn message_paths(&self, folder_id: &str) -> Result<Vec<PathBuf>> {
        let folder_path = self.folder_path(folder_id)?;
        let relative = if folder_id == INBOX {
            PathBuf::new()
        } else {
            PathBuf::from(folder_id)
        };

        let mut paths = Vec::new();
        for dir in MESSAGE_DIRS {
            let dir_path = folder_path.join(dir);
            let mut entries = match fs::read_dir(&dir_path).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(ExportError::source_unavailable(format!("{}: {}", dir_path.display(), e))),
            };

            let mut names = Vec::new();
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_file() {
                    names.push(entry.file_name());
                }
            }
            names.sort();
            paths.extend(names.into_iter().map(|name| relative.join(dir).join(name)));
        }

        Ok(paths)
    }

    /// Listing snapshot for `folder_id`, taken fresh when `restart` is set
    async fn listing(&self, folder_id: &str, restart: bool) -> Result<Arc<Vec<PathBuf>>> {
        if !restart {
            let listings = self.listings.read().unwrap_or_else(|e| e.into_inner());
            if let Some(paths) = listings.get(folder_id) {
                return Ok(Arc::clone(paths));
            }
        }

        let paths = Arc::new(self.message_paths(folder_id).await?);
        self.listings
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(folder_id.to_string(), Arc::clone(&paths));
        Ok(paths)
    }

    async fn page(&self, folder_id: &str, offset: usize) -> Result<MessagePage> {
        let paths = self.listing(folder_id, offset == 0).await?;
        let (page_paths, continuation_token) = PageCursor::page(folder_id, paths.as_slice(), offset, self.page_size);
        if continuation_token.is_none() {
            self.listings
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .remove(folder_id);
        }

        let mut messages = Vec::with_capacity(page_paths.len());
        for relative in page_paths {
            messages.push(self.describe(&relative).await?);
        }

        debug!("Listed {} messages of {} at offset {}", messages.len(), folder_id, offset);

        Ok(MessagePage {
            messages,
            continuation_token,
        })
    }

    async fn describe(&self, relative: &Path) -> Result<MessageDescriptor> {
        let path = self.base_path.join(relative);
        let content = read_header_block(&path)
            .await
            .map_err(|e| ExportError::source_unavailable(format!("{}: {}", path.display(), e)))?;

        let date = match extract_date_header(&content) {
            Some(date) => date,
            None => fs::metadata(&path).await?.modified().map(DateTime::<Utc>::from)?,
        };

        Ok(MessageDescriptor {
            id: MessageId(relative.to_string_lossy().to_string()),
            author: extract_from_header(&content).unwrap_or_default(),
            date,
        })
    }
}

#[async_trait]
impl MailStore for MaildirStore {
    async fn list_messages(&self, folder: &Folder) -> Result<MessagePage> {
        self.page(&folder.id, 0).await
    }

    async fn continue_list(&self, token: &str) -> Result<MessagePage> {
        let cursor = PageCursor::decode(token)?;
        self.page(&cursor.folder_id, cursor.offset).await
    }

    async fn get_raw(&self, id: &MessageId) -> Result<Vec<u8>> {
        let relative = Path::new(&id.0);
        if relative.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(ExportError::source_unavailable(format!("invalid message id {:?}", id.0)));
        }

        let path = self.base_path.join(relative);
        fs::read(&path)
            .await
            .map_err(|e| ExportError::source_unavailable(format!("{}: {}", path.display(), e)))
    }
}

/// Bytes up to and including the blank line ending the header block
async fn read_header_block(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut reader = BufReader::new(fs::File::open(path).await?);
    let mut block = Vec::new();

    while block.len() < MAX_HEADER_BLOCK {
        let start = block.len();
        if reader.read_until(b'\n', &mut block).await? == 0 {
            break;
        }
        if matches!(&block[start..], b"\n" | b"\r\n") {
            break;
        }
    }

    Ok(block)
}

fn is_folder_dir_name(name: &str) -> bool {
    name.starts_with('.') && name != "." && name != ".."
}

fn insert_folder(folders: &mut Vec<Folder>, account_id: &str, components: &[&str], depth: usize) {
    let Some(name) = components.get(depth) else {
        return;
    };

    let position = match folders.iter().position(|f| f.name == *name) {
        Some(position) => position,
        None => {
            let id = format!(".{}", components[..=depth].join("."));
            folders.push(Folder::new(account_id, id, *name));
            folders.len() - 1
        }
    };

    insert_folder(&mut folders[position].sub_folders, account_id, components, depth + 1);
}

/// Header block of a raw message, with folded lines joined
fn header_lines(content: &[u8]) -> Vec<String> {
    let content_str = String::from_utf8_lossy(content);
    let mut lines: Vec<String> = Vec::new();

    for line in content_str.lines() {
        if line.is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            if let Some(last) = lines.last_mut() {
                last.push(' ');
                last.push_str(line.trim());
                continue;
            }
        }
        lines.push(line.to_string());
    }

    lines
}

fn header_value(content: &[u8], name: &str) -> Option<String> {
    header_lines(content).into_iter().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim().to_string())
    })
}

/// Raw `From:` header value
fn extract_from_header(content: &[u8]) -> Option<String> {
    header_value(content, "From")
}

/// `Date:` header as UTC
fn extract_date_header(content: &[u8]) -> Option<DateTime<Utc>> {
    let value = header_value(content, "Date")?;
    DateTime::parse_from_rfc2822(&value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
