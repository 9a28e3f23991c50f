//! Mail store boundary
//!
//! The exporter only needs three things from a mail store: list a folder's
//! messages page by page, continue a listing from a cursor, and fetch the raw
//! RFC 5322 bytes of one message.
//! - [`memory`]: in-memory store, used by tests and embedders
//! - [`maildir`]: read-only Maildir++ store

pub mod maildir;
pub mod memory;

pub use maildir::MaildirStore;
pub use memory::InMemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ExportError, Result};

/// Opaque message identifier, only meaningful to the store that issued it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Listing entry for one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDescriptor {
    pub id: MessageId,
    /// Raw `From:` header value
    pub author: String,
    pub date: DateTime<Utc>,
}

/// One page of a folder listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<MessageDescriptor>,
    /// `None` ends the listing
    pub continuation_token: Option<String>,
}

/// A message-bearing folder and its subfolders, in store order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub account_id: String,
    pub name: String,
    pub sub_folders: Vec<Folder>,
}

impl Folder {
    pub fn new(account_id: impl Into<String>, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            account_id: account_id.into(),
            name: name.into(),
            sub_folders: Vec::new(),
        }
    }

    pub fn with_sub_folder(mut self, folder: Folder) -> Self {
        self.sub_folders.push(folder);
        self
    }
}

/// An account holds folders but no messages of its own
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub folders: Vec<Folder>,
}

/// What the user asked to export
#[derive(Debug, Clone, PartialEq)]
pub enum ExportTarget {
    Account(Account),
    Folder(Folder),
}

impl ExportTarget {
    pub fn name(&self) -> &str {
        match self {
            ExportTarget::Account(account) => &account.name,
            ExportTarget::Folder(folder) => &folder.name,
        }
    }

    /// Direct children, in store order
    pub fn sub_folders(&self) -> &[Folder] {
        match self {
            ExportTarget::Account(account) => &account.folders,
            ExportTarget::Folder(folder) => &folder.sub_folders,
        }
    }

    pub fn has_sub_folders(&self) -> bool {
        !self.sub_folders().is_empty()
    }
}

/// Mail store operations used by the exporter
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailStore: Send + Sync {
    /// First page of a folder listing
    async fn list_messages(&self, folder: &Folder) -> Result<MessagePage>;

    /// Next page for a token returned by a previous page
    async fn continue_list(&self, token: &str) -> Result<MessagePage>;

    /// Raw RFC 5322 bytes of one message
    async fn get_raw(&self, id: &MessageId) -> Result<Vec<u8>>;
}

/// Position inside a folder listing, carried between pages as an opaque token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PageCursor {
    pub folder_id: String,
    pub offset: usize,
}

impl PageCursor {
    pub fn encode(&self) -> String {
        format!("{}:{}", self.offset, self.folder_id)
    }

    pub fn decode(token: &str) -> Result<Self> {
        let (offset, folder_id) = token
            .split_once(':')
            .ok_or_else(|| ExportError::source_unavailable(format!("malformed page token {:?}", token)))?;
        let offset = offset
            .parse()
            .map_err(|_| ExportError::source_unavailable(format!("malformed page token {:?}", token)))?;

        Ok(Self {
            folder_id: folder_id.to_string(),
            offset,
        })
    }

    /// Slice one page out of a full listing and compute the next token.
    pub fn page<T: Clone>(folder_id: &str, items: &[T], offset: usize, page_size: usize) -> (Vec<T>, Option<String>) {
        let start = offset.min(items.len());
        let end = (start + page_size.max(1)).min(items.len());
        let next = (end < items.len()).then(|| {
            PageCursor {
                folder_id: folder_id.to_string(),
                offset: end,
            }
            .encode()
        });
        (items[start..end].to_vec(), next)
    }
}
