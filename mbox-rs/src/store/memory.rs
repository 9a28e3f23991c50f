//! In-memory mail store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use super::{Folder, MailStore, MessageDescriptor, MessageId, MessagePage, PageCursor};
use crate::error::{ExportError, Result};

struct StoredMessage {
    descriptor: MessageDescriptor,
    raw: Vec<u8>,
}

/// Mail store backed by hash maps, paginating like a remote store would
pub struct InMemoryStore {
    page_size: usize,
    folders: RwLock<HashMap<String, Vec<MessageId>>>,
    messages: RwLock<HashMap<MessageId, StoredMessage>>,
}

impl InMemoryStore {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            folders: RwLock::new(HashMap::new()),
            messages: RwLock::new(HashMap::new()),
        }
    }

    /// Append a message to a folder, returning its id
    pub fn add_message(
        &self,
        folder_id: &str,
        author: &str,
        date: DateTime<Utc>,
        raw: impl Into<Vec<u8>>,
    ) -> MessageId {
        let mut messages = self.messages.write().unwrap_or_else(|e| e.into_inner());
        let id = MessageId(format!("{}#{}", folder_id, messages.len()));

        messages.insert(
            id.clone(),
            StoredMessage {
                descriptor: MessageDescriptor {
                    id: id.clone(),
                    author: author.to_string(),
                    date,
                },
                raw: raw.into(),
            },
        );
        self.folders
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(folder_id.to_string())
            .or_default()
            .push(id.clone());

        id
    }

    pub fn message_count(&self) -> usize {
        self.messages.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn page(&self, folder_id: &str, offset: usize) -> MessagePage {
        let folders = self.folders.read().unwrap_or_else(|e| e.into_inner());
        let messages = self.messages.read().unwrap_or_else(|e| e.into_inner());

        let descriptors: Vec<MessageDescriptor> = folders
            .get(folder_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| messages.get(id))
                    .map(|m| m.descriptor.clone())
                    .collect()
            })
            .unwrap_or_default();

        let (messages, continuation_token) = PageCursor::page(folder_id, &descriptors, offset, self.page_size);
        MessagePage {
            messages,
            continuation_token,
        }
    }
}

#[async_trait]
impl MailStore for InMemoryStore {
    async fn list_messages(&self, folder: &Folder) -> Result<MessagePage> {
        Ok(self.page(&folder.id, 0))
    }

    async fn continue_list(&self, token: &str) -> Result<MessagePage> {
        let cursor = PageCursor::decode(token)?;
        Ok(self.page(&cursor.folder_id, cursor.offset))
    }

    async fn get_raw(&self, id: &MessageId) -> Result<Vec<u8>> {
        self.messages
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .map(|m| m.raw.clone())
            .ok_or_else(|| ExportError::source_unavailable(format!("message {} not found", id)))
    }
}
