//! Paginated message listing
//!
//! Turns a store's page/continuation-token protocol into a single-pass
//! sequence of [`MessageDescriptor`]s. Each new [`MessageStream`] queries the
//! store from the first page again.

use futures::stream::{self, Stream};

use crate::error::{ExportError, Result};
use crate::store::{Folder, MailStore, MessageDescriptor};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Explicit `{current page, cursor}` state over a folder listing
pub struct MessageStream<'a, S: MailStore + ?Sized> {
    store: &'a S,
    folder: &'a Folder,
    page: std::vec::IntoIter<MessageDescriptor>,
    cursor: Cursor,
    pages_fetched: usize,
}

impl<'a, S: MailStore + ?Sized> MessageStream<'a, S> {
    pub fn new(store: &'a S, folder: &'a Folder) -> Self {
        Self {
            store,
            folder,
            page: Vec::new().into_iter(),
            cursor: Cursor::Start,
            pages_fetched: 0,
        }
    }

    /// Next descriptor, fetching further pages as needed
    pub async fn next(&mut self) -> Result<Option<MessageDescriptor>> {
        loop {
            if let Some(message) = self.page.next() {
                return Ok(Some(message));
            }

            let previous = std::mem::replace(&mut self.cursor, Cursor::Done);
            let page = match &previous {
                Cursor::Start => self.store.list_messages(self.folder).await?,
                Cursor::Next(token) => self.store.continue_list(token).await?,
                Cursor::Done => return Ok(None),
            };
            self.pages_fetched += 1;

            self.cursor = match page.continuation_token {
                None => Cursor::Done,
                Some(token) if token.is_empty() => {
                    return Err(ExportError::source_unavailable(format!(
                        "empty continuation token while listing {}",
                        self.folder.name
                    )));
                }
                Some(token) if previous == Cursor::Next(token.clone()) => {
                    return Err(ExportError::source_unavailable(format!(
                        "pagination did not advance while listing {}",
                        self.folder.name
                    )));
                }
                Some(token) => Cursor::Next(token),
            };
            self.page = page.messages.into_iter();
        }
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Adapt into a `futures` stream
    pub fn into_stream(self) -> impl Stream<Item = Result<MessageDescriptor>> + 'a {
        stream::try_unfold(self, |mut messages| async move {
            let next = messages.next().await?;
            Ok::<_, ExportError>(next.map(|message| (message, messages)))
        })
    }
}
