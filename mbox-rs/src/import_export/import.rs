//! Re-import of exported data
//!
//! Picks the first usable mboxrd payload out of an archive (or accepts a bare
//! or gzip-compressed mbox file) and splits it back into messages.

use flate2::read::GzDecoder;
use std::io::Read;
use tracing::{info, warn};

use super::archive::{find_first_file, ArchiveReader};
use super::mbox::{MboxMessage, MboxReader};
use super::types::ImportFormat;
use crate::error::{ExportError, Result};

/// mbox bytes recovered from an import source
#[derive(Debug, Clone)]
pub struct RecoveredPayload {
    pub format: ImportFormat,
    /// Path of the archive entry the bytes came from
    pub entry: Option<String>,
    pub data: Vec<u8>,
}

/// Find the mbox payload in `data`; `Ok(None)` when there is nothing usable
pub fn recover_payload(data: &[u8], max_entry_size: u64) -> Result<Option<RecoveredPayload>> {
    let format = ImportFormat::detect(data)
        .ok_or_else(|| ExportError::InvalidArchive("unrecognised import format".to_string()))?;

    let payload = match format {
        ImportFormat::Zip => {
            let mut reader = ArchiveReader::from_bytes(data)?;
            let Some(entry) = find_first_file(reader.entries(), max_entry_size).cloned() else {
                warn!("No file entry below {} bytes in archive", max_entry_size);
                return Ok(None);
            };
            let content = reader.read_entry(&entry)?;
            RecoveredPayload {
                format,
                entry: Some(entry.path),
                data: content,
            }
        }
        ImportFormat::Gzip => {
            let mut content = Vec::new();
            GzDecoder::new(data)
                .take(max_entry_size)
                .read_to_end(&mut content)?;
            if content.is_empty() || content.len() as u64 >= max_entry_size {
                warn!("Decompressed mbox is empty or exceeds {} bytes", max_entry_size);
                return Ok(None);
            }
            RecoveredPayload {
                format,
                entry: None,
                data: content,
            }
        }
        ImportFormat::Mbox => RecoveredPayload {
            format,
            entry: None,
            data: data.to_vec(),
        },
    };

    info!(
        "Recovered {} bytes from {:?} input{}",
        payload.data.len(),
        payload.format,
        payload.entry.as_deref().map(|e| format!(" ({})", e)).unwrap_or_default()
    );

    Ok(Some(payload))
}

/// First message of the first usable payload
pub fn recover_first_message(data: &[u8], max_entry_size: u64) -> Result<Option<MboxMessage>> {
    let Some(payload) = recover_payload(data, max_entry_size)? else {
        return Ok(None);
    };

    Ok(MboxReader::new(&payload.data).read_message())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import_export::accumulator::accumulate;
    use crate::import_export::archive::serialize;
    use crate::import_export::mbox::encode_record;
    use crate::import_export::tree::{ExportNode, MboxEntry};
    use chrono::Utc;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const RAW: &[u8] = b"Subject: hello\n\nFrom the archive\n";

    fn mbox_bytes() -> Vec<u8> {
        let record = encode_record(RAW, "Jane <jane@example.com>", Utc::now());
        accumulate(vec![record], 0).remove(0).to_vec()
    }

    #[test]
    fn test_recover_from_archive() {
        let mbox = mbox_bytes();
        let mut child = ExportNode::new("Inbox");
        child.files.push(MboxEntry {
            name: "Inbox.mboxrd".to_string(),
            file: accumulate(vec![encode_record(RAW, "jane@example.com", Utc::now())], 0).remove(0),
        });
        let mut root = ExportNode::new("acct");
        root.children.push(child);

        let archive = serialize(&root, 6).unwrap();
        let payload = recover_payload(&archive, u64::MAX).unwrap().unwrap();
        assert_eq!(payload.format, ImportFormat::Zip);
        assert_eq!(payload.entry.as_deref(), Some("Inbox/Inbox.mboxrd"));
        assert_eq!(payload.data.len(), mbox.len());

        let message = recover_first_message(&archive, u64::MAX).unwrap().unwrap();
        assert_eq!(message.from, "jane@example.com");
        assert_eq!(message.content, RAW.to_vec());
    }

    #[test]
    fn test_archive_without_usable_entry() {
        let archive = serialize(&ExportNode::new("empty"), 6).unwrap();
        assert!(recover_payload(&archive, u64::MAX).unwrap().is_none());
        assert!(recover_first_message(&archive, u64::MAX).unwrap().is_none());
    }

    #[test]
    fn test_recover_from_bare_and_gzip_mbox() {
        let mbox = mbox_bytes();
        let bare = recover_payload(&mbox, u64::MAX).unwrap().unwrap();
        assert_eq!(bare.format, ImportFormat::Mbox);
        assert_eq!(bare.data, mbox);

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&mbox).unwrap();
        let gz = encoder.finish().unwrap();

        let payload = recover_payload(&gz, u64::MAX).unwrap().unwrap();
        assert_eq!(payload.format, ImportFormat::Gzip);
        assert_eq!(payload.data, mbox);

        assert!(recover_payload(&gz, 10).unwrap().is_none());
    }

    #[test]
    fn test_unrecognised_input_is_an_error() {
        assert!(matches!(
            recover_payload(b"Subject: not an mbox\n", u64::MAX),
            Err(ExportError::InvalidArchive(_))
        ));
    }
}
