//! Import/Export types

use serde::{Deserialize, Serialize};

use super::accumulator::MboxFile;

/// Container of an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    /// A single mboxrd file, no archive wrapper
    Mbox,
    /// Zip archive mirroring the folder tree
    Zip,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Mbox => "mbox",
            ExportFormat::Zip => "zip",
        }
    }
}

/// Input recognised by the importer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportFormat {
    /// Zip archive produced by an export
    Zip,
    /// Gzip-compressed mbox file
    Gzip,
    /// Bare mbox file
    Mbox,
}

impl ImportFormat {
    /// Sniff the format from leading magic bytes
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.starts_with(b"PK\x03\x04") || data.starts_with(b"PK\x05\x06") {
            Some(ImportFormat::Zip)
        } else if data.starts_with(&[0x1f, 0x8b]) {
            Some(ImportFormat::Gzip)
        } else if data.starts_with(b"From ") {
            Some(ImportFormat::Mbox)
        } else {
            None
        }
    }
}

/// Result of one export
#[derive(Debug)]
pub enum ExportOutput {
    /// Nothing to export: no messages and no subfolders
    Empty,
    /// Single folder without subfolders
    Mbox { file_name: String, data: MboxFile },
    /// Serialized folder tree
    Archive { file_name: String, data: Vec<u8> },
}

impl ExportOutput {
    pub fn is_empty(&self) -> bool {
        matches!(self, ExportOutput::Empty)
    }

    pub fn format(&self) -> Option<ExportFormat> {
        match self {
            ExportOutput::Empty => None,
            ExportOutput::Mbox { .. } => Some(ExportFormat::Mbox),
            ExportOutput::Archive { .. } => Some(ExportFormat::Zip),
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        match self {
            ExportOutput::Empty => None,
            ExportOutput::Mbox { file_name, .. } | ExportOutput::Archive { file_name, .. } => Some(file_name),
        }
    }

    /// Size in bytes
    pub fn len(&self) -> u64 {
        match self {
            ExportOutput::Empty => 0,
            ExportOutput::Mbox { data, .. } => data.len(),
            ExportOutput::Archive { data, .. } => data.len() as u64,
        }
    }

    /// Contiguous copy of the output bytes
    pub fn to_vec(&self) -> Vec<u8> {
        match self {
            ExportOutput::Empty => Vec::new(),
            ExportOutput::Mbox { data, .. } => data.to_vec(),
            ExportOutput::Archive { data, .. } => data.clone(),
        }
    }
}

/// Counters collected during one export
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportStats {
    /// Folders walked, empty ones included
    pub folders_visited: u64,
    /// Messages encoded
    pub messages_exported: u64,
    /// mboxrd files produced
    pub files_produced: u64,
    /// Total size of the mboxrd files, before compression
    pub bytes_exported: u64,
    /// Directory entries renamed to avoid a sibling collision
    pub renamed_entries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_import_format() {
        assert_eq!(ImportFormat::detect(b"PK\x03\x04rest"), Some(ImportFormat::Zip));
        assert_eq!(ImportFormat::detect(&[0x1f, 0x8b, 0x08]), Some(ImportFormat::Gzip));
        assert_eq!(ImportFormat::detect(b"From a@b Mon"), Some(ImportFormat::Mbox));
        assert_eq!(ImportFormat::detect(b"Subject: hi"), None);
        assert_eq!(ImportFormat::detect(b""), None);
    }

    #[test]
    fn test_empty_output() {
        let output = ExportOutput::Empty;
        assert!(output.is_empty());
        assert_eq!(output.len(), 0);
        assert!(output.file_name().is_none());
        assert!(output.format().is_none());
    }
}
