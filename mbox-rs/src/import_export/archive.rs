//! Zip archive codec
//!
//! Export direction: an [`ExportNode`] becomes a zip where every child node is
//! a directory entry and every mboxrd file a file entry next to its siblings.
//! Import direction: a zip is read back into an entry tree from which the
//! first usable file can be picked and extracted.

use std::io::{Cursor, Read, Seek, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::tree::ExportNode;
use crate::error::{ExportError, Result};

/// Serialize a tree into a zip written to `writer`
pub fn write_archive<W: Write + Seek>(node: &ExportNode, compression_level: i64, writer: W) -> Result<W> {
    let mut zip = ZipWriter::new(writer);
    add_node(&mut zip, node, "", compression_level)?;
    Ok(zip.finish()?)
}

/// Serialize a tree into an in-memory zip
pub fn serialize(node: &ExportNode, compression_level: i64) -> Result<Vec<u8>> {
    let cursor = write_archive(node, compression_level, Cursor::new(Vec::new()))?;
    Ok(cursor.into_inner())
}

fn file_options(compression_level: i64, size: u64) -> SimpleFileOptions {
    let options = if compression_level <= 0 {
        SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
    } else {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(compression_level.min(9)))
    };
    options.large_file(size >= u32::MAX as u64)
}

fn add_node<W: Write + Seek>(zip: &mut ZipWriter<W>, node: &ExportNode, prefix: &str, compression_level: i64) -> Result<()> {
    for entry in &node.files {
        let path = format!("{}{}", prefix, entry.name);
        debug!("Adding {} ({} bytes)", path, entry.file.len());

        zip.start_file(path, file_options(compression_level, entry.file.len()))?;
        for segment in entry.file.segments() {
            zip.write_all(segment)?;
        }
    }

    for child in &node.children {
        let dir = format!("{}{}/", prefix, child.name);
        zip.add_directory(dir.clone(), file_options(compression_level, 0))?;
        add_node(zip, child, &dir, compression_level)?;
    }

    Ok(())
}

/// One entry of a deserialized archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Last path component
    pub name: String,
    /// Full path inside the archive
    pub path: String,
    pub is_directory: bool,
    /// Uncompressed size, 0 for directories
    pub size: u64,
    /// Position in the zip central directory; `None` for implied directories
    pub index: Option<usize>,
    pub children: Vec<ArchiveEntry>,
}

impl ArchiveEntry {
    fn directory(name: &str, path: String, index: Option<usize>) -> Self {
        Self {
            name: name.to_string(),
            path,
            is_directory: true,
            size: 0,
            index,
            children: Vec::new(),
        }
    }
}

/// Random-access view over a zip archive
pub struct ArchiveReader<R: Read + Seek> {
    archive: ZipArchive<R>,
    entries: Vec<ArchiveEntry>,
}

impl<'a> ArchiveReader<Cursor<&'a [u8]>> {
    pub fn from_bytes(data: &'a [u8]) -> Result<Self> {
        Self::new(Cursor::new(data))
    }
}

impl<R: Read + Seek> ArchiveReader<R> {
    pub fn new(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut entries = Vec::new();

        for index in 0..archive.len() {
            let file = archive.by_index(index)?;
            let path = file.name().trim_end_matches('/').to_string();
            if path.is_empty() {
                continue;
            }
            insert_entry(&mut entries, &path, file.is_dir(), file.size(), index)?;
        }

        Ok(Self { archive, entries })
    }

    /// Top-level entries in archive order
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Decompress one file entry
    pub fn read_entry(&mut self, entry: &ArchiveEntry) -> Result<Vec<u8>> {
        let index = match (entry.is_directory, entry.index) {
            (false, Some(index)) => index,
            _ => {
                return Err(ExportError::InvalidArchive(format!(
                    "{} is not a file entry",
                    entry.path
                )))
            }
        };

        let mut file = self.archive.by_index(index)?;
        let mut content = Vec::with_capacity(entry.size as usize);
        file.read_to_end(&mut content)?;
        Ok(content)
    }
}

fn insert_entry(entries: &mut Vec<ArchiveEntry>, path: &str, is_directory: bool, size: u64, index: usize) -> Result<()> {
    let parts: Vec<&str> = path.split('/').collect();
    let mut level = entries;
    let mut current_path = String::new();

    for (depth, part) in parts.iter().enumerate() {
        if !current_path.is_empty() {
            current_path.push('/');
        }
        current_path.push_str(part);
        let last = depth == parts.len() - 1;

        let position = level.iter().position(|e| e.name == *part);
        if last {
            match position {
                Some(position) if is_directory && level[position].is_directory => {
                    level[position].index = Some(index);
                }
                Some(_) => {
                    return Err(ExportError::InvalidArchive(format!("duplicate entry {}", path)));
                }
                None if is_directory => {
                    level.push(ArchiveEntry::directory(part, current_path.clone(), Some(index)));
                }
                None => level.push(ArchiveEntry {
                    name: part.to_string(),
                    path: current_path.clone(),
                    is_directory: false,
                    size,
                    index: Some(index),
                    children: Vec::new(),
                }),
            }
            return Ok(());
        }

        let position = match position {
            Some(position) if level[position].is_directory => position,
            Some(_) => {
                return Err(ExportError::InvalidArchive(format!(
                    "{} is both a file and a directory",
                    current_path
                )))
            }
            None => {
                level.push(ArchiveEntry::directory(part, current_path.clone(), None));
                level.len() - 1
            }
        };
        level = &mut level[position].children;
    }

    Ok(())
}

/// First file with `0 < size < max_size`.
///
/// Files of a directory are considered before descending into its
/// subdirectories, which are visited in archive order.
pub fn find_first_file(entries: &[ArchiveEntry], max_size: u64) -> Option<&ArchiveEntry> {
    entries
        .iter()
        .find(|e| !e.is_directory && e.size > 0 && e.size < max_size)
        .or_else(|| {
            entries
                .iter()
                .filter(|e| e.is_directory)
                .find_map(|dir| find_first_file(&dir.children, max_size))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import_export::accumulator::accumulate;
    use crate::import_export::mbox::encode_record;
    use crate::import_export::tree::MboxEntry;
    use chrono::Utc;

    fn entry(name: &str, body: &str) -> MboxEntry {
        let record = encode_record(body.as_bytes(), "a@example.com", Utc::now());
        MboxEntry {
            name: name.to_string(),
            file: accumulate(vec![record], 0).remove(0),
        }
    }

    fn sample_tree() -> ExportNode {
        let mut sub = ExportNode::new("Sub");
        sub.files.push(entry("Sub.mboxrd", "Subject: sub\n\nsub body\n"));

        let mut empty = ExportNode::new("Empty");
        empty.children.push(sub);

        let mut root = ExportNode::new("Root");
        root.files.push(entry("Root_0.mboxrd", "Subject: r0\n\nfirst\n"));
        root.files.push(entry("Root_1.mboxrd", "Subject: r1\n\nsecond\n"));
        root.children.push(empty);
        root
    }

    #[test]
    fn test_serialized_layout() {
        let bytes = serialize(&sample_tree(), 6).unwrap();
        let reader = ArchiveReader::from_bytes(&bytes).unwrap();

        let top: Vec<(&str, bool)> = reader
            .entries()
            .iter()
            .map(|e| (e.name.as_str(), e.is_directory))
            .collect();
        assert_eq!(top, vec![("Root_0.mboxrd", false), ("Root_1.mboxrd", false), ("Empty", true)]);

        let sub = &reader.entries()[2].children[0];
        assert_eq!(sub.path, "Empty/Sub");
        assert_eq!(sub.children[0].path, "Empty/Sub/Sub.mboxrd");
    }

    #[test]
    fn test_entries_roundtrip_bytes() {
        let tree = sample_tree();
        for level in [0, 1, 9] {
            let bytes = serialize(&tree, level).unwrap();
            let mut reader = ArchiveReader::from_bytes(&bytes).unwrap();
            let first = reader.entries()[0].clone();
            assert_eq!(reader.read_entry(&first).unwrap(), tree.files[0].file.to_vec());
        }
    }

    #[test]
    fn test_find_first_file_prefers_current_level() {
        let bytes = serialize(&sample_tree(), 6).unwrap();
        let reader = ArchiveReader::from_bytes(&bytes).unwrap();
        let found = find_first_file(reader.entries(), u64::MAX).unwrap();
        assert_eq!(found.path, "Root_0.mboxrd");
    }

    #[test]
    fn test_find_first_file_descends_and_respects_limit() {
        let mut root = ExportNode::new("Root");
        let mut sub = ExportNode::new("A");
        sub.files.push(entry("A.mboxrd", "Subject: small\n\nx\n"));
        root.files.push(entry("Big.mboxrd", &format!("Subject: big\n\n{}\n", "y".repeat(4096))));
        root.children.push(sub);

        let bytes = serialize(&root, 6).unwrap();
        let reader = ArchiveReader::from_bytes(&bytes).unwrap();

        let found = find_first_file(reader.entries(), 1024).unwrap();
        assert_eq!(found.path, "A/A.mboxrd");
        assert!(find_first_file(reader.entries(), 10).is_none());
    }

    #[test]
    fn test_empty_tree_has_no_entries() {
        let bytes = serialize(&ExportNode::new("Nothing"), 6).unwrap();
        let reader = ArchiveReader::from_bytes(&bytes).unwrap();
        assert!(reader.entries().is_empty());
        assert!(find_first_file(reader.entries(), u64::MAX).is_none());
    }

    #[test]
    fn test_implied_directories() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("a/b/c.mboxrd", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"From x\n").unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let mut reader = ArchiveReader::from_bytes(&bytes).unwrap();
        let a = &reader.entries()[0];
        assert!(a.is_directory);
        assert!(a.index.is_none());
        let file = find_first_file(reader.entries(), u64::MAX).unwrap().clone();
        assert_eq!(file.path, "a/b/c.mboxrd");
        assert_eq!(reader.read_entry(&file).unwrap(), b"From x\n");
        let directory = reader.entries()[0].clone();
        assert!(reader.read_entry(&directory).is_err());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(ArchiveReader::from_bytes(b"definitely not a zip").is_err());
    }
}
