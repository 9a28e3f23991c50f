//! Import/Export module
//!
//! Streams a mail store into mboxrd files, optionally packed into a zip
//! archive mirroring the folder tree, and recovers mbox payloads from such
//! archives.
//!
//! Data flows one way: [`source`] → [`mbox`] → [`accumulator`] → [`tree`] →
//! [`archive`]; [`import`] runs it backwards.

pub mod accumulator;
pub mod archive;
pub mod import;
pub mod manager;
pub mod mbox;
pub mod segments;
pub mod source;
pub mod tree;
pub mod types;

pub use accumulator::{accumulate, Accumulator, MboxFile};
pub use archive::{find_first_file, serialize, ArchiveEntry, ArchiveReader};
pub use import::{recover_first_message, recover_payload, RecoveredPayload};
pub use manager::{ExportOptions, Exporter};
pub use mbox::{encode_record, MboxMessage, MboxReader, MboxRecord};
pub use segments::SegmentedBuffer;
pub use source::MessageStream;
pub use tree::{ExportNode, MboxEntry, TreeBuilder};
pub use types::*;
