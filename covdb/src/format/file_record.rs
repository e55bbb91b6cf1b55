//! A file-info record inside a session segment.
//!
//! ```text
//! [FILE_INFO_RECORD_MARKER: u32][name: str][package name: str][payload length: u32][payload segment]
//! ```
//!
//! The name and package are decoded eagerly. The payload is a tagged [`FileInfo`] segment decoded on first access, so
//! a reader walking the registry only pays for the files it actually inspects.
//!
//! [`FileInfo`]: ../../model/struct.FileInfo.html

use error::*;
use format::lazy::{Channel, Lazy};
use format::tagged::{read_segment, write_segment, TaggedReader, TaggedWriter, REGISTRY_TAGS};
use model::FileInfo;

use std::io::{Read, Write};

/// Marker at the start of every file-info record.
pub const FILE_INFO_RECORD_MARKER: u32 = 0x000e_dd1e;

/// The record of a single source file.
#[derive(Debug)]
pub struct FileInfoRecord<'c> {
    name: String,
    package_name: String,
    file_info: Lazy<'c, FileInfo>,
}

fn load_file_info(reader: &mut Read, cursor: u64) -> Result<FileInfo> {
    read_segment(reader, cursor, &REGISTRY_TAGS, "file info payload")
}

/// Writes the record of a file. The payload is serialized first so its length is known up front.
pub fn write_file_info<W: Write>(out: &mut TaggedWriter<W>, file_info: &FileInfo) -> Result<()> {
    let mut payload = Vec::new();
    write_segment(&mut payload, &REGISTRY_TAGS, file_info)?;
    out.write_u32(FILE_INFO_RECORD_MARKER)?;
    out.write_str(&file_info.name)?;
    out.write_str(&file_info.package_name)?;
    out.write_len("file info payload length", payload.len())?;
    out.write_bytes(&payload)
}

impl<'c> FileInfoRecord<'c> {
    /// Creates a record from a live structure.
    pub fn new(file_info: FileInfo) -> FileInfoRecord<'c> {
        FileInfoRecord {
            name: file_info.name.clone(),
            package_name: file_info.package_name.clone(),
            file_info: Lazy::Preloaded(file_info),
        }
    }

    /// Reads the record at `offset`. Returns the record and the offset right after its payload.
    ///
    /// The payload itself is not decoded.
    pub fn read(channel: &'c Channel, offset: u64) -> Result<(FileInfoRecord<'c>, u64)> {
        channel.read_at(offset, |reader, cursor| {
            let mut input = TaggedReader::new(reader, cursor, &REGISTRY_TAGS);
            let marker = input.read_u32()?;
            ensure!(marker == FILE_INFO_RECORD_MARKER, ErrorKind::MarkerMismatch("file info record", FILE_INFO_RECORD_MARKER, marker));
            let name = input.read_str()?;
            let package_name = input.read_str()?;
            let length = input.read_u32()?;
            let payload_start = input.cursor();
            trace!("file-info-record @ 0x{:x}: name = {}, payload = 0x{:x} + {}", cursor, name, payload_start, length);
            let record = FileInfoRecord {
                name,
                package_name,
                file_info: Lazy::deferred(channel, payload_start, load_file_info),
            };
            Ok((record, payload_start + u64::from(length)))
        })
    }

    /// Writes the record, decoding the payload first if needed.
    pub fn write<W: Write>(&self, out: &mut TaggedWriter<W>) -> Result<()> {
        write_file_info(out, self.file_info()?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    /// The structure of the file, decoded on first access.
    pub fn file_info(&self) -> Result<&FileInfo> {
        self.file_info.get()
    }

    /// Whether the payload has been decoded.
    pub fn is_loaded(&self) -> bool {
        self.file_info.is_loaded()
    }
}
