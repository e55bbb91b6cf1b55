//! Instrumentation session segments.
//!
//! ```text
//! [SESSION_MARKER: u32][version: u64][start ts: i64][end ts: i64]
//! [record count: u32][file info area length: u32][context store length: u32]
//! [FileInfoRecord]*
//! [context store segment]
//! ```
//!
//! The fixed prefix lets a reader find the end of a session without decoding any record.

use error::*;
use format::file_record::{write_file_info, FileInfoRecord};
use format::lazy::{Channel, Lazy};
use format::tagged::{read_segment, write_segment, TaggedReader, TaggedWriter, REGISTRY_TAGS};
use model::ContextStore;
use update::RegistryUpdate;

use std::io::{Read, Write};
use std::path::Path;

/// Marker at the start of every session segment.
pub const SESSION_MARKER: u32 = 0xdada;

/// Size of the fixed prefix of a session segment.
pub const SESSION_HEADER_SIZE: u64 = 40;

/// The fixed prefix of a session segment.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct SessionHeader {
    pub version: u64,
    pub start_ts: i64,
    pub end_ts: i64,
    pub record_count: u32,
    pub file_infos_len: u32,
    pub context_store_len: u32,
}

impl SessionHeader {
    /// Reads the prefix at the current position of `reader`, which is at file position `cursor`.
    pub fn read_from<R: Read>(reader: R, cursor: u64) -> Result<SessionHeader> {
        let mut input = TaggedReader::new(reader, cursor, &REGISTRY_TAGS);
        let marker = input.read_u32()?;
        ensure!(marker == SESSION_MARKER, ErrorKind::MarkerMismatch("session segment", SESSION_MARKER, marker));
        let header = SessionHeader {
            version: input.read_u64()?,
            start_ts: input.read_i64()?,
            end_ts: input.read_i64()?,
            record_count: input.read_u32()?,
            file_infos_len: input.read_u32()?,
            context_store_len: input.read_u32()?,
        };
        trace!("session @ 0x{:x}: {:?}", cursor, header);
        Ok(header)
    }

    /// File position right after a session starting at `location`.
    pub fn end(&self, location: u64) -> u64 {
        location + SESSION_HEADER_SIZE + u64::from(self.file_infos_len) + u64::from(self.context_store_len)
    }

    /// Like [`end()`](#method.end), but the session must also fit in the `file_len` bytes of the registry at `path`.
    pub fn end_within(&self, path: &Path, location: u64, file_len: u64) -> Result<u64> {
        let end = self.end(location);
        if end > file_len {
            let reason = format!("session @ 0x{:x} ends at 0x{:x}, past the end of the file at 0x{:x}", location, end, file_len);
            bail!(ErrorKind::CorruptedRegistry(path.to_owned(), reason));
        }
        Ok(end)
    }
}

fn load_context_store(reader: &mut Read, cursor: u64) -> Result<ContextStore> {
    read_segment(reader, cursor, &REGISTRY_TAGS, "context store")
}

/// Writes an update as a session segment. Returns the number of bytes written.
pub fn write_session<W: Write>(writer: W, update: &RegistryUpdate) -> Result<u64> {
    let mut records = TaggedWriter::new(Vec::new(), &REGISTRY_TAGS);
    for file_info in update.file_infos() {
        write_file_info(&mut records, file_info)?;
    }
    let records = records.into_inner();
    let mut context_store = Vec::new();
    write_segment(&mut context_store, &REGISTRY_TAGS, update.context_store())?;

    let mut out = TaggedWriter::new(writer, &REGISTRY_TAGS);
    out.write_u32(SESSION_MARKER)?;
    out.write_u64(update.version())?;
    out.write_i64(update.start_ts())?;
    out.write_i64(update.end_ts())?;
    out.write_len("session record count", update.file_infos().len())?;
    out.write_len("session file info length", records.len())?;
    out.write_len("session context store length", context_store.len())?;
    debug_assert_eq!(out.cursor(), SESSION_HEADER_SIZE);
    out.write_bytes(&records)?;
    out.write_bytes(&context_store)?;
    debug!("write session: version = {}, {} files, {} bytes", update.version(), update.file_infos().len(), out.cursor());
    Ok(out.cursor())
}

/// A session segment read from a registry file.
#[derive(Debug)]
pub struct InstrSession<'c> {
    location: u64,
    header: SessionHeader,
    file_infos: Vec<FileInfoRecord<'c>>,
    context_store: Lazy<'c, ContextStore>,
}

impl<'c> InstrSession<'c> {
    /// Reads the session starting at `location`. File-info payloads and the context store are decoded lazily.
    pub fn read(channel: &'c Channel, location: u64) -> Result<InstrSession<'c>> {
        let header = channel.read_at(location, |reader, cursor| SessionHeader::read_from(reader, cursor))?;
        header.end_within(channel.path(), location, channel.len()?)?;
        let mut pos = location + SESSION_HEADER_SIZE;
        let file_infos_end = pos + u64::from(header.file_infos_len);

        let mut file_infos = Vec::with_capacity(header.record_count.min(1024) as usize);
        for index in 0..header.record_count {
            let (record, next) = FileInfoRecord::read(channel, pos).at_index(index as usize)?;
            file_infos.push(record);
            pos = next;
        }
        if pos != file_infos_end {
            let reason = format!("session @ 0x{:x}: file infos end at 0x{:x}, expected 0x{:x}", location, pos, file_infos_end);
            bail!(ErrorKind::CorruptedRegistry(channel.path().to_owned(), reason));
        }

        debug!("read session @ 0x{:x}: version = {}, {} files", location, header.version, file_infos.len());
        Ok(InstrSession {
            location,
            header,
            file_infos,
            context_store: Lazy::deferred(channel, file_infos_end, load_context_store),
        })
    }

    /// File position of the session.
    pub fn location(&self) -> u64 {
        self.location
    }

    /// File position right after the session.
    pub fn end(&self) -> u64 {
        self.header.end(self.location)
    }

    pub fn version(&self) -> u64 {
        self.header.version
    }

    pub fn start_ts(&self) -> i64 {
        self.header.start_ts
    }

    pub fn end_ts(&self) -> i64 {
        self.header.end_ts
    }

    pub fn file_infos(&self) -> &[FileInfoRecord<'c>] {
        &self.file_infos
    }

    pub fn into_file_infos(self) -> Vec<FileInfoRecord<'c>> {
        self.file_infos
    }

    /// The context store of the session, decoded on first access.
    pub fn context_store(&self) -> Result<&ContextStore> {
        self.context_store.get()
    }
}
