//! Tagged binary encoding shared by every registry segment.
//!
//! Every value is written as `[tag: u8][length: u32][body]`, all integers big-endian. The length prefix bounds the
//! body, so a reader that knows fewer fields than the writer simply skips the trailing bytes. A `null` value is the
//! single byte [`NULL_TAG`].
//!
//! A standalone segment is `[TAGGED_SEGMENT_MARKER: u32][tagged value]`.
//!
//! [`NULL_TAG`]: ./constant.NULL_TAG.html

use error::*;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use fixedbitset::FixedBitSet;

use std::{fmt, u32};
use std::io::{self, Read, Write};
use std::result::Result as StdResult;

//----------------------------------------------------------------------------------------------------------------------
//{{{ Tag & Tags

/// The tag of a value.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Tag(pub u8);

/// The tag of an absent value.
pub const NULL_TAG: Tag = Tag(0);
pub const FILE_INFO_TAG: Tag = Tag(0x10);
pub const CLASS_INFO_TAG: Tag = Tag(0x11);
pub const METHOD_INFO_TAG: Tag = Tag(0x12);
pub const STATEMENT_INFO_TAG: Tag = Tag(0x13);
pub const BRANCH_INFO_TAG: Tag = Tag(0x14);
pub const CONTEXT_SET_TAG: Tag = Tag(0x15);
pub const SOURCE_REGION_TAG: Tag = Tag(0x16);
pub const CONTEXT_STORE_TAG: Tag = Tag(0x17);
pub const STATEMENT_CONTEXT_TAG: Tag = Tag(0x18);
pub const METHOD_CONTEXT_TAG: Tag = Tag(0x19);
pub const PER_TEST_RECORDING_TAG: Tag = Tag(0x1a);
pub const PER_TEST_COVERAGE_TAG: Tag = Tag(0x1b);

/// Marker preceding every standalone tagged segment.
pub const TAGGED_SEGMENT_MARKER: u32 = 0x007a_66ed;

impl fmt::Display for Tag {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match REGISTRY_TAGS.name_of(*self) {
            Some(name) => write!(fmt, "0x{:02x} ({})", self.0, name),
            None => write!(fmt, "0x{:02x}", self.0),
        }
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "Tag(0x{:02x})", self.0)
    }
}

/// The schema of a segment: which tags may appear in it.
#[derive(Debug)]
pub struct Tags {
    entries: &'static [(Tag, &'static str)],
}

impl Tags {
    pub const fn new(entries: &'static [(Tag, &'static str)]) -> Tags {
        Tags { entries }
    }

    /// Name of the type registered for `tag`.
    pub fn name_of(&self, tag: Tag) -> Option<&'static str> {
        self.entries.iter().find(|e| e.0 == tag).map(|e| e.1)
    }

    pub fn contains(&self, tag: Tag) -> bool {
        tag == NULL_TAG || self.name_of(tag).is_some()
    }
}

/// Tags of every type stored in a registry file.
pub static REGISTRY_TAGS: Tags = Tags::new(&[
    (NULL_TAG, "null"),
    (FILE_INFO_TAG, "FileInfo"),
    (CLASS_INFO_TAG, "ClassInfo"),
    (METHOD_INFO_TAG, "MethodInfo"),
    (STATEMENT_INFO_TAG, "StatementInfo"),
    (BRANCH_INFO_TAG, "BranchInfo"),
    (CONTEXT_SET_TAG, "ContextSet"),
    (SOURCE_REGION_TAG, "SourceRegion"),
    (CONTEXT_STORE_TAG, "ContextStore"),
    (STATEMENT_CONTEXT_TAG, "StatementRegexpContext"),
    (METHOD_CONTEXT_TAG, "MethodRegexpContext"),
    (PER_TEST_RECORDING_TAG, "PerTestRecording"),
    (PER_TEST_COVERAGE_TAG, "PerTestCoverage"),
]);

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ Tagged

/// Writer for the body of a single tagged value.
pub type BodyWriter = TaggedWriter<Vec<u8>>;

/// Reader for the body of a single tagged value. The body is fully buffered, so nested values never re-enter the
/// underlying file.
pub type BodyReader<'a> = TaggedReader<&'a [u8]>;

/// A type which can be stored as a tagged value.
pub trait Tagged: Sized {
    /// The tag written before the body.
    const TAG: Tag;

    /// Writes the fields of the value.
    fn write_body(&self, out: &mut BodyWriter) -> Result<()>;

    /// Reads the fields of the value. Trailing fields not consumed here are skipped by the caller.
    fn read_body(input: &mut BodyReader) -> Result<Self>;
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ TaggedWriter

/// Writer of tagged values.
#[derive(Debug)]
pub struct TaggedWriter<W> {
    writer: W,
    cursor: u64,
    tags: &'static Tags,
}

impl<W: Write> TaggedWriter<W> {
    pub fn new(writer: W, tags: &'static Tags) -> TaggedWriter<W> {
        TaggedWriter {
            writer,
            cursor: 0,
            tags,
        }
    }

    /// Number of bytes written so far.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value)?;
        self.cursor += 1;
        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(value as u8)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.writer.write_u32::<BigEndian>(value)?;
        self.cursor += 4;
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.writer.write_i32::<BigEndian>(value)?;
        self.cursor += 4;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_u64::<BigEndian>(value)?;
        self.cursor += 8;
        Ok(())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.writer.write_i64::<BigEndian>(value)?;
        self.cursor += 8;
        Ok(())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.writer.write_f64::<BigEndian>(value)?;
        self.cursor += 8;
        Ok(())
    }

    /// Writes raw bytes without any framing.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        self.cursor += bytes.len() as u64;
        Ok(())
    }

    /// Writes a length, failing if it does not fit in the 4-byte prefix.
    pub fn write_len(&mut self, what: &'static str, len: usize) -> Result<()> {
        ensure!(len <= u32::MAX as usize, ErrorKind::InvalidField(what, len as i64));
        self.write_u32(len as u32)
    }

    /// Writes a UTF-8 string as `[length: u32][bytes]`.
    pub fn write_str(&mut self, value: &str) -> Result<()> {
        self.write_len("string length", value.len())?;
        self.write_bytes(value.as_bytes())
    }

    pub fn write_opt_str(&mut self, value: Option<&str>) -> Result<()> {
        match value {
            Some(s) => {
                self.write_bool(true)?;
                self.write_str(s)
            },
            None => self.write_bool(false),
        }
    }

    /// Writes a tagged value.
    pub fn write<T: Tagged>(&mut self, value: &T) -> Result<()> {
        debug_assert!(self.tags.contains(T::TAG), "tag {} not in schema", T::TAG);
        let mut body = TaggedWriter::new(Vec::new(), self.tags);
        value.write_body(&mut body)?;
        let body = body.into_inner();
        self.write_u8(T::TAG.0)?;
        self.write_len("tagged body length", body.len())?;
        self.write_bytes(&body)
    }

    /// Writes a tagged value or `null`.
    pub fn write_opt<T: Tagged>(&mut self, value: Option<&T>) -> Result<()> {
        match value {
            Some(v) => self.write(v),
            None => self.write_u8(NULL_TAG.0),
        }
    }

    /// Writes a count-prefixed list of tagged values.
    pub fn write_list<T: Tagged>(&mut self, values: &[T]) -> Result<()> {
        self.write_len("list length", values.len())?;
        for value in values {
            self.write(value)?;
        }
        Ok(())
    }

    /// Writes a bit set as `[bit length: u32][block count: u32][blocks: u32...]`.
    pub fn write_bitset(&mut self, bitset: &FixedBitSet) -> Result<()> {
        let blocks = bitset.as_slice();
        self.write_len("bitset length", bitset.len())?;
        self.write_len("bitset block count", blocks.len())?;
        for block in blocks {
            self.write_u32(*block)?;
        }
        Ok(())
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ TaggedReader

/// Reader of tagged values.
#[derive(Debug)]
pub struct TaggedReader<R> {
    reader: R,
    cursor: u64,
    tags: &'static Tags,
}

impl<R: Read> TaggedReader<R> {
    /// Creates a reader. `cursor` is the file position of the first byte, used for diagnostics only.
    pub fn new(reader: R, cursor: u64, tags: &'static Tags) -> TaggedReader<R> {
        TaggedReader {
            reader,
            cursor,
            tags,
        }
    }

    /// The file position of the next byte to be read.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Advances the reader cursor by `count` bytes. If `res` is an error, log the file position where it started.
    fn advance_cursor<T, E: Into<Error>>(&mut self, count: u64, res: StdResult<T, E>) -> Result<T> {
        let cursor = self.cursor;
        self.cursor += count;
        res.map_err(Into::into).at_cursor(cursor)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let value = self.reader.read_u8();
        self.advance_cursor(1, value)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let value = self.reader.read_u32::<BigEndian>();
        self.advance_cursor(4, value)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let value = self.reader.read_i32::<BigEndian>();
        self.advance_cursor(4, value)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let value = self.reader.read_u64::<BigEndian>();
        self.advance_cursor(8, value)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let value = self.reader.read_i64::<BigEndian>();
        self.advance_cursor(8, value)
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let value = self.reader.read_f64::<BigEndian>();
        self.advance_cursor(8, value)
    }

    /// Reads exactly `length` raw bytes.
    pub fn read_bytes(&mut self, length: u64) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let res = self.reader.by_ref().take(length).read_to_end(&mut buf);
        let cursor = self.cursor;
        let actual = self.advance_cursor(length, res)? as u64;
        if actual != length {
            let e = io::Error::new(io::ErrorKind::UnexpectedEof, "truncated value");
            return Err(Error::from(e)).at_cursor(cursor);
        }
        Ok(buf)
    }

    /// Reads a UTF-8 string written by [`TaggedWriter::write_str`].
    ///
    /// [`TaggedWriter::write_str`]: ./struct.TaggedWriter.html#method.write_str
    pub fn read_str(&mut self) -> Result<String> {
        let length = self.read_u32()?;
        let cursor = self.cursor;
        let buf = self.read_bytes(u64::from(length))?;
        String::from_utf8(buf).map_err(Error::from).at_cursor(cursor)
    }

    pub fn read_opt_str(&mut self) -> Result<Option<String>> {
        Ok(if self.read_bool()? {
            Some(self.read_str()?)
        } else {
            None
        })
    }

    /// Verifies that `actual` is the tag expected at this position.
    fn check_tag(&self, expected: Tag, actual: Tag) -> Result<()> {
        if expected == actual {
            Ok(())
        } else if self.tags.contains(actual) {
            bail!(ErrorKind::TagMismatch(expected, actual))
        } else {
            bail!(ErrorKind::UnknownTag(actual))
        }
    }

    /// Reads the length-prefixed body of a value whose tag has been read already.
    fn read_body<T: Tagged>(&mut self) -> Result<T> {
        let length = self.read_u32()?;
        let start = self.cursor;
        let body = self.read_bytes(u64::from(length))?;
        trace!("tagged-body: tag = {0}, length = {1} (0x{1:x}), range = 0x{2:x} .. 0x{3:x}", T::TAG, length, start, self.cursor);
        let mut subreader = TaggedReader::new(&body[..], start, self.tags);
        let value = T::read_body(&mut subreader)?;
        if subreader.remaining() != 0 {
            trace!("skipping {} trailing bytes of {}", subreader.remaining(), T::TAG);
        }
        Ok(value)
    }

    /// Reads a tagged value, which must not be `null`.
    pub fn read<T: Tagged>(&mut self) -> Result<T> {
        let cursor = self.cursor;
        let tag = Tag(self.read_u8()?);
        trace!("tagged-value @ 0x{:x}; tag = {}", cursor, tag);
        self.check_tag(T::TAG, tag).at_cursor(cursor)?;
        self.read_body()
    }

    /// Reads a tagged value or `null`.
    pub fn read_opt<T: Tagged>(&mut self) -> Result<Option<T>> {
        let cursor = self.cursor;
        let tag = Tag(self.read_u8()?);
        trace!("tagged-opt-value @ 0x{:x}; tag = {}", cursor, tag);
        if tag == NULL_TAG {
            return Ok(None);
        }
        self.check_tag(T::TAG, tag).at_cursor(cursor)?;
        self.read_body().map(Some)
    }

    /// Reads a count-prefixed list of tagged values.
    pub fn read_list<T: Tagged>(&mut self) -> Result<Vec<T>> {
        let count = self.read_u32()?;
        // the capacity is bounded so a corrupt count cannot trigger a huge allocation up front.
        let mut values = Vec::with_capacity(count.min(1024) as usize);
        for index in 0..count {
            values.push(self.read().at_index(index as usize)?);
        }
        Ok(values)
    }

    /// Reads a bit set written by [`TaggedWriter::write_bitset`].
    ///
    /// [`TaggedWriter::write_bitset`]: ./struct.TaggedWriter.html#method.write_bitset
    pub fn read_bitset(&mut self) -> Result<FixedBitSet> {
        let bits = self.read_u32()? as usize;
        let block_count = self.read_u32()? as usize;
        ensure!(block_count == (bits + 31) / 32, ErrorKind::InvalidField("bitset block count", block_count as i64));
        let mut blocks = Vec::with_capacity(block_count);
        for _ in 0..block_count {
            blocks.push(self.read_u32()?);
        }
        Ok(FixedBitSet::with_capacity_and_blocks(bits, blocks))
    }
}

impl<'a> TaggedReader<&'a [u8]> {
    /// Number of bytes left in the body.
    pub fn remaining(&self) -> usize {
        self.reader.len()
    }

    /// Whether a field appended by a newer writer is present.
    pub fn has_remaining(&self) -> bool {
        !self.reader.is_empty()
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ Segments

/// Writes `[TAGGED_SEGMENT_MARKER][tagged value]`. Returns the number of bytes written.
pub fn write_segment<W: Write, T: Tagged>(writer: W, tags: &'static Tags, value: &T) -> Result<u64> {
    let mut out = TaggedWriter::new(writer, tags);
    out.write_u32(TAGGED_SEGMENT_MARKER)?;
    out.write(value)?;
    Ok(out.cursor())
}

/// Reads a segment written by [`write_segment`]. The marker is verified before anything else is decoded.
///
/// `cursor` is the file position of `reader`, used in diagnostics. `what` names the segment in errors.
///
/// [`write_segment`]: ./fn.write_segment.html
pub fn read_segment<R: Read, T: Tagged>(reader: R, cursor: u64, tags: &'static Tags, what: &'static str) -> Result<T> {
    let mut input = TaggedReader::new(reader, cursor, tags);
    let marker = input.read_u32()?;
    ensure!(marker == TAGGED_SEGMENT_MARKER, ErrorKind::MarkerMismatch(what, TAGGED_SEGMENT_MARKER, marker));
    input.read()
}

//}}}
