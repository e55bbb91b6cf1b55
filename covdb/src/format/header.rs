//! The fixed-size header at offset 0 of every registry file.
//!
//! All fields are big-endian:
//!
//! | offset | type      | field                                         |
//! |-------:|-----------|-----------------------------------------------|
//! |      0 | u64       | magic `0xCAFEFEED`                            |
//! |      8 | u32       | format revision                               |
//! |     12 | u32       | access mode                                   |
//! |     16 | i64       | version                                       |
//! |     24 | i32       | slot count                                    |
//! |     28 | i64       | coverage location, `-1` if absent             |
//! |     36 | i64       | last session location, `-1` if absent         |
//! |     44 | u32       | name length in characters                     |
//! |     48 | u32 × 64  | name, one code point each, zero padded        |
//! |    304 | u32       | CRC-32 of bytes 12 to 304                     |
//!
//! The header size never changes, so rewriting it never moves the segments behind it.

use error::*;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use crc32fast;

use std::fs::File;
use std::{i32, i64, io};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// File magic.
pub const REG_MAGIC: u64 = 0xcafe_feed;

/// The only format revision understood by this crate.
pub const REG_FORMAT_VERSION: u32 = 40502;

/// Maximum number of characters of the registry name. Longer names are truncated on write.
pub const MAX_NAME_LENGTH: usize = 64;

/// Size of the encoded header in bytes.
pub const HEADER_SIZE: u64 = 48 + 4 * MAX_NAME_LENGTH as u64 + 4;

const CHECKSUM_START: usize = 12;
const CHECKSUM_END: usize = HEADER_SIZE as usize - 4;
const NONE_LOCATION: i64 = -1;

/// Whether the registry may be appended to.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AccessMode {
    ReadWrite = 0,
    ReadOnly = 1,
}

impl Default for AccessMode {
    fn default() -> AccessMode {
        AccessMode::ReadWrite
    }
}

impl AccessMode {
    fn from_u32(value: u32) -> Option<AccessMode> {
        match value {
            0 => Some(AccessMode::ReadWrite),
            1 => Some(AccessMode::ReadOnly),
            _ => None,
        }
    }
}

/// The decoded registry header.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct RegHeader {
    pub access_mode: AccessMode,
    /// Version of the latest committed batch.
    pub version: u64,
    /// Maximum number of coverage slots over all sessions.
    pub slot_count: u32,
    /// Offset of the coverage segment.
    pub coverage_location: Option<u64>,
    /// Offset of the first byte of the latest session segment.
    pub last_session_location: Option<u64>,
    pub name: String,
}

/// Computes the checksum of an encoded header.
pub fn checksum(header: &[u8]) -> u32 {
    crc32fast::hash(&header[CHECKSUM_START..CHECKSUM_END])
}

fn encode_location(what: &'static str, location: Option<u64>) -> Result<i64> {
    match location {
        None => Ok(NONE_LOCATION),
        Some(loc) if loc >= HEADER_SIZE && loc <= i64::MAX as u64 => Ok(loc as i64),
        Some(loc) => bail!(ErrorKind::InvalidField(what, loc as i64)),
    }
}

fn decode_location(what: &'static str, location: i64) -> Result<Option<u64>> {
    match location {
        NONE_LOCATION => Ok(None),
        loc if loc >= HEADER_SIZE as i64 => Ok(Some(loc as u64)),
        loc => bail!(ErrorKind::InvalidField(what, loc)),
    }
}

impl RegHeader {
    /// Header of a registry without any content.
    pub fn new(name: &str, access_mode: AccessMode) -> RegHeader {
        RegHeader {
            access_mode,
            version: 0,
            slot_count: 0,
            coverage_location: None,
            last_session_location: None,
            name: name.to_owned(),
        }
    }

    /// Encodes the header into its fixed-size representation.
    pub fn encode(&self) -> Result<Vec<u8>> {
        ensure!(self.version <= i64::MAX as u64, ErrorKind::InvalidField("header version", self.version as i64));
        ensure!(self.slot_count <= i32::MAX as u32, ErrorKind::InvalidField("header slot count", i64::from(self.slot_count)));

        let mut buf = Vec::with_capacity(HEADER_SIZE as usize);
        buf.write_u64::<BigEndian>(REG_MAGIC)?;
        buf.write_u32::<BigEndian>(REG_FORMAT_VERSION)?;
        buf.write_u32::<BigEndian>(self.access_mode as u32)?;
        buf.write_i64::<BigEndian>(self.version as i64)?;
        buf.write_i32::<BigEndian>(self.slot_count as i32)?;
        buf.write_i64::<BigEndian>(encode_location("coverage location", self.coverage_location)?)?;
        buf.write_i64::<BigEndian>(encode_location("last session location", self.last_session_location)?)?;

        let name = self.name.chars().take(MAX_NAME_LENGTH).collect::<Vec<_>>();
        if name.len() < self.name.chars().count() {
            debug!("registry name truncated to {} characters", MAX_NAME_LENGTH);
        }
        buf.write_u32::<BigEndian>(name.len() as u32)?;
        for i in 0..MAX_NAME_LENGTH {
            buf.write_u32::<BigEndian>(name.get(i).map_or(0, |c| *c as u32))?;
        }

        let sum = checksum(&buf[..]);
        buf.write_u32::<BigEndian>(sum)?;
        debug_assert_eq!(buf.len() as u64, HEADER_SIZE);
        Ok(buf)
    }

    /// Writes the header at the current position of `writer`.
    pub fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        let buf = self.encode()?;
        writer.write_all(&buf)?;
        Ok(())
    }

    /// Writes the header at offset 0 of `channel`.
    pub fn write_at_start<W: Write + Seek>(&self, mut channel: W) -> Result<()> {
        channel.seek(SeekFrom::Start(0))?;
        debug!("write header: version = {}, slot count = {}, last session = {:?}", self.version, self.slot_count, self.last_session_location);
        self.write(channel)
    }

    /// Reads the header of the registry file at `path`.
    pub fn read_from_path(path: &Path) -> Result<RegHeader> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => bail!(ErrorKind::NoSuchRegistry(path.to_owned())),
            Err(e) => return Err(e.into()),
        };
        RegHeader::read_from(path, file)
    }

    /// Reads the header from offset 0 of an open channel. `path` is used in error messages.
    pub fn read_from_channel<R: Read + Seek>(path: &Path, mut channel: R) -> Result<RegHeader> {
        channel.seek(SeekFrom::Start(0))?;
        RegHeader::read_from(path, channel)
    }

    /// Reads the header from the current position of `reader`. `path` is used in error messages.
    pub fn read_from<R: Read>(path: &Path, mut reader: R) -> Result<RegHeader> {
        let mut buf = [0u8; HEADER_SIZE as usize];
        match reader.read_exact(&mut buf) {
            Ok(()) => {},
            Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                bail!(ErrorKind::CorruptedRegistry(path.to_owned(), "truncated header".to_owned()));
            },
            Err(e) => return Err(e.into()),
        }
        RegHeader::decode(path, &buf)
    }

    fn decode(path: &Path, buf: &[u8]) -> Result<RegHeader> {
        let magic = BigEndian::read_u64(&buf[0..]);
        if magic != REG_MAGIC {
            bail!(ErrorKind::CorruptedRegistry(path.to_owned(), format!("bad file magic 0x{:x}", magic)));
        }
        let revision = BigEndian::read_u32(&buf[8..]);
        if revision != REG_FORMAT_VERSION {
            bail!(ErrorKind::IncompatibleFormat(path.to_owned(), revision, REG_FORMAT_VERSION));
        }
        let expected_sum = BigEndian::read_u32(&buf[CHECKSUM_END..]);
        let actual_sum = checksum(buf);
        if expected_sum != actual_sum {
            bail!(ErrorKind::CorruptedRegistry(path.to_owned(), format!("header checksum 0x{:08x} != 0x{:08x}", actual_sum, expected_sum)));
        }

        let mode = BigEndian::read_u32(&buf[12..]);
        let access_mode = match AccessMode::from_u32(mode) {
            Some(m) => m,
            None => bail!(ErrorKind::InvalidField("header access mode", i64::from(mode))),
        };
        let version = BigEndian::read_i64(&buf[16..]);
        ensure!(version >= 0, ErrorKind::InvalidField("header version", version));
        let slot_count = BigEndian::read_i32(&buf[24..]);
        ensure!(slot_count >= 0, ErrorKind::InvalidField("header slot count", i64::from(slot_count)));
        let coverage_location = decode_location("coverage location", BigEndian::read_i64(&buf[28..]))?;
        let last_session_location = decode_location("last session location", BigEndian::read_i64(&buf[36..]))?;

        let name_len = BigEndian::read_u32(&buf[44..]) as usize;
        ensure!(name_len <= MAX_NAME_LENGTH, ErrorKind::InvalidField("header name length", name_len as i64));
        let mut name = String::with_capacity(name_len);
        for i in 0..name_len {
            let code = BigEndian::read_u32(&buf[48 + 4 * i..]);
            match ::std::char::from_u32(code) {
                Some(c) => name.push(c),
                None => bail!(ErrorKind::InvalidField("header name character", i64::from(code))),
            }
        }

        let header = RegHeader {
            access_mode,
            version: version as u64,
            slot_count: slot_count as u32,
            coverage_location,
            last_session_location,
            name,
        };
        trace!("read header: {:?}", header);
        Ok(header)
    }
}
