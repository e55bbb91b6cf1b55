//! The coverage segment.
//!
//! ```text
//! [COVERAGE_MARKER: u32][hit area length: u64][per-test area length: u64]
//! [slot count: u32][hit count: u32 × slot count]
//! [per-test coverage segment]
//! ```
//!
//! A registry has at most one coverage segment, placed right after the header. It is only written when the whole
//! file is rewritten.

use error::*;
use format::lazy::{Channel, Lazy};
use format::tagged::{read_segment, write_segment, TaggedReader, TaggedWriter, REGISTRY_TAGS};
use recorder::PerTestCoverage;
use update::CoverageData;

use std::io::{Read, Write};
use std::path::Path;

/// Marker at the start of the coverage segment.
pub const COVERAGE_MARKER: u32 = 0x000b_4b00;

/// Size of the fixed prefix of the coverage segment.
pub const COVERAGE_HEADER_SIZE: u64 = 20;

/// The fixed prefix of the coverage segment.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct CoverageHeader {
    pub hits_len: u64,
    pub per_test_len: u64,
}

impl CoverageHeader {
    /// Reads the prefix at the current position of `reader`, which is at file position `cursor`.
    pub fn read_from<R: Read>(reader: R, cursor: u64) -> Result<CoverageHeader> {
        let mut input = TaggedReader::new(reader, cursor, &REGISTRY_TAGS);
        let marker = input.read_u32()?;
        ensure!(marker == COVERAGE_MARKER, ErrorKind::MarkerMismatch("coverage segment", COVERAGE_MARKER, marker));
        let header = CoverageHeader {
            hits_len: input.read_u64()?,
            per_test_len: input.read_u64()?,
        };
        ensure!(header.hits_len >= 4 && header.hits_len % 4 == 0, ErrorKind::InvalidField("coverage hit area length", header.hits_len as i64));
        trace!("coverage @ 0x{:x}: {:?}", cursor, header);
        Ok(header)
    }

    /// File position right after a coverage segment starting at `location`, or `None` if it overflows.
    pub fn end(&self, location: u64) -> Option<u64> {
        location.checked_add(COVERAGE_HEADER_SIZE)?.checked_add(self.hits_len)?.checked_add(self.per_test_len)
    }

    /// Like [`end()`](#method.end), but the segment must also fit in the `file_len` bytes of the registry at `path`.
    pub fn end_within(&self, path: &Path, location: u64, file_len: u64) -> Result<u64> {
        match self.end(location) {
            Some(end) if end <= file_len => Ok(end),
            _ => {
                let reason = format!(
                    "coverage @ 0x{:x}: {} + {} bytes overrun the file of {} bytes",
                    location, self.hits_len, self.per_test_len, file_len
                );
                bail!(ErrorKind::CorruptedRegistry(path.to_owned(), reason))
            },
        }
    }
}

/// Writes the coverage segment. Returns the number of bytes written.
pub fn write_coverage<W: Write>(writer: W, data: &CoverageData) -> Result<u64> {
    let mut per_test = Vec::new();
    write_segment(&mut per_test, &REGISTRY_TAGS, &data.per_test)?;

    let mut out = TaggedWriter::new(writer, &REGISTRY_TAGS);
    out.write_u32(COVERAGE_MARKER)?;
    out.write_u64(4 + 4 * data.hit_counts.len() as u64)?;
    out.write_u64(per_test.len() as u64)?;
    out.write_len("coverage slot count", data.hit_counts.len())?;
    for count in &data.hit_counts {
        out.write_u32(*count)?;
    }
    out.write_bytes(&per_test)?;
    debug!("write coverage: {} slots, {} tests, {} bytes", data.hit_counts.len(), data.per_test.recordings().len(), out.cursor());
    Ok(out.cursor())
}

fn load_hit_counts(reader: &mut Read, cursor: u64) -> Result<Vec<u32>> {
    let mut input = TaggedReader::new(reader, cursor, &REGISTRY_TAGS);
    let count = input.read_u32()?;
    let mut hits = Vec::with_capacity(count.min(1 << 20) as usize);
    for _ in 0..count {
        hits.push(input.read_u32()?);
    }
    Ok(hits)
}

fn load_per_test(reader: &mut Read, cursor: u64) -> Result<PerTestCoverage> {
    read_segment(reader, cursor, &REGISTRY_TAGS, "per-test coverage")
}

/// The coverage segment read from a registry file.
#[derive(Debug)]
pub struct CoverageSegment<'c> {
    location: u64,
    end: u64,
    header: CoverageHeader,
    hit_counts: Lazy<'c, Vec<u32>>,
    per_test: Lazy<'c, PerTestCoverage>,
}

impl<'c> CoverageSegment<'c> {
    /// Reads the segment at `location`. Hit counts and per-test coverage are decoded lazily.
    pub fn read(channel: &'c Channel, location: u64) -> Result<CoverageSegment<'c>> {
        let (header, slot_count) = channel.read_at(location, |reader, cursor| {
            let header = CoverageHeader::read_from(&mut *reader, cursor)?;
            let mut input = TaggedReader::new(reader, cursor + COVERAGE_HEADER_SIZE, &REGISTRY_TAGS);
            Ok((header, input.read_u32()?))
        })?;
        if 4 + 4 * u64::from(slot_count) != header.hits_len {
            let reason = format!("coverage @ 0x{:x}: {} slots do not fill {} bytes", location, slot_count, header.hits_len);
            bail!(ErrorKind::CorruptedRegistry(channel.path().to_owned(), reason));
        }
        let end = header.end_within(channel.path(), location, channel.len()?)?;
        let hits_location = location + COVERAGE_HEADER_SIZE;
        Ok(CoverageSegment {
            location,
            end,
            header,
            hit_counts: Lazy::deferred(channel, hits_location, load_hit_counts),
            per_test: Lazy::deferred(channel, hits_location + header.hits_len, load_per_test),
        })
    }

    pub fn location(&self) -> u64 {
        self.location
    }

    /// File position right after the segment.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of slots with a hit count.
    pub fn slot_count(&self) -> usize {
        ((self.header.hits_len - 4) / 4) as usize
    }

    pub fn hit_counts(&self) -> Result<&[u32]> {
        self.hit_counts.get().map(|v| &**v)
    }

    pub fn per_test(&self) -> Result<&PerTestCoverage> {
        self.per_test.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recorder::{PerTestRecording, TestId, ExitStatus};
    use utils::bitset_from_slots;
    use tempfile::NamedTempFile;

    fn sample() -> CoverageData {
        let mut per_test = PerTestCoverage::new();
        per_test.push(PerTestRecording {
            test: TestId::new("app.MainTest", 0, 1),
            method_name: "testMain".to_owned(),
            runtime_test_name: Some("testMain[0]".to_owned()),
            start_ts: 10,
            end_ts: 20,
            duration_nanos: 9_500_000,
            exit_status: ExitStatus::Passed,
            error: None,
            slots: bitset_from_slots(5, vec![0, 4]),
        });
        CoverageData::new(vec![3, 0, 0, 1, 7], per_test)
    }

    #[test]
    fn test_coverage_round_trip() {
        (|| -> Result<()> {
            let data = sample();
            let mut file = NamedTempFile::new()?;
            file.write_all(&[0; 16])?;
            let written = write_coverage(&mut file, &data)?;
            file.flush()?;

            let channel = Channel::open_read(file.path())?;
            let segment = CoverageSegment::read(&channel, 16)?;
            assert_eq!(segment.end(), 16 + written);
            assert_eq!(segment.slot_count(), 5);
            assert_eq!(segment.hit_counts()?, &[3, 0, 0, 1, 7][..]);
            assert_eq!(*segment.per_test()?, data.per_test);
            Ok(())
        })().unwrap();
    }

    #[test]
    fn test_inconsistent_hit_length() {
        (|| -> Result<()> {
            let mut buf = Vec::new();
            write_coverage(&mut buf, &sample())?;
            // claim 5 slots in a 6-slot area.
            buf[11] += 4;
            let mut file = NamedTempFile::new()?;
            file.write_all(&buf)?;
            file.flush()?;

            let channel = Channel::open_read(file.path())?;
            match *CoverageSegment::read(&channel, 0).unwrap_err().kind() {
                ErrorKind::CorruptedRegistry(..) => {},
                ref k => panic!("unexpected error {:?}", k),
            }

            buf[11] -= 2;
            let mut file = NamedTempFile::new()?;
            file.write_all(&buf)?;
            file.flush()?;
            let channel = Channel::open_read(file.path())?;
            match *CoverageSegment::read(&channel, 0).unwrap_err().kind() {
                ErrorKind::InvalidField("coverage hit area length", 26) => {},
                ref k => panic!("unexpected error {:?}", k),
            }
            Ok(())
        })().unwrap();
    }

    #[test]
    fn test_segment_overruns_file() {
        (|| -> Result<()> {
            let mut buf = Vec::new();
            write_coverage(&mut buf, &sample())?;
            let mut damaged = buf.clone();
            for b in &mut damaged[12..20] {
                *b = 0xff;
            }
            let header = CoverageHeader::read_from(&damaged[..], 0)?;
            assert_eq!(header.end(0), None);

            let mut file = NamedTempFile::new()?;
            file.write_all(&damaged)?;
            file.flush()?;
            let channel = Channel::open_read(file.path())?;
            match *CoverageSegment::read(&channel, 0).unwrap_err().kind() {
                ErrorKind::CorruptedRegistry(_, ref reason) => assert!(reason.contains("overrun the file")),
                ref k => panic!("unexpected error {:?}", k),
            }

            // a truncated segment is rejected up front, not when the per-test area is first read.
            let mut file = NamedTempFile::new()?;
            file.write_all(&buf[..buf.len() - 1])?;
            file.flush()?;
            let channel = Channel::open_read(file.path())?;
            match *CoverageSegment::read(&channel, 0).unwrap_err().kind() {
                ErrorKind::CorruptedRegistry(..) => {},
                ref k => panic!("unexpected error {:?}", k),
            }
            Ok(())
        })().unwrap();
    }
}
