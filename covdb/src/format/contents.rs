//! Read access to a committed registry.

use error::*;
use format::coverage::{CoverageHeader, CoverageSegment};
use format::file_record::FileInfoRecord;
use format::header::{RegHeader, HEADER_SIZE};
use format::lazy::Channel;
use format::session::InstrSession;

use std::collections::BTreeMap;
use std::path::Path;

/// An open, read-only view of a registry file.
///
/// Everything returned by this view borrows its file handle, which is closed when the view is dropped.
#[derive(Debug)]
pub struct RegContents {
    channel: Channel,
    header: RegHeader,
    min_session_position: u64,
}

impl RegContents {
    /// Opens the registry at `path` and reads its header.
    pub fn open(path: &Path) -> Result<RegContents> {
        let channel = Channel::open_read(path)?;
        let header = channel.read_at(0, |reader, _| RegHeader::read_from(path, reader))?;
        let min_session_position = match header.coverage_location {
            Some(location) => {
                let coverage = channel.read_at(location, |reader, cursor| CoverageHeader::read_from(reader, cursor))?;
                coverage.end_within(path, location, channel.len()?)?
            },
            None => HEADER_SIZE,
        };
        debug!("open registry {}: version = {}, sessions from 0x{:x}", path.display(), header.version, min_session_position);
        Ok(RegContents {
            channel,
            header,
            min_session_position,
        })
    }

    pub fn header(&self) -> &RegHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        self.channel.path()
    }

    /// File position of the first session.
    pub fn min_session_position(&self) -> u64 {
        self.min_session_position
    }

    fn corrupted(&self, reason: String) -> Error {
        ErrorKind::CorruptedRegistry(self.path().to_owned(), reason).into()
    }

    /// All sessions, oldest first.
    ///
    /// Bytes after the latest session (left by an interrupted append) are ignored.
    pub fn sessions(&self) -> Result<Vec<InstrSession>> {
        let last = match self.header.last_session_location {
            Some(last) => last,
            None => return Ok(Vec::new()),
        };

        let mut sessions = Vec::new();
        let mut pos = self.min_session_position;
        loop {
            if pos > last {
                return Err(self.corrupted(format!("session chain skips over the latest session at 0x{:x}", last)));
            }
            let session = InstrSession::read(&self.channel, pos).at_index(sessions.len())?;
            let location = pos;
            pos = session.end();
            sessions.push(session);
            if location == last {
                break;
            }
        }

        let len = self.channel.len()?;
        if len > pos {
            warn!("{} trailing bytes after the latest session of {}", len - pos, self.path().display());
        }
        Ok(sessions)
    }

    /// The most recently appended session.
    pub fn latest_session(&self) -> Result<Option<InstrSession>> {
        match self.header.last_session_location {
            Some(last) => InstrSession::read(&self.channel, last).map(Some),
            None => Ok(None),
        }
    }

    /// The latest record of every file. A file recorded by several sessions is taken from the newest one.
    pub fn latest_file_infos(&self) -> Result<BTreeMap<String, FileInfoRecord>> {
        let mut records = BTreeMap::new();
        for session in self.sessions()? {
            for record in session.into_file_infos() {
                records.insert(record.name().to_owned(), record);
            }
        }
        Ok(records)
    }

    /// The coverage segment, if the registry has one.
    pub fn coverage(&self) -> Result<Option<CoverageSegment>> {
        match self.header.coverage_location {
            Some(location) => CoverageSegment::read(&self.channel, location).map(Some),
            None => Ok(None),
        }
    }

    /// Closes the file handle.
    pub fn close(self) {
        debug!("close registry {}", self.path().display());
    }
}
