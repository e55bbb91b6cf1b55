//! Committing updates to a registry file.
//!
//! A registry is either [`Fresh`] (nothing committed yet, or about to be rewritten from scratch) or [`Updatable`]
//! (wrapping a committed file at a known header version). Saving consumes the value and returns the committed state:
//!
//! ```text
//! FreshRegFile ──save──▶ UpdatableRegFile ──save──▶ UpdatableRegFile ──save──▶ …
//! ```
//!
//! Writers never lock the file. An updatable registry remembers the header version it was read at, and refuses to
//! append when the on-disk version differs, reporting [`ConcurrentModification`]. The caller should then reopen the
//! registry and recompute its update.
//!
//! A registry can only be saved once:
//!
//! ```compile_fail
//! # extern crate covdb;
//! # use covdb::{RegistryFile, RegistryUpdate};
//! fn twice(registry: RegistryFile, updates: Vec<RegistryUpdate>) {
//!     let _ = registry.save(updates.clone());
//!     let _ = registry.save(updates);
//! }
//! # fn main() {}
//! ```
//!
//! [`Fresh`]: ./enum.RegistryFile.html#variant.Fresh
//! [`Updatable`]: ./enum.RegistryFile.html#variant.Updatable
//! [`ConcurrentModification`]: ../../error/enum.ErrorKind.html#variant.ConcurrentModification

use config::temp_path;
use error::*;
use format::contents::RegContents;
use format::coverage::{write_coverage, CoverageHeader};
use format::header::{AccessMode, RegHeader, HEADER_SIZE};
use format::session::{write_session, SessionHeader};
use update::{CoverageData, RegistryUpdate};
use utils::{remove_file_if_exists, set_modified_millis, sync_parent_dir};

use std::cmp::max;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Writes `deltas` as consecutive sessions at the current position of `file`, which is at file position `start`.
/// Updates the session pointer, slot count and version of `header`. Returns the position after the last session.
fn append_sessions(file: &File, start: u64, header: &mut RegHeader, deltas: &[RegistryUpdate]) -> Result<u64> {
    let mut writer = BufWriter::new(file);
    let mut pos = start;
    for delta in deltas {
        header.last_session_location = Some(pos);
        pos += write_session(&mut writer, delta)?;
        header.slot_count = max(header.slot_count, delta.slot_count());
        header.version = delta.version();
    }
    writer.flush()?;
    Ok(pos)
}

fn inaccessible(path: &Path, reason: &'static str) -> Error {
    ErrorKind::InaccessibleRegFile(path.to_owned(), reason).into()
}

/// Checks that `path` can be created or replaced.
fn check_writable(path: &Path) -> Result<()> {
    // a lookup through a regular file fails with ENOTDIR rather than ENOENT; the ancestor walk finds the culprit.
    let mut unexplained = None;
    match fs::metadata(path) {
        Ok(ref m) if m.is_dir() => return Err(inaccessible(path, "is a directory")),
        Ok(ref m) if m.permissions().readonly() => return Err(inaccessible(path, "is not writable")),
        Ok(_) => {},
        Err(ref e) if e.kind() == io::ErrorKind::NotFound => {},
        Err(ref e) if e.kind() == io::ErrorKind::PermissionDenied => return Err(inaccessible(path, "is not accessible")),
        Err(e) => unexplained = Some(e),
    }

    // the nearest existing ancestor must be a writable directory.
    let mut ancestor = path.parent();
    while let Some(dir) = ancestor {
        if dir.as_os_str().is_empty() {
            break;
        }
        match fs::metadata(dir) {
            Ok(ref m) if !m.is_dir() => return Err(inaccessible(path, "has a parent which is not a directory")),
            Ok(ref m) if m.permissions().readonly() => return Err(inaccessible(path, "is in a read-only directory")),
            Ok(_) => break,
            Err(ref e) if e.kind() == io::ErrorKind::PermissionDenied => return Err(inaccessible(path, "is not accessible")),
            Err(_) => ancestor = dir.parent(),
        }
    }
    match unexplained {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

//----------------------------------------------------------------------------------------------------------------------
//{{{ FreshRegFile

/// A registry to be written from scratch.
#[derive(Debug)]
pub struct FreshRegFile {
    path: PathBuf,
    access_mode: AccessMode,
    name: String,
    coverage: Option<CoverageData>,
}

impl FreshRegFile {
    pub fn new(path: PathBuf, access_mode: AccessMode, name: &str) -> FreshRegFile {
        FreshRegFile {
            path,
            access_mode,
            name: name.to_owned(),
            coverage: None,
        }
    }

    /// Also writes a coverage segment when saved.
    pub fn with_coverage(mut self, coverage: CoverageData) -> FreshRegFile {
        self.coverage = Some(coverage);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    /// Writes the registry with one session per update.
    ///
    /// The content is written to `<path>.tmp` and then renamed over `path`, so other processes see either the
    /// previous file or the complete new one.
    pub fn save(self, deltas: Vec<RegistryUpdate>) -> Result<UpdatableRegFile> {
        ensure!(!deltas.is_empty(), ErrorKind::EmptyUpdateBatch);
        check_writable(&self.path)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = temp_path(&self.path);
        let header = match self.write_to(&tmp, &deltas).and_then(|h| {
            fs::rename(&tmp, &self.path)?;
            Ok(h)
        }) {
            Ok(h) => h,
            Err(e) => {
                if let Err(e2) = remove_file_if_exists(&tmp) {
                    warn!("cannot remove {}: {}", tmp.display(), e2);
                }
                return Err(e);
            },
        };
        if let Err(e) = sync_parent_dir(&self.path) {
            warn!("cannot sync directory of {}: {}", self.path.display(), e);
        }

        debug!("created registry {}: version = {}, slot count = {}", self.path.display(), header.version, header.slot_count);
        Ok(UpdatableRegFile {
            path: self.path,
            header,
        })
    }

    fn write_to(&self, tmp: &Path, deltas: &[RegistryUpdate]) -> Result<RegHeader> {
        let file = OpenOptions::new().write(true).create(true).truncate(true).open(tmp)?;
        let mut header = RegHeader::new(&self.name, self.access_mode);

        let mut pos = HEADER_SIZE;
        {
            let mut writer = BufWriter::new(&file);
            header.write(&mut writer)?;
            if let Some(ref coverage) = self.coverage {
                header.coverage_location = Some(pos);
                pos += write_coverage(&mut writer, coverage)?;
            }
            writer.flush()?;
        }
        append_sessions(&file, pos, &mut header, deltas)?;

        header.write_at_start(&file)?;
        file.sync_all()?;
        set_modified_millis(&file, tmp, header.version);
        Ok(header)
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ UpdatableRegFile

/// A committed registry at a known header version.
#[derive(Debug)]
pub struct UpdatableRegFile {
    path: PathBuf,
    header: RegHeader,
}

impl UpdatableRegFile {
    /// Opens a committed registry and reads its header.
    pub fn open(path: &Path) -> Result<UpdatableRegFile> {
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => bail!(ErrorKind::NoSuchRegistry(path.to_owned())),
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Err(inaccessible(path, "is not a file"));
        }
        let file = match File::open(path) {
            Ok(f) => f,
            Err(ref e) if e.kind() == io::ErrorKind::PermissionDenied => return Err(inaccessible(path, "is not readable")),
            Err(e) => return Err(e.into()),
        };
        let header = RegHeader::read_from(path, BufReader::new(file))?;
        debug!("open registry {}: version = {}", path.display(), header.version);
        Ok(UpdatableRegFile {
            path: path.to_owned(),
            header,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The header as of the last read or commit.
    pub fn header(&self) -> &RegHeader {
        &self.header
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn access_mode(&self) -> AccessMode {
        self.header.access_mode
    }

    pub fn version(&self) -> u64 {
        self.header.version
    }

    /// Whether an append would currently succeed. Another process may commit right after this returns `true`, so
    /// [`save()`](#method.save) can still fail.
    pub fn is_appendable(&self) -> bool {
        if self.header.access_mode == AccessMode::ReadOnly {
            return false;
        }
        match RegHeader::read_from_path(&self.path) {
            Ok(on_disk) => on_disk.version == self.header.version,
            Err(e) => {
                debug!("cannot read header of {}: {}", self.path.display(), e);
                false
            },
        }
    }

    /// Opens the registry for reading. The handle is closed when the returned value is dropped.
    pub fn start_reading(&self) -> Result<RegContents> {
        RegContents::open(&self.path)
    }

    /// Runs `consumer` on the contents of the registry, closing the file afterwards.
    pub fn read_contents<T, F>(&self, consumer: F) -> Result<T>
    where
        F: FnOnce(&RegContents) -> Result<T>,
    {
        let contents = self.start_reading()?;
        let res = consumer(&contents);
        contents.close();
        res
    }

    /// Prepares a full rewrite keeping the name and access mode, e.g. to store a new coverage segment.
    pub fn with_coverage(self, coverage: CoverageData) -> FreshRegFile {
        FreshRegFile::new(self.path, self.header.access_mode, &self.header.name).with_coverage(coverage)
    }

    /// Appends one session per update and commits the new header.
    ///
    /// Fails with `ReadOnlyRegistry` before the file is opened if the registry is read-only, and with
    /// `ConcurrentModification` before anything is written if another process has committed since this value was
    /// created. If writing fails midway the header is not rewritten, so the committed state is unchanged.
    pub fn save(self, deltas: Vec<RegistryUpdate>) -> Result<UpdatableRegFile> {
        ensure!(!deltas.is_empty(), ErrorKind::EmptyUpdateBatch);
        if self.header.access_mode == AccessMode::ReadOnly {
            bail!(ErrorKind::ReadOnlyRegistry(self.path));
        }

        let mut file = match OpenOptions::new().read(true).write(true).open(&self.path) {
            Ok(f) => f,
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => bail!(ErrorKind::NoSuchRegistry(self.path)),
            Err(ref e) if e.kind() == io::ErrorKind::PermissionDenied => return Err(inaccessible(&self.path, "is not writable")),
            Err(e) => return Err(e.into()),
        };
        let mut header = RegHeader::read_from_channel(&self.path, &mut file)?;
        if header.version != self.header.version {
            bail!(ErrorKind::ConcurrentModification(header.version, self.header.version));
        }

        let file_len = file.metadata()?.len();
        let append_at = match (header.last_session_location, header.coverage_location) {
            (Some(location), _) => {
                file.seek(SeekFrom::Start(location))?;
                SessionHeader::read_from(BufReader::new(&file), location)?.end_within(&self.path, location, file_len)?
            },
            (None, Some(location)) => {
                file.seek(SeekFrom::Start(location))?;
                CoverageHeader::read_from(BufReader::new(&file), location)?.end_within(&self.path, location, file_len)?
            },
            (None, None) => HEADER_SIZE,
        };

        file.seek(SeekFrom::Start(append_at))?;
        let end = append_sessions(&file, append_at, &mut header, &deltas)?;
        file.set_len(end)?;
        file.sync_data()?;
        header.write_at_start(&file)?;
        file.sync_all()?;
        set_modified_millis(&file, &self.path, header.version);

        debug!("appended {} sessions to {} @ 0x{:x}: version = {}", deltas.len(), self.path.display(), append_at, header.version);
        Ok(UpdatableRegFile {
            path: self.path,
            header,
        })
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ RegistryFile

/// A registry in either state.
#[derive(Debug)]
pub enum RegistryFile {
    Fresh(FreshRegFile),
    Updatable(UpdatableRegFile),
}

impl RegistryFile {
    /// Opens the registry at `path` if it exists, or prepares a new one with the given access mode and name.
    ///
    /// An existing registry keeps the mode and name stored in its header.
    pub fn open(path: &Path, access_mode: AccessMode, name: &str) -> Result<RegistryFile> {
        match UpdatableRegFile::open(path) {
            Ok(updatable) => Ok(RegistryFile::Updatable(updatable)),
            Err(e) => {
                if let ErrorKind::NoSuchRegistry(_) = *e.kind() {
                    return Ok(RegistryFile::Fresh(FreshRegFile::new(path.to_owned(), access_mode, name)));
                }
                Err(e)
            },
        }
    }

    /// Commits the updates, consuming this value.
    pub fn save(self, deltas: Vec<RegistryUpdate>) -> Result<UpdatableRegFile> {
        match self {
            RegistryFile::Fresh(fresh) => fresh.save(deltas),
            RegistryFile::Updatable(updatable) => updatable.save(deltas),
        }
    }

    pub fn path(&self) -> &Path {
        match *self {
            RegistryFile::Fresh(ref fresh) => fresh.path(),
            RegistryFile::Updatable(ref updatable) => updatable.path(),
        }
    }

    pub fn name(&self) -> &str {
        match *self {
            RegistryFile::Fresh(ref fresh) => fresh.name(),
            RegistryFile::Updatable(ref updatable) => updatable.name(),
        }
    }

    pub fn access_mode(&self) -> AccessMode {
        match *self {
            RegistryFile::Fresh(ref fresh) => fresh.access_mode(),
            RegistryFile::Updatable(ref updatable) => updatable.access_mode(),
        }
    }

    /// A fresh registry is never appendable: it is always written from scratch.
    pub fn is_appendable(&self) -> bool {
        match *self {
            RegistryFile::Fresh(_) => false,
            RegistryFile::Updatable(ref updatable) => updatable.is_appendable(),
        }
    }
}

//}}}
