//! Values decoded on first access.

use error::*;

use once_cell::sync::OnceCell;

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A read-only handle to a registry file, shared by every lazy value decoded from it.
///
/// The file is closed when the channel is dropped.
pub struct Channel {
    path: PathBuf,
    file: Mutex<File>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Channel").field("path", &self.path).finish()
    }
}

impl Channel {
    pub fn open_read(path: &Path) -> Result<Channel> {
        let file = File::open(path)?;
        Ok(Channel {
            path: path.to_owned(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total size of the file in bytes.
    pub fn len(&self) -> Result<u64> {
        let file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        Ok(file.metadata()?.len())
    }

    /// Runs `f` with a reader positioned at `offset`. The second argument of `f` is `offset` itself, for
    /// diagnostics.
    pub fn read_at<T, F>(&self, offset: u64, f: F) -> Result<T>
    where
        F: FnOnce(&mut Read, u64) -> Result<T>,
    {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.seek(SeekFrom::Start(offset))?;
        let mut reader = BufReader::new(&mut *file);
        f(&mut reader, offset)
    }
}

/// Decoder of a deferred value, reading from the value's offset.
pub type Loader<T> = fn(&mut Read, u64) -> Result<T>;

/// A value which is either already in memory, or stored in a channel at a known offset.
///
/// A deferred value is decoded on the first successful [`get()`] and cached. Failures are not cached, so a
/// corrupted payload fails every time it is accessed.
///
/// [`get()`]: #method.get
pub enum Lazy<'c, T> {
    Preloaded(T),
    Deferred {
        channel: &'c Channel,
        offset: u64,
        load: Loader<T>,
        cell: OnceCell<T>,
    },
}

impl<'c, T: fmt::Debug> fmt::Debug for Lazy<'c, T> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Lazy::Preloaded(ref value) => fmt.debug_tuple("Preloaded").field(value).finish(),
            Lazy::Deferred { offset, ref cell, .. } => fmt.debug_struct("Deferred").field("offset", &offset).field("value", &cell.get()).finish(),
        }
    }
}

impl<'c, T> Lazy<'c, T> {
    pub fn deferred(channel: &'c Channel, offset: u64, load: Loader<T>) -> Lazy<'c, T> {
        Lazy::Deferred {
            channel,
            offset,
            load,
            cell: OnceCell::new(),
        }
    }

    /// Obtains the value, decoding it if needed.
    pub fn get(&self) -> Result<&T> {
        match *self {
            Lazy::Preloaded(ref value) => Ok(value),
            Lazy::Deferred { channel, offset, load, ref cell } => cell.get_or_try_init(|| {
                debug!("lazy load @ 0x{:x} from {}", offset, channel.path().display());
                channel.read_at(offset, load)
            }),
        }
    }

    /// Whether the value is already in memory.
    pub fn is_loaded(&self) -> bool {
        match *self {
            Lazy::Preloaded(_) => true,
            Lazy::Deferred { ref cell, .. } => cell.get().is_some(),
        }
    }
}
