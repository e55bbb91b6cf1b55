//! Errors related to the `covdb` crate.
//!
//! Please see documentation of the [`error-chain` crate](https://docs.rs/error-chain/0.12.0/error_chain/) for detailed
//! usage.

use format::tagged::Tag;

use std::io;
use std::path::PathBuf;
use std::string::FromUtf8Error;

error_chain! {
    foreign_links {
        Io(io::Error) /** Wrapper of standard I/O error. */;
        FromUtf8(FromUtf8Error) /** Wrapper of UTF-8 decode error. */;
        Json(::serde_json::Error) #[cfg(feature="serde_json")] /** Wrapper of JSON error. */;
    }

    errors {
        /// The registry file is damaged: wrong file magic, truncated header, bad checksum or an inconsistent segment.
        CorruptedRegistry(path: PathBuf, reason: String) {
            description("corrupted registry")
            display("registry file {} is invalid ({}), please regenerate", path.display(), reason)
        }

        /// The registry was written by an incompatible revision of the file format.
        IncompatibleFormat(path: PathBuf, found: u32, supported: u32) {
            description("incompatible registry format")
            display("registry file {} has format revision {}, only {} is supported", path.display(), found, supported)
        }

        /// A record or segment did not start with its magic marker. The stream is misaligned or corrupt from this
        /// point on.
        MarkerMismatch(what: &'static str, expected: u32, actual: u32) {
            description("marker mismatch")
            display("{} did not start with marker 0x{:08x}, found 0x{:08x}", what, expected, actual)
        }

        /// A tagged value has a different tag than the one expected at this position.
        TagMismatch(expected: Tag, actual: Tag) {
            description("tag mismatch")
            display("expecting a value tagged {}, found {}", expected, actual)
        }

        /// A tagged value has a tag not registered in the schema of the segment.
        UnknownTag(tag: Tag) {
            description("unknown tag")
            display("unknown tag {} not recognized", tag)
        }

        /// A decoded field is outside its valid range.
        InvalidField(what: &'static str, value: i64) {
            description("invalid field")
            display("invalid value {} for {}", value, what)
        }

        /// Trying to open a registry file which does not exist.
        NoSuchRegistry(path: PathBuf) {
            description("no such registry")
            display("registry {} does not exist, please ensure the sources have been instrumented", path.display())
        }

        /// The registry path cannot be read or written: permissions, a directory in the way, or an unwritable parent.
        InaccessibleRegFile(path: PathBuf, reason: &'static str) {
            description("inaccessible registry file")
            display("registry {} {}", path.display(), reason)
        }

        /// The on-disk header version differs from the version this handle was created from. Another writer has
        /// committed since; reload the registry and recompute the update.
        ConcurrentModification(on_disk: u64, in_memory: u64) {
            description("concurrent registry modification")
            display("the on-disk registry version ({}) differs from the in-memory version ({})", on_disk, in_memory)
        }

        /// Trying to append to a registry marked read-only.
        ReadOnlyRegistry(path: PathBuf) {
            description("read-only registry")
            display("registry {} is read-only and cannot be updated", path.display())
        }

        /// `save()` was called without any update.
        EmptyUpdateBatch {
            description("at least one registry update is required for saving")
        }

        /// Reached the end of a tagged body. Usually not fatal.
        Eof {
            description("encountered end of tagged body")
        }
    }
}

//----------------------------------------------------------------------------------------------------------------------

/// A trait to log contextual information. When applied on an error value, a warning message will be printed out to
/// indicate an unexpected error.
pub trait At: Sized {
    /// Checks whether the error is caused by an unexpected EOF.
    fn is_eof(&self) -> bool;

    /// Checks whether a warning should be printed out.
    fn should_warn(&self) -> bool {
        !self.is_eof()
    }

    /// Marks the current error with file cursor information.
    fn at_cursor(self, cursor: u64) -> Self {
        if self.should_warn() {
            warn!("At file position {0} (0x{0:x}):", cursor)
        }
        self
    }

    /// Marks the current error with record index information.
    fn at_index(self, index: usize) -> Self {
        if self.should_warn() {
            warn!("At record index {}:", index)
        }
        self
    }
}

impl<T, E: At> At for ::std::result::Result<T, E> {
    fn is_eof(&self) -> bool {
        self.as_ref().err().map_or(false, E::is_eof)
    }

    fn should_warn(&self) -> bool {
        self.as_ref().err().map_or(false, E::should_warn)
    }
}

impl At for ErrorKind {
    fn is_eof(&self) -> bool {
        match *self {
            ErrorKind::Io(ref e) => e.is_eof(),
            ErrorKind::Eof => true,
            _ => false,
        }
    }
}

impl At for Error {
    fn is_eof(&self) -> bool {
        self.kind().is_eof()
    }
}

impl At for io::Error {
    fn is_eof(&self) -> bool {
        self.kind() == io::ErrorKind::UnexpectedEof
    }
}

impl ErrorKind {
    /// Whether this error means another writer committed first, so the caller may reload and retry.
    pub fn is_concurrent_modification(&self) -> bool {
        match *self {
            ErrorKind::ConcurrentModification(..) => true,
            _ => false,
        }
    }
}
