//! `covdb` stores the registry of an instrumented project: the static structure of every instrumented source file
//! (classes, methods, statements, branches, each owning one or more coverage *slots*) together with the hit counts of
//! the last flushed run.
//!
//! The registry is a single binary file laid out as
//!
//! ```text
//! [RegHeader][CoverageSegment?][InstrSessionSegment]*
//! ```
//!
//! Each instrumentation pass appends one session segment and rewrites the fixed-size header. Writers never lock the
//! file; instead every writer remembers the header version it started from and refuses to append if another process
//! has committed in the meantime (see [`ConcurrentModification`]).
//!
//! [`ConcurrentModification`]: ./error/enum.ErrorKind.html#variant.ConcurrentModification

#![recursion_limit="128"] // needed for error_chain.

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde;
#[cfg(feature = "serde_json")]
extern crate serde_json;
extern crate byteorder;
extern crate crc32fast;
extern crate fixedbitset;
extern crate once_cell;
#[cfg(test)]
extern crate tempfile;

mod utils;
pub mod error;
pub mod config;
pub mod model;
pub mod update;
pub mod format;
pub mod recorder;
pub mod report;

pub use error::{ErrorKind, Result};
pub use format::contents::RegContents;
pub use format::header::{AccessMode, RegHeader};
pub use format::regfile::{FreshRegFile, RegistryFile, UpdatableRegFile};
pub use model::{ContextStore, FileInfo};
pub use report::{FileSummary, ProjectSummary};
pub use recorder::{CoverageRecorder, CoverageSnapshot, PerTestRecorder, PerTestRecording};
pub use update::{CoverageData, RegistryUpdate};
