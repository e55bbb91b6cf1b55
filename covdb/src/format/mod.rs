//! On-disk layout of a registry file.
//!
//! ```text
//! [RegHeader][CoverageSegment?][InstrSessionSegment]*
//! ```
//!
//! * [`header`] is fixed-size and always at offset 0.
//! * [`coverage`] holds the hit counts of the last flushed run, written only when a file is created.
//! * [`session`] segments are appended, one per instrumentation pass, each holding [`file_record`]s.
//!
//! [`header`]: ./header/index.html
//! [`coverage`]: ./coverage/index.html
//! [`session`]: ./session/index.html
//! [`file_record`]: ./file_record/index.html

pub mod tagged;
pub mod header;
pub mod lazy;
pub mod file_record;
pub mod session;
pub mod coverage;
pub mod contents;
pub mod regfile;
