//! Inputs of a registry save.

use model::{ContextStore, FileInfo};
use recorder::PerTestCoverage;

/// The structural changes produced by one instrumentation pass.
///
/// An update is built once and consumed by [`save()`](../format/regfile/enum.RegistryFile.html#method.save). Each
/// update becomes one session segment of the registry.
#[derive(Clone, Debug)]
pub struct RegistryUpdate {
    version: u64,
    slot_count: u32,
    start_ts: i64,
    end_ts: i64,
    file_infos: Vec<FileInfo>,
    context_store: ContextStore,
}

impl RegistryUpdate {
    /// Creates an update.
    ///
    /// * `version` becomes the registry version once committed. It should be strictly greater than the version of
    ///     the registry being updated; instrumentation usually uses the end timestamp.
    /// * `slot_count` is the size of the coverage array needed by all instrumented files.
    pub fn new(version: u64, slot_count: u32, start_ts: i64, end_ts: i64, file_infos: Vec<FileInfo>, context_store: ContextStore) -> RegistryUpdate {
        RegistryUpdate {
            version,
            slot_count,
            start_ts,
            end_ts,
            file_infos,
            context_store,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }

    pub fn start_ts(&self) -> i64 {
        self.start_ts
    }

    pub fn end_ts(&self) -> i64 {
        self.end_ts
    }

    pub fn file_infos(&self) -> &[FileInfo] {
        &self.file_infos
    }

    pub fn context_store(&self) -> &ContextStore {
        &self.context_store
    }
}

/// Hit counts of a flushed run, stored in the coverage segment when a registry is rewritten.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CoverageData {
    /// Hit count of every slot.
    pub hit_counts: Vec<u32>,
    /// Slots hit by each test.
    pub per_test: PerTestCoverage,
}

impl CoverageData {
    pub fn new(hit_counts: Vec<u32>, per_test: PerTestCoverage) -> CoverageData {
        CoverageData { hit_counts, per_test }
    }
}
