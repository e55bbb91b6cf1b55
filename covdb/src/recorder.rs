//! Per-test coverage recording.
//!
//! The runtime keeps one global hit counter per slot. To find the slots touched by a single test, the recorder takes a
//! [`CoverageSnapshot`] when the test starts and compares it with the counters when the test finishes: every slot
//! whose count changed was hit by the test.
//!
//! Tests may overlap (e.g. parallel runners). Each active test keeps its own start snapshot, so overlapping tests are
//! attributed every slot hit while they were running.
//!
//! [`CoverageSnapshot`]: ./struct.CoverageSnapshot.html

use config::PerTestMode;
use error::*;
use format::tagged::*;
use utils::{bitset_from_slots, now_millis};

use fixedbitset::FixedBitSet;

use std::mem;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

//----------------------------------------------------------------------------------------------------------------------
//{{{ CoverageRecorder & CoverageSnapshot

/// Source of the global hit counters.
pub trait CoverageRecorder {
    /// Number of slots recorded.
    fn slot_count(&self) -> usize;

    /// Captures the current hit count of every slot.
    fn coverage_snapshot(&self) -> CoverageSnapshot;

    /// Computes the slots whose hit count changed since `earlier` was taken.
    fn compare_coverage_with(&self, earlier: &CoverageSnapshot) -> FixedBitSet {
        self.coverage_snapshot().diff(earlier)
    }
}

/// A recorder with a fixed number of atomic counters.
#[derive(Debug)]
pub struct FixedSizeCoverageRecorder {
    hits: Vec<AtomicU32>,
}

impl FixedSizeCoverageRecorder {
    pub fn new(slot_count: usize) -> FixedSizeCoverageRecorder {
        FixedSizeCoverageRecorder {
            hits: (0..slot_count).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Records a hit. Slots out of range are ignored.
    pub fn inc(&self, slot: usize) {
        if let Some(counter) = self.hits.get(slot) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn hit_counts(&self) -> Vec<u32> {
        self.hits.iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }
}

impl CoverageRecorder for FixedSizeCoverageRecorder {
    fn slot_count(&self) -> usize {
        self.hits.len()
    }

    fn coverage_snapshot(&self) -> CoverageSnapshot {
        CoverageSnapshot::new(self.hit_counts())
    }
}

/// An immutable copy of the hit counts.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct CoverageSnapshot {
    hits: Vec<u32>,
}

impl CoverageSnapshot {
    pub fn new(hits: Vec<u32>) -> CoverageSnapshot {
        CoverageSnapshot { hits }
    }

    pub fn hits(&self) -> &[u32] {
        &self.hits
    }

    /// Slots whose count differs from `earlier`. Slots missing from `earlier` count as 0 there.
    pub fn diff(&self, earlier: &CoverageSnapshot) -> FixedBitSet {
        let changed = self.hits.iter().enumerate().filter(|&(i, count)| earlier.hits.get(i).cloned().unwrap_or(0) != *count).map(|(i, _)| i);
        bitset_from_slots(self.hits.len(), changed)
    }

    /// Slots hit at least once.
    pub fn covered(&self) -> FixedBitSet {
        let covered = self.hits.iter().enumerate().filter(|&(_, count)| *count > 0).map(|(i, _)| i);
        bitset_from_slots(self.hits.len(), covered)
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ PerTestRecording

/// How a test ended.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum ExitStatus {
    /// The test ended without reporting a result.
    NoResult = -1,
    Passed = 0,
    /// The test failed or threw.
    Failed = 1,
}

impl ExitStatus {
    fn from_code(code: i32) -> Result<ExitStatus> {
        Ok(match code {
            -1 => ExitStatus::NoResult,
            0 => ExitStatus::Passed,
            1 => ExitStatus::Failed,
            _ => bail!(ErrorKind::InvalidField("test exit status", i64::from(code))),
        })
    }
}

/// Details of an abnormal test exit.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ErrorInfo {
    pub message: Option<String>,
    pub stack_trace: Option<String>,
}

/// Identity of a running test.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct TestId {
    /// Runtime type of the test instance, which may be a subclass of the type declaring the method.
    pub runtime_type: String,
    /// Slot of the test method.
    pub slice_index: u32,
    /// Distinguishes repeated runs of the same method.
    pub test_run_id: u32,
}

impl TestId {
    pub fn new(runtime_type: &str, slice_index: u32, test_run_id: u32) -> TestId {
        TestId {
            runtime_type: runtime_type.to_owned(),
            slice_index,
            test_run_id,
        }
    }
}

/// Outcome of a test, reported when it finishes.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TestFinish {
    /// Name assigned by the test framework at runtime (e.g. a parameterized test instance).
    pub runtime_test_name: Option<String>,
    pub exit_status: ExitStatus,
    /// Ignored unless the test failed.
    pub error: Option<ErrorInfo>,
}

impl TestFinish {
    pub fn passed() -> TestFinish {
        TestFinish {
            runtime_test_name: None,
            exit_status: ExitStatus::Passed,
            error: None,
        }
    }

    pub fn failed(error: ErrorInfo) -> TestFinish {
        TestFinish {
            runtime_test_name: None,
            exit_status: ExitStatus::Failed,
            error: Some(error),
        }
    }
}

/// The slots hit by one test run.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PerTestRecording {
    pub test: TestId,
    pub method_name: String,
    pub runtime_test_name: Option<String>,
    /// Start time in epoch milliseconds.
    pub start_ts: i64,
    /// End time in epoch milliseconds.
    pub end_ts: i64,
    /// Duration measured with a monotonic clock, in nanoseconds.
    pub duration_nanos: u64,
    pub exit_status: ExitStatus,
    pub error: Option<ErrorInfo>,
    #[cfg_attr(feature = "serde", serde(serialize_with = "::utils::serialize_bitset"))]
    pub slots: FixedBitSet,
}

impl PerTestRecording {
    pub fn has_result(&self) -> bool {
        self.exit_status != ExitStatus::NoResult
    }

    pub fn passed(&self) -> bool {
        self.exit_status == ExitStatus::Passed
    }
}

impl Tagged for PerTestRecording {
    const TAG: Tag = PER_TEST_RECORDING_TAG;

    fn write_body(&self, out: &mut BodyWriter) -> Result<()> {
        out.write_str(&self.test.runtime_type)?;
        out.write_u32(self.test.slice_index)?;
        out.write_u32(self.test.test_run_id)?;
        out.write_str(&self.method_name)?;
        out.write_opt_str(self.runtime_test_name.as_ref().map(|s| &**s))?;
        out.write_i64(self.start_ts)?;
        out.write_i64(self.end_ts)?;
        out.write_u64(self.duration_nanos)?;
        out.write_i32(self.exit_status as i32)?;
        out.write_bool(self.error.is_some())?;
        if let Some(ref error) = self.error {
            out.write_opt_str(error.message.as_ref().map(|s| &**s))?;
            out.write_opt_str(error.stack_trace.as_ref().map(|s| &**s))?;
        }
        out.write_bitset(&self.slots)
    }

    fn read_body(input: &mut BodyReader) -> Result<Self> {
        let test = TestId {
            runtime_type: input.read_str()?,
            slice_index: input.read_u32()?,
            test_run_id: input.read_u32()?,
        };
        let method_name = input.read_str()?;
        let runtime_test_name = input.read_opt_str()?;
        let start_ts = input.read_i64()?;
        let end_ts = input.read_i64()?;
        let duration_nanos = input.read_u64()?;
        let exit_status = ExitStatus::from_code(input.read_i32()?)?;
        let error = if input.read_bool()? {
            Some(ErrorInfo {
                message: input.read_opt_str()?,
                stack_trace: input.read_opt_str()?,
            })
        } else {
            None
        };
        Ok(PerTestRecording {
            test,
            method_name,
            runtime_test_name,
            start_ts,
            end_ts,
            duration_nanos,
            exit_status,
            error,
            slots: input.read_bitset()?,
        })
    }
}

/// The recordings of a run, stored in the coverage segment.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PerTestCoverage {
    recordings: Vec<PerTestRecording>,
}

impl PerTestCoverage {
    pub fn new() -> PerTestCoverage {
        PerTestCoverage::default()
    }

    pub fn push(&mut self, recording: PerTestRecording) {
        self.recordings.push(recording);
    }

    pub fn recordings(&self) -> &[PerTestRecording] {
        &self.recordings
    }

    pub fn is_empty(&self) -> bool {
        self.recordings.is_empty()
    }

    /// Recordings of the tests which hit `slot`.
    pub fn tests_hitting<'a>(&'a self, slot: usize) -> Box<Iterator<Item = &'a PerTestRecording> + 'a> {
        Box::new(self.recordings.iter().filter(move |r| r.slots.contains(slot)))
    }

    /// Union of the slots hit by any test.
    pub fn covered_slots(&self) -> FixedBitSet {
        let mut union = FixedBitSet::with_capacity(0);
        for recording in &self.recordings {
            if recording.slots.len() > union.len() {
                union.grow(recording.slots.len());
            }
            union.union_with(&recording.slots);
        }
        union
    }
}

impl Tagged for PerTestCoverage {
    const TAG: Tag = PER_TEST_COVERAGE_TAG;

    fn write_body(&self, out: &mut BodyWriter) -> Result<()> {
        out.write_list(&self.recordings)
    }

    fn read_body(input: &mut BodyReader) -> Result<Self> {
        Ok(PerTestCoverage {
            recordings: input.read_list()?,
        })
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ PerTestRecorder

/// A test which has started but not finished.
#[derive(Debug)]
struct ActiveTest {
    id: TestId,
    method_name: String,
    start: CoverageSnapshot,
    start_ts: i64,
    started: Instant,
}

/// The tests currently running, newest first.
#[derive(Debug)]
enum ActivePerTestRecorder {
    None,
    One(ActiveTest),
    Many(Vec<ActiveTest>),
}

impl ActivePerTestRecorder {
    fn started(self, test: ActiveTest) -> ActivePerTestRecorder {
        match self {
            ActivePerTestRecorder::None => ActivePerTestRecorder::One(test),
            ActivePerTestRecorder::One(previous) => ActivePerTestRecorder::Many(vec![test, previous]),
            ActivePerTestRecorder::Many(mut tests) => {
                tests.insert(0, test);
                ActivePerTestRecorder::Many(tests)
            },
        }
    }

    /// Removes the test with the given identity. Returns the remaining state and the removed test.
    fn finished(self, id: &TestId) -> (ActivePerTestRecorder, Option<ActiveTest>) {
        match self {
            ActivePerTestRecorder::None => (ActivePerTestRecorder::None, None),
            ActivePerTestRecorder::One(test) => {
                if test.id == *id {
                    (ActivePerTestRecorder::None, Some(test))
                } else {
                    (ActivePerTestRecorder::One(test), None)
                }
            },
            ActivePerTestRecorder::Many(mut tests) => {
                let found = tests.iter().position(|t| t.id == *id).map(|i| tests.remove(i));
                let rest = if tests.len() == 1 {
                    ActivePerTestRecorder::One(tests.remove(0))
                } else {
                    ActivePerTestRecorder::Many(tests)
                };
                (rest, found)
            },
        }
    }

    fn len(&self) -> usize {
        match *self {
            ActivePerTestRecorder::None => 0,
            ActivePerTestRecorder::One(_) => 1,
            ActivePerTestRecorder::Many(ref tests) => tests.len(),
        }
    }
}

/// Derives per-test coverage from test start and finish callbacks.
#[derive(Debug)]
pub struct PerTestRecorder {
    mode: PerTestMode,
    active: ActivePerTestRecorder,
}

impl PerTestRecorder {
    pub fn new(mode: PerTestMode) -> PerTestRecorder {
        PerTestRecorder {
            mode,
            active: ActivePerTestRecorder::None,
        }
    }

    pub fn mode(&self) -> PerTestMode {
        self.mode
    }

    /// Number of tests started but not yet finished.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Marks the start of a test, capturing the current hit counts.
    pub fn test_started<R: CoverageRecorder + ?Sized>(&mut self, recorder: &R, id: TestId, method_name: &str) {
        if self.mode == PerTestMode::Off {
            return;
        }
        trace!("test started: {:?}", id);
        let test = ActiveTest {
            id,
            method_name: method_name.to_owned(),
            start: recorder.coverage_snapshot(),
            start_ts: now_millis(),
            started: Instant::now(),
        };
        let active = mem::replace(&mut self.active, ActivePerTestRecorder::None);
        self.active = active.started(test);
    }

    /// Marks the end of a test and computes the slots it hit.
    ///
    /// Returns `None` when there is nothing to persist: per-test recording is off, the test was never started, or it
    /// hit no slot.
    pub fn test_finished<R: CoverageRecorder + ?Sized>(&mut self, recorder: &R, id: &TestId, finish: TestFinish) -> Option<PerTestRecording> {
        if self.mode == PerTestMode::Off {
            return None;
        }
        let active = mem::replace(&mut self.active, ActivePerTestRecorder::None);
        let (rest, found) = active.finished(id);
        self.active = rest;

        let test = match found {
            Some(t) => t,
            None => {
                warn!("test finished without a matching start: {:?} ({} tests active)", id, self.active.len());
                return None;
            },
        };

        let slots = recorder.compare_coverage_with(&test.start);
        if slots.count_ones(..) == 0 {
            debug!("test {:?} hit no slot, nothing recorded", id);
            return None;
        }

        let elapsed = test.started.elapsed();
        let error = match finish.exit_status {
            ExitStatus::Failed => finish.error,
            _ => None,
        };
        Some(PerTestRecording {
            test: test.id,
            method_name: test.method_name,
            runtime_test_name: finish.runtime_test_name,
            start_ts: test.start_ts,
            end_ts: now_millis(),
            duration_nanos: elapsed.as_secs() * 1_000_000_000 + u64::from(elapsed.subsec_nanos()),
            exit_status: finish.exit_status,
            error,
            slots,
        })
    }
}

//}}}
