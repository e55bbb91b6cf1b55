//! Coverage summaries.
//!
//! A [`FileSummary`] combines the structure of a file with the hit counts of a run. Summaries of all files in a
//! registry are added up into a [`ProjectSummary`].
//!
//! [`FileSummary`]: ./struct.FileSummary.html
//! [`ProjectSummary`]: ./struct.ProjectSummary.html

use error::*;
use format::contents::RegContents;
use model::{Element, FileInfo};

use std::collections::BTreeMap;
use std::ops::Add;

/// Statistical summary of a file.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct FileSummary {
    /// Number of statements.
    pub statements_count: usize,

    /// Number of statements executed at least once.
    pub statements_covered: usize,

    /// Number of two-way branches.
    pub branches_count: usize,

    /// Number of branches where both the true and the false edge have been taken.
    pub branches_covered: usize,

    /// Number of branch edges taken, at most twice the branch count.
    pub branch_edges_taken: usize,

    /// Number of methods, including lambdas and inner methods.
    pub methods_count: usize,

    /// Number of methods entered at least once.
    pub methods_called: usize,
}

impl Add for FileSummary {
    type Output = FileSummary;
    fn add(self, other: FileSummary) -> FileSummary {
        FileSummary {
            statements_count: self.statements_count + other.statements_count,
            statements_covered: self.statements_covered + other.statements_covered,
            branches_count: self.branches_count + other.branches_count,
            branches_covered: self.branches_covered + other.branches_covered,
            branch_edges_taken: self.branch_edges_taken + other.branch_edges_taken,
            methods_count: self.methods_count + other.methods_count,
            methods_called: self.methods_called + other.methods_called,
        }
    }
}

impl FileSummary {
    /// Summarizes `file_info` using the hit count of every slot. Slots past the end of `hit_counts` count as not hit.
    pub fn new(file_info: &FileInfo, hit_counts: &[u32]) -> FileSummary {
        let hit = |relative_index: u32| hit_counts.get(file_info.slot_of(relative_index)).map_or(false, |c| *c > 0);
        let mut summary = FileSummary::default();
        file_info.visit(&mut |element| match element {
            Element::Statement(s) => {
                summary.statements_count += 1;
                summary.statements_covered += hit(s.relative_index) as usize;
            },
            Element::Branch(b) => {
                let (t, f) = b.relative_slots();
                let (t, f) = (hit(t), hit(f));
                summary.branches_count += 1;
                summary.branches_covered += (t && f) as usize;
                summary.branch_edges_taken += t as usize + f as usize;
            },
            Element::Method(m) => {
                summary.methods_count += 1;
                summary.methods_called += hit(m.relative_index) as usize;
            },
        });
        summary
    }

    /// Number of coverable elements. A branch counts twice, once per edge.
    pub fn elements_count(&self) -> usize {
        self.statements_count + 2 * self.branches_count + self.methods_count
    }

    /// Number of covered elements.
    pub fn elements_covered(&self) -> usize {
        self.statements_covered + self.branch_edges_taken + self.methods_called
    }

    /// Fraction of covered elements, `None` for a file without any.
    pub fn coverage(&self) -> Option<f64> {
        match self.elements_count() {
            0 => None,
            n => Some(self.elements_covered() as f64 / n as f64),
        }
    }
}

/// Summary of every file in a registry.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ProjectSummary {
    /// Summary of each file, keyed by file name.
    pub files: BTreeMap<String, FileSummary>,
    /// Sum of all file summaries.
    pub total: FileSummary,
}

impl ProjectSummary {
    /// Summarizes the latest structure of every file.
    pub fn new(contents: &RegContents, hit_counts: &[u32]) -> Result<ProjectSummary> {
        let mut files = BTreeMap::new();
        for (name, record) in contents.latest_file_infos()? {
            let summary = FileSummary::new(record.file_info()?, hit_counts);
            files.insert(name, summary);
        }
        let total = files.values().cloned().fold(FileSummary::default(), Add::add);
        Ok(ProjectSummary { files, total })
    }
}
