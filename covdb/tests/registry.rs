extern crate covdb;
extern crate tempfile;

use covdb::config::{temp_path, PerTestMode, RegistryConfig};
use covdb::error::{ErrorKind, Result};
use covdb::format::header::HEADER_SIZE;
use covdb::format::session::SESSION_HEADER_SIZE;
use covdb::model::{ClassInfo, MethodInfo, MethodSignature, StatementInfo};
use covdb::recorder::{FixedSizeCoverageRecorder, PerTestCoverage, TestFinish, TestId};
use covdb::*;
use tempfile::tempdir;

use std::fs;
use std::path::Path;

/// A file with a single method of `data_length` slots: the method entry followed by one statement per slot.
fn file_info(name: &str, data_index: u32, data_length: u32) -> FileInfo {
    let method = MethodInfo {
        signature: MethodSignature {
            name: "main".to_owned(),
            return_type: Some("void".to_owned()),
            parameter_types: vec!["String[]".to_owned()],
        },
        relative_index: 0,
        data_length,
        statements: (1..data_length)
            .map(|i| StatementInfo {
                relative_index: i,
                ..StatementInfo::default()
            })
            .collect(),
        ..MethodInfo::default()
    };
    FileInfo {
        classes: vec![ClassInfo {
            name: name.trim_end_matches(".java").to_owned(),
            data_length,
            methods: vec![method],
            ..ClassInfo::default()
        }],
        ..FileInfo::new(name, "app", data_index, data_length)
    }
}

fn update(version: u64, slot_count: u32, file_infos: Vec<FileInfo>) -> RegistryUpdate {
    RegistryUpdate::new(version, slot_count, version as i64 - 10, version as i64, file_infos, ContextStore::new())
}

fn fresh(path: &Path) -> FreshRegFile {
    FreshRegFile::new(path.to_owned(), AccessMode::ReadWrite, "app")
}

#[test]
fn test_create_and_append() {
    (|| -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join(".clover/clover.db");

        let registry = match RegistryFile::open(&path, AccessMode::ReadWrite, "app")? {
            RegistryFile::Fresh(fresh) => fresh,
            r => panic!("unexpected registry {:?}", r),
        };
        let saved = registry.save(vec![update(100, 4, vec![file_info("A.java", 0, 4)])])?;
        assert_eq!(*saved.header(), RegHeader::read_from_path(&path)?);
        assert_eq!(saved.version(), 100);
        assert_eq!(saved.header().slot_count, 4);
        assert_eq!(saved.header().coverage_location, None);
        assert_eq!(saved.header().last_session_location, Some(HEADER_SIZE));

        let registry = match RegistryFile::open(&path, AccessMode::ReadWrite, "app")? {
            RegistryFile::Updatable(updatable) => updatable,
            r => panic!("unexpected registry {:?}", r),
        };
        assert_eq!(registry.name(), "app");
        assert!(registry.is_appendable());

        // the slot count never shrinks.
        let saved = registry.save(vec![update(200, 3, vec![file_info("A.java", 0, 3)])])?;
        assert_eq!(saved.version(), 200);
        assert_eq!(saved.header().slot_count, 4);
        assert_eq!(*saved.header(), RegHeader::read_from_path(&path)?);

        let saved = saved.save(vec![update(300, 9, vec![file_info("B.java", 3, 6)])])?;
        assert_eq!(saved.header().slot_count, 9);

        saved.read_contents(|contents| {
            let sessions = contents.sessions()?;
            assert_eq!(sessions.iter().map(|s| s.version()).collect::<Vec<_>>(), vec![100, 200, 300]);
            assert_eq!(sessions[0].location(), HEADER_SIZE);
            assert_eq!(sessions[0].end(), sessions[1].location());
            assert_eq!(sessions[1].start_ts(), 190);
            assert_eq!(sessions[2].end_ts(), 300);
            assert_eq!(contents.latest_session()?.map(|s| s.version()), Some(300));
            assert!(contents.coverage()?.is_none());
            Ok(())
        })
    })().unwrap();
}

#[test]
fn test_latest_file_infos() {
    (|| -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("clover.db");
        let saved = fresh(&path).save(vec![
            update(1, 8, vec![file_info("A.java", 0, 4), file_info("B.java", 4, 4)]),
            update(2, 10, vec![file_info("A.java", 8, 2)]),
        ])?;

        saved.read_contents(|contents| {
            let latest = contents.latest_file_infos()?;
            assert_eq!(latest.keys().collect::<Vec<_>>(), vec!["A.java", "B.java"]);
            let a = latest["A.java"].file_info()?;
            assert_eq!((a.data_index, a.data_length), (8, 2));
            let b = latest["B.java"].file_info()?;
            assert_eq!((b.data_index, b.data_length), (4, 4));
            assert_eq!(latest["B.java"].package_name(), "app");
            Ok(())
        })
    })().unwrap();
}

#[test]
fn test_empty_batch() {
    (|| -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("clover.db");
        match *fresh(&path).save(Vec::new()).unwrap_err().kind() {
            ErrorKind::EmptyUpdateBatch => {},
            ref k => panic!("unexpected error {:?}", k),
        }
        assert!(!path.exists());

        let saved = fresh(&path).save(vec![update(1, 1, Vec::new())])?;
        let before = fs::read(&path)?;
        match *saved.save(Vec::new()).unwrap_err().kind() {
            ErrorKind::EmptyUpdateBatch => {},
            ref k => panic!("unexpected error {:?}", k),
        }
        assert_eq!(fs::read(&path)?, before);
        Ok(())
    })().unwrap();
}

#[test]
fn test_concurrent_modification() {
    (|| -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("clover.db");
        fresh(&path).save(vec![update(100, 4, vec![file_info("A.java", 0, 4)])])?;

        let first = UpdatableRegFile::open(&path)?;
        let second = UpdatableRegFile::open(&path)?;
        let first = first.save(vec![update(200, 6, vec![file_info("B.java", 4, 2)])])?;
        assert!(first.is_appendable());
        assert!(!second.is_appendable());

        let before = fs::read(&path)?;
        let err = second.save(vec![update(201, 8, vec![file_info("C.java", 4, 4)])]).unwrap_err();
        assert!(err.kind().is_concurrent_modification());
        match *err.kind() {
            ErrorKind::ConcurrentModification(200, 100) => {},
            ref k => panic!("unexpected error {:?}", k),
        }
        assert_eq!(fs::read(&path)?, before);

        // a reloaded registry can append again.
        let reloaded = UpdatableRegFile::open(&path)?;
        let saved = reloaded.save(vec![update(201, 8, vec![file_info("C.java", 6, 2)])])?;
        assert_eq!(saved.version(), 201);
        Ok(())
    })().unwrap();
}

#[test]
fn test_read_only() {
    (|| -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("clover.db");
        let saved = FreshRegFile::new(path.clone(), AccessMode::ReadOnly, "frozen").save(vec![update(5, 2, Vec::new())])?;
        assert_eq!(saved.access_mode(), AccessMode::ReadOnly);
        assert!(!saved.is_appendable());

        let before = fs::read(&path)?;
        match *saved.save(vec![update(6, 2, Vec::new())]).unwrap_err().kind() {
            ErrorKind::ReadOnlyRegistry(ref p) => assert_eq!(p, &path),
            ref k => panic!("unexpected error {:?}", k),
        }
        assert_eq!(fs::read(&path)?, before);
        Ok(())
    })().unwrap();
}

#[test]
fn test_lazy_file_infos() {
    (|| -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("clover.db");
        let saved = fresh(&path).save(vec![update(1, 8, vec![file_info("A.java", 0, 4), file_info("B.java", 4, 4)])])?;

        let contents = saved.start_reading()?;
        let session = contents.latest_session()?.unwrap();
        let records = session.file_infos();
        assert_eq!(records.iter().map(|r| r.name()).collect::<Vec<_>>(), vec!["A.java", "B.java"]);
        assert!(records.iter().all(|r| !r.is_loaded()));

        assert_eq!(records[1].file_info()?.classes[0].name, "B");
        assert!(!records[0].is_loaded());
        assert!(records[1].is_loaded());
        assert_eq!(session.context_store()?.next_index, 19);
        contents.close();
        Ok(())
    })().unwrap();
}

#[test]
fn test_corrupted_record_marker() {
    (|| -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("clover.db");
        fresh(&path).save(vec![update(1, 4, vec![file_info("A.java", 0, 4)])])?;

        let mut bytes = fs::read(&path)?;
        let marker_pos = (HEADER_SIZE + SESSION_HEADER_SIZE) as usize;
        bytes[marker_pos + 3] ^= 0xff;
        fs::write(&path, &bytes)?;

        // the header is intact, the session is not.
        let registry = UpdatableRegFile::open(&path)?;
        assert_eq!(registry.version(), 1);
        let err = registry.read_contents(|contents| contents.sessions().map(|s| s.len())).unwrap_err();
        match *err.kind() {
            ErrorKind::MarkerMismatch("file info record", 0x000e_dd1e, actual) => assert_eq!(actual, 0x000e_dde1),
            ref k => panic!("unexpected error {:?}", k),
        }
        Ok(())
    })().unwrap();
}

#[test]
fn test_corrupted_header() {
    (|| -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("clover.db");
        fresh(&path).save(vec![update(1, 4, Vec::new())])?;

        let mut bytes = fs::read(&path)?;
        bytes[20] ^= 1;
        fs::write(&path, &bytes)?;
        match *UpdatableRegFile::open(&path).unwrap_err().kind() {
            ErrorKind::CorruptedRegistry(_, ref reason) => assert!(reason.starts_with("header checksum")),
            ref k => panic!("unexpected error {:?}", k),
        }

        fs::write(&path, &bytes[..100])?;
        match *RegistryFile::open(&path, AccessMode::ReadWrite, "app").unwrap_err().kind() {
            ErrorKind::CorruptedRegistry(_, ref reason) => assert_eq!(reason, "truncated header"),
            ref k => panic!("unexpected error {:?}", k),
        }
        Ok(())
    })().unwrap();
}

#[test]
fn test_corrupted_coverage_length() {
    (|| -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("clover.db");
        let coverage = CoverageData::new(vec![1, 0, 2, 0], PerTestCoverage::new());
        fresh(&path).with_coverage(coverage).save(vec![update(1, 4, vec![file_info("A.java", 0, 4)])])?;

        // the per-test area length follows the marker and the hit area length.
        let mut bytes = fs::read(&path)?;
        let per_test_len_pos = (HEADER_SIZE + 12) as usize;
        for b in &mut bytes[per_test_len_pos..per_test_len_pos + 8] {
            *b = 0xff;
        }
        fs::write(&path, &bytes)?;

        let registry = UpdatableRegFile::open(&path)?;
        match *registry.start_reading().unwrap_err().kind() {
            ErrorKind::CorruptedRegistry(ref p, ref reason) => {
                assert_eq!(p, &path);
                assert!(reason.starts_with("coverage @ 0x134"));
            },
            ref k => panic!("unexpected error {:?}", k),
        }
        match *RegContents::open(&path).unwrap_err().kind() {
            ErrorKind::CorruptedRegistry(..) => {},
            ref k => panic!("unexpected error {:?}", k),
        }
        Ok(())
    })().unwrap();
}

#[test]
fn test_corrupted_session_length() {
    (|| -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("clover.db");
        fresh(&path).save(vec![update(1, 4, vec![file_info("A.java", 0, 4)])])?;

        // the context store length is the last field of the session prefix.
        let mut bytes = fs::read(&path)?;
        let context_store_len_pos = (HEADER_SIZE + SESSION_HEADER_SIZE - 4) as usize;
        bytes[context_store_len_pos..context_store_len_pos + 4].copy_from_slice(&[0x7f, 0xff, 0xff, 0xff]);
        fs::write(&path, &bytes)?;

        let registry = UpdatableRegFile::open(&path)?;
        for err in vec![
            registry.read_contents(|contents| contents.sessions().map(|s| s.len())).unwrap_err(),
            registry.read_contents(|contents| contents.latest_session().map(|s| s.is_some())).unwrap_err(),
        ] {
            match *err.kind() {
                ErrorKind::CorruptedRegistry(_, ref reason) => assert!(reason.contains("past the end of the file")),
                ref k => panic!("unexpected error {:?}", k),
            }
        }

        // nothing is appended after a session of unknown length.
        match *registry.save(vec![update(2, 4, Vec::new())]).unwrap_err().kind() {
            ErrorKind::CorruptedRegistry(..) => {},
            ref k => panic!("unexpected error {:?}", k),
        }
        assert_eq!(fs::read(&path)?, bytes);
        Ok(())
    })().unwrap();
}

#[test]
fn test_registry_below_a_file() {
    (|| -> Result<()> {
        let dir = tempdir()?;
        let blocker = dir.path().join("build");
        fs::write(&blocker, b"not a directory")?;

        for path in vec![blocker.join("clover.db"), blocker.join(".clover/clover.db")] {
            match *fresh(&path).save(vec![update(1, 0, Vec::new())]).unwrap_err().kind() {
                ErrorKind::InaccessibleRegFile(ref p, "has a parent which is not a directory") => assert_eq!(p, &path),
                ref k => panic!("unexpected error {:?}", k),
            }
        }
        assert_eq!(fs::read(&blocker)?, b"not a directory");
        Ok(())
    })().unwrap();
}

#[test]
fn test_batch_equals_single_saves() {
    (|| -> Result<()> {
        let dir = tempdir()?;
        let updates = vec![
            update(10, 4, vec![file_info("A.java", 0, 4)]),
            update(20, 2, vec![file_info("A.java", 0, 2)]),
            update(30, 7, vec![file_info("B.java", 2, 5)]),
        ];

        let single_path = dir.path().join("single.db");
        let mut saved = fresh(&single_path).save(vec![updates[0].clone()])?;
        for u in &updates[1..] {
            saved = saved.save(vec![u.clone()])?;
        }

        let batch_path = dir.path().join("batch.db");
        let batch = fresh(&batch_path).save(updates)?;

        assert_eq!(saved.header(), batch.header());
        assert_eq!(batch.header().slot_count, 7);
        assert_eq!(batch.version(), 30);
        assert_eq!(fs::read(&single_path)?, fs::read(&batch_path)?);
        Ok(())
    })().unwrap();
}

#[test]
fn test_fresh_replaces_atomically() {
    (|| -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("clover.db");
        let old = fresh(&path).save(vec![
            update(1, 4, vec![file_info("A.java", 0, 4)]),
            update(2, 8, vec![file_info("B.java", 4, 4)]),
        ])?;
        let old_len = fs::metadata(&path)?.len();

        let mut per_test = PerTestCoverage::new();
        let recorder = FixedSizeCoverageRecorder::new(4);
        let mut tests = PerTestRecorder::new(PerTestMode::Diffing);
        let id = TestId::new("app.ATest", 0, 1);
        tests.test_started(&recorder, id.clone(), "testA");
        recorder.inc(0);
        recorder.inc(2);
        per_test.push(tests.test_finished(&recorder, &id, TestFinish::passed()).unwrap());

        let rewritten = old.with_coverage(CoverageData::new(recorder.hit_counts(), per_test));
        let saved = rewritten.save(vec![update(3, 4, vec![file_info("A.java", 0, 4)])])?;
        assert!(!temp_path(&path).exists());
        assert!(fs::metadata(&path)?.len() != old_len);
        assert_eq!(saved.name(), "app");
        assert_eq!(saved.header().coverage_location, Some(HEADER_SIZE));

        saved.read_contents(|contents| {
            let sessions = contents.sessions()?;
            assert_eq!(sessions.iter().map(|s| s.version()).collect::<Vec<_>>(), vec![3]);
            assert_eq!(sessions[0].location(), contents.min_session_position());

            let coverage = contents.coverage()?.unwrap();
            assert_eq!(coverage.hit_counts()?, &[1, 0, 1, 0][..]);
            let per_test = coverage.per_test()?;
            assert_eq!(per_test.tests_hitting(2).map(|r| &*r.method_name).collect::<Vec<_>>(), vec!["testA"]);
            assert_eq!(per_test.tests_hitting(1).count(), 0);

            let summary = ProjectSummary::new(contents, coverage.hit_counts()?)?;
            assert_eq!(summary.files.len(), 1);
            assert_eq!(summary.total.methods_called, 1);
            assert_eq!(summary.total.statements_count, 3);
            assert_eq!(summary.total.statements_covered, 1);
            Ok(())
        })
    })().unwrap();
}

#[test]
fn test_per_test_diff() {
    let recorder = FixedSizeCoverageRecorder::new(8);
    recorder.inc(7);
    let mut tests = PerTestRecorder::new(PerTestMode::Diffing);

    let outer = TestId::new("app.Suite", 0, 1);
    let inner = TestId::new("app.Case", 0, 2);
    tests.test_started(&recorder, outer.clone(), "suite");
    recorder.inc(1);
    tests.test_started(&recorder, inner.clone(), "case");
    recorder.inc(3);
    recorder.inc(3);
    assert_eq!(tests.active_count(), 2);

    let inner_rec = tests.test_finished(&recorder, &inner, TestFinish::passed()).unwrap();
    assert_eq!(inner_rec.slots.ones().collect::<Vec<_>>(), vec![3]);
    assert!(inner_rec.passed());

    let outer_rec = tests.test_finished(&recorder, &outer, TestFinish::passed()).unwrap();
    assert_eq!(outer_rec.slots.ones().collect::<Vec<_>>(), vec![1, 3]);
    assert_eq!(tests.active_count(), 0);

    // nothing hit, or never started.
    tests.test_started(&recorder, inner.clone(), "case");
    assert!(tests.test_finished(&recorder, &inner, TestFinish::passed()).is_none());
    assert!(tests.test_finished(&recorder, &outer, TestFinish::passed()).is_none());

    let mut off = PerTestRecorder::new(PerTestMode::Off);
    off.test_started(&recorder, outer.clone(), "suite");
    recorder.inc(5);
    assert!(off.test_finished(&recorder, &outer, TestFinish::passed()).is_none());
}

#[test]
fn test_config_names_new_registry() {
    (|| -> Result<()> {
        let dir = tempdir()?;
        let mut config = RegistryConfig::from_initstring(Some(Path::new("build/cov.db")), dir.path());
        config.name = "project".to_owned();

        let registry = config.open()?;
        assert!(!registry.is_appendable());
        assert_eq!(registry.name(), "project");
        let saved = registry.save(vec![update(1, 0, Vec::new())])?;
        assert_eq!(saved.path(), &*dir.path().join("build/cov.db"));

        let registry = config.open()?;
        assert!(registry.is_appendable());
        assert_eq!(registry.name(), "project");
        Ok(())
    })().unwrap();
}
