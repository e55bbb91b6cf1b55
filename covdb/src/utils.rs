//! Additional methods for libstd and external crates.

use fixedbitset::FixedBitSet;
#[cfg(feature = "serde")]
use serde::Serializer;

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Builds a `FixedBitSet` of `len` bits with the given slots set. Slots beyond `len` grow the bitset.
pub fn bitset_from_slots<I: IntoIterator<Item = usize>>(len: usize, slots: I) -> FixedBitSet {
    let mut bitset = FixedBitSet::with_capacity(len);
    for slot in slots {
        if slot >= bitset.len() {
            bitset.grow(slot + 1);
        }
        bitset.insert(slot);
    }
    bitset
}

/// Serializes a bit set as the list of its set indices.
#[cfg(feature = "serde")]
pub fn serialize_bitset<S: Serializer>(bitset: &FixedBitSet, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(bitset.ones())
}

/// Milliseconds since the Unix epoch, saturating at zero for clocks set before 1970.
pub fn now_millis() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64 * 1000 + i64::from(d.subsec_nanos() / 1_000_000),
        Err(_) => 0,
    }
}

/// Sets the modification time of an open file to `millis` since the Unix epoch.
///
/// Failure is logged and otherwise ignored: the timestamp is informative only.
pub fn set_modified_millis(file: &File, path: &Path, millis: u64) {
    let mtime = UNIX_EPOCH + Duration::from_millis(millis);
    if let Err(e) = file.set_modified(mtime) {
        warn!("cannot set modification time of {}: {}", path.display(), e);
    }
}

/// Removes a file, treating "not found" as success.
pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(ref e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        res => res,
    }
}

/// Flushes the directory entry of `path` so a preceding rename survives a crash.
#[cfg(unix)]
pub fn sync_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => File::open(parent)?.sync_all(),
        _ => Ok(()),
    }
}

/// Flushes the directory entry of `path` so a preceding rename survives a crash.
#[cfg(not(unix))]
pub fn sync_parent_dir(_: &Path) -> io::Result<()> {
    Ok(())
}

#[test]
fn test_bitset_from_slots_grows() {
    let bitset = bitset_from_slots(4, vec![1, 9]);
    assert_eq!(bitset.len(), 10);
    assert!(bitset.contains(1));
    assert!(bitset.contains(9));
    assert!(!bitset.contains(2));
    assert_eq!(bitset.count_ones(..), 2);
}
