//! Environment-driven configuration.
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `COVDB_PER_TEST_COVERAGE` | `diff` (default) to record per-test coverage, `off`, `none` or `false` to disable it |
//! | `COVDB_INITSTRING` | Path of the registry file, overriding `<project>/.clover/clover.db` |

use error::*;
use format::header::AccessMode;
use format::regfile::RegistryFile;

use once_cell::sync::Lazy;

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const PER_TEST_COVERAGE_VAR: &str = "COVDB_PER_TEST_COVERAGE";
pub const INITSTRING_VAR: &str = "COVDB_INITSTRING";

/// Directory holding the registry, relative to the project.
pub const REGISTRY_DIR: &str = ".clover";
const REGISTRY_STEM: &str = "clover";
const REGISTRY_EXTENSION: &str = "db";

static ENV_PER_TEST_MODE: Lazy<PerTestMode> = Lazy::new(|| PerTestMode::from_env_value(env::var(PER_TEST_COVERAGE_VAR).ok().as_ref().map(|s| &**s)));

//----------------------------------------------------------------------------------------------------------------------
//{{{ PerTestMode

/// How per-test coverage is recorded.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PerTestMode {
    /// Compare snapshots of the global counters taken at test start and test end.
    Diffing,
    /// Do not record per-test coverage.
    Off,
}

impl Default for PerTestMode {
    fn default() -> PerTestMode {
        PerTestMode::Diffing
    }
}

#[derive(Debug)]
pub struct UnsupportedPerTestMode;

impl FromStr for PerTestMode {
    type Err = UnsupportedPerTestMode;
    fn from_str(s: &str) -> ::std::result::Result<PerTestMode, UnsupportedPerTestMode> {
        Ok(match &*s.to_ascii_lowercase() {
            "diff" | "diffing" => PerTestMode::Diffing,
            "off" | "none" | "false" => PerTestMode::Off,
            _ => return Err(UnsupportedPerTestMode),
        })
    }
}

impl PerTestMode {
    /// The mode selected by `COVDB_PER_TEST_COVERAGE`. The variable is read once per process.
    pub fn from_env() -> PerTestMode {
        *ENV_PER_TEST_MODE
    }

    /// Interprets the value of `COVDB_PER_TEST_COVERAGE`. Unknown values fall back to the default with a warning.
    pub fn from_env_value(value: Option<&str>) -> PerTestMode {
        match value {
            None | Some("") => PerTestMode::default(),
            Some(v) => v.parse().unwrap_or_else(|_| {
                warn!("unsupported {} value {:?}, using the default", PER_TEST_COVERAGE_VAR, v);
                PerTestMode::default()
            }),
        }
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ Paths

/// `<project>/.clover/clover.db`
pub fn default_registry_path(project_dir: &Path) -> PathBuf {
    let mut path = project_dir.join(REGISTRY_DIR);
    path.push(REGISTRY_STEM);
    path.set_extension(REGISTRY_EXTENSION);
    path
}

/// `<project>/.clover/clover<version>.db`
pub fn registry_path_for_version(project_dir: &Path, version: u64) -> PathBuf {
    let mut path = project_dir.join(REGISTRY_DIR);
    path.push(format!("{}{}.{}", REGISTRY_STEM, version, REGISTRY_EXTENSION));
    path
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map_or_else(OsString::new, |n| n.to_owned());
    name.push(suffix);
    path.with_file_name(name)
}

/// The flag file whose presence tells the runtime that coverage is being recorded, `<registry>.liverec`.
pub fn live_record_path(registry_path: &Path) -> PathBuf {
    with_suffix(registry_path, ".liverec")
}

/// The file a fresh registry is written to before replacing the target, `<registry>.tmp`.
pub fn temp_path(registry_path: &Path) -> PathBuf {
    with_suffix(registry_path, ".tmp")
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ RegistryConfig

/// Where a registry lives and how it is opened.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct RegistryConfig {
    pub path: PathBuf,
    #[cfg_attr(feature = "serde", serde(default))]
    pub access_mode: AccessMode,
    /// Name stored in the header of a new registry.
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub per_test_mode: PerTestMode,
}

impl RegistryConfig {
    pub fn new(path: PathBuf) -> RegistryConfig {
        RegistryConfig {
            path,
            access_mode: AccessMode::ReadWrite,
            name: String::new(),
            per_test_mode: PerTestMode::default(),
        }
    }

    /// Reads `COVDB_INITSTRING` and `COVDB_PER_TEST_COVERAGE`.
    pub fn from_env(project_dir: &Path) -> RegistryConfig {
        let initstring = env::var_os(INITSTRING_VAR);
        let mut config = RegistryConfig::from_initstring(initstring.as_ref().map(Path::new), project_dir);
        config.per_test_mode = PerTestMode::from_env();
        config
    }

    /// Uses `initstring` as the registry path if given, the default path of the project otherwise. A relative
    /// `initstring` is resolved against the project directory.
    pub fn from_initstring(initstring: Option<&Path>, project_dir: &Path) -> RegistryConfig {
        let path = match initstring {
            Some(p) if !p.as_os_str().is_empty() => project_dir.join(p),
            _ => default_registry_path(project_dir),
        };
        RegistryConfig::new(path)
    }

    /// Opens the registry, or prepares a new one with the configured name and access mode.
    pub fn open(&self) -> Result<RegistryFile> {
        RegistryFile::open(&self.path, self.access_mode, &self.name)
    }
}

//}}}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_test_mode_values() {
        assert_eq!(PerTestMode::from_env_value(None), PerTestMode::Diffing);
        assert_eq!(PerTestMode::from_env_value(Some("")), PerTestMode::Diffing);
        assert_eq!(PerTestMode::from_env_value(Some("diff")), PerTestMode::Diffing);
        assert_eq!(PerTestMode::from_env_value(Some("OFF")), PerTestMode::Off);
        assert_eq!(PerTestMode::from_env_value(Some("none")), PerTestMode::Off);
        assert_eq!(PerTestMode::from_env_value(Some("false")), PerTestMode::Off);
        assert_eq!(PerTestMode::from_env_value(Some("sometimes")), PerTestMode::Diffing);
        assert!("sometimes".parse::<PerTestMode>().is_err());
    }

    #[test]
    fn test_paths() {
        let project = Path::new("/work/app");
        assert_eq!(default_registry_path(project), Path::new("/work/app/.clover/clover.db"));
        assert_eq!(registry_path_for_version(project, 1234), Path::new("/work/app/.clover/clover1234.db"));
        assert_eq!(live_record_path(Path::new("/r/clover.db")), Path::new("/r/clover.db.liverec"));
        assert_eq!(temp_path(Path::new("/r/clover.db")), Path::new("/r/clover.db.tmp"));
    }

    #[test]
    fn test_initstring() {
        let project = Path::new("/work/app");
        assert_eq!(RegistryConfig::from_initstring(None, project).path, default_registry_path(project));
        assert_eq!(RegistryConfig::from_initstring(Some(Path::new("")), project).path, default_registry_path(project));
        assert_eq!(RegistryConfig::from_initstring(Some(Path::new("build/cov.db")), project).path, Path::new("/work/app/build/cov.db"));
        assert_eq!(RegistryConfig::from_initstring(Some(Path::new("/tmp/cov.db")), project).path, Path::new("/tmp/cov.db"));
    }

    #[cfg(feature = "serde_json")]
    #[test]
    fn test_deserialize() {
        let config: RegistryConfig = ::serde_json::from_str(r#"{"path": "/tmp/x.db", "access_mode": "ReadOnly", "per_test_mode": "off"}"#).unwrap();
        assert_eq!(config.path, Path::new("/tmp/x.db"));
        assert_eq!(config.access_mode, AccessMode::ReadOnly);
        assert_eq!(config.name, "");
        assert_eq!(config.per_test_mode, PerTestMode::Off);
    }
}
