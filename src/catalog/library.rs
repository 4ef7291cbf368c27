//! Catalog Library Loading
//!
//! Locates the CK instance headers, scans them for declarations, parses and
//! expands them. The result is memoized process-wide: the first load decides
//! what every later caller sees, including an empty catalog or a format error.
//! Contents are treated as immutable for the life of the process.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, warn};
use walkdir::WalkDir;

use super::{is_declaration, parse_instances};
use crate::config::TemplarConfig;
use crate::error::{Result, TemplarError};
use crate::expand::expand_instances;
use crate::instance::ConvInstance;

/// Instance headers below the CK library root
pub const CONV_INSTANCES_SUBDIR: &str =
    "include/ck/library/tensor_operation_instance/gpu/grouped_conv_fwd";

type CatalogResult = Result<Arc<[ConvInstance]>>;

/// Lazily initialised, thread-safe catalog cell
#[derive(Debug, Default)]
pub struct CatalogCache {
    cell: Mutex<Option<CatalogResult>>,
}

impl CatalogCache {
    /// Create an empty cache
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cell: Mutex::new(None),
        }
    }

    /// Return the cached catalog, running `loader` only on first use
    pub fn get_or_load<F>(&self, loader: F) -> CatalogResult
    where
        F: FnOnce() -> Result<Vec<ConvInstance>>,
    {
        let mut cell = self.cell.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cell.as_ref() {
            return cached.clone();
        }
        let loaded: CatalogResult = loader().map(Arc::from);
        if let Err(ref e) = loaded {
            warn!(error = %e, "catalog unusable for this process");
        }
        *cell = Some(loaded.clone());
        loaded
    }

    /// Whether a load (successful or not) has been recorded
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Forget the cached catalog so the next call loads again
    pub fn reset(&self) {
        *self.cell.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

static CONV_OPS_LIBRARY: CatalogCache = CatalogCache::new();

/// Directory holding the convolution instance headers, if it exists
pub fn conv_instances_path(library_root: &Path) -> Option<PathBuf> {
    let path = library_root.join(CONV_INSTANCES_SUBDIR);
    if path.exists() {
        Some(path)
    } else {
        error!(path = %path.display(), "CK library conv instances path does not exist");
        None
    }
}

/// Collect every declaration line below `path` (a directory or a single file).
///
/// Files are visited in file-name order so the catalog order is reproducible.
pub fn collect_catalog_lines(path: &Path) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|e| TemplarError::Io(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let text = fs::read_to_string(entry.path())?;
        lines.extend(text.lines().filter(|l| is_declaration(l)).map(str::to_string));
    }
    Ok(lines)
}

/// Load, parse and expand the catalog without caching.
///
/// A missing library root or instance directory yields an empty catalog.
pub fn load_conv_library(config: &TemplarConfig) -> Result<Vec<ConvInstance>> {
    let Some(root) = config.ck_library_path.as_deref() else {
        error!("no CK library path configured; catalog is empty");
        return Ok(Vec::new());
    };
    let Some(dir) = conv_instances_path(root) else {
        return Ok(Vec::new());
    };

    let lines = collect_catalog_lines(&dir)?;
    let instances = parse_instances(lines.iter().map(String::as_str))?;
    debug!(count = instances.len(), "ck instances from library");

    Ok(expand_instances(instances))
}

/// Process-wide memoized catalog.
///
/// Only the first call's `config` is consulted.
pub fn gen_conv_ops_library(config: &TemplarConfig) -> Result<Arc<[ConvInstance]>> {
    CONV_OPS_LIBRARY.get_or_load(|| load_conv_library(config))
}

/// Drop the process-wide catalog; the next call rescans
pub fn reset_conv_ops_library() {
    CONV_OPS_LIBRARY.reset();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::{bf16_line, F16_LINE};
    use std::cell::Cell;

    fn write_library(root: &Path, files: &[(&str, String)]) -> PathBuf {
        let dir = root.join(CONV_INSTANCES_SUBDIR);
        fs::create_dir_all(&dir).unwrap();
        for (name, body) in files {
            fs::write(dir.join(name), body).unwrap();
        }
        dir
    }

    #[test]
    fn test_cache_loads_once() {
        let cache = CatalogCache::new();
        let calls = Cell::new(0);
        let load = || {
            calls.set(calls.get() + 1);
            Ok(Vec::new())
        };
        assert!(!cache.is_loaded());
        assert!(cache.get_or_load(load).unwrap().is_empty());
        assert!(cache.get_or_load(|| panic!("must not reload")).unwrap().is_empty());
        assert_eq!(calls.get(), 1);
        assert!(cache.is_loaded());
    }

    #[test]
    fn test_cache_replays_failure() {
        let cache = CatalogCache::new();
        let err = TemplarError::MalformedSubList("S<1".to_string());
        let first = cache.get_or_load(|| Err(err.clone()));
        assert_eq!(first.unwrap_err(), err);
        let second = cache.get_or_load(|| Ok(Vec::new()));
        assert_eq!(second.unwrap_err(), err);
    }

    #[test]
    fn test_cache_reset() {
        let cache = CatalogCache::new();
        let _ = cache.get_or_load(|| Ok(Vec::new()));
        cache.reset();
        assert!(!cache.is_loaded());
    }

    #[test]
    fn test_missing_directory_is_empty_catalog() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(conv_instances_path(tmp.path()).is_none());

        let config = TemplarConfig::default().with_ck_library_path(tmp.path());
        assert!(load_conv_library(&config).unwrap().is_empty());
    }

    #[test]
    fn test_unconfigured_root_is_empty_catalog() {
        assert!(load_conv_library(&TemplarConfig::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_collect_lines_in_file_name_order() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = write_library(
            tmp.path(),
            &[
                ("b_bf16_instance.hpp", format!("namespace ck {{\n{}\n}}\n", bf16_line())),
                ("a_f16_instance.hpp", format!("// header\n{F16_LINE}\n")),
            ],
        );
        let lines = collect_catalog_lines(&dir).unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("F16, F16"));
        assert!(lines[1].contains("BF16"));
    }

    #[test]
    fn test_load_expands_catalog() {
        let tmp = tempfile::tempdir().unwrap();
        write_library(
            tmp.path(),
            &[
                ("a.hpp", F16_LINE.to_string()),
                ("b.hpp", bf16_line()),
            ],
        );
        let config = TemplarConfig::default().with_ck_library_path(tmp.path());
        let instances = load_conv_library(&config).unwrap();
        // f16 line: 2 schedulers x 4 specializations; bf16 line: 1 x 4
        assert_eq!(instances.len(), 12);
        assert!(instances.iter().all(ConvInstance::is_concrete));
    }

    #[test]
    fn test_load_propagates_format_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let broken = F16_LINE.replace("S<1, 32, 1, 8>", "S<1, 32, x, 8>");
        write_library(tmp.path(), &[("a.hpp", broken)]);
        let config = TemplarConfig::default().with_ck_library_path(tmp.path());
        assert!(load_conv_library(&config).is_err());
    }
}
