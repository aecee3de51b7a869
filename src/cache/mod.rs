//! Two-level tree cache
//!
//! Parsing wide tables is the expensive part of a run, so reconstructed trees
//! are persisted at two levels:
//!
//! - **Per-file cache**: one `<key>.bin` file per source, written as soon as
//!   the source has been parsed.
//! - **Aggregate cache**: every source's tree for one configuration, loaded
//!   once at run start and written once, in full, at run end.
//!
//! # Reuse policy
//!
//! For each source file, in order:
//!
//! 1. Key already in the aggregate: nothing to do.
//! 2. A per-file entry loads with a tree payload: adopt it.
//! 3. Otherwise parse the source, write a per-file entry and adopt it.
//!
//! A crash before the aggregate is written loses only aggregate progress;
//! the next run picks the trees back up from the per-file entries.
//!
//! # Encoding
//!
//! Entries are `bincode` encodings of a small envelope carrying a magic tag
//! and a format version. An envelope with another version or without a tree
//! is treated as a miss.

use crate::error::{ForceBridgeError, Result};
use crate::parser::{sanitize_identifier, source_key};
use crate::tree::{self, Resolved};
use crate::types::SourceFileResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Magic tag at the start of every cache envelope
pub const CACHE_MAGIC: [u8; 4] = *b"FBTC";

/// Bumped whenever the encoded tree layout changes
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Extension of cache entries
pub const CACHE_EXTENSION: &str = "bin";

/// How a source file's tree was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Already present in the aggregate cache
    AggregateHit,
    /// Loaded from its per-file cache entry
    PerFileHit,
    /// Parsed from the raw source
    Parsed,
}

/// `R` is the owned result when loading and a reference when saving.
#[derive(Debug, Serialize, Deserialize)]
struct PerFileEnvelope<R> {
    magic: [u8; 4],
    version: u32,
    key: String,
    result: Option<R>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AggregateEnvelope<E> {
    magic: [u8; 4],
    version: u32,
    entries: E,
}

fn check_header(magic: &[u8; 4], version: u32) -> Result<()> {
    if magic != &CACHE_MAGIC {
        return Err(ForceBridgeError::Cache("not a tree cache file".to_string()));
    }
    if version != CACHE_FORMAT_VERSION {
        return Err(ForceBridgeError::Cache(format!(
            "format version {} (expected {})",
            version, CACHE_FORMAT_VERSION
        )));
    }
    Ok(())
}

/// Serialize `value` next to `path` and rename it into place.
fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension(format!("{}.tmp", CACHE_EXTENSION));
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        bincode::serialize_into(&mut writer, value)?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Decode from an in-memory buffer so corrupt length prefixes fail on
/// bounds checks instead of allocating.
fn read_cache_file<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)
        .map_err(|e| ForceBridgeError::Cache(format!("cannot read {:?}: {}", path, e)))?;
    bincode::deserialize(&bytes)
        .map_err(|e| ForceBridgeError::Cache(format!("corrupt entry {:?}: {}", path, e)))
}

/// Write one source file's tree as a per-file cache entry.
pub fn save_source_result(path: &Path, key: &str, result: &SourceFileResult) -> Result<()> {
    let envelope = PerFileEnvelope {
        magic: CACHE_MAGIC,
        version: CACHE_FORMAT_VERSION,
        key: key.to_string(),
        result: Some(result),
    };
    write_atomic(path, &envelope)
}

/// Load a per-file cache entry. A missing tree payload is a [`ForceBridgeError::Cache`].
pub fn load_source_result(path: &Path) -> Result<SourceFileResult> {
    let envelope: PerFileEnvelope<SourceFileResult> = read_cache_file(path)?;
    check_header(&envelope.magic, envelope.version)?;
    envelope.result.ok_or_else(|| {
        ForceBridgeError::Cache(format!(
            "entry {:?} for '{}' has no tree payload",
            path, envelope.key
        ))
    })
}

/// Run-wide store of every source file's tree, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateCache {
    entries: Vec<(String, SourceFileResult)>,
}

impl AggregateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&SourceFileResult> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, r)| r)
    }

    /// Insert or replace the tree stored under `key`.
    pub fn insert(&mut self, key: impl Into<String>, result: SourceFileResult) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = result,
            None => self.entries.push((key, result)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<SourceFileResult> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SourceFileResult)> {
        self.entries.iter().map(|(k, r)| (k.as_str(), r))
    }

    /// First leaf named `name`, searching source trees in insertion order.
    ///
    /// The returned path starts with the source key.
    pub fn resolve(&self, name: &str) -> Option<Resolved<'_>> {
        self.entries.iter().find_map(|(key, result)| {
            tree::resolve(&result.root, name).map(|mut found| {
                found.path.insert(0, key.as_str());
                found
            })
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let envelope = AggregateEnvelope {
            magic: CACHE_MAGIC,
            version: CACHE_FORMAT_VERSION,
            entries: &self.entries,
        };
        write_atomic(path, &envelope)
    }

    /// Load from disk; a missing file is an empty cache.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let envelope: AggregateEnvelope<Vec<(String, SourceFileResult)>> =
            read_cache_file(path)?;
        check_header(&envelope.magic, envelope.version)?;
        Ok(Self {
            entries: envelope.entries,
        })
    }
}

/// Owns the aggregate cache for one run and applies the reuse policy.
#[derive(Debug)]
pub struct CacheStore {
    dir: PathBuf,
    aggregate_path: PathBuf,
    aggregate: AggregateCache,
    read_only: bool,
    /// Source path that first claimed each key this run
    claimed: HashMap<String, PathBuf>,
    /// Non-fatal cache problems seen so far
    warnings: usize,
}

impl CacheStore {
    /// Open the cache directory and load the aggregate named after
    /// `aggregate_key`. An unreadable aggregate starts empty with a warning.
    pub fn open(dir: impl Into<PathBuf>, aggregate_key: &str) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let aggregate_path = dir.join(format!(
            "{}_aggregate.{}",
            sanitize_identifier(aggregate_key),
            CACHE_EXTENSION
        ));

        let mut warnings = 0;
        let aggregate = match AggregateCache::load(&aggregate_path) {
            Ok(aggregate) => aggregate,
            Err(e) => {
                tracing::warn!("Ignoring unreadable aggregate cache: {}", e);
                warnings += 1;
                AggregateCache::new()
            }
        };
        tracing::info!(
            "Aggregate cache {:?}: {} source(s)",
            aggregate_path,
            aggregate.len()
        );

        Ok(Self {
            dir,
            aggregate_path,
            aggregate,
            read_only: false,
            claimed: HashMap::new(),
            warnings,
        })
    }

    /// Never write per-file entries or the aggregate.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn aggregate_path(&self) -> &Path {
        &self.aggregate_path
    }

    pub fn aggregate(&self) -> &AggregateCache {
        &self.aggregate
    }

    /// Number of unreadable or unwritable cache files met so far.
    pub fn warnings(&self) -> usize {
        self.warnings
    }

    pub fn per_file_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, CACHE_EXTENSION))
    }

    /// Make sure the tree for `source` is in the aggregate.
    ///
    /// `parse` runs only when neither cache level has the tree; its errors
    /// are returned unchanged. A second source whose file stem maps to an
    /// already claimed key is reported as a warning and shares the first
    /// source's tree.
    pub fn ensure<F>(&mut self, source: &Path, parse: F) -> Result<CacheOutcome>
    where
        F: FnOnce(&Path) -> Result<SourceFileResult>,
    {
        let key = source_key(source);
        match self.claimed.get(&key) {
            Some(first) if first != source => {
                tracing::warn!(
                    "{:?} has the same cache key '{}' as {:?}; it is not parsed and its variables are not reachable",
                    source,
                    key,
                    first
                );
                self.warnings += 1;
            }
            Some(_) => {}
            None => {
                self.claimed.insert(key.clone(), source.to_path_buf());
            }
        }

        if self.aggregate.contains(&key) {
            tracing::info!("{:?}: using aggregate cache entry '{}'", source, key);
            return Ok(CacheOutcome::AggregateHit);
        }

        let entry_path = self.per_file_path(&key);
        if entry_path.exists() {
            match load_source_result(&entry_path) {
                Ok(result) => {
                    tracing::info!("{:?}: using per-file cache {:?}", source, entry_path);
                    self.aggregate.insert(key, result);
                    return Ok(CacheOutcome::PerFileHit);
                }
                Err(e) => {
                    tracing::warn!("{:?}: per-file cache unusable, reparsing: {}", source, e);
                    self.warnings += 1;
                }
            }
        }

        let result = parse(source)?;
        if !self.read_only {
            if let Err(e) = save_source_result(&entry_path, &key, &result) {
                tracing::warn!("{:?}: failed to write per-file cache: {}", source, e);
                self.warnings += 1;
            }
        }
        self.aggregate.insert(key, result);
        Ok(CacheOutcome::Parsed)
    }

    /// Write the aggregate in full. Called once at the end of a run.
    pub fn persist(&self) -> Result<()> {
        if self.read_only {
            tracing::info!("Read-only run, aggregate cache not written");
            return Ok(());
        }
        self.aggregate.save(&self.aggregate_path)?;
        tracing::info!(
            "Wrote aggregate cache {:?} ({} source(s))",
            self.aggregate_path,
            self.aggregate.len()
        );
        Ok(())
    }
}
