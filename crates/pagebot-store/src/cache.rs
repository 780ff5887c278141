//! Content-addressed completion cache.
//!
//! One entry per [`Fingerprint`], written once and read many times. Entries
//! are never expired unless an [`EvictionPolicy`] other than [`NeverEvict`]
//! is installed.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use pagebot_core::{CompletionResponse, Fingerprint};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::StoreError;

/// Durable mapping from fingerprint to completion artifact.
pub trait CompletionCache: Send + Sync {
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CompletionResponse>, StoreError>;
    fn put(
        &self,
        fingerprint: &Fingerprint,
        response: &CompletionResponse,
    ) -> Result<(), StoreError>;
}

/// Decides whether a stored entry should be treated as absent.
pub trait EvictionPolicy: Send + Sync {
    fn is_expired(&self, stored_at: DateTime<Utc>, now: DateTime<Utc>) -> bool;
}

/// Keep every entry forever.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverEvict;

impl EvictionPolicy for NeverEvict {
    fn is_expired(&self, _stored_at: DateTime<Utc>, _now: DateTime<Utc>) -> bool {
        false
    }
}

/// Expire entries older than a fixed age.
#[derive(Debug, Clone, Copy)]
pub struct MaxAge(pub Duration);

impl EvictionPolicy for MaxAge {
    fn is_expired(&self, stored_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match (now - stored_at).to_std() {
            Ok(age) => age > self.0,
            // stored_at in the future: clock skew, keep it
            Err(_) => false,
        }
    }
}

/// On-disk representation of one cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedCompletion {
    pub fingerprint: Fingerprint,
    pub stored_at: DateTime<Utc>,
    pub response: CompletionResponse,
}

/// Directory-backed cache: `<dir>/llm_completion_<fingerprint>.json`.
///
/// Writes go through a temporary file in the same directory followed by a
/// rename, so readers never observe a partial entry.
pub struct FileCache {
    dir: PathBuf,
    eviction: Box<dyn EvictionPolicy>,
}

impl FileCache {
    /// Open or create a cache rooted at `dir`.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        if !dir.is_dir() {
            return Err(StoreError::CacheDir(dir.to_path_buf()));
        }
        info!(dir = %dir.display(), "opened completion cache");
        Ok(Self {
            dir: dir.to_path_buf(),
            eviction: Box::new(NeverEvict),
        })
    }

    /// Replace the eviction policy (default: [`NeverEvict`]).
    pub fn with_eviction(mut self, policy: impl EvictionPolicy + 'static) -> Self {
        self.eviction = Box::new(policy);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic file path for a fingerprint.
    pub fn path_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir
            .join(format!("llm_completion_{}.json", fingerprint.as_str()))
    }
}

impl CompletionCache for FileCache {
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CompletionResponse>, StoreError> {
        let path = self.path_for(fingerprint);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let entry: CachedCompletion = serde_json::from_slice(&bytes)
            .map_err(|source| StoreError::Corrupt { path: path.clone(), source })?;

        if self.eviction.is_expired(entry.stored_at, Utc::now()) {
            debug!(path = %path.display(), "cache entry expired, removing");
            fs::remove_file(&path)?;
            return Ok(None);
        }
        Ok(Some(entry.response))
    }

    fn put(
        &self,
        fingerprint: &Fingerprint,
        response: &CompletionResponse,
    ) -> Result<(), StoreError> {
        let entry = CachedCompletion {
            fingerprint: fingerprint.clone(),
            stored_at: Utc::now(),
            response: response.clone(),
        };
        let path = self.path_for(fingerprint);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut tmp, &entry)?;
        tmp.flush()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        debug!(path = %path.display(), "cache entry written");
        Ok(())
    }
}

/// Process-local cache. Lost on exit.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<Fingerprint, CompletionResponse>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A panic while holding the lock leaves the map intact, so the guard is
    /// recovered rather than reported.
    fn entries(&self) -> MutexGuard<'_, HashMap<Fingerprint, CompletionResponse>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CompletionCache for MemoryCache {
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CompletionResponse>, StoreError> {
        Ok(self.entries().get(fingerprint).cloned())
    }

    fn put(
        &self,
        fingerprint: &Fingerprint,
        response: &CompletionResponse,
    ) -> Result<(), StoreError> {
        self.entries().insert(fingerprint.clone(), response.clone());
        Ok(())
    }
}
