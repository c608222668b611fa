//! Directory name cache backing interactive path completion.
//!
//! Only directories that are actually requested get fetched, one listing
//! each; nothing walks the card recursively. Cached names are never
//! invalidated, so entries created or deleted on the device after the first
//! fetch stay invisible until the cache is dropped. Nothing correctness
//! critical (reads, deletes) consults this cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::channel::RegisterChannel;
use crate::errors::SdError;
use crate::files::client::RemoteFilesystem;
use crate::files::path;

/// Where the cache gets directory listings from.
///
/// Implemented for `Mutex<RemoteFilesystem<C>>`, which is how a client is
/// shared between a front end and its completer.
pub trait DirectorySource: Send + Sync {
    /// Live current directory of the device.
    fn current_dir(&self) -> Result<String, SdError>;

    /// Names of the entries in `path`.
    fn list_names(&self, path: &str) -> Result<Vec<String>, SdError>;
}

impl<C: RegisterChannel> DirectorySource for Mutex<RemoteFilesystem<C>> {
    fn current_dir(&self) -> Result<String, SdError> {
        self.lock().map_err(SdError::lock_poisoned)?.get_cwd()
    }

    fn list_names(&self, path: &str) -> Result<Vec<String>, SdError> {
        let entries = self
            .lock()
            .map_err(SdError::lock_poisoned)?
            .list_dir(Some(path))?;
        Ok(entries.into_iter().map(|e| e.name).collect())
    }
}

/// Lazily populated map from directory path to entry names.
pub struct DirectoryCache<S> {
    source: Arc<S>,
    entries: Mutex<HashMap<String, Vec<String>>>,
}

impl<S: DirectorySource> DirectoryCache<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Names in `path`, fetched from the device on first request.
    ///
    /// Entries are keyed by the normalized absolute path, so `/logs/` and
    /// `/logs` share one entry and a relative path is resolved against the
    /// device's current directory first. Fetch failures yield an empty list
    /// and are not cached. The map lock is not held during the fetch; two
    /// concurrent first requests for the same path both fetch and the later
    /// write wins.
    pub fn get(&self, path: &str) -> Vec<String> {
        let key = match self.key_for(path) {
            Ok(key) => key,
            Err(e) => {
                warn!("SD cache cannot resolve {}: {}", path, e);
                return Vec::new();
            }
        };

        if let Some(names) = self.map().get(&key) {
            return names.clone();
        }

        let names = match self.source.list_names(&key) {
            Ok(names) => names,
            Err(e) => {
                warn!("SD cache fetch for {} failed: {}", key, e);
                return Vec::new();
            }
        };
        debug!("Cached {} names for {}", names.len(), key);

        self.map().insert(key, names.clone());
        names
    }

    /// Complete a path prefix from cached listings.
    ///
    /// Absolute prefixes are split at their last separator; anything else is
    /// completed inside the device's current directory. Returned candidates
    /// are always absolute.
    pub fn complete_path(&self, prefix: &str) -> Vec<String> {
        let (dir, partial) = if prefix.starts_with('/') {
            match prefix.rsplit_once('/') {
                Some(("", partial)) => (path::ROOT.to_string(), partial),
                Some((dir, partial)) => (dir.to_string(), partial),
                None => (path::ROOT.to_string(), prefix),
            }
        } else {
            match self.source.current_dir() {
                Ok(cwd) => (cwd, prefix),
                Err(e) => {
                    warn!("SD completion could not read current directory: {}", e);
                    return Vec::new();
                }
            }
        };

        self.get(&dir)
            .into_iter()
            .filter(|name| name.starts_with(partial))
            .map(|name| path::join(&dir, &name))
            .collect()
    }

    /// Cached names for `path`, without fetching a listing.
    ///
    /// A relative `path` still costs one current-directory query.
    pub fn cached(&self, path: &str) -> Option<Vec<String>> {
        let key = self.key_for(path).ok()?;
        self.map().get(&key).cloned()
    }

    /// Number of cached directories.
    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    /// Normalized absolute cache key for `path`.
    fn key_for(&self, path: &str) -> Result<String, SdError> {
        let clean = path::sanitize(path)?;
        if clean.starts_with('/') {
            return Ok(clean);
        }
        let cwd = self.source.current_dir()?;
        Ok(path::join(&cwd, &clean))
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<String>>> {
        // The map only holds derived listings, so a poisoned lock is still usable.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
