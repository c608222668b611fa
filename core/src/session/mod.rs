//! One SD session per connected device.
//!
//! [`SdSession`] bundles a device identifier with the filesystem client bound
//! to its channel, the completion cache over that client, and the download
//! placer. A host driving several devices creates one session per device;
//! sessions share no mutable state.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDateTime;
use tracing::debug;

use crate::channel::RegisterChannel;
use crate::config::SdConfig;
use crate::errors::SdError;
use crate::files::{
    DecodeErrors, DirectoryCache, DirectoryEntry, DiskInfo, DownloadPlacer, RemoteFilesystem,
    TextEncoding,
};

/// Filesystem client, cache and placer for a single device.
///
/// Every operation locks the client for its whole register sequence, so a
/// session can be shared between a command loop and a completer thread.
pub struct SdSession<C: RegisterChannel> {
    identifier: String,
    fs: Arc<Mutex<RemoteFilesystem<C>>>,
    cache: DirectoryCache<Mutex<RemoteFilesystem<C>>>,
    placer: DownloadPlacer,
}

impl<C: RegisterChannel> SdSession<C> {
    pub fn new(identifier: impl Into<String>, channel: C) -> Self {
        Self::with_config(identifier, channel, SdConfig::default())
    }

    pub fn with_config(identifier: impl Into<String>, channel: C, config: SdConfig) -> Self {
        let fs = Arc::new(Mutex::new(RemoteFilesystem::with_registers(
            channel,
            config.registers,
        )));
        Self {
            identifier: identifier.into(),
            cache: DirectoryCache::new(fs.clone()),
            fs,
            placer: DownloadPlacer::new(config.download),
        }
    }

    /// Device identifier (IP address, serial number, ...) used in download paths.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Shared handle to the underlying client.
    pub fn filesystem(&self) -> Arc<Mutex<RemoteFilesystem<C>>> {
        self.fs.clone()
    }

    pub fn cache(&self) -> &DirectoryCache<Mutex<RemoteFilesystem<C>>> {
        &self.cache
    }

    pub fn placer(&self) -> &DownloadPlacer {
        &self.placer
    }

    pub fn get_cwd(&self) -> Result<String, SdError> {
        self.client()?.get_cwd()
    }

    pub fn chdir(&self, path: &str) -> Result<(), SdError> {
        self.client()?.chdir(path)
    }

    pub fn list_dir(&self, path: Option<&str>) -> Result<Vec<DirectoryEntry>, SdError> {
        self.client()?.list_dir(path)
    }

    pub fn read_file_bytes(&self, path: &str) -> Result<Vec<u8>, SdError> {
        self.client()?.read_file_bytes(path)
    }

    pub fn read_file_text(
        &self,
        path: &str,
        encoding: TextEncoding,
        errors: DecodeErrors,
    ) -> Result<String, SdError> {
        self.client()?.read_file_text(path, encoding, errors)
    }

    pub fn delete_file(&self, path: &str) -> Result<(), SdError> {
        self.client()?.delete_file(path)
    }

    pub fn get_disk_info(&self) -> Result<DiskInfo, SdError> {
        self.client()?.get_disk_info()
    }

    /// Path completion candidates for `prefix`.
    pub fn complete_path(&self, prefix: &str) -> Vec<String> {
        self.cache.complete_path(prefix)
    }

    /// Download `remote` to a timestamped location below `local`, using the
    /// current local time.
    pub fn download(&self, remote: &str, local: &Path) -> Result<PathBuf, SdError> {
        self.download_at(remote, local, chrono::Local::now().naive_local())
    }

    /// Download `remote` as if it happened at `now`.
    ///
    /// The client is only locked while the file is read; local placement
    /// runs without it.
    pub fn download_at(
        &self,
        remote: &str,
        local: &Path,
        now: NaiveDateTime,
    ) -> Result<PathBuf, SdError> {
        let data = self.read_file_bytes(remote)?;
        debug!(
            "Read {} bytes of {} from {}",
            data.len(),
            remote,
            self.identifier
        );
        self.placer
            .place(remote, local, &self.identifier, &data, now)
    }

    fn client(&self) -> Result<MutexGuard<'_, RemoteFilesystem<C>>, SdError> {
        self.fs.lock().map_err(SdError::lock_poisoned)
    }
}
