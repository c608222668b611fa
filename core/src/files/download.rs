//! Local placement of downloaded files.
//!
//! A download requested as `out/data.csv` from device `192.168.1.20` at
//! 2024-05-01 13:45:10 lands in `out/192.168.1.20/2024-05-01/134510_data.csv`.
//! Existing files are never overwritten: the next free name gets a ` (n)`
//! counter before its extension.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::config::DownloadConfig;
use crate::errors::SdError;
use crate::files::path;

/// Computes collision-free local paths for downloads and writes them.
#[derive(Debug, Clone, Default)]
pub struct DownloadPlacer {
    config: DownloadConfig,
}

impl DownloadPlacer {
    pub fn new(config: DownloadConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Write `data` below `requested` and return the path actually used.
    ///
    /// `requested` names either a file or a directory (an existing one, or
    /// any path ending in a separator); for a directory the remote file's
    /// base name is used.
    pub fn place(
        &self,
        remote_path: &str,
        requested: &Path,
        device_identifier: &str,
        data: &[u8],
        now: NaiveDateTime,
    ) -> Result<PathBuf, SdError> {
        let target = resolve_target(remote_path, requested)?;

        let base_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                SdError::InvalidPath(format!("'{}' has no file name", target.display()))
            })?;
        let base_dir = target.parent().unwrap_or_else(|| Path::new(""));

        let full_dir = base_dir
            .join(self.sanitize_identifier(device_identifier))
            .join(format_timestamp(&now, &self.config.date_format)?);
        let file_name = format!(
            "{}_{}",
            format_timestamp(&now, &self.config.time_format)?,
            base_name
        );

        std::fs::create_dir_all(&full_dir).map_err(|source| SdError::CreateDir {
            path: full_dir.clone(),
            source,
        })?;

        let final_path = write_new(&full_dir, &file_name, data)?;
        info!("Downloaded '{}' -> '{}'", remote_path, final_path.display());
        Ok(final_path)
    }

    /// Replace path separators so the identifier stays one path component.
    pub fn sanitize_identifier(&self, identifier: &str) -> String {
        identifier
            .chars()
            .map(|c| {
                if c == '/' || c == '\\' {
                    self.config.identifier_replacement
                } else {
                    c
                }
            })
            .collect()
    }
}

/// Format `now`, rejecting format strings chrono cannot render.
fn format_timestamp(now: &NaiveDateTime, format: &str) -> Result<String, SdError> {
    use std::fmt::Write as _;

    let mut out = String::new();
    write!(out, "{}", now.format(format))
        .map_err(|_| SdError::Config(format!("invalid timestamp format '{format}'")))?;
    Ok(out)
}

fn ends_with_separator(requested: &Path) -> bool {
    let s = requested.as_os_str().to_string_lossy();
    s.ends_with('/') || s.ends_with(std::path::MAIN_SEPARATOR)
}

/// Append the remote base name when `requested` denotes a directory.
fn resolve_target(remote_path: &str, requested: &Path) -> Result<PathBuf, SdError> {
    if requested.as_os_str().is_empty() || ends_with_separator(requested) || requested.is_dir() {
        let (_, name) = path::split_dir_and_name(remote_path)?;
        Ok(requested.join(name))
    } else {
        Ok(requested.to_path_buf())
    }
}

/// Candidate name for the `counter`-th collision: `stem (n).ext`.
fn numbered(file_name: &str, counter: usize) -> String {
    let candidate = Path::new(file_name);
    let stem = candidate
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match candidate.extension() {
        Some(ext) => format!("{stem} ({counter}).{}", ext.to_string_lossy()),
        None => format!("{stem} ({counter})"),
    }
}

/// Create the first free `file_name` variant in `dir` and write `data` to it.
fn write_new(dir: &Path, file_name: &str, data: &[u8]) -> Result<PathBuf, SdError> {
    write_new_with(dir, file_name, |file| file.write_all(data))
}

/// Create the first free `file_name` variant in `dir` and fill it with `fill`.
///
/// Files are created with `create_new`, so a name taken between the check
/// and the write moves on to the next counter instead of overwriting. A
/// failed fill removes the partial file so the name stays free.
fn write_new_with(
    dir: &Path,
    file_name: &str,
    fill: impl FnOnce(&mut File) -> std::io::Result<()>,
) -> Result<PathBuf, SdError> {
    let mut counter = 0;
    loop {
        let candidate = if counter == 0 {
            dir.join(file_name)
        } else {
            dir.join(numbered(file_name, counter))
        };

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(mut file) => {
                if let Err(source) = fill(&mut file) {
                    drop(file);
                    if let Err(e) = std::fs::remove_file(&candidate) {
                        warn!("Could not remove partial {}: {}", candidate.display(), e);
                    }
                    return Err(SdError::WriteFile {
                        path: candidate,
                        source,
                    });
                }
                return Ok(candidate);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("{} exists, trying next name", candidate.display());
                counter += 1;
            }
            Err(source) => {
                return Err(SdError::WriteFile {
                    path: candidate,
                    source,
                })
            }
        }
    }
}
