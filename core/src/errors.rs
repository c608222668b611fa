//! Error types for the sdlink core crate.
//!
//! [`ChannelError`] is what a register transport reports. [`SdError`] is what
//! every filesystem operation returns; transport failures pass through it
//! unchanged via [`SdError::Device`].

use std::path::PathBuf;

use thiserror::Error;

/// Errors reported by a [`RegisterChannel`](crate::channel::RegisterChannel)
/// implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChannelError {
    /// The device rejected a register access with a numeric error code.
    #[error("Device error {code}: {message}")]
    Device { code: i32, message: String },

    /// The device handle is no longer connected.
    #[error("Device disconnected")]
    Disconnected,

    /// Any other transport-level failure.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl ChannelError {
    /// Device error code, if this is a device-reported failure.
    pub fn code(&self) -> Option<i32> {
        match self {
            ChannelError::Device { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Errors returned by remote filesystem operations.
#[derive(Error, Debug)]
pub enum SdError {
    /// The supplied path is malformed (empty, no filename, non-ASCII).
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The requested name is absent from the directory listing.
    #[error("File not found on SD card: {0}")]
    FileNotFound(String),

    /// A register access failed. Passed through unchanged.
    #[error("Device error: {0}")]
    Device(#[from] ChannelError),

    /// Returning to the directory that was current before an operation
    /// failed. The remote session is now in an unknown directory.
    ///
    /// `primary` carries the operation's own error when it failed too.
    #[error(
        "Failed to restore remote directory '{directory}': {source}{}",
        after_failure(.primary)
    )]
    DirectoryRestore {
        directory: String,
        source: Box<SdError>,
        primary: Option<Box<SdError>>,
    },

    /// A directory entry reported both the file and directory attribute bits.
    #[error("Entry '{name}' has conflicting attributes 0x{attributes:02x}")]
    ConflictingAttributes { name: String, attributes: u32 },

    /// The single file-I/O slot was in the wrong state for the transition.
    #[error("File slot error: {0}")]
    FileSlot(String),

    /// Strict text decoding failed.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A local download directory could not be created.
    #[error("Failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A downloaded file could not be written locally.
    #[error("Failed to write {}: {source}", path.display())]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A configuration error (malformed JSON, invalid values).
    #[error("Config error: {0}")]
    Config(String),
}

impl SdError {
    /// A shared client whose lock was poisoned by a panicking holder.
    pub(crate) fn lock_poisoned(e: impl std::fmt::Display) -> Self {
        SdError::Device(ChannelError::Transport(format!(
            "Failed to lock filesystem client: {e}"
        )))
    }
}

fn after_failure(primary: &Option<Box<SdError>>) -> String {
    primary
        .as_ref()
        .map(|p| format!(" (after: {p})"))
        .unwrap_or_default()
}
