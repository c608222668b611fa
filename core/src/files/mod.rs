//! Register-mapped SD card filesystem.
//!
//! [`RemoteFilesystem`] turns the device's file-I/O registers into listing,
//! navigation, whole-file reads and deletion. [`DirectoryCache`] and
//! [`DownloadPlacer`] consume its results and never touch remote state.

pub mod cache;
pub mod client;
pub mod download;
pub mod entry;
pub mod path;
pub mod text;

pub use cache::{DirectoryCache, DirectorySource};
pub use client::{FileSlot, RemoteFilesystem};
pub use download::DownloadPlacer;
pub use entry::{DirectoryEntry, DiskInfo, EntryKind};
pub use text::{DecodeErrors, TextEncoding};
