use serde::{Deserialize, Serialize};

use crate::errors::SdError;

/// Attribute bit marking a regular file (FAT "archive" bit).
pub const ATTR_FILE: u32 = 1 << 5;
/// Attribute bit marking a directory.
pub const ATTR_DIRECTORY: u32 = 1 << 4;

/// What a directory entry refers to, derived from its attribute byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryKind {
    File,
    Directory,
    /// Neither bit set: volume labels, reserved entries.
    Unknown,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub name: String,
    pub size: u64,
    pub kind: EntryKind,
    pub raw_attributes: u32,
}

impl DirectoryEntry {
    /// Build an entry from the raw values the device reports.
    ///
    /// Fails with [`SdError::ConflictingAttributes`] when both the file and
    /// the directory bit are set.
    pub fn from_raw(name: String, size: u64, raw_attributes: u32) -> Result<Self, SdError> {
        let is_file = raw_attributes & ATTR_FILE != 0;
        let is_dir = raw_attributes & ATTR_DIRECTORY != 0;
        let kind = match (is_file, is_dir) {
            (true, true) => {
                return Err(SdError::ConflictingAttributes {
                    name,
                    attributes: raw_attributes,
                })
            }
            (true, false) => EntryKind::File,
            (false, true) => EntryKind::Directory,
            (false, false) => EntryKind::Unknown,
        };
        Ok(Self {
            name,
            size,
            kind,
            raw_attributes,
        })
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Short label for listings: `FILE`, `DIR` or `OTHER`.
    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            EntryKind::File => "FILE",
            EntryKind::Directory => "DIR",
            EntryKind::Unknown => "OTHER",
        }
    }
}

/// SD card geometry as reported by the disk registers.
///
/// Byte totals are derived on demand in `u128`, so no combination of
/// 32-bit register values can overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskInfo {
    pub sector_size_bytes: u32,
    pub sectors_per_cluster: u32,
    pub total_clusters: u32,
    pub free_clusters: u32,
}

const BYTES_PER_MB: f64 = 1_048_576.0;

impl DiskInfo {
    fn cluster_bytes(&self) -> u128 {
        u128::from(self.sector_size_bytes) * u128::from(self.sectors_per_cluster)
    }

    pub fn total_bytes(&self) -> u128 {
        self.cluster_bytes() * u128::from(self.total_clusters)
    }

    pub fn free_bytes(&self) -> u128 {
        self.cluster_bytes() * u128::from(self.free_clusters)
    }

    /// Bytes in use. Zero if the device reports more free than total clusters.
    pub fn used_bytes(&self) -> u128 {
        self.total_bytes().saturating_sub(self.free_bytes())
    }

    pub fn total_mb(&self) -> f64 {
        self.total_bytes() as f64 / BYTES_PER_MB
    }

    pub fn free_mb(&self) -> f64 {
        self.free_bytes() as f64 / BYTES_PER_MB
    }
}
