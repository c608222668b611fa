use serde::{Deserialize, Serialize};

use crate::errors::SdError;

/// Register names used by the remote filesystem client.
///
/// Defaults are the T7 file-I/O register names. Every field can be
/// overridden from JSON (camelCase keys); missing keys keep their default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterMap {
    #[serde(default = "default_dir_change")]
    pub dir_change: String,
    #[serde(default = "default_dir_current")]
    pub dir_current: String,
    #[serde(default = "default_dir_first")]
    pub dir_first: String,
    #[serde(default = "default_dir_next")]
    pub dir_next: String,
    #[serde(default = "default_path_read_len")]
    pub path_read_len: String,
    #[serde(default = "default_path_read")]
    pub path_read: String,
    #[serde(default = "default_attributes")]
    pub attributes: String,
    #[serde(default = "default_size_bytes")]
    pub size_bytes: String,
    #[serde(default = "default_delete")]
    pub delete: String,
    #[serde(default = "default_path_write_len")]
    pub path_write_len: String,
    #[serde(default = "default_path_write")]
    pub path_write: String,
    #[serde(default = "default_open")]
    pub open: String,
    #[serde(default = "default_read")]
    pub read: String,
    #[serde(default = "default_close")]
    pub close: String,
    #[serde(default = "default_sector_size")]
    pub disk_sector_size: String,
    #[serde(default = "default_sectors_per_cluster")]
    pub disk_sectors_per_cluster: String,
    #[serde(default = "default_total_clusters")]
    pub disk_total_clusters: String,
    #[serde(default = "default_free_clusters")]
    pub disk_free_clusters: String,
    /// Device error code that marks the end of a directory enumeration.
    #[serde(default = "default_end_of_directory_code")]
    pub end_of_directory_code: i32,
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self {
            dir_change: default_dir_change(),
            dir_current: default_dir_current(),
            dir_first: default_dir_first(),
            dir_next: default_dir_next(),
            path_read_len: default_path_read_len(),
            path_read: default_path_read(),
            attributes: default_attributes(),
            size_bytes: default_size_bytes(),
            delete: default_delete(),
            path_write_len: default_path_write_len(),
            path_write: default_path_write(),
            open: default_open(),
            read: default_read(),
            close: default_close(),
            disk_sector_size: default_sector_size(),
            disk_sectors_per_cluster: default_sectors_per_cluster(),
            disk_total_clusters: default_total_clusters(),
            disk_free_clusters: default_free_clusters(),
            end_of_directory_code: default_end_of_directory_code(),
        }
    }
}

impl RegisterMap {
    /// The four disk geometry names in batched-read order.
    pub fn disk_geometry(&self) -> [&str; 4] {
        [
            &self.disk_sector_size,
            &self.disk_sectors_per_cluster,
            &self.disk_total_clusters,
            &self.disk_free_clusters,
        ]
    }
}

/// Local layout settings for downloaded files.
///
/// - `date_format`: chrono format for the per-day directory.
/// - `time_format`: chrono format for the filename prefix.
/// - `identifier_replacement`: substituted for path separators in the
///   device identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadConfig {
    #[serde(default = "default_date_format")]
    pub date_format: String,
    #[serde(default = "default_time_format")]
    pub time_format: String,
    #[serde(default = "default_identifier_replacement")]
    pub identifier_replacement: char,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            date_format: default_date_format(),
            time_format: default_time_format(),
            identifier_replacement: default_identifier_replacement(),
        }
    }
}

/// Top-level configuration for an SD session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdConfig {
    #[serde(default)]
    pub registers: RegisterMap,
    #[serde(default)]
    pub download: DownloadConfig,
}

impl SdConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, SdError> {
        serde_json::from_str(json).map_err(|e| SdError::Config(e.to_string()))
    }
}

// --- Default value functions ---

fn default_dir_change() -> String {
    "FILE_IO_DIR_CHANGE".to_string()
}

fn default_dir_current() -> String {
    "FILE_IO_DIR_CURRENT".to_string()
}

fn default_dir_first() -> String {
    "FILE_IO_DIR_FIRST".to_string()
}

fn default_dir_next() -> String {
    "FILE_IO_DIR_NEXT".to_string()
}

fn default_path_read_len() -> String {
    "FILE_IO_PATH_READ_LEN_BYTES".to_string()
}

fn default_path_read() -> String {
    "FILE_IO_PATH_READ".to_string()
}

fn default_attributes() -> String {
    "FILE_IO_ATTRIBUTES".to_string()
}

fn default_size_bytes() -> String {
    "FILE_IO_SIZE_BYTES".to_string()
}

fn default_delete() -> String {
    "FILE_IO_DELETE".to_string()
}

fn default_path_write_len() -> String {
    "FILE_IO_PATH_WRITE_LEN_BYTES".to_string()
}

fn default_path_write() -> String {
    "FILE_IO_PATH_WRITE".to_string()
}

fn default_open() -> String {
    "FILE_IO_OPEN".to_string()
}

fn default_read() -> String {
    "FILE_IO_READ".to_string()
}

fn default_close() -> String {
    "FILE_IO_CLOSE".to_string()
}

fn default_sector_size() -> String {
    "FILE_IO_DISK_SECTOR_SIZE_BYTES".to_string()
}

fn default_sectors_per_cluster() -> String {
    "FILE_IO_DISK_SECTORS_PER_CLUSTER".to_string()
}

fn default_total_clusters() -> String {
    "FILE_IO_DISK_TOTAL_CLUSTERS".to_string()
}

fn default_free_clusters() -> String {
    "FILE_IO_DISK_FREE_CLUSTERS".to_string()
}

fn default_end_of_directory_code() -> i32 {
    2960
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_time_format() -> String {
    "%H%M%S".to_string()
}

fn default_identifier_replacement() -> char {
    '_'
}
