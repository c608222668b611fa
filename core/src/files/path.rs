//! On-device path handling.
//!
//! The device addresses files through fixed-width, NUL-padded ASCII buffers.
//! Paths are normalized with [`sanitize`] before use, encoded with
//! [`encode`] for the path-write registers and decoded with [`decode`] when
//! they come back from the path-read registers.

use crate::errors::SdError;

/// Root directory of the SD card.
pub const ROOT: &str = "/";

/// Normalize a user-facing path into its on-device form.
///
/// - Empty input means the root directory.
/// - Backslashes become forward slashes and repeated separators collapse.
/// - Trailing separators and NUL padding are dropped.
/// - Relative paths stay relative; the device resolves them against its
///   current directory.
pub fn sanitize(path: &str) -> Result<String, SdError> {
    if path.is_empty() {
        return Ok(ROOT.to_string());
    }

    let unified = path.trim_end_matches('\0').replace('\\', "/");
    if !unified.is_ascii() {
        return Err(SdError::InvalidPath(format!(
            "'{path}' contains non-ASCII characters"
        )));
    }
    if unified.contains('\0') {
        return Err(SdError::InvalidPath(format!(
            "'{}' contains an embedded NUL",
            unified.replace('\0', "\\0")
        )));
    }

    let absolute = unified.starts_with('/');
    let joined = unified
        .split('/')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    let normalized = if absolute {
        format!("/{joined}")
    } else {
        joined
    };
    if normalized.is_empty() {
        return Err(SdError::InvalidPath(format!(
            "'{}' is empty after normalization",
            path.replace('\0', "\\0")
        )));
    }
    Ok(normalized)
}

/// Split a path into its directory part and filename.
///
/// The directory part is empty for a bare filename and `/` for a file at
/// the root. Fails when the path is empty or ends in a separator.
pub fn split_dir_and_name(path: &str) -> Result<(String, String), SdError> {
    if path.is_empty() {
        return Err(SdError::InvalidPath("empty SD path".to_string()));
    }
    let unified = path.replace('\\', "/");
    let (dir, name) = match unified.rsplit_once('/') {
        Some((dir, name)) => (dir, name),
        None => ("", unified.as_str()),
    };
    if name.is_empty() {
        return Err(SdError::InvalidPath(format!(
            "'{path}' does not contain a filename"
        )));
    }

    let dir = if dir.is_empty() && unified.starts_with('/') {
        ROOT
    } else {
        let trimmed = dir.trim_end_matches('/');
        if trimmed.is_empty() && !dir.is_empty() {
            ROOT
        } else {
            trimmed
        }
    };
    Ok((dir.to_string(), name.to_string()))
}

/// Encode a path for the path-write registers: ASCII bytes plus a single
/// NUL terminator. The returned length is what the length register gets.
pub fn encode(path: &str) -> Result<Vec<u8>, SdError> {
    if !path.is_ascii() {
        return Err(SdError::InvalidPath(format!(
            "'{path}' contains non-ASCII characters"
        )));
    }
    if path.contains('\0') {
        return Err(SdError::InvalidPath("path contains an embedded NUL".to_string()));
    }
    let mut bytes = Vec::with_capacity(path.len() + 1);
    bytes.extend_from_slice(path.as_bytes());
    bytes.push(0);
    Ok(bytes)
}

/// Decode a NUL-padded name buffer read from the device.
pub fn decode(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Final component of a remote path (`/logs/a.csv` → `a.csv`).
pub fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Join a directory and a child name with exactly one separator.
pub fn join(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_empty_is_root() {
        assert_eq!(sanitize("").unwrap(), "/");
    }

    #[test]
    fn sanitize_normalizes_separators() {
        assert_eq!(sanitize("/").unwrap(), "/");
        assert_eq!(sanitize("//logs///2024/").unwrap(), "/logs/2024");
        assert_eq!(sanitize("\\logs\\a.csv").unwrap(), "/logs/a.csv");
        assert_eq!(sanitize("logs/").unwrap(), "logs");
        assert_eq!(sanitize("..").unwrap(), "..");
    }

    #[test]
    fn sanitize_strips_nul_padding() {
        assert_eq!(sanitize("/logs\0\0\0").unwrap(), "/logs");
    }

    #[test]
    fn sanitize_rejects_degenerate_input() {
        assert!(matches!(sanitize("\0\0"), Err(SdError::InvalidPath(_))));
        assert!(matches!(sanitize("/lo\0gs"), Err(SdError::InvalidPath(_))));
        assert!(matches!(sanitize("/données"), Err(SdError::InvalidPath(_))));
    }

    #[test]
    fn split_dir_and_name_variants() {
        assert_eq!(
            split_dir_and_name("/logs/a.csv").unwrap(),
            ("/logs".to_string(), "a.csv".to_string())
        );
        assert_eq!(
            split_dir_and_name("/a.csv").unwrap(),
            ("/".to_string(), "a.csv".to_string())
        );
        assert_eq!(
            split_dir_and_name("a.csv").unwrap(),
            (String::new(), "a.csv".to_string())
        );
        assert_eq!(
            split_dir_and_name("logs//a.csv").unwrap(),
            ("logs".to_string(), "a.csv".to_string())
        );
        assert_eq!(
            split_dir_and_name("//a.csv").unwrap(),
            ("/".to_string(), "a.csv".to_string())
        );
    }

    #[test]
    fn split_dir_and_name_rejects_missing_filename() {
        assert!(matches!(split_dir_and_name(""), Err(SdError::InvalidPath(_))));
        assert!(matches!(
            split_dir_and_name("/logs/"),
            Err(SdError::InvalidPath(_))
        ));
    }

    #[test]
    fn encode_appends_terminator() {
        assert_eq!(encode("a.csv").unwrap(), b"a.csv\0".to_vec());
        assert_eq!(encode("").unwrap(), vec![0]);
        assert!(matches!(encode("é"), Err(SdError::InvalidPath(_))));
    }

    #[test]
    fn decode_trims_padding() {
        assert_eq!(decode(b"DATA.CSV\0\0\0\0"), "DATA.CSV");
        assert_eq!(decode(b"/logs"), "/logs");
        assert_eq!(decode(b"\0\0"), "");
    }

    #[test]
    fn base_name_and_join() {
        assert_eq!(base_name("/logs/a.csv"), "a.csv");
        assert_eq!(base_name("a.csv"), "a.csv");
        assert_eq!(base_name("logs\\b.txt"), "b.txt");
        assert_eq!(join("/", "logs"), "/logs");
        assert_eq!(join("/logs/", "a.csv"), "/logs/a.csv");
        assert_eq!(join("/logs", "a.csv"), "/logs/a.csv");
    }
}
