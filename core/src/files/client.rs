//! Remote filesystem client over the device's file-I/O registers.
//!
//! The device keeps a single current directory and a single implicit
//! open-file slot. Every operation here is an ordered sequence of register
//! accesses against that shared state:
//!
//! - Operations that navigate ([`list_dir`](RemoteFilesystem::list_dir),
//!   [`read_file_bytes`](RemoteFilesystem::read_file_bytes)) read the live
//!   current directory first and change back to it on every exit path.
//! - File reads take their byte length from a directory listing, because the
//!   read register does not report it.
//!
//! A client owns one channel and takes `&mut self` everywhere, so a shared
//! client has to be wrapped in a `Mutex` by the caller.

use tracing::{debug, info, warn};

use crate::channel::{register_to_u32, register_to_u64, RegisterChannel};
use crate::config::RegisterMap;
use crate::errors::{ChannelError, SdError};
use crate::files::entry::{DirectoryEntry, DiskInfo, ATTR_DIRECTORY};
use crate::files::path;
use crate::files::text::{decode_text, DecodeErrors, TextEncoding};

/// State of the device's single open-file slot.
///
/// The device exposes open, read and close as independent register writes;
/// tracking the transitions here keeps an interrupted sequence from leaking
/// into the next read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FileSlot {
    #[default]
    Closed,
    Opened { name: String },
}

/// Raw values of one directory entry as enumerated from the device.
struct RawEntry {
    name: String,
    size: u64,
    attributes: u32,
}

/// Filesystem client bound to one device channel.
pub struct RemoteFilesystem<C> {
    channel: C,
    registers: RegisterMap,
    slot: FileSlot,
}

impl<C: RegisterChannel> RemoteFilesystem<C> {
    /// Create a client using the default register names.
    pub fn new(channel: C) -> Self {
        Self::with_registers(channel, RegisterMap::default())
    }

    pub fn with_registers(channel: C, registers: RegisterMap) -> Self {
        Self {
            channel,
            registers,
            slot: FileSlot::Closed,
        }
    }

    pub fn registers(&self) -> &RegisterMap {
        &self.registers
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    pub fn file_slot(&self) -> &FileSlot {
        &self.slot
    }

    /// Read the device's current directory.
    pub fn get_cwd(&mut self) -> Result<String, SdError> {
        self.channel.write_named(&self.registers.dir_current, 1.0)?;
        let len = register_to_u64(self.channel.read_named(&self.registers.path_read_len)?);
        let raw = self
            .channel
            .read_named_array(&self.registers.path_read, len as usize)?;
        Ok(path::decode(&raw))
    }

    /// Change the device's current directory.
    pub fn chdir(&mut self, path: &str) -> Result<(), SdError> {
        let target = path::sanitize(path)?;
        debug!("Changing SD directory to {}", target);
        self.write_path(&target)?;
        self.channel.write_named(&self.registers.dir_change, 1.0)?;
        Ok(())
    }

    /// List a directory, or the current one when `path` is `None`.
    ///
    /// The current directory is restored before returning, whether the
    /// listing succeeded or not.
    pub fn list_dir(&mut self, path: Option<&str>) -> Result<Vec<DirectoryEntry>, SdError> {
        self.with_restored_dir(|fs| {
            if let Some(path) = path {
                fs.chdir(path)?;
            }
            fs.enumerate_current()?
                .into_iter()
                .map(|raw| DirectoryEntry::from_raw(raw.name, raw.size, raw.attributes))
                .collect()
        })
    }

    /// Read a whole file.
    ///
    /// The file's size comes from a listing of its directory; exactly that
    /// many bytes are read through the file slot.
    pub fn read_file_bytes(&mut self, path: &str) -> Result<Vec<u8>, SdError> {
        self.with_restored_dir(|fs| {
            let (dir, name) = path::split_dir_and_name(path)?;
            if !dir.is_empty() {
                fs.chdir(&dir)?;
            }

            let entry = fs
                .enumerate_current()?
                .into_iter()
                .find(|raw| raw.name == name)
                .ok_or_else(|| SdError::FileNotFound(path.to_string()))?;
            if entry.attributes & ATTR_DIRECTORY != 0 {
                return Err(SdError::InvalidPath(format!("'{path}' is a directory")));
            }

            let size = usize::try_from(entry.size).map_err(|_| {
                SdError::Device(ChannelError::Transport(format!(
                    "file size {} does not fit in memory",
                    entry.size
                )))
            })?;
            fs.read_through_slot(&name, size)
        })
    }

    /// Read a whole file and decode it as text.
    pub fn read_file_text(
        &mut self,
        path: &str,
        encoding: TextEncoding,
        errors: DecodeErrors,
    ) -> Result<String, SdError> {
        let data = self.read_file_bytes(path)?;
        decode_text(&data, encoding, errors)
    }

    /// Delete a file. Whatever the device reports for a missing file is
    /// returned as-is.
    pub fn delete_file(&mut self, path: &str) -> Result<(), SdError> {
        let target = path::sanitize(path)?;
        self.write_path(&target)?;
        self.channel.write_named(&self.registers.delete, 1.0)?;
        info!("Deleted {} from SD card", target);
        Ok(())
    }

    /// Read the card geometry in one batched register read.
    pub fn get_disk_info(&mut self) -> Result<DiskInfo, SdError> {
        let names = self.registers.disk_geometry();
        let values = self.channel.read_names(&names)?;
        if values.len() != names.len() {
            return Err(SdError::Device(ChannelError::Transport(format!(
                "expected {} disk geometry values, got {}",
                names.len(),
                values.len()
            ))));
        }
        Ok(DiskInfo {
            sector_size_bytes: register_to_u32(values[0]),
            sectors_per_cluster: register_to_u32(values[1]),
            total_clusters: register_to_u32(values[2]),
            free_clusters: register_to_u32(values[3]),
        })
    }

    // ── internals ────────────────────────────────────────────────────

    /// Run `op` and change back to the directory that was current before it.
    ///
    /// A failed change-back is reported even when `op` succeeded, and carries
    /// `op`'s error when it did not.
    fn with_restored_dir<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, SdError>,
    ) -> Result<T, SdError> {
        let start = self.get_cwd()?;
        let result = op(self);
        match self.chdir(&start) {
            Ok(()) => result,
            Err(restore_err) => {
                warn!(
                    "Failed to restore SD directory {}: {}",
                    start, restore_err
                );
                Err(SdError::DirectoryRestore {
                    directory: start,
                    source: Box::new(restore_err),
                    primary: result.err().map(Box::new),
                })
            }
        }
    }

    /// Send a path through the path-write registers: length first, then
    /// exactly that many bytes.
    fn write_path(&mut self, path: &str) -> Result<(), SdError> {
        let encoded = path::encode(path)?;
        self.channel
            .write_named(&self.registers.path_write_len, encoded.len() as f64)?;
        self.channel
            .write_named_array(&self.registers.path_write, &encoded)?;
        Ok(())
    }

    /// Enumerate the current directory until the device signals its end.
    fn enumerate_current(&mut self) -> Result<Vec<RawEntry>, SdError> {
        let end_code = Some(self.registers.end_of_directory_code);
        let mut entries = Vec::new();

        match self.channel.write_named(&self.registers.dir_first, 1.0) {
            Err(e) if e.code() == end_code => return Ok(entries),
            other => other?,
        }

        loop {
            let len = register_to_u64(self.channel.read_named(&self.registers.path_read_len)?);
            let raw = self
                .channel
                .read_named_array(&self.registers.path_read, len as usize)?;
            let attributes = register_to_u32(self.channel.read_named(&self.registers.attributes)?);
            let size = register_to_u64(self.channel.read_named(&self.registers.size_bytes)?);
            entries.push(RawEntry {
                name: path::decode(&raw),
                size,
                attributes,
            });

            match self.channel.write_named(&self.registers.dir_next, 1.0) {
                Ok(()) => {}
                Err(e) if e.code() == end_code => break,
                Err(e) => return Err(e.into()),
            }
        }

        debug!("Enumerated {} SD directory entries", entries.len());
        Ok(entries)
    }

    /// Open `name` (relative to the current directory), read `size` bytes
    /// and close it again.
    fn read_through_slot(&mut self, name: &str, size: usize) -> Result<Vec<u8>, SdError> {
        let target = path::sanitize(name)?;
        self.write_path(&target)?;
        self.open_slot(&target)?;

        let read = self.channel.read_named_array(&self.registers.read, size);
        let closed = self.close_slot();

        let data = read?;
        closed?;
        if data.len() != size {
            return Err(SdError::Device(ChannelError::Transport(format!(
                "short read of {target}: expected {size} bytes, got {}",
                data.len()
            ))));
        }
        debug!("Read {} bytes from {}", size, target);
        Ok(data)
    }

    fn open_slot(&mut self, name: &str) -> Result<(), SdError> {
        if let FileSlot::Opened { name: stale } = &self.slot {
            debug!("File slot still holds {}, closing it first", stale);
        }
        if self.slot != FileSlot::Closed {
            self.close_slot()?;
        }
        self.channel.write_named(&self.registers.open, 1.0)?;
        self.slot = FileSlot::Opened {
            name: name.to_string(),
        };
        Ok(())
    }

    fn close_slot(&mut self) -> Result<(), SdError> {
        if self.slot == FileSlot::Closed {
            return Err(SdError::FileSlot(
                "close requested with no open file".to_string(),
            ));
        }
        self.channel.write_named(&self.registers.close, 1.0)?;
        self.slot = FileSlot::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::entry::EntryKind;
    use crate::sim::{RegisterCall, SimulatedCard};

    fn card() -> SimulatedCard {
        SimulatedCard::new()
            .with_file("/logs/2024-01/data.csv", b"t,v\n0,1.5\n")
            .with_file("/logs/notes.txt", b"hello")
            .with_file("/readme.txt", b"root file")
            .with_dir("/empty")
    }

    fn client() -> RemoteFilesystem<SimulatedCard> {
        RemoteFilesystem::new(card())
    }

    #[test]
    fn get_cwd_starts_at_root() {
        let mut fs = client();
        assert_eq!(fs.get_cwd().unwrap(), "/");
    }

    #[test]
    fn chdir_then_get_cwd_returns_normalized_path() {
        let mut fs = client();
        fs.chdir("//logs\\2024-01/").unwrap();
        assert_eq!(fs.get_cwd().unwrap(), "/logs/2024-01");

        fs.chdir("").unwrap();
        assert_eq!(fs.get_cwd().unwrap(), "/");
    }

    #[test]
    fn chdir_relative_path() {
        let mut fs = client();
        fs.chdir("/logs").unwrap();
        fs.chdir("2024-01").unwrap();
        assert_eq!(fs.get_cwd().unwrap(), "/logs/2024-01");
    }

    #[test]
    fn chdir_missing_directory_is_device_error() {
        let mut fs = client();
        let err = fs.chdir("/nope").unwrap_err();
        assert!(matches!(err, SdError::Device(ChannelError::Device { .. })));
        assert_eq!(fs.get_cwd().unwrap(), "/");
    }

    #[test]
    fn chdir_writes_length_before_payload() {
        let mut fs = client();
        fs.channel_mut().clear_calls();
        fs.chdir("/logs").unwrap();
        assert_eq!(
            fs.channel().calls(),
            &[
                RegisterCall::Write("FILE_IO_PATH_WRITE_LEN_BYTES".into(), 6.0),
                RegisterCall::WriteArray("FILE_IO_PATH_WRITE".into(), b"/logs\0".to_vec()),
                RegisterCall::Write("FILE_IO_DIR_CHANGE".into(), 1.0),
            ]
        );
    }

    #[test]
    fn list_dir_returns_entries_and_restores_cwd() {
        let mut fs = client();
        fs.chdir("/empty").unwrap();

        let entries = fs.list_dir(Some("/logs")).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["2024-01", "notes.txt"]);
        assert!(entries[0].is_dir());
        assert!(entries[1].is_file());
        assert_eq!(entries[1].size, 5);

        assert_eq!(fs.get_cwd().unwrap(), "/empty");
    }

    #[test]
    fn list_dir_without_path_lists_cwd() {
        let mut fs = client();
        fs.chdir("/logs/2024-01").unwrap();
        let entries = fs.list_dir(None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "data.csv");
        assert_eq!(fs.get_cwd().unwrap(), "/logs/2024-01");
    }

    #[test]
    fn list_dir_empty_directory() {
        let mut fs = client();
        assert!(fs.list_dir(Some("/empty")).unwrap().is_empty());
    }

    #[test]
    fn list_dir_missing_directory_restores_cwd() {
        let mut fs = client();
        fs.chdir("/logs").unwrap();
        assert!(fs.list_dir(Some("/missing")).is_err());
        assert_eq!(fs.get_cwd().unwrap(), "/logs");
    }

    #[test]
    fn list_dir_failure_mid_enumeration_restores_cwd() {
        let mut fs = RemoteFilesystem::new(
            card().fail_after("FILE_IO_SIZE_BYTES", 1, ChannelError::Disconnected),
        );
        let err = fs.list_dir(Some("/logs")).unwrap_err();
        assert!(matches!(err, SdError::Device(ChannelError::Disconnected)));
        assert_eq!(fs.channel().cwd(), "/");
    }

    #[test]
    fn list_dir_reports_unknown_entries() {
        let mut fs = RemoteFilesystem::new(card().with_entry("/VOLUME", 0x08));
        let entries = fs.list_dir(Some("/")).unwrap();
        let label = entries.iter().find(|e| e.name == "VOLUME").unwrap();
        assert_eq!(label.kind, EntryKind::Unknown);
    }

    #[test]
    fn list_dir_surfaces_conflicting_attributes() {
        let mut fs = RemoteFilesystem::new(card().with_entry("/logs/bad", 0x30));
        let err = fs.list_dir(Some("/logs")).unwrap_err();
        assert!(matches!(err, SdError::ConflictingAttributes { .. }));
        assert_eq!(fs.get_cwd().unwrap(), "/");
    }

    #[test]
    fn restore_failure_after_success_is_reported() {
        // First DIR_CHANGE navigates to /logs, the second (restore) fails.
        let mut fs = RemoteFilesystem::new(card().fail_after(
            "FILE_IO_DIR_CHANGE",
            1,
            ChannelError::Transport("link lost".into()),
        ));
        let err = fs.list_dir(Some("/logs")).unwrap_err();
        match err {
            SdError::DirectoryRestore {
                directory,
                source,
                primary,
            } => {
                assert_eq!(directory, "/");
                assert!(matches!(*source, SdError::Device(ChannelError::Transport(_))));
                assert!(primary.is_none());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn restore_failure_keeps_primary_error() {
        let mut fs = RemoteFilesystem::new(card().fail_after(
            "FILE_IO_DIR_CHANGE",
            0,
            ChannelError::Disconnected,
        ));
        let err = fs.list_dir(Some("/logs")).unwrap_err();
        match err {
            SdError::DirectoryRestore {
                primary: Some(primary),
                ..
            } => assert!(matches!(*primary, SdError::Device(ChannelError::Disconnected))),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn read_file_bytes_is_length_exact() {
        let mut fs = client();
        assert_eq!(
            fs.read_file_bytes("/logs/2024-01/data.csv").unwrap(),
            b"t,v\n0,1.5\n"
        );
        assert_eq!(fs.read_file_bytes("/readme.txt").unwrap(), b"root file");
        assert_eq!(fs.get_cwd().unwrap(), "/");
        assert_eq!(fs.file_slot(), &FileSlot::Closed);
    }

    #[test]
    fn read_file_bytes_relative_to_cwd() {
        let mut fs = client();
        fs.chdir("/logs").unwrap();
        assert_eq!(fs.read_file_bytes("notes.txt").unwrap(), b"hello");
        assert_eq!(fs.read_file_bytes("2024-01/data.csv").unwrap().len(), 10);
        assert_eq!(fs.get_cwd().unwrap(), "/logs");
    }

    #[test]
    fn read_file_bytes_empty_file() {
        let mut fs = RemoteFilesystem::new(card().with_file("/zero.bin", b""));
        assert!(fs.read_file_bytes("/zero.bin").unwrap().is_empty());
    }

    #[test]
    fn read_file_bytes_protocol_order() {
        let mut fs = client();
        fs.channel_mut().clear_calls();
        fs.read_file_bytes("/readme.txt").unwrap();

        let calls = fs.channel().calls();
        let open = calls
            .iter()
            .position(|c| *c == RegisterCall::Write("FILE_IO_OPEN".into(), 1.0))
            .unwrap();
        assert_eq!(
            calls[open - 2],
            RegisterCall::Write("FILE_IO_PATH_WRITE_LEN_BYTES".into(), 11.0)
        );
        assert_eq!(
            calls[open - 1],
            RegisterCall::WriteArray("FILE_IO_PATH_WRITE".into(), b"readme.txt\0".to_vec())
        );
        assert_eq!(calls[open + 1], RegisterCall::ReadArray("FILE_IO_READ".into(), 9));
        assert_eq!(calls[open + 2], RegisterCall::Write("FILE_IO_CLOSE".into(), 1.0));
    }

    #[test]
    fn read_file_bytes_missing_file() {
        let mut fs = client();
        fs.chdir("/empty").unwrap();
        let err = fs.read_file_bytes("/logs/missing.csv").unwrap_err();
        match err {
            SdError::FileNotFound(p) => assert_eq!(p, "/logs/missing.csv"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(fs.get_cwd().unwrap(), "/empty");
    }

    #[test]
    fn read_file_bytes_rejects_paths_without_filename() {
        let mut fs = client();
        assert!(matches!(
            fs.read_file_bytes("/logs/"),
            Err(SdError::InvalidPath(_))
        ));
        assert!(matches!(fs.read_file_bytes(""), Err(SdError::InvalidPath(_))));
    }

    #[test]
    fn read_file_bytes_rejects_directories() {
        let mut fs = client();
        assert!(matches!(
            fs.read_file_bytes("/logs/2024-01"),
            Err(SdError::InvalidPath(_))
        ));
    }

    #[test]
    fn failed_read_still_closes_slot() {
        let mut fs = RemoteFilesystem::new(card().fail_after(
            "FILE_IO_READ",
            0,
            ChannelError::Transport("crc".into()),
        ));
        let err = fs.read_file_bytes("/readme.txt").unwrap_err();
        assert!(matches!(err, SdError::Device(ChannelError::Transport(_))));
        assert_eq!(fs.file_slot(), &FileSlot::Closed);
        assert!(!fs.channel().is_file_open());
        assert_eq!(fs.get_cwd().unwrap(), "/");
    }

    #[test]
    fn read_file_text_decodes() {
        let mut fs = RemoteFilesystem::new(card().with_file("/bad.txt", b"ok\xff"));
        assert_eq!(
            fs.read_file_text("/logs/notes.txt", TextEncoding::Utf8, DecodeErrors::Replace)
                .unwrap(),
            "hello"
        );
        assert_eq!(
            fs.read_file_text("/bad.txt", TextEncoding::default(), DecodeErrors::default())
                .unwrap(),
            "ok\u{fffd}"
        );
        assert!(matches!(
            fs.read_file_text("/bad.txt", TextEncoding::Utf8, DecodeErrors::Strict),
            Err(SdError::Decode(_))
        ));
    }

    #[test]
    fn delete_file_removes_it() {
        let mut fs = client();
        fs.delete_file("/logs/notes.txt").unwrap();
        assert!(!fs.channel().exists("/logs/notes.txt"));
        let names: Vec<_> = fs
            .list_dir(Some("/logs"))
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["2024-01"]);
    }

    #[test]
    fn delete_missing_file_propagates_device_error() {
        let mut fs = client();
        assert!(matches!(
            fs.delete_file("/logs/ghost.csv"),
            Err(SdError::Device(ChannelError::Device { .. }))
        ));
    }

    #[test]
    fn disk_info_from_geometry_registers() {
        let mut fs = RemoteFilesystem::new(card().with_geometry(512, 8, 1_000_000, 250_000));
        let info = fs.get_disk_info().unwrap();
        assert_eq!(info.total_bytes(), 4_096_000_000);
        assert_eq!(info.free_bytes(), 1_024_000_000);
    }

    #[test]
    fn custom_register_names_are_used() {
        let registers = RegisterMap {
            dir_change: "CD".into(),
            ..RegisterMap::default()
        };
        let sim = SimulatedCard::with_registers(registers.clone()).with_dir("/logs");
        let mut fs = RemoteFilesystem::with_registers(sim, registers);
        fs.chdir("/logs").unwrap();
        assert!(fs
            .channel()
            .calls()
            .contains(&RegisterCall::Write("CD".into(), 1.0)));
        assert_eq!(fs.get_cwd().unwrap(), "/logs");
    }

    #[test]
    fn close_without_open_file_is_slot_error() {
        let mut fs = RemoteFilesystem::new(card());
        let err = fs.close_slot().unwrap_err();
        assert!(matches!(err, SdError::FileSlot(_)));
        assert_eq!(
            err.to_string(),
            "File slot error: close requested with no open file"
        );
        assert!(fs.channel().calls().is_empty());
        assert_eq!(fs.file_slot(), &FileSlot::Closed);
    }
}
