//! In-memory SD card that speaks the file-I/O register protocol.
//!
//! [`SimulatedCard`] implements [`RegisterChannel`] on top of a small
//! directory tree, so the client can be exercised without hardware: dry runs
//! in front ends, and the unit and integration tests of this crate. It keeps
//! the same shared state as the device (one current directory, one path
//! buffer, one directory cursor, one open-file slot), records every register
//! access, and can be told to fail a register after a number of successful
//! accesses.

use std::collections::{BTreeMap, HashMap};

use crate::channel::{register_to_u64, RegisterChannel};
use crate::config::RegisterMap;
use crate::errors::ChannelError;
use crate::files::entry::{ATTR_DIRECTORY, ATTR_FILE};
use crate::files::path;

/// Error code for a path that does not resolve to the expected node.
pub const ERR_NOT_FOUND: i32 = 2966;
/// Error code for a path payload whose length disagrees with the length register.
pub const ERR_PATH_LENGTH: i32 = 2962;
/// Error code for file reads with no open file, or a second open.
pub const ERR_FILE_SLOT: i32 = 2964;

/// Zero bytes appended after the terminator of every name buffer.
const NAME_PADDING: usize = 3;

/// One recorded register access.
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterCall {
    Read(String),
    Write(String, f64),
    ReadArray(String, usize),
    WriteArray(String, Vec<u8>),
}

#[derive(Debug, Clone)]
struct Node {
    attributes: u32,
    data: Vec<u8>,
}

struct Fault {
    remaining: usize,
    error: ChannelError,
}

struct OpenFile {
    data: Vec<u8>,
    pos: usize,
}

#[derive(Debug, Clone, Copy)]
enum Reg {
    DirChange,
    DirCurrent,
    DirFirst,
    DirNext,
    PathReadLen,
    PathRead,
    Attributes,
    SizeBytes,
    Delete,
    PathWriteLen,
    PathWrite,
    Open,
    Read,
    Close,
    Geometry(usize),
}

/// Simulated device storage addressed through named registers.
pub struct SimulatedCard {
    registers: RegisterMap,
    nodes: BTreeMap<String, Node>,
    cwd: String,
    path_len: Option<usize>,
    path_buf: Option<String>,
    read_buf: Vec<u8>,
    listing: Vec<(String, u64, u32)>,
    cursor: usize,
    open_file: Option<OpenFile>,
    geometry: [f64; 4],
    faults: HashMap<String, Fault>,
    calls: Vec<RegisterCall>,
}

impl Default for SimulatedCard {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCard {
    /// An empty card using the default register names.
    pub fn new() -> Self {
        Self::with_registers(RegisterMap::default())
    }

    pub fn with_registers(registers: RegisterMap) -> Self {
        Self {
            registers,
            nodes: BTreeMap::new(),
            cwd: path::ROOT.to_string(),
            path_len: None,
            path_buf: None,
            read_buf: Vec::new(),
            listing: Vec::new(),
            cursor: 0,
            open_file: None,
            geometry: [512.0, 64.0, 242_000.0, 240_000.0],
            faults: HashMap::new(),
            calls: Vec::new(),
        }
    }

    /// Add a directory (and any missing parents).
    pub fn with_dir(mut self, dir: &str) -> Self {
        self.add_dir(dir);
        self
    }

    /// Add a file (and any missing parent directories).
    pub fn with_file(mut self, file: &str, data: &[u8]) -> Self {
        self.add_file(file, data);
        self
    }

    /// Add an entry with arbitrary attribute bits and no content.
    pub fn with_entry(mut self, entry: &str, attributes: u32) -> Self {
        let key = normalize(entry);
        self.add_parents(&key);
        self.nodes.insert(
            key,
            Node {
                attributes,
                data: Vec::new(),
            },
        );
        self
    }

    pub fn with_geometry(
        mut self,
        sector_size: u32,
        sectors_per_cluster: u32,
        total_clusters: u32,
        free_clusters: u32,
    ) -> Self {
        self.geometry = [
            f64::from(sector_size),
            f64::from(sectors_per_cluster),
            f64::from(total_clusters),
            f64::from(free_clusters),
        ];
        self
    }

    /// Let `register` succeed `successes` times, then fail with `error` on
    /// every further access.
    pub fn fail_after(mut self, register: &str, successes: usize, error: ChannelError) -> Self {
        self.faults.insert(
            register.to_string(),
            Fault {
                remaining: successes,
                error,
            },
        );
        self
    }

    pub fn add_dir(&mut self, dir: &str) {
        let key = normalize(dir);
        self.add_parents(&key);
        if key != path::ROOT {
            self.nodes.insert(
                key,
                Node {
                    attributes: ATTR_DIRECTORY,
                    data: Vec::new(),
                },
            );
        }
    }

    pub fn add_file(&mut self, file: &str, data: &[u8]) {
        let key = normalize(file);
        self.add_parents(&key);
        self.nodes.insert(
            key,
            Node {
                attributes: ATTR_FILE,
                data: data.to_vec(),
            },
        );
    }

    /// Current directory as the device sees it.
    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn exists(&self, entry: &str) -> bool {
        self.nodes.contains_key(&normalize(entry))
    }

    /// Content of a file, if present.
    pub fn file(&self, file: &str) -> Option<&[u8]> {
        self.nodes
            .get(&normalize(file))
            .filter(|n| n.attributes & ATTR_FILE != 0)
            .map(|n| n.data.as_slice())
    }

    pub fn is_file_open(&self) -> bool {
        self.open_file.is_some()
    }

    /// Every register access since creation or the last [`clear_calls`](Self::clear_calls).
    pub fn calls(&self) -> &[RegisterCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    // ── internals ────────────────────────────────────────────────────

    fn add_parents(&mut self, key: &str) {
        let mut parent = parent_of(key);
        while parent != path::ROOT {
            self.nodes.entry(parent.clone()).or_insert(Node {
                attributes: ATTR_DIRECTORY,
                data: Vec::new(),
            });
            parent = parent_of(&parent);
        }
    }

    fn classify(&self, name: &str) -> Option<Reg> {
        let r = &self.registers;
        let table = [
            (&r.dir_change, Reg::DirChange),
            (&r.dir_current, Reg::DirCurrent),
            (&r.dir_first, Reg::DirFirst),
            (&r.dir_next, Reg::DirNext),
            (&r.path_read_len, Reg::PathReadLen),
            (&r.path_read, Reg::PathRead),
            (&r.attributes, Reg::Attributes),
            (&r.size_bytes, Reg::SizeBytes),
            (&r.delete, Reg::Delete),
            (&r.path_write_len, Reg::PathWriteLen),
            (&r.path_write, Reg::PathWrite),
            (&r.open, Reg::Open),
            (&r.read, Reg::Read),
            (&r.close, Reg::Close),
            (&r.disk_sector_size, Reg::Geometry(0)),
            (&r.disk_sectors_per_cluster, Reg::Geometry(1)),
            (&r.disk_total_clusters, Reg::Geometry(2)),
            (&r.disk_free_clusters, Reg::Geometry(3)),
        ];
        table
            .into_iter()
            .find(|(reg_name, _)| reg_name.as_str() == name)
            .map(|(_, reg)| reg)
    }

    /// Record the access, apply any injected fault and resolve the register.
    fn access(&mut self, name: &str, call: RegisterCall) -> Result<Reg, ChannelError> {
        self.calls.push(call);
        if let Some(fault) = self.faults.get_mut(name) {
            if fault.remaining == 0 {
                return Err(fault.error.clone());
            }
            fault.remaining -= 1;
        }
        self.classify(name)
            .ok_or_else(|| ChannelError::Transport(format!("unknown register {name}")))
    }

    fn resolve(&self, target: &str) -> String {
        if target.starts_with('/') {
            normalize(target)
        } else {
            normalize(&path::join(&self.cwd, target))
        }
    }

    fn pending_path(&self) -> Result<String, ChannelError> {
        self.path_buf
            .as_deref()
            .map(|p| self.resolve(p))
            .ok_or_else(|| device_error(ERR_NOT_FOUND, "no path written"))
    }

    fn is_dir(&self, key: &str) -> bool {
        key == path::ROOT
            || self
                .nodes
                .get(key)
                .is_some_and(|n| n.attributes & ATTR_DIRECTORY != 0)
    }

    fn load_name(&mut self, name: &str) {
        let mut buf = name.as_bytes().to_vec();
        buf.push(0);
        buf.extend(std::iter::repeat(0).take(NAME_PADDING));
        self.read_buf = buf;
    }

    fn end_of_directory(&self) -> ChannelError {
        device_error(self.registers.end_of_directory_code, "end of directory")
    }

    fn load_listing_entry(&mut self) -> Result<(), ChannelError> {
        match self.listing.get(self.cursor) {
            Some((name, _, _)) => {
                let name = name.clone();
                self.load_name(&name);
                Ok(())
            }
            None => Err(self.end_of_directory()),
        }
    }

    fn current_listing_entry(&self) -> Result<&(String, u64, u32), ChannelError> {
        self.listing
            .get(self.cursor)
            .ok_or_else(|| device_error(ERR_NOT_FOUND, "no directory entry selected"))
    }
}

impl RegisterChannel for SimulatedCard {
    fn read_named(&mut self, name: &str) -> Result<f64, ChannelError> {
        match self.access(name, RegisterCall::Read(name.to_string()))? {
            Reg::PathReadLen => Ok(self.read_buf.len() as f64),
            Reg::Attributes => Ok(f64::from(self.current_listing_entry()?.2)),
            Reg::SizeBytes => Ok(self.current_listing_entry()?.1 as f64),
            Reg::Geometry(i) => Ok(self.geometry[i]),
            _ => Err(ChannelError::Transport(format!("{name} is not readable"))),
        }
    }

    fn write_named(&mut self, name: &str, value: f64) -> Result<(), ChannelError> {
        match self.access(name, RegisterCall::Write(name.to_string(), value))? {
            Reg::PathWriteLen => {
                self.path_len = Some(register_to_u64(value) as usize);
                Ok(())
            }
            Reg::DirCurrent => {
                let cwd = self.cwd.clone();
                self.load_name(&cwd);
                Ok(())
            }
            Reg::DirChange => {
                let target = self.pending_path()?;
                if !self.is_dir(&target) {
                    return Err(device_error(ERR_NOT_FOUND, "directory not found"));
                }
                self.cwd = target;
                Ok(())
            }
            Reg::DirFirst => {
                let dir = self.cwd.clone();
                self.listing = self
                    .nodes
                    .iter()
                    .filter(|(key, _)| parent_of(key) == dir)
                    .map(|(key, node)| {
                        (
                            path::base_name(key).to_string(),
                            node.data.len() as u64,
                            node.attributes,
                        )
                    })
                    .collect();
                self.cursor = 0;
                self.load_listing_entry()
            }
            Reg::DirNext => {
                self.cursor += 1;
                self.load_listing_entry()
            }
            Reg::Open => {
                if self.open_file.is_some() {
                    return Err(device_error(ERR_FILE_SLOT, "a file is already open"));
                }
                let target = self.pending_path()?;
                let data = self
                    .nodes
                    .get(&target)
                    .filter(|n| n.attributes & ATTR_FILE != 0)
                    .map(|n| n.data.clone())
                    .ok_or_else(|| device_error(ERR_NOT_FOUND, "file not found"))?;
                self.open_file = Some(OpenFile { data, pos: 0 });
                Ok(())
            }
            Reg::Close => {
                self.open_file = None;
                Ok(())
            }
            Reg::Delete => {
                let target = self.pending_path()?;
                let is_file = self
                    .nodes
                    .get(&target)
                    .is_some_and(|n| n.attributes & ATTR_DIRECTORY == 0);
                if !is_file {
                    return Err(device_error(ERR_NOT_FOUND, "file not found"));
                }
                self.nodes.remove(&target);
                Ok(())
            }
            _ => Err(ChannelError::Transport(format!("{name} is not writable"))),
        }
    }

    fn read_named_array(&mut self, name: &str, len: usize) -> Result<Vec<u8>, ChannelError> {
        match self.access(name, RegisterCall::ReadArray(name.to_string(), len))? {
            Reg::PathRead => {
                let mut out = self.read_buf.clone();
                out.resize(len, 0);
                Ok(out)
            }
            Reg::Read => {
                let file = self
                    .open_file
                    .as_mut()
                    .ok_or_else(|| device_error(ERR_FILE_SLOT, "no file open"))?;
                let end = (file.pos + len).min(file.data.len());
                let out = file.data[file.pos..end].to_vec();
                file.pos = end;
                Ok(out)
            }
            _ => Err(ChannelError::Transport(format!(
                "{name} is not a readable byte array"
            ))),
        }
    }

    fn write_named_array(&mut self, name: &str, data: &[u8]) -> Result<(), ChannelError> {
        match self.access(name, RegisterCall::WriteArray(name.to_string(), data.to_vec()))? {
            Reg::PathWrite => {
                if self.path_len != Some(data.len()) {
                    return Err(device_error(
                        ERR_PATH_LENGTH,
                        "path length does not match length register",
                    ));
                }
                self.path_buf = Some(path::decode(data));
                Ok(())
            }
            _ => Err(ChannelError::Transport(format!(
                "{name} is not a writable byte array"
            ))),
        }
    }
}

fn device_error(code: i32, message: &str) -> ChannelError {
    ChannelError::Device {
        code,
        message: message.to_string(),
    }
}

/// Absolute, `.`/`..`-resolved form of a path.
fn normalize(raw: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in raw.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

fn parent_of(key: &str) -> String {
    match key.rsplit_once('/') {
        Some(("", _)) | None => path::ROOT.to_string(),
        Some((parent, _)) => parent.to_string(),
    }
}
