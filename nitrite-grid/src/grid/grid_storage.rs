//! Node storage for the grid index.
//!
//! A [`NodeStore`] keeps grid nodes by [`NodeKey`]. Two stores are provided:
//! - [`MemoryNodeStore`]: a plain in-memory arena.
//! - [`FileNodeStore`]: an append-only node file. Every `put` appends a
//!   checksummed record; an offset index rebuilt on open points at the latest
//!   record of each node. [`FileNodeStore::compact`] drops superseded records.

use std::any::type_name;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::bounding_box::BoundingBox;
use crate::grid::grid_constants::{MAGIC, RECORD_HEADER_LEN, VERSION};
use crate::grid::grid_types::{GridError, GridNode, GridResult, NodeKey, Payload};

/// Durable key-value backend for grid nodes.
///
/// Stores are not synchronized; the grid drives them from a single writer.
pub trait NodeStore<P: Payload> {
    /// Reads the node stored under `key`.
    fn get(&self, key: &NodeKey) -> GridResult<Option<GridNode<P>>>;

    /// Stores `node` under its own key, replacing any previous version.
    fn put(&mut self, node: GridNode<P>) -> GridResult<()>;

    /// Removes every node.
    fn clear(&mut self) -> GridResult<()>;

    /// Resolves `key` to the canonical key the store uses for that node.
    ///
    /// Keys are derived from node content, so the default is the key itself.
    fn find_unique_instance(&self, key: &NodeKey) -> NodeKey {
        *key
    }

    /// Region of the stored root node, if there is one.
    fn bounds(&self) -> Option<BoundingBox>;

    /// Names of the payload types this store was created for.
    fn payload_types(&self) -> Vec<String>;

    /// Makes previous writes durable.
    fn flush(&mut self) -> GridResult<()> {
        Ok(())
    }
}

// ============================================================================
// Memory Store
// ============================================================================

/// In-memory node arena.
#[derive(Debug, Clone)]
pub struct MemoryNodeStore<P> {
    nodes: HashMap<NodeKey, GridNode<P>>,
    bounds: Option<BoundingBox>,
}

impl<P> MemoryNodeStore<P> {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            bounds: None,
        }
    }

    /// Number of stored nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<P> Default for MemoryNodeStore<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Payload> NodeStore<P> for MemoryNodeStore<P> {
    fn get(&self, key: &NodeKey) -> GridResult<Option<GridNode<P>>> {
        Ok(self.nodes.get(key).cloned())
    }

    fn put(&mut self, node: GridNode<P>) -> GridResult<()> {
        if node.is_root() {
            self.bounds = Some(*node.region());
        }
        self.nodes.insert(node.key(), node);
        Ok(())
    }

    fn clear(&mut self) -> GridResult<()> {
        self.nodes.clear();
        self.bounds = None;
        Ok(())
    }

    fn bounds(&self) -> Option<BoundingBox> {
        self.bounds
    }

    fn payload_types(&self) -> Vec<String> {
        vec![type_name::<P>().to_string()]
    }
}

// ============================================================================
// File Store
// ============================================================================

/// Header written at the start of every node file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u32,
    pub payload_type: String,
}

impl FileHeader {
    pub fn new(payload_type: &str) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            payload_type: payload_type.to_string(),
        }
    }

    pub fn validate(&self) -> GridResult<()> {
        if self.magic != MAGIC {
            return Err(GridError::Corrupted("Invalid file format (bad magic)".into()));
        }
        if self.version != VERSION {
            return Err(GridError::Corrupted(format!(
                "Unsupported file format version {}",
                self.version
            )));
        }
        Ok(())
    }
}

/// Append-only node file.
///
/// Layout: a length-prefixed header, then records of
/// `[len: u32 LE][crc32 of len: u32 LE][crc32 of body: u32 LE][bincode GridNode]`.
/// Only the latest record of each key is live. Reads are positioned, so
/// `get` only takes the read lock.
pub struct FileNodeStore<P> {
    file: RwLock<File>,
    path: PathBuf,
    header: FileHeader,
    index: HashMap<NodeKey, u64>,
    bounds: Option<BoundingBox>,
    end: u64,
    _payload: PhantomData<fn() -> P>,
}

impl<P: Payload> FileNodeStore<P> {
    /// Creates an empty node file, truncating any existing one.
    pub fn create(path: impl AsRef<Path>) -> GridResult<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let header = FileHeader::new(type_name::<P>());
        let end = write_header(&mut file, &header)?;
        file.sync_all()?;
        log::debug!("Created grid node file at {:?}", path);

        Ok(Self {
            file: RwLock::new(file),
            path: path.to_path_buf(),
            header,
            index: HashMap::new(),
            bounds: None,
            end,
            _payload: PhantomData,
        })
    }

    /// Opens an existing node file and rebuilds its offset index.
    pub fn open(path: impl AsRef<Path>) -> GridResult<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let (header, header_end) = read_header(&mut file)?;
        header.validate()?;
        if header.payload_type != type_name::<P>() {
            return Err(GridError::PayloadMismatch {
                expected: type_name::<P>().to_string(),
                found: header.payload_type,
            });
        }

        let mut store = Self {
            file: RwLock::new(file),
            path: path.to_path_buf(),
            header,
            index: HashMap::new(),
            bounds: None,
            end: header_end,
            _payload: PhantomData,
        };
        store.replay()?;
        log::debug!(
            "Opened grid node file at {:?} with {} nodes",
            path,
            store.index.len()
        );
        Ok(store)
    }

    /// Opens the node file at `path`, creating it when missing.
    pub fn open_or_create(path: impl AsRef<Path>) -> GridResult<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Current size of the file in bytes.
    pub fn file_size(&self) -> u64 {
        self.end
    }

    /// Rewrites the file with only the live record of each node.
    ///
    /// Returns the number of bytes reclaimed.
    pub fn compact(&mut self) -> GridResult<u64> {
        let before = self.end;
        let temp_path = self.path.with_extension("compact");

        let mut keys: Vec<NodeKey> = self.index.keys().copied().collect();
        keys.sort();

        {
            let mut temp = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)?;
            write_header(&mut temp, &self.header)?;

            let file = self.file.read();
            for key in &keys {
                let offset = self.index[key];
                let bytes = live_record(&file, offset, self.end)?;
                write_record(&mut temp, &bytes)?;
            }
            temp.sync_all()?;
        }

        fs::rename(&temp_path, &self.path)?;
        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let (_, header_end) = read_header(&mut file)?;
        *self.file.write() = file;
        self.index.clear();
        self.bounds = None;
        self.end = header_end;
        self.replay()?;

        let reclaimed = before.saturating_sub(self.end);
        log::info!(
            "Compacted grid node file {:?}: {} live nodes, {} bytes reclaimed",
            self.path,
            self.index.len(),
            reclaimed
        );
        Ok(reclaimed)
    }

    /// Scans records from the current end, indexing the latest offset per key.
    ///
    /// Only a last record cut short by the end of the file is dropped. A bad
    /// record anywhere else fails the open and leaves the file untouched.
    fn replay(&mut self) -> GridResult<()> {
        let file = self.file.write();
        let file_len = file.metadata()?.len();
        let mut offset = self.end;
        while offset < file_len {
            match read_record(&file, offset, file_len)? {
                Some(bytes) => {
                    let node = decode_node::<P>(&bytes)?;
                    let key = node.key();
                    if node.is_root() {
                        self.bounds = Some(*node.region());
                    }
                    self.index.insert(key, offset);
                    offset += (RECORD_HEADER_LEN + bytes.len()) as u64;
                }
                None => {
                    log::warn!(
                        "Discarding {} bytes of truncated record at offset {} in {:?}",
                        file_len - offset,
                        offset,
                        self.path
                    );
                    file.set_len(offset)?;
                    break;
                }
            }
        }
        self.end = offset;
        Ok(())
    }
}

impl<P: Payload> NodeStore<P> for FileNodeStore<P> {
    fn get(&self, key: &NodeKey) -> GridResult<Option<GridNode<P>>> {
        let offset = match self.index.get(key) {
            Some(offset) => *offset,
            None => return Ok(None),
        };
        let bytes = live_record(&self.file.read(), offset, self.end)?;
        decode_node(&bytes).map(Some)
    }

    fn put(&mut self, node: GridNode<P>) -> GridResult<()> {
        let bytes = bincode::serde::encode_to_vec(&node, bincode::config::legacy())
            .map_err(|e| GridError::Serialization(e.to_string()))?;

        let offset = self.end;
        {
            let mut file = self.file.write();
            file.seek(SeekFrom::Start(offset))?;
            write_record(&mut file, &bytes)?;
        }
        self.end += (RECORD_HEADER_LEN + bytes.len()) as u64;

        if node.is_root() {
            self.bounds = Some(*node.region());
        }
        self.index.insert(node.key(), offset);
        Ok(())
    }

    fn clear(&mut self) -> GridResult<()> {
        let mut file = self.file.write();
        file.set_len(0)?;
        self.end = write_header(&mut file, &self.header)?;
        file.sync_all()?;
        self.index.clear();
        self.bounds = None;
        Ok(())
    }

    fn bounds(&self) -> Option<BoundingBox> {
        self.bounds
    }

    fn payload_types(&self) -> Vec<String> {
        vec![self.header.payload_type.clone()]
    }

    fn flush(&mut self) -> GridResult<()> {
        self.file.write().sync_all()?;
        Ok(())
    }
}

// ============================================================================
// Record Encoding
// ============================================================================

fn write_header(file: &mut File, header: &FileHeader) -> GridResult<u64> {
    let bytes = bincode::serde::encode_to_vec(header, bincode::config::legacy())
        .map_err(|e| GridError::Serialization(e.to_string()))?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&(bytes.len() as u32).to_le_bytes())?;
    file.write_all(&bytes)?;
    Ok((4 + bytes.len()) as u64)
}

fn read_header(file: &mut File) -> GridResult<(FileHeader, u64)> {
    file.seek(SeekFrom::Start(0))?;
    let mut len_buf = [0u8; 4];
    file.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut buffer = vec![0u8; len];
    file.read_exact(&mut buffer)?;
    let (header, _) = bincode::serde::decode_from_slice(&buffer, bincode::config::legacy())
        .map_err(|e| GridError::Corrupted(format!("unreadable file header: {}", e)))?;
    Ok((header, (4 + len) as u64))
}

fn write_record(file: &mut File, bytes: &[u8]) -> GridResult<()> {
    let len = (bytes.len() as u32).to_le_bytes();
    let mut record = Vec::with_capacity(RECORD_HEADER_LEN + bytes.len());
    record.extend_from_slice(&len);
    record.extend_from_slice(&crc32(&len).to_le_bytes());
    record.extend_from_slice(&crc32(bytes).to_le_bytes());
    record.extend_from_slice(bytes);
    file.write_all(&record)?;
    Ok(())
}

/// Reads and verifies the record at `offset`, returning its node bytes.
///
/// Returns `None` when the record runs past `file_len`, which only happens
/// for a torn final write. The length is checksummed on its own, so a damaged
/// length is reported as corruption rather than taken for a short tail.
fn read_record(file: &File, offset: u64, file_len: u64) -> GridResult<Option<Vec<u8>>> {
    let remaining = file_len.saturating_sub(offset);
    if remaining < RECORD_HEADER_LEN as u64 {
        return Ok(None);
    }

    let mut prefix = [0u8; RECORD_HEADER_LEN];
    read_exact_at(file, &mut prefix, offset)?;
    let len_bytes = [prefix[0], prefix[1], prefix[2], prefix[3]];
    let len_crc = u32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);
    let expected = u32::from_le_bytes([prefix[8], prefix[9], prefix[10], prefix[11]]);
    if crc32(&len_bytes) != len_crc {
        return Err(GridError::Corrupted(format!(
            "record length checksum mismatch at offset {}",
            offset
        )));
    }

    let len = u32::from_le_bytes(len_bytes) as u64;
    if len > remaining - RECORD_HEADER_LEN as u64 {
        return Ok(None);
    }

    let mut bytes = vec![0u8; len as usize];
    read_exact_at(file, &mut bytes, offset + RECORD_HEADER_LEN as u64)?;

    let actual = crc32(&bytes);
    if actual != expected {
        return Err(GridError::Corrupted(format!(
            "record checksum mismatch at offset {} (expected: {:x}, got: {:x})",
            offset, expected, actual
        )));
    }
    Ok(Some(bytes))
}

/// Reads an indexed record, which must lie wholly before `end`.
fn live_record(file: &File, offset: u64, end: u64) -> GridResult<Vec<u8>> {
    read_record(file, offset, end)?.ok_or_else(|| {
        GridError::Corrupted(format!("record at offset {} runs past end of file", offset))
    })
}

/// Positioned read that leaves the shared cursor alone, so readers only need
/// the read lock.
#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    std::os::unix::fs::FileExt::read_exact_at(file, buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                let rest = buf;
                buf = &mut rest[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn decode_node<P: Payload>(bytes: &[u8]) -> GridResult<GridNode<P>> {
    bincode::serde::decode_from_slice(bytes, bincode::config::legacy())
        .map(|(node, _)| node)
        .map_err(|e| GridError::Serialization(e.to_string()))
}

/// CRC32-MPEG2 of `data`.
fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFFFFFF;
    const POLY: u32 = 0x04C11DB7;

    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x80000000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
        }
    }

    crc ^ 0xFFFFFFFF
}
