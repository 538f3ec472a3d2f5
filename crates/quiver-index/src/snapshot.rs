//! Binary snapshot codec for warm-starting the index.
//!
//! A snapshot is a complete image of the graph index (interned strings, the
//! edge-type dictionary, both adjacency mirrors including closed historical
//! records, and the tombstone bits) so a restart can skip Arrow re-hydration.
//!
//! # File Format
//!
//! Little-endian throughout:
//!
//! ```text
//! [ magic:4 = "QGPH" ][ version:u16 = 1 ][ flags:u16 ]
//! [ interner_count:u32 ][ interner entries: (len:u32, bytes:len)* ]
//! [ etype_count:u32 ]   [ etype entries:    (len:u32, bytes:len)* ]
//! [ node_count:u32 ]
//! [ outgoing: node_count * (rec_count:u32,
//!                           (peer:u32, etype:u32, vf:i64, vt:i64) * rec_count) ]
//! [ incoming: same layout ]
//! [ tombstone_words:u32 ][ tombstone bits: ceil(node_count/64) u64 ]
//! [ checksum:u64 = xxhash64 of all preceding bytes ]
//! ```
//!
//! Saving is atomic: the image is written to a sibling tmp file, fsynced and
//! renamed into place; the tmp file is unlinked on every failure path.
//! Loading verifies magic, version and checksum before trusting any offset
//! and falls back to `SnapshotError::Corrupt` on any inconsistency; the
//! caller then re-hydrates from the source of truth.

use crate::interner::Interner;
use crate::topology::{Tombstones, Topology};
use crate::GraphIndex;
use quiver_core::{EdgeRecord, EtypeId, Handle};
use std::fs::File;
use std::hash::Hasher;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use thiserror::Error;
use twox_hash::XxHash64;

/// Magic bytes identifying quiver snapshot files.
const MAGIC: &[u8; 4] = b"QGPH";

/// Current snapshot format version.
const VERSION: u16 = 1;

/// Reserved; always written as zero.
const FLAGS: u16 = 0;

/// Seed for the trailing xxhash64 checksum.
const CHECKSUM_SEED: u64 = 0;

/// Errors that can occur during snapshot save/load.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file failed an integrity check.
    #[error("snapshot is corrupt: {0}")]
    Corrupt(&'static str),

    /// The file was written by an unsupported format version.
    #[error("unsupported snapshot version: {0} (current: {VERSION})")]
    Version(u16),
}

/// Result type for snapshot operations.
pub type Result<T> = std::result::Result<T, SnapshotError>;

impl GraphIndex {
    /// Saves a snapshot atomically: tmp file, fsync, rename.
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let tmp = path.with_extension("tmp");

        let result = self
            .write_snapshot(&tmp)
            .and_then(|_| std::fs::rename(&tmp, path).map_err(SnapshotError::from));
        if result.is_err() {
            let _ = std::fs::remove_file(&tmp);
        } else {
            tracing::info!(
                path = %path.display(),
                nodes = self.node_count(),
                edges = self.edge_count(),
                "saved snapshot"
            );
        }
        result
    }

    fn write_snapshot(&self, tmp: &Path) -> Result<()> {
        let file = File::create(tmp)?;
        let mut writer = HashingWriter::new(BufWriter::new(file));
        self.write_sections(&mut writer)?;

        let checksum = writer.digest();
        let mut inner = writer.into_inner();
        inner.write_all(&checksum.to_le_bytes())?;
        inner.flush()?;
        let file = inner
            .into_inner()
            .map_err(|e| SnapshotError::Io(e.into_error()))?;
        file.sync_all()?;
        Ok(())
    }

    fn write_sections(&self, w: &mut impl Write) -> Result<()> {
        w.write_all(MAGIC)?;
        w.write_all(&VERSION.to_le_bytes())?;
        w.write_all(&FLAGS.to_le_bytes())?;

        write_interner(w, &self.nodes)?;
        write_interner(w, &self.etypes)?;

        let node_count = self.topology.node_count();
        w.write_all(&len_u32(node_count)?.to_le_bytes())?;
        for h in 0..node_count {
            write_records(w, self.topology.outgoing_records(Handle::from(h)))?;
        }
        for h in 0..node_count {
            write_records(w, self.topology.incoming_records(Handle::from(h)))?;
        }

        let words = Tombstones::words_for(node_count);
        w.write_all(&len_u32(words)?.to_le_bytes())?;
        let stored = self.topology.tombstones().as_words();
        for i in 0..words {
            let word = stored.get(i).copied().unwrap_or(0);
            w.write_all(&word.to_le_bytes())?;
        }
        Ok(())
    }

    /// Loads a snapshot, verifying magic, version and checksum before
    /// trusting any offset.
    pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let index = Self::decode_snapshot(&bytes)?;
        tracing::info!(
            path = %path.as_ref().display(),
            nodes = index.node_count(),
            edges = index.edge_count(),
            "loaded snapshot"
        );
        Ok(index)
    }

    /// Decodes a snapshot image held in memory.
    pub fn decode_snapshot(bytes: &[u8]) -> Result<Self> {
        // Header plus trailing checksum is the minimum sane size.
        if bytes.len() < MAGIC.len() + 4 + 8 {
            return Err(SnapshotError::Corrupt("file truncated"));
        }
        let (body, tail) = bytes.split_at(bytes.len() - 8);

        if &body[..4] != MAGIC {
            return Err(SnapshotError::Corrupt("bad magic"));
        }
        let version = u16::from_le_bytes([body[4], body[5]]);
        if version != VERSION {
            return Err(SnapshotError::Version(version));
        }

        let expected = u64::from_le_bytes(tail.try_into().expect("8-byte checksum tail"));
        let mut hasher = XxHash64::with_seed(CHECKSUM_SEED);
        hasher.write(body);
        if hasher.finish() != expected {
            return Err(SnapshotError::Corrupt("checksum mismatch"));
        }

        let mut cursor = SnapshotCursor::new(&body[8..]);
        let nodes = read_interner(&mut cursor)?;
        let etypes = read_interner(&mut cursor)?;

        let node_count = cursor.read_u32()? as usize;
        let etype_count = etypes.len();
        let mut outgoing = Vec::new();
        for _ in 0..node_count {
            outgoing.push(read_records(&mut cursor, node_count, etype_count)?);
        }
        let mut incoming = Vec::new();
        for _ in 0..node_count {
            incoming.push(read_records(&mut cursor, node_count, etype_count)?);
        }

        let words = cursor.read_u32()? as usize;
        if words != Tombstones::words_for(node_count) {
            return Err(SnapshotError::Corrupt("tombstone word count mismatch"));
        }
        let mut word_vec = Vec::new();
        for _ in 0..words {
            word_vec.push(cursor.read_u64()?);
        }

        if !cursor.is_exhausted() {
            return Err(SnapshotError::Corrupt("trailing bytes after tombstones"));
        }

        Ok(GraphIndex {
            nodes,
            etypes,
            topology: Topology::from_parts(
                outgoing,
                incoming,
                Tombstones::from_words(word_vec, node_count),
            ),
        })
    }
}

fn len_u32(len: usize) -> io::Result<u32> {
    u32::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "section exceeds u32 range"))
}

fn write_interner(w: &mut impl Write, interner: &Interner) -> Result<()> {
    w.write_all(&len_u32(interner.len())?.to_le_bytes())?;
    for s in interner.strings() {
        w.write_all(&len_u32(s.len())?.to_le_bytes())?;
        w.write_all(s.as_bytes())?;
    }
    Ok(())
}

fn write_records(w: &mut impl Write, records: &[EdgeRecord]) -> Result<()> {
    w.write_all(&len_u32(records.len())?.to_le_bytes())?;
    for rec in records {
        w.write_all(&rec.peer.as_u32().to_le_bytes())?;
        w.write_all(&rec.etype.as_u32().to_le_bytes())?;
        w.write_all(&rec.valid_from_us.to_le_bytes())?;
        w.write_all(&rec.valid_to_us.to_le_bytes())?;
    }
    Ok(())
}

fn read_interner(cursor: &mut SnapshotCursor<'_>) -> Result<Interner> {
    let count = cursor.read_u32()? as usize;
    let mut strings = Vec::new();
    for _ in 0..count {
        let len = cursor.read_u32()? as usize;
        let bytes = cursor.take(len)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|_| SnapshotError::Corrupt("interned string is not utf8"))?;
        strings.push(s.to_string());
    }
    Interner::from_strings(strings)
        .map_err(|_| SnapshotError::Corrupt("duplicate interned string"))
}

fn read_records(
    cursor: &mut SnapshotCursor<'_>,
    node_count: usize,
    etype_count: usize,
) -> Result<Vec<EdgeRecord>> {
    let count = cursor.read_u32()? as usize;
    let mut records = Vec::new();
    for _ in 0..count {
        let peer = cursor.read_u32()?;
        let etype = cursor.read_u32()?;
        let valid_from_us = cursor.read_i64()?;
        let valid_to_us = cursor.read_i64()?;
        if peer as usize >= node_count {
            return Err(SnapshotError::Corrupt("edge record references unknown handle"));
        }
        if etype as usize >= etype_count {
            return Err(SnapshotError::Corrupt("edge record references unknown edge type"));
        }
        records.push(EdgeRecord {
            peer: Handle::new(peer),
            etype: EtypeId::new(etype),
            valid_from_us,
            valid_to_us,
        });
    }
    Ok(records)
}

/// Checksumming writer: hashes exactly the bytes that reach the sink.
struct HashingWriter<W: Write> {
    inner: W,
    hasher: XxHash64,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: XxHash64::with_seed(CHECKSUM_SEED),
        }
    }

    fn digest(&self) -> u64 {
        self.hasher.finish()
    }

    fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.write(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Bounds-checked reader over the decoded body.
struct SnapshotCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SnapshotCursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or(SnapshotError::Corrupt("file truncated"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().expect("4 bytes")))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().expect("8 bytes")))
    }

    fn read_i64(&mut self) -> Result<i64> {
        let bytes = self.take(8)?;
        Ok(i64::from_le_bytes(bytes.try_into().expect("8 bytes")))
    }

    fn is_exhausted(&self) -> bool {
        self.pos == self.buf.len()
    }
}

// =============================================================================
// Tests
// =============================================================================
