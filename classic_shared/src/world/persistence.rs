//! On-disk world format.
//!
//! A saved world is a directory holding:
//! - `level.meta`: magic `CWLD`, i32 version, i16 width, depth, height
//! - `level.blocks`: i32 version, i32 raw length, u64 xxHash64 of the raw
//!   block bytes, then the raw bytes as a DEFLATE stream
//! - `level.json` (optional): metadata, environment and pending ticks
//!
//! All integers are little-endian.

use std::fs::{self, File};
use std::hash::Hasher;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use tracing::{debug, info};
use twox_hash::XxHash64;

use super::grid::WorldGrid;
use super::level::{Level, LevelProperties};
use crate::error::PersistenceError;

pub const META_FILE: &str = "level.meta";
pub const BLOCKS_FILE: &str = "level.blocks";
pub const PROPERTIES_FILE: &str = "level.json";

pub const META_MAGIC: &[u8; 4] = b"CWLD";
pub const META_VERSION: i32 = 1;
pub const BLOCKS_VERSION: i32 = 1;

const META_LEN: usize = 4 + 4 + 2 * 3;
const BLOCKS_HEADER_LEN: usize = 4 + 4 + 8;

/// xxHash64 with seed 0.
pub fn content_hash(bytes: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(bytes);
    hasher.finish()
}

fn ensure_dir(dir: &Path) -> io::Result<()> {
    if !dir.as_os_str().is_empty() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

fn write_file(path: PathBuf, parts: &[&[u8]]) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for part in parts {
        writer.write_all(part)?;
    }
    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|error| io::Error::new(io::ErrorKind::Other, error))?;
    file.sync_all()?;
    Ok(())
}

/// Writes `level.meta` and `level.blocks` into `dir`, creating it if needed.
pub fn save_grid(dir: &Path, grid: &WorldGrid) -> Result<(), PersistenceError> {
    ensure_dir(dir)?;

    let mut meta = Vec::with_capacity(META_LEN);
    meta.extend_from_slice(META_MAGIC);
    meta.extend_from_slice(&META_VERSION.to_le_bytes());
    meta.extend_from_slice(&grid.width().to_le_bytes());
    meta.extend_from_slice(&grid.depth().to_le_bytes());
    meta.extend_from_slice(&grid.height().to_le_bytes());
    write_file(dir.join(META_FILE), &[&meta])?;

    let raw = grid.to_bytes();
    let raw_len = i32::try_from(raw.len()).map_err(|_| PersistenceError::InvalidDimensions {
        width: grid.width(),
        depth: grid.depth(),
        height: grid.height(),
    })?;
    let hash = content_hash(&raw);
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    let compressed = encoder.finish()?;

    let mut header = Vec::with_capacity(BLOCKS_HEADER_LEN);
    header.extend_from_slice(&BLOCKS_VERSION.to_le_bytes());
    header.extend_from_slice(&raw_len.to_le_bytes());
    header.extend_from_slice(&hash.to_le_bytes());
    write_file(dir.join(BLOCKS_FILE), &[&header, &compressed])?;

    debug!(
        dir = %dir.display(),
        raw = raw.len(),
        compressed = compressed.len(),
        "Wrote world blocks"
    );
    Ok(())
}

fn read_all(path: PathBuf) -> io::Result<Vec<u8>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn le_i16(b: &[u8], at: usize) -> i16 {
    i16::from_le_bytes([b[at], b[at + 1]])
}

fn le_i32(b: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

fn le_u64(b: &[u8], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&b[at..at + 8]);
    u64::from_le_bytes(word)
}

/// Reads and verifies a grid saved by [`save_grid`].
pub fn load_grid(dir: &Path) -> Result<WorldGrid, PersistenceError> {
    let meta = read_all(dir.join(META_FILE))?;
    if meta.len() < META_LEN {
        return Err(PersistenceError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "truncated level.meta",
        )));
    }
    let mut magic = [0u8; 4];
    magic.copy_from_slice(&meta[0..4]);
    if &magic != META_MAGIC {
        return Err(PersistenceError::BadMagic(magic));
    }
    let version = le_i32(&meta, 4);
    if version != META_VERSION {
        return Err(PersistenceError::UnsupportedVersion {
            record: "meta",
            version,
        });
    }
    let (width, depth, height) = (le_i16(&meta, 8), le_i16(&meta, 10), le_i16(&meta, 12));
    if width <= 0 || depth <= 0 || height <= 0 {
        return Err(PersistenceError::InvalidDimensions {
            width,
            depth,
            height,
        });
    }

    let blocks = read_all(dir.join(BLOCKS_FILE))?;
    if blocks.len() < BLOCKS_HEADER_LEN {
        return Err(PersistenceError::Integrity("truncated level.blocks".into()));
    }
    let version = le_i32(&blocks, 0);
    if version != BLOCKS_VERSION {
        return Err(PersistenceError::UnsupportedVersion {
            record: "blocks",
            version,
        });
    }
    let length = le_i32(&blocks, 4);
    let expected_hash = le_u64(&blocks, 8);

    let volume = width as usize * depth as usize * height as usize;
    if length < 0 || length as usize != volume {
        return Err(PersistenceError::Integrity(format!(
            "stored length {length} does not match {width}x{depth}x{height}"
        )));
    }

    let mut raw = Vec::with_capacity(volume);
    DeflateDecoder::new(&blocks[BLOCKS_HEADER_LEN..])
        .read_to_end(&mut raw)
        .map_err(|e| PersistenceError::Integrity(format!("corrupt block stream: {e}")))?;
    if raw.len() != volume {
        return Err(PersistenceError::Integrity(format!(
            "decompressed {} bytes, expected {volume}",
            raw.len()
        )));
    }

    let actual_hash = content_hash(&raw);
    if actual_hash != expected_hash {
        return Err(PersistenceError::Integrity(format!(
            "hash {actual_hash:016x} does not match stored {expected_hash:016x}"
        )));
    }

    WorldGrid::from_bytes(width, depth, height, &raw)
        .ok_or_else(|| PersistenceError::Integrity("block count mismatch".into()))
}

/// Saves the grid and the `level.json` sidecar.
pub fn save_level(dir: &Path, level: &Level) -> Result<(), PersistenceError> {
    save_grid(dir, level.grid())?;
    let json = serde_json::to_vec_pretty(&level.properties())?;
    write_file(dir.join(PROPERTIES_FILE), &[&json])?;
    info!(level = %level.name(), dir = %dir.display(), "Saved world");
    Ok(())
}

/// Loads a level; a missing sidecar falls back to defaults.
pub fn load_level(dir: &Path, name: &str) -> Result<Level, PersistenceError> {
    let grid = load_grid(dir)?;
    let properties_path = dir.join(PROPERTIES_FILE);
    let properties = if properties_path.exists() {
        let bytes = read_all(properties_path)?;
        Some(serde_json::from_slice::<LevelProperties>(&bytes)?)
    } else {
        None
    };
    info!(
        level = %name,
        width = grid.width(),
        depth = grid.depth(),
        height = grid.height(),
        "Loaded world"
    );
    Ok(Level::restore(name, grid, properties))
}

/// Whether `dir` holds a saved grid.
pub fn exists(dir: &Path) -> bool {
    dir.join(META_FILE).is_file() && dir.join(BLOCKS_FILE).is_file()
}
