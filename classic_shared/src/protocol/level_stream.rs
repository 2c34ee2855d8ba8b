//! Level transfer for a joining peer.
//!
//! The block array is prefixed with its i32 big-endian length, gzipped and
//! cut into 1024-byte `LevelDataChunk` frames bracketed by `LevelInitialize`
//! and `LevelFinalize`.

use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::codec::{LevelChunk, LEVEL_CHUNK_LEN};
use super::packets::ClientboundPacket;
use crate::world::grid::WorldGrid;

/// The big-endian i32 length prefix; fails for lengths past `i32::MAX`.
fn length_prefix(len: usize) -> io::Result<[u8; 4]> {
    i32::try_from(len).map(i32::to_be_bytes).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("level of {len} blocks does not fit the length prefix"),
        )
    })
}

/// Gzipped `len ++ blocks`, with blocks mapped through `map`.
pub fn compress_blocks(grid: &WorldGrid, map: impl Fn(u8) -> u8) -> io::Result<Vec<u8>> {
    let raw = grid.to_bytes();
    let prefix = length_prefix(raw.len())?;
    let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 8), Compression::default());
    encoder.write_all(&prefix)?;
    let mapped: Vec<u8> = raw.into_iter().map(map).collect();
    encoder.write_all(&mapped)?;
    encoder.finish()
}

/// Inverse of [`compress_blocks`]: returns the block bytes.
pub fn decompress_blocks(gzipped: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoded = Vec::new();
    GzDecoder::new(gzipped).read_to_end(&mut decoded)?;
    if decoded.len() < 4 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "level stream shorter than its length prefix",
        ));
    }
    let len = i32::from_be_bytes([decoded[0], decoded[1], decoded[2], decoded[3]]);
    let blocks = decoded.split_off(4);
    if len < 0 || len as usize != blocks.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("level stream declares {len} blocks, carries {}", blocks.len()),
        ));
    }
    Ok(blocks)
}

/// The full frame sequence that transfers `grid` to one peer.
///
/// Peers without `CustomBlocks` get every custom block replaced by its
/// classic fallback.
pub fn level_packets(grid: &WorldGrid, custom_blocks: bool) -> io::Result<Vec<ClientboundPacket>> {
    let gzipped = compress_blocks(grid, |id| {
        crate::world::block::Block(id).for_peer(custom_blocks).id()
    })?;

    let total = gzipped.len().max(1);
    let mut packets = Vec::with_capacity(gzipped.len() / LEVEL_CHUNK_LEN + 3);
    packets.push(ClientboundPacket::LevelInitialize {});

    let mut sent = 0usize;
    for chunk in gzipped.chunks(LEVEL_CHUNK_LEN) {
        sent += chunk.len();
        packets.push(ClientboundPacket::LevelDataChunk {
            chunk_length: chunk.len() as i16,
            chunk_data: LevelChunk::from_slice(chunk),
            percent_complete: (sent * 100 / total) as u8,
        });
    }

    packets.push(ClientboundPacket::LevelFinalize {
        x_size: grid.width(),
        y_size: grid.depth(),
        z_size: grid.height(),
    });
    Ok(packets)
}

/// Collects level frames on the receiving side.
#[derive(Debug, Default)]
pub struct LevelAssembler {
    gzipped: Vec<u8>,
    started: bool,
}

impl LevelAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn begin(&mut self) {
        self.gzipped.clear();
        self.started = true;
    }

    pub fn push_chunk(&mut self, length: i16, chunk: &LevelChunk) {
        let len = (length.max(0) as usize).min(LEVEL_CHUNK_LEN);
        self.gzipped.extend_from_slice(&chunk.as_bytes()[..len]);
    }

    /// Decodes the collected stream into a grid of the given size.
    pub fn finish(&mut self, width: i16, depth: i16, height: i16) -> io::Result<WorldGrid> {
        self.started = false;
        let blocks = decompress_blocks(&std::mem::take(&mut self.gzipped))?;
        WorldGrid::from_bytes(width, depth, height, &blocks).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} blocks do not fit {width}x{depth}x{height}", blocks.len()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::block::Block;
    use crate::world::grid::BlockPos;

    fn grid_with_custom() -> WorldGrid {
        let mut grid = WorldGrid::new(32, 32, 32);
        grid.fill(BlockPos::new(0, 0, 0), BlockPos::new(31, 3, 31), Block::STONE);
        grid.set(BlockPos::new(1, 4, 1), Block::ICE);
        grid
    }

    fn reassemble(packets: &[ClientboundPacket]) -> WorldGrid {
        let mut assembler = LevelAssembler::new();
        let mut out = None;
        for packet in packets {
            match packet {
                ClientboundPacket::LevelInitialize {} => assembler.begin(),
                ClientboundPacket::LevelDataChunk {
                    chunk_length,
                    chunk_data,
                    ..
                } => assembler.push_chunk(*chunk_length, chunk_data),
                ClientboundPacket::LevelFinalize {
                    x_size,
                    y_size,
                    z_size,
                } => out = Some(assembler.finish(*x_size, *y_size, *z_size).unwrap()),
                other => panic!("unexpected {other:?}"),
            }
        }
        out.unwrap()
    }

    #[test]
    fn length_prefix_rejects_lengths_past_i32() {
        assert_eq!(length_prefix(1024).unwrap(), 1024i32.to_be_bytes());
        assert_eq!(length_prefix(i32::MAX as usize).unwrap(), i32::MAX.to_be_bytes());
        let err = length_prefix(i32::MAX as usize + 1).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn stream_is_bracketed_and_reassembles() {
        let grid = grid_with_custom();
        let packets = level_packets(&grid, true).unwrap();
        assert_eq!(packets.first(), Some(&ClientboundPacket::LevelInitialize {}));
        assert!(matches!(
            packets.last(),
            Some(ClientboundPacket::LevelFinalize { x_size: 32, .. })
        ));
        assert_eq!(reassemble(&packets), grid);
    }

    #[test]
    fn last_chunk_reports_complete() {
        let packets = level_packets(&grid_with_custom(), true).unwrap();
        let last_chunk = packets
            .iter()
            .rev()
            .find_map(|p| match p {
                ClientboundPacket::LevelDataChunk {
                    percent_complete, ..
                } => Some(*percent_complete),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_chunk, 100);
    }

    #[test]
    fn classic_peers_receive_fallback_blocks() {
        let packets = level_packets(&grid_with_custom(), false).unwrap();
        let grid = reassemble(&packets);
        assert_eq!(grid.get(BlockPos::new(1, 4, 1)), Block::ICE.fallback());
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let gz = compress_blocks(&grid_with_custom(), |b| b).unwrap();
        assert!(decompress_blocks(&gz[..gz.len() / 2]).is_err());
    }
}
