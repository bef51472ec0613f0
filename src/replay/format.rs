//! Replay File Format
//!
//! Byte-level encode/decode of `.rpl` files. The header is never
//! compressed so that listing replays only has to read a few bytes.
//!
//! ```text
//! header   u8 version | i32 magic | level id | player | f32 fps
//!          | i32 state size | bool finished | f32 finish time
//! v3 body  i32 size | i32 zsize | zlib(events, chunks, moving blocks)
//! v1 body  events (optionally zlib) | chunks (each optionally zlib)
//! v0 body  chunks (each optionally zlib)
//! ```

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::{debug, info};

use crate::core::buffer::{ByteReader, ByteWriter};
use crate::core::time::{float_to_time, time_to_float};

use super::moving_blocks::MovingBlockTrack;
use super::ReplayError;

/// Endianness guard written after the version byte.
pub const REPLAY_MAGIC: i32 = 0x1234_5678;

/// Bike states per chunk.
pub const STATES_PER_CHUNK: usize = 512;

/// Format written by default.
pub const CURRENT_FORMAT: u8 = 3;

/// Upper bound on speculative preallocation from untrusted sizes.
const MAX_PREALLOC: usize = 1 << 24;

// =============================================================================
// HEADER
// =============================================================================

/// Uncompressed replay header.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplayHeader {
    /// Format version (0, 1 or 3)
    pub version: u8,
    /// Level the replay was recorded on
    pub level_id: String,
    /// Player name
    pub player_name: String,
    /// Recorded states per second
    pub frame_rate: f32,
    /// Bytes per recorded state
    pub state_size: usize,
    /// Whether the level was completed
    pub finished: bool,
    /// Finish time in centiseconds
    pub finish_time: i32,
}

impl ReplayHeader {
    /// Read a header, rejecting unknown versions and foreign byte order.
    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self, ReplayError> {
        let version = reader.read_u8()?;
        if !matches!(version, 0 | 1 | 3) {
            return Err(ReplayError::UnsupportedVersion(version));
        }

        let magic = reader.read_i32()?;
        if magic != REPLAY_MAGIC {
            return Err(ReplayError::BadEndianness(magic));
        }

        let level_id = reader.read_file_string()?;
        let player_name = reader.read_file_string()?;
        let frame_rate = reader.read_f32()?;
        let state_size = read_size(reader)?;
        let finished = reader.read_bool()?;
        let finish_time = float_to_time(reader.read_f32()?);

        Ok(Self { version, level_id, player_name, frame_rate, state_size, finished, finish_time })
    }

    /// Write the header with the given version byte.
    pub fn write(&self, version: u8, writer: &mut ByteWriter) -> Result<(), ReplayError> {
        writer.write_u8(version);
        writer.write_i32(REPLAY_MAGIC);
        writer.write_file_string(&self.level_id)?;
        writer.write_file_string(&self.player_name)?;
        writer.write_f32(self.frame_rate);
        writer.write_i32(self.state_size as i32);
        writer.write_bool(self.finished);
        writer.write_f32(time_to_float(self.finish_time));
        Ok(())
    }
}

// =============================================================================
// CONTENT
// =============================================================================

/// A run of up to [`STATES_PER_CHUNK`] fixed-size states.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateChunk {
    /// Number of states held
    pub num_states: usize,
    /// `num_states * state_size` bytes
    pub data: Vec<u8>,
}

impl StateChunk {
    /// Bytes of state `index`.
    pub fn state(&self, index: usize, state_size: usize) -> Option<&[u8]> {
        let start = index.checked_mul(state_size)?;
        self.data.get(start..start + state_size)
    }
}

/// Everything a replay file holds.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplayContent {
    /// Header
    pub header: ReplayHeader,
    /// Serialized scene event stream
    pub events: Vec<u8>,
    /// State chunks
    pub chunks: Vec<StateChunk>,
    /// Moving block tracks (format 3 only)
    pub moving_blocks: Vec<MovingBlockTrack>,
}

// =============================================================================
// DECODE
// =============================================================================

/// Decode a whole replay file.
pub fn decode(bytes: &[u8]) -> Result<ReplayContent, ReplayError> {
    let mut reader = ByteReader::new(bytes);
    let header = ReplayHeader::read(&mut reader)?;
    debug!(
        version = header.version,
        level = %header.level_id,
        player = %header.player_name,
        state_size = header.state_size,
        "Replay header"
    );

    let content = match header.version {
        0 | 1 => decode_v1(&mut reader, header)?,
        3 => decode_v3(&mut reader, header)?,
        v => return Err(ReplayError::UnsupportedVersion(v)),
    };

    if content.chunks.is_empty() {
        return Err(ReplayError::NoChunk);
    }
    Ok(content)
}

/// Formats 0 and 1: per-block compression with a "compressed" flag.
fn decode_v1(reader: &mut ByteReader<'_>, header: ReplayHeader) -> Result<ReplayContent, ReplayError> {
    let events = if header.version == 1 {
        let size = read_size(reader)?;
        read_maybe_compressed(reader, size)?
    } else {
        Vec::new()
    };

    let num_chunks = read_size(reader)?;
    let mut chunks = Vec::with_capacity(num_chunks.min(MAX_PREALLOC));
    for _ in 0..num_chunks {
        let num_states = read_size(reader)?;
        let data = read_maybe_compressed(reader, chunk_bytes(num_states, header.state_size)?)?;
        chunks.push(StateChunk { num_states, data });
    }

    Ok(ReplayContent { header, events, chunks, moving_blocks: Vec::new() })
}

/// Format 3: one zlib block after the header.
fn decode_v3(reader: &mut ByteReader<'_>, header: ReplayHeader) -> Result<ReplayContent, ReplayError> {
    let size = read_size(reader)?;
    let compressed_size = read_size(reader)?;
    let data = zuncompress(reader.read_bytes(compressed_size)?, size)?;
    let mut body = ByteReader::new(&data);

    let events_size = read_size(&mut body)?;
    let events = body.read_bytes(events_size)?.to_vec();

    let num_chunks = body.read_u32()? as usize;
    let mut chunks = Vec::with_capacity(num_chunks.min(MAX_PREALLOC));
    for _ in 0..num_chunks {
        let num_states = read_size(&mut body)?;
        let data = body.read_bytes(chunk_bytes(num_states, header.state_size)?)?.to_vec();
        chunks.push(StateChunk { num_states, data });
    }

    let num_blocks = body.read_u32()? as usize;
    let mut moving_blocks = Vec::with_capacity(num_blocks.min(MAX_PREALLOC));
    for _ in 0..num_blocks {
        moving_blocks.push(MovingBlockTrack::read(&mut body)?);
    }

    Ok(ReplayContent { header, events, chunks, moving_blocks })
}

fn read_size(reader: &mut ByteReader<'_>) -> Result<usize, ReplayError> {
    let n = reader.read_i32()?;
    usize::try_from(n).map_err(|_| ReplayError::InvalidSize(n))
}

fn chunk_bytes(num_states: usize, state_size: usize) -> Result<usize, ReplayError> {
    num_states
        .checked_mul(state_size)
        .ok_or(ReplayError::InvalidSize(i32::MAX))
}

fn read_maybe_compressed(reader: &mut ByteReader<'_>, size: usize) -> Result<Vec<u8>, ReplayError> {
    if reader.read_bool()? {
        let compressed_size = read_size(reader)?;
        zuncompress(reader.read_bytes(compressed_size)?, size)
    } else {
        Ok(reader.read_bytes(size)?.to_vec())
    }
}

// =============================================================================
// ENCODE
// =============================================================================

/// Encode a replay in format 1 or 3.
pub fn encode(content: &ReplayContent, format: u8) -> Result<Vec<u8>, ReplayError> {
    match format {
        1 => encode_v1(content),
        3 => encode_v3(content),
        other => Err(ReplayError::InvalidFormat(other)),
    }
}

fn encode_v1(content: &ReplayContent) -> Result<Vec<u8>, ReplayError> {
    let mut out = ByteWriter::new();
    content.header.write(1, &mut out)?;

    out.write_i32(content.events.len() as i32);
    write_maybe_compressed(&mut out, &content.events)?;

    out.write_i32(content.chunks.len() as i32);
    for chunk in &content.chunks {
        out.write_i32(chunk.num_states as i32);
        write_maybe_compressed(&mut out, &chunk.data)?;
    }

    Ok(out.into_bytes())
}

fn encode_v3(content: &ReplayContent) -> Result<Vec<u8>, ReplayError> {
    let mut out = ByteWriter::new();
    content.header.write(3, &mut out)?;

    let mut body = ByteWriter::with_capacity(32 + content.events.len());
    body.write_i32(content.events.len() as i32);
    body.write_bytes(&content.events);

    body.write_u32(content.chunks.len() as u32);
    for chunk in &content.chunks {
        body.write_i32(chunk.num_states as i32);
        body.write_bytes(&chunk.data);
    }

    // A single sample means the block never moved
    let moving: Vec<&MovingBlockTrack> = content
        .moving_blocks
        .iter()
        .filter(|track| track.samples.len() > 1)
        .collect();
    let num_samples: usize = moving.iter().map(|track| track.samples.len()).sum();
    body.write_u32(moving.len() as u32);
    for track in &moving {
        track.write(&mut body);
    }
    info!(
        blocks = content.moving_blocks.len(),
        moving = moving.len(),
        states = num_samples,
        "Replay moving block states"
    );

    let body = body.into_bytes();
    let compressed = zcompress(&body)?;
    out.write_i32(body.len() as i32);
    out.write_i32(compressed.len() as i32);
    out.write_bytes(&compressed);

    let ratio = compressed.len() as f64 * 100.0 / body.len().max(1) as f64;
    info!(uncompressed = body.len(), compressed = compressed.len(), ratio, "Replay compressed");
    Ok(out.into_bytes())
}

fn write_maybe_compressed(out: &mut ByteWriter, data: &[u8]) -> Result<(), ReplayError> {
    let compressed = zcompress(data)?;
    if compressed.len() < data.len() {
        out.write_bool(true);
        out.write_i32(compressed.len() as i32);
        out.write_bytes(&compressed);
    } else {
        out.write_bool(false);
        out.write_bytes(data);
    }
    Ok(())
}

// =============================================================================
// ZLIB
// =============================================================================

/// Compress at the best level.
pub fn zcompress(data: &[u8]) -> Result<Vec<u8>, ReplayError> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2 + 16), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompress, requiring exactly `expected` output bytes.
pub fn zuncompress(data: &[u8], expected: usize) -> Result<Vec<u8>, ReplayError> {
    let mut out = Vec::with_capacity(expected.min(MAX_PREALLOC));
    ZlibDecoder::new(data)
        .take(expected as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| ReplayError::Decompression(e.to_string()))?;
    if out.len() != expected {
        return Err(ReplayError::SizeMismatch { expected, actual: out.len() });
    }
    Ok(out)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::Vector2f;
    use crate::replay::moving_blocks::BlockSample;

    fn header() -> ReplayHeader {
        ReplayHeader {
            version: 3,
            level_id: "tut1".into(),
            player_name: "rider".into(),
            frame_rate: 25.0,
            state_size: 4,
            finished: true,
            finish_time: 4321,
        }
    }

    fn content() -> ReplayContent {
        let mut moving = MovingBlockTrack::new("crate");
        for time in [0, 100] {
            moving.samples.push(BlockSample { time, position: Vector2f::new(1.0, time as f32), rotation: 0.5 });
        }
        let mut still = MovingBlockTrack::new("rock");
        still.samples.push(BlockSample { time: 0, position: Vector2f::ZERO, rotation: 0.0 });

        ReplayContent {
            header: header(),
            events: vec![9, 8, 7],
            chunks: vec![StateChunk { num_states: 2, data: vec![1, 2, 3, 4, 5, 6, 7, 8] }],
            moving_blocks: vec![moving, still],
        }
    }

    #[test]
    fn test_header_layout() {
        let mut w = ByteWriter::new();
        header().write(3, &mut w).unwrap();
        let bytes = w.into_bytes();
        assert_eq!(bytes[0], 3);
        assert_eq!(&bytes[1..5], &[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(bytes[5], 4);
        assert_eq!(&bytes[6..10], b"tut1");

        let read = ReplayHeader::read(&mut ByteReader::new(&bytes)).unwrap();
        assert_eq!(read, header());
    }

    #[test]
    fn test_v3_drops_still_blocks() {
        let bytes = encode(&content(), 3).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.events, vec![9, 8, 7]);
        assert_eq!(decoded.chunks, content().chunks);
        assert_eq!(decoded.moving_blocks.len(), 1);
        assert_eq!(decoded.moving_blocks[0].name, "crate");
    }

    #[test]
    fn test_v1_reads_back() {
        let mut original = content();
        original.header.version = 1;
        original.moving_blocks.clear();
        let decoded = decode(&encode(&original, 1).unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_v0_has_no_events() {
        let mut w = ByteWriter::new();
        header().write(0, &mut w).unwrap();
        w.write_i32(1);
        w.write_i32(1);
        w.write_bool(false);
        w.write_bytes(&[1, 2, 3, 4]);
        let decoded = decode(w.as_bytes()).unwrap();
        assert!(decoded.events.is_empty());
        assert_eq!(decoded.chunks[0].data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_unsupported_version() {
        let mut w = ByteWriter::new();
        header().write(2, &mut w).unwrap();
        assert!(matches!(decode(w.as_bytes()), Err(ReplayError::UnsupportedVersion(2))));
        assert!(matches!(encode(&content(), 2), Err(ReplayError::InvalidFormat(2))));
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let packed = zcompress(&[1, 2, 3, 4, 5]).unwrap();
        assert!(zuncompress(&packed, 5).is_ok());
        assert!(matches!(
            zuncompress(&packed, 4),
            Err(ReplayError::SizeMismatch { expected: 4, actual: 5 })
        ));
        assert!(matches!(
            zuncompress(&packed, 6),
            Err(ReplayError::SizeMismatch { expected: 6, actual: 5 })
        ));
        assert!(matches!(zuncompress(&[0xde, 0xad], 6), Err(ReplayError::Decompression(_))));
    }

    #[test]
    fn test_chunk_state_access() {
        let chunk = StateChunk { num_states: 2, data: vec![1, 2, 3, 4] };
        assert_eq!(chunk.state(1, 2), Some(&[3u8, 4][..]));
        assert_eq!(chunk.state(2, 2), None);
    }
}
