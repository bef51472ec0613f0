//! Moving Block Tracks
//!
//! Physics blocks are recorded sparsely: a sample is kept only when the
//! block moved enough, and less often the farther it is from the players.

use serde::{Serialize, Deserialize};

use crate::core::buffer::{BufferError, ByteReader, ByteWriter};
use crate::core::vec2::Vector2f;
use crate::scene::Block;

/// Position or rotation change that counts as a move.
pub const MIN_DIFF_MOVE: f32 = 0.1;
/// Rotation change that counts as a move.
pub const MIN_DIFF_ROTATION: f32 = 0.1;

/// Minimum spacing between two samples of a block.
pub const MIN_FAR_DIFF_TIME1: i32 = 15;
/// Distance from every player past which samples are spaced further.
pub const MIN_FAR_PLAYER_LENGTH1: f32 = 5.0;
/// Spacing beyond [`MIN_FAR_PLAYER_LENGTH1`].
pub const MIN_FAR_DIFF_TIME2: i32 = 80;
/// Distance past which samples are spaced furthest.
pub const MIN_FAR_PLAYER_LENGTH2: f32 = 10.0;
/// Spacing beyond [`MIN_FAR_PLAYER_LENGTH2`].
pub const MIN_FAR_DIFF_TIME3: i32 = 150;

/// Time after which a slow drift is recorded anyway.
pub const MIN_LONG_DIFF_TIME: i32 = 500;
/// Drift that counts after [`MIN_LONG_DIFF_TIME`].
pub const MIN_LONG_DIFF_MOVE: f32 = 0.05;
/// Rotation drift that counts after [`MIN_LONG_DIFF_TIME`].
pub const MIN_LONG_DIFF_ROTATION: f32 = 0.05;

/// One recorded block position.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockSample {
    /// Scene time in centiseconds
    pub time: i32,
    /// Block position
    pub position: Vector2f,
    /// Block rotation
    pub rotation: f32,
}

impl BlockSample {
    fn moved_more_than(&self, position: Vector2f, rotation: f32, move_limit: f32, rotation_limit: f32) -> bool {
        (self.position.x - position.x).abs() > move_limit
            || (self.position.y - position.y).abs() > move_limit
            || (self.rotation - rotation).abs() > rotation_limit
    }
}

/// Recorded samples of one block.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MovingBlockTrack {
    /// Block id
    pub name: String,
    /// Samples in time order
    pub samples: Vec<BlockSample>,
}

impl MovingBlockTrack {
    /// Empty track.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), samples: Vec::new() }
    }

    /// Latest sample at or before `time`.
    pub fn sample_at(&self, time: i32) -> Option<&BlockSample> {
        let index = self.samples.partition_point(|s| s.time <= time);
        index.checked_sub(1).map(|i| &self.samples[i])
    }

    pub(crate) fn write(&self, writer: &mut ByteWriter) {
        writer.write_string(&self.name);
        writer.write_i32(self.samples.len() as i32);
        for sample in &self.samples {
            writer.write_i32(sample.time);
            writer.write_f32(sample.position.x);
            writer.write_f32(sample.position.y);
            writer.write_f32(sample.rotation);
        }
    }

    pub(crate) fn read(reader: &mut ByteReader<'_>) -> Result<Self, BufferError> {
        let name = reader.read_string()?;
        let count = reader.read_i32()?.max(0) as usize;
        let mut samples = Vec::with_capacity(count.min(reader.remaining() / 16));
        for _ in 0..count {
            let time = reader.read_i32()?;
            let x = reader.read_f32()?;
            let y = reader.read_f32()?;
            let rotation = reader.read_f32()?;
            samples.push(BlockSample { time, position: Vector2f::new(x, y), rotation });
        }
        Ok(Self { name, samples })
    }
}

/// Whether `block` gets a new sample at `time`.
///
/// Zero players count as infinitely far away.
pub fn is_physic_block_to_save(
    block: &Block,
    time: i32,
    samples: &[BlockSample],
    players: &[Vector2f],
    force_all: bool,
) -> bool {
    if !block.is_physics() {
        return false;
    }
    if force_all {
        return true;
    }
    let Some(previous) = samples.last() else {
        return true;
    };
    if time < previous.time + MIN_FAR_DIFF_TIME1 {
        return false;
    }

    let position = block.dynamic_position();
    let rotation = block.dynamic_rotation();
    let player_distance = players
        .iter()
        .map(|p| (*p - position).length())
        .fold(f32::INFINITY, f32::min);

    if previous.moved_more_than(position, rotation, MIN_DIFF_MOVE, MIN_DIFF_ROTATION) {
        if player_distance >= MIN_FAR_PLAYER_LENGTH1 && time <= previous.time + MIN_FAR_DIFF_TIME2 {
            return false;
        }
        if player_distance >= MIN_FAR_PLAYER_LENGTH2 && time <= previous.time + MIN_FAR_DIFF_TIME3 {
            return false;
        }
        return true;
    }

    if time <= previous.time + MIN_LONG_DIFF_TIME {
        return false;
    }
    previous.moved_more_than(position, rotation, MIN_LONG_DIFF_MOVE, MIN_LONG_DIFF_ROTATION)
}

/// Append a sample to every block that needs one.
///
/// `tracks` grows to one track per block on first use; blocks keep their
/// index between calls.
pub fn store_blocks(
    tracks: &mut Vec<MovingBlockTrack>,
    time: i32,
    blocks: &[Block],
    players: &[Vector2f],
    force_all: bool,
) {
    for block in blocks.iter().skip(tracks.len()) {
        tracks.push(MovingBlockTrack::new(block.id()));
    }

    for (block, track) in blocks.iter().zip(tracks.iter_mut()) {
        if is_physic_block_to_save(block, time, &track.samples, players, force_all) {
            track.samples.push(BlockSample {
                time,
                position: block.dynamic_position(),
                rotation: block.dynamic_rotation(),
            });
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
