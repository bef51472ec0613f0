//! Replay Recording and Playback
//!
//! A replay holds the bike states sampled at a fixed frame rate (grouped in
//! chunks of [`STATES_PER_CHUNK`]), the scene event stream, and sparse
//! tracks of the physics blocks.
//!
//! ```text
//! record:   create ─▶ store_state / store_blocks / events ─▶ finish ─▶ save_if_not
//! playback: open ─▶ cursor at 0 ─▶ load_state / next_state / fast_* ─▶ end of file
//! ```

pub mod format;
pub mod moving_blocks;

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::buffer::{BufferError, ByteReader, ByteWriter};
use crate::core::hash::{StateHash, StateHasher};
use crate::core::vec2::Vector2f;
use crate::events::{read_event_stream, write_event_stream, EventError, RecordedEvent, SceneEvent};
use crate::scene::Block;

pub use format::{ReplayContent, ReplayHeader, StateChunk, CURRENT_FORMAT, REPLAY_MAGIC, STATES_PER_CHUNK};
pub use moving_blocks::{BlockSample, MovingBlockTrack};

/// Replay file extension.
pub const REPLAY_EXTENSION: &str = "rpl";

/// Largest possible header: two file strings plus fixed fields.
const MAX_HEADER_SIZE: u64 = 1 + 4 + 2 * 256 + 4 + 4 + 1 + 4;

/// Replay errors.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// None of the candidate paths exists.
    #[error("Unable to open the replay ({0})")]
    NotFound(String),

    /// Filesystem failure.
    #[error("Replay I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Magic number mismatch: the file was written with a foreign byte order.
    #[error("Unable to open the replay (not endian-compatible, guard {0:#x})")]
    BadEndianness(i32),

    /// Version byte outside {0, 1, 3}.
    #[error("Unable to open the replay (unsupported version {0})")]
    UnsupportedVersion(u8),

    /// zlib stream could not be inflated.
    #[error("Unable to open the replay (decompression failed: {0})")]
    Decompression(String),

    /// Inflated size differs from the recorded one.
    #[error("Unable to open the replay ({actual} bytes uncompressed, {expected} expected)")]
    SizeMismatch {
        /// Size stored in the file
        expected: usize,
        /// Size obtained
        actual: usize,
    },

    /// The replay holds no state chunk.
    #[error("Replay with no chunk !")]
    NoChunk,

    /// Negative or overflowing size field.
    #[error("Unable to open the replay (invalid size {0})")]
    InvalidSize(i32),

    /// Truncated data or bad string.
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// Event stream could not be decoded.
    #[error(transparent)]
    Events(#[from] EventError),

    /// Save requested in a format other than 1 or 3.
    #[error("Invalid replay format ({0})")]
    InvalidFormat(u8),

    /// Stored state has the wrong length.
    #[error("Invalid state size ({actual} bytes, {expected} expected)")]
    StateSize {
        /// Replay state size
        expected: usize,
        /// Given length
        actual: usize,
    },
}

/// Header summary used to list replays.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplayInfo {
    /// Replay name
    pub name: String,
    /// Player name
    pub player: String,
    /// Level id
    pub level_id: String,
    /// Format version
    pub version: u8,
    /// Whether the level was completed
    pub is_finished: bool,
    /// Finish time in centiseconds, -1 when unfinished
    pub finish_time: i32,
}

/// Saved playback cursor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayPosition {
    /// Last state was loaded
    pub end_of_file: bool,
    /// Chunk index
    pub chunk: usize,
    /// State index inside the chunk
    pub state: i32,
}

/// A replay being recorded or played back.
#[derive(Debug)]
pub struct Replay {
    file_name: String,
    header: ReplayHeader,
    event_buffer: ByteWriter,
    events: Vec<RecordedEvent>,
    chunks: Vec<StateChunk>,
    recorded_blocks: Vec<MovingBlockTrack>,
    loaded_blocks: Vec<MovingBlockTrack>,
    cur_chunk: usize,
    cur_state: i32,
    end_of_file: bool,
    saved: bool,
    write_count: usize,
}

impl Replay {
    // =========================================================================
    // RECORDING
    // =========================================================================

    /// Start recording.
    pub fn create(
        file_name: impl Into<String>,
        level_id: impl Into<String>,
        player: impl Into<String>,
        frame_rate: f32,
        state_size: usize,
    ) -> Self {
        let header = ReplayHeader {
            version: CURRENT_FORMAT,
            level_id: level_id.into(),
            player_name: player.into(),
            frame_rate,
            state_size,
            finished: false,
            finish_time: 0,
        };
        Self::from_header(file_name.into(), header)
    }

    fn from_header(file_name: String, header: ReplayHeader) -> Self {
        Self {
            file_name,
            header,
            event_buffer: ByteWriter::with_capacity(1024),
            events: Vec::new(),
            chunks: Vec::new(),
            recorded_blocks: Vec::new(),
            loaded_blocks: Vec::new(),
            cur_chunk: 0,
            cur_state: 0,
            end_of_file: false,
            saved: false,
            write_count: 0,
        }
    }

    /// Append one state. Chunks fill up to [`STATES_PER_CHUNK`].
    pub fn store_state(&mut self, state: &[u8]) -> Result<(), ReplayError> {
        let expected = self.header.state_size;
        if state.len() != expected {
            return Err(ReplayError::StateSize { expected, actual: state.len() });
        }

        match self.chunks.last_mut() {
            Some(chunk) if chunk.num_states < STATES_PER_CHUNK => {
                chunk.data.extend_from_slice(state);
                chunk.num_states += 1;
            }
            _ => {
                let mut data = Vec::with_capacity(STATES_PER_CHUNK * expected);
                data.extend_from_slice(state);
                self.chunks.push(StateChunk { num_states: 1, data });
            }
        }
        Ok(())
    }

    /// Sample the physics blocks.
    pub fn store_blocks(&mut self, time: i32, blocks: &[Block], players: &[Vector2f], force_all: bool) {
        moving_blocks::store_blocks(&mut self.recorded_blocks, time, blocks, players, force_all);
    }

    /// Append an event to the event stream.
    pub fn record_event(&mut self, event: &SceneEvent) {
        event.serialize(&mut self.event_buffer);
    }

    /// Serialized event stream.
    pub fn event_buffer_mut(&mut self) -> &mut ByteWriter {
        &mut self.event_buffer
    }

    /// Set the outcome.
    pub fn finish(&mut self, finished: bool, finish_time: i32) {
        self.header.finished = finished;
        self.header.finish_time = finish_time;
    }

    /// Write `<dir>/<file name>` once. Later calls do nothing.
    pub fn save_if_not(&mut self, format: u8, dir: impl AsRef<Path>) -> Result<(), ReplayError> {
        if self.saved {
            return Ok(());
        }

        let content = ReplayContent {
            header: self.header.clone(),
            events: self.event_buffer.as_bytes().to_vec(),
            chunks: self.chunks.clone(),
            moving_blocks: self.recorded_blocks.clone(),
        };
        let bytes = format::encode(&content, format)?;

        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        fs::write(&path, &bytes).map_err(|e| {
            warn!(path = %path.display(), error = %e, "Failed to open replay file for output");
            e
        })?;

        self.saved = true;
        self.write_count += 1;
        info!(path = %path.display(), format, bytes = bytes.len(), "Replay written");
        Ok(())
    }

    // =========================================================================
    // LOADING
    // =========================================================================

    /// Open `name` as a path, then `<dir>/<name>`, then `<dir>/<name>.rpl`.
    pub fn open(name: &str, dir: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let dir = dir.as_ref();
        let candidates = [
            PathBuf::from(name),
            dir.join(name),
            dir.join(format!("{name}.{REPLAY_EXTENSION}")),
        ];
        let Some((path, bytes)) = candidates
            .iter()
            .find_map(|path| fs::read(path).ok().map(|bytes| (path, bytes)))
        else {
            warn!(replay = name, dir = %dir.display(), "Failed to open replay file for input");
            return Err(ReplayError::NotFound(name.to_string()));
        };

        let content = format::decode(&bytes).map_err(|e| {
            warn!(path = %path.display(), error = %e, "Unreadable replay");
            e
        })?;
        let events = read_event_stream(&content.events)?;

        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        let mut replay = Self::from_header(file_name, content.header);
        replay.chunks = content.chunks;
        replay.loaded_blocks = content.moving_blocks;
        write_event_stream(&events, &mut replay.event_buffer);
        replay.events = events.into_iter().map(RecordedEvent::new).collect();

        debug!(
            path = %path.display(),
            chunks = replay.chunks.len(),
            events = replay.events.len(),
            moving_blocks = replay.loaded_blocks.len(),
            "Replay opened"
        );
        Ok(replay)
    }

    /// Read the header of `<dir>/<name>.rpl` (or `name` as a path).
    pub fn probe_info(name: &str, dir: impl AsRef<Path>) -> Option<ReplayInfo> {
        let dir = dir.as_ref();
        let candidates = [dir.join(format!("{name}.{REPLAY_EXTENSION}")), PathBuf::from(name)];
        let mut file = candidates.iter().find_map(|path| fs::File::open(path).ok())?;

        let mut bytes = Vec::new();
        file.by_ref().take(MAX_HEADER_SIZE).read_to_end(&mut bytes).ok()?;
        let header = match ReplayHeader::read(&mut ByteReader::new(&bytes)) {
            Ok(header) => header,
            Err(e) => {
                debug!(replay = name, error = %e, "Skipping replay");
                return None;
            }
        };

        Some(ReplayInfo {
            name: name.to_string(),
            player: header.player_name,
            level_id: header.level_id,
            version: header.version,
            is_finished: header.finished,
            finish_time: if header.finished { header.finish_time } else { -1 },
        })
    }

    /// Remove `<dir>/<name>.rpl`.
    pub fn delete(name: &str, dir: impl AsRef<Path>) -> Result<(), ReplayError> {
        fs::remove_file(dir.as_ref().join(format!("{name}.{REPLAY_EXTENSION}")))?;
        Ok(())
    }

    /// Name from the local date, such as `19-10-26 14_05`.
    pub fn automatic_name() -> String {
        chrono::Local::now().format("%d-%m-%y %H_%M").to_string()
    }

    // =========================================================================
    // CURSOR
    // =========================================================================

    /// Back to the first state with every event unapplied.
    pub fn reinitialize(&mut self) {
        self.rewind_to_start();
        for event in &mut self.events {
            event.passed = false;
        }
    }

    /// Back to the first state.
    pub fn rewind_to_start(&mut self) {
        self.rewind_to(ReplayPosition::default());
    }

    /// Current cursor.
    pub fn position(&self) -> ReplayPosition {
        ReplayPosition { end_of_file: self.end_of_file, chunk: self.cur_chunk, state: self.cur_state }
    }

    /// Restore a cursor from [`Replay::position`].
    pub fn rewind_to(&mut self, position: ReplayPosition) {
        self.end_of_file = position.end_of_file;
        self.cur_chunk = position.chunk;
        self.cur_state = position.state;
    }

    /// One-based frame number of the cursor.
    pub fn current_frame(&self) -> i32 {
        (self.cur_chunk * STATES_PER_CHUNK) as i32 + self.cur_state + 1
    }

    fn chunk_len(&self, chunk: usize) -> i32 {
        self.chunks.get(chunk).map_or(0, |c| c.num_states as i32)
    }

    /// Move by `frames` states (negative to go back).
    ///
    /// The cursor is clamped to the first and last states. Returns false
    /// when it was clamped at the end.
    pub fn next_state(&mut self, frames: i32) -> bool {
        self.end_of_file = false;
        if self.chunks.is_empty() {
            return false;
        }

        let mut state = self.cur_state.saturating_add(frames);
        while state >= self.chunk_len(self.cur_chunk) && self.cur_chunk + 1 < self.chunks.len() {
            state -= self.chunk_len(self.cur_chunk);
            self.cur_chunk += 1;
        }
        while state < 0 && self.cur_chunk > 0 {
            self.cur_chunk -= 1;
            state += self.chunk_len(self.cur_chunk);
        }

        let len = self.chunk_len(self.cur_chunk);
        if state >= len {
            self.cur_state = (len - 1).max(0);
            return false;
        }
        self.cur_state = state.max(0);
        true
    }

    /// State under the cursor.
    pub fn peek_state(&self) -> Option<&[u8]> {
        let index = usize::try_from(self.cur_state).ok()?;
        self.chunks.get(self.cur_chunk)?.state(index, self.header.state_size)
    }

    /// State under the cursor, then advance by one.
    pub fn load_state(&mut self) -> Option<&[u8]> {
        let (chunk, state) = (self.cur_chunk, self.cur_state);
        self.chunks.get(chunk)?;

        self.end_of_file = chunk + 1 == self.chunks.len() && state == self.chunk_len(chunk) - 1;
        if !self.end_of_file {
            self.next_state(1);
        }

        let index = usize::try_from(state).ok()?;
        self.chunks[chunk].state(index, self.header.state_size)
    }

    fn frames_for(&self, time: i32) -> i32 {
        (time as f32 * self.header.frame_rate / 100.0) as i32
    }

    /// Skip `time` centiseconds forward.
    pub fn fast_forward(&mut self, time: i32) -> bool {
        self.next_state(self.frames_for(time))
    }

    /// Skip `time` centiseconds back, at least `min_frames` states.
    pub fn fast_rewind(&mut self, time: i32, min_frames: i32) -> bool {
        let frames = self.frames_for(time);
        self.next_state(if frames < min_frames { -min_frames } else { -frames })
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// File name inside the replay directory.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Header.
    pub fn header(&self) -> &ReplayHeader {
        &self.header
    }

    /// Level id.
    pub fn level_id(&self) -> &str {
        &self.header.level_id
    }

    /// Player name.
    pub fn player_name(&self) -> &str {
        &self.header.player_name
    }

    /// States per second.
    pub fn frame_rate(&self) -> f32 {
        self.header.frame_rate
    }

    /// Bytes per state.
    pub fn state_size(&self) -> usize {
        self.header.state_size
    }

    /// Whether the level was completed.
    pub fn is_finished(&self) -> bool {
        self.header.finished
    }

    /// Finish time in centiseconds.
    pub fn finish_time(&self) -> i32 {
        self.header.finish_time
    }

    /// Last state was loaded.
    pub fn is_end_of_file(&self) -> bool {
        self.end_of_file
    }

    /// State chunks.
    pub fn chunks(&self) -> &[StateChunk] {
        &self.chunks
    }

    /// Total stored states.
    pub fn num_states(&self) -> usize {
        self.chunks.iter().map(|c| c.num_states).sum()
    }

    /// Events decoded by [`Replay::open`].
    pub fn events(&self) -> &[RecordedEvent] {
        &self.events
    }

    /// Mutable events, for [`crate::scene::Scene::apply_replay_events`].
    pub fn events_mut(&mut self) -> &mut [RecordedEvent] {
        &mut self.events
    }

    /// Block tracks read from the file.
    pub fn moving_blocks(&self) -> &[MovingBlockTrack] {
        &self.loaded_blocks
    }

    /// Block tracks recorded so far.
    pub fn recorded_blocks(&self) -> &[MovingBlockTrack] {
        &self.recorded_blocks
    }

    /// Whether [`Replay::save_if_not`] already wrote the file.
    pub fn is_saved(&self) -> bool {
        self.saved
    }

    /// Number of file writes.
    pub fn write_count(&self) -> usize {
        self.write_count
    }

    /// SHA-256 over the header, events, states and block tracks.
    pub fn digest(&self) -> StateHash {
        let mut hasher = StateHasher::for_replay();
        hasher.update_str(&self.header.level_id);
        hasher.update_str(&self.header.player_name);
        hasher.update_f32(self.header.frame_rate);
        hasher.update_u32(self.header.state_size as u32);
        hasher.update_bool(self.header.finished);
        hasher.update_i32(self.header.finish_time);

        hasher.update_u32(self.event_buffer.len() as u32);
        hasher.update_bytes(self.event_buffer.as_bytes());

        hasher.update_u32(self.chunks.len() as u32);
        for chunk in &self.chunks {
            hasher.update_u32(chunk.num_states as u32);
            hasher.update_bytes(&chunk.data);
        }

        for track in self.loaded_blocks.iter().chain(&self.recorded_blocks) {
            hasher.update_str(&track.name);
            hasher.update_u32(track.samples.len() as u32);
            for sample in &track.samples {
                hasher.update_i32(sample.time);
                hasher.update_vec2(sample.position);
                hasher.update_f32(sample.rotation);
            }
        }
        hasher.finalize()
    }

    /// [`Replay::digest`] as lowercase hex.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SceneEventData;
    use tempfile::tempdir;

    const STATE_SIZE: usize = 8;

    fn state(i: u32) -> Vec<u8> {
        let mut s = i.to_le_bytes().to_vec();
        s.extend_from_slice(&(!i).to_le_bytes());
        s
    }

    fn recorded(n: u32) -> Replay {
        let mut replay = Replay::create("run.rpl", "tut1", "rider", 25.0, STATE_SIZE);
        for i in 0..n {
            replay.store_state(&state(i)).unwrap();
        }
        replay
    }

    fn sample_events() -> Vec<SceneEvent> {
        vec![
            SceneEvent::new(120, SceneEventData::SetGravity { x: 0.0, y: -5.0 }),
            SceneEvent::new(200, SceneEventData::Message { text: "hello".into() }),
            SceneEvent::new(350, SceneEventData::CameraZoom { zoom: 0.5 }),
        ]
    }

    #[test]
    fn test_chunks_fill_to_capacity() {
        let replay = recorded(STATES_PER_CHUNK as u32 + 3);
        assert_eq!(replay.chunks().len(), 2);
        assert_eq!(replay.chunks()[0].num_states, STATES_PER_CHUNK);
        assert_eq!(replay.chunks()[1].num_states, 3);
        assert_eq!(replay.num_states(), STATES_PER_CHUNK + 3);
    }

    #[test]
    fn test_wrong_state_size() {
        let mut replay = recorded(0);
        assert!(matches!(
            replay.store_state(&[1, 2, 3]),
            Err(ReplayError::StateSize { expected: 8, actual: 3 })
        ));
    }

    #[test]
    fn test_v3_round_trip() {
        let dir = tempdir().unwrap();
        let mut replay = recorded(600);
        for event in &sample_events() {
            replay.record_event(event);
        }

        let mut block = Block::new("crate");
        block.set_flags(false, true, false, true);
        for t in [0, 100, 200] {
            block.set_dynamic_position(Vector2f::new(t as f32 / 100.0, 0.0));
            replay.store_blocks(t, std::slice::from_ref(&block), &[Vector2f::ZERO], false);
        }
        replay.finish(true, 4321);
        replay.save_if_not(3, dir.path()).unwrap();

        let opened = Replay::open("run", dir.path()).unwrap();
        assert_eq!(opened.level_id(), "tut1");
        assert_eq!(opened.player_name(), "rider");
        assert_eq!(opened.frame_rate(), 25.0);
        assert_eq!(opened.state_size(), STATE_SIZE);
        assert!(opened.is_finished());
        assert_eq!(opened.finish_time(), 4321);
        assert_eq!(opened.chunks(), replay.chunks());

        let events: Vec<_> = opened.events().iter().map(|e| e.event.clone()).collect();
        assert_eq!(events, sample_events());
        assert_eq!(opened.moving_blocks(), replay.recorded_blocks());
        assert_eq!(opened.moving_blocks()[0].samples.len(), 3);
        assert_eq!(opened.digest(), Replay::open("run.rpl", dir.path()).unwrap().digest());
    }

    #[test]
    fn test_v1_round_trip() {
        let dir = tempdir().unwrap();
        let mut replay = recorded(10);
        for event in &sample_events() {
            replay.record_event(event);
        }
        replay.save_if_not(1, dir.path()).unwrap();

        let opened = Replay::open("run", dir.path()).unwrap();
        assert_eq!(opened.header().version, 1);
        assert_eq!(opened.chunks(), replay.chunks());
        assert_eq!(opened.events().len(), 3);
    }

    #[test]
    fn test_save_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut replay = recorded(5);
        replay.save_if_not(3, dir.path()).unwrap();
        let first = fs::read(dir.path().join("run.rpl")).unwrap();

        replay.store_state(&state(99)).unwrap();
        replay.save_if_not(3, dir.path()).unwrap();
        assert_eq!(replay.write_count(), 1);
        assert!(replay.is_saved());
        assert_eq!(fs::read(dir.path().join("run.rpl")).unwrap(), first);
    }

    #[test]
    fn test_invalid_save_format() {
        let dir = tempdir().unwrap();
        let mut replay = recorded(1);
        assert!(matches!(replay.save_if_not(2, dir.path()), Err(ReplayError::InvalidFormat(2))));
        assert!(!replay.is_saved());
        assert!(!dir.path().join("run.rpl").exists());
    }

    #[test]
    fn test_bad_magic_fails_first() {
        let dir = tempdir().unwrap();
        let mut replay = recorded(3);
        replay.save_if_not(3, dir.path()).unwrap();

        let path = dir.path().join("run.rpl");
        let mut bytes = fs::read(&path).unwrap();
        bytes[1..5].copy_from_slice(&[0x12, 0x34, 0x56, 0x78]);
        fs::write(&path, &bytes).unwrap();

        assert!(matches!(Replay::open("run", dir.path()), Err(ReplayError::BadEndianness(_))));
        assert!(Replay::probe_info("run", dir.path()).is_none());
    }

    #[test]
    fn test_legacy_raw_chunk() {
        let dir = tempdir().unwrap();
        let header = ReplayHeader {
            version: 1,
            level_id: "old".into(),
            player_name: "p".into(),
            frame_rate: 25.0,
            state_size: 4,
            finished: false,
            finish_time: 0,
        };
        let mut w = ByteWriter::new();
        header.write(1, &mut w).unwrap();
        w.write_i32(0);
        w.write_bool(false);
        w.write_i32(1);
        w.write_i32(2);
        w.write_bool(false);
        w.write_bytes(&[1, 2, 3, 4, 5, 6, 7, 8]);
        fs::write(dir.path().join("old.rpl"), w.as_bytes()).unwrap();

        let mut replay = Replay::open("old", dir.path()).unwrap();
        assert_eq!(replay.chunks()[0].data, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(replay.load_state(), Some(&[1u8, 2, 3, 4][..]));
        assert_eq!(replay.load_state(), Some(&[5u8, 6, 7, 8][..]));
        assert!(replay.is_end_of_file());
    }

    #[test]
    fn test_unknown_event_kind() {
        let dir = tempdir().unwrap();
        let mut replay = recorded(1);
        replay.event_buffer_mut().write_f32(1.0);
        replay.event_buffer_mut().write_i32(40);
        replay.save_if_not(3, dir.path()).unwrap();

        assert!(matches!(
            Replay::open("run", dir.path()),
            Err(ReplayError::Events(EventError::UnknownKind(40)))
        ));
    }

    #[test]
    fn test_replay_without_chunk() {
        let dir = tempdir().unwrap();
        let mut replay = recorded(0);
        replay.save_if_not(3, dir.path()).unwrap();
        assert!(matches!(Replay::open("run", dir.path()), Err(ReplayError::NoChunk)));
    }

    #[test]
    fn test_missing_replay() {
        let dir = tempdir().unwrap();
        assert!(matches!(Replay::open("nothing", dir.path()), Err(ReplayError::NotFound(_))));
    }

    #[test]
    fn test_probe_and_delete() {
        let dir = tempdir().unwrap();
        let mut replay = recorded(2);
        replay.save_if_not(3, dir.path()).unwrap();

        let info = Replay::probe_info("run", dir.path()).unwrap();
        assert_eq!(info.player, "rider");
        assert_eq!(info.level_id, "tut1");
        assert!(!info.is_finished);
        assert_eq!(info.finish_time, -1);

        Replay::delete("run", dir.path()).unwrap();
        assert!(Replay::probe_info("run", dir.path()).is_none());
    }

    #[test]
    fn test_cursor_crosses_chunks() {
        let mut replay = recorded(STATES_PER_CHUNK as u32 + 10);
        assert_eq!(replay.current_frame(), 1);

        assert!(replay.next_state(STATES_PER_CHUNK as i32 + 2));
        assert_eq!(replay.position().chunk, 1);
        assert_eq!(replay.position().state, 2);
        assert_eq!(replay.current_frame(), STATES_PER_CHUNK as i32 + 3);
        assert_eq!(replay.peek_state(), Some(&state(STATES_PER_CHUNK as u32 + 2)[..]));

        assert!(replay.next_state(-5));
        assert_eq!(replay.position().chunk, 0);
        assert_eq!(replay.position().state, STATES_PER_CHUNK as i32 - 3);

        assert!(replay.next_state(-10_000));
        assert_eq!(replay.current_frame(), 1);

        assert!(!replay.next_state(10_000));
        assert_eq!(replay.current_frame(), STATES_PER_CHUNK as i32 + 10);
    }

    #[test]
    fn test_load_state_reaches_end() {
        let mut replay = recorded(3);
        let loaded: Vec<Vec<u8>> = (0..5).filter_map(|_| replay.load_state().map(<[u8]>::to_vec)).collect();
        assert_eq!(loaded, vec![state(0), state(1), state(2), state(2), state(2)]);
        assert!(replay.is_end_of_file());

        let saved = replay.position();
        replay.reinitialize();
        assert_eq!(replay.current_frame(), 1);
        assert!(!replay.is_end_of_file());
        replay.rewind_to(saved);
        assert!(replay.is_end_of_file());
    }

    #[test]
    fn test_fast_forward_and_rewind() {
        let mut replay = recorded(100);
        // 25 states per second: 2 s is 50 states
        assert!(replay.fast_forward(200));
        assert_eq!(replay.current_frame(), 51);
        assert!(replay.fast_rewind(4, 10));
        assert_eq!(replay.current_frame(), 41);
        assert!(replay.fast_rewind(100, 10));
        assert_eq!(replay.current_frame(), 16);
        assert!(!replay.fast_forward(100_000));
    }

    #[test]
    fn test_reinitialize_resets_events() {
        let dir = tempdir().unwrap();
        let mut replay = recorded(1);
        for event in &sample_events() {
            replay.record_event(event);
        }
        replay.save_if_not(3, dir.path()).unwrap();

        let mut opened = Replay::open("run", dir.path()).unwrap();
        opened.events_mut()[0].passed = true;
        opened.reinitialize();
        assert!(opened.events().iter().all(|e| !e.passed));
    }

    #[test]
    fn test_automatic_name_shape() {
        let name = Replay::automatic_name();
        assert_eq!(name.len(), 14);
        assert_eq!(&name[2..3], "-");
        assert_eq!(&name[8..9], " ");
        assert_eq!(&name[11..12], "_");
    }
}
