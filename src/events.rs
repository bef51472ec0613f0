//! Scene Events
//!
//! Timestamped mutation requests applied to a [`Scene`]. Level scripts and
//! collision responses create them live; replay playback rebuilds the same
//! list from the recorded stream and applies it identically.
//!
//! The numeric kind of each event is part of the replay format and never
//! changes. Each record is `[time: f32][kind: i32][payload]`; the stream has
//! no count and ends with the buffer. A few kinds (player deaths, wins,
//! zone and touch notifications) are never written: they are replayed
//! through their consequences instead.

use std::fmt;

use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::warn;

use crate::core::buffer::{BufferError, ByteReader, ByteWriter};
use crate::core::time::{float_to_time, time_to_float};
use crate::core::vec2::Vector2f;
use crate::scene::entity::EntitySpeciality;
use crate::scene::motion::ScriptMotion;
use crate::scene::{ArrowPointer, Scene, SceneNotification};

/// Event decoding errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Kind outside the known set.
    #[error("Can't unserialize ! (event of type {0})")]
    UnknownKind(i32),

    /// Entity-destroyed payload with a speciality no pickup can have.
    #[error("Invalid entity type ({0})")]
    InvalidEntityType(i32),

    /// Truncated or malformed payload.
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Stable event kind numbers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i32)]
pub enum GameEventType {
    /// Every player dies (legacy)
    PlayersDie = 0,
    /// Every player enters a zone (legacy)
    PlayersEnterZone = 1,
    /// Every player leaves a zone (legacy)
    PlayersLeaveZone = 2,
    /// Every player touches an entity (legacy)
    PlayersToucheEntity = 3,
    /// An entity is taken or destroyed
    EntityDestroyed = 4,
    /// Clear the game messages
    ClearMessages = 5,
    /// Arrow in world coordinates
    PlaceInGameArrow = 6,
    /// Arrow in screen coordinates
    PlaceScreenArrow = 7,
    /// Hide the arrow
    HideArrow = 8,
    /// Display a message
    Message = 9,
    /// Translate a block
    MoveBlock = 10,
    /// Place a block
    SetBlockPos = 11,
    /// Change gravity
    SetGravity = 12,
    /// Teleport every player (legacy)
    SetPlayersPosition = 13,
    /// Place an entity
    SetEntityPos = 14,
    /// Change a block's rotation center
    SetBlockCenter = 15,
    /// Rotate a block
    SetBlockRotation = 16,
    /// Attach a circular motion to an entity
    SetDynamicEntityRotation = 17,
    /// Attach a translation to an entity
    SetDynamicEntityTranslation = 18,
    /// Detach an entity's motions
    SetDynamicEntityNone = 19,
    /// Relative camera zoom
    CameraZoom = 20,
    /// Relative camera move
    CameraMove = 21,
    /// Attach a circular motion to a block
    SetDynamicBlockRotation = 22,
    /// Attach a translation to a block
    SetDynamicBlockTranslation = 23,
    /// Detach a block's motions
    SetDynamicBlockNone = 24,
    /// Add penalty time
    PenaltyTime = 25,
    /// One player dies
    PlayerDies = 26,
    /// One player enters a zone
    PlayerEntersZone = 27,
    /// One player leaves a zone
    PlayerLeavesZone = 28,
    /// One player touches an entity
    PlayerTouchesEntity = 29,
    /// Teleport one player
    SetPlayerPosition = 30,
    /// Attach a spin to a block
    SetDynamicBlockSelfRotation = 31,
    /// Attach a spin to an entity
    SetDynamicEntitySelfRotation = 32,
    /// Rotate the camera
    CameraRotate = 33,
    /// Align the camera with gravity
    CameraAdaptToGravity = 34,
    /// Push a player
    AddForceToPlayer = 35,
    /// Camera rotation speed
    SetCameraRotationSpeed = 36,
    /// Play a sample
    PlaySound = 37,
    /// Play a music track
    PlayMusic = 38,
    /// Stop the music
    StopMusic = 39,
    /// Torque a physics block
    SetPhysicsBlockSelfRotation = 41,
    /// Push a physics block back and forth
    SetPhysicsBlockTranslation = 42,
    /// Absolute camera position
    CameraSetPos = 43,
    /// One player wins
    PlayerWins = 44,
}

impl GameEventType {
    /// Stored kind number.
    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// Kinds a replay stream may contain.
    pub fn from_code(code: i32) -> Option<Self> {
        use GameEventType::*;
        Some(match code {
            0 => PlayersDie,
            1 => PlayersEnterZone,
            2 => PlayersLeaveZone,
            3 => PlayersToucheEntity,
            4 => EntityDestroyed,
            5 => ClearMessages,
            6 => PlaceInGameArrow,
            7 => PlaceScreenArrow,
            8 => HideArrow,
            9 => Message,
            10 => MoveBlock,
            11 => SetBlockPos,
            12 => SetGravity,
            13 => SetPlayersPosition,
            14 => SetEntityPos,
            15 => SetBlockCenter,
            16 => SetBlockRotation,
            17 => SetDynamicEntityRotation,
            18 => SetDynamicEntityTranslation,
            19 => SetDynamicEntityNone,
            20 => CameraZoom,
            21 => CameraMove,
            22 => SetDynamicBlockRotation,
            23 => SetDynamicBlockTranslation,
            24 => SetDynamicBlockNone,
            25 => PenaltyTime,
            26 => PlayerDies,
            27 => PlayerEntersZone,
            28 => PlayerLeavesZone,
            29 => PlayerTouchesEntity,
            30 => SetPlayerPosition,
            31 => SetDynamicBlockSelfRotation,
            32 => SetDynamicEntitySelfRotation,
            33 => CameraRotate,
            34 => CameraAdaptToGravity,
            35 => AddForceToPlayer,
            36 => SetCameraRotationSpeed,
            37 => PlaySound,
            38 => PlayMusic,
            39 => StopMusic,
            41 => SetPhysicsBlockSelfRotation,
            42 => SetPhysicsBlockTranslation,
            43 => CameraSetPos,
            _ => return None,
        })
    }

    /// Kinds that never reach the replay stream.
    pub fn is_transient(&self) -> bool {
        use GameEventType::*;
        matches!(
            self,
            PlayersDie
                | PlayersEnterZone
                | PlayersLeaveZone
                | PlayersToucheEntity
                | PlayerDies
                | PlayerEntersZone
                | PlayerLeavesZone
                | PlayerTouchesEntity
                | PlayerWins
        )
    }
}

/// Event payload.
#[derive(Clone, Debug, PartialEq)]
pub enum SceneEventData {
    /// Every player dies
    PlayersDie { killed_by_wrecker: bool },
    /// Every player enters a zone
    PlayersEnterZone { zone_id: String },
    /// Every player leaves a zone
    PlayersLeaveZone { zone_id: String },
    /// Every player touches an entity
    PlayersToucheEntity { entity_id: String, touched_with_head: bool },
    /// An entity is taken or destroyed
    EntityDestroyed {
        entity_id: String,
        speciality: EntitySpeciality,
        position: Vector2f,
        size: f32,
        /// Player index, -1 when destroyed by a script
        taken_by_player: i32,
    },
    /// Clear the game messages
    ClearMessages,
    /// Arrow in world coordinates
    PlaceInGameArrow { x: f32, y: f32, angle: f32 },
    /// Arrow in screen coordinates
    PlaceScreenArrow { x: f32, y: f32, angle: f32 },
    /// Hide the arrow
    HideArrow,
    /// Display a message
    Message { text: String },
    /// Translate a block
    MoveBlock { block_id: String, x: f32, y: f32 },
    /// Place a block by its center
    SetBlockPos { block_id: String, x: f32, y: f32 },
    /// Change gravity
    SetGravity { x: f32, y: f32 },
    /// Teleport every player
    SetPlayersPosition { x: f32, y: f32, facing_right: bool },
    /// Place an entity
    SetEntityPos { entity_id: String, x: f32, y: f32 },
    /// Change a block's rotation center
    SetBlockCenter { block_id: String, x: f32, y: f32 },
    /// Rotate a block
    SetBlockRotation { block_id: String, angle: f32 },
    /// Attach a circular motion to an entity
    SetDynamicEntityRotation { entity_id: String, init_angle: f32, radius: f32, period: i32, start_time: i32, end_time: i32 },
    /// Attach a translation to an entity
    SetDynamicEntityTranslation { entity_id: String, x: f32, y: f32, period: i32, start_time: i32, end_time: i32 },
    /// Detach an entity's motions
    SetDynamicEntityNone { entity_id: String },
    /// Relative camera zoom
    CameraZoom { zoom: f32 },
    /// Relative camera move
    CameraMove { x: f32, y: f32 },
    /// Attach a circular motion to a block
    SetDynamicBlockRotation { block_id: String, init_angle: f32, radius: f32, period: i32, start_time: i32, end_time: i32 },
    /// Attach a translation to a block
    SetDynamicBlockTranslation { block_id: String, x: f32, y: f32, period: i32, start_time: i32, end_time: i32 },
    /// Detach a block's motions
    SetDynamicBlockNone { block_id: String },
    /// Add penalty time (centiseconds)
    PenaltyTime { penalty: i32 },
    /// One player dies
    PlayerDies { killed_by_wrecker: bool, player: i32 },
    /// One player enters a zone
    PlayerEntersZone { zone_id: String, player: i32 },
    /// One player leaves a zone
    PlayerLeavesZone { zone_id: String, player: i32 },
    /// One player touches an entity
    PlayerTouchesEntity { entity_id: String, touched_with_head: bool, player: i32 },
    /// Teleport one player
    SetPlayerPosition { x: f32, y: f32, facing_right: bool, player: i32 },
    /// Attach a spin to a block
    SetDynamicBlockSelfRotation { block_id: String, period: i32, start_time: i32, end_time: i32 },
    /// Attach a spin to an entity
    SetDynamicEntitySelfRotation { entity_id: String, period: i32, start_time: i32, end_time: i32 },
    /// Rotate the camera (radians)
    CameraRotate { angle: f32 },
    /// Align the camera with gravity
    CameraAdaptToGravity,
    /// Push a player
    AddForceToPlayer { force: Vector2f, start_time: i32, end_time: i32, player: i32 },
    /// Camera rotation speed (radians)
    SetCameraRotationSpeed { speed: f32 },
    /// Play a sample
    PlaySound { name: String, volume: f32 },
    /// Play a music track
    PlayMusic { name: String },
    /// Stop the music
    StopMusic,
    /// Torque a physics block
    SetPhysicsBlockSelfRotation { block_id: String, torque: i32, start_time: i32, end_time: i32 },
    /// Push a physics block back and forth
    SetPhysicsBlockTranslation { block_id: String, x: f32, y: f32, period: i32, start_time: i32, end_time: i32 },
    /// Absolute camera position
    CameraSetPos { x: f32, y: f32 },
    /// One player wins
    PlayerWins { player: i32 },
}

/// A timestamped event.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneEvent {
    /// Scene time in centiseconds
    pub time: i32,

    /// Payload
    pub data: SceneEventData,
}

fn write_period(writer: &mut ByteWriter, period: i32) {
    writer.write_f32(time_to_float(period.wrapping_mul(100)));
}

fn read_period(reader: &mut ByteReader<'_>) -> Result<i32, BufferError> {
    Ok(float_to_time(reader.read_f32()?) / 100)
}

/// Self-rotations divide before converting.
fn read_self_rotation_period(reader: &mut ByteReader<'_>) -> Result<i32, BufferError> {
    Ok(float_to_time(reader.read_f32()? / 100.0))
}

fn valid_player(player: i32, count: usize) -> Option<usize> {
    usize::try_from(player).ok().filter(|&p| p < count)
}

impl SceneEvent {
    /// Create an event.
    pub fn new(time: i32, data: SceneEventData) -> Self {
        Self { time, data }
    }

    /// Win event, always applied after every other pending event.
    pub fn player_wins(time: i32, player: usize) -> Self {
        Self::new(time, SceneEventData::PlayerWins { player: player as i32 })
    }

    /// Death event.
    pub fn player_dies(time: i32, killed_by_wrecker: bool, player: usize) -> Self {
        Self::new(time, SceneEventData::PlayerDies { killed_by_wrecker, player: player as i32 })
    }

    /// Kind number of the payload.
    pub fn event_type(&self) -> GameEventType {
        use SceneEventData as D;
        use GameEventType as T;
        match &self.data {
            D::PlayersDie { .. } => T::PlayersDie,
            D::PlayersEnterZone { .. } => T::PlayersEnterZone,
            D::PlayersLeaveZone { .. } => T::PlayersLeaveZone,
            D::PlayersToucheEntity { .. } => T::PlayersToucheEntity,
            D::EntityDestroyed { .. } => T::EntityDestroyed,
            D::ClearMessages => T::ClearMessages,
            D::PlaceInGameArrow { .. } => T::PlaceInGameArrow,
            D::PlaceScreenArrow { .. } => T::PlaceScreenArrow,
            D::HideArrow => T::HideArrow,
            D::Message { .. } => T::Message,
            D::MoveBlock { .. } => T::MoveBlock,
            D::SetBlockPos { .. } => T::SetBlockPos,
            D::SetGravity { .. } => T::SetGravity,
            D::SetPlayersPosition { .. } => T::SetPlayersPosition,
            D::SetEntityPos { .. } => T::SetEntityPos,
            D::SetBlockCenter { .. } => T::SetBlockCenter,
            D::SetBlockRotation { .. } => T::SetBlockRotation,
            D::SetDynamicEntityRotation { .. } => T::SetDynamicEntityRotation,
            D::SetDynamicEntityTranslation { .. } => T::SetDynamicEntityTranslation,
            D::SetDynamicEntityNone { .. } => T::SetDynamicEntityNone,
            D::CameraZoom { .. } => T::CameraZoom,
            D::CameraMove { .. } => T::CameraMove,
            D::SetDynamicBlockRotation { .. } => T::SetDynamicBlockRotation,
            D::SetDynamicBlockTranslation { .. } => T::SetDynamicBlockTranslation,
            D::SetDynamicBlockNone { .. } => T::SetDynamicBlockNone,
            D::PenaltyTime { .. } => T::PenaltyTime,
            D::PlayerDies { .. } => T::PlayerDies,
            D::PlayerEntersZone { .. } => T::PlayerEntersZone,
            D::PlayerLeavesZone { .. } => T::PlayerLeavesZone,
            D::PlayerTouchesEntity { .. } => T::PlayerTouchesEntity,
            D::SetPlayerPosition { .. } => T::SetPlayerPosition,
            D::SetDynamicBlockSelfRotation { .. } => T::SetDynamicBlockSelfRotation,
            D::SetDynamicEntitySelfRotation { .. } => T::SetDynamicEntitySelfRotation,
            D::CameraRotate { .. } => T::CameraRotate,
            D::CameraAdaptToGravity => T::CameraAdaptToGravity,
            D::AddForceToPlayer { .. } => T::AddForceToPlayer,
            D::SetCameraRotationSpeed { .. } => T::SetCameraRotationSpeed,
            D::PlaySound { .. } => T::PlaySound,
            D::PlayMusic { .. } => T::PlayMusic,
            D::StopMusic => T::StopMusic,
            D::SetPhysicsBlockSelfRotation { .. } => T::SetPhysicsBlockSelfRotation,
            D::SetPhysicsBlockTranslation { .. } => T::SetPhysicsBlockTranslation,
            D::CameraSetPos { .. } => T::CameraSetPos,
            D::PlayerWins { .. } => T::PlayerWins,
        }
    }

    // =========================================================================
    // Stream encoding
    // =========================================================================

    /// Append the record to `writer`. Transient kinds write nothing.
    pub fn serialize(&self, writer: &mut ByteWriter) {
        let kind = self.event_type();
        if kind.is_transient() {
            return;
        }
        writer.write_f32(time_to_float(self.time));
        writer.write_i32(kind.code());

        use SceneEventData as D;
        match &self.data {
            D::EntityDestroyed { entity_id, speciality, position, size, .. } => {
                writer.write_string(entity_id);
                writer.write_i32(speciality.code());
                writer.write_f32(*size);
                writer.write_f32(position.x);
                writer.write_f32(position.y);
            }
            D::PlaceInGameArrow { x, y, angle } | D::PlaceScreenArrow { x, y, angle } => {
                writer.write_f32(*x);
                writer.write_f32(*y);
                writer.write_f32(*angle);
            }
            D::Message { text } | D::PlayMusic { name: text } => writer.write_string(text),
            D::MoveBlock { block_id: id, x, y }
            | D::SetBlockPos { block_id: id, x, y }
            | D::SetEntityPos { entity_id: id, x, y }
            | D::SetBlockCenter { block_id: id, x, y } => {
                writer.write_string(id);
                writer.write_f32(*x);
                writer.write_f32(*y);
            }
            D::SetGravity { x, y } | D::CameraMove { x, y } | D::CameraSetPos { x, y } => {
                writer.write_f32(*x);
                writer.write_f32(*y);
            }
            D::SetPlayersPosition { x, y, facing_right } => {
                writer.write_f32(*x);
                writer.write_f32(*y);
                writer.write_bool(*facing_right);
            }
            D::SetBlockRotation { block_id, angle } => {
                writer.write_string(block_id);
                writer.write_f32(*angle);
            }
            D::SetDynamicEntityRotation { entity_id: id, init_angle, radius, period, start_time, end_time }
            | D::SetDynamicBlockRotation { block_id: id, init_angle, radius, period, start_time, end_time } => {
                writer.write_string(id);
                writer.write_f32(*init_angle);
                writer.write_f32(*radius);
                write_period(writer, *period);
                writer.write_i32(*start_time);
                writer.write_i32(*end_time);
            }
            D::SetDynamicEntityTranslation { entity_id: id, x, y, period, start_time, end_time }
            | D::SetDynamicBlockTranslation { block_id: id, x, y, period, start_time, end_time }
            | D::SetPhysicsBlockTranslation { block_id: id, x, y, period, start_time, end_time } => {
                writer.write_string(id);
                writer.write_f32(*x);
                writer.write_f32(*y);
                write_period(writer, *period);
                writer.write_i32(*start_time);
                writer.write_i32(*end_time);
            }
            D::SetDynamicEntityNone { entity_id: id } | D::SetDynamicBlockNone { block_id: id } => {
                writer.write_string(id);
            }
            D::CameraZoom { zoom: v } | D::CameraRotate { angle: v } | D::SetCameraRotationSpeed { speed: v } => {
                writer.write_f32(*v);
            }
            D::PenaltyTime { penalty } => writer.write_f32(time_to_float(*penalty)),
            D::SetPlayerPosition { x, y, facing_right, player } => {
                writer.write_f32(*x);
                writer.write_f32(*y);
                writer.write_bool(*facing_right);
                writer.write_i32(*player);
            }
            D::SetDynamicBlockSelfRotation { block_id: id, period, start_time, end_time }
            | D::SetDynamicEntitySelfRotation { entity_id: id, period, start_time, end_time } => {
                writer.write_string(id);
                write_period(writer, *period);
                writer.write_i32(*start_time);
                writer.write_i32(*end_time);
            }
            D::AddForceToPlayer { force, start_time, end_time, player } => {
                writer.write_f32(force.x);
                writer.write_f32(force.y);
                writer.write_i32(*start_time);
                writer.write_i32(*end_time);
                writer.write_i32(*player);
            }
            D::PlaySound { name, volume } => {
                writer.write_string(name);
                writer.write_f32(*volume);
            }
            D::SetPhysicsBlockSelfRotation { block_id, torque, start_time, end_time } => {
                writer.write_string(block_id);
                writer.write_i32(*torque);
                writer.write_i32(*start_time);
                writer.write_i32(*end_time);
            }
            D::ClearMessages | D::HideArrow | D::CameraAdaptToGravity | D::StopMusic => {}
            D::PlayersDie { .. }
            | D::PlayersEnterZone { .. }
            | D::PlayersLeaveZone { .. }
            | D::PlayersToucheEntity { .. }
            | D::PlayerDies { .. }
            | D::PlayerEntersZone { .. }
            | D::PlayerLeavesZone { .. }
            | D::PlayerTouchesEntity { .. }
            | D::PlayerWins { .. } => {}
        }
    }

    /// Read one record.
    pub fn unserialize(reader: &mut ByteReader<'_>) -> Result<Self, EventError> {
        let time = float_to_time(reader.read_f32()?);
        let code = reader.read_i32()?;
        let kind = GameEventType::from_code(code).ok_or(EventError::UnknownKind(code))?;

        use GameEventType as T;
        use SceneEventData as D;
        let r = reader;
        let data = match kind {
            T::PlayersDie => D::PlayersDie { killed_by_wrecker: false },
            T::PlayersEnterZone => D::PlayersEnterZone { zone_id: String::new() },
            T::PlayersLeaveZone => D::PlayersLeaveZone { zone_id: String::new() },
            T::PlayersToucheEntity => D::PlayersToucheEntity { entity_id: String::new(), touched_with_head: false },
            T::PlayerDies => D::PlayerDies { killed_by_wrecker: false, player: 0 },
            T::PlayerEntersZone => D::PlayerEntersZone { zone_id: String::new(), player: 0 },
            T::PlayerLeavesZone => D::PlayerLeavesZone { zone_id: String::new(), player: 0 },
            T::PlayerTouchesEntity => {
                D::PlayerTouchesEntity { entity_id: String::new(), touched_with_head: false, player: 0 }
            }
            T::PlayerWins => D::PlayerWins { player: 0 },
            T::EntityDestroyed => {
                let entity_id = r.read_string()?;
                let code = r.read_i32()?;
                let speciality = EntitySpeciality::from_code(code)
                    .filter(|s| s.code() <= EntitySpeciality::ParticlesSource.code())
                    .ok_or(EventError::InvalidEntityType(code))?;
                let size = r.read_f32()?;
                let x = r.read_f32()?;
                let y = r.read_f32()?;
                D::EntityDestroyed { entity_id, speciality, position: Vector2f::new(x, y), size, taken_by_player: -1 }
            }
            T::ClearMessages => D::ClearMessages,
            T::PlaceInGameArrow => D::PlaceInGameArrow { x: r.read_f32()?, y: r.read_f32()?, angle: r.read_f32()? },
            T::PlaceScreenArrow => D::PlaceScreenArrow { x: r.read_f32()?, y: r.read_f32()?, angle: r.read_f32()? },
            T::HideArrow => D::HideArrow,
            T::Message => D::Message { text: r.read_string()? },
            T::MoveBlock => D::MoveBlock { block_id: r.read_string()?, x: r.read_f32()?, y: r.read_f32()? },
            T::SetBlockPos => D::SetBlockPos { block_id: r.read_string()?, x: r.read_f32()?, y: r.read_f32()? },
            T::SetGravity => D::SetGravity { x: r.read_f32()?, y: r.read_f32()? },
            T::SetPlayersPosition => {
                D::SetPlayersPosition { x: r.read_f32()?, y: r.read_f32()?, facing_right: r.read_bool()? }
            }
            T::SetEntityPos => D::SetEntityPos { entity_id: r.read_string()?, x: r.read_f32()?, y: r.read_f32()? },
            T::SetBlockCenter => D::SetBlockCenter { block_id: r.read_string()?, x: r.read_f32()?, y: r.read_f32()? },
            T::SetBlockRotation => D::SetBlockRotation { block_id: r.read_string()?, angle: r.read_f32()? },
            T::SetDynamicEntityRotation => D::SetDynamicEntityRotation {
                entity_id: r.read_string()?,
                init_angle: r.read_f32()?,
                radius: r.read_f32()?,
                period: read_period(r)?,
                start_time: r.read_i32()?,
                end_time: r.read_i32()?,
            },
            T::SetDynamicEntityTranslation => D::SetDynamicEntityTranslation {
                entity_id: r.read_string()?,
                x: r.read_f32()?,
                y: r.read_f32()?,
                period: read_period(r)?,
                start_time: r.read_i32()?,
                end_time: r.read_i32()?,
            },
            T::SetDynamicEntityNone => D::SetDynamicEntityNone { entity_id: r.read_string()? },
            T::CameraZoom => D::CameraZoom { zoom: r.read_f32()? },
            T::CameraMove => D::CameraMove { x: r.read_f32()?, y: r.read_f32()? },
            T::SetDynamicBlockRotation => D::SetDynamicBlockRotation {
                block_id: r.read_string()?,
                init_angle: r.read_f32()?,
                radius: r.read_f32()?,
                period: read_period(r)?,
                start_time: r.read_i32()?,
                end_time: r.read_i32()?,
            },
            T::SetDynamicBlockTranslation => D::SetDynamicBlockTranslation {
                block_id: r.read_string()?,
                x: r.read_f32()?,
                y: r.read_f32()?,
                period: read_period(r)?,
                start_time: r.read_i32()?,
                end_time: r.read_i32()?,
            },
            T::SetDynamicBlockNone => D::SetDynamicBlockNone { block_id: r.read_string()? },
            T::PenaltyTime => D::PenaltyTime { penalty: float_to_time(r.read_f32()?) },
            T::SetPlayerPosition => D::SetPlayerPosition {
                x: r.read_f32()?,
                y: r.read_f32()?,
                facing_right: r.read_bool()?,
                player: r.read_i32()?,
            },
            T::SetDynamicBlockSelfRotation => D::SetDynamicBlockSelfRotation {
                block_id: r.read_string()?,
                period: read_self_rotation_period(r)?,
                start_time: r.read_i32()?,
                end_time: r.read_i32()?,
            },
            T::SetDynamicEntitySelfRotation => D::SetDynamicEntitySelfRotation {
                entity_id: r.read_string()?,
                period: read_self_rotation_period(r)?,
                start_time: r.read_i32()?,
                end_time: r.read_i32()?,
            },
            T::CameraRotate => D::CameraRotate { angle: r.read_f32()? },
            T::CameraAdaptToGravity => D::CameraAdaptToGravity,
            T::AddForceToPlayer => {
                let x = r.read_f32()?;
                let y = r.read_f32()?;
                D::AddForceToPlayer {
                    force: Vector2f::new(x, y),
                    start_time: r.read_i32()?,
                    end_time: r.read_i32()?,
                    player: r.read_i32()?,
                }
            }
            T::SetCameraRotationSpeed => D::SetCameraRotationSpeed { speed: r.read_f32()? },
            T::PlaySound => D::PlaySound { name: r.read_string()?, volume: r.read_f32()? },
            T::PlayMusic => D::PlayMusic { name: r.read_string()? },
            T::StopMusic => D::StopMusic,
            T::SetPhysicsBlockSelfRotation => D::SetPhysicsBlockSelfRotation {
                block_id: r.read_string()?,
                torque: r.read_i32()?,
                start_time: r.read_i32()?,
                end_time: r.read_i32()?,
            },
            T::SetPhysicsBlockTranslation => D::SetPhysicsBlockTranslation {
                block_id: r.read_string()?,
                x: r.read_f32()?,
                y: r.read_f32()?,
                period: read_period(r)?,
                start_time: r.read_i32()?,
                end_time: r.read_i32()?,
            },
            T::CameraSetPos => D::CameraSetPos { x: r.read_f32()?, y: r.read_f32()? },
        };
        Ok(Self { time, data })
    }

    // =========================================================================
    // Scene effects
    // =========================================================================

    /// Apply the event to `scene`.
    pub fn do_action(&self, scene: &mut Scene) {
        use SceneEventData as D;
        let players = scene.players().len();
        match &self.data {
            D::PlayersDie { .. } => (0..players).for_each(|p| scene.kill_player(p)),
            D::PlayerDies { player, .. } => {
                if let Some(p) = valid_player(*player, players) {
                    scene.kill_player(p);
                }
            }
            D::PlayerWins { player } => {
                if let Some(p) = valid_player(*player, players) {
                    scene.make_player_win(p);
                }
            }
            D::PlayersEnterZone { zone_id } => (0..players).for_each(|p| scene.player_enters_zone(p, zone_id)),
            D::PlayerEntersZone { zone_id, player } => {
                if let Some(p) = valid_player(*player, players) {
                    scene.player_enters_zone(p, zone_id);
                }
            }
            D::PlayersLeaveZone { zone_id } => (0..players).for_each(|p| scene.player_leaves_zone(p, zone_id)),
            D::PlayerLeavesZone { zone_id, player } => {
                if let Some(p) = valid_player(*player, players) {
                    scene.player_leaves_zone(p, zone_id);
                }
            }
            D::PlayersToucheEntity { entity_id, touched_with_head } => {
                (0..players).for_each(|p| scene.player_touches_entity(p, entity_id, *touched_with_head))
            }
            D::PlayerTouchesEntity { entity_id, touched_with_head, player } => {
                if let Some(p) = valid_player(*player, players) {
                    scene.player_touches_entity(p, entity_id, *touched_with_head);
                }
            }
            D::EntityDestroyed { entity_id, taken_by_player, .. } => {
                scene.entity_destroyed(entity_id, self.time, *taken_by_player)
            }
            D::ClearMessages => scene.notify(SceneNotification::ClearMessages),
            D::PlaceInGameArrow { x, y, angle } => {
                scene.set_arrow(ArrowPointer::InGame { position: Vector2f::new(*x, *y), angle: *angle })
            }
            D::PlaceScreenArrow { x, y, angle } => {
                scene.set_arrow(ArrowPointer::Screen { position: Vector2f::new(*x, *y), angle: *angle })
            }
            D::HideArrow => scene.set_arrow(ArrowPointer::Hidden),
            D::Message { text } => scene.notify(SceneNotification::Message(text.clone())),
            D::MoveBlock { block_id, x, y } => scene.move_block(block_id, *x, *y),
            D::SetBlockPos { block_id, x, y } => scene.set_block_pos(block_id, *x, *y),
            D::SetGravity { x, y } => scene.set_gravity(Vector2f::new(*x, *y)),
            D::SetPlayersPosition { x, y, facing_right } => {
                (0..players).for_each(|p| scene.set_player_position(p, Vector2f::new(*x, *y), *facing_right))
            }
            D::SetPlayerPosition { x, y, facing_right, player } => {
                if let Some(p) = valid_player(*player, players) {
                    scene.set_player_position(p, Vector2f::new(*x, *y), *facing_right);
                }
            }
            D::SetEntityPos { entity_id, x, y } => scene.set_entity_pos(entity_id, *x, *y),
            D::SetBlockCenter { block_id, x, y } => scene.set_block_center(block_id, *x, *y),
            D::SetBlockRotation { block_id, angle } => scene.set_block_rotation(block_id, *angle),
            D::SetDynamicEntityRotation { entity_id, init_angle, radius, period, start_time, end_time } => scene
                .add_motion(ScriptMotion::entity_rotation(
                    entity_id.clone(),
                    *init_angle,
                    *radius,
                    *period,
                    *start_time,
                    *end_time,
                )),
            D::SetDynamicEntityTranslation { entity_id, x, y, period, start_time, end_time } => scene.add_motion(
                ScriptMotion::entity_translation(entity_id.clone(), *x, *y, *period, *start_time, *end_time),
            ),
            D::SetDynamicEntitySelfRotation { entity_id, period, start_time, end_time } => scene.add_motion(
                ScriptMotion::entity_self_rotation(entity_id.clone(), *period, *start_time, *end_time),
            ),
            D::SetDynamicBlockRotation { block_id, init_angle, radius, period, start_time, end_time } => scene
                .add_motion(ScriptMotion::block_rotation(
                    block_id.clone(),
                    *init_angle,
                    *radius,
                    *period,
                    *start_time,
                    *end_time,
                )),
            D::SetDynamicBlockTranslation { block_id, x, y, period, start_time, end_time } => scene.add_motion(
                ScriptMotion::block_translation(block_id.clone(), *x, *y, *period, *start_time, *end_time),
            ),
            D::SetDynamicBlockSelfRotation { block_id, period, start_time, end_time } => scene
                .add_motion(ScriptMotion::block_self_rotation(block_id.clone(), *period, *start_time, *end_time)),
            D::SetPhysicsBlockSelfRotation { block_id, torque, start_time, end_time } => scene
                .add_motion(ScriptMotion::physics_self_rotation(block_id.clone(), *torque, *start_time, *end_time)),
            D::SetPhysicsBlockTranslation { block_id, x, y, period, start_time, end_time } => scene.add_motion(
                ScriptMotion::physics_translation(block_id.clone(), *x, *y, *period, *start_time, *end_time),
            ),
            D::SetDynamicEntityNone { entity_id: id } | D::SetDynamicBlockNone { block_id: id } => {
                scene.remove_motions_of(id)
            }
            D::CameraZoom { zoom } => scene.cameras_mut().iter_mut().for_each(|c| c.zoom_by(*zoom)),
            D::CameraMove { x, y } => scene.cameras_mut().iter_mut().for_each(|c| c.move_by(*x, *y)),
            D::CameraSetPos { x, y } => scene.cameras_mut().iter_mut().for_each(|c| c.set_position(*x, *y)),
            D::CameraRotate { angle } => scene.cameras_mut().iter_mut().for_each(|c| c.set_desired_rotation(*angle)),
            D::CameraAdaptToGravity => {
                let gravity = scene.gravity();
                scene.cameras_mut().iter_mut().for_each(|c| c.adapt_rotation_to_gravity(gravity))
            }
            D::SetCameraRotationSpeed { speed } => {
                scene.cameras_mut().iter_mut().for_each(|c| c.set_rotation_speed(*speed))
            }
            D::PenaltyTime { penalty } => scene.add_penalty_time(*penalty),
            D::AddForceToPlayer { force, start_time, end_time, player } => {
                if let Some(p) = valid_player(*player, players) {
                    scene.add_force_to_player(p, *force, *start_time, *end_time);
                }
            }
            D::PlaySound { name, volume } => {
                scene.notify(SceneNotification::PlaySound { name: name.clone(), volume: *volume })
            }
            D::PlayMusic { name } => scene.notify(SceneNotification::PlayMusic(name.clone())),
            D::StopMusic => scene.notify(SceneNotification::StopMusic),
        }
    }

    /// Undo the event when rewinding past it.
    pub fn revert(&self, scene: &mut Scene) {
        if let SceneEventData::EntityDestroyed { entity_id, .. } = &self.data {
            if let Err(e) = scene.revert_entity_destroyed(entity_id) {
                warn!(entity = %entity_id, error = %e, "Unable to revert entity destruction");
            }
        }
    }
}

impl fmt::Display for SceneEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SceneEventData as D;
        match &self.data {
            D::PlayersDie { .. } => write!(f, "Players die"),
            D::PlayerDies { player, .. } => write!(f, "Player {player} dies"),
            D::PlayerWins { player } => write!(f, "Player {player} wins"),
            D::PlayersEnterZone { zone_id } => write!(f, "Players enter on zone {zone_id}"),
            D::PlayerEntersZone { zone_id, player } => write!(f, "Player {player} enter on zone {zone_id}"),
            D::PlayersLeaveZone { zone_id } => write!(f, "Players leave the zone {zone_id}"),
            D::PlayerLeavesZone { zone_id, player } => write!(f, "Player {player} leaves the zone {zone_id}"),
            D::PlayersToucheEntity { entity_id, .. } => write!(f, "Players touche entity {entity_id}"),
            D::PlayerTouchesEntity { entity_id, player, .. } => write!(f, "Player {player} touches entity {entity_id}"),
            D::EntityDestroyed { entity_id, .. } => write!(f, "Player destroys entity {entity_id}"),
            D::ClearMessages => write!(f, "Messages are cleared"),
            D::PlaceInGameArrow { .. } => write!(f, "Place in game arrow"),
            D::PlaceScreenArrow { .. } => write!(f, "Place screen arrow"),
            D::HideArrow => write!(f, "Hide arrow"),
            D::Message { text } => write!(f, "Display message '{text}'"),
            D::MoveBlock { block_id, .. } => write!(f, "Block {block_id} is moved"),
            D::SetBlockPos { block_id, .. } => write!(f, "Block {block_id}'s position is changed"),
            D::SetGravity { .. } => write!(f, "Gravity is changed"),
            D::SetPlayersPosition { .. } => write!(f, "Teleportation of the players"),
            D::SetPlayerPosition { player, .. } => write!(f, "Teleportation of the player {player}"),
            D::SetEntityPos { entity_id, .. } => write!(f, "Entity {entity_id}'s position is changed"),
            D::SetBlockCenter { block_id, .. } => write!(f, "Block {block_id}'s center is changed"),
            D::SetBlockRotation { block_id, .. } => write!(f, "Block {block_id}'s rotation is changed"),
            D::SetDynamicEntityRotation { entity_id, .. } => write!(f, "Dynamic rotation is set for entity {entity_id}"),
            D::SetDynamicEntityTranslation { entity_id, .. } => {
                write!(f, "Dynamic translation is set for entity {entity_id}")
            }
            D::SetDynamicEntityNone { entity_id } => write!(f, "Remove dynamic for entity {entity_id}"),
            D::SetDynamicBlockRotation { block_id, .. } => write!(f, "Dynamic rotation is set for block {block_id}"),
            D::SetDynamicBlockTranslation { block_id, .. } => {
                write!(f, "Dynamic translation is set for block {block_id}")
            }
            D::SetDynamicBlockNone { block_id } => write!(f, "Remove dynamic for block {block_id}"),
            D::CameraMove { .. } => write!(f, "Camera moves"),
            D::CameraSetPos { .. } => write!(f, "Camera position is set"),
            D::CameraZoom { .. } => write!(f, "Camera zoom is changed"),
            D::PenaltyTime { .. } => write!(f, "Time penalty"),
            D::SetDynamicBlockSelfRotation { block_id, .. } => {
                write!(f, "Dynamic self rotation is set for block {block_id}")
            }
            D::SetDynamicEntitySelfRotation { entity_id, .. } => {
                write!(f, "Dynamic self rotation is set for entity {entity_id}")
            }
            D::SetPhysicsBlockSelfRotation { block_id, .. } => {
                write!(f, "Physic self rotation is set for block {block_id}")
            }
            D::SetPhysicsBlockTranslation { block_id, .. } => write!(f, "Physic translation is set for block {block_id}"),
            D::CameraRotate { .. } => write!(f, "Camera rotates"),
            D::CameraAdaptToGravity => write!(f, "Camera is adapted to the gravity"),
            D::AddForceToPlayer { player, .. } => write!(f, "Add force to the player {player}"),
            D::SetCameraRotationSpeed { .. } => write!(f, "Camera Rotate set to desired Speed"),
            D::PlaySound { .. } => write!(f, "Audio played"),
            D::PlayMusic { .. } => write!(f, "Music played"),
            D::StopMusic => write!(f, "Music stopped"),
        }
    }
}

/// Event of a replay together with its playback state.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedEvent {
    /// The event
    pub event: SceneEvent,
    /// Applied at the current playback time
    pub passed: bool,
}

impl RecordedEvent {
    /// Not yet applied.
    pub fn new(event: SceneEvent) -> Self {
        Self { event, passed: false }
    }
}

/// Decode a whole event stream.
pub fn read_event_stream(bytes: &[u8]) -> Result<Vec<SceneEvent>, EventError> {
    let mut reader = ByteReader::new(bytes);
    let mut events = Vec::new();
    while reader.remaining() > 0 {
        events.push(SceneEvent::unserialize(&mut reader)?);
    }
    Ok(events)
}

/// Encode events back-to-back.
pub fn write_event_stream<'a>(events: impl IntoIterator<Item = &'a SceneEvent>, writer: &mut ByteWriter) {
    for event in events {
        event.serialize(writer);
    }
}

// =============================================================================
// TESTS
// =============================================================================
