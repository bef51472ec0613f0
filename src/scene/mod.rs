//! Scene
//!
//! The live simulation around a loaded level: players, cameras, gravity,
//! the scene clock, the event queue, script motions and the deferred
//! entity deletions.
//!
//! The bike physics itself is external. Players carry the contact points
//! and the serialized bike state the physics layer hands over each tick;
//! the scene turns contacts into events and records the states into a
//! replay.
//!
//! ```text
//! update(step)
//!   ├─ level particles (every other call)
//!   ├─ clock, entity contacts, script motions (per centisecond)
//!   ├─ execute_events ──▶ replay event stream
//!   ├─ store_state / store_blocks ──▶ replay
//!   └─ deferred entity deletions
//! ```

pub mod block;
pub mod context;
pub mod entity;
pub mod level;
pub mod motion;
pub mod particles;
pub(crate) mod xml;

use std::f32::consts::PI;

use serde::{Serialize, Deserialize};
use tracing::{debug, trace, warn};

use crate::collision::CollisionSystem;
use crate::core::aabb::Aabb;
use crate::core::buffer::ByteWriter;
use crate::core::hash::{StateHash, StateHasher};
use crate::core::vec2::Vector2f;
use crate::events::{GameEventType, RecordedEvent, SceneEvent, SceneEventData};
use crate::replay::Replay;

pub use block::Block;
pub use context::SimContext;
pub use entity::{Entity, EntitySpeciality};
pub use level::{Level, LevelError};
pub use motion::{MotionSink, PhysicsCommand, ScriptMotion};
pub use particles::{ParticleKind, ParticleSource};

/// Gravity of a fresh scene.
pub const DEFAULT_GRAVITY: Vector2f = Vector2f::new(0.0, -9.81);

/// Camera scale while the action zoom drives it.
pub const CAMERA_ZOOM_ACTIVE: f32 = 0.24;

/// Camera scale restored when a script takes over the zoom.
pub const CAMERA_ZOOM_DEFAULT: f32 = 0.195;

/// Camera rotation speed, degrees per update.
pub const CAMERA_ROTATION_SPEED: f32 = 1.0;

/// Scene time before the first recorded state.
const NEVER_SERIALIZED: i32 = -100;

/// Slack added around the bike when looking for touched entities.
const CONTACT_MARGIN: f32 = 0.5;

// =============================================================================
// Players
// =============================================================================

/// Force applied to a player over a time window.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExternalForce {
    /// First scene time the force applies
    pub start_time: i32,
    /// Last scene time, 0 for forever
    pub end_time: i32,
    /// Force vector
    pub force: Vector2f,
}

impl ExternalForce {
    fn is_active(&self, time: i32) -> bool {
        time >= self.start_time && (self.end_time == 0 || time <= self.end_time)
    }

    fn is_expired(&self, time: i32) -> bool {
        self.end_time != 0 && time > self.end_time
    }
}

/// Contact circles of a bike, supplied by the physics layer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BikeContacts {
    /// Head center (on the side the bike faces)
    pub head: Vector2f,
    /// Head radius
    pub head_size: f32,
    /// Front wheel center
    pub front_wheel: Vector2f,
    /// Rear wheel center
    pub rear_wheel: Vector2f,
    /// Wheel radius
    pub wheel_radius: f32,
}

impl BikeContacts {
    /// Contacts of a bike centered on `position`.
    pub fn around(position: Vector2f) -> Self {
        Self {
            head: position + Vector2f::new(0.0, 1.0),
            head_size: 0.18,
            front_wheel: position + Vector2f::new(0.7, -0.5),
            rear_wheel: position + Vector2f::new(-0.7, -0.5),
            wheel_radius: 0.35,
        }
    }

    fn bounding_box(&self) -> Aabb {
        let mut bbox = Aabb::empty();
        bbox.add_circle(self.head, self.head_size + CONTACT_MARGIN);
        bbox.add_circle(self.front_wheel, self.wheel_radius + CONTACT_MARGIN);
        bbox.add_circle(self.rear_wheel, self.wheel_radius + CONTACT_MARGIN);
        bbox
    }
}

fn circle_touches_circle(c1: Vector2f, r1: f32, c2: Vector2f, r2: f32) -> bool {
    let d = c2 - c1;
    let radii = r1 + r2;
    d.x * d.x + d.y * d.y <= radii * radii
}

/// One player of the scene.
#[derive(Clone, Debug)]
pub struct Player {
    /// Bike center
    pub position: Vector2f,
    /// Driving direction
    pub facing_right: bool,
    /// Contact circles, `None` when the physics layer supplies none
    pub contacts: Option<BikeContacts>,
    /// Serialized bike state recorded into replays
    pub state: Vec<u8>,
    touching: Vec<String>,
    forces: Vec<ExternalForce>,
    dead: Option<i32>,
    finished: Option<i32>,
}

impl Player {
    /// Player at `position`.
    pub fn new(position: Vector2f, facing_right: bool) -> Self {
        Self {
            position,
            facing_right,
            contacts: None,
            state: Vec::new(),
            touching: Vec::new(),
            forces: Vec::new(),
            dead: None,
            finished: None,
        }
    }

    /// Crashed.
    pub fn is_dead(&self) -> bool {
        self.dead.is_some()
    }

    /// Scene time of the crash.
    pub fn dead_time(&self) -> Option<i32> {
        self.dead
    }

    /// Reached a win trigger.
    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    /// Scene time of the finish.
    pub fn finish_time(&self) -> Option<i32> {
        self.finished
    }

    /// Entities currently in contact.
    pub fn touching(&self) -> &[String] {
        &self.touching
    }

    /// Record a contact change; true when the entity was not touched before.
    pub fn set_touching(&mut self, entity_id: &str, touching: bool) -> bool {
        let index = self.touching.iter().position(|id| id == entity_id);
        match (index, touching) {
            (None, true) => {
                self.touching.push(entity_id.to_string());
                true
            }
            (Some(i), false) => {
                self.touching.remove(i);
                false
            }
            _ => false,
        }
    }

    /// Pending and active forces.
    pub fn forces(&self) -> &[ExternalForce] {
        &self.forces
    }

    /// Sum of the forces active at `time`.
    pub fn external_force(&self, time: i32) -> Vector2f {
        self.forces
            .iter()
            .filter(|f| f.is_active(time))
            .fold(Vector2f::ZERO, |acc, f| acc + f.force)
    }
}

// =============================================================================
// Cameras
// =============================================================================

/// Script-visible camera state.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    /// Zoom factor
    pub scale: f32,
    /// Offset from the followed player
    pub offset: Vector2f,
    /// Scroll position
    pub scroll: Vector2f,
    /// Follows the ghost trail
    pub trail_cam: bool,
    action_zoom: bool,
    initial_zoom: f32,
    rotation: f32,
    desired_rotation: f32,
    rotation_speed: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera {
    /// Camera with the action zoom enabled.
    pub fn new() -> Self {
        Self {
            scale: CAMERA_ZOOM_ACTIVE,
            offset: Vector2f::ZERO,
            scroll: Vector2f::ZERO,
            trail_cam: false,
            action_zoom: true,
            initial_zoom: CAMERA_ZOOM_DEFAULT,
            rotation: 0.0,
            desired_rotation: 0.0,
            rotation_speed: CAMERA_ROTATION_SPEED,
        }
    }

    /// Current rotation in degrees.
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    /// Target rotation in degrees.
    pub fn desired_rotation(&self) -> f32 {
        self.desired_rotation
    }

    /// Rotation speed in degrees per update.
    pub fn rotation_speed(&self) -> f32 {
        self.rotation_speed
    }

    /// True while the action zoom drives the scale.
    pub fn has_action_zoom(&self) -> bool {
        self.action_zoom
    }

    fn deactivate_action_zoom(&mut self) {
        if self.action_zoom {
            self.action_zoom = false;
            self.scale = self.initial_zoom;
        }
    }

    /// Relative zoom, never below 0.
    pub fn zoom_by(&mut self, zoom: f32) {
        self.deactivate_action_zoom();
        self.scale = (self.scale + zoom).max(0.0);
    }

    /// Relative move.
    pub fn move_by(&mut self, x: f32, y: f32) {
        self.deactivate_action_zoom();
        self.trail_cam = false;
        self.offset += Vector2f::new(x, y);
    }

    /// Position relative to the scroll.
    pub fn set_position(&mut self, x: f32, y: f32) {
        self.deactivate_action_zoom();
        self.trail_cam = false;
        self.offset = self.scroll + Vector2f::new(x, y);
    }

    /// Target rotation, given in radians.
    pub fn set_desired_rotation(&mut self, angle: f32) {
        self.desired_rotation = angle * 180.0 / PI;
    }

    /// Rotation speed, given in radians.
    pub fn set_rotation_speed(&mut self, speed: f32) {
        self.rotation_speed = speed * 180.0 / PI;
    }

    /// Turn so that `gravity` points down the screen.
    pub fn adapt_rotation_to_gravity(&mut self, gravity: Vector2f) {
        if gravity.x == 0.0 {
            self.desired_rotation = if gravity.y > 0.0 { 180.0 } else { 0.0 };
            return;
        }

        let (vx, vy) = (gravity.x as f64, -gravity.y as f64);
        let radians = if vx > 0.0 {
            if vy > 0.0 {
                (vy / vx).atan()
            } else {
                -(-vy / vx).atan()
            }
        } else if vy > 0.0 {
            std::f64::consts::PI - (vy / -vx).atan()
        } else {
            std::f64::consts::PI + (-vy / -vx).atan()
        };
        let degrees = radians.to_degrees() - 90.0;
        self.desired_rotation = ((degrees + 360.0) as i32 % 360) as f32;
    }

    /// Step the rotation toward its target the short way round.
    pub fn step_rotation(&mut self) -> f32 {
        if (self.desired_rotation - self.rotation).abs() <= self.rotation_speed * 3.0 {
            self.rotation = self.desired_rotation;
            return self.rotation;
        }

        if self.desired_rotation < 0.0 {
            self.desired_rotation = (self.desired_rotation as i32 % 360) as f32 + 360.0;
        } else if self.desired_rotation >= 360.0 {
            self.desired_rotation = (self.desired_rotation as i32 % 360) as f32;
        }

        let diff = if self.rotation > self.desired_rotation {
            self.rotation - self.desired_rotation
        } else {
            self.rotation - self.desired_rotation + 360.0
        };

        let raw = if diff <= 180.0 {
            self.rotation - self.rotation_speed + 360.0
        } else {
            self.rotation + self.rotation_speed + 360.0
        };
        let turns = (raw as i32) / 360;
        self.rotation = raw - turns as f32 * 360.0;
        self.rotation
    }
}

// =============================================================================
// Outputs
// =============================================================================

/// Arrow shown to the player.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum ArrowPointer {
    /// No arrow
    #[default]
    Hidden,
    /// Arrow placed in level coordinates
    InGame {
        /// Position
        position: Vector2f,
        /// Angle in degrees
        angle: f32,
    },
    /// Arrow placed in screen coordinates
    Screen {
        /// Position
        position: Vector2f,
        /// Angle in degrees
        angle: f32,
    },
}

/// Side effects published for the presentation and scripting layers.
#[derive(Clone, Debug, PartialEq)]
pub enum SceneNotification {
    /// Show a message
    Message(String),
    /// Clear the messages
    ClearMessages,
    /// Play a sample
    PlaySound {
        /// Sample name
        name: String,
        /// Volume
        volume: f32,
    },
    /// Start a music track
    PlayMusic(String),
    /// Stop the music
    StopMusic,
    /// A player crashed
    PlayerDied(usize),
    /// A player finished
    PlayerWon(usize),
    /// A player entered a zone
    ZoneEntered {
        /// Player index
        player: usize,
        /// Zone id
        zone_id: String,
    },
    /// A player left a zone
    ZoneLeft {
        /// Player index
        player: usize,
        /// Zone id
        zone_id: String,
    },
    /// A player touched an entity
    EntityTouched {
        /// Player index
        player: usize,
        /// Entity id
        entity_id: String,
    },
    /// A pickup was taken
    EntityTaken {
        /// Entity id
        entity_id: String,
        /// Taker, `None` for a script
        player: Option<usize>,
    },
    /// A checkpoint became active
    CheckpointReached {
        /// Player index
        player: usize,
        /// Checkpoint entity id
        entity_id: String,
    },
}

// =============================================================================
// Scene
// =============================================================================

/// Live simulation of one level.
pub struct Scene {
    level: Level,
    ctx: SimContext,
    collision: CollisionSystem,
    players: Vec<Player>,
    cameras: Vec<Camera>,
    gravity: Vector2f,
    time: i32,
    last_hundredth: i32,
    last_serialization: i32,
    half_update: bool,
    play_events: bool,
    queue: Vec<SceneEvent>,
    del_schedule: Vec<String>,
    motions: Vec<ScriptMotion>,
    physics_commands: Vec<PhysicsCommand>,
    outbox: Vec<SceneNotification>,
    arrow: ArrowPointer,
    checkpoint: Option<String>,
    taken_times: Vec<i32>,
}

impl Scene {
    /// Wrap a level; call [`Scene::load_to_play`] before updating.
    pub fn new(level: Level, ctx: SimContext) -> Self {
        Self {
            level,
            ctx,
            collision: CollisionSystem::new(),
            players: Vec::new(),
            cameras: vec![Camera::new()],
            gravity: DEFAULT_GRAVITY,
            time: 0,
            last_hundredth: 0,
            last_serialization: NEVER_SERIALIZED,
            half_update: true,
            play_events: true,
            queue: Vec::new(),
            del_schedule: Vec::new(),
            motions: Vec::new(),
            physics_commands: Vec::new(),
            outbox: Vec::new(),
            arrow: ArrowPointer::Hidden,
            checkpoint: None,
            taken_times: Vec::new(),
        }
    }

    /// Reset the level and register it in the collision system.
    pub fn load_to_play(&mut self) -> Result<(), LevelError> {
        self.level.load_to_play(&mut self.ctx, &mut self.collision)?;
        self.time = 0;
        self.last_hundredth = 0;
        self.last_serialization = NEVER_SERIALIZED;
        self.half_update = true;
        self.gravity = DEFAULT_GRAVITY;
        self.queue.clear();
        self.del_schedule.clear();
        self.motions.clear();
        self.physics_commands.clear();
        self.arrow = ArrowPointer::Hidden;
        self.checkpoint = None;
        self.taken_times.clear();
        debug!(level = %self.level.id(), "Scene loaded");
        Ok(())
    }

    /// Release per-play state.
    pub fn unload_to_play(&mut self) {
        self.level.unload_to_play(&mut self.ctx);
        self.collision.reset();
        self.players.clear();
        self.queue.clear();
        self.motions.clear();
    }

    /// Add a player at the level start; returns its index.
    pub fn add_player(&mut self, facing_right: bool) -> usize {
        self.players.push(Player::new(self.level.player_start(), facing_right));
        self.players.len() - 1
    }

    /// Level in play.
    pub fn level(&self) -> &Level {
        &self.level
    }

    /// Mutable level.
    pub fn level_mut(&mut self) -> &mut Level {
        &mut self.level
    }

    /// Simulation context.
    pub fn context(&self) -> &SimContext {
        &self.ctx
    }

    /// Collision index of the level.
    pub fn collision(&self) -> &CollisionSystem {
        &self.collision
    }

    /// Mutable collision index.
    pub fn collision_mut(&mut self) -> &mut CollisionSystem {
        &mut self.collision
    }

    /// Players.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Mutable players.
    pub fn players_mut(&mut self) -> &mut [Player] {
        &mut self.players
    }

    /// Cameras.
    pub fn cameras(&self) -> &[Camera] {
        &self.cameras
    }

    /// Mutable cameras.
    pub fn cameras_mut(&mut self) -> &mut [Camera] {
        &mut self.cameras
    }

    /// Scene time in centiseconds.
    pub fn time(&self) -> i32 {
        self.time
    }

    /// Current gravity.
    pub fn gravity(&self) -> Vector2f {
        self.gravity
    }

    /// Change gravity.
    pub fn set_gravity(&mut self, gravity: Vector2f) {
        self.gravity = gravity;
    }

    /// Whether touches and zones trigger gameplay (false during playback).
    pub fn play_events(&self) -> bool {
        self.play_events
    }

    /// Enable or disable gameplay triggers.
    pub fn set_play_events(&mut self, play: bool) {
        self.play_events = play;
    }

    /// Active script motions.
    pub fn motions(&self) -> &[ScriptMotion] {
        &self.motions
    }

    /// Current arrow.
    pub fn arrow(&self) -> ArrowPointer {
        self.arrow
    }

    /// Show, move or hide the arrow.
    pub fn set_arrow(&mut self, arrow: ArrowPointer) {
        self.arrow = arrow;
    }

    /// Active checkpoint.
    pub fn checkpoint(&self) -> Option<&str> {
        self.checkpoint.as_deref()
    }

    /// Scene times at which pickups were taken.
    pub fn taken_times(&self) -> &[i32] {
        &self.taken_times
    }

    /// Events waiting for the next update.
    pub fn pending_events(&self) -> &[SceneEvent] {
        &self.queue
    }

    /// Publish a side effect.
    pub fn notify(&mut self, notification: SceneNotification) {
        self.outbox.push(notification);
    }

    /// Take the published side effects.
    pub fn drain_notifications(&mut self) -> Vec<SceneNotification> {
        std::mem::take(&mut self.outbox)
    }

    /// Take the forces and torques for the physics engine.
    pub fn drain_physics_commands(&mut self) -> Vec<PhysicsCommand> {
        std::mem::take(&mut self.physics_commands)
    }

    /// Pickups left.
    pub fn remaining_to_take(&self) -> usize {
        self.level.count_to_take_entities()
    }

    /// Fingerprint of the simulated state, for determinism checks.
    pub fn digest(&self) -> StateHash {
        let mut hasher = StateHasher::for_scene();
        hasher.update_i32(self.time);
        hasher.update_vec2(self.gravity);
        for player in &self.players {
            hasher.update_vec2(player.position);
            hasher.update_bool(player.facing_right);
            hasher.update_i32(player.dead.unwrap_or(-1));
            hasher.update_i32(player.finished.unwrap_or(-1));
        }
        for block in self.level.blocks() {
            hasher.update_vec2(block.dynamic_position());
            hasher.update_f32(block.dynamic_rotation());
        }
        for entity in self.level.entities() {
            hasher.update_str(entity.id());
            hasher.update_bool(entity.is_alive());
            hasher.update_vec2(entity.dynamic_position());
        }
        hasher.update_u32(self.ctx.live_particles() as u32);
        for word in self.ctx.rng.state() {
            hasher.update_bytes(&word.to_le_bytes());
        }
        hasher.finalize()
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Advance the scene by `time_step` centiseconds.
    ///
    /// Executed events go to the replay's event stream, and the single
    /// player's state is recorded at the replay frame rate.
    pub fn update(&mut self, time_step: i32, mut replay: Option<&mut Replay>) {
        if self.half_update {
            self.level.update_to_time(&mut self.ctx, self.time, self.gravity);
            self.half_update = false;
        } else {
            self.half_update = true;
        }

        self.time += time_step;

        if self.play_events {
            self.update_entity_contacts();
        }

        let mut cents = 0;
        while self.time - self.last_hundredth > 1 {
            cents += 1;
            self.last_hundredth += 1;
        }
        self.next_state_motions(cents);

        let time = self.time;
        for player in &mut self.players {
            player.forces.retain(|f| !f.is_expired(time));
        }
        for camera in &mut self.cameras {
            camera.step_rotation();
        }

        self.execute_events(replay.as_deref_mut().map(Replay::event_buffer_mut));

        if let Some(replay) = replay {
            self.record(replay);
        }

        for id in std::mem::take(&mut self.del_schedule) {
            self.kill_entity_now(&id);
        }
    }

    fn record(&mut self, replay: &mut Replay) {
        let due = (self.time - self.last_serialization) as f32 >= 100.0 / replay.frame_rate();
        if !due || self.players.len() != 1 {
            return;
        }
        self.last_serialization = self.time;

        let player = &self.players[0];
        if player.is_dead() || player.is_finished() {
            return;
        }
        if let Err(e) = replay.store_state(&player.state) {
            warn!(error = %e, "Unable to record the bike state");
            return;
        }
        if self.level.is_physics() {
            let positions: Vec<Vector2f> = self.players.iter().map(|p| p.position).collect();
            replay.store_blocks(self.time, self.level.blocks(), &positions, false);
        }
    }

    fn next_state_motions(&mut self, cents: i32) {
        if self.motions.is_empty() {
            return;
        }
        let mut motions = std::mem::take(&mut self.motions);
        motions.retain_mut(|m| m.next_state(self, cents));
        motions.append(&mut self.motions);
        self.motions = motions;
    }

    /// Turn bike contacts into touch events.
    fn update_entity_contacts(&mut self) {
        for index in 0..self.players.len() {
            let player = &self.players[index];
            if player.is_dead() {
                continue;
            }
            let Some(contacts) = player.contacts else { continue };

            for id in self.collision.entities_near(&contacts.bounding_box()) {
                let Some(entity) = self.level.entity(&id) else { continue };
                let (center, size) = (entity.dynamic_position(), entity.size());

                let head = circle_touches_circle(center, size, contacts.head, contacts.head_size);
                let wheel = circle_touches_circle(center, size, contacts.front_wheel, contacts.wheel_radius)
                    || circle_touches_circle(center, size, contacts.rear_wheel, contacts.wheel_radius);

                if head || wheel {
                    if self.players[index].set_touching(&id, true) {
                        self.create_event(SceneEvent::new(
                            self.time,
                            SceneEventData::PlayerTouchesEntity {
                                entity_id: id,
                                touched_with_head: head,
                                player: index as i32,
                            },
                        ));
                    }
                } else {
                    self.players[index].set_touching(&id, false);
                }
            }
        }
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Queue an event for the next [`Scene::execute_events`].
    pub fn create_event(&mut self, event: SceneEvent) {
        self.queue.push(event);
    }

    /// Queue the external destruction of an entity.
    pub fn create_external_kill_entity_event(&mut self, entity_id: &str) {
        let Some(entity) = self.level.entity(entity_id) else {
            warn!(entity = %entity_id, "Unable to kill an unknown entity");
            return;
        };
        let event = SceneEvent::new(
            self.time,
            SceneEventData::EntityDestroyed {
                entity_id: entity.id().to_string(),
                speciality: entity.speciality(),
                position: entity.dynamic_position(),
                size: entity.size(),
                taken_by_player: -1,
            },
        );
        self.create_event(event);
    }

    /// Run every queued event.
    ///
    /// Wins run last so that a death in the same update takes precedence.
    /// Events created while executing are executed in the same call.
    pub fn execute_events(&mut self, mut recorder: Option<&mut ByteWriter>) {
        loop {
            let mut found_other = false;
            let mut i = 0;
            while i < self.queue.len() {
                if self.queue[i].event_type() == GameEventType::PlayerWins {
                    i += 1;
                    continue;
                }
                found_other = true;
                let event = self.queue.remove(i);
                self.execute_event(&event, recorder.as_deref_mut());
            }
            if !found_other {
                break;
            }
        }

        while !self.queue.is_empty() {
            let event = self.queue.remove(0);
            self.execute_event(&event, recorder.as_deref_mut());
        }
    }

    fn execute_event(&mut self, event: &SceneEvent, recorder: Option<&mut ByteWriter>) {
        if let Some(recorder) = recorder {
            event.serialize(recorder);
        }
        trace!(time = event.time, event = %event, "Executing event");
        event.do_action(self);
    }

    /// Apply a recorded event during playback.
    ///
    /// Touch events are skipped: their consequences are recorded separately.
    pub fn handle_event(&mut self, event: &SceneEvent) {
        match event.event_type() {
            GameEventType::PlayerTouchesEntity | GameEventType::PlayersToucheEntity => {}
            _ => event.do_action(self),
        }
    }

    /// Bring the recorded events in line with `time`.
    ///
    /// Unpassed events older than `time` are applied in order, then passed
    /// events newer than `time` are reverted in reverse order.
    pub fn apply_replay_events(&mut self, events: &mut [RecordedEvent], time: i32) {
        for recorded in events.iter_mut() {
            if !recorded.passed && recorded.event.time < time {
                self.handle_event(&recorded.event);
                recorded.passed = true;
            }
        }
        for recorded in events.iter_mut().rev() {
            if recorded.passed && recorded.event.time > time {
                recorded.event.revert(self);
                recorded.passed = false;
            }
        }
    }

    // =========================================================================
    // Event actions
    // =========================================================================

    /// Crash a player still in play.
    pub fn kill_player(&mut self, player: usize) {
        let time = self.time;
        let Some(p) = self.players.get_mut(player) else { return };
        if p.is_dead() || p.is_finished() {
            return;
        }
        p.dead = Some(time);
        self.notify(SceneNotification::PlayerDied(player));
    }

    /// Finish a player still in play.
    pub fn make_player_win(&mut self, player: usize) {
        let time = self.time;
        let Some(p) = self.players.get_mut(player) else { return };
        if p.is_dead() || p.is_finished() {
            return;
        }
        p.finished = Some(time);
        self.notify(SceneNotification::PlayerWon(player));
    }

    /// Zone entry, forwarded to the scripting layer.
    pub fn player_enters_zone(&mut self, player: usize, zone_id: &str) {
        if self.play_events {
            self.notify(SceneNotification::ZoneEntered { player, zone_id: zone_id.to_string() });
        }
    }

    /// Zone exit, forwarded to the scripting layer.
    pub fn player_leaves_zone(&mut self, player: usize, zone_id: &str) {
        if self.play_events {
            self.notify(SceneNotification::ZoneLeft { player, zone_id: zone_id.to_string() });
        }
    }

    /// Touch by id.
    pub fn player_touches_entity(&mut self, player: usize, entity_id: &str, head: bool) {
        self.touch_entity(player, entity_id, head);
    }

    /// Gameplay consequences of a touch.
    pub fn touch_entity(&mut self, player: usize, entity_id: &str, _head: bool) {
        if !self.play_events {
            return;
        }
        let Some(entity) = self.level.entity(entity_id) else {
            warn!(entity = %entity_id, "Touched entity not found");
            return;
        };
        let speciality = entity.speciality();
        let position = entity.dynamic_position();
        let size = entity.size();
        let time = self.time;

        self.notify(SceneNotification::EntityTouched { player, entity_id: entity_id.to_string() });

        match speciality {
            EntitySpeciality::MakeWin if self.remaining_to_take() == 0 => {
                self.create_event(SceneEvent::player_wins(time, player));
            }
            EntitySpeciality::Kill => self.create_event(SceneEvent::player_dies(time, true, player)),
            EntitySpeciality::IsToTake => self.create_event(SceneEvent::new(
                time,
                SceneEventData::EntityDestroyed {
                    entity_id: entity_id.to_string(),
                    speciality,
                    position,
                    size,
                    taken_by_player: player as i32,
                },
            )),
            EntitySpeciality::Checkpoint => self.activate_checkpoint(player, entity_id),
            _ => {}
        }
    }

    fn activate_checkpoint(&mut self, player: usize, entity_id: &str) {
        if let Some(previous) = self.checkpoint.take() {
            if let Some(entity) = self.level.entity_mut(&previous) {
                entity.deactivate_checkpoint();
            }
        }

        let destroyed: Vec<String> = self.level.destroyed_entities().iter().map(|e| e.id().to_string()).collect();
        let facing_right = self.players.get(player).map(|p| p.facing_right).unwrap_or(true);
        if let Some(entity) = self.level.entity_mut(entity_id) {
            entity.activate_checkpoint(destroyed, facing_right);
            self.checkpoint = Some(entity_id.to_string());
            self.notify(SceneNotification::CheckpointReached { player, entity_id: entity_id.to_string() });
        }
    }

    /// Destruction of an entity; pickups burst into stars.
    ///
    /// `taken_by_player` is -1 when a script destroyed the entity.
    pub fn entity_destroyed(&mut self, entity_id: &str, time: i32, taken_by_player: i32) {
        let Some(entity) = self.level.entity(entity_id) else {
            warn!(entity = %entity_id, "Destroyed entity not found");
            return;
        };

        if entity.is_to_take() {
            let position = entity.dynamic_position();
            let mut stars = Entity::new_particle_source(format!("{entity_id}.stars"), ParticleKind::Star);
            stars.set_initial_position(position);
            stars.load_to_play();
            stars.set_z(1.0);
            if let Some(source) = stars.particle_source_mut() {
                for _ in 0..3 {
                    source.add_particle(&mut self.ctx, position, self.time);
                }
            }
            self.level.spawn_entity(stars);

            let player = usize::try_from(taken_by_player).ok();
            self.notify(SceneNotification::EntityTaken { entity_id: entity_id.to_string(), player });
            self.taken_times.push(time);
        }

        if !self.del_schedule.iter().any(|id| id == entity_id) {
            self.del_schedule.push(entity_id.to_string());
        }
    }

    fn kill_entity_now(&mut self, entity_id: &str) {
        if let Err(e) = self.level.kill_entity(entity_id) {
            warn!(entity = %entity_id, error = %e, "Unable to kill entity");
            return;
        }
        if let Err(e) = self.collision.remove_entity(entity_id) {
            warn!(entity = %entity_id, error = %e, "Killed entity was not tracked");
        }

        if self.remaining_to_take() > 0 {
            return;
        }
        let time = self.time;
        let mut wins = Vec::new();
        for (index, player) in self.players.iter().enumerate() {
            if player.is_dead() {
                continue;
            }
            for id in &player.touching {
                if self.level.entity(id).is_some_and(Entity::does_make_win) {
                    wins.push(SceneEvent::player_wins(time, index));
                }
            }
        }
        self.queue.extend(wins);
    }

    /// Undo a destruction when rewinding a replay.
    pub fn revert_entity_destroyed(&mut self, entity_id: &str) -> Result<(), LevelError> {
        self.level.revert_entity_destroyed(entity_id, &mut self.collision)
    }

    /// Translate a dynamic block.
    pub fn move_block(&mut self, block_id: &str, x: f32, y: f32) {
        let Some(block) = self.level.block_mut(block_id) else {
            warn!(block = %block_id, "Block not found");
            return;
        };
        if !block.is_dynamic() {
            return;
        }
        block.translate(x, y);
        if let Err(e) = self.collision.move_dyn_block(block) {
            warn!(block = %block_id, error = %e, "Unable to move block");
        }
    }

    /// Place a dynamic block by its rotation center.
    pub fn set_block_pos(&mut self, block_id: &str, x: f32, y: f32) {
        let Some(block) = self.level.block_mut(block_id) else {
            warn!(block = %block_id, "Block not found");
            return;
        };
        if !block.is_dynamic() {
            return;
        }
        block.set_dynamic_position_according_to_center(Vector2f::new(x, y));
        if let Err(e) = self.collision.move_dyn_block(block) {
            warn!(block = %block_id, error = %e, "Unable to move block");
        }
    }

    /// Change a dynamic block's rotation center.
    pub fn set_block_center(&mut self, block_id: &str, x: f32, y: f32) {
        match self.level.block_mut(block_id) {
            Some(block) if block.is_dynamic() => block.set_center(Vector2f::new(x, y)),
            Some(_) => {}
            None => warn!(block = %block_id, "Block not found"),
        }
    }

    /// Rotate a dynamic block.
    pub fn set_block_rotation(&mut self, block_id: &str, angle: f32) {
        let Some(block) = self.level.block_mut(block_id) else {
            warn!(block = %block_id, "Block not found");
            return;
        };
        if !block.is_dynamic() || !block.set_dynamic_rotation(angle) {
            return;
        }
        if let Err(e) = self.collision.move_dyn_block(block) {
            warn!(block = %block_id, error = %e, "Unable to move block");
        }
    }

    /// Place an entity.
    pub fn set_entity_pos(&mut self, entity_id: &str, x: f32, y: f32) {
        let Some(entity) = self.level.entity_mut(entity_id) else {
            warn!(entity = %entity_id, "Entity not found");
            return;
        };
        entity.set_dynamic_position(Vector2f::new(x, y));
        if entity.is_alive() {
            if let Err(e) = self.collision.move_entity(entity) {
                warn!(entity = %entity_id, error = %e, "Unable to move entity");
            }
        }
    }

    /// Teleport a player still in play.
    pub fn set_player_position(&mut self, player: usize, position: Vector2f, facing_right: bool) {
        if let Some(p) = self.players.get_mut(player) {
            if !p.is_dead() {
                p.position = position;
                p.facing_right = facing_right;
            }
        }
    }

    /// Push a player between `start_time` and `end_time` from now.
    pub fn add_force_to_player(&mut self, player: usize, force: Vector2f, start_time: i32, end_time: i32) {
        let now = self.time;
        if let Some(p) = self.players.get_mut(player) {
            p.forces.push(ExternalForce {
                start_time: now + start_time,
                end_time: if end_time == 0 { 0 } else { now + end_time },
                force,
            });
        }
    }

    /// Add a script motion.
    pub fn add_motion(&mut self, motion: ScriptMotion) {
        self.motions.push(motion);
    }

    /// Drop every motion attached to `object_id`.
    pub fn remove_motions_of(&mut self, object_id: &str) {
        self.motions.retain(|m| m.object_id() != object_id);
    }

    /// Positive penalties push the clock forward.
    pub fn add_penalty_time(&mut self, penalty: i32) {
        if penalty > 0 {
            self.time += penalty;
        }
    }
}

impl MotionSink for Scene {
    fn entity_alive(&self, id: &str) -> Option<bool> {
        self.level.entity(id).map(Entity::is_alive)
    }

    fn translate_entity(&mut self, id: &str, dx: f32, dy: f32) {
        let Some(entity) = self.level.entity_mut(id) else { return };
        entity.translate(dx, dy);
        if entity.is_alive() {
            if let Err(e) = self.collision.move_entity(entity) {
                warn!(entity = %id, error = %e, "Unable to move entity");
            }
        }
    }

    fn rotate_entity(&mut self, id: &str, angle: f32) {
        if let Some(entity) = self.level.entity_mut(id) {
            entity.set_draw_angle(entity.draw_angle() + angle);
        }
    }

    fn block_rotation(&self, id: &str) -> Option<f32> {
        self.level.block(id).map(Block::dynamic_rotation)
    }

    fn move_block(&mut self, id: &str, dx: f32, dy: f32) {
        Scene::move_block(self, id, dx, dy);
    }

    fn set_block_rotation(&mut self, id: &str, angle: f32) {
        Scene::set_block_rotation(self, id, angle);
    }

    fn has_physics_body(&self, id: &str) -> bool {
        self.level.block(id).is_some_and(Block::is_physics)
    }

    fn physics_command(&mut self, command: PhysicsCommand) {
        self.physics_commands.push(command);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::buffer::ByteReader;
    use crate::events::read_event_stream;

    const LEVEL: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<level id="scene_test">
  <limits left="-20" right="60" top="20" bottom="-10"/>
  <block id="ground">
    <position x="0" y="0"/>
    <vertex x="-10" y="-5"/><vertex x="50" y="-5"/><vertex x="50" y="0"/><vertex x="-10" y="0"/>
  </block>
  <block id="door">
    <position x="10" y="2" dynamic="true"/>
    <vertex x="0" y="0"/><vertex x="1" y="0"/><vertex x="1" y="3"/><vertex x="0" y="3"/>
  </block>
  <entity id="start" typeid="PlayerStart"><position x="1" y="1"/></entity>
  <entity id="s1" typeid="Strawberry"><position x="5" y="1"/></entity>
  <entity id="wrecker" typeid="Wrecker"><position x="20" y="1"/></entity>
  <entity id="flower" typeid="EndOfLevel"><position x="30" y="1"/></entity>
  <entity id="cp" typeid="Checkpoint"><position x="40" y="1"/></entity>
</level>"#;

    fn scene() -> Scene {
        let level = Level::from_xml_str(LEVEL).unwrap();
        let mut scene = Scene::new(level, SimContext::new(7));
        scene.load_to_play().unwrap();
        scene.add_player(true);
        scene
    }

    #[test]
    fn test_same_events_same_digest() {
        let run = || {
            let mut scene = scene();
            scene.create_event(SceneEvent::new(0, SceneEventData::SetGravity { x: 1.0, y: -3.0 }));
            scene.touch_entity(0, "s1", false);
            for _ in 0..50 {
                scene.update(1, None);
            }
            scene.digest()
        };
        let first = run();
        assert_eq!(first, run());

        let mut other = scene();
        for _ in 0..50 {
            other.update(1, None);
        }
        assert_ne!(first, other.digest());
    }

    #[test]
    fn test_touching_a_pickup_destroys_it_after_the_update() {
        let mut scene = scene();
        assert_eq!(scene.remaining_to_take(), 1);

        scene.touch_entity(0, "s1", false);
        scene.update(1, None);

        assert_eq!(scene.remaining_to_take(), 0);
        assert!(scene.level().entity("s1").map(|e| !e.is_alive()).unwrap_or(false));
        // The star burst is spawned as an external entity
        assert_eq!(scene.level().extern_entities().len(), 1);
        assert_eq!(scene.context().live_particles(), 3);
        assert_eq!(scene.taken_times(), &[0]);
        let notes = scene.drain_notifications();
        assert!(notes.contains(&SceneNotification::EntityTaken { entity_id: "s1".into(), player: Some(0) }));
    }

    #[test]
    fn test_death_beats_win_in_the_same_update() {
        let mut scene = scene();
        scene.create_event(SceneEvent::player_wins(0, 0));
        scene.create_event(SceneEvent::player_dies(0, true, 0));
        scene.execute_events(None);

        let player = &scene.players()[0];
        assert!(player.is_dead());
        assert!(!player.is_finished());
    }

    #[test]
    fn test_flower_needs_every_pickup() {
        let mut scene = scene();
        scene.touch_entity(0, "flower", false);
        scene.execute_events(None);
        assert!(!scene.players()[0].is_finished());

        scene.create_external_kill_entity_event("s1");
        scene.update(1, None);
        scene.touch_entity(0, "flower", false);
        scene.execute_events(None);
        assert!(scene.players()[0].is_finished());
    }

    #[test]
    fn test_last_pickup_wins_while_on_the_flower() {
        let mut scene = scene();
        scene.players_mut()[0].set_touching("flower", true);
        scene.create_external_kill_entity_event("s1");
        scene.update(1, None);
        // The win is queued by the deletion and runs on the next update
        assert!(!scene.players()[0].is_finished());
        scene.update(1, None);
        assert!(scene.players()[0].is_finished());
    }

    #[test]
    fn test_touches_are_ignored_during_playback() {
        let mut scene = scene();
        scene.set_play_events(false);
        scene.touch_entity(0, "wrecker", true);
        assert!(scene.pending_events().is_empty());
    }

    #[test]
    fn test_contacts_create_touch_events() {
        let mut scene = scene();
        scene.players_mut()[0].contacts = Some(BikeContacts::around(Vector2f::new(20.5, 1.5)));
        scene.update(1, None);
        assert!(scene.players()[0].is_dead());
        assert_eq!(scene.players()[0].touching(), &["wrecker".to_string()]);

        // Staying in contact does not touch again
        scene.update(1, None);
        assert!(scene.pending_events().is_empty());
    }

    #[test]
    fn test_checkpoint_activation() {
        let mut scene = scene();
        scene.touch_entity(0, "cp", false);
        assert_eq!(scene.checkpoint(), Some("cp"));
        assert!(scene.level().entity("cp").and_then(|e| e.checkpoint()).is_some_and(|c| c.activated));
    }

    #[test]
    fn test_block_events_move_dynamic_blocks_only() {
        let mut scene = scene();
        scene.move_block("door", 1.0, 0.0);
        scene.move_block("ground", 1.0, 0.0);
        assert_eq!(scene.level().block("door").map(|b| b.dynamic_position()), Some(Vector2f::new(11.0, 2.0)));
        assert_eq!(scene.level().block("ground").map(|b| b.dynamic_position()), Some(Vector2f::ZERO));

        scene.set_block_rotation("door", 0.5);
        assert_eq!(scene.level().block("door").map(|b| b.dynamic_rotation()), Some(0.5));
    }

    #[test]
    fn test_script_motion_moves_a_block() {
        let mut scene = scene();
        scene.create_event(SceneEvent::new(
            0,
            SceneEventData::SetDynamicBlockTranslation {
                block_id: "door".into(),
                x: 0.0,
                y: 2.0,
                period: 200,
                start_time: 0,
                end_time: 0,
            },
        ));
        scene.execute_events(None);
        assert_eq!(scene.motions().len(), 1);

        for _ in 0..10 {
            scene.update(1, None);
        }
        let y = scene.level().block("door").map(|b| b.dynamic_position().y).unwrap_or_default();
        assert!(y > 2.0);

        scene.remove_motions_of("door");
        assert!(scene.motions().is_empty());
    }

    #[test]
    fn test_recorder_receives_persistent_events_only() {
        let mut scene = scene();
        let mut recorder = ByteWriter::new();
        scene.create_event(SceneEvent::new(3, SceneEventData::SetGravity { x: 0.0, y: -5.0 }));
        scene.create_event(SceneEvent::player_dies(3, false, 0));
        scene.execute_events(Some(&mut recorder));

        let bytes = recorder.into_bytes();
        let events = read_event_stream(&bytes).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(scene.gravity(), Vector2f::new(0.0, -5.0));
        assert_eq!(ByteReader::new(&bytes).remaining(), 16);
    }

    #[test]
    fn test_replay_events_apply_and_revert() {
        let mut scene = scene();
        scene.set_play_events(false);
        let mut events = vec![RecordedEvent::new(SceneEvent::new(
            50,
            SceneEventData::EntityDestroyed {
                entity_id: "s1".into(),
                speciality: EntitySpeciality::IsToTake,
                position: Vector2f::new(5.0, 1.0),
                size: 0.2,
                taken_by_player: -1,
            },
        ))];

        scene.apply_replay_events(&mut events, 60);
        assert!(events[0].passed);
        scene.update(1, None);
        assert_eq!(scene.remaining_to_take(), 0);

        scene.apply_replay_events(&mut events, 40);
        assert!(!events[0].passed);
        assert_eq!(scene.remaining_to_take(), 1);
        assert!(scene.level().entity("s1").is_some_and(Entity::is_alive));
    }

    #[test]
    fn test_penalty_and_forces() {
        let mut scene = scene();
        scene.add_penalty_time(-10);
        assert_eq!(scene.time(), 0);
        scene.add_penalty_time(150);
        assert_eq!(scene.time(), 150);

        scene.add_force_to_player(0, Vector2f::new(1.0, 0.0), 10, 20);
        let force = scene.players()[0].forces()[0];
        assert_eq!((force.start_time, force.end_time), (160, 170));
        assert_eq!(scene.players()[0].external_force(165), Vector2f::new(1.0, 0.0));
        assert_eq!(scene.players()[0].external_force(171), Vector2f::ZERO);
    }

    #[test]
    fn test_camera_zoom_and_gravity_rotation() {
        let mut camera = Camera::new();
        camera.zoom_by(0.1);
        assert!(!camera.has_action_zoom());
        assert!((camera.scale - 0.295).abs() < 1e-6);
        camera.zoom_by(-1.0);
        assert_eq!(camera.scale, 0.0);

        camera.adapt_rotation_to_gravity(Vector2f::new(0.0, 9.81));
        assert_eq!(camera.desired_rotation(), 180.0);
        camera.adapt_rotation_to_gravity(Vector2f::new(9.81, 0.0));
        assert_eq!(camera.desired_rotation(), 270.0);

        let mut camera = Camera::new();
        camera.set_desired_rotation(PI / 2.0);
        let first = camera.step_rotation();
        assert!((first - 1.0).abs() < 1e-4);
    }
}
