//! Entities
//!
//! Interactive level objects: pickups, hazards, goal markers, particle
//! emitters, joints and checkpoints. The speciality is the single source of
//! truth for the gameplay role; the [`EntityKind`] carries the extra state
//! the emitter, joint and checkpoint variants need.

use std::cell::Cell;

use roxmltree::Node;
use serde::{Serialize, Deserialize};

use super::context::SimContext;
use super::level::LevelError;
use super::particles::{ParticleKind, ParticleSource};
use super::xml::{attr_bool, attr_f32, attr_str, child, children};
use crate::collision::{Collidable, ObjectId};
use crate::core::aabb::{Aabb, BoundingCircle};
use crate::core::buffer::{ByteReader, ByteWriter};
use crate::core::vec2::Vector2f;

/// Depth of entities without a `z` parameter (behind the bike).
pub const ENTITY_DEFAULT_Z: f32 = -1.0;

/// Radius of entities without a `<size>` element.
pub const ENTITY_DEFAULT_SIZE: f32 = 0.2;

/// Gameplay role of an entity.
///
/// The discriminants are stored in replay event payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i32)]
pub enum EntitySpeciality {
    /// Decoration
    None = 0,
    /// Player start marker
    IsStart = 1,
    /// Win trigger (flower)
    MakeWin = 2,
    /// Hazard (wrecker)
    Kill = 3,
    /// Pickup (strawberry)
    IsToTake = 4,
    /// Particle emitter
    ParticlesSource = 5,
    /// Physics joint between two blocks
    Joint = 6,
    /// Respawn point
    Checkpoint = 7,
}

impl EntitySpeciality {
    /// Map a level `typeid`; anything unknown is a plain sprite.
    pub fn from_type_id(type_id: &str) -> Self {
        match type_id {
            "PlayerStart" => EntitySpeciality::IsStart,
            "EndOfLevel" => EntitySpeciality::MakeWin,
            "Wrecker" => EntitySpeciality::Kill,
            "Strawberry" => EntitySpeciality::IsToTake,
            "ParticleSource" => EntitySpeciality::ParticlesSource,
            "Joint" => EntitySpeciality::Joint,
            "Checkpoint" => EntitySpeciality::Checkpoint,
            _ => EntitySpeciality::None,
        }
    }

    /// Level `typeid` of the speciality.
    pub fn type_id(&self) -> &'static str {
        match self {
            EntitySpeciality::IsStart => "PlayerStart",
            EntitySpeciality::MakeWin => "EndOfLevel",
            EntitySpeciality::Kill => "Wrecker",
            EntitySpeciality::IsToTake => "Strawberry",
            EntitySpeciality::ParticlesSource => "ParticleSource",
            EntitySpeciality::Joint => "Joint",
            EntitySpeciality::Checkpoint => "Checkpoint",
            EntitySpeciality::None => "Sprite",
        }
    }

    /// Stored discriminant.
    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// Inverse of [`EntitySpeciality::code`].
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => EntitySpeciality::None,
            1 => EntitySpeciality::IsStart,
            2 => EntitySpeciality::MakeWin,
            3 => EntitySpeciality::Kill,
            4 => EntitySpeciality::IsToTake,
            5 => EntitySpeciality::ParticlesSource,
            6 => EntitySpeciality::Joint,
            7 => EntitySpeciality::Checkpoint,
            _ => return None,
        })
    }
}

/// Joint flavor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JointType {
    /// Unset or unknown
    #[default]
    None,
    /// Rotation around the joint position
    Pivot,
    /// Fixed distance between the two bodies
    Pin,
}

impl JointType {
    /// Parse the level name; unknown names give [`JointType::None`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "pivot" => JointType::Pivot,
            "pin" => JointType::Pin,
            _ => JointType::None,
        }
    }

    /// Level name (empty for [`JointType::None`]).
    pub fn name(&self) -> &'static str {
        match self {
            JointType::Pivot => "pivot",
            JointType::Pin => "pin",
            JointType::None => "",
        }
    }
}

/// Blocks tied by a joint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JointParams {
    /// Flavor
    pub joint_type: JointType,
    /// First block id
    pub start_block: String,
    /// Second block id
    pub end_block: String,
}

/// Respawn state of a checkpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Set once a player went through
    pub activated: bool,
    /// Player direction at activation
    pub facing_right: bool,
    /// Entities already destroyed at activation
    pub destroyed_entities: Vec<String>,
}

/// Variant-specific state.
#[derive(Clone, Debug)]
pub enum EntityKind {
    /// No extra state
    Plain,
    /// Particle emitter
    ParticlesSource(ParticleSource),
    /// Joint between two blocks
    Joint(JointParams),
    /// Respawn point
    Checkpoint(CheckpointState),
}

/// Raw fields shared by the XML and binary readers.
#[derive(Debug, Default)]
struct EntityRecord {
    id: String,
    type_id: String,
    position: Vector2f,
    angle: f32,
    reversed: bool,
    size: f32,
    width: f32,
    height: f32,
    z: f32,
    sprite_name: String,
    type_name: String,
}

impl EntityRecord {
    fn new() -> Self {
        Self {
            angle: -1.0,
            size: ENTITY_DEFAULT_SIZE,
            width: -1.0,
            height: -1.0,
            z: ENTITY_DEFAULT_Z,
            ..Self::default()
        }
    }

    fn set_param(&mut self, name: &str, value: &str) {
        match name {
            "z" => self.z = value.trim().parse().unwrap_or(0.0),
            "name" => self.sprite_name = value.to_string(),
            "type" => self.type_name = value.to_string(),
            _ => {}
        }
    }
}

/// One level entity.
#[derive(Clone, Debug)]
pub struct Entity {
    id: String,
    speciality: EntitySpeciality,
    kind: EntityKind,
    sprite_name: String,
    initial_position: Vector2f,
    dynamic_position: Vector2f,
    size: f32,
    width: f32,
    height: f32,
    z: f32,
    draw_angle: f32,
    draw_reversed: bool,
    alive: bool,
    bbox: Cell<Option<Aabb>>,
}

impl Entity {
    /// Create a plain entity of a given speciality.
    pub fn new(id: impl Into<String>, speciality: EntitySpeciality) -> Self {
        Self {
            id: id.into(),
            speciality,
            kind: match speciality {
                EntitySpeciality::Joint => EntityKind::Joint(JointParams::default()),
                EntitySpeciality::Checkpoint => EntityKind::Checkpoint(CheckpointState::default()),
                _ => EntityKind::Plain,
            },
            sprite_name: String::new(),
            initial_position: Vector2f::ZERO,
            dynamic_position: Vector2f::ZERO,
            size: ENTITY_DEFAULT_SIZE,
            width: -1.0,
            height: -1.0,
            z: ENTITY_DEFAULT_Z,
            draw_angle: 0.0,
            draw_reversed: false,
            alive: true,
            bbox: Cell::new(None),
        }
    }

    /// Create a particle emitter.
    pub fn new_particle_source(id: impl Into<String>, kind: ParticleKind) -> Self {
        let mut entity = Self::new(id, EntitySpeciality::ParticlesSource);
        entity.sprite_name = kind.type_name().to_string();
        entity.kind = EntityKind::ParticlesSource(ParticleSource::new(kind));
        entity
    }

    fn from_record(record: EntityRecord) -> Result<Self, LevelError> {
        let speciality = EntitySpeciality::from_type_id(&record.type_id);
        let mut entity = match speciality {
            EntitySpeciality::ParticlesSource => {
                let kind = ParticleKind::from_type_name(&record.type_name)
                    .ok_or_else(|| LevelError::InvalidEntityType(record.id.clone()))?;
                Self::new_particle_source(record.id, kind)
            }
            EntitySpeciality::None => {
                let mut entity = Self::new(record.id, speciality);
                entity.sprite_name = record.sprite_name;
                entity
            }
            EntitySpeciality::Joint => Self::new(record.id, speciality),
            _ => {
                let mut entity = Self::new(record.id, speciality);
                entity.sprite_name = record.type_id;
                entity
            }
        };

        entity.set_initial_position(record.position);
        entity.set_size(record.size);
        if record.width > 0.0 {
            entity.width = record.width;
        }
        if record.height > 0.0 {
            entity.height = record.height;
        }
        if record.angle > 0.0 {
            entity.draw_angle = record.angle;
        }
        entity.draw_reversed = record.reversed;
        entity.z = record.z;
        Ok(entity)
    }

    /// Parse an `<entity>` element.
    pub fn from_xml(node: Node<'_, '_>) -> Result<Self, LevelError> {
        let mut record = EntityRecord::new();
        record.id = node
            .attribute("id")
            .ok_or_else(|| LevelError::MissingAttribute { element: "entity", attribute: "id" })?
            .to_string();
        record.type_id = attr_str(node, "typeid", "").to_string();

        if let Some(position) = child(node, "position") {
            record.position = Vector2f::new(attr_f32(position, "x", 0.0), attr_f32(position, "y", 0.0));
            record.angle = attr_f32(position, "angle", -1.0);
            record.reversed = attr_bool(position, "reversed");
        }
        if let Some(size) = child(node, "size") {
            record.size = attr_f32(size, "r", ENTITY_DEFAULT_SIZE);
            record.width = attr_f32(size, "width", -1.0);
            record.height = attr_f32(size, "height", -1.0);
        }
        for param in children(node, "param") {
            record.set_param(attr_str(param, "name", ""), attr_str(param, "value", ""));
        }

        let mut entity = Self::from_record(record)?;

        if let (EntityKind::Joint(joint), Some(element)) = (&mut entity.kind, child(node, "joint")) {
            let joint_type = attr_str(element, "type", "");
            let start = attr_str(element, "connection-start", "");
            let end = attr_str(element, "connection-end", "");
            if !joint_type.is_empty() && !start.is_empty() && !end.is_empty() {
                joint.joint_type = JointType::from_name(joint_type);
                joint.start_block = start.to_string();
                joint.end_block = end.to_string();
            }
        }

        Ok(entity)
    }

    /// Read a level-cache record.
    pub fn read_binary(reader: &mut ByteReader<'_>) -> Result<Self, LevelError> {
        let mut record = EntityRecord::new();
        record.id = reader.read_file_string()?;
        record.type_id = reader.read_file_string()?;
        record.size = reader.read_f32()?;
        record.width = reader.read_f32()?;
        record.height = reader.read_f32()?;
        record.position.x = reader.read_f32()?;
        record.position.y = reader.read_f32()?;
        record.angle = reader.read_f32()?;
        record.reversed = reader.read_bool()?;
        for (name, value) in read_params(reader)? {
            record.set_param(&name, &value);
        }

        let mut entity = Self::from_record(record)?;

        if let EntityKind::Joint(joint) = &mut entity.kind {
            for (name, value) in read_params(reader)? {
                match name.as_str() {
                    "type" => joint.joint_type = JointType::from_name(&value),
                    "start" => joint.start_block = value,
                    "end" => joint.end_block = value,
                    _ => {}
                }
            }
        }

        Ok(entity)
    }

    /// Write a level-cache record.
    pub fn write_binary(&self, writer: &mut ByteWriter) -> Result<(), LevelError> {
        writer.write_file_string(&self.id)?;
        writer.write_file_string(self.speciality.type_id())?;
        writer.write_f32(self.size);
        writer.write_f32(self.width);
        writer.write_f32(self.height);
        writer.write_f32(self.initial_position.x);
        writer.write_f32(self.initial_position.y);
        writer.write_f32(self.draw_angle);
        writer.write_bool(self.draw_reversed);

        let mut params = vec![("z", self.z.to_string())];
        match &self.kind {
            EntityKind::ParticlesSource(source) => params.push(("type", source.kind().type_name().to_string())),
            _ if self.speciality == EntitySpeciality::None => params.push(("name", self.sprite_name.clone())),
            _ => {}
        }
        write_params(writer, &params)?;

        if let EntityKind::Joint(joint) = &self.kind {
            write_params(
                writer,
                &[
                    ("type", joint.joint_type.name().to_string()),
                    ("start", joint.start_block.clone()),
                    ("end", joint.end_block.clone()),
                ],
            )?;
        }
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Stable id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Gameplay role.
    pub fn speciality(&self) -> EntitySpeciality {
        self.speciality
    }

    /// Touching it kills the player.
    pub fn does_kill(&self) -> bool {
        self.speciality == EntitySpeciality::Kill
    }

    /// Touching it wins once every pickup is taken.
    pub fn does_make_win(&self) -> bool {
        self.speciality == EntitySpeciality::MakeWin
    }

    /// Pickup counted by the level.
    pub fn is_to_take(&self) -> bool {
        self.speciality == EntitySpeciality::IsToTake
    }

    /// Variant state.
    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    /// Emitter state, if any.
    pub fn particle_source(&self) -> Option<&ParticleSource> {
        match &self.kind {
            EntityKind::ParticlesSource(source) => Some(source),
            _ => None,
        }
    }

    /// Mutable emitter state, if any.
    pub fn particle_source_mut(&mut self) -> Option<&mut ParticleSource> {
        match &mut self.kind {
            EntityKind::ParticlesSource(source) => Some(source),
            _ => None,
        }
    }

    /// Joint parameters, if any.
    pub fn joint(&self) -> Option<&JointParams> {
        match &self.kind {
            EntityKind::Joint(joint) => Some(joint),
            _ => None,
        }
    }

    /// Checkpoint state, if any.
    pub fn checkpoint(&self) -> Option<&CheckpointState> {
        match &self.kind {
            EntityKind::Checkpoint(state) => Some(state),
            _ => None,
        }
    }

    /// Record a pass through a checkpoint. No-op on other kinds.
    pub fn activate_checkpoint(&mut self, destroyed_entities: Vec<String>, facing_right: bool) {
        if let EntityKind::Checkpoint(state) = &mut self.kind {
            state.activated = true;
            state.facing_right = facing_right;
            state.destroyed_entities = destroyed_entities;
        }
    }

    /// Forget a checkpoint pass.
    pub fn deactivate_checkpoint(&mut self) {
        if let EntityKind::Checkpoint(state) = &mut self.kind {
            state.activated = false;
        }
    }

    /// Sprite name.
    pub fn sprite_name(&self) -> &str {
        &self.sprite_name
    }

    /// Set the sprite name.
    pub fn set_sprite_name(&mut self, name: impl Into<String>) {
        self.sprite_name = name.into();
    }

    /// Collision radius.
    pub fn size(&self) -> f32 {
        self.size
    }

    /// Set the collision radius.
    pub fn set_size(&mut self, size: f32) {
        self.size = size;
        self.bbox.set(None);
    }

    /// Explicit draw width, -1 when unset.
    pub fn width(&self) -> f32 {
        self.width
    }

    /// Explicit draw height, -1 when unset.
    pub fn height(&self) -> f32 {
        self.height
    }

    /// Render depth (negative behind, positive in front).
    pub fn z(&self) -> f32 {
        self.z
    }

    /// Set the render depth.
    pub fn set_z(&mut self, z: f32) {
        self.z = z;
    }

    /// Draw angle.
    pub fn draw_angle(&self) -> f32 {
        self.draw_angle
    }

    /// Set the draw angle.
    pub fn set_draw_angle(&mut self, angle: f32) {
        self.draw_angle = angle;
    }

    /// Draw mirrored.
    pub fn draw_reversed(&self) -> bool {
        self.draw_reversed
    }

    /// Level-authored position.
    pub fn initial_position(&self) -> Vector2f {
        self.initial_position
    }

    /// Set the level-authored position (and the current one with it).
    pub fn set_initial_position(&mut self, position: Vector2f) {
        self.initial_position = position;
        self.set_dynamic_position(position);
    }

    /// Current position.
    pub fn dynamic_position(&self) -> Vector2f {
        self.dynamic_position
    }

    /// Move the entity.
    pub fn set_dynamic_position(&mut self, position: Vector2f) {
        self.dynamic_position = position;
        self.bbox.set(None);
    }

    /// Move by a delta.
    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.set_dynamic_position(self.dynamic_position + Vector2f::new(dx, dy));
    }

    /// Still in play.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Mark taken or restored.
    pub fn set_alive(&mut self, alive: bool) {
        self.alive = alive;
    }

    /// Bounding circle at the current position.
    pub fn bounding_circle(&self) -> BoundingCircle {
        BoundingCircle::new(self.dynamic_position, self.size)
    }

    // =========================================================================
    // Play cycle
    // =========================================================================

    /// Reset the current state to the authored one.
    pub fn load_to_play(&mut self) {
        self.dynamic_position = self.initial_position;
        self.alive = true;
        self.bbox.set(None);
        if let EntityKind::ParticlesSource(source) = &mut self.kind {
            source.load_to_play();
        }
    }

    /// Release per-play resources.
    pub fn unload_to_play(&mut self, ctx: &mut SimContext) {
        if let EntityKind::ParticlesSource(source) = &mut self.kind {
            source.unload_to_play(ctx);
        }
    }

    /// Animate to `time`. Only particle emitters animate.
    pub fn update_to_time(&mut self, ctx: &mut SimContext, time: i32, gravity: Vector2f) -> bool {
        match &mut self.kind {
            EntityKind::ParticlesSource(source) => source.update_to_time(ctx, self.dynamic_position, time, gravity),
            _ => false,
        }
    }
}

impl Collidable for Entity {
    type Key = ObjectId;

    fn collision_key(&self) -> ObjectId {
        self.id.clone()
    }

    fn aabb(&self) -> Aabb {
        if let Some(bbox) = self.bbox.get() {
            return bbox;
        }
        let bbox = self.bounding_circle().aabb();
        self.bbox.set(Some(bbox));
        bbox
    }
}

fn read_params(reader: &mut ByteReader<'_>) -> Result<Vec<(String, String)>, LevelError> {
    let count = reader.read_u8()?;
    let mut params = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = reader.read_file_string()?;
        let value = reader.read_file_string()?;
        params.push((name, value));
    }
    Ok(params)
}

fn write_params(writer: &mut ByteWriter, params: &[(&str, String)]) -> Result<(), LevelError> {
    writer.write_u8(params.len() as u8);
    for (name, value) in params {
        writer.write_file_string(name)?;
        writer.write_file_string(value)?;
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use roxmltree::Document;

    fn parse(xml: &str) -> Result<Entity, LevelError> {
        let doc = Document::parse(xml).unwrap();
        Entity::from_xml(doc.root_element())
    }

    #[test]
    fn test_speciality_mapping() {
        assert_eq!(EntitySpeciality::from_type_id("Strawberry"), EntitySpeciality::IsToTake);
        assert_eq!(EntitySpeciality::from_type_id("Flower"), EntitySpeciality::None);
        assert_eq!(EntitySpeciality::None.type_id(), "Sprite");
        for code in 0..8 {
            assert_eq!(EntitySpeciality::from_code(code).map(|s| s.code()), Some(code));
        }
        assert_eq!(EntitySpeciality::from_code(8), None);
    }

    #[test]
    fn test_xml_strawberry() {
        let e = parse(
            r#"<entity id="s1" typeid="Strawberry">
                 <size r="0.4"/>
                 <position x="3" y="-2" reversed="true"/>
               </entity>"#,
        )
        .unwrap();
        assert!(e.is_to_take());
        assert!(!e.does_kill());
        assert_eq!(e.size(), 0.4);
        assert_eq!(e.dynamic_position(), Vector2f::new(3.0, -2.0));
        assert!(e.draw_reversed());
        // Non-positive angles keep the default
        assert_eq!(e.draw_angle(), 0.0);
        assert_eq!(e.z(), ENTITY_DEFAULT_Z);
        assert_eq!(e.sprite_name(), "Strawberry");
    }

    #[test]
    fn test_xml_particle_source() {
        let e = parse(
            r#"<entity id="fire0" typeid="ParticleSource">
                 <param name="type" value="Fire"/>
                 <param name="z" value="0.5"/>
               </entity>"#,
        )
        .unwrap();
        assert_eq!(e.particle_source().map(|s| s.kind()), Some(ParticleKind::Fire));
        assert_eq!(e.z(), 0.5);
    }

    #[test]
    fn test_xml_invalid_particle_type() {
        let err = parse(
            r#"<entity id="bad" typeid="ParticleSource"><param name="type" value="Rain"/></entity>"#,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Entity bad has an invalid type name");
    }

    #[test]
    fn test_xml_joint() {
        let e = parse(
            r#"<entity id="j" typeid="Joint">
                 <joint type="pivot" connection-start="b1" connection-end="b2"/>
               </entity>"#,
        )
        .unwrap();
        let joint = e.joint().unwrap();
        assert_eq!(joint.joint_type, JointType::Pivot);
        assert_eq!(joint.start_block, "b1");
        assert_eq!(joint.end_block, "b2");
    }

    #[test]
    fn test_binary_record() {
        let mut sprite = Entity::new("deco", EntitySpeciality::None);
        sprite.set_sprite_name("Tree");
        sprite.set_initial_position(Vector2f::new(1.0, 2.0));
        sprite.set_z(0.0);
        let mut joint = Entity::new("j", EntitySpeciality::Joint);
        if let EntityKind::Joint(params) = &mut joint.kind {
            params.joint_type = JointType::Pin;
            params.start_block = "a".into();
            params.end_block = "b".into();
        }
        let debris = Entity::new_particle_source("d", ParticleKind::Debris);

        let mut writer = ByteWriter::new();
        for e in [&sprite, &joint, &debris] {
            e.write_binary(&mut writer).unwrap();
        }

        let mut reader = ByteReader::new(writer.as_bytes());
        let a = Entity::read_binary(&mut reader).unwrap();
        assert_eq!(a.sprite_name(), "Tree");
        assert_eq!(a.initial_position(), Vector2f::new(1.0, 2.0));
        assert_eq!(a.z(), 0.0);
        let b = Entity::read_binary(&mut reader).unwrap();
        assert_eq!(b.joint().map(|j| j.joint_type), Some(JointType::Pin));
        assert_eq!(b.joint().map(|j| j.end_block.as_str()), Some("b"));
        let c = Entity::read_binary(&mut reader).unwrap();
        assert_eq!(c.particle_source().map(|s| s.kind()), Some(ParticleKind::Debris));
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_binary_unknown_params_ignored() {
        let mut writer = ByteWriter::new();
        writer.write_file_string("w").unwrap();
        writer.write_file_string("Wrecker").unwrap();
        for v in [0.3, -1.0, -1.0, 4.0, 5.0, -1.0] {
            writer.write_f32(v);
        }
        writer.write_bool(false);
        writer.write_u8(2);
        for s in ["color", "red", "z", "1"] {
            writer.write_file_string(s).unwrap();
        }

        let e = Entity::read_binary(&mut ByteReader::new(writer.as_bytes())).unwrap();
        assert!(e.does_kill());
        assert_eq!(e.z(), 1.0);
        assert_eq!(e.size(), 0.3);
    }

    #[test]
    fn test_aabb_cache_invalidation() {
        let mut e = Entity::new("e", EntitySpeciality::None);
        e.set_size(1.0);
        let before = e.aabb();
        assert!(before.contains_point(Vector2f::new(0.9, 0.0)));
        e.translate(10.0, 0.0);
        let after = e.aabb();
        assert!(!after.contains_point(Vector2f::new(0.9, 0.0)));
        assert!(after.contains_point(Vector2f::new(10.9, 0.0)));
    }

    #[test]
    fn test_checkpoint_activation() {
        let mut e = Entity::new("cp", EntitySpeciality::Checkpoint);
        assert_eq!(e.checkpoint().map(|c| c.activated), Some(false));
        e.activate_checkpoint(vec!["s1".into()], true);
        let state = e.checkpoint().unwrap();
        assert!(state.activated && state.facing_right);
        e.deactivate_checkpoint();
        assert_eq!(e.checkpoint().map(|c| c.activated), Some(false));
    }

    #[test]
    fn test_load_to_play_resets() {
        let mut e = Entity::new("e", EntitySpeciality::IsToTake);
        e.set_initial_position(Vector2f::new(1.0, 1.0));
        e.translate(5.0, 0.0);
        e.set_alive(false);
        e.load_to_play();
        assert!(e.is_alive());
        assert_eq!(e.dynamic_position(), Vector2f::new(1.0, 1.0));
    }
}
