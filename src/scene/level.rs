//! Level Model
//!
//! A level owns its blocks, entities and joints, plus the bookkeeping the
//! scene and the replay player need: taken entities move to a destroyed
//! collection (so a rewind can bring them back), and spawned effects live
//! in an external collection.
//!
//! Batch loaders recover per record: a malformed block or entity is logged
//! and skipped, the rest of the level still loads.

use roxmltree::Document;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::block::{Block, BlockVertex, GROUP_BACKGROUND, GROUP_FOREGROUND};
use super::context::SimContext;
use super::entity::{Entity, EntitySpeciality};
use super::xml::{attr_bool, attr_f32, child, children};
use crate::collision::{CollisionError, CollisionSystem, Line, LineSource};
use crate::core::buffer::{BufferError, ByteReader, ByteWriter};
use crate::core::vec2::Vector2f;

/// Version tag of the binary level cache.
pub const LEVEL_CACHE_FORMAT: i32 = 1;

/// Distance the border blocks extend past the limits.
pub const LIMITS_MARGIN: f32 = 20.0;

/// Ids of the generated border blocks.
pub const LIMIT_BLOCK_IDS: [&str; 4] = ["LEVEL_TOP", "LEVEL_BOTTOM", "LEVEL_LEFT", "LEVEL_RIGHT"];

/// Level loading and bookkeeping errors.
#[derive(Debug, Error)]
pub enum LevelError {
    /// Malformed XML.
    #[error("Unable to analyze xml file: {0}")]
    Xml(#[from] roxmltree::Error),

    /// Root element is not `<level>`.
    #[error("Not a level document (root element <{0}>)")]
    NotALevel(String),

    /// Required attribute absent.
    #[error("Attribute '{attribute}' missing on <{element}>")]
    MissingAttribute {
        /// Element name
        element: &'static str,
        /// Attribute name
        attribute: &'static str,
    },

    /// Particle source with an unknown `type` parameter.
    #[error("Entity {0} has an invalid type name")]
    InvalidEntityType(String),

    /// Entity id unknown to the level.
    #[error("Entity '{0}' not found")]
    UnknownEntity(String),

    /// Block id unknown to the level.
    #[error("Block '{0}' not found")]
    UnknownBlock(String),

    /// Block on a parallax layer the level does not declare.
    #[error("Block '{block}' has layer {layer} but the level has {layers} layers")]
    InvalidLayer {
        /// Block id
        block: String,
        /// Requested layer
        layer: i32,
        /// Declared layers
        layers: usize,
    },

    /// Binary cache written by another format version.
    #[error("Old level cache format ({0})")]
    CacheFormat(i32),

    /// Truncated or malformed binary record.
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// Collision registration failure.
    #[error(transparent)]
    Collision(#[from] CollisionError),
}

/// Parallax layer declaration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerOffset {
    /// Scroll factor
    pub offset: Vector2f,
    /// Drawn in front of the main layer
    pub front: bool,
}

/// One level.
#[derive(Clone, Debug)]
pub struct Level {
    id: String,
    name: String,
    left: f32,
    right: f32,
    top: f32,
    bottom: f32,
    layer_offsets: Vec<LayerOffset>,
    is_physics: bool,
    player_start: Vector2f,

    blocks: Vec<Block>,
    entities: Vec<Entity>,
    joints: Vec<Entity>,
    destroyed: Vec<Entity>,
    externs: Vec<Entity>,
    to_take: usize,
}

impl Level {
    /// Create an empty level with the default -50..50 limits.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            left: -50.0,
            right: 50.0,
            top: 50.0,
            bottom: -50.0,
            layer_offsets: Vec::new(),
            is_physics: false,
            player_start: Vector2f::ZERO,
            blocks: Vec::new(),
            entities: Vec::new(),
            joints: Vec::new(),
            destroyed: Vec::new(),
            externs: Vec::new(),
            to_take: 0,
        }
    }

    /// Parse a level document.
    pub fn from_xml_str(xml: &str) -> Result<Self, LevelError> {
        let doc = Document::parse(xml)?;
        let root = doc.root_element();
        if !root.has_tag_name("level") {
            return Err(LevelError::NotALevel(root.tag_name().name().to_string()));
        }

        let id = match root.attribute("id") {
            Some(id) if !id.is_empty() => id,
            _ => return Err(LevelError::MissingAttribute { element: "level", attribute: "id" }),
        };
        let mut level = Level::new(id);

        if let Some(name) = child(root, "info").and_then(|info| child(info, "name")) {
            level.name = name.text().unwrap_or_default().to_string();
        }

        if let Some(offsets) = child(root, "layeroffsets") {
            for layer in children(offsets, "layeroffset") {
                level.layer_offsets.push(LayerOffset {
                    offset: Vector2f::new(attr_f32(layer, "x", 0.0), attr_f32(layer, "y", 0.0)),
                    front: attr_bool(layer, "frontlayer"),
                });
            }
        }

        if let Some(limits) = child(root, "limits") {
            level.bottom = attr_f32(limits, "bottom", -50.0);
            level.left = attr_f32(limits, "left", -50.0);
            level.top = attr_f32(limits, "top", 50.0);
            level.right = attr_f32(limits, "right", 50.0);
        }

        for node in children(root, "block") {
            match Block::from_xml(node) {
                Ok(block) => level.push_block(block),
                Err(e) => warn!(level = %level.id, error = %e, "Skipping block"),
            }
        }

        for node in children(root, "entity") {
            match Entity::from_xml(node) {
                Ok(entity) => level.push_entity(entity),
                Err(e) => warn!(level = %level.id, error = %e, "Skipping entity"),
            }
        }

        level.finish_load()?;
        info!(
            level = %level.id,
            blocks = level.blocks.len(),
            entities = level.entities.len(),
            joints = level.joints.len(),
            "Level loaded"
        );
        Ok(level)
    }

    /// Read a binary level cache.
    pub fn read_binary(data: &[u8]) -> Result<Self, LevelError> {
        let mut reader = ByteReader::new(data);
        let format = reader.read_i32()?;
        if format != LEVEL_CACHE_FORMAT {
            return Err(LevelError::CacheFormat(format));
        }

        let mut level = Level::new(reader.read_file_string()?);
        level.name = reader.read_file_string()?;
        level.left = reader.read_f32()?;
        level.right = reader.read_f32()?;
        level.top = reader.read_f32()?;
        level.bottom = reader.read_f32()?;

        let layers = reader.read_i32()?;
        for _ in 0..layers.max(0) {
            let x = reader.read_f32()?;
            let y = reader.read_f32()?;
            let front = reader.read_bool()?;
            level.layer_offsets.push(LayerOffset { offset: Vector2f::new(x, y), front });
        }

        let blocks = reader.read_i32()?;
        for _ in 0..blocks.max(0) {
            let mut block = Block::read_binary(&mut reader)?;
            block.set_flags(block.is_background(), block.is_dynamic(), block.is_layer(), reader.read_bool()?);
            level.push_block(block);
        }

        // Entity records are read whole before validation, so a bad one
        // leaves the reader aligned on the next
        let entities = reader.read_i32()?;
        for _ in 0..entities.max(0) {
            match Entity::read_binary(&mut reader) {
                Ok(entity) => level.push_entity(entity),
                Err(LevelError::InvalidEntityType(id)) => {
                    warn!(level = %level.id, entity = %id, "Skipping entity with an invalid type name")
                }
                Err(e) => return Err(e),
            }
        }

        level.finish_load()?;
        debug!(level = %level.id, bytes = data.len(), "Level read from cache");
        Ok(level)
    }

    /// Write the binary level cache (border blocks excluded).
    pub fn write_binary(&self) -> Result<Vec<u8>, LevelError> {
        let mut writer = ByteWriter::new();
        writer.write_i32(LEVEL_CACHE_FORMAT);
        writer.write_file_string(&self.id)?;
        writer.write_file_string(&self.name)?;
        writer.write_f32(self.left);
        writer.write_f32(self.right);
        writer.write_f32(self.top);
        writer.write_f32(self.bottom);

        writer.write_i32(self.layer_offsets.len() as i32);
        for layer in &self.layer_offsets {
            writer.write_f32(layer.offset.x);
            writer.write_f32(layer.offset.y);
            writer.write_bool(layer.front);
        }

        let blocks: Vec<&Block> = self.blocks.iter().filter(|b| !LIMIT_BLOCK_IDS.contains(&b.id())).collect();
        writer.write_i32(blocks.len() as i32);
        for block in blocks {
            block.write_binary(&mut writer)?;
            writer.write_bool(block.is_physics());
        }

        writer.write_i32((self.entities.len() + self.joints.len()) as i32);
        for entity in self.entities.iter().chain(&self.joints) {
            entity.write_binary(&mut writer)?;
        }
        Ok(writer.into_bytes())
    }

    fn push_block(&mut self, block: Block) {
        if block.is_physics() {
            self.is_physics = true;
        }
        self.blocks.push(block);
    }

    fn push_entity(&mut self, entity: Entity) {
        if entity.speciality() == EntitySpeciality::Joint {
            self.joints.push(entity);
        } else {
            self.entities.push(entity);
        }
    }

    /// Layer validation, player start and border blocks.
    fn finish_load(&mut self) -> Result<(), LevelError> {
        for block in &self.blocks {
            let layer = block.layer();
            if layer != -1 && (layer < 0 || layer as usize >= self.layer_offsets.len()) {
                return Err(LevelError::InvalidLayer {
                    block: block.id().to_string(),
                    layer,
                    layers: self.layer_offsets.len(),
                });
            }
        }

        match self.entities.iter().find(|e| e.speciality() == EntitySpeciality::IsStart) {
            Some(start) => self.player_start = start.initial_position(),
            None => {
                warn!(level = %self.id, "No player start entity");
                self.player_start = Vector2f::ZERO;
            }
        }

        self.add_limits();
        Ok(())
    }

    /// Surround the play area with four front-layer border blocks.
    fn add_limits(&mut self) {
        let (l, r, t, b, m) = (self.left, self.right, self.top, self.bottom, LIMITS_MARGIN);
        let outlines = [
            [(l - m, t + m), (r + m, t + m), (r, t), (l, t)],
            [(r, b), (r + m, b - m), (l - m, b - m), (l, b)],
            [(l, t), (l, b), (l - m, b - m), (l - m, t + m)],
            [(r, t), (r + m, t + m), (r + m, b - m), (r, b)],
        ];
        for (id, outline) in LIMIT_BLOCK_IDS.iter().zip(outlines) {
            let mut block = Block::new(*id);
            for (x, y) in outline {
                block.add_vertex(BlockVertex::new(Vector2f::new(x, y), ""));
            }
            block.set_flags(false, false, true, false);
            self.blocks.push(block);
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Level id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lower-left corner of the play area.
    pub fn min(&self) -> Vector2f {
        Vector2f::new(self.left, self.bottom)
    }

    /// Upper-right corner of the play area.
    pub fn max(&self) -> Vector2f {
        Vector2f::new(self.right, self.top)
    }

    /// Parallax layers.
    pub fn layer_offsets(&self) -> &[LayerOffset] {
        &self.layer_offsets
    }

    /// At least one block is physics driven.
    pub fn is_physics(&self) -> bool {
        self.is_physics
    }

    /// Start position of the players.
    pub fn player_start(&self) -> Vector2f {
        self.player_start
    }

    /// Every block, border blocks included.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Block by id.
    pub fn block(&self, id: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id() == id)
    }

    /// Mutable block by id.
    pub fn block_mut(&mut self, id: &str) -> Option<&mut Block> {
        self.blocks.iter_mut().find(|b| b.id() == id)
    }

    /// Entities in play.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Joints.
    pub fn joints(&self) -> &[Entity] {
        &self.joints
    }

    /// Entities taken or killed so far.
    pub fn destroyed_entities(&self) -> &[Entity] {
        &self.destroyed
    }

    /// Entities spawned during play (effects).
    pub fn extern_entities(&self) -> &[Entity] {
        &self.externs
    }

    /// Search entities in play, then destroyed ones, then spawned ones.
    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities
            .iter()
            .chain(&self.destroyed)
            .chain(&self.externs)
            .find(|e| e.id() == id)
    }

    /// Mutable variant of [`Level::entity`].
    pub fn entity_mut(&mut self, id: &str) -> Option<&mut Entity> {
        self.entities
            .iter_mut()
            .chain(self.destroyed.iter_mut())
            .chain(self.externs.iter_mut())
            .find(|e| e.id() == id)
    }

    /// Pickups left.
    pub fn count_to_take_entities(&self) -> usize {
        self.to_take
    }

    // =========================================================================
    // Play cycle
    // =========================================================================

    /// Reset every object and register it in `collision`.
    pub fn load_to_play(&mut self, ctx: &mut SimContext, collision: &mut CollisionSystem) -> Result<(), LevelError> {
        self.restore_destroyed();
        self.externs.clear();

        let offsets: Vec<Vector2f> = self.layer_offsets.iter().map(|l| l.offset).collect();
        collision.reset();
        collision.set_dims(self.min(), self.max(), &offsets);

        for block in &mut self.blocks {
            block.load_to_play(collision)?;
        }

        self.to_take = 0;
        for entity in &mut self.entities {
            entity.load_to_play();
            collision.add_entity(entity)?;
            if entity.is_to_take() {
                self.to_take += 1;
            }
        }

        for joint in &mut self.joints {
            joint.load_to_play();
            let Some(params) = joint.joint() else { continue };
            let (start, end) = (params.start_block.clone(), params.end_block.clone());
            link_joint(&mut self.blocks, &start, &end, ctx);
        }

        info!(level = %self.id, to_take = self.to_take, lines = collision.lines().len(), "Level ready to play");
        Ok(())
    }

    /// Release per-play state.
    pub fn unload_to_play(&mut self, ctx: &mut SimContext) {
        self.restore_destroyed();
        for entity in self.entities.iter_mut().chain(self.externs.iter_mut()) {
            entity.unload_to_play(ctx);
        }
        self.externs.clear();
        for block in &mut self.blocks {
            block.unload_to_play();
        }
    }

    fn restore_destroyed(&mut self) {
        for mut entity in self.destroyed.drain(..) {
            entity.set_alive(true);
            self.entities.push(entity);
        }
    }

    /// Animate entities and spawned effects.
    pub fn update_to_time(&mut self, ctx: &mut SimContext, time: i32, gravity: Vector2f) {
        for entity in self.entities.iter_mut().chain(self.externs.iter_mut()) {
            entity.update_to_time(ctx, time, gravity);
        }
    }

    /// Move an entity to the destroyed collection.
    pub fn kill_entity(&mut self, id: &str) -> Result<(), LevelError> {
        let index = self
            .entities
            .iter()
            .position(|e| e.id() == id)
            .ok_or_else(|| LevelError::UnknownEntity(id.to_string()))?;

        let mut entity = self.entities.remove(index);
        if entity.is_to_take() {
            self.to_take = self.to_take.saturating_sub(1);
        }
        entity.set_alive(false);
        self.destroyed.push(entity);
        Ok(())
    }

    /// Bring a destroyed entity back into play.
    pub fn revert_entity_destroyed(&mut self, id: &str, collision: &mut CollisionSystem) -> Result<(), LevelError> {
        let index = self
            .destroyed
            .iter()
            .position(|e| e.id() == id)
            .ok_or_else(|| LevelError::UnknownEntity(id.to_string()))?;

        let mut entity = self.destroyed.remove(index);
        entity.set_alive(true);
        if entity.is_to_take() {
            self.to_take += 1;
        }
        collision.add_entity(&entity)?;
        self.entities.push(entity);
        Ok(())
    }

    /// Add an entity created during play.
    pub fn spawn_entity(&mut self, entity: Entity) {
        if entity.is_to_take() {
            self.to_take += 1;
        }
        self.externs.push(entity);
    }
}

impl LineSource for Level {
    fn block_lines(&self, block_id: &str) -> Option<&[Line]> {
        self.block(block_id)
            .filter(|b| b.is_dynamic() && !b.is_background())
            .map(|b| b.collision_lines())
    }
}

/// Put two jointed physics blocks in a shared collision group.
///
/// A block already in a joint group lends it to the other; otherwise the
/// next group is taken from the context. Background blocks keep their group.
fn link_joint(blocks: &mut [Block], start: &str, end: &str, ctx: &mut SimContext) {
    let group_of = |blocks: &[Block], id: &str| {
        blocks.iter().find(|b| b.id() == id && b.is_physics()).map(|b| b.collision_group())
    };
    let (Some(group1), Some(group2)) = (group_of(blocks, start), group_of(blocks, end)) else {
        return;
    };

    let is_joint_group = |g: u32| g != GROUP_FOREGROUND && g != GROUP_BACKGROUND;
    let group = if is_joint_group(group1) {
        group1
    } else if is_joint_group(group2) {
        group2
    } else {
        ctx.next_collision_group()
    };

    for block in blocks.iter_mut().filter(|b| b.id() == start || b.id() == end) {
        if block.collision_group() != GROUP_BACKGROUND {
            block.set_collision_group(group);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::Collidable;
    use crate::core::aabb::Aabb;

    const LEVEL: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<level id="test_level">
  <info><name>Test Level</name></info>
  <layeroffsets><layeroffset x="0.5" y="0.5" frontlayer="false"/></layeroffsets>
  <limits left="-20" right="40" top="20" bottom="-10"/>
  <block id="ground">
    <position x="0" y="0"/>
    <vertex x="-10" y="-5"/><vertex x="30" y="-5"/><vertex x="30" y="0"/><vertex x="-10" y="0"/>
  </block>
  <block id="door">
    <position x="10" y="2" dynamic="true"/>
    <vertex x="0" y="0"/><vertex x="1" y="0"/><vertex x="1" y="3"/><vertex x="0" y="3"/>
  </block>
  <block id="arm1">
    <position x="15" y="2" dynamic="true" physics="true"/>
    <vertex x="0" y="0"/><vertex x="1" y="0"/><vertex x="1" y="1"/>
  </block>
  <block id="arm2">
    <position x="17" y="2" dynamic="true" physics="true"/>
    <vertex x="0" y="0"/><vertex x="1" y="0"/><vertex x="1" y="1"/>
  </block>
  <block id="far" >
    <position x="0" y="5" islayer="true" layerid="0"/>
    <vertex x="0" y="0"/><vertex x="1" y="0"/><vertex x="1" y="1"/>
  </block>
  <entity id="start" typeid="PlayerStart"><position x="1" y="1"/></entity>
  <entity id="s1" typeid="Strawberry"><position x="5" y="1"/></entity>
  <entity id="s2" typeid="Strawberry"><position x="12" y="1"/></entity>
  <entity id="flower" typeid="EndOfLevel"><position x="25" y="1"/></entity>
  <entity id="smoke" typeid="ParticleSource"><param name="type" value="Smoke"/></entity>
  <entity id="broken" typeid="ParticleSource"><param name="type" value="Lava"/></entity>
  <entity id="j1" typeid="Joint">
    <joint type="pin" connection-start="arm1" connection-end="arm2"/>
  </entity>
</level>"#;

    fn loaded() -> (Level, SimContext, CollisionSystem) {
        let mut level = Level::from_xml_str(LEVEL).unwrap();
        let mut ctx = SimContext::new(1);
        let mut collision = CollisionSystem::new();
        level.load_to_play(&mut ctx, &mut collision).unwrap();
        (level, ctx, collision)
    }

    #[test]
    fn test_xml_load() {
        let level = Level::from_xml_str(LEVEL).unwrap();
        assert_eq!(level.id(), "test_level");
        assert_eq!(level.name(), "Test Level");
        assert_eq!(level.min(), Vector2f::new(-20.0, -10.0));
        assert_eq!(level.max(), Vector2f::new(40.0, 20.0));
        assert!(level.is_physics());
        assert_eq!(level.player_start(), Vector2f::new(1.0, 1.0));
        // The invalid particle source is skipped, the joint is kept apart
        assert_eq!(level.entities().len(), 5);
        assert!(level.entity("broken").is_none());
        assert_eq!(level.joints().len(), 1);
        // 5 authored blocks + 4 borders
        assert_eq!(level.blocks().len(), 9);
        assert!(level.block("LEVEL_TOP").map(|b| b.is_layer()).unwrap_or(false));
    }

    #[test]
    fn test_missing_id_and_bad_layer() {
        assert!(matches!(
            Level::from_xml_str(r#"<level><limits/></level>"#),
            Err(LevelError::MissingAttribute { element: "level", .. })
        ));
        let bad = r#"<level id="x"><block id="b"><position islayer="true" layerid="3"/></block></level>"#;
        assert!(matches!(Level::from_xml_str(bad), Err(LevelError::InvalidLayer { layer: 3, .. })));
        assert!(matches!(Level::from_xml_str("<notalevel/>"), Err(LevelError::NotALevel(_))));
        assert!(matches!(Level::from_xml_str("<level"), Err(LevelError::Xml(_))));
    }

    #[test]
    fn test_load_to_play_registers_everything() {
        let (level, _ctx, mut collision) = loaded();
        assert_eq!(level.count_to_take_entities(), 2);

        let near = collision.entities_near(&Aabb::around_circle(Vector2f::new(5.0, 1.0), 0.5));
        assert_eq!(near, vec!["s1".to_string()]);

        let near = collision.dyn_blocks_near(&Aabb::around_circle(Vector2f::new(10.5, 3.0), 0.2));
        assert_eq!(near, vec!["door".to_string()]);

        // Ground (4) and borders (4 x 4) are static lines
        assert_eq!(collision.lines().len(), 20);
        let layer = collision.blocks_near_in_layer(&Aabb::around_circle(Vector2f::new(0.5, 5.5), 0.2), 0).unwrap();
        assert_eq!(layer, vec!["far".to_string()]);
    }

    #[test]
    fn test_joint_shares_collision_group() {
        let (level, ctx, _collision) = loaded();
        let g1 = level.block("arm1").map(|b| b.collision_group());
        let g2 = level.block("arm2").map(|b| b.collision_group());
        assert_eq!(g1, Some(2));
        assert_eq!(g1, g2);
        assert_eq!(ctx.current_collision_group(), 3);
    }

    #[test]
    fn test_kill_and_revert() {
        let (mut level, _ctx, mut collision) = loaded();
        collision.remove_entity("s1").unwrap();
        level.kill_entity("s1").unwrap();
        assert_eq!(level.count_to_take_entities(), 1);
        assert!(level.entities().iter().all(|e| e.id() != "s1"));
        assert_eq!(level.destroyed_entities().len(), 1);
        assert!(!level.entity("s1").unwrap().is_alive());
        assert!(matches!(level.kill_entity("s1"), Err(LevelError::UnknownEntity(_))));

        level.revert_entity_destroyed("s1", &mut collision).unwrap();
        assert_eq!(level.count_to_take_entities(), 2);
        assert!(level.entity("s1").unwrap().is_alive());
        let near = collision.entities_near(&Aabb::around_circle(Vector2f::new(5.0, 1.0), 0.5));
        assert_eq!(near, vec!["s1".to_string()]);
        assert!(matches!(
            level.revert_entity_destroyed("s1", &mut collision),
            Err(LevelError::UnknownEntity(_))
        ));
    }

    #[test]
    fn test_spawned_entities_are_searched_last() {
        let (mut level, mut ctx, _collision) = loaded();
        let mut stars = Entity::new_particle_source("stars", crate::scene::particles::ParticleKind::Star);
        stars.set_initial_position(Vector2f::new(5.0, 1.0));
        stars.load_to_play();
        level.spawn_entity(stars);
        assert!(level.entity("stars").is_some());

        level.update_to_time(&mut ctx, 10, Vector2f::new(0.0, -9.81));
        level.unload_to_play(&mut ctx);
        assert!(level.extern_entities().is_empty());
        assert_eq!(ctx.live_particles(), 0);
    }

    #[test]
    fn test_line_source_only_foreground_dynamic() {
        let (level, _ctx, _collision) = loaded();
        assert_eq!(level.block_lines("door").map(|l| l.len()), Some(4));
        assert_eq!(level.block_lines("ground").map(|l| l.len()), None);
    }

    #[test]
    fn test_circle_hits_dynamic_block() {
        let (level, _ctx, mut collision) = loaded();
        assert!(collision.check_circle(10.0, 3.0, 0.3, &level));
        assert!(!collision.check_circle(5.0, 8.0, 0.3, &level));
    }

    #[test]
    fn test_binary_cache() {
        let level = Level::from_xml_str(LEVEL).unwrap();
        let bytes = level.write_binary().unwrap();
        let back = Level::read_binary(&bytes).unwrap();
        assert_eq!(back.id(), level.id());
        assert_eq!(back.name(), level.name());
        assert_eq!(back.max(), level.max());
        assert_eq!(back.blocks().len(), level.blocks().len());
        assert_eq!(back.entities().len(), level.entities().len());
        assert_eq!(back.joints().len(), 1);
        assert!(back.is_physics());
        assert_eq!(back.player_start(), level.player_start());
        let door = back.block("door").unwrap();
        assert_eq!(door.aabb(), level.block("door").unwrap().aabb());

        let mut wrong = bytes.clone();
        wrong[0] = 9;
        assert!(matches!(Level::read_binary(&wrong), Err(LevelError::CacheFormat(9))));
    }
}
