//! Blocks
//!
//! Polygonal level geometry. Static blocks feed the line grid once at load
//! time; dynamic blocks carry their own collision lines, rebuilt from the
//! vertices every time their position or rotation changes.

use std::cell::Cell;

use roxmltree::Node;

use super::level::LevelError;
use super::xml::{attr_bool, attr_f32, attr_i32, attr_str, child, children};
use crate::collision::{Collidable, CollisionSystem, Line, ObjectId};
use crate::core::aabb::Aabb;
use crate::core::buffer::{ByteReader, ByteWriter};
use crate::core::vec2::Vector2f;

/// Texture of blocks without `<usetexture>`.
pub const DEFAULT_BLOCK_TEXTURE: &str = "default";

/// Grip of blocks without `<physics grip>`.
pub const DEFAULT_BLOCK_GRIP: f32 = 20.0;

/// Physics collision group of foreground blocks.
pub const GROUP_FOREGROUND: u32 = 0;

/// Physics collision group of background blocks.
pub const GROUP_BACKGROUND: u32 = 1;

/// Polygon vertex, relative to the block position.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockVertex {
    /// Position relative to the block
    pub position: Vector2f,
    /// Edge decoration name (may be empty)
    pub edge_effect: String,
}

impl BlockVertex {
    /// Create a vertex.
    pub fn new(position: Vector2f, edge_effect: impl Into<String>) -> Self {
        Self { position, edge_effect: edge_effect.into() }
    }
}

/// One level block.
#[derive(Clone, Debug)]
pub struct Block {
    id: String,
    background: bool,
    dynamic: bool,
    is_layer: bool,
    layer: i32,
    physics: bool,
    texture: String,
    grip: f32,
    initial_position: Vector2f,
    initial_rotation: f32,
    vertices: Vec<BlockVertex>,

    dynamic_position: Vector2f,
    dynamic_rotation: f32,
    rotation_center: Vector2f,
    position_center: Vector2f,
    collision_lines: Vec<Line>,
    collision_group: u32,
    bbox: Cell<Option<Aabb>>,
}

impl Block {
    /// Create an empty static block.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            background: false,
            dynamic: false,
            is_layer: false,
            layer: -1,
            physics: false,
            texture: DEFAULT_BLOCK_TEXTURE.to_string(),
            grip: DEFAULT_BLOCK_GRIP,
            initial_position: Vector2f::ZERO,
            initial_rotation: 0.0,
            vertices: Vec::new(),
            dynamic_position: Vector2f::ZERO,
            dynamic_rotation: 0.0,
            rotation_center: Vector2f::ZERO,
            position_center: Vector2f::ZERO,
            collision_lines: Vec::new(),
            collision_group: GROUP_FOREGROUND,
            bbox: Cell::new(None),
        }
    }

    /// Parse a `<block>` element.
    pub fn from_xml(node: Node<'_, '_>) -> Result<Self, LevelError> {
        let id = node
            .attribute("id")
            .ok_or(LevelError::MissingAttribute { element: "block", attribute: "id" })?;
        let mut block = Block::new(id);

        if let Some(texture) = child(node, "usetexture") {
            block.texture = attr_str(texture, "id", DEFAULT_BLOCK_TEXTURE).to_string();
        }
        if let Some(position) = child(node, "position") {
            block.set_initial_position(Vector2f::new(attr_f32(position, "x", 0.0), attr_f32(position, "y", 0.0)));
            block.background = attr_bool(position, "background");
            block.dynamic = attr_bool(position, "dynamic");
            block.is_layer = attr_bool(position, "islayer");
            block.layer = attr_i32(position, "layerid", -1);
            block.physics = attr_bool(position, "physics");
        }
        if let Some(physics) = child(node, "physics") {
            block.grip = attr_f32(physics, "grip", DEFAULT_BLOCK_GRIP);
        }
        for vertex in children(node, "vertex") {
            block.vertices.push(BlockVertex::new(
                Vector2f::new(attr_f32(vertex, "x", 0.0), attr_f32(vertex, "y", 0.0)),
                attr_str(vertex, "edge", ""),
            ));
        }
        Ok(block)
    }

    /// Read a level-cache record.
    pub fn read_binary(reader: &mut ByteReader<'_>) -> Result<Self, LevelError> {
        let mut block = Block::new(reader.read_file_string()?);
        block.background = reader.read_bool()?;
        block.dynamic = reader.read_bool()?;
        block.is_layer = reader.read_bool()?;
        block.layer = reader.read_i32()?;
        block.texture = reader.read_file_string()?;
        let x = reader.read_f32()?;
        let y = reader.read_f32()?;
        block.set_initial_position(Vector2f::new(x, y));
        block.grip = reader.read_f32()?;

        let count = reader.read_u16()?;
        block.vertices.reserve(count as usize);
        for _ in 0..count {
            let x = reader.read_f32()?;
            let y = reader.read_f32()?;
            let edge = reader.read_file_string()?;
            block.vertices.push(BlockVertex::new(Vector2f::new(x, y), edge));
        }
        Ok(block)
    }

    /// Write a level-cache record.
    pub fn write_binary(&self, writer: &mut ByteWriter) -> Result<(), LevelError> {
        writer.write_file_string(&self.id)?;
        writer.write_bool(self.background);
        writer.write_bool(self.dynamic);
        writer.write_bool(self.is_layer);
        writer.write_i32(self.layer);
        writer.write_file_string(&self.texture)?;
        writer.write_f32(self.initial_position.x);
        writer.write_f32(self.initial_position.y);
        writer.write_f32(self.grip);
        writer.write_u16(self.vertices.len() as u16);
        for vertex in &self.vertices {
            writer.write_f32(vertex.position.x);
            writer.write_f32(vertex.position.y);
            writer.write_file_string(&vertex.edge_effect)?;
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

    /// Drawn behind the bike, no collision.
    pub fn is_background(&self) -> bool {
        self.background
    }

    /// Moved by scripts or physics.
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Front layer or parallax layer block.
    pub fn is_layer(&self) -> bool {
        self.is_layer
    }

    /// Parallax layer index, -1 for none.
    pub fn layer(&self) -> i32 {
        self.layer
    }

    /// Driven by the physics engine.
    pub fn is_physics(&self) -> bool {
        self.physics
    }

    /// Texture name.
    pub fn texture(&self) -> &str {
        &self.texture
    }

    /// Wheel grip.
    pub fn grip(&self) -> f32 {
        self.grip
    }

    /// Polygon.
    pub fn vertices(&self) -> &[BlockVertex] {
        &self.vertices
    }

    /// Level-authored position.
    pub fn initial_position(&self) -> Vector2f {
        self.initial_position
    }

    /// Current position.
    pub fn dynamic_position(&self) -> Vector2f {
        self.dynamic_position
    }

    /// Current rotation (radians).
    pub fn dynamic_rotation(&self) -> f32 {
        self.dynamic_rotation
    }

    /// Rotation pivot, relative to the block.
    pub fn rotation_center(&self) -> Vector2f {
        self.rotation_center
    }

    /// Position of the pivot in world space.
    pub fn dynamic_position_center(&self) -> Vector2f {
        self.dynamic_position + self.position_center
    }

    /// Collision lines of a loaded dynamic block.
    pub fn collision_lines(&self) -> &[Line] {
        &self.collision_lines
    }

    /// Physics collision group.
    pub fn collision_group(&self) -> u32 {
        self.collision_group
    }

    /// Change the physics collision group.
    pub fn set_collision_group(&mut self, group: u32) {
        self.collision_group = group;
    }

    // =========================================================================
    // Mutators
    // =========================================================================

    /// Set the authored position (and the current one with it).
    pub fn set_initial_position(&mut self, position: Vector2f) {
        self.initial_position = position;
        self.set_dynamic_position(position);
    }

    /// Set the flags.
    pub fn set_flags(&mut self, background: bool, dynamic: bool, is_layer: bool, physics: bool) {
        self.background = background;
        self.dynamic = dynamic;
        self.is_layer = is_layer;
        self.physics = physics;
    }

    /// Set the parallax layer.
    pub fn set_layer(&mut self, layer: i32) {
        self.layer = layer;
    }

    /// Set the texture.
    pub fn set_texture(&mut self, texture: impl Into<String>) {
        self.texture = texture.into();
    }

    /// Append a vertex.
    pub fn add_vertex(&mut self, vertex: BlockVertex) {
        self.vertices.push(vertex);
        self.bbox.set(None);
    }

    /// Move the block.
    pub fn set_dynamic_position(&mut self, position: Vector2f) {
        self.dynamic_position = position;
        self.update_collision_lines();
    }

    /// Move by a delta.
    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.set_dynamic_position(self.dynamic_position + Vector2f::new(dx, dy));
    }

    /// Move so that the pivot lands on `position`.
    pub fn set_dynamic_position_according_to_center(&mut self, position: Vector2f) {
        self.dynamic_position = position - self.position_center;
        self.update_collision_lines();
    }

    /// Rotate around the pivot. Returns true when the rotation changed.
    pub fn set_dynamic_rotation(&mut self, rotation: f32) -> bool {
        if rotation == self.dynamic_rotation {
            return false;
        }
        self.dynamic_rotation = rotation;
        self.update_collision_lines();
        true
    }

    /// Set the pivot, relative to the block.
    pub fn set_center(&mut self, center: Vector2f) {
        self.rotation_center = center;
        self.position_center = center;
        self.bbox.set(None);
    }

    fn update_collision_lines(&mut self) {
        self.bbox.set(None);
        if !self.dynamic || self.collision_lines.is_empty() {
            return;
        }

        let (sin, cos) = self.dynamic_rotation.sin_cos();
        let offset = self.dynamic_position + self.rotation_center;
        let transform = |p: Vector2f| {
            let d = p - self.rotation_center;
            Vector2f::new(d.x * cos - d.y * sin, d.x * sin + d.y * cos) + offset
        };

        let n = self.vertices.len();
        for (i, line) in self.collision_lines.iter_mut().enumerate().take(n) {
            let a = transform(self.vertices[i].position);
            let b = transform(self.vertices[(i + 1) % n].position);
            line.x1 = a.x;
            line.y1 = a.y;
            line.x2 = b.x;
            line.y2 = b.y;
        }
    }

    // =========================================================================
    // Play cycle
    // =========================================================================

    /// Reset the current state and register the block in `collision`.
    ///
    /// Main-layer static foreground blocks become static lines; dynamic
    /// blocks get collision lines and go to the dynamic index; other static
    /// blocks go to the main or front static index; parallax layer blocks
    /// go to their layer index.
    pub fn load_to_play(&mut self, collision: &mut CollisionSystem) -> Result<(), LevelError> {
        self.dynamic_position = self.initial_position;
        self.dynamic_rotation = self.initial_rotation;
        self.rotation_center = Vector2f::ZERO;
        self.position_center = Vector2f::ZERO;
        self.collision_group = if self.background { GROUP_BACKGROUND } else { GROUP_FOREGROUND };
        self.collision_lines.clear();
        self.bbox.set(None);

        let n = self.vertices.len();
        for i in 0..n {
            let a = self.dynamic_position + self.vertices[i].position;
            let b = self.dynamic_position + self.vertices[(i + 1) % n].position;

            if !self.background && !self.dynamic && self.layer == -1 {
                collision.define_line(a.x, a.y, b.x, b.y, self.grip);
            }
            if !self.is_layer && self.dynamic {
                self.collision_lines.push(Line::new(0.0, 0.0, 0.0, 0.0, self.grip));
            }
        }

        if !self.is_layer && self.dynamic {
            self.update_collision_lines();
            collision.add_dyn_block(self)?;
        }
        if !self.dynamic && self.layer == -1 {
            collision.add_static_block(self, self.is_layer)?;
        }
        if self.is_layer && self.layer >= 0 {
            collision.add_block_in_layer(self, self.layer as usize)?;
        }
        Ok(())
    }

    /// Drop the per-play collision lines.
    pub fn unload_to_play(&mut self) {
        self.collision_lines.clear();
        self.bbox.set(None);
    }
}

impl Collidable for Block {
    type Key = ObjectId;

    fn collision_key(&self) -> ObjectId {
        self.id.clone()
    }

    fn aabb(&self) -> Aabb {
        if let Some(bbox) = self.bbox.get() {
            return bbox;
        }

        let mut bbox = Aabb::empty();
        if self.dynamic {
            // Line n ends where line n+1 starts
            for line in &self.collision_lines {
                bbox.add_point(line.start());
            }
        } else {
            for vertex in &self.vertices {
                bbox.add_point(self.dynamic_position + vertex.position);
            }
        }
        self.bbox.set(Some(bbox));
        bbox
    }
}

// =============================================================================
// TESTS
// =============================================================================
