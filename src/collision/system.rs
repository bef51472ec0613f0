//! Collision System
//!
//! Composes the per-category grid indices with a static line grid used by
//! the narrow-phase wheel checks.
//!
//! Cells are fixed to roughly 3x3 world units whatever the level size.

use serde::{Serialize, Deserialize};
use tracing::debug;

use super::geometry::{check_circle_and_line, Line};
use super::grid::{Collidable, CollisionError, ElementHandler, CD_EPSILON};
use crate::core::aabb::Aabb;
use crate::core::vec2::Vector2f;

/// Target cell edge in world units.
pub const CELL_SIZE: f32 = 3.0;

/// Key of every object tracked by the system (entity or block id).
pub type ObjectId = String;

/// Collision lines of the dynamic blocks, looked up during circle checks.
pub trait LineSource {
    /// Lines of a dynamic block, `None` for background or unknown blocks.
    fn block_lines(&self, block_id: &str) -> Option<&[Line]>;
}

/// Grid statistics.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollisionStats {
    /// Number of static lines
    pub total_lines: usize,
    /// Cells horizontally
    pub grid_width: usize,
    /// Cells vertically
    pub grid_height: usize,
    /// Cell width in world units
    pub cell_width: f32,
    /// Cell height in world units
    pub cell_height: f32,
    /// Share of cells holding no line, in percent
    pub percentage_of_empty_cells: f32,
}

/// Broad phase for entities and blocks plus the static line grid.
#[derive(Clone, Debug, Default)]
pub struct CollisionSystem {
    min: Vector2f,
    max: Vector2f,
    grid_width: usize,
    grid_height: usize,
    cell_width: f32,
    cell_height: f32,
    lines: Vec<Line>,
    line_cells: Vec<Vec<usize>>,

    entities: ElementHandler<ObjectId>,
    dyn_blocks: ElementHandler<ObjectId>,
    static_blocks: ElementHandler<ObjectId>,
    static_blocks_second_layer: ElementHandler<ObjectId>,
    layer_blocks: Vec<ElementHandler<ObjectId>>,

    debug: bool,
    checked_lines: Vec<Line>,
    checked_cells: Vec<Aabb>,
}

impl CollisionSystem {
    /// Create an empty system (call [`CollisionSystem::set_dims`] next).
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every line, element and layer handler.
    pub fn reset(&mut self) {
        self.lines.clear();
        self.line_cells.clear();
        self.entities.reset();
        self.dyn_blocks.reset();
        self.static_blocks.reset();
        self.static_blocks_second_layer.reset();
        self.layer_blocks.clear();
        self.checked_lines.clear();
        self.checked_cells.clear();
    }

    /// Size the grids over `[min, max]`, one extra handler per background
    /// layer offset.
    pub fn set_dims(&mut self, min: Vector2f, max: Vector2f, layer_offsets: &[Vector2f]) {
        self.reset();

        self.grid_width = (((max.x - min.x) / CELL_SIZE).ceil() as usize).max(1);
        self.cell_width = (max.x - min.x) / self.grid_width as f32;
        self.grid_height = (((max.y - min.y) / CELL_SIZE).ceil() as usize).max(1);
        self.cell_height = (max.y - min.y) / self.grid_height as f32;
        self.min = min;
        self.max = max;
        self.line_cells = vec![Vec::new(); self.grid_width * self.grid_height];

        let unit = Vector2f::new(1.0, 1.0);
        let (gw, gh) = (self.grid_width, self.grid_height);
        self.entities.set_dims(min, max, gw, gh, unit);
        self.dyn_blocks.set_dims(min, max, gw, gh, unit);
        self.static_blocks.set_dims(min, max, gw, gh, unit);
        self.static_blocks_second_layer.set_dims(min, max, gw, gh, unit);
        for offset in layer_offsets {
            let mut handler = ElementHandler::new();
            handler.set_dims(min, max, gw, gh, *offset);
            self.layer_blocks.push(handler);
        }

        debug!(
            grid_width = gw,
            grid_height = gh,
            cell_width = self.cell_width,
            cell_height = self.cell_height,
            layers = layer_offsets.len(),
            "Collision grid sized"
        );
    }

    /// Toggle the debug side channels of every index.
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
        self.entities.set_debug(debug);
        self.dyn_blocks.set_debug(debug);
        self.static_blocks.set_debug(debug);
        self.static_blocks_second_layer.set_debug(debug);
        for handler in &mut self.layer_blocks {
            handler.set_debug(debug);
        }
        if !debug {
            self.checked_lines.clear();
            self.checked_cells.clear();
        }
    }

    /// Lines tested by the last [`CollisionSystem::check_circle`] in debug mode.
    pub fn checked_lines(&self) -> &[Line] {
        &self.checked_lines
    }

    /// Cells visited by the last [`CollisionSystem::check_circle`] in debug mode.
    pub fn checked_cells(&self) -> &[Aabb] {
        &self.checked_cells
    }

    /// Every static line.
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    // =========================================================================
    // Static lines
    // =========================================================================

    /// Clamped line-grid cell range of a box.
    fn line_cell_range(&self, min: Vector2f, max: Vector2f) -> Option<(usize, usize, usize, usize)> {
        if self.line_cells.is_empty() {
            return None;
        }
        let (gw, gh) = (self.grid_width as f32, self.grid_height as f32);
        let extent = self.max - self.min;
        let min_cx = (((min.x - self.min.x - CD_EPSILON) * gw) / extent.x).floor() as i64;
        let min_cy = (((min.y - self.min.y - CD_EPSILON) * gh) / extent.y).floor() as i64;
        let max_cx = (((max.x - self.min.x + CD_EPSILON) * gw) / extent.x).floor() as i64;
        let max_cy = (((max.y - self.min.y + CD_EPSILON) * gh) / extent.y).floor() as i64;

        let min_cx = min_cx.max(0);
        let min_cy = min_cy.max(0);
        let max_cx = max_cx.min(self.grid_width as i64 - 1);
        let max_cy = max_cy.min(self.grid_height as i64 - 1);
        if min_cx > max_cx || min_cy > max_cy {
            return None;
        }
        Some((min_cx as usize, min_cy as usize, max_cx as usize, max_cy as usize))
    }

    /// Add a blocking segment to every cell its box touches.
    pub fn define_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, grip: f32) {
        let index = self.lines.len();
        self.lines.push(Line::new(x1, y1, x2, y2, grip));

        let min = Vector2f::new(x1.min(x2), y1.min(y2));
        let max = Vector2f::new(x1.max(x2), y1.max(y2));
        if let Some((min_cx, min_cy, max_cx, max_cy)) = self.line_cell_range(min, max) {
            for cx in min_cx..=max_cx {
                for cy in min_cy..=max_cy {
                    self.line_cells[cx + cy * self.grid_width].push(index);
                }
            }
        }
    }

    /// Segment query against the static geometry. Never reports a hit.
    pub fn check_line(&self, _x1: f32, _y1: f32, _x2: f32, _y2: f32) -> bool {
        false
    }

    /// True if the circle touches a foreground dynamic block or a static line.
    pub fn check_circle(&mut self, x: f32, y: f32, r: f32, blocks: &impl LineSource) -> bool {
        let min = Vector2f::new(x - r, y - r);
        let max = Vector2f::new(x + r, y + r);

        if self.debug {
            self.checked_lines.clear();
            self.checked_cells.clear();
        }

        for block_id in self.dyn_blocks.elements_near(&Aabb::from_corners(min, max)) {
            if let Some(lines) = blocks.block_lines(&block_id) {
                if lines.iter().any(|line| check_circle_and_line(line, x, y, r)) {
                    return true;
                }
            }
        }

        let Some((min_cx, min_cy, max_cx, max_cy)) = self.line_cell_range(min, max) else {
            return false;
        };
        for cx in min_cx..=max_cx {
            for cy in min_cy..=max_cy {
                if self.debug {
                    let corner = Vector2f::new(
                        self.min.x + self.cell_width * cx as f32,
                        self.min.y + self.cell_height * cy as f32,
                    );
                    let size = Vector2f::new(self.cell_width, self.cell_height);
                    self.checked_cells.push(Aabb::from_corners(corner, corner + size));
                }

                let cell = &self.line_cells[cx + cy * self.grid_width];
                for &line_index in cell {
                    let line = &self.lines[line_index];
                    if self.debug {
                        self.checked_lines.push(*line);
                    }
                    if check_circle_and_line(line, x, y, r) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Coarse box test: true as soon as one touched cell holds no line.
    pub fn check_box_fast(&self, min: Vector2f, max: Vector2f) -> bool {
        let Some((min_cx, min_cy, max_cx, max_cy)) = self.line_cell_range(min, max) else {
            return false;
        };
        (min_cx..=max_cx)
            .any(|cx| (min_cy..=max_cy).any(|cy| self.line_cells[cx + cy * self.grid_width].is_empty()))
    }

    /// Line grid statistics.
    pub fn stats(&self) -> CollisionStats {
        let total = self.grid_width * self.grid_height;
        let empty = self.line_cells.iter().filter(|c| c.is_empty()).count();
        CollisionStats {
            total_lines: self.lines.len(),
            grid_width: self.grid_width,
            grid_height: self.grid_height,
            cell_width: self.cell_width,
            cell_height: self.cell_height,
            percentage_of_empty_cells: if total == 0 {
                0.0
            } else {
                100.0 * empty as f32 / total as f32
            },
        }
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Track an entity.
    pub fn add_entity<T: Collidable<Key = ObjectId>>(&mut self, entity: &T) -> Result<(), CollisionError> {
        self.entities.add(entity)
    }

    /// Stop tracking an entity.
    pub fn remove_entity(&mut self, id: &str) -> Result<(), CollisionError> {
        self.entities.remove_element(&id.to_string())
    }

    /// Refresh an entity after it moved or resized.
    pub fn move_entity<T: Collidable<Key = ObjectId>>(&mut self, entity: &T) -> Result<(), CollisionError> {
        self.entities.update(entity)
    }

    /// Entity ids near a box.
    pub fn entities_near(&mut self, bbox: &Aabb) -> Vec<ObjectId> {
        self.entities.elements_near(bbox)
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    /// Track a dynamic block.
    pub fn add_dyn_block<T: Collidable<Key = ObjectId>>(&mut self, block: &T) -> Result<(), CollisionError> {
        self.dyn_blocks.add(block)
    }

    /// Stop tracking a dynamic block.
    pub fn remove_dyn_block(&mut self, id: &str) -> Result<(), CollisionError> {
        self.dyn_blocks.remove_element(&id.to_string())
    }

    /// Refresh a dynamic block after it moved or rotated.
    pub fn move_dyn_block<T: Collidable<Key = ObjectId>>(&mut self, block: &T) -> Result<(), CollisionError> {
        self.dyn_blocks.update(block)
    }

    /// Dynamic block ids near a box.
    pub fn dyn_blocks_near(&mut self, bbox: &Aabb) -> Vec<ObjectId> {
        self.dyn_blocks.elements_near(bbox)
    }

    /// Track a static block in the main or the front (second) layer.
    pub fn add_static_block<T: Collidable<Key = ObjectId>>(
        &mut self,
        block: &T,
        in_front_layer: bool,
    ) -> Result<(), CollisionError> {
        if in_front_layer {
            self.static_blocks_second_layer.add(block)
        } else {
            self.static_blocks.add(block)
        }
    }

    /// Static block ids near a box; `layer == -1` is the main layer, anything
    /// else the front layer.
    pub fn static_blocks_near(&mut self, bbox: &Aabb, layer: i32) -> Vec<ObjectId> {
        if layer == -1 {
            self.static_blocks.elements_near(bbox)
        } else {
            self.static_blocks_second_layer.elements_near(bbox)
        }
    }

    /// Number of background layer handlers.
    pub fn layer_count(&self) -> usize {
        self.layer_blocks.len()
    }

    /// Track a block of a background layer.
    pub fn add_block_in_layer<T: Collidable<Key = ObjectId>>(
        &mut self,
        block: &T,
        layer: usize,
    ) -> Result<(), CollisionError> {
        self.layer_blocks
            .get_mut(layer)
            .ok_or(CollisionError::UnknownLayer(layer))?
            .add(block)
    }

    /// Block ids of a background layer near a box.
    pub fn blocks_near_in_layer(&mut self, bbox: &Aabb, layer: usize) -> Result<Vec<ObjectId>, CollisionError> {
        Ok(self
            .layer_blocks
            .get_mut(layer)
            .ok_or(CollisionError::UnknownLayer(layer))?
            .elements_near(bbox))
    }
}

// =============================================================================
// TESTS
// =============================================================================
