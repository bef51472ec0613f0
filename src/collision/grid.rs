//! Uniform Grid Index
//!
//! Broad-phase index answering "which tracked elements might overlap this
//! box". Every element remembers the exact list of cells its bounding box
//! covers; every cell lists the elements covering it.
//!
//! Elements live in a slot arena so that cells store plain indices, and a
//! per-query visitation stamp deduplicates elements spanning several cells.

use std::collections::BTreeMap;
use std::fmt::Debug;

use thiserror::Error;

use crate::core::aabb::Aabb;
use crate::core::vec2::Vector2f;

/// Margin added around every box before computing its cell range.
pub const CD_EPSILON: f32 = 0.01;

/// Anything the grid can track.
pub trait Collidable {
    /// Identity used as the grid key.
    type Key: Ord + Clone + Debug;

    /// Stable key.
    fn collision_key(&self) -> Self::Key;

    /// Current bounding box.
    fn aabb(&self) -> Aabb;
}

/// Collision index errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollisionError {
    /// Remove or move of an element the index does not track.
    #[error("Collision element not found: {0}")]
    NotFound(String),

    /// Second add of the same element.
    #[error("Collision element already tracked: {0}")]
    Duplicate(String),

    /// `set_dims` was never called.
    #[error("Grid dimensions are not set")]
    DimsNotSet,

    /// Background layer index without a handler.
    #[error("No collision handler for layer {0}")]
    UnknownLayer(usize),
}

/// Tracking record of one element.
#[derive(Clone, Debug)]
struct ColElement<K> {
    key: K,
    /// Cells covered by the element's box (empty = outside the grid)
    cells: Vec<usize>,
    /// Last query pass that returned this element
    cur_check: u32,
}

/// Inclusive cell range covered by a box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CellRange {
    min_x: i32,
    min_y: i32,
    max_x: i32,
    max_y: i32,
}

/// Uniform grid over a rectangle, keyed by element identity.
#[derive(Clone, Debug)]
pub struct ElementHandler<K> {
    min: Vector2f,
    max: Vector2f,
    grid_width: usize,
    grid_height: usize,
    width_divisor: f32,
    height_divisor: f32,
    cells: Vec<Vec<usize>>,
    slots: Vec<Option<ColElement<K>>>,
    free_slots: Vec<usize>,
    index: BTreeMap<K, usize>,
    cur_check: u32,
    debug: bool,
    checked: Vec<K>,
}

impl<K: Ord + Clone + Debug> Default for ElementHandler<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone + Debug> ElementHandler<K> {
    /// Create an index with no dimensions.
    pub fn new() -> Self {
        Self {
            min: Vector2f::ZERO,
            max: Vector2f::ZERO,
            grid_width: 0,
            grid_height: 0,
            width_divisor: 0.0,
            height_divisor: 0.0,
            cells: Vec::new(),
            slots: Vec::new(),
            free_slots: Vec::new(),
            index: BTreeMap::new(),
            cur_check: 0,
            debug: false,
            checked: Vec::new(),
        }
    }

    /// Set the grid geometry and drop every tracked element.
    ///
    /// An offset other than `(1, 1)` stretches the covered area, which is
    /// how parallax layers get a grid matching their scrolled extent.
    pub fn set_dims(
        &mut self,
        min: Vector2f,
        max: Vector2f,
        grid_width: usize,
        grid_height: usize,
        offset: Vector2f,
    ) {
        self.reset();
        self.min = min;
        self.max = max;
        if offset.x != 1.0 || offset.y != 1.0 {
            self.min.y *= offset.y;
            self.max.x *= offset.x;
        }

        self.grid_width = grid_width;
        self.grid_height = grid_height;
        self.width_divisor = grid_width as f32 / (self.max.x - self.min.x);
        self.height_divisor = grid_height as f32 / (self.max.y - self.min.y);
        self.cells = vec![Vec::new(); grid_width * grid_height];
    }

    /// Forget every element, keep the geometry.
    pub fn reset(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
        self.slots.clear();
        self.free_slots.clear();
        self.index.clear();
        self.checked.clear();
        self.cur_check = 0;
    }

    /// Grid size in cells.
    pub fn grid_size(&self) -> (usize, usize) {
        (self.grid_width, self.grid_height)
    }

    /// Covered rectangle.
    pub fn bounds(&self) -> (Vector2f, Vector2f) {
        (self.min, self.max)
    }

    /// Number of tracked elements.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True if no element is tracked.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// True if `key` is tracked.
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Record checked elements of the last query.
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
        if !debug {
            self.checked.clear();
        }
    }

    /// Elements returned by the last query while debug mode was on.
    pub fn checked_elements(&self) -> &[K] {
        &self.checked
    }

    /// Start tracking `key` with bounding box `bbox`.
    pub fn add_element(&mut self, key: K, bbox: &Aabb) -> Result<(), CollisionError> {
        if self.cells.is_empty() {
            return Err(CollisionError::DimsNotSet);
        }
        if self.index.contains_key(&key) {
            return Err(CollisionError::Duplicate(format!("{:?}", key)));
        }

        let element = ColElement { key: key.clone(), cells: Vec::new(), cur_check: 0 };
        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot] = Some(element);
                slot
            }
            None => {
                self.slots.push(Some(element));
                self.slots.len() - 1
            }
        };
        self.index.insert(key, slot);
        self.link_in_cells(slot, bbox);
        Ok(())
    }

    /// Stop tracking `key`.
    pub fn remove_element(&mut self, key: &K) -> Result<(), CollisionError> {
        let slot = self
            .index
            .remove(key)
            .ok_or_else(|| CollisionError::NotFound(format!("{:?}", key)))?;
        self.unlink_from_cells(slot);
        self.slots[slot] = None;
        self.free_slots.push(slot);
        Ok(())
    }

    /// Recompute the cells of `key` from its new bounding box.
    pub fn move_element(&mut self, key: &K, bbox: &Aabb) -> Result<(), CollisionError> {
        let slot = self.slot_of(key)?;
        self.unlink_from_cells(slot);
        self.link_in_cells(slot, bbox);
        Ok(())
    }

    /// Track an object through its [`Collidable`] view.
    pub fn add<T: Collidable<Key = K>>(&mut self, obj: &T) -> Result<(), CollisionError> {
        self.add_element(obj.collision_key(), &obj.aabb())
    }

    /// Refresh an object through its [`Collidable`] view.
    pub fn update<T: Collidable<Key = K>>(&mut self, obj: &T) -> Result<(), CollisionError> {
        self.move_element(&obj.collision_key(), &obj.aabb())
    }

    /// Cells currently covered by `key`.
    pub fn cells_of(&self, key: &K) -> Result<&[usize], CollisionError> {
        let slot = self.slot_of(key)?;
        Ok(self.slots[slot].as_ref().map(|e| e.cells.as_slice()).unwrap_or(&[]))
    }

    /// Keys tracked in one cell (test and debug helper).
    pub fn cell_contents(&self, cell: usize) -> Vec<K> {
        self.cells
            .get(cell)
            .map(|slots| {
                slots
                    .iter()
                    .filter_map(|&s| self.slots[s].as_ref().map(|e| e.key.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every element whose cells overlap the cells of `query`, once each.
    ///
    /// Order follows cell iteration and must not be relied upon.
    pub fn elements_near(&mut self, query: &Aabb) -> Vec<K> {
        let mut out = Vec::new();
        if self.debug {
            self.checked.clear();
        }
        self.cur_check = self.cur_check.wrapping_add(1);
        let stamp = self.cur_check;

        let Some(range) = self.cell_range(query) else {
            return out;
        };

        for i in range.min_x..=range.max_x {
            for j in range.min_y..=range.max_y {
                let cell = i as usize + j as usize * self.grid_width;
                for &slot in &self.cells[cell] {
                    if let Some(element) = self.slots[slot].as_mut() {
                        if element.cur_check != stamp {
                            element.cur_check = stamp;
                            out.push(element.key.clone());
                            if self.debug {
                                self.checked.push(element.key.clone());
                            }
                        }
                    }
                }
            }
        }

        #[cfg(feature = "debug-tracing")]
        tracing::trace!(found = out.len(), "grid query {:?}..{:?}", query.min, query.max);

        out
    }

    fn slot_of(&self, key: &K) -> Result<usize, CollisionError> {
        self.index
            .get(key)
            .copied()
            .ok_or_else(|| CollisionError::NotFound(format!("{:?}", key)))
    }

    /// Clamped cell range of a box, `None` when it misses the grid.
    fn cell_range(&self, bbox: &Aabb) -> Option<CellRange> {
        if self.grid_width == 0 || self.grid_height == 0 || bbox.is_empty() {
            return None;
        }
        let min_x = ((bbox.min.x - self.min.x - CD_EPSILON) * self.width_divisor).floor() as i32;
        let min_y = ((bbox.min.y - self.min.y - CD_EPSILON) * self.height_divisor).floor() as i32;
        let max_x = ((bbox.max.x - self.min.x + CD_EPSILON) * self.width_divisor).floor() as i32;
        let max_y = ((bbox.max.y - self.min.y + CD_EPSILON) * self.height_divisor).floor() as i32;

        let range = CellRange {
            min_x: min_x.max(0),
            min_y: min_y.max(0),
            max_x: max_x.min(self.grid_width as i32 - 1),
            max_y: max_y.min(self.grid_height as i32 - 1),
        };
        if range.min_x > range.max_x || range.min_y > range.max_y {
            return None;
        }
        Some(range)
    }

    fn link_in_cells(&mut self, slot: usize, bbox: &Aabb) {
        let mut covered = Vec::new();
        if let Some(range) = self.cell_range(bbox) {
            for i in range.min_x..=range.max_x {
                for j in range.min_y..=range.max_y {
                    let cell = i as usize + j as usize * self.grid_width;
                    covered.push(cell);
                    self.cells[cell].push(slot);
                }
            }
        }
        if let Some(element) = self.slots[slot].as_mut() {
            element.cells = covered;
            element.cur_check = 0;
        }
    }

    fn unlink_from_cells(&mut self, slot: usize) {
        let cells = match self.slots[slot].as_mut() {
            Some(element) => std::mem::take(&mut element.cells),
            None => return,
        };
        for cell in cells {
            let bucket = &mut self.cells[cell];
            if let Some(pos) = bucket.iter().position(|&s| s == slot) {
                bucket.remove(pos);
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn grid() -> ElementHandler<u32> {
        let mut h = ElementHandler::new();
        h.set_dims(Vector2f::new(0.0, 0.0), Vector2f::new(30.0, 30.0), 10, 10, Vector2f::new(1.0, 1.0));
        h
    }

    fn square(x: f32, y: f32, half: f32) -> Aabb {
        Aabb::from_corners(Vector2f::new(x - half, y - half), Vector2f::new(x + half, y + half))
    }

    /// Cells a box covers, computed cell by cell.
    fn brute_force_cells(h: &ElementHandler<u32>, bbox: &Aabb) -> Vec<usize> {
        let (gw, gh) = h.grid_size();
        let mut out = Vec::new();
        let lo_x = ((bbox.min.x - h.min.x - CD_EPSILON) * h.width_divisor).floor();
        let hi_x = ((bbox.max.x - h.min.x + CD_EPSILON) * h.width_divisor).floor();
        let lo_y = ((bbox.min.y - h.min.y - CD_EPSILON) * h.height_divisor).floor();
        let hi_y = ((bbox.max.y - h.min.y + CD_EPSILON) * h.height_divisor).floor();
        for i in 0..gw {
            for j in 0..gh {
                let (fi, fj) = (i as f32, j as f32);
                if fi >= lo_x && fi <= hi_x && fj >= lo_y && fj <= hi_y {
                    out.push(i + j * gw);
                }
            }
        }
        out.sort_unstable();
        out
    }

    #[test]
    fn test_add_and_query() {
        let mut h = grid();
        h.add_element(1, &square(5.0, 5.0, 0.5)).unwrap();
        h.add_element(2, &square(25.0, 25.0, 0.5)).unwrap();

        let near = h.elements_near(&square(5.0, 5.0, 1.0));
        assert_eq!(near, vec![1]);
    }

    #[test]
    fn test_spanning_element_returned_once() {
        let mut h = grid();
        // Covers a 4x4 block of cells
        h.add_element(7, &square(15.0, 15.0, 5.0)).unwrap();
        assert!(h.cells_of(&7).unwrap().len() > 1);

        let near = h.elements_near(&square(15.0, 15.0, 10.0));
        assert_eq!(near, vec![7]);
        // A second query must not be suppressed by the first one's stamp
        assert_eq!(h.elements_near(&square(15.0, 15.0, 10.0)), vec![7]);
    }

    #[test]
    fn test_duplicate_add_rejected() {
        let mut h = grid();
        h.add_element(1, &square(5.0, 5.0, 0.5)).unwrap();
        assert!(matches!(
            h.add_element(1, &square(6.0, 6.0, 0.5)),
            Err(CollisionError::Duplicate(_))
        ));
    }

    #[test]
    fn test_remove_unknown_fails() {
        let mut h = grid();
        assert!(matches!(h.remove_element(&3), Err(CollisionError::NotFound(_))));
        assert!(matches!(
            h.move_element(&3, &square(1.0, 1.0, 0.1)),
            Err(CollisionError::NotFound(_))
        ));
    }

    #[test]
    fn test_add_without_dims() {
        let mut h: ElementHandler<u32> = ElementHandler::new();
        assert_eq!(h.add_element(1, &square(0.0, 0.0, 1.0)), Err(CollisionError::DimsNotSet));
    }

    #[test]
    fn test_outside_element_is_invisible() {
        let mut h = grid();
        h.add_element(9, &square(-50.0, -50.0, 1.0)).unwrap();
        assert!(h.contains(&9));
        assert!(h.cells_of(&9).unwrap().is_empty());
        assert!(h.elements_near(&square(15.0, 15.0, 100.0)).is_empty());

        // Moving it back inside makes it queryable again
        h.move_element(&9, &square(2.0, 2.0, 0.5)).unwrap();
        assert_eq!(h.elements_near(&square(2.0, 2.0, 0.5)), vec![9]);
    }

    #[test]
    fn test_slot_reuse_after_remove() {
        let mut h = grid();
        h.add_element(1, &square(5.0, 5.0, 0.5)).unwrap();
        h.remove_element(&1).unwrap();
        h.add_element(2, &square(5.0, 5.0, 0.5)).unwrap();
        assert_eq!(h.slots.len(), 1);
        assert_eq!(h.elements_near(&square(5.0, 5.0, 0.5)), vec![2]);
    }

    #[test]
    fn test_debug_side_channel() {
        let mut h = grid();
        h.set_debug(true);
        h.add_element(4, &square(5.0, 5.0, 0.5)).unwrap();
        let near = h.elements_near(&square(5.0, 5.0, 1.0));
        assert_eq!(h.checked_elements(), near.as_slice());
    }

    #[test]
    fn test_layer_offset_stretches_area() {
        let mut h: ElementHandler<u32> = ElementHandler::new();
        h.set_dims(Vector2f::new(0.0, -10.0), Vector2f::new(30.0, 30.0), 10, 10, Vector2f::new(2.0, 2.0));
        let (min, max) = h.bounds();
        assert_eq!(min.y, -20.0);
        assert_eq!(max.x, 60.0);
    }

    proptest! {
        #[test]
        fn prop_query_completeness(
            boxes in prop::collection::vec((0.5f32..29.5, 0.5f32..29.5, 0.05f32..4.0), 1..40),
            q in (0.0f32..30.0, 0.0f32..30.0, 0.05f32..6.0),
        ) {
            let mut h = grid();
            for (i, (x, y, half)) in boxes.iter().enumerate() {
                h.add_element(i as u32, &square(*x, *y, *half)).unwrap();
            }
            let query = square(q.0, q.1, q.2);
            let near = h.elements_near(&query);
            for (i, (x, y, half)) in boxes.iter().enumerate() {
                let count = near.iter().filter(|&&k| k == i as u32).count();
                prop_assert!(count <= 1);
                if square(*x, *y, *half).intersects(&query) {
                    prop_assert_eq!(count, 1);
                }
            }
        }

        #[test]
        fn prop_cells_exact_after_moves(
            moves in prop::collection::vec((0.5f32..29.5, 0.5f32..29.5, 0.05f32..4.0), 1..20),
        ) {
            let mut h = grid();
            h.add_element(0, &square(1.0, 1.0, 0.5)).unwrap();
            let mut last = square(1.0, 1.0, 0.5);
            for (x, y, half) in moves {
                let bbox = square(x, y, half);
                h.move_element(&0, &bbox).unwrap();
                let mut cells = h.cells_of(&0).unwrap().to_vec();
                cells.sort_unstable();
                prop_assert_eq!(cells, brute_force_cells(&h, &bbox));
                last = bbox;
            }
            // Every cell listing the element is one of its recorded cells
            let recorded = h.cells_of(&0).unwrap().to_vec();
            for cell in 0..100 {
                let listed = h.cell_contents(cell).contains(&0);
                prop_assert_eq!(listed, recorded.contains(&cell));
            }
            h.remove_element(&0).unwrap();
            prop_assert!(h.elements_near(&last).is_empty());
            for cell in 0..100 {
                prop_assert!(h.cell_contents(cell).is_empty());
            }
        }
    }
}
