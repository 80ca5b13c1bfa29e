//! Quadtree spatial index over the ground plane
//!
//! Data carry a 2D location and a radius. A datum whose bounding square
//! straddles a quadrant boundary is stored in every leaf it overlaps, so
//! range queries deduplicate through a hash set.

use crate::core_types::error::{require_positive, ConfigError};
use crate::core_types::vec3::Vec2;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Anything that can be stored in a [`SpatialIndex`]
pub trait SpatialDatum {
    /// Ground-plane location
    fn location(&self) -> Vec2;

    /// Extent around [`SpatialDatum::location`]; points use 0
    fn radius(&self) -> f32 {
        0.0
    }
}

/// Axis-aligned rectangle, edges inclusive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Square of side `2 * half_extent` centred on `center`
    pub fn from_center(center: Vec2, half_extent: f32) -> Self {
        let h = Vec2::new(half_extent, half_extent);
        Self {
            min: center - h,
            max: center + h,
        }
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    /// Smaller of width and height
    pub fn min_extent(&self) -> f32 {
        self.width().min(self.height())
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn contains_point(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Inclusive overlap test (touching edges count)
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// Four equal, non-overlapping quadrants: SW, SE, NW, NE
    pub fn quadrants(&self) -> [Rect; 4] {
        let c = self.center();
        [
            Rect::new(self.min, c),
            Rect::new(Vec2::new(c.x, self.min.y), Vec2::new(self.max.x, c.y)),
            Rect::new(Vec2::new(self.min.x, c.y), Vec2::new(c.x, self.max.y)),
            Rect::new(c, self.max),
        ]
    }
}

/// Split policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadtreeConfig {
    /// A leaf splits when adding a datum would bring it to this count
    pub max_items_per_node: usize,
    /// Leaves smaller than twice this size never split
    pub min_node_size: f32,
}

impl Default for QuadtreeConfig {
    fn default() -> Self {
        Self {
            max_items_per_node: 8,
            min_node_size: 1.0,
        }
    }
}

impl QuadtreeConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] for a zero item threshold or a
    /// non-positive minimum node size.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_items_per_node == 0 {
            return Err(ConfigError::invalid("max_items_per_node", "must be >= 1"));
        }
        require_positive("min_node_size", self.min_node_size)
    }
}

/// Tree shape counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuadtreeStats {
    pub node_count: usize,
    pub leaf_count: usize,
    pub max_depth: usize,
    /// Distinct data inserted
    pub item_count: usize,
    /// Leaf entries, counting data stored in several leaves once per leaf
    pub stored_entries: usize,
}

#[derive(Debug)]
enum QuadtreeNode {
    Leaf { entries: Vec<usize> },
    Internal { children: Box<[QuadtreeNode; 4]> },
}

impl QuadtreeNode {
    fn empty_leaf() -> Self {
        QuadtreeNode::Leaf {
            entries: Vec::new(),
        }
    }
}

struct InsertContext<'a, T> {
    items: &'a [T],
    config: &'a QuadtreeConfig,
    node_count: &'a mut usize,
    max_depth: &'a mut usize,
}

/// Region quadtree with radius-aware range queries
#[derive(Debug)]
pub struct SpatialIndex<T> {
    root: QuadtreeNode,
    bounds: Rect,
    items: Vec<T>,
    config: QuadtreeConfig,
    node_count: usize,
    max_depth: usize,
}

fn datum_bounds<T: SpatialDatum>(datum: &T) -> Rect {
    Rect::from_center(datum.location(), datum.radius().max(0.0))
}

impl<T: SpatialDatum> SpatialIndex<T> {
    /// Create an index covering `bounds`
    ///
    /// # Errors
    ///
    /// Propagates [`QuadtreeConfig::validate`] failures.
    pub fn new(bounds: Rect, config: QuadtreeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            root: QuadtreeNode::empty_leaf(),
            bounds,
            items: Vec::new(),
            config,
            node_count: 1,
            max_depth: 0,
        })
    }

    /// Reset to a single empty root leaf covering `bounds`
    pub fn prepare(&mut self, bounds: Rect) {
        self.root = QuadtreeNode::empty_leaf();
        self.bounds = bounds;
        self.items.clear();
        self.node_count = 1;
        self.max_depth = 0;
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Number of distinct data inserted
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Datum stored under `handle`
    pub fn get(&self, handle: usize) -> Option<&T> {
        self.items.get(handle)
    }

    /// Insert a datum, returning its handle.
    ///
    /// Data whose bounding square lies entirely outside the root are dropped
    /// and `None` is returned.
    pub fn insert(&mut self, datum: T) -> Option<usize> {
        let item_bounds = datum_bounds(&datum);
        if !self.bounds.overlaps(&item_bounds) {
            warn!(
                "Quadtree insert outside bounds: datum at ({:.2}, {:.2}) ignored",
                datum.location().x,
                datum.location().y
            );
            return None;
        }

        let handle = self.items.len();
        self.items.push(datum);

        let mut ctx = InsertContext {
            items: &self.items,
            config: &self.config,
            node_count: &mut self.node_count,
            max_depth: &mut self.max_depth,
        };
        Self::insert_recursive(&mut self.root, self.bounds, 0, handle, &item_bounds, &mut ctx);
        Some(handle)
    }

    fn insert_recursive(
        node: &mut QuadtreeNode,
        bounds: Rect,
        depth: usize,
        handle: usize,
        item_bounds: &Rect,
        ctx: &mut InsertContext<'_, T>,
    ) {
        match node {
            QuadtreeNode::Leaf { entries } => {
                let can_split = bounds.min_extent() >= 2.0 * ctx.config.min_node_size;
                if entries.len() + 1 < ctx.config.max_items_per_node || !can_split {
                    entries.push(handle);
                    return;
                }

                let quadrants = bounds.quadrants();
                let old_entries = std::mem::take(entries);
                let mut children: [QuadtreeNode; 4] = [
                    QuadtreeNode::empty_leaf(),
                    QuadtreeNode::empty_leaf(),
                    QuadtreeNode::empty_leaf(),
                    QuadtreeNode::empty_leaf(),
                ];

                // Redistribution does not trigger further splits
                for entry in old_entries {
                    let eb = datum_bounds(&ctx.items[entry]);
                    for (i, quadrant) in quadrants.iter().enumerate() {
                        if quadrant.overlaps(&eb) {
                            if let QuadtreeNode::Leaf { entries } = &mut children[i] {
                                entries.push(entry);
                            }
                        }
                    }
                }

                *ctx.node_count += 4;
                *ctx.max_depth = (*ctx.max_depth).max(depth + 1);

                for (i, quadrant) in quadrants.iter().enumerate() {
                    if quadrant.overlaps(item_bounds) {
                        Self::insert_recursive(
                            &mut children[i],
                            *quadrant,
                            depth + 1,
                            handle,
                            item_bounds,
                            ctx,
                        );
                    }
                }

                *node = QuadtreeNode::Internal {
                    children: Box::new(children),
                };
            }
            QuadtreeNode::Internal { children } => {
                let quadrants = bounds.quadrants();
                for (i, quadrant) in quadrants.iter().enumerate() {
                    if quadrant.overlaps(item_bounds) {
                        Self::insert_recursive(
                            &mut children[i],
                            *quadrant,
                            depth + 1,
                            handle,
                            item_bounds,
                            ctx,
                        );
                    }
                }
            }
        }
    }

    /// Handles of every datum whose disc intersects the query disc
    ///
    /// A datum is kept iff `|center - location|² <= (radius + datum.radius)²`.
    ///
    /// # Arguments
    ///
    /// * `center` - Query centre on the ground plane
    /// * `radius` - Query radius
    ///
    /// # Returns
    ///
    /// Deduplicated set of handles usable with [`SpatialIndex::get`]
    pub fn query_range(&self, center: Vec2, radius: f32) -> FxHashSet<usize> {
        let mut found = FxHashSet::default();
        if !(radius.is_finite() && radius >= 0.0) {
            return found;
        }
        let region = Rect::from_center(center, radius);
        self.query_recursive(&self.root, self.bounds, &region, center, radius, &mut found);
        found
    }

    /// [`SpatialIndex::query_range`] resolved to data, in insertion order
    pub fn query_range_items(&self, center: Vec2, radius: f32) -> Vec<&T> {
        let mut handles: Vec<usize> = self.query_range(center, radius).into_iter().collect();
        handles.sort_unstable();
        handles.into_iter().map(|h| &self.items[h]).collect()
    }

    fn query_recursive(
        &self,
        node: &QuadtreeNode,
        bounds: Rect,
        region: &Rect,
        center: Vec2,
        radius: f32,
        found: &mut FxHashSet<usize>,
    ) {
        if !bounds.overlaps(region) {
            return;
        }
        match node {
            QuadtreeNode::Leaf { entries } => {
                for &entry in entries {
                    let datum = &self.items[entry];
                    let reach = radius + datum.radius().max(0.0);
                    if (center - datum.location()).norm_squared() <= reach * reach {
                        found.insert(entry);
                    }
                }
            }
            QuadtreeNode::Internal { children } => {
                for (child, quadrant) in children.iter().zip(bounds.quadrants()) {
                    self.query_recursive(child, quadrant, region, center, radius, found);
                }
            }
        }
    }

    /// Shape counters; walks the tree for the leaf entry count
    pub fn stats(&self) -> QuadtreeStats {
        let mut stored_entries = 0;
        let mut leaf_count = 0;
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            match node {
                QuadtreeNode::Leaf { entries } => {
                    leaf_count += 1;
                    stored_entries += entries.len();
                }
                QuadtreeNode::Internal { children } => stack.extend(children.iter()),
            }
        }
        QuadtreeStats {
            node_count: self.node_count,
            leaf_count,
            max_depth: self.max_depth,
            item_count: self.items.len(),
            stored_entries,
        }
    }
}

/// Consumer hooks fired while a scene is being populated
pub trait SpawnListener<T> {
    /// World extent is known; called before any item
    fn on_bounds_calculated(&mut self, bounds: Rect);

    fn on_item_spawned(&mut self, item: &T);

    /// Every item has been spawned
    fn on_all_items_spawned(&mut self, items: &[T]);
}

/// Listener that keeps a [`SpatialIndex`] in sync with spawn events
#[derive(Debug)]
pub struct QuadtreeSpawnListener<T> {
    index: SpatialIndex<T>,
}

impl<T: SpatialDatum> QuadtreeSpawnListener<T> {
    /// # Errors
    ///
    /// Propagates [`QuadtreeConfig::validate`] failures.
    pub fn new(config: QuadtreeConfig) -> Result<Self, ConfigError> {
        let placeholder = Rect::new(Vec2::zeros(), Vec2::zeros());
        Ok(Self {
            index: SpatialIndex::new(placeholder, config)?,
        })
    }

    pub fn index(&self) -> &SpatialIndex<T> {
        &self.index
    }

    pub fn into_index(self) -> SpatialIndex<T> {
        self.index
    }
}

impl<T: SpatialDatum + Clone> SpawnListener<T> for QuadtreeSpawnListener<T> {
    fn on_bounds_calculated(&mut self, bounds: Rect) {
        self.index.prepare(bounds);
    }

    fn on_item_spawned(&mut self, item: &T) {
        self.index.insert(item.clone());
    }

    fn on_all_items_spawned(&mut self, items: &[T]) {
        // Missed per-item events: rebuild from the final list
        if self.index.len() != items.len() {
            let bounds = self.index.bounds();
            self.index.prepare(bounds);
            for item in items {
                self.index.insert(item.clone());
            }
        }
        let stats = self.index.stats();
        debug!(
            "Quadtree ready: {} items, {} nodes, depth {}",
            stats.item_count, stats.node_count, stats.max_depth
        );
    }
}
