//! Levelled forest: blocks indexed by id and by view.
//!
//! A vertex's level is its block's view and its parent is `prev_id`. Parents
//! may be absent (below the pruning level, or never received), which is why
//! this is a forest and not a tree.

use canopy_types::{Block, Hash, View};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
struct Vertex {
    block: Block,
    /// Distance from the deepest known ancestor (genesis has depth 0).
    depth: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct LevelledForest {
    vertices: HashMap<Hash, Vertex>,
    levels: BTreeMap<View, Vec<Hash>>,
    children: HashMap<Hash, Vec<Hash>>,
    lowest_level: View,
}

impl LevelledForest {
    pub(crate) fn new(root: Block) -> Self {
        let mut forest = Self {
            vertices: HashMap::new(),
            levels: BTreeMap::new(),
            children: HashMap::new(),
            lowest_level: root.view,
        };
        forest.insert(root, 0);
        forest
    }

    /// Insert a block. Returns false for duplicates and blocks below the
    /// pruning level.
    pub(crate) fn add(&mut self, block: Block) -> bool {
        if self.vertices.contains_key(&block.id) || block.view < self.lowest_level {
            return false;
        }
        let depth = self
            .vertices
            .get(&block.prev_id)
            .map(|parent| parent.depth + 1)
            .unwrap_or(1);
        self.insert(block, depth);
        true
    }

    fn insert(&mut self, block: Block, depth: u64) {
        let id = block.id;
        self.levels.entry(block.view).or_default().push(id);
        self.children.entry(block.prev_id).or_default().push(id);
        self.vertices.insert(id, Vertex { block, depth });
    }

    pub(crate) fn get(&self, id: &Hash) -> Option<&Block> {
        self.vertices.get(id).map(|v| &v.block)
    }

    pub(crate) fn contains(&self, id: &Hash) -> bool {
        self.vertices.contains_key(id)
    }

    pub(crate) fn depth(&self, id: &Hash) -> Option<u64> {
        self.vertices.get(id).map(|v| v.depth)
    }

    pub(crate) fn children(&self, id: &Hash) -> impl Iterator<Item = &Block> {
        self.children
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|child| self.get(child))
    }

    /// Blocks at `level`, in insertion order.
    pub(crate) fn at_level(&self, level: View) -> impl Iterator<Item = &Block> {
        self.levels
            .get(&level)
            .into_iter()
            .flatten()
            .filter_map(|id| self.get(id))
    }

    pub(crate) fn lowest_level(&self) -> View {
        self.lowest_level
    }

    pub(crate) fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Remove every vertex whose level is below `level` and raise the lowest
    /// level. Removed blocks are returned in ascending level order.
    pub(crate) fn prune_up_to(&mut self, level: View) -> Vec<Block> {
        if level <= self.lowest_level {
            return Vec::new();
        }
        let retained = self.levels.split_off(&level);
        let pruned_levels = std::mem::replace(&mut self.levels, retained);
        self.lowest_level = level;

        let mut pruned = Vec::new();
        for id in pruned_levels.into_values().flatten() {
            if let Some(vertex) = self.vertices.remove(&id) {
                self.children.remove(&id);
                if let Some(siblings) = self.children.get_mut(&vertex.block.prev_id) {
                    siblings.retain(|child| *child != id);
                    if siblings.is_empty() {
                        self.children.remove(&vertex.block.prev_id);
                    }
                }
                pruned.push(vertex.block);
            }
        }
        pruned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_test_helpers::{random_id, unsigned_block};

    #[test]
    fn test_depth_and_children() {
        let genesis = Block::genesis();
        let mut forest = LevelledForest::new(genesis.clone());
        let b1 = unsigned_block(1, 0, genesis.id, 1);
        let b2 = unsigned_block(2, 1, b1.id, 2);
        let orphan = unsigned_block(3, 2, random_id("missing"), 3);

        assert!(forest.add(b1.clone()));
        assert!(forest.add(b2.clone()));
        assert!(forest.add(orphan.clone()));

        assert_eq!(forest.depth(&b2.id), Some(2));
        assert_eq!(forest.depth(&orphan.id), Some(1));
        assert_eq!(
            forest.children(&genesis.id).map(|b| b.id).collect::<Vec<_>>(),
            vec![b1.id]
        );
    }

    #[test]
    fn test_prune_removes_lower_levels_only() {
        let genesis = Block::genesis();
        let mut forest = LevelledForest::new(genesis.clone());
        let b1 = unsigned_block(1, 0, genesis.id, 1);
        let b2 = unsigned_block(2, 1, b1.id, 2);
        forest.add(b1.clone());
        forest.add(b2.clone());

        let pruned: Vec<_> = forest.prune_up_to(View(2)).into_iter().map(|b| b.id).collect();
        assert_eq!(pruned, vec![genesis.id, b1.id]);
        assert_eq!(forest.lowest_level(), View(2));
        assert!(forest.contains(&b2.id));
        assert_eq!(forest.len(), 1);

        // Below the pruning level: rejected.
        assert!(!forest.add(unsigned_block(1, 0, genesis.id, 4)));
        assert!(forest.prune_up_to(View(1)).is_empty());
    }
}
