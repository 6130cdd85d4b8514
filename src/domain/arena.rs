use std::collections::BTreeMap;

use generational_arena::{Arena, Index};
use tracing::instrument;

use crate::domain::entities::{Entity, EntityId};

/// Arena-backed entity storage with an id index.
///
/// Entities live in a generational arena; the `BTreeMap` maps the public
/// `EntityId` to the arena slot. Because ids are allocated monotonically the
/// index iterates in creation order. Structural edges are `EntityId`s held in
/// the entities themselves, never arena indices.
#[derive(Debug, Default)]
pub struct EntityArena {
    /// Arena storage for all entities
    arena: Arena<Entity>,
    /// Id to arena slot, ordered by id
    index: BTreeMap<EntityId, Index>,
}

impl EntityArena {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            index: BTreeMap::new(),
        }
    }

    /// Inserts an entity, replacing any entity stored under the same id.
    #[instrument(level = "trace", skip(self, entity), fields(id = %entity.id))]
    pub fn insert(&mut self, entity: Entity) {
        let id = entity.id;
        let slot = self.arena.insert(entity);
        if let Some(old) = self.index.insert(id, slot) {
            self.arena.remove(old);
        }
    }

    #[instrument(level = "trace", skip(self))]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.index.get(&id).and_then(|&slot| self.arena.get(slot))
    }

    #[instrument(level = "trace", skip(self))]
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        match self.index.get(&id) {
            Some(&slot) => self.arena.get_mut(slot),
            None => None,
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.index.contains_key(&id)
    }

    #[instrument(level = "trace", skip(self))]
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let slot = self.index.remove(&id)?;
        self.arena.remove(slot)
    }

    /// Drops every entity except `keep`.
    pub fn retain_only(&mut self, keep: EntityId) {
        let drop: Vec<EntityId> = self.index.keys().copied().filter(|&id| id != keep).collect();
        for id in drop {
            self.remove(id);
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// All entities in creation order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.index.values().filter_map(|&slot| self.arena.get(slot))
    }

    /// Pre-order walk of the subtree rooted at `start` (inclusive).
    #[instrument(level = "trace", skip(self))]
    pub fn iter_from(&self, start: EntityId) -> SubtreeIterator<'_> {
        SubtreeIterator::new(self, start)
    }

    /// Post-order walk of the subtree rooted at `start` (inclusive):
    /// every child is yielded before its parent.
    #[instrument(level = "trace", skip(self))]
    pub fn iter_postorder_from(&self, start: EntityId) -> PostOrderIterator<'_> {
        PostOrderIterator::new(self, start)
    }

    /// Number of levels in the subtree rooted at `start`, 0 if unknown.
    #[instrument(level = "debug", skip(self))]
    pub fn depth_from(&self, start: EntityId) -> usize {
        self.calculate_depth(start)
    }

    fn calculate_depth(&self, id: EntityId) -> usize {
        if let Some(entity) = self.get(id) {
            1 + entity
                .child_ids
                .iter()
                .map(|&child| self.calculate_depth(child))
                .max()
                .unwrap_or(0)
        } else {
            0
        }
    }

    /// Collects entities without children below `start`, left to right.
    #[instrument(level = "debug", skip(self))]
    pub fn leaves_from(&self, start: EntityId) -> Vec<EntityId> {
        let mut leaves = Vec::new();
        self.collect_leaves(start, &mut leaves);
        leaves
    }

    fn collect_leaves(&self, id: EntityId, leaves: &mut Vec<EntityId>) {
        if let Some(entity) = self.get(id) {
            if entity.child_ids.is_empty() {
                leaves.push(id);
            } else {
                for &child in &entity.child_ids {
                    self.collect_leaves(child, leaves);
                }
            }
        }
    }
}

pub struct SubtreeIterator<'a> {
    arena: &'a EntityArena,
    stack: Vec<EntityId>,
}

impl<'a> SubtreeIterator<'a> {
    fn new(arena: &'a EntityArena, start: EntityId) -> Self {
        Self {
            arena,
            stack: vec![start],
        }
    }
}

impl<'a> Iterator for SubtreeIterator<'a> {
    type Item = &'a Entity;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current) = self.stack.pop() {
            if let Some(entity) = self.arena.get(current) {
                // Push children in reverse order for left-to-right traversal
                for &child in entity.child_ids.iter().rev() {
                    self.stack.push(child);
                }
                return Some(entity);
            }
        }
        None
    }
}

pub struct PostOrderIterator<'a> {
    arena: &'a EntityArena,
    stack: Vec<(EntityId, bool)>,
}

impl<'a> PostOrderIterator<'a> {
    fn new(arena: &'a EntityArena, start: EntityId) -> Self {
        Self {
            arena,
            stack: vec![(start, false)],
        }
    }
}

impl<'a> Iterator for PostOrderIterator<'a> {
    type Item = &'a Entity;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current, visited)) = self.stack.pop() {
            if let Some(entity) = self.arena.get(current) {
                if !visited {
                    self.stack.push((current, true));
                    for &child in entity.child_ids.iter().rev() {
                        self.stack.push((child, false));
                    }
                } else {
                    return Some(entity);
                }
            }
        }
        None
    }
}
