//! The entity tree store: owns all placed entities and keeps the tree consistent.
//!
//! Entities form a single tree anchored at a synthetic root (`EntityId::ROOT`).
//! Edges are id references in both directions (`parent_id`, `child_ids`) and
//! are updated together inside each operation, so parent/child consistency
//! holds after every call.
//!
//! Rejected mutations never change state: they log a warning and return a
//! [`StoreError`]. Only [`EntityTreeStore::create_entity`] and
//! [`EntityTreeStore::reset`] cannot fail.

use tracing::{debug, info, instrument, warn};

use crate::domain::arena::{EntityArena, PostOrderIterator, SubtreeIterator};
use crate::domain::entities::{Entity, EntityId, EntityKind, FactoryModel, Payload, RecipeModel};
use crate::domain::error::{StoreError, StoreResult};
use crate::domain::events::{Listeners, StoreEvent, SubscriptionId};

/// First id handed out by the allocator. The root uses `0` outside this range.
const FIRST_ID: u64 = 1;

#[derive(Debug)]
pub struct EntityTreeStore {
    entities: EntityArena,
    next_id: u64,
    listeners: Listeners,
}

impl Default for EntityTreeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityTreeStore {
    /// Creates a store holding only the root entity.
    pub fn new() -> Self {
        let mut entities = EntityArena::new();
        entities.insert(Entity::root());
        Self {
            entities,
            next_id: FIRST_ID,
            listeners: Listeners::new(),
        }
    }

    // ------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------

    pub fn exists(&self, id: EntityId) -> bool {
        self.entities.contains(id)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// The root entity. Always `Some`: the root is inserted at construction
    /// and neither `remove_entity` nor `reset` drops it.
    pub fn root(&self) -> Option<&Entity> {
        self.entities.get(EntityId::ROOT)
    }

    /// Children of `id` in display order; empty for unknown ids.
    pub fn children_of(&self, id: EntityId) -> &[EntityId] {
        self.entities
            .get(id)
            .map(|e| e.child_ids.as_slice())
            .unwrap_or(&[])
    }

    pub fn root_children(&self) -> &[EntityId] {
        self.children_of(EntityId::ROOT)
    }

    /// All entities of `kind` in creation order, regardless of parent.
    #[instrument(level = "trace", skip(self))]
    pub fn list_by_kind(&self, kind: EntityKind) -> Vec<&Entity> {
        self.entities.entities().filter(|e| e.kind == kind).collect()
    }

    pub fn recipes(&self) -> Vec<&Entity> {
        self.list_by_kind(EntityKind::Recipe)
    }

    pub fn factories(&self) -> Vec<&Entity> {
        self.list_by_kind(EntityKind::Factory)
    }

    /// Number of live entities, root included.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True when only the root is present.
    pub fn is_empty(&self) -> bool {
        self.entities.len() == 1
    }

    /// The id the next `create_entity` call will return.
    pub fn next_id(&self) -> EntityId {
        EntityId::from_raw(self.next_id)
    }

    /// Pre-order walk of the whole tree, root first.
    pub fn iter(&self) -> SubtreeIterator<'_> {
        self.entities.iter_from(EntityId::ROOT)
    }

    /// Post-order walk of the whole tree, root last.
    pub fn iter_postorder(&self) -> PostOrderIterator<'_> {
        self.entities.iter_postorder_from(EntityId::ROOT)
    }

    /// Every entity below `id` in pre-order, excluding `id` itself.
    pub fn descendants(&self, id: EntityId) -> Vec<EntityId> {
        self.entities.iter_from(id).skip(1).map(|e| e.id).collect()
    }

    /// Parents of `id`, nearest first, ending with the root.
    pub fn ancestors(&self, id: EntityId) -> Vec<EntityId> {
        let mut chain = Vec::new();
        let mut current = self.entities.get(id).and_then(|e| e.parent_id);
        while let Some(parent) = current {
            // A corrupted store could contain a parent loop.
            if chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            current = self.entities.get(parent).and_then(|e| e.parent_id);
        }
        chain
    }

    /// Levels in the tree, counting the root as one.
    pub fn depth(&self) -> usize {
        self.entities.depth_from(EntityId::ROOT)
    }

    /// Entities without children, left to right. The root alone is a leaf.
    pub fn leaves(&self) -> Vec<EntityId> {
        self.entities.leaves_from(EntityId::ROOT)
    }

    // ------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------

    /// Registers a listener called after every successful mutation.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&StoreEvent) + 'static,
    {
        self.listeners.add(Box::new(listener))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.remove(id)
    }

    // ------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------

    /// Places a new entity under `parent`, falling back to the root when
    /// `parent` does not exist or cannot have children. Returns the new id.
    #[instrument(level = "debug", skip(self, payload), fields(kind = %payload.kind()))]
    pub fn create_entity(&mut self, payload: Payload, parent: EntityId) -> EntityId {
        let parent = match self.entities.get(parent) {
            Some(p) if p.kind.can_have_children() => parent,
            Some(p) => {
                warn!("{} {} cannot have children, placing at root", p.kind, parent);
                EntityId::ROOT
            }
            None => {
                warn!("parent {} does not exist, placing at root", parent);
                EntityId::ROOT
            }
        };

        let id = EntityId::from_raw(self.next_id);
        let kind = payload.kind();

        if let Some(parent_entity) = self.entities.get_mut(parent) {
            parent_entity.child_ids.push(id);
        }
        self.entities.insert(Entity::new(id, payload, parent));
        self.next_id += 1;

        info!("created {} {} under {}", kind, id, parent);
        self.listeners.emit(&StoreEvent::Created { id, kind, parent });
        id
    }

    pub fn create_at_root(&mut self, payload: Payload) -> EntityId {
        self.create_entity(payload, EntityId::ROOT)
    }

    pub fn create_recipe(&mut self, model: RecipeModel, parent: EntityId) -> EntityId {
        self.create_entity(Payload::Recipe(model), parent)
    }

    pub fn create_factory(&mut self, model: FactoryModel, parent: EntityId) -> EntityId {
        self.create_entity(Payload::Factory(model), parent)
    }

    /// Reparents `target` (with its subtree) under `destination`, appending it
    /// to the destination's children.
    #[instrument(level = "debug", skip(self))]
    pub fn move_entity(&mut self, target: EntityId, destination: EntityId) -> StoreResult<()> {
        let from = self.check_move(target, destination).inspect_err(|e| {
            warn!("move {} -> {} rejected: {}", target, destination, e);
        })?;

        if let Some(parent) = self.entities.get_mut(from) {
            parent.child_ids.retain(|&c| c != target);
        }
        if let Some(entity) = self.entities.get_mut(target) {
            entity.parent_id = Some(destination);
        }
        if let Some(dest) = self.entities.get_mut(destination) {
            dest.child_ids.push(target);
        }

        debug!("entity {} is now a child of {}", target, destination);
        self.listeners.emit(&StoreEvent::Moved {
            id: target,
            from,
            to: destination,
        });
        Ok(())
    }

    /// Validates a move without mutating; returns the target's current parent.
    fn check_move(&self, target: EntityId, destination: EntityId) -> StoreResult<EntityId> {
        let target_entity = self
            .entities
            .get(target)
            .ok_or(StoreError::NotFound(target))?;
        let dest_entity = self
            .entities
            .get(destination)
            .ok_or(StoreError::NotFound(destination))?;

        let from = target_entity.parent_id.ok_or(StoreError::RootImmutable)?;
        if !dest_entity.kind.can_have_children() {
            return Err(StoreError::ChildlessDestination {
                id: destination,
                kind: dest_entity.kind,
            });
        }
        if destination == target || self.ancestors(destination).contains(&target) {
            return Err(StoreError::CycleDetected {
                target,
                destination,
            });
        }
        if !self.entities.contains(from) {
            return Err(StoreError::MissingParent { id: target, parent: from });
        }
        Ok(from)
    }

    /// Removes `id` and its whole subtree. Returns the removed ids, children
    /// before parents.
    #[instrument(level = "debug", skip(self))]
    pub fn remove_entity(&mut self, id: EntityId) -> StoreResult<Vec<EntityId>> {
        let removal = self.check_remove(id).inspect_err(|e| {
            warn!("remove {} rejected: {}", id, e);
        })?;

        for &victim in &removal {
            self.detach(victim);
            self.entities.remove(victim);
        }

        info!("removed {} entities rooted at {}", removal.len(), id);
        self.listeners.emit(&StoreEvent::Removed {
            ids: removal.clone(),
        });
        Ok(removal)
    }

    /// Collects the post-order removal list, failing before any mutation.
    fn check_remove(&self, id: EntityId) -> StoreResult<Vec<EntityId>> {
        let entity = self.entities.get(id).ok_or(StoreError::NotFound(id))?;
        let parent = entity.parent_id.ok_or(StoreError::RootImmutable)?;
        if !self.entities.contains(parent) {
            return Err(StoreError::MissingParent { id, parent });
        }
        Ok(self.entities.iter_postorder_from(id).map(|e| e.id).collect())
    }

    /// Unlinks `id` from its parent's children.
    fn detach(&mut self, id: EntityId) {
        let parent = self.entities.get(id).and_then(|e| e.parent_id);
        if let Some(parent) = parent.and_then(|p| self.entities.get_mut(p)) {
            parent.child_ids.retain(|&c| c != id);
        }
    }

    /// Replaces the payload of `id`. The payload's variant is the expected
    /// kind and must match the stored kind.
    #[instrument(level = "debug", skip(self, payload), fields(kind = %payload.kind()))]
    pub fn update_payload(&mut self, id: EntityId, payload: Payload) -> StoreResult<()> {
        let expected = payload.kind();
        let result = match self.entities.get_mut(id) {
            None => Err(StoreError::NotFound(id)),
            Some(entity) if entity.kind != expected => Err(StoreError::KindMismatch {
                id,
                expected,
                actual: entity.kind,
            }),
            Some(entity) => {
                entity.payload = Some(payload);
                Ok(())
            }
        };

        match result {
            Ok(()) => {
                debug!("updated {} payload of {}", expected, id);
                self.listeners.emit(&StoreEvent::PayloadUpdated { id, kind: expected });
                Ok(())
            }
            Err(e) => {
                warn!("payload update of {} rejected: {}", id, e);
                Err(e)
            }
        }
    }

    pub fn set_recipe_model(&mut self, id: EntityId, model: RecipeModel) -> StoreResult<()> {
        self.update_payload(id, Payload::Recipe(model))
    }

    pub fn set_factory_model(&mut self, id: EntityId, model: FactoryModel) -> StoreResult<()> {
        self.update_payload(id, Payload::Factory(model))
    }

    /// Drops everything but the root and restarts id allocation.
    #[instrument(level = "debug", skip(self))]
    pub fn reset(&mut self) {
        self.entities.retain_only(EntityId::ROOT);
        if let Some(root) = self.entities.get_mut(EntityId::ROOT) {
            root.child_ids.clear();
        }
        self.next_id = FIRST_ID;

        info!("store reset");
        self.listeners.emit(&StoreEvent::Reset);
    }
}
