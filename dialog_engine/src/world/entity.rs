use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::types::{Aabb, Vec3};
use super::ContextId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity{}", self.0)
    }
}

/// Lifecycle notifications delivered to registered sequencer contexts.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EntityEvent {
    AiDone,
    Destroyed,
    Reset,
}

impl EntityEvent {
    pub fn label(&self) -> &'static str {
        match self {
            EntityEvent::AiDone => "ai_done",
            EntityEvent::Destroyed => "destroyed",
            EntityEvent::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub(super) name: String,
    pub(super) position: Vec3,
    pub(super) half_extents: Vec3,
    pub(super) eye_height: f32,
    pub(super) eye_direction: Vec3,
    pub(super) dead: bool,
    pub(super) alertness: u8,
    /// Mouth-level offsets for speech positioning, in preference order.
    pub(super) voice_attachment: Option<Vec3>,
    pub(super) head_bone: Option<Vec3>,
}

impl Entity {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn world_bounds(&self) -> Aabb {
        Aabb::from_center_half_extents(self.position, self.half_extents)
    }

    pub fn eye_position(&self) -> Vec3 {
        self.position.add(Vec3::new(0.0, 0.0, self.eye_height))
    }

    pub fn eye_direction(&self) -> Vec3 {
        self.eye_direction
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn alertness(&self) -> u8 {
        self.alertness
    }

    /// Where the speech channel should sit: voice attachment, else head
    /// bone, else a fixed height above the feet.
    pub fn mouth_position(&self) -> Vec3 {
        if let Some(offset) = self.voice_attachment {
            return self.position.add(offset);
        }
        if let Some(offset) = self.head_bone {
            return self.position.add(offset);
        }
        self.position.add(Vec3::new(0.0, 0.0, 1.8))
    }
}

/// Spawn-time description consumed by `EntityStore::spawn`.
#[derive(Debug, Clone)]
pub struct EntitySpec {
    pub name: String,
    pub position: Vec3,
    pub half_extents: Vec3,
    pub eye_height: f32,
    pub eye_direction: Vec3,
    pub voice_attachment: Option<Vec3>,
    pub head_bone: Option<Vec3>,
}

impl EntitySpec {
    pub fn named(name: impl Into<String>) -> Self {
        EntitySpec {
            name: name.into(),
            position: Vec3::ZERO,
            half_extents: Vec3::new(0.4, 0.4, 0.9),
            eye_height: 1.7,
            eye_direction: Vec3::new(0.0, 1.0, 0.0),
            voice_attachment: None,
            head_bone: None,
        }
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn facing(mut self, direction: Vec3) -> Self {
        self.eye_direction = direction;
        self
    }
}

#[derive(Debug, Default)]
pub(super) struct EntityStore {
    entities: BTreeMap<EntityId, Entity>,
    listeners: BTreeMap<EntityId, BTreeSet<ContextId>>,
    next_id: u32,
}

impl EntityStore {
    pub(super) fn spawn(&mut self, spec: EntitySpec) -> EntityId {
        self.next_id += 1;
        let id = EntityId(self.next_id);
        self.entities.insert(
            id,
            Entity {
                name: spec.name,
                position: spec.position,
                half_extents: spec.half_extents,
                eye_height: spec.eye_height,
                eye_direction: spec.eye_direction,
                dead: false,
                alertness: 0,
                voice_attachment: spec.voice_attachment,
                head_bone: spec.head_bone,
            },
        );
        id
    }

    pub(super) fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub(super) fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub(super) fn add_listener(&mut self, id: EntityId, context: ContextId) {
        self.listeners.entry(id).or_default().insert(context);
    }

    pub(super) fn remove_listener(&mut self, id: EntityId, context: ContextId) {
        if let Some(set) = self.listeners.get_mut(&id) {
            set.remove(&context);
            if set.is_empty() {
                self.listeners.remove(&id);
            }
        }
    }

    pub(super) fn listener_count(&self, id: EntityId) -> usize {
        self.listeners.get(&id).map_or(0, |set| set.len())
    }

    /// Removes the entity and reports which contexts must hear about it.
    pub(super) fn despawn(&mut self, id: EntityId) -> Vec<ContextId> {
        self.entities.remove(&id);
        self.listeners
            .remove(&id)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default()
    }

    pub(super) fn listeners_of(&self, id: EntityId) -> Vec<ContextId> {
        self.listeners
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_assigns_increasing_ids() {
        let mut store = EntityStore::default();
        let a = store.spawn(EntitySpec::named("eva"));
        let b = store.spawn(EntitySpec::named("manny"));
        assert!(b > a);
        assert_eq!(store.get(a).map(Entity::name), Some("eva"));
    }

    #[test]
    fn despawn_drains_listeners_once() {
        let mut store = EntityStore::default();
        let id = store.spawn(EntitySpec::named("glottis"));
        store.add_listener(id, ContextId(7));
        store.add_listener(id, ContextId(9));

        let mut notified = store.despawn(id);
        notified.sort();
        assert_eq!(notified, vec![ContextId(7), ContextId(9)]);
        assert!(store.despawn(id).is_empty());
        assert!(store.get(id).is_none());
    }

    #[test]
    fn listener_registration_is_symmetric() {
        let mut store = EntityStore::default();
        let id = store.spawn(EntitySpec::named("domino"));
        store.add_listener(id, ContextId(1));
        assert_eq!(store.listener_count(id), 1);
        store.remove_listener(id, ContextId(1));
        assert_eq!(store.listener_count(id), 0);
    }

    #[test]
    fn mouth_position_prefers_attachment_then_bone() {
        let mut spec = EntitySpec::named("meche").at(Vec3::new(1.0, 2.0, 0.0));
        spec.head_bone = Some(Vec3::new(0.0, 0.0, 1.6));
        let mut store = EntityStore::default();
        let id = store.spawn(spec);
        let entity = store.get(id).expect("entity present");
        assert_eq!(entity.mouth_position(), Vec3::new(1.0, 2.0, 1.6));

        let plain = store.spawn(EntitySpec::named("clerk"));
        let entity = store.get(plain).expect("entity present");
        assert_eq!(entity.mouth_position(), Vec3::new(0.0, 0.0, 1.8));
    }
}
