use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::entity::EntityId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FacialChannelId(pub u32);

impl fmt::Display for FacialChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "facial{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct FacialChannel {
    pub(super) expression: String,
    pub(super) weight: f32,
    pub(super) fade_time: f32,
}

/// Facial expression channels per entity. Expressions come from a library;
/// starting an unknown one fails, which the sequencer ignores (fail open).
#[derive(Debug, Default)]
pub(super) struct FacialSystem {
    library: BTreeSet<String>,
    channels: BTreeMap<EntityId, BTreeMap<FacialChannelId, FacialChannel>>,
    next_channel: u32,
}

impl FacialSystem {
    pub(super) fn register_expression(&mut self, name: &str) {
        self.library.insert(name.to_string());
    }

    pub(super) fn knows_expression(&self, name: &str) -> bool {
        self.library.contains(name)
    }

    pub(super) fn start_channel(
        &mut self,
        entity: EntityId,
        expression: &str,
        weight: f32,
        fade_time: f32,
    ) -> Option<FacialChannelId> {
        if !self.library.contains(expression) {
            return None;
        }
        self.next_channel += 1;
        let id = FacialChannelId(self.next_channel);
        self.channels.entry(entity).or_default().insert(
            id,
            FacialChannel {
                expression: expression.to_string(),
                weight,
                fade_time,
            },
        );
        Some(id)
    }

    /// Fades a running channel out; the fade time mirrors the fade-in.
    pub(super) fn stop_channel(
        &mut self,
        entity: EntityId,
        channel: FacialChannelId,
        _fade_time: f32,
    ) -> bool {
        self.channels
            .get_mut(&entity)
            .map(|channels| channels.remove(&channel).is_some())
            .unwrap_or(false)
    }

    pub(super) fn active_expression(&self, entity: EntityId) -> Option<&str> {
        self.channels
            .get(&entity)
            .and_then(|channels| channels.values().next_back())
            .map(|channel| channel.expression.as_str())
    }

    pub(super) fn active_channel_count(&self, entity: EntityId) -> usize {
        self.channels.get(&entity).map_or(0, |map| map.len())
    }
}
