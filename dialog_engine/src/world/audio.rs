use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use super::entity::EntityId;
use super::types::Vec3;
use super::ContextId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel{}", self.0)
    }
}

/// Flat record of everything the audio engine was asked to do, written out
/// by the demo as a JSON log.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AudioLogEntry {
    TriggerPlay { cue: String, channel: u32 },
    TriggerRejected { cue: String, channel: u32 },
    TriggerStop { cue: String, channel: u32 },
    TriggerFinished { cue: String, channel: u32 },
}

#[derive(Debug)]
struct Channel {
    #[allow(dead_code)]
    entity: EntityId,
    position: Vec3,
    active_cue: Option<String>,
    listener: Option<ContextId>,
}

/// Speech playback: one auxiliary channel per speaking context, triggers
/// acknowledged synchronously and finished asynchronously via the registered
/// listener. Rejected cues model the bank-lookup failure path.
#[derive(Debug, Default)]
pub(super) struct AudioSystem {
    channels: BTreeMap<ChannelId, Channel>,
    rejected_cues: BTreeSet<String>,
    log: Vec<AudioLogEntry>,
    next_channel: u32,
}

impl AudioSystem {
    pub(super) fn create_channel(&mut self, entity: EntityId) -> ChannelId {
        self.next_channel += 1;
        let id = ChannelId(self.next_channel);
        self.channels.insert(
            id,
            Channel {
                entity,
                position: Vec3::ZERO,
                active_cue: None,
                listener: None,
            },
        );
        id
    }

    pub(super) fn add_finished_listener(&mut self, channel: ChannelId, context: ContextId) -> bool {
        match self.channels.get_mut(&channel) {
            Some(slot) => {
                slot.listener = Some(context);
                true
            }
            None => false,
        }
    }

    pub(super) fn remove_finished_listener(&mut self, channel: ChannelId, context: ContextId) {
        if let Some(slot) = self.channels.get_mut(&channel) {
            if slot.listener == Some(context) {
                slot.listener = None;
            }
        }
    }

    pub(super) fn listener(&self, channel: ChannelId) -> Option<ContextId> {
        self.channels.get(&channel).and_then(|slot| slot.listener)
    }

    pub(super) fn remove_channel(&mut self, channel: ChannelId) {
        self.channels.remove(&channel);
    }

    pub(super) fn channel_ids(&self) -> Vec<ChannelId> {
        self.channels.keys().copied().collect()
    }

    pub(super) fn set_channel_position(&mut self, channel: ChannelId, position: Vec3) {
        if let Some(slot) = self.channels.get_mut(&channel) {
            slot.position = position;
        }
    }

    pub(super) fn channel_position(&self, channel: ChannelId) -> Option<Vec3> {
        self.channels.get(&channel).map(|slot| slot.position)
    }

    pub(super) fn execute_trigger(&mut self, channel: ChannelId, cue: &str) -> bool {
        let Some(slot) = self.channels.get_mut(&channel) else {
            return false;
        };
        if self.rejected_cues.contains(cue) {
            self.log.push(AudioLogEntry::TriggerRejected {
                cue: cue.to_string(),
                channel: channel.0,
            });
            return false;
        }
        slot.active_cue = Some(cue.to_string());
        self.log.push(AudioLogEntry::TriggerPlay {
            cue: cue.to_string(),
            channel: channel.0,
        });
        true
    }

    pub(super) fn stop_trigger(&mut self, channel: ChannelId) -> Option<String> {
        let slot = self.channels.get_mut(&channel)?;
        let cue = slot.active_cue.take()?;
        self.log.push(AudioLogEntry::TriggerStop {
            cue: cue.clone(),
            channel: channel.0,
        });
        Some(cue)
    }

    pub(super) fn active_cue(&self, channel: ChannelId) -> Option<&str> {
        self.channels
            .get(&channel)
            .and_then(|slot| slot.active_cue.as_deref())
    }

    /// Driver side: the engine reports the trigger instance as finished.
    pub(super) fn finish_trigger(&mut self, channel: ChannelId) -> Option<ContextId> {
        let slot = self.channels.get_mut(&channel)?;
        let cue = slot.active_cue.take()?;
        self.log.push(AudioLogEntry::TriggerFinished {
            cue,
            channel: channel.0,
        });
        slot.listener
    }

    /// Driver side: make `execute_trigger` fail for this cue.
    pub(super) fn reject_cue(&mut self, cue: &str) {
        self.rejected_cues.insert(cue.to_string());
    }

    pub(super) fn log(&self) -> &[AudioLogEntry] {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_lifecycle_is_logged() {
        let mut system = AudioSystem::default();
        let channel = system.create_channel(EntityId(1));
        assert!(system.execute_trigger(channel, "line_01"));
        assert_eq!(system.active_cue(channel), Some("line_01"));
        assert_eq!(system.stop_trigger(channel), Some("line_01".to_string()));
        assert_eq!(system.active_cue(channel), None);
        assert_eq!(
            system.log(),
            &[
                AudioLogEntry::TriggerPlay {
                    cue: "line_01".to_string(),
                    channel: channel.0,
                },
                AudioLogEntry::TriggerStop {
                    cue: "line_01".to_string(),
                    channel: channel.0,
                },
            ]
        );
    }

    #[test]
    fn rejected_cue_fails_and_leaves_channel_idle() {
        let mut system = AudioSystem::default();
        let channel = system.create_channel(EntityId(2));
        system.reject_cue("broken_cue");
        assert!(!system.execute_trigger(channel, "broken_cue"));
        assert_eq!(system.active_cue(channel), None);
    }

    #[test]
    fn finish_reports_listener_and_clears_cue() {
        let mut system = AudioSystem::default();
        let channel = system.create_channel(EntityId(3));
        system.add_finished_listener(channel, ContextId(5));
        assert!(system.execute_trigger(channel, "line_02"));
        assert_eq!(system.finish_trigger(channel), Some(ContextId(5)));
        assert_eq!(system.active_cue(channel), None);
        assert_eq!(system.finish_trigger(channel), None);
    }

    #[test]
    fn stop_without_active_trigger_is_a_no_op() {
        let mut system = AudioSystem::default();
        let channel = system.create_channel(EntityId(4));
        assert_eq!(system.stop_trigger(channel), None);
        assert!(system.log().is_empty());
    }
}
