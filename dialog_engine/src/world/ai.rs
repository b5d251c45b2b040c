use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::entity::EntityId;
use super::types::Vec3;
use super::ContextId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PipeId(pub u32);

impl fmt::Display for PipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipe{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AgentKind {
    Actor,
    Player,
}

/// Goal pipe lifecycle notifications, delivered to the registered listener.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GoalPipeEvent {
    Deselected,
    Removed,
    Finished,
    Suspended,
    Resumed,
    AnimStarted,
    RefPointMoved,
}

impl GoalPipeEvent {
    pub fn label(&self) -> &'static str {
        match self {
            GoalPipeEvent::Deselected => "deselected",
            GoalPipeEvent::Removed => "removed",
            GoalPipeEvent::Finished => "finished",
            GoalPipeEvent::Suspended => "suspended",
            GoalPipeEvent::Resumed => "resumed",
            GoalPipeEvent::AnimStarted => "anim_started",
            GoalPipeEvent::RefPointMoved => "ref_point_moved",
        }
    }
}

/// Payload attached to behaviour signals; carries the goal pipe handle plus
/// the exact-positioning tolerances when an animation rides the pipe.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalData {
    pub pipe: Option<PipeId>,
    pub anim: Option<String>,
    pub anim_is_signal: bool,
    pub start_radius: Vec3,
    pub direction_tolerance_deg: f32,
    pub target_radius: f32,
}

impl Default for SignalData {
    fn default() -> Self {
        SignalData {
            pipe: None,
            anim: None,
            anim_is_signal: false,
            start_radius: Vec3::ZERO,
            direction_tolerance_deg: 0.0,
            target_radius: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub(super) struct SignalRecord {
    pub(super) priority: u8,
    pub(super) text: String,
    pub(super) data: SignalData,
}

#[derive(Debug)]
struct AgentState {
    kind: AgentKind,
    move_dir: Vec3,
    gaze_target: Option<Vec3>,
    gaze_reached: bool,
    ref_point: Option<(Vec3, Vec3)>,
    sub_pipes: BTreeSet<PipeId>,
    pipe_listeners: BTreeMap<PipeId, ContextId>,
    signals: Vec<SignalRecord>,
}

impl AgentState {
    fn new(kind: AgentKind) -> Self {
        AgentState {
            kind,
            move_dir: Vec3::new(0.0, 1.0, 0.0),
            gaze_target: None,
            gaze_reached: false,
            ref_point: None,
            sub_pipes: BTreeSet::new(),
            pipe_listeners: BTreeMap::new(),
            signals: Vec::new(),
        }
    }
}

/// Navigation/AI side of the world: gaze control, behaviour signals, and
/// cancelable goal pipes. Only `AgentKind::Actor` agents are pipe users;
/// entities without an agent reject every call (fail open upstream).
#[derive(Debug, Default)]
pub(super) struct AiSystem {
    agents: BTreeMap<EntityId, AgentState>,
    next_pipe: u32,
}

impl AiSystem {
    pub(super) fn register_agent(&mut self, entity: EntityId, kind: AgentKind) {
        self.agents.insert(entity, AgentState::new(kind));
    }

    pub(super) fn agent_kind(&self, entity: EntityId) -> Option<AgentKind> {
        self.agents.get(&entity).map(|agent| agent.kind)
    }

    pub(super) fn is_pipe_user(&self, entity: EntityId) -> bool {
        self.agent_kind(entity) == Some(AgentKind::Actor)
    }

    pub(super) fn move_dir(&self, entity: EntityId) -> Option<Vec3> {
        self.agents.get(&entity).map(|agent| agent.move_dir)
    }

    pub(super) fn alloc_goal_pipe(&mut self) -> PipeId {
        self.next_pipe += 1;
        PipeId(self.next_pipe)
    }

    pub(super) fn register_goal_pipe_listener(
        &mut self,
        entity: EntityId,
        pipe: PipeId,
        context: ContextId,
    ) -> bool {
        match self.agents.get_mut(&entity) {
            Some(agent) if agent.kind == AgentKind::Actor => {
                agent.sub_pipes.insert(pipe);
                agent.pipe_listeners.insert(pipe, context);
                true
            }
            _ => false,
        }
    }

    pub(super) fn unregister_goal_pipe_listener(
        &mut self,
        entity: EntityId,
        pipe: PipeId,
        context: ContextId,
    ) {
        if let Some(agent) = self.agents.get_mut(&entity) {
            if agent.pipe_listeners.get(&pipe) == Some(&context) {
                agent.pipe_listeners.remove(&pipe);
            }
        }
    }

    pub(super) fn pipe_listener(&self, entity: EntityId, pipe: PipeId) -> Option<ContextId> {
        self.agents
            .get(&entity)
            .and_then(|agent| agent.pipe_listeners.get(&pipe))
            .copied()
    }

    pub(super) fn remove_sub_pipe(&mut self, entity: EntityId, pipe: PipeId) -> bool {
        self.agents
            .get_mut(&entity)
            .map(|agent| agent.sub_pipes.remove(&pipe))
            .unwrap_or(false)
    }

    pub(super) fn cancel_sub_pipe(&mut self, entity: EntityId, pipe: PipeId) -> bool {
        // Cancellation and removal collapse to the same thing here; the real
        // engine distinguishes an in-place cancel from a queue removal.
        self.remove_sub_pipe(entity, pipe)
    }

    pub(super) fn has_sub_pipe(&self, entity: EntityId, pipe: PipeId) -> bool {
        self.agents
            .get(&entity)
            .map(|agent| agent.sub_pipes.contains(&pipe))
            .unwrap_or(false)
    }

    pub(super) fn send_signal(
        &mut self,
        entity: EntityId,
        priority: u8,
        text: &str,
        data: SignalData,
    ) -> bool {
        match self.agents.get_mut(&entity) {
            Some(agent) => {
                agent.signals.push(SignalRecord {
                    priority,
                    text: text.to_string(),
                    data,
                });
                true
            }
            None => false,
        }
    }

    pub(super) fn signals(&self, entity: EntityId) -> Vec<(u8, String)> {
        self.agents
            .get(&entity)
            .map(|agent| {
                agent
                    .signals
                    .iter()
                    .map(|record| (record.priority, record.text.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(super) fn set_ref_point(&mut self, entity: EntityId, pos: Vec3, dir: Vec3) -> bool {
        match self.agents.get_mut(&entity) {
            Some(agent) => {
                agent.ref_point = Some((pos, dir));
                true
            }
            None => false,
        }
    }

    pub(super) fn reset_look_at(&mut self, entity: EntityId) -> bool {
        match self.agents.get_mut(&entity) {
            Some(agent) => {
                agent.gaze_target = None;
                agent.gaze_reached = false;
                true
            }
            None => false,
        }
    }

    /// Issues (or refreshes) a gaze command; returns whether the agent is
    /// already facing the target.
    pub(super) fn set_look_at_point(&mut self, entity: EntityId, pos: Vec3) -> Option<bool> {
        let agent = self.agents.get_mut(&entity)?;
        agent.gaze_target = Some(pos);
        Some(agent.gaze_reached)
    }

    pub(super) fn gaze_target(&self, entity: EntityId) -> Option<Vec3> {
        self.agents.get(&entity).and_then(|agent| agent.gaze_target)
    }

    /// Driver side: mark the turn-to-face as finished (or not).
    pub(super) fn set_gaze_reached(&mut self, entity: EntityId, reached: bool) {
        if let Some(agent) = self.agents.get_mut(&entity) {
            agent.gaze_reached = reached;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn players_are_not_pipe_users() {
        let mut system = AiSystem::default();
        system.register_agent(EntityId(1), AgentKind::Player);
        system.register_agent(EntityId(2), AgentKind::Actor);
        assert!(!system.is_pipe_user(EntityId(1)));
        assert!(system.is_pipe_user(EntityId(2)));
        let pipe = system.alloc_goal_pipe();
        assert!(!system.register_goal_pipe_listener(EntityId(1), pipe, ContextId(1)));
    }

    #[test]
    fn pipe_listener_round_trip() {
        let mut system = AiSystem::default();
        let entity = EntityId(4);
        system.register_agent(entity, AgentKind::Actor);
        let pipe = system.alloc_goal_pipe();
        assert!(system.register_goal_pipe_listener(entity, pipe, ContextId(6)));
        assert_eq!(system.pipe_listener(entity, pipe), Some(ContextId(6)));
        system.unregister_goal_pipe_listener(entity, pipe, ContextId(6));
        assert_eq!(system.pipe_listener(entity, pipe), None);
        assert!(system.remove_sub_pipe(entity, pipe));
        assert!(!system.has_sub_pipe(entity, pipe));
    }

    #[test]
    fn gaze_reports_reached_only_after_driver_confirms() {
        let mut system = AiSystem::default();
        let entity = EntityId(8);
        system.register_agent(entity, AgentKind::Actor);
        let target = Vec3::new(1.0, 0.0, 0.0);
        assert_eq!(system.set_look_at_point(entity, target), Some(false));
        system.set_gaze_reached(entity, true);
        assert_eq!(system.set_look_at_point(entity, target), Some(true));
        assert!(system.reset_look_at(entity));
        assert_eq!(system.gaze_target(entity), None);
    }

    #[test]
    fn missing_agent_rejects_calls() {
        let mut system = AiSystem::default();
        assert!(system.set_look_at_point(EntityId(9), Vec3::ZERO).is_none());
        assert!(!system.send_signal(EntityId(9), 10, "ACT_ANIM", SignalData::default()));
    }
}
