pub mod ai;
pub mod animation;
pub mod audio;
pub mod entity;
pub mod facial;
pub mod types;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ai::{AgentKind, AiSystem, GoalPipeEvent, PipeId, SignalData};
use animation::{AnimationSystem, QueryId};
use audio::{AudioLogEntry, AudioSystem, ChannelId};
use entity::{Entity, EntityEvent, EntityId, EntitySpec, EntityStore};
use facial::{FacialChannelId, FacialSystem};
use types::{Camera, Vec3};

/// Stable identifier of one sequencer context; the key every listener
/// registration is filed under.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ContextId(pub u32);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx{}", self.0)
    }
}

/// Asynchronous completion queued by a subsystem, drained by the session
/// once per frame and routed to the owning context's flag-setting sink.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    AnimQueryComplete {
        context: ContextId,
        query: QueryId,
        succeeded: bool,
    },
    AnimGraphDestroyed {
        context: ContextId,
    },
    GoalPipe {
        context: ContextId,
        pipe: PipeId,
        event: GoalPipeEvent,
    },
    Entity {
        context: ContextId,
        event: EntityEvent,
    },
    AudioTriggerFinished {
        context: ContextId,
    },
}

/// The simulated engine the sequencer talks to: entities, animation graphs,
/// AI agents, speech audio, facial channels, and the view camera, plus a
/// journal of everything that happened. Shared as `Rc<RefCell<World>>`
/// between the session and its contexts.
#[derive(Debug, Default)]
pub struct World {
    entities: EntityStore,
    animation: AnimationSystem,
    ai: AiSystem,
    audio: AudioSystem,
    facial: FacialSystem,
    pub camera: Camera,
    events: Vec<String>,
    dispatches: Vec<Dispatch>,
}

impl World {
    pub fn new() -> Self {
        World::default()
    }

    pub fn shared() -> Rc<RefCell<World>> {
        Rc::new(RefCell::new(World::new()))
    }

    pub fn log_event(&mut self, message: String) {
        self.events.push(message);
    }

    pub fn events(&self) -> &[String] {
        &self.events
    }

    pub fn take_dispatches(&mut self) -> Vec<Dispatch> {
        std::mem::take(&mut self.dispatches)
    }

    // --- entities -----------------------------------------------------

    pub fn spawn_entity(&mut self, spec: EntitySpec) -> EntityId {
        let name = spec.name.clone();
        let id = self.entities.spawn(spec);
        self.events.push(format!("entity.spawn {id} {name}"));
        id
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn set_entity_position(&mut self, id: EntityId, position: Vec3) {
        if let Some(entity) = self.entities.get_mut(id) {
            entity.position = position;
        }
    }

    pub fn set_entity_dead(&mut self, id: EntityId, dead: bool) {
        if let Some(entity) = self.entities.get_mut(id) {
            entity.dead = dead;
            self.events.push(format!("entity.dead {id}"));
        }
    }

    pub fn set_entity_alertness(&mut self, id: EntityId, alertness: u8) {
        if let Some(entity) = self.entities.get_mut(id) {
            entity.alertness = alertness;
        }
    }

    pub fn add_entity_listener(&mut self, id: EntityId, context: ContextId) {
        self.entities.add_listener(id, context);
    }

    pub fn remove_entity_listener(&mut self, id: EntityId, context: ContextId) {
        self.entities.remove_listener(id, context);
    }

    pub fn entity_listener_count(&self, id: EntityId) -> usize {
        self.entities.listener_count(id)
    }

    pub fn despawn_entity(&mut self, id: EntityId) {
        self.events.push(format!("entity.despawn {id}"));
        for context in self.entities.despawn(id) {
            self.dispatches.push(Dispatch::Entity {
                context,
                event: EntityEvent::Destroyed,
            });
        }
    }

    pub fn reset_entity(&mut self, id: EntityId) {
        self.events.push(format!("entity.reset {id}"));
        for context in self.entities.listeners_of(id) {
            self.dispatches.push(Dispatch::Entity {
                context,
                event: EntityEvent::Reset,
            });
        }
    }

    // --- animation ----------------------------------------------------

    pub fn install_animation_graph(&mut self, entity: EntityId) {
        self.animation.install_graph(entity);
    }

    pub fn has_animation_graph(&self, entity: EntityId) -> bool {
        self.animation.has_graph(entity)
    }

    pub fn anim_add_listener(&mut self, entity: EntityId, context: ContextId) -> bool {
        self.animation.add_listener(entity, context)
    }

    pub fn anim_remove_listener(&mut self, entity: EntityId, context: ContextId) {
        self.animation.remove_listener(entity, context);
    }

    pub fn anim_listener(&self, entity: EntityId) -> Option<ContextId> {
        self.animation.listener(entity)
    }

    pub fn anim_set_input(
        &mut self,
        entity: EntityId,
        name: &str,
        value: &str,
    ) -> Option<QueryId> {
        let query = self.animation.set_input(entity, name, value)?;
        self.events
            .push(format!("anim.input {entity} {name}={value} {query}"));
        Some(query)
    }

    pub fn anim_query_leave_state(&mut self, entity: EntityId) -> Option<QueryId> {
        self.animation.query_leave_state(entity)
    }

    pub fn anim_query_change_input(&mut self, entity: EntityId, name: &str) -> Option<QueryId> {
        self.animation.query_change_input(entity, name)
    }

    pub fn anim_current_input(&self, entity: EntityId) -> Option<(&str, &str)> {
        self.animation.current_input(entity)
    }

    pub fn anim_pending_query(&self, entity: EntityId) -> Option<QueryId> {
        self.animation.pending_query(entity)
    }

    /// Driver side: the animation graph acknowledges its pending query.
    pub fn complete_anim_query(&mut self, entity: EntityId, succeeded: bool) {
        if let Some((context, query)) = self.animation.complete_query(entity) {
            self.dispatches.push(Dispatch::AnimQueryComplete {
                context,
                query,
                succeeded,
            });
        }
    }

    /// Driver side: the graph goes away under the listener.
    pub fn destroy_animation_graph(&mut self, entity: EntityId) {
        if let Some(context) = self.animation.destroy_graph(entity) {
            self.dispatches.push(Dispatch::AnimGraphDestroyed { context });
        }
    }

    // --- AI -----------------------------------------------------------

    pub fn register_agent(&mut self, entity: EntityId, kind: AgentKind) {
        self.ai.register_agent(entity, kind);
    }

    pub fn agent_kind(&self, entity: EntityId) -> Option<AgentKind> {
        self.ai.agent_kind(entity)
    }

    pub fn is_pipe_user(&self, entity: EntityId) -> bool {
        self.ai.is_pipe_user(entity)
    }

    pub fn ai_move_dir(&self, entity: EntityId) -> Option<Vec3> {
        self.ai.move_dir(entity)
    }

    pub fn alloc_goal_pipe(&mut self) -> PipeId {
        self.ai.alloc_goal_pipe()
    }

    pub fn register_goal_pipe_listener(
        &mut self,
        entity: EntityId,
        pipe: PipeId,
        context: ContextId,
    ) -> bool {
        self.ai.register_goal_pipe_listener(entity, pipe, context)
    }

    pub fn unregister_goal_pipe_listener(
        &mut self,
        entity: EntityId,
        pipe: PipeId,
        context: ContextId,
    ) {
        self.ai.unregister_goal_pipe_listener(entity, pipe, context);
    }

    pub fn goal_pipe_listener(&self, entity: EntityId, pipe: PipeId) -> Option<ContextId> {
        self.ai.pipe_listener(entity, pipe)
    }

    pub fn remove_sub_pipe(&mut self, entity: EntityId, pipe: PipeId) {
        if self.ai.remove_sub_pipe(entity, pipe) {
            self.events.push(format!("ai.pipe.remove {entity} {pipe}"));
        }
    }

    pub fn cancel_sub_pipe(&mut self, entity: EntityId, pipe: PipeId) {
        if self.ai.cancel_sub_pipe(entity, pipe) {
            self.events.push(format!("ai.pipe.cancel {entity} {pipe}"));
        }
    }

    pub fn has_sub_pipe(&self, entity: EntityId, pipe: PipeId) -> bool {
        self.ai.has_sub_pipe(entity, pipe)
    }

    pub fn send_ai_signal(
        &mut self,
        entity: EntityId,
        priority: u8,
        text: &str,
        data: SignalData,
    ) -> bool {
        let sent = self.ai.send_signal(entity, priority, text, data);
        if sent {
            self.events.push(format!("ai.signal {entity} {text}"));
        }
        sent
    }

    pub fn ai_signals(&self, entity: EntityId) -> Vec<(u8, String)> {
        self.ai.signals(entity)
    }

    pub fn set_ref_point(&mut self, entity: EntityId, pos: Vec3, dir: Vec3) {
        self.ai.set_ref_point(entity, pos, dir);
    }

    pub fn reset_look_at(&mut self, entity: EntityId) {
        if self.ai.reset_look_at(entity) {
            self.events.push(format!("ai.look.reset {entity}"));
        }
    }

    pub fn set_look_at_point(&mut self, entity: EntityId, pos: Vec3) -> Option<bool> {
        self.ai.set_look_at_point(entity, pos)
    }

    pub fn gaze_target(&self, entity: EntityId) -> Option<Vec3> {
        self.ai.gaze_target(entity)
    }

    /// Driver side: mark the agent as facing its gaze target.
    pub fn set_gaze_reached(&mut self, entity: EntityId, reached: bool) {
        self.ai.set_gaze_reached(entity, reached);
    }

    /// Driver side: goal pipe lifecycle event from the behaviour layer.
    pub fn emit_goal_pipe_event(&mut self, entity: EntityId, pipe: PipeId, event: GoalPipeEvent) {
        if let Some(context) = self.ai.pipe_listener(entity, pipe) {
            self.events
                .push(format!("ai.pipe.event {entity} {pipe} {}", event.label()));
            self.dispatches.push(Dispatch::GoalPipe {
                context,
                pipe,
                event,
            });
        }
    }

    // --- audio ----------------------------------------------------------

    pub fn create_audio_channel(&mut self, entity: EntityId) -> ChannelId {
        self.audio.create_channel(entity)
    }

    pub fn audio_add_finished_listener(&mut self, channel: ChannelId, context: ContextId) -> bool {
        self.audio.add_finished_listener(channel, context)
    }

    pub fn audio_remove_finished_listener(&mut self, channel: ChannelId, context: ContextId) {
        self.audio.remove_finished_listener(channel, context);
    }

    pub fn audio_listener(&self, channel: ChannelId) -> Option<ContextId> {
        self.audio.listener(channel)
    }

    pub fn remove_audio_channel(&mut self, channel: ChannelId) {
        self.audio.remove_channel(channel);
    }

    pub fn audio_channel_ids(&self) -> Vec<ChannelId> {
        self.audio.channel_ids()
    }

    pub fn set_audio_channel_position(&mut self, channel: ChannelId, position: Vec3) {
        self.audio.set_channel_position(channel, position);
    }

    pub fn audio_channel_position(&self, channel: ChannelId) -> Option<Vec3> {
        self.audio.channel_position(channel)
    }

    pub fn execute_audio_trigger(&mut self, channel: ChannelId, cue: &str) -> bool {
        let started = self.audio.execute_trigger(channel, cue);
        self.events.push(if started {
            format!("audio.trigger {channel} {cue}")
        } else {
            format!("audio.trigger.rejected {channel} {cue}")
        });
        started
    }

    pub fn stop_audio_trigger(&mut self, channel: ChannelId) {
        if let Some(cue) = self.audio.stop_trigger(channel) {
            self.events.push(format!("audio.stop {channel} {cue}"));
        }
    }

    pub fn audio_active_cue(&self, channel: ChannelId) -> Option<&str> {
        self.audio.active_cue(channel)
    }

    /// Driver side: the engine reports the trigger instance finished.
    pub fn finish_audio_trigger(&mut self, channel: ChannelId) {
        if let Some(context) = self.audio.finish_trigger(channel) {
            self.dispatches.push(Dispatch::AudioTriggerFinished { context });
        }
    }

    /// Driver side: make this cue fail to start.
    pub fn reject_audio_cue(&mut self, cue: &str) {
        self.audio.reject_cue(cue);
    }

    pub fn audio_log(&self) -> &[AudioLogEntry] {
        self.audio.log()
    }

    // --- facial ---------------------------------------------------------

    pub fn register_facial_expression(&mut self, name: &str) {
        self.facial.register_expression(name);
    }

    pub fn knows_facial_expression(&self, name: &str) -> bool {
        self.facial.knows_expression(name)
    }

    pub fn start_facial_channel(
        &mut self,
        entity: EntityId,
        expression: &str,
        weight: f32,
        fade_time: f32,
    ) -> Option<FacialChannelId> {
        let channel = self
            .facial
            .start_channel(entity, expression, weight, fade_time);
        match channel {
            Some(id) => self
                .events
                .push(format!("facial.start {entity} {expression} {id}")),
            None => self
                .events
                .push(format!("facial.unknown {entity} {expression}")),
        }
        channel
    }

    pub fn stop_facial_channel(
        &mut self,
        entity: EntityId,
        channel: FacialChannelId,
        fade_time: f32,
    ) {
        if self.facial.stop_channel(entity, channel, fade_time) {
            self.events.push(format!("facial.stop {entity} {channel}"));
        }
    }

    pub fn facial_active_expression(&self, entity: EntityId) -> Option<&str> {
        self.facial.active_expression(entity)
    }

    pub fn facial_channel_count(&self, entity: EntityId) -> usize {
        self.facial.active_channel_count(entity)
    }
}
