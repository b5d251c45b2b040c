use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use anyhow::{bail, Result};
use dialog_script::{ActorId, DialogScript};

use crate::sequencer::{AbortReason, ActorContext, AUDIO_FINISHED_RESCHEDULE};
use crate::world::entity::EntityId;
use crate::world::{ContextId, Dispatch, World};

/// How rudely the dialogue takes over the speaker's AI behaviour, and which
/// begin/cancel signals that implies.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum InterruptBehaviour {
    #[default]
    Never,
    Medium,
    Always,
}

/// Alertness level at which the AI interrupts the conversation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum AlertnessInterrupt {
    #[default]
    Never,
    Alert,
    Combat,
}

impl AlertnessInterrupt {
    pub fn threshold(&self) -> Option<u8> {
        match self {
            AlertnessInterrupt::Never => None,
            AlertnessInterrupt::Alert => Some(1),
            AlertnessInterrupt::Combat => Some(2),
        }
    }
}

/// Per-actor exceptions to the abort rules.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct ActorPolicy {
    /// Keep playing even if the actor is marked dead.
    pub no_abort_on_death: bool,
    /// Leave the speech audio running when the context aborts; overridden
    /// for actor-death and entity-destroyed aborts.
    pub no_abort_sound: bool,
    /// Ignore goal-pipe deselection/removal from the AI.
    pub no_ai_abort: bool,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Player-awareness distance threshold; 0 or less disables the check.
    pub awareness_distance: f32,
    /// Player-awareness view half-angle in degrees; 0 or less disables.
    pub awareness_angle_deg: f32,
    /// Seconds the player may stay unaware before the session aborts.
    pub awareness_grace_time: f32,
    pub alertness_interrupt: AlertnessInterrupt,
    pub interrupt_behaviour: InterruptBehaviour,
    pub allow_look_at: bool,
    pub allow_anim: bool,
    pub policies: BTreeMap<ActorId, ActorPolicy>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            awareness_distance: 0.0,
            awareness_angle_deg: 0.0,
            awareness_grace_time: 3.0,
            alertness_interrupt: AlertnessInterrupt::Never,
            interrupt_behaviour: InterruptBehaviour::Never,
            allow_look_at: true,
            allow_anim: true,
            policies: BTreeMap::new(),
        }
    }
}

/// The slice of the session a sequencer context is allowed to see: the
/// actor-to-entity cast, the playback configuration, and a slot for
/// next-line requests. Contexts never reach the session itself.
#[derive(Debug)]
pub struct SessionLink {
    cast: BTreeMap<ActorId, EntityId>,
    config: SessionConfig,
    schedule_request: Option<f32>,
}

impl SessionLink {
    pub fn new(cast: BTreeMap<ActorId, EntityId>, config: SessionConfig) -> Self {
        SessionLink {
            cast,
            config,
            schedule_request: None,
        }
    }

    pub fn actor_entity(&self, actor: ActorId) -> Option<EntityId> {
        self.cast.get(&actor).copied()
    }

    pub fn cast(&self) -> &BTreeMap<ActorId, EntityId> {
        &self.cast
    }

    /// Requests the next line after `delay` seconds; concurrent requests
    /// collapse to the soonest one.
    pub fn schedule_next_line(&mut self, delay: f32) {
        let delay = delay.max(0.0);
        self.schedule_request = Some(match self.schedule_request {
            Some(current) => current.min(delay),
            None => delay,
        });
    }

    pub fn take_schedule_request(&mut self) -> Option<f32> {
        self.schedule_request.take()
    }

    pub fn player_awareness_grace_time(&self) -> f32 {
        self.config.awareness_grace_time
    }

    /// Distance and view-angle thresholds for the awareness check.
    pub fn player_awareness_values(&self) -> (f32, f32) {
        (
            self.config.awareness_distance,
            self.config.awareness_angle_deg,
        )
    }

    pub fn alertness_interrupt(&self) -> AlertnessInterrupt {
        self.config.alertness_interrupt
    }

    pub fn interrupt_behaviour(&self) -> InterruptBehaviour {
        self.config.interrupt_behaviour
    }

    pub fn allows_look_at(&self) -> bool {
        self.config.allow_look_at
    }

    pub fn allows_anim(&self) -> bool {
        self.config.allow_anim
    }

    pub fn actor_policy(&self, actor: ActorId) -> ActorPolicy {
        self.config
            .policies
            .get(&actor)
            .copied()
            .unwrap_or_default()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Running,
    Finished,
    Aborted,
}

/// Owns one sequencer context per cast member and walks the script line by
/// line: drains subsystem completions, hands due lines to their speaker,
/// updates every context once per frame, and ends the session when a
/// context aborts or the script runs out.
pub struct DialogSession {
    name: String,
    world: Rc<RefCell<World>>,
    script: DialogScript,
    link: SessionLink,
    contexts: BTreeMap<ActorId, ActorContext>,
    context_actors: BTreeMap<ContextId, ActorId>,
    local_player: Option<ActorId>,
    next_line: usize,
    pending_line: Option<f32>,
    status: SessionStatus,
    abort_reason: Option<AbortReason>,
    next_context_id: u32,
}

impl DialogSession {
    pub fn new(
        world: Rc<RefCell<World>>,
        script: DialogScript,
        cast: BTreeMap<ActorId, EntityId>,
        config: SessionConfig,
        local_player: Option<ActorId>,
    ) -> Result<Self> {
        script.validate()?;
        for actor in script.cast() {
            if !cast.contains_key(&actor) {
                bail!(
                    "script {:?} references {actor} but the cast does not place it",
                    script.name
                );
            }
        }
        if let Some(player) = local_player {
            if !cast.contains_key(&player) {
                bail!("local player {player} is not part of the cast");
            }
        }
        Ok(DialogSession {
            name: script.name.clone(),
            world,
            link: SessionLink::new(cast, config),
            script,
            contexts: BTreeMap::new(),
            context_actors: BTreeMap::new(),
            local_player,
            next_line: 0,
            pending_line: None,
            status: SessionStatus::Pending,
            abort_reason: None,
            next_context_id: 0,
        })
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn abort_reason(&self) -> Option<AbortReason> {
        self.abort_reason
    }

    pub fn context(&self, actor: ActorId) -> Option<&ActorContext> {
        self.contexts.get(&actor)
    }

    pub fn context_mut(&mut self, actor: ActorId) -> Option<&mut ActorContext> {
        self.contexts.get_mut(&actor)
    }

    pub fn link_mut(&mut self) -> &mut SessionLink {
        &mut self.link
    }

    /// Creates and starts one context per cast member and schedules the
    /// first line immediately.
    pub fn begin(&mut self) {
        if self.status != SessionStatus::Pending {
            return;
        }
        self.world
            .borrow_mut()
            .log_event(format!("dialog.session.begin {}", self.name));
        let cast: Vec<(ActorId, EntityId)> = self
            .link
            .cast()
            .iter()
            .map(|(actor, entity)| (*actor, *entity))
            .collect();
        for (actor, entity) in cast {
            self.next_context_id += 1;
            let context_id = ContextId(self.next_context_id);
            let mut context = ActorContext::new(
                Rc::clone(&self.world),
                context_id,
                actor,
                entity,
                self.local_player == Some(actor),
            );
            context.begin_session(&self.link);
            self.contexts.insert(actor, context);
            self.context_actors.insert(context_id, actor);
        }
        self.pending_line = Some(0.0);
        self.status = SessionStatus::Running;
    }

    /// One simulation frame. Order matters: completions queued by the world
    /// since the last frame are routed to their contexts first, then the
    /// line scheduler ticks, then every context advances.
    pub fn update(&mut self, dt: f32) -> SessionStatus {
        if self.status != SessionStatus::Running {
            return self.status;
        }

        self.route_dispatches();
        self.tick_line_schedule(dt);

        for context in self.contexts.values_mut() {
            context.update(dt, &mut self.link);
        }

        if let Some(request) = self.link.take_schedule_request() {
            self.pending_line = Some(match self.pending_line {
                Some(current) => current.min(request),
                None => request,
            });
        }

        let aborted = self
            .contexts
            .values()
            .find_map(|context| context.abort_reason());
        if let Some(reason) = aborted {
            self.abort_reason = Some(reason);
            self.world.borrow_mut().log_event(format!(
                "dialog.session.abort {} reason={}",
                self.name,
                reason.label()
            ));
            self.teardown_contexts();
            self.status = SessionStatus::Aborted;
        }

        self.status
    }

    /// Force-aborts every context, e.g. when gameplay tears the scene down.
    pub fn abort(&mut self) {
        if self.status != SessionStatus::Running {
            return;
        }
        for context in self.contexts.values_mut() {
            context.abort_context(true, AbortReason::SessionEnded, &self.link);
        }
        self.abort_reason = Some(AbortReason::SessionEnded);
        self.teardown_contexts();
        self.status = SessionStatus::Aborted;
    }

    pub fn end(&mut self) {
        if self.status != SessionStatus::Running {
            return;
        }
        self.teardown_contexts();
        self.status = SessionStatus::Finished;
        self.world
            .borrow_mut()
            .log_event(format!("dialog.session.end {}", self.name));
    }

    fn teardown_contexts(&mut self) {
        for context in self.contexts.values_mut() {
            context.end_session(&self.link);
        }
    }

    fn route_dispatches(&mut self) {
        let dispatches = self.world.borrow_mut().take_dispatches();
        for dispatch in dispatches {
            match dispatch {
                Dispatch::AnimQueryComplete {
                    context,
                    query,
                    succeeded,
                } => {
                    if let Some(context) = self.context_for_mut(context) {
                        context.on_anim_query_complete(query, succeeded);
                    }
                }
                Dispatch::AnimGraphDestroyed { context } => {
                    if let Some(context) = self.context_for_mut(context) {
                        context.on_anim_graph_destroyed();
                    }
                }
                Dispatch::GoalPipe {
                    context,
                    pipe,
                    event,
                } => {
                    let link = &self.link;
                    if let Some(actor) = self.context_actors.get(&context) {
                        if let Some(context) = self.contexts.get_mut(actor) {
                            context.on_goal_pipe_event(pipe, event, link);
                        }
                    }
                }
                Dispatch::Entity { context, event } => {
                    let link = &self.link;
                    if let Some(actor) = self.context_actors.get(&context) {
                        if let Some(context) = self.contexts.get_mut(actor) {
                            context.on_entity_event(event, link);
                        }
                    }
                }
                Dispatch::AudioTriggerFinished { context } => {
                    if let Some(actor) = self.context_actors.get(&context).copied() {
                        if let Some(context) = self.contexts.get_mut(&actor) {
                            context.on_audio_trigger_finished();
                        }
                        // The finished line hands over to the next one after
                        // a short beat; cue lengths are not queryable yet.
                        self.link.schedule_next_line(AUDIO_FINISHED_RESCHEDULE);
                    }
                }
            }
        }
    }

    fn context_for_mut(&mut self, id: ContextId) -> Option<&mut ActorContext> {
        let actor = self.context_actors.get(&id)?;
        self.contexts.get_mut(actor)
    }

    fn tick_line_schedule(&mut self, dt: f32) {
        let Some(remaining) = self.pending_line else {
            return;
        };
        let remaining = remaining - dt;
        if remaining > 0.0 {
            self.pending_line = Some(remaining);
            return;
        }
        self.pending_line = None;

        let Some(line) = self.script.line(self.next_line).cloned() else {
            self.end();
            return;
        };
        let index = self.next_line;
        self.next_line += 1;

        match self.contexts.get_mut(&line.actor) {
            Some(context) => {
                self.world
                    .borrow_mut()
                    .log_event(format!("dialog.line {} {}", index, line.actor));
                context.play_line(line);
            }
            None => {
                // Speaker not cast; skip the line rather than stall.
                self.link.schedule_next_line(0.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_requests_collapse_to_the_soonest() {
        let mut link = SessionLink::new(BTreeMap::new(), SessionConfig::default());
        link.schedule_next_line(2.0);
        link.schedule_next_line(0.5);
        link.schedule_next_line(1.5);
        assert_eq!(link.take_schedule_request(), Some(0.5));
        assert_eq!(link.take_schedule_request(), None);
    }

    #[test]
    fn negative_delays_clamp_to_zero() {
        let mut link = SessionLink::new(BTreeMap::new(), SessionConfig::default());
        link.schedule_next_line(-3.0);
        assert_eq!(link.take_schedule_request(), Some(0.0));
    }

    #[test]
    fn alertness_thresholds() {
        assert_eq!(AlertnessInterrupt::Never.threshold(), None);
        assert_eq!(AlertnessInterrupt::Alert.threshold(), Some(1));
        assert_eq!(AlertnessInterrupt::Combat.threshold(), Some(2));
    }

    #[test]
    fn unknown_actor_gets_default_policy() {
        let link = SessionLink::new(BTreeMap::new(), SessionConfig::default());
        assert_eq!(link.actor_policy(ActorId(9)), ActorPolicy::default());
    }
}
