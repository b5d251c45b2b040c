//! Per-actor line sequencer: walks one spoken line through its phases
//! (gaze, body animation, speech audio, facial expression) against the
//! world's subsystems, with timeouts so a silent subsystem can never stall
//! the conversation.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use dialog_script::{ActorId, LineSpec};

use crate::session::{InterruptBehaviour, SessionLink};
use crate::world::ai::{AgentKind, GoalPipeEvent, PipeId, SignalData};
use crate::world::animation::QueryId;
use crate::world::audio::ChannelId;
use crate::world::entity::{EntityEvent, EntityId};
use crate::world::facial::FacialChannelId;
use crate::world::types::Vec3;
use crate::world::{ContextId, World};

/// Seconds a phase may wait for its subsystem before giving up and moving on.
const LOOKAT_TIMEOUT: f32 = 1.0;
const ANIM_TIMEOUT: f32 = 1.0;
const SOUND_TIMEOUT: f32 = 1.0;

/// Cadence of the local-player awareness check.
pub(crate) const PLAYER_CHECK_INTERVAL: f32 = 0.2;

/// Delay before retrying the conversation after the audio engine rejects a cue.
const AUDIO_REJECTED_RESCHEDULE: f32 = 2.0;
/// Beat between a finished speech trigger and the next line.
pub(crate) const AUDIO_FINISHED_RESCHEDULE: f32 = 0.2;

/// Tolerances for animations routed through the exact-positioning pipe.
const EP_START_RADIUS: Vec3 = Vec3 {
    x: 0.1,
    y: 0.1,
    z: 0.1,
};
const EP_DIR_TOLERANCE_DEG: f32 = 5.0;
const EP_TARGET_RADIUS: f32 = 0.05;

const SIGNAL_PRIORITY: u8 = 10;

/// One more than the number of phases a line passes through; the advance
/// loop trips a guard if it ever spins past this in a single frame.
const PHASE_ADVANCE_LIMIT: usize = 7;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Idle,
    NewLine,
    LookAt,
    Anim,
    ScheduleSoundPlay,
    SoundFacial,
    EndLine,
    Aborted,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::NewLine => "new_line",
            Phase::LookAt => "look_at",
            Phase::Anim => "anim",
            Phase::ScheduleSoundPlay => "schedule_sound_play",
            Phase::SoundFacial => "sound_facial",
            Phase::EndLine => "end_line",
            Phase::Aborted => "aborted",
        }
    }

    fn next(self) -> Phase {
        match self {
            Phase::Idle => Phase::NewLine,
            Phase::NewLine => Phase::LookAt,
            Phase::LookAt => Phase::Anim,
            Phase::Anim => Phase::ScheduleSoundPlay,
            Phase::ScheduleSoundPlay => Phase::SoundFacial,
            Phase::SoundFacial => Phase::EndLine,
            Phase::EndLine => Phase::Idle,
            Phase::Aborted => Phase::Aborted,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AbortReason {
    EntityDestroyed,
    ActorDead,
    AiInterrupt,
    PlayerOutOfRange,
    PlayerOutOfView,
    SessionEnded,
}

impl AbortReason {
    pub fn label(self) -> &'static str {
        match self {
            AbortReason::EntityDestroyed => "entity_destroyed",
            AbortReason::ActorDead => "actor_dead",
            AbortReason::AiInterrupt => "ai_interrupt",
            AbortReason::PlayerOutOfRange => "player_out_of_range",
            AbortReason::PlayerOutOfView => "player_out_of_view",
            AbortReason::SessionEnded => "session_ended",
        }
    }
}

/// Sequences the lines one cast member speaks. Owns nothing in the world
/// beyond listener registrations and handles; `cancel_current` releases all
/// of them and is safe to call any number of times.
pub struct ActorContext {
    world: Rc<RefCell<World>>,
    context_id: ContextId,
    actor_id: ActorId,
    entity_id: EntityId,
    is_local_player: bool,

    phase: Phase,
    current_line: Option<Arc<LineSpec>>,
    abort_reason: Option<AbortReason>,

    lookat_timeout: f32,
    anim_timeout: f32,
    sound_timeout: f32,
    /// Length of the playing cue; not queryable from the audio layer yet,
    /// kept so line pacing can use it once it is.
    #[allow(dead_code)]
    sound_length: f32,

    has_scheduled: bool,
    anim_scheduled: bool,
    anim_started: bool,
    anim_uses_signal: bool,
    /// Mirror of the line's exact-positioning flag while it plays; cancel
    /// unwinds that path through the pipe handle, not this flag.
    #[allow(dead_code)]
    anim_uses_exact_positioning: bool,
    sound_scheduled: bool,
    sound_started: bool,
    lookat_needs_reset: bool,
    needs_cancel: bool,
    in_cancel: bool,
    abort_from_ai: bool,

    lookat_actor: Option<ActorId>,
    sticky_lookat_actor: Option<ActorId>,

    anim_listener_registered: bool,
    anim_query: Option<QueryId>,
    goal_pipe: Option<PipeId>,
    ex_pos_anim_pipe: Option<PipeId>,
    speech_channel: Option<ChannelId>,
    facial_channel: Option<FacialChannelId>,

    check_player_timeout: f32,
    player_aware_timeout: f32,
    is_aware: bool,
    /// Looking half of the last awareness sample; the abort reason only
    /// consults the range half.
    #[allow(dead_code)]
    is_aware_looking: bool,
    is_aware_in_range: bool,
}

impl ActorContext {
    pub fn new(
        world: Rc<RefCell<World>>,
        context_id: ContextId,
        actor_id: ActorId,
        entity_id: EntityId,
        is_local_player: bool,
    ) -> Self {
        ActorContext {
            world,
            context_id,
            actor_id,
            entity_id,
            is_local_player,
            phase: Phase::Idle,
            current_line: None,
            abort_reason: None,
            lookat_timeout: LOOKAT_TIMEOUT,
            anim_timeout: ANIM_TIMEOUT,
            sound_timeout: SOUND_TIMEOUT,
            sound_length: 0.0,
            has_scheduled: false,
            anim_scheduled: false,
            anim_started: false,
            anim_uses_signal: false,
            anim_uses_exact_positioning: false,
            sound_scheduled: false,
            sound_started: false,
            lookat_needs_reset: false,
            needs_cancel: false,
            in_cancel: false,
            abort_from_ai: false,
            lookat_actor: None,
            sticky_lookat_actor: None,
            anim_listener_registered: false,
            anim_query: None,
            goal_pipe: None,
            ex_pos_anim_pipe: None,
            speech_channel: None,
            facial_channel: None,
            check_player_timeout: 0.0,
            player_aware_timeout: 0.0,
            is_aware: true,
            is_aware_looking: true,
            is_aware_in_range: true,
        }
    }

    pub fn actor_id(&self) -> ActorId {
        self.actor_id
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_aborted(&self) -> bool {
        self.phase == Phase::Aborted
    }

    pub fn abort_reason(&self) -> Option<AbortReason> {
        self.abort_reason
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    /// Whether a speech trigger issued by this context is still audible.
    pub fn is_still_playing(&self) -> bool {
        self.sound_started
            && self
                .current_line
                .as_ref()
                .is_some_and(|line| line.has_audio())
    }

    fn reset_state(&mut self, link: &SessionLink) {
        self.phase = Phase::Idle;
        self.current_line = None;
        self.abort_reason = None;
        self.lookat_timeout = LOOKAT_TIMEOUT;
        self.anim_timeout = ANIM_TIMEOUT;
        self.sound_timeout = SOUND_TIMEOUT;
        self.sound_length = 0.0;
        self.has_scheduled = false;
        self.anim_scheduled = false;
        self.anim_started = false;
        self.anim_uses_signal = false;
        self.anim_uses_exact_positioning = false;
        self.sound_scheduled = false;
        self.sound_started = false;
        self.lookat_needs_reset = false;
        self.needs_cancel = false;
        self.in_cancel = false;
        self.abort_from_ai = false;
        self.lookat_actor = None;
        self.sticky_lookat_actor = None;
        self.anim_listener_registered = false;
        self.anim_query = None;
        self.goal_pipe = None;
        self.ex_pos_anim_pipe = None;
        self.facial_channel = None;
        self.check_player_timeout = 0.0;
        self.player_aware_timeout = link.player_awareness_grace_time();
        self.is_aware = true;
        self.is_aware_looking = true;
        self.is_aware_in_range = true;
    }

    /// Registers interest in the owning entity and pushes the opening
    /// behaviour signal matching the configured interruption mode.
    pub fn begin_session(&mut self, link: &SessionLink) {
        self.log(format!("dialog.session.begin {}", self.actor_id));
        self.reset_state(link);
        self.world
            .borrow_mut()
            .add_entity_listener(self.entity_id, self.context_id);
        match link.interrupt_behaviour() {
            InterruptBehaviour::Always => {
                Self::execute_ai(
                    &self.world,
                    self.entity_id,
                    self.context_id,
                    &mut self.goal_pipe,
                    "ACT_ANIM",
                    None,
                    true,
                );
            }
            InterruptBehaviour::Medium => {
                Self::execute_ai(
                    &self.world,
                    self.entity_id,
                    self.context_id,
                    &mut self.goal_pipe,
                    "ACT_DIALOG",
                    None,
                    true,
                );
            }
            InterruptBehaviour::Never => {}
        }
        self.needs_cancel = true;
    }

    /// Stops everything and releases the speech channel; the context is
    /// unusable afterwards until `begin_session` runs again.
    pub fn end_session(&mut self, link: &SessionLink) {
        self.cancel_current(link, true);
        self.stop_sound();
        if let Some(channel) = self.speech_channel.take() {
            let mut world = self.world.borrow_mut();
            world.audio_remove_finished_listener(channel, self.context_id);
            world.remove_audio_channel(channel);
        }
        self.log(format!("dialog.session.end {}", self.actor_id));
    }

    pub fn play_line(&mut self, line: Arc<LineSpec>) {
        if self.is_aborted() {
            return;
        }
        self.log(format!(
            "dialog.line.play {} {}",
            self.actor_id,
            line.subtitle.as_deref().unwrap_or("-")
        ));
        self.current_line = Some(line);
        self.phase = Phase::NewLine;
    }

    /// One frame of progress. Runs the abort checks, then spins the phase
    /// machine until a phase declines to advance; `dt` is consumed by the
    /// first waiting phase only. Returns false when the owning entity is
    /// gone and the context tore itself down.
    pub fn update(&mut self, mut dt: f32, link: &mut SessionLink) -> bool {
        if self.is_aborted() {
            return true;
        }

        if self.world.borrow().entity(self.entity_id).is_none() {
            self.log(format!("dialog.update.missing_entity {}", self.actor_id));
            self.abort_context(true, AbortReason::EntityDestroyed, link);
            return false;
        }

        if let Some(threshold) = link.alertness_interrupt().threshold() {
            let alertness = self
                .world
                .borrow()
                .entity(self.entity_id)
                .map(|entity| entity.alertness())
                .unwrap_or(0);
            if alertness >= threshold {
                self.abort_context(true, AbortReason::AiInterrupt, link);
                return true;
            }
        }

        if !link.actor_policy(self.actor_id).no_abort_on_death {
            let dead = self
                .world
                .borrow()
                .entity(self.entity_id)
                .is_some_and(|entity| entity.is_dead());
            if dead {
                self.abort_context(true, AbortReason::ActorDead, link);
                return true;
            }
        }

        if self.is_local_player && !self.do_local_player_checks(dt, link) {
            let reason = if !self.is_aware_in_range {
                AbortReason::PlayerOutOfRange
            } else {
                AbortReason::PlayerOutOfView
            };
            self.abort_context(true, reason, link);
            return true;
        }

        if self.abort_from_ai {
            self.abort_from_ai = false;
            self.abort_context(true, AbortReason::AiInterrupt, link);
            return true;
        }

        if link.allows_look_at() {
            self.do_sticky_look_at(link);
        }

        let mut advances = 0usize;
        loop {
            let advance = match self.phase {
                Phase::Idle | Phase::Aborted => false,
                _ => {
                    let Some(line) = self.current_line.clone() else {
                        break;
                    };
                    match self.phase {
                        Phase::NewLine => self.phase_new_line(&line, link),
                        Phase::LookAt => self.phase_look_at(&line, dt, link),
                        Phase::Anim => self.phase_anim(&line, dt, link),
                        Phase::ScheduleSoundPlay => self.phase_schedule_sound(&line, dt, link),
                        Phase::SoundFacial => self.phase_sound_facial(&line),
                        Phase::EndLine => self.phase_end_line(&line, link),
                        Phase::Idle | Phase::Aborted => false,
                    }
                }
            };
            if !advance {
                break;
            }
            self.advance_phase();
            dt = 0.0;
            advances += 1;
            if advances > PHASE_ADVANCE_LIMIT {
                self.log(format!("dialog.update.loop_guard {}", self.actor_id));
                break;
            }
        }

        if self.is_still_playing() {
            self.update_speech_channel_position();
        }

        true
    }

    // --- phase handlers -------------------------------------------------

    fn phase_new_line(&mut self, line: &LineSpec, link: &mut SessionLink) -> bool {
        self.has_scheduled = false;
        self.lookat_timeout = LOOKAT_TIMEOUT;
        self.anim_timeout = ANIM_TIMEOUT;
        self.sound_timeout = SOUND_TIMEOUT;
        self.sound_length = 0.0;
        self.anim_scheduled = false;
        self.anim_started = false;
        self.sound_scheduled = false;
        self.sound_started = false;

        if line.reset_look_at {
            self.lookat_actor = None;
            self.sticky_lookat_actor = None;
        } else if let Some(target) = line.look_at {
            if line.look_at_sticky {
                self.sticky_lookat_actor = Some(target);
                self.lookat_actor = None;
            } else {
                self.lookat_actor = Some(target);
                self.sticky_lookat_actor = None;
            }
        }
        if link.allows_look_at() {
            self.do_sticky_look_at(link);
        }
        true
    }

    fn phase_look_at(&mut self, line: &LineSpec, dt: f32, link: &SessionLink) -> bool {
        if !link.allows_look_at() {
            return true;
        }
        // exact positioning turns the body itself; gaze would fight it
        if line.anim_exact_positioning {
            return true;
        }
        !self.tick_one_shot_look_at(dt, link)
    }

    fn phase_anim(&mut self, line: &LineSpec, dt: f32, link: &SessionLink) -> bool {
        let mut advance = true;
        if link.allows_look_at() && self.tick_one_shot_look_at(dt, link) {
            advance = false;
        }

        if link.allows_anim() && line.has_anim() {
            if !self.anim_scheduled {
                self.anim_started = false;
                self.anim_scheduled = true;
                advance = false;
                let entity_alive = self.world.borrow().entity(self.entity_id).is_some();
                if entity_alive {
                    self.do_anim_action(line, link);
                } else {
                    advance = true;
                }
            } else {
                self.anim_timeout -= dt;
                let timed_out = self.anim_timeout <= 0.0;
                advance = timed_out || self.anim_started;
                if advance {
                    self.log(format!(
                        "dialog.anim.{} {}",
                        if self.anim_started { "started" } else { "timeout" },
                        self.actor_id
                    ));
                }
            }
        }
        advance
    }

    fn phase_schedule_sound(&mut self, line: &LineSpec, dt: f32, link: &mut SessionLink) -> bool {
        if !line.has_audio() {
            return true;
        }
        let cue = line.audio.as_deref().unwrap_or_default();

        if !self.sound_scheduled {
            if self.world.borrow().entity(self.entity_id).is_none() {
                return true;
            }
            let channel = self.ensure_speech_channel();
            self.update_speech_channel_position();
            let started = self.world.borrow_mut().execute_audio_trigger(channel, cue);
            self.sound_scheduled = true;
            if started {
                self.sound_started = true;
                // playback hands over to the next line when it finishes
                self.has_scheduled = true;
                self.log(format!("dialog.audio.start {} {}", self.actor_id, cue));
            } else {
                self.sound_started = false;
                // retry pacing instead of the line delay
                self.has_scheduled = true;
                link.schedule_next_line(AUDIO_REJECTED_RESCHEDULE);
            }
            true
        } else {
            self.sound_timeout -= dt;
            let timed_out = self.sound_timeout <= 0.0;
            let advance = timed_out || self.sound_started;
            if advance && timed_out && !self.sound_started {
                self.log(format!("dialog.audio.timeout {}", self.actor_id));
                self.stop_sound();
            }
            advance
        }
    }

    fn phase_sound_facial(&mut self, line: &LineSpec) -> bool {
        if line.has_facial() && self.world.borrow().entity(self.entity_id).is_some() {
            let (expression, weight, fade_time) = match line.facial.as_ref() {
                Some(spec) => (spec.expression.as_str(), spec.weight, spec.fade_time),
                None => ("", 1.0, 0.0),
            };
            self.do_facial_expression(expression, weight, fade_time);
        }
        true
    }

    fn phase_end_line(&mut self, line: &LineSpec, link: &mut SessionLink) -> bool {
        if !self.has_scheduled {
            self.has_scheduled = true;
            link.schedule_next_line(line.delay);
            self.log(format!(
                "dialog.line.end {} delay={}",
                self.actor_id, line.delay
            ));
        }
        true
    }

    fn advance_phase(&mut self) {
        self.phase = self.phase.next();
        self.log(format!(
            "dialog.phase {} {}",
            self.actor_id,
            self.phase.label()
        ));
    }

    // --- gaze -----------------------------------------------------------

    /// Drives the one-shot gaze toward its target; true while still turning.
    fn tick_one_shot_look_at(&mut self, dt: f32, link: &SessionLink) -> bool {
        let Some(target) = self.lookat_actor else {
            return false;
        };
        if self.world.borrow().entity(self.entity_id).is_none() {
            return false;
        }
        self.lookat_timeout -= dt;
        let reached = self.do_look_at(target, link);
        if reached || self.lookat_timeout <= 0.0 {
            self.log(format!(
                "dialog.look.{} {} -> {}",
                if reached { "reached" } else { "timeout" },
                self.actor_id,
                target
            ));
            self.lookat_actor = None;
            false
        } else {
            true
        }
    }

    fn do_sticky_look_at(&mut self, link: &SessionLink) {
        if let Some(target) = self.sticky_lookat_actor {
            if self.world.borrow().entity(self.entity_id).is_some() {
                self.do_look_at(target, link);
            }
        }
    }

    /// Points the agent's gaze at the target actor; returns whether the
    /// agent already faces it.
    fn do_look_at(&mut self, target: ActorId, link: &SessionLink) -> bool {
        let target_pos = link
            .actor_entity(target)
            .and_then(|entity| self.world.borrow().entity(entity).map(|e| e.position()));
        let Some(target_pos) = target_pos else {
            // target gone; nothing left to face
            self.world.borrow_mut().reset_look_at(self.entity_id);
            self.lookat_needs_reset = false;
            return true;
        };
        match self
            .world
            .borrow_mut()
            .set_look_at_point(self.entity_id, target_pos)
        {
            Some(reached) => {
                self.lookat_needs_reset = true;
                reached
            }
            None => false,
        }
    }

    // --- animation ------------------------------------------------------

    fn do_anim_action(&mut self, line: &LineSpec, link: &SessionLink) {
        self.anim_uses_signal = line.anim_is_signal;
        self.anim_uses_exact_positioning = line.anim_exact_positioning;
        let Some(name) = line.anim.as_deref() else {
            return;
        };
        if line.anim_exact_positioning {
            self.do_anim_action_ep(name, line, link);
        } else {
            self.do_anim_action_graph(name);
        }
    }

    /// Graph path: register as the graph listener and push the input; the
    /// graph acknowledges asynchronously through the query id.
    fn do_anim_action_graph(&mut self, name: &str) {
        let mut world = self.world.borrow_mut();
        if world.anim_add_listener(self.entity_id, self.context_id) {
            self.anim_listener_registered = true;
            let input = if self.anim_uses_signal {
                "Signal"
            } else {
                "Action"
            };
            self.anim_query = world.anim_set_input(self.entity_id, input, name);
        }
        // no graph installed: the anim timeout advances the phase
    }

    /// Exact-positioning path: park the agent's reference point at its feet
    /// facing the gaze target and ride the animation on an ACT_ANIMEX pipe.
    fn do_anim_action_ep(&mut self, name: &str, line: &LineSpec, link: &SessionLink) {
        {
            let mut world = self.world.borrow_mut();
            if !world.is_pipe_user(self.entity_id) {
                return;
            }
            let Some(entity) = world.entity(self.entity_id) else {
                return;
            };
            let position = entity.position();
            let move_dir = world
                .ai_move_dir(self.entity_id)
                .unwrap_or(Vec3::new(0.0, 1.0, 0.0));
            let mut direction = move_dir;
            if let Some(target_pos) = line
                .look_at
                .and_then(|actor| link.actor_entity(actor))
                .and_then(|entity| world.entity(entity).map(|e| e.position()))
            {
                direction = target_pos.sub(position).flattened().normalized_or(move_dir);
            }
            world.set_ref_point(self.entity_id, position, direction);
        }
        let data = SignalData {
            pipe: None,
            anim: Some(name.to_string()),
            anim_is_signal: self.anim_uses_signal,
            start_radius: EP_START_RADIUS,
            direction_tolerance_deg: EP_DIR_TOLERANCE_DEG,
            target_radius: EP_TARGET_RADIUS,
        };
        Self::execute_ai(
            &self.world,
            self.entity_id,
            self.context_id,
            &mut self.ex_pos_anim_pipe,
            "ACT_ANIMEX",
            Some(data),
            true,
        );
    }

    // --- audio ----------------------------------------------------------

    fn ensure_speech_channel(&mut self) -> ChannelId {
        if let Some(channel) = self.speech_channel {
            return channel;
        }
        let mut world = self.world.borrow_mut();
        let channel = world.create_audio_channel(self.entity_id);
        world.audio_add_finished_listener(channel, self.context_id);
        drop(world);
        self.speech_channel = Some(channel);
        channel
    }

    /// Keeps the speech channel glued to the speaker's mouth while the cue
    /// plays; falls back to a fixed head height without attachment data.
    fn update_speech_channel_position(&mut self) {
        let Some(channel) = self.speech_channel else {
            return;
        };
        let position = self
            .world
            .borrow()
            .entity(self.entity_id)
            .map(|entity| entity.mouth_position());
        if let Some(position) = position {
            self.world
                .borrow_mut()
                .set_audio_channel_position(channel, position);
        }
    }

    fn stop_sound(&mut self) {
        if !self.is_still_playing() {
            return;
        }
        if let Some(channel) = self.speech_channel {
            self.world.borrow_mut().stop_audio_trigger(channel);
        }
        self.sound_started = false;
    }

    // --- facial ---------------------------------------------------------

    /// Replaces the active facial channel; an empty expression fades back to
    /// neutral. Unknown expressions leave the current one untouched.
    fn do_facial_expression(&mut self, expression: &str, weight: f32, fade_time: f32) -> bool {
        if !expression.is_empty() && !self.world.borrow().knows_facial_expression(expression) {
            self.log(format!(
                "dialog.facial.unknown {} {}",
                self.actor_id, expression
            ));
            return false;
        }
        if let Some(channel) = self.facial_channel.take() {
            self.world
                .borrow_mut()
                .stop_facial_channel(self.entity_id, channel, fade_time);
        }
        if !expression.is_empty() {
            self.facial_channel = self.world.borrow_mut().start_facial_channel(
                self.entity_id,
                expression,
                weight,
                fade_time,
            );
        }
        true
    }

    // --- AI plumbing ----------------------------------------------------

    /// Sends a behaviour signal riding a fresh goal pipe. The slot keeps the
    /// pipe handle only while this context listens on it; players accept the
    /// call but run no pipes.
    fn execute_ai(
        world: &Rc<RefCell<World>>,
        entity_id: EntityId,
        context_id: ContextId,
        pipe_slot: &mut Option<PipeId>,
        signal: &str,
        data: Option<SignalData>,
        register_listener: bool,
    ) -> bool {
        let mut world = world.borrow_mut();
        if world.entity(entity_id).is_none() {
            return false;
        }
        let Some(kind) = world.agent_kind(entity_id) else {
            return false;
        };
        if kind == AgentKind::Player {
            *pipe_slot = None;
            return true;
        }
        if let Some(old) = pipe_slot.take() {
            world.remove_sub_pipe(entity_id, old);
            world.unregister_goal_pipe_listener(entity_id, old, context_id);
        }
        let pipe = world.alloc_goal_pipe();
        let mut data = data.unwrap_or_default();
        data.pipe = Some(pipe);
        if register_listener {
            world.register_goal_pipe_listener(entity_id, pipe, context_id);
            *pipe_slot = Some(pipe);
        }
        world.send_ai_signal(entity_id, SIGNAL_PRIORITY, signal, data);
        true
    }

    // --- awareness ------------------------------------------------------

    /// Local-player attention: samples on a fixed cadence, and tolerates
    /// inattention for the configured grace time before reporting failure.
    fn do_local_player_checks(&mut self, dt: f32, link: &SessionLink) -> bool {
        self.check_player_timeout -= dt;
        if self.check_player_timeout <= 0.0 {
            self.check_player_timeout = PLAYER_CHECK_INTERVAL;
            let world = self.world.borrow();
            let sample =
                crate::awareness::assess_local_player(&world, link, self.actor_id, self.entity_id);
            self.is_aware = sample.aware;
            self.is_aware_looking = sample.looking;
            self.is_aware_in_range = sample.in_range;
        }
        if self.is_aware {
            self.player_aware_timeout = link.player_awareness_grace_time();
        } else {
            self.player_aware_timeout -= dt;
            if self.player_aware_timeout <= 0.0 {
                return false;
            }
        }
        true
    }

    // --- cancellation and abort ----------------------------------------

    /// Releases everything the current line holds: the animation graph
    /// listener (resetting the graph input unless the signaled animation
    /// already fired), goal pipes, gaze, facial channel, speech audio per
    /// policy, and the entity listener. Idempotent.
    pub fn cancel_current(&mut self, link: &SessionLink, reset_states: bool) {
        if !self.needs_cancel {
            return;
        }
        debug_assert!(!self.in_cancel);
        if self.in_cancel {
            return;
        }
        self.in_cancel = true;

        if self.anim_listener_registered {
            let mut world = self.world.borrow_mut();
            world.anim_remove_listener(self.entity_id, self.context_id);
            if reset_states {
                if self.anim_uses_signal {
                    if !self.anim_started {
                        world.anim_set_input(self.entity_id, "Signal", "none");
                    }
                } else {
                    world.anim_set_input(self.entity_id, "Action", "idle");
                }
            }
            self.anim_listener_registered = false;
        }
        self.anim_query = None;
        self.anim_started = false;

        let entity_alive = self.world.borrow().entity(self.entity_id).is_some();
        if entity_alive {
            if self.lookat_needs_reset {
                self.world.borrow_mut().reset_look_at(self.entity_id);
                self.lookat_needs_reset = false;
            }
            let pipe_user = self.world.borrow().is_pipe_user(self.entity_id);
            if pipe_user {
                if let Some(pipe) = self.goal_pipe.take() {
                    if link.interrupt_behaviour() == InterruptBehaviour::Medium {
                        let mut throwaway = None;
                        Self::execute_ai(
                            &self.world,
                            self.entity_id,
                            self.context_id,
                            &mut throwaway,
                            "ACT_DIALOG_OVER",
                            None,
                            false,
                        );
                    }
                    let mut world = self.world.borrow_mut();
                    world.unregister_goal_pipe_listener(self.entity_id, pipe, self.context_id);
                    world.remove_sub_pipe(self.entity_id, pipe);
                }
                if let Some(pipe) = self.ex_pos_anim_pipe.take() {
                    let mut world = self.world.borrow_mut();
                    world.unregister_goal_pipe_listener(self.entity_id, pipe, self.context_id);
                    world.cancel_sub_pipe(self.entity_id, pipe);
                    world.remove_sub_pipe(self.entity_id, pipe);
                }
            }
            self.do_facial_expression("", 1.0, 0.0);
        }

        let policy = link.actor_policy(self.actor_id);
        let keep_sound = policy.no_abort_sound
            && !matches!(
                self.abort_reason,
                Some(AbortReason::ActorDead) | Some(AbortReason::EntityDestroyed)
            );
        if !keep_sound {
            self.stop_sound();
        }

        self.world
            .borrow_mut()
            .remove_entity_listener(self.entity_id, self.context_id);

        self.phase = Phase::Idle;
        self.in_cancel = false;
        self.needs_cancel = false;
    }

    /// Terminal for this context: records the reason, optionally cancels,
    /// and re-asserts the aborted phase after the cancel path rewrote it.
    /// A second call is a no-op; the first reason sticks.
    pub fn abort_context(&mut self, cancel: bool, reason: AbortReason, link: &SessionLink) {
        if self.is_aborted() {
            return;
        }
        self.log(format!(
            "dialog.abort {} reason={}",
            self.actor_id,
            reason.label()
        ));
        self.phase = Phase::Aborted;
        self.abort_reason = Some(reason);
        if cancel {
            self.cancel_current(link, true);
        }
        self.phase = Phase::Aborted;
        self.abort_reason = Some(reason);
    }

    // --- subsystem callback sinks --------------------------------------

    /// Animation graph acknowledged a query. The first completion marks the
    /// animation as started and chains the follow-up query that reports the
    /// animation's end; that one releases the graph listener.
    pub fn on_anim_query_complete(&mut self, query: QueryId, succeeded: bool) {
        if self.anim_query != Some(query) {
            return;
        }
        if !succeeded && !(self.anim_started && !self.anim_uses_signal) {
            return;
        }
        if !self.anim_started {
            self.anim_started = true;
            let mut world = self.world.borrow_mut();
            self.anim_query = if self.anim_uses_signal {
                world.anim_query_leave_state(self.entity_id)
            } else {
                world.anim_query_change_input(self.entity_id, "Action")
            };
        } else if self.anim_listener_registered {
            self.world
                .borrow_mut()
                .anim_remove_listener(self.entity_id, self.context_id);
            self.anim_listener_registered = false;
            self.anim_query = None;
            self.anim_started = false;
        }
    }

    /// The graph disappeared under the listener; drop the handles, the anim
    /// timeout advances the phase.
    pub fn on_anim_graph_destroyed(&mut self) {
        self.anim_listener_registered = false;
        self.anim_query = None;
        self.anim_started = false;
    }

    pub fn on_goal_pipe_event(&mut self, pipe: PipeId, event: GoalPipeEvent, link: &SessionLink) {
        if Some(pipe) != self.goal_pipe && Some(pipe) != self.ex_pos_anim_pipe {
            return;
        }
        self.log(format!(
            "dialog.pipe.event {} {} {}",
            self.actor_id,
            pipe,
            event.label()
        ));
        match event {
            GoalPipeEvent::Deselected | GoalPipeEvent::Removed => {
                // behaviour took the pipe back; abort on the next update
                if Some(pipe) == self.goal_pipe
                    && !link.actor_policy(self.actor_id).no_ai_abort
                {
                    self.abort_from_ai = true;
                }
            }
            GoalPipeEvent::AnimStarted => {
                self.anim_started = true;
            }
            GoalPipeEvent::Finished
            | GoalPipeEvent::Suspended
            | GoalPipeEvent::Resumed
            | GoalPipeEvent::RefPointMoved => {}
        }
    }

    pub fn on_entity_event(&mut self, event: EntityEvent, link: &SessionLink) {
        match event {
            EntityEvent::Destroyed | EntityEvent::Reset => {
                self.abort_context(true, AbortReason::EntityDestroyed, link);
            }
            EntityEvent::AiDone => {}
        }
    }

    /// Speech trigger finished; the session schedules the follow-up line.
    pub fn on_audio_trigger_finished(&mut self) {
        self.sound_started = false;
        self.log(format!("dialog.audio.finished {}", self.actor_id));
    }

    fn log(&self, message: String) {
        self.world.borrow_mut().log_event(message);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::session::{AlertnessInterrupt, SessionConfig};
    use crate::world::entity::EntitySpec;

    const SPEAKER: ActorId = ActorId(0);
    const LISTENER: ActorId = ActorId(1);

    struct Fixture {
        world: Rc<RefCell<World>>,
        link: SessionLink,
        context: ActorContext,
        speaker: EntityId,
        #[allow(dead_code)]
        listener: EntityId,
    }

    fn fixture_with(config: SessionConfig, local_player: bool) -> Fixture {
        let world = World::shared();
        let (speaker, listener) = {
            let mut w = world.borrow_mut();
            let speaker = w.spawn_entity(
                EntitySpec::named("speaker")
                    .at(Vec3::ZERO)
                    .facing(Vec3::new(1.0, 0.0, 0.0)),
            );
            let listener =
                w.spawn_entity(EntitySpec::named("listener").at(Vec3::new(2.0, 0.0, 0.0)));
            w.register_agent(speaker, AgentKind::Actor);
            w.register_agent(listener, AgentKind::Actor);
            w.install_animation_graph(speaker);
            w.register_facial_expression("smile");
            (speaker, listener)
        };
        let mut cast = BTreeMap::new();
        cast.insert(SPEAKER, speaker);
        cast.insert(LISTENER, listener);
        let link = SessionLink::new(cast, config);
        let mut context =
            ActorContext::new(Rc::clone(&world), ContextId(1), SPEAKER, speaker, local_player);
        context.begin_session(&link);
        Fixture {
            world,
            link,
            context,
            speaker,
            listener,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(SessionConfig::default(), false)
    }

    fn line(build: impl FnOnce(&mut LineSpec)) -> Arc<LineSpec> {
        let mut line = LineSpec::new(SPEAKER);
        build(&mut line);
        Arc::new(line)
    }

    #[test]
    fn bare_line_collapses_to_idle_in_one_update() {
        let mut f = fixture();
        f.context.play_line(line(|l| l.delay = 0.5));
        assert!(f.context.update(0.016, &mut f.link));
        assert_eq!(f.context.phase(), Phase::Idle);
        assert_eq!(f.link.take_schedule_request(), Some(0.5));
        assert!(!f
            .world
            .borrow()
            .events()
            .iter()
            .any(|e| e.starts_with("dialog.update.loop_guard")));
    }

    #[test]
    fn look_at_waits_for_gaze_then_advances() {
        let mut f = fixture();
        f.context.play_line(line(|l| l.look_at = Some(LISTENER)));
        f.context.update(0.016, &mut f.link);
        assert_eq!(f.context.phase(), Phase::LookAt);
        assert!(f.world.borrow().gaze_target(f.speaker).is_some());

        f.world.borrow_mut().set_gaze_reached(f.speaker, true);
        f.context.update(0.016, &mut f.link);
        assert_eq!(f.context.phase(), Phase::Idle);
    }

    #[test]
    fn look_at_gives_up_after_its_timeout() {
        let mut f = fixture();
        f.context.play_line(line(|l| l.look_at = Some(LISTENER)));
        f.context.update(0.016, &mut f.link);
        assert_eq!(f.context.phase(), Phase::LookAt);
        f.context.update(0.6, &mut f.link);
        assert_eq!(f.context.phase(), Phase::LookAt);
        f.context.update(0.6, &mut f.link);
        assert_eq!(f.context.phase(), Phase::Idle);
        assert!(f
            .world
            .borrow()
            .events()
            .iter()
            .any(|e| e.starts_with("dialog.look.timeout")));
    }

    #[test]
    fn signaled_animation_runs_through_both_queries() {
        let mut f = fixture();
        f.context.play_line(line(|l| {
            l.anim = Some("wave".to_string());
            l.anim_is_signal = true;
            l.delay = 1.0;
        }));
        f.context.update(0.016, &mut f.link);
        assert_eq!(f.context.phase(), Phase::Anim);
        assert_eq!(
            f.world.borrow().anim_current_input(f.speaker),
            Some(("Signal", "wave"))
        );
        let start_query = f.context.anim_query.expect("input query pending");

        f.context.on_anim_query_complete(start_query, true);
        assert!(f.context.anim_started);
        let leave_query = f.context.anim_query.expect("leave-state query pending");
        assert_ne!(leave_query, start_query);

        f.context.update(0.016, &mut f.link);
        assert_eq!(f.context.phase(), Phase::Idle);
        // line delay requested once, even across further updates
        assert_eq!(f.link.take_schedule_request(), Some(1.0));
        f.context.update(0.016, &mut f.link);
        assert_eq!(f.link.take_schedule_request(), None);

        f.context.on_anim_query_complete(leave_query, true);
        assert_eq!(f.world.borrow().anim_listener(f.speaker), None);
        assert!(!f.context.anim_started);
    }

    #[test]
    fn unacknowledged_animation_advances_on_timeout() {
        let mut f = fixture();
        f.context
            .play_line(line(|l| l.anim = Some("wave".to_string())));
        f.context.update(0.016, &mut f.link);
        assert_eq!(f.context.phase(), Phase::Anim);
        f.context.update(0.6, &mut f.link);
        f.context.update(0.6, &mut f.link);
        assert_eq!(f.context.phase(), Phase::Idle);
        assert!(f
            .world
            .borrow()
            .events()
            .iter()
            .any(|e| e.starts_with("dialog.anim.timeout")));
    }

    #[test]
    fn speech_line_plays_and_waits_for_the_finished_callback() {
        let mut f = fixture();
        f.context.play_line(line(|l| {
            l.audio = Some("intro_01".to_string());
            l.delay = 3.0;
        }));
        f.context.update(0.016, &mut f.link);
        assert_eq!(f.context.phase(), Phase::Idle);
        assert!(f.context.is_still_playing());

        let channel = f.context.speech_channel.expect("channel created");
        assert_eq!(f.world.borrow().audio_active_cue(channel), Some("intro_01"));
        // next line comes from the finished callback, not the line delay
        assert_eq!(f.link.take_schedule_request(), None);

        f.context.on_audio_trigger_finished();
        assert!(!f.context.is_still_playing());
    }

    #[test]
    fn rejected_cue_schedules_the_retry_delay() {
        let mut f = fixture();
        f.world.borrow_mut().reject_audio_cue("broken");
        f.context
            .play_line(line(|l| l.audio = Some("broken".to_string())));
        f.context.update(0.016, &mut f.link);
        assert_eq!(f.context.phase(), Phase::Idle);
        assert!(!f.context.is_still_playing());
        assert_eq!(f.link.take_schedule_request(), Some(AUDIO_REJECTED_RESCHEDULE));
    }

    #[test]
    fn stalled_sound_advances_on_timeout() {
        let mut f = fixture();
        f.context.current_line = Some(line(|l| l.audio = Some("cue".to_string())));
        f.context.phase = Phase::ScheduleSoundPlay;
        f.context.sound_scheduled = true;
        f.context.update(1.5, &mut f.link);
        assert_eq!(f.context.phase(), Phase::Idle);
        assert!(f
            .world
            .borrow()
            .events()
            .iter()
            .any(|e| e.starts_with("dialog.audio.timeout")));
    }

    #[test]
    fn facial_expression_starts_and_cancel_fades_it_out() {
        let mut f = fixture();
        f.context.play_line(line(|l| {
            l.facial = Some(dialog_script::FacialSpec {
                expression: "smile".to_string(),
                weight: 0.8,
                fade_time: 0.1,
            });
        }));
        f.context.update(0.016, &mut f.link);
        assert_eq!(
            f.world.borrow().facial_active_expression(f.speaker),
            Some("smile")
        );
        f.context.cancel_current(&f.link, true);
        assert_eq!(f.world.borrow().facial_active_expression(f.speaker), None);
    }

    #[test]
    fn unknown_expression_keeps_the_previous_one() {
        let mut f = fixture();
        f.context.play_line(line(|l| {
            l.facial = Some(dialog_script::FacialSpec {
                expression: "smile".to_string(),
                weight: 1.0,
                fade_time: 0.0,
            });
        }));
        f.context.update(0.016, &mut f.link);
        f.context.play_line(line(|l| {
            l.facial = Some(dialog_script::FacialSpec {
                expression: "unheard_of".to_string(),
                weight: 1.0,
                fade_time: 0.0,
            });
        }));
        f.context.update(0.016, &mut f.link);
        assert_eq!(
            f.world.borrow().facial_active_expression(f.speaker),
            Some("smile")
        );
    }

    #[test]
    fn phases_advance_in_order_without_skips_or_regressions() {
        let mut f = fixture();
        f.context.play_line(line(|l| {
            l.look_at = Some(LISTENER);
            l.anim = Some("wave".to_string());
            l.anim_is_signal = true;
            l.audio = Some("cue_03".to_string());
            l.facial = Some(dialog_script::FacialSpec {
                expression: "smile".to_string(),
                weight: 1.0,
                fade_time: 0.1,
            });
        }));
        f.context.update(0.016, &mut f.link);
        assert_eq!(f.context.phase(), Phase::LookAt);

        f.world.borrow_mut().set_gaze_reached(f.speaker, true);
        f.context.update(0.016, &mut f.link);
        assert_eq!(f.context.phase(), Phase::Anim);

        let query = f.context.anim_query.expect("input query pending");
        f.context.on_anim_query_complete(query, true);
        f.context.update(0.016, &mut f.link);
        assert_eq!(f.context.phase(), Phase::Idle);

        let w = f.world.borrow();
        let labels: Vec<&str> = w
            .events()
            .iter()
            .filter_map(|e| e.strip_prefix("dialog.phase actor0 "))
            .collect();
        assert_eq!(
            labels,
            [
                "look_at",
                "anim",
                "schedule_sound_play",
                "sound_facial",
                "end_line",
                "idle",
            ]
        );
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut f = fixture();
        f.context.play_line(line(|l| l.look_at = Some(LISTENER)));
        f.context.update(0.016, &mut f.link);
        f.context.cancel_current(&f.link, true);
        assert_eq!(f.world.borrow().entity_listener_count(f.speaker), 0);
        assert_eq!(f.world.borrow().gaze_target(f.speaker), None);
        let events_after_first = f.world.borrow().events().len();
        f.context.cancel_current(&f.link, true);
        assert_eq!(f.world.borrow().events().len(), events_after_first);
    }

    #[test]
    fn second_abort_changes_neither_state_nor_journal() {
        let mut f = fixture();
        f.context.play_line(line(|l| l.look_at = Some(LISTENER)));
        f.context.update(0.016, &mut f.link);
        f.context
            .abort_context(true, AbortReason::AiInterrupt, &f.link);
        assert_eq!(f.context.phase(), Phase::Aborted);
        let events_after_first = f.world.borrow().events().len();

        f.context
            .abort_context(true, AbortReason::ActorDead, &f.link);
        assert_eq!(f.context.phase(), Phase::Aborted);
        assert_eq!(f.context.abort_reason(), Some(AbortReason::AiInterrupt));
        assert_eq!(f.world.borrow().events().len(), events_after_first);
    }

    #[test]
    fn aborted_context_refuses_new_lines() {
        let mut f = fixture();
        f.context
            .abort_context(true, AbortReason::AiInterrupt, &f.link);
        f.context.play_line(line(|_| {}));
        assert_eq!(f.context.phase(), Phase::Aborted);
        assert!(f.context.current_line.is_none());
    }

    #[test]
    fn keep_sound_policy_leaves_the_cue_running_on_abort() {
        let mut config = SessionConfig::default();
        config.policies.insert(
            SPEAKER,
            crate::session::ActorPolicy {
                no_abort_sound: true,
                ..Default::default()
            },
        );
        let mut f = fixture_with(config, false);
        f.context
            .play_line(line(|l| l.audio = Some("cue_keep".to_string())));
        f.context.update(0.016, &mut f.link);
        let channel = f.context.speech_channel.expect("channel created");

        f.context
            .abort_context(true, AbortReason::AiInterrupt, &f.link);
        assert_eq!(f.context.phase(), Phase::Aborted);
        assert_eq!(f.context.abort_reason(), Some(AbortReason::AiInterrupt));
        assert_eq!(f.world.borrow().audio_active_cue(channel), Some("cue_keep"));
    }

    #[test]
    fn actor_death_overrides_the_keep_sound_policy() {
        let mut config = SessionConfig::default();
        config.policies.insert(
            SPEAKER,
            crate::session::ActorPolicy {
                no_abort_sound: true,
                ..Default::default()
            },
        );
        let mut f = fixture_with(config, false);
        f.context
            .play_line(line(|l| l.audio = Some("cue_cut".to_string())));
        f.context.update(0.016, &mut f.link);
        let channel = f.context.speech_channel.expect("channel created");

        f.context
            .abort_context(true, AbortReason::ActorDead, &f.link);
        assert_eq!(f.world.borrow().audio_active_cue(channel), None);
    }

    #[test]
    fn dead_speaker_aborts_unless_the_policy_allows_it() {
        let mut f = fixture();
        f.world.borrow_mut().set_entity_dead(f.speaker, true);
        f.context.play_line(line(|_| {}));
        f.context.update(0.016, &mut f.link);
        assert_eq!(f.context.abort_reason(), Some(AbortReason::ActorDead));

        let mut config = SessionConfig::default();
        config.policies.insert(
            SPEAKER,
            crate::session::ActorPolicy {
                no_abort_on_death: true,
                ..Default::default()
            },
        );
        let mut f = fixture_with(config, false);
        f.world.borrow_mut().set_entity_dead(f.speaker, true);
        f.context.play_line(line(|_| {}));
        f.context.update(0.016, &mut f.link);
        assert_eq!(f.context.abort_reason(), None);
        assert_eq!(f.context.phase(), Phase::Idle);
    }

    #[test]
    fn missing_entity_tears_the_context_down() {
        let mut f = fixture();
        f.context.play_line(line(|_| {}));
        f.world.borrow_mut().despawn_entity(f.speaker);
        assert!(!f.context.update(0.016, &mut f.link));
        assert_eq!(
            f.context.abort_reason(),
            Some(AbortReason::EntityDestroyed)
        );
        assert!(!f.context.update(0.016, &mut f.link) || f.context.is_aborted());
    }

    #[test]
    fn exact_positioning_rides_an_animex_pipe() {
        let mut f = fixture();
        f.context.play_line(line(|l| {
            l.anim = Some("sit_throne".to_string());
            l.anim_exact_positioning = true;
            l.look_at = Some(LISTENER);
        }));
        f.context.update(0.016, &mut f.link);
        assert_eq!(f.context.phase(), Phase::Anim);
        let pipe = f.context.ex_pos_anim_pipe.expect("pipe registered");
        assert!(f
            .world
            .borrow()
            .ai_signals(f.speaker)
            .iter()
            .any(|(priority, text)| *priority == SIGNAL_PRIORITY && text == "ACT_ANIMEX"));

        f.context
            .on_goal_pipe_event(pipe, GoalPipeEvent::AnimStarted, &f.link);
        f.context.update(0.016, &mut f.link);
        assert_eq!(f.context.phase(), Phase::Idle);
    }

    #[test]
    fn losing_the_goal_pipe_aborts_via_the_ai() {
        let mut config = SessionConfig::default();
        config.interrupt_behaviour = InterruptBehaviour::Medium;
        let mut f = fixture_with(config, false);
        let pipe = f.context.goal_pipe.expect("dialog pipe registered");
        assert!(f
            .world
            .borrow()
            .ai_signals(f.speaker)
            .iter()
            .any(|(_, text)| text == "ACT_DIALOG"));

        f.context.play_line(line(|_| {}));
        f.context
            .on_goal_pipe_event(pipe, GoalPipeEvent::Removed, &f.link);
        f.context.update(0.016, &mut f.link);
        assert_eq!(f.context.abort_reason(), Some(AbortReason::AiInterrupt));
        assert_eq!(f.context.goal_pipe, None);
        // the cancel path told the behaviour the conversation is over
        assert!(f
            .world
            .borrow()
            .ai_signals(f.speaker)
            .iter()
            .any(|(_, text)| text == "ACT_DIALOG_OVER"));
    }

    #[test]
    fn sticky_look_at_survives_lines_until_reset() {
        let mut f = fixture();
        f.context.play_line(line(|l| {
            l.look_at = Some(LISTENER);
            l.look_at_sticky = true;
        }));
        f.context.update(0.016, &mut f.link);
        assert_eq!(f.context.phase(), Phase::Idle);
        assert_eq!(f.context.sticky_lookat_actor, Some(LISTENER));
        assert!(f.world.borrow().gaze_target(f.speaker).is_some());

        f.context.play_line(line(|l| l.reset_look_at = true));
        f.context.update(0.016, &mut f.link);
        assert_eq!(f.context.sticky_lookat_actor, None);
    }

    #[test]
    fn alertness_above_threshold_interrupts() {
        let mut config = SessionConfig::default();
        config.alertness_interrupt = AlertnessInterrupt::Combat;
        let mut f = fixture_with(config, false);
        f.context.play_line(line(|_| {}));
        f.world.borrow_mut().set_entity_alertness(f.speaker, 1);
        f.context.update(0.016, &mut f.link);
        assert_eq!(f.context.abort_reason(), None);

        f.world.borrow_mut().set_entity_alertness(f.speaker, 2);
        f.context.update(0.016, &mut f.link);
        assert_eq!(f.context.abort_reason(), Some(AbortReason::AiInterrupt));
    }

    #[test]
    fn inattentive_player_aborts_after_the_grace_time() {
        let mut config = SessionConfig::default();
        config.awareness_distance = 5.0;
        config.awareness_grace_time = 0.5;
        let mut f = fixture_with(config, true);
        f.world
            .borrow_mut()
            .set_entity_position(f.listener, Vec3::new(50.0, 0.0, 0.0));
        f.context.play_line(line(|_| {}));

        f.context.update(0.3, &mut f.link);
        assert_eq!(f.context.abort_reason(), None);
        f.context.update(0.3, &mut f.link);
        assert_eq!(
            f.context.abort_reason(),
            Some(AbortReason::PlayerOutOfRange)
        );
    }

    #[test]
    fn reattentive_player_resets_the_grace_timer() {
        let mut config = SessionConfig::default();
        config.awareness_distance = 5.0;
        config.awareness_grace_time = 0.5;
        let mut f = fixture_with(config, true);
        f.world
            .borrow_mut()
            .set_entity_position(f.listener, Vec3::new(50.0, 0.0, 0.0));
        f.context.play_line(line(|_| {}));
        f.context.update(0.3, &mut f.link);

        // player steps back into range before the grace time runs out
        f.world
            .borrow_mut()
            .set_entity_position(f.listener, Vec3::new(2.0, 0.0, 0.0));
        f.context.update(0.3, &mut f.link);
        assert_eq!(f.context.abort_reason(), None);
        f.context.update(0.3, &mut f.link);
        assert_eq!(f.context.abort_reason(), None);
    }
}

