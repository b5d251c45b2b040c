use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use dialog_engine::world::ai::AgentKind;
use dialog_engine::world::entity::{EntityId, EntitySpec};
use dialog_engine::world::types::Vec3;
use dialog_engine::world::World;
use dialog_engine::{DialogSession, SessionConfig, SessionStatus};
use dialog_script::{ActorId, DialogScript, ScriptBuilder};

/// Plays a dialog script against the simulated world and reports what the
/// engine was asked to do, frame by frame.
#[derive(Parser, Debug)]
#[command(about = "Run a dialog script through the line sequencer", version)]
struct Args {
    /// Path to a dialog script JSON file (omit for the built-in demo script)
    #[arg(long)]
    script: Option<PathBuf>,

    /// Maximum number of frames to simulate
    #[arg(long, default_value_t = 600)]
    frames: usize,

    /// Seconds per simulated frame
    #[arg(long, default_value_t = 0.05)]
    dt: f32,

    /// Cast this actor as the local player instead of an AI actor
    #[arg(long)]
    player: Option<u8>,

    /// Awareness distance threshold for the local player (0 disables)
    #[arg(long, default_value_t = 0.0)]
    awareness_distance: f32,

    /// Awareness view angle in degrees for the local player (0 disables)
    #[arg(long, default_value_t = 0.0)]
    awareness_angle: f32,

    /// Path to write the world event journal as JSON
    #[arg(long)]
    event_log_json: Option<PathBuf>,

    /// Path to write the audio trigger log as JSON
    #[arg(long)]
    audio_log_json: Option<PathBuf>,

    /// Print the full event journal to stdout
    #[arg(long)]
    verbose: bool,
}

#[derive(Serialize)]
struct EventLogReport<'a> {
    script: &'a str,
    frames_run: usize,
    status: String,
    abort_reason: Option<&'static str>,
    events: &'a [String],
}

/// Seconds the scripted drivers wait before acknowledging a subsystem
/// request; long enough to exercise the waiting phases, short enough to
/// stay under the sequencer timeouts.
const GAZE_ACK_DELAY: f32 = 0.25;
const ANIM_ACK_DELAY: f32 = 0.3;
const AUDIO_CUE_LENGTH: f32 = 1.2;

fn builtin_script() -> Result<DialogScript> {
    let script = ScriptBuilder::new("demo_office", 2)
        .say(ActorId(0), "demo_intro_01")
        .with_audio("demo_intro_01_cue")
        .with_look_at(ActorId(1), false)
        .say(ActorId(1), "demo_intro_02")
        .with_audio("demo_intro_02_cue")
        .with_anim("wave", true)
        .with_facial("smile", 0.8, 0.2)
        .say(ActorId(0), "demo_intro_03")
        .with_look_at(ActorId(1), true)
        .with_delay(0.5)
        .say(ActorId(1), "demo_intro_04")
        .with_reset_look_at()
        .finish()
        .context("built-in demo script failed validation")?;
    Ok(script)
}

fn load_script(args: &Args) -> Result<DialogScript> {
    match args.script.as_ref() {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading script {}", path.display()))?;
            let script = DialogScript::from_json_str(&text)
                .with_context(|| format!("parsing script {}", path.display()))?;
            script
                .validate()
                .with_context(|| format!("validating script {}", path.display()))?;
            Ok(script)
        }
        None => builtin_script(),
    }
}

/// Stands in for the engine: acknowledges gaze, animation, and audio
/// requests after a fixed think time each.
#[derive(Default)]
struct Drivers {
    gaze_timers: BTreeMap<EntityId, f32>,
    anim_timers: BTreeMap<EntityId, f32>,
    audio_timers: BTreeMap<u32, f32>,
}

impl Drivers {
    fn drive(&mut self, world: &mut World, cast: &BTreeMap<ActorId, EntityId>, dt: f32) {
        for entity in cast.values().copied() {
            if world.gaze_target(entity).is_some() {
                let timer = self.gaze_timers.entry(entity).or_insert(0.0);
                *timer += dt;
                if *timer >= GAZE_ACK_DELAY {
                    world.set_gaze_reached(entity, true);
                }
            } else {
                self.gaze_timers.remove(&entity);
                world.set_gaze_reached(entity, false);
            }

            if world.anim_pending_query(entity).is_some() {
                let timer = self.anim_timers.entry(entity).or_insert(0.0);
                *timer += dt;
                if *timer >= ANIM_ACK_DELAY {
                    self.anim_timers.remove(&entity);
                    world.complete_anim_query(entity, true);
                }
            } else {
                self.anim_timers.remove(&entity);
            }
        }

        for channel in world.audio_channel_ids() {
            if world.audio_active_cue(channel).is_some() {
                let timer = self.audio_timers.entry(channel.0).or_insert(0.0);
                *timer += dt;
                if *timer >= AUDIO_CUE_LENGTH {
                    self.audio_timers.remove(&channel.0);
                    world.finish_audio_trigger(channel);
                }
            } else {
                self.audio_timers.remove(&channel.0);
            }
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let script = load_script(&args)?;

    let world = World::shared();
    let local_player = args.player.map(ActorId);
    let mut cast = BTreeMap::new();
    {
        let mut w = world.borrow_mut();
        for (index, actor) in script.cast().into_iter().enumerate() {
            let angle = index as f32 * std::f32::consts::TAU / script.num_actors.max(1) as f32;
            let position = Vec3::new(angle.cos() * 2.0, angle.sin() * 2.0, 0.0);
            let facing = Vec3::ZERO.sub(position).flattened().normalized_or(Vec3::new(0.0, 1.0, 0.0));
            let entity = w.spawn_entity(
                EntitySpec::named(format!("{actor}")).at(position).facing(facing),
            );
            let kind = if local_player == Some(actor) {
                AgentKind::Player
            } else {
                AgentKind::Actor
            };
            w.register_agent(entity, kind);
            w.install_animation_graph(entity);
            cast.insert(actor, entity);
        }
        for line in &script.lines {
            if let Some(facial) = line.facial.as_ref() {
                w.register_facial_expression(&facial.expression);
            }
        }
    }

    let mut config = SessionConfig::default();
    config.awareness_distance = args.awareness_distance;
    config.awareness_angle_deg = args.awareness_angle;

    let mut session = DialogSession::new(
        world.clone(),
        script.clone(),
        cast.clone(),
        config,
        local_player,
    )?;
    session.begin();

    let mut drivers = Drivers::default();
    let mut frames_run = 0usize;
    for _ in 0..args.frames {
        frames_run += 1;
        let status = session.update(args.dt);
        drivers.drive(&mut world.borrow_mut(), &cast, args.dt);
        if status != SessionStatus::Running {
            break;
        }
    }

    let status = session.status();
    let abort_reason = session.abort_reason().map(|reason| reason.label());
    println!(
        "script {:?}: {} lines, {} frames, status {:?}{}",
        script.name,
        script.len(),
        frames_run,
        status,
        abort_reason
            .map(|reason| format!(" ({reason})"))
            .unwrap_or_default()
    );

    let world = world.borrow();
    if args.verbose {
        for event in world.events() {
            println!("  {event}");
        }
    }

    if let Some(path) = args.event_log_json.as_ref() {
        let report = EventLogReport {
            script: &script.name,
            frames_run,
            status: format!("{status:?}"),
            abort_reason,
            events: world.events(),
        };
        let payload =
            serde_json::to_string_pretty(&report).context("serializing event log report")?;
        fs::write(path, payload)
            .with_context(|| format!("writing event log {}", path.display()))?;
        println!("event log written to {}", path.display());
    }

    if let Some(path) = args.audio_log_json.as_ref() {
        let payload =
            serde_json::to_string_pretty(world.audio_log()).context("serializing audio log")?;
        fs::write(path, payload)
            .with_context(|| format!("writing audio log {}", path.display()))?;
        println!("audio log written to {}", path.display());
    }

    Ok(())
}
