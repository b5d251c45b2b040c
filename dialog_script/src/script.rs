use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::line::{ActorId, FacialSpec, LineSpec, MAX_ACTORS};

#[derive(Debug, Error, PartialEq)]
pub enum ScriptError {
    #[error("script {script:?} declares no actors")]
    NoActors { script: String },
    #[error("script {script:?} declares {declared} actors, above the limit of {limit}")]
    TooManyActors {
        script: String,
        declared: u8,
        limit: u8,
    },
    #[error("script {script:?} contains no lines")]
    NoLines { script: String },
    #[error("line {line} of {script:?}: speaker {actor} is outside the cast of {cast}")]
    SpeakerOutOfRange {
        script: String,
        line: usize,
        actor: ActorId,
        cast: u8,
    },
    #[error("line {line} of {script:?}: look-at target {target} is outside the cast of {cast}")]
    LookAtOutOfRange {
        script: String,
        line: usize,
        target: ActorId,
        cast: u8,
    },
    #[error("line {line} of {script:?}: speaker {actor} cannot look at itself")]
    LookAtSelf {
        script: String,
        line: usize,
        actor: ActorId,
    },
    #[error("line {line} of {script:?}: reset_look_at contradicts an explicit look-at target")]
    LookAtContradiction { script: String, line: usize },
    #[error("line {line} of {script:?}: facial weight {weight} outside [0, 1]")]
    FacialWeightOutOfRange {
        script: String,
        line: usize,
        weight: f32,
    },
    #[error("line {line} of {script:?}: negative {field} ({value})")]
    NegativeDuration {
        script: String,
        line: usize,
        field: &'static str,
        value: f32,
    },
}

/// A validated conversation: a cast size plus the lines played in order.
/// Lines are shared immutably; the session owns the script and sequencer
/// contexts borrow the active line for the duration of its playback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogScript {
    pub name: String,
    pub num_actors: u8,
    pub lines: Vec<Arc<LineSpec>>,
}

impl DialogScript {
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn line(&self, index: usize) -> Option<&Arc<LineSpec>> {
        self.lines.get(index)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Cast members actually referenced by the lines, in id order.
    pub fn cast(&self) -> Vec<ActorId> {
        let mut seen = vec![false; self.num_actors as usize];
        for line in &self.lines {
            if let Some(slot) = seen.get_mut(line.actor.0 as usize) {
                *slot = true;
            }
            if let Some(target) = line.look_at {
                if let Some(slot) = seen.get_mut(target.0 as usize) {
                    *slot = true;
                }
            }
        }
        seen.iter()
            .enumerate()
            .filter_map(|(id, used)| used.then_some(ActorId(id as u8)))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ScriptError> {
        let script = self.name.clone();
        if self.num_actors == 0 {
            return Err(ScriptError::NoActors { script });
        }
        if self.num_actors > MAX_ACTORS {
            return Err(ScriptError::TooManyActors {
                script,
                declared: self.num_actors,
                limit: MAX_ACTORS,
            });
        }
        if self.lines.is_empty() {
            return Err(ScriptError::NoLines { script });
        }

        for (index, line) in self.lines.iter().enumerate() {
            if line.actor.0 >= self.num_actors {
                return Err(ScriptError::SpeakerOutOfRange {
                    script,
                    line: index,
                    actor: line.actor,
                    cast: self.num_actors,
                });
            }
            if let Some(target) = line.look_at {
                if line.reset_look_at {
                    return Err(ScriptError::LookAtContradiction {
                        script,
                        line: index,
                    });
                }
                if target.0 >= self.num_actors {
                    return Err(ScriptError::LookAtOutOfRange {
                        script,
                        line: index,
                        target,
                        cast: self.num_actors,
                    });
                }
                if target == line.actor {
                    return Err(ScriptError::LookAtSelf {
                        script,
                        line: index,
                        actor: line.actor,
                    });
                }
            }
            if let Some(facial) = line.facial.as_ref() {
                if !(0.0..=1.0).contains(&facial.weight) {
                    return Err(ScriptError::FacialWeightOutOfRange {
                        script,
                        line: index,
                        weight: facial.weight,
                    });
                }
                if facial.fade_time < 0.0 {
                    return Err(ScriptError::NegativeDuration {
                        script,
                        line: index,
                        field: "facial fade_time",
                        value: facial.fade_time,
                    });
                }
            }
            if line.delay < 0.0 {
                return Err(ScriptError::NegativeDuration {
                    script,
                    line: index,
                    field: "delay",
                    value: line.delay,
                });
            }
        }

        Ok(())
    }
}

/// Programmatic construction for tests and demos; `finish` validates.
pub struct ScriptBuilder {
    name: String,
    num_actors: u8,
    lines: Vec<LineSpec>,
}

impl ScriptBuilder {
    pub fn new(name: impl Into<String>, num_actors: u8) -> Self {
        ScriptBuilder {
            name: name.into(),
            num_actors,
            lines: Vec::new(),
        }
    }

    pub fn line(mut self, line: LineSpec) -> Self {
        self.lines.push(line);
        self
    }

    pub fn say(mut self, actor: ActorId, subtitle: &str) -> Self {
        let mut line = LineSpec::new(actor);
        line.subtitle = Some(subtitle.to_string());
        self.lines.push(line);
        self
    }

    pub fn with_audio(mut self, cue: &str) -> Self {
        if let Some(line) = self.lines.last_mut() {
            line.audio = Some(cue.to_string());
        }
        self
    }

    pub fn with_anim(mut self, name: &str, is_signal: bool) -> Self {
        if let Some(line) = self.lines.last_mut() {
            line.anim = Some(name.to_string());
            line.anim_is_signal = is_signal;
        }
        self
    }

    pub fn with_exact_positioning(mut self) -> Self {
        if let Some(line) = self.lines.last_mut() {
            line.anim_exact_positioning = true;
        }
        self
    }

    pub fn with_facial(mut self, expression: &str, weight: f32, fade_time: f32) -> Self {
        if let Some(line) = self.lines.last_mut() {
            line.facial = Some(FacialSpec {
                expression: expression.to_string(),
                weight,
                fade_time,
            });
        }
        self
    }

    pub fn with_look_at(mut self, target: ActorId, sticky: bool) -> Self {
        if let Some(line) = self.lines.last_mut() {
            line.look_at = Some(target);
            line.look_at_sticky = sticky;
            line.reset_look_at = false;
        }
        self
    }

    pub fn with_reset_look_at(mut self) -> Self {
        if let Some(line) = self.lines.last_mut() {
            line.look_at = None;
            line.look_at_sticky = false;
            line.reset_look_at = true;
        }
        self
    }

    pub fn with_delay(mut self, delay: f32) -> Self {
        if let Some(line) = self.lines.last_mut() {
            line.delay = delay;
        }
        self
    }

    pub fn finish(self) -> Result<DialogScript, ScriptError> {
        let script = DialogScript {
            name: self.name,
            num_actors: self.num_actors,
            lines: self.lines.into_iter().map(Arc::new).collect(),
        };
        script.validate()?;
        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_actor_script() -> ScriptBuilder {
        ScriptBuilder::new("office_intro", 2)
            .say(ActorId(0), "intro_01")
            .with_look_at(ActorId(1), false)
            .say(ActorId(1), "intro_02")
            .with_audio("intro_02_cue")
    }

    #[test]
    fn valid_script_passes_validation() {
        let script = two_actor_script().finish().expect("script validates");
        assert_eq!(script.len(), 2);
        assert_eq!(script.cast(), vec![ActorId(0), ActorId(1)]);
    }

    #[test]
    fn speaker_outside_cast_is_rejected() {
        let err = ScriptBuilder::new("bad", 1)
            .say(ActorId(3), "line")
            .finish()
            .expect_err("speaker 3 with cast of 1");
        assert!(matches!(err, ScriptError::SpeakerOutOfRange { .. }));
    }

    #[test]
    fn look_at_self_is_rejected() {
        let err = ScriptBuilder::new("bad", 2)
            .say(ActorId(0), "line")
            .with_look_at(ActorId(0), false)
            .finish()
            .expect_err("self look-at");
        assert!(matches!(err, ScriptError::LookAtSelf { .. }));
    }

    #[test]
    fn builder_reset_look_at_clears_target() {
        let script = ScriptBuilder::new("reset", 2)
            .say(ActorId(0), "line")
            .with_look_at(ActorId(1), true)
            .with_reset_look_at()
            .finish()
            .expect("reset wins over look-at");
        let line = script.line(0).expect("line present");
        assert!(line.reset_look_at);
        assert!(line.look_at.is_none());
    }

    #[test]
    fn facial_weight_is_bounded() {
        let err = ScriptBuilder::new("bad", 1)
            .say(ActorId(0), "line")
            .with_facial("smile", 1.5, 0.2)
            .finish()
            .expect_err("weight above 1");
        assert!(matches!(err, ScriptError::FacialWeightOutOfRange { .. }));
    }

    #[test]
    fn script_round_trips_through_json() {
        let script = two_actor_script().finish().expect("script validates");
        let json = script.to_json_string().expect("serializes");
        let back = DialogScript::from_json_str(&json).expect("parses");
        assert_eq!(back.num_actors, script.num_actors);
        assert_eq!(back.lines.len(), script.lines.len());
        assert_eq!(back.lines[1].audio.as_deref(), Some("intro_02_cue"));
        back.validate().expect("parsed script validates");
    }
}
