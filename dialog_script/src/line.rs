use std::fmt;

use serde::{Deserialize, Serialize};

/// Upper bound on participants per script; ids above this never validate.
pub const MAX_ACTORS: u8 = 32;

/// Stable identifier of one participant within a script's cast.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub u8);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacialSpec {
    pub expression: String,
    #[serde(default = "default_facial_weight")]
    pub weight: f32,
    #[serde(default)]
    pub fade_time: f32,
}

fn default_facial_weight() -> f32 {
    1.0
}

/// One scripted utterance: who speaks, what plays, and where the speaker
/// should look while it plays. Immutable once the script is built; the
/// session hands lines to sequencer contexts by shared reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSpec {
    pub actor: ActorId,

    /// Localization key for the subtitle; resolution happens elsewhere,
    /// the sequencer only journals it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,

    /// Audio trigger cue played on the speaker's speech channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,

    /// Animation name, played either as a one-shot signal or as a looping
    /// action depending on `anim_is_signal`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anim: Option<String>,
    #[serde(default)]
    pub anim_is_signal: bool,
    /// Route the animation through the AI exact-positioning pipe instead of
    /// the animation graph. Mutually exclusive with the graph path per line.
    #[serde(default)]
    pub anim_exact_positioning: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facial: Option<FacialSpec>,
    /// Fade the current facial expression back to neutral even when no new
    /// expression is given.
    #[serde(default)]
    pub reset_facial: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub look_at: Option<ActorId>,
    /// Keep gazing at the target through later phases and lines until
    /// explicitly cleared.
    #[serde(default)]
    pub look_at_sticky: bool,
    /// Clear both one-line and sticky gaze targets; wins over `look_at`.
    #[serde(default)]
    pub reset_look_at: bool,

    /// Seconds to wait after the line completes before the next line.
    #[serde(default)]
    pub delay: f32,
}

impl LineSpec {
    pub fn new(actor: ActorId) -> Self {
        LineSpec {
            actor,
            subtitle: None,
            audio: None,
            anim: None,
            anim_is_signal: false,
            anim_exact_positioning: false,
            facial: None,
            reset_facial: false,
            look_at: None,
            look_at_sticky: false,
            reset_look_at: false,
            delay: 0.0,
        }
    }

    pub fn has_anim(&self) -> bool {
        self.anim.as_deref().is_some_and(|name| !name.is_empty())
    }

    pub fn has_audio(&self) -> bool {
        self.audio.as_deref().is_some_and(|cue| !cue.is_empty())
    }

    pub fn has_facial(&self) -> bool {
        self.reset_facial
            || self
                .facial
                .as_ref()
                .is_some_and(|spec| !spec.expression.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_names_do_not_count_as_requests() {
        let mut line = LineSpec::new(ActorId(0));
        line.anim = Some(String::new());
        line.audio = Some(String::new());
        assert!(!line.has_anim());
        assert!(!line.has_audio());
        assert!(!line.has_facial());
    }

    #[test]
    fn reset_facial_counts_as_facial_request() {
        let mut line = LineSpec::new(ActorId(1));
        line.reset_facial = true;
        assert!(line.has_facial());
    }

    #[test]
    fn line_round_trips_through_json() {
        let mut line = LineSpec::new(ActorId(2));
        line.audio = Some("mo_mannys_office_0031".to_string());
        line.look_at = Some(ActorId(0));
        line.delay = 1.5;

        let json = serde_json::to_string(&line).expect("line serializes");
        let back: LineSpec = serde_json::from_str(&json).expect("line parses");
        assert_eq!(back, line);
    }
}
