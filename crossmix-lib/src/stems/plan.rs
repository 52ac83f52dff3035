//! Per-stem fade schedules for a stem-aware transition.

use log::{debug, warn};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use serde_json::{Map, Value};

use crate::error::ScheduleError;

/// Fades shorter than this are stretched to it.
pub(crate) const MIN_FADE_SEC: f64 = 0.01;

/// One of the four separated sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stem {
    Vocals,
    Drums,
    Bass,
    Other,
}

impl Stem {
    pub const ALL: [Stem; 4] = [Stem::Vocals, Stem::Drums, Stem::Bass, Stem::Other];

    pub fn id(&self) -> &'static str {
        match self {
            Stem::Vocals => "vocals",
            Stem::Drums => "drums",
            Stem::Bass => "bass",
            Stem::Other => "other",
        }
    }

    fn index(&self) -> usize {
        match self {
            Stem::Vocals => 0,
            Stem::Drums => 1,
            Stem::Bass => 2,
            Stem::Other => 3,
        }
    }
}

/// A fade window relative to the start of the transition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StemFade {
    pub start: f64,
    pub duration: f64,
}

impl StemFade {
    pub fn new(start: f64, duration: f64) -> Self {
        Self { start, duration }
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Outgoing gain at `t`: unity before the fade, silent after it.
    pub fn gain_out(&self, t: f64) -> f64 {
        1.0 - self.progress(t)
    }

    /// Incoming gain at `t`: silent before the fade, unity after it.
    pub fn gain_in(&self, t: f64) -> f64 {
        self.progress(t)
    }

    fn progress(&self, t: f64) -> f64 {
        let duration = self.duration.max(MIN_FADE_SEC);
        ((t - self.start) / duration).clamp(0.0, 1.0)
    }
}

/// Fade-out for each stem of track A and fade-in for each stem of track B.
///
/// Every window lies inside `[0, crossfade_sec]` and A's vocals are silent
/// before B's vocals begin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StemFadePlan {
    pub crossfade_sec: f64,
    outgoing: [StemFade; 4],
    incoming: [StemFade; 4],
}

impl StemFadePlan {
    /// Build a plan from raw windows, clamping them and applying the vocal
    /// rule.
    pub fn new(crossfade_sec: f64, outgoing: [StemFade; 4], incoming: [StemFade; 4]) -> Self {
        let crossfade_sec = if crossfade_sec.is_finite() {
            crossfade_sec.max(0.0)
        } else {
            0.0
        };
        let clamp = |fade: StemFade| {
            let start = clamp_window(fade.start, crossfade_sec);
            let duration = clamp_window(fade.duration, crossfade_sec).min(crossfade_sec - start);
            StemFade::new(start, duration)
        };
        let mut plan = Self {
            crossfade_sec,
            outgoing: outgoing.map(clamp),
            incoming: incoming.map(clamp),
        };
        plan.separate_vocals();
        plan
    }

    /// Sequential vocals, drums and bass swapped around the midpoint, the
    /// rest of the band crossfaded over the whole window.
    pub fn default_for(crossfade_sec: f64) -> Self {
        let cf = crossfade_sec;
        Self::new(
            cf,
            [
                StemFade::new(0.0, cf * 0.3),
                StemFade::new(cf * 0.4, cf * 0.2),
                StemFade::new(cf * 0.5, cf * 0.05),
                StemFade::new(0.0, cf),
            ],
            [
                StemFade::new(cf * 0.5, cf * 0.3),
                StemFade::new(cf * 0.4, cf * 0.2),
                StemFade::new(cf * 0.5, cf * 0.05),
                StemFade::new(0.0, cf),
            ],
        )
    }

    /// Parse the planner's reply: a JSON object with keys such as
    /// `vocals_a_fade_start` and `bass_b_fade_duration`. The object may sit
    /// inside a fenced code block surrounded by prose; only the first block
    /// is read. Missing keys fade over the whole window from `0`.
    pub fn from_json_str(text: &str, crossfade_sec: f64) -> Result<Self, ScheduleError> {
        let payload = strip_code_fence(text);
        let map: Map<String, Value> = serde_json::from_str(payload)?;
        let read = |key: String, default: f64| match map.get(&key).and_then(Value::as_f64) {
            Some(value) => value,
            None => {
                debug!("stem plan has no {}, using {:.2}", key, default);
                default
            }
        };
        let fade = |stem: Stem, side: &str| {
            StemFade::new(
                read(format!("{}_{}_fade_start", stem.id(), side), 0.0),
                read(format!("{}_{}_fade_duration", stem.id(), side), crossfade_sec),
            )
        };
        Ok(Self::new(
            crossfade_sec,
            Stem::ALL.map(|stem| fade(stem, "a")),
            Stem::ALL.map(|stem| fade(stem, "b")),
        ))
    }

    pub fn fade_out(&self, stem: Stem) -> StemFade {
        self.outgoing[stem.index()]
    }

    pub fn fade_in(&self, stem: Stem) -> StemFade {
        self.incoming[stem.index()]
    }

    /// Flat key/value form, the same shape [`StemFadePlan::from_json_str`]
    /// reads.
    pub fn to_json_value(&self) -> Value {
        let mut map = Map::new();
        for stem in Stem::ALL {
            for (side, fade) in [("a", self.fade_out(stem)), ("b", self.fade_in(stem))] {
                map.insert(format!("{}_{}_fade_start", stem.id(), side), fade.start.into());
                map.insert(format!("{}_{}_fade_duration", stem.id(), side), fade.duration.into());
            }
        }
        Value::Object(map)
    }

    fn separate_vocals(&mut self) {
        let vocals_out_end = self.outgoing[Stem::Vocals.index()].end();
        let vocals_in = &mut self.incoming[Stem::Vocals.index()];
        if vocals_in.start >= vocals_out_end {
            return;
        }
        warn!(
            "incoming vocals at {:.2}s overlap outgoing vocals ending {:.2}s; delayed",
            vocals_in.start, vocals_out_end
        );
        vocals_in.start = vocals_out_end;
        vocals_in.duration = vocals_in.duration.min(self.crossfade_sec - vocals_out_end).max(0.0);
    }
}

fn clamp_window(value: f64, crossfade_sec: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, crossfade_sec)
    } else {
        0.0
    }
}

static CODE_FENCE: OnceLock<Option<Regex>> = OnceLock::new();

/// Body of the first fenced block (optionally tagged `json`) anywhere in
/// `text`, or the whole trimmed text when there is none.
fn strip_code_fence(text: &str) -> &str {
    let fence = CODE_FENCE.get_or_init(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").ok());
    fence
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|captures| captures.get(1))
        .map(|body| body.as_str())
        .unwrap_or_else(|| text.trim())
}
