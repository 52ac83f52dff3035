use std::time::Duration;

use crossmix_lib::{PlaybackSchedule, PlaybackStart, Transport, TransportState};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};

/// One frame of the status view.
pub struct MixView {
    pub state: &'static str,
    /// `current / total (pct%)` over the mix timeline.
    pub clock: String,
    /// Progress through the mix in `[0, 1]`.
    pub ratio: f64,
    pub now: String,
    pub timeline: Vec<TimelineRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowPhase {
    Played,
    Audible,
    Upcoming,
}

/// A scheduled segment as shown in the timeline list.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineRow {
    pub label: String,
    pub phase: RowPhase,
}

pub struct StatusArgs {
    pub state: TransportState,
    pub position: f64,
    pub total: f64,
    pub track: Option<usize>,
    pub next_transition: Option<f64>,
    pub timeline: Vec<TimelineRow>,
    pub pending: bool,
}

impl StatusArgs {
    /// Read the transport and the schedule it last built.
    pub fn from_transport(transport: &Transport, pending: bool) -> Self {
        let schedule = transport.schedule();
        let position = transport.position();
        Self {
            state: transport.state(),
            position,
            total: schedule.as_ref().map(|s| s.total_duration).unwrap_or(0.0),
            track: schedule.as_ref().and_then(|s| audible_track(s, position)),
            next_transition: schedule.as_ref().and_then(|s| next_transition(s, position)),
            timeline: schedule
                .as_ref()
                .map(|s| timeline_rows(s, position))
                .unwrap_or_default(),
            pending,
        }
    }
}

pub fn mix_view(args: StatusArgs) -> MixView {
    let state = match (args.pending, args.state) {
        (true, _) | (false, TransportState::Scheduled) => "… Loading",
        (false, TransportState::Playing) => "▶ Playing",
        (false, TransportState::Completed) => "■ Finished",
        (false, TransportState::Idle) => "■ Stopped",
    };
    let ratio = if args.total > 0.0 {
        (args.position / args.total).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let clock = format!(
        "{} / {}   ({:>5.1}%)",
        format_time(args.position * 1000.0),
        format_time(args.total * 1000.0),
        ratio * 100.0
    );
    let track = args
        .track
        .map(|track| format!("track {}", track))
        .unwrap_or_else(|| "-".to_string());
    let next = args
        .next_transition
        .map(|at| format!("next transition at {}", format_time(at * 1000.0)))
        .unwrap_or_else(|| "no further transitions".to_string());

    MixView {
        state,
        clock,
        ratio,
        now: format!("Now: {} | {}", track, next),
        timeline: args.timeline,
    }
}

/// One row per scheduled segment, labelled with its mix-timeline window and
/// the transition that brings it in.
pub fn timeline_rows(schedule: &PlaybackSchedule, position: f64) -> Vec<TimelineRow> {
    schedule
        .segments
        .iter()
        .map(|segment| {
            let start = schedule.skip_offset + segment.local_start;
            let end = start + segment.play_duration;
            let entry = schedule
                .transitions
                .iter()
                .find(|transition| transition.position + 1 == segment.position)
                .map(|transition| {
                    if transition.hard_cut {
                        return "cut".to_string();
                    }
                    let mut entry = format!(
                        "{:.1}s {}",
                        transition.crossfade_sec,
                        transition.eq_strategy.id()
                    );
                    if !transition.sound.is_silent() {
                        entry.push_str(" + ");
                        entry.push_str(transition.sound.id());
                    }
                    entry
                })
                .unwrap_or_else(|| "opening".to_string());
            let phase = if position >= end {
                RowPhase::Played
            } else if position >= start {
                RowPhase::Audible
            } else {
                RowPhase::Upcoming
            };
            TimelineRow {
                label: format!(
                    "{:>2}. track {:<3} {} - {}  {}",
                    segment.position + 1,
                    segment.track_index,
                    format_time(start * 1000.0),
                    format_time(end * 1000.0),
                    entry
                ),
                phase,
            }
        })
        .collect()
}

/// Track whose window contains `position`, preferring the incoming one
/// during an overlap.
fn audible_track(schedule: &PlaybackSchedule, position: f64) -> Option<usize> {
    schedule
        .segments
        .iter()
        .filter(|segment| {
            let start = schedule.skip_offset + segment.local_start;
            position >= start && position < start + segment.play_duration
        })
        .last()
        .map(|segment| segment.track_index)
}

/// Mix-timeline instant the next incoming track enters.
fn next_transition(schedule: &PlaybackSchedule, position: f64) -> Option<f64> {
    schedule
        .segments
        .iter()
        .filter(|segment| segment.position > 0)
        .map(|segment| segment.absolute_start_time)
        .find(|start| *start > position)
}

pub enum KeyAction {
    Continue,
    Quit,
    Restart(PlaybackStart),
}

pub fn handle_key_event(transport: &Transport) -> KeyAction {
    if event::poll(Duration::from_millis(100)).unwrap_or(false) {
        if let Ok(Event::Key(key)) = event::read() {
            if key.kind != KeyEventKind::Press {
                return KeyAction::Continue;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => {
                    transport.stop();
                    return KeyAction::Quit;
                }
                KeyCode::Char('t') | KeyCode::Char('T') => {
                    return KeyAction::Restart(PlaybackStart::FirstTransition);
                }
                KeyCode::Char('r') | KeyCode::Char('R') => {
                    return KeyAction::Restart(PlaybackStart::Beginning);
                }
                _ => {}
            }
        }
    }

    KeyAction::Continue
}

pub fn format_time(time: f64) -> String {
    let seconds = (time / 1000.0).floor().max(0.0) as u32;
    let minutes = seconds / 60;
    let seconds = seconds % 60;
    let hours = minutes / 60;
    let minutes = minutes % 60;

    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}
