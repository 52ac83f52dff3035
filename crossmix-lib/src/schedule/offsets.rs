//! Buffer trim points and playable durations.
//!
//! A segment's window on the mix timeline is `[absolute_start,
//! absolute_start + play)` before any skip is applied. The outgoing side is
//! truncated so it stops at its transition end instead of sounding on at
//! zero gain behind the incoming track.

use super::windows::ResolvedTransition;

/// Where a segment reads its buffer and for how long, after skip handling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentTiming {
    pub buffer_offset: f64,
    pub play_duration: f64,
    /// Seconds after the skip instant at which the segment starts sounding.
    pub local_start: f64,
    /// Mix-timeline instant where the segment stops, skip not considered.
    pub audible_end: f64,
}

/// Offset the segment would use without a skip: the phrase-matched entry
/// point when there is one, the top of the buffer otherwise.
pub(crate) fn entry_offset(incoming: Option<&ResolvedTransition>) -> f64 {
    incoming
        .and_then(|transition| transition.incoming_offset)
        .unwrap_or(0.0)
}

/// Resolve trim points for one segment.
///
/// Returns `None` when the segment's whole window lies at or before
/// `skip_offset`.
pub fn resolve_offsets(
    absolute_start: f64,
    duration: f64,
    incoming: Option<&ResolvedTransition>,
    outgoing: Option<&ResolvedTransition>,
    skip_offset: f64,
) -> Option<SegmentTiming> {
    let entry = entry_offset(incoming);
    let overridden = incoming.and_then(|t| t.incoming_offset).is_some();

    let mut play = (duration - entry).max(0.0);
    if let Some(outgoing) = outgoing {
        play = play.min(outgoing.end - entry).max(0.0);
    }
    let audible_end = absolute_start + play;

    if audible_end <= skip_offset {
        return None;
    }

    let elapsed = (skip_offset - absolute_start).max(0.0);
    let buffer_offset = if overridden { entry } else { entry + elapsed };

    Some(SegmentTiming {
        buffer_offset,
        play_duration: play - elapsed,
        local_start: (absolute_start - skip_offset).max(0.0),
        audible_end,
    })
}
