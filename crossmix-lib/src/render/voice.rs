//! Sample-level realization of segments and cues.

use log::debug;
use rodio::source::SeekError;
use rodio::Source;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use crate::audio::DecodedBuffer;
use crate::config::ScheduleConfig;
use crate::cues::CueBank;
use crate::dsp::{Biquad, BiquadKind};
use crate::plan::TransitionSound;
use crate::schedule::{CuePlacement, Envelope, Segment};

/// Natural end of a segment voice, reported once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentEnded {
    pub session: u64,
    pub position: usize,
}

/// Where a voice sends its completion signal.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    pub sender: Sender<SegmentEnded>,
    pub session: u64,
}

struct FilterLane {
    filter: Biquad,
    envelope: Envelope,
}

struct SegmentBody {
    buffer: DecodedBuffer,
    offset_frame: usize,
    gain: Envelope,
    low_pass: Option<FilterLane>,
    high_pass: Option<FilterLane>,
    skip_offset: f64,
    control_frames: usize,
    position: usize,
    completion: Option<CompletionSignal>,
}

struct CueBody {
    bank: CueBank,
    sound: TransitionSound,
    gain: f32,
    clip: Option<DecodedBuffer>,
}

enum Body {
    Segment(Box<SegmentBody>),
    Cue(CueBody),
}

/// One scheduled sound: leading silence, then a bounded body.
///
/// Every voice of a session is started at the same instant, so the leading
/// silence places the body on the shared timeline. The body ends at its
/// hard stop or when the shared stop flag is raised, whichever comes first.
pub struct Voice {
    body: Body,
    channels: u16,
    sample_rate: u32,
    lead_in_frames: usize,
    body_frames: usize,
    frame_index: usize,
    frame: Vec<f32>,
    channel_index: usize,
    stop: Arc<AtomicBool>,
    finished: bool,
}

impl Voice {
    /// Voice for a track segment.
    ///
    /// # Arguments
    ///
    /// * `segment` - Timing and automation for the track.
    /// * `buffer` - The track's decoded audio, at the output format.
    /// * `skip_offset` - Mix-timeline instant that maps to local time `0`.
    /// * `stop` - Session-wide stop flag.
    /// * `completion` - Channel notified when the segment reaches its stop.
    pub fn segment(
        segment: &Segment,
        buffer: DecodedBuffer,
        skip_offset: f64,
        config: &ScheduleConfig,
        stop: Arc<AtomicBool>,
        completion: Option<CompletionSignal>,
    ) -> Self {
        let channels = buffer.channels();
        let sample_rate = buffer.sample_rate();
        let lane = |kind, envelope: &Option<Envelope>| {
            envelope.as_ref().map(|envelope| FilterLane {
                filter: Biquad::new(
                    kind,
                    sample_rate,
                    channels as usize,
                    envelope.value_at(skip_offset) as f32,
                    config.filter_q,
                ),
                envelope: envelope.clone(),
            })
        };

        let body = SegmentBody {
            offset_frame: buffer.frame_at(segment.buffer_offset),
            gain: segment.gain.clone(),
            low_pass: lane(BiquadKind::LowPass, &segment.filter.low_pass),
            high_pass: lane(BiquadKind::HighPass, &segment.filter.high_pass),
            skip_offset,
            control_frames: config.filter_control_frames.max(1),
            position: segment.position,
            completion,
            buffer,
        };

        Self::with_body(
            Body::Segment(Box::new(body)),
            channels,
            sample_rate,
            segment.local_start,
            segment.play_duration,
            stop,
        )
    }

    /// Voice for a cue. The clip is looked up in `bank` when the cue is due.
    pub fn cue(
        cue: &CuePlacement,
        bank: CueBank,
        gain: f32,
        stop: Arc<AtomicBool>,
    ) -> Self {
        let format = bank.format();
        let body = CueBody {
            bank,
            sound: cue.sound,
            gain,
            clip: None,
        };
        Self::with_body(
            Body::Cue(body),
            format.channels,
            format.sample_rate,
            cue.local_time,
            0.0,
            stop,
        )
    }

    fn with_body(
        body: Body,
        channels: u16,
        sample_rate: u32,
        local_start: f64,
        play_duration: f64,
        stop: Arc<AtomicBool>,
    ) -> Self {
        let channels = channels.max(1);
        let to_frames = |seconds: f64| (seconds.max(0.0) * sample_rate as f64).round() as usize;
        Self {
            body,
            channels,
            sample_rate,
            lead_in_frames: to_frames(local_start),
            body_frames: to_frames(play_duration),
            frame_index: 0,
            frame: vec![0.0; channels as usize],
            channel_index: channels as usize,
            stop,
            finished: false,
        }
    }

    /// Frames from local time `0` to the hard stop, when known.
    pub fn total_frames(&self) -> Option<usize> {
        match &self.body {
            Body::Segment(_) => Some(self.lead_in_frames + self.body_frames),
            Body::Cue(cue) => cue
                .clip
                .as_ref()
                .map(|clip| self.lead_in_frames + clip.frames()),
        }
    }

    fn finish(&mut self, natural: bool) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Body::Segment(segment) = &mut self.body {
            if let Some(signal) = segment.completion.take() {
                if natural {
                    let _ = signal.sender.send(SegmentEnded {
                        session: signal.session,
                        position: segment.position,
                    });
                }
            }
        }
    }

    /// Fill `self.frame` with the next output frame, or end the voice.
    fn advance(&mut self) -> bool {
        if self.finished {
            return false;
        }
        if self.stop.load(Ordering::Relaxed) {
            self.finish(false);
            return false;
        }

        let index = self.frame_index;
        self.frame_index += 1;
        self.channel_index = 0;

        if index < self.lead_in_frames {
            self.frame.fill(0.0);
            return true;
        }
        let body_index = index - self.lead_in_frames;

        let sample_rate = self.sample_rate;
        match &mut self.body {
            Body::Segment(segment) => {
                if body_index >= self.body_frames {
                    self.finish(true);
                    return false;
                }
                let local_time = index as f64 / sample_rate as f64;
                render_segment_frame(segment, body_index, local_time, &mut self.frame);
                true
            }
            Body::Cue(cue) => {
                if body_index == 0 {
                    cue.clip = cue.bank.get(cue.sound);
                    match &cue.clip {
                        Some(clip) => self.body_frames = clip.frames(),
                        None => {
                            debug!("cue {} not ready at its start; dropped", cue.sound.id());
                        }
                    }
                }
                let Some(clip) = cue.clip.as_ref() else {
                    self.finish(true);
                    return false;
                };
                if body_index >= self.body_frames {
                    self.finish(true);
                    return false;
                }
                copy_frame(clip, body_index, &mut self.frame);
                for sample in self.frame.iter_mut() {
                    *sample *= cue.gain;
                }
                true
            }
        }
    }
}

fn render_segment_frame(segment: &mut SegmentBody, body_index: usize, local_time: f64, out: &mut [f32]) {
    copy_frame(&segment.buffer, segment.offset_frame + body_index, out);

    let absolute_time = segment.skip_offset + local_time;
    let retune = body_index % segment.control_frames == 0;
    for lane in [segment.low_pass.as_mut(), segment.high_pass.as_mut()]
        .into_iter()
        .flatten()
    {
        if retune {
            lane.filter
                .set_frequency(lane.envelope.value_at(absolute_time) as f32);
        }
        lane.filter.process_frame(out);
    }

    let gain = segment.gain.value_at(absolute_time).clamp(0.0, 1.0) as f32;
    for sample in out.iter_mut() {
        *sample *= gain;
    }
}

/// Copy frame `index` of `buffer` into `out`, mapping channel counts and
/// padding past the end with silence.
fn copy_frame(buffer: &DecodedBuffer, index: usize, out: &mut [f32]) {
    match buffer.frame(index) {
        Some(frame) => {
            for (ch, sample) in out.iter_mut().enumerate() {
                *sample = frame[ch.min(frame.len() - 1)];
            }
        }
        None => out.fill(0.0),
    }
}

impl Iterator for Voice {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.channel_index >= self.channels as usize && !self.advance() {
            return None;
        }
        let sample = self.frame[self.channel_index];
        self.channel_index += 1;
        Some(sample)
    }
}

impl Source for Voice {
    fn current_span_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        self.total_frames()
            .map(|frames| Duration::from_secs_f64(frames as f64 / self.sample_rate as f64))
    }

    fn try_seek(&mut self, _pos: Duration) -> Result<(), SeekError> {
        Err(SeekError::NotSupported {
            underlying_source: "Voice",
        })
    }
}
