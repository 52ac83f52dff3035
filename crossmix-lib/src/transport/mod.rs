//! Session control for mix previews.
//!
//! A [`Transport`] owns at most one playback session at a time. `play`
//! decodes every track, builds the schedule and hands the voices to the
//! output resource; `stop` can be called from any thread at any point of
//! that and always leaves the transport `Idle` with the resource released.

mod guard;
mod request;

use log::{debug, info};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::{DecodeError, DecodedBuffer, OutputFormat};
use crate::config::ScheduleConfig;
use crate::cues::{CueAssetProvider, CueBank, SynthCueProvider};
use crate::error::{ConfigurationError, ScheduleError};
use crate::features::{normalize_features, TrackFeatures};
use crate::plan::snap_to_phrases;
use crate::render::{
    build_voices, CompletionSignal, DeviceBackend, OutputBackend, OutputResource, SegmentEnded,
};
use crate::schedule::{build_schedule, PlaybackSchedule};

use guard::SessionGuard;

pub use request::{PlayRequest, TrackSource};

/// Lifecycle of the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    /// Decoding and scheduling; nothing audible yet.
    Scheduled,
    Playing,
    /// The last segment reached its stop; the resource is released.
    Completed,
}

/// Playback controller for one session at a time.
///
/// Clones share the same session, so a UI thread can hold one clone for
/// `stop` while another thread is blocked in `play`.
#[derive(Clone)]
pub struct Transport {
    config: Arc<ScheduleConfig>,
    backend: Arc<dyn OutputBackend>,
    cues: CueBank,
    state: Arc<Mutex<TransportState>>,
    session_id: Arc<AtomicU64>,
    abort: Arc<Mutex<Arc<AtomicBool>>>,
    resource: Arc<Mutex<Option<Box<dyn OutputResource>>>>,
    schedule: Arc<Mutex<Option<PlaybackSchedule>>>,
    started_at: Arc<Mutex<Option<Instant>>>,
    play_lock: Arc<Mutex<()>>,
}

impl Transport {
    pub fn new(
        config: ScheduleConfig,
        backend: Arc<dyn OutputBackend>,
        cue_provider: Arc<dyn CueAssetProvider>,
    ) -> Self {
        let format = OutputFormat::new(config.output_sample_rate, config.output_channels);
        Self {
            config: Arc::new(config),
            backend,
            cues: CueBank::new(cue_provider, format),
            state: Arc::new(Mutex::new(TransportState::Idle)),
            session_id: Arc::new(AtomicU64::new(0)),
            abort: Arc::new(Mutex::new(Arc::new(AtomicBool::new(false)))),
            resource: Arc::new(Mutex::new(None)),
            schedule: Arc::new(Mutex::new(None)),
            started_at: Arc::new(Mutex::new(None)),
            play_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Transport on the default output device with synthesized cues.
    pub fn with_device(config: ScheduleConfig) -> Self {
        let cues = Arc::new(SynthCueProvider::from_config(&config));
        Self::new(config, Arc::new(DeviceBackend), cues)
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    pub fn cues(&self) -> &CueBank {
        &self.cues
    }

    pub fn state(&self) -> TransportState {
        *self.state.lock().unwrap()
    }

    /// Snapshot of the most recent schedule, kept after the session ends.
    pub fn schedule(&self) -> Option<PlaybackSchedule> {
        self.schedule.lock().unwrap().clone()
    }

    /// Current position on the mix timeline in seconds.
    pub fn position(&self) -> f64 {
        let state = self.state();
        let schedule = self.schedule.lock().unwrap();
        let Some(schedule) = schedule.as_ref() else {
            return 0.0;
        };
        let elapsed = match state {
            TransportState::Idle => return 0.0,
            TransportState::Scheduled => 0.0,
            TransportState::Playing => self
                .started_at
                .lock()
                .unwrap()
                .map(|started| started.elapsed().as_secs_f64())
                .unwrap_or(0.0)
                .min(schedule.local_duration()),
            TransportState::Completed => schedule.local_duration(),
        };
        schedule.skip_offset + elapsed
    }

    /// Block until the session completes or is stopped.
    pub fn wait_until_done(&self) -> TransportState {
        loop {
            let state = self.state();
            if !matches!(state, TransportState::Scheduled | TransportState::Playing) {
                return state;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    /// Start a new session, stopping the current one first.
    ///
    /// Returns once every voice has been handed to the output. Nothing is
    /// started if any source is missing or remote, any track fails to
    /// decode, the plan is invalid, or `stop` is called in the meantime.
    pub fn play(&self, request: PlayRequest) -> Result<PlaybackSchedule, ScheduleError> {
        let _serial = self.play_lock.lock().unwrap();
        self.stop();

        // The flag is installed before the id moves, both under the state
        // lock, so a concurrent `stop` raises this session's flag or none.
        let abort = Arc::new(AtomicBool::new(false));
        let session = {
            let mut state = self.state.lock().unwrap();
            *self.abort.lock().unwrap() = abort.clone();
            let session = self.session_id.fetch_add(1, Ordering::SeqCst) + 1;
            *state = TransportState::Scheduled;
            session
        };
        let mut guard = SessionGuard::new(self, session);
        info!("session {} scheduled", session);

        let sources = check_sources(&request)?;
        let format = OutputFormat::new(self.config.output_sample_rate, self.config.output_channels);
        let decoded = decode_tracks(&sources, format, &abort)?;
        if !self.is_current(session) {
            return Err(ScheduleError::Cancelled);
        }

        let features: Vec<TrackFeatures> = request
            .features
            .iter()
            .enumerate()
            .map(|(track, raw)| {
                let duration = decoded.get(&track).map(DecodedBuffer::duration_sec);
                normalize_features(raw, duration, &self.config)
            })
            .collect();
        let plan = if request.snap_to_phrases {
            snap_to_phrases(&request.plan, &features, &self.config)
        } else {
            request.plan.clone()
        };
        let schedule = build_schedule(&plan, &features, request.start, &self.config)?;

        let tracks: Vec<DecodedBuffer> = (0..request.sources.len())
            .map(|track| {
                decoded
                    .get(&track)
                    .cloned()
                    .unwrap_or_else(|| DecodedBuffer::silence(0.0, format.channels, format.sample_rate))
            })
            .collect();
        let (sender, receiver) = mpsc::channel();
        let voices = build_voices(
            &schedule,
            &tracks,
            Some(&self.cues),
            &self.config,
            abort.clone(),
            Some(CompletionSignal { sender, session }),
        )?;
        self.cues.request_all(&schedule.cues);

        let mut resource = self.backend.acquire(format)?;
        {
            let mut slot = self.resource.lock().unwrap();
            if !self.is_current(session) {
                resource.release();
                return Err(ScheduleError::Cancelled);
            }
            if let Err(err) = resource.start(voices) {
                resource.release();
                return Err(err);
            }
            *slot = Some(resource);
            *self.schedule.lock().unwrap() = Some(schedule.clone());
            *self.started_at.lock().unwrap() = Some(Instant::now());
            self.set_state(TransportState::Playing);
        }
        guard.disarm();
        info!(
            "session {} playing {} segments from {:.2}s",
            session,
            schedule.segments.len(),
            schedule.skip_offset
        );

        self.spawn_monitor(session, schedule.segments.len(), receiver);
        Ok(schedule)
    }

    /// Halt the current session and release its resource.
    ///
    /// Safe to call at any time and any number of times.
    pub fn stop(&self) {
        let stopped = {
            let _state = self.state.lock().unwrap();
            self.abort.lock().unwrap().store(true, Ordering::SeqCst);
            self.session_id.fetch_add(1, Ordering::SeqCst) + 1
        };
        let released = self.release_resource();
        *self.started_at.lock().unwrap() = None;

        let mut state = self.state.lock().unwrap();
        // A newer `play` owns the state now.
        if !self.is_current(stopped) {
            return;
        }
        if *state != TransportState::Idle || released {
            info!("stopped ({:?} -> Idle)", *state);
        }
        *state = TransportState::Idle;
    }

    fn is_current(&self, session: u64) -> bool {
        self.session_id.load(Ordering::SeqCst) == session
    }

    fn set_state(&self, state: TransportState) {
        *self.state.lock().unwrap() = state;
    }

    /// Release the held resource, if any. True when one was released.
    fn release_resource(&self) -> bool {
        let taken = self.resource.lock().unwrap().take();
        match taken {
            Some(mut resource) => {
                resource.release();
                debug!("output resource released");
                true
            }
            None => false,
        }
    }

    /// Failure cleanup for a session that never reached `Playing`.
    fn abandon(&self, session: u64) -> bool {
        if !self.is_current(session) {
            return false;
        }
        self.release_resource();
        self.set_state(TransportState::Idle);
        true
    }

    fn complete(&self, session: u64) {
        let taken = {
            let mut slot = self.resource.lock().unwrap();
            if !self.is_current(session) {
                return;
            }
            slot.take()
        };
        if let Some(mut resource) = taken {
            resource.release();
        }

        let mut state = self.state.lock().unwrap();
        if self.is_current(session) {
            *state = TransportState::Completed;
            info!("session {} completed", session);
        }
    }

    /// Wait for every segment's end signal, then complete the session.
    fn spawn_monitor(&self, session: u64, expected: usize, receiver: Receiver<SegmentEnded>) {
        let transport = self.clone();
        thread::spawn(move || {
            let mut ended = HashSet::with_capacity(expected);
            while ended.len() < expected {
                if !transport.is_current(session) {
                    return;
                }
                match receiver.recv_timeout(Duration::from_millis(20)) {
                    Ok(event) if event.session == session => {
                        debug!("segment {} ended", event.position);
                        ended.insert(event.position);
                    }
                    Ok(_) | Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            transport.complete(session);
        });
    }
}

/// Sources of every track the order uses, or the first reason one is
/// unusable.
fn check_sources(request: &PlayRequest) -> Result<Vec<(usize, &TrackSource)>, ConfigurationError> {
    if request.features.len() != request.sources.len() {
        return Err(ConfigurationError::FeatureCount {
            expected: request.sources.len(),
            found: request.features.len(),
        });
    }
    let mut sources = Vec::with_capacity(request.plan.order.len());
    for &track in &request.plan.order {
        match request.sources.get(track) {
            Some(Some(TrackSource::Remote(_))) => {
                return Err(ConfigurationError::RemoteSource { track })
            }
            Some(Some(source)) => sources.push((track, source)),
            Some(None) => return Err(ConfigurationError::MissingSource { track }),
            None => return Err(ConfigurationError::InvalidTrackIndex(track)),
        }
    }
    Ok(sources)
}

/// Decode every source on its own thread. All must succeed.
fn decode_tracks(
    sources: &[(usize, &TrackSource)],
    format: OutputFormat,
    abort: &AtomicBool,
) -> Result<BTreeMap<usize, DecodedBuffer>, ScheduleError> {
    let results: Vec<(usize, Result<DecodedBuffer, DecodeError>)> = thread::scope(|scope| {
        let handles: Vec<_> = sources
            .iter()
            .map(|&(track, source)| (track, scope.spawn(move || source.decode(format, abort))))
            .collect();
        handles
            .into_iter()
            .map(|(track, handle)| {
                let result = handle
                    .join()
                    .unwrap_or_else(|_| Err(DecodeError::Decode("decoder thread panicked".to_string())));
                (track, result)
            })
            .collect()
    });

    let mut decoded = BTreeMap::new();
    let mut cancelled = false;
    for (track, result) in results {
        match result {
            Ok(buffer) => {
                debug!("track {} decoded ({:.2}s)", track, buffer.duration_sec());
                decoded.insert(track, buffer);
            }
            Err(DecodeError::Cancelled) => cancelled = true,
            Err(err) => {
                return Err(ScheduleError::Decode {
                    track,
                    reason: err.to_string(),
                })
            }
        }
    }
    if cancelled || abort.load(Ordering::SeqCst) {
        return Err(ScheduleError::Cancelled);
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{MixPlan, TransitionPlan, TransitionSound};
    use crate::render::Voice;
    use crate::schedule::PlaybackStart;
    use std::io::Cursor;
    use std::sync::atomic::AtomicUsize;
    use std::thread::JoinHandle;

    const RATE: u32 = 8_000;

    #[derive(Default)]
    struct Counters {
        acquired: AtomicUsize,
        released: AtomicUsize,
    }

    /// Backend that either drains voices on a thread (as fast as possible)
    /// or holds them until released.
    struct RecordingBackend {
        counters: Arc<Counters>,
        drain: bool,
    }

    struct RecordingResource {
        counters: Arc<Counters>,
        drain: bool,
        held: Vec<Voice>,
        drainer: Option<JoinHandle<()>>,
    }

    impl OutputBackend for RecordingBackend {
        fn acquire(&self, _format: OutputFormat) -> Result<Box<dyn OutputResource>, ScheduleError> {
            self.counters.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(RecordingResource {
                counters: self.counters.clone(),
                drain: self.drain,
                held: Vec::new(),
                drainer: None,
            }))
        }
    }

    impl OutputResource for RecordingResource {
        fn start(&mut self, voices: Vec<Voice>) -> Result<(), ScheduleError> {
            if self.drain {
                self.drainer = Some(thread::spawn(move || {
                    for voice in voices {
                        voice.for_each(drop);
                    }
                }));
            } else {
                self.held = voices;
            }
            Ok(())
        }

        fn release(&mut self) {
            self.held.clear();
            self.counters.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn transport(drain: bool) -> (Transport, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let config = ScheduleConfig {
            output_sample_rate: RATE,
            ..ScheduleConfig::default()
        };
        let backend = Arc::new(RecordingBackend {
            counters: counters.clone(),
            drain,
        });
        let cues = Arc::new(SynthCueProvider::new(RATE).with_seed(3));
        (Transport::new(config, backend, cues), counters)
    }

    fn wav(seconds: f64) -> TrackSource {
        wav_at(seconds, RATE)
    }

    fn wav_at(seconds: f64, sample_rate: u32) -> TrackSource {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("writer");
            for _ in 0..(seconds * sample_rate as f64) as usize * 2 {
                writer.write_sample(8_000_i16).expect("sample");
            }
            writer.finalize().expect("finalize");
        }
        TrackSource::bytes(cursor.into_inner(), Some("wav"))
    }

    fn request(sources: Vec<Option<TrackSource>>) -> PlayRequest {
        let plan = MixPlan::new(
            vec![0, 1],
            vec![TransitionPlan::new(1.0, 0.5).with_sound(TransitionSound::Silent)],
        );
        let features = vec![TrackFeatures::with_duration(2.0); sources.len()];
        PlayRequest::new(plan, features, sources)
    }

    #[test]
    fn natural_completion_releases_once() {
        let (transport, counters) = transport(true);
        let schedule = transport
            .play(request(vec![Some(wav(2.0)), Some(wav(2.0))]))
            .expect("play");
        assert_eq!(schedule.segments.len(), 2);

        assert_eq!(transport.wait_until_done(), TransportState::Completed);
        assert_eq!(counters.acquired.load(Ordering::SeqCst), 1);
        assert_eq!(counters.released.load(Ordering::SeqCst), 1);
        assert!((transport.position() - 3.0).abs() < 1e-6);

        transport.stop();
        assert_eq!(transport.state(), TransportState::Idle);
        assert_eq!(counters.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_is_idempotent() {
        let (transport, counters) = transport(false);
        transport.stop();
        assert_eq!(counters.released.load(Ordering::SeqCst), 0);

        transport
            .play(request(vec![Some(wav(2.0)), Some(wav(2.0))]))
            .expect("play");
        assert_eq!(transport.state(), TransportState::Playing);

        let handle = transport.clone();
        handle.stop();
        transport.stop();
        assert_eq!(transport.state(), TransportState::Idle);
        assert_eq!(counters.released.load(Ordering::SeqCst), 1);
        assert_eq!(transport.position(), 0.0);
    }

    #[test]
    fn new_play_stops_the_running_session() {
        let (transport, counters) = transport(false);
        transport
            .play(request(vec![Some(wav(2.0)), Some(wav(2.0))]))
            .expect("first");
        transport
            .play(
                request(vec![Some(wav(2.0)), Some(wav(2.0))])
                    .starting_at(PlaybackStart::FirstTransition),
            )
            .expect("second");
        assert_eq!(counters.acquired.load(Ordering::SeqCst), 2);
        assert_eq!(counters.released.load(Ordering::SeqCst), 1);
        assert_eq!(transport.schedule().map(|s| s.skip_offset), Some(1.0));
        transport.stop();
        assert_eq!(counters.released.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stop_during_decode_cancels_without_acquiring() {
        let (transport, counters) = transport(false);
        // Resampling a long 48 kHz file down to the output rate keeps the
        // decoders busy while `stop` lands.
        let long = wav_at(60.0, 48_000);
        let player = transport.clone();
        let handle = thread::spawn(move || player.play(request(vec![Some(long.clone()), Some(long)])));

        let deadline = Instant::now() + Duration::from_secs(10);
        while transport.state() != TransportState::Scheduled && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        transport.stop();

        let result = handle.join().expect("play thread");
        assert!(matches!(result, Err(ScheduleError::Cancelled)));
        assert_eq!(transport.state(), TransportState::Idle);
        assert_eq!(counters.acquired.load(Ordering::SeqCst), 0);
        assert_eq!(counters.released.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn racing_stop_never_leaves_the_transport_scheduled() {
        let (transport, counters) = transport(false);
        for _ in 0..25 {
            let player = transport.clone();
            let handle =
                thread::spawn(move || player.play(request(vec![Some(wav(2.0)), Some(wav(2.0))])));
            transport.stop();
            let result = handle.join().expect("play thread");

            match result {
                Ok(_) => assert!(matches!(
                    transport.state(),
                    TransportState::Playing | TransportState::Idle
                )),
                Err(err) => {
                    assert!(matches!(err, ScheduleError::Cancelled), "{}", err);
                    assert_eq!(transport.state(), TransportState::Idle);
                }
            }
            transport.stop();
            assert_eq!(transport.wait_until_done(), TransportState::Idle);
        }
        assert_eq!(
            counters.acquired.load(Ordering::SeqCst),
            counters.released.load(Ordering::SeqCst)
        );
    }

    #[test]
    fn remote_and_missing_sources_are_rejected_before_decoding() {
        let (transport, counters) = transport(true);
        let err = transport
            .play(request(vec![
                Some(wav(2.0)),
                Some(TrackSource::Remote("spotify:track:1".to_string())),
            ]))
            .expect_err("remote");
        assert!(matches!(
            err,
            ScheduleError::Configuration(ConfigurationError::RemoteSource { track: 1 })
        ));

        let err = transport
            .play(request(vec![None, Some(wav(2.0))]))
            .expect_err("missing");
        assert!(matches!(
            err,
            ScheduleError::Configuration(ConfigurationError::MissingSource { track: 0 })
        ));
        assert_eq!(transport.state(), TransportState::Idle);
        assert_eq!(counters.acquired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn undecodable_track_aborts_the_whole_play() {
        let (transport, counters) = transport(true);
        let err = transport
            .play(request(vec![
                Some(wav(2.0)),
                Some(TrackSource::bytes(vec![1, 2, 3, 4], None)),
            ]))
            .expect_err("garbage");
        assert!(matches!(err, ScheduleError::Decode { track: 1, .. }));
        assert_eq!(transport.state(), TransportState::Idle);
        assert_eq!(counters.acquired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn start_past_the_end_completes_immediately() {
        let (transport, counters) = transport(false);
        let schedule = transport
            .play(
                request(vec![Some(wav(2.0)), Some(wav(2.0))]).starting_at(PlaybackStart::At(60.0)),
            )
            .expect("play");
        assert!(schedule.is_empty());
        assert_eq!(transport.wait_until_done(), TransportState::Completed);
        assert_eq!(counters.released.load(Ordering::SeqCst), 1);
    }
}
