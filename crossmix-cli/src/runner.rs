use std::{
    io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread::{self, sleep},
    time::Duration,
};

use clap::ArgMatches;
use crossmix_lib::{
    audio::{decode_file, DecodedBuffer, OutputFormat},
    cues::{CueAssetProvider, CueBank, DirectoryCueProvider, SynthCueProvider},
    features::{features_from_path, normalize_features, TrackFeatures},
    plan::{snap_to_phrases, MixPlan},
    render::{render_offline, DeviceBackend},
    stems::{LocalStemRenderer, StemFadePlan, StemRenderRequest},
    build_schedule, ConfigurationError, PlayRequest, PlaybackStart, ScheduleConfig, ScheduleError,
    TrackSource, Transport, TransportState,
};
use crossterm::{
    cursor, execute,
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::{info, warn};
use ratatui::{backend::CrosstermBackend, Terminal};

use crate::{
    controls::{self, KeyAction},
    logging::{self, LogBuffer},
    ui,
};

pub fn run(args: &ArgMatches, log_buffer: LogBuffer) -> Result<i32, ScheduleError> {
    match args.subcommand() {
        Some(("schedule", sub)) => run_schedule(sub),
        Some(("render", sub)) => run_render(sub),
        Some(("play", sub)) => run_play(sub, log_buffer),
        Some(("stems", sub)) => run_stems(sub),
        Some(("create", sub)) => run_create(sub),
        _ => Ok(2),
    }
}

/// Plan, features, config and start mode shared by the mix commands.
struct MixInputs {
    plan: MixPlan,
    features: Vec<TrackFeatures>,
    config: ScheduleConfig,
    start: PlaybackStart,
    snap: bool,
}

fn load_inputs(args: &ArgMatches) -> Result<MixInputs, ScheduleError> {
    let plan = MixPlan::from_path(required_path(args, "plan"))?;
    let features = features_from_path(required_path(args, "features"))?;
    let config = match args.get_one::<String>("config") {
        Some(path) => ScheduleConfig::from_path(path)?,
        None => ScheduleConfig::default(),
    };
    let start = if args.get_flag("first-transition") {
        PlaybackStart::FirstTransition
    } else {
        args.get_one::<f64>("start-at")
            .map(|seconds| PlaybackStart::At(*seconds))
            .unwrap_or_default()
    };
    Ok(MixInputs {
        plan,
        features,
        config,
        start,
        snap: args.get_flag("snap"),
    })
}

fn required_path(args: &ArgMatches, id: &str) -> PathBuf {
    args.get_one::<String>(id)
        .map(PathBuf::from)
        .unwrap_or_default()
}

fn track_paths(args: &ArgMatches) -> Vec<PathBuf> {
    args.get_many::<String>("tracks")
        .map(|values| values.map(PathBuf::from).collect())
        .unwrap_or_default()
}

fn cue_provider(args: &ArgMatches, config: &ScheduleConfig) -> Arc<dyn CueAssetProvider> {
    match args.get_one::<String>("cues") {
        Some(dir) => Arc::new(DirectoryCueProvider::new(dir)),
        None => Arc::new(SynthCueProvider::from_config(config)),
    }
}

fn run_schedule(args: &ArgMatches) -> Result<i32, ScheduleError> {
    let inputs = load_inputs(args)?;
    let features: Vec<TrackFeatures> = inputs
        .features
        .iter()
        .map(|raw| normalize_features(raw, None, &inputs.config))
        .collect();
    let plan = if inputs.snap {
        snap_to_phrases(&inputs.plan, &features, &inputs.config)
    } else {
        inputs.plan
    };
    let schedule = build_schedule(&plan, &features, inputs.start, &inputs.config)?;
    println!("{}", serde_json::to_string_pretty(&schedule)?);
    Ok(0)
}

fn run_render(args: &ArgMatches) -> Result<i32, ScheduleError> {
    let inputs = load_inputs(args)?;
    let paths = track_paths(args);
    if paths.len() != inputs.features.len() {
        return Err(ConfigurationError::FeatureCount {
            expected: paths.len(),
            found: inputs.features.len(),
        }
        .into());
    }

    let format = OutputFormat::new(inputs.config.output_sample_rate, inputs.config.output_channels);
    let tracks = decode_tracks(&paths, format)?;
    let features: Vec<TrackFeatures> = inputs
        .features
        .iter()
        .zip(&tracks)
        .map(|(raw, buffer)| normalize_features(raw, Some(buffer.duration_sec()), &inputs.config))
        .collect();
    let plan = if inputs.snap {
        snap_to_phrases(&inputs.plan, &features, &inputs.config)
    } else {
        inputs.plan
    };
    let schedule = build_schedule(&plan, &features, inputs.start, &inputs.config)?;

    let cues = CueBank::new(cue_provider(args, &inputs.config), format);
    let mix = render_offline(&schedule, &tracks, &cues, &inputs.config)?;
    let out = required_path(args, "out");
    mix.write_wav(&out)?;

    println!(
        "Rendered {:.2}s from {:.2}s to {} (peak {:.3}, {} clipped samples)",
        mix.duration_sec(),
        mix.skip_offset,
        out.display(),
        mix.peak(),
        mix.clipped_samples
    );
    Ok(0)
}

fn decode_tracks(paths: &[PathBuf], format: OutputFormat) -> Result<Vec<DecodedBuffer>, ScheduleError> {
    paths
        .iter()
        .enumerate()
        .map(|(track, path)| {
            let buffer = decode_file(path, format, None).map_err(|err| ScheduleError::Decode {
                track,
                reason: err.to_string(),
            })?;
            info!("track {} decoded: {} ({:.2}s)", track, path.display(), buffer.duration_sec());
            Ok(buffer)
        })
        .collect()
}

fn run_play(args: &ArgMatches, log_buffer: LogBuffer) -> Result<i32, ScheduleError> {
    let inputs = load_inputs(args)?;
    let sources: Vec<Option<TrackSource>> = track_paths(args)
        .into_iter()
        .map(|path| Some(TrackSource::File(path)))
        .collect();
    let provider = cue_provider(args, &inputs.config);
    let transport = Transport::new(inputs.config, Arc::new(DeviceBackend), provider);
    let request = PlayRequest::new(inputs.plan, inputs.features, sources)
        .starting_at(inputs.start)
        .with_phrase_snap(inputs.snap);

    if args.get_flag("quiet") {
        let schedule = transport.play(request)?;
        println!(
            "Playing {} segments from {:.2}s",
            schedule.segments.len(),
            schedule.skip_offset
        );
        let state = transport.wait_until_done();
        info!("finished in state {:?}", state);
        return Ok(0);
    }

    let launcher = Launcher::new(transport.clone());
    launcher.launch(request.clone());

    let _raw_mode = RawModeGuard::enable().ok();
    let mut terminal = {
        let mut stdout = io::stdout();
        let _ = execute!(stdout, EnterAlternateScreen, cursor::Hide);
        Terminal::new(CrosstermBackend::new(stdout)).ok()
    };
    let title = format!("{} tracks", request.plan.order.len());

    // UI / input loop.
    let result = loop {
        if let Some(term) = terminal.as_mut() {
            let log_lines = logging::snapshot(&log_buffer);
            let view = controls::mix_view(controls::StatusArgs::from_transport(
                &transport,
                launcher.is_pending(),
            ));
            ui::draw_status(term, &title, &view, &log_lines);
        }

        if let Some(err) = launcher.take_failure() {
            transport.stop();
            break Err(err);
        }

        match controls::handle_key_event(&transport) {
            KeyAction::Quit => break Ok(0),
            KeyAction::Restart(start) => launcher.launch(request.clone().starting_at(start)),
            KeyAction::Continue => {}
        }

        let active = matches!(
            transport.state(),
            TransportState::Scheduled | TransportState::Playing
        );
        if !active && !launcher.is_pending() {
            break Ok(0);
        }

        sleep(Duration::from_millis(50));
    };

    transport.stop();

    // Restore the terminal state before exiting.
    if let Some(mut term) = terminal {
        let _ = term.show_cursor();
        let stdout = term.backend_mut();
        let _ = execute!(stdout, LeaveAlternateScreen, cursor::Show);
    }

    result
}

/// Runs `Transport::play` off the UI thread so decoding never blocks input.
struct Launcher {
    transport: Transport,
    pending: Arc<AtomicUsize>,
    failure: Arc<Mutex<Option<ScheduleError>>>,
}

impl Launcher {
    fn new(transport: Transport) -> Self {
        Self {
            transport,
            pending: Arc::new(AtomicUsize::new(0)),
            failure: Arc::new(Mutex::new(None)),
        }
    }

    fn launch(&self, request: PlayRequest) {
        let transport = self.transport.clone();
        let pending = self.pending.clone();
        let failure = self.failure.clone();
        pending.fetch_add(1, Ordering::SeqCst);
        thread::spawn(move || {
            match transport.play(request) {
                Ok(_) | Err(ScheduleError::Cancelled) => {}
                Err(err) => *failure.lock().unwrap() = Some(err),
            }
            pending.fetch_sub(1, Ordering::SeqCst);
        });
    }

    fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }

    fn take_failure(&self) -> Option<ScheduleError> {
        self.failure.lock().unwrap().take()
    }
}

fn run_stems(args: &ArgMatches) -> Result<i32, ScheduleError> {
    let crossfade = args.get_one::<f64>("crossfade").copied().unwrap_or(16.0);
    let sample_rate = args.get_one::<u32>("sample-rate").copied().unwrap_or(44_100);
    let request = StemRenderRequest {
        file_a: required_path(args, "a"),
        file_b: required_path(args, "b"),
        transition_start_a: args.get_one::<f64>("start").copied().unwrap_or(0.0),
        crossfade_duration_sec: crossfade,
        bpm_a: args.get_one::<f64>("bpm-a").copied().unwrap_or(120.0),
        bpm_b: args.get_one::<f64>("bpm-b").copied().unwrap_or(120.0),
        style: args
            .get_one::<String>("style")
            .cloned()
            .unwrap_or_else(|| "club".to_string()),
    };

    let mut renderer = LocalStemRenderer::new(sample_rate);
    if let Some(path) = args.get_one::<String>("stem-plan") {
        renderer = renderer.with_plan(load_stem_plan(Path::new(path), crossfade)?);
    }
    let buffer = renderer.render_buffer(&request)?;
    if buffer.frames() == 0 {
        warn!("stem transition rendered no audio");
    }
    let out = required_path(args, "out");
    buffer.write_wav(&out)?;
    println!("Rendered {:.2}s stem transition to {}", buffer.duration_sec(), out.display());
    Ok(0)
}

fn load_stem_plan(path: &Path, crossfade: f64) -> Result<StemFadePlan, ScheduleError> {
    let text = std::fs::read_to_string(path)?;
    StemFadePlan::from_json_str(&text, crossfade)
}

fn run_create(args: &ArgMatches) -> Result<i32, ScheduleError> {
    match args.subcommand() {
        Some(("config", _)) => {
            println!("{}", serde_json::to_string_pretty(&ScheduleConfig::default())?);
            Ok(0)
        }
        Some(("stem-plan", sub)) => {
            let crossfade = sub.get_one::<f64>("crossfade").copied().unwrap_or(16.0);
            let plan = StemFadePlan::default_for(crossfade);
            println!("{}", serde_json::to_string_pretty(&plan.to_json_value())?);
            Ok(0)
        }
        _ => Ok(2),
    }
}

struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}
