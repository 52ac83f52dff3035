//! CLI argument definitions for `xmix`.

use clap::{value_parser, Arg, ArgAction, Command};

/// Plan, features and schedule options shared by every mix command.
fn schedule_args() -> Vec<Arg> {
    vec![
        Arg::new("plan")
            .long("plan")
            .short('p')
            .value_name("PATH")
            .required(true)
            .help("Mix plan JSON (order, transitions, energy_curve)"),
        Arg::new("features")
            .long("features")
            .short('f')
            .value_name("PATH")
            .required(true)
            .help("Track features JSON, a list or an object with `tracks`"),
        Arg::new("config")
            .long("config")
            .short('c')
            .value_name("PATH")
            .help("Schedule configuration JSON; missing fields take defaults"),
        Arg::new("start-at")
            .long("start-at")
            .value_name("SECONDS")
            .value_parser(value_parser!(f64))
            .conflicts_with("first-transition")
            .help("Start playback at this position on the mix timeline"),
        Arg::new("first-transition")
            .long("first-transition")
            .action(ArgAction::SetTrue)
            .help("Start just before the first transition"),
        Arg::new("snap")
            .long("snap")
            .action(ArgAction::SetTrue)
            .help("Snap transition windows to vocal phrase boundaries"),
    ]
}

fn tracks_arg() -> Arg {
    Arg::new("tracks")
        .long("tracks")
        .short('t')
        .value_name("FILE")
        .num_args(1..)
        .required(true)
        .help("Audio files, one per track index")
}

/// Build the CLI argument parser and command definitions.
pub fn build_cli() -> Command {
    Command::new("xmix")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Schedule, render and preview DJ mix transitions")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("schedule")
                .about("Print the playback schedule for a plan as JSON")
                .args(schedule_args()),
        )
        .subcommand(
            Command::new("render")
                .about("Render the mix offline to a WAV file")
                .args(schedule_args())
                .arg(tracks_arg())
                .arg(
                    Arg::new("out")
                        .long("out")
                        .short('o')
                        .value_name("PATH")
                        .required(true)
                        .help("Output WAV path"),
                )
                .arg(
                    Arg::new("cues")
                        .long("cues")
                        .value_name("DIR")
                        .help("Directory of cue clips named by sound id (default: synthesized)"),
                ),
        )
        .subcommand(
            Command::new("play")
                .about("Preview the mix on the default output device")
                .args(schedule_args())
                .arg(tracks_arg())
                .arg(
                    Arg::new("cues")
                        .long("cues")
                        .value_name("DIR")
                        .help("Directory of cue clips named by sound id (default: synthesized)"),
                )
                .arg(
                    Arg::new("quiet")
                        .long("quiet")
                        .short('q')
                        .action(ArgAction::SetTrue)
                        .help("No status view; block until the mix completes"),
                ),
        )
        .subcommand(
            Command::new("stems")
                .about("Render a stem-aware transition from separated stems")
                .arg(
                    Arg::new("a")
                        .long("a")
                        .value_name("DIR")
                        .required(true)
                        .help("Stem directory of the outgoing track"),
                )
                .arg(
                    Arg::new("b")
                        .long("b")
                        .value_name("DIR")
                        .required(true)
                        .help("Stem directory of the incoming track"),
                )
                .arg(
                    Arg::new("start")
                        .long("start")
                        .value_name("SECONDS")
                        .value_parser(value_parser!(f64))
                        .required(true)
                        .help("Seconds into the outgoing track where the transition begins"),
                )
                .arg(
                    Arg::new("crossfade")
                        .long("crossfade")
                        .value_name("SECONDS")
                        .value_parser(value_parser!(f64))
                        .required(true)
                        .help("Length of the transition window"),
                )
                .arg(
                    Arg::new("stem-plan")
                        .long("plan")
                        .value_name("PATH")
                        .help("Per-stem fade plan JSON (default: sequential vocals)"),
                )
                .arg(
                    Arg::new("bpm-a")
                        .long("bpm-a")
                        .value_name("BPM")
                        .value_parser(value_parser!(f64))
                        .default_value("120"),
                )
                .arg(
                    Arg::new("bpm-b")
                        .long("bpm-b")
                        .value_name("BPM")
                        .value_parser(value_parser!(f64))
                        .default_value("120"),
                )
                .arg(
                    Arg::new("style")
                        .long("style")
                        .value_name("STYLE")
                        .default_value("club"),
                )
                .arg(
                    Arg::new("sample-rate")
                        .long("sample-rate")
                        .value_name("HZ")
                        .value_parser(value_parser!(u32))
                        .default_value("44100"),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .short('o')
                        .value_name("PATH")
                        .required(true)
                        .help("Output WAV path"),
                ),
        )
        .subcommand(
            Command::new("create")
                .about("Emit default JSON payloads")
                .subcommand_required(true)
                .subcommand(
                    Command::new("config").about("Print the default schedule configuration"),
                )
                .subcommand(
                    Command::new("stem-plan")
                        .about("Print the default per-stem fade plan")
                        .arg(
                            Arg::new("crossfade")
                                .long("crossfade")
                                .value_name("SECONDS")
                                .value_parser(value_parser!(f64))
                                .default_value("16"),
                        ),
                ),
        )
}
