//! # xmix
//!
//! Schedule, render and preview multi-track DJ mixes from a mix plan and
//! per-track features.

use log::error;

mod cli;
mod controls;
mod logging;
mod runner;
mod ui;

fn main() {
    let args = cli::args::build_cli().get_matches();
    let log_buffer = logging::init();

    let code = match runner::run(&args, log_buffer) {
        Ok(code) => code,
        Err(err) => {
            error!("{}", err);
            eprintln!("xmix: {}", err);
            if err.is_configuration() {
                2
            } else {
                1
            }
        }
    };

    std::process::exit(code)
}
