//! Live output on the default audio device.

use log::{error, info, warn};
use rodio::{OutputStream, OutputStreamBuilder, Sink};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::OutputFormat;
use crate::error::ScheduleError;

use super::{OutputBackend, OutputResource, Voice};

const OUTPUT_STREAM_OPEN_RETRIES: usize = 20;
const OUTPUT_STREAM_OPEN_RETRY_MS: u64 = 100;

enum OutputCommand {
    Start(Vec<Voice>),
    Release,
}

/// Opens the default rodio output stream for each session.
///
/// The stream lives on a dedicated output thread for the whole session and
/// is dropped when the session's resource is released.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceBackend;

impl OutputBackend for DeviceBackend {
    fn acquire(&self, format: OutputFormat) -> Result<Box<dyn OutputResource>, ScheduleError> {
        let (commands, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("xmix-output".to_string())
            .spawn(move || run_output_thread(format, command_rx, ready_tx))?;

        match ready_rx.recv() {
            Ok(true) => Ok(Box::new(DeviceOutput {
                commands,
                handle: Some(handle),
            })),
            _ => {
                let _ = handle.join();
                Err(ScheduleError::Output(
                    "failed to open default output stream".to_string(),
                ))
            }
        }
    }
}

struct DeviceOutput {
    commands: Sender<OutputCommand>,
    handle: Option<JoinHandle<()>>,
}

impl OutputResource for DeviceOutput {
    fn start(&mut self, voices: Vec<Voice>) -> Result<(), ScheduleError> {
        self.commands
            .send(OutputCommand::Start(voices))
            .map_err(|_| ScheduleError::Output("output thread is gone".to_string()))
    }

    fn release(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.commands.send(OutputCommand::Release);
        if handle.join().is_err() {
            error!("output thread panicked");
        }
    }
}

impl Drop for DeviceOutput {
    fn drop(&mut self) {
        self.release();
    }
}

fn run_output_thread(
    format: OutputFormat,
    commands: Receiver<OutputCommand>,
    ready: Sender<bool>,
) {
    let Some(mut stream) = open_output_stream_with_retry() else {
        let _ = ready.send(false);
        return;
    };
    stream.log_on_drop(false);
    let _ = ready.send(true);
    info!("output stream opened");

    let mut sink: Option<Sink> = None;
    while let Ok(command) = commands.recv() {
        match command {
            OutputCommand::Start(voices) => {
                // Voices added before the session source is attached all
                // start on the same output sample.
                let (session, source) = rodio::mixer::mixer(format.channels, format.sample_rate);
                let count = voices.len();
                for voice in voices {
                    session.add(voice);
                }
                let session_sink = Sink::connect_new(stream.mixer());
                session_sink.append(source);
                sink = Some(session_sink);
                info!("started {} voices", count);
            }
            OutputCommand::Release => break,
        }
    }

    if let Some(sink) = sink.take() {
        sink.stop();
    }
    drop(stream);
    info!("output stream released");
}

/// Open the default output stream with bounded retry behavior.
///
/// # Returns
///
/// `Some(OutputStream)` on success, `None` after the final failed attempt.
fn open_output_stream_with_retry() -> Option<OutputStream> {
    for attempt in 1..=OUTPUT_STREAM_OPEN_RETRIES {
        match OutputStreamBuilder::open_default_stream() {
            Ok(stream) => return Some(stream),
            Err(err) => {
                if attempt == OUTPUT_STREAM_OPEN_RETRIES {
                    error!(
                        "failed to open default output stream after {} attempts: {}",
                        OUTPUT_STREAM_OPEN_RETRIES, err
                    );
                    return None;
                }
                warn!(
                    "open_default_stream attempt {}/{} failed: {}",
                    attempt, OUTPUT_STREAM_OPEN_RETRIES, err
                );
                thread::sleep(Duration::from_millis(OUTPUT_STREAM_OPEN_RETRY_MS));
            }
        }
    }
    None
}
