use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::command::{command_failed, display_command, drain_pipe, terminate_child, TERMINATE_GRACE};
use crate::config::{ContainerFormat, EncoderKind, OutputConfig};
use crate::error::Error;
use crate::progress::ProgressReporter;

/// How often the cancel flag is checked while the encoder is silent.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[cfg(windows)]
const BELOW_NORMAL_PRIORITY_CLASS: u32 = 0x0000_4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeStatus {
    Completed,
    Cancelled,
}

/// Produces `output` from `input`. The finalizer only ever looks at the files
/// an encoder leaves behind, so any implementation can stand in.
pub trait Encoder: Send + Sync {
    fn encode(
        &self,
        input: &Path,
        output: &Path,
        options: &OutputConfig,
        cancel: &CancelFlag,
        reporter: &dyn ProgressReporter,
    ) -> Result<EncodeStatus, Error>;
}

/// [`Encoder`] that drives `HandBrakeCLI`.
#[derive(Debug, Clone)]
pub struct HandBrakeEncoder {
    program: PathBuf,
}

impl HandBrakeEncoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn build_command(&self, input: &Path, output: &Path, options: &OutputConfig) -> Command {
        let mut command = if cfg!(unix) {
            let mut nice = Command::new("nice");
            nice.args(["-n", "10"]).arg(&self.program);
            nice
        } else {
            Command::new(&self.program)
        };

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            command.creation_flags(BELOW_NORMAL_PRIORITY_CLASS);
        }

        command
            .arg("-i")
            .arg(input)
            .arg("-o")
            .arg(output)
            .args(["-e", handbrake_encoder_name(options.encoder)])
            .args(["--encoder-preset", &options.preset])
            .args(["-q", &options.quality.to_string()])
            .args(["-f", handbrake_format_name(options.format)])
            .args(["--all-audio", "--aencoder", "copy", "--all-subtitles"]);
        command
    }
}

impl Encoder for HandBrakeEncoder {
    fn encode(
        &self,
        input: &Path,
        output: &Path,
        options: &OutputConfig,
        cancel: &CancelFlag,
        reporter: &dyn ProgressReporter,
    ) -> Result<EncodeStatus, Error> {
        let mut command = self.build_command(input, output, options);
        info!("Running command: {}", display_command(&command));

        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => Error::ToolNotFound(self.program.display().to_string()),
                _ => Error::Io(err),
            })?;

        let stderr_reader = drain_pipe(child.stderr.take());
        let (sender, lines) = crossbeam_channel::unbounded();
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, sender);
        }

        let mut last_percent = None;
        loop {
            if cancel.is_cancelled() {
                info!("Cancelling encode of {}", input.display());
                let status = terminate_child(&mut child, TERMINATE_GRACE)?;
                debug!("Encoder stopped with {}", status);
                return Ok(EncodeStatus::Cancelled);
            }

            match lines.recv_timeout(POLL_INTERVAL) {
                Ok(line) => match parse_progress(&line) {
                    Some(percent) => {
                        if last_percent != Some(percent) {
                            reporter.on_encode_progress(percent);
                            last_percent = Some(percent);
                        }
                    }
                    None => debug!("HandBrakeCLI: {}", line),
                },
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let status = child.wait()?;
        let stderr = stderr_reader.join().unwrap_or_default();
        if !status.success() {
            warn!("Encoding failed for {} with {}", input.display(), status);
            return Err(command_failed(&self.program, status, &stderr));
        }

        info!("Encoding finished: {}", output.display());
        Ok(EncodeStatus::Completed)
    }
}

fn handbrake_encoder_name(encoder: EncoderKind) -> &'static str {
    match encoder {
        EncoderKind::X265 => "x265",
        EncoderKind::X265TenBit => "x265_10bit",
        EncoderKind::NvencHevc => "nvenc_h265",
    }
}

fn handbrake_format_name(format: ContainerFormat) -> &'static str {
    match format {
        ContainerFormat::Mkv => "av_mkv",
        ContainerFormat::Mp4 => "av_mp4",
    }
}

/// HandBrakeCLI rewrites its progress line with `\r`, so both `\r` and `\n`
/// end a line here.
fn spawn_line_reader<R: Read + Send + 'static>(mut pipe: R, sender: Sender<String>) {
    thread::spawn(move || {
        let mut pending = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = match pipe.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            };
            for &byte in &chunk[..n] {
                if byte == b'\r' || byte == b'\n' {
                    if !pending.is_empty() {
                        let line = String::from_utf8_lossy(&pending).into_owned();
                        pending.clear();
                        if sender.send(line).is_err() {
                            return;
                        }
                    }
                } else {
                    pending.push(byte);
                }
            }
        }
        if !pending.is_empty() {
            let _ = sender.send(String::from_utf8_lossy(&pending).into_owned());
        }
    });
}

/// `Encoding: task 1 of 1, 42.17 % (35.10 fps, ...)` → `42.17`
pub fn parse_progress(line: &str) -> Option<f32> {
    let rest = line.trim_start().strip_prefix("Encoding:")?;
    let before_percent = rest[..rest.find('%')?].trim_end();
    let number = before_percent.rsplit([' ', ',']).next()?;
    number.parse::<f32>().ok().filter(|p| (0.0..=100.0).contains(p))
}
