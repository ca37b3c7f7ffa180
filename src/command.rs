use std::ffi::OsStr;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::time::Duration;

use tracing::{error, info, warn};
use wait_timeout::ChildExt;

use crate::error::Error;

/// Longest stdout/stderr excerpt written to the log for a single command.
pub const MAX_LOGGED_OUTPUT: usize = 2000;

pub const DEPENDENCY_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a terminated child gets to exit before it is killed outright.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyStatus {
    Available,
    NotFound,
    Invalid,
    TimedOut,
}

pub fn display_command(command: &Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!(
        "{}... [output truncated, total length: {} chars]",
        head, total
    )
}

fn log_output(output: &Output) {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stdout = stdout.trim();
    if !stdout.is_empty() {
        info!("Command stdout: {}", truncate_for_log(stdout, MAX_LOGGED_OUTPUT));
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        // some tools write their normal output to stderr
        if output.status.success() {
            info!("Command stderr: {}", truncate_for_log(stderr, MAX_LOGGED_OUTPUT));
        } else {
            error!("Command stderr: {}", truncate_for_log(stderr, MAX_LOGGED_OUTPUT));
        }
    }

    info!("Command exit code: {:?}", output.status.code());
}

fn spawn_error(command: &Command, err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::NotFound => {
            Error::ToolNotFound(command.get_program().to_string_lossy().into_owned())
        }
        _ => Error::Io(err),
    }
}

/// Run a command to completion, capturing and logging its output.
/// A non-zero exit status is returned as `Ok`; callers decide what it means.
pub fn run_command(command: &mut Command) -> Result<Output, Error> {
    info!("Running command: {}", display_command(command));

    let output = command
        .stdin(Stdio::null())
        .output()
        .map_err(|err| spawn_error(command, err))?;

    log_output(&output);
    Ok(output)
}

/// Like [`run_command`], but kills the child if it runs longer than `timeout`.
pub fn run_command_with_timeout(command: &mut Command, timeout: Duration) -> Result<Output, Error> {
    info!("Running command: {}", display_command(command));

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| spawn_error(command, err))?;

    // drain both pipes on helper threads so a chatty child cannot block on a full pipe
    let stdout_reader = drain_pipe(child.stdout.take());
    let stderr_reader = drain_pipe(child.stderr.take());

    let status = match child.wait_timeout(timeout)? {
        Some(status) => status,
        None => {
            warn!(
                "Command timed out after {}s: {}",
                timeout.as_secs(),
                display_command(command)
            );
            let _kill_error = child.kill();
            let _wait_error = child.wait();
            return Err(Error::Io(io::Error::from(io::ErrorKind::TimedOut)));
        }
    };

    let output = Output {
        status,
        stdout: stdout_reader.join().unwrap_or_default(),
        stderr: stderr_reader.join().unwrap_or_default(),
    };
    log_output(&output);
    Ok(output)
}

pub(crate) fn drain_pipe<R: Read + Send + 'static>(pipe: Option<R>) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _read_error = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

pub fn command_failed(program: &Path, status: ExitStatus, stderr: &[u8]) -> Error {
    let stderr = String::from_utf8_lossy(stderr);
    Error::CommandFailed {
        program: program.display().to_string(),
        status,
        stderr: truncate_for_log(stderr.trim(), 500),
    }
}

/// Ask a child to stop, escalating to a hard kill if it ignores the request.
pub fn terminate_child(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    #[cfg(unix)]
    {
        if let Ok(pid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: kill(2) has no memory-safety preconditions; the pid belongs
            // to a child we have not yet reaped.
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }
        if let Some(status) = child.wait_timeout(grace)? {
            return Ok(status);
        }
        warn!("Process {} ignored SIGTERM, killing it", child.id());
    }

    #[cfg(not(unix))]
    let _ = grace;

    child.kill()?;
    child.wait()
}

/// Check that `program` runs. HandBrakeCLI answers `--version`, ffmpeg and
/// ffprobe answer `-version`, so both are tried.
pub fn check_dependency(program: &Path) -> DependencyStatus {
    let mut last = DependencyStatus::Invalid;
    for flag in ["--version", "-version"] {
        let mut command = Command::new(program);
        command.arg(flag);
        match run_command_with_timeout(&mut command, DEPENDENCY_CHECK_TIMEOUT) {
            Ok(output) if output.status.success() => return DependencyStatus::Available,
            Ok(_) => last = DependencyStatus::Invalid,
            Err(Error::ToolNotFound(_)) => return DependencyStatus::NotFound,
            Err(Error::Io(err)) if err.kind() == io::ErrorKind::TimedOut => {
                last = DependencyStatus::TimedOut
            }
            Err(_) => last = DependencyStatus::Invalid,
        }
    }
    last
}

/// Check every external tool, logging each one that is missing.
pub fn validate_dependencies(tools: &[(&str, &Path)]) -> bool {
    let missing: Vec<String> = tools
        .iter()
        .filter_map(|(name, path)| match check_dependency(path) {
            DependencyStatus::Available => None,
            status => Some(format!("{} (path: {}, {:?})", name, path.display(), status)),
        })
        .collect();

    if !missing.is_empty() {
        error!("Missing dependencies: {}", missing.join(", "));
        error!("Please install the required dependencies or set their paths in the config file.");
    }

    missing.is_empty()
}

/// Decide which executable to run for a dependency.
///
/// An absolute configured path that exists wins, then an executable of the
/// same name shipped next to our own binary, then the configured value (or
/// the bare name) for `PATH` lookup.
pub fn find_dependency_path(name: &str, configured: Option<&str>) -> PathBuf {
    if let Some(configured) = configured {
        let configured_path = Path::new(configured);
        if configured_path.is_absolute() && configured_path.exists() {
            info!("Using absolute config path for {}: {}", name, configured);
            return configured_path.to_path_buf();
        }
    }

    let exe_name = if cfg!(windows) && !name.ends_with(".exe") {
        format!("{}.exe", name)
    } else {
        name.to_string()
    };
    let bundled = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&exe_name)))
        .filter(|candidate| candidate.is_file());
    if let Some(bundled) = bundled {
        info!("Found bundled dependency: {}", bundled.display());
        return bundled;
    }

    PathBuf::from(configured.unwrap_or(name))
}
