use std::{
    ffi::OsString,
    fs::File,
    io::{self, Read},
    path::Path,
    process::{Child, Command, Stdio},
    sync::mpsc::{self, Receiver, RecvTimeoutError},
    thread,
    time::{Duration, Instant},
};

const POLL_INTERVAL: Duration = Duration::from_millis(25);
// How long output readers may drain after a timed-out child was killed.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.code == 0 && !self.timed_out
    }
}

/// Execute a program and capture stdout/stderr.
///
/// With a `timeout`, the child and everything it spawned are killed once it
/// elapses and the output is reported with `timed_out` set.
///
/// # Errors
///
/// Returns an error when the program cannot be spawned or its output streams
/// cannot be read.
pub fn run_command(
    program: &str,
    args: &[OsString],
    envs: &[(&str, &str)],
    cwd: Option<&Path>,
    timeout: Option<Duration>,
) -> io::Result<RunOutput> {
    let mut command = configured_command(program, args, envs, cwd);
    command.stdout(Stdio::piped());
    wait_with_output(command, timeout)
}

/// Execute a program with stdout redirected into `stdout`; stderr is captured.
///
/// # Errors
///
/// Returns an error when the program cannot be spawned or waited on.
pub fn run_command_to_file(
    program: &str,
    args: &[OsString],
    envs: &[(&str, &str)],
    cwd: Option<&Path>,
    stdout: File,
) -> io::Result<RunOutput> {
    let mut command = configured_command(program, args, envs, cwd);
    command.stdout(Stdio::from(stdout));
    wait_with_output(command, None)
}

fn configured_command(
    program: &str,
    args: &[OsString],
    envs: &[(&str, &str)],
    cwd: Option<&Path>,
) -> Command {
    let mut command = Command::new(program);
    command.args(args);
    for (key, value) in envs {
        command.env(key, value);
    }
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }
    command.stdin(Stdio::null());
    command.stderr(Stdio::piped());
    // Helpers such as `git-remote-https` share the child's group, so a
    // timeout can take them down together.
    #[cfg(unix)]
    std::os::unix::process::CommandExt::process_group(&mut command, 0);
    command
}

fn wait_with_output(mut command: Command, timeout: Option<Duration>) -> io::Result<RunOutput> {
    let mut child = command.spawn()?;
    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let (code, timed_out) = match timeout {
        Some(limit) => wait_with_deadline(&mut child, limit)?,
        None => (child.wait()?.code().unwrap_or(-1), false),
    };

    // A killed child's descendants may still hold the pipes open; only wait
    // for the readers briefly in that case.
    let drain = timed_out.then_some(DRAIN_GRACE);
    let stdout = collect_reader(stdout_reader, drain)?;
    let stderr = collect_reader(stderr_reader, drain)?;
    Ok(RunOutput {
        code,
        stdout,
        stderr,
        timed_out,
    })
}

fn wait_with_deadline(child: &mut Child, limit: Duration) -> io::Result<(i32, bool)> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status.code().unwrap_or(-1), false));
        }
        if Instant::now() >= deadline {
            kill_process_group(child);
            let status = child.wait()?;
            return Ok((status.code().unwrap_or(-1), true));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn kill_process_group(child: &mut Child) {
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: the child leads its own process group (see
        // `configured_command`) and has not been reaped yet.
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) {
    let _ = child.kill();
}

fn spawn_reader(stream: impl Read + Send + 'static) -> Receiver<io::Result<String>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(read_to_string(stream));
    });
    rx
}

fn collect_reader(
    reader: Option<Receiver<io::Result<String>>>,
    drain: Option<Duration>,
) -> io::Result<String> {
    let Some(reader) = reader else {
        return Ok(String::new());
    };
    let received = match drain {
        Some(grace) => reader.recv_timeout(grace),
        None => reader.recv().map_err(|_| RecvTimeoutError::Disconnected),
    };
    match received {
        Ok(output) => output,
        // Abandoned: the thread exits once the last writer goes away.
        Err(RecvTimeoutError::Timeout) => Ok(String::new()),
        Err(RecvTimeoutError::Disconnected) => {
            Err(io::Error::other("output reader thread panicked"))
        }
    }
}

fn read_to_string(mut reader: impl Read) -> io::Result<String> {
    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
