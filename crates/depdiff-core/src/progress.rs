use std::env;
use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

const FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const TICK: Duration = Duration::from_millis(80);
// Short phases finish without ever drawing.
const START_DELAY: Duration = Duration::from_millis(120);
const CLEAR_LINE: &str = "\r\x1b[2K";

/// `DEPDIFF_PROGRESS=0` hides the bar, any other value forces it; unset
/// follows whether stderr is a terminal.
fn progress_enabled(setting: Option<&str>, stderr_is_terminal: bool) -> bool {
    match setting {
        Some(value) => value.trim() != "0",
        None => stderr_is_terminal,
    }
}

fn render_line(label: &str, done: usize, total: usize, tick: usize) -> String {
    let frame = FRAMES[tick % FRAMES.len()];
    format!(
        "{CLEAR_LINE}depdiff ▸ {label} [{}/{total}] {frame}",
        done.min(total)
    )
}

struct BarState {
    label: String,
    total: usize,
    done: AtomicUsize,
    stopped: AtomicBool,
}

/// A `[done/total]` counter with a spinner, drawn on stderr by a background
/// thread until the reporter is finished or dropped.
pub(crate) struct ProgressReporter {
    state: Arc<BarState>,
    renderer: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    pub(crate) fn bar(label: impl Into<String>, total: usize) -> Self {
        let setting = env::var("DEPDIFF_PROGRESS").ok();
        let enabled = progress_enabled(setting.as_deref(), io::stderr().is_terminal());
        Self::start(label.into(), total, enabled)
    }

    fn start(label: String, total: usize, draw: bool) -> Self {
        let state = Arc::new(BarState {
            label,
            total,
            done: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
        });
        let renderer = if draw {
            let shared = Arc::clone(&state);
            thread::Builder::new()
                .name("depdiff-progress".into())
                .spawn(move || draw_until_stopped(&shared))
                .map_err(|err| debug!("progress renderer unavailable: {err}"))
                .ok()
        } else {
            None
        };
        Self { state, renderer }
    }

    pub(crate) fn increment(&self) {
        self.state.done.fetch_add(1, Ordering::Relaxed);
    }

    /// Stop drawing and print `message` in place of the bar.
    pub(crate) fn finish(mut self, message: impl Into<String>) {
        if self.stop() {
            eprintln!("depdiff ▸ {}", message.into());
        }
    }

    /// Returns whether a renderer was running.
    fn stop(&mut self) -> bool {
        self.state.stopped.store(true, Ordering::Relaxed);
        let Some(handle) = self.renderer.take() else {
            return false;
        };
        handle.thread().unpark();
        let _ = handle.join();
        true
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn draw_until_stopped(state: &BarState) {
    let started = Instant::now();
    let mut tick = 0usize;
    let mut drawn = false;
    let mut stderr = io::stderr();
    while !state.stopped.load(Ordering::Relaxed) {
        if started.elapsed() >= START_DELAY {
            let done = state.done.load(Ordering::Relaxed);
            let line = render_line(&state.label, done, state.total, tick);
            let _ = stderr.write_all(line.as_bytes());
            let _ = stderr.flush();
            drawn = true;
            tick = tick.wrapping_add(1);
        }
        thread::park_timeout(TICK);
    }
    if drawn {
        let _ = stderr.write_all(CLEAR_LINE.as_bytes());
        let _ = stderr.flush();
    }
}
