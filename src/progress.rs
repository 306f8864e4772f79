use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Controls how task output is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Spinners on stderr, tracing suppressed.
    Normal,
    /// No spinners; debug tracing goes to stderr.
    Verbose,
    /// Nothing but command output and errors.
    Quiet,
    /// No ANSI: one plain status line per event (for piped/non-TTY).
    Plain,
}

/// One spinner per concurrently running operation.
pub struct Progress {
    multi: MultiProgress,
    mode: OutputMode,
}

/// Handle for a running operation; finish it exactly once.
pub struct Task {
    bar: ProgressBar,
    label: String,
    mode: OutputMode,
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn done_style(success: bool) -> ProgressStyle {
    let template = if success {
        "\u{2713} {msg:.green}"
    } else {
        "\u{2717} {msg:.red}"
    };
    ProgressStyle::default_spinner()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

impl Progress {
    pub fn new(mode: OutputMode) -> Self {
        let multi = match mode {
            OutputMode::Normal => MultiProgress::with_draw_target(ProgressDrawTarget::stderr()),
            _ => MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
        };
        Self { multi, mode }
    }

    pub fn start(&self, label: &str) -> Task {
        if self.mode == OutputMode::Plain {
            eprintln!("[..] {label}");
        }
        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(spinner_style());
        bar.set_message(label.to_string());
        if self.mode == OutputMode::Normal {
            bar.enable_steady_tick(Duration::from_millis(80));
        }
        Task {
            bar,
            label: label.to_string(),
            mode: self.mode,
        }
    }
}

impl Task {
    pub fn finish(self, success: bool, detail: &str) {
        let message = if detail.is_empty() {
            self.label.clone()
        } else {
            format!("{} ({detail})", self.label)
        };
        if self.mode == OutputMode::Plain {
            let mark = if success { "ok" } else { "FAILED" };
            eprintln!("[{mark}] {message}");
        }
        self.bar.set_style(done_style(success));
        self.bar.finish_with_message(message);
    }
}
