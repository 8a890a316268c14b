//! Per-run logging context handed to every component that reports progress.

use indicatif::{ProgressBar, ProgressStyle};

/// Tag prefixed to log lines plus the progress-bar switch.
#[derive(Debug, Clone)]
pub struct RunContext {
    tag: String,
    progress: bool,
}

impl RunContext {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            progress: true,
        }
    }

    /// Context that never draws progress bars.
    pub fn quiet(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            progress: false,
        }
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Child context for one input file, e.g. `run/sband1`.
    pub fn child(&self, name: &str) -> Self {
        Self {
            tag: format!("{}/{}", self.tag, name),
            progress: self.progress,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn progress(&self) -> bool {
        self.progress
    }

    /// Bar over `len` units of work, hidden when progress is off.
    pub fn progress_bar(&self, len: u64, what: &str) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::with_template("[{prefix}] {msg} {bar:40} {pos}/{len}") {
            bar.set_style(style);
        }
        bar.set_prefix(self.tag.clone());
        bar.set_message(what.to_string());
        bar
    }
}
