use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use propcid_core::pipeline::{Phase, ProgressSink};
use tracing::debug;

/// Terminal progress fed by the pipeline's progress hook.
pub struct BarProgress {
    pb: ProgressBar,
}

impl BarProgress {
    pub fn new(hidden: bool) -> Self {
        let pb = ProgressBar::new_spinner();
        if hidden {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }
        if let Ok(style) = ProgressStyle::with_template("{spinner} [{pos}/{len}] {msg}") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(80));
        Self { pb }
    }

    pub fn set_total(&self, total: usize) {
        self.pb.set_length(total as u64);
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl ProgressSink for BarProgress {
    fn on_phase(&self, phase: Phase) {
        debug!(phase = phase.as_str(), "phase");
        self.pb.set_message(phase.as_str());
    }

    fn on_file_finished(&self, _path: &Path, _ok: bool) {
        self.pb.inc(1);
    }
}
