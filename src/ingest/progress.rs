//! Pluggable import progress reporting: processed count, ETA, and throughput
//! through an observer trait, with a default stderr spinner implementation.

use indicatif::{ProgressBar, ProgressStyle};

/// Observer notified as the batch importer makes progress.
pub trait ImportProgress: Send + Sync {
    fn started(&self, total_entries: usize);
    fn batch_committed(&self, processed: usize, total: usize);
    fn finished(&self, processed: usize);
}

/// No-op observer, useful for tests and library callers that don't want
/// stderr output.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ImportProgress for SilentProgress {
    fn started(&self, _total_entries: usize) {}
    fn batch_committed(&self, _processed: usize, _total: usize) {}
    fn finished(&self, _processed: usize) {}
}

/// Default observer: an indicatif bar written to stderr.
pub struct StderrProgress {
    bar: ProgressBar,
}

impl StderrProgress {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl Default for StderrProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportProgress for StderrProgress {
    fn started(&self, total_entries: usize) {
        self.bar.set_length(total_entries as u64);
        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.bar.set_style(
            ProgressStyle::with_template("{spinner} importing [{bar:40}] {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        self.bar.enable_steady_tick(std::time::Duration::from_millis(100));
    }

    fn batch_committed(&self, processed: usize, _total: usize) {
        self.bar.set_position(processed as u64);
    }

    fn finished(&self, processed: usize) {
        self.bar.finish_with_message(format!("imported {processed} entries"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_progress_is_harmless() {
        let p = SilentProgress;
        p.started(10);
        p.batch_committed(5, 10);
        p.finished(10);
    }
}
