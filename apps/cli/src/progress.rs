//! Terminal progress bars for downloads

use fetchtv_core::{ProgressSink, TransferProgress};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {binary_bytes_per_sec} {eta}";
const SPINNER_TEMPLATE: &str = "{spinner:.cyan} {msg} {bytes} {binary_bytes_per_sec}";

/// One bar per concurrent download, drawn to stderr
pub struct BarProgress {
    multi: MultiProgress,
}

impl BarProgress {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    pub fn with_target(target: ProgressDrawTarget) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
        }
    }

    fn start(&self, title: &str, total: Option<u64>) -> ProgressBar {
        let bar = match total {
            Some(len) => self.multi.add(ProgressBar::new(len)).with_style(
                ProgressStyle::with_template(BAR_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            ),
            None => self.multi.add(ProgressBar::new_spinner()).with_style(
                ProgressStyle::with_template(SPINNER_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            ),
        };
        bar.set_message(title.to_string());
        bar
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarProgress {
    fn begin(&self, title: &str, total: Option<u64>) -> Box<dyn TransferProgress> {
        Box::new(Bar(self.start(title, total)))
    }
}

struct Bar(ProgressBar);

impl TransferProgress for Bar {
    fn advance(&self, bytes: u64) {
        self.0.inc(bytes);
    }

    fn finish(&self) {
        self.0.finish_and_clear();
    }
}

impl Drop for Bar {
    fn drop(&mut self) {
        // Cancelled transfers never reach finish()
        if !self.0.is_finished() {
            self.0.abandon();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_tracks_bytes() {
        let progress = BarProgress::with_target(ProgressDrawTarget::hidden());
        let bar = progress.start("S4 E12", Some(100));
        bar.inc(40);
        bar.inc(2);
        assert_eq!(bar.position(), 42);
        assert_eq!(bar.length(), Some(100));
        assert_eq!(bar.message(), "S4 E12");
    }

    #[test]
    fn test_unknown_length_uses_spinner() {
        let progress = BarProgress::with_target(ProgressDrawTarget::hidden());
        let bar = progress.start("The Matrix", None);
        assert_eq!(bar.length(), None);
    }

    #[test]
    fn test_finish_through_sink() {
        let progress = BarProgress::with_target(ProgressDrawTarget::hidden());
        let transfer = progress.begin("S4 E13", Some(10));
        transfer.advance(10);
        transfer.finish();
    }
}
