use std::fmt::Write;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressState, ProgressStyle};

/// Progress bar showing how much of a fault's wait has elapsed.
pub(crate) struct WaitProgress {
    bar: ProgressBar,
    planned: Duration,
}

impl WaitProgress {
    pub(crate) fn start(planned: Duration) -> Self {
        let bar = ProgressBar::new(planned.as_secs());
        let total = planned.as_secs();
        match ProgressStyle::with_template(
            "{spinner:.green} [{wide_bar:.cyan/blue}] [{elapsed_precise} / {planned}]",
        ) {
            Ok(style) => bar.set_style(
                style
                    .with_key("planned", move |_state: &ProgressState, w: &mut dyn Write| {
                        let _ = write!(
                            w,
                            "{:02}:{:02}:{:02}",
                            total / 3600,
                            (total % 3600) / 60,
                            total % 60
                        );
                    })
                    .progress_chars("#>-"),
            ),
            Err(e) => log::debug!("Falling back to the default progress style: {e}"),
        }

        Self { bar, planned }
    }

    pub(crate) fn update(&self, elapsed: Duration) {
        self.bar.set_position(elapsed.min(self.planned).as_secs());
    }

    pub(crate) fn finish(self) {
        self.bar.finish_and_clear();
    }
}
