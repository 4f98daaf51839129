use indicatif::{ProgressBar, ProgressStyle};
use kflash_core::progress::{Progress, Stage};

const TEMPLATE: &str =
    "{msg:15} [{elapsed_precise}] {bar:50.cyan/blue} [{bytes}/{total_bytes}] {bytes_per_sec}";

/// Renders session progress as one bar per stage
#[derive(Default)]
pub struct BarProgress {
    bar: Option<ProgressBar>,
}

impl Progress for BarProgress {
    fn start(&mut self, stage: Stage, total: usize) {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::with_template(TEMPLATE) {
            bar.set_style(style);
        }
        bar.set_message(stage.to_string());
        self.bar = Some(bar);
    }

    fn advance(&mut self, _stage: Stage, bytes: usize) {
        if let Some(bar) = &self.bar {
            bar.inc(bytes as u64);
        }
    }

    fn finish(&mut self, _stage: Stage) {
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
    }
}
