use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use nvmprog::flashing::{
    CoreOutcome, FlashProgress, ProgressEvent, TransferKind, WriteReport, WriteState,
};
use parking_lot::Mutex;

use super::logging;

const TICK_CHARS: &str = "⠁⠁⠉⠙⠚⠒⠂⠂⠒⠲⠴⠤⠄⠄⠤⠠⠠⠤⠦⠖⠒⠐⠐⠒⠓⠋⠉⠈⠈✔";

fn active() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:.green.bold} {spinner} {percent:>3}% [{bar:20}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .tick_chars(TICK_CHARS)
        .progress_chars("##-")
}

fn finished() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:.green.bold} {spinner} {percent:>3}% [{bar:20}] (took {elapsed})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .tick_chars(TICK_CHARS)
        .progress_chars("##")
}

fn failed() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:.red.bold} {spinner} {percent:>3}% [{bar:20}] {msg:.red}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .tick_chars(TICK_CHARS)
        .progress_chars("#-")
}

fn prefix(core: &str, operation: TransferKind) -> String {
    match operation {
        TransferKind::Erase => format!("    Erasing {core}"),
        TransferKind::Program => format!("Programming {core}"),
    }
}

/// Renders the transfers of a session as one progress bar per core and operation.
pub struct CliProgressBars {
    multi_progress: MultiProgress,
    bars: Mutex<HashMap<(String, TransferKind), ProgressBar>>,
}

impl CliProgressBars {
    pub fn new() -> Self {
        let multi_progress = MultiProgress::new();
        logging::set_progress_bar(multi_progress.clone());

        Self {
            multi_progress,
            bars: Mutex::new(HashMap::new()),
        }
    }

    /// A [`FlashProgress`] that feeds these bars.
    pub fn flash_progress(bars: &Rc<Self>) -> FlashProgress {
        let bars = Rc::clone(bars);
        FlashProgress::new(move |event| bars.handle(event))
    }

    pub fn handle(&self, event: ProgressEvent) {
        let mut bars = self.bars.lock();
        match event {
            ProgressEvent::Started { core, operation } => {
                let bar = self.multi_progress.add(ProgressBar::new(100));
                bar.set_style(active());
                bar.set_prefix(prefix(&core, operation));
                bar.enable_steady_tick(Duration::from_millis(100));
                bars.insert((core, operation), bar);
            }
            ProgressEvent::Progress {
                core,
                operation,
                percentage,
                message,
            } => {
                if let Some(bar) = bars.get(&(core, operation)) {
                    bar.set_position(u64::from(percentage));
                    bar.set_message(message);
                }
            }
            ProgressEvent::Finished {
                core, operation, ..
            } => {
                if let Some(bar) = bars.remove(&(core, operation)) {
                    bar.set_style(finished());
                    bar.set_position(100);
                    bar.finish();
                }
            }
            ProgressEvent::Failed {
                core,
                operation,
                message,
            } => {
                if let Some(bar) = bars.remove(&(core, operation)) {
                    bar.set_style(failed());
                    bar.abandon_with_message(message);
                }
            }
        }
    }
}

impl Drop for CliProgressBars {
    fn drop(&mut self) {
        // If we don't do this, the progress bars disappear.
        logging::clear_progress_bar();
    }
}

/// Prints one line per core of a write report.
pub fn print_report(report: &WriteReport) {
    for core in &report.cores {
        let path = core
            .transitions
            .iter()
            .map(WriteState::to_string)
            .collect::<Vec<_>>()
            .join(" -> ");

        let summary = match &core.outcome {
            CoreOutcome::Written {
                pages,
                bytes,
                verified,
            } => format!(
                "{} {bytes} bytes in {pages} pages{}",
                "Written".green().bold(),
                if *verified { ", verified" } else { "" }
            ),
            CoreOutcome::Skipped => format!("{} no data for this core", "Skipped".yellow().bold()),
            CoreOutcome::Failed(error) => format!("{} {error}", "Failed".red().bold()),
        };

        logging::println(format!("{:>12}: {summary} ({path})", core.core));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bars_are_released_after_terminal_events() {
        let bars = Rc::new(CliProgressBars::new());
        let progress = CliProgressBars::flash_progress(&bars);

        let mut transfer = progress.start("Application", TransferKind::Program);
        transfer.update(50, "Programmed page 0x00001000");
        assert_eq!(bars.bars.lock().len(), 1);
        transfer.finish();

        progress
            .start("Network", TransferKind::Erase)
            .fail("injected failure");

        assert!(bars.bars.lock().is_empty());
    }
}
