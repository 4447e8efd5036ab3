use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use indicatif::MultiProgress;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// The progress bars currently drawn, if any. Terminal output goes above them.
static ACTIVE_BARS: LazyLock<Mutex<Option<MultiProgress>>> = LazyLock::new(|| Mutex::new(None));

/// Keeps the log file writer alive. Pending lines are flushed when it is dropped.
pub struct LogFileGuard {
    _worker: WorkerGuard,
    path: PathBuf,
}

impl Drop for LogFileGuard {
    fn drop(&mut self) {
        tracing::info!("Wrote log to {}", self.path.display());
    }
}

/// Verbosity of terminal output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[clap(rename_all = "UPPER")]
#[serde(rename_all = "UPPERCASE")]
pub enum LevelFilter {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LevelFilter> for tracing::level_filters::LevelFilter {
    fn from(level: LevelFilter) -> Self {
        match level {
            LevelFilter::Off => Self::OFF,
            LevelFilter::Error => Self::ERROR,
            LevelFilter::Warn => Self::WARN,
            LevelFilter::Info => Self::INFO,
            LevelFilter::Debug => Self::DEBUG,
            LevelFilter::Trace => Self::TRACE,
        }
    }
}

/// Builds the filter of the terminal layer.
///
/// An explicit level wins over `RUST_LOG`, which wins over `WARN`.
fn terminal_filter(level: Option<LevelFilter>) -> EnvFilter {
    let builder = EnvFilter::builder();
    match level {
        Some(level) => builder
            .with_default_directive(tracing::level_filters::LevelFilter::from(level).into())
            .parse_lossy(""),
        None => builder
            .with_default_directive(tracing::level_filters::LevelFilter::WARN.into())
            .from_env_lossy(),
    }
}

/// Forwards formatted log lines to [`eprintln`].
struct TerminalWriter;

impl std::io::Write for TerminalWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let line = String::from_utf8_lossy(buf);
        eprintln(line.trim_end_matches(['\r', '\n']));
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Installs the global tracing subscriber.
///
/// Messages at `level` and above go to the terminal. With a `log_path`, every message is
/// additionally written to that file as JSON.
pub fn setup_logging(
    log_path: Option<&Path>,
    level: Option<LevelFilter>,
) -> anyhow::Result<Option<LogFileGuard>> {
    let terminal = tracing_subscriber::fmt::layer()
        .compact()
        .without_time()
        .with_writer(|| TerminalWriter)
        .with_filter(terminal_filter(level));

    let Some(path) = log_path else {
        tracing_subscriber::registry().with(terminal).init();
        return Ok(None);
    };

    let (writer, worker) = NonBlockingBuilder::default()
        .lossy(false)
        .finish(File::create(path)?);
    let file = tracing_subscriber::fmt::layer()
        .json()
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(terminal)
        .with(file)
        .init();

    tracing::info!("Writing log to {}", path.display());
    Ok(Some(LogFileGuard {
        _worker: worker,
        path: path.to_owned(),
    }))
}

/// Routes terminal output through `bars` until [`clear_progress_bar`] is called.
pub fn set_progress_bar(bars: MultiProgress) {
    *ACTIVE_BARS.lock() = Some(bars);
}

/// Stops routing terminal output through the progress bars.
pub fn clear_progress_bar() {
    ACTIVE_BARS.lock().take();
}

/// Prints `message` above the active progress bars. Returns false if there are none.
fn print_above_bars(message: &str) -> bool {
    match ACTIVE_BARS.lock().as_ref() {
        Some(bars) => {
            let _ = bars.println(message);
            true
        }
        None => false,
    }
}

/// Writes a line to stderr, above the progress bars if any are shown.
pub fn eprintln(message: impl AsRef<str>) {
    let message = message.as_ref();
    if !print_above_bars(message) {
        eprintln!("{message}");
    }
}

/// Writes a line to stdout, above the progress bars if any are shown.
pub fn println(message: impl AsRef<str>) {
    let message = message.as_ref();
    if !print_above_bars(message) {
        println!("{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(LevelFilter::Off => tracing::level_filters::LevelFilter::OFF)]
    #[test_case(LevelFilter::Warn => tracing::level_filters::LevelFilter::WARN)]
    #[test_case(LevelFilter::Trace => tracing::level_filters::LevelFilter::TRACE)]
    fn level_filter_maps_to_tracing(level: LevelFilter) -> tracing::level_filters::LevelFilter {
        level.into()
    }

    #[test]
    fn explicit_level_limits_the_terminal() {
        assert_eq!(
            terminal_filter(Some(LevelFilter::Debug)).max_level_hint(),
            Some(tracing::level_filters::LevelFilter::DEBUG)
        );
    }
}
