//! Logging setup for the benchmark binary.

use std::env;
use std::io::{self, Write};

use indicatif::MultiProgress;
use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, prelude::*};

/// Installs the global tracing subscriber, logging to stderr.
///
/// Stdout is reserved for the benchmark report. If `progress` is given, every log line is written
/// while its bars are cleared, and the bars are redrawn below it.
pub fn init_tracing(progress: Option<&MultiProgress>) {
    let (level, env_filter) = parse_rust_log();
    let writer = match progress.cloned() {
        Some(progress) => BoxMakeWriter::new(move || SuspendingWriter(progress.clone())),
        None => BoxMakeWriter::new(io::stderr),
    };
    let format = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_target(true);

    tracing_subscriber::registry()
        .with(format.with_filter(LevelFilter::from(level)))
        .with(env_filter)
        .init();
}

/// Writes to stderr with the progress bars of a [`MultiProgress`] suspended.
#[derive(Debug)]
struct SuspendingWriter(MultiProgress);

impl Write for SuspendingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.suspend(|| io::stderr().write(buf))
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.0.suspend(|| io::stderr().write_all(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

fn parse_rust_log() -> (Level, EnvFilter) {
    // Try to parse RUST_LOG as a simple level filter and apply default levels internally.
    // Otherwise, use it literally if the user knows which overrides they want to run.
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse::<Level>() {
            Ok(level) => level,
            Err(_) => return (Level::TRACE, EnvFilter::new(value)),
        },
        Err(_) => Level::INFO,
    };

    // This is the maximum verbosity that will be logged, we filter this down to `level`.
    let env_filter = EnvFilter::new(
        "WARN,\
        contactbench=TRACE,\
        ",
    );

    (level, env_filter)
}

#[cfg(test)]
mod tests {
    use indicatif::{ProgressBar, ProgressDrawTarget};

    use super::*;

    #[test]
    fn log_lines_pass_through_suspended_bars() {
        let progress = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        let bar = progress.add(ProgressBar::new(10));
        bar.inc(3);

        let mut writer = SuspendingWriter(progress.clone());
        let line = b"request failed\n";
        assert_eq!(writer.write(line).unwrap(), line.len());
        writer.write_all(line).unwrap();
        writer.flush().unwrap();

        assert_eq!(bar.position(), 3);
    }
}
