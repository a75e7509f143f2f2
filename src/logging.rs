// Logging handle passed into each component.
//
// Components never reach for the process-wide logger directly: they hold a
// `Logger` and emit through it. The binary hands out `Logger::global()`,
// which forwards to whatever `log` backend `main` installed (env_logger).
// Tests pass their own `log::Log` sink to inspect what was written.

use log::{Level, Log, Metadata, Record};
use std::fmt;
use std::sync::Arc;

/// Default target used for every record emitted by this crate.
pub const TARGET: &str = "volume_uploader";

/// Cheap, clonable logging handle.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn Log>,
    target: &'static str,
}

impl Logger {
    /// Forward to the process logger installed through the `log` facade.
    pub fn global() -> Self {
        Self::with_sink(Arc::new(Facade))
    }

    /// Emit into an arbitrary sink. Used by tests to capture records.
    pub fn with_sink(sink: Arc<dyn Log>) -> Self {
        Logger {
            sink,
            target: TARGET,
        }
    }

    /// Same sink, different target (e.g. `volume_uploader::auth`).
    pub fn scoped(&self, target: &'static str) -> Self {
        Logger {
            sink: Arc::clone(&self.sink),
            target,
        }
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Error, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Warn, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Info, args);
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Debug, args);
    }

    fn emit(&self, level: Level, args: fmt::Arguments<'_>) {
        let metadata = Metadata::builder().level(level).target(self.target).build();
        if !self.sink.enabled(&metadata) {
            return;
        }
        self.sink.log(
            &Record::builder()
                .metadata(metadata)
                .args(args)
                .module_path_static(Some(module_path!()))
                .build(),
        );
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("target", &self.target).finish()
    }
}

/// Sink that defers to `log::logger()` at call time, so a backend installed
/// after the `Logger` was created is still honoured.
struct Facade;

impl Log for Facade {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level() && log::logger().enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        log::logger().log(record);
    }

    fn flush(&self) {
        log::logger().flush();
    }
}
