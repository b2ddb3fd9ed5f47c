//! Diagnostics sink handed to each interceptor.
//!
//! Records go through the [`log`] facade with target `logtap`. By default the
//! process-wide logger receives them; tests and embedders can inject their
//! own [`log::Log`] per interceptor instead.

use log::{Level, Log, Record};
use std::fmt;
use std::sync::Arc;

pub(crate) const TARGET: &str = "logtap";

#[derive(Clone, Default)]
pub(crate) enum Reporter {
    /// Whatever `log::set_logger` installed.
    #[default]
    Global,
    Custom(Arc<dyn Log>),
}

impl Reporter {
    pub(crate) fn emit(&self, level: Level, args: fmt::Arguments<'_>) {
        match self {
            // `max_level` only governs the global logger.
            Reporter::Global if level <= log::max_level() => {
                write_record(log::logger(), level, args)
            }
            Reporter::Global => {}
            Reporter::Custom(logger) => write_record(logger.as_ref(), level, args),
        }
    }
}

fn write_record(logger: &dyn Log, level: Level, args: fmt::Arguments<'_>) {
    let metadata = log::Metadata::builder().level(level).target(TARGET).build();
    if !logger.enabled(&metadata) {
        return;
    }
    logger.log(
        &Record::builder()
            .metadata(metadata)
            .args(args)
            .module_path_static(Some(module_path!()))
            .build(),
    );
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reporter::Global => f.write_str("Reporter::Global"),
            Reporter::Custom(_) => f.write_str("Reporter::Custom(..)"),
        }
    }
}

macro_rules! report {
    ($reporter:expr, $level:ident, $($arg:tt)+) => {
        $reporter.emit(::log::Level::$level, format_args!($($arg)+))
    };
}

pub(crate) use report;
