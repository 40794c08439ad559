//! Uncaught crash reporting.
//!
//! The panic hook installed by [`install_crash_handler`] persists a crash log and a fatal RUM
//! error on the panicking thread, then hands over to the hook that was installed before it.

use std::backtrace::Backtrace;
use std::panic::{self, PanicHookInfo};
use std::sync::Arc;

use crate::logs::LogsHandle;
use crate::rum::RumMonitor;

const PANIC_KIND: &str = "panic";

/// What a crash report reached.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CrashOutcome {
    pub log_written: bool,
    pub rum_written: bool,
}

/// Writes crash reports to every feature that wants them.
#[derive(Clone, Debug, Default)]
pub struct CrashReporter {
    logs: Option<LogsHandle>,
    rum: Option<Arc<RumMonitor>>,
}

impl CrashReporter {
    pub fn new(logs: Option<LogsHandle>, rum: Option<Arc<RumMonitor>>) -> Self {
        Self { logs, rum }
    }

    /// Persists one crash synchronously. Never blocks on a busy RUM worker.
    pub fn report(&self, message: &str, stack: &str) -> CrashOutcome {
        let log_written = self
            .logs
            .as_ref()
            .is_some_and(|logs| logs.write_crash_now(message, PANIC_KIND, Some(stack.to_string())));
        let rum_written = self.rum.as_ref().is_some_and(|monitor| {
            monitor.process_fatal_error_now(message, Some(stack.to_string()))
        });
        if !log_written && !rum_written {
            log::warn!("crash could not be recorded: {message}");
        }
        CrashOutcome {
            log_written,
            rum_written,
        }
    }

    fn report_panic(&self, info: &PanicHookInfo<'_>) -> CrashOutcome {
        let mut message = panic_message(info);
        if let Some(location) = info.location() {
            message = format!("{message} at {}:{}", location.file(), location.line());
        }
        let stack = Backtrace::force_capture().to_string();
        self.report(&message, &stack)
    }
}

fn panic_message(info: &PanicHookInfo<'_>) -> String {
    let payload = info.payload();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

/// Replaces the process panic hook with one that reports the crash first, then calls the
/// previous hook. The reporting path never unwraps: a panic inside a panic hook aborts.
pub fn install_crash_handler(reporter: CrashReporter) {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        reporter.report_panic(info);
        previous(info);
    }));
}
