//! Logging setup.
//!
//! Diagnostics are emitted through `tracing`. [`init`] installs a stderr
//! formatter plus a [`LogCaptureLayer`] that copies every event into the shared
//! [`APPLAUSE_LOG_RECORDS`] container, so a framework integration can attach the
//! SDK's own logs to a test result.

use std::fmt::{self, Write as _};
use std::sync::{Arc, LazyLock, Mutex, Once};
use tracing::{
    field::{Field, Visit},
    level_filters::LevelFilter,
    warn, Event, Subscriber,
};
use tracing_subscriber::{
    filter::Targets, layer::Context, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

/// Environment variable holding a `tracing` target filter, e.g. `applause_reporter=debug`.
pub const LOG_ENV: &str = "APPLAUSE_LOG";

/// Process-wide log container fed by [`init`].
pub static APPLAUSE_LOG_RECORDS: LazyLock<LogRecords> = LazyLock::new(LogRecords::default);

/// A shared, append-only list of formatted log lines.
#[derive(Clone, Debug, Default)]
pub struct LogRecords {
    inner: Arc<Mutex<Vec<String>>>,
}

impl LogRecords {
    /// Snapshot of every stored line.
    pub fn logs(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Take every stored line, leaving the container empty.
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.lock())
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn push(&self, line: impl Into<String>) {
        self.lock().push(line.into());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        // A panic while holding the lock cannot leave a Vec<String> half-written.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A `tracing` layer that appends each event to a [`LogRecords`].
pub struct LogCaptureLayer {
    records: LogRecords,
}

impl LogCaptureLayer {
    pub fn new(records: LogRecords) -> Self {
        Self { records }
    }
}

impl<S: Subscriber> Layer<S> for LogCaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut line = format!("{}: ", event.metadata().level());
        let mut visitor = LineVisitor { line: &mut line };
        event.record(&mut visitor);
        self.records.push(line);
    }
}

static MESSAGE_FIELD: &str = "message";

struct LineVisitor<'a> {
    line: &'a mut String,
}

impl Visit for LineVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        // Writing into a String cannot fail.
        if field.name() == MESSAGE_FIELD {
            let _ = write!(self.line, "{value:?}");
        } else {
            let _ = write!(self.line, "; {} = {:?}", field.name(), value);
        }
    }
}

static INIT_LOGGER: Once = Once::new();

/// Install the global subscriber. Safe to call more than once.
pub fn init(verbose: bool) {
    INIT_LOGGER.call_once(|| {
        let default_level = if verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        };
        let level_str = std::env::var(LOG_ENV).unwrap_or_default();
        let (targets, bad_filter) = if level_str.is_empty() {
            (Targets::new().with_default(default_level), None)
        } else {
            match level_str.parse::<Targets>() {
                Ok(targets) => (targets, None),
                Err(err) => (Targets::new().with_default(default_level), Some(err)),
            }
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(targets.clone());
        let capture_layer = LogCaptureLayer::new(APPLAUSE_LOG_RECORDS.clone()).with_filter(targets);

        // Another subscriber may already be installed by the host test framework.
        let _ = tracing_subscriber::registry()
            .with(fmt_layer)
            .with(capture_layer)
            .try_init();

        if let Some(err) = bad_filter {
            warn!("ignoring invalid {LOG_ENV} value `{level_str}`: {err}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tracing::{info, warn};

    #[test]
    fn captures_message_and_fields() {
        let records = LogRecords::default();
        let subscriber =
            tracing_subscriber::registry().with(LogCaptureLayer::new(records.clone()));

        tracing::subscriber::with_default(subscriber, || {
            info!("Test Run 5 initialized");
            warn!(run_id = 5, "heartbeat failed");
        });

        assert_eq!(
            records.logs(),
            vec![
                "INFO: Test Run 5 initialized".to_string(),
                "WARN: heartbeat failed; run_id = 5".to_string(),
            ]
        );
    }

    #[test]
    fn drain_empties_container() {
        let records = LogRecords::default();
        records.push("a");
        records.push("b");

        assert_eq!(records.drain(), vec!["a".to_string(), "b".to_string()]);
        assert!(records.logs().is_empty());

        records.push("c");
        records.clear();
        assert!(records.logs().is_empty());
    }
}
