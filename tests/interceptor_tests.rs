mod common;

use common::{CapturedLog, ManualSource, append};
use logtap::{
    Callback, Config, ConfigOverrides, Error, Interceptor, OverflowStrategy, PatternFilter,
    PredicateFilter,
};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::{TempDir, tempdir};

struct Fixture {
    _dir: TempDir,
    source: PathBuf,
    target: PathBuf,
    changes: ManualSource,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let source = dir.path().join("app.log");
        let target = dir.path().join("captured.log");
        fs::write(&source, "").unwrap();
        Fixture {
            _dir: dir,
            source,
            target,
            changes: ManualSource::new(),
        }
    }

    fn builder(&self) -> logtap::InterceptorBuilder {
        Interceptor::builder(&self.source).change_source(self.changes.clone())
    }

    /// Append to the source file and deliver one change notification.
    fn write(&self, text: &str) {
        append(&self.source, text);
        self.changes.fire("app.log");
    }
}

fn no_debounce() -> Config {
    Config::from_preset(
        "balanced",
        ConfigOverrides {
            debounce_interval: Some(0.0),
            ..Default::default()
        },
    )
    .unwrap()
}

#[test]
fn test_missing_source_rejected() {
    let dir = tempdir().unwrap();
    let err = Interceptor::builder(dir.path().join("nope.log"))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::SourceNotFound(_)));
    assert!(err.to_string().contains("nope.log"));
}

#[test]
fn test_allow_missing_then_file_appears() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("late.log");
    let changes = ManualSource::new();
    let interceptor = Interceptor::builder(&source)
        .allow_missing(true)
        .use_buffer(true)
        .change_source(changes.clone())
        .build()
        .unwrap();
    interceptor.start().unwrap();

    changes.fire("late.log");
    assert!(interceptor.buffered_lines().is_empty());

    append(&source, "First line\n");
    changes.fire("late.log");
    append(&source, "Second line\n");
    changes.fire("late.log");

    assert_eq!(
        interceptor.buffered_lines(),
        vec!["First line\n", "Second line\n"]
    );
}

#[test]
fn test_builder_validation() {
    let fx = Fixture::new();
    assert!(matches!(
        fx.builder().use_buffer(true).buffer_size(0).build(),
        Err(Error::InvalidConfig(_))
    ));
    assert!(matches!(
        fx.builder().overflow_strategy_name("LIFO").build(),
        Err(Error::UnsupportedOverflowStrategy(_))
    ));
    let interceptor = fx.builder().overflow_strategy_name("FIFO").build().unwrap();
    assert_eq!(interceptor.overflow_strategy(), OverflowStrategy::Fifo);
}

#[test]
fn test_start_stop_lifecycle() {
    let fx = Fixture::new();
    let interceptor = fx.builder().build().unwrap();
    assert!(!interceptor.is_running());

    interceptor.start().unwrap();
    assert!(interceptor.is_running());
    assert!(fx.changes.is_subscribed());
    assert_eq!(
        fx.changes.watched_dir().unwrap(),
        fs::canonicalize(fx.source.parent().unwrap()).unwrap()
    );

    interceptor.stop();
    assert!(!interceptor.is_running());
    assert!(!fx.changes.is_subscribed());

    // Stopping twice is harmless, and the interceptor can be restarted.
    interceptor.stop();
    interceptor.start().unwrap();
    assert!(interceptor.is_running());
    assert_eq!(fx.changes.subscriptions(), 2);
}

#[test]
fn test_double_start_fails() {
    let fx = Fixture::new();
    let interceptor = fx.builder().build().unwrap();
    interceptor.start().unwrap();

    let err = interceptor.start().unwrap_err();
    assert!(matches!(err, Error::AlreadyRunning));
    assert!(interceptor.is_running(), "state must be unchanged");
    assert_eq!(fx.changes.subscriptions(), 1);
}

#[test]
fn test_whitelist_scenario() {
    let fx = Fixture::new();
    let interceptor = fx
        .builder()
        .use_buffer(true)
        .filter(PatternFilter::whitelist("ERROR").unwrap())
        .build()
        .unwrap();
    interceptor.start().unwrap();

    fx.write("INFO: a\nERROR: b\n");

    assert_eq!(interceptor.buffered_lines(), vec!["ERROR: b\n"]);
    assert_eq!(interceptor.stats().lines_captured, 1);
}

#[test]
fn test_buffer_keeps_last_three() {
    let fx = Fixture::new();
    let interceptor = fx.builder().use_buffer(true).buffer_size(3).build().unwrap();
    interceptor.start().unwrap();

    for i in 0..5 {
        fx.write(&format!("L{i}\n"));
    }

    assert_eq!(interceptor.buffered_lines(), vec!["L2\n", "L3\n", "L4\n"]);
    let metadata = interceptor.lines_with_metadata();
    assert_eq!(metadata.len(), 3, "metadata is bounded by the same size");
    assert_eq!(metadata[0].line, "L2");
    assert_eq!(metadata[0].sequence_id, 2);
}

#[test]
fn test_callback_add_and_remove() {
    let fx = Fixture::new();
    let interceptor = fx.builder().build().unwrap();
    interceptor.start().unwrap();

    let seen: Arc<Mutex<Vec<(String, u64)>>> = Arc::default();
    let callback = {
        let seen = Arc::clone(&seen);
        Callback::new("recorder", move |line, _ts, id| {
            seen.lock().unwrap().push((line.to_string(), id));
            Ok(())
        })
    };
    interceptor.add_callback(&callback);

    fx.write("one\n");
    assert_eq!(*seen.lock().unwrap(), vec![("one\n".to_string(), 0)]);

    interceptor.remove_callback(&callback);
    fx.write("two\n");
    assert_eq!(seen.lock().unwrap().len(), 1, "removed callback must not run");
}

#[test]
fn test_callback_registered_once() {
    let fx = Fixture::new();
    let interceptor = fx.builder().build().unwrap();
    interceptor.start().unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let callback = {
        let calls = Arc::clone(&calls);
        Callback::new("counter", move |_, _, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    };
    interceptor.add_callback(&callback);
    interceptor.add_callback(&callback.clone());
    assert_eq!(interceptor.callback_count(), 1);

    // Removing something never registered is fine.
    interceptor.remove_callback(&Callback::new("stranger", |_, _, _| Ok(())));

    fx.write("line\n");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failing_callbacks_are_isolated() {
    let fx = Fixture::new();
    let logger = Arc::new(CapturedLog::default());
    let interceptor = fx.builder().logger(logger.clone()).build().unwrap();
    interceptor.start().unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = {
        let calls = Arc::clone(&calls);
        Callback::new("counter", move |_, _, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    };
    interceptor.add_callback(&Callback::new("erroring", |_, _, _| {
        Err("consumer offline".into())
    }));
    interceptor.add_callback(&Callback::new("panicking", |_, _, _| panic!("bad consumer")));
    interceptor.add_callback(&counter);

    fx.write("a\n");
    fx.write("b\n");

    assert_eq!(calls.load(Ordering::SeqCst), 2, "later callbacks still run");
    assert_eq!(interceptor.callback_count(), 3, "failing callbacks stay registered");
    assert_eq!(interceptor.stats().lines_captured, 2);

    let errors = logger.messages(log::Level::Error);
    assert!(errors.iter().any(|m| m.contains("erroring") && m.contains("consumer offline")));
    assert!(errors.iter().any(|m| m.contains("panicking") && m.contains("bad consumer")));
}

#[test]
fn test_predicate_panic_propagates() {
    let fx = Fixture::new();
    let interceptor = fx
        .builder()
        .filter(PredicateFilter::new(|line: &str| {
            if line.contains("poison") {
                panic!("predicate failed");
            }
            true
        }))
        .build()
        .unwrap();

    append(&fx.source, "poison\n");
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        interceptor.process_change();
    }));
    assert!(outcome.is_err(), "predicate panics are not swallowed");
    assert_eq!(interceptor.stats().lines_captured, 0);

    // The interceptor stays usable afterwards.
    append(&fx.source, "clean\n");
    interceptor.process_change();
    assert_eq!(interceptor.lines_with_metadata().len(), 1);
}

#[test]
fn test_metadata_sequence() {
    let fx = Fixture::new();
    let interceptor = fx.builder().build().unwrap();
    interceptor.start().unwrap();

    fx.write("Test\n");
    fx.write("second\nthird\n");

    let entries = interceptor.lines_with_metadata();
    let lines: Vec<_> = entries.iter().map(|e| e.line.as_str()).collect();
    assert_eq!(lines, ["Test", "second", "third"]);
    let ids: Vec<_> = entries.iter().map(|e| e.sequence_id).collect();
    assert_eq!(ids, [0, 1, 2]);
    assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert!(entries[0].timestamp > 1_600_000_000.0);
}

#[test]
fn test_metadata_captured_without_buffer() {
    let fx = Fixture::new();
    let interceptor = fx.builder().build().unwrap();
    interceptor.start().unwrap();

    fx.write("x\n");

    assert!(interceptor.buffered_lines().is_empty());
    assert_eq!(interceptor.lines_with_metadata().len(), 1);
    interceptor.clear_buffer();
}

#[test]
fn test_clear_buffer() {
    let fx = Fixture::new();
    let interceptor = fx.builder().use_buffer(true).build().unwrap();
    interceptor.start().unwrap();

    interceptor.clear_buffer();
    fx.write("a\nb\n");
    interceptor.clear_buffer();
    assert!(interceptor.buffered_lines().is_empty());
    assert_eq!(interceptor.lines_with_metadata().len(), 2);

    fx.write("c\n");
    assert_eq!(interceptor.buffered_lines(), vec!["c\n"]);
}

#[test]
fn test_pause_skips_lines_for_good() {
    let fx = Fixture::new();
    let interceptor = fx.builder().use_buffer(true).build().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = {
        let calls = Arc::clone(&calls);
        Callback::new("counter", move |_, _, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    };
    interceptor.add_callback(&counter);
    interceptor.start().unwrap();

    fx.write("Line 1\n");
    interceptor.pause();
    assert!(interceptor.is_paused());
    fx.write("Line during pause\n");
    interceptor.resume();
    assert!(!interceptor.is_paused());
    fx.write("Line 2\n");

    assert_eq!(interceptor.buffered_lines(), vec!["Line 1\n", "Line 2\n"]);
    let lines: Vec<_> = interceptor
        .lines_with_metadata()
        .into_iter()
        .map(|e| e.line)
        .collect();
    assert_eq!(lines, ["Line 1", "Line 2"]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_pause_allowed_while_stopped() {
    let fx = Fixture::new();
    let interceptor = fx.builder().use_buffer(true).build().unwrap();
    interceptor.pause();
    assert!(interceptor.is_paused());

    append(&fx.source, "ignored\n");
    interceptor.process_change();
    interceptor.resume();
    interceptor.process_change();
    assert!(interceptor.buffered_lines().is_empty());
}

#[test]
fn test_rotation_follows_new_file() {
    let fx = Fixture::new();
    let interceptor = fx.builder().use_buffer(true).build().unwrap();
    interceptor.start().unwrap();

    fx.write("Line before rotation\n");
    fs::rename(&fx.source, fx.source.with_extension("log.1")).unwrap();
    fs::write(&fx.source, "").unwrap();
    fx.changes.fire("app.log");
    assert_eq!(interceptor.offset(), 0);
    fx.write("Line after rotation\n");

    assert_eq!(
        interceptor.buffered_lines(),
        vec!["Line before rotation\n", "Line after rotation\n"]
    );
}

#[test]
fn test_unrelated_files_ignored() {
    let fx = Fixture::new();
    let interceptor = fx.builder().use_buffer(true).build().unwrap();
    interceptor.start().unwrap();

    append(&fx.source, "pending\n");
    fx.changes.fire("other.log");
    assert!(interceptor.buffered_lines().is_empty());

    fx.changes.fire("app.log");
    assert_eq!(interceptor.buffered_lines(), vec!["pending\n"]);
}

#[test]
fn test_no_delivery_after_stop() {
    let fx = Fixture::new();
    let interceptor = fx.builder().use_buffer(true).build().unwrap();
    interceptor.start().unwrap();
    interceptor.stop();

    fx.write("after stop\n");
    assert!(interceptor.buffered_lines().is_empty());
}

#[test]
fn test_stats() {
    let fx = Fixture::new();
    let interceptor = fx.builder().config(no_debounce()).build().unwrap();

    let before = interceptor.stats();
    assert_eq!(before.start_time, 0.0);
    assert_eq!(before.uptime_seconds, 0.0);

    interceptor.start().unwrap();
    fx.write("Line 1\nLine 2\nLine 3\n");
    fx.write("Line 4\n");
    std::thread::sleep(std::time::Duration::from_millis(10));

    let stats = interceptor.stats();
    assert_eq!(stats.lines_captured, 4);
    assert_eq!(stats.events_processed, 2);
    assert!(stats.start_time > 0.0);
    assert!(stats.uptime_seconds > 0.0);

    // Counters survive a stop/start cycle.
    interceptor.stop();
    interceptor.start().unwrap();
    assert_eq!(interceptor.stats().lines_captured, 4);
    assert!(interceptor.stats().start_time >= stats.start_time);
}

#[test]
fn test_stats_serialize() {
    let fx = Fixture::new();
    let interceptor = fx.builder().build().unwrap();
    let json = serde_json::to_value(interceptor.stats()).unwrap();
    for key in ["lines_captured", "events_processed", "start_time", "uptime_seconds"] {
        assert!(json.get(key).is_some(), "missing {key}");
    }
}

#[test]
fn test_empty_rounds_do_not_count() {
    let fx = Fixture::new();
    let interceptor = fx
        .builder()
        .config(no_debounce())
        .filter(PatternFilter::whitelist("ERROR").unwrap())
        .build()
        .unwrap();
    interceptor.start().unwrap();

    fx.changes.fire("app.log");
    fx.write("INFO: nothing to see\n");

    let stats = interceptor.stats();
    assert_eq!(stats.lines_captured, 0);
    assert_eq!(stats.events_processed, 0);
}

#[test]
fn test_debounce_only_affects_event_count() {
    let fx = Fixture::new();
    let config = Config::from_preset(
        "balanced",
        ConfigOverrides {
            debounce_interval: Some(60.0),
            ..Default::default()
        },
    )
    .unwrap();
    let interceptor = fx.builder().config(config).use_buffer(true).build().unwrap();
    interceptor.start().unwrap();

    for i in 0..10 {
        fx.write(&format!("Line {i}\n"));
    }

    let stats = interceptor.stats();
    assert_eq!(stats.events_processed, 1);
    assert_eq!(stats.lines_captured, 10);
    assert_eq!(interceptor.buffered_lines().len(), 10);
}

#[test]
fn test_sink_plain() {
    let fx = Fixture::new();
    let interceptor = fx
        .builder()
        .target_file(&fx.target)
        .filter(PatternFilter::blacklist("DEBUG").unwrap())
        .build()
        .unwrap();
    assert_eq!(interceptor.target_file(), Some(fx.target.as_path()));
    interceptor.start().unwrap();

    fx.write("Test with config\nDEBUG: hidden\n");
    fx.write("last\n");

    let content = fs::read_to_string(&fx.target).unwrap();
    assert_eq!(content, "Test with config\nlast\n");
}

#[test]
fn test_sink_timestamps() {
    let fx = Fixture::new();
    let interceptor = fx
        .builder()
        .target_file(&fx.target)
        .add_timestamps(true)
        .build()
        .unwrap();
    interceptor.start().unwrap();

    fx.write("Test line\n");

    let content = fs::read_to_string(&fx.target).unwrap();
    let pattern = regex::Regex::new(
        r"^\[CAPTURED_AT: \d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{6}\+00:00\] Test line\n$",
    )
    .unwrap();
    assert!(pattern.is_match(&content), "unexpected sink content: {content:?}");
}

#[test]
fn test_sink_failure_is_not_fatal() {
    let fx = Fixture::new();
    let logger = Arc::new(CapturedLog::default());
    // A directory cannot be opened for appending.
    let config = Config::from_preset(
        "balanced",
        ConfigOverrides {
            retry_on_error: Some(false),
            ..Default::default()
        },
    )
    .unwrap();
    let interceptor = fx
        .builder()
        .target_file(fx.source.parent().unwrap())
        .use_buffer(true)
        .config(config)
        .logger(logger.clone())
        .build()
        .unwrap();
    interceptor.start().unwrap();

    fx.write("still captured\n");

    assert!(interceptor.is_running());
    assert_eq!(interceptor.buffered_lines(), vec!["still captured\n"]);
    assert!(!logger.messages(log::Level::Error).is_empty());
}

#[test]
fn test_sink_retries_then_drops() {
    let fx = Fixture::new();
    let logger = Arc::new(CapturedLog::default());
    let config = Config::from_preset(
        "balanced",
        ConfigOverrides {
            retry_max_attempts: Some(2),
            retry_delay: Some(0.0),
            ..Default::default()
        },
    )
    .unwrap();
    let interceptor = fx
        .builder()
        .target_file(fx.source.parent().unwrap())
        .config(config)
        .logger(logger.clone())
        .build()
        .unwrap();
    interceptor.start().unwrap();

    fx.write("doomed\n");

    let warnings = logger.messages(log::Level::Warn);
    let retries: Vec<_> = warnings.iter().filter(|m| m.contains("retry")).collect();
    assert_eq!(retries.len(), 2, "warnings: {warnings:?}");
    assert!(retries[0].contains("retry 1/2"));
    assert!(retries[1].contains("retry 2/2"));

    let errors = logger.messages(log::Level::Error);
    assert_eq!(errors.len(), 1, "errors: {errors:?}");
    assert!(errors[0].contains("dropping 1 line(s)"));
    assert_eq!(interceptor.stats().lines_captured, 1);
}

#[test]
fn test_filter_panic_on_watch_thread_is_contained() {
    let fx = Fixture::new();
    let logger = Arc::new(CapturedLog::default());
    let interceptor = fx
        .builder()
        .use_buffer(true)
        .logger(logger.clone())
        .filter(PredicateFilter::new(|line: &str| {
            if line.contains("poison") {
                panic!("predicate failed");
            }
            true
        }))
        .build()
        .unwrap();
    interceptor.start().unwrap();

    fx.write("poison\n");
    fx.write("clean\n");

    assert_eq!(interceptor.buffered_lines(), vec!["clean\n"]);
    assert!(interceptor.is_running());
    let errors = logger.messages(log::Level::Error);
    assert!(
        errors.iter().any(|m| m.contains("panicked") && m.contains("predicate failed")),
        "errors: {errors:?}"
    );
}

#[test]
fn test_metadata_keeps_carriage_return() {
    let fx = Fixture::new();
    let interceptor = fx.builder().use_buffer(true).build().unwrap();
    interceptor.start().unwrap();

    fx.write("windows line\r\n");

    assert_eq!(interceptor.buffered_lines(), vec!["windows line\r\n"]);
    assert_eq!(interceptor.lines_with_metadata()[0].line, "windows line\r");
}

#[test]
fn test_guard_stops_on_drop() {
    let fx = Fixture::new();
    let interceptor = fx.builder().use_buffer(true).build().unwrap();
    {
        let running = interceptor.guard().unwrap();
        assert!(running.is_running());
        fx.write("inside\n");
    }
    assert!(!interceptor.is_running());
    assert!(!fx.changes.is_subscribed());
    assert_eq!(interceptor.buffered_lines(), vec!["inside\n"]);
}

#[test]
fn test_guard_stops_on_panic() {
    let fx = Fixture::new();
    let interceptor = fx.builder().build().unwrap();

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _running = interceptor.guard().unwrap();
        panic!("scope failed");
    }));

    assert!(outcome.is_err());
    assert!(!interceptor.is_running());
}

#[test]
fn test_drop_unsubscribes() {
    let fx = Fixture::new();
    let interceptor = fx.builder().build().unwrap();
    interceptor.start().unwrap();
    drop(interceptor);
    assert!(!fx.changes.is_subscribed());
}

#[test]
fn test_starts_at_end_of_existing_content() {
    let fx = Fixture::new();
    append(&fx.source, "old line\n");
    let interceptor = fx.builder().use_buffer(true).build().unwrap();
    interceptor.start().unwrap();

    fx.write("new line\n");
    assert_eq!(interceptor.buffered_lines(), vec!["new line\n"]);
}
