//! The interceptor: lifecycle, pause gating and the per-change pipeline.

use crate::buffer::{OverflowStrategy, RingBuffer};
use crate::config::Config;
use crate::dispatch::{Callback, CallbackDispatcher, panic_message};
use crate::error::{Error, Result};
use crate::event::{LineMetadata, epoch_seconds};
use crate::filter::{self, Filter};
use crate::reader::TailReader;
use crate::report::{Reporter, report};
use crate::sink::Sink;
use crate::stats::{Stats, StatsCollector};
use crate::watch::{ChangeHandler, ChangeSource, NotifySource, Subscription};
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use std::{fmt, fs};

/// How long `stop()` waits for the watch thread to wind down.
const STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Tails one source file and distributes each new accepted line.
///
/// Lines go to a metadata buffer (always), an in-memory line buffer (if
/// enabled), registered callbacks, and a sink file (if configured). Build one
/// with [`Interceptor::builder`].
///
/// # Examples
///
/// ```no_run
/// use logtap::{Interceptor, PatternFilter};
///
/// let interceptor = Interceptor::builder("app.log")
///     .target_file("captured.log")
///     .use_buffer(true)
///     .filter(PatternFilter::whitelist("ERROR").unwrap())
///     .add_timestamps(true)
///     .build()
///     .unwrap();
///
/// {
///     let _running = interceptor.guard().unwrap();
///     // ... the application writes to app.log ...
/// }
/// // Stopped again here, even if the scope unwound.
///
/// for line in interceptor.buffered_lines() {
///     print!("{line}");
/// }
/// ```
pub struct Interceptor {
    source_file: PathBuf,
    target_file: Option<PathBuf>,
    config: Config,
    overflow_strategy: OverflowStrategy,
    shared: Arc<Shared>,
    change_source: Arc<dyn ChangeSource>,
    subscription: Mutex<Option<Box<dyn Subscription>>>,
}

/// State touched from the notification thread.
struct Shared {
    reader: Mutex<TailReader>,
    filters: Vec<Arc<dyn Filter>>,
    buffer: Option<RingBuffer<String>>,
    metadata: RingBuffer<LineMetadata>,
    callbacks: CallbackDispatcher,
    sink: Option<Sink>,
    stats: StatsCollector,
    next_sequence: AtomicU64,
    paused: AtomicBool,
    last_event: Mutex<Option<Instant>>,
    debounce: Duration,
    reporter: Reporter,
}

impl Interceptor {
    /// Start configuring an interceptor for `source_file`.
    pub fn builder(source_file: impl Into<PathBuf>) -> InterceptorBuilder {
        InterceptorBuilder::new(source_file.into())
    }

    /// Begin watching the source file's directory.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyRunning`] if already started. A failure to set up the
    /// watch leaves the interceptor stopped.
    pub fn start(&self) -> Result<()> {
        let mut subscription = lock(&self.subscription);
        if subscription.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let (dir, file_name) = watch_target(&self.source_file)?;
        let watched = dir.join(&file_name);
        let shared = Arc::clone(&self.shared);
        let handler: ChangeHandler = Arc::new(move |path: &Path| {
            if !names_source(path, &watched) {
                return;
            }
            // A panicking filter aborts this round only; the watch thread lives on.
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| shared.process_change()));
            if let Err(payload) = outcome {
                report!(
                    shared.reporter,
                    Error,
                    "processing {} panicked: {}",
                    watched.display(),
                    panic_message(payload.as_ref())
                );
            }
        });

        *subscription = Some(self.change_source.subscribe(&dir, handler)?);
        self.shared.stats.mark_started();
        report!(
            self.shared.reporter,
            Debug,
            "started tailing {}",
            self.source_file.display()
        );
        Ok(())
    }

    /// Stop watching. Does nothing if already stopped.
    ///
    /// A change being processed when `stop` is called may still finish
    /// delivering its lines after `stop` returns.
    pub fn stop(&self) {
        let subscription = lock(&self.subscription).take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe(STOP_TIMEOUT);
            report!(
                self.shared.reporter,
                Debug,
                "stopped tailing {}",
                self.source_file.display()
            );
        }
    }

    /// Start now and stop when the returned guard is dropped.
    pub fn guard(&self) -> Result<RunGuard<'_>> {
        self.start()?;
        Ok(RunGuard { interceptor: self })
    }

    pub fn is_running(&self) -> bool {
        lock(&self.subscription).is_some()
    }

    /// Stop capturing. Bytes appended while paused are skipped, not queued.
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    /// Handle one change notification for the source file.
    ///
    /// The change source calls this on its own thread; it can also be called
    /// directly to force a read. A panicking [`PredicateFilter`] unwinds out
    /// of a direct call; on the watch thread the panic is logged and only
    /// that round is lost.
    ///
    /// [`PredicateFilter`]: crate::PredicateFilter
    pub fn process_change(&self) {
        self.shared.process_change();
    }

    /// Lines held by the in-memory buffer, oldest first. Empty when
    /// buffering is disabled.
    pub fn buffered_lines(&self) -> Vec<String> {
        self.shared
            .buffer
            .as_ref()
            .map(RingBuffer::snapshot)
            .unwrap_or_default()
    }

    /// Empty the in-memory buffer. The metadata buffer is left alone.
    pub fn clear_buffer(&self) {
        if let Some(buffer) = &self.shared.buffer {
            buffer.clear();
        }
    }

    /// Metadata for the most recent captured lines, oldest first.
    pub fn lines_with_metadata(&self) -> Vec<LineMetadata> {
        self.shared.metadata.snapshot()
    }

    pub fn stats(&self) -> Stats {
        self.shared.stats.snapshot()
    }

    pub fn add_callback(&self, callback: &Callback) {
        self.shared.callbacks.add(callback);
    }

    pub fn remove_callback(&self, callback: &Callback) {
        self.shared.callbacks.remove(callback);
    }

    pub fn callback_count(&self) -> usize {
        self.shared.callbacks.len()
    }

    /// Bytes of the source file consumed so far.
    pub fn offset(&self) -> u64 {
        lock(&self.shared.reader).offset()
    }

    pub fn source_file(&self) -> &Path {
        &self.source_file
    }

    pub fn target_file(&self) -> Option<&Path> {
        self.target_file.as_deref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn overflow_strategy(&self) -> OverflowStrategy {
        self.overflow_strategy
    }
}

impl Drop for Interceptor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("source_file", &self.source_file)
            .field("target_file", &self.target_file)
            .field("running", &self.is_running())
            .field("paused", &self.is_paused())
            .finish()
    }
}

impl Shared {
    fn process_change(&self) {
        let debounced = self.check_debounce();

        let raw = {
            let mut reader = lock(&self.reader);
            if self.paused.load(Ordering::SeqCst) {
                reader.skip_to_end();
                return;
            }
            reader.process_change()
        };

        let accepted: Vec<String> = raw
            .into_iter()
            .filter(|line| filter::accept_all(&self.filters, line))
            .collect();
        if accepted.is_empty() {
            return;
        }

        self.stats.add_lines(accepted.len() as u64);
        if !debounced {
            self.stats.add_event();
        }

        for line in &accepted {
            let timestamp = epoch_seconds();
            let sequence_id = self.next_sequence.fetch_add(1, Ordering::SeqCst);
            self.metadata.push(LineMetadata::new(line, timestamp, sequence_id));
            if let Some(buffer) = &self.buffer {
                buffer.push(line.clone());
            }
            self.callbacks.dispatch(line, timestamp, sequence_id);
        }

        if let Some(sink) = &self.sink {
            sink.append(&accepted);
        }
    }

    /// Returns `true` if this change arrived within the debounce interval of
    /// the last non-debounced one.
    fn check_debounce(&self) -> bool {
        let now = Instant::now();
        let mut last = lock(&self.last_event);
        match *last {
            Some(prev) if now.duration_since(prev) < self.debounce => true,
            _ => {
                *last = Some(now);
                false
            }
        }
    }
}

/// Keeps an interceptor running for as long as it is alive.
///
/// Returned by [`Interceptor::guard`]; dropping it calls
/// [`Interceptor::stop`], including while unwinding.
#[derive(Debug)]
pub struct RunGuard<'a> {
    interceptor: &'a Interceptor,
}

impl Deref for RunGuard<'_> {
    type Target = Interceptor;

    fn deref(&self) -> &Interceptor {
        self.interceptor
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.interceptor.stop();
    }
}

/// Configures and validates an [`Interceptor`].
pub struct InterceptorBuilder {
    source_file: PathBuf,
    target_file: Option<PathBuf>,
    allow_missing: bool,
    use_buffer: bool,
    buffer_size: Option<usize>,
    overflow_strategy: std::result::Result<OverflowStrategy, String>,
    filters: Vec<Arc<dyn Filter>>,
    config: Config,
    add_timestamps: bool,
    change_source: Arc<dyn ChangeSource>,
    reporter: Reporter,
}

impl InterceptorBuilder {
    fn new(source_file: PathBuf) -> Self {
        InterceptorBuilder {
            source_file,
            target_file: None,
            allow_missing: false,
            use_buffer: false,
            buffer_size: None,
            overflow_strategy: Ok(OverflowStrategy::Fifo),
            filters: Vec::new(),
            config: Config::default(),
            add_timestamps: false,
            change_source: Arc::new(NotifySource),
            reporter: Reporter::Global,
        }
    }

    /// Also append accepted lines to this file.
    pub fn target_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.target_file = Some(path.into());
        self
    }

    /// Allow building before the source file exists.
    pub fn allow_missing(mut self, allow: bool) -> Self {
        self.allow_missing = allow;
        self
    }

    /// Keep accepted lines in an in-memory buffer.
    pub fn use_buffer(mut self, enabled: bool) -> Self {
        self.use_buffer = enabled;
        self
    }

    /// Capacity of the line and metadata buffers. Defaults to
    /// [`Config::buffer_size`].
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    pub fn overflow_strategy(mut self, strategy: OverflowStrategy) -> Self {
        self.overflow_strategy = Ok(strategy);
        self
    }

    /// Select the overflow strategy by name; only `"FIFO"` is recognized.
    pub fn overflow_strategy_name(mut self, name: &str) -> Self {
        self.overflow_strategy = name.parse().map_err(|_| name.to_string());
        self
    }

    /// Add a top-level filter. All top-level filters must accept a line.
    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Add several shared top-level filters.
    pub fn filters(mut self, filters: impl IntoIterator<Item = Arc<dyn Filter>>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Prefix lines written to the target file with their capture time.
    pub fn add_timestamps(mut self, enabled: bool) -> Self {
        self.add_timestamps = enabled;
        self
    }

    /// Replace the default [`NotifySource`].
    pub fn change_source(mut self, source: impl ChangeSource + 'static) -> Self {
        self.change_source = Arc::new(source);
        self
    }

    /// Send this interceptor's diagnostics to `logger` instead of the global
    /// `log` logger.
    pub fn logger(mut self, logger: Arc<dyn log::Log>) -> Self {
        self.reporter = Reporter::Custom(logger);
        self
    }

    /// Validate the options and create the interceptor, stopped.
    ///
    /// # Errors
    ///
    /// [`Error::SourceNotFound`] if the source is missing and
    /// `allow_missing` is off, [`Error::UnsupportedOverflowStrategy`] for an
    /// unknown strategy name, or [`Error::InvalidConfig`] for a zero buffer
    /// size or a source path without a file name.
    pub fn build(self) -> Result<Interceptor> {
        if self.source_file.file_name().is_none() {
            return Err(Error::InvalidConfig(format!(
                "source file {} has no file name",
                self.source_file.display()
            )));
        }
        if !self.allow_missing && !self.source_file.exists() {
            return Err(Error::SourceNotFound(self.source_file));
        }
        let overflow_strategy = self
            .overflow_strategy
            .map_err(Error::UnsupportedOverflowStrategy)?;

        let capacity = self.buffer_size.unwrap_or(self.config.buffer_size());
        let buffer = if self.use_buffer {
            Some(RingBuffer::new(capacity)?)
        } else {
            None
        };
        let metadata = RingBuffer::new(capacity)?;

        let reader =
            TailReader::new(&self.source_file, &self.config).with_reporter(self.reporter.clone());
        let sink = self.target_file.as_ref().map(|path| {
            Sink::new(path, self.add_timestamps, &self.config).with_reporter(self.reporter.clone())
        });

        let shared = Shared {
            reader: Mutex::new(reader),
            filters: self.filters,
            buffer,
            metadata,
            callbacks: CallbackDispatcher::with_reporter(self.reporter.clone()),
            sink,
            stats: StatsCollector::default(),
            next_sequence: AtomicU64::new(0),
            paused: AtomicBool::new(false),
            last_event: Mutex::new(None),
            debounce: self.config.debounce(),
            reporter: self.reporter,
        };

        Ok(Interceptor {
            source_file: self.source_file,
            target_file: self.target_file,
            config: self.config,
            overflow_strategy,
            shared: Arc::new(shared),
            change_source: self.change_source,
            subscription: Mutex::new(None),
        })
    }
}

impl fmt::Debug for InterceptorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorBuilder")
            .field("source_file", &self.source_file)
            .field("target_file", &self.target_file)
            .field("allow_missing", &self.allow_missing)
            .field("use_buffer", &self.use_buffer)
            .field("buffer_size", &self.buffer_size)
            .field("filters", &self.filters.len())
            .field("config", &self.config)
            .field("add_timestamps", &self.add_timestamps)
            .finish_non_exhaustive()
    }
}

/// Canonical directory to watch, plus the source's file name.
fn watch_target(source: &Path) -> Result<(PathBuf, std::ffi::OsString)> {
    let file_name = source
        .file_name()
        .ok_or_else(|| {
            Error::InvalidConfig(format!("source file {} has no file name", source.display()))
        })?
        .to_os_string();
    let parent = match source.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    Ok((fs::canonicalize(parent)?, file_name))
}

/// Whether a path reported by the change source refers to the source file.
fn names_source(path: &Path, watched: &Path) -> bool {
    if path == watched {
        return true;
    }
    // Sources that report non-canonical paths (symlinked temp dirs, say).
    path.file_name() == watched.file_name()
        && path
            .parent()
            .and_then(|p| fs::canonicalize(p).ok())
            .is_some_and(|p| Some(p.as_path()) == watched.parent())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
