//! Fan-out of captured lines to registered callbacks.

use crate::report::{Reporter, report};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Error a callback may return. It is logged and otherwise ignored.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

type CallbackFn = dyn Fn(&str, f64, u64) -> Result<(), CallbackError> + Send + Sync;

/// A named consumer of captured lines.
///
/// Receives the raw line (with its newline), the capture timestamp in epoch
/// seconds and the sequence id. Clones share identity: registering a clone of
/// an already registered callback is a no-op, and any clone can remove it.
///
/// # Examples
///
/// ```
/// use logtap::Callback;
///
/// let printer = Callback::new("printer", |line, _ts, id| {
///     print!("#{id} {line}");
///     Ok(())
/// });
/// assert_eq!(printer.name(), "printer");
/// assert_eq!(printer, printer.clone());
/// ```
#[derive(Clone)]
pub struct Callback {
    name: Arc<str>,
    func: Arc<CallbackFn>,
}

impl Callback {
    pub fn new<F>(name: impl Into<Arc<str>>, func: F) -> Self
    where
        F: Fn(&str, f64, u64) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        Callback {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, line: &str, timestamp: f64, sequence_id: u64) -> Result<(), CallbackError> {
        (self.func)(line, timestamp, sequence_id)
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl Eq for Callback {}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").field("name", &self.name).finish()
    }
}

/// Registry of callbacks, invoked in registration order.
#[derive(Debug, Default)]
pub struct CallbackDispatcher {
    callbacks: Mutex<Vec<Callback>>,
    reporter: Reporter,
}

impl CallbackDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_reporter(reporter: Reporter) -> Self {
        CallbackDispatcher {
            callbacks: Mutex::default(),
            reporter,
        }
    }

    /// Register `callback` unless it is already registered.
    pub fn add(&self, callback: &Callback) {
        let mut callbacks = self.lock();
        if !callbacks.contains(callback) {
            callbacks.push(callback.clone());
        }
    }

    /// Unregister `callback`. Unknown callbacks are ignored.
    pub fn remove(&self, callback: &Callback) {
        self.lock().retain(|c| c != callback);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Invoke every registered callback with one line.
    ///
    /// The registry lock is released before any callback runs, so callbacks
    /// may add or remove callbacks. A callback that returns an error or
    /// panics is logged and the remaining callbacks still run.
    pub fn dispatch(&self, line: &str, timestamp: f64, sequence_id: u64) {
        let callbacks = self.lock().clone();

        for callback in &callbacks {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                callback.call(line, timestamp, sequence_id)
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => report!(
                    self.reporter,
                    Error,
                    "error in callback {}: {e}",
                    callback.name()
                ),
                Err(payload) => report!(
                    self.reporter,
                    Error,
                    "callback {} panicked: {}",
                    callback.name(),
                    panic_message(payload.as_ref())
                ),
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Callback>> {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}
