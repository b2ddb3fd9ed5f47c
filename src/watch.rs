//! Change notifications for the watched directory.
//!
//! The interceptor only needs to hear, at least once and shortly after, that
//! something in the source file's directory changed. [`ChangeSource`] is that
//! seam; [`NotifySource`] implements it on top of the platform watcher picked
//! by [`notify`].

use crate::error::Result;
use crate::report::TARGET;
use notify::event::{EventKind, ModifyKind};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Called with the path of each changed entry.
pub type ChangeHandler = Arc<dyn Fn(&Path) + Send + Sync>;

/// Something that can report changes inside a directory.
pub trait ChangeSource: Send + Sync {
    /// Start delivering changes under `dir` (non-recursively) to `handler`.
    ///
    /// The handler runs on a thread owned by the source.
    fn subscribe(&self, dir: &Path, handler: ChangeHandler) -> Result<Box<dyn Subscription>>;
}

/// A live registration returned by [`ChangeSource::subscribe`].
pub trait Subscription: Send {
    /// Stop delivering changes, waiting at most `timeout` for an in-flight
    /// handler call to finish.
    fn unsubscribe(self: Box<Self>, timeout: Duration);
}

/// [`ChangeSource`] backed by [`notify::RecommendedWatcher`].
///
/// Raw watcher events are forwarded to a dedicated dispatch thread, which
/// calls the handler for every created or data-modified path.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifySource;

impl NotifySource {
    pub fn new() -> Self {
        NotifySource
    }
}

impl ChangeSource for NotifySource {
    fn subscribe(&self, dir: &Path, handler: ChangeHandler) -> Result<Box<dyn Subscription>> {
        let (tx, rx) = mpsc::channel::<notify::Result<notify::Event>>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            // The receiver only goes away once the subscription is torn down.
            let _ = tx.send(res);
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        let (done_tx, done_rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("logtap-watch".to_string())
            .spawn(move || {
                for res in rx {
                    match res {
                        Ok(event) if is_change(&event.kind) => {
                            for path in &event.paths {
                                handler(path);
                            }
                        }
                        Ok(_) => {}
                        Err(e) => log::warn!(target: TARGET, "watch error: {e}"),
                    }
                }
                let _ = done_tx.send(());
            })?;

        Ok(Box::new(NotifySubscription {
            watcher,
            done: done_rx,
            thread,
        }))
    }
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any)
    )
}

struct NotifySubscription {
    watcher: RecommendedWatcher,
    done: Receiver<()>,
    thread: JoinHandle<()>,
}

impl Subscription for NotifySubscription {
    fn unsubscribe(self: Box<Self>, timeout: Duration) {
        let NotifySubscription {
            watcher,
            done,
            thread,
        } = *self;

        // Dropping the watcher closes the event channel, which ends the
        // dispatch loop once any in-flight handler call returns.
        drop(watcher);

        match done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = thread.join();
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    target: TARGET,
                    "watch thread still busy after {timeout:?}; detaching it"
                );
            }
        }
    }
}

impl fmt::Debug for NotifySubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifySubscription").finish_non_exhaustive()
    }
}
