#![allow(dead_code)]

use logtap::{ChangeHandler, ChangeSource, Subscription};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Change source driven by the test instead of the filesystem.
#[derive(Clone, Default)]
pub struct ManualSource {
    state: Arc<Mutex<ManualState>>,
}

#[derive(Default)]
struct ManualState {
    handler: Option<ChangeHandler>,
    dir: Option<PathBuf>,
    subscriptions: usize,
}

impl ManualSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a change to `file_name` inside the subscribed directory.
    /// Does nothing when nobody is subscribed.
    pub fn fire(&self, file_name: &str) {
        let (handler, dir) = {
            let state = self.state.lock().unwrap();
            (state.handler.clone(), state.dir.clone())
        };
        if let (Some(handler), Some(dir)) = (handler, dir) {
            handler(&dir.join(file_name));
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.state.lock().unwrap().handler.is_some()
    }

    pub fn subscriptions(&self) -> usize {
        self.state.lock().unwrap().subscriptions
    }

    pub fn watched_dir(&self) -> Option<PathBuf> {
        self.state.lock().unwrap().dir.clone()
    }
}

impl ChangeSource for ManualSource {
    fn subscribe(
        &self,
        dir: &Path,
        handler: ChangeHandler,
    ) -> logtap::Result<Box<dyn Subscription>> {
        let mut state = self.state.lock().unwrap();
        state.handler = Some(handler);
        state.dir = Some(dir.to_path_buf());
        state.subscriptions += 1;
        Ok(Box::new(ManualSubscription {
            state: Arc::clone(&self.state),
        }))
    }
}

struct ManualSubscription {
    state: Arc<Mutex<ManualState>>,
}

impl Subscription for ManualSubscription {
    fn unsubscribe(self: Box<Self>, _timeout: Duration) {
        self.state.lock().unwrap().handler = None;
    }
}

/// Append `text` to `path`, creating it if needed.
pub fn append(path: &Path, text: &str) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.sync_data().unwrap();
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    condition()
}

/// Logger that keeps every record's message.
#[derive(Default)]
pub struct CapturedLog {
    records: Mutex<Vec<(log::Level, String)>>,
}

impl CapturedLog {
    pub fn messages(&self, level: log::Level) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl log::Log for CapturedLog {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        self.records
            .lock()
            .unwrap()
            .push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}
