//! Tail a growing log file and hand every new line to in-memory buffers,
//! callbacks and an optional sink file.
//!
//! An [`Interceptor`] watches the directory of one source file. Each change
//! notification reads the bytes appended since the last one, splits them into
//! lines, runs them through the configured [`Filter`]s and distributes the
//! survivors. Truncation and rotation reset the read position; I/O failures
//! are logged and retried on the next notification.
//!
//! ```no_run
//! use logtap::{Callback, Interceptor, PatternFilter};
//!
//! let interceptor = Interceptor::builder("app.log")
//!     .use_buffer(true)
//!     .filter(PatternFilter::blacklist("DEBUG").unwrap())
//!     .build()
//!     .unwrap();
//!
//! interceptor.add_callback(&Callback::new("stdout", |line, _ts, id| {
//!     print!("{id}: {line}");
//!     Ok(())
//! }));
//!
//! interceptor.start().unwrap();
//! // ...
//! interceptor.stop();
//! println!("{:?}", interceptor.stats());
//! ```

mod buffer;
mod config;
mod dispatch;
mod error;
mod event;
mod filter;
mod interceptor;
mod reader;
mod report;
mod sink;
mod stats;
pub mod watch;

pub use buffer::{OverflowStrategy, RingBuffer};
pub use config::{Config, ConfigOverrides, Encoding};
pub use dispatch::{Callback, CallbackDispatcher, CallbackError};
pub use error::{Error, Result};
pub use event::LineMetadata;
pub use filter::{
    Combinator, CompositeFilter, Filter, FilterMode, PatternFilter, PredicateFilter, accept_all,
};
pub use interceptor::{Interceptor, InterceptorBuilder, RunGuard};
pub use reader::TailReader;
pub use sink::Sink;
pub use stats::Stats;
pub use watch::{ChangeHandler, ChangeSource, NotifySource, Subscription};
