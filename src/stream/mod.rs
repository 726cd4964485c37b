pub mod driver;
pub mod reconstruct;
pub mod session;
pub mod sse;

use std::pin::Pin;

use futures_util::Stream;

pub use driver::{drive_lifecycle_stream, DriverOptions};
pub use reconstruct::{SessionOptions, StreamReconstructor};
pub use session::{ItemKind, SessionState, SummaryPartStatus};
pub use sse::{sse_frame_stream, SseEvent, SseParser};

use crate::protocol::canonical::LifecycleEvent;

/// Caller-facing lifecycle event stream returned by `do_stream`.
pub type LifecycleStream = Pin<Box<dyn Stream<Item = LifecycleEvent> + Send>>;
