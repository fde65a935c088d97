//! 🧵 Workers: the ones who actually do the work while the Supervisor takes all
//! the credit in the sprint retro.
//!
//! Three of them, all sharing one [`IngestionBuffer`](crate::buffer::IngestionBuffer):
//! - [`ConsumerWorker`]: pulls deliveries, decodes, appends, acks.
//! - [`FlushWorker`]: the metronome. Every `flush_interval`, `flush_all`.
//! - [`RotationWorker`]: sleeps until the schedule says "now", then rotates.
//!
//! ⚠️ "If you're reading this, the code review went poorly."

use anyhow::Result;
use tokio::task::JoinHandle;

mod consumer_worker;
mod flush_worker;
mod rotation_worker;

pub(crate) use consumer_worker::ConsumerWorker;
pub(crate) use flush_worker::FlushWorker;
pub(crate) use rotation_worker::RotationWorker;

/// 🏗️ A background worker, that does work. duh.
///
/// "What's the DEAL with lifetime annotations? You borrow something,
///  you give it back. It's not that hard, Jerry!" (Seinfeld, on Rust)
pub(crate) trait Worker {
    /// 🚀 Start the worker. Returns a JoinHandle because we trust
    /// but verify. Mostly verify.
    fn start(self) -> JoinHandle<Result<()>>;
}
