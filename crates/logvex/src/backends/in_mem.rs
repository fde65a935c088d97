//! # Previously, on logvex...
//!
//! 🎬 The cluster was down. The queue was somewhere else. The tests still had
//! to run. So we built an indexing client that lives entirely in RAM and a
//! source that is just a channel, gone the moment you blink.
//!
//! `in_mem` provides an in-memory [`IndexingClient`](crate::backends::IndexingClient)
//! that remembers every call in order (great for assertions, great for trust
//! issues) and an in-memory [`Source`](crate::backends::Source) fed by an
//! `async_channel` sender.
//!
//! 🦆
//!
//! ⚠️ Not for production. Unless production is a dry run, in which case: sure.

mod in_mem_index;
mod in_mem_source;

pub use in_mem_index::{InMemoryIndex, IndexCall};
pub use in_mem_source::InMemorySource;
