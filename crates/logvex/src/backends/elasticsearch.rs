//! # 📡 THE ELASTICSEARCH BACKEND
//!
//! *Previously, on logvex...*
//!
//! The buffer filled up. A thousand documents, standing in line, tapping their
//! feet. Somebody had to take them to the cluster. This module is that somebody.
//!
//! 🚀 Two jobs: POST batches to `_bulk`, and wipe-then-create indices at rotation.
//! It does not retry. It does not buffer. It does what it's told and reports back
//! honestly, which is more than can be said for most HTTP APIs.
//!
//! 🦆 (mandatory duck, no context provided, none shall be requested)

mod elasticsearch_index;

pub use elasticsearch_index::{ElasticsearchIndex, ElasticsearchIndexConfig};
