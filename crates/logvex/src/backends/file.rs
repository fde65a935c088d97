//! 📂 Previously, on "Things That Could Go Wrong With A File"...
//!
//! Somebody exported a queue to disk. One delivery per line. Some lines say
//! `DONE`. Some lines are envelopes. One line, inevitably, is half an envelope
//! because the export was interrupted by a laptop lid.
//!
//! This module replays such a file as if it were the live queue: one delivery
//! per non-blank line, tagged with its line number, acked into the void.
//!
//! 🚰 File → BufReader → Delivery → ConsumerWorker → IngestionBuffer
//! 🦆 (mandatory, no notes)

mod file_source;

pub use file_source::{FileSource, FileSourceConfig};
