//! 📦 Common data structures: the building blocks of logvex.
//!
//! 🎬 COLD OPEN: INT. MESSAGE QUEUE, 11:58 PM
//!
//! A delivery arrives. It is either the word `DONE` (a polite upstream saying
//! "that's all for now") or a JSON envelope carrying a category and a document.
//! The envelope gets opened here. The document inside gets a [`Category`] stamped
//! on its forehead and is sent off to the buffer, where it waits in line like
//! everyone else.
//!
//! 🦆
//!
//! Nothing in this module holds state. It's value types and one decoder.
//! The postal workers of the codebase. Please tip your postal workers.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::value::RawValue;

/// 🏷️ The closed set of document families. Each family gets its own index.
///
/// `Unknown` exists so that decoding never has to fail over a category label
/// it doesn't recognize. Unknown documents are dropped by the buffer without
/// ceremony, journal entry or upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Event,
    Consumption,
    Unknown,
}

impl Category {
    /// 🔤 Parse the label upstream puts in the delivery envelope.
    /// Anything we don't know becomes `Unknown`. No drama, no error.
    pub fn from_label(label: &str) -> Self {
        match label {
            "Event" => Category::Event,
            "Consumption" => Category::Consumption,
            _ => Category::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Event => "Event",
            Category::Consumption => "Consumption",
            Category::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 🎯 A single `Document`: one category, one opaque JSON payload, zero opinions.
///
/// The payload is kept as raw JSON text and shipped verbatim as a `_bulk`
/// source line, and embedded verbatim in the recovery journal. We never parse
/// it into a `Value`. We just make sure, once, at birth, that it IS json,
/// so nothing downstream has to find out the hard way.
///
/// Immutable once built. Moved or cloned between the queue, the journal and the
/// in-flight upload, never shared mutably.
#[derive(Debug, Clone)]
pub struct Document {
    category: Category,
    payload: Box<RawValue>,
}

impl Document {
    /// 🏗️ Build a document from a category and a JSON payload.
    ///
    /// # Errors
    /// 💀 If the payload isn't well-formed JSON. Garbage in, error out.
    pub fn new(category: Category, payload: impl Into<String>) -> Result<Self> {
        let payload = RawValue::from_string(payload.into()).context(
            "💀 A document payload showed up claiming to be JSON. It was not JSON. \
             We checked its papers at the door and turned it away.",
        )?;
        Ok(Self { category, payload })
    }

    /// 🔧 Wrap an already-validated raw value. Used by decoding and journal replay,
    /// where serde has done the checking for us.
    pub(crate) fn from_raw(category: Category, payload: Box<RawValue>) -> Self {
        Self { category, payload }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// 📦 The raw JSON text, exactly as it arrived.
    pub fn payload(&self) -> &str {
        self.payload.get()
    }

    pub(crate) fn raw_payload(&self) -> &RawValue {
        &self.payload
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.category == other.category && self.payload() == other.payload()
    }
}

impl Eq for Document {}

/// 📬 One unit pulled off the message consumer. `tag` is what we hand back on ack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: u64,
    pub body: Vec<u8>,
}

/// 🛑 The upstream synchronization token. Acked and otherwise ignored.
pub const DONE_TOKEN: &[u8] = b"DONE";

/// 🎁 What a delivery turned out to be once we opened it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// The control token. Nothing to buffer.
    Done,
    Document(Document),
}

// 📨 The envelope upstream wraps every document in:
// {"category": "Event", "document": { ...anything... }}
#[derive(Deserialize)]
struct Envelope {
    category: String,
    document: Box<RawValue>,
}

/// 🔓 Open a delivery body.
///
/// Leading/trailing whitespace is forgiven (queues love a trailing newline).
/// Unknown category labels decode fine, to `Category::Unknown`.
///
/// # Errors
/// 💀 If the body is neither `DONE` nor a valid envelope. The caller logs it,
/// acks it and moves on. A malformed delivery is not worth a crash.
pub fn decode_delivery(body: &[u8]) -> Result<Decoded> {
    let trimmed = body.trim_ascii();
    if trimmed == DONE_TOKEN {
        return Ok(Decoded::Done);
    }
    let envelope: Envelope = serde_json::from_slice(trimmed).context(
        "💀 Delivery body is neither 'DONE' nor a {\"category\", \"document\"} envelope. \
         We squinted at it from several angles. Still not an envelope.",
    )?;
    Ok(Decoded::Document(Document::from_raw(
        Category::from_label(&envelope.category),
        envelope.document,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_done_is_just_a_polite_goodbye() -> Result<()> {
        assert_eq!(decode_delivery(b"DONE")?, Decoded::Done);
        assert_eq!(decode_delivery(b"  DONE\n")?, Decoded::Done);
        Ok(())
    }

    #[test]
    fn the_one_where_an_event_envelope_opens_cleanly() -> Result<()> {
        let decoded =
            decode_delivery(br#"{"category":"Event","document":{"msg":"boot","level":3}}"#)?;
        let Decoded::Document(document) = decoded else {
            panic!("💀 expected a document, got the control token");
        };
        assert_eq!(document.category(), Category::Event);
        // 📦 payload survives byte-for-byte, key order and all
        assert_eq!(document.payload(), r#"{"msg":"boot","level":3}"#);
        Ok(())
    }

    #[test]
    fn the_one_where_a_stranger_category_becomes_unknown() -> Result<()> {
        let decoded = decode_delivery(br#"{"category":"Telemetry","document":[1,2]}"#)?;
        let Decoded::Document(document) = decoded else {
            panic!("💀 expected a document");
        };
        assert_eq!(document.category(), Category::Unknown);
        Ok(())
    }

    #[test]
    fn the_one_where_garbage_is_refused_at_the_door() {
        assert!(decode_delivery(b"not json at all").is_err());
        assert!(decode_delivery(br#"{"category":"Event"}"#).is_err());
        assert!(decode_delivery(b"").is_err());
    }

    #[test]
    fn the_one_where_documents_must_be_json() {
        assert!(Document::new(Category::Event, r#"{"ok":true}"#).is_ok());
        assert!(Document::new(Category::Event, r#""just a string""#).is_ok());
        assert!(Document::new(Category::Event, "{half a brace").is_err());
    }

    #[test]
    fn the_one_where_labels_round_trip() {
        for category in [Category::Event, Category::Consumption] {
            assert_eq!(Category::from_label(category.as_str()), category);
        }
        assert_eq!(Category::from_label("event"), Category::Unknown);
    }
}
