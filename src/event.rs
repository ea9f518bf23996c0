use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::value::RawValue;

use crate::{EventId, Result};

/// A sequenced payload as broadcast by the broker.
///
/// Events are immutable once created. The broker wraps each one in an `Arc`
/// so every client delivery shares the same allocation.
///
/// The payload is opaque to the broker. It is only interpreted when the
/// event is framed for the wire by [`Event::to_json`], which embeds it as a
/// compacted JSON value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    id: EventId,
    received_at: DateTime<Utc>,
    payload: Bytes,
}

#[derive(Serialize)]
struct Frame<'a> {
    #[serde(rename = "ID")]
    id: EventId,
    #[serde(rename = "ReceivedAt")]
    received_at: &'a DateTime<Utc>,
    #[serde(rename = "Data")]
    data: &'a RawValue,
}

impl Event {
    pub(crate) fn new(id: EventId, payload: Bytes) -> Self {
        Self {
            id,
            received_at: Utc::now(),
            payload,
        }
    }

    /// Sequence number assigned by the broker, starting at 0.
    #[inline]
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Wall-clock time at which the broker accepted the payload.
    #[inline]
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Payload bytes exactly as published.
    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Encode the event as `{"ID":..,"ReceivedAt":..,"Data":..}`.
    ///
    /// The payload keeps its key order and number formatting, only the
    /// whitespace between tokens is removed, so the result is always a
    /// single line.
    ///
    /// Fails with [`Error::Json`](crate::Error::Json) if the payload is not a
    /// valid JSON document.
    pub fn to_json(&self) -> Result<String> {
        let raw: &RawValue = serde_json::from_slice(&self.payload)?;
        let data = RawValue::from_string(compact(raw.get()))?;
        let frame = Frame {
            id: self.id,
            received_at: &self.received_at,
            data: &data,
        };
        Ok(serde_json::to_string(&frame)?)
    }
}

/// Strip insignificant whitespace from an already validated JSON document.
fn compact(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in json.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
            out.push(c);
        } else if !matches!(c, ' ' | '\t' | '\n' | '\r') {
            out.push(c);
        }
    }
    out
}
