//! Typed events carried over the live dashboard channel.
//!
//! Every inbound frame is one JSON object of the form `{type, payload}`.
//! The same shapes are synthesized by the polling fallback so subscribers
//! never need to know which transport delivered an event.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// One decoded server push, tagged by its wire `type`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Full refresh of the dashboard KPI counters.
    KpiUpdate(KpiSnapshot),
    /// A loan transaction was recorded (borrow or return).
    NewTransaction(TransactionNotice),
    /// Free-form activity feed line.
    UserActivity(ActivityNotice),
    /// Operator-facing alert banner.
    SystemAlert(AlertNotice),
    /// A single book flipped between available and borrowed.
    BookStatusChange(BookStatusNotice),
    /// Server-side keepalive; carries no payload.
    Heartbeat,
}

/// KPI counter values keyed by metric name (e.g. `total_books`).
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct KpiSnapshot {
    /// Metric name to current integer value.
    pub values: BTreeMap<String, i64>,
}

/// Payload of a `new_transaction` event.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TransactionNotice {
    /// Transaction kind as reported by the server (`borrow` or `return`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Title of the affected book.
    pub book_title: String,
    /// Display name of the member involved.
    pub member_name: String,
}

/// Payload of a `user_activity` event.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ActivityNotice {
    /// Human-readable activity line.
    pub message: String,
    /// When the activity happened (RFC 3339 on the wire).
    pub timestamp: DateTime<Utc>,
}

/// Payload of a `system_alert` event.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AlertNotice {
    /// Severity label as sent by the server (`success`, `info`, `warning`,
    /// `danger`); passed through untyped since it is display data.
    pub level: String,
    /// Short alert title.
    pub title: String,
    /// Longer alert body.
    pub message: String,
}

/// Payload of a `book_status_change` event.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BookStatusNotice {
    /// ISBN identifying the book.
    pub isbn: String,
    /// New availability of the book.
    pub status: BookAvailability,
}

/// Availability states a book can report over the channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookAvailability {
    /// The book can be borrowed.
    Available,
    /// All copies are out on loan.
    Borrowed,
}

impl std::fmt::Display for BookAvailability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available => f.write_str("available"),
            Self::Borrowed => f.write_str("borrowed"),
        }
    }
}

/// A frame the client writes to the channel, mirroring the inbound envelope.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct OutboundMessage {
    /// Wire `type` tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// Optional payload object; omitted from the frame when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl OutboundMessage {
    /// Build an outbound frame with a payload.
    ///
    /// Inputs: `kind` wire tag; `payload` JSON body.
    ///
    /// Output: Frame ready for [`OutboundMessage::to_frame`].
    #[must_use]
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload: Some(payload),
        }
    }

    /// The keepalive frame sent on the heartbeat interval.
    #[must_use]
    pub fn ping() -> Self {
        Self {
            kind: "ping".into(),
            payload: None,
        }
    }

    /// Serialize to one textual frame. The field types here cannot fail to
    /// serialize, so an empty string only occurs on allocator failure.
    #[must_use]
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// What: Decode one raw channel frame into an [`InboundEvent`].
///
/// Inputs:
/// - `raw`: Textual frame as received from the transport.
///
/// Output:
/// - `Ok(InboundEvent)` for a well-formed `{type, payload}` object; `Err`
///   for malformed JSON or an unknown `type` tag.
///
/// # Errors
/// - Returns the underlying `serde_json` error; the channel manager logs it
///   and skips the frame rather than treating it as a channel loss.
pub fn decode_frame(raw: &str) -> Result<InboundEvent, serde_json::Error> {
    serde_json::from_str(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// What: Each wire `type` decodes into its typed variant.
    ///
    /// - Input: Representative frames for every event kind
    /// - Output: Matching `InboundEvent` variants with parsed payloads
    fn event_decodes_every_variant() {
        let ev = decode_frame(r#"{"type":"kpi_update","payload":{"total_books":120,"active_loans":7}}"#)
            .expect("kpi frame");
        match ev {
            InboundEvent::KpiUpdate(snap) => {
                assert_eq!(snap.values.get("total_books"), Some(&120));
                assert_eq!(snap.values.get("active_loans"), Some(&7));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let ev = decode_frame(
            r#"{"type":"new_transaction","payload":{"type":"borrow","book_title":"Dune","member_name":"Ada"}}"#,
        )
        .expect("transaction frame");
        match ev {
            InboundEvent::NewTransaction(tx) => {
                assert_eq!(tx.kind, "borrow");
                assert_eq!(tx.book_title, "Dune");
                assert_eq!(tx.member_name, "Ada");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let ev = decode_frame(
            r#"{"type":"user_activity","payload":{"message":"Ada joined","timestamp":"2026-08-22T10:15:00Z"}}"#,
        )
        .expect("activity frame");
        match ev {
            InboundEvent::UserActivity(act) => {
                assert_eq!(act.message, "Ada joined");
                assert_eq!(act.timestamp.to_rfc3339(), "2026-08-22T10:15:00+00:00");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let ev = decode_frame(
            r#"{"type":"system_alert","payload":{"level":"warning","title":"Backup","message":"Backup overdue"}}"#,
        )
        .expect("alert frame");
        assert!(matches!(ev, InboundEvent::SystemAlert(a) if a.level == "warning"));

        let ev = decode_frame(
            r#"{"type":"book_status_change","payload":{"isbn":"9780441013593","status":"borrowed"}}"#,
        )
        .expect("status frame");
        match ev {
            InboundEvent::BookStatusChange(ch) => {
                assert_eq!(ch.isbn, "9780441013593");
                assert_eq!(ch.status, BookAvailability::Borrowed);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let ev = decode_frame(r#"{"type":"heartbeat"}"#).expect("heartbeat frame");
        assert_eq!(ev, InboundEvent::Heartbeat);
    }

    #[test]
    /// What: Unknown tags and malformed JSON are rejected, not coerced.
    ///
    /// - Input: Unknown `type`, missing payload field, broken JSON
    /// - Output: Decode errors for each
    fn event_rejects_malformed_frames() {
        assert!(decode_frame(r#"{"type":"mystery","payload":{}}"#).is_err());
        assert!(decode_frame(r#"{"type":"book_status_change","payload":{"isbn":"x"}}"#).is_err());
        assert!(decode_frame("not json").is_err());
    }

    #[test]
    /// What: The ping frame matches the wire contract exactly.
    ///
    /// - Input: `OutboundMessage::ping` and a payload-carrying message
    /// - Output: `{"type":"ping"}` and payload included under `payload`
    fn event_outbound_frames() {
        assert_eq!(OutboundMessage::ping().to_frame(), r#"{"type":"ping"}"#);
        let msg = OutboundMessage::new("ack", serde_json::json!({"id": 3}));
        assert_eq!(msg.to_frame(), r#"{"type":"ack","payload":{"id":3}}"#);
    }
}
