//! Maps refreshed inbox messages to sensor states and attributes.
//!
//! Message payloads stay opaque JSON; only the Gmail fields read here
//! (`payload.headers`, `payload.parts`, `body.data`, `mimeType`, `filename`,
//! `snippet`) are looked up, and anything missing degrades to an empty value.

use crate::coordinator::InboxMessage;
use base64::prelude::*;
use gogcli_adapter::Thread;
use serde::Serialize;
use serde_json::Value;

/// State of a sensor slot with no message.
pub const EMPTY_STATE: &str = "Empty";

const MAX_STATE_CHARS: usize = 255;

/// Sensor view of one inbox message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmailSummary {
    /// `"<From> - <Subject>"`, at most 255 characters.
    pub state: String,
    /// The `Date` header.
    pub date_received: Option<String>,
    /// The `From` header.
    pub from: Option<String>,
    /// The `To` header.
    pub to: Option<String>,
    /// The `Subject` header.
    pub subject: Option<String>,
    /// Gmail message id.
    pub message_id: String,
    /// Gmail thread id.
    pub thread_id: Option<String>,
    /// Decoded `text/plain` body, falling back to the snippet.
    pub body_text: String,
    /// Decoded `text/html` body.
    pub body_html: Option<String>,
    /// Label ids of the message.
    pub labels: Vec<String>,
    /// Whether any part carries a filename.
    pub has_attachment: bool,
    /// Whether a later message in the thread carries the `SENT` label.
    pub have_replied: bool,
    /// Labelled `IMPORTANT`.
    pub priority: bool,
    /// Labelled `STARRED`.
    pub starred: bool,
    /// Labelled `UNREAD`.
    pub is_unread: bool,
}

impl EmailSummary {
    /// Builds the summary of one merged inbox message.
    #[must_use]
    pub fn from_inbox(item: &InboxMessage) -> Self {
        let message = &item.message;
        let payload = message.extra.get("payload").unwrap_or(&Value::Null);

        let from = header(payload, "From").map(str::to_string);
        let subject = header(payload, "Subject").map(str::to_string);
        let state = format!(
            "{} - {}",
            from.as_deref().unwrap_or("Unknown"),
            subject.as_deref().unwrap_or("No Subject")
        )
        .chars()
        .take(MAX_STATE_CHARS)
        .collect();

        let (body_text, body_html) = extract_body(payload);
        let body_text = body_text.unwrap_or_else(|| {
            message
                .extra
                .get("snippet")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        });

        Self {
            state,
            date_received: header(payload, "Date").map(str::to_string),
            from,
            to: header(payload, "To").map(str::to_string),
            subject,
            message_id: message.id.clone(),
            thread_id: message.thread_id.clone(),
            body_text,
            body_html,
            labels: message.label_ids.clone(),
            has_attachment: has_attachment(payload),
            have_replied: have_replied(&message.id, item.thread.as_ref()),
            priority: message.has_label("IMPORTANT"),
            starred: message.has_label("STARRED"),
            is_unread: message.has_label("UNREAD"),
        }
    }
}

/// States of `slots` sensors, filled in message order and padded with [`EMPTY_STATE`].
#[must_use]
pub fn sensor_states(messages: &[InboxMessage], slots: usize) -> Vec<String> {
    (0..slots)
        .map(|i| {
            messages
                .get(i)
                .map_or_else(|| EMPTY_STATE.to_string(), |m| EmailSummary::from_inbox(m).state)
        })
        .collect()
}

/// Markdown dashboard card listing the email sensors of one account.
const DASHBOARD_CARD_TEMPLATE: &str = r#"type: markdown
content: >
  {% set prefix = '@PREFIX@' %}
  <table style="width: 100%; border-collapse: collapse; border: none;">
    {% for i in range(1, @END@) %}
      {% set sensor = 'sensor.' ~ prefix ~ '_gmail_email_' ~ i %}
      {% if states(sensor) not in ['unknown', 'unavailable', 'Empty'] %}
      <tr style="border: none;">
        <td style="width: 30px; text-align: center;">
          {% if state_attr(sensor, 'priority') %}❗{% endif %}
        </td>
        <td style="width: 30px; text-align: center;">
          {% if state_attr(sensor, 'starred') %}⭐{% endif %}
        </td>
        <td style="width: 30px; text-align: center;">
          {% if state_attr(sensor, 'is_unread') %}✉️{% else %}📑{% endif %}
        </td>
        <td style="width: 30px; text-align: center;">
          {% if state_attr(sensor, 'have_replied') %}↩️{% endif %}
        </td>
        <td>
          {{ states(sensor) }}
        </td>
      </tr>
      {% endif %}
    {% endfor %}
  </table>
  {% set last_update = 'sensor.' ~ prefix ~ '_gmail_last_update' %}
  {% if states(last_update) not in ['unknown', 'unavailable', 'None'] %}
  <div style="text-align: right; margin-top: 10px; font-size: 0.8em; color: var(--secondary-text-color);">
    Last updated: {{ relative_time(as_datetime(states(last_update))) }} ago
  </div>
  {% endif %}
title: Recent Emails (@ACCOUNT@)"#;

/// Sensor entity prefix of an account: lowercase ASCII alphanumerics, with
/// every run of other characters collapsed into one `_`.
#[must_use]
pub fn entity_prefix(account: &str) -> String {
    let mut prefix = String::with_capacity(account.len());
    for c in account.chars() {
        if c.is_ascii_alphanumeric() {
            prefix.push(c.to_ascii_lowercase());
        } else if !prefix.is_empty() && !prefix.ends_with('_') {
            prefix.push('_');
        }
    }
    prefix.trim_end_matches('_').to_string()
}

/// Dashboard card YAML showing the first `slots` email sensors of `account`.
#[must_use]
pub fn dashboard_card(account: &str, slots: usize) -> String {
    DASHBOARD_CARD_TEMPLATE
        .replace("@PREFIX@", &entity_prefix(account))
        .replace("@END@", &slots.saturating_add(1).to_string())
        .replace("@ACCOUNT@", account)
}

/// Value of the first header called `name` in a message payload.
#[must_use]
pub fn header<'a>(payload: &'a Value, name: &str) -> Option<&'a str> {
    payload
        .get("headers")?
        .as_array()?
        .iter()
        .find(|h| {
            h.get("name")
                .and_then(Value::as_str)
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })?
        .get("value")?
        .as_str()
}

fn parts(part: &Value) -> &[Value] {
    part.get("parts")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn has_attachment(part: &Value) -> bool {
    let named = part
        .get("filename")
        .and_then(Value::as_str)
        .is_some_and(|f| !f.is_empty());
    named || parts(part).iter().any(has_attachment)
}

/// A reply is any `SENT` message after `message_id` in the thread.
fn have_replied(message_id: &str, thread: Option<&Thread>) -> bool {
    let Some(thread) = thread else {
        return false;
    };
    thread
        .messages
        .iter()
        .skip_while(|m| m.id != message_id)
        .skip(1)
        .any(|m| m.label_ids.iter().any(|l| l == "SENT"))
}

/// First `text/plain` and first `text/html` body, searching the part tree depth first.
fn extract_body(part: &Value) -> (Option<String>, Option<String>) {
    let mut text = None;
    let mut html = None;

    if let Some(decoded) = part
        .get("body")
        .and_then(|b| b.get("data"))
        .and_then(Value::as_str)
        .and_then(decode_body)
    {
        match part.get("mimeType").and_then(Value::as_str) {
            Some("text/plain") => text = Some(decoded),
            Some("text/html") => html = Some(decoded),
            _ => {}
        }
    }

    for child in parts(part) {
        let (child_text, child_html) = extract_body(child);
        if text.is_none() {
            text = child_text;
        }
        if html.is_none() {
            html = child_html;
        }
    }
    (text, html)
}

/// Decodes Gmail body data. Gmail uses URL-safe base64 but padding varies.
fn decode_body(data: &str) -> Option<String> {
    let decoders: [&base64::engine::GeneralPurpose; 4] = [
        &BASE64_URL_SAFE_NO_PAD,
        &BASE64_URL_SAFE,
        &BASE64_STANDARD,
        &BASE64_STANDARD_NO_PAD,
    ];
    decoders
        .iter()
        .find_map(|engine| engine.decode(data).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use gogcli_adapter::Message;
    use serde_json::json;

    fn inbox(raw: Value, thread: Option<Value>) -> InboxMessage {
        InboxMessage {
            message: serde_json::from_value::<Message>(raw).unwrap(),
            thread: thread.map(|t| serde_json::from_value(t).unwrap()),
        }
    }

    fn b64(s: &str) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(s)
    }

    #[test]
    fn multipart_message_is_summarised() {
        let item = inbox(
            json!({
                "id": "m1",
                "threadId": "t1",
                "labelIds": ["INBOX", "UNREAD", "STARRED"],
                "snippet": "snippet text",
                "payload": {
                    "mimeType": "multipart/mixed",
                    "headers": [
                        {"name": "From", "value": "Alice <alice@example.com>"},
                        {"name": "To", "value": "me@gmail.com"},
                        {"name": "Subject", "value": "Lunch?"},
                        {"name": "Date", "value": "Mon, 1 Jan 2024 12:00:00 +0000"}
                    ],
                    "parts": [
                        {
                            "mimeType": "multipart/alternative",
                            "parts": [
                                {"mimeType": "text/plain", "body": {"data": b64("Noon works?")}},
                                {"mimeType": "text/html", "body": {"data": b64("<p>Noon works?</p>")}}
                            ]
                        },
                        {"mimeType": "application/pdf", "filename": "menu.pdf", "body": {"attachmentId": "a1"}}
                    ]
                }
            }),
            Some(json!({
                "id": "t1",
                "messages": [
                    {"id": "m1", "labelIds": ["INBOX"]},
                    {"id": "m2", "labelIds": ["SENT"]}
                ]
            })),
        );

        let summary = EmailSummary::from_inbox(&item);

        assert_eq!(summary.state, "Alice <alice@example.com> - Lunch?");
        assert_eq!(summary.to.as_deref(), Some("me@gmail.com"));
        assert_eq!(summary.date_received.as_deref(), Some("Mon, 1 Jan 2024 12:00:00 +0000"));
        assert_eq!(summary.body_text, "Noon works?");
        assert_eq!(summary.body_html.as_deref(), Some("<p>Noon works?</p>"));
        assert!(summary.has_attachment);
        assert!(summary.have_replied);
        assert!(summary.is_unread);
        assert!(summary.starred);
        assert!(!summary.priority);
        assert_eq!(summary.thread_id.as_deref(), Some("t1"));
    }

    #[test]
    fn missing_fields_degrade() {
        let item = inbox(json!({"id": "m1", "snippet": "just a snippet"}), None);

        let summary = EmailSummary::from_inbox(&item);

        assert_eq!(summary.state, "Unknown - No Subject");
        assert_eq!(summary.body_text, "just a snippet");
        assert_eq!(summary.body_html, None);
        assert!(!summary.has_attachment);
        assert!(!summary.have_replied);
    }

    #[test]
    fn earlier_sent_message_is_not_a_reply() {
        let thread: Thread = serde_json::from_value(json!({
            "messages": [
                {"id": "m0", "labelIds": ["SENT"]},
                {"id": "m1", "labelIds": ["INBOX"]}
            ]
        }))
        .unwrap();
        assert!(!have_replied("m1", Some(&thread)));
        assert!(!have_replied("unknown", Some(&thread)));
    }

    #[test]
    fn state_is_truncated() {
        let subject = "x".repeat(400);
        let item = inbox(
            json!({"id": "m1", "payload": {"headers": [
                {"name": "From", "value": "a@b.c"},
                {"name": "Subject", "value": subject}
            ]}}),
            None,
        );
        assert_eq!(EmailSummary::from_inbox(&item).state.chars().count(), 255);
    }

    #[test]
    fn padded_body_and_invalid_data() {
        assert_eq!(decode_body("SGVsbG8sIFdvcmxkIQ==").as_deref(), Some("Hello, World!"));
        assert_eq!(decode_body("SGVsbG8sIFdvcmxkIQ").as_deref(), Some("Hello, World!"));
        assert_eq!(decode_body("!!not base64!!"), None);
    }

    #[test]
    fn entity_prefix_collapses_separators() {
        assert_eq!(entity_prefix("Me@Gmail.com"), "me_gmail_com");
        assert_eq!(entity_prefix("first.last+tag@example.co.uk"), "first_last_tag_example_co_uk");
        assert_eq!(entity_prefix("__x__"), "x");
    }

    #[test]
    fn dashboard_card_targets_the_account_sensors() {
        let card = dashboard_card("Me@Gmail.com", 5);
        assert!(card.starts_with("type: markdown\n"));
        assert!(card.contains("{% set prefix = 'me_gmail_com' %}"));
        assert!(card.contains("range(1, 6)"));
        assert!(card.contains("{{ states(sensor) }}"));
        assert!(card.ends_with("title: Recent Emails (Me@Gmail.com)"));
        assert!(!card.contains("@PREFIX@") && !card.contains("@END@"));
    }

    #[test]
    fn slots_are_padded_with_empty() {
        let items = vec![inbox(json!({"id": "m1"}), None)];
        assert_eq!(
            sensor_states(&items, 3),
            vec!["Unknown - No Subject", EMPTY_STATE, EMPTY_STATE]
        );
    }
}
