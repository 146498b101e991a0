//! Session-aware parser for stream-json output
//!
//! The CLI's streaming output is newline-delimited JSON mixed with noise
//! (partial lines, progress text). This parser makes a single forward pass
//! over the captured stdout, scraping the best-known session ID and content
//! rather than enforcing a strict protocol. Lines that fail to decode are
//! skipped and counted, never escalated.

use serde_json::Value;

use crate::types::events::{ContentBlock, StreamEvent};

/// Fields recovered from one streaming-json transcript
#[derive(Debug, Clone, Default)]
pub struct ParsedTranscript {
    /// Best-known content; empty when no event supplied any
    pub content: String,
    /// Best-known session ID
    pub session_id: Option<String>,
    /// Full terminal `result` record, when one was observed
    pub raw_result: Option<Value>,
    /// Whether the terminal record flagged an error
    pub is_error: bool,
    /// Error text from the terminal record, when flagged
    pub error: Option<String>,
    /// Lines that failed to decode as JSON
    pub skipped_lines: usize,
}

/// Parse the captured stdout of one streaming-json invocation.
///
/// Priority rules, in transcript order:
/// - `system`/`init` sets the session ID first-wins;
/// - each `assistant` text block overwrites the content (later fragments
///   replace earlier ones; the terminal record is authoritative anyway) and
///   fills the session ID if still unset;
/// - a `result` record unconditionally overwrites content and session ID and
///   is captured verbatim.
#[must_use]
pub fn parse_transcript(stdout: &str) -> ParsedTranscript {
    let mut parsed = ParsedTranscript::default();
    let mut saw_event = false;
    let mut lines_seen = 0usize;

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        lines_seen += 1;

        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(_) => {
                parsed.skipped_lines += 1;
                continue;
            }
        };

        match StreamEvent::from_value(value.clone()) {
            StreamEvent::System {
                subtype,
                session_id,
            } => {
                saw_event = true;
                if subtype == "init" && parsed.session_id.is_none() {
                    parsed.session_id = session_id;
                }
            }
            StreamEvent::Assistant {
                message,
                session_id,
            } => {
                saw_event = true;
                for block in &message.content {
                    if let ContentBlock::Text { text } = block {
                        parsed.content = text.clone();
                    }
                }
                if parsed.session_id.is_none() {
                    parsed.session_id = session_id;
                }
            }
            StreamEvent::Result {
                is_error,
                result,
                error,
                session_id,
            } => {
                saw_event = true;
                parsed.is_error = is_error;
                if is_error {
                    let message = error
                        .clone()
                        .or_else(|| result.clone())
                        .unwrap_or_else(|| "Unknown error".to_string());
                    log::error!("CLI reported error result: {message}");
                    parsed.content = format!("Error: {message}");
                    parsed.error = Some(message);
                } else {
                    parsed.content = result.clone().unwrap_or_default();
                }
                if session_id.is_some() {
                    parsed.session_id = session_id;
                }
                parsed.raw_result = Some(value);
            }
            StreamEvent::Unknown(value) => {
                // Single whole-document JSON responses (the `json` output
                // format) land here; scrape them once when nothing else
                // matched.
                if !saw_event && lines_seen == 1 {
                    scrape_single_document(&value, &mut parsed);
                }
            }
        }
    }

    if parsed.skipped_lines > 0 {
        log::debug!(
            "Skipped {} undecodable line(s) while scraping transcript",
            parsed.skipped_lines
        );
    }

    // Whole-parse failure degrades to the raw stdout as plain content.
    if !saw_event && parsed.session_id.is_none() && parsed.content.is_empty() {
        parsed.content = stdout.to_string();
    }

    parsed
}

fn scrape_single_document(value: &Value, parsed: &mut ParsedTranscript) {
    let Some(object) = value.as_object() else {
        return;
    };

    if let Some(session_id) = object.get("session_id").and_then(Value::as_str) {
        parsed.session_id = Some(session_id.to_string());
    }
    for key in ["content", "result", "response", "message"] {
        if let Some(text) = object.get(key).and_then(Value::as_str) {
            parsed.content = text.to_string();
            break;
        }
    }
    parsed.raw_result = Some(value.clone());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_transcript_yields_result_content_and_session() {
        let stdout = concat!(
            r#"{"type":"system","subtype":"init","session_id":"S1","model":"x"}"#,
            "\n",
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"London"}]},"session_id":"S1"}"#,
            "\n",
            r#"{"type":"result","is_error":false,"result":"London","session_id":"S1"}"#,
        );

        let parsed = parse_transcript(stdout);
        assert_eq!(parsed.content, "London");
        assert_eq!(parsed.session_id.as_deref(), Some("S1"));
        assert!(!parsed.is_error);
        assert!(parsed.raw_result.is_some());
    }

    #[test]
    fn error_result_flags_error_and_keeps_init_session() {
        let stdout = concat!(
            r#"{"type":"system","subtype":"init","session_id":"S1"}"#,
            "\n",
            r#"{"type":"result","is_error":true,"error":"Permission denied"}"#,
        );

        let parsed = parse_transcript(stdout);
        assert!(parsed.is_error);
        assert!(parsed.content.contains("Permission denied"));
        assert_eq!(parsed.error.as_deref(), Some("Permission denied"));
        assert_eq!(parsed.session_id.as_deref(), Some("S1"));
    }

    #[test]
    fn error_result_without_fields_uses_unknown_error() {
        let stdout = r#"{"type":"result","is_error":true}"#;
        let parsed = parse_transcript(stdout);
        assert!(parsed.content.contains("Unknown error"));
    }

    #[test]
    fn error_result_falls_back_to_result_field() {
        let stdout = r#"{"type":"result","is_error":true,"result":"quota exhausted"}"#;
        let parsed = parse_transcript(stdout);
        assert!(parsed.content.contains("quota exhausted"));
    }

    #[test]
    fn last_assistant_fragment_wins_without_result() {
        let stdout = concat!(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"first"}]},"session_id":"S2"}"#,
            "\n",
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"second"}]}}"#,
        );

        let parsed = parse_transcript(stdout);
        assert_eq!(parsed.content, "second");
        assert_eq!(parsed.session_id.as_deref(), Some("S2"));
    }

    #[test]
    fn result_session_id_overrides_earlier_values() {
        let stdout = concat!(
            r#"{"type":"system","subtype":"init","session_id":"old"}"#,
            "\n",
            r#"{"type":"result","is_error":false,"result":"done","session_id":"new"}"#,
        );

        let parsed = parse_transcript(stdout);
        assert_eq!(parsed.session_id.as_deref(), Some("new"));
    }

    #[test]
    fn undecodable_lines_are_counted_not_fatal() {
        let stdout = concat!(
            "not json at all\n",
            "{\"type\": \"assist\n",
            r#"{"type":"result","is_error":false,"result":"ok","session_id":"S3"}"#,
        );

        let parsed = parse_transcript(stdout);
        assert_eq!(parsed.skipped_lines, 2);
        assert_eq!(parsed.content, "ok");
        assert_eq!(parsed.session_id.as_deref(), Some("S3"));
    }

    #[test]
    fn single_json_document_is_scraped() {
        let stdout = r#"{"session_id":"S4","result":"forty-two"}"#;
        let parsed = parse_transcript(stdout);
        assert_eq!(parsed.session_id.as_deref(), Some("S4"));
        assert_eq!(parsed.content, "forty-two");
    }

    #[test]
    fn plain_text_degrades_to_raw_content() {
        let stdout = "The capital of France is Paris.\n";
        let parsed = parse_transcript(stdout);
        assert_eq!(parsed.content, stdout);
        assert!(parsed.session_id.is_none());
        assert_eq!(parsed.skipped_lines, 1);
    }

    #[test]
    fn blank_lines_are_ignored() {
        let stdout = concat!(
            "\n\n",
            r#"{"type":"result","is_error":false,"result":"ok","session_id":"S5"}"#,
            "\n\n",
        );
        let parsed = parse_transcript(stdout);
        assert_eq!(parsed.content, "ok");
        assert_eq!(parsed.skipped_lines, 0);
    }

    #[test]
    fn unknown_event_types_are_skipped() {
        let stdout = concat!(
            r#"{"type":"telemetry","ping":1}"#,
            "\n",
            r#"{"type":"result","is_error":false,"result":"ok","session_id":"S6"}"#,
        );
        let parsed = parse_transcript(stdout);
        assert_eq!(parsed.content, "ok");
    }
}
