//! Stream-json event types
//!
//! When the `stream-json` output format is requested, the CLI writes one JSON
//! object per line. The schema is informal and discriminated by `type` (and
//! `subtype` for system events), so unrecognized records are preserved as
//! [`StreamEvent::Unknown`] rather than rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Content block inside an assistant message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text content block
    Text {
        /// Text content
        text: String,
    },
    /// Thinking content block
    Thinking {
        /// Thinking content
        thinking: String,
    },
    /// Tool use request; payload is not interpreted by this SDK
    ToolUse {
        /// Tool use ID
        id: String,
        /// Tool name
        name: String,
        /// Tool input parameters
        input: Value,
    },
}

/// Assistant message payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantPayload {
    /// Message content blocks
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// One decoded line of stream-json output
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// System event; `subtype == "init"` carries the earliest session ID
    System {
        /// System event subtype
        subtype: String,
        /// Session ID, when present
        session_id: Option<String>,
    },
    /// Assistant message carrying incremental text content
    Assistant {
        /// Message payload
        message: AssistantPayload,
        /// Session ID, when present
        session_id: Option<String>,
    },
    /// Terminal record; authoritative content and session ID
    Result {
        /// Whether the run failed
        #[serde(default)]
        is_error: bool,
        /// Result text on success
        result: Option<String>,
        /// Error text on failure
        error: Option<String>,
        /// Session ID, when present
        session_id: Option<String>,
    },
    /// Any record whose `type` is not recognized, kept verbatim
    #[serde(skip)]
    Unknown(Value),
}

impl StreamEvent {
    /// Decode a JSON value into an event, falling back to
    /// [`StreamEvent::Unknown`] for unrecognized or malformed shapes.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<Self>(value.clone()) {
            Ok(event) => event,
            Err(_) => Self::Unknown(value),
        }
    }

    /// Session ID carried by this event, if any
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::System { session_id, .. }
            | Self::Assistant { session_id, .. }
            | Self::Result { session_id, .. } => session_id.as_deref(),
            Self::Unknown(_) => None,
        }
    }
}
