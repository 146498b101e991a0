//! Core type definitions
//!
//! Data types shared across the SDK: execution results, stream chunks,
//! responses, session and workspace records, and the stream-json event union.

pub mod events;
pub mod identifiers;
pub mod response;

pub use events::{AssistantPayload, ContentBlock, StreamEvent};
pub use identifiers::{SessionId, WorkspaceId};
pub use response::{
    ClaudeResponse, CommandResult, OutputFormat, ResponseMetadata, SessionAwareResponse,
    SessionInfo, SessionStatus, StreamChunk, StreamSource, WorkspaceInfo,
};
