//! JSON wire payloads exchanged on a site channel.
//!
//! ```text
//! event "cursor"       {userId, email, color, x, y, line?, column?, fileId?, timestamp}
//! event "file_change"  {userId, fileId, content, timestamp}
//! track                {email, color, fileId?, online_at}
//! ```
//!
//! Inbound decoding is lenient: optional fields that are missing or `null`
//! are treated as absent, and only a payload that cannot identify its sender
//! or position is rejected.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::presence::{color_for_user, Cursor, ANONYMOUS};

/// Broadcast event carrying a cursor position.
pub const CURSOR_EVENT: &str = "cursor";
/// Broadcast event carrying full file content.
pub const FILE_CHANGE_EVENT: &str = "file_change";

/// Channel topic for a site.
pub fn site_topic(site_id: &str) -> String {
    format!("site:{site_id}")
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Cursor payload as it arrives from the network, before defaults are applied.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundCursor {
    user_id: Option<String>,
    email: Option<String>,
    color: Option<String>,
    x: Option<f64>,
    y: Option<f64>,
    line: Option<u32>,
    column: Option<u32>,
    file_id: Option<String>,
    timestamp: Option<u64>,
}

/// Decode a `cursor` broadcast payload.
pub fn decode_cursor(payload: &Value) -> Result<Cursor, ProtocolError> {
    let raw = InboundCursor::deserialize(payload)?;
    let user_id = raw
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or(ProtocolError::MissingField("userId"))?;
    let x = raw.x.ok_or(ProtocolError::MissingField("x"))?;
    let y = raw.y.ok_or(ProtocolError::MissingField("y"))?;

    Ok(Cursor {
        email: raw.email.unwrap_or_else(|| ANONYMOUS.to_string()),
        color: raw.color.unwrap_or_else(|| color_for_user(&user_id).to_string()),
        x,
        y,
        line: raw.line,
        column: raw.column,
        file_id: raw.file_id,
        timestamp: raw.timestamp.unwrap_or(0),
        user_id,
    })
}

/// Encode a cursor for the `cursor` event.
pub fn encode_cursor(cursor: &Cursor) -> Result<Value, ProtocolError> {
    Ok(serde_json::to_value(cursor)?)
}

/// Presence metadata published with `track` and delivered in sync snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(rename = "fileId", default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online_at: Option<String>,
}

impl PresenceMeta {
    /// Build the local user's track payload, stamped with the current time.
    pub fn online(email: Option<String>, color: impl Into<String>, file_id: Option<String>) -> Self {
        Self {
            email,
            color: Some(color.into()),
            file_id,
            online_at: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }

    pub fn encode(&self) -> Result<Value, ProtocolError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode one meta entry; anything unreadable yields an empty meta.
    pub fn decode_lenient(value: &Value) -> Self {
        PresenceMeta::deserialize(value).unwrap_or_else(|e| {
            log::debug!("Unreadable presence meta, using defaults: {e}");
            PresenceMeta {
                email: None,
                color: None,
                file_id: None,
                online_at: None,
            }
        })
    }
}

/// Full content of a file, broadcast on every local edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub user_id: String,
    pub file_id: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: u64,
}

impl FileChange {
    pub fn encode(&self) -> Result<Value, ProtocolError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn decode(payload: &Value) -> Result<Self, ProtocolError> {
        Ok(FileChange::deserialize(payload)?)
    }
}
