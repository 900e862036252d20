//! Presence and cursor state for everyone else on a site channel.
//!
//! ## Architecture
//!
//! ```text
//! ChannelEvent (transport)
//!       │
//!       ▼
//! CollabState::apply_*()        pure, synchronous
//!       │  StateChange (tells the session which timers to arm/cancel)
//!       ▼
//! CollabSnapshot (watch channel) ──► projector / roster
//! ```
//!
//! `CollabState` never touches timers or the network. The session task
//! that owns it turns each `StateChange` into reaper operations.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::{now_millis, PresenceMeta};

/// Email shown for users who have none.
pub const ANONYMOUS: &str = "Anonymous";

/// Neutral color used when there is no signed-in user.
pub const DEFAULT_COLOR: &str = "#888";

/// Fixed cursor palette, shared with the browser client.
pub const PALETTE: [&str; 10] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7",
    "#DDA0DD", "#98D8C8", "#F7DC6F", "#BB8FCE", "#85C1E9",
];

/// Stable palette color for a user id.
///
/// Sums UTF-16 code units so the result matches clients that hash the id
/// as a JavaScript string.
pub fn color_for_user(user_id: &str) -> &'static str {
    let hash = user_id
        .encode_utf16()
        .fold(0usize, |acc, unit| acc.wrapping_add(unit as usize));
    PALETTE[hash % PALETTE.len()]
}

/// Label for a user: the local part of the email.
pub fn display_name(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

// ───────────────────────────────────────────────────────────────────
// Core types
// ───────────────────────────────────────────────────────────────────

/// A remote participant's pointer, scoped to one file.
///
/// Serializes to the `cursor` broadcast payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub user_id: String,
    pub email: String,
    pub color: String,
    /// Editing-surface coordinates, relative to the container origin.
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    /// Sender clock (ms). Proves liveness, never used for ordering.
    pub timestamp: u64,
}

/// A peer subscribed to the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub user_id: String,
    pub email: String,
    pub color: String,
    pub file_id: Option<String>,
    /// Local receive time of the snapshot (ms).
    pub last_seen: u64,
}

/// Local pointer or text-cursor position to publish.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl CursorPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, line: None, column: None }
    }

    pub fn with_text_position(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }
}

/// The signed-in user a session acts for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: String,
    pub email: Option<String>,
}

impl SessionUser {
    pub fn new(id: impl Into<String>, email: Option<String>) -> Self {
        Self { id: id.into(), email }
    }

    pub fn color(&self) -> &'static str {
        color_for_user(&self.id)
    }

    /// Email as shown to peers.
    pub fn display_email(&self) -> &str {
        self.email.as_deref().unwrap_or(ANONYMOUS)
    }
}

/// Read-only view handed to renderers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollabSnapshot {
    /// Live remote cursors, sorted by user id.
    pub cursors: Vec<Cursor>,
    /// Everyone else on the channel.
    pub active_users: Vec<Presence>,
}

impl CollabSnapshot {
    pub fn cursor(&self, user_id: &str) -> Option<&Cursor> {
        self.cursors.iter().find(|c| c.user_id == user_id)
    }
}

/// What an inbound event did to local state.
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    /// Nothing changed (self echo, unknown peer, ...).
    Unchanged,
    /// Cursor inserted or replaced; its expiry timer must restart.
    CursorUpserted(String),
    /// Cursor removed; its expiry timer must be cancelled.
    CursorRemoved(String),
    /// Presence list replaced.
    PresenceReplaced,
}

// ───────────────────────────────────────────────────────────────────
// Collaboration state
// ───────────────────────────────────────────────────────────────────

/// Cursor map and presence list for one (site, user) session.
pub struct CollabState {
    local_user_id: String,
    cursors: HashMap<String, Cursor>,
    active_users: Vec<Presence>,
}

impl CollabState {
    pub fn new(local_user_id: impl Into<String>) -> Self {
        Self {
            local_user_id: local_user_id.into(),
            cursors: HashMap::new(),
            active_users: Vec::new(),
        }
    }

    pub fn local_user_id(&self) -> &str {
        &self.local_user_id
    }

    /// Upsert a remote cursor.
    ///
    /// Our own broadcasts are rejected before any mutation, so the local
    /// user never sees their own cursor.
    pub fn apply_cursor(&mut self, cursor: Cursor) -> StateChange {
        if cursor.user_id == self.local_user_id {
            return StateChange::Unchanged;
        }
        let user_id = cursor.user_id.clone();
        self.cursors.insert(user_id.clone(), cursor);
        StateChange::CursorUpserted(user_id)
    }

    /// Drop a cursor on an explicit leave, regardless of its timer.
    pub fn apply_leave(&mut self, user_id: &str) -> StateChange {
        match self.cursors.remove(user_id) {
            Some(_) => StateChange::CursorRemoved(user_id.to_string()),
            None => StateChange::Unchanged,
        }
    }

    /// Drop a cursor whose liveness window elapsed.
    pub fn expire_cursor(&mut self, user_id: &str) -> bool {
        self.cursors.remove(user_id).is_some()
    }

    /// Replace the presence list from a membership snapshot.
    ///
    /// Only the first meta of each key is used.
    pub fn apply_presence_sync(&mut self, state: &HashMap<String, Vec<Value>>) -> StateChange {
        let seen = now_millis();
        let mut users: Vec<Presence> = state
            .iter()
            .filter(|(key, _)| key.as_str() != self.local_user_id)
            .filter_map(|(key, metas)| {
                let meta = PresenceMeta::decode_lenient(metas.first()?);
                Some(Presence {
                    email: meta.email.unwrap_or_else(|| ANONYMOUS.to_string()),
                    color: meta.color.unwrap_or_else(|| color_for_user(key).to_string()),
                    file_id: meta.file_id,
                    last_seen: seen,
                    user_id: key.clone(),
                })
            })
            .collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        self.active_users = users;
        StateChange::PresenceReplaced
    }

    pub fn cursor(&self, user_id: &str) -> Option<&Cursor> {
        self.cursors.get(user_id)
    }

    pub fn cursor_count(&self) -> usize {
        self.cursors.len()
    }

    pub fn active_users(&self) -> &[Presence] {
        &self.active_users
    }

    /// Forget everything (session teardown).
    pub fn clear(&mut self) {
        self.cursors.clear();
        self.active_users.clear();
    }

    pub fn snapshot(&self) -> CollabSnapshot {
        let mut cursors: Vec<Cursor> = self.cursors.values().cloned().collect();
        cursors.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        CollabSnapshot {
            cursors,
            active_users: self.active_users.clone(),
        }
    }
}

// ===================================================================
// Tests
// ===================================================================
