//! # sitecraft-collab — Realtime collaboration for Sitecraft sites
//!
//! Live cursors and presence for everyone editing the same site.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐   broadcast / track   ┌──────────────────┐
//! │ ChannelManager │ ────────────────────► │ RealtimeTransport│
//! │ (per site+user)│ ◄──────────────────── │ (hosted or hub)  │
//! └───────┬────────┘    ChannelEvent       └──────────────────┘
//!         │
//!         ▼
//! ┌────────────────┐     ┌──────────────┐
//! │ CollabState    │ ◄── │ CursorReaper │  5s liveness per peer
//! │ cursors+roster │     └──────────────┘
//! └───────┬────────┘
//!         │ watch
//!         ▼
//!   CollabSnapshot  ──►  sitecraft-overlay (projection, roster)
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — JSON wire payloads and event names
//! - [`presence`] — Cursor/Presence types, colors, pure state machine
//! - [`reaper`] — Per-peer stale-cursor expiry
//! - [`session`] — Channel manager and its session task
//! - [`transport`] — Pub/sub channel traits
//! - [`hub`] — In-process transport with presence tracking
//! - [`config`] — Session tunables

pub mod config;
pub mod error;
pub mod hub;
pub mod presence;
pub mod protocol;
pub mod reaper;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use config::{CollabConfig, ConfigError};
pub use error::CollabError;
pub use hub::{HubStats, LocalHub};
pub use presence::{
    color_for_user, display_name, CollabSnapshot, CollabState, Cursor, CursorPosition, Presence,
    SessionUser, StateChange, ANONYMOUS, DEFAULT_COLOR, PALETTE,
};
pub use protocol::{FileChange, PresenceMeta, ProtocolError};
pub use reaper::CursorReaper;
pub use session::ChannelManager;
pub use transport::{
    ChannelEvent, ChannelHandle, ChannelStatus, RealtimeTransport, Subscription, TransportError,
};
