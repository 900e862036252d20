//! # sitecraft-overlay — Collaboration overlay for the Sitecraft editor
//!
//! Turns a [`CollabSnapshot`](sitecraft_collab::CollabSnapshot) into what
//! the editor draws on top of the editing surface:
//!
//! - [`projector`] — remote cursor markers, filtered to the open file and
//!   clipped to the surface
//! - [`roster`] — avatar badges for active users with a `+N` overflow chip
//!
//! Neither module draws anything; both produce plain data for the host UI.

pub mod projector;
pub mod roster;

pub use projector::{project_cursors, CursorMarker, CursorOverlay, Rect};
pub use roster::{build_roster, roster_for, AvatarBadge, Roster, ROSTER_LIMIT};
