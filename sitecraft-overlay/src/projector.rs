//! Remote cursor projection onto the editing surface.
//!
//! ## Pipeline
//!
//! ```text
//! Cursor set ──► filter (active file) ──► project (+ container origin) ──► clip (container rect)
//!                                                                              │
//!                                                                              ▼
//!                                                                       Vec<CursorMarker>
//! ```
//!
//! [`project_cursors`] is pure: it owns no state and can be re-run on every
//! frame. [`CursorOverlay`] wraps it with a cache that is only rebuilt when
//! one of the three inputs changes.

use serde::Serialize;
use sitecraft_collab::presence::{display_name, CollabSnapshot, Cursor};

/// Bounding box of the editing surface, in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self { left, top, width, height }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// Edge-inclusive hit test.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.right() && y >= self.top && y <= self.bottom()
    }
}

/// One drawable remote cursor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorMarker {
    pub user_id: String,
    pub screen_x: f64,
    pub screen_y: f64,
    pub color: String,
    /// Email local part, e.g. `a` for `a@x.com`.
    pub label: String,
}

/// Whether a cursor belongs on the document currently open.
///
/// With no active document every cursor is shown.
fn on_active_file(cursor: &Cursor, current_file_id: Option<&str>) -> bool {
    match current_file_id {
        Some(file_id) => cursor.file_id.as_deref() == Some(file_id),
        None => true,
    }
}

/// Map cursors to on-screen markers.
///
/// `container` is `None` until the surface has been laid out; nothing is
/// drawn in that case. Output keeps input order.
pub fn project_cursors(
    cursors: &[Cursor],
    container: Option<Rect>,
    current_file_id: Option<&str>,
) -> Vec<CursorMarker> {
    let Some(rect) = container else {
        return Vec::new();
    };

    cursors
        .iter()
        .filter(|cursor| on_active_file(cursor, current_file_id))
        .filter_map(|cursor| {
            let screen_x = rect.left + cursor.x;
            let screen_y = rect.top + cursor.y;
            if !rect.contains(screen_x, screen_y) {
                return None;
            }
            Some(CursorMarker {
                user_id: cursor.user_id.clone(),
                screen_x,
                screen_y,
                color: cursor.color.clone(),
                label: display_name(&cursor.email).to_string(),
            })
        })
        .collect()
}

/// Cached projection for a render loop.
///
/// Sits between the collaboration snapshot stream and whatever draws the
/// markers.
#[derive(Debug, Default)]
pub struct CursorOverlay {
    cursors: Vec<Cursor>,
    container: Option<Rect>,
    current_file_id: Option<String>,
    /// Whether an input changed since the last `markers()` call.
    dirty: bool,
    cached: Vec<CursorMarker>,
}

impl CursorOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the cursor set from a collaboration snapshot.
    pub fn apply_snapshot(&mut self, snapshot: &CollabSnapshot) {
        self.set_cursors(&snapshot.cursors);
    }

    pub fn set_cursors(&mut self, cursors: &[Cursor]) {
        if self.cursors != cursors {
            self.cursors = cursors.to_vec();
            self.dirty = true;
        }
    }

    /// Update the surface geometry (`None` when unmounted).
    pub fn set_container(&mut self, container: Option<Rect>) {
        if self.container != container {
            self.container = container;
            self.dirty = true;
        }
    }

    pub fn set_current_file(&mut self, file_id: Option<String>) {
        if self.current_file_id != file_id {
            self.current_file_id = file_id;
            self.dirty = true;
        }
    }

    /// Markers for the current inputs, recomputed only when needed.
    pub fn markers(&mut self) -> &[CursorMarker] {
        if self.dirty {
            self.cached = project_cursors(&self.cursors, self.container, self.current_file_id.as_deref());
            self.dirty = false;
            log::trace!("Projected {} of {} remote cursors", self.cached.len(), self.cursors.len());
        }
        &self.cached
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Cursors held regardless of visibility.
    pub fn cursors(&self) -> &[Cursor] {
        &self.cursors
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sitecraft_collab::presence::color_for_user;

    fn cursor(user_id: &str, x: f64, y: f64, file_id: Option<&str>) -> Cursor {
        Cursor {
            user_id: user_id.into(),
            email: format!("{user_id}@x.com"),
            color: color_for_user(user_id).into(),
            x,
            y,
            line: None,
            column: None,
            file_id: file_id.map(Into::into),
            timestamp: 0,
        }
    }

    fn container() -> Option<Rect> {
        Some(Rect::new(10.0, 20.0, 800.0, 600.0))
    }

    fn ids(markers: &[CursorMarker]) -> Vec<&str> {
        markers.iter().map(|m| m.user_id.as_str()).collect()
    }

    // ── Rect ─────────────────────────────────────────────────────

    #[test]
    fn test_rect_edges_inclusive() {
        let rect = Rect::new(10.0, 20.0, 100.0, 50.0);
        assert_eq!(rect.right(), 110.0);
        assert_eq!(rect.bottom(), 70.0);
        assert!(rect.contains(10.0, 20.0));
        assert!(rect.contains(110.0, 70.0));
        assert!(!rect.contains(110.1, 70.0));
        assert!(!rect.contains(9.9, 30.0));
    }

    // ── project_cursors ──────────────────────────────────────────

    #[test]
    fn test_filter_by_active_file() {
        let cursors = vec![
            cursor("a", 1.0, 1.0, Some("A")),
            cursor("b", 1.0, 1.0, Some("B")),
            cursor("n", 1.0, 1.0, None),
        ];

        assert_eq!(ids(&project_cursors(&cursors, container(), Some("A"))), vec!["a"]);
        assert_eq!(ids(&project_cursors(&cursors, container(), None)), vec!["a", "b", "n"]);
    }

    #[test]
    fn test_projection_adds_container_origin() {
        let markers = project_cursors(&[cursor("u1", 100.0, 50.0, None)], container(), None);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].screen_x, 110.0);
        assert_eq!(markers[0].screen_y, 70.0);
        assert_eq!(markers[0].label, "u1");
        assert_eq!(markers[0].color, color_for_user("u1"));
    }

    #[test]
    fn test_clipping() {
        let cursors = vec![
            cursor("inside", 0.0, 0.0, None),
            cursor("edge", 800.0, 600.0, None),
            cursor("right", 801.0, 10.0, None),
            cursor("below", 10.0, 601.0, None),
            cursor("negative", -1.0, 10.0, None),
        ];
        let markers = project_cursors(&cursors, container(), None);
        assert_eq!(ids(&markers), vec!["inside", "edge"]);
    }

    #[test]
    fn test_unmeasured_container() {
        let cursors = vec![cursor("a", 1.0, 1.0, None)];
        assert!(project_cursors(&cursors, None, None).is_empty());
    }

    #[test]
    fn test_label_is_email_local_part() {
        let mut c = cursor("u1", 1.0, 1.0, None);
        c.email = "jane.doe@example.com".into();
        let markers = project_cursors(&[c], container(), None);
        assert_eq!(markers[0].label, "jane.doe");
    }

    #[test]
    fn test_projection_is_pure() {
        let cursors = vec![cursor("a", 5.0, 5.0, Some("A")), cursor("b", 900.0, 5.0, Some("A"))];
        let first = project_cursors(&cursors, container(), Some("A"));
        let second = project_cursors(&cursors, container(), Some("A"));
        assert_eq!(first, second);
        assert_eq!(cursors.len(), 2);
    }

    #[test]
    fn test_marker_serializes_camel_case() {
        let markers = project_cursors(&[cursor("u1", 1.0, 2.0, None)], container(), None);
        let json = serde_json::to_value(&markers[0]).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["screenX"], 11.0);
        assert_eq!(json["screenY"], 22.0);
        assert_eq!(json["label"], "u1");
    }

    // ── CursorOverlay ────────────────────────────────────────────

    #[test]
    fn test_overlay_starts_clean_and_empty() {
        let mut overlay = CursorOverlay::new();
        assert!(!overlay.is_dirty());
        assert!(overlay.markers().is_empty());
    }

    #[test]
    fn test_overlay_recomputes_on_change() {
        let mut overlay = CursorOverlay::new();
        overlay.set_cursors(&[cursor("a", 1.0, 1.0, Some("f1"))]);
        assert!(overlay.is_dirty());

        // No geometry yet.
        assert!(overlay.markers().is_empty());
        assert!(!overlay.is_dirty());

        overlay.set_container(container());
        assert!(overlay.is_dirty());
        assert_eq!(overlay.markers().len(), 1);

        overlay.set_current_file(Some("f2".into()));
        assert!(overlay.markers().is_empty());
        // Hidden, not forgotten.
        assert_eq!(overlay.cursors().len(), 1);
    }

    #[test]
    fn test_overlay_ignores_identical_inputs() {
        let mut overlay = CursorOverlay::new();
        let cursors = vec![cursor("a", 1.0, 1.0, None)];
        overlay.set_cursors(&cursors);
        overlay.set_container(container());
        overlay.markers();

        overlay.set_cursors(&cursors);
        overlay.set_container(container());
        overlay.set_current_file(None);
        assert!(!overlay.is_dirty());
    }

    #[test]
    fn test_overlay_apply_snapshot() {
        let mut overlay = CursorOverlay::new();
        overlay.set_container(container());
        let snapshot = CollabSnapshot {
            cursors: vec![cursor("a", 1.0, 1.0, None), cursor("b", 2.0, 2.0, None)],
            active_users: Vec::new(),
        };
        overlay.apply_snapshot(&snapshot);
        assert_eq!(ids(overlay.markers()), vec!["a", "b"]);
    }
}
