//! Presence roster: the avatar strip of who else is on the site.

use serde::Serialize;
use sitecraft_collab::config::{CollabConfig, DEFAULT_ROSTER_LIMIT};
use sitecraft_collab::presence::{CollabSnapshot, Presence};

/// Badges shown before collapsing the rest into an overflow count.
pub const ROSTER_LIMIT: usize = DEFAULT_ROSTER_LIMIT;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarBadge {
    pub user_id: String,
    /// First letter of the email, uppercased.
    pub initial: String,
    pub color: String,
    /// Hover text (full email).
    pub title: String,
}

impl AvatarBadge {
    fn from_presence(presence: &Presence) -> Self {
        Self {
            user_id: presence.user_id.clone(),
            initial: initial_of(&presence.email),
            color: presence.color.clone(),
            title: presence.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Roster {
    pub badges: Vec<AvatarBadge>,
    /// Users beyond the limit.
    pub overflow: usize,
}

impl Roster {
    /// `+N` label for the overflow chip, `None` when everyone fits.
    pub fn overflow_label(&self) -> Option<String> {
        (self.overflow > 0).then(|| format!("+{}", self.overflow))
    }

    pub fn total(&self) -> usize {
        self.badges.len() + self.overflow
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

fn initial_of(email: &str) -> String {
    match email.chars().next() {
        Some(first) => first.to_uppercase().collect(),
        None => "?".to_string(),
    }
}

/// Build the roster for `users`, keeping their order.
pub fn build_roster(users: &[Presence], limit: usize) -> Roster {
    let shown = users.len().min(limit);
    Roster {
        badges: users[..shown].iter().map(AvatarBadge::from_presence).collect(),
        overflow: users.len() - shown,
    }
}

/// Roster for a snapshot's active users, limited per `config`.
pub fn roster_for(snapshot: &CollabSnapshot, config: &CollabConfig) -> Roster {
    build_roster(&snapshot.active_users, config.roster_limit)
}
