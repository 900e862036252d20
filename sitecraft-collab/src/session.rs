//! Channel manager: one realtime session per (site, user).
//!
//! ```text
//! ChannelManager (caller side)          Session task (single writer)
//! ───────────────────────────           ─────────────────────────────
//! publish_cursor()  ──┐                 select! {
//! publish_file_change ├─ Command ─────►   commands  → channel.broadcast / track
//! set_active_file() ──┘                   events    → CollabState + CursorReaper
//! close()  ─────────── Close ─────────►   reaper    → expire cursor
//!                                        }
//! watch() / snapshot() ◄──── watch::Sender<CollabSnapshot> ────┘
//! file_changes()       ◄──── broadcast::Sender<FileChange> ────┘
//! ```
//!
//! Only the session task mutates cursor and presence state. Readers get
//! snapshots through a `watch` channel, so nothing is locked while a
//! renderer iterates.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::CollabConfig;
use crate::error::CollabError;
use crate::presence::{
    CollabSnapshot, CollabState, Cursor, CursorPosition, SessionUser, StateChange, DEFAULT_COLOR,
};
use crate::protocol::{
    decode_cursor, encode_cursor, now_millis, site_topic, FileChange, PresenceMeta,
    CURSOR_EVENT, FILE_CHANGE_EVENT,
};
use crate::reaper::CursorReaper;
use crate::transport::{ChannelEvent, ChannelHandle, ChannelStatus, RealtimeTransport};

/// Remote file changes buffered per subscriber.
const FILE_CHANGE_BUFFER: usize = 64;

/// Requests from the manager to its session task.
#[derive(Debug)]
enum Command {
    PublishCursor(CursorPosition),
    PublishFileChange(String),
    SetActiveFile(Option<String>),
    Close,
}

/// The open session, as seen from the manager.
struct SessionHandle {
    site_id: String,
    user: SessionUser,
    commands: mpsc::Sender<Command>,
    channel: Arc<dyn ChannelHandle>,
    task: JoinHandle<()>,
}

/// Owns the realtime channel for the site currently being edited.
pub struct ChannelManager {
    transport: Arc<dyn RealtimeTransport>,
    config: CollabConfig,
    session: Option<SessionHandle>,
    snapshot: Arc<watch::Sender<CollabSnapshot>>,
    file_changes: broadcast::Sender<FileChange>,
}

impl ChannelManager {
    pub fn new(transport: Arc<dyn RealtimeTransport>, config: CollabConfig) -> Self {
        if let Err(e) = config.validate() {
            log::warn!("Using unvalidated collaboration config: {e}");
        }
        let (snapshot, _) = watch::channel(CollabSnapshot::default());
        let (file_changes, _) = broadcast::channel(FILE_CHANGE_BUFFER);
        Self {
            transport,
            config,
            session: None,
            snapshot: Arc::new(snapshot),
            file_changes,
        }
    }

    /// Join the channel for `site_id`.
    ///
    /// Without a site id or a user this does nothing. Reopening the same
    /// site for the same user only updates the active file; any other open
    /// session is torn down first.
    pub async fn open(
        &mut self,
        site_id: &str,
        user: Option<SessionUser>,
        initial_file_id: Option<String>,
    ) -> Result<(), CollabError> {
        let Some(user) = user else {
            log::debug!("No signed-in user, not opening site {site_id:?}");
            return Ok(());
        };
        if site_id.is_empty() {
            log::debug!("No site id, not opening a channel");
            return Ok(());
        }

        if let Some(session) = &self.session {
            if session.site_id == site_id && session.user == user {
                self.set_active_file(initial_file_id).await;
                return Ok(());
            }
        }
        self.close().await;

        let subscription = self.transport.subscribe(&site_topic(site_id), &user.id).await?;
        let (commands_tx, commands_rx) = mpsc::channel(self.config.command_buffer.max(1));

        let channel = subscription.channel;
        let session = Session {
            color: user.color(),
            user: user.clone(),
            active_file: initial_file_id,
            subscribed: false,
            channel: channel.clone(),
            state: CollabState::new(user.id.clone()),
            reaper: CursorReaper::new(self.config.cursor_ttl()),
            snapshot: self.snapshot.clone(),
            file_changes: self.file_changes.clone(),
        };
        let task = tokio::spawn(session.run(subscription.events, commands_rx));

        log::info!("Opened collaboration channel for site {site_id} as {}", user.id);
        self.session = Some(SessionHandle {
            site_id: site_id.to_string(),
            user,
            commands: commands_tx,
            channel,
            task,
        });
        Ok(())
    }

    /// Leave the channel, cancel expiry timers and clear local state.
    ///
    /// Does nothing when no session is open.
    pub async fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if session.commands.send(Command::Close).await.is_err() {
            log::debug!("Session for site {} already stopped", session.site_id);
        }
        if let Err(e) = session.task.await {
            log::warn!("Session task for site {} ended abnormally: {e}", session.site_id);
        }
        self.snapshot.send_replace(CollabSnapshot::default());
        // Receivers taken for this site see `Closed` instead of the next site's changes.
        self.file_changes = broadcast::channel(FILE_CHANGE_BUFFER).0;
        log::info!("Closed collaboration channel for site {}", session.site_id);
    }

    /// Broadcast the local pointer position. No local echo.
    pub async fn publish_cursor(&self, position: CursorPosition) {
        self.dispatch(Command::PublishCursor(position)).await;
    }

    /// Broadcast the full content of the active file.
    pub async fn publish_file_change(&self, content: impl Into<String>) {
        self.dispatch(Command::PublishFileChange(content.into())).await;
    }

    /// Switch the file this user is looking at and re-announce presence.
    pub async fn set_active_file(&self, file_id: Option<String>) {
        self.dispatch(Command::SetActiveFile(file_id)).await;
    }

    async fn dispatch(&self, command: Command) {
        match &self.session {
            Some(session) => {
                if session.commands.send(command).await.is_err() {
                    log::debug!("Session for site {} is gone, dropping command", session.site_id);
                }
            }
            None => log::trace!("No open channel, dropping {command:?}"),
        }
    }

    /// Current cursors and active users.
    pub fn snapshot(&self) -> CollabSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn watch(&self) -> watch::Receiver<CollabSnapshot> {
        self.snapshot.subscribe()
    }

    /// Subscribe to file content broadcast by other users.
    ///
    /// The receiver ends when the current session closes.
    pub fn file_changes(&self) -> broadcast::Receiver<FileChange> {
        self.file_changes.subscribe()
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn site_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.site_id.as_str())
    }

    /// The local user's cursor color.
    pub fn my_color(&self) -> &'static str {
        self.session
            .as_ref()
            .map_or(DEFAULT_COLOR, |s| s.user.color())
    }

    pub fn config(&self) -> &CollabConfig {
        &self.config
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        // The detached task runs the same teardown as `close`.
        if session.commands.try_send(Command::Close).is_ok() {
            return;
        }
        session.task.abort();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let channel = session.channel;
            let site_id = session.site_id;
            runtime.spawn(async move {
                if let Err(e) = channel.unsubscribe().await {
                    log::warn!("Unsubscribe from site {site_id} failed: {e}");
                }
            });
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Session task
// ───────────────────────────────────────────────────────────────────

struct Session {
    user: SessionUser,
    color: &'static str,
    active_file: Option<String>,
    /// Set between a `Subscribed` status and any later failure status
    subscribed: bool,
    channel: Arc<dyn ChannelHandle>,
    state: CollabState,
    reaper: CursorReaper,
    snapshot: Arc<watch::Sender<CollabSnapshot>>,
    file_changes: broadcast::Sender<FileChange>,
}

impl Session {
    async fn run(
        mut self,
        mut events: mpsc::Receiver<ChannelEvent>,
        mut commands: mpsc::Receiver<Command>,
    ) {
        let mut events_open = true;
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Close) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                event = events.recv(), if events_open => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        log::debug!("Transport event stream ended");
                        events_open = false;
                    }
                },
                Some(user_id) = self.reaper.next_expired(), if !self.reaper.is_empty() => {
                    if self.state.expire_cursor(&user_id) {
                        log::debug!("Cursor for {user_id} went stale");
                        self.publish_snapshot();
                    }
                }
            }
        }
        self.shutdown().await;
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::PublishCursor(position) => self.broadcast_cursor(position).await,
            Command::PublishFileChange(content) => self.broadcast_file_change(content).await,
            Command::SetActiveFile(file_id) => {
                if self.active_file == file_id {
                    return;
                }
                self.active_file = file_id;
                if self.subscribed {
                    self.track_presence().await;
                }
            }
            Command::Close => {}
        }
    }

    async fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Status(ChannelStatus::Subscribed) => {
                self.subscribed = true;
                self.track_presence().await;
            }
            ChannelEvent::Status(status) => {
                log::warn!("Channel status changed to {status:?}");
                self.subscribed = false;
            }
            ChannelEvent::Broadcast { event, payload } => match event.as_str() {
                CURSOR_EVENT => match decode_cursor(&payload) {
                    Ok(cursor) => self.apply_cursor(cursor),
                    Err(e) => log::debug!("Dropping malformed cursor: {e}"),
                },
                FILE_CHANGE_EVENT => match FileChange::decode(&payload) {
                    Ok(change) if change.user_id != self.user.id => {
                        // Err only means nobody is listening
                        let _ = self.file_changes.send(change);
                    }
                    Ok(_) => {}
                    Err(e) => log::debug!("Dropping malformed file change: {e}"),
                },
                other => log::trace!("Ignoring broadcast event {other}"),
            },
            ChannelEvent::PresenceSync(state) => {
                self.state.apply_presence_sync(&state);
                self.publish_snapshot();
            }
            ChannelEvent::PresenceJoin { key, .. } => {
                log::debug!("User joined: {key}");
            }
            ChannelEvent::PresenceLeave { key, .. } => {
                log::debug!("User left: {key}");
                if let StateChange::CursorRemoved(user_id) = self.state.apply_leave(&key) {
                    self.reaper.cancel(&user_id);
                    self.publish_snapshot();
                }
            }
        }
    }

    fn apply_cursor(&mut self, cursor: Cursor) {
        if let StateChange::CursorUpserted(user_id) = self.state.apply_cursor(cursor) {
            self.reaper.arm(&user_id);
            self.publish_snapshot();
        }
    }

    async fn broadcast_cursor(&self, position: CursorPosition) {
        let cursor = Cursor {
            user_id: self.user.id.clone(),
            email: self.user.display_email().to_string(),
            color: self.color.to_string(),
            x: position.x,
            y: position.y,
            line: position.line,
            column: position.column,
            file_id: self.active_file.clone(),
            timestamp: now_millis(),
        };
        let payload = match encode_cursor(&cursor) {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("Failed to encode cursor: {e}");
                return;
            }
        };
        if let Err(e) = self.channel.broadcast(CURSOR_EVENT, payload).await {
            log::warn!("Cursor broadcast failed: {e}");
        }
    }

    async fn broadcast_file_change(&self, content: String) {
        let Some(file_id) = self.active_file.clone() else {
            log::debug!("No active file, not broadcasting file change");
            return;
        };
        let change = FileChange {
            user_id: self.user.id.clone(),
            file_id,
            content,
            timestamp: now_millis(),
        };
        let payload = match change.encode() {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("Failed to encode file change: {e}");
                return;
            }
        };
        if let Err(e) = self.channel.broadcast(FILE_CHANGE_EVENT, payload).await {
            log::warn!("File change broadcast failed: {e}");
        }
    }

    async fn track_presence(&self) {
        let meta = PresenceMeta::online(self.user.email.clone(), self.color, self.active_file.clone());
        let result = match meta.encode() {
            Ok(value) => self.channel.track(value).await.map_err(CollabError::from),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            log::warn!("Failed to track presence: {e}");
        }
    }

    fn publish_snapshot(&self) {
        self.snapshot.send_replace(self.state.snapshot());
    }

    async fn shutdown(&mut self) {
        self.reaper.clear();
        self.state.clear();
        self.publish_snapshot();
        if let Err(e) = self.channel.unsubscribe().await {
            log::warn!("Unsubscribe failed: {e}");
        }
    }
}
