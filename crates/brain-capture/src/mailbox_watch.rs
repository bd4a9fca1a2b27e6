//! Mailbox watch manager: one long-lived mailbox session with reconnect.
//!
//! The reconnect intent lives in a `watch` channel owned by the handle and is
//! kept separate from the connection state reported in [`WatchStatus`].
//! Disconnected -> Connecting -> Ready -> Watching; any connection loss while
//! the intent is set schedules a new attempt after a fixed delay.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use brain_core::current_unix_timestamp_ms;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::capture_note::{normalize, EMAIL_SOURCE};
use crate::note_store::NoteStore;

pub const DEFAULT_IMAP_PORT: u16 = 993;
pub const DEFAULT_MAILBOX_FOLDER: &str = "Brain";
pub const FALLBACK_MAILBOX_FOLDER: &str = "INBOX";
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchState {
    #[default]
    Disconnected,
    Connecting,
    Ready,
    Watching,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct WatchStatus {
    pub state: WatchState,
    pub should_reconnect: bool,
    pub connected: bool,
    pub watching: bool,
    pub messages_processed: u64,
    pub last_error: Option<String>,
    pub folder: Option<String>,
    pub last_sweep_unix_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct MailboxWatchConfig {
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub folder: String,
    pub reconnect_delay: Duration,
}

impl Default for MailboxWatchConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_IMAP_PORT,
            user: None,
            password: None,
            folder: DEFAULT_MAILBOX_FOLDER.to_string(),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
        }
    }
}

impl MailboxWatchConfig {
    /// True when host, user and password are all present and non-blank.
    pub fn can_start(&self) -> bool {
        let present = |value: &Option<String>| {
            value.as_deref().is_some_and(|value| !value.trim().is_empty())
        };
        if present(&self.host) && present(&self.user) && present(&self.password) {
            return true;
        }
        tracing::info!("mailbox host, user or password not configured; mailbox watch disabled");
        false
    }
}

/// Notification surfaced by a session while it waits for mailbox changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxEvent {
    NewMail,
    KeepAlive,
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum WatchSetupError {
    #[error("could not open mailbox folder \"{folder}\" or \"{fallback}\": {message}")]
    FolderUnavailable {
        folder: String,
        fallback: String,
        message: String,
    },
}

#[async_trait]
pub trait MailboxConnector: Send + Sync {
    async fn connect(&self, config: &MailboxWatchConfig) -> Result<Box<dyn MailboxSession>>;
}

#[async_trait]
pub trait MailboxSession: Send {
    async fn open_folder(&mut self, folder: &str) -> Result<()>;
    /// Fetches every unseen message body; fetching marks them seen.
    async fn fetch_unseen(&mut self) -> Result<Vec<Vec<u8>>>;
    async fn wait_for_change(&mut self) -> Result<MailboxEvent>;
    async fn close(&mut self);
}

pub struct MailboxWatchManager {
    config: MailboxWatchConfig,
    connector: Arc<dyn MailboxConnector>,
    store: NoteStore,
}

impl MailboxWatchManager {
    pub fn new(
        config: MailboxWatchConfig,
        connector: Arc<dyn MailboxConnector>,
        store: NoteStore,
    ) -> Self {
        Self {
            config,
            connector,
            store,
        }
    }

    /// Spawns the watch loop and returns its handle.
    pub fn start(self) -> MailboxWatchHandle {
        let (intent_tx, intent_rx) = watch::channel(true);
        let (status_tx, status_rx) = watch::channel(WatchStatus {
            should_reconnect: true,
            watching: true,
            ..WatchStatus::default()
        });
        let task = tokio::spawn(run_watch_loop(self, intent_rx, status_tx));
        MailboxWatchHandle {
            intent_tx,
            status_rx,
            task: Some(task),
        }
    }
}

pub struct MailboxWatchHandle {
    intent_tx: watch::Sender<bool>,
    status_rx: watch::Receiver<WatchStatus>,
    task: Option<JoinHandle<()>>,
}

impl MailboxWatchHandle {
    pub fn status(&self) -> WatchStatus {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WatchStatus> {
        self.status_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Clears the reconnect intent, closes the session and waits for the loop to exit.
    pub async fn stop(&mut self) {
        self.intent_tx.send_replace(false);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Status receiver for callers that never started a watcher.
pub fn idle_status() -> watch::Receiver<WatchStatus> {
    let (_status_tx, status_rx) = watch::channel(WatchStatus::default());
    status_rx
}

enum SessionEnd {
    Stopped,
    Closed,
}

enum SessionFailure {
    Transient(anyhow::Error),
    Setup(WatchSetupError),
}

impl From<anyhow::Error> for SessionFailure {
    fn from(error: anyhow::Error) -> Self {
        Self::Transient(error)
    }
}

fn wants_reconnect(intent_rx: &watch::Receiver<bool>) -> bool {
    *intent_rx.borrow()
}

fn set_state(status_tx: &watch::Sender<WatchStatus>, state: WatchState) {
    status_tx.send_modify(|status| {
        status.state = state;
        status.connected = matches!(state, WatchState::Ready | WatchState::Watching);
    });
}

async fn run_watch_loop(
    manager: MailboxWatchManager,
    mut intent_rx: watch::Receiver<bool>,
    status_tx: watch::Sender<WatchStatus>,
) {
    let mut attempt = 0_u64;
    while wants_reconnect(&intent_rx) {
        attempt = attempt.saturating_add(1);
        set_state(&status_tx, WatchState::Connecting);
        tracing::info!(attempt, host = ?manager.config.host, "mailbox connecting");

        let outcome = run_session(&manager, &mut intent_rx, &status_tx).await;
        set_state(&status_tx, WatchState::Disconnected);
        match outcome {
            Ok(SessionEnd::Stopped) => break,
            Ok(SessionEnd::Closed) => {
                tracing::info!("mailbox disconnected");
            }
            Err(SessionFailure::Transient(error)) => {
                tracing::warn!(error = %format!("{error:#}"), "mailbox connection failed");
                status_tx.send_modify(|status| status.last_error = Some(format!("{error:#}")));
            }
            Err(SessionFailure::Setup(error)) => {
                tracing::error!(%error, "mailbox watch not established");
                status_tx.send_modify(|status| {
                    status.last_error = Some(error.to_string());
                    status.should_reconnect = false;
                    status.watching = false;
                });
                return;
            }
        }

        if !wants_reconnect(&intent_rx) {
            break;
        }
        let delay = manager.config.reconnect_delay;
        tracing::info!(delay_ms = delay.as_millis() as u64, "mailbox reconnect scheduled");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = intent_rx.changed() => {
                if changed.is_err() || !wants_reconnect(&intent_rx) {
                    break;
                }
            }
        }
    }

    status_tx.send_modify(|status| {
        status.should_reconnect = false;
        status.watching = false;
    });
    tracing::info!("mailbox watch stopped");
}

/// Resolves once the reconnect intent is cleared or the handle is gone.
async fn intent_cleared(intent_rx: &mut watch::Receiver<bool>) {
    while wants_reconnect(intent_rx) {
        if intent_rx.changed().await.is_err() {
            return;
        }
    }
}

async fn run_session(
    manager: &MailboxWatchManager,
    intent_rx: &mut watch::Receiver<bool>,
    status_tx: &watch::Sender<WatchStatus>,
) -> std::result::Result<SessionEnd, SessionFailure> {
    let mut session = tokio::select! {
        connected = manager.connector.connect(&manager.config) => connected?,
        _ = intent_cleared(intent_rx) => return Ok(SessionEnd::Stopped),
    };
    set_state(status_tx, WatchState::Ready);
    tracing::info!("mailbox connected");

    let opened = tokio::select! {
        opened = open_watch_folder(session.as_mut(), &manager.config.folder) => Some(opened),
        _ = intent_cleared(intent_rx) => None,
    };
    let folder = match opened {
        Some(Ok(folder)) => folder,
        Some(Err(error)) => {
            session.close().await;
            return Err(SessionFailure::Setup(error));
        }
        None => {
            session.close().await;
            return Ok(SessionEnd::Stopped);
        }
    };
    status_tx.send_modify(|status| {
        status.folder = Some(folder.clone());
        status.last_error = None;
    });
    set_state(status_tx, WatchState::Watching);
    tracing::info!(folder = %folder, "mailbox watching");

    let result = watch_folder(manager, session.as_mut(), intent_rx, status_tx).await;
    if !matches!(result, Ok(SessionEnd::Closed)) {
        session.close().await;
    }
    result
}

async fn open_watch_folder(
    session: &mut dyn MailboxSession,
    folder: &str,
) -> std::result::Result<String, WatchSetupError> {
    let primary_error = match session.open_folder(folder).await {
        Ok(()) => return Ok(folder.to_string()),
        Err(error) => error,
    };
    tracing::info!(folder, error = %primary_error, "mailbox folder unavailable; falling back to INBOX");
    match session.open_folder(FALLBACK_MAILBOX_FOLDER).await {
        Ok(()) => Ok(FALLBACK_MAILBOX_FOLDER.to_string()),
        Err(error) => Err(WatchSetupError::FolderUnavailable {
            folder: folder.to_string(),
            fallback: FALLBACK_MAILBOX_FOLDER.to_string(),
            message: format!("{error:#}"),
        }),
    }
}

/// Sweeps, then waits for the next change, until the link closes or the intent clears.
///
/// A stop can only interrupt a sweep while it awaits the fetch. Fetched
/// messages are normalized and written without further suspension.
async fn watch_folder(
    manager: &MailboxWatchManager,
    session: &mut dyn MailboxSession,
    intent_rx: &mut watch::Receiver<bool>,
    status_tx: &watch::Sender<WatchStatus>,
) -> std::result::Result<SessionEnd, SessionFailure> {
    loop {
        tokio::select! {
            swept = sweep_unseen(manager, &mut *session, status_tx) => swept?,
            _ = intent_cleared(intent_rx) => return Ok(SessionEnd::Stopped),
        }
        let event = tokio::select! {
            event = session.wait_for_change() => event?,
            _ = intent_cleared(intent_rx) => return Ok(SessionEnd::Stopped),
        };
        if event == MailboxEvent::Closed {
            return Ok(SessionEnd::Closed);
        }
    }
}

/// Fetches all unseen messages and captures each one. Parse failures drop the message.
async fn sweep_unseen(
    manager: &MailboxWatchManager,
    session: &mut dyn MailboxSession,
    status_tx: &watch::Sender<WatchStatus>,
) -> Result<()> {
    let messages = session.fetch_unseen().await?;
    let mut saved = 0_u64;
    for raw in &messages {
        match normalize(raw, EMAIL_SOURCE, Utc::now())
            .and_then(|note| manager.store.write(&note))
        {
            Ok(path) => {
                saved = saved.saturating_add(1);
                tracing::info!(path = %path.display(), "mailbox message captured");
            }
            Err(error) => {
                tracing::error!(error = %format!("{error:#}"), "mailbox message dropped");
            }
        }
    }
    status_tx.send_modify(|status| {
        status.messages_processed = status.messages_processed.saturating_add(saved);
        status.last_sweep_unix_ms = Some(current_unix_timestamp_ms());
    });
    if !messages.is_empty() {
        tracing::debug!(fetched = messages.len(), saved, "mailbox sweep finished");
    }
    Ok(())
}
