//! Inbound capture: mailbox watching and message normalization.
//!
//! The watch manager keeps one mailbox session alive, sweeps unseen
//! messages, and hands each raw message to the normalizer, which writes a
//! captured note under the inbox root.

pub mod capture_note;
pub mod imap_transport;
pub mod mailbox_watch;
pub mod mailto;
pub mod note_store;

pub use capture_note::{
    normalize, slugify, strip_markup, CapturedNote, DEFAULT_SENDER, DEFAULT_SUBJECT, EMAIL_SOURCE,
};
pub use imap_transport::{ImapConnector, IDLE_KEEPALIVE};
pub use mailbox_watch::{
    idle_status, MailboxConnector, MailboxEvent, MailboxSession, MailboxWatchConfig,
    MailboxWatchHandle, MailboxWatchManager, WatchSetupError, WatchState, WatchStatus,
    DEFAULT_IMAP_PORT, DEFAULT_MAILBOX_FOLDER, DEFAULT_RECONNECT_DELAY_MS,
    FALLBACK_MAILBOX_FOLDER,
};
pub use mailto::{followup_mailto_link, DEFAULT_FOLLOWUP_SUBJECT};
pub use note_store::NoteStore;
