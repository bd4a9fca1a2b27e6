//! Process wiring: mailbox watcher, poll scheduler and integration server.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use brain_capture::{
    idle_status, ImapConnector, MailboxWatchHandle, MailboxWatchManager, NoteStore,
};
use brain_gateway::{run_integration_server, IntegrationServerState};
use brain_tracker::{
    start_poll_scheduler, IssueTracker, Ledger, ReconcileEngine, TrackerClient,
};

use crate::cli_args::Cli;

/// The scheduled poll only runs when a tracker credential is present.
fn effective_poll_interval(tracker_configured: bool, interval: Duration) -> Duration {
    if tracker_configured {
        interval
    } else {
        Duration::ZERO
    }
}

pub(crate) async fn run_brain<F>(cli: Cli, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    std::fs::create_dir_all(&cli.brain_root)
        .with_context(|| format!("failed to create {}", cli.brain_root.display()))?;

    let tracker = Arc::new(TrackerClient::new(cli.tracker_config())?);
    let tracker_configured = tracker.is_configured();
    if !tracker_configured {
        tracing::info!("tracker credential not configured; ledger reconciliation disabled");
    }
    let ledger = Arc::new(Ledger::new(cli.ledger_path()));
    let engine = Arc::new(ReconcileEngine::new(tracker, ledger));

    let mailbox_config = cli.mailbox_config();
    let mut mailbox_watch = if mailbox_config.can_start() {
        let connector = Arc::new(ImapConnector::new()?);
        let store = NoteStore::new(cli.inbox_root());
        Some(MailboxWatchManager::new(mailbox_config, connector, store).start())
    } else {
        None
    };
    let mailbox_status = mailbox_watch
        .as_ref()
        .map(MailboxWatchHandle::subscribe)
        .unwrap_or_else(idle_status);

    let mut poll_scheduler = start_poll_scheduler(
        Arc::clone(&engine),
        effective_poll_interval(tracker_configured, cli.poll_interval()),
    );

    let state = Arc::new(IntegrationServerState::new(
        engine,
        cli.tracker_webhook_secret.clone(),
        mailbox_status,
    ));
    let serve_result = run_integration_server(cli.server_config(), state, shutdown).await;

    poll_scheduler.shutdown().await;
    if let Some(handle) = mailbox_watch.as_mut() {
        handle.stop().await;
    }
    serve_result
}
