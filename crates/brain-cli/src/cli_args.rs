use std::path::PathBuf;
use std::time::Duration;

use brain_capture::{
    MailboxWatchConfig, DEFAULT_IMAP_PORT, DEFAULT_MAILBOX_FOLDER, DEFAULT_RECONNECT_DELAY_MS,
};
use brain_gateway::{IntegrationServerConfig, DEFAULT_INTEGRATION_BIND};
use brain_tracker::{TrackerClientConfig, DEFAULT_TRACKER_API_URL};
use clap::Parser;

pub(crate) const LEDGER_FILE_NAME: &str = "commitments.md";
pub(crate) const INBOX_DIR_NAME: &str = "inbox";

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "brain",
    about = "Captures mailbox notes and keeps the commitment ledger in sync with the issue tracker",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long = "brain-root",
        env = "BRAIN_ROOT",
        help = "Root directory holding commitments.md and the inbox/ note store"
    )]
    pub(crate) brain_root: PathBuf,

    #[arg(
        long,
        env = "BRAIN_BIND",
        default_value = DEFAULT_INTEGRATION_BIND,
        help = "Socket address for the integration HTTP server"
    )]
    pub(crate) bind: String,

    #[arg(
        long = "email-host",
        env = "BRAIN_EMAIL_HOST",
        help = "IMAP server host; the mailbox watch is disabled when unset"
    )]
    pub(crate) email_host: Option<String>,

    #[arg(
        long = "email-port",
        env = "BRAIN_EMAIL_PORT",
        default_value_t = DEFAULT_IMAP_PORT,
        help = "IMAP over TLS port"
    )]
    pub(crate) email_port: u16,

    #[arg(long = "email-user", env = "BRAIN_EMAIL_USER", help = "Mailbox login")]
    pub(crate) email_user: Option<String>,

    #[arg(
        long = "email-pass",
        env = "BRAIN_EMAIL_PASS",
        hide_env_values = true,
        help = "Mailbox app password"
    )]
    pub(crate) email_pass: Option<String>,

    #[arg(
        long = "email-mailbox",
        env = "BRAIN_EMAIL_MAILBOX",
        default_value = DEFAULT_MAILBOX_FOLDER,
        help = "Mailbox folder to watch; falls back to INBOX when it cannot be opened"
    )]
    pub(crate) email_mailbox: String,

    #[arg(
        long = "email-reconnect-delay-ms",
        env = "BRAIN_EMAIL_RECONNECT_DELAY_MS",
        default_value_t = DEFAULT_RECONNECT_DELAY_MS,
        value_parser = parse_positive_u64,
        help = "Fixed delay before reconnecting after the mailbox link drops"
    )]
    pub(crate) email_reconnect_delay_ms: u64,

    #[arg(
        long = "tracker-api-key",
        env = "LINEAR_API_KEY",
        hide_env_values = true,
        help = "Issue tracker API key; without it the poll path is a no-op"
    )]
    pub(crate) tracker_api_key: Option<String>,

    #[arg(
        long = "tracker-api-url",
        env = "BRAIN_TRACKER_API_URL",
        default_value = DEFAULT_TRACKER_API_URL,
        help = "Issue tracker GraphQL endpoint"
    )]
    pub(crate) tracker_api_url: String,

    #[arg(
        long = "tracker-poll-interval-seconds",
        env = "BRAIN_TRACKER_POLL_INTERVAL_SECONDS",
        default_value_t = 300,
        help = "Seconds between scheduled reconciliation passes; 0 disables the schedule"
    )]
    pub(crate) tracker_poll_interval_seconds: u64,

    #[arg(
        long = "tracker-request-timeout-ms",
        env = "BRAIN_TRACKER_REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "Timeout for each tracker HTTP request"
    )]
    pub(crate) tracker_request_timeout_ms: u64,

    #[arg(
        long = "tracker-retry-max-attempts",
        env = "BRAIN_TRACKER_RETRY_MAX_ATTEMPTS",
        default_value_t = 3,
        value_parser = parse_positive_usize,
        help = "Maximum attempts for retryable tracker requests"
    )]
    pub(crate) tracker_retry_max_attempts: usize,

    #[arg(
        long = "tracker-retry-base-delay-ms",
        env = "BRAIN_TRACKER_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        help = "Base delay for exponential tracker retry backoff"
    )]
    pub(crate) tracker_retry_base_delay_ms: u64,

    #[arg(
        long = "tracker-webhook-secret",
        env = "BRAIN_TRACKER_WEBHOOK_SECRET",
        hide_env_values = true,
        help = "Optional HMAC-SHA256 secret required on incoming tracker webhooks"
    )]
    pub(crate) tracker_webhook_secret: Option<String>,
}

impl Cli {
    pub(crate) fn ledger_path(&self) -> PathBuf {
        self.brain_root.join(LEDGER_FILE_NAME)
    }

    pub(crate) fn inbox_root(&self) -> PathBuf {
        self.brain_root.join(INBOX_DIR_NAME)
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.tracker_poll_interval_seconds)
    }

    pub(crate) fn mailbox_config(&self) -> MailboxWatchConfig {
        MailboxWatchConfig {
            host: self.email_host.clone(),
            port: self.email_port,
            user: self.email_user.clone(),
            password: self.email_pass.clone(),
            folder: self.email_mailbox.clone(),
            reconnect_delay: Duration::from_millis(self.email_reconnect_delay_ms),
        }
    }

    pub(crate) fn tracker_config(&self) -> TrackerClientConfig {
        TrackerClientConfig {
            api_url: self.tracker_api_url.clone(),
            api_key: self
                .tracker_api_key
                .as_deref()
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(str::to_string),
            request_timeout_ms: self.tracker_request_timeout_ms,
            retry_max_attempts: self.tracker_retry_max_attempts,
            retry_base_delay_ms: self.tracker_retry_base_delay_ms,
        }
    }

    pub(crate) fn server_config(&self) -> IntegrationServerConfig {
        IntegrationServerConfig {
            bind: self.bind.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_cli_derives_paths_from_brain_root() {
        let cli = Cli::try_parse_from(["brain", "--brain-root", "/srv/brain"]).expect("parse");
        assert_eq!(cli.ledger_path(), PathBuf::from("/srv/brain/commitments.md"));
        assert_eq!(cli.inbox_root(), PathBuf::from("/srv/brain/inbox"));
    }

    #[test]
    fn unit_cli_maps_flags_into_component_configs() {
        let cli = Cli::try_parse_from([
            "brain",
            "--brain-root",
            "/srv/brain",
            "--bind",
            "0.0.0.0:8080",
            "--email-host",
            "imap.example.com",
            "--email-user",
            "brain@example.com",
            "--email-pass",
            "secret",
            "--email-mailbox",
            "Captures",
            "--email-reconnect-delay-ms",
            "1500",
            "--tracker-api-key",
            "  lin_api_key  ",
            "--tracker-poll-interval-seconds",
            "0",
            "--tracker-retry-max-attempts",
            "5",
        ])
        .expect("parse");

        let mailbox = cli.mailbox_config();
        assert!(mailbox.can_start());
        assert_eq!(mailbox.folder, "Captures");
        assert_eq!(mailbox.reconnect_delay, Duration::from_millis(1500));

        let tracker = cli.tracker_config();
        assert_eq!(tracker.api_key.as_deref(), Some("lin_api_key"));
        assert_eq!(tracker.retry_max_attempts, 5);
        assert!(cli.poll_interval().is_zero());
        assert_eq!(cli.server_config().bind, "0.0.0.0:8080");
    }

    #[test]
    fn regression_cli_rejects_zero_reconnect_delay_and_missing_root() {
        assert!(Cli::try_parse_from([
            "brain",
            "--brain-root",
            "/srv/brain",
            "--email-reconnect-delay-ms",
            "0"
        ])
        .is_err());
        if std::env::var_os("BRAIN_ROOT").is_none() {
            assert!(Cli::try_parse_from(["brain"]).is_err());
        }
    }
}
