//! IMAP-over-TLS mailbox session built on `async-imap`.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_imap::extensions::idle::{Handle as IdleHandle, IdleResponse};
use async_imap::Session;
use async_trait::async_trait;
use futures_util::TryStreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::mailbox_watch::{MailboxConnector, MailboxEvent, MailboxSession, MailboxWatchConfig};

/// IDLE is re-issued before the 30 minute server timeout from RFC 2177.
pub const IDLE_KEEPALIVE: Duration = Duration::from_secs(29 * 60);
/// Budget for TCP connect, TLS handshake and login together.
pub const IMAP_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
/// Budget for leaving IDLE and logging out when a session is closed.
pub const IMAP_LOGOUT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct ImapConnector {
    tls: TlsConnector,
    connect_timeout: Duration,
}

impl ImapConnector {
    /// Builds a TLS connector trusting the bundled webpki roots.
    pub fn new() -> Result<Self> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()
            .context("failed to configure mailbox TLS protocol versions")?
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(Self {
            tls: TlsConnector::from(Arc::new(config)),
            connect_timeout: IMAP_CONNECT_TIMEOUT,
        })
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    async fn open_session(
        &self,
        host: &str,
        port: u16,
        user: &str,
        password: &str,
    ) -> Result<Session<tokio_rustls::client::TlsStream<TcpStream>>> {
        let tcp = TcpStream::connect((host, port))
            .await
            .with_context(|| format!("failed to connect to {host}:{port}"))?;
        let server_name = ServerName::try_from(host.to_string())
            .with_context(|| format!("invalid mailbox host name {host}"))?;
        let tls = self
            .tls
            .connect(server_name, tcp)
            .await
            .with_context(|| format!("TLS handshake with {host} failed"))?;
        async_imap::Client::new(tls)
            .login(user, password)
            .await
            .map_err(|(error, _client)| anyhow!(error))
            .context("mailbox login failed")
    }
}

#[async_trait]
impl MailboxConnector for ImapConnector {
    async fn connect(&self, config: &MailboxWatchConfig) -> Result<Box<dyn MailboxSession>> {
        let host = config
            .host
            .as_deref()
            .context("mailbox host is not configured")?;
        let user = config
            .user
            .as_deref()
            .context("mailbox user is not configured")?;
        let password = config
            .password
            .as_deref()
            .context("mailbox password is not configured")?;

        let session = tokio::time::timeout(
            self.connect_timeout,
            self.open_session(host, config.port, user, password),
        )
        .await
        .map_err(|_| {
            anyhow!(
                "mailbox connection to {host}:{} timed out after {}s",
                config.port,
                self.connect_timeout.as_secs_f64()
            )
        })??;
        Ok(Box::new(ImapMailboxSession::new(session)))
    }
}

/// A logged-in session, or the IDLE handle that currently owns it.
///
/// The handle stays here rather than inside the `wait_for_change` future, so
/// a wait dropped by a stop still leaves `close` able to send DONE and LOGOUT.
struct ImapMailboxSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Debug + Send,
{
    session: Option<Session<T>>,
    idle: Option<IdleHandle<T>>,
}

impl<T> ImapMailboxSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Debug + Send,
{
    fn new(session: Session<T>) -> Self {
        Self {
            session: Some(session),
            idle: None,
        }
    }

    /// Returns the session, leaving IDLE first if a previous wait was interrupted.
    async fn session(&mut self) -> Result<&mut Session<T>> {
        if let Some(idle) = self.idle.take() {
            let session = idle.done().await.context("failed to leave IDLE")?;
            self.session = Some(session);
        }
        self.session
            .as_mut()
            .context("mailbox session was lost during IDLE")
    }

    async fn shutdown(&mut self) -> Result<()> {
        if self.idle.is_some() || self.session.is_some() {
            self.session().await?.logout().await.context("mailbox logout failed")?;
        }
        self.session = None;
        Ok(())
    }
}

#[async_trait]
impl<T> MailboxSession for ImapMailboxSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Debug + Send,
{
    async fn open_folder(&mut self, folder: &str) -> Result<()> {
        self.session()
            .await?
            .select(folder)
            .await
            .with_context(|| format!("failed to open mailbox folder {folder}"))?;
        Ok(())
    }

    async fn fetch_unseen(&mut self) -> Result<Vec<Vec<u8>>> {
        let session = self.session().await?;
        let mut sequence = session
            .search("UNSEEN")
            .await
            .context("mailbox search for unseen messages failed")?
            .into_iter()
            .collect::<Vec<_>>();
        if sequence.is_empty() {
            return Ok(Vec::new());
        }
        sequence.sort_unstable();
        let sequence_set = sequence
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");

        // RFC822 (unlike BODY.PEEK) sets \Seen on the server.
        let fetches = session
            .fetch(&sequence_set, "RFC822")
            .await
            .context("mailbox fetch failed")?
            .try_collect::<Vec<_>>()
            .await
            .context("mailbox fetch stream failed")?;
        Ok(fetches
            .iter()
            .filter_map(|fetch| fetch.body().map(<[u8]>::to_vec))
            .collect())
    }

    async fn wait_for_change(&mut self) -> Result<MailboxEvent> {
        if self.idle.is_none() {
            let session = self
                .session
                .take()
                .context("mailbox session was lost during IDLE")?;
            let initialized = self.idle.insert(session.idle()).init().await;
            if let Err(error) = initialized {
                self.idle = None;
                return connection_event(error);
            }
        }
        let Some(idle) = self.idle.as_mut() else {
            return Err(anyhow!("mailbox IDLE handle missing"));
        };
        let (wait, _interrupt) = idle.wait_with_timeout(IDLE_KEEPALIVE);
        let waited = wait.await;
        let response = match waited {
            Ok(response) => response,
            Err(error) => {
                self.idle = None;
                return connection_event(error);
            }
        };
        self.session().await?;
        Ok(match response {
            IdleResponse::NewData(_) => MailboxEvent::NewMail,
            IdleResponse::Timeout | IdleResponse::ManualInterrupt => MailboxEvent::KeepAlive,
        })
    }

    async fn close(&mut self) {
        match tokio::time::timeout(IMAP_LOGOUT_TIMEOUT, self.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => tracing::debug!(error = %format!("{error:#}"), "mailbox logout failed"),
            Err(_) => tracing::debug!("mailbox logout timed out; dropping connection"),
        }
        self.idle = None;
        self.session = None;
    }
}

/// Maps a lost connection to `Closed`; any other IMAP failure stays an error.
fn connection_event(error: async_imap::error::Error) -> Result<MailboxEvent> {
    match error {
        async_imap::error::Error::ConnectionLost => Ok(MailboxEvent::Closed),
        async_imap::error::Error::Io(io_error)
            if matches!(
                io_error.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
            ) =>
        {
            Ok(MailboxEvent::Closed)
        }
        other => Err(anyhow!(other).context("mailbox IDLE failed")),
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    use super::*;

    /// Minimal IMAP peer: answers LOGIN, SELECT, IDLE, DONE and LOGOUT, and
    /// returns every line it received once the client logs out.
    async fn scripted_imap_server(listener: TcpListener) -> Vec<String> {
        let (socket, _) = listener.accept().await.expect("accept");
        let (read_half, mut write_half) = socket.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let mut received = Vec::new();
        let mut idle_tag: Option<String> = None;
        while let Ok(Some(line)) = lines.next_line().await {
            received.push(line.clone());
            let mut parts = line.splitn(3, ' ');
            let tag = parts.next().unwrap_or_default().to_string();
            let command = parts.next().unwrap_or_default().to_ascii_uppercase();
            let reply = if tag == "DONE" {
                format!("{} OK IDLE terminated\r\n", idle_tag.take().unwrap_or_default())
            } else {
                match command.as_str() {
                    "LOGIN" => format!("{tag} OK LOGIN completed\r\n"),
                    "SELECT" => format!(
                        "* FLAGS (\\Seen)\r\n* 0 EXISTS\r\n* 0 RECENT\r\n{tag} OK [READ-WRITE] SELECT completed\r\n"
                    ),
                    "IDLE" => {
                        idle_tag = Some(tag.clone());
                        "+ idling\r\n".to_string()
                    }
                    "LOGOUT" => format!("* BYE logging out\r\n{tag} OK LOGOUT completed\r\n"),
                    _ => format!("{tag} BAD unexpected command\r\n"),
                }
            };
            write_half.write_all(reply.as_bytes()).await.expect("reply");
            if command == "LOGOUT" {
                break;
            }
        }
        received
    }

    fn command_of(line: &str) -> String {
        if line == "DONE" {
            return line.to_string();
        }
        line.split(' ').nth(1).unwrap_or_default().to_ascii_uppercase()
    }

    #[test]
    fn unit_connection_event_treats_dropped_links_as_closed() {
        assert_eq!(
            connection_event(async_imap::error::Error::ConnectionLost).expect("closed"),
            MailboxEvent::Closed
        );
        let reset = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
        assert_eq!(
            connection_event(async_imap::error::Error::Io(reset)).expect("closed"),
            MailboxEvent::Closed
        );
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(connection_event(async_imap::error::Error::Io(denied)).is_err());
    }

    #[tokio::test]
    async fn regression_connect_without_host_fails_before_network() {
        let connector = ImapConnector::new().expect("tls config");
        let error = match connector
            .connect(&MailboxWatchConfig::default())
            .await
        {
            Ok(_) => panic!("connect without host should fail"),
            Err(error) => error,
        };
        assert!(error.to_string().contains("mailbox host is not configured"));
    }

    #[tokio::test]
    async fn regression_connect_times_out_when_server_never_answers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let _silent = tokio::spawn(async move {
            let accepted = listener.accept().await;
            std::future::pending::<()>().await;
            drop(accepted);
        });

        let connector = ImapConnector::new()
            .expect("tls config")
            .with_connect_timeout(Duration::from_millis(200));
        let config = MailboxWatchConfig {
            host: Some("127.0.0.1".to_string()),
            port,
            user: Some("brain".to_string()),
            password: Some("secret".to_string()),
            ..MailboxWatchConfig::default()
        };
        let error = match tokio::time::timeout(Duration::from_secs(10), connector.connect(&config))
            .await
            .expect("connect gives up on its own")
        {
            Ok(_) => panic!("silent server should not yield a session"),
            Err(error) => error,
        };
        assert!(error.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn regression_close_after_interrupted_idle_leaves_idle_and_logs_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = tokio::spawn(scripted_imap_server(listener));

        let stream = TcpStream::connect(addr).await.expect("connect");
        let session = async_imap::Client::new(stream)
            .login("brain", "secret")
            .await
            .map_err(|(error, _client)| error)
            .expect("login");
        let mut mailbox = ImapMailboxSession::new(session);
        mailbox.open_folder("Brain").await.expect("select");

        let waited =
            tokio::time::timeout(Duration::from_millis(200), mailbox.wait_for_change()).await;
        assert!(waited.is_err(), "no mail arrives while idling");
        assert!(mailbox.idle.is_some());

        mailbox.close().await;
        assert!(mailbox.idle.is_none() && mailbox.session.is_none());
        let received = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server sees logout")
            .expect("join server");
        let commands = received.iter().map(|line| command_of(line)).collect::<Vec<_>>();
        assert_eq!(commands, vec!["LOGIN", "SELECT", "IDLE", "DONE", "LOGOUT"]);
    }
}
