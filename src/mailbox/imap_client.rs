//! IMAP over TLS.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use native_tls::{TlsConnector, TlsStream};
use tracing::{debug, info, warn};

use crate::error::{Phase, Result, StashError};
use crate::mailbox::{Credentials, MailSource};
use crate::model::message::MessageId;

type Session = imap::Session<TlsStream<TcpStream>>;

/// Where and how to reach the IMAP server.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Mailbox to select, usually `INBOX`.
    pub mailbox: String,
    /// Applied to connect, reads and writes, so a stalled server fails the
    /// operation instead of hanging the run.
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
}

/// A logged-in IMAP session. Message identifiers are UIDs.
///
/// The session is logged out on [`MailSource::logout`] or, failing that,
/// when the value is dropped.
pub struct ImapMailbox {
    session: Option<Session>,
    mailbox: String,
}

impl ImapMailbox {
    /// Open a TLS connection and log in.
    pub fn connect(server: &ServerSettings, credentials: &Credentials) -> Result<Self> {
        info!(host = %server.host, port = server.port, "Connecting to IMAP server");

        let tcp = open_tcp(&server.host, server.port, server.timeout)?;
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(server.accept_invalid_certs)
            .build()
            .map_err(|e| connection_error(Phase::Connect, e))?;
        let tls = connector
            .connect(&server.host, tcp)
            .map_err(|e| connection_error(Phase::Connect, e))?;

        let mut client = imap::Client::new(tls);
        client
            .read_greeting()
            .map_err(|e| connection_error(Phase::Connect, e))?;
        debug!(host = %server.host, "TLS session established");

        let session = client
            .login(&credentials.username, &credentials.password)
            .map_err(|(e, _client)| match e {
                imap::Error::Io(io) => connection_error(Phase::Login, io),
                other => StashError::Auth(other.to_string()),
            })?;
        info!(user = %credentials.username, "Logged in");

        Ok(Self {
            session: Some(session),
            mailbox: server.mailbox.clone(),
        })
    }

    fn session(&mut self, phase: Phase) -> Result<&mut Session> {
        self.session.as_mut().ok_or_else(|| StashError::Connection {
            phase,
            reason: "session already closed".to_string(),
        })
    }
}

impl MailSource for ImapMailbox {
    fn select_inbox(&mut self) -> Result<()> {
        let name = self.mailbox.clone();
        let mailbox = self.session(Phase::Select)?.select(&name).map_err(|e| match e {
            imap::Error::Io(io) => connection_error(Phase::Select, io),
            other => StashError::Mailbox {
                name: name.clone(),
                reason: other.to_string(),
            },
        })?;
        info!(mailbox = %name, exists = mailbox.exists, "Selected mailbox");
        Ok(())
    }

    fn list_all_message_ids(&mut self) -> Result<Vec<MessageId>> {
        let uids = self
            .session(Phase::Search)?
            .uid_search("ALL")
            .map_err(|e| connection_error(Phase::Search, e))?;
        let mut uids: Vec<u32> = uids.into_iter().collect();
        uids.sort_unstable();
        debug!(count = uids.len(), "Listed message UIDs");
        Ok(uids.into_iter().map(MessageId::from).collect())
    }

    fn fetch_raw(&mut self, id: &MessageId) -> Result<Vec<u8>> {
        let fetch_error = |reason: String| StashError::Fetch {
            id: id.to_string(),
            reason,
        };

        let uid: u32 = id
            .as_str()
            .parse()
            .map_err(|_| fetch_error("not an IMAP UID".to_string()))?;

        // BODY.PEEK leaves the \Seen flag alone
        let fetches = self
            .session(Phase::Fetch)?
            .uid_fetch(uid.to_string(), "BODY.PEEK[]")
            .map_err(|e| fetch_error(e.to_string()))?;

        fetches
            .iter()
            .find_map(|f| f.body().map(<[u8]>::to_vec))
            .ok_or_else(|| fetch_error("message no longer exists".to_string()))
    }

    fn logout(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            session.logout().map_err(|e| connection_error(Phase::Connect, e))?;
            info!("Logged out");
        }
        Ok(())
    }
}

impl Drop for ImapMailbox {
    fn drop(&mut self) {
        if let Err(e) = self.logout() {
            warn!(error = %e, "Logout on drop failed");
        }
    }
}

/// Connect to the first reachable address of `host` and set socket timeouts.
fn open_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| connection_error(Phase::Connect, e))?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream
                    .set_read_timeout(Some(timeout))
                    .and_then(|()| stream.set_write_timeout(Some(timeout)))
                    .map_err(|e| connection_error(Phase::Connect, e))?;
                return Ok(stream);
            }
            Err(e) => {
                debug!(%addr, error = %e, "Address unreachable");
                last_error = Some(e);
            }
        }
    }

    Err(StashError::Connection {
        phase: Phase::Connect,
        reason: match last_error {
            Some(e) => e.to_string(),
            None => format!("{host} did not resolve to any address"),
        },
    })
}

fn connection_error(phase: Phase, e: impl std::fmt::Display) -> StashError {
    StashError::Connection {
        phase,
        reason: e.to_string(),
    }
}
