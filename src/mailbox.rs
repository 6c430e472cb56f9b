//! Second-factor code retrieval from an IMAP inbox.
//!
//! When the platform asks for a second factor it emails a six-digit code from
//! its security address. [`ImapCodeSource`] logs into the inbox, picks the
//! latest message from that sender, and pulls the code out of the HTML body.
//!
//! Failing to reach or log into the mailbox is an error; everything after
//! that (no matching message, unreadable body, no code in it) is reported as
//! `Ok(None)`.

use crate::config::MailboxConfig;
use crate::error::MailboxError;
use async_trait::async_trait;
use mailparse::ParsedMail;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

static CODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<font size="6">(\d{6})</font>"#).unwrap());

/// Anything that can hand back a pending second-factor code.
#[async_trait]
pub trait CodeSource: Send + Sync {
    async fn retrieve_code(&self) -> Result<Option<String>, MailboxError>;
}

/// Extract the code from an HTML body.
pub fn extract_code(body: &str) -> Option<String> {
    CODE_PATTERN
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// The message the search considers latest.
///
/// IMAP returns search hits as ascending sequence numbers; the last one is
/// the highest.
pub fn latest_message(ids: &HashSet<u32>) -> Option<u32> {
    ids.iter().copied().max()
}

/// Body text to scan: the first `text/html` part of a multipart message, or
/// the sole body of a single-part one.
pub fn message_body(raw: &[u8]) -> Option<String> {
    let parsed = match mailparse::parse_mail(raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "Could not parse security email");
            return None;
        }
    };
    if parsed.subparts.is_empty() {
        return parsed.get_body().ok();
    }
    first_html_part(&parsed).and_then(|part| part.get_body().ok())
}

fn first_html_part<'a, 'b>(part: &'b ParsedMail<'a>) -> Option<&'b ParsedMail<'a>> {
    if part.ctype.mimetype.eq_ignore_ascii_case("text/html") {
        return Some(part);
    }
    part.subparts.iter().find_map(|p| first_html_part(p))
}

/// [`CodeSource`] backed by an IMAP-over-TLS inbox.
#[derive(Debug, Clone)]
pub struct ImapCodeSource {
    config: MailboxConfig,
}

impl ImapCodeSource {
    pub fn new(config: MailboxConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CodeSource for ImapCodeSource {
    #[instrument(level = "info", skip_all, fields(host = %self.config.host, sender = %self.config.sender))]
    async fn retrieve_code(&self) -> Result<Option<String>, MailboxError> {
        let config = self.config.clone();
        let limit = session_timeout(&self.config);
        let session = tokio::task::spawn_blocking(move || fetch_latest_message(&config));
        let raw = match tokio::time::timeout(limit, session).await {
            Ok(joined) => joined.map_err(|e| MailboxError::Worker(e.to_string()))??,
            Err(_) => {
                warn!(secs = limit.as_secs(), "Mailbox session did not finish in time");
                return Err(MailboxError::Timeout(limit.as_secs()));
            }
        };

        let Some(raw) = raw else {
            warn!("No security email found");
            return Ok(None);
        };
        let Some(body) = message_body(&raw) else {
            warn!("Security email has no readable body");
            return Ok(None);
        };
        match extract_code(&body) {
            Some(code) => {
                info!("Found second-factor code in email");
                Ok(Some(code))
            }
            None => {
                warn!("2FA code not found in email");
                Ok(None)
            }
        }
    }
}

fn session_timeout(config: &MailboxConfig) -> Duration {
    Duration::from_secs(config.timeout_secs.max(1))
}

type TlsClient = imap::Client<native_tls::TlsStream<TcpStream>>;

/// TLS connection with socket timeouts, so a stalled server errors out
/// instead of blocking the worker forever.
fn connect(config: &MailboxConfig) -> Result<TlsClient, MailboxError> {
    let limit = session_timeout(config);
    let addr = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|e| MailboxError::Connect(e.to_string()))?
        .next()
        .ok_or_else(|| MailboxError::Connect(format!("no address for {}", config.host)))?;

    let tcp = TcpStream::connect_timeout(&addr, limit).map_err(|e| MailboxError::Connect(e.to_string()))?;
    tcp.set_read_timeout(Some(limit))
        .and_then(|()| tcp.set_write_timeout(Some(limit)))
        .map_err(|e| MailboxError::Connect(e.to_string()))?;

    let tls = native_tls::TlsConnector::builder().build()?;
    let stream = tls
        .connect(&config.host, tcp)
        .map_err(|e| MailboxError::Connect(e.to_string()))?;
    let mut client = imap::Client::new(stream);
    client
        .read_greeting()
        .map_err(|e| MailboxError::Connect(e.to_string()))?;
    Ok(client)
}

/// Blocking IMAP session: connect, log in, search, fetch the latest match.
fn fetch_latest_message(config: &MailboxConfig) -> Result<Option<Vec<u8>>, MailboxError> {
    let client = connect(config)?;
    let mut session = client
        .login(&config.username, &config.password)
        .map_err(|(e, _)| MailboxError::Login(e.to_string()))?;
    debug!(user = %config.username, "Logged into mailbox");

    session
        .select("INBOX")
        .map_err(|e| MailboxError::Select {
            mailbox: "INBOX".to_string(),
            reason: e.to_string(),
        })?;

    let raw = match session.search(format!("FROM \"{}\"", config.sender)) {
        Ok(ids) => match latest_message(&ids) {
            Some(seq) => {
                debug!(seq, hits = ids.len(), "Fetching latest security email");
                match session.fetch(seq.to_string(), "RFC822") {
                    Ok(messages) => messages.iter().next().and_then(|m| m.body()).map(<[u8]>::to_vec),
                    Err(e) => {
                        warn!(error = %e, "Failed to fetch email");
                        None
                    }
                }
            }
            None => None,
        },
        Err(e) => {
            warn!(error = %e, "Failed to search emails");
            None
        }
    };

    if let Err(e) = session.logout() {
        debug!(error = %e, "Mailbox logout failed");
    }
    Ok(raw)
}
