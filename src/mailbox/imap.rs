//! IMAP mailbox over TLS.
//!
//! Labels map to IMAP folders. Every operation opens a short session on a
//! blocking thread, runs its commands and logs out.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mail_parser::{HeaderName, MessageParser};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::error::{ConfigError, MailboxError};
use crate::mailbox::{Label, MailMessage, Mailbox};

const INBOX: &str = "INBOX";
const IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Folders flagged with these attributes are not offered as labels.
const HIDDEN_ATTRIBUTES: &[&str] = &[
    "\\noselect",
    "\\nonexistent",
    "\\all",
    "\\archive",
    "\\drafts",
    "\\flagged",
    "\\important",
    "\\junk",
    "\\sent",
    "\\trash",
];

/// IMAP connection settings.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

impl ImapConfig {
    /// Build config from `MAIL_IMAP_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("MAIL_IMAP_HOST")
            .ok()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "MAIL_IMAP_HOST".into(),
                hint: "Set it to your IMAP server, e.g. imap.gmail.com".into(),
            })?;

        let port = match std::env::var("MAIL_IMAP_PORT") {
            Ok(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                key: "MAIL_IMAP_PORT".into(),
                message: format!("'{raw}' is not a port number"),
            })?,
            Err(_) => 993,
        };

        let username = std::env::var("MAIL_USERNAME").unwrap_or_default();
        let password = SecretString::from(std::env::var("MAIL_PASSWORD").unwrap_or_default());

        Ok(Self {
            host,
            port,
            username,
            password,
        })
    }
}

/// [`Mailbox`] backed by an IMAP server.
pub struct ImapMailbox {
    config: Arc<ImapConfig>,
}

impl ImapMailbox {
    pub fn new(config: ImapConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    async fn with_session<T, F>(&self, op: F) -> Result<T, MailboxError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImapSession) -> Result<T, MailboxError> + Send + 'static,
    {
        let config = Arc::clone(&self.config);
        tokio::task::spawn_blocking(move || {
            let mut session = ImapSession::open(&config)?;
            let result = op(&mut session);
            session.logout();
            result
        })
        .await
        .map_err(|e| MailboxError::Task(e.to_string()))?
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    async fn list_unread(&self, limit: usize) -> Result<Vec<String>, MailboxError> {
        self.with_session(move |s| {
            s.command(&format!("SELECT {}", quote(INBOX)))?;
            let response = s.command("UID SEARCH UNSEEN")?;
            let mut uids: Vec<u32> = response
                .iter()
                .flat_map(|r| parse_search_line(&r.line))
                .collect();
            uids.sort_unstable();
            uids.dedup();
            Ok(uids.into_iter().take(limit).map(|u| u.to_string()).collect())
        })
        .await
    }

    async fn fetch(&self, id: &str) -> Result<MailMessage, MailboxError> {
        let uid = parse_uid(id)?;
        let id = id.to_string();
        self.with_session(move |s| {
            s.command(&format!("SELECT {}", quote(INBOX)))?;
            let response = s.command(&format!("UID FETCH {uid} BODY.PEEK[]"))?;
            let raw = response
                .into_iter()
                .find_map(|r| r.literal)
                .ok_or_else(|| MailboxError::NotFound { id: id.clone() })?;
            parse_message(&id, &raw)
        })
        .await
    }

    async fn list_labels(&self) -> Result<Vec<Label>, MailboxError> {
        self.with_session(|s| {
            let response = s.command("LIST \"\" \"*\"")?;
            let labels = response
                .iter()
                .filter_map(|r| parse_list_line(&r.line, r.literal.as_deref()))
                .filter(|entry| entry.is_label())
                .map(|entry| Label {
                    name: decode_mailbox_name(&entry.name),
                    id: entry.name,
                })
                .collect();
            Ok(labels)
        })
        .await
    }

    async fn create_label(&self, name: &str) -> Result<Label, MailboxError> {
        let name = name.to_string();
        self.with_session(move |s| {
            let encoded = encode_mailbox_name(&name);
            s.command(&format!("CREATE {}", quote(&encoded)))?;
            Ok(Label { id: encoded, name })
        })
        .await
    }

    async fn move_to_label(&self, id: &str, label_id: &str) -> Result<(), MailboxError> {
        let uid = parse_uid(id)?;
        let target = quote(label_id);
        self.with_session(move |s| move_message(s, uid, &target)).await
    }
}

/// Move one INBOX message to `target` (already quoted).
///
/// Uses `UID MOVE`; servers without it get `UID COPY` plus a `UID EXPUNGE`
/// scoped to the message, which needs UIDPLUS. A plain `EXPUNGE` is never
/// sent because it would also remove other messages flagged `\Deleted`.
fn move_message(s: &mut impl ImapCommands, uid: u32, target: &str) -> Result<(), MailboxError> {
    s.command(&format!("SELECT {}", quote(INBOX)))?;
    let reason = match s.command(&format!("UID MOVE {uid} {target}")) {
        Ok(_) => return Ok(()),
        Err(MailboxError::Protocol { reason, .. }) => reason,
        Err(e) => return Err(e),
    };

    if !has_capability(s, "UIDPLUS")? {
        return Err(MailboxError::Protocol {
            command: "UID MOVE".into(),
            reason: format!("{reason} (no UIDPLUS for a scoped expunge)"),
        });
    }
    debug!(uid, reason = %reason, "UID MOVE rejected, falling back to COPY");
    s.command(&format!("UID COPY {uid} {target}"))?;
    s.command(&format!("UID STORE {uid} +FLAGS.SILENT (\\Deleted)"))?;
    if let Err(e) = s.command(&format!("UID EXPUNGE {uid}")) {
        // leave the original in place, the copy stays in the target
        s.command(&format!("UID STORE {uid} -FLAGS.SILENT (\\Deleted)"))?;
        return Err(e);
    }
    Ok(())
}

fn has_capability(s: &mut impl ImapCommands, name: &str) -> Result<bool, MailboxError> {
    let responses = s.command("CAPABILITY")?;
    Ok(responses.iter().any(|r| {
        r.line
            .strip_prefix("* CAPABILITY ")
            .is_some_and(|caps| caps.split_whitespace().any(|c| c.eq_ignore_ascii_case(name)))
    }))
}

// ── Session ─────────────────────────────────────────────────────────

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// One untagged response line, with the literal that followed it, if any.
#[derive(Debug)]
struct Untagged {
    line: String,
    literal: Option<Vec<u8>>,
}

struct ImapSession {
    tls: TlsStream,
    tag: u32,
}

/// Command channel of an authenticated session.
trait ImapCommands {
    fn command(&mut self, cmd: &str) -> Result<Vec<Untagged>, MailboxError>;
}

impl ImapCommands for ImapSession {
    fn command(&mut self, cmd: &str) -> Result<Vec<Untagged>, MailboxError> {
        ImapSession::command(self, cmd)
    }
}

impl ImapSession {
    fn open(config: &ImapConfig) -> Result<Self, MailboxError> {
        let conn_err = |reason: String| MailboxError::Connection {
            host: config.host.clone(),
            reason,
        };

        let tcp = TcpStream::connect((config.host.as_str(), config.port))
            .map_err(|e| conn_err(e.to_string()))?;
        tcp.set_read_timeout(Some(IO_TIMEOUT))?;
        tcp.set_write_timeout(Some(IO_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls_pki_types::ServerName::try_from(config.host.clone())
            .map_err(|e| conn_err(e.to_string()))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| conn_err(e.to_string()))?;

        let mut session = Self {
            tls: rustls::StreamOwned::new(conn, tcp),
            tag: 0,
        };

        let greeting = session.read_line()?;
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(conn_err(format!("unexpected greeting: {}", greeting.trim())));
        }

        let login = format!(
            "LOGIN {} {}",
            quote(&config.username),
            quote(config.password.expose_secret())
        );
        session.command(&login).map_err(|e| match e {
            MailboxError::Protocol { reason, .. } => conn_err(format!("login rejected: {reason}")),
            other => other,
        })?;
        debug!(host = %config.host, "IMAP session opened");
        Ok(session)
    }

    fn read_line(&mut self) -> Result<String, MailboxError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.tls.read(&mut byte)? {
                0 => {
                    return Err(MailboxError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "IMAP connection closed",
                    )));
                }
                _ => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).into_owned());
                    }
                }
            }
        }
    }

    /// Send a tagged command and collect untagged responses until its
    /// completion. A `NO` or `BAD` completion becomes `Protocol`.
    fn command(&mut self, cmd: &str) -> Result<Vec<Untagged>, MailboxError> {
        self.tag += 1;
        let tag = format!("A{}", self.tag);
        // never echo credentials into errors
        let verb = cmd.split_whitespace().take(2).collect::<Vec<_>>().join(" ");
        let verb = if verb.starts_with("LOGIN") {
            "LOGIN".to_string()
        } else {
            verb
        };

        self.tls.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        self.tls.flush()?;

        let prefix = format!("{tag} ");
        let mut responses = Vec::new();
        loop {
            let line = self.read_line()?;
            if let Some(status) = line.strip_prefix(&prefix) {
                if status.starts_with("OK") {
                    return Ok(responses);
                }
                return Err(MailboxError::Protocol {
                    command: verb,
                    reason: status.trim().to_string(),
                });
            }

            let literal = match literal_len(&line) {
                Some(len) => {
                    let mut data = vec![0u8; len];
                    self.tls.read_exact(&mut data)?;
                    Some(data)
                }
                None => None,
            };
            responses.push(Untagged { line, literal });
        }
    }

    fn logout(&mut self) {
        if let Err(e) = self.command("LOGOUT") {
            debug!(error = %e, "IMAP logout failed");
        }
    }
}

// ── Protocol helpers ────────────────────────────────────────────────

fn parse_uid(id: &str) -> Result<u32, MailboxError> {
    id.trim()
        .parse()
        .map_err(|_| MailboxError::NotFound { id: id.to_string() })
}

/// IMAP quoted string.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Size of a `{N}` literal announced at the end of a response line.
fn literal_len(line: &str) -> Option<usize> {
    let line = line.trim_end_matches("\r\n");
    let open = line.rfind('{')?;
    let inner = line[open + 1..].strip_suffix('}')?;
    inner.trim_end_matches('+').parse().ok()
}

/// UIDs from a `* SEARCH ...` line.
fn parse_search_line(line: &str) -> Vec<u32> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("*"), Some(kw)) if kw.eq_ignore_ascii_case("SEARCH") => {
            parts.filter_map(|p| p.parse().ok()).collect()
        }
        _ => Vec::new(),
    }
}

#[derive(Debug, PartialEq, Eq)]
struct ListEntry {
    attributes: Vec<String>,
    name: String,
}

impl ListEntry {
    fn is_label(&self) -> bool {
        if self.name.eq_ignore_ascii_case(INBOX) {
            return false;
        }
        if self.name.starts_with("[Gmail]") || self.name.starts_with("[Google Mail]") {
            return false;
        }
        !self
            .attributes
            .iter()
            .any(|a| HIDDEN_ATTRIBUTES.contains(&a.to_lowercase().as_str()))
    }
}

/// Parse `* LIST (attrs) "delim" name`. The name may be quoted, an atom,
/// or a literal that followed the line.
fn parse_list_line(line: &str, literal: Option<&[u8]>) -> Option<ListEntry> {
    let rest = line.trim_end_matches("\r\n").strip_prefix("* LIST ")?;
    let rest = rest.strip_prefix('(')?;
    let close = rest.find(')')?;
    let attributes = rest[..close]
        .split_whitespace()
        .map(str::to_string)
        .collect();

    let rest = rest[close + 1..].trim_start();
    let rest = if let Some(after) = rest.strip_prefix("NIL") {
        after
    } else {
        let (_, after) = take_quoted(rest)?;
        after
    };
    let rest = rest.trim();

    let name = if let Some(data) = literal {
        String::from_utf8_lossy(data).into_owned()
    } else if rest.starts_with('"') {
        take_quoted(rest)?.0
    } else {
        rest.to_string()
    };

    (!name.is_empty()).then_some(ListEntry { attributes, name })
}

/// Split a leading quoted string off `input`, unescaping it.
fn take_quoted(input: &str) -> Option<(String, &str)> {
    let body = input.strip_prefix('"')?;
    let mut out = String::new();
    let mut escaped = false;
    for (i, ch) in body.char_indices() {
        match ch {
            _ if escaped => {
                out.push(ch);
                escaped = false;
            }
            '\\' => escaped = true,
            '"' => return Some((out, &body[i + 1..])),
            _ => out.push(ch),
        }
    }
    None
}

// ── Modified UTF-7 (RFC 3501 §5.1.3) ────────────────────────────────

const MUTF7_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+,";

/// Encode a folder name for the wire.
fn encode_mailbox_name(name: &str) -> String {
    let mut out = String::new();
    let mut pending: Vec<u16> = Vec::new();

    let flush = |pending: &mut Vec<u16>, out: &mut String| {
        if pending.is_empty() {
            return;
        }
        let bytes: Vec<u8> = pending.iter().flat_map(|u| u.to_be_bytes()).collect();
        out.push('&');
        for chunk in bytes.chunks(3) {
            let b = [chunk[0], *chunk.get(1).unwrap_or(&0), *chunk.get(2).unwrap_or(&0)];
            let n = (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]);
            let chars = chunk.len() + 1;
            for i in 0..chars {
                let idx = (n >> (18 - 6 * i)) & 0x3f;
                out.push(char::from(MUTF7_ALPHABET[idx as usize]));
            }
        }
        out.push('-');
        pending.clear();
    };

    for ch in name.chars() {
        if ('\x20'..='\x7e').contains(&ch) {
            flush(&mut pending, &mut out);
            if ch == '&' {
                out.push_str("&-");
            } else {
                out.push(ch);
            }
        } else {
            let mut units = [0u16; 2];
            pending.extend_from_slice(ch.encode_utf16(&mut units));
        }
    }
    flush(&mut pending, &mut out);
    out
}

/// Decode a wire folder name; malformed sequences are kept as-is.
fn decode_mailbox_name(raw: &str) -> String {
    let mut out = String::new();
    let mut rest = raw;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('-') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let encoded = &after[..end];
        if encoded.is_empty() {
            out.push('&');
        } else {
            match decode_mutf7_run(encoded) {
                Some(text) => out.push_str(&text),
                None => out.push_str(&rest[start..start + end + 2]),
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

fn decode_mutf7_run(encoded: &str) -> Option<String> {
    let mut bits: u32 = 0;
    let mut nbits = 0;
    let mut bytes = Vec::new();
    for c in encoded.bytes() {
        let value = MUTF7_ALPHABET.iter().position(|&a| a == c)? as u32;
        bits = (bits << 6) | value;
        nbits += 6;
        if nbits >= 8 {
            nbits -= 8;
            bytes.push((bits >> nbits) as u8);
            bits &= (1 << nbits) - 1;
        }
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

// ── Message parsing ─────────────────────────────────────────────────

/// Parse a raw RFC 822 message into a [`MailMessage`].
pub fn parse_message(id: &str, raw: &[u8]) -> Result<MailMessage, MailboxError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| MailboxError::Parse { id: id.to_string() })?;

    let subject = parsed
        .subject()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("(no subject)")
        .to_string();

    let sender = parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_default();

    let body = if let Some(text) = parsed.body_text(0) {
        text.into_owned()
    } else if let Some(html) = parsed.body_html(0) {
        strip_html(html.as_ref())
    } else {
        String::new()
    };

    let list_unsubscribe = parsed
        .header_raw(HeaderName::ListUnsubscribe)
        .map(unfold_header)
        .filter(|v| !v.is_empty());

    Ok(MailMessage {
        id: id.to_string(),
        subject,
        sender,
        body,
        list_unsubscribe,
    })
}

/// Join folded header lines and trim.
fn unfold_header(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}
