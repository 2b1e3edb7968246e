//! Automated unsubscribe via the `List-Unsubscribe` header.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{info, warn};

use crate::error::UnsubscribeError;
use crate::journal::UnsubscribeLog;

pub const UNSUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Angle-bracketed tokens of a `List-Unsubscribe` header.
static ANGLE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<\s*([^<>\s]+)\s*>").expect("valid List-Unsubscribe token pattern")
});

/// Where an unsubscribe request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsubscribeTarget {
    Http(String),
    /// Address without the `mailto:` scheme. Logged, never sent.
    Mailto(String),
}

impl UnsubscribeTarget {
    /// The first HTTP(S) token wins; otherwise the first `mailto:` token.
    pub fn parse(header: &str) -> Option<Self> {
        let tokens: Vec<&str> = ANGLE_TOKEN
            .captures_iter(header)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();

        if let Some(url) = tokens.iter().find(|t| has_scheme(t, "http")) {
            return Some(Self::Http(url.to_string()));
        }
        tokens.iter().find_map(|t| {
            strip_scheme(t, "mailto:")
                .filter(|addr| !addr.is_empty())
                .map(|addr| Self::Mailto(addr.to_string()))
        })
    }
}

impl std::fmt::Display for UnsubscribeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(url) => f.write_str(url),
            Self::Mailto(addr) => write!(f, "mailto:{addr}"),
        }
    }
}

fn has_scheme(token: &str, scheme: &str) -> bool {
    token
        .get(..scheme.len())
        .is_some_and(|s| s.eq_ignore_ascii_case(scheme))
}

fn strip_scheme<'a>(token: &'a str, scheme: &str) -> Option<&'a str> {
    has_scheme(token, scheme).then(|| &token[scheme.len()..])
}

/// What an unsubscribe attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    /// The endpoint answered with a success status.
    Requested { url: String, status: u16 },
    /// Only a mailto target exists; it was logged.
    Logged { address: String },
}

/// Executes unsubscribe requests and logs every attempt.
pub struct Unsubscriber {
    client: reqwest::Client,
    log: UnsubscribeLog,
}

impl Unsubscriber {
    pub fn new(log: UnsubscribeLog) -> Result<Self, UnsubscribeError> {
        let client = reqwest::Client::builder()
            .timeout(UNSUBSCRIBE_TIMEOUT)
            .build()?;
        Ok(Self { client, log })
    }

    /// Log the attempt, then issue the request for HTTP targets.
    pub async fn unsubscribe(
        &self,
        subject: &str,
        target: &UnsubscribeTarget,
    ) -> Result<UnsubscribeOutcome, UnsubscribeError> {
        let rendered = target.to_string();
        self.log.record(subject, &rendered).await?;

        match target {
            UnsubscribeTarget::Mailto(address) => {
                info!(target = %rendered, "Unsubscribe via mail logged, not sent");
                Ok(UnsubscribeOutcome::Logged {
                    address: address.clone(),
                })
            }
            UnsubscribeTarget::Http(url) => {
                let response = self.client.get(url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(UnsubscribeError::Status {
                        status: status.as_u16(),
                    });
                }
                info!(url = %url, status = status.as_u16(), "Unsubscribed");
                Ok(UnsubscribeOutcome::Requested {
                    url: url.clone(),
                    status: status.as_u16(),
                })
            }
        }
    }

    /// Parse `header` and unsubscribe. Failures are logged and yield `None`.
    pub async fn try_unsubscribe(&self, subject: &str, header: &str) -> Option<UnsubscribeOutcome> {
        let Some(target) = UnsubscribeTarget::parse(header) else {
            warn!(subject = %subject, error = %UnsubscribeError::NoTarget, "Unsubscribe skipped");
            return None;
        };
        match self.unsubscribe(subject, &target).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(subject = %subject, target = %target, error = %e, "Unsubscribe failed");
                None
            }
        }
    }
}

/// Check if a sender is on a list of senders.
///
/// Entries are `*`, `@domain`, `domain` or an exact address; comparison is
/// case-insensitive. An empty list matches nobody.
pub fn is_sender_listed(listed: &[String], email: &str) -> bool {
    if listed.is_empty() {
        return false;
    }
    if listed.iter().any(|a| a == "*") {
        return true;
    }
    let email_lower = email.trim().to_lowercase();
    listed.iter().any(|a| {
        let a = a.trim().to_lowercase();
        if a.starts_with('@') {
            email_lower.ends_with(&a)
        } else if a.contains('@') {
            a == email_lower
        } else {
            email_lower.ends_with(&format!("@{a}"))
        }
    })
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    use super::*;

    /// Serve one HTTP request with `status_line`, returning the request line.
    fn serve_once(status_line: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                    break;
                }
            }
            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            )
            .unwrap();
            stream.flush().unwrap();
            request_line.trim_end().to_string()
        });
        (format!("http://{addr}/unsubscribe?id=42"), handle)
    }

    #[test]
    fn token_pattern_compiles() {
        assert_eq!(ANGLE_TOKEN.captures_iter("<a> , < b >").count(), 2);
    }

    #[test]
    fn http_target_preferred_over_mailto() {
        let header = "<mailto:leave@shop.example?subject=unsub>, <https://shop.example/u?id=7>";
        assert_eq!(
            UnsubscribeTarget::parse(header),
            Some(UnsubscribeTarget::Http("https://shop.example/u?id=7".into()))
        );
    }

    #[test]
    fn first_http_target_wins() {
        let header = "<http://a.example/1>, <https://b.example/2>";
        assert_eq!(
            UnsubscribeTarget::parse(header),
            Some(UnsubscribeTarget::Http("http://a.example/1".into()))
        );
    }

    #[test]
    fn mailto_only() {
        let target = UnsubscribeTarget::parse("<mailto:leave@news.example>").unwrap();
        assert_eq!(target, UnsubscribeTarget::Mailto("leave@news.example".into()));
        assert_eq!(target.to_string(), "mailto:leave@news.example");
    }

    #[test]
    fn no_usable_target() {
        assert_eq!(UnsubscribeTarget::parse(""), None);
        assert_eq!(UnsubscribeTarget::parse("https://bare.example/u"), None);
        assert_eq!(UnsubscribeTarget::parse("<ftp://x.example>"), None);
        assert_eq!(UnsubscribeTarget::parse("<mailto:>"), None);
    }

    #[tokio::test]
    async fn mailto_is_logged_not_sent() {
        let dir = tempfile::tempdir().unwrap();
        let log = UnsubscribeLog::new(dir.path().join("unsub.txt"));
        let unsubscriber = Unsubscriber::new(log.clone()).unwrap();

        let outcome = unsubscriber
            .try_unsubscribe("Weekly deals", "<mailto:leave@shop.example>")
            .await;
        assert_eq!(
            outcome,
            Some(UnsubscribeOutcome::Logged {
                address: "leave@shop.example".into()
            })
        );

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert!(content.contains("| Weekly deals | mailto:leave@shop.example"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_logged_and_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let log = UnsubscribeLog::new(dir.path().join("unsub.txt"));
        let unsubscriber = Unsubscriber::new(log.clone()).unwrap();

        // port 9 on localhost refuses connections
        let outcome = unsubscriber
            .try_unsubscribe("Promo", "<http://127.0.0.1:9/unsubscribe>")
            .await;
        assert!(outcome.is_none());

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("http://127.0.0.1:9/unsubscribe"));
    }

    #[tokio::test]
    async fn successful_request_reports_status() {
        let dir = tempfile::tempdir().unwrap();
        let log = UnsubscribeLog::new(dir.path().join("unsub.txt"));
        let unsubscriber = Unsubscriber::new(log.clone()).unwrap();
        let (url, server) = serve_once("200 OK");

        let outcome = unsubscriber
            .try_unsubscribe("Weekly deals", &format!("<{url}>"))
            .await;
        assert_eq!(
            outcome,
            Some(UnsubscribeOutcome::Requested {
                url: url.clone(),
                status: 200
            })
        );
        assert_eq!(server.join().unwrap(), "GET /unsubscribe?id=42 HTTP/1.1");

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains(&format!("| Weekly deals | {url}")));
    }

    #[tokio::test]
    async fn error_status_is_reported_and_logged() {
        let dir = tempfile::tempdir().unwrap();
        let log = UnsubscribeLog::new(dir.path().join("unsub.txt"));
        let unsubscriber = Unsubscriber::new(log.clone()).unwrap();
        let (url, server) = serve_once("404 Not Found");

        let result = unsubscriber
            .unsubscribe("Promo", &UnsubscribeTarget::Http(url.clone()))
            .await;
        assert!(matches!(result, Err(UnsubscribeError::Status { status: 404 })));
        server.join().unwrap();

        let (url_again, server) = serve_once("404 Not Found");
        let outcome = unsubscriber
            .try_unsubscribe("Promo", &format!("<{url_again}>"))
            .await;
        assert!(outcome.is_none());
        server.join().unwrap();

        // the attempt is logged before the request, whatever the answer
        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains(&format!("| Promo | {url}")));
        assert!(content.contains(&format!("| Promo | {url_again}")));
    }

    #[tokio::test]
    async fn header_without_target_logs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = UnsubscribeLog::new(dir.path().join("unsub.txt"));
        let unsubscriber = Unsubscriber::new(log.clone()).unwrap();

        assert!(unsubscriber.try_unsubscribe("x", "nothing here").await.is_none());
        assert!(!log.path().exists());
    }

    #[test]
    fn sender_list_empty_matches_nobody() {
        assert!(!is_sender_listed(&[], "anyone@example.com"));
    }

    #[test]
    fn sender_list_wildcard_matches_all() {
        assert!(is_sender_listed(&["*".into()], "anyone@example.com"));
    }

    #[test]
    fn sender_list_entry_forms() {
        let listed = vec![
            "boss@work.example".to_string(),
            "@paid.example".to_string(),
            "Premium.Example".to_string(),
        ];
        assert!(is_sender_listed(&listed, "Boss@Work.example"));
        assert!(is_sender_listed(&listed, "news@paid.example"));
        assert!(is_sender_listed(&listed, "digest@premium.example"));
        assert!(!is_sender_listed(&listed, "other@work.example"));
        assert!(!is_sender_listed(&listed, "x@notpremium.example.org"));
    }
}
