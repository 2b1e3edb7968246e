//! Mailbox collaborator: listing, fetching and filing messages.

mod imap;

pub use imap::{ImapConfig, ImapMailbox, parse_message, strip_html};

use async_trait::async_trait;
use tracing::info;

use crate::error::MailboxError;

/// A fetched message, reduced to what triage needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub body: String,
    /// Raw `List-Unsubscribe` header, if present.
    pub list_unsubscribe: Option<String>,
}

/// A mailbox label (an IMAP folder, a Gmail label).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub id: String,
    pub name: String,
}

/// Operations triage needs from a mailbox.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Ids of unread inbox messages, oldest first, at most `limit`.
    async fn list_unread(&self, limit: usize) -> Result<Vec<String>, MailboxError>;

    /// Fetch a full message without marking it read.
    async fn fetch(&self, id: &str) -> Result<MailMessage, MailboxError>;

    /// User-visible labels. System labels and the inbox are excluded.
    async fn list_labels(&self) -> Result<Vec<Label>, MailboxError>;

    async fn create_label(&self, name: &str) -> Result<Label, MailboxError>;

    /// Move a message out of the inbox into the given label.
    async fn move_to_label(&self, id: &str, label_id: &str) -> Result<(), MailboxError>;
}

/// Id of the label called `name` (case-insensitive), creating it if absent.
pub async fn label_id_for(mailbox: &dyn Mailbox, name: &str) -> Result<String, MailboxError> {
    let wanted = name.trim();
    let labels = mailbox.list_labels().await?;
    if let Some(label) = labels
        .iter()
        .find(|l| l.name.trim().to_lowercase() == wanted.to_lowercase())
    {
        return Ok(label.id.clone());
    }

    let created = mailbox.create_label(wanted).await?;
    info!(label = %created.name, "Created mailbox label");
    Ok(created.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct LabelsOnly {
        labels: Mutex<Vec<Label>>,
    }

    #[async_trait]
    impl Mailbox for LabelsOnly {
        async fn list_unread(&self, _limit: usize) -> Result<Vec<String>, MailboxError> {
            Ok(vec![])
        }
        async fn fetch(&self, id: &str) -> Result<MailMessage, MailboxError> {
            Err(MailboxError::NotFound { id: id.into() })
        }
        async fn list_labels(&self) -> Result<Vec<Label>, MailboxError> {
            Ok(self.labels.lock().unwrap().clone())
        }
        async fn create_label(&self, name: &str) -> Result<Label, MailboxError> {
            let label = Label {
                id: format!("id-{name}"),
                name: name.into(),
            };
            self.labels.lock().unwrap().push(label.clone());
            Ok(label)
        }
        async fn move_to_label(&self, _id: &str, _label_id: &str) -> Result<(), MailboxError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn existing_label_found_case_insensitively() {
        let mailbox = LabelsOnly::default();
        mailbox.labels.lock().unwrap().push(Label {
            id: "L1".into(),
            name: "Newsletter".into(),
        });

        let id = label_id_for(&mailbox, "newsletter").await.unwrap();
        assert_eq!(id, "L1");
        assert_eq!(mailbox.labels.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_label_is_created_once() {
        let mailbox = LabelsOnly::default();

        let first = label_id_for(&mailbox, "Rechnung").await.unwrap();
        let second = label_id_for(&mailbox, "Rechnung").await.unwrap();
        assert_eq!(first, "id-Rechnung");
        assert_eq!(first, second);
        assert_eq!(mailbox.labels.lock().unwrap().len(), 1);
    }
}
