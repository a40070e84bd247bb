use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use thiserror::Error;

use bizdesk_core::TenantId;

pub const SENDGRID_BASE_URL: &str = "https://api.sendgrid.com";
const SEND_PATH: &str = "/v3/mail/send";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: Option<String>,
    pub attachments: Vec<EmailAttachment>,
}

impl EmailMessage {
    pub fn validate(&self) -> Result<(), EmailError> {
        let to = self.to.trim();
        let valid_address = to
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !valid_address {
            return Err(EmailError::InvalidMessage(format!(
                "invalid recipient address '{}'",
                self.to
            )));
        }
        if self.subject.trim().is_empty() {
            return Err(EmailError::InvalidMessage("subject cannot be empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailReceipt {
    pub provider: &'static str,
    pub message_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("mail transport failed: {0}")]
    Transport(String),

    #[error("mail provider rejected the message (status {status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Outbound mail delivery.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, tenant_id: TenantId, message: &EmailMessage) -> Result<EmailReceipt, EmailError>;
}

#[async_trait]
impl<T> EmailSender for Arc<T>
where
    T: EmailSender + ?Sized,
{
    async fn send(&self, tenant_id: TenantId, message: &EmailMessage) -> Result<EmailReceipt, EmailError> {
        (**self).send(tenant_id, message).await
    }
}

/// Keeps messages in memory instead of delivering them (dev and tests).
#[derive(Debug, Default)]
pub struct InMemoryOutbox {
    sent: Mutex<Vec<(TenantId, EmailMessage)>>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages a tenant has sent, oldest first.
    pub fn sent(&self, tenant_id: TenantId) -> Vec<EmailMessage> {
        self.sent
            .lock()
            .map(|sent| {
                sent.iter()
                    .filter(|(t, _)| *t == tenant_id)
                    .map(|(_, m)| m.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl EmailSender for InMemoryOutbox {
    async fn send(&self, tenant_id: TenantId, message: &EmailMessage) -> Result<EmailReceipt, EmailError> {
        message.validate()?;
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| EmailError::Transport("outbox lock poisoned".to_string()))?;
        sent.push((tenant_id, message.clone()));
        Ok(EmailReceipt {
            provider: "outbox",
            message_id: Some(format!("outbox-{}", sent.len())),
        })
    }
}

#[derive(Serialize)]
struct MailRequest<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<Attachment<'a>>,
    custom_args: CustomArgs,
}

#[derive(Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct Attachment<'a> {
    content: String,
    filename: &'a str,
    #[serde(rename = "type")]
    content_type: &'a str,
    disposition: &'static str,
}

#[derive(Serialize)]
struct CustomArgs {
    tenant_id: String,
}

/// Delivery through the SendGrid v3 HTTP API.
pub struct SendGridSender {
    client: reqwest::Client,
    api_key: String,
    from: String,
    url: String,
}

impl SendGridSender {
    pub fn new(api_key: impl Into<String>, from: impl Into<String>) -> Self {
        Self::with_base_url(api_key, from, SENDGRID_BASE_URL)
    }

    /// Point at a different host (a local mock in tests).
    pub fn with_base_url(
        api_key: impl Into<String>,
        from: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let base: String = base_url.into();
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            from: from.into(),
            url: format!("{}{SEND_PATH}", base.trim_end_matches('/')),
        }
    }

    fn request<'a>(&'a self, tenant_id: TenantId, message: &'a EmailMessage) -> MailRequest<'a> {
        let mut content = vec![Content {
            content_type: "text/plain",
            value: &message.text_body,
        }];
        if let Some(html) = &message.html_body {
            content.push(Content {
                content_type: "text/html",
                value: html,
            });
        }
        MailRequest {
            personalizations: vec![Personalization {
                to: vec![Address {
                    email: message.to.trim(),
                }],
            }],
            from: Address { email: &self.from },
            subject: &message.subject,
            content,
            attachments: message
                .attachments
                .iter()
                .map(|a| Attachment {
                    content: BASE64.encode(&a.content),
                    filename: &a.filename,
                    content_type: &a.content_type,
                    disposition: "attachment",
                })
                .collect(),
            custom_args: CustomArgs {
                tenant_id: tenant_id.to_string(),
            },
        }
    }
}

#[async_trait]
impl EmailSender for SendGridSender {
    #[tracing::instrument(skip(self, message), fields(tenant_id = %tenant_id, attachments = message.attachments.len()))]
    async fn send(&self, tenant_id: TenantId, message: &EmailMessage) -> Result<EmailReceipt, EmailError> {
        message.validate()?;
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&self.request(tenant_id, message))
            .send()
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "sendgrid rejected message");
            return Err(EmailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        let message_id = response
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        tracing::info!(?message_id, "email accepted by sendgrid");
        Ok(EmailReceipt {
            provider: "sendgrid",
            message_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(to: &str) -> EmailMessage {
        EmailMessage {
            to: to.to_string(),
            subject: "Invoice INV-00001".to_string(),
            text_body: "Please find attached.".to_string(),
            html_body: Some("<p>Please find attached.</p>".to_string()),
            attachments: vec![EmailAttachment {
                filename: "invoice-INV-00001.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                content: b"%PDF-1.3".to_vec(),
            }],
        }
    }

    #[tokio::test]
    async fn outbox_keeps_messages_per_tenant() {
        let outbox = InMemoryOutbox::new();
        let a = TenantId::new();
        let b = TenantId::new();

        outbox.send(a, &message("ap@acme.test")).await.unwrap();
        outbox.send(b, &message("ap@globex.test")).await.unwrap();

        assert_eq!(outbox.sent(a).len(), 1);
        assert_eq!(outbox.sent(a)[0].to, "ap@acme.test");
        assert_eq!(outbox.sent(b).len(), 1);
    }

    #[tokio::test]
    async fn invalid_recipient_is_rejected_before_sending() {
        let outbox = InMemoryOutbox::new();
        let t = TenantId::new();
        let err = outbox.send(t, &message("not-an-address")).await.unwrap_err();
        assert!(matches!(err, EmailError::InvalidMessage(_)));
        assert!(outbox.sent(t).is_empty());
    }

    #[test]
    fn sendgrid_payload_shape() {
        let sender = SendGridSender::with_base_url("key", "billing@bizdesk.test", "http://localhost:9/");
        let t = TenantId::new();
        let msg = message("ap@acme.test");
        let json = serde_json::to_value(sender.request(t, &msg)).unwrap();

        assert_eq!(sender.url, "http://localhost:9/v3/mail/send");
        assert_eq!(json["personalizations"][0]["to"][0]["email"], "ap@acme.test");
        assert_eq!(json["from"]["email"], "billing@bizdesk.test");
        assert_eq!(json["content"][1]["type"], "text/html");
        assert_eq!(json["attachments"][0]["content"], BASE64.encode(b"%PDF-1.3"));
        assert_eq!(json["custom_args"]["tenant_id"], t.to_string());
    }
}
