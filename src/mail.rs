//! Outgoing e-mail.
//!
//! Delivery sits behind the [`Mailer`] trait. The server ships [`LogMailer`],
//! which writes messages to the log; tests use [`MemoryMailer`].

use crate::auth::tokens::encode_uid;
use crate::types::User;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// A rendered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<()>;
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<()> {
        tracing::info!(
            from = %email.from,
            to = %email.to,
            subject = %email.subject,
            body = %email.body,
            "Sending e-mail"
        );
        Ok(())
    }
}

/// Keeps sent messages in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryMailer {
    sent: Arc<Mutex<Vec<Email>>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far.
    pub fn sent(&self) -> Vec<Email> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    /// The most recent message to `to`.
    pub fn last_to(&self, to: &str) -> Option<Email> {
        self.sent().into_iter().rev().find(|e| e.to == to)
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: Email) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("mailbox lock poisoned"))?
            .push(email);
        Ok(())
    }
}

fn greeting(user: &User) -> String {
    let name = user.full_name();
    if name.is_empty() {
        "Hello,".to_string()
    } else {
        format!("Hello {},", name)
    }
}

/// Message with the account activation link.
pub fn activation_email(from: &str, public_url: &str, user: &User, token: &str) -> Email {
    let link = format!(
        "{}/api/users/activate/{}/{}",
        public_url.trim_end_matches('/'),
        encode_uid(user.id),
        token
    );
    Email {
        from: from.to_string(),
        to: user.email.clone(),
        subject: "Activate your account".to_string(),
        body: format!(
            "{}\n\nPlease confirm your e-mail address by opening this link:\n\n{}\n\nIf you did not register, ignore this message.\n",
            greeting(user),
            link
        ),
    }
}

/// Message with the password reset link.
pub fn password_reset_email(from: &str, public_url: &str, user: &User, token: &str) -> Email {
    let link = format!(
        "{}/api/users/reset/{}/{}",
        public_url.trim_end_matches('/'),
        encode_uid(user.id),
        token
    );
    Email {
        from: from.to_string(),
        to: user.email.clone(),
        subject: "Password reset".to_string(),
        body: format!(
            "{}\n\nA password reset was requested for your account. Send a new password to:\n\n{}\n\nIf you did not ask for this, ignore this message.\n",
            greeting(user),
            link
        ),
    }
}

/// Extract the `{uidb64}/{token}` pair from a link in a message body.
pub fn link_params(body: &str, route: &str) -> Option<(String, String)> {
    let start = body.find(route)? + route.len();
    let rest = body[start..].split_whitespace().next()?;
    let (uid, token) = rest.split_once('/')?;
    Some((uid.to_string(), token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_mailer_records() {
        let mailer = MemoryMailer::new();
        mailer
            .send(Email {
                from: "a@x".into(),
                to: "b@x".into(),
                subject: "s".into(),
                body: "b".into(),
            })
            .await
            .unwrap();
        assert_eq!(mailer.sent().len(), 1);
        assert_eq!(mailer.last_to("b@x").unwrap().subject, "s");
        assert!(mailer.last_to("c@x").is_none());
    }

    #[test]
    fn test_link_params() {
        let body = "Open:\n\nhttp://h/api/users/activate/NDI/abc-123\n\nbye";
        assert_eq!(
            link_params(body, "/api/users/activate/"),
            Some(("NDI".to_string(), "abc-123".to_string()))
        );
        assert_eq!(link_params(body, "/api/users/reset/"), None);
    }
}
