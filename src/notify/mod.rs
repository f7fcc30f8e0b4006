//! Outbound failure notification. One message per failed run, sent through
//! a JSON mail gateway — never per-record noise.

use crate::config::NotifyConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use url::Url;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_failure(&self, subject: &str, body: &str) -> Result<()>;
}

/// POSTs `{to, subject, text}` to the configured gateway endpoint.
pub struct MailHook {
    http: reqwest::Client,
    endpoint: Url,
    to: String,
}

impl MailHook {
    /// Built only when notification is enabled AND fully configured;
    /// otherwise fatal errors stay in the run log alone.
    pub fn from_config(cfg: &NotifyConfig) -> Result<Option<Self>> {
        if !cfg.email_on_error {
            return Ok(None);
        }
        let (Some(to), Some(endpoint)) = (&cfg.error_email, &cfg.mail_endpoint) else {
            return Ok(None);
        };

        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("Invalid mail endpoint '{}'", endpoint))?;

        Ok(Some(Self {
            http: reqwest::Client::new(),
            endpoint,
            to: to.clone(),
        }))
    }
}

#[async_trait]
impl Notifier for MailHook {
    async fn notify_failure(&self, subject: &str, body: &str) -> Result<()> {
        let payload = json!({
            "to": self.to,
            "subject": subject,
            "text": body,
        });

        self.http
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await
            .context("Mail gateway unreachable")?
            .error_for_status()
            .context("Mail gateway rejected the message")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_config() -> NotifyConfig {
        NotifyConfig {
            error_email: Some("ops@example.com".into()),
            email_on_error: true,
            mail_endpoint: Some("https://mail.example.com/send".into()),
        }
    }

    #[test]
    fn disabled_flag_builds_nothing() {
        let cfg = NotifyConfig {
            email_on_error: false,
            ..full_config()
        };
        assert!(MailHook::from_config(&cfg).unwrap().is_none());
    }

    #[test]
    fn missing_address_builds_nothing() {
        let cfg = NotifyConfig {
            error_email: None,
            ..full_config()
        };
        assert!(MailHook::from_config(&cfg).unwrap().is_none());
    }

    #[test]
    fn bad_endpoint_is_an_error() {
        let cfg = NotifyConfig {
            mail_endpoint: Some("not a url".into()),
            ..full_config()
        };
        assert!(MailHook::from_config(&cfg).is_err());
    }

    #[test]
    fn full_config_builds_a_hook() {
        assert!(MailHook::from_config(&full_config()).unwrap().is_some());
    }
}
