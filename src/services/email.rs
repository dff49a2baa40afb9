use serde_json::json;
use thiserror::Error;

use crate::config;
use crate::models::User;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail dispatch failed: {0}")]
    Dispatch(String),
}

/// Outbound mail for one recipient, dispatched through the hosted mail API.
/// With no API endpoint configured (development), messages are logged
/// instead of sent.
pub struct Mailer {
    to: String,
    first_name: String,
    url: String,
}

impl Mailer {
    pub fn new(user: &User, url: impl Into<String>) -> Self {
        let first_name = user
            .name
            .split_whitespace()
            .next()
            .unwrap_or(&user.name)
            .to_string();
        Self {
            to: user.email.clone(),
            first_name,
            url: url.into(),
        }
    }

    pub async fn send_welcome(&self) -> Result<(), MailError> {
        self.send(
            "Welcome to the Trailhead family!",
            &format!(
                "Hi {}, welcome aboard! Visit {} to complete your profile.",
                self.first_name, self.url
            ),
        )
        .await
    }

    pub async fn send_password_reset(&self) -> Result<(), MailError> {
        self.send(
            "Your password reset token (expires in 10 min)",
            &format!(
                "Forgot your password? Submit a PATCH request with your new password and \
                 password_confirm to: {}\nIf you didn't forget your password, please ignore \
                 this email.",
                self.url
            ),
        )
        .await
    }

    async fn send(&self, subject: &str, text: &str) -> Result<(), MailError> {
        let mail = &config::config().mail;

        if mail.api_url.is_empty() {
            tracing::info!(to = %self.to, subject, "mail dispatch disabled; would send: {}", text);
            return Ok(());
        }

        let body = json!({
            "from": format!("{} <{}>", mail.from_name, mail.from_email),
            "to": self.to,
            "subject": subject,
            "text": text,
        });

        let response = reqwest::Client::new()
            .post(&mail.api_url)
            .bearer_auth(&mail.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Dispatch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MailError::Dispatch(format!(
                "mail API returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}
