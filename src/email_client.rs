use async_trait::async_trait;
use serde::Serialize;

use crate::configuration::EmailClientSettings;
use crate::error::AppError;

/// Delivers password reset tokens to their owner.
#[async_trait]
pub trait ResetTokenSender: Send + Sync + 'static {
    async fn send_reset_token(&self, recipient: &str, token: &str) -> Result<(), AppError>;
}

/// Used when no email API is configured. The token is dropped; only the
/// fact that delivery was skipped is logged.
pub struct DisabledResetSender;

#[async_trait]
impl ResetTokenSender for DisabledResetSender {
    async fn send_reset_token(&self, _recipient: &str, _token: &str) -> Result<(), AppError> {
        tracing::warn!("Password reset requested but no email client is configured");
        Ok(())
    }
}

#[derive(Clone)]
pub struct EmailClient {
    http_client: reqwest::Client,
    base_url: String,
    sender: String,
    authorization_token: String,
    reset_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html_body: &'a str,
    text_body: &'a str,
}

impl EmailClient {
    pub fn new(settings: &EmailClientSettings) -> Result<Self, AppError> {
        let http_client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            sender: settings.sender_email.clone(),
            authorization_token: settings.authorization_token.clone(),
            reset_url: settings.reset_url.clone(),
        })
    }

    fn reset_link(&self, token: &str) -> String {
        let separator = if self.reset_url.contains('?') { '&' } else { '?' };
        format!("{}{}token={}", self.reset_url, separator, token)
    }

    pub async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        html_content: &str,
        text_content: &str,
    ) -> Result<(), AppError> {
        let url = format!("{}/email", self.base_url);
        let request = SendEmailRequest {
            from: &self.sender,
            to: recipient,
            subject,
            html_body: html_content,
            text_body: text_content,
        };

        self.http_client
            .post(&url)
            .header("X-Postmark-Server-Token", &self.authorization_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to send email: {}", e)))?
            .error_for_status()
            .map_err(|e| AppError::Internal(format!("Email service error: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl ResetTokenSender for EmailClient {
    async fn send_reset_token(&self, recipient: &str, token: &str) -> Result<(), AppError> {
        let link = self.reset_link(token);
        let html = format!(
            "We received a request to reset your password.<br />\
             <a href=\"{}\">Choose a new password</a>. The link expires in one hour.",
            link
        );
        let text = format!(
            "We received a request to reset your password.\n\
             Visit {} to choose a new one. The link expires in one hour.",
            link
        );

        self.send_email(recipient, "Reset your password", &html, &text)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(reset_url: &str) -> EmailClientSettings {
        EmailClientSettings {
            base_url: "http://localhost:9999/".to_string(),
            sender_email: "no-reply@example.com".to_string(),
            authorization_token: "token".to_string(),
            timeout_milliseconds: 200,
            reset_url: reset_url.to_string(),
        }
    }

    #[test]
    fn test_reset_link_appends_token() {
        let client = EmailClient::new(&settings("https://cms.example.com/reset")).unwrap();
        assert_eq!(
            client.reset_link("abc"),
            "https://cms.example.com/reset?token=abc"
        );

        let client = EmailClient::new(&settings("https://cms.example.com/reset?lang=en")).unwrap();
        assert_eq!(
            client.reset_link("abc"),
            "https://cms.example.com/reset?lang=en&token=abc"
        );
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = EmailClient::new(&settings("https://cms.example.com/reset")).unwrap();
        assert_eq!(client.base_url, "http://localhost:9999");
    }

    #[tokio::test]
    async fn test_unreachable_email_api_is_an_error() {
        let mut settings = settings("https://cms.example.com/reset");
        settings.base_url = "http://127.0.0.1:1".to_string();
        let client = EmailClient::new(&settings).unwrap();

        let result = client.send_reset_token("user@example.com", "abc").await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }
}
