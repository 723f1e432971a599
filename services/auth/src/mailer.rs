//! Outbound email for verification and reset codes
//!
//! A single SMTP transport is built at startup and shared through the
//! application state. Send failures are returned to the caller, never
//! raised; each flow decides whether a failed dispatch is fatal.

use anyhow::Result;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::{PoolConfig, authentication::Credentials},
};
use std::time::Duration;
use tracing::info;

/// SMTP configuration
#[derive(Debug, Clone)]
pub struct MailerConfig {
    /// SMTP server hostname
    pub host: String,
    /// SMTP server port (STARTTLS submission port by default)
    pub port: u16,
    /// SMTP username
    pub username: String,
    /// SMTP password
    pub password: String,
    /// From address, e.g. "Tradewinds <no-reply@tradewinds.example>"
    pub from: String,
}

impl MailerConfig {
    /// Create a new MailerConfig from environment variables
    ///
    /// # Environment Variables
    /// - `SMTP_HOST`: SMTP server hostname (required)
    /// - `SMTP_PORT`: SMTP server port (default: 587)
    /// - `SMTP_USERNAME`: SMTP username (required)
    /// - `SMTP_PASSWORD`: SMTP password (required)
    /// - `SMTP_FROM`: From address (default: "Tradewinds <SMTP_USERNAME>")
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("SMTP_HOST")
            .map_err(|_| anyhow::anyhow!("SMTP_HOST environment variable not set"))?;

        let port = std::env::var("SMTP_PORT")
            .unwrap_or_else(|_| "587".to_string())
            .parse()
            .unwrap_or(587);

        let username = std::env::var("SMTP_USERNAME")
            .map_err(|_| anyhow::anyhow!("SMTP_USERNAME environment variable not set"))?;

        let password = std::env::var("SMTP_PASSWORD")
            .map_err(|_| anyhow::anyhow!("SMTP_PASSWORD environment variable not set"))?;

        let from = std::env::var("SMTP_FROM")
            .unwrap_or_else(|_| format!("Tradewinds <{}>", username));

        Ok(MailerConfig {
            host,
            port,
            username,
            password,
            from,
        })
    }
}

/// Notification sender backed by a pooled async SMTP transport
#[derive(Clone)]
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl Mailer {
    /// Build the SMTP transport from its configuration
    pub fn new(config: &MailerConfig) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| anyhow::anyhow!("Failed to create SMTP transport: {}", e))?
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .port(config.port)
            .pool_config(PoolConfig::new().max_size(4))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid from address: {}", e))?;

        Ok(Mailer { transport, from })
    }

    /// Send a plain-text message
    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(to
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid to address: {}", e))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| anyhow::anyhow!("Failed to build email: {}", e))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send email: {}", e))?;

        info!("Email sent to {}", to);
        Ok(())
    }

    /// Send the account verification code
    pub async fn send_verification_code(&self, to: &str, code: &str) -> Result<()> {
        self.send(
            to,
            "Verify your Tradewinds account",
            &verification_email_body(code),
        )
        .await
    }

    /// Send the password reset code
    pub async fn send_reset_code(&self, to: &str, code: &str) -> Result<()> {
        self.send(
            to,
            "Tradewinds password reset request",
            &reset_email_body(code),
        )
        .await
    }
}

/// Body of the account verification email
pub fn verification_email_body(code: &str) -> String {
    format!(
        "Welcome to Tradewinds!\n\
        \n\
        Please verify your account using the following code:\n\
        \n\
        {}\n\
        \n\
        This code expires in 10 minutes.\n\
        \n\
        The Tradewinds Team",
        code
    )
}

/// Body of the password reset email
pub fn reset_email_body(code: &str) -> String {
    format!(
        "Hello,\n\
        \n\
        A password reset was requested for your Tradewinds account.\n\
        Use the following code to continue:\n\
        \n\
        {}\n\
        \n\
        This code expires in 10 minutes. If you did not request this\n\
        reset, you can ignore this email.\n\
        \n\
        The Tradewinds Team",
        code
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_verification_template_contains_code_and_expiry() {
        let body = verification_email_body("123456");
        assert!(body.contains("123456"));
        assert!(body.contains("verify your account"));
        assert!(body.contains("expires in 10 minutes"));
    }

    #[test]
    fn test_reset_template_contains_code_and_guidance() {
        let body = reset_email_body("654321");
        assert!(body.contains("654321"));
        assert!(body.contains("password reset"));
        assert!(body.contains("did not request"));
    }

    #[test]
    #[serial]
    fn test_mailer_config_from_env() {
        unsafe {
            std::env::set_var("SMTP_HOST", "smtp.example.com");
            std::env::set_var("SMTP_USERNAME", "no-reply@tradewinds.example");
            std::env::set_var("SMTP_PASSWORD", "hunter2");
            std::env::remove_var("SMTP_PORT");
            std::env::remove_var("SMTP_FROM");
        }

        let config = MailerConfig::from_env().unwrap();
        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, 587);
        assert_eq!(config.from, "Tradewinds <no-reply@tradewinds.example>");

        unsafe {
            std::env::remove_var("SMTP_HOST");
            std::env::remove_var("SMTP_USERNAME");
            std::env::remove_var("SMTP_PASSWORD");
        }
    }
}
